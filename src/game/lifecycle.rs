//! Match lifecycle: creation, hit reports, completion, countdown and reaping
//!
//! The lifecycle is owned by the matchmaking service task and is never shared.
//! Timers run as spawned tasks that only post a [`TimerEvent`] back to that
//! task, so every mutation of a match happens on one consumer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::MatchSettings;
use crate::matchmaking::ConnectionId;
use crate::ws::protocol::{
    KillInfo, MatchConfigInfo, MatchEndedInfo, MatchFoundInfo, PlayerProfile, ServerMsg,
};

use super::outcome::{evaluate, EvaluationMode};
use super::r#match::{Match, MatchId, MatchView, PlayerMatchState, Slot};
use super::Envelope;

/// Timer expirations delivered back to the owning task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    CountdownExpired(MatchId),
    Reap(MatchId),
}

/// Owner of every match record
pub struct MatchLifecycle {
    settings: Arc<MatchSettings>,
    matches: HashMap<MatchId, Match>,
    /// Connection -> most recent match. Entries outlive completion until reaping.
    by_connection: HashMap<ConnectionId, MatchId>,
    countdowns: HashMap<MatchId, JoinHandle<()>>,
    timer_tx: mpsc::UnboundedSender<TimerEvent>,
}

impl MatchLifecycle {
    pub fn new(settings: Arc<MatchSettings>, timer_tx: mpsc::UnboundedSender<TimerEvent>) -> Self {
        Self {
            settings,
            matches: HashMap::new(),
            by_connection: HashMap::new(),
            countdowns: HashMap::new(),
            timer_tx,
        }
    }

    /// Rules announced in match-found
    pub fn config_info(&self) -> MatchConfigInfo {
        MatchConfigInfo {
            duration: self.settings.duration.as_millis() as u64,
            entry_fee: self.settings.entry_fee.clone(),
            max_kills: self.settings.kill_threshold,
            initial_hp: self.settings.initial_hp,
        }
    }

    /// Create a match between two paired players and start its countdown
    pub fn create_match(
        &mut self,
        (conn_a, profile_a): (ConnectionId, PlayerProfile),
        (conn_b, profile_b): (ConnectionId, PlayerProfile),
    ) -> (MatchId, Vec<Envelope>) {
        let match_id = Uuid::new_v4();
        let initial_hp = self.settings.initial_hp;

        let game = Match::new(
            match_id,
            PlayerMatchState::new(conn_a, profile_a, initial_hp),
            PlayerMatchState::new(conn_b, profile_b, initial_hp),
        );

        let config = self.config_info();
        let outgoing = [Slot::One, Slot::Two]
            .into_iter()
            .map(|slot| Envelope {
                to: game.player(slot).connection_id,
                msg: ServerMsg::MatchFound(MatchFoundInfo {
                    match_id,
                    opponent: game.player(slot.opponent()).profile.clone(),
                    player_number: slot.number(),
                    config: config.clone(),
                }),
            })
            .collect();

        info!(
            match_id = %match_id,
            player1 = %game.player1.profile.wallet_address,
            player2 = %game.player2.profile.wallet_address,
            "Created new match"
        );

        self.by_connection.insert(conn_a, match_id);
        self.by_connection.insert(conn_b, match_id);
        self.matches.insert(match_id, game);

        let countdown = self.schedule(self.settings.duration, TimerEvent::CountdownExpired(match_id));
        self.countdowns.insert(match_id, countdown);

        (match_id, outgoing)
    }

    /// Apply a self-reported hit point value from `connection_id`
    pub fn report_hit(&mut self, connection_id: ConnectionId, new_hp: i64) -> Vec<Envelope> {
        let initial_hp = self.settings.initial_hp;
        let kill_threshold = self.settings.kill_threshold;

        let Some(game) = self.active_match_mut(connection_id) else {
            debug!(connection_id = %connection_id, "Hit report outside an active match");
            return Vec::new();
        };
        let Some(slot) = game.slot_of(connection_id) else {
            return Vec::new();
        };

        let hp = new_hp.clamp(0, i64::from(initial_hp)) as u32;
        game.player_mut(slot).hp = hp;
        if hp > 0 {
            return Vec::new();
        }

        let killer = slot.opponent();
        game.player_mut(slot).deaths += 1;
        game.player_mut(killer).kills += 1;
        // Instant respawn
        game.player_mut(slot).hp = initial_hp;

        let kill = KillInfo {
            killer: game.player(killer).profile.wallet_address.clone(),
            victim: game.player(slot).profile.wallet_address.clone(),
        };
        info!(
            match_id = %game.id,
            killer = %kill.killer,
            victim = %kill.victim,
            kills = game.player(killer).kills,
            "Player killed"
        );

        let mut outgoing: Vec<Envelope> = game
            .connections()
            .into_iter()
            .map(|to| Envelope {
                to,
                msg: ServerMsg::KillEvent(kill.clone()),
            })
            .collect();

        let match_id = game.id;
        if let Some(winner) = evaluate(game, EvaluationMode::KillThreshold, kill_threshold) {
            outgoing.extend(self.end_match(match_id, winner));
        }
        outgoing
    }

    /// Complete a match with `winner`, notify both players and schedule reaping.
    /// A match that is already completed is left untouched.
    pub fn end_match(&mut self, match_id: MatchId, winner: Slot) -> Vec<Envelope> {
        let Some(game) = self.matches.get_mut(&match_id) else {
            return Vec::new();
        };
        if !game.complete(winner) {
            debug!(match_id = %match_id, "Match already completed");
            return Vec::new();
        }

        let summary = MatchEndedInfo {
            match_id,
            winner: game.player(winner).profile.wallet_address.clone(),
            player1: game.player1.result(),
            player2: game.player2.result(),
            duration: game.duration_ms(),
        };

        info!(
            match_id = %match_id,
            winner = %summary.winner,
            duration_ms = summary.duration,
            "Match ended"
        );

        let outgoing = game
            .connections()
            .into_iter()
            .map(|to| Envelope {
                to,
                msg: ServerMsg::MatchEnded(summary.clone()),
            })
            .collect();

        if let Some(countdown) = self.countdowns.remove(&match_id) {
            countdown.abort();
        }
        let retention = self.settings.retention;
        // The reaper is never cancelled, it only deletes a completed record
        drop(self.schedule(retention, TimerEvent::Reap(match_id)));

        outgoing
    }

    /// Dispatch a timer expiration
    pub fn on_timer(&mut self, event: TimerEvent) -> Vec<Envelope> {
        match event {
            TimerEvent::CountdownExpired(match_id) => self.on_countdown_expired(match_id),
            TimerEvent::Reap(match_id) => {
                self.reap(match_id);
                Vec::new()
            }
        }
    }

    fn on_countdown_expired(&mut self, match_id: MatchId) -> Vec<Envelope> {
        self.countdowns.remove(&match_id);

        let winner = match self.matches.get(&match_id) {
            Some(game) if game.is_active() => {
                evaluate(game, EvaluationMode::Timeout, self.settings.kill_threshold)
            }
            _ => {
                debug!(match_id = %match_id, "Countdown fired for a finished match");
                return Vec::new();
            }
        };

        info!(match_id = %match_id, "Match countdown expired");
        match winner {
            Some(winner) => self.end_match(match_id, winner),
            None => Vec::new(),
        }
    }

    /// Delete a completed match record
    fn reap(&mut self, match_id: MatchId) {
        let completed = self
            .matches
            .get(&match_id)
            .is_some_and(|game| !game.is_active());
        if !completed {
            return;
        }
        if let Some(game) = self.matches.remove(&match_id) {
            self.forget_connections(&game);
            info!(match_id = %match_id, "Match removed from registry");
        }
    }

    /// Connection loss. An active match is terminated at once without a winner
    /// and its record deleted; the opponent is told the other side left.
    pub fn handle_disconnect(&mut self, connection_id: ConnectionId) -> Vec<Envelope> {
        let Some(match_id) = self.by_connection.remove(&connection_id) else {
            return Vec::new();
        };
        let active = self
            .matches
            .get(&match_id)
            .is_some_and(|game| game.is_active());
        if !active {
            return Vec::new();
        }

        let Some(game) = self.matches.remove(&match_id) else {
            return Vec::new();
        };
        if let Some(countdown) = self.countdowns.remove(&match_id) {
            countdown.abort();
        }
        self.forget_connections(&game);

        info!(
            match_id = %match_id,
            connection_id = %connection_id,
            "Player disconnected, match terminated"
        );

        game.slot_of(connection_id)
            .map(|slot| Envelope {
                to: game.player(slot.opponent()).connection_id,
                msg: ServerMsg::OpponentDisconnected,
            })
            .into_iter()
            .collect()
    }

    /// Opponent's connection while the match is active
    pub fn opponent_of(&self, connection_id: ConnectionId) -> Option<ConnectionId> {
        let game = self.active_match(connection_id)?;
        let slot = game.slot_of(connection_id)?;
        Some(game.player(slot.opponent()).connection_id)
    }

    pub fn active_match(&self, connection_id: ConnectionId) -> Option<&Match> {
        self.by_connection
            .get(&connection_id)
            .and_then(|id| self.matches.get(id))
            .filter(|game| game.is_active())
    }

    fn active_match_mut(&mut self, connection_id: ConnectionId) -> Option<&mut Match> {
        let id = self.by_connection.get(&connection_id)?;
        self.matches.get_mut(id).filter(|game| game.is_active())
    }

    pub fn is_in_active_match(&self, connection_id: ConnectionId) -> bool {
        self.active_match(connection_id).is_some()
    }

    pub fn get(&self, match_id: &MatchId) -> Option<&Match> {
        self.matches.get(match_id)
    }

    pub fn view(&self, match_id: &MatchId) -> Option<MatchView> {
        self.matches.get(match_id).map(Match::view)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.values().filter(|game| game.is_active()).count()
    }

    /// Drop index entries that still point at `game`. A player who already
    /// moved on to a newer match keeps that entry.
    fn forget_connections(&mut self, game: &Match) {
        for connection_id in game.connections() {
            if self.by_connection.get(&connection_id) == Some(&game.id) {
                self.by_connection.remove(&connection_id);
            }
        }
    }

    fn schedule(&self, delay: Duration, event: TimerEvent) -> JoinHandle<()> {
        let timer_tx = self.timer_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the service is shutting down
            let _ = timer_tx.send(event);
        })
    }
}

impl Drop for MatchLifecycle {
    fn drop(&mut self) {
        for (_, countdown) in self.countdowns.drain() {
            countdown.abort();
        }
    }
}
