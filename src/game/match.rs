//! Match record: two player slots, timing and status

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::matchmaking::ConnectionId;
use crate::ws::protocol::{PlayerProfile, PlayerResult};

pub type MatchId = Uuid;

/// A player's position within a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    One,
    Two,
}

impl Slot {
    pub fn opponent(self) -> Self {
        match self {
            Slot::One => Slot::Two,
            Slot::Two => Slot::One,
        }
    }

    /// Player-number tag sent to clients
    pub fn number(self) -> u8 {
        match self {
            Slot::One => 1,
            Slot::Two => 2,
        }
    }
}

/// Match status. `Active -> Completed` is the only transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Active,
    Completed,
}

/// Per-player state inside a match
#[derive(Debug, Clone)]
pub struct PlayerMatchState {
    pub connection_id: ConnectionId,
    pub profile: PlayerProfile,
    /// Always within `[0, initial_hp]`
    pub hp: u32,
    pub kills: u32,
    pub deaths: u32,
}

impl PlayerMatchState {
    pub fn new(connection_id: ConnectionId, profile: PlayerProfile, initial_hp: u32) -> Self {
        Self {
            connection_id,
            profile,
            hp: initial_hp,
            kills: 0,
            deaths: 0,
        }
    }

    pub fn result(&self) -> PlayerResult {
        PlayerResult {
            wallet_address: self.profile.wallet_address.clone(),
            kills: self.kills,
            deaths: self.deaths,
        }
    }
}

/// Authoritative match record, owned by the lifecycle
#[derive(Debug, Clone)]
pub struct Match {
    pub id: MatchId,
    pub player1: PlayerMatchState,
    pub player2: PlayerMatchState,
    status: MatchStatus,
    winner: Option<Slot>,
    pub created_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    /// Monotonic start, used for the reported duration
    started: Instant,
    duration_ms: Option<u64>,
}

impl Match {
    pub fn new(id: MatchId, player1: PlayerMatchState, player2: PlayerMatchState) -> Self {
        Self {
            id,
            player1,
            player2,
            status: MatchStatus::Active,
            winner: None,
            created_at: Utc::now(),
            ended_at: None,
            started: Instant::now(),
            duration_ms: None,
        }
    }

    pub fn status(&self) -> MatchStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == MatchStatus::Active
    }

    /// Set only once the match is completed
    pub fn winner(&self) -> Option<Slot> {
        self.winner
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn player(&self, slot: Slot) -> &PlayerMatchState {
        match slot {
            Slot::One => &self.player1,
            Slot::Two => &self.player2,
        }
    }

    pub fn player_mut(&mut self, slot: Slot) -> &mut PlayerMatchState {
        match slot {
            Slot::One => &mut self.player1,
            Slot::Two => &mut self.player2,
        }
    }

    pub fn slot_of(&self, connection_id: ConnectionId) -> Option<Slot> {
        if self.player1.connection_id == connection_id {
            Some(Slot::One)
        } else if self.player2.connection_id == connection_id {
            Some(Slot::Two)
        } else {
            None
        }
    }

    pub fn connections(&self) -> [ConnectionId; 2] {
        [self.player1.connection_id, self.player2.connection_id]
    }

    /// Elapsed match time in milliseconds, frozen at completion
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
            .unwrap_or_else(|| self.started.elapsed().as_millis() as u64)
    }

    /// Transition to `Completed` with a winner. Returns false if already completed.
    pub fn complete(&mut self, winner: Slot) -> bool {
        if self.status != MatchStatus::Active {
            return false;
        }
        self.status = MatchStatus::Completed;
        self.winner = Some(winner);
        self.ended_at = Some(Utc::now());
        self.duration_ms = Some(self.started.elapsed().as_millis() as u64);
        true
    }

    pub fn view(&self) -> MatchView {
        MatchView {
            id: self.id,
            status: self.status,
            player1: PlayerView::from(&self.player1),
            player2: PlayerView::from(&self.player2),
            winner: self
                .winner
                .map(|slot| self.player(slot).profile.wallet_address.clone()),
            start_time: self.created_at,
            end_time: self.ended_at,
        }
    }
}

/// Match record as returned by the lookup endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchView {
    pub id: MatchId,
    pub status: MatchStatus,
    pub player1: PlayerView,
    pub player2: PlayerView,
    pub winner: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    #[serde(flatten)]
    pub profile: PlayerProfile,
    pub hp: u32,
    pub kills: u32,
    pub deaths: u32,
}

impl From<&PlayerMatchState> for PlayerView {
    fn from(state: &PlayerMatchState) -> Self {
        Self {
            profile: state.profile.clone(),
            hp: state.hp,
            kills: state.kills,
            deaths: state.deaths,
        }
    }
}
