//! Matchmaking service - the single task that owns queue, connections and matches
//!
//! WebSocket sessions and HTTP handlers talk to it through [`MatchmakingHandle`].
//! Commands and timer events are processed one at a time, so queue pairing and
//! match state changes never interleave.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::{Limits, MatchSettings};
use crate::game::relay::{relay, RelayEvent};
use crate::game::{Envelope, MatchId, MatchLifecycle, MatchView, TimerEvent};
use crate::ws::protocol::{ClientMsg, PlayerProfile, ProtocolError, ServerMsg, WaitingInfo};

use super::queue::{Enqueued, MatchmakingQueue};
use super::registry::ConnectionRegistry;
use super::ConnectionId;

/// Capacity of the command channel into the service task
const COMMAND_BUFFER: usize = 1024;

/// Requests handled by the service task
#[derive(Debug)]
pub enum Command {
    Connect {
        connection_id: ConnectionId,
        outbound: mpsc::Sender<ServerMsg>,
    },
    Client {
        connection_id: ConnectionId,
        msg: ClientMsg,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    /// Frame refused before it reached the service
    Reject {
        connection_id: ConnectionId,
        error: ProtocolError,
    },
    Health {
        reply: oneshot::Sender<HealthSnapshot>,
    },
    GetMatch {
        match_id: MatchId,
        reply: oneshot::Sender<Option<MatchView>>,
    },
}

/// Counters reported by the health endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub active_matches: usize,
    pub players_in_queue: usize,
    pub connections: usize,
}

/// Service task is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("matchmaking service is not running")]
    Unavailable,
}

/// Cloneable front door to the service task
#[derive(Clone)]
pub struct MatchmakingHandle {
    tx: mpsc::Sender<Command>,
}

impl MatchmakingHandle {
    pub async fn connect(
        &self,
        connection_id: ConnectionId,
        outbound: mpsc::Sender<ServerMsg>,
    ) -> Result<(), ServiceError> {
        self.send(Command::Connect {
            connection_id,
            outbound,
        })
        .await
    }

    pub async fn submit(&self, connection_id: ConnectionId, msg: ClientMsg) -> Result<(), ServiceError> {
        self.send(Command::Client { connection_id, msg }).await
    }

    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<(), ServiceError> {
        self.send(Command::Disconnect { connection_id }).await
    }

    pub async fn reject(
        &self,
        connection_id: ConnectionId,
        error: ProtocolError,
    ) -> Result<(), ServiceError> {
        self.send(Command::Reject {
            connection_id,
            error,
        })
        .await
    }

    pub async fn health(&self) -> Result<HealthSnapshot, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Health { reply }).await?;
        rx.await.map_err(|_| ServiceError::Unavailable)
    }

    pub async fn get_match(&self, match_id: MatchId) -> Result<Option<MatchView>, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::GetMatch { match_id, reply }).await?;
        rx.await.map_err(|_| ServiceError::Unavailable)
    }

    async fn send(&self, command: Command) -> Result<(), ServiceError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| ServiceError::Unavailable)
    }
}

/// Matchmaking service
pub struct MatchmakingService {
    queue: MatchmakingQueue,
    registry: ConnectionRegistry,
    lifecycle: MatchLifecycle,
    limits: Limits,
    commands: mpsc::Receiver<Command>,
    timers: mpsc::UnboundedReceiver<TimerEvent>,
}

impl MatchmakingService {
    pub fn new(settings: Arc<MatchSettings>, limits: Limits) -> (Self, MatchmakingHandle) {
        let (tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (timer_tx, timers) = mpsc::unbounded_channel();

        let service = Self {
            queue: MatchmakingQueue::new(limits.max_queue_size),
            registry: ConnectionRegistry::new(),
            lifecycle: MatchLifecycle::new(settings, timer_tx),
            limits,
            commands,
            timers,
        };

        (service, MatchmakingHandle { tx })
    }

    /// Run until every handle is dropped
    pub async fn run(mut self) {
        info!("Matchmaking service started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = self.timers.recv() => {
                    let outgoing = self.lifecycle.on_timer(event);
                    self.registry.deliver_all(outgoing);
                }
            }
        }

        info!("Matchmaking service stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect {
                connection_id,
                outbound,
            } => {
                self.registry.register(connection_id, outbound);
                debug!(connection_id = %connection_id, "Connection registered");
            }
            Command::Client { connection_id, msg } => self.handle_client(connection_id, msg),
            Command::Disconnect { connection_id } => self.handle_disconnect(connection_id),
            Command::Reject {
                connection_id,
                error,
            } => self.registry.deliver(Envelope {
                to: connection_id,
                msg: error.into(),
            }),
            Command::Health { reply } => {
                let _ = reply.send(self.health());
            }
            Command::GetMatch { match_id, reply } => {
                let _ = reply.send(self.lifecycle.view(&match_id));
            }
        }
    }

    fn handle_client(&mut self, connection_id: ConnectionId, msg: ClientMsg) {
        if !self.registry.contains(&connection_id) {
            warn!(connection_id = %connection_id, kind = msg.kind(), "Message from unregistered connection");
            return;
        }
        if self.registry.is_severed(&connection_id) {
            debug!(connection_id = %connection_id, kind = msg.kind(), "Ignoring message from severed connection");
            return;
        }

        match msg {
            ClientMsg::FindMatch(profile) => {
                if let Err(err) = self.find_match(connection_id, profile) {
                    warn!(connection_id = %connection_id, error = %err, "find-match rejected");
                    self.registry.deliver(Envelope {
                        to: connection_id,
                        msg: err.into(),
                    });
                }
            }
            ClientMsg::PlayerMove(payload) => {
                self.forward(connection_id, RelayEvent::Move(payload));
            }
            ClientMsg::PlayerShoot(payload) => {
                self.forward(connection_id, RelayEvent::Shoot(payload));
            }
            ClientMsg::PlayerHit(payload) => {
                let outgoing = self.lifecycle.report_hit(connection_id, payload.new_hp);
                self.registry.deliver_all(outgoing);
            }
        }
    }

    fn forward(&mut self, connection_id: ConnectionId, event: RelayEvent) {
        if let Some(envelope) = relay(&self.lifecycle, connection_id, event) {
            self.registry.deliver(envelope);
        }
    }

    fn find_match(
        &mut self,
        connection_id: ConnectionId,
        profile: PlayerProfile,
    ) -> Result<(), ProtocolError> {
        if self.lifecycle.is_in_active_match(connection_id) {
            return Err(ProtocolError::AlreadyInMatch);
        }
        if !self.queue.contains(&connection_id)
            && self.lifecycle.active_matches() >= self.limits.max_active_matches
        {
            return Err(ProtocolError::ServerFull);
        }

        info!(
            connection_id = %connection_id,
            wallet = %profile.wallet_address,
            "Player looking for match"
        );
        match self
            .queue
            .enqueue(connection_id, profile)
            .map_err(|_| ProtocolError::QueueFull)?
        {
            Enqueued::Waiting { position } => {
                info!(connection_id = %connection_id, position, "Player waiting for opponent");
                self.registry.deliver(Envelope {
                    to: connection_id,
                    msg: ServerMsg::WaitingForOpponent(WaitingInfo { position }),
                });
            }
            Enqueued::Paired(first, second) => {
                info!(
                    player1 = %first.connection_id,
                    player2 = %second.connection_id,
                    waited_ms = first.wait_time().as_millis() as u64,
                    "Paired players"
                );
                let (_, outgoing) = self.lifecycle.create_match(
                    (first.connection_id, first.profile),
                    (second.connection_id, second.profile),
                );
                self.registry.deliver_all(outgoing);
            }
        }
        Ok(())
    }

    fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        if self.queue.remove(&connection_id).is_some() {
            info!(connection_id = %connection_id, "Player left matchmaking queue");
        }

        let outgoing = self.lifecycle.handle_disconnect(connection_id);
        self.registry.deliver_all(outgoing);

        self.registry.remove(&connection_id);
        info!(connection_id = %connection_id, "Player disconnected");
    }

    fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            active_matches: self.lifecycle.active_matches(),
            players_in_queue: self.queue.len(),
            connections: self.registry.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::r#match::MatchStatus;
    use crate::ws::protocol::{HitPayload, MovePayload};
    use std::time::Duration;
    use tokio_test::assert_ok;
    use uuid::Uuid;

    struct Client {
        id: ConnectionId,
        rx: mpsc::Receiver<ServerMsg>,
    }

    impl Client {
        async fn recv(&mut self) -> ServerMsg {
            tokio::time::timeout(Duration::from_secs(300), self.rx.recv())
                .await
                .expect("timed out waiting for server message")
                .expect("outbound channel closed")
        }

        fn assert_idle(&mut self) {
            assert!(self.rx.try_recv().is_err(), "unexpected pending message");
        }
    }

    fn settings() -> MatchSettings {
        MatchSettings {
            duration: Duration::from_secs(60),
            kill_threshold: 3,
            initial_hp: 100,
            entry_fee: "0.001".to_string(),
            retention: Duration::from_secs(30),
        }
    }

    fn spawn_service(limits: Limits) -> MatchmakingHandle {
        let (service, handle) = MatchmakingService::new(Arc::new(settings()), limits);
        tokio::spawn(service.run());
        handle
    }

    async fn connect(handle: &MatchmakingHandle) -> Client {
        let (tx, rx) = mpsc::channel(64);
        let id = Uuid::new_v4();
        handle.connect(id, tx).await.unwrap();
        Client { id, rx }
    }

    fn find(wallet: &str) -> ClientMsg {
        ClientMsg::FindMatch(PlayerProfile {
            wallet_address: wallet.to_string(),
            fid: None,
            username: format!("user_{}", wallet),
        })
    }

    fn hit(new_hp: i64) -> ClientMsg {
        ClientMsg::PlayerHit(HitPayload { new_hp })
    }

    /// Two connected clients paired into a match
    async fn paired(handle: &MatchmakingHandle) -> (Client, Client, MatchId) {
        let mut a = connect(handle).await;
        let mut b = connect(handle).await;

        handle.submit(a.id, find("0xaaa")).await.unwrap();
        assert_eq!(
            a.recv().await,
            ServerMsg::WaitingForOpponent(WaitingInfo { position: 0 })
        );

        handle.submit(b.id, find("0xbbb")).await.unwrap();
        let ServerMsg::MatchFound(found_a) = a.recv().await else {
            panic!("expected match-found for A");
        };
        let ServerMsg::MatchFound(found_b) = b.recv().await else {
            panic!("expected match-found for B");
        };
        assert_eq!(found_a.match_id, found_b.match_id);
        assert_eq!(found_a.player_number, 1);
        assert_eq!(found_b.player_number, 2);
        assert_eq!(found_a.opponent.wallet_address, "0xbbb");
        assert_eq!(found_b.opponent.wallet_address, "0xaaa");

        (a, b, found_a.match_id)
    }

    #[tokio::test]
    async fn test_pairing_and_relay() {
        let handle = spawn_service(Limits::default());
        let (mut a, mut b, _) = paired(&handle).await;

        let movement = MovePayload {
            x: 12.0,
            y: 34.0,
            velocity_x: 1.5,
            velocity_y: 0.0,
            flip_x: true,
            timestamp: Some(99.0),
            extra: Default::default(),
        };
        handle
            .submit(a.id, ClientMsg::PlayerMove(movement.clone()))
            .await
            .unwrap();
        assert_eq!(b.recv().await, ServerMsg::OpponentMove(movement));

        let health = handle.health().await.unwrap();
        assert_eq!(
            health,
            HealthSnapshot {
                active_matches: 1,
                players_in_queue: 0,
                connections: 2,
            }
        );
        a.assert_idle();
    }

    #[tokio::test]
    async fn test_kill_threshold_scenario() {
        let handle = spawn_service(Limits::default());
        let (mut a, mut b, match_id) = paired(&handle).await;

        // B reports its own HP hitting zero three times
        for _ in 0..3 {
            handle.submit(b.id, hit(0)).await.unwrap();
            for client in [&mut a, &mut b] {
                let ServerMsg::KillEvent(kill) = client.recv().await else {
                    panic!("expected kill-event");
                };
                assert_eq!(kill.killer, "0xaaa");
                assert_eq!(kill.victim, "0xbbb");
            }
        }

        for client in [&mut a, &mut b] {
            let ServerMsg::MatchEnded(summary) = client.recv().await else {
                panic!("expected match-ended");
            };
            assert_eq!(summary.match_id, match_id);
            assert_eq!(summary.winner, "0xaaa");
            assert_eq!(summary.player1.kills, 3);
            assert_eq!(summary.player2.kills, 0);
            assert_eq!(summary.player2.deaths, 3);
        }

        let view = handle.get_match(match_id).await.unwrap().unwrap();
        assert_eq!(view.status, MatchStatus::Completed);
        assert_eq!(view.winner.as_deref(), Some("0xaaa"));
        assert_eq!(handle.health().await.unwrap().active_matches, 0);

        // Completed matches ignore further hits
        handle.submit(a.id, hit(0)).await.unwrap();
        handle.health().await.unwrap();
        a.assert_idle();
        b.assert_idle();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_scenario_and_reaping() {
        let handle = spawn_service(Limits::default());
        let (mut a, mut b, match_id) = paired(&handle).await;

        for (client, hp) in [(a.id, 0), (b.id, 0), (a.id, 0), (b.id, 0), (a.id, 40), (b.id, 70)] {
            handle.submit(client, hit(hp)).await.unwrap();
        }
        for _ in 0..4 {
            assert!(matches!(a.recv().await, ServerMsg::KillEvent(_)));
            assert!(matches!(b.recv().await, ServerMsg::KillEvent(_)));
        }

        let ServerMsg::MatchEnded(summary) = a.recv().await else {
            panic!("expected match-ended after countdown");
        };
        assert_eq!(summary.winner, "0xbbb");
        assert_eq!(summary.player1.kills, 2);
        assert_eq!(summary.player2.kills, 2);
        assert!(matches!(b.recv().await, ServerMsg::MatchEnded(_)));

        // Still queryable during retention, gone afterwards
        assert!(handle.get_match(match_id).await.unwrap().is_some());
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(handle.get_match(match_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_while_queued() {
        let handle = spawn_service(Limits::default());
        let mut a = connect(&handle).await;
        handle.submit(a.id, find("0xaaa")).await.unwrap();
        a.recv().await;

        assert_ok!(handle.disconnect(a.id).await);
        let health = assert_ok!(handle.health().await);
        assert_eq!(health.players_in_queue, 0);
        assert_eq!(health.connections, 0);

        // The next player waits instead of pairing with the departed one
        let mut c = connect(&handle).await;
        handle.submit(c.id, find("0xccc")).await.unwrap();
        assert_eq!(
            c.recv().await,
            ServerMsg::WaitingForOpponent(WaitingInfo { position: 0 })
        );
        assert_eq!(handle.health().await.unwrap().active_matches, 0);
    }

    #[tokio::test]
    async fn test_disconnect_during_match() {
        let handle = spawn_service(Limits::default());
        let (mut a, mut b, match_id) = paired(&handle).await;

        handle.disconnect(a.id).await.unwrap();
        assert_eq!(b.recv().await, ServerMsg::OpponentDisconnected);
        a.assert_idle();

        assert!(handle.get_match(match_id).await.unwrap().is_none());
        assert_eq!(handle.health().await.unwrap().active_matches, 0);

        // The remaining player can queue again
        handle.submit(b.id, find("0xbbb")).await.unwrap();
        assert_eq!(
            b.recv().await,
            ServerMsg::WaitingForOpponent(WaitingInfo { position: 0 })
        );
    }

    #[tokio::test]
    async fn test_find_match_rejections() {
        let handle = spawn_service(Limits {
            max_queue_size: 16,
            max_active_matches: 1,
        });
        let (mut a, _b, _) = paired(&handle).await;

        handle.submit(a.id, find("0xaaa")).await.unwrap();
        let ServerMsg::Error(err) = a.recv().await else {
            panic!("expected error");
        };
        assert_eq!(err.code, "already_in_match");

        let mut c = connect(&handle).await;
        handle.submit(c.id, find("0xccc")).await.unwrap();
        let ServerMsg::Error(err) = c.recv().await else {
            panic!("expected error");
        };
        assert_eq!(err.code, "server_full");
    }

    #[tokio::test]
    async fn test_repeat_find_match_keeps_one_entry() {
        let handle = spawn_service(Limits::default());
        let mut a = connect(&handle).await;
        handle.submit(a.id, find("0xaaa")).await.unwrap();
        handle.submit(a.id, find("0xaaa")).await.unwrap();
        a.recv().await;
        assert_eq!(
            a.recv().await,
            ServerMsg::WaitingForOpponent(WaitingInfo { position: 0 })
        );
        assert_eq!(handle.health().await.unwrap().players_in_queue, 1);
    }

    #[tokio::test]
    async fn test_relay_outside_match_is_silent() {
        let handle = spawn_service(Limits::default());
        let mut a = connect(&handle).await;
        handle.submit(a.id, hit(0)).await.unwrap();
        handle
            .submit(
                a.id,
                ClientMsg::PlayerShoot(crate::ws::protocol::ShootPayload {
                    x: 0.0,
                    y: 0.0,
                    angle: 0.0,
                    velocity_x: 0.0,
                    velocity_y: 0.0,
                    extra: Default::default(),
                }),
            )
            .await
            .unwrap();
        handle.health().await.unwrap();
        a.assert_idle();
    }

    #[tokio::test]
    async fn test_match_ended_survives_relay_backlog() {
        let handle = spawn_service(Limits::default());
        let (mut a, mut b, match_id) = paired(&handle).await;

        // A stops reading while B floods movement, then dies three times
        let movement = MovePayload {
            x: 1.0,
            y: 1.0,
            velocity_x: 0.0,
            velocity_y: 0.0,
            flip_x: false,
            timestamp: None,
            extra: Default::default(),
        };
        for _ in 0..64 {
            handle
                .submit(b.id, ClientMsg::PlayerMove(movement.clone()))
                .await
                .unwrap();
        }
        for _ in 0..3 {
            handle.submit(b.id, hit(0)).await.unwrap();
        }
        handle.health().await.unwrap();

        let mut moves = 0;
        let mut kills = 0;
        let summary = loop {
            match a.recv().await {
                ServerMsg::OpponentMove(_) => moves += 1,
                ServerMsg::KillEvent(_) => kills += 1,
                ServerMsg::MatchEnded(summary) => break summary,
                other => panic!("unexpected message: {:?}", other),
            }
        };
        assert!(moves < 64, "relay backlog was never shed");
        assert_eq!(kills, 3);
        assert_eq!(summary.match_id, match_id);
        assert_eq!(summary.winner, "0xaaa");
        a.assert_idle();

        for _ in 0..3 {
            assert!(matches!(b.recv().await, ServerMsg::KillEvent(_)));
        }
        assert!(matches!(b.recv().await, ServerMsg::MatchEnded(_)));
    }

    #[tokio::test]
    async fn test_reject_reaches_client() {
        let handle = spawn_service(Limits::default());
        let mut a = connect(&handle).await;
        assert_ok!(handle.reject(a.id, ProtocolError::RateLimited).await);
        let ServerMsg::Error(err) = a.recv().await else {
            panic!("expected error");
        };
        assert_eq!(err.code, "rate_limited");
    }

    #[tokio::test]
    async fn test_unknown_match_lookup() {
        let handle = spawn_service(Limits::default());
        let found = assert_ok!(handle.get_match(Uuid::new_v4()).await);
        assert!(found.is_none());
    }
}
