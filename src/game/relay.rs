//! Event relay - one-to-one forwarding of transient events to the opponent

use tracing::trace;

use crate::matchmaking::ConnectionId;
use crate::ws::protocol::{MovePayload, ServerMsg, ShootPayload};

use super::{Envelope, MatchLifecycle};

/// Transient events that are forwarded, never interpreted
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Move(MovePayload),
    Shoot(ShootPayload),
}

impl RelayEvent {
    /// Opponent-facing message carrying the same payload
    fn into_opponent_msg(self) -> ServerMsg {
        match self {
            RelayEvent::Move(payload) => ServerMsg::OpponentMove(payload),
            RelayEvent::Shoot(payload) => ServerMsg::OpponentShoot(payload),
        }
    }
}

/// Forward `event` from `from` to its opponent. `None` when `from` is not in an active match.
pub fn relay(lifecycle: &MatchLifecycle, from: ConnectionId, event: RelayEvent) -> Option<Envelope> {
    let Some(to) = lifecycle.opponent_of(from) else {
        trace!(connection_id = %from, "Relay outside an active match, dropped");
        return None;
    };
    Some(Envelope {
        to,
        msg: event.into_opponent_msg(),
    })
}
