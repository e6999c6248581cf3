//! Match domain: records, lifecycle, outcome rules and relay

pub mod lifecycle;
pub mod r#match;
pub mod outcome;
pub mod relay;

pub use lifecycle::{MatchLifecycle, TimerEvent};
pub use r#match::{MatchId, MatchView};

use crate::matchmaking::ConnectionId;
use crate::ws::protocol::ServerMsg;

/// A server message addressed to one connection
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub to: ConnectionId,
    pub msg: ServerMsg,
}
