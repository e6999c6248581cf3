//! Connection registry - outbound channel per connection

use std::collections::HashMap;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::game::Envelope;
use crate::ws::protocol::ServerMsg;

use super::ConnectionId;

/// Outbound slots kept free for match state messages. Droppable traffic
/// (relay, rejections) is shed once the buffer is down to this many.
pub const CONTROL_RESERVE: usize = 16;

/// A live client connection
#[derive(Debug)]
pub struct Connection {
    /// `None` once the connection has been cut off for not reading
    outbound: Option<mpsc::Sender<ServerMsg>>,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, connection_id: ConnectionId, outbound: mpsc::Sender<ServerMsg>) {
        self.connections.insert(
            connection_id,
            Connection {
                outbound: Some(outbound),
            },
        );
    }

    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<Connection> {
        self.connections.remove(connection_id)
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Whether the connection was cut off
    pub fn is_severed(&self, connection_id: &ConnectionId) -> bool {
        self.connections
            .get(connection_id)
            .is_some_and(|connection| connection.outbound.is_none())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Queue a message for its connection without waiting.
    ///
    /// Droppable messages are shed when the reserve is reached. A match state
    /// message that finds the buffer full severs the connection instead: its
    /// sender is dropped, the socket writer drains what is queued and closes,
    /// and the client sees the transport close rather than a silent gap.
    pub fn deliver(&mut self, envelope: Envelope) {
        let Envelope { to, msg } = envelope;
        let Some(connection) = self.connections.get_mut(&to) else {
            debug!(connection_id = %to, "Dropping message for unknown connection");
            return;
        };
        let Some(outbound) = connection.outbound.as_ref() else {
            debug!(connection_id = %to, "Dropping message for severed connection");
            return;
        };

        if msg.is_droppable() && outbound.capacity() <= CONTROL_RESERVE {
            debug!(connection_id = %to, "Outbound buffer low, relay message dropped");
            return;
        }

        match outbound.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(connection_id = %to, "Outbound buffer full, closing connection");
                connection.outbound = None;
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection_id = %to, "Outbound channel closed");
            }
        }
    }

    pub fn deliver_all(&mut self, envelopes: impl IntoIterator<Item = Envelope>) {
        for envelope in envelopes {
            self.deliver(envelope);
        }
    }
}
