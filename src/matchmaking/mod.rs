//! Matchmaking: FIFO queue, connection registry and the coordinating service

pub mod queue;
pub mod registry;
pub mod service;

pub use service::{MatchmakingHandle, MatchmakingService, ServiceError};

/// Opaque per-connection identity. A new connection is a new identity.
pub type ConnectionId = uuid::Uuid;
