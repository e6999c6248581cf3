//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::matchmaking::{MatchmakingHandle, MatchmakingService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub matchmaking: MatchmakingHandle,
}

impl AppState {
    /// Build the state together with the service task that must be spawned to drive it
    pub fn new(config: Config) -> (Self, MatchmakingService) {
        let config = Arc::new(config);

        let (service, matchmaking) =
            MatchmakingService::new(Arc::new(config.match_settings.clone()), config.limits);

        (
            Self {
                config,
                matchmaking,
            },
            service,
        )
    }
}
