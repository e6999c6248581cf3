//! HTTP surface: health, match lookup and the WebSocket route

pub mod routes;

pub use routes::build_router;
