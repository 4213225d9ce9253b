//! HTTP and WebSocket surface for aarc-dl

pub mod health;
pub mod jobs;
pub mod ws;

pub use health::health_routes;
pub use jobs::job_routes;
pub use ws::ws_routes;
