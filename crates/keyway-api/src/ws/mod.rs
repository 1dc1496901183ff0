//! WebSocket infrastructure for real-time engine notifications.
//!
//! Provides connection management, heartbeat monitoring, the HTTP upgrade
//! handler, and the bus forwarder that pushes every engine event to all
//! connected clients.

mod forwarder;
mod handler;
mod heartbeat;
pub mod manager;

pub use forwarder::run_event_forwarder;
pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
