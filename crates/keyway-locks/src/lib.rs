//! Lock transports and the batching lock writer.
//!
//! The writer is the single serialisation point for external lock effects:
//! every SET/CLEAR intent from the schedulers is coalesced here, executed
//! over the preferred transport with fallback, and its outcome recorded on
//! the owning assignment row.

pub mod config;
pub mod discovery;
pub mod home_assistant;
pub mod transport;
pub mod writer;
pub mod zwave_js_ui;

pub use config::HaConfig;
pub use home_assistant::HaClient;
pub use writer::{IntentSink, LockWriter, Owner};
pub use zwave_js_ui::ZwaveJsUiClient;
