//! Request handlers, one module per resource.

pub mod calendars;
pub mod guest_pins;
pub mod health;
pub mod locks;
pub mod settings;
pub mod static_pins;
