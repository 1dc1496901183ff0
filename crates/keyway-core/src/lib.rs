//! Domain logic for the keyway lock PIN manager.
//!
//! This crate has zero internal dependencies so it can be used by the
//! storage layer, the engine, and any future worker or CLI tooling.

pub mod conflict;
pub mod error;
pub mod pin;
pub mod schedule;
pub mod settings;
pub mod slots;
pub mod types;
pub mod window;
