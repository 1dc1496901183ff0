//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&SqlitePool` as the first argument. Operations that touch
//! more than one row run inside a single transaction.

pub mod calendar_repo;
pub mod guest_pin_repo;
pub mod lock_repo;
pub mod settings_repo;
pub mod static_pin_repo;

pub use calendar_repo::CalendarRepo;
pub use guest_pin_repo::GuestPinRepo;
pub use lock_repo::LockRepo;
pub use settings_repo::SettingsRepo;
pub use static_pin_repo::StaticPinRepo;
