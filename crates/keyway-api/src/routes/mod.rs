//! Route tree assembly.
//!
//! Route hierarchy:
//!
//! ```text
//! /ws                                     WebSocket upgrade
//!
//! /api/health                             health check
//!
//! /api/locks                              list, create
//! /api/locks/discover                     Home Assistant discovery
//! /api/locks/refresh                      status refresh
//! /api/locks/{id}                         get, update, delete
//!
//! /api/calendars                          list, create
//! /api/calendars/{id}                     get, update, delete
//! /api/calendars/{id}/sync                manual sync
//! /api/calendars/{id}/locks               get, replace mappings
//! /api/calendars/{id}/pins                derived guest PINs
//!
//! /api/guest-pins                         list
//! /api/guest-pins/{id}                    get, update
//! /api/guest-pins/{id}/regenerate         next-strategy code
//! /api/guest-pins/{id}/conflicts          conflict reports
//! /api/guest-pins/{id}/alternative        conflict-free candidate
//!
//! /api/static-pins                        list, create
//! /api/static-pins/{id}                   get, update, delete
//! /api/static-pins/{id}/schedules         replace windows
//! /api/static-pins/{id}/locks             replace assignments
//!
//! /api/settings                           get, update
//! ```

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api` route tree.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        // Locks
        .route(
            "/locks",
            get(handlers::locks::list_locks).post(handlers::locks::create_lock),
        )
        .route("/locks/discover", get(handlers::locks::discover_locks))
        .route("/locks/refresh", post(handlers::locks::refresh_locks))
        .route(
            "/locks/{id}",
            get(handlers::locks::get_lock)
                .put(handlers::locks::update_lock)
                .delete(handlers::locks::delete_lock),
        )
        // Calendars
        .route(
            "/calendars",
            get(handlers::calendars::list_calendars).post(handlers::calendars::create_calendar),
        )
        .route(
            "/calendars/{id}",
            get(handlers::calendars::get_calendar)
                .put(handlers::calendars::update_calendar)
                .delete(handlers::calendars::delete_calendar),
        )
        .route("/calendars/{id}/sync", post(handlers::calendars::sync_calendar))
        .route(
            "/calendars/{id}/locks",
            get(handlers::calendars::get_calendar_locks)
                .put(handlers::calendars::set_calendar_locks),
        )
        .route("/calendars/{id}/pins", get(handlers::calendars::get_calendar_pins))
        // Guest PINs
        .route("/guest-pins", get(handlers::guest_pins::list_guest_pins))
        .route(
            "/guest-pins/{id}",
            get(handlers::guest_pins::get_guest_pin).put(handlers::guest_pins::update_guest_pin),
        )
        .route(
            "/guest-pins/{id}/regenerate",
            post(handlers::guest_pins::regenerate_guest_pin),
        )
        .route(
            "/guest-pins/{id}/conflicts",
            get(handlers::guest_pins::get_guest_pin_conflicts),
        )
        .route(
            "/guest-pins/{id}/alternative",
            get(handlers::guest_pins::get_guest_pin_alternative),
        )
        // Static PINs
        .route(
            "/static-pins",
            get(handlers::static_pins::list_static_pins)
                .post(handlers::static_pins::create_static_pin),
        )
        .route(
            "/static-pins/{id}",
            get(handlers::static_pins::get_static_pin)
                .put(handlers::static_pins::update_static_pin)
                .delete(handlers::static_pins::delete_static_pin),
        )
        .route(
            "/static-pins/{id}/schedules",
            put(handlers::static_pins::set_static_pin_schedules),
        )
        .route(
            "/static-pins/{id}/locks",
            put(handlers::static_pins::set_static_pin_locks),
        )
        // Settings
        .route(
            "/settings",
            get(handlers::settings::get_settings).put(handlers::settings::update_settings),
        )
}
