//! # Festa Gateway
//! HTTP API surface: birthday CRUD, device registry, notification
//! settings, manual sends, and the cron delivery entry point.
//!
//! Session identity arrives as an `X-User-Id` header set by the
//! fronting proxy that terminates real authentication; the cron route
//! authenticates with a bearer secret instead and is the only route
//! that crosses owner boundaries.

pub mod routes;
pub mod server;

pub use server::{AppState, UserId, build_router, start};
