//! HTTP surface for the report service.
//!
//! The router is composable: `report_router()` returns a `Router` that can be
//! mounted on any axum server; `server` wraps it with bind/shutdown handling.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use router::report_router;
pub use server::{start_report_server, start_report_server_on, ReportServer, ServerError};
