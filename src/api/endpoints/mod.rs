//! API endpoint handlers.

pub mod form;
pub mod health;
pub mod reports;
