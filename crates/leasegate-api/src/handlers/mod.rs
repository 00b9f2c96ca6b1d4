//! API Handlers
//!
//! Request handlers for all API endpoints, one module per area.

pub mod agents;
pub mod budget;
pub mod health;
pub mod keys;
pub mod requests;

pub use health::*;
