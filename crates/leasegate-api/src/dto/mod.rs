//! Data Transfer Objects
//!
//! Request and response structures for the API. Money fields are integer
//! micro-units.

pub mod agents;
pub mod budget;
pub mod keys;
pub mod requests;

pub use agents::*;
pub use budget::*;
pub use keys::*;
pub use requests::*;

/// Default page size for list endpoints
pub const DEFAULT_LIMIT: u32 = 50;

/// Largest page size a list endpoint returns
pub const MAX_LIMIT: u32 = 500;

pub(crate) fn default_limit() -> u32 {
    DEFAULT_LIMIT
}
