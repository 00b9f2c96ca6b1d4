//! LeaseGate Types - Canonical domain types for the budget control protocol
//!
//! This crate contains the foundational types shared by every LeaseGate
//! crate, with zero dependencies on other leasegate crates:
//!
//! - Identity types (AgentId, BudgetId, LeaseId, RequestId, ProviderKeyId)
//! - Money in integer micro-units ([`Micros`])
//! - Provider enumeration
//! - Budget, lease and budget-request records with their state machines
//! - The stable error taxonomy exposed to callers ([`ErrorKind`])
//!
//! # Money Invariant
//!
//! For every agent budget, after every committed mutation:
//!
//! ```text
//! total_allocated == total_spent + budget_remaining    and    budget_remaining >= 0
//! ```
//!
//! `total_spent` counts committed money: open lease reservations plus
//! settled spend.

pub mod identity;
pub mod money;
pub mod provider;
pub mod budget;
pub mod lease;
pub mod request;
pub mod error;

pub use identity::*;
pub use money::*;
pub use provider::*;
pub use budget::*;
pub use lease::*;
pub use request::*;
pub use error::*;
