//! Repository implementations

mod budgets;
mod leases;
mod provider_keys;
mod requests;

pub use budgets::BudgetRepo;
pub use leases::{
    ClosedLease, LeaseRepo, NewLease, OpenedLease, RolledLease, UsageOutcome, UsageReport,
};
pub use provider_keys::ProviderKeyRepo;
pub use requests::{ApprovedRequest, NewBudgetRequest, RequestFilter, RequestRepo};
