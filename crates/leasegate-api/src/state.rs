//! Application state shared across handlers

use leasegate_auth::AdminGuard;
use leasegate_core::BudgetControl;

/// Shared application state
#[derive(Debug, Clone)]
pub struct AppState {
    /// Budget control protocol services
    pub control: BudgetControl,
    /// Operator credential check for administrative routes
    pub admin: AdminGuard,
}

impl AppState {
    pub fn new(control: BudgetControl, admin: AdminGuard) -> Self {
        Self { control, admin }
    }
}
