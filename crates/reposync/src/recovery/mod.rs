//! Crash recovery and ledger/dispatcher reconciliation.

pub mod reconciler;
pub mod scheduler;

pub use reconciler::{ReconcileResult, Reconciler, RecoveredJobs};
pub use scheduler::ReconcileScheduler;
