//! The sync pipeline: classification, work planning, per-file processing
//! and the orchestrator tying them to the ledger.

pub mod classifier;
pub mod diff;
pub mod file_processor;
pub mod orchestrator;

pub use classifier::{classify, Classification, Classifier, DEFAULT_MAX_FILE_SIZE};
pub use diff::{plan_work, WorkPlan};
pub use file_processor::{ContentBudget, FileOutcome, FileProcessor};
pub use orchestrator::{SyncOrchestrator, SyncReport, CHECKPOINT_INTERVAL, LOG_INTERVAL};
