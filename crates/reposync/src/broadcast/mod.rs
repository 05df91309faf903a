//! Broadcasting modules for real-time event streaming.

pub mod log_broadcaster;
pub mod sync_progress;

pub use log_broadcaster::{JobLogger, LogBroadcaster, SyncLogEvent};
pub use sync_progress::{BroadcastNotifier, NoopNotifier, SyncNotifier, SyncProgressEvent};
