//! Scheduled cleanup of decision and coordination state
//!
//! | schedule    | every  | tasks                                   |
//! |-------------|--------|-----------------------------------------|
//! | regular     | 1 h    | completed decisions, stale pending      |
//! | performance | 6 h    | session history, metrics history        |
//! | maintenance | 24 h   | inbox messages, completed decisions     |

pub mod manager;
pub mod types;

pub use manager::{CleanupError, CleanupHandle, CleanupResult, DecisionCleanupManager};
pub use types::{CleanupSchedule, CleanupStatus, CleanupTask, CleanupTaskStatus, CleanupTaskType};
