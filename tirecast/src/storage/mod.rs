//! Bounded on-disk storage.
//!
//! Raw session segments and car models share one byte budget. When usage
//! exceeds it, old sessions are folded into the pattern aggregates, a few
//! representative training samples are kept, and only then is the raw data
//! deleted, so knowledge survives it:
//!
//! ```text
//!   over budget?
//!       │ yes
//!       ▼
//!   sessions beyond retention ──► fold + synthesize ──► persist ──► delete ──► retire ids
//!       │ still over                                      │ any step failed
//!       ▼                                                 ▼
//!   retained sessions ──► (same)                 keep session, try the next
//!       │ still over
//!       ▼
//!   models, least recently trained first
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tirecast::storage::{StorageBudget, StorageManager};
//!
//! let manager = StorageManager::new(StorageBudget::from_megabytes(100, 3), store, models_dir);
//! let report = manager.run_pass(&learner, &synthetic)?;
//! assert!(report.within_budget);
//! ```

mod budget;
mod manager;

pub use budget::{
    format_size, StorageBudget, StorageUsage, DEFAULT_BUDGET_MB, DEFAULT_RETENTION_COUNT,
};
pub use manager::{StorageError, StorageManager, StoragePassReport};
