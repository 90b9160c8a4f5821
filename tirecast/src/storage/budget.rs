//! Storage budget and usage accounting.

use serde::Serialize;

/// Default ceiling for stored sessions plus models.
pub const DEFAULT_BUDGET_MB: u64 = 100;

/// Default number of most recent sessions kept raw while possible.
pub const DEFAULT_RETENTION_COUNT: usize = 3;

const MB: u64 = 1024 * 1024;

/// Byte ceiling and retention policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageBudget {
    pub ceiling_bytes: u64,
    pub retention_count: usize,
}

impl Default for StorageBudget {
    fn default() -> Self {
        Self {
            ceiling_bytes: DEFAULT_BUDGET_MB * MB,
            retention_count: DEFAULT_RETENTION_COUNT,
        }
    }
}

impl StorageBudget {
    pub fn new(ceiling_bytes: u64, retention_count: usize) -> Self {
        Self {
            ceiling_bytes,
            retention_count,
        }
    }

    pub fn from_megabytes(megabytes: u64, retention_count: usize) -> Self {
        Self::new(megabytes.saturating_mul(MB), retention_count)
    }

    pub fn allows(&self, usage: &StorageUsage) -> bool {
        usage.total() <= self.ceiling_bytes
    }
}

/// Bytes on disk, by artifact kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StorageUsage {
    pub session_bytes: u64,
    pub sessions: usize,
    pub model_bytes: u64,
    pub models: usize,
}

impl StorageUsage {
    pub fn total(&self) -> u64 {
        self.session_bytes + self.model_bytes
    }
}

/// Format a size in bytes as a human-readable string.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budget() {
        let budget = StorageBudget::default();
        assert_eq!(budget.ceiling_bytes, 100 * 1024 * 1024);
        assert_eq!(budget.retention_count, 3);
    }

    #[test]
    fn test_allows_at_ceiling() {
        let budget = StorageBudget::new(1000, 3);
        let usage = StorageUsage {
            session_bytes: 600,
            sessions: 2,
            model_bytes: 400,
            models: 1,
        };
        assert!(budget.allows(&usage));
        assert!(!StorageBudget::new(999, 3).allows(&usage));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}
