//! treemirror sync engine
//!
//! One-way mirroring of a source directory tree onto a replica:
//! - Change detection by exact content (or size and mtime on request)
//! - Reconciliation passes that create, update and prune replica entries
//! - An audit trail of every mutation, written before the action completes
//! - A scheduler repeating passes at a fixed interval until cancelled

pub mod audit;
pub mod config;
pub mod detector;
pub mod reconciler;
pub mod scheduler;

// Re-export main types
pub use audit::{AuditLog, AuditLogger, MemoryAuditLog};
pub use config::{CompareMode, ErrorPolicy, SyncConfig};
pub use detector::{ChangeDetector, Classification};
pub use reconciler::{synchronize, Reconciler, SyncReport};
pub use scheduler::{SyncScheduler, PASS_FINISHED, PASS_STARTED, SYNC_STOPPED};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        // Verify all main types are accessible
        let _config = SyncConfig::new("source", "replica");
        let _detector = ChangeDetector::default();
        let _log = MemoryAuditLog::new();
        let _report = SyncReport::default();
    }
}
