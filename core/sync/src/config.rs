//! Sync configuration.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use treemirror_common::{Error, Result};

/// How file contents are compared against the replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompareMode {
    /// Byte-for-byte comparison of every file.
    #[default]
    Content,
    /// Equal length and modification time count as unchanged.
    SizeAndMtime,
}

impl FromStr for CompareMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "content" => Ok(Self::Content),
            "metadata" => Ok(Self::SizeAndMtime),
            other => Err(format!(
                "unknown compare mode '{}', expected 'content' or 'metadata'",
                other
            )),
        }
    }
}

impl fmt::Display for CompareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Content => f.write_str("content"),
            Self::SizeAndMtime => f.write_str("metadata"),
        }
    }
}

/// What a pass does when a single entry fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Stop the pass and surface the error.
    #[default]
    Abort,
    /// Record the failure and move on to the next entry.
    Continue,
}

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Authoritative tree.
    pub source: PathBuf,
    /// Managed mirror of `source`.
    pub replica: PathBuf,
    /// Pause between the end of one pass and the start of the next.
    pub interval: Duration,
    /// File comparison strategy.
    pub compare: CompareMode,
    /// Per-entry failure handling.
    pub on_error: ErrorPolicy,
}

impl SyncConfig {
    /// Default pause between passes.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

    pub fn new(source: impl Into<PathBuf>, replica: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            replica: replica.into(),
            interval: Self::DEFAULT_INTERVAL,
            compare: CompareMode::default(),
            on_error: ErrorPolicy::default(),
        }
    }

    /// Set the pause between passes.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the file comparison strategy.
    pub fn with_compare_mode(mut self, compare: CompareMode) -> Self {
        self.compare = compare;
        self
    }

    /// Set the per-entry failure handling.
    pub fn with_error_policy(mut self, on_error: ErrorPolicy) -> Self {
        self.on_error = on_error;
        self
    }

    /// Reject root layouts where a pass would feed on its own output.
    ///
    /// # Errors
    /// - Source and replica are the same directory
    /// - One root is nested inside the other
    pub fn validate(&self) -> Result<()> {
        let source = resolve(&self.source)?;
        let replica = resolve(&self.replica)?;

        if source == replica {
            return Err(Error::InvalidInput(format!(
                "source and replica are the same directory: {}",
                source.display()
            )));
        }
        if replica.starts_with(&source) {
            return Err(Error::InvalidInput(format!(
                "replica {} is inside source {}",
                replica.display(),
                source.display()
            )));
        }
        if source.starts_with(&replica) {
            return Err(Error::InvalidInput(format!(
                "source {} is inside replica {}",
                source.display(),
                replica.display()
            )));
        }

        Ok(())
    }

    /// Reject a log file the pass would delete or copy.
    ///
    /// # Errors
    /// - `log_file` lies inside the source or replica tree
    pub fn check_log_location(&self, log_file: &Path) -> Result<()> {
        let log_file = resolve(log_file)?;

        for (name, root) in [("source", &self.source), ("replica", &self.replica)] {
            if log_file.starts_with(resolve(root)?) {
                return Err(Error::InvalidInput(format!(
                    "log file {} is inside the {} tree",
                    log_file.display(),
                    name
                )));
            }
        }

        Ok(())
    }
}

/// Absolute form of `path` with `.` and `..` folded away and the longest
/// existing ancestor canonicalized, so aliases of one directory compare equal.
/// The path itself need not exist yet.
fn resolve(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path).map_err(|e| Error::fs(path, e))?;
    let normalized = normalize(&absolute);

    let mut tail = Vec::new();
    let mut existing = normalized.as_path();
    loop {
        if let Ok(mut base) = existing.canonicalize() {
            base.extend(tail.iter().rev());
            return Ok(base);
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name);
                existing = parent;
            }
            _ => return Ok(normalized),
        }
    }
}

// Lexical only: `..` drops the previous component and never climbs past the root.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::new("src", "dst");
        assert_eq!(config.interval, SyncConfig::DEFAULT_INTERVAL);
        assert_eq!(config.compare, CompareMode::Content);
        assert_eq!(config.on_error, ErrorPolicy::Abort);
    }

    #[test]
    fn test_builder() {
        let config = SyncConfig::new("src", "dst")
            .with_interval(Duration::ZERO)
            .with_compare_mode(CompareMode::SizeAndMtime)
            .with_error_policy(ErrorPolicy::Continue);

        assert_eq!(config.interval, Duration::ZERO);
        assert_eq!(config.compare, CompareMode::SizeAndMtime);
        assert_eq!(config.on_error, ErrorPolicy::Continue);
    }

    #[test]
    fn test_compare_mode_parse() {
        assert_eq!("content".parse::<CompareMode>().unwrap(), CompareMode::Content);
        assert_eq!("metadata".parse::<CompareMode>().unwrap(), CompareMode::SizeAndMtime);
        assert!("mtime".parse::<CompareMode>().is_err());
    }

    #[test]
    fn test_validate_disjoint_roots() {
        assert!(SyncConfig::new("/data/source", "/data/replica").validate().is_ok());
        assert!(SyncConfig::new("/data/source", "/data/source-replica").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_nesting() {
        assert!(SyncConfig::new("/data", "/data").validate().is_err());
        assert!(SyncConfig::new("/data", "/data/replica").validate().is_err());
        assert!(SyncConfig::new("/data/source", "/data").validate().is_err());
        assert!(SyncConfig::new("/data/x/../source", "/data/source/replica")
            .validate()
            .is_err());
        assert!(SyncConfig::new("/data/source", "/data/./source/../source/r")
            .validate()
            .is_err());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/../a")), PathBuf::from("/a"));
    }

    #[cfg(unix)]
    #[test]
    fn test_validate_rejects_symlinked_alias() {
        let temp = tempfile::TempDir::new().unwrap();
        let source = temp.path().join("source");
        std::fs::create_dir(&source).unwrap();
        let alias = temp.path().join("alias");
        std::os::unix::fs::symlink(&source, &alias).unwrap();

        let config = SyncConfig::new(&source, alias.join("replica"));
        assert!(config.validate().is_err());
        assert!(config
            .check_log_location(&alias.join("sync.log"))
            .is_err());
    }

    #[test]
    fn test_log_location() {
        let config = SyncConfig::new("/data/source", "/data/replica");
        assert!(config.check_log_location(Path::new("/data/sync.log")).is_ok());
        assert!(config.check_log_location(Path::new("/data/replica/sync.log")).is_err());
        assert!(config.check_log_location(Path::new("/data/source/a/sync.log")).is_err());
        assert!(config
            .check_log_location(Path::new("/data/elsewhere/../replica/sync.log"))
            .is_err());
    }
}
