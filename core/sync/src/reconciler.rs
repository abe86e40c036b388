//! One-way reconciliation of a replica tree against its source.
//!
//! A pass runs in two phases. The copy phase walks the source top-down,
//! creating directories and copying new or changed files. The prune phase
//! walks the replica and removes every entry without a source counterpart.
//! After a successful pass the replica is an exact image of the source.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use treemirror_common::{EntryKind, Error, IoContext, Result, TreeEntry};

use crate::audit::AuditLog;
use crate::config::{ErrorPolicy, SyncConfig};
use crate::detector::{ChangeDetector, Classification};

/// Name affixes of the staging file a copy is written to before it is
/// renamed into place. The middle part is random.
const STAGING_PREFIX: &str = ".treemirror-";
const STAGING_SUFFIX: &str = ".partial";

/// Outcome of a single pass.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub directories_created: usize,
    pub files_created: usize,
    pub files_updated: usize,
    pub entries_removed: usize,
    pub entries_failed: usize,
    pub duration: Duration,
}

impl SyncReport {
    /// Number of mutations applied to either tree.
    pub fn changes(&self) -> usize {
        self.directories_created + self.files_created + self.files_updated + self.entries_removed
    }

    /// Whether the pass changed nothing and hit no failures.
    pub fn is_noop(&self) -> bool {
        self.changes() == 0 && self.entries_failed == 0
    }
}

/// Run one pass mirroring `source` onto `replica` with default settings.
pub fn synchronize(
    source: impl Into<PathBuf>,
    replica: impl Into<PathBuf>,
    log: Arc<dyn AuditLog>,
) -> Result<SyncReport> {
    Reconciler::new(SyncConfig::new(source, replica), log).run_pass()
}

/// Sole mutator of the replica tree.
#[derive(Clone)]
pub struct Reconciler {
    source: PathBuf,
    replica: PathBuf,
    on_error: ErrorPolicy,
    detector: ChangeDetector,
    log: Arc<dyn AuditLog>,
    cancel: CancellationToken,
}

impl Reconciler {
    pub fn new(config: SyncConfig, log: Arc<dyn AuditLog>) -> Self {
        Self {
            detector: ChangeDetector::new(config.compare),
            source: config.source,
            replica: config.replica,
            on_error: config.on_error,
            log,
            cancel: CancellationToken::new(),
        }
    }

    /// Observe `cancel` between entries; a cancelled pass returns
    /// [`Error::Cancelled`].
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn replica(&self) -> &Path {
        &self.replica
    }

    /// Perform a full pass.
    ///
    /// # Postconditions
    /// - Both roots exist as directories
    /// - The replica mirrors the source (unless entries failed under
    ///   [`ErrorPolicy::Continue`])
    ///
    /// # Errors
    /// - A root exists but is not a directory
    /// - Any filesystem failure under [`ErrorPolicy::Abort`]
    /// - [`Error::Cancelled`] if the token fired mid-pass
    pub fn run_pass(&self) -> Result<SyncReport> {
        let start = Instant::now();
        let mut report = SyncReport::default();

        debug!(
            "Reconciling {} -> {}",
            self.source.display(),
            self.replica.display()
        );

        self.ensure_root(&self.source, &mut report)?;
        self.ensure_root(&self.replica, &mut report)?;

        self.copy_phase(&mut report)?;
        self.prune_phase(&mut report)?;

        report.duration = start.elapsed();
        Ok(report)
    }

    fn ensure_root(&self, root: &Path, report: &mut SyncReport) -> Result<()> {
        match EntryKind::probe(root)? {
            Some(EntryKind::Directory) => Ok(()),
            Some(_) => Err(Error::NotADirectory(root.to_path_buf())),
            None => {
                fs::create_dir_all(root).at_path(root)?;
                self.log.record(&format!("Created {}", root.display()))?;
                report.directories_created += 1;
                Ok(())
            }
        }
    }

    fn copy_phase(&self, report: &mut SyncReport) -> Result<()> {
        // Pre-order walk: a directory is always yielded before its children.
        let walker = WalkDir::new(&self.source)
            .min_depth(1)
            .sort_by_file_name();

        for next in walker {
            self.check_cancelled()?;

            let result = match next {
                Ok(dent) => self.mirror_entry(&dent, report),
                // Removed from the source after its parent was listed.
                Err(err) if is_not_found(&err) => continue,
                Err(err) => Err(walk_error(err)),
            };
            self.absorb(result, report)?;
        }

        Ok(())
    }

    fn mirror_entry(&self, dent: &DirEntry, report: &mut SyncReport) -> Result<()> {
        let source_path = dent.path();
        let kind = source_kind(dent)?;
        let entry = TreeEntry::new(&self.source, source_path, kind)?;
        let target = entry.resolve(&self.replica);

        match self.detector.classify(source_path, kind, &target)? {
            Classification::UpToDate => {}
            Classification::NotApplicable => {
                debug!("Skipping {}: neither file nor directory", source_path.display());
            }
            Classification::Missing => match kind {
                EntryKind::Directory => self.create_dir(&target, report)?,
                _ => {
                    copy_file(source_path, &target)?;
                    self.log.record(&format!(
                        "Created {} and copied to {}",
                        source_path.display(),
                        target.display()
                    ))?;
                    report.files_created += 1;
                }
            },
            Classification::Stale => match kind {
                EntryKind::Directory => {
                    self.remove(&target, report)?;
                    self.create_dir(&target, report)?;
                }
                _ => {
                    if !is_regular_file(&target)? {
                        self.remove(&target, report)?;
                    }
                    copy_file(source_path, &target)?;
                    self.log.record(&format!(
                        "Copied changes from {} to {}",
                        source_path.display(),
                        target.display()
                    ))?;
                    report.files_updated += 1;
                }
            },
        }

        Ok(())
    }

    fn prune_phase(&self, report: &mut SyncReport) -> Result<()> {
        let mut walker = WalkDir::new(&self.replica)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter();

        while let Some(next) = walker.next() {
            self.check_cancelled()?;

            let dent = match next {
                Ok(dent) => dent,
                // Vanished since its parent was listed.
                Err(err) if is_not_found(&err) => continue,
                Err(err) => {
                    self.absorb(Err(walk_error(err)), report)?;
                    continue;
                }
            };

            let result = self.is_orphan(&dent).and_then(|orphan| {
                if !orphan {
                    return Ok(());
                }
                if dent.file_type().is_dir() {
                    // Close the walker's handle before the subtree goes away.
                    walker.skip_current_dir();
                }
                self.remove(dent.path(), report)
            });
            self.absorb(result, report)?;
        }

        Ok(())
    }

    fn is_orphan(&self, dent: &DirEntry) -> Result<bool> {
        let entry = TreeEntry::new(
            &self.replica,
            dent.path(),
            EntryKind::from_file_type(dent.file_type()),
        )?;
        let counterpart = entry.resolve(&self.source);

        // Source entries that are neither files nor directories are never
        // mirrored, so a replica entry at that path is an orphan too.
        Ok(matches!(
            EntryKind::probe(&counterpart)?,
            None | Some(EntryKind::Other)
        ))
    }

    fn create_dir(&self, path: &Path, report: &mut SyncReport) -> Result<()> {
        fs::create_dir_all(path).at_path(path)?;
        self.log.record(&format!("Created {}", path.display()))?;
        report.directories_created += 1;
        Ok(())
    }

    fn remove(&self, path: &Path, report: &mut SyncReport) -> Result<()> {
        if remove_entry(path)? {
            self.log.record(&format!("Removed {}", path.display()))?;
            report.entries_removed += 1;
        }
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            debug!("Pass interrupted by cancellation");
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    // Apply the error policy to the outcome of one entry.
    fn absorb(&self, result: Result<()>, report: &mut SyncReport) -> Result<()> {
        match (result, self.on_error) {
            (Ok(()), _) => Ok(()),
            (Err(Error::Cancelled), _) => Err(Error::Cancelled),
            (Err(err), ErrorPolicy::Abort) => Err(err),
            (Err(err), ErrorPolicy::Continue) => {
                warn!("Entry failed, continuing: {}", err);
                self.log.record(&format!("Failed to synchronize entry: {}", err))?;
                report.entries_failed += 1;
                Ok(())
            }
        }
    }
}

// Symlinks are classified by their target, like a plain walk would report.
fn source_kind(dent: &DirEntry) -> Result<EntryKind> {
    if dent.path_is_symlink() {
        Ok(EntryKind::probe(dent.path())?.unwrap_or(EntryKind::Other))
    } else {
        Ok(EntryKind::from_file_type(dent.file_type()))
    }
}

fn is_regular_file(path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(meta) => Ok(meta.file_type().is_file()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(Error::fs(path, err)),
    }
}

/// Remove whatever lives at `path` without following symlinks.
///
/// Returns `false` if nothing was there.
fn remove_entry(path: &Path) -> Result<bool> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(Error::fs(path, err)),
    };

    let removed = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match removed {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(Error::fs(path, err)),
    }
}

/// Copy `source` over `target`, carrying permissions and modification time.
///
/// The bytes land in a freshly created sibling staging file that is renamed
/// into place, so `target` is never observed half-written. Staging files are
/// created exclusively and never replace an existing entry. One left behind by
/// a crash has no source counterpart and is pruned by the next pass.
fn copy_file(source: &Path, target: &Path) -> Result<()> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).at_path(parent)?;

    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(STAGING_SUFFIX)
        .tempfile_in(parent)
        .at_path(parent)?;

    write_staged(source, &staging)?;

    // Dropping the staging file on any earlier error deletes it.
    staging
        .persist(target)
        .map_err(|e| Error::fs(target, e.error))?;
    Ok(())
}

fn write_staged(source: &Path, staging: &NamedTempFile) -> Result<()> {
    let mut reader = File::open(source).at_path(source)?;
    let meta = reader.metadata().at_path(source)?;

    let mut writer = staging.as_file();
    io::copy(&mut reader, &mut writer).at_path(staging.path())?;
    writer
        .set_modified(meta.modified().at_path(source)?)
        .at_path(staging.path())?;

    // Permissions last: a read-only mode would block the writes above.
    fs::set_permissions(staging.path(), meta.permissions()).at_path(staging.path())
}

fn is_not_found(err: &walkdir::Error) -> bool {
    err.io_error()
        .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
}

fn walk_error(err: walkdir::Error) -> Error {
    match err.path().map(Path::to_path_buf) {
        Some(path) => Error::fs(path, io::Error::from(err)),
        None => Error::Io(io::Error::from(err)),
    }
}
