//! Change detection between a source entry and its replica counterpart.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use treemirror_common::{EntryKind, IoContext, Result};

use crate::config::CompareMode;

const CHUNK_SIZE: usize = 64 * 1024;

/// State of a replica path relative to its source entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Nothing exists at the replica path.
    Missing,
    /// The replica holds different content or a different kind of entry.
    Stale,
    /// The replica matches the source.
    UpToDate,
    /// The source entry is neither a file nor a directory.
    NotApplicable,
}

/// Read-only advisor deciding what the reconciler must do per entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector {
    mode: CompareMode,
}

impl ChangeDetector {
    pub fn new(mode: CompareMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> CompareMode {
        self.mode
    }

    /// Classify `replica` against an existing source entry of `kind`.
    ///
    /// Directories are only checked for existence. Files are compared
    /// according to the configured [`CompareMode`].
    pub fn classify(&self, source: &Path, kind: EntryKind, replica: &Path) -> Result<Classification> {
        if kind == EntryKind::Other {
            return Ok(Classification::NotApplicable);
        }

        let Some(replica_kind) = EntryKind::probe(replica)? else {
            return Ok(Classification::Missing);
        };

        if replica_kind != kind {
            return Ok(Classification::Stale);
        }

        if kind.is_dir() {
            return Ok(Classification::UpToDate);
        }

        let same = match self.mode {
            CompareMode::Content => contents_equal(source, replica)?,
            CompareMode::SizeAndMtime => metadata_equal(source, replica)?,
        };

        Ok(if same {
            Classification::UpToDate
        } else {
            Classification::Stale
        })
    }
}

/// Byte-exact comparison of two files.
pub fn contents_equal(a: &Path, b: &Path) -> Result<bool> {
    let mut file_a = File::open(a).at_path(a)?;
    let mut file_b = File::open(b).at_path(b)?;

    if file_a.metadata().at_path(a)?.len() != file_b.metadata().at_path(b)?.len() {
        return Ok(false);
    }

    let mut buf_a = vec![0u8; CHUNK_SIZE];
    let mut buf_b = vec![0u8; CHUNK_SIZE];

    loop {
        let read_a = fill(&mut file_a, &mut buf_a).at_path(a)?;
        let read_b = fill(&mut file_b, &mut buf_b).at_path(b)?;

        if read_a != read_b || buf_a[..read_a] != buf_b[..read_b] {
            return Ok(false);
        }
        if read_a == 0 {
            return Ok(true);
        }
    }
}

fn metadata_equal(a: &Path, b: &Path) -> Result<bool> {
    let meta_a = fs::metadata(a).at_path(a)?;
    let meta_b = fs::metadata(b).at_path(b)?;

    Ok(meta_a.len() == meta_b.len()
        && meta_a.modified().at_path(a)? == meta_b.modified().at_path(b)?)
}

// Read until `buf` is full or the reader is exhausted.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
