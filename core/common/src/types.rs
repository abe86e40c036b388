//! Common types used throughout treemirror.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::Error;

/// Kind of an entry in a directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
    /// Anything else: sockets, FIFOs, devices, dangling symlinks.
    Other,
}

impl EntryKind {
    /// Classify a `std::fs::FileType`.
    ///
    /// Symlinks are reported as `Other`; callers that want link targets
    /// should classify the result of `fs::metadata` instead.
    pub fn from_file_type(file_type: fs::FileType) -> Self {
        if file_type.is_dir() {
            Self::Directory
        } else if file_type.is_file() {
            Self::File
        } else {
            Self::Other
        }
    }

    /// Probe what lives at `path`, following symlinks.
    ///
    /// Returns `None` if nothing exists there. A symlink whose target is
    /// missing is reported as `Other`.
    ///
    /// # Errors
    /// - Any I/O failure other than "not found", tagged with `path`
    pub fn probe(path: &Path) -> crate::Result<Option<Self>> {
        match fs::metadata(path) {
            Ok(meta) => Ok(Some(Self::from_file_type(meta.file_type()))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                match fs::symlink_metadata(path) {
                    Ok(_) => Ok(Some(Self::Other)),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
                    Err(err) => Err(Error::fs(path, err)),
                }
            }
            Err(err) => Err(Error::fs(path, err)),
        }
    }

    pub fn is_dir(self) -> bool {
        self == Self::Directory
    }

    pub fn is_file(self) -> bool {
        self == Self::File
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// An entry of a directory tree, addressed relative to the tree root.
///
/// The same relative path resolves to the counterpart entry in any other
/// tree, which is how source entries are mapped onto the replica.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreeEntry {
    relative: PathBuf,
    kind: EntryKind,
}

impl TreeEntry {
    /// Create an entry for `path`, which must live under `root`.
    ///
    /// # Errors
    /// - `path` is not inside `root`
    pub fn new(root: &Path, path: &Path, kind: EntryKind) -> crate::Result<Self> {
        let relative = path.strip_prefix(root).map_err(|_| {
            Error::InvalidInput(format!(
                "{} is not inside {}",
                path.display(),
                root.display()
            ))
        })?;

        Ok(Self {
            relative: relative.to_path_buf(),
            kind,
        })
    }

    /// Path relative to the tree root. Empty for the root itself.
    pub fn relative(&self) -> &Path {
        &self.relative
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Check if this entry is the tree root.
    pub fn is_root(&self) -> bool {
        self.relative.as_os_str().is_empty()
    }

    /// Resolve this entry against another tree root.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        if self.is_root() {
            root.to_path_buf()
        } else {
            root.join(&self.relative)
        }
    }
}

impl fmt::Display for TreeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.relative.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn test_probe_missing() {
        let temp = TempDir::new().unwrap();
        let kind = EntryKind::probe(&temp.path().join("nope")).unwrap();
        assert_eq!(kind, None);
    }

    #[test]
    fn test_probe_file_and_dir() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.txt");
        fs::write(&file, b"x").unwrap();

        assert_eq!(EntryKind::probe(temp.path()).unwrap(), Some(EntryKind::Directory));
        assert_eq!(EntryKind::probe(&file).unwrap(), Some(EntryKind::File));
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_dangling_symlink() {
        let temp = TempDir::new().unwrap();
        let link = temp.path().join("link");
        std::os::unix::fs::symlink(temp.path().join("gone"), &link).unwrap();

        assert_eq!(EntryKind::probe(&link).unwrap(), Some(EntryKind::Other));
    }

    #[test]
    fn test_entry_outside_root_fails() {
        let result = TreeEntry::new(
            Path::new("/source"),
            Path::new("/elsewhere/a.txt"),
            EntryKind::File,
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_root_entry() {
        let entry = TreeEntry::new(Path::new("/source"), Path::new("/source"), EntryKind::Directory)
            .unwrap();
        assert!(entry.is_root());
        assert_eq!(entry.resolve(Path::new("/replica")), PathBuf::from("/replica"));
    }

    #[test]
    fn test_display() {
        let entry = TreeEntry::new(
            Path::new("/source"),
            Path::new("/source/a/b.txt"),
            EntryKind::File,
        )
        .unwrap();
        assert_eq!(entry.to_string(), format!("file {}", Path::new("a/b.txt").display()));
    }

    proptest! {
        #[test]
        fn prop_resolve_maps_between_roots(
            parts in prop::collection::vec("[a-z]{1,8}", 1..5)
        ) {
            let source = Path::new("/source");
            let replica = Path::new("/replica");
            let relative: PathBuf = parts.iter().collect();

            let entry = TreeEntry::new(source, &source.join(&relative), EntryKind::File).unwrap();

            prop_assert_eq!(entry.relative(), relative.as_path());
            prop_assert_eq!(entry.resolve(replica), replica.join(&relative));
        }
    }
}
