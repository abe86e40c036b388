//! Common utilities and types shared across treemirror modules.
//!
//! This module provides the error type and the tree-entry vocabulary used by
//! the sync engine and the command line front end.

pub mod error;
pub mod types;

pub use error::{Error, IoContext, Result};
pub use types::{EntryKind, TreeEntry};
