//! In-memory mirror of a watched directory
//!
//! This module provides the synchronized directory cache with:
//! - A content store keyed by directory-relative filename
//! - Admission filtering by pattern or caller-supplied predicate
//! - A probe-then-read pipeline tolerant of watcher races
//! - A reconciliation engine applying watcher batches to the store
//! - A lazily rebuilt snapshot of the cached filenames

pub mod engine;
pub mod filter;
pub mod pipeline;
pub mod store;

pub use engine::{DirMirror, MirrorOptions};
pub use filter::NameFilter;
pub use store::{ContentStore, JsonPolicy};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Failed to list directory {directory:?}: {source}")]
    List { directory: PathBuf, source: std::io::Error },

    #[error("Failed to start directory watcher: {0}")]
    WatcherSetup(#[from] notify::Error),

    #[error("Probe failed for {name:?}: {source}")]
    Probe { name: String, source: std::io::Error },

    #[error("Read failed for {name:?}: {source}")]
    Read { name: String, source: std::io::Error },

    #[error("Malformed JSON in {name:?}: {source}")]
    Decode { name: String, source: serde_json::Error },

    #[error("Invalid filter pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("init() called on a mirror in state {0:?}")]
    AlreadyInitialized(MirrorState),
}

/// Lifecycle of a mirror instance. `Stopped` and `Failed` are terminal;
/// a stopped mirror stays readable but frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    Uninitialized,
    Initializing,
    Ready,
    Stopped,
    Failed,
}

/// Cached representation of one directory entry.
///
/// `None` is the no-content sentinel: the name exists in the directory but
/// has no readable file content (a subdirectory, a socket, or a file that
/// vanished between notification and read).
#[derive(Debug, Clone, PartialEq)]
pub enum FileContent {
    /// Raw file text.
    Text(String),
    /// Decoded JSON document.
    Json(serde_json::Value),
    /// Present in the directory, no readable content.
    None,
}

impl FileContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FileContent::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            FileContent::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, FileContent::None)
    }
}

/// Notification raised by the reconciliation engine.
#[derive(Debug)]
pub enum MirrorEvent {
    /// A filename entered the store, carrying its resolved content.
    Added { name: String, content: FileContent },
    /// An existing entry's content was overwritten.
    Updated { name: String, content: FileContent },
    /// An entry left the store, carrying its prior content.
    Deleted { name: String, prior: FileContent },
    /// A per-file probe, read, or decode fault.
    Error { error: MirrorError },
}

impl MirrorEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MirrorEvent::Added { .. } => EventKind::Added,
            MirrorEvent::Updated { .. } => EventKind::Updated,
            MirrorEvent::Deleted { .. } => EventKind::Deleted,
            MirrorEvent::Error { .. } => EventKind::Error,
        }
    }

    /// Filename the event refers to, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            MirrorEvent::Added { name, .. }
            | MirrorEvent::Updated { name, .. }
            | MirrorEvent::Deleted { name, .. } => Some(name),
            MirrorEvent::Error { .. } => None,
        }
    }
}

/// Kinds of notifications a handler can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Added,
    Updated,
    Deleted,
    Error,
}

/// Handler invoked synchronously, in registration order, during
/// reconciliation.
pub type EventHandler = Box<dyn Fn(&MirrorEvent) + Send + Sync>;
