//! Core functionality for dirmirror
//!
//! This crate keeps an in-memory mirror of a single directory's files and
//! their contents, updated as the directory changes on disk. Consumers read
//! content by name without touching the filesystem; a watcher feeds the
//! reconciliation engine that keeps the mirror current.

pub mod mirror;
pub mod watch;

pub use mirror::{
    DirMirror, EventKind, FileContent, JsonPolicy, MirrorError, MirrorEvent, MirrorOptions,
    MirrorState, NameFilter,
};
pub use watch::{BatchKind, DirectoryWatcher, NotifyWatcher, WatchBatch};
