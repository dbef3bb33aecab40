//! Boundary to the filesystem-watching collaborator
//!
//! The mirror consumes a watcher as a black box emitting add/change/delete
//! batches of directory-relative filenames. The watcher is either created
//! internally during initialization or injected by the caller; an injected
//! watcher is only referenced, and stopping the mirror detaches exactly the
//! routes the mirror registered.

pub mod watcher;

pub use watcher::NotifyWatcher;

use tokio::sync::mpsc;

/// Kind of change reported by one watcher notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Added,
    Changed,
    Removed,
}

/// A set of filenames reported together by one notification event.
#[derive(Debug, Clone)]
pub struct WatchBatch {
    pub kind: BatchKind,
    /// Directory-relative filenames; never empty.
    pub names: Vec<String>,
}

/// Identifier of a route registered with [`DirectoryWatcher::subscribe`].
pub type SubscriptionId = u64;

/// Contract with the external watcher.
pub trait DirectoryWatcher: Send + Sync {
    /// Register a channel receiving change batches; returns an id for
    /// detaching that route and no other.
    fn subscribe(&self, route: mpsc::UnboundedSender<WatchBatch>) -> SubscriptionId;

    /// Remove a previously registered route. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Filenames the watcher currently knows to exist in the directory.
    /// Used as the initial listing when the watcher is injected pre-bound.
    fn known_files(&self) -> Vec<String>;

    /// Tear the watcher itself down.
    fn stop(&self);
}
