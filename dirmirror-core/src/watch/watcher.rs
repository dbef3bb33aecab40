//! notify-backed directory watcher

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

use super::{BatchKind, DirectoryWatcher, SubscriptionId, WatchBatch};
use crate::mirror::MirrorError;

#[derive(Default)]
struct Routes {
    next_id: u64,
    entries: Vec<(SubscriptionId, mpsc::UnboundedSender<WatchBatch>)>,
}

/// Watches a single directory (non-recursive) through `notify` and fans
/// translated batches out to registered routes.
///
/// The `notify` handle must stay alive for events to keep flowing; it is
/// held until `stop()` drops it.
pub struct NotifyWatcher {
    directory: PathBuf,
    routes: Arc<Mutex<Routes>>,
    known: Arc<Mutex<BTreeSet<String>>>,
    handle: Mutex<Option<RecommendedWatcher>>,
}

impl NotifyWatcher {
    /// Start watching `directory`. The known-file set is seeded from a
    /// directory scan so a pre-bound watcher can report its file list.
    pub fn start(directory: &Path) -> Result<Arc<Self>, MirrorError> {
        let mut seeded = BTreeSet::new();
        let listing = std::fs::read_dir(directory).map_err(|source| MirrorError::List {
            directory: directory.to_path_buf(),
            source,
        })?;
        for entry in listing {
            let entry = entry.map_err(|source| MirrorError::List {
                directory: directory.to_path_buf(),
                source,
            })?;
            seeded.insert(entry.file_name().to_string_lossy().into_owned());
        }

        let routes = Arc::new(Mutex::new(Routes::default()));
        let known = Arc::new(Mutex::new(seeded));
        let directory = directory.to_path_buf();

        let cb_routes = routes.clone();
        let cb_known = known.clone();
        let cb_directory = directory.clone();
        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if let Some(batch) = translate_event(&cb_directory, &event) {
                        track_known(&cb_known, &batch);
                        dispatch(&cb_routes, batch);
                    }
                }
                Err(e) => error!("Watch error: {:?}", e),
            })?;
        watcher.watch(&directory, RecursiveMode::NonRecursive)?;
        info!("Watching directory: {:?}", directory);

        Ok(Arc::new(Self { directory, routes, known, handle: Mutex::new(Some(watcher)) }))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl DirectoryWatcher for NotifyWatcher {
    fn subscribe(&self, route: mpsc::UnboundedSender<WatchBatch>) -> SubscriptionId {
        let mut routes = self.routes.lock().unwrap();
        routes.next_id += 1;
        let id = routes.next_id;
        routes.entries.push((id, route));
        debug!("Route {} subscribed to {:?}", id, self.directory);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut routes = self.routes.lock().unwrap();
        routes.entries.retain(|(route_id, _)| *route_id != id);
    }

    fn known_files(&self) -> Vec<String> {
        self.known.lock().unwrap().iter().cloned().collect()
    }

    fn stop(&self) {
        if let Some(watcher) = self.handle.lock().unwrap().take() {
            drop(watcher);
            debug!("Stopped watching {:?}", self.directory);
        }
    }
}

/// Translate a notify event into a batch of directory-relative names.
fn translate_event(directory: &Path, event: &Event) -> Option<WatchBatch> {
    let kind = match event.kind {
        EventKind::Create(_) => BatchKind::Added,
        EventKind::Modify(_) => BatchKind::Changed,
        EventKind::Remove(_) => BatchKind::Removed,
        _ => return None,
    };

    let names: Vec<String> =
        event.paths.iter().filter_map(|path| relative_name(directory, path)).collect();
    if names.is_empty() {
        return None;
    }

    trace!("Translated {:?} event for {:?}", kind, names);
    Some(WatchBatch { kind, names })
}

/// Immediate entries only; nested paths belong to subdirectory trees the
/// mirror does not track.
fn relative_name(directory: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(directory).ok()?;
    let mut components = relative.components();
    let first = components.next()?;
    if components.next().is_some() {
        return None;
    }
    Some(first.as_os_str().to_string_lossy().into_owned())
}

fn track_known(known: &Mutex<BTreeSet<String>>, batch: &WatchBatch) {
    let mut known = known.lock().unwrap();
    match batch.kind {
        BatchKind::Added | BatchKind::Changed => {
            for name in &batch.names {
                known.insert(name.clone());
            }
        }
        BatchKind::Removed => {
            for name in &batch.names {
                known.remove(name);
            }
        }
    }
}

fn dispatch(routes: &Mutex<Routes>, batch: WatchBatch) {
    let mut routes = routes.lock().unwrap();
    // Routes whose receiver is gone are dropped on the way through.
    routes.entries.retain(|(_, route)| route.send(batch.clone()).is_ok());
}
