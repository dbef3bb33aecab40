//! Reconciliation engine and the public mirror facade
//!
//! Turns watcher notification batches into content-store mutations. Batches
//! overlap freely; application of a single filename's outcome is atomic with
//! respect to that filename, and whichever application completes last wins.
//! After `stop()` the mirror freezes: late resolutions are discarded and
//! raise no notifications.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::mirror::pipeline::{self, Candidate};
use crate::mirror::store::{ContentStore, JsonPolicy};
use crate::mirror::{
    EventHandler, EventKind, FileContent, MirrorError, MirrorEvent, MirrorState, NameFilter,
};
use crate::watch::{BatchKind, DirectoryWatcher, NotifyWatcher, SubscriptionId};

/// Construction options for a directory mirror.
#[derive(Clone)]
pub struct MirrorOptions {
    /// The single, non-recursive directory whose entries are tracked.
    pub directory: PathBuf,
    /// Admission filter, fixed for the mirror's lifetime.
    pub filter: NameFilter,
    /// Pre-bound watcher to attach to instead of creating one. Only
    /// referenced: the mirror subscribes and unsubscribes its own routes and
    /// never assumes control of the watcher's lifecycle.
    pub watcher: Option<Arc<dyn DirectoryWatcher>>,
    /// Initial JSON-decoding policy.
    pub json: JsonPolicy,
}

impl MirrorOptions {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            filter: NameFilter::All,
            watcher: None,
            json: JsonPolicy::default(),
        }
    }
}

/// In-memory mirror of a directory's files, kept current by watcher
/// notifications.
///
/// Cheap to clone; clones share the same underlying mirror.
#[derive(Clone)]
pub struct DirMirror {
    inner: Arc<MirrorInner>,
}

struct MirrorInner {
    directory: PathBuf,
    filter: NameFilter,
    store: ContentStore,
    /// Applications take the read side; `stop()` takes the write side, so no
    /// store mutation can land once the state is terminal.
    lifecycle: RwLock<MirrorState>,
    observers: Mutex<Vec<(EventKind, EventHandler)>>,
    binding: Mutex<Option<Binding>>,
    provided: Option<Arc<dyn DirectoryWatcher>>,
}

/// Attachment to the watcher: the reference, this mirror's own subscription,
/// and whether the mirror created the watcher itself.
struct Binding {
    watcher: Arc<dyn DirectoryWatcher>,
    subscription: SubscriptionId,
    owned: bool,
}

impl DirMirror {
    pub fn new(options: MirrorOptions) -> Self {
        Self {
            inner: Arc::new(MirrorInner {
                directory: options.directory,
                filter: options.filter,
                store: ContentStore::new(options.json),
                lifecycle: RwLock::new(MirrorState::Uninitialized),
                observers: Mutex::new(Vec::new()),
                binding: Mutex::new(None),
                provided: options.watcher,
            }),
        }
    }

    /// Perform the initial listing, resolve every entry, then attach to the
    /// watcher. Completes once the mirror is ready or failed; a failure
    /// leaves no partial state considered valid.
    pub async fn init(&self) -> Result<(), MirrorError> {
        self.inner.begin_init()?;
        match self.attach().await {
            Ok(()) => {
                let mut state = self.inner.lifecycle.write().unwrap();
                if *state == MirrorState::Initializing {
                    *state = MirrorState::Ready;
                    info!("Mirror ready: {} entries from {:?}", self.len(), self.inner.directory);
                }
                Ok(())
            }
            Err(error) => {
                *self.inner.lifecycle.write().unwrap() = MirrorState::Failed;
                warn!("Mirror initialization failed: {}", error);
                Err(error)
            }
        }
    }

    async fn attach(&self) -> Result<(), MirrorError> {
        let inner = &self.inner;
        let (watcher, names, owned) = match &inner.provided {
            Some(watcher) => {
                debug!("Attaching to pre-bound watcher");
                (Arc::clone(watcher), watcher.known_files(), false)
            }
            None => {
                let watcher = NotifyWatcher::start(&inner.directory)?;
                let names = list_directory(&inner.directory).await?;
                (watcher as Arc<dyn DirectoryWatcher>, names, true)
            }
        };

        // The initial listing is an ordinary add batch.
        inner.process_batch(BatchKind::Added, names).await;

        let (route, mut batches) = mpsc::unbounded_channel();
        let subscription = watcher.subscribe(route);
        *inner.binding.lock().unwrap() = Some(Binding { watcher, subscription, owned });

        let engine = Arc::clone(inner);
        tokio::spawn(async move {
            while let Some(batch) = batches.recv().await {
                // Batches overlap freely; per-name application stays atomic.
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    engine.process_batch(batch.kind, batch.names).await;
                });
            }
            trace!("Watcher route closed");
        });

        Ok(())
    }

    /// Cached content for `name`, or `None` when the name is not tracked.
    pub fn get_file(&self, name: &str) -> Option<FileContent> {
        self.inner.store.get(name)
    }

    /// Sorted sequence of cached filenames. Calling twice without an
    /// intervening add or delete returns the identical sequence.
    pub fn filenames(&self) -> Arc<Vec<String>> {
        self.inner.store.filenames()
    }

    /// Subscribe a handler for one event kind. Handlers run synchronously,
    /// in registration order, on the reconciliation path.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&MirrorEvent) + Send + Sync + 'static,
    {
        self.inner.observers.lock().unwrap().push((kind, Box::new(handler)));
    }

    /// Decode subsequently-resolved files matching the JSON suffix. Entries
    /// already cached are not re-decoded.
    pub fn enable_json_parsing(&self) {
        self.inner.store.set_json_enabled(true);
    }

    pub fn disable_json_parsing(&self) {
        self.inner.store.set_json_enabled(false);
    }

    pub fn state(&self) -> MirrorState {
        *self.inner.lifecycle.read().unwrap()
    }

    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    pub fn mutation_count(&self) -> u64 {
        self.inner.store.mutation_count()
    }

    /// Detach from the watcher and freeze the mirror. Contents remain
    /// readable; in-flight resolutions are discarded, not applied. Dispatched
    /// I/O is not cancelled. Rebinding after stop is not supported.
    pub fn stop(&self) {
        {
            let mut state = self.inner.lifecycle.write().unwrap();
            if *state == MirrorState::Stopped {
                return;
            }
            *state = MirrorState::Stopped;
        }
        if let Some(binding) = self.inner.binding.lock().unwrap().take() {
            binding.watcher.unsubscribe(binding.subscription);
            if binding.owned {
                binding.watcher.stop();
            }
        }
        debug!("Mirror stopped; contents frozen");
    }
}

impl MirrorInner {
    fn begin_init(&self) -> Result<(), MirrorError> {
        let mut state = self.lifecycle.write().unwrap();
        if *state != MirrorState::Uninitialized {
            return Err(MirrorError::AlreadyInitialized(*state));
        }
        *state = MirrorState::Initializing;
        Ok(())
    }

    async fn process_batch(&self, kind: BatchKind, names: Vec<String>) {
        match kind {
            BatchKind::Added | BatchKind::Changed => self.apply_upserts(names).await,
            BatchKind::Removed => self.apply_removals(names),
        }
    }

    /// Resolve every admitted name concurrently and fold each outcome into
    /// the store. Adds and changes share this path: the store transition
    /// (new key or existing key) decides which notification fires, which is
    /// also what turns a change for an unseen name into an add.
    async fn apply_upserts(&self, names: Vec<String>) {
        let policy = self.store.json_policy();
        let admitted: Vec<Candidate> = names
            .into_iter()
            .filter(|name| {
                let keep = self.filter.keep(name);
                if !keep {
                    trace!("Filtered out {:?}", name);
                }
                keep
            })
            .map(|name| Candidate::new(&self.directory, name))
            .collect();
        if admitted.is_empty() {
            return;
        }

        let resolutions =
            join_all(admitted.iter().map(|candidate| pipeline::resolve(candidate, &policy))).await;

        for (candidate, resolution) in admitted.into_iter().zip(resolutions) {
            match resolution {
                Ok(content) => self.apply_upsert(candidate.name, content),
                Err(error) => {
                    if self.frozen() {
                        trace!("Discarding late error for a stopped mirror");
                        continue;
                    }
                    warn!("Leaving {:?} unchanged: {}", candidate.name, error);
                    self.emit(&MirrorEvent::Error { error });
                }
            }
        }
    }

    fn apply_upsert(&self, name: String, content: FileContent) {
        let event = {
            let lifecycle = self.lifecycle.read().unwrap();
            if !accepting(*lifecycle) {
                trace!("Discarding late result for {:?}", name);
                return;
            }
            match self.store.upsert(name.clone(), content.clone()) {
                None => MirrorEvent::Added { name, content },
                Some(_) => MirrorEvent::Updated { name, content },
            }
        };
        self.emit(&event);
    }

    fn apply_removals(&self, names: Vec<String>) {
        for name in names {
            let event = {
                let lifecycle = self.lifecycle.read().unwrap();
                if !accepting(*lifecycle) {
                    trace!("Discarding late removal for {:?}", name);
                    return;
                }
                match self.store.remove(&name) {
                    Some(prior) => MirrorEvent::Deleted { name, prior },
                    None => {
                        // The watcher may repeat a deletion, or report one
                        // for a name that was filtered out.
                        trace!("Ignoring delete for untracked {:?}", name);
                        continue;
                    }
                }
            };
            self.emit(&event);
        }
    }

    fn frozen(&self) -> bool {
        !accepting(*self.lifecycle.read().unwrap())
    }

    fn emit(&self, event: &MirrorEvent) {
        let observers = self.observers.lock().unwrap();
        for (kind, handler) in observers.iter() {
            if *kind == event.kind() {
                handler(event);
            }
        }
    }
}

fn accepting(state: MirrorState) -> bool {
    matches!(state, MirrorState::Initializing | MirrorState::Ready)
}

async fn list_directory(directory: &Path) -> Result<Vec<String>, MirrorError> {
    let to_error = |source| MirrorError::List { directory: directory.to_path_buf(), source };
    let mut reader = tokio::fs::read_dir(directory).await.map_err(to_error)?;
    let mut names = Vec::new();
    while let Some(entry) = reader.next_entry().await.map_err(to_error)? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}
