//! Content store and the derived filename snapshot

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::mirror::FileContent;

/// JSON-decoding policy applied when content is resolved.
///
/// Toggling the policy affects subsequently-resolved content only; entries
/// already in the store are never re-decoded retroactively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonPolicy {
    /// Whether matching files are decoded at all.
    pub enabled: bool,
    /// Filename suffix marking JSON files, compared case-insensitively.
    pub suffix: String,
}

impl Default for JsonPolicy {
    fn default() -> Self {
        Self { enabled: true, suffix: ".json".to_string() }
    }
}

impl JsonPolicy {
    /// Whether content resolved for `name` should be JSON-decoded.
    pub fn applies_to(&self, name: &str) -> bool {
        self.enabled && name.to_ascii_lowercase().ends_with(&self.suffix.to_ascii_lowercase())
    }
}

/// Mapping from filename to cached content, plus the mutation counter that
/// invalidates the derived filename snapshot.
///
/// The counter moves exactly once per successful add or delete, never on
/// update: updates do not change the key set.
pub struct ContentStore {
    entries: DashMap<String, FileContent>,
    mutations: AtomicU64,
    json: RwLock<JsonPolicy>,
    snapshot: Mutex<KeySnapshot>,
}

/// Lazily rebuilt, sorted view of the store's keys. Holding the previous
/// `Arc` lets unmutated calls return the identical sequence.
struct KeySnapshot {
    keys: Arc<Vec<String>>,
    seen: u64,
}

impl ContentStore {
    pub fn new(json: JsonPolicy) -> Self {
        Self {
            entries: DashMap::new(),
            mutations: AtomicU64::new(0),
            json: RwLock::new(json),
            snapshot: Mutex::new(KeySnapshot { keys: Arc::new(Vec::new()), seen: 0 }),
        }
    }

    /// Insert or overwrite an entry, returning the prior content. The
    /// mutation counter moves only when the key is new.
    pub fn upsert(&self, name: String, content: FileContent) -> Option<FileContent> {
        let prior = self.entries.insert(name, content);
        if prior.is_none() {
            self.mutations.fetch_add(1, Ordering::SeqCst);
        }
        prior
    }

    /// Remove an entry, returning its prior content. Absent keys leave the
    /// mutation counter untouched.
    pub fn remove(&self, name: &str) -> Option<FileContent> {
        let prior = self.entries.remove(name).map(|(_, content)| content);
        if prior.is_some() {
            self.mutations.fetch_add(1, Ordering::SeqCst);
        }
        prior
    }

    pub fn get(&self, name: &str) -> Option<FileContent> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Snapshot of the current decoding policy, taken once per resolution.
    pub fn json_policy(&self) -> JsonPolicy {
        self.json.read().unwrap().clone()
    }

    pub fn set_json_enabled(&self, enabled: bool) {
        self.json.write().unwrap().enabled = enabled;
    }

    /// Sorted sequence of cached filenames. Rebuilt only when the mutation
    /// counter moved since the last call; otherwise the previous sequence is
    /// returned as-is.
    pub fn filenames(&self) -> Arc<Vec<String>> {
        let current = self.mutation_count();
        let mut snapshot = self.snapshot.lock().unwrap();
        if snapshot.seen != current {
            let mut keys: Vec<String> =
                self.entries.iter().map(|entry| entry.key().clone()).collect();
            keys.sort();
            trace!("rebuilt filename snapshot ({} entries)", keys.len());
            snapshot.keys = Arc::new(keys);
            snapshot.seen = current;
        }
        snapshot.keys.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ContentStore {
        ContentStore::new(JsonPolicy::default())
    }

    #[test]
    fn test_mutation_count_moves_on_add_and_delete_only() {
        let store = store();
        assert_eq!(store.mutation_count(), 0);

        store.upsert("a.txt".to_string(), FileContent::Text("one".to_string()));
        assert_eq!(store.mutation_count(), 1);

        // Overwriting an existing key is an update, not a mutation.
        store.upsert("a.txt".to_string(), FileContent::Text("two".to_string()));
        assert_eq!(store.mutation_count(), 1);

        store.remove("a.txt");
        assert_eq!(store.mutation_count(), 2);

        // Removing an absent key changes nothing.
        store.remove("a.txt");
        assert_eq!(store.mutation_count(), 2);
    }

    #[test]
    fn test_upsert_returns_prior_content() {
        let store = store();
        assert_eq!(store.upsert("a".to_string(), FileContent::Text("1".to_string())), None);
        assert_eq!(
            store.upsert("a".to_string(), FileContent::Text("2".to_string())),
            Some(FileContent::Text("1".to_string()))
        );
    }

    #[test]
    fn test_snapshot_reused_until_mutation() {
        let store = store();
        store.upsert("b.txt".to_string(), FileContent::None);
        store.upsert("a.txt".to_string(), FileContent::None);

        let first = store.filenames();
        let second = store.filenames();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, vec!["a.txt".to_string(), "b.txt".to_string()]);

        // An update leaves the key set (and the snapshot) alone.
        store.upsert("a.txt".to_string(), FileContent::Text("x".to_string()));
        assert!(Arc::ptr_eq(&first, &store.filenames()));

        store.remove("a.txt");
        let rebuilt = store.filenames();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(*rebuilt, vec!["b.txt".to_string()]);
    }

    #[test]
    fn test_json_policy_suffix_is_case_insensitive() {
        let policy = JsonPolicy::default();
        assert!(policy.applies_to("config.json"));
        assert!(policy.applies_to("CONFIG.JSON"));
        assert!(!policy.applies_to("config.toml"));

        let disabled = JsonPolicy { enabled: false, ..JsonPolicy::default() };
        assert!(!disabled.applies_to("config.json"));
    }
}
