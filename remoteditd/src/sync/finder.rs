use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use remotedit_core::{Connector, ConnectorError, EntryType};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::paths;

const EVENT_CAPACITY: usize = 64;
/// Emit an `Indexing` snapshot after at least this many new items.
const INDEX_BATCH: usize = 200;

#[derive(Debug, Error)]
pub enum FinderError {
    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    File,
    Dir,
}

impl ItemType {
    pub fn from_entry_type(entry_type: EntryType) -> Option<Self> {
        match entry_type {
            EntryType::File => Some(ItemType::File),
            EntryType::Dir => Some(ItemType::Dir),
            EntryType::Link => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinderItem {
    pub relative_path: String,
    pub size: u64,
    pub item_type: ItemType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinderEvent {
    /// Partial index while a walk is still running.
    Indexing(Vec<FinderItem>),
    /// An incremental mutation changed the index.
    Updated(Vec<FinderItem>),
    Finished(Vec<FinderItem>),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Empty,
    Loading,
    Loaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Index was already complete; nothing was listed.
    Cached,
    /// Another walk is running and will deliver the events.
    AlreadyRunning,
    Indexed(usize),
    /// A newer load or an invalidation replaced this walk.
    Superseded,
}

#[derive(Debug)]
struct FinderState {
    items: BTreeMap<String, FinderItem>,
    load: LoadState,
    generation: u64,
}

/// Returns a walk that was dropped before finishing to `Empty`, so the next
/// load starts over instead of reporting `AlreadyRunning` forever.
struct WalkGuard<'a> {
    state: &'a Mutex<FinderState>,
    generation: u64,
}

impl Drop for WalkGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state.generation == self.generation && state.load == LoadState::Loading {
            state.load = LoadState::Empty;
            state.items.clear();
        }
    }
}

/// Flat index of a server's entire remote tree, keyed by canonical path
/// relative to the server base.
pub struct FinderCache {
    server: String,
    base: String,
    connector: Arc<dyn Connector>,
    state: Mutex<FinderState>,
    events: broadcast::Sender<FinderEvent>,
}

impl FinderCache {
    pub fn new(server: impl Into<String>, base: &str, connector: Arc<dyn Connector>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            server: server.into(),
            base: paths::canonical(base),
            connector,
            state: Mutex::new(FinderState {
                items: BTreeMap::new(),
                load: LoadState::Empty,
                generation: 0,
            }),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FinderEvent> {
        self.events.subscribe()
    }

    pub fn load_state(&self) -> LoadState {
        self.state.lock().load
    }

    pub fn spawn_load(
        self: &Arc<Self>,
        force_reindex: bool,
    ) -> JoinHandle<Result<LoadOutcome, FinderError>> {
        let cache = Arc::clone(self);
        tokio::spawn(async move { cache.load(force_reindex).await })
    }

    /// Walks the remote tree breadth-first, emitting progressive events.
    ///
    /// Returns immediately with [`LoadOutcome::Cached`] when the index is
    /// complete and `force_reindex` is false. A forced load restarts any
    /// walk in flight.
    pub async fn load(&self, force_reindex: bool) -> Result<LoadOutcome, FinderError> {
        let generation = {
            let mut state = self.state.lock();
            match state.load {
                LoadState::Loaded if !force_reindex => {
                    let snapshot = state.items.values().cloned().collect();
                    drop(state);
                    self.emit(FinderEvent::Finished(snapshot));
                    return Ok(LoadOutcome::Cached);
                }
                LoadState::Loading if !force_reindex => return Ok(LoadOutcome::AlreadyRunning),
                _ => {}
            }
            state.generation += 1;
            state.load = LoadState::Loading;
            state.items.clear();
            state.generation
        };
        let _walk = WalkGuard {
            state: &self.state,
            generation,
        };
        info!(server = %self.server, base = %self.base, "finder index started");

        let mut pending = VecDeque::from([String::from("/")]);
        let mut since_emit = 0usize;
        while let Some(dir) = pending.pop_front() {
            let remote = paths::remote_for(&self.base, &dir);
            let listing = match self.connector.list_directory(&remote).await {
                Ok(listing) => listing,
                Err(err) => {
                    {
                        let mut state = self.state.lock();
                        if state.generation != generation {
                            return Ok(LoadOutcome::Superseded);
                        }
                        state.load = LoadState::Empty;
                    }
                    warn!(server = %self.server, dir = %remote, error = %err, "finder index failed");
                    self.emit(FinderEvent::Error(err.to_string()));
                    return Err(err.into());
                }
            };

            let mut batch = Vec::with_capacity(listing.len());
            for entry in listing {
                if entry.is_dot_entry() {
                    continue;
                }
                let Some(item_type) = ItemType::from_entry_type(entry.entry_type) else {
                    continue;
                };
                let relative_path = paths::canonical(&paths::join(&dir, &entry.name));
                if item_type == ItemType::Dir {
                    pending.push_back(relative_path.clone());
                }
                batch.push(FinderItem {
                    relative_path,
                    size: if item_type == ItemType::File { entry.size } else { 0 },
                    item_type,
                });
            }

            since_emit += batch.len();
            let snapshot = {
                let mut state = self.state.lock();
                if state.generation != generation {
                    debug!(server = %self.server, "finder walk superseded");
                    return Ok(LoadOutcome::Superseded);
                }
                for item in batch {
                    state.items.insert(item.relative_path.clone(), item);
                }
                if since_emit >= INDEX_BATCH {
                    since_emit = 0;
                    Some(state.items.values().cloned().collect::<Vec<_>>())
                } else {
                    None
                }
            };
            if let Some(snapshot) = snapshot {
                self.emit(FinderEvent::Indexing(snapshot));
            }
        }

        let snapshot: Vec<FinderItem> = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return Ok(LoadOutcome::Superseded);
            }
            state.load = LoadState::Loaded;
            state.items.values().cloned().collect()
        };
        let count = snapshot.len();
        info!(server = %self.server, items = count, "finder index finished");
        self.emit(FinderEvent::Finished(snapshot));
        Ok(LoadOutcome::Indexed(count))
    }

    /// Drops the index and stops any walk in flight.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.load = LoadState::Empty;
        state.items.clear();
    }

    pub fn add_file(&self, path: &str, size: u64) {
        self.mutate(|items| {
            let key = paths::canonical(path);
            items.insert(
                key.clone(),
                FinderItem {
                    relative_path: key,
                    size,
                    item_type: ItemType::File,
                },
            );
        });
    }

    pub fn add_directory(&self, path: &str) {
        self.mutate(|items| {
            let key = paths::canonical(path);
            items.insert(
                key.clone(),
                FinderItem {
                    relative_path: key,
                    size: 0,
                    item_type: ItemType::Dir,
                },
            );
        });
    }

    pub fn delete_file(&self, path: &str) {
        self.mutate(|items| {
            items.remove(&paths::canonical(path));
        });
    }

    /// Removes the directory and everything indexed below it.
    pub fn delete_directory(&self, path: &str) {
        self.mutate(|items| {
            for key in keys_within(items, &paths::canonical(path)) {
                items.remove(&key);
            }
        });
    }

    pub fn rename_file(&self, old_path: &str, new_path: &str, size: u64) {
        self.mutate(|items| {
            items.remove(&paths::canonical(old_path));
            let key = paths::canonical(new_path);
            items.insert(
                key.clone(),
                FinderItem {
                    relative_path: key,
                    size,
                    item_type: ItemType::File,
                },
            );
        });
    }

    /// Moves the directory entry and rewrites the prefix of every descendant.
    pub fn rename_directory(&self, old_path: &str, new_path: &str) {
        self.mutate(|items| {
            let old = paths::canonical(old_path);
            let new = paths::canonical(new_path);
            let moved: Vec<FinderItem> = keys_within(items, &old)
                .into_iter()
                .filter_map(|key| items.remove(&key))
                .collect();
            for mut item in moved {
                if let Some(rebased) = paths::rebase(&item.relative_path, &old, &new) {
                    item.relative_path = rebased;
                    items.insert(item.relative_path.clone(), item);
                }
            }
            items.entry(new.clone()).or_insert(FinderItem {
                relative_path: new,
                size: 0,
                item_type: ItemType::Dir,
            });
        });
    }

    pub fn get(&self, path: &str) -> Option<FinderItem> {
        self.state.lock().items.get(&paths::canonical(path)).cloned()
    }

    pub fn items(&self) -> Vec<FinderItem> {
        self.state.lock().items.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Indexed files whose path contains the query's characters in order,
    /// ignoring case; shortest paths first.
    pub fn search(&self, query: &str, limit: usize) -> Vec<FinderItem> {
        let needle: Vec<char> = query
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let mut hits: Vec<FinderItem> = self
            .state
            .lock()
            .items
            .values()
            .filter(|item| item.item_type == ItemType::File)
            .filter(|item| is_subsequence(&needle, &item.relative_path.to_lowercase()))
            .cloned()
            .collect();
        hits.sort_by(|a, b| {
            a.relative_path
                .len()
                .cmp(&b.relative_path.len())
                .then_with(|| a.relative_path.cmp(&b.relative_path))
        });
        hits.truncate(limit);
        hits
    }

    fn mutate(&self, apply: impl FnOnce(&mut BTreeMap<String, FinderItem>)) {
        let snapshot = {
            let mut state = self.state.lock();
            apply(&mut state.items);
            state.items.values().cloned().collect()
        };
        self.emit(FinderEvent::Updated(snapshot));
    }

    fn emit(&self, event: FinderEvent) {
        let _ = self.events.send(event);
    }
}

fn keys_within(items: &BTreeMap<String, FinderItem>, dir: &str) -> Vec<String> {
    items
        .range(dir.to_string()..)
        .take_while(|(key, _)| key.starts_with(dir))
        .filter(|(key, _)| paths::is_within(dir, key))
        .map(|(key, _)| key.clone())
        .collect()
}

fn is_subsequence(needle: &[char], haystack: &str) -> bool {
    let mut wanted = needle.iter().peekable();
    for ch in haystack.chars() {
        if wanted.peek().is_some_and(|c| **c == ch) {
            wanted.next();
        }
    }
    wanted.peek().is_none()
}

#[cfg(test)]
#[path = "finder_tests.rs"]
mod tests;
