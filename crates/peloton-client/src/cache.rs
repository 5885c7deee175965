//! Keyed query cache
//!
//! `QueryCache` is the seam the fallback engine and the mutation controller
//! talk to. `MemoryCache` is the in-process implementation: entries carry a
//! stale flag, and every change is broadcast as a `CacheEvent`.
//!
//! In-flight fetches are tracked with per-key generations. `cancel` bumps the
//! generation, and `complete_fetch` refuses to write a result that was started
//! under an older one. That is what keeps a slow read from clobbering an
//! optimistic write.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Updated { key: String },
    Removed { key: String },
    Invalidated { key: String },
    Cancelled { key: String },
}

/// Handle for one in-flight fetch, obtained before the request is issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    key: String,
    generation: u64,
}

impl FetchTicket {
    pub fn key(&self) -> &str {
        &self.key
    }
}

pub trait QueryCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value);

    fn remove(&self, key: &str);

    fn is_stale(&self, key: &str) -> bool;

    /// Put an entry back exactly as it was, stale flag included. `None`
    /// removes it.
    fn restore(&self, key: &str, value: Option<Value>, stale: bool);

    /// Mark entries stale so the next read refetches.
    fn invalidate(&self, keys: &[String]);

    /// Abandon in-flight fetches for `keys`; their results will be dropped.
    fn cancel(&self, keys: &[String]);

    fn begin_fetch(&self, key: &str) -> FetchTicket;

    /// Store a fetch result unless the fetch was cancelled meanwhile.
    /// Returns whether the value was written.
    fn complete_fetch(&self, ticket: FetchTicket, value: Value) -> bool;
}

#[derive(Debug)]
struct Entry {
    value: Value,
    stale: bool,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    generations: HashMap<String, u64>,
}

#[derive(Debug)]
pub struct MemoryCache {
    state: Mutex<State>,
    events: broadcast::Sender<CacheEvent>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(State::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Copy of every entry's value, ordered by key.
    pub fn entries(&self) -> BTreeMap<String, Value> {
        self.lock()
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: CacheEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl QueryCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        self.lock().entries.get(key).map(|e| e.value.clone())
    }

    fn set(&self, key: &str, value: Value) {
        self.lock()
            .entries
            .insert(key.to_string(), Entry { value, stale: false });
        self.emit(CacheEvent::Updated {
            key: key.to_string(),
        });
    }

    fn remove(&self, key: &str) {
        let removed = self.lock().entries.remove(key).is_some();
        if removed {
            self.emit(CacheEvent::Removed {
                key: key.to_string(),
            });
        }
    }

    fn is_stale(&self, key: &str) -> bool {
        self.lock().entries.get(key).is_some_and(|e| e.stale)
    }

    fn restore(&self, key: &str, value: Option<Value>, stale: bool) {
        let Some(value) = value else {
            self.remove(key);
            return;
        };
        self.lock()
            .entries
            .insert(key.to_string(), Entry { value, stale });
        self.emit(CacheEvent::Updated {
            key: key.to_string(),
        });
    }

    fn invalidate(&self, keys: &[String]) {
        let mut marked = Vec::new();
        {
            let mut state = self.lock();
            for key in keys {
                if let Some(entry) = state.entries.get_mut(key) {
                    entry.stale = true;
                    marked.push(key.clone());
                }
            }
        }
        for key in marked {
            self.emit(CacheEvent::Invalidated { key });
        }
    }

    fn cancel(&self, keys: &[String]) {
        {
            let mut state = self.lock();
            for key in keys {
                *state.generations.entry(key.clone()).or_default() += 1;
            }
        }
        for key in keys {
            self.emit(CacheEvent::Cancelled { key: key.clone() });
        }
    }

    fn begin_fetch(&self, key: &str) -> FetchTicket {
        let generation = self.lock().generations.get(key).copied().unwrap_or(0);
        FetchTicket {
            key: key.to_string(),
            generation,
        }
    }

    fn complete_fetch(&self, ticket: FetchTicket, value: Value) -> bool {
        {
            let mut state = self.lock();
            let current = state.generations.get(&ticket.key).copied().unwrap_or(0);
            if current != ticket.generation {
                debug!(key = %ticket.key, "dropping result of cancelled fetch");
                return false;
            }
            state
                .entries
                .insert(ticket.key.clone(), Entry { value, stale: false });
        }
        self.emit(CacheEvent::Updated { key: ticket.key });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn set_get_remove() {
        let cache = MemoryCache::new();
        assert!(cache.get("cols").is_none());

        cache.set("cols", json!([{"id": 1}]));
        assert_eq!(cache.get("cols"), Some(json!([{"id": 1}])));
        assert_eq!(cache.len(), 1);

        cache.remove("cols");
        assert!(cache.get("cols").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_marks_stale_but_keeps_value() {
        let cache = MemoryCache::new();
        cache.set("activities", json!([]));
        cache.invalidate(&keys(&["activities", "missing"]));

        assert!(cache.is_stale("activities"));
        assert!(!cache.is_stale("missing"));
        assert_eq!(cache.get("activities"), Some(json!([])));

        cache.set("activities", json!([1]));
        assert!(!cache.is_stale("activities"));
    }

    #[test]
    fn restore_keeps_stale_flag() {
        let cache = MemoryCache::new();
        cache.restore("activities", Some(json!([1])), true);
        assert!(cache.is_stale("activities"));
        assert_eq!(cache.get("activities"), Some(json!([1])));

        cache.restore("activities", None, false);
        assert!(cache.get("activities").is_none());
    }

    #[test]
    fn cancelled_fetch_cannot_overwrite() {
        let cache = MemoryCache::new();
        let ticket = cache.begin_fetch("activities:7");

        cache.cancel(&keys(&["activities:7"]));
        cache.set("activities:7", json!({"title": "optimistic"}));

        assert!(!cache.complete_fetch(ticket, json!({"title": "old"})));
        assert_eq!(cache.get("activities:7"), Some(json!({"title": "optimistic"})));
    }

    #[test]
    fn uncancelled_fetch_writes() {
        let cache = MemoryCache::new();
        let ticket = cache.begin_fetch("cols");
        assert_eq!(ticket.key(), "cols");
        assert!(cache.complete_fetch(ticket, json!([1, 2])));
        assert_eq!(cache.get("cols"), Some(json!([1, 2])));

        // Tickets taken after a cancel are valid again
        cache.cancel(&keys(&["cols"]));
        let ticket = cache.begin_fetch("cols");
        assert!(cache.complete_fetch(ticket, json!([3])));
    }

    #[test]
    fn entries_are_sorted_snapshot() {
        let cache = MemoryCache::new();
        cache.set("b", json!(2));
        cache.set("a", json!(1));
        let entries: Vec<_> = cache.entries().into_keys().collect();
        assert_eq!(entries, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn events_are_broadcast() {
        let cache = MemoryCache::new();
        let mut rx = cache.subscribe();

        cache.set("cols", json!([]));
        cache.invalidate(&keys(&["cols"]));
        cache.cancel(&keys(&["cols"]));
        cache.remove("cols");
        cache.remove("cols");

        assert_eq!(rx.recv().await.unwrap(), CacheEvent::Updated { key: "cols".into() });
        assert_eq!(rx.recv().await.unwrap(), CacheEvent::Invalidated { key: "cols".into() });
        assert_eq!(rx.recv().await.unwrap(), CacheEvent::Cancelled { key: "cols".into() });
        assert_eq!(rx.recv().await.unwrap(), CacheEvent::Removed { key: "cols".into() });
        assert!(rx.try_recv().is_err());
    }
}
