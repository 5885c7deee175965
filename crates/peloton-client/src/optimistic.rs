//! Optimistic mutations with snapshot rollback
//!
//! `MutationController::run` cancels in-flight fetches on the affected keys,
//! snapshots them, applies the optimistic write, then executes the mutation.
//! On success the affected keys are invalidated so the next read refetches.
//! On failure every key that differs from its snapshot is restored, stale
//! flag included (absent keys are removed again), before the mutation
//! fallback list runs. Keys left untouched are not rewritten.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::QueryCache;
use crate::context::ClientContext;
use crate::error::Result;
use crate::fallback::{FallbackEngine, Strategy};
use crate::metrics;
use crate::request::{ApiRequest, Call};

type ApplyFn = Box<dyn FnOnce(&mut OptimisticWrite<'_>) + Send>;

pub struct MutationDescriptor {
    pub request: ApiRequest,
    pub execute: Call,
    pub apply_optimistic: Option<ApplyFn>,
    pub invalidates: Vec<String>,
}

impl MutationDescriptor {
    pub fn new(request: ApiRequest, execute: Call) -> Self {
        Self {
            request,
            execute,
            apply_optimistic: None,
            invalidates: Vec::new(),
        }
    }

    pub fn optimistic(mut self, apply: impl FnOnce(&mut OptimisticWrite<'_>) + Send + 'static) -> Self {
        self.apply_optimistic = Some(Box::new(apply));
        self
    }

    pub fn invalidates<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invalidates.extend(keys.into_iter().map(Into::into));
        self
    }
}

/// A cache key's entry before the optimistic write touched it.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot {
    pub query_key: String,
    pub prior_value: Option<Value>,
    pub was_stale: bool,
}

/// Write handle passed to the optimistic update. Snapshots each key the
/// first time it is written.
pub struct OptimisticWrite<'a> {
    cache: &'a dyn QueryCache,
    snapshots: Vec<CacheSnapshot>,
    seen: HashSet<String>,
}

impl<'a> OptimisticWrite<'a> {
    fn new(cache: &'a dyn QueryCache) -> Self {
        Self {
            cache,
            snapshots: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn snapshot(&mut self, key: &str) {
        if self.seen.insert(key.to_string()) {
            self.snapshots.push(CacheSnapshot {
                query_key: key.to_string(),
                prior_value: self.cache.get(key),
                was_stale: self.cache.is_stale(key),
            });
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.cache.get(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.snapshot(key);
        self.cache.set(key, value);
    }

    /// Read-modify-write; returning `None` removes the entry.
    pub fn update(&mut self, key: &str, f: impl FnOnce(Option<Value>) -> Option<Value>) {
        self.snapshot(key);
        match f(self.cache.get(key)) {
            Some(value) => self.cache.set(key, value),
            None => self.cache.remove(key),
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.snapshot(key);
        self.cache.remove(key);
    }

    fn into_snapshots(self) -> Vec<CacheSnapshot> {
        self.snapshots
    }
}

pub struct MutationController {
    cache: Arc<dyn QueryCache>,
    fallback: Arc<FallbackEngine>,
}

impl MutationController {
    pub fn new(ctx: &ClientContext, fallback: Arc<FallbackEngine>) -> Self {
        Self {
            cache: ctx.cache.clone(),
            fallback,
        }
    }

    pub async fn run(&self, descriptor: MutationDescriptor) -> Result<Value> {
        let MutationDescriptor {
            request,
            execute,
            apply_optimistic,
            invalidates,
        } = descriptor;

        self.cache.cancel(&invalidates);

        let snapshots = {
            let mut write = OptimisticWrite::new(&*self.cache);
            for key in &invalidates {
                write.snapshot(key);
            }
            if let Some(apply) = apply_optimistic {
                apply(&mut write);
            }
            write.into_snapshots()
        };

        match execute().await {
            Ok(data) => {
                self.cache.invalidate(&invalidates);
                debug!(endpoint = %request.endpoint, keys = invalidates.len(), "mutation committed");
                Ok(data)
            }
            Err(error) => {
                self.rollback(&snapshots);
                warn!(endpoint = %request.endpoint, keys = snapshots.len(), "mutation failed, optimistic update rolled back");
                self.fallback
                    .handle(error, &request, &Strategy::MUTATION, execute)
                    .await
                    .map(|resolved| resolved.data)
            }
        }
    }

    fn rollback(&self, snapshots: &[CacheSnapshot]) {
        for snapshot in snapshots.iter().rev() {
            let key = &snapshot.query_key;
            if self.cache.get(key) == snapshot.prior_value
                && self.cache.is_stale(key) == snapshot.was_stale
            {
                continue;
            }
            self.cache
                .restore(key, snapshot.prior_value.clone(), snapshot.was_stale);
        }
        metrics::record_rollback();
    }
}
