//! Illustration cache with single-flight generation.
//!
//! Keys are normalised image prompts (trimmed, whitespace runs collapsed);
//! values are image data URIs. A miss installs a shared in-flight future
//! under the key before anything is awaited, so concurrent requests for the
//! same prompt all await that one generation. Successful results replace
//! the in-flight entry; failures remove it so a later request tries again.
//!
//! The cache lives as long as the [`Storybook`](crate::Storybook) that owns
//! it and is never evicted.

use crate::error::StepFailure;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

type Generation = Shared<BoxFuture<'static, Result<String, StepFailure>>>;

enum Slot {
    Ready(String),
    Pending(Generation),
}

/// Counters describing cache behaviour so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from a finished entry.
    pub hits: u64,
    /// Lookups that started a generation.
    pub misses: u64,
    /// Lookups that joined a generation already in flight.
    pub coalesced: u64,
    /// Finished entries currently stored.
    pub entries: usize,
}

#[derive(Default)]
pub struct IllustrationCache {
    slots: Mutex<HashMap<String, Slot>>,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
}

/// Cache key for `prompt`.
pub fn normalize_key(prompt: &str) -> String {
    prompt.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl IllustrationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finished entry for `prompt`, if any. Does not count as a lookup.
    pub fn get(&self, prompt: &str) -> Option<String> {
        match self.lock().get(&normalize_key(prompt)) {
            Some(Slot::Ready(image)) => Some(image.clone()),
            _ => None,
        }
    }

    /// Return the cached image for `prompt`, joining an in-flight generation
    /// or starting one with `generate` on a miss.
    ///
    /// `generate` is only called on a miss, at most once per key at a time.
    pub async fn get_or_generate<F, Fut>(&self, prompt: &str, generate: F) -> Result<String, StepFailure>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, StepFailure>> + Send + 'static,
    {
        let key = normalize_key(prompt);
        let generation = {
            let mut slots = self.lock();
            match slots.get(&key) {
                Some(Slot::Ready(image)) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!("illustration cache hit");
                    return Ok(image.clone());
                }
                Some(Slot::Pending(generation)) => {
                    self.coalesced.fetch_add(1, Ordering::Relaxed);
                    debug!("illustration cache: joining in-flight generation");
                    generation.clone()
                }
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    let generation = generate().boxed().shared();
                    slots.insert(key.clone(), Slot::Pending(generation.clone()));
                    generation
                }
            }
        };

        let result = generation.clone().await;

        // Whichever waiter finishes first settles the entry.
        let mut slots = self.lock();
        let settles = matches!(slots.get(&key), Some(Slot::Pending(g)) if g.ptr_eq(&generation));
        if settles {
            match &result {
                Ok(image) => {
                    slots.insert(key, Slot::Ready(image.clone()));
                }
                Err(_) => {
                    slots.remove(&key);
                }
            }
        }
        result
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self
            .lock()
            .values()
            .filter(|s| matches!(s, Slot::Ready(_)))
            .count();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            entries,
        }
    }

    /// Drop every finished entry. In-flight generations are kept.
    pub fn clear(&self) {
        self.lock().retain(|_, slot| matches!(slot, Slot::Pending(_)));
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
