//! Cache: keyed by `(operation, canonical args, repo
//! state)`, with positive/negative TTLs and single-flight de-duplication of
//! concurrent identical requests, backed by a `dashmap` table with a
//! per-entry expiry and a bounded capacity evicted least-recently-used.

use crate::types::RepoStateId;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub operation: String,
    pub canonical_args: String,
    pub repo_state_id: RepoStateId,
}

impl CacheKey {
    pub fn new(operation: impl Into<String>, args: &impl Serialize, repo_state_id: RepoStateId) -> Self {
        let canonical_args = serde_json::to_string(args).unwrap_or_default();
        Self {
            operation: operation.into(),
            canonical_args,
            repo_state_id,
        }
    }
}

enum Slot {
    /// A result is being computed; waiters subscribe to the notifier.
    InFlight(Arc<Notify>),
    Ready { payload: Vec<u8>, expires_at: Instant, is_negative: bool, last_used: u64 },
}

pub struct Cache {
    entries: DashMap<CacheKey, Slot>,
    positive_ttl: Duration,
    negative_ttl: Duration,
    capacity: usize,
    clock: AtomicU64,
}

/// Outcome of `get_or_compute`: whether the value came from cache or was
/// freshly computed, used to emit `CacheHit`/`CacheMiss` observability events.
pub enum CacheOutcome<T> {
    Hit(T),
    Miss(T),
}

impl<T> CacheOutcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            CacheOutcome::Hit(v) | CacheOutcome::Miss(v) => v,
        }
    }

    pub fn was_hit(&self) -> bool {
        matches!(self, CacheOutcome::Hit(_))
    }
}

impl Cache {
    pub fn new(positive_ttl: Duration, negative_ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            positive_ttl,
            negative_ttl,
            capacity: capacity.max(1),
            clock: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Single-flight fetch: if a fresh entry exists, return it; if a
    /// computation for the same key is already in flight, wait on it instead
    /// of duplicating the work; otherwise run `compute` and publish the
    /// result for any waiters.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: CacheKey,
        compute: F,
    ) -> Result<CacheOutcome<Result<T, E>>, anyhow::Error>
    where
        T: Serialize + DeserializeOwned + Clone,
        E: Serialize + DeserializeOwned + Clone,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        loop {
            let notify = {
                match self.entries.entry(key.clone()) {
                    dashmap::mapref::entry::Entry::Occupied(mut occupied) => match occupied.get_mut() {
                        Slot::Ready { payload, expires_at, is_negative, last_used } => {
                            if *expires_at > Instant::now() {
                                let decoded: Result<T, E> = if *is_negative {
                                    Err(bincode::deserialize(payload)?)
                                } else {
                                    Ok(bincode::deserialize(payload)?)
                                };
                                *last_used = self.tick();
                                return Ok(CacheOutcome::Hit(decoded));
                            }
                            let notify = Arc::new(Notify::new());
                            occupied.insert(Slot::InFlight(notify.clone()));
                            None
                        }
                        Slot::InFlight(notify) => Some(notify.clone()),
                    },
                    dashmap::mapref::entry::Entry::Vacant(vacant) => {
                        let notify = Arc::new(Notify::new());
                        vacant.insert(Slot::InFlight(notify));
                        None
                    }
                }
            };

            if let Some(notify) = notify {
                notify.notified().await;
                continue;
            }

            let result = compute().await;
            let (payload, is_negative): (Vec<u8>, bool) = match &result {
                Ok(value) => (bincode::serialize(value)?, false),
                Err(err) => (bincode::serialize(err)?, true),
            };
            let ttl = if is_negative { self.negative_ttl } else { self.positive_ttl };
            let waiters_notify = match self.entries.get(&key) {
                Some(slot) => match slot.value() {
                    Slot::InFlight(notify) => Some(notify.clone()),
                    Slot::Ready { .. } => None,
                },
                None => None,
            };
            self.entries.insert(
                key,
                Slot::Ready {
                    payload,
                    expires_at: Instant::now() + ttl,
                    is_negative,
                    last_used: self.tick(),
                },
            );
            if let Some(notify) = waiters_notify {
                notify.notify_waiters();
            }
            self.evict_lru_if_over_capacity();
            return Ok(CacheOutcome::Miss(result));
        }
    }

    /// Evicts the single least-recently-used `Ready` entry, repeated until
    /// the table is back at capacity. In-flight slots are never evicted;
    /// capacity is a soft bound that only caps settled entries.
    fn evict_lru_if_over_capacity(&self) {
        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .filter_map(|entry| match entry.value() {
                    Slot::Ready { last_used, .. } => Some((entry.key().clone(), *last_used)),
                    Slot::InFlight(_) => None,
                })
                .min_by_key(|(_, last_used)| *last_used);
            match oldest {
                Some((key, _)) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Drop every entry whose key names `repo_state_id`, used after an
    /// ingestion job completes so stale cached answers don't outlive it.
    pub fn invalidate_repo_state(&self, repo_state_id: RepoStateId) {
        self.entries.retain(|key, _| key.repo_state_id != repo_state_id);
    }

    /// Drop every entry for `operation`, optionally narrowed to one
    /// canonicalized `args` value; with no `args`, every repo state and
    /// argument combination for that operation is dropped.
    pub fn invalidate<A: Serialize>(&self, operation: &str, args: Option<&A>) {
        let canonical_args = args.map(|a| serde_json::to_string(a).unwrap_or_default());
        self.entries.retain(|key, _| {
            if key.operation != operation {
                return true;
            }
            match &canonical_args {
                Some(wanted) => key.canonical_args != *wanted,
                None => false,
            }
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn second_call_hits_cache() {
        let cache = Cache::new(Duration::from_secs(60), Duration::from_secs(5), 100);
        let calls = Arc::new(AtomicU32::new(0));
        let key = CacheKey::new("op", &"args", RepoStateId::from_hash(1));

        let calls2 = calls.clone();
        let first: CacheOutcome<Result<u32, String>> = cache
            .get_or_compute(key.clone(), || async move {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .await
            .unwrap();
        assert!(!first.was_hit());

        let calls3 = calls.clone();
        let second: CacheOutcome<Result<u32, String>> = cache
            .get_or_compute(key, || async move {
                calls3.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .await
            .unwrap();
        assert!(second.was_hit());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn negative_entries_use_negative_ttl() {
        let cache = Cache::new(Duration::from_secs(60), Duration::from_millis(10), 100);
        let key = CacheKey::new("op", &"args", RepoStateId::from_hash(1));
        let first: CacheOutcome<Result<u32, String>> = cache
            .get_or_compute(key.clone(), || async { Err("not found".to_string()) })
            .await
            .unwrap();
        assert!(matches!(first.into_inner(), Err(_)));

        tokio::time::sleep(Duration::from_millis(20)).await;
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let second: CacheOutcome<Result<u32, String>> = cache
            .get_or_compute(key, || async move {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            })
            .await
            .unwrap();
        assert!(!second.was_hit());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_repo_state_clears_matching_keys() {
        let cache = Cache::new(Duration::from_secs(60), Duration::from_secs(5), 100);
        let key = CacheKey::new("op", &"args", RepoStateId::from_hash(7));
        let _: CacheOutcome<Result<u32, String>> = cache.get_or_compute(key, || async { Ok(1) }).await.unwrap();
        assert_eq!(cache.len(), 1);
        cache.invalidate_repo_state(RepoStateId::from_hash(7));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn invalidate_by_args_only_clears_the_matching_entry() {
        let cache = Cache::new(Duration::from_secs(60), Duration::from_secs(5), 100);
        let key_a = CacheKey::new("op", &"a", RepoStateId::from_hash(1));
        let key_b = CacheKey::new("op", &"b", RepoStateId::from_hash(1));
        let _: CacheOutcome<Result<u32, String>> = cache.get_or_compute(key_a, || async { Ok(1) }).await.unwrap();
        let _: CacheOutcome<Result<u32, String>> = cache.get_or_compute(key_b, || async { Ok(2) }).await.unwrap();
        assert_eq!(cache.len(), 2);

        cache.invalidate("op", Some(&"a"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn invalidate_with_no_args_clears_every_entry_for_the_operation() {
        let cache = Cache::new(Duration::from_secs(60), Duration::from_secs(5), 100);
        let key_a = CacheKey::new("op", &"a", RepoStateId::from_hash(1));
        let key_b = CacheKey::new("op", &"b", RepoStateId::from_hash(2));
        let other = CacheKey::new("other_op", &"a", RepoStateId::from_hash(1));
        let _: CacheOutcome<Result<u32, String>> = cache.get_or_compute(key_a, || async { Ok(1) }).await.unwrap();
        let _: CacheOutcome<Result<u32, String>> = cache.get_or_compute(key_b, || async { Ok(2) }).await.unwrap();
        let _: CacheOutcome<Result<u32, String>> = cache.get_or_compute(other, || async { Ok(3) }).await.unwrap();

        cache.invalidate::<&str>("op", None);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn capacity_overflow_evicts_the_least_recently_used_entry() {
        let cache = Cache::new(Duration::from_secs(60), Duration::from_secs(5), 2);
        let key_a = CacheKey::new("op", &"a", RepoStateId::from_hash(1));
        let key_b = CacheKey::new("op", &"b", RepoStateId::from_hash(1));
        let key_c = CacheKey::new("op", &"c", RepoStateId::from_hash(1));

        let _: CacheOutcome<Result<u32, String>> = cache.get_or_compute(key_a.clone(), || async { Ok(1) }).await.unwrap();
        let _: CacheOutcome<Result<u32, String>> = cache.get_or_compute(key_b.clone(), || async { Ok(2) }).await.unwrap();
        // touch `a` so `b` becomes the least recently used
        let _: CacheOutcome<Result<u32, String>> = cache.get_or_compute(key_a.clone(), || async { Ok(1) }).await.unwrap();
        let _: CacheOutcome<Result<u32, String>> = cache.get_or_compute(key_c.clone(), || async { Ok(3) }).await.unwrap();

        assert_eq!(cache.len(), 2);
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let b_again: CacheOutcome<Result<u32, String>> = cache
            .get_or_compute(key_b, || async move {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(2)
            })
            .await
            .unwrap();
        assert!(!b_again.was_hit(), "b should have been evicted as least-recently-used");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
