//! Per-key deduplication of concurrent backing-store calls.
//!
//! The first caller for a key spawns the producer as its own task and
//! publishes a shared handle; later callers for the same key await that
//! handle instead of producing again. The spawned task owns a guard that
//! clears the key when the producer finishes, so failures are never reused
//! and cancelling any caller (including the first) leaves the call running
//! for the others.

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;

type SharedCall<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

struct InFlightCall<V, E> {
    generation: u64,
    call: SharedCall<V, E>,
}

/// Raised to every waiter when the producer task panicked or was dropped by
/// the runtime before finishing.
#[derive(Debug, Clone, Error)]
#[error("coalesced call aborted: {reason}")]
pub struct CallAborted {
    pub reason: String,
}

/// Outcome of [`RequestCoalescer::run`].
#[derive(Debug, Clone)]
pub struct Coalesced<V, E> {
    pub result: Result<V, E>,
    /// `true` when this caller joined a call started by someone else.
    pub shared: bool,
}

pub struct RequestCoalescer<K, V, E> {
    calls: Arc<DashMap<K, InFlightCall<V, E>>>,
    next_generation: AtomicU64,
}

impl<K, V, E> RequestCoalescer<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<CallAborted> + 'static,
{
    pub fn new() -> Self {
        Self {
            calls: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Runs `producer` for `key` unless a call for `key` is already in flight,
    /// in which case the in-flight result is awaited and returned instead.
    ///
    /// `producer` is only invoked by the caller that starts a new call. The map
    /// shard lock is held for bookkeeping only and never across an await.
    pub async fn run<F, Fut>(&self, key: K, producer: F) -> Coalesced<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let (call, shared) = match self.calls.entry(key.clone()) {
            Entry::Occupied(entry) => (entry.get().call.clone(), true),
            Entry::Vacant(vacant) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let guard = InFlightGuard {
                    key,
                    generation,
                    calls: Arc::clone(&self.calls),
                };
                let work = producer();
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    work.await
                });
                let call = async move {
                    match handle.await {
                        Ok(result) => result,
                        Err(join_error) => Err(E::from(CallAborted {
                            reason: join_error.to_string(),
                        })),
                    }
                }
                .boxed()
                .shared();
                vacant.insert(InFlightCall {
                    generation,
                    call: call.clone(),
                });
                (call, false)
            }
        };

        Coalesced {
            result: call.await,
            shared,
        }
    }

    /// Number of keys with a producer currently running.
    pub fn in_flight(&self) -> usize {
        self.calls.len()
    }
}

impl<K, V, E> Default for RequestCoalescer<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<CallAborted> + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, E> fmt::Debug for RequestCoalescer<K, V, E>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCoalescer")
            .field("in_flight", &self.calls.len())
            .finish()
    }
}

struct InFlightGuard<K, V, E>
where
    K: Eq + Hash,
{
    key: K,
    generation: u64,
    calls: Arc<DashMap<K, InFlightCall<V, E>>>,
}

impl<K, V, E> Drop for InFlightGuard<K, V, E>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        let generation = self.generation;
        self.calls
            .remove_if(&self.key, |_, entry| entry.generation == generation);
    }
}
