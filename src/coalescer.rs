//! Per-key request coalescing
//!
//! When several requests ask for the same expensive value at once (a render,
//! a store fetch, a remote download), only the first caller becomes the
//! producer; everyone else attaches to the in-flight work and receives the
//! shared outcome. The producer runs on a detached task, so a waiter
//! hanging up never cancels work other waiters still need. Once the
//! producer finishes, the key is evicted and the next caller starts fresh.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::errors::AppError;

/// Shared outcome of a coalesced call. Errors are wrapped in `Arc` so every
/// waiter can observe the same failure.
pub type Outcome<T> = Result<T, Arc<AppError>>;

type Slot<T> = watch::Receiver<Option<Outcome<T>>>;

pub struct Coalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    inflight: Mutex<HashMap<String, Slot<T>>>,
}

impl<T> Default for Coalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Coalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `producer` for `key`, or joins the producer already running.
    pub async fn run<F>(self: &Arc<Self>, key: &str, producer: F) -> Outcome<T>
    where
        F: Future<Output = Result<T, AppError>> + Send + 'static,
    {
        let mut rx = {
            let mut inflight = self.inflight.lock();
            if let Some(rx) = inflight.get(key) {
                rx.clone()
            } else {
                let (tx, rx) = watch::channel(None);
                inflight.insert(key.to_string(), rx.clone());

                let coalescer = Arc::clone(self);
                let key = key.to_string();
                tokio::spawn(async move {
                    let outcome = match std::panic::AssertUnwindSafe(producer)
                        .catch_unwind()
                        .await
                    {
                        Ok(result) => result.map_err(Arc::new),
                        Err(_) => Err(Arc::new(AppError::internal(
                            "coalesced producer panicked",
                        ))),
                    };
                    // Evict before publishing so late arrivals start a
                    // fresh flight instead of observing the stale value.
                    coalescer.inflight.lock().remove(&key);
                    let _ = tx.send(Some(outcome));
                });

                rx
            }
        };

        let result = match rx.wait_for(|slot| slot.is_some()).await {
            Ok(slot) => slot
                .clone()
                .unwrap_or_else(|| Err(Arc::new(AppError::internal("empty coalescer slot")))),
            Err(_) => Err(Arc::new(AppError::internal(
                "coalesced producer dropped without publishing",
            ))),
        };
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_producer() {
        let coalescer = Arc::new(Coalescer::<u64>::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let coalescer = Arc::clone(&coalescer);
            let runs = Arc::clone(&runs);
            handles.push(tokio::spawn(async move {
                coalescer
                    .run("k", async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn key_is_evicted_after_completion() {
        let coalescer = Arc::new(Coalescer::<u64>::new());
        let runs = Arc::new(AtomicUsize::new(0));

        for expected in [1usize, 2] {
            let runs_inner = Arc::clone(&runs);
            let value = coalescer
                .run("k", async move {
                    Ok(runs_inner.fetch_add(1, Ordering::SeqCst) as u64)
                })
                .await
                .unwrap();
            assert_eq!(value as usize + 1, expected);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn errors_are_shared_between_waiters() {
        let coalescer = Arc::new(Coalescer::<u64>::new());

        let a = {
            let c = Arc::clone(&coalescer);
            tokio::spawn(async move {
                c.run("k", async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Err(AppError::internal("boom"))
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let b = {
            let c = Arc::clone(&coalescer);
            tokio::spawn(async move { c.run("k", async { Ok(1) }).await })
        };

        assert!(a.await.unwrap().is_err());
        assert!(b.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn caller_cancellation_does_not_cancel_producer() {
        let coalescer = Arc::new(Coalescer::<u64>::new());
        let finished = Arc::new(AtomicUsize::new(0));

        let waiter = {
            let c = Arc::clone(&coalescer);
            let finished = Arc::clone(&finished);
            tokio::spawn(async move {
                c.run("k", async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await
            })
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        waiter.abort();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);

        // The flight completed and was evicted, a new run starts cleanly
        let value = coalescer.run("k", async { Ok(9) }).await.unwrap();
        assert_eq!(value, 9);
    }

    #[tokio::test]
    async fn distinct_keys_run_independently() {
        let coalescer = Arc::new(Coalescer::<u64>::new());
        let a = coalescer.run("a", async { Ok(1) }).await.unwrap();
        let b = coalescer.run("b", async { Ok(2) }).await.unwrap();
        assert_eq!((a, b), (1, 2));
    }
}
