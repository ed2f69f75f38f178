//! Non-blocking thumbnail generation with one in-flight task per source path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;

use super::{ThumbnailCache, ThumbnailError, ThumbnailResult};

type Outcome = watch::Receiver<Option<ThumbnailResult>>;
type InFlight = Arc<Mutex<HashMap<PathBuf, Outcome>>>;

/// Handle to a pending or finished thumbnail generation.
///
/// Dropping it does not stop the work; the derivative still lands in the cache.
#[derive(Debug, Clone)]
pub struct ThumbnailTask {
    source: PathBuf,
    outcome: Outcome,
}

impl ThumbnailTask {
    fn ready(source: &Path, result: ThumbnailResult) -> Self {
        let (_tx, outcome) = watch::channel(Some(result));
        Self {
            source: source.to_path_buf(),
            outcome,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Poll without waiting.
    pub fn try_result(&self) -> Option<ThumbnailResult> {
        self.outcome.borrow().clone()
    }

    /// Wait for the derivative path or the error that prevented it.
    pub async fn join(mut self) -> ThumbnailResult {
        let finished = match self.outcome.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };

        finished.unwrap_or_else(|| {
            Err(ThumbnailError::Worker {
                path: self.source.clone(),
                message: "worker exited without a result".to_string(),
            })
        })
    }
}

/// Removes the in-flight entry once the worker is done, including when it panics.
struct InFlightGuard {
    in_flight: InFlight,
    source: PathBuf,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.source);
    }
}

/// Offloads cache misses to tokio's blocking pool.
#[derive(Clone)]
pub struct ThumbnailService {
    cache: Arc<ThumbnailCache>,
    runtime: Handle,
    in_flight: InFlight,
    spawned: Arc<AtomicUsize>,
}

impl ThumbnailService {
    pub fn new(cache: Arc<ThumbnailCache>, runtime: Handle) -> Self {
        Self {
            cache,
            runtime,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            spawned: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn cache(&self) -> &Arc<ThumbnailCache> {
        &self.cache
    }

    /// Number of generations currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Workers started since the service was created. Joined and cached requests start none.
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Start generating the derivative of `source`, or join the generation already running.
    pub fn request(&self, source: &Path) -> ThumbnailTask {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(outcome) = in_flight.get(source) {
            tracing::trace!(path = ?source, "Joining in-flight thumbnail");
            return ThumbnailTask {
                source: source.to_path_buf(),
                outcome: outcome.clone(),
            };
        }

        if let Some(path) = self.cache.lookup(source) {
            return ThumbnailTask::ready(source, Ok(path));
        }

        let (tx, outcome) = watch::channel(None);
        in_flight.insert(source.to_path_buf(), outcome.clone());
        drop(in_flight);

        let cache = Arc::clone(&self.cache);
        let guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            source: source.to_path_buf(),
        };

        self.spawned.fetch_add(1, Ordering::Relaxed);
        self.runtime.spawn_blocking(move || {
            let guard = guard;
            let result = cache.get_or_create(&guard.source);
            if let Err(ref e) = result {
                tracing::warn!(error = %e, path = ?guard.source, "Thumbnail generation failed");
            }
            tx.send_replace(Some(result));
        });

        ThumbnailTask {
            source: source.to_path_buf(),
            outcome,
        }
    }
}
