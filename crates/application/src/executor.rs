use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

use elevara_core::{AppError, AppResult};

/// Bounded executor for collaborator fan-out.
///
/// At most `workers` tasks run at once; up to `max_queued` more may wait for
/// a slot. Beyond that, operations fail fast with a retriable
/// [`AppError::ResourceExhausted`] instead of queueing unboundedly.
#[derive(Clone)]
pub struct BoundedExecutor {
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    capacity: usize,
}

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl BoundedExecutor {
    /// Creates an executor with the given worker count and queue depth.
    pub fn new(workers: usize, max_queued: usize) -> AppResult<Self> {
        if workers == 0 {
            return Err(AppError::InvalidArgument(
                "executor needs at least one worker".to_owned(),
            ));
        }

        Ok(Self {
            permits: Arc::new(Semaphore::new(workers)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            capacity: workers + max_queued,
        })
    }

    /// Runs a task once a worker slot is free.
    pub async fn run<T, F>(&self, task: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>> + Send,
        T: Send,
    {
        let admitted = self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        if admitted >= self.capacity {
            return Err(AppError::ResourceExhausted(format!(
                "executor is saturated ({} tasks in flight)",
                admitted
            )));
        }

        let permit = self.permits.acquire().await.map_err(|error| {
            AppError::Internal(format!("executor semaphore closed: {error}"))
        })?;

        let result = task.await;

        drop(permit);
        drop(guard);
        result
    }
}
