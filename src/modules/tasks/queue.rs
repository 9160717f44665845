use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

/// Bounded-concurrency worker pool, per spec.md §5 ("attachment worker
/// pool (bounded concurrency W, default 5)") and §5 "Backpressure"
/// ("Attachment pool uses a semaphore of size W"). Each submitted job
/// runs as its own task; at most `width` run concurrently.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(width: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(width.max(1))),
        }
    }

    /// Runs every job, respecting the pool's concurrency width. Returns
    /// once all jobs have completed (a poll-based caller decides how
    /// many jobs to submit per call via its own `limit` argument, not
    /// this pool).
    pub async fn run_all<F, Fut, T>(&self, jobs: Vec<F>) -> Vec<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            let permit = self.semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore not closed");
                job().await
            }));
        }
        let results = join_all(handles).await;
        results
            .into_iter()
            .map(|r| r.expect("worker task panicked"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_all_jobs_and_bounds_concurrency() {
        let pool = WorkerPool::new(2);
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<_> = (0..10)
            .map(|_| {
                let concurrent = concurrent.clone();
                let max_seen = max_seen.clone();
                move || async move {
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                    now
                }
            })
            .collect();

        let results = pool.run_all(jobs).await;
        assert_eq!(results.len(), 10);
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }
}
