use std::future::Future;

use futures::StreamExt;
use tracing::warn;

/// Runs independent tasks with at most `limit` in flight.
///
/// Tasks start in list order as slots free up; results come back in
/// completion order. Each task runs on its own tokio task, so a panic
/// in one is logged and dropped without disturbing the rest.
#[derive(Debug, Clone, Copy)]
pub struct TaskScheduler {
    limit: usize,
}

impl TaskScheduler {
    /// `limit` of 0 is treated as 1
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run every task to completion and collect the results of those that did not panic
    pub async fn run_all<I, F, Fut>(&self, tasks: I) -> Vec<Fut::Output>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        // `buffer_unordered` pulls the next task only when a slot is free,
        // so the spawn happens at start time, not up front.
        futures::stream::iter(tasks)
            .map(|task| tokio::spawn(task()))
            .buffer_unordered(self.limit)
            .filter_map(|joined| async move {
                match joined {
                    Ok(output) => Some(output),
                    Err(e) => {
                        warn!(error = %e, "Scheduled task did not complete");
                        None
                    }
                }
            })
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_limit_one_starts_in_list_order() {
        let started = Arc::new(Mutex::new(Vec::new()));
        let tasks = (0..6).map(|i| {
            let started = started.clone();
            move || async move {
                started.lock().push(i);
                tokio::time::sleep(Duration::from_millis(((6 - i) * 2) as u64)).await;
                i
            }
        });

        let finished = TaskScheduler::new(1).run_all(tasks).await;

        assert_eq!(*started.lock(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(finished, vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..20).map(|i| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            move || async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5 + (i % 3) as u64)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        });

        let results = TaskScheduler::new(3).run_all(tasks).await;

        assert_eq!(results.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_limit_above_task_count_runs_everything() {
        let tasks = (0..4).map(|i| move || async move { i * 10 });
        let mut results = TaskScheduler::new(64).run_all(tasks).await;
        results.sort();
        assert_eq!(results, vec![0, 10, 20, 30]);
    }

    #[tokio::test]
    async fn test_zero_limit_is_clamped() {
        let scheduler = TaskScheduler::new(0);
        assert_eq!(scheduler.limit(), 1);

        let results = scheduler.run_all((0..3).map(|i| move || async move { i })).await;
        assert_eq!(results, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_empty_task_list_completes() {
        let tasks: Vec<fn() -> std::future::Ready<()>> = Vec::new();
        let results = TaskScheduler::new(4).run_all(tasks).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_abort_others() {
        let tasks = (0..5).map(|i| {
            move || async move {
                if i == 2 {
                    panic!("probe task blew up");
                }
                i
            }
        });

        let mut results = TaskScheduler::new(2).run_all(tasks).await;
        results.sort();
        assert_eq!(results, vec![0, 1, 3, 4]);
    }
}
