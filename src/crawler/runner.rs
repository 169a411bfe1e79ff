//! Bounded parallel runner.
//!
//! Tasks are admitted with a sliding window: at most `limit` are unsettled at any moment and the
//! next pending task starts as soon as any in-flight task settles. All tasks are polled from the
//! calling task, so nothing here needs `Send` and no state is shared across threads.
//!
//! Results are aligned to input order. A task reports a recoverable failure as an ordinary
//! value (e.g. `None`); only `Err` is fatal, which stops admission and drops in-flight tasks.

use crate::progress::Progress;
use futures::stream::{self, StreamExt};
use std::future::Future;

/// Default concurrency ceiling for both crawl stages.
pub const DEFAULT_CONCURRENCY: usize = 50;

/// Run `tasks` with at most `limit` in flight. `progress`, when given, is settled once per task
/// in completion order. Resolves once, after every task settled, with `result[i]` from `tasks[i]`.
pub async fn run_bounded<T, E, Fut>(
    tasks: Vec<Fut>,
    limit: usize,
    mut progress: Option<&mut Progress<'_>>,
) -> Result<Vec<T>, E>
where
    Fut: Future<Output = Result<T, E>>,
{
    let total = tasks.len();
    let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(total).collect();

    let mut settled = stream::iter(
        tasks
            .into_iter()
            .enumerate()
            .map(|(index, task)| async move { (index, task.await) }),
    )
    .buffer_unordered(limit.max(1));

    while let Some((index, result)) = settled.next().await {
        if let Some(p) = progress.as_deref_mut() {
            p.settle();
        }
        slots[index] = Some(result?);
    }

    let results: Vec<T> = slots.into_iter().flatten().collect();
    debug_assert_eq!(results.len(), total);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::tests::RecordingSink;
    use std::cell::Cell;
    use std::convert::Infallible;
    use std::time::Duration;

    /// Tracks how many tasks are running right now and the maximum ever seen.
    #[derive(Default)]
    struct Gauge {
        current: Cell<usize>,
        peak: Cell<usize>,
        started: std::cell::RefCell<Vec<usize>>,
        finished: std::cell::RefCell<Vec<usize>>,
    }

    impl Gauge {
        async fn task(&self, index: usize, delay_ms: u64) -> Result<usize, Infallible> {
            self.started.borrow_mut().push(index);
            self.current.set(self.current.get() + 1);
            self.peak.set(self.peak.get().max(self.current.get()));
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            self.current.set(self.current.get() - 1);
            self.finished.borrow_mut().push(index);
            Ok(index * 10)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn results_follow_input_order_not_completion_order() {
        let gauge = Gauge::default();
        let delays = [50, 10, 30, 5, 20];
        let tasks = delays
            .iter()
            .enumerate()
            .map(|(i, d)| gauge.task(i, *d))
            .collect();
        let results = run_bounded(tasks, 2, None).await.unwrap();
        assert_eq!(results, vec![0, 10, 20, 30, 40]);
        let finished = gauge.finished.borrow();
        let pos = |i: usize| finished.iter().position(|&f| f == i).unwrap();
        assert!(pos(3) < pos(0), "task 3 should settle before task 0");
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_limit() {
        for limit in [1, 2, 3, 7] {
            let gauge = Gauge::default();
            let tasks = (0..12)
                .map(|i| gauge.task(i, (i as u64 * 7) % 13 + 1))
                .collect();
            let results = run_bounded(tasks, limit, None).await.unwrap();
            assert_eq!(results.len(), 12);
            assert!(gauge.peak.get() <= limit, "limit {} peak {}", limit, gauge.peak.get());
            assert_eq!(gauge.peak.get(), limit);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn admits_next_task_when_any_task_settles() {
        // Task 0 is slow; with a window of 2 the remaining tasks must all run beside it
        // instead of waiting for it.
        let gauge = Gauge::default();
        let tasks = vec![
            gauge.task(0, 200),
            gauge.task(1, 5),
            gauge.task(2, 5),
            gauge.task(3, 5),
        ];
        run_bounded(tasks, 2, None).await.unwrap();
        assert_eq!(*gauge.finished.borrow(), vec![1, 2, 3, 0]);
        assert_eq!(*gauge.started.borrow(), vec![0, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn recoverable_failures_stay_in_place() {
        let tasks: Vec<_> = (0..5)
            .map(|i| async move {
                tokio::time::sleep(Duration::from_millis(5 - i as u64)).await;
                Ok::<_, Infallible>(if i % 2 == 1 { None } else { Some(i) })
            })
            .collect();
        let results = run_bounded(tasks, 3, None).await.unwrap();
        assert_eq!(results, vec![Some(0), None, Some(2), None, Some(4)]);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_stops_admission() {
        let started = Cell::new(0usize);
        let started = &started;
        let tasks: Vec<_> = (0..10)
            .map(|i| async move {
                started.set(started.get() + 1);
                tokio::time::sleep(Duration::from_millis(1)).await;
                if i == 1 {
                    Err(format!("task {} failed", i))
                } else {
                    Ok(i)
                }
            })
            .collect();
        let err = run_bounded(tasks, 2, None).await.unwrap_err();
        assert_eq!(err, "task 1 failed");
        assert!(started.get() < 10);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_settles_once_per_task() {
        let sink = RecordingSink::default();
        let mut progress = Progress::new(4, &sink);
        let tasks: Vec<_> = (0..4)
            .map(|i| async move {
                tokio::time::sleep(Duration::from_millis(4 - i as u64)).await;
                Ok::<_, Infallible>(i)
            })
            .collect();
        run_bounded(tasks, 4, Some(&mut progress)).await.unwrap();
        assert_eq!(
            *sink.updates.borrow(),
            vec![(1, 4), (2, 4), (3, 4), (4, 4)]
        );
        assert_eq!(*sink.finished.borrow(), 1);
    }

    #[tokio::test]
    async fn empty_task_list_resolves_immediately() {
        let tasks: Vec<std::future::Ready<Result<u8, Infallible>>> = Vec::new();
        assert!(run_bounded(tasks, 5, None).await.unwrap().is_empty());
    }
}
