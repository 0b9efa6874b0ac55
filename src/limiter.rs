//! Bounded fan-out for leaf work
//!
//! Tasks run as concurrent futures on the calling task; a semaphore keeps at
//! most `max_concurrent` of them past their permit at once. Every task
//! settles into its own [`TaskOutcome`], so one failure (or panic) never
//! cancels its siblings.

use futures::future::join_all;
use futures::FutureExt;
use log::warn;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::sync::Semaphore;

/// Settled state of one limited task.
#[derive(Debug)]
pub enum TaskOutcome<T, E> {
    Completed(T),
    Failed(E),
    Panicked(String),
}

impl<T, E> TaskOutcome<T, E> {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed(_))
    }

    pub fn completed(&self) -> Option<&T> {
        match self {
            TaskOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            TaskOutcome::Failed(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyLimiter {
    max_concurrent: usize,
}

impl ConcurrencyLimiter {
    /// A ceiling of zero is treated as one.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Runs every task and waits for all of them to settle.
    ///
    /// Outcomes are returned in input order; completion order is unconstrained.
    pub async fn run<F, T, E>(&self, tasks: Vec<F>) -> Vec<TaskOutcome<T, E>>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let semaphore = Semaphore::new(self.max_concurrent);

        let guarded = tasks.into_iter().enumerate().map(|(index, task)| {
            let semaphore = &semaphore;
            async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => return TaskOutcome::Panicked(format!("limiter closed: {}", e)),
                };

                match AssertUnwindSafe(task).catch_unwind().await {
                    Ok(Ok(value)) => TaskOutcome::Completed(value),
                    Ok(Err(error)) => {
                        warn!("[limiter] task {} failed: {}", index, error);
                        TaskOutcome::Failed(error)
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        warn!("[limiter] task {} panicked: {}", index, message);
                        TaskOutcome::Panicked(message)
                    }
                }
            }
        });

        join_all(guarded).await
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_ceiling_is_one() {
        assert_eq!(ConcurrencyLimiter::new(0).max_concurrent(), 1);
        assert_eq!(ConcurrencyLimiter::new(4).max_concurrent(), 4);
    }

    #[tokio::test]
    async fn test_outcomes_keep_input_order() {
        let limiter = ConcurrencyLimiter::new(2);
        let tasks: Vec<_> = (0..5u32)
            .map(|i| async move {
                tokio::time::sleep(std::time::Duration::from_millis((5 - i as u64) * 5)).await;
                Ok::<u32, String>(i)
            })
            .collect();

        let outcomes = limiter.run(tasks).await;
        let values: Vec<u32> = outcomes.iter().filter_map(|o| o.completed().copied()).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let limiter = ConcurrencyLimiter::new(3);
        let tasks: Vec<std::future::Ready<Result<(), String>>> = Vec::new();
        assert!(limiter.run(tasks).await.is_empty());
    }
}
