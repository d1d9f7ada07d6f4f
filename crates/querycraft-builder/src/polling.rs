//! Execution status polling.
//!
//! After a query is submitted, its status is polled at a fixed interval until
//! it reaches a terminal state, the attempt bound is exceeded, or the caller
//! stops the loop. Stopping is idempotent.

use std::sync::Arc;
use std::time::Duration;

use querycraft_core::{ExecutionSettings, QueryCraftError, QueryCraftResult};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::services::{ExecutionStatus, QueryExecutionService, QueryHandle};

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The query reached a terminal status.
    Finished(ExecutionStatus),
    /// The attempt bound was exceeded.
    Timeout {
        /// Attempts made.
        attempts: u32,
    },
    /// The caller stopped the loop.
    Stopped,
}

impl PollOutcome {
    /// Converts the outcome into the final status, treating a timeout and a
    /// reported execution error as errors.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::Timeout`] on timeout and
    /// [`QueryCraftError::ServiceError`] for an execution error or a stopped
    /// loop.
    pub fn into_result(self) -> QueryCraftResult<ExecutionStatus> {
        match self {
            Self::Finished(ExecutionStatus::Error(message)) => Err(QueryCraftError::ServiceError(message)),
            Self::Finished(status) => Ok(status),
            Self::Timeout { attempts } => Err(QueryCraftError::Timeout(format!(
                "query still running after {attempts} status checks"
            ))),
            Self::Stopped => Err(QueryCraftError::ServiceError("polling stopped".to_string())),
        }
    }
}

/// Polls a submitted query's status with a bounded retry count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionPoller {
    /// Wait between status checks.
    pub interval: Duration,
    /// Status checks before giving up.
    pub max_attempts: u32,
}

impl ExecutionPoller {
    /// Creates a poller.
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Creates a poller from the execution settings.
    pub const fn from_settings(settings: &ExecutionSettings) -> Self {
        Self::new(
            Duration::from_millis(settings.poll_interval_ms),
            settings.max_poll_attempts,
        )
    }

    /// Polls until a terminal status, the attempt bound, or a stop signal.
    ///
    /// Each attempt waits one interval and then checks status. A failed
    /// status call counts as an attempt and polling continues.
    pub async fn poll(
        &self,
        service: &dyn QueryExecutionService,
        handle: &QueryHandle,
        mut stop: watch::Receiver<bool>,
    ) -> PollOutcome {
        for attempt in 1..=self.max_attempts {
            if *stop.borrow() {
                return PollOutcome::Stopped;
            }
            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                () = stopped(&mut stop) => return PollOutcome::Stopped,
            }
            match service.status(handle).await {
                Ok(status) if status.is_terminal() => {
                    debug!(%handle, attempt, ?status, "execution finished");
                    if let ExecutionStatus::Error(message) = &status {
                        warn!(%handle, error = %message, "execution failed");
                    }
                    return PollOutcome::Finished(status);
                }
                Ok(status) => debug!(%handle, attempt, ?status, "execution in progress"),
                Err(e) => warn!(%handle, attempt, error = %e, "status check failed"),
            }
        }
        warn!(%handle, attempts = self.max_attempts, "execution polling timed out");
        PollOutcome::Timeout {
            attempts: self.max_attempts,
        }
    }

    /// Polls on a background task.
    pub fn spawn(
        self,
        service: Arc<dyn QueryExecutionService>,
        handle: QueryHandle,
    ) -> PollHandle {
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move { self.poll(service.as_ref(), &handle, stop_rx).await });
        PollHandle { stop, task }
    }
}

/// Resolves once a stop is requested. Never resolves if the sender is gone.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|stopped| *stopped).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Controls a background poll loop.
#[derive(Debug)]
pub struct PollHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<PollOutcome>,
}

impl PollHandle {
    /// Stops the loop. Calling it again, or after the loop ended, does
    /// nothing.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Returns `true` once `stop` has been called.
    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Waits for the loop to end.
    ///
    /// # Errors
    ///
    /// Returns [`QueryCraftError::ServiceError`] if the poll task panicked.
    pub async fn join(self) -> QueryCraftResult<PollOutcome> {
        self.task
            .await
            .map_err(|e| QueryCraftError::ServiceError(format!("poll task failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::services::ExecutionRequest;

    #[derive(Debug)]
    struct ScriptedService {
        statuses: Mutex<VecDeque<QueryCraftResult<ExecutionStatus>>>,
        checks: Mutex<u32>,
    }

    impl ScriptedService {
        fn new(script: Vec<QueryCraftResult<ExecutionStatus>>) -> Self {
            Self {
                statuses: Mutex::new(script.into()),
                checks: Mutex::new(0),
            }
        }

        async fn checks(&self) -> u32 {
            *self.checks.lock().await
        }
    }

    #[async_trait]
    impl QueryExecutionService for ScriptedService {
        async fn submit(&self, _request: ExecutionRequest) -> QueryCraftResult<QueryHandle> {
            Ok(QueryHandle("q1".into()))
        }

        async fn status(&self, _handle: &QueryHandle) -> QueryCraftResult<ExecutionStatus> {
            *self.checks.lock().await += 1;
            self.statuses
                .lock()
                .await
                .pop_front()
                .unwrap_or(Ok(ExecutionStatus::Running))
        }
    }

    fn poller() -> ExecutionPoller {
        ExecutionPoller::new(Duration::from_millis(1000), 5)
    }

    fn handle() -> QueryHandle {
        QueryHandle("q1".into())
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_terminal_status() {
        let service = ScriptedService::new(vec![
            Ok(ExecutionStatus::Pending),
            Ok(ExecutionStatus::Running),
            Ok(ExecutionStatus::Complete),
        ]);
        let (_tx, rx) = watch::channel(false);
        let outcome = poller().poll(&service, &handle(), rx).await;
        assert_eq!(outcome, PollOutcome::Finished(ExecutionStatus::Complete));
        assert_eq!(service.checks().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_status_is_terminal() {
        let service = ScriptedService::new(vec![Ok(ExecutionStatus::Error("syntax".into()))]);
        let (_tx, rx) = watch::channel(false);
        let outcome = poller().poll(&service, &handle(), rx).await;
        assert!(matches!(
            outcome.into_result(),
            Err(QueryCraftError::ServiceError(m)) if m == "syntax"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_bound() {
        let service = ScriptedService::new(vec![]);
        let (_tx, rx) = watch::channel(false);
        let started = tokio::time::Instant::now();
        let outcome = poller().poll(&service, &handle(), rx).await;
        assert_eq!(outcome, PollOutcome::Timeout { attempts: 5 });
        assert_eq!(service.checks().await, 5);
        assert_eq!(started.elapsed(), Duration::from_millis(5000));
        assert!(matches!(outcome.into_result(), Err(QueryCraftError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_checks_count_as_attempts() {
        let service = ScriptedService::new(vec![
            Err(QueryCraftError::ServiceError("503".into())),
            Ok(ExecutionStatus::Complete),
        ]);
        let (_tx, rx) = watch::channel(false);
        let outcome = poller().poll(&service, &handle(), rx).await;
        assert_eq!(outcome, PollOutcome::Finished(ExecutionStatus::Complete));
        assert_eq!(service.checks().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let service: Arc<dyn QueryExecutionService> = Arc::new(ScriptedService::new(vec![]));
        let poll = poller().spawn(service, handle());
        tokio::time::sleep(Duration::from_millis(1500)).await;
        poll.stop();
        poll.stop();
        assert!(poll.is_stopped());
        assert_eq!(poll.join().await.unwrap(), PollOutcome::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_after_finish_is_noop() {
        let service: Arc<dyn QueryExecutionService> =
            Arc::new(ScriptedService::new(vec![Ok(ExecutionStatus::Complete)]));
        let poll = poller().spawn(service, handle());
        tokio::time::sleep(Duration::from_secs(3)).await;
        poll.stop();
        poll.stop();
        assert_eq!(
            poll.join().await.unwrap(),
            PollOutcome::Finished(ExecutionStatus::Complete)
        );
    }

    #[test]
    fn test_from_settings() {
        let p = ExecutionPoller::from_settings(&ExecutionSettings::default());
        assert_eq!(p.interval, Duration::from_millis(1000));
        assert_eq!(p.max_attempts, 30);
    }
}
