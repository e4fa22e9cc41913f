use serde_json::{Map, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::{
    client::NotebookBackend,
    metrics,
    models::{CreateExecutionRequest, Execution},
    DataSourceError, Result,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// Status fetches allowed before giving up. `None` polls until the
    /// service reports a terminal status, however long that takes.
    pub max_attempts: Option<u32>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
        }
    }
}

/// Submits a notebook execution and waits for it to finish.
///
/// Requests for one execution are strictly sequential: one submission, then
/// one status fetch at a time separated by `interval`. There is no
/// cancellation; dropping the returned future is the only way to stop.
pub struct ExecutionPoller<'a, B: NotebookBackend + ?Sized> {
    backend: &'a B,
    settings: PollSettings,
}

impl<'a, B: NotebookBackend + ?Sized> ExecutionPoller<'a, B> {
    pub fn new(backend: &'a B, settings: PollSettings) -> Self {
        Self { backend, settings }
    }

    pub async fn submit(
        &self,
        notebook_path: &str,
        parameters: Map<String, Value>,
        cache_timeout: u64,
    ) -> Result<String> {
        let request = CreateExecutionRequest {
            notebook_path: notebook_path.to_string(),
            parameters,
            result_cache_period: cache_timeout,
        };
        let id = self.backend.create_execution(&request).await?;
        metrics::record_submission();
        info!(execution = %id, notebook = %notebook_path, "submitted notebook execution");
        Ok(id)
    }

    pub async fn await_completion(&self, id: &str) -> Result<Execution> {
        let mut attempts: u32 = 0;
        loop {
            let execution = self.backend.get_execution(id).await?;
            attempts += 1;
            metrics::record_poll();

            if execution.status.is_terminal() {
                metrics::record_finished(execution.status);
                info!(execution = %id, status = %execution.status, attempts, "execution finished");
                return Ok(execution);
            }

            if self.settings.max_attempts.map_or(false, |max| attempts >= max) {
                return Err(DataSourceError::PollTimeout {
                    id: id.to_string(),
                    attempts,
                });
            }

            debug!(execution = %id, status = %execution.status, "execution not finished, waiting");
            sleep(self.settings.interval).await;
        }
    }

    /// Submit, then poll the new execution to a terminal status.
    pub async fn run(
        &self,
        notebook_path: &str,
        parameters: Map<String, Value>,
        cache_timeout: u64,
    ) -> Result<Execution> {
        let id = self.submit(notebook_path, parameters, cache_timeout).await?;
        self.await_completion(&id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{execution, MockNotebookBackend};
    use crate::models::ExecutionStatus;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn polls_until_terminal_status() {
        let backend = MockNotebookBackend::new();
        backend.script(
            "nb",
            vec![
                execution(ExecutionStatus::Queued, None),
                execution(ExecutionStatus::InProgress, None),
                execution(ExecutionStatus::Succeeded, None),
            ],
        );
        let poller = ExecutionPoller::new(&backend, PollSettings::default());

        let start = Instant::now();
        let finished = poller.await_completion("nb").await.unwrap();

        assert_eq!(finished.status, ExecutionStatus::Succeeded);
        assert_eq!(backend.fetch_count("nb"), 3);
        // two sleeps between three fetches
        let elapsed = start.elapsed();
        assert!(elapsed >= DEFAULT_POLL_INTERVAL * 2);
        assert!(elapsed < DEFAULT_POLL_INTERVAL * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_status_is_returned_not_raised() {
        let backend = MockNotebookBackend::new();
        backend.script("nb", vec![execution(ExecutionStatus::Failed, None)]);
        let poller = ExecutionPoller::new(&backend, PollSettings::default());

        let start = Instant::now();
        let finished = poller.await_completion("nb").await.unwrap();

        assert_eq!(finished.status, ExecutionStatus::Failed);
        assert!(start.elapsed() < DEFAULT_POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let backend = MockNotebookBackend::new();
        backend.script("nb", vec![execution(ExecutionStatus::Queued, None)]);
        let settings = PollSettings {
            interval: Duration::from_millis(100),
            max_attempts: Some(2),
        };
        let poller = ExecutionPoller::new(&backend, settings);

        let err = poller.await_completion("nb").await.unwrap_err();

        assert!(matches!(err, DataSourceError::PollTimeout { attempts: 2, .. }));
        assert_eq!(backend.fetch_count("nb"), 2);
    }

    #[tokio::test]
    async fn transport_error_stops_polling() {
        let backend = MockNotebookBackend::new();
        let poller = ExecutionPoller::new(&backend, PollSettings::default());

        let err = poller.await_completion("unknown").await.unwrap_err();

        assert!(matches!(err, DataSourceError::Transport { .. }));
        assert_eq!(backend.fetch_count("unknown"), 1);
    }

    #[tokio::test]
    async fn submit_sends_cache_period_and_parameters() {
        let backend = MockNotebookBackend::new();
        let poller = ExecutionPoller::new(&backend, PollSettings::default());
        let mut parameters = Map::new();
        parameters.insert("limit".to_string(), Value::from(5));

        let id = poller.submit("/nb/path", parameters, 600).await.unwrap();

        assert_eq!(id, "/nb/path");
        let submissions = backend.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].result_cache_period, 600);
        assert_eq!(submissions[0].parameters["limit"], Value::from(5));
    }

    #[tokio::test]
    async fn rejected_submission_is_a_submission_error() {
        let backend = MockNotebookBackend::new();
        backend.reject_submissions(403, "Forbidden");
        let poller = ExecutionPoller::new(&backend, PollSettings::default());

        let err = poller.submit("nb", Map::new(), 60).await.unwrap_err();

        assert!(matches!(err, DataSourceError::SubmissionError { status: 403, .. }));
        assert!(backend.submissions().is_empty());
    }
}
