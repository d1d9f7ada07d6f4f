//! Debounced SQL preview.
//!
//! Every structural edit publishes the new model snapshot. A background task
//! waits until no new snapshot has arrived for the quiet interval, then
//! compiles whichever snapshot is current at that moment. A burst of edits
//! therefore produces one compilation, always of the latest model.

use std::sync::Arc;
use std::time::Duration;

use querycraft_core::Settings;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::query::{CompileResult, QueryModel, SqlCompiler};

/// Recompiles a model at most once per quiet interval.
#[derive(Debug)]
pub struct PreviewDebouncer {
    models: watch::Sender<Arc<QueryModel>>,
    results: watch::Receiver<Option<Arc<CompileResult>>>,
    task: JoinHandle<()>,
}

impl PreviewDebouncer {
    /// Starts the debounce task. Must be called inside a tokio runtime.
    pub fn spawn(compiler: SqlCompiler, quiet: Duration, initial: Arc<QueryModel>) -> Self {
        let (models, model_rx) = watch::channel(initial);
        let (result_tx, results) = watch::channel(None);
        let task = tokio::spawn(run(compiler, quiet, model_rx, result_tx));
        Self {
            models,
            results,
            task,
        }
    }

    /// Starts the debounce task with the configured compiler and interval.
    pub fn from_settings(settings: &Settings, initial: Arc<QueryModel>) -> Self {
        Self::spawn(
            SqlCompiler::new(settings.compiler.clone()),
            Duration::from_millis(settings.preview.debounce_ms),
            initial,
        )
    }

    /// Publishes a new model snapshot and restarts the quiet interval.
    pub fn notify(&self, model: Arc<QueryModel>) {
        self.models.send_replace(model);
    }

    /// Subscribes to compile results.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<CompileResult>>> {
        self.results.clone()
    }

    /// The most recent compile result, if any compilation has run.
    pub fn latest(&self) -> Option<Arc<CompileResult>> {
        self.results.borrow().clone()
    }
}

impl Drop for PreviewDebouncer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    compiler: SqlCompiler,
    quiet: Duration,
    mut models: watch::Receiver<Arc<QueryModel>>,
    results: watch::Sender<Option<Arc<CompileResult>>>,
) {
    loop {
        if models.changed().await.is_err() {
            return;
        }
        loop {
            tokio::select! {
                changed = models.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                () = tokio::time::sleep(quiet) => break,
            }
        }
        let model = Arc::clone(&models.borrow_and_update());
        let result = compiler.compile(&model);
        debug!(valid = result.valid, "preview recompiled");
        results.send_replace(Some(Arc::new(result)));
    }
}
