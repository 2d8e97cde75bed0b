use std::{any::Any, future::Future, panic::AssertUnwindSafe};

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::pipeline::{error::PipelineError, kill_switch::KillSwitch};

/// A stage of a pipeline.
///
/// `process` is called once per input item, possibly from `concurrency()` workers at the same
/// time. It reports failures by pushing them onto the kill switch, never by panicking across the
/// worker boundary. `finish` runs once after the input is drained, if the run was not killed.
#[async_trait]
pub trait DataProcessor: Send + Sync {
    async fn process(&self, data: Value, output: &mpsc::Sender<Value>, kill: &KillSwitch);

    async fn finish(&self, _output: &mpsc::Sender<Value>, _kill: &KillSwitch) {}

    fn describe(&self) -> String;

    fn concurrency(&self) -> usize {
        1
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs `work`, pushing its error, or a panic recovered as [`PipelineError::Abort`], onto `kill`.
///
/// Returns whether the work succeeded.
pub async fn run_guarded<F>(name: &str, kill: &KillSwitch, work: F) -> bool
where
    F: Future<Output = Result<(), PipelineError>> + Send,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            kill.kill(err).await;
            false
        }
        Err(panic) => {
            let message = format!("{} panicked: {}", name, panic_message(panic.as_ref()));
            kill.kill(PipelineError::Abort(message)).await;
            false
        }
    }
}

/// Sends `data` to the next stage.
pub async fn forward(output: &mpsc::Sender<Value>, data: Value) -> Result<(), PipelineError> {
    output.send(data).await.map_err(|_| PipelineError::OutputClosed)
}
