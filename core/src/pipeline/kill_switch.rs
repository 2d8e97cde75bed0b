use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::pipeline::error::PipelineError;

/// Shared cancellation signal for one pipeline run.
///
/// The first error pushed wins and is delivered to the [`KillReceiver`]; later errors are only
/// logged. Workers poll [`KillSwitch::is_killed`] before taking new work, nothing already
/// running is interrupted.
#[derive(Debug, Clone)]
pub struct KillSwitch {
    killed: Arc<AtomicBool>,
    tx: mpsc::Sender<PipelineError>,
}

#[derive(Debug)]
pub struct KillReceiver {
    rx: mpsc::Receiver<PipelineError>,
}

pub fn kill_switch() -> (KillSwitch, KillReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (KillSwitch { killed: Arc::new(AtomicBool::new(false)), tx }, KillReceiver { rx })
}

impl KillSwitch {
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    /// Pushes `err` if nothing has been pushed yet, returns whether it was the one kept.
    pub async fn kill(&self, err: PipelineError) -> bool {
        if self.killed.swap(true, Ordering::SeqCst) {
            debug!("Pipeline already cancelled, dropping error: {}", err);
            return false;
        }

        error!("Killing pipeline: {}", err);
        // capacity 1 and a single winner, so this never waits
        if self.tx.send(err).await.is_err() {
            debug!("Kill receiver dropped before the error was delivered");
        }
        true
    }
}

impl KillReceiver {
    /// The error that killed the run, if any.
    pub fn try_take(&mut self) -> Option<PipelineError> {
        self.rx.try_recv().ok()
    }

    /// Waits until the run is killed; resolves to `None` if every switch was dropped first.
    pub async fn killed(&mut self) -> Option<PipelineError> {
        self.rx.recv().await
    }
}
