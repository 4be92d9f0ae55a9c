//! Worker contract and the handle the scheduler keeps for a running worker.
//!
//! A worker runs one job on its own task. Results travel back over a
//! channel owned by the handle; the scheduler drains it without blocking
//! on every tick.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span, warn};

use super::job::MediaTask;
use crate::Result;
use crate::bus::Envelope;

/// Executes a single job.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Run `task`, pushing outbound envelopes into `results` as they become
    /// available. Errors are logged by the runtime and produce no messages.
    async fn run(&self, task: MediaTask, results: ResultSink) -> Result<()>;
}

/// Producer side of a worker's result channel.
#[derive(Clone)]
pub struct ResultSink {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ResultSink {
    /// Publish one envelope. Returns false once the handle is gone.
    pub fn push(&self, envelope: Envelope) -> bool {
        self.tx.send(envelope).is_ok()
    }

    pub fn extend(&self, envelopes: impl IntoIterator<Item = Envelope>) {
        for envelope in envelopes {
            if !self.push(envelope) {
                break;
            }
        }
    }

    /// Sink plus the receiver it feeds, for driving a worker directly.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

/// A started worker.
pub struct WorkerHandle {
    id: u64,
    name: &'static str,
    label: String,
    results: mpsc::UnboundedReceiver<Envelope>,
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Spawn `worker` on `task`. Cancelling `parent` cancels the worker too.
    pub fn start(
        id: u64,
        worker: Arc<dyn Worker>,
        task: MediaTask,
        parent: &CancellationToken,
    ) -> Self {
        let name = worker.name();
        let label = task.to_string();
        let token = parent.child_token();
        let (sink, results) = ResultSink::channel();

        let span = info_span!("worker", id, kind = name, media_id = task.media.media_id);
        let cancel = token.clone();
        let join = tokio::spawn(
            async move {
                debug!(task = %task, "Worker started");
                let run = AssertUnwindSafe(worker.run(task, sink)).catch_unwind();
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Worker cancelled");
                    }
                    outcome = run => match outcome {
                        Ok(Ok(())) => debug!("Worker finished"),
                        Ok(Err(e)) => warn!(error = %e, "Worker failed"),
                        Err(_) => error!("Worker panicked"),
                    },
                }
            }
            .instrument(span),
        );

        Self {
            id,
            name,
            label,
            results,
            token,
            join,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Take every result published so far without waiting.
    pub fn drain(&mut self) -> Vec<Envelope> {
        let mut drained = Vec::new();
        while let Ok(envelope) = self.results.try_recv() {
            drained.push(envelope);
        }
        drained
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Ask the worker to stop. A worker stops at its next await point.
    pub fn kill(&self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("task", &self.label)
            .field("finished", &self.is_finished())
            .finish()
    }
}
