//! Flow control between the record producer and the sink.
//!
//! The sink runs in its own task and receives batches over a channel that holds at most
//! one batch. For sinks that need backpressure, every dispatch carries an ack channel:
//! the controller is `Paused` until the sink reports the write finished, and only then
//! goes back to `Running`. Sinks that buffer internally get no ack and are only slowed
//! by the channel bound.
//!
//! ```text
//! Running --dispatch--> Paused --ack--> Running
//! Running/Paused --source exhausted--> Draining --finish--> Done
//! any --sink/source error--> Failed
//! ```

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::SinkError;
use crate::sink::SinkStrategy;
use crate::types::{Batch, PipelineState};

/// Work sent to the sink task
enum SinkCommand {
    /// Persist a batch, reporting completion on `ack` when present
    Write {
        batch: Batch,
        ack: Option<oneshot::Sender<Result<(), SinkError>>>,
    },
    /// Complete the output; the task exits afterwards
    Finish,
}

/// Drives one sink and tracks the [`PipelineState`] of a run
pub struct FlowController {
    table: String,
    synchronous: bool,
    state: watch::Sender<PipelineState>,
    commands: Option<mpsc::Sender<SinkCommand>>,
    worker: Option<JoinHandle<Result<u64, SinkError>>>,
}

impl FlowController {
    /// Spawn the sink task for `sink` and start in `Running`
    pub fn start(table: impl Into<String>, sink: Box<dyn SinkStrategy>) -> Self {
        let table = table.into();
        let synchronous = sink.requires_backpressure();
        let (tx, rx) = mpsc::channel(1);
        let worker = tokio::spawn(run_sink(table.clone(), sink, rx));
        let (state, _) = watch::channel(PipelineState::Running);

        tracing::debug!(table = %table, synchronous, "sink worker started");
        Self {
            table,
            synchronous,
            state,
            commands: Some(tx),
            worker: Some(worker),
        }
    }

    /// Current state
    pub fn state(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Whether the source may be pulled right now
    pub fn can_pull(&self) -> bool {
        self.state.borrow().can_pull()
    }

    /// Whether each dispatch waits for the sink's acknowledgement
    pub fn is_synchronous(&self) -> bool {
        self.synchronous
    }

    /// Hand a batch to the sink.
    ///
    /// With a synchronous sink this returns only after the upload has been
    /// acknowledged, so no further record can be pulled in the meantime.
    ///
    /// # Errors
    ///
    /// Returns the sink's error if this (or, for asynchronous sinks, an earlier) batch
    /// failed. The controller is `Failed` afterwards.
    pub async fn dispatch(&mut self, batch: Batch) -> Result<(), SinkError> {
        let current = self.state();
        if current.is_terminal() {
            return Err(SinkError::WorkerStopped {
                reason: format!("cannot dispatch batch {} in state {current}", batch.number),
            });
        }
        let Some(commands) = self.commands.clone() else {
            return Err(self.stop("sink channel already closed").await);
        };

        let (ack, acked) = if self.synchronous {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        if self.synchronous {
            self.transition(PipelineState::Paused);
        }
        if commands.send(SinkCommand::Write { batch, ack }).await.is_err() {
            return Err(self.stop("sink worker exited").await);
        }

        if let Some(acked) = acked {
            match acked.await {
                Ok(Ok(())) => self.transition(current),
                Ok(Err(e)) => {
                    self.join_worker().await;
                    self.fail(&e);
                    return Err(e);
                }
                Err(_) => return Err(self.stop("sink worker dropped the acknowledgement").await),
            }
        }
        Ok(())
    }

    /// Source exhausted: only the final partial batch and the sink completion remain
    pub fn begin_drain(&mut self) {
        if !self.state.borrow().is_terminal() {
            self.transition(PipelineState::Draining);
        }
    }

    /// Complete the sink and return the number of objects written
    ///
    /// # Errors
    ///
    /// Returns the first error the sink reported.
    pub async fn finish(&mut self) -> Result<u64, SinkError> {
        let Some(commands) = self.commands.take() else {
            return Err(self.stop("sink channel already closed").await);
        };
        if commands.send(SinkCommand::Finish).await.is_err() {
            return Err(self.stop("sink worker exited").await);
        }
        drop(commands);

        match self.join_worker().await {
            Ok(objects) => {
                self.transition(PipelineState::Done);
                Ok(objects)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Abandon the run. The sink task aborts its output before this returns.
    pub async fn abort(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.commands = None;
        // the worker's own result is irrelevant now
        let _ = self.join_worker().await;
        tracing::warn!(table = %self.table, reason = %reason, "run aborted");
        self.transition(PipelineState::Failed(reason));
    }

    /// Close the channel, wait for the worker and turn its outcome into an error
    async fn stop(&mut self, fallback: &str) -> SinkError {
        self.commands = None;
        let error = match self.join_worker().await {
            Err(e) => e,
            Ok(_) => SinkError::WorkerStopped {
                reason: fallback.to_string(),
            },
        };
        self.fail(&error);
        error
    }

    async fn join_worker(&mut self) -> Result<u64, SinkError> {
        let Some(worker) = self.worker.take() else {
            return Err(SinkError::WorkerStopped {
                reason: "sink worker already joined".to_string(),
            });
        };
        match worker.await {
            Ok(result) => result,
            Err(e) => Err(SinkError::WorkerStopped {
                reason: e.to_string(),
            }),
        }
    }

    fn fail(&self, error: &SinkError) {
        self.transition(PipelineState::Failed(error.to_string()));
    }

    fn transition(&self, next: PipelineState) {
        self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            tracing::trace!(table = %self.table, from = %state, to = %next, "flow state");
            *state = next;
            true
        });
    }
}

/// Sink task: applies commands in order until `Finish` or a failure.
///
/// If the channel closes without a `Finish`, the run was abandoned and the sink is
/// aborted.
async fn run_sink(
    table: String,
    mut sink: Box<dyn SinkStrategy>,
    mut commands: mpsc::Receiver<SinkCommand>,
) -> Result<u64, SinkError> {
    while let Some(command) = commands.recv().await {
        match command {
            SinkCommand::Write { batch, ack } => {
                let number = batch.number;
                let records = batch.len();
                let result = sink.accept(batch).await;

                let failure = result.as_ref().err().cloned();
                if let Some(ack) = ack {
                    // the controller may already be gone
                    let _ = ack.send(result);
                }
                match failure {
                    None => {
                        tracing::debug!(table = %table, batch = number, records, "batch written");
                    }
                    Some(e) => {
                        tracing::error!(table = %table, batch = number, error = %e, "batch write failed");
                        sink.abort().await;
                        return Err(e);
                    }
                }
            }
            SinkCommand::Finish => {
                return match sink.finish().await {
                    Ok(objects) => Ok(objects),
                    Err(e) => {
                        tracing::error!(table = %table, error = %e, "sink completion failed");
                        sink.abort().await;
                        Err(e)
                    }
                };
            }
        }
    }

    sink.abort().await;
    Err(SinkError::WorkerStopped {
        reason: "run ended before the sink was finished".to_string(),
    })
}
