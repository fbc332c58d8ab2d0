//! Trailing-edge debounced event queue.
//!
//! Events are pushed from any thread through [`EventBatcher::enqueue`] (or a
//! cloned [`BatchSender`]) and collected on a single tokio task. Every arrival
//! re-arms the debounce timer; once the window passes without a new event the
//! queue is flushed:
//!
//! 1. `preflush` hook
//! 2. coalescing pass over the queued events
//! 3. each event handed to the [`EventSink`], awaited one at a time, in order
//! 4. `postflush` hook
//!
//! The next window cannot start replaying before step 4 of the previous one
//! because receiving and flushing happen on the same task.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::coalesce::coalesce_batch;
use super::event::RawEvent;
use crate::error::{NoteError, Result};
use crate::state::Suspendable;

/// Receives events replayed from a flushed batch.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Applies one event. Events of a batch are handed over one at a time.
    async fn handle(&self, event: RawEvent);
}

/// Callbacks bracketing every flush.
pub trait FlushHooks: Send + Sync {
    /// Runs before the first event of a batch is replayed.
    fn preflush(&self);
    /// Runs once the last event of a batch has been replayed.
    fn postflush(&self);
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFlushHooks;

impl FlushHooks for NoopFlushHooks {
    fn preflush(&self) {}
    fn postflush(&self) {}
}

/// Suspends a set of targets for the duration of a flush.
///
/// Targets are suspended in registration order and resumed in reverse.
#[derive(Default, Clone)]
pub struct SuspensionHooks {
    targets: Vec<Arc<dyn Suspendable>>,
}

impl fmt::Debug for SuspensionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuspensionHooks")
            .field("targets", &self.targets.len())
            .finish()
    }
}

impl SuspensionHooks {
    pub fn new(targets: Vec<Arc<dyn Suspendable>>) -> Self {
        Self { targets }
    }

    pub fn with(mut self, target: Arc<dyn Suspendable>) -> Self {
        self.targets.push(target);
        self
    }
}

impl FlushHooks for SuspensionHooks {
    fn preflush(&self) {
        for target in &self.targets {
            target.suspend();
        }
    }

    fn postflush(&self) {
        for target in self.targets.iter().rev() {
            target.resume();
        }
    }
}

/// Cloneable handle for pushing events into a running [`EventBatcher`].
#[derive(Debug, Clone)]
pub struct BatchSender {
    tx: mpsc::UnboundedSender<RawEvent>,
}

impl BatchSender {
    /// Queues `event`. Fails once the batcher has stopped.
    pub fn send(&self, event: RawEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|err| NoteError::Closed(format!("event batcher stopped, dropped {}", err.0)))
    }
}

/// Debounced queue owned by a watch session.
pub struct EventBatcher {
    sender: BatchSender,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl fmt::Debug for EventBatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBatcher")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("task_finished", &self.task.is_finished())
            .finish()
    }
}

impl EventBatcher {
    /// Spawns the batching task on the current tokio runtime.
    pub fn spawn(
        window: Duration,
        sink: Arc<dyn EventSink>,
        hooks: Arc<dyn FlushHooks>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_batch_loop(rx, window, sink, hooks, cancel.clone()));

        Self {
            sender: BatchSender { tx },
            cancel,
            task,
        }
    }

    pub fn enqueue(&self, event: RawEvent) -> Result<()> {
        self.sender.send(event)
    }

    /// A handle that can be moved to the thread producing events.
    pub fn sender(&self) -> BatchSender {
        self.sender.clone()
    }

    /// Stops accepting deliveries and waits for the task to wind down.
    ///
    /// Events still waiting for their window are discarded. A flush that is
    /// already replaying runs to completion, postflush included.
    pub async fn close(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            warn!(error = %err, "event batcher task ended abnormally");
        }
    }
}

async fn run_batch_loop(
    mut rx: mpsc::UnboundedReceiver<RawEvent>,
    window: Duration,
    sink: Arc<dyn EventSink>,
    hooks: Arc<dyn FlushHooks>,
    cancel: CancellationToken,
) {
    let mut pending: Vec<RawEvent> = Vec::new();

    loop {
        let msg = if pending.is_empty() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                msg = rx.recv() => msg,
            }
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = timeout(window, rx.recv()) => match received {
                    Ok(msg) => msg,
                    Err(_) => {
                        flush(&mut pending, sink.as_ref(), hooks.as_ref()).await;
                        continue;
                    }
                },
            }
        };

        let Some(event) = msg else {
            // Every sender is gone; nothing more can arrive.
            if !pending.is_empty() {
                flush(&mut pending, sink.as_ref(), hooks.as_ref()).await;
            }
            break;
        };

        pending.push(event);
    }

    if !pending.is_empty() {
        debug!(discarded = pending.len(), "event batcher closed with queued events");
    }
}

async fn flush(pending: &mut Vec<RawEvent>, sink: &dyn EventSink, hooks: &dyn FlushHooks) {
    let queued = std::mem::take(pending);

    hooks.preflush();
    let batch = coalesce_batch(&queued);
    debug!(events = batch.len(), "flushing watch batch");
    for event in batch {
        sink.handle(event).await;
    }
    hooks.postflush();
}
