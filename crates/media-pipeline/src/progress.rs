//! Ordered progress events for one URL
//!
//! Single producer, single consumer. The producer emits any number of state
//! updates followed by exactly one terminal event, then waits for the consumer
//! to acknowledge that terminal event before the channel is torn down. The
//! sender is consumed by `finish`, so no event can follow the terminal one.

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::media::Grouping;

/// Channel capacity; a slow consumer applies backpressure to the producer.
pub const PROGRESS_BUFFER: usize = 10;

/// Final result of a URL's processing.
#[derive(Debug)]
pub enum Outcome {
    /// Media ready for delivery, with the success state text.
    Delivered { grouping: Grouping, state: String },
    /// Processing failed; `state` is the human-readable error.
    Failed { state: String },
}

#[derive(Debug)]
pub enum ProgressEvent {
    State(String),
    Finished { outcome: Outcome, ack: Ack },
}

/// Acknowledgement for the terminal event. Dropping it also counts as done.
#[derive(Debug)]
pub struct Ack(oneshot::Sender<bool>);

impl Ack {
    /// Report whether the terminal event was handled successfully.
    pub fn done(self, delivered: bool) {
        let _ = self.0.send(delivered);
    }
}

/// Producing half, owned by the URL's processing task.
#[derive(Debug)]
pub struct ProgressSender {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ProgressSender {
    /// Emit an in-progress state. Lost silently if the consumer is gone.
    pub async fn state(&self, text: impl Into<String>) {
        let text = text.into();
        if self.tx.send(ProgressEvent::State(text)).await.is_err() {
            debug!("progress consumer gone, dropping state update");
        }
    }

    /// Emit the terminal event and wait until the consumer has handled it.
    ///
    /// Returns the consumer's verdict, or `false` if it went away first.
    pub async fn finish(self, outcome: Outcome) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        let event = ProgressEvent::Finished {
            outcome,
            ack: Ack(ack_tx),
        };
        if self.tx.send(event).await.is_err() {
            debug!("progress consumer gone before terminal event");
            return false;
        }
        ack_rx.await.unwrap_or(false)
    }
}

/// Consuming half, owned by the delivery task.
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::Receiver<ProgressEvent>,
}

impl ProgressReceiver {
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }
}

pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
    (ProgressSender { tx }, ProgressReceiver { rx })
}
