//! Outbound frame queue shared by the facade and the writer loop.
//!
//! Entries remember when they were queued so the writer can drop anything
//! that sat in the queue for too long (typically while disconnected). The
//! queue outlives individual connections: frames queued during an outage
//! are flushed by the next writer if they are still fresh.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A single queued text frame.
#[derive(Debug)]
pub struct OutboundEntry {
    queued_at: Instant,
    frame: String,
    receipt: Option<oneshot::Sender<()>>,
}

impl OutboundEntry {
    fn new(frame: String, receipt: Option<oneshot::Sender<()>>) -> Self {
        Self {
            queued_at: Instant::now(),
            frame,
            receipt,
        }
    }

    /// The encoded frame text.
    pub fn frame(&self) -> &str {
        &self.frame
    }

    /// Time spent in the queue so far.
    pub fn age(&self) -> Duration {
        self.queued_at.elapsed()
    }

    /// Whether the entry has waited at least `threshold`.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.age() >= threshold
    }

    /// Signal a waiting receipt holder that the frame hit the wire.
    pub fn mark_sent(mut self) {
        if let Some(receipt) = self.receipt.take() {
            let _ = receipt.send(());
        }
    }
}

/// Unbounded FIFO of outbound frames.
#[derive(Debug)]
pub struct OutboundQueue {
    sender: mpsc::UnboundedSender<OutboundEntry>,
    receiver: Mutex<mpsc::UnboundedReceiver<OutboundEntry>>,
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Queue a frame, stamped with the current time.
    pub fn enqueue(&self, frame: impl Into<String>) {
        // The queue owns its receiver, so sending cannot fail.
        let _ = self.sender.send(OutboundEntry::new(frame.into(), None));
    }

    /// Queue a frame and get notified once the writer has sent it.
    ///
    /// The receiver errors if the entry is dropped unsent (stale or
    /// transport failure).
    pub fn enqueue_with_receipt(&self, frame: impl Into<String>) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.sender.send(OutboundEntry::new(frame.into(), Some(tx)));
        rx
    }

    /// Wait for the next entry, or `None` once `cancel` fires.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Option<OutboundEntry> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            entry = async { self.receiver.lock().await.recv().await } => entry,
        }
    }

    /// Take the next entry without waiting, if one is ready and no writer
    /// currently holds the queue.
    pub fn try_dequeue(&self) -> Option<OutboundEntry> {
        self.receiver.try_lock().ok()?.try_recv().ok()
    }
}
