//! Acknowledgement handshake between the background iteration and its
//! consumers.
//!
//! Two channels, both armed by the producer and answered by exactly one
//! consumer:
//! - draw-ack: the renderer finished applying a published timepoint
//! - capture-ack: the encoder worker finished with a captured frame
//!
//! The producer polls at a fixed interval. At most one step is in flight.
//! Every publish arms a new draw generation and only the [`DrawAck`] carrying
//! that generation can complete it, so an ack for a publish that was
//! superseded (pause, stop, seek) never releases a later step.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Result of waiting on an ack flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Acknowledged,
    Cancelled,
}

/// Shared ack state for one engine
#[derive(Debug)]
pub struct SyncProtocol {
    /// Generation of the most recent publish
    draw_armed: AtomicU64,
    /// Highest generation the renderer has acknowledged
    draw_acked: AtomicU64,
    capture_complete: AtomicBool,
    poll_interval: Duration,
}

impl SyncProtocol {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            // nothing in flight yet
            draw_armed: AtomicU64::new(0),
            draw_acked: AtomicU64::new(0),
            capture_complete: AtomicBool::new(true),
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Start a new draw generation before handing out a timepoint
    pub fn arm_draw(&self) -> u64 {
        self.draw_armed.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Complete `generation`. Returns false when a newer publish has
    /// superseded it.
    pub fn acknowledge_draw(&self, generation: u64) -> bool {
        if generation != self.draw_armed.load(Ordering::Acquire) {
            return false;
        }
        self.draw_acked.fetch_max(generation, Ordering::AcqRel);
        true
    }

    pub fn is_draw_complete(&self) -> bool {
        // a stale ack leaves draw_acked below the armed generation
        self.draw_acked.load(Ordering::Acquire) >= self.draw_armed.load(Ordering::Acquire)
    }

    /// Clear the capture flag before handing a frame to the encoder
    pub fn arm_capture(&self) {
        self.capture_complete.store(false, Ordering::Release);
    }

    pub fn acknowledge_capture(&self) {
        self.capture_complete.store(true, Ordering::Release);
    }

    pub fn is_capture_complete(&self) -> bool {
        self.capture_complete.load(Ordering::Acquire)
    }

    pub async fn wait_for_draw(&self, cancel: &CancelToken) -> AckOutcome {
        self.wait_for(|| self.is_draw_complete(), cancel).await
    }

    pub async fn wait_for_capture(&self, cancel: &CancelToken) -> AckOutcome {
        self.wait_for(|| self.is_capture_complete(), cancel).await
    }

    // No timeout: a consumer that never acks stalls the run until cancelled.
    async fn wait_for(&self, complete: impl Fn() -> bool, cancel: &CancelToken) -> AckOutcome {
        loop {
            if complete() {
                return AckOutcome::Acknowledged;
            }
            if cancel.is_cancelled() {
                return AckOutcome::Cancelled;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Handle passed to the renderer with each published timepoint.
///
/// Call [`DrawAck::acknowledge`] once the frame has been drawn. Dropping the
/// handle without acknowledging stalls playback until it is cancelled.
#[derive(Debug)]
pub struct DrawAck {
    sync: Arc<SyncProtocol>,
    index: usize,
    generation: u64,
}

impl DrawAck {
    pub(crate) fn new(sync: Arc<SyncProtocol>, index: usize, generation: u64) -> Self {
        Self {
            sync,
            index,
            generation,
        }
    }

    /// Index of the timepoint this ack releases
    pub fn index(&self) -> usize {
        self.index
    }

    /// Release the engine. Returns false when the timepoint was superseded
    /// by a later publish and the ack was ignored.
    pub fn acknowledge(self) -> bool {
        self.sync.acknowledge_draw(self.generation)
    }
}

/// Cooperative cancellation for one background run
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    /// A dropped sender counts as cancellation
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once the run is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
