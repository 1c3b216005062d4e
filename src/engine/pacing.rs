use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::playback::EngineShared;
use super::sync::{AckOutcome, CancelToken};
use crate::export::ExportError;

/// What the iteration does after a step has been paced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Cancelled,
}

/// Policy for how long the background iteration waits between publishes
#[async_trait]
pub trait PaceStrategy: Send {
    /// Called right after timepoint `index` has been published
    async fn wait_for_next_step(
        &mut self,
        index: usize,
        cancel: &CancelToken,
    ) -> Result<StepOutcome, ExportError>;

    /// Export runs never honour the loop flag
    fn is_export(&self) -> bool {
        false
    }
}

/// Interactive playback: draw ack, then the configured per-step delay
pub struct InteractivePacing {
    shared: Arc<EngineShared>,
}

impl InteractivePacing {
    pub(crate) fn new(shared: Arc<EngineShared>) -> Self {
        Self { shared }
    }
}

#[async_trait]
impl PaceStrategy for InteractivePacing {
    async fn wait_for_next_step(
        &mut self,
        _index: usize,
        cancel: &CancelToken,
    ) -> Result<StepOutcome, ExportError> {
        if self.shared.sync.wait_for_draw(cancel).await == AckOutcome::Cancelled {
            return Ok(StepOutcome::Cancelled);
        }

        // re-read every step so speed changes apply immediately
        let delay = Duration::from_millis(self.shared.play_speed_ms());
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(StepOutcome::Continue),
            _ = cancel.cancelled() => Ok(StepOutcome::Cancelled),
        }
    }
}
