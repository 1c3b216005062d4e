//! Video export: the playback iteration with a capture step gated by the
//! capture ack.
//!
//! The encoder is opened before the run starts and handed to a blocking
//! worker which closes it exactly once however the run ends. With a camera
//! overlay attached the trace is played twice (overview, then detail) into
//! the same encoder.

use async_trait::async_trait;
use crossbeam_channel::Sender;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};

use super::encoder::EncoderWorker;
use super::job::{frames_per_pass, is_capture_index};
use super::{EncodedFrame, ExportError, ExportOutcome, ExportProgress, ExportReport, VideoJob};
use crate::engine::pacing::{PaceStrategy, StepOutcome};
use crate::engine::playback::{run_iteration, ActiveRun, EngineShared, RunKind, RunOutcome};
use crate::engine::sync::{AckOutcome, CancelToken, SyncProtocol};
use crate::engine::{PlaybackEngine, PlaybackMode};
use crate::render::Renderer;

/// Export pacing: draw ack, then on capture indices a capture handed to the
/// encoder worker and its capture ack
pub(crate) struct ExportPacing {
    sync: Arc<SyncProtocol>,
    renderer: Arc<dyn Renderer>,
    worker: EncoderWorker,
    width_px: u32,
    height_px: u32,
    ms_per_frame: u64,
    capture_stride: usize,
    progress: Option<Sender<ExportProgress>>,
    captured: usize,
    total: usize,
}

impl ExportPacing {
    fn encoding_error(&self, fallback: impl std::fmt::Display) -> ExportError {
        ExportError::Encoding(self.worker.failure().unwrap_or_else(|| fallback.to_string()))
    }
}

#[async_trait]
impl PaceStrategy for ExportPacing {
    async fn wait_for_next_step(
        &mut self,
        index: usize,
        cancel: &CancelToken,
    ) -> Result<StepOutcome, ExportError> {
        if self.sync.wait_for_draw(cancel).await == AckOutcome::Cancelled {
            return Ok(StepOutcome::Cancelled);
        }
        if !is_capture_index(index, self.capture_stride) {
            return Ok(StepOutcome::Continue);
        }

        let image = self
            .renderer
            .capture_frame(self.width_px, self.height_px)
            .map_err(|e| ExportError::Capture(format!("{:#}", e)))?;
        let frame = EncodedFrame {
            frame_number: self.captured,
            pts_ms: self.captured as u64 * self.ms_per_frame,
            image,
        };

        self.sync.arm_capture();
        if let Err(e) = self.worker.submit(frame) {
            return Err(self.encoding_error(format!("{:#}", e)));
        }
        if self.sync.wait_for_capture(cancel).await == AckOutcome::Cancelled {
            return Ok(StepOutcome::Cancelled);
        }
        if self.worker.failure().is_some() {
            return Err(self.encoding_error("encoder failed"));
        }

        self.captured += 1;
        let progress = ExportProgress::new(self.captured, self.total);
        debug!(
            "Captured frame {}/{} ({:.0}%)",
            progress.captured, progress.total, progress.percent
        );
        if let Some(tx) = &self.progress {
            let _ = tx.try_send(progress);
        }
        Ok(StepOutcome::Continue)
    }

    fn is_export(&self) -> bool {
        true
    }
}

/// Handle to a running export
#[derive(Debug)]
pub struct ExportHandle {
    total_frames: usize,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancelled_by_handle: Arc<AtomicBool>,
    result_rx: oneshot::Receiver<Result<ExportReport, ExportError>>,
}

impl ExportHandle {
    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// Cancel without going through the engine. The engine ends up stopped
    /// at the cancelled timepoint, as with `cancel_export`.
    pub fn cancel(&self) {
        self.cancelled_by_handle.store(true, Ordering::Release);
        let _ = self.cancel_tx.send(true);
    }

    /// Wait for the export to end. The encoder is closed by the time this
    /// returns.
    pub async fn wait(self) -> Result<ExportReport, ExportError> {
        self.result_rx
            .await
            .map_err(|_| ExportError::Aborted("export task ended without a result".into()))?
    }
}

async fn run_export(
    shared: Arc<EngineShared>,
    cancel: CancelToken,
    cancelled_by_handle: Arc<AtomicBool>,
    mut pacing: ExportPacing,
    result_tx: oneshot::Sender<Result<ExportReport, ExportError>>,
) {
    let outcome = run_iteration(shared.clone(), 0, cancel, &mut pacing).await;

    let frames_captured = pacing.captured;
    let mut total_frames = pacing.total;
    let closed = pacing.worker.finish().await;

    // an overlay the renderer never drove ends after one pass
    if matches!(outcome, RunOutcome::Finished) && frames_captured != total_frames {
        debug!(
            "Run finished with {} of {} planned frames",
            frames_captured, total_frames
        );
        total_frames = frames_captured;
        if let Some(tx) = &pacing.progress {
            let _ = tx.try_send(ExportProgress::new(frames_captured, total_frames));
        }
    }

    let report = |outcome| ExportReport {
        frames_captured,
        total_frames,
        outcome,
    };
    let result = match (outcome, closed) {
        (RunOutcome::Failed(e), _) => Err(e),
        (RunOutcome::Finished, Ok(_)) => Ok(report(ExportOutcome::Completed)),
        (RunOutcome::Cancelled, Ok(_)) => Ok(report(ExportOutcome::Cancelled)),
        (_, Err(e)) => Err(ExportError::Encoding(format!("{:#}", e))),
    };

    match &result {
        Ok(report) => {
            info!(
                "Export {:?}: {}/{} frames",
                report.outcome, report.frames_captured, report.total_frames
            );
            // engine-side cancels (pause, stop) set the mode themselves
            if report.outcome == ExportOutcome::Cancelled
                && cancelled_by_handle.load(Ordering::Acquire)
            {
                shared.mark_stopped();
            }
        }
        Err(e) => {
            warn!("Export failed: {}", e);
            shared.mark_stopped();
        }
    }
    let _ = result_tx.send(result);
}

impl PlaybackEngine {
    /// Open the destination and start exporting in the background.
    ///
    /// Format errors are returned here, before anything runs. Stop, pause or
    /// dropping the engine cancel the export.
    pub async fn start_export(&mut self, job: VideoJob) -> Result<ExportHandle, ExportError> {
        if self.is_exporting() {
            return Err(ExportError::Busy);
        }
        job.validate()?;
        self.halt().await;

        // a second pass only happens if the overview pass exhausts the path
        let detail_pass = match self.shared.overlay() {
            Some(overlay) => {
                let overlay = overlay.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                overlay.completes_path_by(self.shared.dataset.max_time())
            }
            None => false,
        };
        let passes = if detail_pass { 2 } else { 1 };
        let total = passes * frames_per_pass(self.shared.dataset.len(), job.capture_stride);

        let spec = job.encoder_spec();
        let encoder = match job.destination.open(&spec) {
            Ok(encoder) => encoder,
            Err(e) => {
                warn!("Cannot export to {}: {}", job.destination.describe(), e);
                self.shared.lock_state().transition_to(PlaybackMode::Stopped);
                return Err(e);
            }
        };

        info!(
            "Exporting {} frames ({}x{}, {} ms/frame, every {} timepoints) to {}",
            total,
            job.width_px,
            job.height_px,
            job.ms_per_frame,
            job.capture_stride,
            job.destination.describe()
        );

        self.shared.reset_overlay();
        {
            let mut state = self.shared.lock_state();
            state.current_index = 0;
            if state.mode == PlaybackMode::Playing {
                state.transition_to(PlaybackMode::Stopped);
            }
            state.transition_to(PlaybackMode::Playing);
        }

        let pacing = ExportPacing {
            sync: self.shared.sync.clone(),
            renderer: self.shared.renderer.clone(),
            worker: EncoderWorker::spawn(encoder, self.shared.sync.clone()),
            width_px: job.width_px,
            height_px: job.height_px,
            ms_per_frame: job.ms_per_frame,
            capture_stride: job.capture_stride,
            progress: job.progress,
            captured: 0,
            total,
        };

        let (cancel_tx, cancel) = CancelToken::new();
        let cancel_tx = Arc::new(cancel_tx);
        let cancelled_by_handle = Arc::new(AtomicBool::new(false));
        let (result_tx, result_rx) = oneshot::channel();
        let handle = tokio::spawn(run_export(
            self.shared.clone(),
            cancel,
            cancelled_by_handle.clone(),
            pacing,
            result_tx,
        ));

        self.active = Some(ActiveRun {
            handle,
            cancel_tx: cancel_tx.clone(),
            kind: RunKind::Export,
        });

        Ok(ExportHandle {
            total_frames: total,
            cancel_tx,
            cancelled_by_handle,
            result_rx,
        })
    }

    /// Export and wait for the result
    pub async fn export_video(&mut self, job: VideoJob) -> Result<ExportReport, ExportError> {
        self.start_export(job).await?.wait().await
    }

    /// Cancel an active export, leaving the engine stopped at the cancelled
    /// timepoint
    pub async fn cancel_export(&mut self) {
        if !self.is_exporting() {
            return;
        }
        self.halt().await;
        self.shared.mark_stopped();
    }
}
