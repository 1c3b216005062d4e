//! Playback engine: owns the current timepoint, the Stopped/Playing/Paused
//! state machine and the background iteration that publishes timepoints to
//! the renderer.
//!
//! # Iteration
//!
//! One tokio task per run walks the timepoints in index order. Each step
//! publishes a timepoint and hands control to a [`PaceStrategy`], which waits
//! for the renderer's draw ack (and, when exporting, the encoder's capture
//! ack). Cancellation is checked between steps and on every ack poll, so
//! `pause()`/`stop()` return after at most one in-flight step.
//!
//! When the last timepoint has been paced the run either restarts at index 0
//! after a settle delay (camera overlay asked for another pass, or loop is
//! enabled during interactive playback) or stops and notifies the renderer.

use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::config::PlaybackConfig;
use super::pacing::{InteractivePacing, PaceStrategy, StepOutcome};
use super::state::{PlaybackMode, PlaybackState};
use super::sync::{CancelToken, DrawAck, SyncProtocol};
use crate::camera::SharedOverlay;
use crate::core::{EntityClassification, MinMaxIndex, TimeSeriesDataset};
use crate::export::ExportError;
use crate::render::{PublishedFrame, Renderer};

/// State shared between the engine handle and its background task
pub(crate) struct EngineShared {
    pub(crate) dataset: Arc<TimeSeriesDataset>,
    pub(crate) renderer: Arc<dyn Renderer>,
    pub(crate) sync: Arc<SyncProtocol>,
    pub(crate) config: PlaybackConfig,
    state: Mutex<PlaybackState>,
    min_max: OnceLock<MinMaxIndex>,
    overlay: Mutex<Option<SharedOverlay>>,
}

impl EngineShared {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, PlaybackState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn play_speed_ms(&self) -> u64 {
        self.lock_state().play_speed_ms
    }

    pub(crate) fn overlay(&self) -> Option<SharedOverlay> {
        self.overlay
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub(crate) fn reset_overlay(&self) {
        if let Some(overlay) = self.overlay() {
            overlay
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .reset();
        }
    }

    /// Make `index` current and hand it to the renderer. Does not wait.
    pub(crate) fn publish(&self, index: usize) {
        self.lock_state().current_index = index;

        let frame = PublishedFrame {
            index,
            timepoint: self.dataset.timepoint(index),
            values: self.dataset.row_slice(index),
        };
        let generation = self.sync.arm_draw();
        self.renderer
            .publish(frame, DrawAck::new(self.sync.clone(), index, generation));
    }

    /// Decide what happens once the last timepoint has been paced
    fn should_restart(&self, export: bool) -> bool {
        if let Some(overlay) = self.overlay() {
            let another_pass = overlay
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .on_reached_end();
            if another_pass {
                return true;
            }
        }
        !export && self.lock_state().loop_enabled
    }

    fn finish_run(&self) {
        let index = {
            let mut state = self.lock_state();
            state.transition_to(PlaybackMode::Stopped);
            state.current_index
        };
        info!("Playback finished at timepoint {}", self.dataset.timepoint(index));
        self.renderer.notify_playback_finished();
    }

    pub(crate) fn mark_stopped(&self) {
        let mut state = self.lock_state();
        if state.mode == PlaybackMode::Playing {
            state.transition_to(PlaybackMode::Stopped);
        }
    }
}

/// How a background run ended
#[derive(Debug)]
pub(crate) enum RunOutcome {
    Finished,
    Cancelled,
    Failed(ExportError),
}

/// Background iteration shared by interactive playback and export
pub(crate) async fn run_iteration(
    shared: Arc<EngineShared>,
    start: usize,
    cancel: CancelToken,
    pacing: &mut dyn PaceStrategy,
) -> RunOutcome {
    let last = shared.dataset.last_index();
    let mut index = start;

    loop {
        while index <= last {
            if cancel.is_cancelled() {
                return RunOutcome::Cancelled;
            }

            shared.publish(index);

            match pacing.wait_for_next_step(index, &cancel).await {
                Ok(StepOutcome::Continue) => {}
                Ok(StepOutcome::Cancelled) => return RunOutcome::Cancelled,
                Err(e) => return RunOutcome::Failed(e),
            }
            index += 1;
        }

        if cancel.is_cancelled() {
            return RunOutcome::Cancelled;
        }

        if shared.should_restart(pacing.is_export()) {
            debug!("Reached last timepoint, restarting at first");
            tokio::select! {
                _ = tokio::time::sleep(shared.config.loop_settle()) => {}
                _ = cancel.cancelled() => return RunOutcome::Cancelled,
            }
            index = 0;
            continue;
        }

        shared.finish_run();
        return RunOutcome::Finished;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunKind {
    Interactive,
    Export,
}

pub(crate) struct ActiveRun {
    pub(crate) handle: JoinHandle<()>,
    pub(crate) cancel_tx: Arc<watch::Sender<bool>>,
    pub(crate) kind: RunKind,
}

/// Drives playback of one dataset against one renderer
pub struct PlaybackEngine {
    pub(crate) shared: Arc<EngineShared>,
    pub(crate) active: Option<ActiveRun>,
}

impl PlaybackEngine {
    pub fn new(
        dataset: Arc<TimeSeriesDataset>,
        renderer: Arc<dyn Renderer>,
        config: PlaybackConfig,
    ) -> Self {
        info!(
            "Playback engine created: {} timepoints, {} columns",
            dataset.len(),
            dataset.columns().len()
        );

        let state = PlaybackState::new(config.play_speed_ms, config.loop_enabled);
        let shared = EngineShared {
            dataset,
            renderer,
            sync: Arc::new(SyncProtocol::new(config.ack_poll_interval())),
            config,
            state: Mutex::new(state),
            min_max: OnceLock::new(),
            overlay: Mutex::new(None),
        };

        Self {
            shared: Arc::new(shared),
            active: None,
        }
    }

    pub fn dataset(&self) -> &Arc<TimeSeriesDataset> {
        &self.shared.dataset
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.shared.config
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.lock_state().clone()
    }

    pub fn mode(&self) -> PlaybackMode {
        self.shared.lock_state().mode
    }

    pub fn current_index(&self) -> usize {
        self.shared.lock_state().current_index
    }

    pub fn current_timepoint(&self) -> f64 {
        self.shared.dataset.timepoint(self.current_index())
    }

    /// Start or resume playback. Must be called from within a tokio runtime.
    pub fn play(&mut self) {
        self.reap();

        let start = {
            let mut state = self.shared.lock_state();
            if state.mode == PlaybackMode::Playing {
                return;
            }

            let last = self.shared.dataset.last_index();
            let start = if state.mode == PlaybackMode::Stopped && state.current_index == last {
                state.current_index = 0;
                0
            } else {
                state.current_index + 1
            };
            state.transition_to(PlaybackMode::Playing);
            start
        };

        info!("Playback started at index {}", start);
        let (cancel_tx, cancel) = CancelToken::new();
        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            let mut pacing = InteractivePacing::new(shared.clone());
            let outcome = run_iteration(shared, start, cancel, &mut pacing).await;
            debug!("Interactive run ended: {:?}", outcome);
        });

        self.active = Some(ActiveRun {
            handle,
            cancel_tx: Arc::new(cancel_tx),
            kind: RunKind::Interactive,
        });
    }

    /// Cancel the background run, keeping the current timepoint
    pub async fn pause(&mut self) {
        if self.mode() != PlaybackMode::Playing {
            return;
        }
        self.halt().await;

        let mut state = self.shared.lock_state();
        // the run may have finished on its own meanwhile
        if state.mode == PlaybackMode::Playing {
            state.transition_to(PlaybackMode::Paused);
            info!("Playback paused at index {}", state.current_index);
        }
    }

    /// Cancel the background run and rewind to the first timepoint
    pub async fn stop(&mut self) {
        self.halt().await;
        {
            let mut state = self.shared.lock_state();
            state.current_index = 0;
            state.transition_to(PlaybackMode::Stopped);
        }
        self.shared.reset_overlay();
        self.shared.publish(0);
        debug!("Playback stopped");
    }

    /// Jump to the timepoint at or before `t`. Ignored while playing, when
    /// `t` is outside the trace or when it resolves to the current index.
    pub fn set_current_timepoint(&self, t: f64) -> bool {
        let dataset = &self.shared.dataset;
        let index = {
            let mut state = self.shared.lock_state();
            if state.mode == PlaybackMode::Playing {
                debug!("Ignoring seek to {} while playing", t);
                return false;
            }
            if !(t >= dataset.min_time() && t <= dataset.max_time()) {
                debug!("Ignoring seek to {} outside trace", t);
                return false;
            }
            let Some(index) = dataset.index_at_or_before(t) else {
                return false;
            };
            if index == state.current_index {
                return false;
            }
            state.current_index = index;
            index
        };

        self.shared.publish(index);
        true
    }

    pub fn set_play_speed(&self, ms: u64) {
        self.shared.lock_state().play_speed_ms = ms;
    }

    pub fn set_loop(&self, enabled: bool) {
        self.shared.lock_state().loop_enabled = enabled;
    }

    /// Publish the current timepoint again, e.g. for the first draw
    pub fn refresh(&self) {
        let index = self.current_index();
        self.shared.publish(index);
    }

    pub fn min_max(&self, column: &str) -> Option<(f64, f64)> {
        self.shared.min_max.get()?.get(column)
    }

    pub fn min_max_index(&self) -> Option<&MinMaxIndex> {
        self.shared.min_max.get()
    }

    /// Build the min/max index now. A second call returns the existing index.
    pub fn build_min_max(&self, classification: &EntityClassification) -> &MinMaxIndex {
        self.shared
            .min_max
            .get_or_init(|| MinMaxIndex::build(&self.shared.dataset, classification))
    }

    /// Scan on a blocking worker; `min_max` stays unavailable until it lands
    pub fn build_min_max_deferred(&self, classification: EntityClassification) -> JoinHandle<()> {
        let shared = self.shared.clone();
        tokio::task::spawn_blocking(move || {
            shared
                .min_max
                .get_or_init(|| MinMaxIndex::build(&shared.dataset, &classification));
            debug!("Min/max index ready");
        })
    }

    /// Attach a camera overlay. Ignored while playing.
    pub fn attach_camera_overlay(&self, overlay: SharedOverlay) -> bool {
        if self.mode() == PlaybackMode::Playing {
            return false;
        }
        *self
            .shared
            .overlay
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(overlay);
        true
    }

    pub fn detach_camera_overlay(&self) -> bool {
        if self.mode() == PlaybackMode::Playing {
            return false;
        }
        self.shared
            .overlay
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .is_some()
    }

    pub fn has_camera_overlay(&self) -> bool {
        self.shared.overlay().is_some()
    }

    pub fn is_exporting(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|run| run.kind == RunKind::Export && !run.handle.is_finished())
    }

    /// Wait for the current run to end by itself. Never returns while
    /// looping.
    pub async fn wait_until_idle(&mut self) {
        if let Some(run) = self.active.take() {
            if let Err(e) = run.handle.await {
                warn!("Playback task failed: {}", e);
            }
        }
    }

    /// Cancel the active run and wait for it to wind down
    pub(crate) async fn halt(&mut self) {
        if let Some(run) = self.active.take() {
            let _ = run.cancel_tx.send(true);
            if let Err(e) = run.handle.await {
                warn!("Playback task failed: {}", e);
            }
        }
    }

    fn reap(&mut self) {
        if self
            .active
            .as_ref()
            .is_some_and(|run| run.handle.is_finished())
        {
            self.active = None;
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        // Can't await the task here, but the run stops at its next check
        if let Some(run) = &self.active {
            let _ = run.cancel_tx.send(true);
        }
    }
}
