use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use super::{CameraPath, Waypoint};
use crate::core::TimeSeriesDataset;

/// Overlay shared between the renderer (publish handler) and the engine
/// (end-of-run hook)
pub type SharedOverlay = Arc<Mutex<CameraOverlay>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraPhase {
    /// Camera pans along the path, entities drawn at a uniform enlarged size
    Overview,
    /// Camera parked on the final viewport, data-driven entity sizes
    Detail,
}

/// What the renderer should apply for one published timepoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraView {
    pub phase: CameraPhase,
    pub center: Waypoint,
    pub zoom: f64,
    pub segment: usize,
    /// `Some` overrides entity sizes, `None` leaves them data-driven
    pub entity_scale: Option<f64>,
}

/// Secondary consumer of the timepoint stream. Holds no clock: every view is
/// derived from the published timepoint alone.
#[derive(Debug, Clone)]
pub struct CameraOverlay {
    path: CameraPath,
    start_time: f64,
    duration: f64,
    phase: CameraPhase,
    segment: usize,
    path_exhausted: bool,
}

impl CameraOverlay {
    pub fn new(path: CameraPath, start_time: f64, duration: f64) -> Self {
        Self {
            path,
            start_time,
            duration,
            phase: CameraPhase::Overview,
            segment: 0,
            path_exhausted: false,
        }
    }

    /// Spread the path across the dataset's whole time span
    pub fn for_dataset(path: CameraPath, dataset: &TimeSeriesDataset) -> Self {
        Self::new(path, dataset.min_time(), dataset.duration())
    }

    pub fn shared(self) -> SharedOverlay {
        Arc::new(Mutex::new(self))
    }

    pub fn phase(&self) -> CameraPhase {
        self.phase
    }

    pub fn segment(&self) -> usize {
        self.segment
    }

    pub fn is_path_exhausted(&self) -> bool {
        self.path_exhausted
    }

    pub fn segment_budget(&self) -> f64 {
        self.path.segment_budget(self.duration)
    }

    /// Whether an overview pass that reaches `timepoint` exhausts the path,
    /// i.e. whether a trace ending there gets a detail pass
    pub fn completes_path_by(&self, timepoint: f64) -> bool {
        timepoint - self.start_time >= self.duration
    }

    pub fn on_publish(&mut self, timepoint: f64) -> CameraView {
        match self.phase {
            CameraPhase::Overview => {
                let elapsed = timepoint - self.start_time;
                let (segment, center) = self.path.position_at(elapsed, self.duration);
                self.segment = self.segment.max(segment);
                if self.completes_path_by(timepoint) {
                    self.path_exhausted = true;
                }
                CameraView {
                    phase: self.phase,
                    center,
                    zoom: self.path.zoom,
                    segment: self.segment,
                    entity_scale: Some(self.path.overview_scale),
                }
            }
            CameraPhase::Detail => CameraView {
                phase: self.phase,
                center: self.path.last(),
                zoom: self.path.zoom,
                segment: self.segment,
                entity_scale: None,
            },
        }
    }

    /// Called by the engine when a run reaches the final timepoint. Returns
    /// true when the overlay wants the trace played once more.
    pub fn on_reached_end(&mut self) -> bool {
        if self.phase == CameraPhase::Overview && self.path_exhausted {
            log::debug!("Camera path complete, switching to detail phase");
            self.phase = CameraPhase::Detail;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.phase = CameraPhase::Overview;
        self.segment = 0;
        self.path_exhausted = false;
    }
}
