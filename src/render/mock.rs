use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{DrawAck, PublishedFrame, RawImage, Renderer};
use crate::camera::{CameraView, SharedOverlay};

/// How the simulated renderer answers publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Ack inside `publish`
    Immediate,
    /// Ack from a separate thread after a delay, like a busy UI thread
    Delayed(Duration),
    /// Hold acks until `acknowledge_pending` is called
    Manual,
    /// Never ack
    Never,
}

/// Everything the renderer observed, in order
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    Published { index: usize, timepoint: f64 },
    Acked { index: usize },
    /// Ack for a publish that had already been superseded
    AckIgnored { index: usize },
    Captured { width: u32, height: u32 },
    Finished,
}

#[derive(Default)]
struct Recorded {
    events: Vec<RenderEvent>,
    camera_views: Vec<CameraView>,
    pending: VecDeque<DrawAck>,
    captures: usize,
}

/// Headless renderer that records publish/ack interleaving
#[derive(Clone)]
pub struct RecordingRenderer {
    mode: AckMode,
    recorded: Arc<Mutex<Recorded>>,
    overlay: Option<SharedOverlay>,
    fail_capture_at: Option<usize>,
}

impl RecordingRenderer {
    pub fn new(mode: AckMode) -> Self {
        Self {
            mode,
            recorded: Arc::new(Mutex::new(Recorded::default())),
            overlay: None,
            fail_capture_at: None,
        }
    }

    /// Drive a camera overlay from the publish handler
    pub fn with_overlay(mut self, overlay: SharedOverlay) -> Self {
        self.overlay = Some(overlay);
        self
    }

    /// Make the n-th capture (0-based) fail
    pub fn failing_capture_at(mut self, n: usize) -> Self {
        self.fail_capture_at = Some(n);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn events(&self) -> Vec<RenderEvent> {
        self.lock().events.clone()
    }

    /// Indices of every publish, in order
    pub fn published_indices(&self) -> Vec<usize> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                RenderEvent::Published { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    pub fn finished_count(&self) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|e| matches!(e, RenderEvent::Finished))
            .count()
    }

    pub fn capture_count(&self) -> usize {
        self.lock().captures
    }

    pub fn camera_views(&self) -> Vec<CameraView> {
        self.lock().camera_views.clone()
    }

    pub fn pending_acks(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn ignored_acks(&self) -> Vec<usize> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                RenderEvent::AckIgnored { index } => Some(*index),
                _ => None,
            })
            .collect()
    }

    /// Release every held ack (Manual mode)
    pub fn acknowledge_pending(&self) {
        let mut recorded = self.lock();
        let acks: Vec<DrawAck> = recorded.pending.drain(..).collect();
        for ack in acks {
            record_ack(&mut recorded, ack);
        }
    }
}

// Acks while holding the event log, so the next publish is always logged after
// the ack that released it.
fn record_ack(recorded: &mut Recorded, ack: DrawAck) {
    let index = ack.index();
    let event = if ack.acknowledge() {
        RenderEvent::Acked { index }
    } else {
        RenderEvent::AckIgnored { index }
    };
    recorded.events.push(event);
}

impl Renderer for RecordingRenderer {
    fn publish(&self, frame: PublishedFrame, ack: DrawAck) {
        let view = self
            .overlay
            .as_ref()
            .map(|o| {
                o.lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .on_publish(frame.timepoint)
            });

        {
            let mut recorded = self.lock();
            recorded.events.push(RenderEvent::Published {
                index: frame.index,
                timepoint: frame.timepoint,
            });
            if let Some(view) = view {
                recorded.camera_views.push(view);
            }
        }

        match self.mode {
            AckMode::Immediate => record_ack(&mut self.lock(), ack),
            AckMode::Delayed(delay) => {
                let recorded = self.recorded.clone();
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    let mut recorded = recorded
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    record_ack(&mut recorded, ack);
                });
            }
            AckMode::Manual => self.lock().pending.push_back(ack),
            AckMode::Never => drop(ack),
        }
    }

    fn capture_frame(&self, width: u32, height: u32) -> Result<RawImage> {
        let mut recorded = self.lock();
        if self.fail_capture_at == Some(recorded.captures) {
            return Err(anyhow!("Simulated capture failure"));
        }
        recorded.captures += 1;
        recorded.events.push(RenderEvent::Captured { width, height });
        let shade = (recorded.captures % 256) as u8;
        Ok(RawImage::filled(width, height, [shade, shade, shade, 255]))
    }

    fn notify_playback_finished(&self) {
        self.lock().events.push(RenderEvent::Finished);
    }
}
