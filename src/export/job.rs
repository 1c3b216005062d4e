use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use super::{ExportError, VideoSink};
use crate::render::RawImage;

/// One export request
pub struct VideoJob {
    pub width_px: u32,
    pub height_px: u32,
    /// Presentation time of each encoded frame
    pub ms_per_frame: u64,
    /// Capture every Nth timepoint
    pub capture_stride: usize,
    pub destination: Box<dyn VideoSink>,
    pub progress: Option<Sender<ExportProgress>>,
}

impl VideoJob {
    pub fn new(
        width_px: u32,
        height_px: u32,
        ms_per_frame: u64,
        capture_stride: usize,
        destination: Box<dyn VideoSink>,
    ) -> Self {
        Self {
            width_px,
            height_px,
            ms_per_frame,
            capture_stride,
            destination,
            progress: None,
        }
    }

    /// Report progress on `tx` after every captured frame
    pub fn with_progress(mut self, tx: Sender<ExportProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn validate(&self) -> Result<(), ExportError> {
        if self.width_px == 0 || self.height_px == 0 {
            return Err(ExportError::InvalidJob(format!(
                "frame size {}x{} is empty",
                self.width_px, self.height_px
            )));
        }
        if self.ms_per_frame == 0 {
            return Err(ExportError::InvalidJob("ms_per_frame must be positive".into()));
        }
        if self.capture_stride == 0 {
            return Err(ExportError::InvalidJob("capture_stride must be positive".into()));
        }
        Ok(())
    }

    pub fn encoder_spec(&self) -> EncoderSpec {
        EncoderSpec {
            width_px: self.width_px,
            height_px: self.height_px,
            ms_per_frame: self.ms_per_frame,
        }
    }
}

/// Parameters the destination needs to open an encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderSpec {
    pub width_px: u32,
    pub height_px: u32,
    pub ms_per_frame: u64,
}

/// A captured frame with its fixed presentation time
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub frame_number: usize,
    pub pts_ms: u64,
    pub image: RawImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportProgress {
    pub captured: usize,
    pub total: usize,
    pub percent: f64,
}

impl ExportProgress {
    pub fn new(captured: usize, total: usize) -> Self {
        let percent = if total == 0 {
            100.0
        } else {
            captured as f64 / total as f64 * 100.0
        };
        Self {
            captured,
            total,
            percent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReport {
    pub frames_captured: usize,
    pub total_frames: usize,
    pub outcome: ExportOutcome,
}

/// Timepoint indices that get captured. Index 0 is skipped so every pass
/// yields `(rows - 1) / stride` frames.
pub fn is_capture_index(index: usize, stride: usize) -> bool {
    index > 0 && index % stride == 0
}

pub fn frames_per_pass(rows: usize, stride: usize) -> usize {
    rows.saturating_sub(1) / stride
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_indices() {
        let captured: Vec<usize> = (0..=100).filter(|&i| is_capture_index(i, 10)).collect();
        assert_eq!(captured.len(), frames_per_pass(101, 10));
        assert_eq!(captured.first(), Some(&10));
        assert_eq!(captured.last(), Some(&100));
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(ExportProgress::new(5, 20).percent, 25.0);
        assert_eq!(ExportProgress::new(0, 0).percent, 100.0);
    }
}
