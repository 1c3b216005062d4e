pub mod camera;
pub mod core;
pub mod engine;
pub mod export;
pub mod render;

pub use camera::{CameraOverlay, CameraPath, SharedOverlay};
pub use core::{EntityClassification, MinMaxIndex, TimeSeriesDataset};
pub use engine::{PlaybackConfig, PlaybackEngine, PlaybackMode};
pub use export::{ExportError, ExportHandle, ExportReport, VideoJob};
pub use render::{PublishedFrame, RawImage, Renderer};
