//! Video export built on the playback iteration.
//!
//! A [`VideoJob`] names the frame size, cadence, capture stride and a
//! [`VideoSink`]. The sink decides whether it can encode the requested format;
//! container and codec details stay behind the [`VideoEncoder`] trait.

pub mod encoder;
pub mod error;
pub mod image_sequence;
pub mod job;
pub mod mock;
pub mod pipeline;

pub use encoder::{EncoderGuard, VideoEncoder, VideoSink};
pub use error::ExportError;
pub use image_sequence::{ImageSequenceSink, SequenceManifest};
pub use job::{
    EncodedFrame, EncoderSpec, ExportOutcome, ExportProgress, ExportReport, VideoJob,
};
pub use pipeline::ExportHandle;
