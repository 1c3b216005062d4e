pub mod config;
pub mod pacing;
pub mod playback;
pub mod state;
pub mod sync;

pub use config::PlaybackConfig;
pub use pacing::{InteractivePacing, PaceStrategy, StepOutcome};
pub use playback::PlaybackEngine;
pub use state::{PlaybackMode, PlaybackState};
pub use sync::{AckOutcome, CancelToken, DrawAck, SyncProtocol};
