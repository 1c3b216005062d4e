pub mod overlay;
pub mod path;

pub use overlay::{CameraOverlay, CameraPhase, CameraView, SharedOverlay};
pub use path::{CameraPath, Waypoint};
