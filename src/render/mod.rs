//! Interface to the visual renderer.
//!
//! The engine calls into a [`Renderer`] from its background task. Implementors
//! own the hop to their UI thread; every [`Renderer::publish`] must eventually
//! be answered through the [`DrawAck`] it carries.

pub mod mock;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::core::ColumnValueMap;
pub use crate::engine::sync::DrawAck;

/// One timepoint handed to the renderer
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedFrame {
    pub index: usize,
    pub timepoint: f64,
    pub values: ColumnValueMap,
}

/// RGBA8 pixels captured from the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RawImage {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Solid-color image, used by headless renderers
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self::new(width, height, pixels)
    }
}

pub trait Renderer: Send + Sync {
    /// Apply a timepoint's values. Must not block the caller; acknowledge via
    /// `ack` once the draw is done.
    fn publish(&self, frame: PublishedFrame, ack: DrawAck);

    /// Grab the current view for export
    fn capture_frame(&self, width: u32, height: u32) -> Result<RawImage>;

    /// A run ended without looping
    fn notify_playback_finished(&self);
}
