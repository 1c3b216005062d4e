//! Frame-sequence destination: one PNG per captured frame plus a
//! `sequence.json` manifest carrying the frame timing, ready for muxing by an
//! external tool.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;

use super::{EncodedFrame, EncoderSpec, ExportError, VideoEncoder, VideoSink};

pub const MANIFEST_FILE: &str = "sequence.json";

const SUPPORTED_FORMATS: &[&str] = &["png"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceEntry {
    pub file: String,
    pub pts_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceManifest {
    pub width_px: u32,
    pub height_px: u32,
    pub ms_per_frame: u64,
    pub frames: Vec<SequenceEntry>,
}

pub struct ImageSequenceSink {
    dir: PathBuf,
    format: String,
}

impl ImageSequenceSink {
    pub fn new(dir: impl Into<PathBuf>, format: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            format: format.into().to_ascii_lowercase(),
        }
    }

    pub fn png(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, "png")
    }
}

impl VideoSink for ImageSequenceSink {
    fn open(&self, spec: &EncoderSpec) -> Result<Box<dyn VideoEncoder>, ExportError> {
        if !SUPPORTED_FORMATS.contains(&self.format.as_str()) {
            return Err(ExportError::UnsupportedCodec(self.format.clone()));
        }
        fs::create_dir_all(&self.dir)
            .map_err(|e| ExportError::Open(format!("{}: {}", self.dir.display(), e)))?;

        Ok(Box::new(ImageSequenceEncoder {
            dir: self.dir.clone(),
            manifest: SequenceManifest {
                width_px: spec.width_px,
                height_px: spec.height_px,
                ms_per_frame: spec.ms_per_frame,
                frames: Vec::new(),
            },
        }))
    }

    fn describe(&self) -> String {
        format!("{} sequence in {}", self.format, self.dir.display())
    }
}

struct ImageSequenceEncoder {
    dir: PathBuf,
    manifest: SequenceManifest,
}

impl VideoEncoder for ImageSequenceEncoder {
    fn encode_frame(&mut self, frame: &EncodedFrame) -> Result<()> {
        let image = &frame.image;
        if image.width != self.manifest.width_px || image.height != self.manifest.height_px {
            return Err(anyhow!(
                "Frame {} is {}x{}, expected {}x{}",
                frame.frame_number,
                image.width,
                image.height,
                self.manifest.width_px,
                self.manifest.height_px
            ));
        }

        let buffer = image::RgbaImage::from_raw(image.width, image.height, image.pixels.clone())
            .ok_or(anyhow!("Frame {} has a short pixel buffer", frame.frame_number))?;

        let file = format!("frame_{:06}.png", frame.frame_number);
        let path = self.dir.join(&file);
        buffer
            .save_with_format(&path, image::ImageFormat::Png)
            .with_context(|| format!("writing {}", path.display()))?;

        self.manifest.frames.push(SequenceEntry {
            file,
            pts_ms: frame.pts_ms,
        });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let path = self.dir.join(MANIFEST_FILE);
        let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.manifest)?;
        log::info!(
            "Wrote {} frames to {}",
            self.manifest.frames.len(),
            self.dir.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RawImage;
    use tempfile::tempdir;

    fn spec() -> EncoderSpec {
        EncoderSpec {
            width_px: 4,
            height_px: 2,
            ms_per_frame: 40,
        }
    }

    #[test]
    fn test_writes_frames_and_manifest() {
        let dir = tempdir().unwrap();
        let sink = ImageSequenceSink::png(dir.path().join("out"));
        let mut encoder = sink.open(&spec()).unwrap();

        for n in 0..2 {
            encoder
                .encode_frame(&EncodedFrame {
                    frame_number: n,
                    pts_ms: n as u64 * 40,
                    image: RawImage::filled(4, 2, [255, 0, 0, 255]),
                })
                .unwrap();
        }
        encoder.close().unwrap();

        let out = dir.path().join("out");
        assert!(out.join("frame_000001.png").exists());
        let manifest: SequenceManifest =
            serde_json::from_reader(File::open(out.join(MANIFEST_FILE)).unwrap()).unwrap();
        assert_eq!(manifest.frames.len(), 2);
        assert_eq!(manifest.frames[1].pts_ms, 40);
    }

    #[test]
    fn test_unsupported_format() {
        let dir = tempdir().unwrap();
        let sink = ImageSequenceSink::new(dir.path().join("out"), "MP4");
        let err = sink.open(&spec()).err().unwrap();
        assert!(err.is_unsupported_codec());
        // nothing created for a rejected format
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_rejects_wrong_frame_size() {
        let dir = tempdir().unwrap();
        let mut encoder = ImageSequenceSink::png(dir.path()).open(&spec()).unwrap();
        let result = encoder.encode_frame(&EncodedFrame {
            frame_number: 0,
            pts_ms: 0,
            image: RawImage::filled(2, 2, [0, 0, 0, 255]),
        });
        assert!(result.is_err());
    }
}
