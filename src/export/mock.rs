use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{EncodedFrame, EncoderSpec, ExportError, VideoEncoder, VideoSink};

/// Counters shared between a [`CountingSink`] and the test holding it
#[derive(Debug, Default)]
pub struct SinkCounters {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub frames: AtomicUsize,
    pub pts_ms: Mutex<Vec<u64>>,
}

impl SinkCounters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn timestamps(&self) -> Vec<u64> {
        self.pts_ms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// In-memory sink that counts open/encode/close calls
#[derive(Clone)]
pub struct CountingSink {
    counters: Arc<SinkCounters>,
    unsupported: bool,
    fail_at_frame: Option<usize>,
    encode_delay: Option<Duration>,
}

impl CountingSink {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(SinkCounters::default()),
            unsupported: false,
            fail_at_frame: None,
            encode_delay: None,
        }
    }

    /// Reject every open as an unsupported format
    pub fn unsupported() -> Self {
        Self {
            unsupported: true,
            ..Self::new()
        }
    }

    /// Fail when encoding frame number `n`
    pub fn failing_at(mut self, n: usize) -> Self {
        self.fail_at_frame = Some(n);
        self
    }

    /// Slow encoder
    pub fn with_encode_delay(mut self, delay: Duration) -> Self {
        self.encode_delay = Some(delay);
        self
    }

    pub fn counters(&self) -> Arc<SinkCounters> {
        self.counters.clone()
    }
}

impl Default for CountingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSink for CountingSink {
    fn open(&self, _spec: &EncoderSpec) -> Result<Box<dyn VideoEncoder>, ExportError> {
        if self.unsupported {
            return Err(ExportError::UnsupportedCodec("mock/unsupported".into()));
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingEncoder {
            counters: self.counters.clone(),
            fail_at_frame: self.fail_at_frame,
            encode_delay: self.encode_delay,
        }))
    }

    fn describe(&self) -> String {
        "counting sink".to_string()
    }
}

struct CountingEncoder {
    counters: Arc<SinkCounters>,
    fail_at_frame: Option<usize>,
    encode_delay: Option<Duration>,
}

impl VideoEncoder for CountingEncoder {
    fn encode_frame(&mut self, frame: &EncodedFrame) -> Result<()> {
        if let Some(delay) = self.encode_delay {
            std::thread::sleep(delay);
        }
        if self.fail_at_frame == Some(frame.frame_number) {
            return Err(anyhow!("Simulated encoder failure"));
        }
        self.counters.frames.fetch_add(1, Ordering::SeqCst);
        self.counters
            .pts_ms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(frame.pts_ms);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
