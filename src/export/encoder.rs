use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Sender};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use super::{EncodedFrame, EncoderSpec, ExportError};
use crate::engine::sync::SyncProtocol;

/// Export destination. Opening validates the format and creates the encoder.
pub trait VideoSink: Send {
    fn open(&self, spec: &EncoderSpec) -> Result<Box<dyn VideoEncoder>, ExportError>;

    /// Human-readable destination, for logs
    fn describe(&self) -> String {
        "video sink".to_string()
    }
}

/// Streaming encoder. Blocking calls, driven from a dedicated worker.
pub trait VideoEncoder: Send {
    fn encode_frame(&mut self, frame: &EncodedFrame) -> Result<()>;

    /// Flush and release the output. Called exactly once.
    fn close(&mut self) -> Result<()>;
}

/// Owns an open encoder and closes it exactly once, on `finish` or on drop
pub struct EncoderGuard {
    encoder: Option<Box<dyn VideoEncoder>>,
}

impl EncoderGuard {
    pub fn new(encoder: Box<dyn VideoEncoder>) -> Self {
        Self {
            encoder: Some(encoder),
        }
    }

    pub fn encode(&mut self, frame: &EncodedFrame) -> Result<()> {
        match self.encoder.as_mut() {
            Some(encoder) => encoder.encode_frame(frame),
            None => Err(anyhow!("Encoder already closed")),
        }
    }

    /// Close now and report the close result
    pub fn finish(mut self) -> Result<()> {
        match self.encoder.take() {
            Some(mut encoder) => encoder.close(),
            None => Ok(()),
        }
    }
}

impl Drop for EncoderGuard {
    fn drop(&mut self) {
        if let Some(mut encoder) = self.encoder.take() {
            if let Err(e) = encoder.close() {
                log::warn!("Failed to close encoder: {:#}", e);
            }
        }
    }
}

/// Blocking worker that encodes captured frames and raises the capture ack
pub(crate) struct EncoderWorker {
    tx: Option<Sender<EncodedFrame>>,
    handle: JoinHandle<Result<usize>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl EncoderWorker {
    pub fn spawn(encoder: Box<dyn VideoEncoder>, sync: Arc<SyncProtocol>) -> Self {
        // one frame in flight, matching the capture ack
        let (tx, rx) = bounded::<EncodedFrame>(1);
        let failure = Arc::new(Mutex::new(None));
        let worker_failure = failure.clone();

        let handle = tokio::task::spawn_blocking(move || -> Result<usize> {
            let mut guard = EncoderGuard::new(encoder);
            let mut written = 0usize;

            // ends when the export task drops its sender
            for frame in rx.iter() {
                if let Err(e) = guard.encode(&frame) {
                    let msg = format!("frame {}: {:#}", frame.frame_number, e);
                    *worker_failure
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(msg.clone());
                    drop(guard);
                    sync.acknowledge_capture();
                    return Err(anyhow!(msg));
                }
                written += 1;
                sync.acknowledge_capture();
            }

            guard.finish()?;
            Ok(written)
        });

        Self {
            tx: Some(tx),
            handle,
            failure,
        }
    }

    /// Hand a frame to the worker. The caller arms the capture ack first.
    pub fn submit(&self, frame: EncodedFrame) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(anyhow!("Encoder worker closed"))?;
        tx.send(frame)
            .map_err(|_| anyhow!("Encoder worker stopped accepting frames"))
    }

    pub fn failure(&self) -> Option<String> {
        self.failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Stop feeding frames and wait for the encoder to be closed
    pub async fn finish(mut self) -> Result<usize> {
        drop(self.tx.take());
        self.handle
            .await
            .map_err(|e| anyhow!("Encoder worker panicked: {}", e))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CloseCounter(Arc<AtomicUsize>);

    impl VideoEncoder for CloseCounter {
        fn encode_frame(&mut self, _frame: &EncodedFrame) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let closes = Arc::new(AtomicUsize::new(0));
        {
            let _guard = EncoderGuard::new(Box::new(CloseCounter(closes.clone())));
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_finish_closes_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let guard = EncoderGuard::new(Box::new(CloseCounter(closes.clone())));
        guard.finish().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
