use anyhow::{anyhow, Result};
use crossbeam_channel::{unbounded, Sender};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use traceplay::engine::DrawAck;
use traceplay::export::ImageSequenceSink;
use traceplay::{
    EntityClassification, PlaybackConfig, PlaybackEngine, PublishedFrame, RawImage, Renderer,
    TimeSeriesDataset, VideoJob,
};

/// Renderer whose draws run on a dedicated "UI" thread, one at a time
struct ConsoleRenderer {
    tx: Sender<(PublishedFrame, DrawAck)>,
}

impl ConsoleRenderer {
    fn spawn() -> Self {
        let (tx, rx) = unbounded::<(PublishedFrame, DrawAck)>();
        thread::spawn(move || {
            for (frame, ack) in rx.iter() {
                let mut values: Vec<_> = frame.values.iter().collect();
                values.sort_by(|a, b| a.0.cmp(b.0));
                let line = values
                    .iter()
                    .map(|(name, v)| format!("{}={:.3}", name, v))
                    .collect::<Vec<_>>()
                    .join(" ");
                log::info!("t={:.2} [{}] {}", frame.timepoint, frame.index, line);
                if !ack.acknowledge() {
                    log::debug!("Draw of {} was superseded", frame.index);
                }
            }
        });
        Self { tx }
    }
}

impl Renderer for ConsoleRenderer {
    fn publish(&self, frame: PublishedFrame, ack: DrawAck) {
        if self.tx.send((frame, ack)).is_err() {
            log::warn!("Render thread is gone");
        }
    }

    fn capture_frame(&self, width: u32, height: u32) -> Result<RawImage> {
        Ok(RawImage::filled(width, height, [32, 64, 128, 255]))
    }

    fn notify_playback_finished(&self) {
        log::info!("Playback finished");
    }
}

/// Damped oscillation of two species, 41 timepoints
fn synthetic_trace() -> Result<TimeSeriesDataset> {
    let rows = (0..=40)
        .map(|i| {
            let t = i as f64 * 0.25;
            let a = (-0.1 * t).exp() * t.cos();
            let b = (-0.1 * t).exp() * t.sin();
            (t, vec![a, b])
        })
        .collect();
    TimeSeriesDataset::new(vec!["A".into(), "B".into()], rows)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let mut csv_path: Option<PathBuf> = None;
    let mut export_dir: Option<PathBuf> = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--export" => {
                export_dir = Some(
                    args.next()
                        .ok_or(anyhow!("--export needs a directory"))?
                        .into(),
                );
            }
            path => csv_path = Some(path.into()),
        }
    }

    let dataset = match csv_path {
        Some(path) => TimeSeriesDataset::from_csv_reader(File::open(&path)?)?,
        None => synthetic_trace()?,
    };
    let classification = EntityClassification::all(&dataset);

    let config = PlaybackConfig::from_json(serde_json::json!({
        "play_speed_ms": 20,
        "loop_settle_ms": 100
    }))?;
    let mut engine = PlaybackEngine::new(
        Arc::new(dataset),
        Arc::new(ConsoleRenderer::spawn()),
        config,
    );
    engine.build_min_max_deferred(classification).await?;
    for column in engine.dataset().columns() {
        if let Some((lo, hi)) = engine.min_max(column) {
            log::info!("{}: [{:.3}, {:.3}]", column, lo, hi);
        }
    }

    engine.play();
    engine.wait_until_idle().await;

    if let Some(dir) = export_dir {
        let (progress_tx, progress_rx) = unbounded();
        let job = VideoJob::new(320, 240, 40, 4, Box::new(ImageSequenceSink::png(dir)))
            .with_progress(progress_tx);
        let report = engine.export_video(job).await?;
        if let Some(last) = progress_rx.try_iter().last() {
            log::info!("Export progress reached {:.0}%", last.percent);
        }
        log::info!(
            "Exported {}/{} frames ({:?})",
            report.frames_captured,
            report.total_frames,
            report.outcome
        );
    }

    engine.stop().await;
    Ok(())
}
