use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use traceplay::engine::{PlaybackConfig, PlaybackEngine, PlaybackMode};
use traceplay::render::mock::{AckMode, RecordingRenderer, RenderEvent};
use traceplay::TimeSeriesDataset;

fn dataset(rows: usize) -> Arc<TimeSeriesDataset> {
    let data = (0..rows)
        .map(|i| (i as f64 * 0.5, vec![i as f64, (i * i) as f64]))
        .collect();
    Arc::new(TimeSeriesDataset::new(vec!["S1".into(), "S2".into()], data).unwrap())
}

fn fast_config() -> PlaybackConfig {
    PlaybackConfig {
        play_speed_ms: 0,
        ack_poll_interval_ms: 1,
        loop_settle_ms: 5,
        loop_enabled: false,
    }
}

fn engine_with(rows: usize, mode: AckMode) -> (PlaybackEngine, RecordingRenderer) {
    let renderer = RecordingRenderer::new(mode);
    let engine = PlaybackEngine::new(dataset(rows), Arc::new(renderer.clone()), fast_config());
    (engine, renderer)
}

async fn eventually<F: Fn() -> bool>(cond: F) {
    timeout(Duration::from_secs(5), async {
        while !cond() {
            sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Split the event log at `boundaries` (offsets taken before each engine
/// action). Within a segment every publish after the first must be released by
/// the accepted ack of the one before it.
fn assert_draw_gated(events: &[RenderEvent], boundaries: &[usize]) {
    let mut edges = boundaries.to_vec();
    edges.push(events.len());

    let mut start = 0;
    for end in edges {
        let mut in_flight: Option<usize> = None;
        let mut published = false;
        for event in &events[start..end] {
            match event {
                RenderEvent::Published { index, .. } => {
                    assert!(
                        in_flight.is_none(),
                        "published {} while {:?} was unacknowledged",
                        index,
                        in_flight
                    );
                    in_flight = Some(*index);
                    published = true;
                }
                // acks landing before the segment's first publish belong to
                // earlier actions
                RenderEvent::Acked { index } if published => {
                    assert_eq!(in_flight, Some(*index), "ack for {} released another step", index);
                    in_flight = None;
                }
                _ => {}
            }
        }
        start = end;
    }
}

#[tokio::test]
async fn test_publishes_every_index_in_order() {
    let (mut engine, renderer) = engine_with(10, AckMode::Immediate);

    engine.play();
    engine.wait_until_idle().await;

    assert_eq!(renderer.published_indices(), (1..10).collect::<Vec<_>>());
    assert_eq!(engine.mode(), PlaybackMode::Stopped);
    assert_eq!(engine.current_index(), 9);
    assert_eq!(engine.current_timepoint(), 4.5);
    assert_eq!(renderer.finished_count(), 1);
}

#[tokio::test]
async fn test_play_at_end_restarts_from_first() {
    let (mut engine, renderer) = engine_with(4, AckMode::Immediate);

    engine.play();
    engine.wait_until_idle().await;
    engine.play();
    engine.wait_until_idle().await;

    assert_eq!(renderer.published_indices(), vec![1, 2, 3, 0, 1, 2, 3]);
    assert_eq!(renderer.finished_count(), 2);
}

#[tokio::test]
async fn test_never_publishes_before_previous_ack() {
    let (mut engine, renderer) = engine_with(8, AckMode::Delayed(Duration::from_millis(3)));

    engine.play();
    engine.wait_until_idle().await;

    assert_draw_gated(&renderer.events(), &[]);
    assert_eq!(renderer.published_indices(), (1..8).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let (mut engine, renderer) = engine_with(5, AckMode::Never);

    engine.play();
    eventually(|| !renderer.published_indices().is_empty()).await;

    engine.stop().await;
    assert_eq!(engine.mode(), PlaybackMode::Stopped);
    assert_eq!(engine.current_index(), 0);

    engine.stop().await;
    assert_eq!(engine.mode(), PlaybackMode::Stopped);
    assert_eq!(engine.current_index(), 0);

    // one in-flight step, then index 0 once per stop
    assert_eq!(renderer.published_indices(), vec![1, 0, 0]);
    assert_eq!(renderer.finished_count(), 0);
}

#[tokio::test]
async fn test_unresponsive_renderer_stalls_until_cancelled() {
    let (mut engine, renderer) = engine_with(5, AckMode::Never);

    engine.play();
    sleep(Duration::from_millis(30)).await;
    assert_eq!(renderer.published_indices(), vec![1]);
    assert_eq!(engine.mode(), PlaybackMode::Playing);

    timeout(Duration::from_secs(1), engine.pause())
        .await
        .expect("pause must not wait for the ack");
    assert_eq!(engine.mode(), PlaybackMode::Paused);
}

#[tokio::test]
async fn test_pause_and_resume() {
    let (mut engine, renderer) = engine_with(6, AckMode::Manual);

    engine.play();
    eventually(|| renderer.pending_acks() == 1).await;
    renderer.acknowledge_pending();
    eventually(|| renderer.published_indices().len() == 2).await;

    engine.pause().await;
    assert_eq!(engine.mode(), PlaybackMode::Paused);
    assert_eq!(engine.current_index(), 2);

    engine.play();
    eventually(|| renderer.published_indices().len() == 3).await;
    assert_eq!(renderer.pending_acks(), 2);

    // the ack held from before the pause must not release index 4
    sleep(Duration::from_millis(10)).await;
    assert_eq!(renderer.published_indices(), vec![1, 2, 3]);

    renderer.acknowledge_pending();
    assert_eq!(renderer.ignored_acks(), vec![2]);
    eventually(|| renderer.published_indices().len() == 4).await;
    assert_eq!(renderer.published_indices(), vec![1, 2, 3, 4]);
    engine.stop().await;
}

#[tokio::test]
async fn test_late_ack_after_pause_is_ignored() {
    let (mut engine, renderer) = engine_with(8, AckMode::Delayed(Duration::from_millis(20)));

    engine.play();
    eventually(|| !renderer.published_indices().is_empty()).await;
    engine.pause().await;
    assert_eq!(engine.current_index(), 1);

    let resumed = renderer.events().len();
    engine.play();
    engine.wait_until_idle().await;

    assert_eq!(renderer.published_indices(), (1..8).collect::<Vec<_>>());
    assert_eq!(renderer.ignored_acks(), vec![1]);
    assert_draw_gated(&renderer.events(), &[resumed]);
}

#[tokio::test]
async fn test_late_ack_after_seek_is_ignored() {
    let (mut engine, renderer) = engine_with(8, AckMode::Delayed(Duration::from_millis(20)));

    assert!(engine.set_current_timepoint(1.0));
    let resumed = renderer.events().len();
    engine.play();
    engine.wait_until_idle().await;

    assert_eq!(renderer.published_indices(), vec![2, 3, 4, 5, 6, 7]);
    assert_eq!(renderer.ignored_acks(), vec![2]);
    assert_draw_gated(&renderer.events(), &[resumed]);
}

#[tokio::test]
async fn test_late_ack_after_stop_is_ignored() {
    let (mut engine, renderer) = engine_with(6, AckMode::Delayed(Duration::from_millis(20)));

    engine.play();
    eventually(|| !renderer.published_indices().is_empty()).await;
    let stopped = renderer.events().len();
    engine.stop().await;
    let restarted = renderer.events().len();
    engine.play();
    engine.wait_until_idle().await;

    assert_eq!(renderer.published_indices(), vec![1, 0, 1, 2, 3, 4, 5]);
    // the cancelled step and the stop publish were both superseded
    assert_eq!(renderer.ignored_acks(), vec![1, 0]);
    assert_draw_gated(&renderer.events(), &[stopped, restarted]);
}

#[tokio::test]
async fn test_seek_ignored_while_playing() {
    let (mut engine, renderer) = engine_with(6, AckMode::Never);

    engine.play();
    eventually(|| !renderer.published_indices().is_empty()).await;

    assert!(!engine.set_current_timepoint(2.0));
    assert_eq!(engine.current_index(), 1);

    engine.pause().await;
    assert!(engine.set_current_timepoint(2.0));
    assert_eq!(engine.current_index(), 4);
    assert_eq!(renderer.published_indices(), vec![1, 4]);
}

#[tokio::test]
async fn test_loop_restarts_at_first_timepoint() {
    let (mut engine, renderer) = engine_with(3, AckMode::Immediate);
    engine.set_loop(true);

    engine.play();
    eventually(|| renderer.published_indices().len() >= 8).await;
    assert_eq!(renderer.finished_count(), 0);

    engine.set_loop(false);
    engine.wait_until_idle().await;

    let published = renderer.published_indices();
    assert_eq!(&published[..5], &[1, 2, 0, 1, 2]);
    for pair in published.windows(2) {
        if pair[0] == 2 {
            assert_eq!(pair[1], 0);
        } else {
            assert_eq!(pair[1], pair[0] + 1);
        }
    }
    assert_eq!(published.last(), Some(&2));
    assert_eq!(renderer.finished_count(), 1);
    assert_eq!(engine.mode(), PlaybackMode::Stopped);
}

#[tokio::test]
async fn test_stop_cancels_loop() {
    let (mut engine, renderer) = engine_with(3, AckMode::Immediate);
    engine.set_loop(true);

    engine.play();
    eventually(|| renderer.published_indices().len() >= 4).await;
    engine.stop().await;

    let count = renderer.published_indices().len();
    sleep(Duration::from_millis(20)).await;
    assert_eq!(renderer.published_indices().len(), count);
    assert_eq!(renderer.published_indices().last(), Some(&0));
    assert_eq!(engine.mode(), PlaybackMode::Stopped);
}

#[tokio::test]
async fn test_play_speed_applies_between_steps() {
    let (mut engine, renderer) = engine_with(4, AckMode::Immediate);
    engine.set_play_speed(40);

    let started = std::time::Instant::now();
    engine.play();
    engine.wait_until_idle().await;

    // three steps, each followed by the delay
    assert!(started.elapsed() >= Duration::from_millis(120));
    assert_eq!(engine.state().play_speed_ms, 40);
    assert_eq!(renderer.published_indices(), vec![1, 2, 3]);
}
