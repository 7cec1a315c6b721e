//! Tests for the broadcast queue

use super::*;
use pulse_protocol::TouchKind;
use std::time::Duration;
use tokio::sync::mpsc;

fn event_at(offset: u64) -> Event {
    let mut event = Event::new(
        offset as f64,
        "s",
        EventKind::FileTouch {
            path: format!("f{offset}.rs"),
            kind: TouchKind::Read,
        },
    );
    event.id = Some(EventId::from_offset(offset));
    event
}

async fn recv_batch(rx: &mut mpsc::Receiver<String>) -> BatchEnvelope {
    let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("batch not delivered in time")
        .expect("session channel closed");
    serde_json::from_str(&frame).unwrap()
}

fn batch_offsets(batch: &BatchEnvelope) -> Vec<u64> {
    batch
        .events
        .iter()
        .filter(|e| !e.is_gap_marker())
        .filter_map(|e| e.id.as_ref().and_then(|id| id.offset()))
        .collect()
}

// ============================================================================
// Scheduling
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_leading_edge_flush_is_prompt() {
    let broadcaster = Broadcaster::new();
    let (_session, mut rx) = broadcaster.sessions().register();

    broadcaster.enqueue(event_at(0));

    // Well under one batch window: the first event of an empty queue is
    // not delayed by the 50 ms timer.
    let batch = tokio::time::timeout(Duration::from_millis(20), rx.recv())
        .await
        .expect("leading-edge flush was delayed")
        .unwrap();
    let batch: BatchEnvelope = serde_json::from_str(&batch).unwrap();
    assert_eq!(batch_offsets(&batch), vec![0]);
}

#[tokio::test(start_paused = true)]
async fn test_admissions_accumulate_into_one_batch() {
    let broadcaster = Broadcaster::new();
    let (_session, mut rx) = broadcaster.sessions().register();

    // No await between admissions: the scheduled flush has not run yet
    // and both events land in the same batch.
    broadcaster.enqueue(event_at(0));
    broadcaster.enqueue(event_at(100));

    let batch = recv_batch(&mut rx).await;
    assert_eq!(batch_offsets(&batch), vec![0, 100]);

    // No second batch follows.
    assert!(
        tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .is_err()
    );
}

#[tokio::test(start_paused = true)]
async fn test_max_batch_splits_and_windowed_remainder() {
    let broadcaster = Broadcaster::new();
    let (_session, mut rx) = broadcaster.sessions().register();

    for i in 0..150u64 {
        broadcaster.enqueue(event_at(i * 10));
    }

    let first = recv_batch(&mut rx).await;
    assert_eq!(first.events.len(), MAX_BATCH_SIZE);

    let second = recv_batch(&mut rx).await;
    assert_eq!(second.events.len(), 50);

    // Cross-batch ordering holds.
    let first_offsets = batch_offsets(&first);
    let second_offsets = batch_offsets(&second);
    assert!(first_offsets.last().unwrap() < second_offsets.first().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_reaching_ceiling_cancels_window_timer() {
    let broadcaster = Broadcaster::new();
    let (_session, mut rx) = broadcaster.sessions().register();

    // First flush drains 100 and leaves 60 on a window timer.
    for i in 0..160u64 {
        broadcaster.enqueue(event_at(i));
    }
    let first = recv_batch(&mut rx).await;
    assert_eq!(first.events.len(), MAX_BATCH_SIZE);

    // Topping the remainder up to the ceiling must flush right away,
    // well before the 50 ms window would have fired.
    for i in 160..200u64 {
        broadcaster.enqueue(event_at(i));
    }
    let second = tokio::time::timeout(Duration::from_millis(5), rx.recv())
        .await
        .expect("ceiling flush waited for the window timer")
        .unwrap();
    let second: BatchEnvelope = serde_json::from_str(&second).unwrap();
    assert_eq!(second.events.len(), MAX_BATCH_SIZE);
}

#[tokio::test(start_paused = true)]
async fn test_flush_with_no_sessions_still_drains() {
    let broadcaster = Broadcaster::new();
    broadcaster.enqueue(event_at(0));

    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(broadcaster.queue_depth(), 0);
    assert_eq!(broadcaster.metrics().snapshot().batches_delivered, 1);
}

// ============================================================================
// Duplicate suppression (recent window)
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_duplicate_id_within_window_dropped() {
    let broadcaster = Broadcaster::new();
    let (_session, mut rx) = broadcaster.sessions().register();

    broadcaster.enqueue(event_at(42));
    broadcaster.enqueue(event_at(42));

    let batch = recv_batch(&mut rx).await;
    assert_eq!(batch.events.len(), 1);
    assert_eq!(broadcaster.metrics().snapshot().duplicates_suppressed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_id_readmitted_after_window_expires() {
    let broadcaster = Broadcaster::new();
    let (_session, mut rx) = broadcaster.sessions().register();

    broadcaster.enqueue(event_at(42));
    let _ = recv_batch(&mut rx).await;

    // Past the window a reused offset (post-rotation) is legitimate.
    tokio::time::advance(RECENT_WINDOW + Duration::from_millis(1)).await;
    broadcaster.enqueue(event_at(42));

    let batch = recv_batch(&mut rx).await;
    assert_eq!(batch_offsets(&batch), vec![42]);
    assert_eq!(broadcaster.metrics().snapshot().duplicates_suppressed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_distinct_offsets_are_not_duplicates() {
    // The same line bytes appended twice get different offsets, so the
    // ID filter must not engage.
    let broadcaster = Broadcaster::new();
    let (_session, mut rx) = broadcaster.sessions().register();

    broadcaster.enqueue(event_at(0));
    broadcaster.enqueue(event_at(57));

    let batch = recv_batch(&mut rx).await;
    assert_eq!(batch.events.len(), 2);
}

// ============================================================================
// Backpressure
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_soft_cap_plus_one_yields_single_gap_marker() {
    let broadcaster = Broadcaster::new();

    // Synchronous admissions: no flush gets to run in between.
    for i in 0..(QUEUE_SOFT_CAP as u64 + 1) {
        broadcaster.enqueue(event_at(i));
    }

    assert_eq!(broadcaster.queue_depth(), QUEUE_SOFT_CAP + 1);
    assert_eq!(broadcaster.metrics().snapshot().events_dropped, 1);

    let (_session, mut rx) = broadcaster.sessions().register();
    broadcaster.flush_now();

    let batch = recv_batch(&mut rx).await;
    let marker = &batch.events[0];
    assert!(marker.is_gap_marker());
    match &marker.kind {
        EventKind::Unknown(u) => {
            let gap = u.gap.as_ref().unwrap();
            assert_eq!(gap.dropped_count, 1);
            assert_eq!(gap.from_event_id, "unknown");
            assert_eq!(gap.to_offset, 0);
        }
        other => panic!("expected unknown variant, got {other:?}"),
    }
    assert_eq!(
        marker.id.as_ref().unwrap().as_str(),
        format!("file_watcher:{}:gap", QUEUE_SOFT_CAP)
    );
}

#[tokio::test(start_paused = true)]
async fn test_overflow_episode_coalesces_into_one_marker() {
    let broadcaster = Broadcaster::new();
    let (_session, mut rx) = broadcaster.sessions().register();

    // 1500 admissions faster than any drain.
    for i in 0..1500u64 {
        broadcaster.enqueue(event_at(i));
    }

    // Drain everything the queue retained.
    let mut received = Vec::new();
    let mut markers = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
            Ok(Some(frame)) => {
                let batch: BatchEnvelope = serde_json::from_str(&frame).unwrap();
                for event in batch.events {
                    if event.is_gap_marker() {
                        markers.push(event);
                    } else {
                        received.push(event);
                    }
                }
            }
            _ => break,
        }
    }

    assert_eq!(received.len(), QUEUE_SOFT_CAP);
    assert_eq!(markers.len(), 1, "one marker per episode, not per drop");
    match &markers[0].kind {
        EventKind::Unknown(u) => {
            let gap = u.gap.as_ref().unwrap();
            assert_eq!(gap.dropped_count, 500);
            assert_eq!(gap.to_offset, 499);
        }
        other => panic!("expected unknown variant, got {other:?}"),
    }

    // The retained events are the newest 1000, in order.
    let offsets: Vec<u64> = received
        .iter()
        .map(|e| e.id.as_ref().unwrap().offset().unwrap())
        .collect();
    assert_eq!(offsets.first(), Some(&500));
    assert_eq!(offsets.last(), Some(&1499));
    assert!(offsets.windows(2).all(|w| w[0] < w[1]));

    assert_eq!(broadcaster.metrics().snapshot().events_dropped, 500);
}

#[tokio::test(start_paused = true)]
async fn test_paced_client_receives_everything() {
    let broadcaster = Broadcaster::new();
    let (_session, mut rx) = broadcaster.sessions().register();

    // Admissions paced under the soft cap: nothing drops, the client
    // sees all 1500 events in order.
    let mut total = 0usize;
    let mut last_offset = None;
    for chunk in 0..15u64 {
        for i in 0..100u64 {
            broadcaster.enqueue(event_at(chunk * 100 + i));
        }
        loop {
            let batch = recv_batch(&mut rx).await;
            for event in &batch.events {
                let offset = event.id.as_ref().unwrap().offset().unwrap();
                if let Some(prev) = last_offset {
                    assert!(offset > prev);
                }
                last_offset = Some(offset);
                total += 1;
            }
            if total % 100 == 0 {
                break;
            }
        }
    }

    assert_eq!(total, 1500);
    assert_eq!(broadcaster.metrics().snapshot().events_dropped, 0);
}

// ============================================================================
// Eviction
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_closed_session_evicted_on_flush() {
    let broadcaster = Broadcaster::new();
    let (_alive, mut rx_alive) = broadcaster.sessions().register();
    let (_gone, rx_gone) = broadcaster.sessions().register();
    drop(rx_gone);

    broadcaster.enqueue(event_at(0));

    let batch = recv_batch(&mut rx_alive).await;
    assert_eq!(batch.events.len(), 1);
    assert_eq!(broadcaster.sessions().count(), 1);
    assert_eq!(broadcaster.metrics().snapshot().sessions_evicted, 1);
}
