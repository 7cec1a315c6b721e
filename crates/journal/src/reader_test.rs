//! Tests for the historical reader

use super::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn event_line(ts: f64, path: &str) -> String {
    format!(r#"{{"v":1,"ts":{ts:?},"type":"file_touch","session_id":"s","path":"{path}","kind":"read"}}"#)
}

fn write_log(lines: &[String]) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.jsonl");
    let mut data = lines.join("\n");
    if !lines.is_empty() {
        data.push('\n');
    }
    std::fs::write(&path, data).unwrap();
    (dir, path)
}

#[test]
fn test_ids_match_byte_offsets() {
    let lines = vec![
        event_line(1.0, "a.rs"),
        event_line(2.0, "bb.rs"),
        event_line(3.0, "ccc.rs"),
    ];
    let (_dir, path) = write_log(&lines);

    let page = read_history(&path, &HistoryQuery::default()).unwrap();
    assert_eq!(page.events.len(), 3);

    let mut expected = 0u64;
    for (event, line) in page.events.iter().zip(&lines) {
        assert_eq!(
            event.id.as_ref().unwrap().offset().unwrap(),
            expected,
            "id must equal line-start byte offset"
        );
        expected += line.len() as u64 + 1;
    }
}

#[test]
fn test_offsets_are_byte_exact_for_multibyte_utf8() {
    // Non-ASCII path: char count and byte count diverge.
    let lines = vec![event_line(1.0, "héllo.rs"), event_line(2.0, "b.rs")];
    let (_dir, path) = write_log(&lines);

    let page = read_history(&path, &HistoryQuery::default()).unwrap();
    assert_eq!(
        page.events[1].id.as_ref().unwrap().offset().unwrap(),
        lines[0].len() as u64 + 1
    );
}

#[test]
fn test_missing_log_yields_empty_page() {
    let dir = TempDir::new().unwrap();
    let page = read_history(&dir.path().join("absent.jsonl"), &HistoryQuery::default()).unwrap();
    assert!(page.events.is_empty());
    assert!(page.next_before.is_none());
}

#[test]
fn test_corrupt_and_blank_lines_skipped() {
    let lines = vec![
        event_line(1.0, "a.rs"),
        "{broken json".to_string(),
        String::new(),
        event_line(2.0, "b.rs"),
    ];
    let (_dir, path) = write_log(&lines);

    let page = read_history(&path, &HistoryQuery::default()).unwrap();
    assert_eq!(page.events.len(), 2);

    // The good line after the corrupt one still gets its true offset.
    let expected = lines[0].len() as u64 + 1 + lines[1].len() as u64 + 1 + 1;
    assert_eq!(
        page.events[1].id.as_ref().unwrap().offset().unwrap(),
        expected
    );
}

#[test]
fn test_trailing_partial_line_ignored() {
    let (_dir, path) = write_log(&[event_line(1.0, "a.rs")]);
    let mut data = std::fs::read(&path).unwrap();
    data.extend_from_slice(br#"{"v":1,"ts":2.0,"type":"file_"#);
    std::fs::write(&path, data).unwrap();

    let page = read_history(&path, &HistoryQuery::default()).unwrap();
    assert_eq!(page.events.len(), 1);
}

#[test]
fn test_tail_returns_newest_ascending() {
    let lines: Vec<String> = (0..10).map(|i| event_line(i as f64, "f.rs")).collect();
    let (_dir, path) = write_log(&lines);

    let query = HistoryQuery {
        tail: Some(3),
        ..HistoryQuery::default()
    };
    let page = read_history(&path, &query).unwrap();

    let ts: Vec<f64> = page.events.iter().map(|e| e.ts).collect();
    assert_eq!(ts, vec![7.0, 8.0, 9.0]);
    assert_eq!(page.next_before, Some(7.0));
}

#[test]
fn test_before_ts_pagination() {
    let lines: Vec<String> = (0..10).map(|i| event_line(i as f64, "f.rs")).collect();
    let (_dir, path) = write_log(&lines);

    let query = HistoryQuery {
        before_ts: Some(7.0),
        limit: Some(3),
        ..HistoryQuery::default()
    };
    let page = read_history(&path, &query).unwrap();

    let ts: Vec<f64> = page.events.iter().map(|e| e.ts).collect();
    assert_eq!(ts, vec![4.0, 5.0, 6.0]);
    assert_eq!(page.next_before, Some(4.0));

    // Following the cursor eventually reaches the log start.
    let query = HistoryQuery {
        before_ts: Some(3.0),
        limit: Some(5),
        ..HistoryQuery::default()
    };
    let page = read_history(&path, &query).unwrap();
    let ts: Vec<f64> = page.events.iter().map(|e| e.ts).collect();
    assert_eq!(ts, vec![0.0, 1.0, 2.0]);
    assert_eq!(page.next_before, None);
}

#[test]
fn test_limit_clamped_to_maximum() {
    let (_dir, path) = write_log(&[event_line(1.0, "a.rs")]);
    let query = HistoryQuery {
        limit: Some(50_000),
        ..HistoryQuery::default()
    };
    // Must not panic or over-allocate; a single event comes back.
    let page = read_history(&path, &query).unwrap();
    assert_eq!(page.events.len(), 1);
}

#[test]
fn test_live_and_historical_ids_agree() {
    // Re-reading the log yields the same sequence of IDs a live tail
    // would have produced.
    use pulse_protocol::{Event, EventKind, TouchKind};

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.jsonl");
    let journal = crate::Journal::new(&path);

    let mut appended_offsets = Vec::new();
    for i in 0..5 {
        let event = Event::new(
            i as f64,
            "s",
            EventKind::FileTouch {
                path: format!("file{i}.rs"),
                kind: TouchKind::Write,
            },
        );
        appended_offsets.push(journal.append(&event).unwrap());
    }

    let page = read_history(&path, &HistoryQuery::default()).unwrap();
    let read_offsets: Vec<u64> = page
        .events
        .iter()
        .map(|e| e.id.as_ref().unwrap().offset().unwrap())
        .collect();
    assert_eq!(read_offsets, appended_offsets);
}
