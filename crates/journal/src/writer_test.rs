//! Tests for journal appends

use super::*;
use pulse_protocol::{EventKind, TouchKind};
use tempfile::TempDir;

fn touch_event(path: &str) -> Event {
    Event::new(
        1.0,
        "s1",
        EventKind::FileTouch {
            path: path.to_string(),
            kind: TouchKind::Read,
        },
    )
}

#[test]
fn test_append_returns_line_start_offsets() {
    let dir = TempDir::new().unwrap();
    let journal = Journal::new(dir.path().join("events.jsonl"));

    let first = touch_event("a.rs");
    let second = touch_event("b.rs");

    assert_eq!(journal.append(&first).unwrap(), 0);
    let expected_second = first.to_line().len() as u64 + 1;
    assert_eq!(journal.append(&second).unwrap(), expected_second);
}

#[test]
fn test_every_line_newline_terminated() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.jsonl");
    let journal = Journal::new(&path);

    journal.append(&touch_event("a.rs")).unwrap();
    journal.append(&touch_event("b.rs")).unwrap();

    let data = std::fs::read(&path).unwrap();
    assert_eq!(*data.last().unwrap(), b'\n');
    assert_eq!(data.iter().filter(|&&b| b == b'\n').count(), 2);
}

#[test]
fn test_size_tracks_appends() {
    let dir = TempDir::new().unwrap();
    let journal = Journal::new(dir.path().join("events.jsonl"));

    assert_eq!(journal.size(), 0);

    let event = touch_event("a.rs");
    journal.append(&event).unwrap();
    assert_eq!(journal.size(), event.to_line().len() as u64 + 1);
}

#[test]
fn test_creates_missing_parent_dirs() {
    let dir = TempDir::new().unwrap();
    let journal = Journal::new(dir.path().join("nested/dir/events.jsonl"));
    journal.append(&touch_event("a.rs")).unwrap();
    assert!(journal.size() > 0);
}

#[test]
fn test_append_after_truncation_restarts_at_zero() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.jsonl");
    let journal = Journal::new(&path);

    journal.append(&touch_event("a.rs")).unwrap();
    std::fs::write(&path, b"").unwrap();

    assert_eq!(journal.append(&touch_event("b.rs")).unwrap(), 0);
}

#[cfg(unix)]
#[test]
fn test_signature_changes_on_replacement() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.jsonl");
    let journal = Journal::new(&path);

    journal.append(&touch_event("a.rs")).unwrap();
    let before = journal.signature().unwrap();

    std::fs::remove_file(&path).unwrap();
    journal.append(&touch_event("b.rs")).unwrap();
    let after = journal.signature().unwrap();

    assert_ne!(before, after);
}
