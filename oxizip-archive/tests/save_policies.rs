//! Error policy, retries and listener callbacks while saving.

use oxizip_archive::{
    ArchiveListener, Control, EntrySource, ErrorKind, ProgressEvent, ProgressKind, ZipArchive,
    ZipErrorAction,
};
use oxizip_archive::zip::EntryFailure;
use std::cell::Cell;
use std::fs;
use std::io::{self, Cursor, Read};
use std::rc::Rc;
use std::time::Duration;

/// Reader that fails after yielding some bytes.
struct Flaky {
    served: usize,
}

impl Read for Flaky {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.served >= 10 {
            return Err(io::Error::other("device went away"));
        }
        let n = buf.len().min(10 - self.served);
        buf[..n].fill(b'x');
        self.served += n;
        Ok(n)
    }
}

/// Opener that fails `failures` times, then yields `data`.
fn failing_opener(failures: u32, data: &'static [u8], calls: Rc<Cell<u32>>) -> EntrySource {
    EntrySource::opener(move || {
        calls.set(calls.get() + 1);
        if calls.get() <= failures {
            Ok(Box::new(Flaky { served: 0 }) as Box<dyn Read>)
        } else {
            Ok(Box::new(data) as Box<dyn Read>)
        }
    })
}

#[test]
fn test_throw_aborts_and_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.zip");
    let mut zip = ZipArchive::new();
    zip.add_entry("ok.txt", "fine").unwrap();
    zip.add_entry("missing.txt", EntrySource::file(dir.path().join("nope"))).unwrap();
    let err = zip.save_as(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IoError);
    assert!(!path.exists());
}

#[test]
fn test_skip_leaves_entry_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.zip");
    let mut zip = ZipArchive::new();
    zip.set_error_action(ZipErrorAction::Skip);
    zip.add_entry("first.txt", "1").unwrap();
    zip.add_entry("broken.txt", EntrySource::reader(Flaky { served: 0 })).unwrap();
    zip.add_entry("last.txt", "3").unwrap();
    let report = zip.save_as(&path).unwrap();
    assert_eq!(report.written, 2);
    assert_eq!(report.skipped, vec!["broken.txt".to_string()]);

    let mut loaded = ZipArchive::open(&path).unwrap();
    assert_eq!(loaded.entry_names(), vec!["first.txt", "last.txt"]);
    assert_eq!(loaded.read_entry("last.txt").unwrap(), b"3");
    assert_eq!(fs::metadata(&path).unwrap().len(), report.archive_size);
}

#[test]
fn test_per_entry_action_overrides_archive_action() {
    let mut zip = ZipArchive::new();
    zip.add_entry("a.txt", "a").unwrap();
    zip.add_entry("b.txt", EntrySource::reader(Flaky { served: 0 }))
        .unwrap()
        .set_error_action(Some(ZipErrorAction::Skip));
    let report = zip.save_to(Cursor::new(Vec::new())).unwrap();
    assert_eq!(report.skipped, vec!["b.txt".to_string()]);
}

#[test]
fn test_retry_reopens_source() {
    let calls = Rc::new(Cell::new(0));
    let mut zip = ZipArchive::new();
    zip.set_error_action(ZipErrorAction::Retry);
    zip.set_retry_delay(Duration::from_millis(1));
    zip.add_entry("retry.txt", failing_opener(2, b"third time lucky", calls.clone()))
        .unwrap();
    let mut buf = Cursor::new(Vec::new());
    let report = zip.save_to(&mut buf).unwrap();
    assert_eq!(report.written, 1);
    assert_eq!(calls.get(), 3);

    let mut loaded = ZipArchive::from_bytes(buf.into_inner()).unwrap();
    assert_eq!(loaded.read_entry("retry.txt").unwrap(), b"third time lucky");
}

#[test]
fn test_retry_exhaustion_falls_back() {
    let calls = Rc::new(Cell::new(0));
    let mut zip = ZipArchive::new();
    zip.set_error_action(ZipErrorAction::Retry);
    zip.set_max_retries(3);
    zip.set_retry_delay(Duration::ZERO);
    zip.add_entry("never.txt", failing_opener(u32::MAX, b"", calls.clone())).unwrap();

    let err = zip.save_to(Cursor::new(Vec::new())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IoError);
    assert_eq!(calls.get(), 3);

    calls.set(0);
    zip.set_retry_exhausted_action(ZipErrorAction::Skip);
    let report = zip.save_to(Cursor::new(Vec::new())).unwrap();
    assert_eq!(report.skipped, vec!["never.txt".to_string()]);
    assert_eq!(calls.get(), 3);
}

#[derive(Default)]
struct Recorder {
    kinds: Vec<ProgressKind>,
    failures: Vec<(String, u32)>,
    answer: Option<ZipErrorAction>,
}

impl ArchiveListener for Recorder {
    fn on_progress(&mut self, event: &ProgressEvent<'_>) -> Control {
        if self.kinds.last() != Some(&event.kind) || event.kind != ProgressKind::EntryBytesTransferred {
            self.kinds.push(event.kind);
        }
        Control::Continue
    }

    fn on_error(&mut self, failure: &EntryFailure<'_>) -> ZipErrorAction {
        self.failures.push((failure.entry_name.to_string(), failure.attempt));
        self.answer.unwrap_or(ZipErrorAction::Throw)
    }
}

#[test]
fn test_listener_sees_events_in_order() {
    let mut zip = ZipArchive::new();
    zip.add_entry("a.txt", "alpha").unwrap();
    zip.add_directory_entry("d").unwrap();
    let mut recorder = Recorder::default();
    zip.save_to_with_listener(Cursor::new(Vec::new()), &mut recorder).unwrap();
    assert_eq!(
        recorder.kinds,
        vec![
            ProgressKind::SaveStarted,
            ProgressKind::BeforeEntry,
            ProgressKind::EntryBytesTransferred,
            ProgressKind::AfterEntry,
            ProgressKind::BeforeEntry,
            ProgressKind::AfterEntry,
            ProgressKind::SaveCompleted,
        ]
    );
}

#[test]
fn test_error_event_lets_listener_decide() {
    let mut zip = ZipArchive::new();
    zip.set_error_action(ZipErrorAction::InvokeErrorEvent);
    zip.add_entry("bad.txt", EntrySource::reader(Flaky { served: 0 })).unwrap();
    zip.add_entry("good.txt", "good").unwrap();

    let mut recorder = Recorder {
        answer: Some(ZipErrorAction::Skip),
        ..Recorder::default()
    };
    let report = zip.save_to_with_listener(Cursor::new(Vec::new()), &mut recorder).unwrap();
    assert_eq!(recorder.failures, vec![("bad.txt".to_string(), 1)]);
    assert_eq!(report.skipped, vec!["bad.txt".to_string()]);
}

#[test]
fn test_listener_retries_then_skips() {
    let calls = Rc::new(Cell::new(0));
    let mut zip = ZipArchive::new();
    zip.set_error_action(ZipErrorAction::InvokeErrorEvent);
    zip.set_retry_delay(Duration::ZERO);
    zip.add_entry("stubborn.txt", failing_opener(u32::MAX, b"", calls.clone()))
        .unwrap();
    zip.add_entry("good.txt", "good").unwrap();

    struct RetryThenSkip {
        attempts: Vec<u32>,
    }
    impl ArchiveListener for RetryThenSkip {
        fn on_error(&mut self, failure: &EntryFailure<'_>) -> ZipErrorAction {
            self.attempts.push(failure.attempt);
            if failure.attempt < 5 {
                ZipErrorAction::Retry
            } else {
                ZipErrorAction::Skip
            }
        }
    }

    let mut listener = RetryThenSkip { attempts: Vec::new() };
    let report = zip.save_to_with_listener(Cursor::new(Vec::new()), &mut listener).unwrap();
    assert_eq!(listener.attempts, vec![1, 2, 3, 4, 5]);
    assert_eq!(calls.get(), 5);
    assert_eq!(report.skipped, vec!["stubborn.txt".to_string()]);
    assert_eq!(report.written, 1);
}

#[test]
fn test_vanished_file_hits_error_policy() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("stays.txt"), b"stays").unwrap();
    fs::write(dir.path().join("goes.txt"), b"goes").unwrap();

    let mut zip = ZipArchive::new();
    zip.add_directory(dir.path(), "").unwrap();
    fs::remove_file(dir.path().join("goes.txt")).unwrap();

    zip.set_error_action(ZipErrorAction::Skip);
    let report = zip.save_to(Cursor::new(Vec::new())).unwrap();
    assert_eq!(report.skipped, vec!["goes.txt".to_string()]);
    assert_eq!(report.written, 1);
}
