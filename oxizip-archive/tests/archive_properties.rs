//! Whole-archive behaviour: round trips, duplicates, Zip64 limits,
//! cancellation, passwords and parallel deflate.

use oxizip_archive::zip::PARALLEL_BLOCK_SIZE;
use oxizip_archive::{
    CompressionMethod, Control, EncryptionAlgorithm, ErrorKind, OxiZipError, ProgressEvent,
    ProgressFn, ProgressKind, Zip64Mode, ZipArchive,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

fn random_bytes(rng: &mut StdRng, len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}

/// Word salad: compressible but not trivially so.
fn text_bytes(rng: &mut StdRng, len: usize) -> Vec<u8> {
    const WORDS: [&str; 8] = ["zip ", "deflate ", "archive ", "entry ", "crc ", "zip64 ", "aes ", "\n"];
    let mut data = Vec::with_capacity(len + 8);
    while data.len() < len {
        data.extend_from_slice(WORDS[rng.gen_range(0..WORDS.len())].as_bytes());
    }
    data.truncate(len);
    data
}

fn dir_listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_round_trip_preserves_content_and_metadata() {
    let mut rng = StdRng::seed_from_u64(0x5EED_0001);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("round.zip");
    let when = UNIX_EPOCH + Duration::from_secs(1_650_000_000);

    let cases: Vec<(String, Vec<u8>, CompressionMethod, EncryptionAlgorithm)> = vec![
        ("empty.txt".into(), Vec::new(), CompressionMethod::Deflate, EncryptionAlgorithm::None),
        ("one.bin".into(), random_bytes(&mut rng, 1), CompressionMethod::Stored, EncryptionAlgorithm::None),
        ("docs/text.txt".into(), text_bytes(&mut rng, 300_000), CompressionMethod::Deflate, EncryptionAlgorithm::None),
        ("noise.bin".into(), random_bytes(&mut rng, 70_000), CompressionMethod::Deflate, EncryptionAlgorithm::None),
        ("crypt/weak.txt".into(), text_bytes(&mut rng, 5_000), CompressionMethod::Deflate, EncryptionAlgorithm::PkzipWeak),
        ("crypt/aes128.txt".into(), text_bytes(&mut rng, 5_000), CompressionMethod::Deflate, EncryptionAlgorithm::WinZipAes128),
        ("crypt/aes256.bin".into(), random_bytes(&mut rng, 4_000), CompressionMethod::Stored, EncryptionAlgorithm::WinZipAes256),
        ("données/été.txt".into(), "non-ASCII name".into(), CompressionMethod::Deflate, EncryptionAlgorithm::None),
    ];

    let mut zip = ZipArchive::new();
    zip.set_comment("round trip");
    zip.add_directory_entry("empty-dir").unwrap();
    for (name, data, method, encryption) in &cases {
        let entry = zip.add_entry(name, data.clone()).unwrap();
        entry.set_compression_method(*method);
        entry.set_modified(when);
        entry.set_comment(format!("comment for {name}"));
        if encryption.is_encrypted() {
            entry.set_password(Some("s3cret"));
            entry.set_encryption(*encryption);
        }
    }
    let report = zip.save_as(&path).unwrap();
    assert_eq!(report.written, cases.len() + 1);
    assert!(report.skipped.is_empty());

    let mut loaded = ZipArchive::open(&path).unwrap();
    loaded.set_password(Some("s3cret"));
    assert_eq!(loaded.comment(), "round trip");
    assert_eq!(loaded.len(), cases.len() + 1);
    assert!(loaded.entry("empty-dir").unwrap().is_directory());

    for (name, data, method, encryption) in &cases {
        let entry = loaded.entry(name).unwrap();
        assert_eq!(entry.uncompressed_size(), data.len() as u64, "{name}");
        assert_eq!(entry.compression_method(), *method, "{name}");
        assert_eq!(entry.encryption(), *encryption, "{name}");
        assert_eq!(entry.comment(), format!("comment for {name}"));
        assert_eq!(entry.times().modified, Some(when), "{name}");
        assert_eq!(entry.crc32(), crc32fast::hash(data), "{name}");
        assert_eq!(&loaded.read_entry(name).unwrap(), data, "{name}");
    }
    assert_eq!(loaded.test_all().unwrap(), cases.len());
}

#[test]
fn test_update_copies_unchanged_entries_raw() {
    let mut rng = StdRng::seed_from_u64(0x5EED_0002);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("update.zip");
    let secret = text_bytes(&mut rng, 20_000);

    let mut zip = ZipArchive::new();
    zip.set_password(Some("pw"));
    zip.set_encryption(EncryptionAlgorithm::WinZipAes256);
    zip.add_entry("secret.txt", secret.clone()).unwrap();
    zip.set_password(None);
    zip.add_entry("keep.txt", "unchanged").unwrap();
    zip.add_entry("drop.txt", "going away").unwrap();
    zip.save_as(&path).unwrap();
    let before = ZipArchive::open(&path).unwrap();
    let secret_size = before.entry("secret.txt").unwrap().compressed_size();

    // No password is known now: the encrypted entry must be copied as is.
    let mut zip = ZipArchive::open(&path).unwrap();
    zip.remove_entry("drop.txt").unwrap();
    zip.update_entry("keep.txt", "changed").unwrap();
    zip.add_entry("new.txt", "fresh").unwrap();
    zip.rename_entry("secret.txt", "vault/secret.txt").unwrap();
    zip.save().unwrap();

    let mut after = ZipArchive::open(&path).unwrap();
    assert_eq!(after.entry_names(), vec!["vault/secret.txt", "keep.txt", "new.txt"]);
    assert_eq!(after.entry("vault/secret.txt").unwrap().compressed_size(), secret_size);
    assert_eq!(after.read_entry("keep.txt").unwrap(), b"changed");
    assert_eq!(after.read_entry("new.txt").unwrap(), b"fresh");
    after.entry_mut("vault/secret.txt").unwrap().set_password(Some("pw"));
    assert_eq!(after.read_entry("vault/secret.txt").unwrap(), secret);
}

#[test]
fn test_recompress_existing_entry() {
    let mut rng = StdRng::seed_from_u64(0x5EED_0003);
    let data = text_bytes(&mut rng, 50_000);
    let mut zip = ZipArchive::new();
    zip.add_entry("a.txt", data.clone()).unwrap().set_compression_method(CompressionMethod::Stored);
    let mut buf = Cursor::new(Vec::new());
    zip.save_to(&mut buf).unwrap();

    let mut zip = ZipArchive::from_bytes(buf.into_inner()).unwrap();
    zip.entry_mut("a.txt").unwrap().set_compression_method(CompressionMethod::Deflate);
    let mut out = Cursor::new(Vec::new());
    zip.save_to(&mut out).unwrap();

    let mut reloaded = ZipArchive::from_bytes(out.into_inner()).unwrap();
    let entry = reloaded.entry("a.txt").unwrap();
    assert_eq!(entry.compression_method(), CompressionMethod::Deflate);
    assert!(entry.compressed_size() < data.len() as u64);
    assert_eq!(reloaded.read_entry("a.txt").unwrap(), data);
}

#[test]
fn test_duplicate_rejection_leaves_no_partial_state() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"disk").unwrap();
    fs::write(dir.path().join("b.txt"), b"disk").unwrap();

    let mut zip = ZipArchive::new();
    zip.add_entry("B.TXT", "memory").unwrap();
    let err = zip.add_entry("b.txt", "again").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateEntry);
    let err = zip.add_selected_files("*.txt", dir.path(), "", false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateEntry);
    assert_eq!(zip.entry_names(), vec!["B.TXT"]);

    let mut strict = ZipArchive::new();
    strict.set_case_sensitive_retrieval(true).unwrap();
    strict.add_entry("B.TXT", "memory").unwrap();
    strict.add_selected_files("*.txt", dir.path(), "", false).unwrap();
    assert_eq!(strict.len(), 3);
}

#[test]
fn test_zip64_entry_count_boundary() {
    let count = 0xFFFF;
    let mut zip = ZipArchive::new();
    zip.set_compression_method(CompressionMethod::Stored);
    zip.set_buffer_size(4096);
    zip.set_timestamp_formats(oxizip_archive::TimestampFormats {
        windows: false,
        unix: false,
    });
    for i in 0..count {
        zip.add_entry(&format!("f{i:05}"), Vec::new()).unwrap();
    }

    zip.set_zip64(Zip64Mode::Never);
    let err = zip.save_to(Cursor::new(Vec::new())).unwrap_err();
    assert!(matches!(err, OxiZipError::Zip64Required { .. }), "{err}");

    zip.set_zip64(Zip64Mode::AsNecessary);
    let mut buf = Cursor::new(Vec::new());
    zip.save_to(&mut buf).unwrap();
    let loaded = ZipArchive::from_bytes(buf.into_inner()).unwrap();
    assert_eq!(loaded.len(), count);
    assert_eq!(loaded.entries()[count - 1].name(), "f65534");
}

#[test]
fn test_zip64_always_round_trips() {
    let mut zip = ZipArchive::new();
    zip.set_zip64(Zip64Mode::Always);
    zip.add_entry("a.txt", "alpha").unwrap();
    zip.add_directory_entry("d").unwrap();
    zip.add_entry("d/b.txt", "beta".repeat(1000)).unwrap();
    let mut buf = Cursor::new(Vec::new());
    zip.save_to(&mut buf).unwrap();

    let mut loaded = ZipArchive::from_bytes(buf.into_inner()).unwrap();
    assert_eq!(loaded.read_entry("a.txt").unwrap(), b"alpha");
    assert_eq!(loaded.read_entry("d/b.txt").unwrap(), "beta".repeat(1000).as_bytes());

    // Raw copy keeps the 64-bit records readable.
    let mut again = Cursor::new(Vec::new());
    loaded.save_to(&mut again).unwrap();
    let mut copy = ZipArchive::from_bytes(again.into_inner()).unwrap();
    assert_eq!(copy.read_entry("a.txt").unwrap(), b"alpha");
}

fn cancel_after_first_entry() -> ProgressFn<impl FnMut(&ProgressEvent<'_>) -> Control> {
    ProgressFn(|e: &ProgressEvent<'_>| {
        if e.kind == ProgressKind::AfterEntry {
            Control::Cancel
        } else {
            Control::Continue
        }
    })
}

#[test]
fn test_cancelled_save_leaves_existing_archive_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keep.zip");
    let mut zip = ZipArchive::new();
    zip.add_entry("original.txt", "original").unwrap();
    zip.save_as(&path).unwrap();
    let original = fs::read(&path).unwrap();

    let mut zip = ZipArchive::open(&path).unwrap();
    zip.add_entry("one.txt", "1").unwrap();
    zip.add_entry("two.txt", "2").unwrap();
    let err = zip.save_with_listener(&mut cancel_after_first_entry()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(fs::read(&path).unwrap(), original);
    assert_eq!(dir_listing(dir.path()), vec!["keep.zip"]);
}

#[test]
fn test_cancelled_save_of_new_archive_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("new.zip");
    let mut zip = ZipArchive::new();
    zip.add_entry("a", "a").unwrap();
    zip.add_entry("b", "b").unwrap();
    let err = zip.save_as_with_listener(&path, &mut cancel_after_first_entry()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(!path.exists());
    assert!(dir_listing(dir.path()).is_empty());
    assert!(zip.path().is_none());
}

#[test]
fn test_passwords_are_isolated_per_entry() {
    let mut zip = ZipArchive::new();
    zip.set_password(Some("alpha"));
    zip.add_entry("a.txt", "for alpha").unwrap();
    zip.set_password(None);
    zip.add_entry("plain.txt", "for anyone").unwrap();
    zip.set_password(Some("beta"));
    zip.set_encryption(EncryptionAlgorithm::WinZipAes256);
    zip.add_entry("b.txt", "for beta").unwrap();
    let mut buf = Cursor::new(Vec::new());
    zip.save_to(&mut buf).unwrap();
    let bytes = buf.into_inner();

    let mut loaded = ZipArchive::from_bytes(bytes.clone()).unwrap();
    assert_eq!(loaded.entry("a.txt").unwrap().encryption(), EncryptionAlgorithm::PkzipWeak);
    assert_eq!(loaded.entry("plain.txt").unwrap().encryption(), EncryptionAlgorithm::None);
    assert_eq!(loaded.read_entry("plain.txt").unwrap(), b"for anyone");
    assert!(matches!(
        loaded.read_entry("a.txt").unwrap_err(),
        OxiZipError::BadPassword { .. }
    ));

    loaded.set_password(Some("beta"));
    assert_eq!(loaded.read_entry("b.txt").unwrap(), b"for beta");
    assert!(loaded.read_entry("a.txt").is_err());

    loaded.entry_mut("a.txt").unwrap().set_password(Some("alpha"));
    assert_eq!(loaded.read_entry("a.txt").unwrap(), b"for alpha");

    let mut wrong = ZipArchive::from_bytes(bytes).unwrap();
    wrong.set_password(Some("gamma"));
    assert!(matches!(
        wrong.read_entry("b.txt").unwrap_err(),
        OxiZipError::BadPassword { .. } | OxiZipError::AuthenticationFailed { .. }
    ));
}

#[test]
fn test_entry_password_alone_encrypts() {
    let mut zip = ZipArchive::new();
    zip.add_entry("secret.txt", "TOPSECRETDATA").unwrap().set_password(Some("pw"));
    let mut buf = Cursor::new(Vec::new());
    zip.save_to(&mut buf).unwrap();
    let bytes = buf.into_inner();
    assert!(!bytes.windows(13).any(|w| w == b"TOPSECRETDATA"));

    let mut loaded = ZipArchive::from_bytes(bytes).unwrap();
    assert_eq!(loaded.entry("secret.txt").unwrap().encryption(), EncryptionAlgorithm::PkzipWeak);
    assert!(loaded.read_entry("secret.txt").is_err());
    loaded.entry_mut("secret.txt").unwrap().set_password(Some("pw"));
    assert_eq!(loaded.read_entry("secret.txt").unwrap(), b"TOPSECRETDATA");
}

#[test]
fn test_password_on_saved_plain_entry_reencrypts() {
    let mut zip = ZipArchive::new();
    zip.add_entry("notes.txt", "PLAINTEXTNOTES").unwrap();
    let mut buf = Cursor::new(Vec::new());
    zip.save_to(&mut buf).unwrap();

    let mut zip = ZipArchive::from_bytes(buf.into_inner()).unwrap();
    zip.entry_mut("notes.txt").unwrap().set_password(Some("pw"));
    let mut out = Cursor::new(Vec::new());
    zip.save_to(&mut out).unwrap();
    let bytes = out.into_inner();
    assert!(!bytes.windows(14).any(|w| w == b"PLAINTEXTNOTES"));

    let mut loaded = ZipArchive::from_bytes(bytes).unwrap();
    loaded.set_password(Some("pw"));
    assert_eq!(loaded.read_entry("notes.txt").unwrap(), b"PLAINTEXTNOTES");
}

#[test]
fn test_recompress_encrypted_entry_with_archive_password() {
    let mut zip = ZipArchive::new();
    zip.set_password(Some("pw"));
    zip.set_encryption(EncryptionAlgorithm::WinZipAes256);
    zip.add_entry("a.txt", "aaaa bbbb aaaa bbbb aaaa bbbb").unwrap();
    let mut buf = Cursor::new(Vec::new());
    zip.save_to(&mut buf).unwrap();

    let mut zip = ZipArchive::from_bytes(buf.into_inner()).unwrap();
    zip.set_password(Some("pw"));
    zip.entry_mut("a.txt").unwrap().set_compression_level(9);
    let mut out = Cursor::new(Vec::new());
    zip.save_to(&mut out).unwrap();

    let mut loaded = ZipArchive::from_bytes(out.into_inner()).unwrap();
    assert_eq!(loaded.entry("a.txt").unwrap().encryption(), EncryptionAlgorithm::WinZipAes256);
    loaded.set_password(Some("pw"));
    assert_eq!(loaded.read_entry("a.txt").unwrap(), b"aaaa bbbb aaaa bbbb aaaa bbbb");
}

#[test]
fn test_resave_with_new_password_keeps_old_entries_on_old_password() {
    let mut zip = ZipArchive::new();
    zip.set_password(Some("alpha"));
    zip.add_entry("old.txt", "for alpha").unwrap();
    let mut buf = Cursor::new(Vec::new());
    zip.save_to(&mut buf).unwrap();

    let mut zip = ZipArchive::from_bytes(buf.into_inner()).unwrap();
    zip.set_password(Some("beta"));
    zip.add_entry("new.txt", "for beta").unwrap();
    let mut out = Cursor::new(Vec::new());
    zip.save_to(&mut out).unwrap();
    let bytes = out.into_inner();

    let mut loaded = ZipArchive::from_bytes(bytes.clone()).unwrap();
    loaded.set_password(Some("beta"));
    assert_eq!(loaded.read_entry("new.txt").unwrap(), b"for beta");
    assert!(loaded.read_entry("old.txt").is_err());

    let mut loaded = ZipArchive::from_bytes(bytes).unwrap();
    loaded.set_password(Some("alpha"));
    assert_eq!(loaded.read_entry("old.txt").unwrap(), b"for alpha");
    assert!(loaded.read_entry("new.txt").is_err());
}

#[test]
fn test_parallel_deflate_matches_serial() {
    let mut rng = StdRng::seed_from_u64(0x5EED_0004);
    let data = text_bytes(&mut rng, 3 * PARALLEL_BLOCK_SIZE + 12_345);

    let save = |threshold: i64| {
        let mut zip = ZipArchive::new();
        zip.set_parallel_deflate_threshold(threshold).unwrap();
        zip.add_entry("big.txt", data.clone()).unwrap();
        let mut buf = Cursor::new(Vec::new());
        zip.save_to(&mut buf).unwrap();
        ZipArchive::from_bytes(buf.into_inner()).unwrap()
    };
    let mut serial = save(-1);
    let mut parallel = save(PARALLEL_BLOCK_SIZE as i64);

    let (s, p) = (serial.entry("big.txt").unwrap(), parallel.entry("big.txt").unwrap());
    assert_eq!(s.crc32(), p.crc32());
    assert_eq!(s.uncompressed_size(), p.uncompressed_size());
    assert_eq!(serial.read_entry("big.txt").unwrap(), data);
    assert_eq!(parallel.read_entry("big.txt").unwrap(), data);
}

#[test]
fn test_sort_before_saving() {
    let mut zip = ZipArchive::new();
    for name in ["b.txt", "C.txt", "a.txt"] {
        zip.add_entry(name, name).unwrap();
    }
    zip.set_sort_entries_before_saving(true);
    let mut buf = Cursor::new(Vec::new());
    zip.save_to(&mut buf).unwrap();
    let loaded = ZipArchive::from_bytes(buf.into_inner()).unwrap();
    assert_eq!(loaded.entry_names(), vec!["a.txt", "b.txt", "C.txt"]);
}

#[test]
fn test_not_an_archive() {
    let err = ZipArchive::from_bytes(b"definitely not a zip file".to_vec()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRead);
}
