//! Utility functions for the CLI.

use clap::ValueEnum;
use dialoguer::Select;
use indicatif::{ProgressBar, ProgressStyle};
use oxizip_archive::zip::ExtractConflict;
use oxizip_archive::{
    ArchiveListener, CompressionMethod, ConflictResolution, Control, EncryptionAlgorithm,
    ExtractExistingFileAction, ProgressEvent, ProgressKind, Zip64Mode,
};
use std::path::PathBuf;

/// Compression method flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MethodArg {
    /// Store without compression
    Stored,
    /// Deflate
    Deflate,
}

impl From<MethodArg> for CompressionMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Stored => Self::Stored,
            MethodArg::Deflate => Self::Deflate,
        }
    }
}

/// Encryption flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EncryptionArg {
    /// No encryption
    None,
    /// Traditional PKWARE encryption (weak)
    Zipcrypto,
    /// WinZip AES-128
    Aes128,
    /// WinZip AES-256
    Aes256,
}

impl From<EncryptionArg> for EncryptionAlgorithm {
    fn from(arg: EncryptionArg) -> Self {
        match arg {
            EncryptionArg::None => Self::None,
            EncryptionArg::Zipcrypto => Self::PkzipWeak,
            EncryptionArg::Aes128 => Self::WinZipAes128,
            EncryptionArg::Aes256 => Self::WinZipAes256,
        }
    }
}

/// Zip64 policy flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Zip64Arg {
    /// Fail if the archive needs Zip64
    Never,
    /// Use Zip64 only where needed
    AsNecessary,
    /// Always write Zip64 records
    Always,
}

impl From<Zip64Arg> for Zip64Mode {
    fn from(arg: Zip64Arg) -> Self {
        match arg {
            Zip64Arg::Never => Self::Never,
            Zip64Arg::AsNecessary => Self::AsNecessary,
            Zip64Arg::Always => Self::Always,
        }
    }
}

/// Existing-file policy flag for extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OverwriteArg {
    /// Fail on the first existing file
    Throw,
    /// Replace existing files
    Overwrite,
    /// Keep existing files
    Skip,
    /// Ask for each existing file
    Ask,
}

impl From<OverwriteArg> for ExtractExistingFileAction {
    fn from(arg: OverwriteArg) -> Self {
        match arg {
            OverwriteArg::Throw => Self::Throw,
            OverwriteArg::Overwrite => Self::OverwriteSilently,
            OverwriteArg::Skip => Self::DoNotOverwrite,
            OverwriteArg::Ask => Self::InvokeExtractProgressEvent,
        }
    }
}

/// Create a progress bar with standard styling.
pub fn create_progress_bar(len: u64, enable: bool) -> ProgressBar {
    if !enable {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("█▓▒░ "));
    }
    pb
}

/// Listener that drives a progress bar from archive events and asks the
/// user about extraction conflicts.
pub struct CliListener {
    bar: ProgressBar,
    /// Answer given with "all", reused for later conflicts.
    sticky: Option<ConflictResolution>,
}

impl CliListener {
    pub fn new(enable: bool) -> Self {
        Self {
            bar: create_progress_bar(0, enable),
            sticky: None,
        }
    }

    fn ask(&mut self, conflict: &ExtractConflict<'_>) -> ConflictResolution {
        let prompt = format!("{} exists ({})", conflict.entry_name, conflict.path.display());
        let choices = ["overwrite", "skip", "overwrite all", "skip all", "abort"];
        let answer = self.bar.suspend(|| {
            Select::new()
                .with_prompt(prompt)
                .items(&choices)
                .default(1)
                .interact()
        });
        match answer {
            Ok(0) => ConflictResolution::Overwrite,
            Ok(1) => ConflictResolution::Skip,
            Ok(2) => {
                self.sticky = Some(ConflictResolution::Overwrite);
                ConflictResolution::Overwrite
            }
            Ok(3) => {
                self.sticky = Some(ConflictResolution::Skip);
                ConflictResolution::Skip
            }
            _ => ConflictResolution::Throw,
        }
    }
}

impl ArchiveListener for CliListener {
    fn on_progress(&mut self, event: &ProgressEvent<'_>) -> Control {
        match event.kind {
            ProgressKind::SaveStarted | ProgressKind::ExtractStarted => {
                self.bar.set_length(event.entries_total as u64);
            }
            ProgressKind::BeforeEntry => {
                if let Some(name) = event.entry_name {
                    self.bar.set_message(name.to_string());
                }
            }
            ProgressKind::AfterEntry => self.bar.inc(1),
            ProgressKind::SaveCompleted | ProgressKind::ExtractCompleted => {
                self.bar.finish_and_clear();
            }
            ProgressKind::EntryBytesTransferred => {}
        }
        Control::Continue
    }

    fn on_extract_conflict(&mut self, conflict: &ExtractConflict<'_>) -> ConflictResolution {
        match self.sticky {
            Some(answer) => answer,
            None => self.ask(conflict),
        }
    }
}

/// Expand glob patterns in command-line inputs. Arguments without glob
/// characters, or patterns that match nothing, pass through unchanged.
pub fn expand_inputs(inputs: &[String]) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for input in inputs {
        let is_pattern = input.contains(['*', '?', '[']);
        let matched: Vec<PathBuf> = if is_pattern {
            glob::glob(input)
                .map(|paths| paths.filter_map(|p| p.ok()).collect())
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        if matched.is_empty() {
            paths.push(PathBuf::from(input));
        } else {
            paths.extend(matched);
        }
    }
    paths
}

/// Format a byte count for humans.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KiB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn test_expand_inputs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        std::fs::write(dir.path().join("c.md"), b"c").unwrap();

        let pattern = format!("{}/*.txt", dir.path().display());
        let mut found = expand_inputs(&[pattern]);
        found.sort();
        assert_eq!(found, vec![dir.path().join("a.txt"), dir.path().join("b.txt")]);

        let literal = dir.path().join("missing.bin").display().to_string();
        assert_eq!(expand_inputs(std::slice::from_ref(&literal)), vec![PathBuf::from(literal)]);
    }

    #[test]
    fn test_flag_mapping() {
        assert_eq!(
            ExtractExistingFileAction::from(OverwriteArg::Ask),
            ExtractExistingFileAction::InvokeExtractProgressEvent
        );
        assert_eq!(EncryptionAlgorithm::from(EncryptionArg::Zipcrypto), EncryptionAlgorithm::PkzipWeak);
        assert_eq!(Zip64Mode::from(Zip64Arg::Never), Zip64Mode::Never);
    }
}
