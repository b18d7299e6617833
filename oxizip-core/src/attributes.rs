//! File attributes.
//!
//! ZIP stores attributes in the 32-bit "external attributes" field of the
//! central directory: the low 16 bits carry the DOS/Windows attribute
//! bitmask, the high 16 bits carry the Unix mode when the entry was made on
//! a Unix host.

/// DOS/Windows attribute bits plus an optional Unix mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileAttributes {
    /// DOS/Windows attribute bitmask.
    pub dos: u32,
    /// Unix mode bits (file type and permissions), if known.
    pub unix_mode: Option<u32>,
}

impl FileAttributes {
    /// Read-only file.
    pub const READ_ONLY: u32 = 0x0001;
    /// Hidden file.
    pub const HIDDEN: u32 = 0x0002;
    /// System file.
    pub const SYSTEM: u32 = 0x0004;
    /// Directory.
    pub const DIRECTORY: u32 = 0x0010;
    /// Archive bit.
    pub const ARCHIVE: u32 = 0x0020;
    /// No other attributes set.
    pub const NORMAL: u32 = 0x0080;
    /// Reparse point (symlink, junction).
    pub const REPARSE_POINT: u32 = 0x0400;
    /// Not content indexed.
    pub const NOT_CONTENT_INDEXED: u32 = 0x2000;

    /// Create empty attributes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create attributes from a DOS bitmask.
    pub fn from_dos(dos: u32) -> Self {
        Self {
            dos,
            unix_mode: None,
        }
    }

    /// Set the Unix mode.
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.unix_mode = Some(mode);
        self
    }

    /// Set additional DOS bits.
    pub fn with_dos(mut self, bits: u32) -> Self {
        self.dos |= bits;
        self
    }

    /// Check whether every bit in `mask` is set.
    pub fn contains(&self, mask: u32) -> bool {
        self.dos & mask == mask
    }

    /// Check if the entry is read-only.
    pub fn is_readonly(&self) -> bool {
        if self.dos & Self::READ_ONLY != 0 {
            true
        } else if let Some(mode) = self.unix_mode {
            mode & 0o222 == 0
        } else {
            false
        }
    }

    /// Check if the entry is hidden.
    pub fn is_hidden(&self) -> bool {
        self.dos & Self::HIDDEN != 0
    }

    /// Map a selector attribute letter to its DOS bit.
    ///
    /// `H` hidden, `R` read-only, `S` system, `A` archive, `I` not content
    /// indexed, `L` reparse point.
    pub fn bit_for_letter(letter: char) -> Option<u32> {
        match letter.to_ascii_uppercase() {
            'H' => Some(Self::HIDDEN),
            'R' => Some(Self::READ_ONLY),
            'S' => Some(Self::SYSTEM),
            'A' => Some(Self::ARCHIVE),
            'I' => Some(Self::NOT_CONTENT_INDEXED),
            'L' => Some(Self::REPARSE_POINT),
            _ => None,
        }
    }

    /// Derive attributes from filesystem metadata.
    ///
    /// `meta` should come from `symlink_metadata` so links are reported as
    /// reparse points. On Windows the native attribute word is used as is;
    /// elsewhere hidden is inferred from a leading `.` in `file_name`.
    pub fn from_metadata(meta: &std::fs::Metadata, file_name: &str) -> Self {
        #[cfg(windows)]
        {
            use std::os::windows::fs::MetadataExt;
            let _ = file_name;
            Self::from_dos(meta.file_attributes())
        }
        #[cfg(not(windows))]
        {
            let mut dos = 0;
            if meta.is_dir() {
                dos |= Self::DIRECTORY;
            } else {
                dos |= Self::ARCHIVE;
            }
            if meta.permissions().readonly() {
                dos |= Self::READ_ONLY;
            }
            if file_name.starts_with('.') && file_name != "." && file_name != ".." {
                dos |= Self::HIDDEN;
            }
            if meta.file_type().is_symlink() {
                dos |= Self::REPARSE_POINT;
            }
            let attrs = Self::from_dos(dos);
            #[cfg(unix)]
            let attrs = {
                use std::os::unix::fs::PermissionsExt;
                attrs.with_mode(meta.permissions().mode())
            };
            attrs
        }
    }

    /// Pack into the ZIP external attributes field.
    pub fn to_external(&self) -> u32 {
        let high = self.unix_mode.map_or(0, |mode| (mode & 0xFFFF) << 16);
        high | (self.dos & 0xFFFF)
    }

    /// Unpack from the ZIP external attributes field.
    ///
    /// `unix_host` tells whether the high half carries a Unix mode (the
    /// "version made by" host byte is 3).
    pub fn from_external(external: u32, unix_host: bool) -> Self {
        let mode = external >> 16;
        Self {
            dos: external & 0xFFFF,
            unix_mode: if unix_host && mode != 0 {
                Some(mode)
            } else {
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters() {
        assert_eq!(FileAttributes::bit_for_letter('h'), Some(FileAttributes::HIDDEN));
        assert_eq!(
            FileAttributes::bit_for_letter('L'),
            Some(FileAttributes::REPARSE_POINT)
        );
        assert_eq!(FileAttributes::bit_for_letter('X'), None);
    }

    #[test]
    fn test_external_roundtrip() {
        let attrs = FileAttributes::from_dos(FileAttributes::ARCHIVE | FileAttributes::HIDDEN)
            .with_mode(0o100644);
        let external = attrs.to_external();
        assert_eq!(FileAttributes::from_external(external, true), attrs);

        let dos_only = FileAttributes::from_external(external, false);
        assert_eq!(dos_only.unix_mode, None);
        assert!(dos_only.is_hidden());
    }

    #[cfg(unix)]
    #[test]
    fn test_from_metadata() {
        let dir = std::env::temp_dir();
        let meta = std::fs::symlink_metadata(&dir).unwrap();
        let attrs = FileAttributes::from_metadata(&meta, ".cache");
        assert!(attrs.contains(FileAttributes::DIRECTORY | FileAttributes::HIDDEN));
        assert!(attrs.unix_mode.is_some());
    }

    #[test]
    fn test_readonly() {
        assert!(FileAttributes::from_dos(FileAttributes::READ_ONLY).is_readonly());
        assert!(FileAttributes::new().with_mode(0o100444).is_readonly());
        assert!(!FileAttributes::new().with_mode(0o100644).is_readonly());
    }
}
