//! ZIP on-disk records.
//!
//! Layouts follow PKWARE APPNOTE 6.3: local file header, central directory
//! header, end of central directory (EOCD), Zip64 EOCD record and locator,
//! and data descriptor. All integers are little-endian.

use super::extra;
use oxizip_core::error::{OxiZipError, Result};
use oxizip_core::time::DosDateTime;
use std::io::{Read, Seek, SeekFrom, Write};
use tracing::debug;

/// Local file header signature (`PK\x03\x04`).
pub const LOCAL_FILE_HEADER_SIG: u32 = 0x0403_4B50;
/// Central directory header signature (`PK\x01\x02`).
pub const CENTRAL_DIR_HEADER_SIG: u32 = 0x0201_4B50;
/// End of central directory signature (`PK\x05\x06`).
pub const END_OF_CENTRAL_DIR_SIG: u32 = 0x0605_4B50;
/// Zip64 end of central directory record signature (`PK\x06\x06`).
pub const ZIP64_END_OF_CENTRAL_DIR_SIG: u32 = 0x0606_4B50;
/// Zip64 end of central directory locator signature (`PK\x06\x07`).
pub const ZIP64_LOCATOR_SIG: u32 = 0x0706_4B50;
/// Data descriptor signature (`PK\x07\x08`).
pub const DATA_DESCRIPTOR_SIG: u32 = 0x0807_4B50;

/// 32-bit field overflow marker.
pub const ZIP64_MARKER_32: u32 = 0xFFFF_FFFF;
/// 16-bit field overflow marker.
pub const ZIP64_MARKER_16: u16 = 0xFFFF;

/// Entry is encrypted.
pub const FLAG_ENCRYPTED: u16 = 0x0001;
/// CRC and sizes follow the data in a data descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
/// Name and comment are UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;

/// Compression method id for WinZip AES entries.
pub const METHOD_AES: u16 = 99;

/// Fixed part of a local file header.
pub const LOCAL_HEADER_LEN: u64 = 30;
/// Fixed part of a central directory header.
pub const CENTRAL_HEADER_LEN: u64 = 46;
/// Fixed part of the EOCD record.
pub const EOCD_LEN: u64 = 22;
/// Zip64 EOCD record length, signature included.
pub const ZIP64_EOCD_LEN: u64 = 56;
/// Zip64 EOCD locator length.
pub const ZIP64_LOCATOR_LEN: u64 = 20;

/// "Version made by" host byte for this platform (0 = DOS, 3 = Unix).
#[cfg(unix)]
pub const HOST_SYSTEM: u8 = 3;
/// "Version made by" host byte for this platform (0 = DOS, 3 = Unix).
#[cfg(not(unix))]
pub const HOST_SYSTEM: u8 = 0;

/// APPNOTE version we write (4.5: Zip64).
pub const VERSION_ZIP64: u16 = 45;
/// Version needed for deflate or folders.
pub const VERSION_DEFLATE: u16 = 20;
/// Version needed for stored entries.
pub const VERSION_STORED: u16 = 10;
/// Version needed for AES entries.
pub const VERSION_AES: u16 = 51;

/// "Version made by" field value.
pub fn version_made_by() -> u16 {
    (u16::from(HOST_SYSTEM) << 8) | VERSION_AES
}

pub(crate) fn le_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

pub(crate) fn le_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

pub(crate) fn le_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

fn clamp32(value: u64) -> u32 {
    if value >= u64::from(ZIP64_MARKER_32) {
        ZIP64_MARKER_32
    } else {
        value as u32
    }
}

fn len16(what: &str, len: usize) -> Result<u16> {
    u16::try_from(len)
        .map_err(|_| OxiZipError::invalid_argument(format!("{what} is too long ({len} bytes)")))
}

/// Local file header.
#[derive(Debug, Clone, Default)]
pub struct LocalFileHeader {
    /// Minimum version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flag.
    pub flags: u16,
    /// Compression method id as stored.
    pub method: u16,
    /// Last modification time.
    pub dos_time: DosDateTime,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Compressed size field (may be the Zip64 marker).
    pub compressed_size: u32,
    /// Uncompressed size field (may be the Zip64 marker).
    pub uncompressed_size: u32,
    /// Raw name bytes.
    pub name: Vec<u8>,
    /// Raw extra field.
    pub extra: Vec<u8>,
}

impl LocalFileHeader {
    /// Length of the header as written.
    pub fn len(&self) -> u64 {
        LOCAL_HEADER_LEN + self.name.len() as u64 + self.extra.len() as u64
    }

    /// Headers always carry at least the fixed part.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Write the header.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let name_len = len16("entry name", self.name.len())?;
        let extra_len = len16("extra field", self.extra.len())?;

        let mut buf = Vec::with_capacity(self.len() as usize);
        buf.extend_from_slice(&LOCAL_FILE_HEADER_SIG.to_le_bytes());
        buf.extend_from_slice(&self.version_needed.to_le_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.extend_from_slice(&self.method.to_le_bytes());
        buf.extend_from_slice(&self.dos_time.time.to_le_bytes());
        buf.extend_from_slice(&self.dos_time.date.to_le_bytes());
        buf.extend_from_slice(&self.crc32.to_le_bytes());
        buf.extend_from_slice(&self.compressed_size.to_le_bytes());
        buf.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        buf.extend_from_slice(&name_len.to_le_bytes());
        buf.extend_from_slice(&extra_len.to_le_bytes());
        buf.extend_from_slice(&self.name);
        buf.extend_from_slice(&self.extra);
        writer.write_all(&buf)?;
        Ok(())
    }

    /// Read a header at the current position.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; LOCAL_HEADER_LEN as usize];
        reader.read_exact(&mut buf)?;

        let signature = le_u32(&buf, 0);
        if signature != LOCAL_FILE_HEADER_SIG {
            return Err(OxiZipError::bad_read(format!(
                "bad local header signature {signature:#010x}"
            )));
        }

        let name_len = le_u16(&buf, 26) as usize;
        let extra_len = le_u16(&buf, 28) as usize;
        let mut name = vec![0u8; name_len];
        reader.read_exact(&mut name)?;
        let mut extra = vec![0u8; extra_len];
        reader.read_exact(&mut extra)?;

        Ok(Self {
            version_needed: le_u16(&buf, 4),
            flags: le_u16(&buf, 6),
            method: le_u16(&buf, 8),
            dos_time: DosDateTime {
                time: le_u16(&buf, 10),
                date: le_u16(&buf, 12),
            },
            crc32: le_u32(&buf, 14),
            compressed_size: le_u32(&buf, 18),
            uncompressed_size: le_u32(&buf, 22),
            name,
            extra,
        })
    }
}

/// Central directory header.
///
/// Sizes and offset are held at full width; [`CentralDirectoryHeader::write`]
/// moves whatever does not fit (or everything, when `force_zip64` is set)
/// into a Zip64 extra field.
#[derive(Debug, Clone, Default)]
pub struct CentralDirectoryHeader {
    /// Version made by (host byte and APPNOTE version).
    pub version_made_by: u16,
    /// Minimum version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flag.
    pub flags: u16,
    /// Compression method id as stored.
    pub method: u16,
    /// Last modification time.
    pub dos_time: DosDateTime,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u64,
    /// Uncompressed size.
    pub uncompressed_size: u64,
    /// Offset of the local header.
    pub local_header_offset: u64,
    /// Internal attributes.
    pub internal_attr: u16,
    /// External attributes.
    pub external_attr: u32,
    /// Raw name bytes.
    pub name: Vec<u8>,
    /// Extra fields other than Zip64.
    pub extra: Vec<u8>,
    /// Raw comment bytes.
    pub comment: Vec<u8>,
    /// Emit the Zip64 extra field even when values fit in 32 bits.
    pub force_zip64: bool,
}

impl CentralDirectoryHeader {
    /// Whether any value overflows its 32-bit field.
    pub fn needs_zip64(&self) -> bool {
        self.compressed_size >= u64::from(ZIP64_MARKER_32)
            || self.uncompressed_size >= u64::from(ZIP64_MARKER_32)
            || self.local_header_offset >= u64::from(ZIP64_MARKER_32)
    }

    fn zip64_extra(&self) -> Vec<u8> {
        let all = self.force_zip64;
        let pick = |v: u64| (all || v >= u64::from(ZIP64_MARKER_32)).then_some(v);
        extra::zip64_field(
            pick(self.uncompressed_size),
            pick(self.compressed_size),
            pick(self.local_header_offset),
        )
    }

    /// Write the header; returns the number of bytes written.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<u64> {
        let zip64 = self.zip64_extra();
        let all = self.force_zip64;
        let field = |v: u64| if all { ZIP64_MARKER_32 } else { clamp32(v) };

        let name_len = len16("entry name", self.name.len())?;
        let extra_len = len16("extra field", zip64.len() + self.extra.len())?;
        let comment_len = len16("entry comment", self.comment.len())?;
        let version_needed = if zip64.is_empty() {
            self.version_needed
        } else {
            self.version_needed.max(VERSION_ZIP64)
        };

        let mut buf = Vec::with_capacity(
            CENTRAL_HEADER_LEN as usize
                + self.name.len()
                + zip64.len()
                + self.extra.len()
                + self.comment.len(),
        );
        buf.extend_from_slice(&CENTRAL_DIR_HEADER_SIG.to_le_bytes());
        buf.extend_from_slice(&self.version_made_by.to_le_bytes());
        buf.extend_from_slice(&version_needed.to_le_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.extend_from_slice(&self.method.to_le_bytes());
        buf.extend_from_slice(&self.dos_time.time.to_le_bytes());
        buf.extend_from_slice(&self.dos_time.date.to_le_bytes());
        buf.extend_from_slice(&self.crc32.to_le_bytes());
        buf.extend_from_slice(&field(self.compressed_size).to_le_bytes());
        buf.extend_from_slice(&field(self.uncompressed_size).to_le_bytes());
        buf.extend_from_slice(&name_len.to_le_bytes());
        buf.extend_from_slice(&extra_len.to_le_bytes());
        buf.extend_from_slice(&comment_len.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes()); // disk number start
        buf.extend_from_slice(&self.internal_attr.to_le_bytes());
        buf.extend_from_slice(&self.external_attr.to_le_bytes());
        buf.extend_from_slice(&field(self.local_header_offset).to_le_bytes());
        buf.extend_from_slice(&self.name);
        buf.extend_from_slice(&zip64);
        buf.extend_from_slice(&self.extra);
        buf.extend_from_slice(&self.comment);
        writer.write_all(&buf)?;
        Ok(buf.len() as u64)
    }

    /// Read a header at the current position, resolving Zip64 values.
    ///
    /// The Zip64 extra field is removed from `extra`.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; CENTRAL_HEADER_LEN as usize];
        reader.read_exact(&mut buf)?;

        let signature = le_u32(&buf, 0);
        if signature != CENTRAL_DIR_HEADER_SIG {
            return Err(OxiZipError::bad_read(format!(
                "bad central directory signature {signature:#010x}"
            )));
        }

        let name_len = le_u16(&buf, 28) as usize;
        let extra_len = le_u16(&buf, 30) as usize;
        let comment_len = le_u16(&buf, 32) as usize;

        let mut name = vec![0u8; name_len];
        reader.read_exact(&mut name)?;
        let mut raw_extra = vec![0u8; extra_len];
        reader.read_exact(&mut raw_extra)?;
        let mut comment = vec![0u8; comment_len];
        reader.read_exact(&mut comment)?;

        let compressed_32 = le_u32(&buf, 20);
        let uncompressed_32 = le_u32(&buf, 24);
        let offset_32 = le_u32(&buf, 42);

        let mut header = Self {
            version_made_by: le_u16(&buf, 4),
            version_needed: le_u16(&buf, 6),
            flags: le_u16(&buf, 8),
            method: le_u16(&buf, 10),
            dos_time: DosDateTime {
                time: le_u16(&buf, 12),
                date: le_u16(&buf, 14),
            },
            crc32: le_u32(&buf, 16),
            compressed_size: u64::from(compressed_32),
            uncompressed_size: u64::from(uncompressed_32),
            local_header_offset: u64::from(offset_32),
            internal_attr: le_u16(&buf, 36),
            external_attr: le_u32(&buf, 38),
            name,
            extra: extra::strip(&raw_extra, &[extra::ZIP64_ID]),
            comment,
            force_zip64: false,
        };

        let need_uncompressed = uncompressed_32 == ZIP64_MARKER_32;
        let need_compressed = compressed_32 == ZIP64_MARKER_32;
        let need_offset = offset_32 == ZIP64_MARKER_32;
        if need_uncompressed || need_compressed || need_offset {
            let data = extra::find(&raw_extra, extra::ZIP64_ID).ok_or_else(|| {
                OxiZipError::bad_read("Zip64 marker without Zip64 extra field")
            })?;
            let values = extra::read_zip64(data, need_uncompressed, need_compressed, need_offset)?;
            if let Some(v) = values.uncompressed {
                header.uncompressed_size = v;
            }
            if let Some(v) = values.compressed {
                header.compressed_size = v;
            }
            if let Some(v) = values.offset {
                header.local_header_offset = v;
            }
            header.force_zip64 = true;
        }
        Ok(header)
    }
}

/// Data descriptor written after entry data when bit 3 is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u64,
    /// Uncompressed size.
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    /// Write with signature; sizes are 8 bytes when `zip64` is set.
    pub fn write<W: Write>(&self, writer: &mut W, zip64: bool) -> Result<u64> {
        let mut buf = Vec::with_capacity(24);
        buf.extend_from_slice(&DATA_DESCRIPTOR_SIG.to_le_bytes());
        buf.extend_from_slice(&self.crc32.to_le_bytes());
        if zip64 {
            buf.extend_from_slice(&self.compressed_size.to_le_bytes());
            buf.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        } else {
            buf.extend_from_slice(&clamp32(self.compressed_size).to_le_bytes());
            buf.extend_from_slice(&clamp32(self.uncompressed_size).to_le_bytes());
        }
        writer.write_all(&buf)?;
        Ok(buf.len() as u64)
    }
}

/// End of central directory, with Zip64 values folded in.
#[derive(Debug, Clone, Default)]
pub struct EndOfCentralDirectory {
    /// Number of central directory records.
    pub entries: u64,
    /// Size of the central directory.
    pub cd_size: u64,
    /// Offset of the central directory.
    pub cd_offset: u64,
    /// Archive comment.
    pub comment: Vec<u8>,
    /// Whether a Zip64 EOCD record was found.
    pub zip64: bool,
}

impl EndOfCentralDirectory {
    /// Whether the values require a Zip64 EOCD record.
    pub fn needs_zip64(&self) -> bool {
        self.entries >= u64::from(ZIP64_MARKER_16)
            || self.cd_size >= u64::from(ZIP64_MARKER_32)
            || self.cd_offset >= u64::from(ZIP64_MARKER_32)
    }

    /// Write the trailer; the Zip64 record and locator are emitted when
    /// `zip64` is set. The writer must be positioned right after the
    /// central directory.
    pub fn write<W: Write>(&self, writer: &mut W, zip64: bool) -> Result<()> {
        let comment_len = len16("archive comment", self.comment.len())?;
        let mut buf = Vec::new();

        if zip64 {
            let record_offset = self.cd_offset + self.cd_size;
            buf.extend_from_slice(&ZIP64_END_OF_CENTRAL_DIR_SIG.to_le_bytes());
            buf.extend_from_slice(&(ZIP64_EOCD_LEN - 12).to_le_bytes());
            buf.extend_from_slice(&version_made_by().to_le_bytes());
            buf.extend_from_slice(&VERSION_ZIP64.to_le_bytes());
            buf.extend_from_slice(&0u32.to_le_bytes()); // this disk
            buf.extend_from_slice(&0u32.to_le_bytes()); // disk with central directory
            buf.extend_from_slice(&self.entries.to_le_bytes());
            buf.extend_from_slice(&self.entries.to_le_bytes());
            buf.extend_from_slice(&self.cd_size.to_le_bytes());
            buf.extend_from_slice(&self.cd_offset.to_le_bytes());

            buf.extend_from_slice(&ZIP64_LOCATOR_SIG.to_le_bytes());
            buf.extend_from_slice(&0u32.to_le_bytes());
            buf.extend_from_slice(&record_offset.to_le_bytes());
            buf.extend_from_slice(&1u32.to_le_bytes()); // total disks
        }

        let count = if zip64 && self.entries >= u64::from(ZIP64_MARKER_16) {
            ZIP64_MARKER_16
        } else {
            self.entries.min(u64::from(ZIP64_MARKER_16)) as u16
        };
        buf.extend_from_slice(&END_OF_CENTRAL_DIR_SIG.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&count.to_le_bytes());
        buf.extend_from_slice(&count.to_le_bytes());
        buf.extend_from_slice(&clamp32(self.cd_size).to_le_bytes());
        buf.extend_from_slice(&clamp32(self.cd_offset).to_le_bytes());
        buf.extend_from_slice(&comment_len.to_le_bytes());
        buf.extend_from_slice(&self.comment);
        writer.write_all(&buf)?;
        Ok(())
    }

    /// Locate and parse the trailer of an archive.
    pub fn find<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let file_len = reader.seek(SeekFrom::End(0))?;
        if file_len < EOCD_LEN {
            return Err(OxiZipError::bad_read("file is too short to be a ZIP archive"));
        }

        // The EOCD is followed by at most 65535 bytes of comment.
        let search_start = file_len.saturating_sub(EOCD_LEN + u64::from(u16::MAX));
        reader.seek(SeekFrom::Start(search_start))?;
        let mut tail = vec![0u8; (file_len - search_start) as usize];
        reader.read_exact(&mut tail)?;

        let signature = END_OF_CENTRAL_DIR_SIG.to_le_bytes();
        let found = tail
            .windows(4)
            .enumerate()
            .rev()
            .filter(|(_, w)| *w == signature)
            .map(|(i, _)| i)
            .find(|&i| {
                i + EOCD_LEN as usize <= tail.len()
                    && i + EOCD_LEN as usize + le_u16(&tail, i + 20) as usize <= tail.len()
            })
            .ok_or_else(|| OxiZipError::bad_read("end of central directory not found"))?;

        let record = &tail[found..];
        let eocd_pos = search_start + found as u64;
        let comment_len = le_u16(record, 20) as usize;
        let mut eocd = Self {
            entries: u64::from(le_u16(record, 10)),
            cd_size: u64::from(le_u32(record, 12)),
            cd_offset: u64::from(le_u32(record, 16)),
            comment: record[EOCD_LEN as usize..EOCD_LEN as usize + comment_len].to_vec(),
            zip64: false,
        };

        if eocd_pos >= ZIP64_LOCATOR_LEN {
            reader.seek(SeekFrom::Start(eocd_pos - ZIP64_LOCATOR_LEN))?;
            let mut locator = [0u8; ZIP64_LOCATOR_LEN as usize];
            reader.read_exact(&mut locator)?;
            if le_u32(&locator, 0) == ZIP64_LOCATOR_SIG {
                let record_offset = le_u64(&locator, 8);
                if record_offset
                    .checked_add(ZIP64_EOCD_LEN)
                    .is_none_or(|end| end > eocd_pos)
                {
                    return Err(OxiZipError::bad_read("Zip64 EOCD offset out of range"));
                }
                reader.seek(SeekFrom::Start(record_offset))?;
                let mut record = [0u8; ZIP64_EOCD_LEN as usize];
                reader.read_exact(&mut record)?;
                if le_u32(&record, 0) != ZIP64_END_OF_CENTRAL_DIR_SIG {
                    return Err(OxiZipError::bad_read("bad Zip64 EOCD signature"));
                }
                eocd.entries = le_u64(&record, 32);
                eocd.cd_size = le_u64(&record, 40);
                eocd.cd_offset = le_u64(&record, 48);
                eocd.zip64 = true;
            }
        }

        if eocd.cd_offset.saturating_add(eocd.cd_size) > eocd_pos {
            return Err(OxiZipError::bad_read(format!(
                "central directory ({} bytes at {}) lies outside the archive",
                eocd.cd_size, eocd.cd_offset
            )));
        }

        debug!(
            entries = eocd.entries,
            cd_offset = eocd.cd_offset,
            cd_size = eocd.cd_size,
            zip64 = eocd.zip64,
            "read end of central directory"
        );
        Ok(eocd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_local_header_roundtrip() {
        let header = LocalFileHeader {
            version_needed: VERSION_DEFLATE,
            flags: FLAG_UTF8,
            method: 8,
            dos_time: DosDateTime::MIN,
            crc32: 0xDEAD_BEEF,
            compressed_size: 10,
            uncompressed_size: 20,
            name: b"dir/file.txt".to_vec(),
            extra: Vec::new(),
        };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, header.len());

        let parsed = LocalFileHeader::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(parsed.name, header.name);
        assert_eq!(parsed.crc32, 0xDEAD_BEEF);
        assert_eq!(parsed.flags, FLAG_UTF8);
    }

    #[test]
    fn test_central_header_zip64() {
        let header = CentralDirectoryHeader {
            version_made_by: version_made_by(),
            version_needed: VERSION_DEFLATE,
            uncompressed_size: 5_000_000_000,
            compressed_size: 100,
            local_header_offset: 7,
            name: b"big.bin".to_vec(),
            ..Default::default()
        };
        assert!(header.needs_zip64());

        let mut buf = Vec::new();
        let written = header.write(&mut buf).unwrap();
        assert_eq!(written, buf.len() as u64);
        // Only the overflowing value moves to the extra field.
        assert_eq!(le_u32(&buf, 20), 100);
        assert_eq!(le_u32(&buf, 24), ZIP64_MARKER_32);
        assert_eq!(le_u16(&buf, 6), VERSION_ZIP64);

        let parsed = CentralDirectoryHeader::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(parsed.uncompressed_size, 5_000_000_000);
        assert_eq!(parsed.compressed_size, 100);
        assert_eq!(parsed.local_header_offset, 7);
        assert!(parsed.extra.is_empty());
    }

    #[test]
    fn test_central_header_forced_zip64() {
        let header = CentralDirectoryHeader {
            compressed_size: 1,
            uncompressed_size: 2,
            local_header_offset: 3,
            name: b"a".to_vec(),
            force_zip64: true,
            ..Default::default()
        };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        let parsed = CentralDirectoryHeader::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(
            (parsed.compressed_size, parsed.uncompressed_size, parsed.local_header_offset),
            (1, 2, 3)
        );
        assert!(parsed.force_zip64);
    }

    #[test]
    fn test_eocd_with_comment() {
        let eocd = EndOfCentralDirectory {
            entries: 3,
            cd_size: 0,
            cd_offset: 0,
            comment: b"hello".to_vec(),
            zip64: false,
        };
        let mut buf = Vec::new();
        eocd.write(&mut buf, false).unwrap();
        let parsed = EndOfCentralDirectory::find(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(parsed.entries, 3);
        assert_eq!(parsed.comment, b"hello");
        assert!(!parsed.zip64);
    }

    #[test]
    fn test_eocd_zip64_record() {
        let eocd = EndOfCentralDirectory {
            entries: 70_000,
            ..Default::default()
        };
        assert!(eocd.needs_zip64());
        let mut buf = Vec::new();
        eocd.write(&mut buf, true).unwrap();
        let parsed = EndOfCentralDirectory::find(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(parsed.entries, 70_000);
        assert!(parsed.zip64);
    }

    #[test]
    fn test_missing_eocd() {
        let err = EndOfCentralDirectory::find(&mut Cursor::new(vec![0u8; 100])).unwrap_err();
        assert_eq!(err.kind(), oxizip_core::ErrorKind::BadRead);
    }

    #[test]
    fn test_zip64_locator_offset_out_of_range() {
        let mut bytes = vec![0u8; 64];
        bytes.extend_from_slice(&ZIP64_LOCATOR_SIG.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&(u64::MAX - 10).to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&END_OF_CENTRAL_DIR_SIG.to_le_bytes());
        bytes.extend_from_slice(&[0u8; EOCD_LEN as usize - 4]);

        let err = EndOfCentralDirectory::find(&mut Cursor::new(bytes)).unwrap_err();
        assert_eq!(err.kind(), oxizip_core::ErrorKind::BadRead);
    }

    #[test]
    fn test_data_descriptor() {
        let dd = DataDescriptor {
            crc32: 1,
            compressed_size: 2,
            uncompressed_size: 3,
        };
        let mut buf = Vec::new();
        assert_eq!(dd.write(&mut buf, false).unwrap(), 16);
        assert_eq!(dd.write(&mut buf, true).unwrap(), 24);
    }
}
