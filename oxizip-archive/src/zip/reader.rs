//! Loading an existing archive.
//!
//! The trailer and central directory are parsed eagerly; entry data is
//! only touched when an entry is read, extracted or copied.

use super::aes::AesStrength;
use super::entry::{Location, Payload, ZipEntry};
use super::extra;
use super::format::{
    CentralDirectoryHeader, EndOfCentralDirectory, FLAG_DATA_DESCRIPTOR, FLAG_UTF8,
    LOCAL_HEADER_LEN, LocalFileHeader, METHOD_AES,
};
use super::pipeline::{DecodeSettings, Decryption};
use oxizip_core::entry::{CompressionMethod, EncryptionAlgorithm, TimestampFormats};
use oxizip_core::error::{OxiZipError, Result};
use oxizip_core::FileAttributes;
use std::io::{Cursor, Read, Seek, SeekFrom};
use tracing::debug;

/// Seekable archive source.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Parsed central directory.
#[derive(Debug)]
pub(crate) struct Directory {
    pub entries: Vec<ZipEntry>,
    pub comment: String,
}

fn decode_text(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Read the trailer and central directory of `reader`.
pub(crate) fn read_directory<R: Read + Seek>(reader: &mut R) -> Result<Directory> {
    reader
        .seek(SeekFrom::Current(0))
        .map_err(|e| OxiZipError::bad_stream(format!("archive source cannot seek: {e}")))?;

    let eocd = EndOfCentralDirectory::find(reader)?;
    let cd_len = usize::try_from(eocd.cd_size)
        .map_err(|_| OxiZipError::bad_read("central directory is too large"))?;
    reader.seek(SeekFrom::Start(eocd.cd_offset))?;
    let mut raw = vec![0u8; cd_len];
    reader.read_exact(&mut raw)?;

    let mut cursor = Cursor::new(raw);
    let capacity = usize::try_from(eocd.entries).unwrap_or(0).min(cd_len / 46 + 1);
    let mut entries = Vec::with_capacity(capacity);
    while cursor.position() < eocd.cd_size {
        let header = CentralDirectoryHeader::read(&mut cursor)?;
        entries.push(entry_from_header(header, eocd.cd_offset)?);
    }
    if entries.len() as u64 != eocd.entries {
        debug!(
            recorded = eocd.entries,
            found = entries.len(),
            "entry count in trailer differs from central directory"
        );
    }
    debug!(entries = entries.len(), zip64 = eocd.zip64, "loaded central directory");

    Ok(Directory {
        entries,
        comment: decode_text(&eocd.comment),
    })
}

fn entry_from_header(header: CentralDirectoryHeader, cd_offset: u64) -> Result<ZipEntry> {
    let name = decode_text(&header.name).replace('\\', "/");
    if name.is_empty() {
        return Err(OxiZipError::bad_read("central directory entry without a name"));
    }
    if header.local_header_offset.saturating_add(LOCAL_HEADER_LEN) > cd_offset {
        return Err(OxiZipError::bad_read(format!(
            "{name}: local header offset {} is out of range",
            header.local_header_offset
        )));
    }

    let aes = if header.method == METHOD_AES {
        let data = extra::find(&header.extra, extra::AES_ID)
            .ok_or_else(|| OxiZipError::bad_read(format!("{name}: AES entry without AES extra field")))?;
        Some(extra::read_aes(data)?)
    } else {
        None
    };

    let ntfs = extra::find(&header.extra, extra::NTFS_ID).and_then(extra::read_ntfs);
    let unix = extra::find(&header.extra, extra::EXTENDED_TIME_ID).and_then(extra::read_unix_time);
    let mut times = ntfs.or(unix).unwrap_or_default();
    if times.modified.is_none() {
        times.modified = header.dos_time.to_system_time();
    }

    let location = Location {
        local_header_offset: header.local_header_offset,
        flags: header.flags,
        raw_method: header.method,
        version_needed: header.version_needed,
        dos_time: header.dos_time,
        aes,
        foreign_extra: extra::strip(
            &header.extra,
            &[extra::NTFS_ID, extra::EXTENDED_TIME_ID, extra::AES_ID],
        ),
    };

    let encryption = match aes {
        // 192-bit keys are reported as the nearest variant; reading uses the stored strength.
        Some(a) => AesStrength::from_byte(a.strength)
            .and_then(AesStrength::algorithm)
            .unwrap_or(EncryptionAlgorithm::WinZipAes256),
        None if location.is_encrypted() => EncryptionAlgorithm::PkzipWeak,
        None => EncryptionAlgorithm::None,
    };

    let unix_host = header.version_made_by >> 8 == 3;
    let mut entry = ZipEntry::new(name, Payload::Existing(location.clone()));
    entry.method = location.real_method();
    entry.encryption = encryption;
    entry.times = times;
    entry.timestamp_formats = TimestampFormats {
        windows: ntfs.is_some(),
        unix: unix.is_some(),
    };
    entry.attributes = FileAttributes::from_external(header.external_attr, unix_host);
    if entry.is_directory() {
        entry.attributes.dos |= FileAttributes::DIRECTORY;
    }
    entry.comment = decode_text(&header.comment);
    entry.crc32 = header.crc32;
    entry.compressed_size = header.compressed_size;
    entry.uncompressed_size = header.uncompressed_size;
    Ok(entry)
}

/// Offset of an entry's data, read from its local header.
pub(crate) fn data_offset<R: Read + Seek>(reader: &mut R, location: &Location) -> Result<u64> {
    reader.seek(SeekFrom::Start(location.local_header_offset))?;
    let header = LocalFileHeader::read(reader)?;
    Ok(location.local_header_offset + header.len())
}

/// Decoding parameters for a loaded entry.
pub(crate) fn decode_settings(
    entry: &ZipEntry,
    location: &Location,
    password: Option<&str>,
    verify_crc: bool,
) -> Result<DecodeSettings> {
    let method = location.real_method();
    if let CompressionMethod::Unknown(id) = method {
        return Err(OxiZipError::unsupported_method(format!("method {id} in {}", entry.name)));
    }

    let mut verify_crc = verify_crc;
    let encryption = if !location.is_encrypted() {
        Decryption::None
    } else {
        let password = password
            .ok_or_else(|| OxiZipError::bad_password(&entry.name))?
            .as_bytes()
            .to_vec();
        match location.aes {
            Some(aes) => {
                let strength = AesStrength::from_byte(aes.strength).ok_or_else(|| {
                    OxiZipError::bad_read(format!("{}: bad AES strength", entry.name))
                })?;
                // AE-2 stores no CRC; the authentication code covers the data.
                if aes.vendor_version == 2 {
                    verify_crc = false;
                }
                Decryption::Aes { password, strength }
            }
            None => {
                let check_byte = if location.flags & FLAG_DATA_DESCRIPTOR != 0 {
                    (location.dos_time.time >> 8) as u8
                } else {
                    (entry.crc32 >> 24) as u8
                };
                Decryption::ZipCrypto {
                    password,
                    check_byte,
                }
            }
        }
    };

    Ok(DecodeSettings {
        name: entry.name.clone(),
        method,
        encryption,
        compressed_size: entry.compressed_size,
        uncompressed_size: entry.uncompressed_size,
        crc32: entry.crc32,
        verify_crc,
    })
}

/// Whether a name needs the UTF-8 flag.
pub(crate) fn utf8_flag(name: &str, comment: &str) -> u16 {
    if name.is_ascii() && comment.is_ascii() {
        0
    } else {
        FLAG_UTF8
    }
}
