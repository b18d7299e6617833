//! Extra field blocks.
//!
//! An extra field is a sequence of `(id: u16, len: u16, data)` blocks. We
//! understand Zip64 sizes (0x0001), NTFS times (0x000a), the Unix extended
//! timestamp (0x5455) and WinZip AES parameters (0x9901); other blocks are
//! carried through untouched.

use super::format::{le_u16, le_u32, le_u64};
use oxizip_core::entry::EntryTimes;
use oxizip_core::error::{OxiZipError, Result};
use oxizip_core::time::{
    filetime_to_system_time, system_time_to_filetime, system_time_to_unix, unix_to_system_time,
};

/// Zip64 extended information.
pub const ZIP64_ID: u16 = 0x0001;
/// NTFS timestamps.
pub const NTFS_ID: u16 = 0x000A;
/// Extended (Unix) timestamp.
pub const EXTENDED_TIME_ID: u16 = 0x5455;
/// WinZip AES parameters.
pub const AES_ID: u16 = 0x9901;

/// Iterate over `(id, data)` blocks. A truncated trailing block ends the
/// iteration.
pub fn blocks(extra: &[u8]) -> impl Iterator<Item = (u16, &[u8])> {
    let mut pos = 0;
    std::iter::from_fn(move || {
        if pos + 4 > extra.len() {
            return None;
        }
        let id = le_u16(extra, pos);
        let len = le_u16(extra, pos + 2) as usize;
        let start = pos + 4;
        if start + len > extra.len() {
            return None;
        }
        pos = start + len;
        Some((id, &extra[start..start + len]))
    })
}

/// Find the first block with `id`.
pub fn find(extra: &[u8], id: u16) -> Option<&[u8]> {
    blocks(extra).find(|(i, _)| *i == id).map(|(_, d)| d)
}

/// Copy `extra` without the blocks listed in `ids`.
pub fn strip(extra: &[u8], ids: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(extra.len());
    for (id, data) in blocks(extra) {
        if !ids.contains(&id) {
            push_block(&mut out, id, data);
        }
    }
    out
}

fn push_block(out: &mut Vec<u8>, id: u16, data: &[u8]) {
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    out.extend_from_slice(data);
}

/// Zip64 values present in an extra block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zip64Values {
    /// Uncompressed size.
    pub uncompressed: Option<u64>,
    /// Compressed size.
    pub compressed: Option<u64>,
    /// Local header offset.
    pub offset: Option<u64>,
}

/// Build a Zip64 block holding the given values in canonical order.
/// Returns an empty vector when no value is given.
pub fn zip64_field(uncompressed: Option<u64>, compressed: Option<u64>, offset: Option<u64>) -> Vec<u8> {
    let mut data = Vec::with_capacity(24);
    for value in [uncompressed, compressed, offset].into_iter().flatten() {
        data.extend_from_slice(&value.to_le_bytes());
    }
    if data.is_empty() {
        return data;
    }
    let mut out = Vec::with_capacity(data.len() + 4);
    push_block(&mut out, ZIP64_ID, &data);
    out
}

/// Read the values flagged by the header's overflow markers.
pub fn read_zip64(data: &[u8], uncompressed: bool, compressed: bool, offset: bool) -> Result<Zip64Values> {
    let mut pos = 0;
    let mut take = |wanted: bool| -> Result<Option<u64>> {
        if !wanted {
            return Ok(None);
        }
        if pos + 8 > data.len() {
            return Err(OxiZipError::bad_read("Zip64 extra field is truncated"));
        }
        let value = le_u64(data, pos);
        pos += 8;
        Ok(Some(value))
    };
    Ok(Zip64Values {
        uncompressed: take(uncompressed)?,
        compressed: take(compressed)?,
        offset: take(offset)?,
    })
}

/// Fixed-size Zip64 block used as a placeholder in local headers.
pub fn zip64_local_placeholder(uncompressed: u64, compressed: u64) -> Vec<u8> {
    zip64_field(Some(uncompressed), Some(compressed), None)
}

/// Build an NTFS timestamp block. Missing times are written as the
/// modification time.
pub fn ntfs_field(times: &EntryTimes) -> Vec<u8> {
    let Some(modified) = times.modified else {
        return Vec::new();
    };
    let accessed = times.accessed.unwrap_or(modified);
    let created = times.created.unwrap_or(modified);

    let mut data = Vec::with_capacity(32);
    data.extend_from_slice(&0u32.to_le_bytes()); // reserved
    data.extend_from_slice(&1u16.to_le_bytes()); // attribute tag 1
    data.extend_from_slice(&24u16.to_le_bytes());
    for t in [modified, accessed, created] {
        data.extend_from_slice(&system_time_to_filetime(t).to_le_bytes());
    }
    let mut out = Vec::with_capacity(36);
    push_block(&mut out, NTFS_ID, &data);
    out
}

/// Parse an NTFS timestamp block.
pub fn read_ntfs(data: &[u8]) -> Option<EntryTimes> {
    let mut pos = 4;
    while pos + 4 <= data.len() {
        let tag = le_u16(data, pos);
        let len = le_u16(data, pos + 2) as usize;
        pos += 4;
        if tag == 1 && len >= 24 && pos + 24 <= data.len() {
            let ticks = |at: usize| {
                let v = le_u64(data, at);
                (v != 0).then(|| filetime_to_system_time(v))
            };
            return Some(EntryTimes {
                modified: ticks(pos),
                accessed: ticks(pos + 8),
                created: ticks(pos + 16),
            });
        }
        pos += len;
    }
    None
}

/// Build an extended timestamp block. The central directory copy carries
/// only the modification time.
pub fn unix_time_field(times: &EntryTimes, central: bool) -> Vec<u8> {
    let Some(modified) = times.modified else {
        return Vec::new();
    };
    let present = [Some(modified), times.accessed, times.created];
    let mut flags = 0u8;
    for (bit, t) in present.iter().enumerate() {
        if t.is_some() {
            flags |= 1 << bit;
        }
    }

    let mut data = vec![flags];
    for t in present.iter().flatten().take(if central { 1 } else { 3 }) {
        let secs = system_time_to_unix(*t).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        data.extend_from_slice(&secs.to_le_bytes());
    }
    let mut out = Vec::with_capacity(data.len() + 4);
    push_block(&mut out, EXTENDED_TIME_ID, &data);
    out
}

/// Parse an extended timestamp block.
pub fn read_unix_time(data: &[u8]) -> Option<EntryTimes> {
    let (&flags, rest) = data.split_first()?;
    let mut pos = 0;
    let mut next = |bit: u8| {
        if flags & (1 << bit) == 0 || pos + 4 > rest.len() {
            return None;
        }
        let secs = le_u32(rest, pos) as i32;
        pos += 4;
        Some(unix_to_system_time(i64::from(secs)))
    };
    let modified = next(0);
    let accessed = next(1);
    let created = next(2);
    Some(EntryTimes {
        modified,
        accessed,
        created,
    })
}

/// WinZip AES parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesExtra {
    /// Vendor version: 1 (AE-1, CRC kept) or 2 (AE-2, CRC zeroed).
    pub vendor_version: u16,
    /// Key strength: 1 = 128, 2 = 192, 3 = 256 bits.
    pub strength: u8,
    /// Real compression method.
    pub method: u16,
}

const AES_VENDOR_ID: u16 = 0x4541; // "AE"

/// Build a WinZip AES block.
pub fn aes_field(aes: &AesExtra) -> Vec<u8> {
    let mut data = Vec::with_capacity(7);
    data.extend_from_slice(&aes.vendor_version.to_le_bytes());
    data.extend_from_slice(&AES_VENDOR_ID.to_le_bytes());
    data.push(aes.strength);
    data.extend_from_slice(&aes.method.to_le_bytes());
    let mut out = Vec::with_capacity(11);
    push_block(&mut out, AES_ID, &data);
    out
}

/// Parse a WinZip AES block.
pub fn read_aes(data: &[u8]) -> Result<AesExtra> {
    if data.len() < 7 {
        return Err(OxiZipError::bad_read("WinZip AES extra field is truncated"));
    }
    let vendor_version = le_u16(data, 0);
    let vendor_id = le_u16(data, 2);
    let strength = data[4];
    if !(1..=2).contains(&vendor_version) || vendor_id != AES_VENDOR_ID {
        return Err(OxiZipError::bad_read(format!(
            "unknown WinZip AES vendor {vendor_id:#06x} version {vendor_version}"
        )));
    }
    if !(1..=3).contains(&strength) {
        return Err(OxiZipError::bad_read(format!("unknown WinZip AES strength {strength}")));
    }
    Ok(AesExtra {
        vendor_version,
        strength,
        method: le_u16(data, 5),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_blocks_and_strip() {
        let mut extra = zip64_field(Some(1), None, None);
        extra.extend(aes_field(&AesExtra {
            vendor_version: 1,
            strength: 3,
            method: 8,
        }));
        push_block(&mut extra, 0xCAFE, b"opaque");

        let ids: Vec<u16> = blocks(&extra).map(|(id, _)| id).collect();
        assert_eq!(ids, vec![ZIP64_ID, AES_ID, 0xCAFE]);

        let stripped = strip(&extra, &[ZIP64_ID, AES_ID]);
        assert_eq!(find(&stripped, 0xCAFE), Some(&b"opaque"[..]));
        assert!(find(&stripped, ZIP64_ID).is_none());
    }

    #[test]
    fn test_truncated_block_ignored() {
        let extra = [0x01, 0x00, 0x10, 0x00, 0xAA];
        assert_eq!(blocks(&extra).count(), 0);
    }

    #[test]
    fn test_zip64_partial() {
        let field = zip64_field(None, Some(9), Some(10));
        let data = find(&field, ZIP64_ID).unwrap();
        assert_eq!(data.len(), 16);
        let values = read_zip64(data, false, true, true).unwrap();
        assert_eq!(values.compressed, Some(9));
        assert_eq!(values.offset, Some(10));
        assert!(read_zip64(data, true, true, true).is_err());
    }

    #[test]
    fn test_ntfs_times() {
        let t = UNIX_EPOCH + Duration::from_secs(1_500_000_000);
        let times = EntryTimes {
            modified: Some(t),
            accessed: Some(t + Duration::from_secs(5)),
            created: None,
        };
        let field = ntfs_field(&times);
        let parsed = read_ntfs(find(&field, NTFS_ID).unwrap()).unwrap();
        assert_eq!(parsed.modified, Some(t));
        assert_eq!(parsed.accessed, Some(t + Duration::from_secs(5)));
        assert_eq!(parsed.created, Some(t));
    }

    #[test]
    fn test_unix_times() {
        let t = UNIX_EPOCH + Duration::from_secs(1_000_000_000);
        let times = EntryTimes::uniform(t);
        let local = unix_time_field(&times, false);
        let parsed = read_unix_time(find(&local, EXTENDED_TIME_ID).unwrap()).unwrap();
        assert_eq!(parsed, times);

        let central = unix_time_field(&times, true);
        let parsed = read_unix_time(find(&central, EXTENDED_TIME_ID).unwrap()).unwrap();
        assert_eq!(parsed.modified, Some(t));
        assert_eq!(parsed.accessed, None);
    }

    #[test]
    fn test_aes_extra() {
        let aes = AesExtra {
            vendor_version: 1,
            strength: 1,
            method: 0,
        };
        let field = aes_field(&aes);
        assert_eq!(read_aes(find(&field, AES_ID).unwrap()).unwrap(), aes);
        assert!(read_aes(&[1, 0, b'X', b'Y', 1, 0, 0]).is_err());
    }
}
