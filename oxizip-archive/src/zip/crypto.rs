//! Traditional PKWARE encryption ("ZipCrypto").
//!
//! This cipher is weak and exists for compatibility only. Each encrypted
//! entry starts with a 12-byte header: 11 random bytes and one check byte
//! used to reject a wrong password before any data is decrypted.

use oxizip_core::error::{OxiZipError, Result};
use rand::RngCore;
use std::io::{self, Read, Write};

/// CRC-32 table (reflected polynomial 0xEDB88320) for the key schedule.
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0usize;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Encryption header length.
pub const HEADER_LEN: usize = 12;

#[inline]
fn crc32_step(crc: u32, byte: u8) -> u32 {
    CRC32_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8)
}

/// ZipCrypto key state.
#[derive(Debug, Clone)]
pub struct ZipCrypto {
    keys: [u32; 3],
}

impl ZipCrypto {
    /// Initialize the keys from a password.
    #[must_use]
    pub fn new(password: &[u8]) -> Self {
        let mut cipher = Self {
            keys: [0x1234_5678, 0x2345_6789, 0x3456_7890],
        };
        for &byte in password {
            cipher.update_keys(byte);
        }
        cipher
    }

    #[inline]
    fn update_keys(&mut self, plain: u8) {
        let [k0, k1, k2] = &mut self.keys;
        *k0 = crc32_step(*k0, plain);
        *k1 = k1
            .wrapping_add(*k0 & 0xFF)
            .wrapping_mul(134_775_813)
            .wrapping_add(1);
        *k2 = crc32_step(*k2, (*k1 >> 24) as u8);
    }

    #[inline]
    fn keystream(&self) -> u8 {
        let t = (self.keys[2] | 2) as u16;
        (t.wrapping_mul(t ^ 1) >> 8) as u8
    }

    /// Encrypt in place.
    pub fn encrypt(&mut self, buf: &mut [u8]) {
        for byte in buf {
            let plain = *byte;
            *byte = plain ^ self.keystream();
            self.update_keys(plain);
        }
    }

    /// Decrypt in place.
    pub fn decrypt(&mut self, buf: &mut [u8]) {
        for byte in buf {
            let plain = *byte ^ self.keystream();
            *byte = plain;
            self.update_keys(plain);
        }
    }
}

/// Encrypting writer. The header is emitted on construction.
pub struct ZipCryptoWriter<W: Write> {
    inner: W,
    cipher: ZipCrypto,
    buf: Vec<u8>,
}

impl<W: Write> ZipCryptoWriter<W> {
    /// Write the encryption header for `check_byte` and return the writer.
    pub fn new(mut inner: W, password: &[u8], check_byte: u8) -> io::Result<Self> {
        let mut cipher = ZipCrypto::new(password);
        let mut header = [0u8; HEADER_LEN];
        rand::thread_rng().fill_bytes(&mut header[..HEADER_LEN - 1]);
        header[HEADER_LEN - 1] = check_byte;
        cipher.encrypt(&mut header);
        inner.write_all(&header)?;
        Ok(Self {
            inner,
            cipher,
            buf: Vec::new(),
        })
    }

    /// Return the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ZipCryptoWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.clear();
        self.buf.extend_from_slice(data);
        self.cipher.encrypt(&mut self.buf);
        self.inner.write_all(&self.buf)?;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Decrypting reader. The header is consumed and checked on construction.
pub struct ZipCryptoReader<R: Read> {
    inner: R,
    cipher: ZipCrypto,
}

impl<R: Read> ZipCryptoReader<R> {
    /// Read the header and verify the check byte.
    ///
    /// `entry_name` is only used for the error.
    pub fn new(mut inner: R, password: &[u8], check_byte: u8, entry_name: &str) -> Result<Self> {
        let mut cipher = ZipCrypto::new(password);
        let mut header = [0u8; HEADER_LEN];
        inner.read_exact(&mut header)?;
        cipher.decrypt(&mut header);
        if header[HEADER_LEN - 1] != check_byte {
            return Err(OxiZipError::bad_password(entry_name));
        }
        Ok(Self { inner, cipher })
    }
}

impl<R: Read> Read for ZipCryptoReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.cipher.decrypt(&mut buf[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cipher_symmetry() {
        let mut data = b"The quick brown fox".to_vec();
        ZipCrypto::new(b"pw").encrypt(&mut data);
        assert_ne!(&data[..], b"The quick brown fox");
        ZipCrypto::new(b"pw").decrypt(&mut data);
        assert_eq!(&data[..], b"The quick brown fox");
    }

    #[test]
    fn test_stream_roundtrip() {
        let mut out = Vec::new();
        {
            let mut w = ZipCryptoWriter::new(&mut out, b"secret", 0x5A).unwrap();
            w.write_all(b"hello ").unwrap();
            w.write_all(b"world").unwrap();
        }
        assert_eq!(out.len(), HEADER_LEN + 11);

        let mut r = ZipCryptoReader::new(&out[..], b"secret", 0x5A, "x").unwrap();
        let mut plain = String::new();
        r.read_to_string(&mut plain).unwrap();
        assert_eq!(plain, "hello world");
    }

    #[test]
    fn test_wrong_password() {
        let mut out = Vec::new();
        ZipCryptoWriter::new(&mut out, b"right", 0x11).unwrap();
        // Same keys, different check byte.
        let err = ZipCryptoReader::new(&out[..], b"right", 0x12, "a.txt").err().unwrap();
        assert_eq!(err.kind(), oxizip_core::ErrorKind::ZipError);
    }
}
