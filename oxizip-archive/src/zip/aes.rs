//! WinZip AES encryption (AE-1 / AE-2).
//!
//! Entry data layout: `salt | verifier (2) | ciphertext | auth code (10)`.
//! Keys come from PBKDF2-HMAC-SHA1 (1000 rounds) over the password and
//! salt; the output is split into the AES key, the HMAC key and the
//! password verifier. Data is encrypted with AES-CTR using a little-endian
//! counter that starts at 1, and authenticated with HMAC-SHA1 over the
//! ciphertext, truncated to 10 bytes.

use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use oxizip_core::entry::EncryptionAlgorithm;
use oxizip_core::error::{OxiZipError, Result};
use rand::RngCore;
use sha1::Sha1;
use std::io::{self, Read, Write};
use tracing::trace;

type HmacSha1 = Hmac<Sha1>;

const PBKDF2_ROUNDS: u32 = 1000;
const VERIFIER_LEN: usize = 2;
/// Authentication code length.
pub const AUTH_CODE_LEN: usize = 10;

/// AES key strength as stored in the 0x9901 extra field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AesStrength {
    /// 128-bit key, 8-byte salt.
    Aes128,
    /// 192-bit key, 12-byte salt.
    Aes192,
    /// 256-bit key, 16-byte salt.
    Aes256,
}

impl AesStrength {
    /// Parse the extra field strength byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Aes128),
            2 => Some(Self::Aes192),
            3 => Some(Self::Aes256),
            _ => None,
        }
    }

    /// Extra field strength byte.
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Aes128 => 1,
            Self::Aes192 => 2,
            Self::Aes256 => 3,
        }
    }

    /// Strength for an encryption algorithm, if it is AES.
    pub fn for_algorithm(algorithm: EncryptionAlgorithm) -> Option<Self> {
        match algorithm {
            EncryptionAlgorithm::WinZipAes128 => Some(Self::Aes128),
            EncryptionAlgorithm::WinZipAes256 => Some(Self::Aes256),
            _ => None,
        }
    }

    /// The encryption algorithm this strength reports as.
    pub fn algorithm(self) -> Option<EncryptionAlgorithm> {
        match self {
            Self::Aes128 => Some(EncryptionAlgorithm::WinZipAes128),
            Self::Aes256 => Some(EncryptionAlgorithm::WinZipAes256),
            Self::Aes192 => None,
        }
    }

    fn key_len(self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
        }
    }

    /// Salt length in bytes.
    pub fn salt_len(self) -> usize {
        self.key_len() / 2
    }

    /// Bytes added around the ciphertext.
    pub fn overhead(self) -> u64 {
        (self.salt_len() + VERIFIER_LEN + AUTH_CODE_LEN) as u64
    }
}

enum AesCtr {
    Aes128(ctr::Ctr128LE<aes::Aes128>),
    Aes192(ctr::Ctr128LE<aes::Aes192>),
    Aes256(ctr::Ctr128LE<aes::Aes256>),
}

impl AesCtr {
    fn apply(&mut self, buf: &mut [u8]) {
        match self {
            Self::Aes128(c) => c.apply_keystream(buf),
            Self::Aes192(c) => c.apply_keystream(buf),
            Self::Aes256(c) => c.apply_keystream(buf),
        }
    }
}

struct DerivedKeys {
    cipher: AesCtr,
    mac: HmacSha1,
    verifier: [u8; VERIFIER_LEN],
}

fn derive(password: &[u8], salt: &[u8], strength: AesStrength) -> Result<DerivedKeys> {
    let key_len = strength.key_len();
    let mut derived = vec![0u8; key_len * 2 + VERIFIER_LEN];
    pbkdf2::pbkdf2_hmac::<Sha1>(password, salt, PBKDF2_ROUNDS, &mut derived);

    let (aes_key, rest) = derived.split_at(key_len);
    let (mac_key, verifier) = rest.split_at(key_len);
    let iv = 1u128.to_le_bytes();
    let invalid = |_| OxiZipError::invalid_argument("bad AES key length");
    let cipher = match strength {
        AesStrength::Aes128 => AesCtr::Aes128(
            ctr::Ctr128LE::<aes::Aes128>::new_from_slices(aes_key, &iv).map_err(invalid)?,
        ),
        AesStrength::Aes192 => AesCtr::Aes192(
            ctr::Ctr128LE::<aes::Aes192>::new_from_slices(aes_key, &iv).map_err(invalid)?,
        ),
        AesStrength::Aes256 => AesCtr::Aes256(
            ctr::Ctr128LE::<aes::Aes256>::new_from_slices(aes_key, &iv).map_err(invalid)?,
        ),
    };
    let mac = <HmacSha1 as Mac>::new_from_slice(mac_key)
        .map_err(|_| OxiZipError::invalid_argument("bad HMAC key length"))?;
    Ok(DerivedKeys {
        cipher,
        mac,
        verifier: [verifier[0], verifier[1]],
    })
}

/// Encrypting writer. Salt and verifier are written on construction; call
/// [`AesWriter::finish`] to append the authentication code.
pub struct AesWriter<W: Write> {
    inner: W,
    cipher: AesCtr,
    mac: HmacSha1,
    buf: Vec<u8>,
}

impl<W: Write> AesWriter<W> {
    /// Start an encrypted stream with a fresh random salt.
    pub fn new(mut inner: W, password: &[u8], strength: AesStrength) -> Result<Self> {
        let mut salt = vec![0u8; strength.salt_len()];
        rand::thread_rng().fill_bytes(&mut salt);
        let keys = derive(password, &salt, strength)?;
        inner.write_all(&salt)?;
        inner.write_all(&keys.verifier)?;
        Ok(Self {
            inner,
            cipher: keys.cipher,
            mac: keys.mac,
            buf: Vec::new(),
        })
    }

    /// Append the authentication code and return the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        let code = self.mac.finalize().into_bytes();
        self.inner.write_all(&code[..AUTH_CODE_LEN])?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for AesWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.clear();
        self.buf.extend_from_slice(data);
        self.cipher.apply(&mut self.buf);
        self.mac.update(&self.buf);
        self.inner.write_all(&self.buf)?;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Decrypting reader over the full entry data (`compressed_size` bytes).
///
/// The authentication code is checked once the ciphertext is exhausted; a
/// mismatch surfaces as an [`io::Error`] carrying
/// [`OxiZipError::AuthenticationFailed`].
pub struct AesReader<R: Read> {
    inner: R,
    cipher: AesCtr,
    mac: Option<HmacSha1>,
    remaining: u64,
    name: String,
}

impl<R: Read> AesReader<R> {
    /// Read salt and verifier and check the password.
    pub fn new(
        mut inner: R,
        password: &[u8],
        strength: AesStrength,
        compressed_size: u64,
        name: &str,
    ) -> Result<Self> {
        let remaining = compressed_size
            .checked_sub(strength.overhead())
            .ok_or_else(|| OxiZipError::bad_read(format!("{name}: AES entry is too short")))?;

        let mut salt = vec![0u8; strength.salt_len()];
        inner.read_exact(&mut salt)?;
        let mut verifier = [0u8; VERIFIER_LEN];
        inner.read_exact(&mut verifier)?;

        let keys = derive(password, &salt, strength)?;
        if keys.verifier != verifier {
            return Err(OxiZipError::bad_password(name));
        }
        trace!(entry = name, ciphertext = remaining, "AES password verified");
        Ok(Self {
            inner,
            cipher: keys.cipher,
            mac: Some(keys.mac),
            remaining,
            name: name.to_string(),
        })
    }

    fn verify(&mut self) -> io::Result<()> {
        let Some(mac) = self.mac.take() else {
            return Ok(());
        };
        let mut stored = [0u8; AUTH_CODE_LEN];
        self.inner.read_exact(&mut stored)?;
        let computed = mac.finalize().into_bytes();
        if computed[..AUTH_CODE_LEN] != stored {
            return Err(OxiZipError::authentication_failed(&self.name).into_io());
        }
        Ok(())
    }
}

impl<R: Read> Read for AesReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            self.verify()?;
            return Ok(0);
        }
        let want = buf.len().min(self.remaining.min(usize::MAX as u64) as usize);
        let n = self.inner.read(&mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "AES entry data is truncated",
            ));
        }
        if let Some(mac) = self.mac.as_mut() {
            mac.update(&buf[..n]);
        }
        self.cipher.apply(&mut buf[..n]);
        self.remaining -= n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encrypt(data: &[u8], password: &[u8], strength: AesStrength) -> Vec<u8> {
        let mut w = AesWriter::new(Vec::new(), password, strength).unwrap();
        w.write_all(data).unwrap();
        w.finish().unwrap()
    }

    #[test]
    fn test_roundtrip_both_strengths() {
        for strength in [AesStrength::Aes128, AesStrength::Aes256] {
            let data = b"attack at dawn".repeat(100);
            let sealed = encrypt(&data, b"pw", strength);
            assert_eq!(sealed.len() as u64, data.len() as u64 + strength.overhead());

            let mut r = AesReader::new(&sealed[..], b"pw", strength, sealed.len() as u64, "e").unwrap();
            let mut plain = Vec::new();
            r.read_to_end(&mut plain).unwrap();
            assert_eq!(plain, data);
        }
    }

    #[test]
    fn test_wrong_password_rejected_up_front() {
        let sealed = encrypt(b"data", b"right", AesStrength::Aes256);
        let mut attempts = 0;
        let mut rejected = 0;
        for pw in [&b"wrong"[..], b"Right", b"right "] {
            attempts += 1;
            if AesReader::new(&sealed[..], pw, AesStrength::Aes256, sealed.len() as u64, "e").is_err() {
                rejected += 1;
            }
        }
        // The 2-byte verifier lets roughly 1 in 65536 wrong passwords through.
        assert!(rejected >= attempts - 1);
    }

    #[test]
    fn test_tampering_detected() {
        let mut sealed = encrypt(b"important payload", b"pw", AesStrength::Aes128);
        let mid = AesStrength::Aes128.salt_len() + VERIFIER_LEN + 3;
        sealed[mid] ^= 0x01;

        let mut r = AesReader::new(&sealed[..], b"pw", AesStrength::Aes128, sealed.len() as u64, "e").unwrap();
        let mut plain = Vec::new();
        let err = r.read_to_end(&mut plain).unwrap_err();
        assert!(matches!(
            OxiZipError::from_io(err),
            OxiZipError::AuthenticationFailed { .. }
        ));
    }
}
