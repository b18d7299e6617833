//! Entry data pipelines.
//!
//! Writing: source → CRC-32 → deflate (serial or block-parallel) →
//! encryption → byte counter → archive. Reading: bounded raw bytes →
//! decryption → inflate → CRC-32 and size check at end of stream.

use super::aes::{AesReader, AesStrength, AesWriter};
use super::crypto::{ZipCryptoReader, ZipCryptoWriter};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::{Compress, Compression, FlushCompress, Status};
use oxizip_core::entry::{CompressionMethod, EncryptionAlgorithm};
use oxizip_core::error::{OxiZipError, Result};
use rayon::prelude::*;
use std::io::{self, Read, Write};

/// Block size for parallel deflate.
pub const PARALLEL_BLOCK_SIZE: usize = 128 * 1024;

/// Default copy buffer size.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Writer that counts bytes passed through.
#[derive(Debug)]
pub struct CountingWriter<W: Write> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    /// Bytes written so far.
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn compress_block(data: &[u8], level: Compression, last: bool) -> io::Result<Vec<u8>> {
    let mut engine = Compress::new(level, false);
    let flush = if last {
        FlushCompress::Finish
    } else {
        FlushCompress::Sync
    };
    let mut out = Vec::with_capacity(data.len() + data.len() / 8 + 64);
    loop {
        let consumed = engine.total_in() as usize;
        let status = engine
            .compress_vec(&data[consumed..], &mut out, flush)
            .map_err(io::Error::other)?;
        let all_in = engine.total_in() as usize == data.len();
        let room_left = out.len() < out.capacity();
        match status {
            Status::StreamEnd => break,
            _ if !last && all_in && room_left => break,
            _ => out.reserve(out.capacity().max(4096)),
        }
    }
    Ok(out)
}

/// Deflate writer that compresses fixed-size blocks concurrently.
///
/// Input is cut into [`PARALLEL_BLOCK_SIZE`] blocks. Each block is
/// compressed independently on the rayon pool; every block but the last
/// ends with a sync flush and the last one finishes the stream, so the
/// concatenation is a single raw deflate stream. Blocks are written in
/// input order.
pub struct ParallelDeflateWriter<W: Write> {
    inner: W,
    level: Compression,
    batch: usize,
    pending: Vec<Vec<u8>>,
    current: Vec<u8>,
}

impl<W: Write> ParallelDeflateWriter<W> {
    /// Create a writer compressing at `level` (0-9).
    pub fn new(inner: W, level: u32) -> Self {
        Self {
            inner,
            level: Compression::new(level.min(9)),
            batch: rayon::current_num_threads().max(1),
            pending: Vec::new(),
            current: Vec::with_capacity(PARALLEL_BLOCK_SIZE),
        }
    }

    fn write_blocks(&mut self, blocks: Vec<Vec<u8>>, last_is_final: bool) -> io::Result<()> {
        let level = self.level;
        let count = blocks.len();
        let compressed: Vec<io::Result<Vec<u8>>> = blocks
            .par_iter()
            .enumerate()
            .map(|(i, block)| compress_block(block, level, last_is_final && i + 1 == count))
            .collect();
        for block in compressed {
            self.inner.write_all(&block?)?;
        }
        Ok(())
    }

    /// Compress what is buffered, end the stream and return the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        if !self.current.is_empty() || self.pending.is_empty() {
            let tail = std::mem::take(&mut self.current);
            self.pending.push(tail);
        }
        let blocks = std::mem::take(&mut self.pending);
        self.write_blocks(blocks, true)?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for ParallelDeflateWriter<W> {
    fn write(&mut self, mut data: &[u8]) -> io::Result<usize> {
        let len = data.len();
        while !data.is_empty() {
            let room = PARALLEL_BLOCK_SIZE - self.current.len();
            let take = room.min(data.len());
            self.current.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.current.len() == PARALLEL_BLOCK_SIZE {
                let full = std::mem::replace(&mut self.current, Vec::with_capacity(PARALLEL_BLOCK_SIZE));
                self.pending.push(full);
            }
            // Keep one block back so the final block is known at finish.
            if self.pending.len() > self.batch {
                let rest = self.pending.split_off(self.batch);
                let ready = std::mem::replace(&mut self.pending, rest);
                self.write_blocks(ready, false)?;
            }
        }
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

enum Sealer<W: Write> {
    Plain(W),
    ZipCrypto(ZipCryptoWriter<W>),
    Aes(AesWriter<W>),
}

impl<W: Write> Sealer<W> {
    fn finish(self) -> io::Result<W> {
        match self {
            Self::Plain(w) => Ok(w),
            Self::ZipCrypto(w) => Ok(w.into_inner()),
            Self::Aes(w) => w.finish(),
        }
    }
}

impl<W: Write> Write for Sealer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::ZipCrypto(w) => w.write(buf),
            Self::Aes(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::ZipCrypto(w) => w.flush(),
            Self::Aes(w) => w.flush(),
        }
    }
}

enum Packer<W: Write> {
    Stored(W),
    Deflate(DeflateEncoder<W>),
    Parallel(ParallelDeflateWriter<W>),
}

impl<W: Write> Packer<W> {
    fn finish(self) -> io::Result<W> {
        match self {
            Self::Stored(w) => Ok(w),
            Self::Deflate(w) => w.finish(),
            Self::Parallel(w) => w.finish(),
        }
    }
}

impl<W: Write> Write for Packer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Stored(w) => w.write(buf),
            Self::Deflate(w) => w.write(buf),
            Self::Parallel(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Stored(w) => w.flush(),
            Self::Deflate(w) => w.flush(),
            Self::Parallel(w) => w.flush(),
        }
    }
}

/// How to encode one entry.
#[derive(Debug, Clone)]
pub(crate) struct EncodeSettings<'a> {
    pub method: CompressionMethod,
    pub level: u32,
    pub encryption: EncryptionAlgorithm,
    pub password: &'a [u8],
    /// Check byte for the ZipCrypto header.
    pub check_byte: u8,
    pub parallel: bool,
    pub buffer_size: usize,
}

/// Result of encoding one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EncodeOutcome {
    pub crc32: u32,
    pub uncompressed: u64,
    pub compressed: u64,
}

/// Which side of the pipeline failed.
#[derive(Debug)]
pub(crate) enum EncodeError {
    /// Reading the entry source failed.
    Source(OxiZipError),
    /// Writing the archive failed.
    Sink(OxiZipError),
}

fn sink(e: io::Error) -> EncodeError {
    EncodeError::Sink(OxiZipError::from_io(e))
}

/// Run `source` through the write pipeline into `out`.
///
/// `on_bytes` is called with the running uncompressed byte count.
pub(crate) fn encode<W: Write>(
    source: &mut dyn Read,
    out: W,
    settings: &EncodeSettings<'_>,
    on_bytes: &mut dyn FnMut(u64),
) -> std::result::Result<EncodeOutcome, EncodeError> {
    let counter = CountingWriter::new(out);
    let sealer = match settings.encryption {
        EncryptionAlgorithm::None => Sealer::Plain(counter),
        EncryptionAlgorithm::PkzipWeak => Sealer::ZipCrypto(
            ZipCryptoWriter::new(counter, settings.password, settings.check_byte).map_err(sink)?,
        ),
        aes => {
            let strength = AesStrength::for_algorithm(aes).ok_or_else(|| {
                EncodeError::Sink(OxiZipError::unsupported_method(aes.to_string()))
            })?;
            Sealer::Aes(AesWriter::new(counter, settings.password, strength).map_err(EncodeError::Sink)?)
        }
    };

    let mut packer = match settings.method {
        CompressionMethod::Stored => Packer::Stored(sealer),
        CompressionMethod::Deflate if settings.parallel => {
            Packer::Parallel(ParallelDeflateWriter::new(sealer, settings.level))
        }
        CompressionMethod::Deflate => {
            Packer::Deflate(DeflateEncoder::new(sealer, Compression::new(settings.level.min(9))))
        }
        CompressionMethod::Unknown(id) => {
            return Err(EncodeError::Sink(OxiZipError::unsupported_method(format!(
                "method {id}"
            ))));
        }
    };

    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; settings.buffer_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(EncodeError::Source(OxiZipError::from_io(e))),
        };
        hasher.update(&buf[..n]);
        total += n as u64;
        packer.write_all(&buf[..n]).map_err(sink)?;
        on_bytes(total);
    }

    let sealer = packer.finish().map_err(sink)?;
    let counter = sealer.finish().map_err(sink)?;
    Ok(EncodeOutcome {
        crc32: hasher.finalize(),
        uncompressed: total,
        compressed: counter.count(),
    })
}

/// How to decode one entry.
#[derive(Debug, Clone)]
pub(crate) struct DecodeSettings {
    pub name: String,
    pub method: CompressionMethod,
    pub encryption: Decryption,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub verify_crc: bool,
}

/// Decryption parameters.
#[derive(Debug, Clone)]
pub(crate) enum Decryption {
    None,
    ZipCrypto { password: Vec<u8>, check_byte: u8 },
    Aes { password: Vec<u8>, strength: AesStrength },
}

enum Opener<R: Read> {
    Plain(R),
    ZipCrypto(ZipCryptoReader<R>),
    Aes(AesReader<R>),
}

impl<R: Read> Read for Opener<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(r) => r.read(buf),
            Self::ZipCrypto(r) => r.read(buf),
            Self::Aes(r) => r.read(buf),
        }
    }
}

enum Unpacker<R: Read> {
    Stored(R),
    Deflate(DeflateDecoder<R>),
}

/// Streaming reader over one entry's uncompressed data.
///
/// The CRC-32, the uncompressed size and (for AES) the authentication code
/// are verified when the end of the data is reached; failures are reported
/// as [`io::Error`]s carrying the [`OxiZipError`], recoverable with
/// [`OxiZipError::from_io`].
pub struct EntryReader<'a> {
    inner: Unpacker<Opener<Box<dyn Read + 'a>>>,
    hasher: crc32fast::Hasher,
    produced: u64,
    settings: DecodeSettings,
    done: bool,
}

impl<'a> EntryReader<'a> {
    pub(crate) fn new(raw: Box<dyn Read + 'a>, settings: DecodeSettings) -> Result<Self> {
        let opener = match &settings.encryption {
            Decryption::None => Opener::Plain(raw),
            Decryption::ZipCrypto {
                password,
                check_byte,
            } => Opener::ZipCrypto(ZipCryptoReader::new(raw, password, *check_byte, &settings.name)?),
            Decryption::Aes { password, strength } => Opener::Aes(AesReader::new(
                raw,
                password,
                *strength,
                settings.compressed_size,
                &settings.name,
            )?),
        };
        let inner = match settings.method {
            CompressionMethod::Stored => Unpacker::Stored(opener),
            CompressionMethod::Deflate => Unpacker::Deflate(DeflateDecoder::new(opener)),
            CompressionMethod::Unknown(id) => {
                return Err(OxiZipError::unsupported_method(format!(
                    "method {id} in {}",
                    settings.name
                )));
            }
        };
        Ok(Self {
            inner,
            hasher: crc32fast::Hasher::new(),
            produced: 0,
            settings,
            done: false,
        })
    }

    /// Uncompressed size recorded in the archive.
    pub fn size(&self) -> u64 {
        self.settings.uncompressed_size
    }

    fn finish(&mut self) -> io::Result<()> {
        self.done = true;
        let opener = match &mut self.inner {
            Unpacker::Stored(o) => o,
            Unpacker::Deflate(d) => d.get_mut(),
        };
        // Drain so a trailing AES authentication code gets checked.
        io::copy(opener, &mut io::sink())?;

        let s = &self.settings;
        if self.produced != s.uncompressed_size {
            return Err(OxiZipError::bad_read(format!(
                "{}: expected {} bytes, decoded {}",
                s.name, s.uncompressed_size, self.produced
            ))
            .into_io());
        }
        if s.verify_crc {
            let computed = self.hasher.clone().finalize();
            if computed != s.crc32 {
                return Err(OxiZipError::crc_mismatch(&s.name, s.crc32, computed).into_io());
            }
        }
        Ok(())
    }
}

impl Read for EntryReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }
        let n = match &mut self.inner {
            Unpacker::Stored(r) => r.read(buf)?,
            Unpacker::Deflate(r) => r.read(buf)?,
        };
        if n == 0 {
            self.finish()?;
            return Ok(0);
        }
        self.hasher.update(&buf[..n]);
        self.produced += n as u64;
        if self.produced > self.settings.uncompressed_size {
            return Err(OxiZipError::bad_read(format!(
                "{}: more data than the recorded {} bytes",
                self.settings.name, self.settings.uncompressed_size
            ))
            .into_io());
        }
        Ok(n)
    }
}
