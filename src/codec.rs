//! Compression codecs.
//!
//! A `Codec` is a plain descriptor resolved once at configuration time. It
//! knows its default file suffix and whether its output can be decoded from
//! an arbitrary byte range (splittable).

use std::fmt;
use std::io::{self, Read, Write};

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use lz4_flex::frame::{FrameDecoder, FrameEncoder};

use crate::block::{BlockEncoder, SplitBlockReader};
use crate::error::Result;
use crate::reader::Split;
use crate::storage::{InputStream, OutputStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionType {
  /// gzip members, decoded as a multi-member stream. Not splittable.
  Gzip,
  /// LZ4 frame format. Not splittable.
  Lz4,
  /// Sync-marked LZ4 blocks. Splittable.
  Lz4Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
  kind: CompressionType,
  block_size: usize,
}

impl Codec {
  pub const DEFAULT_BLOCK_SIZE: usize = 256 * 1024; // 256 KB

  pub fn new(kind: CompressionType) -> Self {
    Self {
      kind,
      block_size: Self::DEFAULT_BLOCK_SIZE,
    }
  }

  pub fn gzip() -> Self {
    Self::new(CompressionType::Gzip)
  }

  pub fn lz4() -> Self {
    Self::new(CompressionType::Lz4)
  }

  pub fn lz4_block() -> Self {
    Self::new(CompressionType::Lz4Block)
  }

  /// Uncompressed bytes collected before a block is emitted.
  /// Only meaningful for `Lz4Block`.
  pub fn with_block_size(mut self, block_size: usize) -> Self {
    self.block_size = block_size.max(1);
    self
  }

  /// Looks a codec up by name or abbreviation (case-insensitive).
  pub fn from_abbreviation(name: &str) -> Option<Self> {
    let kind = match name.trim().to_ascii_lowercase().as_str() {
      "gzip" | "gz" => CompressionType::Gzip,
      "lz4" => CompressionType::Lz4,
      "lz4-block" | "lz4block" | "blz4" => CompressionType::Lz4Block,
      _ => return None,
    };
    Some(Self::new(kind))
  }

  pub fn kind(&self) -> CompressionType {
    self.kind
  }

  pub fn block_size(&self) -> usize {
    self.block_size
  }

  pub fn is_splittable(&self) -> bool {
    matches!(self.kind, CompressionType::Lz4Block)
  }

  /// File extension without the leading dot.
  pub fn default_suffix(&self) -> &'static str {
    match self.kind {
      CompressionType::Gzip => "gz",
      CompressionType::Lz4 => "lz4",
      CompressionType::Lz4Block => "blz4",
    }
  }

  pub fn wrap_output(&self, stream: Box<dyn OutputStream>) -> OutputWriter {
    match self.kind {
      CompressionType::Gzip => OutputWriter::Gzip(GzEncoder::new(stream, Compression::default())),
      CompressionType::Lz4 => OutputWriter::Lz4(FrameEncoder::new(stream)),
      CompressionType::Lz4Block => OutputWriter::Block(BlockEncoder::new(stream, self.block_size)),
    }
  }

  /// Wraps a raw input stream in a decompressor.
  ///
  /// Splittable codecs decode only the blocks owned by `split`. Other codecs
  /// ignore the split and decode from the current stream position, which must
  /// be the start of the file.
  pub fn wrap_input(&self, stream: Box<dyn InputStream>, split: Option<Split>) -> Result<Decoder> {
    let decoder = match self.kind {
      CompressionType::Gzip => Decoder::Gzip(MultiGzDecoder::new(stream)),
      CompressionType::Lz4 => Decoder::Lz4(FrameDecoder::new(stream)),
      CompressionType::Lz4Block => {
        let (start, end) = split.map_or((0, u64::MAX), |s| (s.start, s.end()));
        Decoder::Block(SplitBlockReader::open(stream, start, end)?)
      }
    };
    Ok(decoder)
  }
}

impl fmt::Display for Codec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.kind {
      CompressionType::Gzip => write!(f, "gzip"),
      CompressionType::Lz4 => write!(f, "lz4"),
      CompressionType::Lz4Block => write!(f, "lz4-block"),
    }
  }
}

/// An output stream, optionally compressing.
pub enum OutputWriter {
  Plain(Box<dyn OutputStream>),
  Gzip(GzEncoder<Box<dyn OutputStream>>),
  Lz4(FrameEncoder<Box<dyn OutputStream>>),
  Block(BlockEncoder<Box<dyn OutputStream>>),
}

impl OutputWriter {
  pub fn plain(stream: Box<dyn OutputStream>) -> Self {
    OutputWriter::Plain(stream)
  }

  /// Writes any compression trailer and closes the underlying stream.
  pub fn finish(self) -> io::Result<()> {
    let stream = match self {
      OutputWriter::Plain(s) => s,
      OutputWriter::Gzip(e) => e.finish()?,
      OutputWriter::Lz4(e) => e.finish().map_err(|e| io::Error::new(io::ErrorKind::Other, e))?,
      OutputWriter::Block(e) => e.finish()?,
    };
    stream.close()
  }
}

impl Write for OutputWriter {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    match self {
      OutputWriter::Plain(s) => s.write(buf),
      OutputWriter::Gzip(e) => e.write(buf),
      OutputWriter::Lz4(e) => e.write(buf),
      OutputWriter::Block(e) => e.write(buf),
    }
  }

  fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
    // Forwarded so the block encoder sees the whole record in one call.
    match self {
      OutputWriter::Plain(s) => s.write_all(buf),
      OutputWriter::Gzip(e) => e.write_all(buf),
      OutputWriter::Lz4(e) => e.write_all(buf),
      OutputWriter::Block(e) => e.write_all(buf),
    }
  }

  fn flush(&mut self) -> io::Result<()> {
    match self {
      OutputWriter::Plain(s) => s.flush(),
      OutputWriter::Gzip(e) => e.flush(),
      OutputWriter::Lz4(e) => e.flush(),
      OutputWriter::Block(e) => e.flush(),
    }
  }
}

/// A decompressing input stream.
pub enum Decoder {
  Gzip(MultiGzDecoder<Box<dyn InputStream>>),
  Lz4(FrameDecoder<Box<dyn InputStream>>),
  Block(SplitBlockReader),
}

impl Decoder {
  /// Position in the compressed stream, if known.
  pub fn raw_position(&mut self) -> Option<u64> {
    match self {
      Decoder::Gzip(d) => d.get_mut().position(),
      Decoder::Lz4(d) => d.get_mut().position(),
      Decoder::Block(d) => Some(d.position()),
    }
  }

  pub fn is_split_aware(&self) -> bool {
    matches!(self, Decoder::Block(_))
  }

  /// Compressed-stream offset at which decoding started.
  pub fn adjusted_start(&self) -> Option<u64> {
    match self {
      Decoder::Block(d) => Some(d.adjusted_start()),
      _ => None,
    }
  }

  /// Offset of the first byte after the last decoded block, once known.
  pub fn adjusted_end(&self) -> Option<u64> {
    match self {
      Decoder::Block(d) => d.adjusted_end(),
      _ => None,
    }
  }
}

impl Read for Decoder {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    match self {
      Decoder::Gzip(d) => d.read(buf),
      Decoder::Lz4(d) => d.read(buf),
      Decoder::Block(d) => d.read(buf),
    }
  }
}
