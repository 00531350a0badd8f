//! Splittable LZ4 block container.
//!
//! A file is a sequence of independently compressed blocks, each preceded
//! by a fixed sync marker so a reader dropped at an arbitrary byte offset
//! can find the next block boundary:
//!
//! ```text
//! [Sync Marker: 16]
//! [Compressed Size: 4]
//! [Uncompressed Size: 4]
//! [CRC32: 4]
//! [Payload: Compressed Size]
//! ```
//!
//! A block belongs to the split whose byte range contains the first byte of
//! its sync marker. Blocks are only cut between `write` calls, so a record
//! written with a single `write_all` never straddles two blocks. A single
//! write larger than `MAX_BLOCK_SIZE` is rejected.

use std::io::{self, BufRead, BufReader, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use tracing::warn;

use crate::storage::InputStream;

/// All sixteen bytes are distinct, so the scanner never needs to backtrack
/// inside a partial match.
pub const SYNC_MARKER: [u8; 16] = [
  0x9E, 0x2D, 0x71, 0xC4, 0x5B, 0xE8, 0x03, 0xA6, 0x1F, 0xD2, 0x67, 0xB9, 0x40, 0x8C, 0xF5, 0x36,
];

/// Upper bound for the uncompressed size of a block, and so for a single
/// record. Larger size fields mark a false marker.
pub const MAX_BLOCK_SIZE: u32 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
  pub compressed_size: u32,
  pub uncompressed_size: u32,
  pub crc: u32,
}

impl BlockHeader {
  pub const SIZE: usize = 16 + 4 + 4 + 4; // 28 bytes

  /// Writes the header including the sync marker.
  pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
    writer.write_all(&SYNC_MARKER)?;
    writer.write_u32::<LittleEndian>(self.compressed_size)?;
    writer.write_u32::<LittleEndian>(self.uncompressed_size)?;
    writer.write_u32::<LittleEndian>(self.crc)?;
    Ok(())
  }

  /// Reads the header fields that follow an already consumed sync marker.
  pub fn read_after_marker<R: Read>(reader: &mut R) -> io::Result<Self> {
    let compressed_size = reader.read_u32::<LittleEndian>()?;
    let uncompressed_size = reader.read_u32::<LittleEndian>()?;
    let crc = reader.read_u32::<LittleEndian>()?;
    Ok(Self {
      compressed_size,
      uncompressed_size,
      crc,
    })
  }

  fn is_plausible(&self) -> bool {
    // Incompressible input grows slightly under LZ4.
    let max_compressed = lz4_flex::block::get_maximum_output_size(MAX_BLOCK_SIZE as usize);
    self.compressed_size > 0
      && self.compressed_size as usize <= max_compressed
      && self.uncompressed_size <= MAX_BLOCK_SIZE
  }
}

/// Calculates the CRC32 of a block (sizes and compressed payload).
pub fn calculate_checksum(uncompressed_size: u32, payload: &[u8]) -> u32 {
  let mut hasher = Hasher::new();
  hasher.update(&(payload.len() as u32).to_le_bytes());
  hasher.update(&uncompressed_size.to_le_bytes());
  hasher.update(payload);
  hasher.finalize()
}

/// Buffers writes and emits one block every time `block_size` bytes have
/// accumulated (checked after each `write` call) or on `flush`.
pub struct BlockEncoder<W: Write> {
  inner: W,
  pending: Vec<u8>,
  block_size: usize,
}

impl<W: Write> BlockEncoder<W> {
  pub fn new(inner: W, block_size: usize) -> Self {
    let block_size = block_size.clamp(1, MAX_BLOCK_SIZE as usize);
    Self {
      inner,
      pending: Vec::with_capacity(block_size),
      block_size,
    }
  }

  /// Writes any pending block and returns the underlying writer.
  pub fn finish(mut self) -> io::Result<W> {
    self.emit_block()?;
    self.inner.flush()?;
    Ok(self.inner)
  }

  fn emit_block(&mut self) -> io::Result<()> {
    if self.pending.is_empty() {
      return Ok(());
    }

    let payload = lz4_flex::block::compress(&self.pending);
    let uncompressed_size = self.pending.len() as u32;
    let header = BlockHeader {
      compressed_size: payload.len() as u32,
      uncompressed_size,
      crc: calculate_checksum(uncompressed_size, &payload),
    };

    header.write(&mut self.inner)?;
    self.inner.write_all(&payload)?;
    self.pending.clear();
    Ok(())
  }
}

impl<W: Write> Write for BlockEncoder<W> {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    if buf.len() > MAX_BLOCK_SIZE as usize {
      return Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("write of {} bytes exceeds the {} byte block limit", buf.len(), MAX_BLOCK_SIZE),
      ));
    }
    if self.pending.len() + buf.len() > MAX_BLOCK_SIZE as usize {
      self.emit_block()?;
    }
    self.pending.extend_from_slice(buf);
    if self.pending.len() >= self.block_size {
      self.emit_block()?;
    }
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    self.emit_block()?;
    self.inner.flush()
  }
}

/// Decompresses the blocks owned by the byte range `[start, end)`.
///
/// The reader opens the raw stream at `start`, scans forward to the first
/// sync marker and keeps decoding until it meets a marker at or beyond `end`.
/// That marker's offset (or the end of the file) is the adjusted end.
pub struct SplitBlockReader {
  reader: Option<BufReader<Box<dyn InputStream>>>,
  /// Absolute offset of the next raw byte `reader` will yield.
  offset: u64,
  start: u64,
  end: u64,
  block: Vec<u8>,
  cursor: usize,
  adjusted_end: Option<u64>,
}

impl SplitBlockReader {
  pub fn open(mut input: Box<dyn InputStream>, start: u64, end: u64) -> io::Result<Self> {
    input.seek_to(start)?;
    Ok(Self {
      reader: Some(BufReader::new(input)),
      offset: start,
      start,
      end,
      block: Vec::new(),
      cursor: 0,
      adjusted_end: None,
    })
  }

  /// Offset at which the raw stream was opened.
  pub fn adjusted_start(&self) -> u64 {
    self.start
  }

  /// Offset of the first byte past the last owned block, known once the
  /// reader has run out of blocks.
  pub fn adjusted_end(&self) -> Option<u64> {
    self.adjusted_end
  }

  /// Absolute offset in the compressed stream.
  pub fn position(&self) -> u64 {
    self.offset
  }

  fn finish_at(&mut self, end: u64) {
    self.adjusted_end = Some(end);
    self.reader = None;
  }

  /// Advances to the next sync marker. Returns the marker's offset.
  fn find_marker(&mut self) -> io::Result<Option<u64>> {
    let Some(reader) = self.reader.as_mut() else {
      return Ok(None);
    };

    let mut matched = 0usize;
    loop {
      let buf = reader.fill_buf()?;
      if buf.is_empty() {
        return Ok(None);
      }

      let mut consumed = 0;
      let mut found = false;
      for &byte in buf {
        consumed += 1;
        if byte == SYNC_MARKER[matched] {
          matched += 1;
          if matched == SYNC_MARKER.len() {
            found = true;
            break;
          }
        } else {
          matched = usize::from(byte == SYNC_MARKER[0]);
        }
      }

      reader.consume(consumed);
      self.offset += consumed as u64;
      if found {
        return Ok(Some(self.offset - SYNC_MARKER.len() as u64));
      }
    }
  }

  /// Drops buffered bytes and resumes scanning right after a false marker.
  fn rescan_from(&mut self, pos: u64) -> io::Result<()> {
    if let Some(reader) = self.reader.take() {
      let mut input = reader.into_inner();
      input.seek_to(pos)?;
      self.reader = Some(BufReader::new(input));
      self.offset = pos;
    }
    Ok(())
  }

  /// Reads and validates the block whose marker was just consumed.
  fn read_block(&mut self) -> io::Result<Option<Vec<u8>>> {
    let Some(reader) = self.reader.as_mut() else {
      return Ok(None);
    };

    let header = match BlockHeader::read_after_marker(reader) {
      Ok(h) => h,
      Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
      Err(e) => return Err(e),
    };
    self.offset += (BlockHeader::SIZE - SYNC_MARKER.len()) as u64;
    if !header.is_plausible() {
      return Ok(None);
    }

    let mut payload = vec![0u8; header.compressed_size as usize];
    match reader.read_exact(&mut payload) {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
      Err(e) => return Err(e),
    }
    self.offset += payload.len() as u64;

    if calculate_checksum(header.uncompressed_size, &payload) != header.crc {
      return Ok(None);
    }

    match lz4_flex::block::decompress(&payload, header.uncompressed_size as usize) {
      Ok(data) if data.len() == header.uncompressed_size as usize => Ok(Some(data)),
      _ => Ok(None),
    }
  }

  /// Loads the next owned block. Returns `false` once the split is exhausted.
  fn next_block(&mut self) -> io::Result<bool> {
    loop {
      let marker = match self.find_marker()? {
        Some(pos) => pos,
        None => {
          let eof = self.offset;
          self.finish_at(eof);
          return Ok(false);
        }
      };

      if marker >= self.end {
        self.finish_at(marker);
        return Ok(false);
      }

      match self.read_block()? {
        Some(data) => {
          self.block = data;
          self.cursor = 0;
          return Ok(true);
        }
        None => {
          warn!(target: "ironsink::block", "Skipping invalid block candidate at offset {}", marker);
          self.rescan_from(marker + 1)?;
        }
      }
    }
  }
}

impl Read for SplitBlockReader {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    while self.cursor >= self.block.len() {
      if self.reader.is_none() || !self.next_block()? {
        return Ok(0);
      }
    }

    let n = buf.len().min(self.block.len() - self.cursor);
    buf[..n].copy_from_slice(&self.block[self.cursor..self.cursor + n]);
    self.cursor += n;
    Ok(n)
  }
}
