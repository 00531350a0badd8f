//! Delimited record reader over whole files or byte-range splits.
//!
//! Raw files are split on record boundaries the usual way: a reader whose
//! split starts after offset 0 skips up to the first delimiter ending at or
//! after its start, and every reader keeps going while its position is at
//! or before the split end, so the record straddling a boundary is read
//! exactly once.
//!
//! Compressed files are decoded through the codec. Splittable codecs decode
//! only the blocks owned by the split; other codecs can only be read whole,
//! so a split starting after offset 0 reads nothing.

mod split;

pub use split::{InputContext, SlopSplitter, Split};

use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::codec::{Codec, Decoder};
use crate::error::{Error, Result};
use crate::storage::{InputStream, Storage};

enum Source {
  Raw(BufReader<Box<dyn InputStream>>),
  Decoded(BufReader<Decoder>),
  Empty,
}

pub struct TextReader {
  source: Source,
  delimiter: Vec<u8>,
  context: InputContext,
  /// Only raw splits stop at `context.end`; decoders stop on their own.
  bounded: bool,
  skip_partial: bool,
  /// Offset `source` was opened at and bytes consumed since, for streams
  /// that cannot report a position.
  origin: u64,
  consumed: u64,
  done: bool,
}

impl TextReader {
  /// Opens `path` with `\n` as the record delimiter.
  pub fn open(storage: &dyn Storage, path: &Path, codec: Option<Codec>, split: Option<Split>) -> Result<Self> {
    Self::open_with_delimiter(storage, path, codec, split, b"\n")
  }

  pub fn open_with_delimiter(
    storage: &dyn Storage,
    path: &Path,
    codec: Option<Codec>,
    split: Option<Split>,
    delimiter: &[u8],
  ) -> Result<Self> {
    if delimiter.is_empty() {
      return Err(Error::Config("Record delimiter must not be empty".into()));
    }
    let mut input = storage.open(path)?;
    let mut origin = 0;

    let (source, context, bounded, skip_partial) = match (codec, split) {
      (None, split) => {
        let start = split.map_or(0, |s| s.start);
        let end = split.map_or(u64::MAX, |s| s.end());
        if start > 0 {
          // Back up so a delimiter straddling `start` is seen whole.
          origin = start.saturating_sub(delimiter.len() as u64 - 1);
          input.seek_to(origin)?;
        }
        let context = InputContext {
          start,
          end,
          position: start,
        };
        (Source::Raw(BufReader::new(input)), context, split.is_some(), start > 0)
      }
      (Some(codec), Some(split)) if codec.is_splittable() => {
        let decoder = codec.wrap_input(input, Some(split))?;
        let start = decoder.adjusted_start().unwrap_or(split.start);
        let context = InputContext {
          start,
          end: split.end(),
          position: start,
        };
        (Source::Decoded(BufReader::new(decoder)), context, false, false)
      }
      (Some(_), Some(split)) if split.start > 0 => {
        let context = InputContext {
          start: split.start,
          end: split.end(),
          position: split.start,
        };
        (Source::Empty, context, false, false)
      }
      (Some(codec), _) => {
        let decoder = codec.wrap_input(input, None)?;
        let context = InputContext {
          start: 0,
          end: u64::MAX,
          position: 0,
        };
        (Source::Decoded(BufReader::new(decoder)), context, false, false)
      }
    };

    Ok(Self {
      source,
      delimiter: delimiter.to_vec(),
      context,
      bounded,
      skip_partial,
      origin,
      consumed: 0,
      done: false,
    })
  }

  pub fn context(&self) -> InputContext {
    self.context
  }

  /// Reads the next record without its delimiter, or `None` at the end of
  /// the split.
  pub fn read(&mut self) -> Result<Option<Vec<u8>>> {
    if self.done {
      return Ok(None);
    }

    let mut record = Vec::new();
    if self.skip_partial {
      self.skip_partial = false;
      self.next_record(&mut record)?;
    }

    if self.bounded && self.context.position > self.context.end {
      self.finish();
      return Ok(None);
    }

    if self.next_record(&mut record)? == 0 {
      self.finish();
      return Ok(None);
    }
    if record.ends_with(&self.delimiter) {
      record.truncate(record.len() - self.delimiter.len());
    }
    Ok(Some(record))
  }

  /// Reads the next record as UTF-8.
  pub fn read_line(&mut self) -> Result<Option<String>> {
    match self.read()? {
      Some(bytes) => String::from_utf8(bytes)
        .map(Some)
        .map_err(|e| Error::Corruption(format!("Record is not valid UTF-8: {}", e))),
      None => Ok(None),
    }
  }

  fn finish(&mut self) {
    self.done = true;
    if let Source::Decoded(reader) = &self.source {
      if let Some(end) = reader.get_ref().adjusted_end() {
        self.context.end = end;
      }
    }
  }

  /// Reads up to and including the next delimiter into `out`.
  fn next_record(&mut self, out: &mut Vec<u8>) -> Result<usize> {
    out.clear();
    let n = match &mut self.source {
      Source::Raw(reader) => read_until_delimiter(reader, &self.delimiter, out)?,
      Source::Decoded(reader) => read_until_delimiter(reader, &self.delimiter, out)?,
      Source::Empty => 0,
    };
    self.consumed += n as u64;
    self.context.position = self.position();
    Ok(n)
  }

  /// Absolute position of the next unread byte, queried from the stream
  /// when it can report one.
  fn position(&mut self) -> u64 {
    let queried = match &mut self.source {
      Source::Raw(reader) => {
        let buffered = reader.buffer().len() as u64;
        reader.get_mut().position().map(|p| p.saturating_sub(buffered))
      }
      Source::Decoded(reader) if reader.get_ref().is_split_aware() => reader.get_mut().raw_position(),
      _ => None,
    };
    queried.unwrap_or(self.origin + self.consumed)
  }
}

impl Iterator for TextReader {
  type Item = Result<Vec<u8>>;

  fn next(&mut self) -> Option<Self::Item> {
    self.read().transpose()
  }
}

/// `BufRead::read_until` for a multi-byte delimiter.
fn read_until_delimiter<R: BufRead>(reader: &mut R, delimiter: &[u8], out: &mut Vec<u8>) -> io::Result<usize> {
  let last = delimiter[delimiter.len() - 1];
  let mut total = 0;
  loop {
    let n = reader.read_until(last, out)?;
    total += n;
    if n == 0 || out.ends_with(delimiter) || out.last() != Some(&last) {
      return Ok(total);
    }
  }
}
