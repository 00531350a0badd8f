use std::path::Path;

use crate::error::{Error, Result};
use crate::storage::Storage;

/// A byte range of a file assigned to one reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
  pub start: u64,
  pub length: u64,
}

impl Split {
  pub fn new(start: u64, length: u64) -> Self {
    Self { start, length }
  }

  /// Exclusive end offset.
  pub fn end(&self) -> u64 {
    self.start.saturating_add(self.length)
  }
}

/// Progress of a reader through its split.
///
/// For split-aware codecs `start` and `end` are the compressed offsets the
/// codec actually covers, which may extend past the requested range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputContext {
  pub(crate) start: u64,
  pub(crate) end: u64,
  pub(crate) position: u64,
}

impl InputContext {
  pub fn start(&self) -> u64 {
    self.start
  }

  pub fn end(&self) -> u64 {
    self.end
  }

  pub fn position(&self) -> u64 {
    self.position
  }
}

/// Computes splits of roughly `split_size` bytes, letting the last split grow
/// by up to `slop` rather than leaving a tiny tail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlopSplitter {
  block_size: u64,
  min_split_size: u64,
  max_split_size: u64,
  slop: f64,
}

impl Default for SlopSplitter {
  fn default() -> Self {
    Self {
      block_size: 128 * 1024 * 1024, // 128 MB
      min_split_size: 1,
      max_split_size: u64::MAX,
      slop: Self::DEFAULT_SLOP,
    }
  }
}

impl SlopSplitter {
  pub const DEFAULT_SLOP: f64 = 1.1;

  pub fn new(block_size: u64) -> Self {
    Self {
      block_size: block_size.max(1),
      ..Default::default()
    }
  }

  pub fn with_bounds(mut self, min_split_size: u64, max_split_size: u64) -> Self {
    self.min_split_size = min_split_size.max(1);
    self.max_split_size = max_split_size.max(self.min_split_size);
    self
  }

  pub fn with_slop(mut self, slop: f64) -> Self {
    self.slop = if slop.is_finite() && slop >= 1.0 { slop } else { Self::DEFAULT_SLOP };
    self
  }

  pub fn split_size(&self) -> u64 {
    self.min_split_size.max(self.max_split_size.min(self.block_size))
  }

  pub fn splits(&self, length: u64) -> Vec<Split> {
    let split_size = self.split_size();
    let mut splits = Vec::new();
    let mut remaining = length;

    while remaining as f64 / split_size as f64 > self.slop {
      splits.push(Split::new(length - remaining, split_size));
      remaining -= split_size;
    }
    if remaining != 0 {
      splits.push(Split::new(length - remaining, remaining));
    }
    splits
  }

  /// Splits for a file, using the length reported by the storage listing.
  pub fn splits_for(&self, storage: &dyn Storage, path: &Path) -> Result<Vec<Split>> {
    let parent = path.parent().unwrap_or(Path::new(""));
    let status = storage
      .list(parent)?
      .into_iter()
      .find(|s| s.path == path && !s.is_dir)
      .ok_or_else(|| Error::Config(format!("No such file: {:?}", path)))?;
    Ok(self.splits(status.len))
  }
}
