use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;
const TB: u64 = GB * 1024;

/// Decides when the current file is committed and a new one started.
///
/// The running byte count belongs to the partition writer, which passes it
/// in after every record; only the threshold lives here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RolloverStrategy {
  #[default]
  Never,
  Size(SizeRollover),
}

impl RolloverStrategy {
  /// Size based rollover parsed from forms like `"1M"`, `"1.5G"` or `"512 KB"`.
  pub fn size(threshold: &str) -> Result<Self> {
    Ok(RolloverStrategy::Size(threshold.parse()?))
  }

  pub fn bytes(threshold: u64) -> Self {
    RolloverStrategy::Size(SizeRollover::new(threshold))
  }

  pub fn should_rollover(&self, bytes_since_open: u64) -> bool {
    match self {
      RolloverStrategy::Never => false,
      RolloverStrategy::Size(size) => bytes_since_open >= size.threshold(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeRollover {
  threshold: u64,
}

impl Default for SizeRollover {
  fn default() -> Self {
    Self::new(Self::DEFAULT_THRESHOLD)
  }
}

impl SizeRollover {
  /// 1000 MB.
  pub const DEFAULT_THRESHOLD: u64 = 1000 * MB;

  pub fn new(threshold: u64) -> Self {
    Self {
      threshold: threshold.max(1),
    }
  }

  pub fn threshold(&self) -> u64 {
    self.threshold
  }
}

impl FromStr for SizeRollover {
  type Err = Error;

  /// Accepts `<number>[.,<fraction>] [K|M|G|T][B]`, case-insensitive, with
  /// binary multiples.
  fn from_str(s: &str) -> Result<Self> {
    let invalid = || Error::Config(format!("Invalid size value: {:?}", s));
    let trimmed = s.trim();

    let number_len = trimmed
      .char_indices()
      .find(|(_, c)| !(c.is_ascii_digit() || *c == '.' || *c == ','))
      .map_or(trimmed.len(), |(i, _)| i);
    let (number, unit) = trimmed.split_at(number_len);
    if number.is_empty() || !number.starts_with(|c: char| c.is_ascii_digit()) {
      return Err(invalid());
    }

    let number = number.replace(',', ".");
    if number.matches('.').count() > 1 || number.ends_with('.') {
      return Err(invalid());
    }
    let value: f64 = number.parse().map_err(|_| invalid())?;

    let unit = unit.trim().to_ascii_uppercase();
    let unit = unit.strip_suffix('B').unwrap_or(&unit);
    let multiplier = match unit {
      "" => 1,
      "K" => KB,
      "M" => MB,
      "G" => GB,
      "T" => TB,
      _ => return Err(invalid()),
    };

    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes < 1.0 || bytes > u64::MAX as f64 {
      return Err(invalid());
    }
    Ok(SizeRollover::new(bytes as u64))
  }
}

impl fmt::Display for SizeRollover {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}B", self.threshold)
  }
}
