//! Record routing.
//!
//! A `PartitionStrategy` derives a `PartitionKey` from a record and maps that
//! key to a directory under the writer's base path. Records without a key go
//! to the fallback writer rooted at the base path itself.

use std::collections::hash_map::DefaultHasher;
use std::fmt::{self, Write as _};
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::util::sanitize_partition_key;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey(String);

impl PartitionKey {
  pub fn new(key: impl Into<String>) -> Self {
    Self(key.into())
  }

  /// The key used for records no strategy could place.
  pub fn fallback() -> Self {
    Self(String::new())
  }

  pub fn is_fallback(&self) -> bool {
    self.0.is_empty()
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for PartitionKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_fallback() { write!(f, "<fallback>") } else { write!(f, "{}", self.0) }
  }
}

impl From<&str> for PartitionKey {
  fn from(s: &str) -> Self {
    Self::new(s)
  }
}

impl From<String> for PartitionKey {
  fn from(s: String) -> Self {
    Self(s)
  }
}

pub trait PartitionStrategy<T: ?Sized>: Send + Sync {
  /// `None` routes the record to the fallback writer.
  fn partition_key(&self, record: &T) -> Option<PartitionKey>;

  /// Directory for `key`, relative to the base path.
  ///
  /// Two keys mapping to the same directory would get two writers sharing
  /// it, so overrides must keep distinct keys in distinct directories. The
  /// default escapes the key and never merges keys.
  fn partition_path(&self, key: &PartitionKey) -> Result<PathBuf> {
    Ok(PathBuf::from(sanitize_partition_key(key.as_str())?))
  }
}

impl<T: ?Sized, S: PartitionStrategy<T> + ?Sized> PartitionStrategy<T> for Arc<S> {
  fn partition_key(&self, record: &T) -> Option<PartitionKey> {
    (**self).partition_key(record)
  }

  fn partition_path(&self, key: &PartitionKey) -> Result<PathBuf> {
    (**self).partition_path(key)
  }
}

/// Sends every record to the fallback writer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPartition;

impl<T: ?Sized> PartitionStrategy<T> for NoPartition {
  fn partition_key(&self, _record: &T) -> Option<PartitionKey> {
    None
  }
}

/// Partitions by a key extracted with a closure. The key becomes a single,
/// sanitized directory name.
pub struct KeyPartitionStrategy<F> {
  extract: F,
}

impl<F> KeyPartitionStrategy<F> {
  pub fn new(extract: F) -> Self {
    Self { extract }
  }
}

impl<T, F> PartitionStrategy<T> for KeyPartitionStrategy<F>
where
  T: ?Sized,
  F: Fn(&T) -> Option<String> + Send + Sync,
{
  fn partition_key(&self, record: &T) -> Option<PartitionKey> {
    (self.extract)(record).map(PartitionKey::from)
  }
}

/// Spreads records over a fixed number of buckets named `bucket_00`,
/// `bucket_01`, ... by hashing an extracted key.
pub struct HashPartitionStrategy<F> {
  buckets: u16,
  extract: F,
}

impl<F> HashPartitionStrategy<F> {
  pub fn new(buckets: u16, extract: F) -> Result<Self> {
    if buckets == 0 {
      return Err(Error::Config("Bucket count must be greater than zero".into()));
    }
    Ok(Self { buckets, extract })
  }

  pub fn bucket_name(&self, bucket: u16) -> String {
    format!("bucket_{:02}", bucket)
  }

  fn bucket_for<K: Hash + ?Sized>(&self, key: &K) -> u16 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % self.buckets as u64) as u16
  }
}

impl<T, K, F> PartitionStrategy<T> for HashPartitionStrategy<F>
where
  T: ?Sized,
  K: Hash,
  F: Fn(&T) -> K + Send + Sync,
{
  fn partition_key(&self, record: &T) -> Option<PartitionKey> {
    let bucket = self.bucket_for(&(self.extract)(record));
    Some(PartitionKey::new(self.bucket_name(bucket)))
  }
}

/// Partitions by the wall-clock time at which a record is written, using a
/// strftime pattern. `/` in the pattern produces nested directories.
pub struct TimePartitionStrategy {
  pattern: String,
  clock: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl TimePartitionStrategy {
  /// e.g. `"%Y/%m/%d/%H"`.
  pub fn new(pattern: impl Into<String>) -> Result<Self> {
    Self::with_clock(pattern, Utc::now)
  }

  pub fn with_clock<C>(pattern: impl Into<String>, clock: C) -> Result<Self>
  where
    C: Fn() -> DateTime<Utc> + Send + Sync + 'static,
  {
    let pattern = pattern.into();
    if pattern.trim().is_empty() || StrftimeItems::new(&pattern).any(|item| matches!(item, Item::Error)) {
      return Err(Error::Config(format!("Invalid time partition pattern: {:?}", pattern)));
    }
    Ok(Self {
      pattern,
      clock: Box::new(clock),
    })
  }
}

impl<T: ?Sized> PartitionStrategy<T> for TimePartitionStrategy {
  fn partition_key(&self, _record: &T) -> Option<PartitionKey> {
    let mut key = String::new();
    write!(key, "{}", (self.clock)().format(&self.pattern)).ok()?;
    if key.is_empty() { None } else { Some(PartitionKey::new(key)) }
  }

  fn partition_path(&self, key: &PartitionKey) -> Result<PathBuf> {
    let mut path = PathBuf::new();
    for component in key.as_str().split('/').filter(|c| !c.is_empty()) {
      path.push(sanitize_partition_key(component)?);
    }
    if path.as_os_str().is_empty() {
      return Err(Error::Config(format!("Empty partition path for key {}", key)));
    }
    Ok(path)
  }
}
