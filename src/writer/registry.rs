use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::partition::PartitionKey;
use crate::writer::PartitionWriter;

type Shard = RwLock<HashMap<PartitionKey, Arc<PartitionWriter>>>;

/// Partition key -> writer map.
///
/// Keys are spread over independently locked shards, so producers writing to
/// different partitions rarely contend on the same map lock.
pub(crate) struct WriterRegistry {
  shards: Vec<Shard>,
}

impl WriterRegistry {
  pub fn new(shard_count: usize) -> Self {
    let shards = (0..shard_count.max(1)).map(|_| RwLock::new(HashMap::new())).collect();
    Self { shards }
  }

  fn shard(&self, key: &PartitionKey) -> &Shard {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    let index = (hasher.finish() % self.shards.len() as u64) as usize;
    &self.shards[index]
  }

  /// Returns the writer for `key`, creating it with `create` if needed.
  ///
  /// Double-checked: the common case only takes the shard's read lock, and
  /// the write lock re-checks so two racing callers never both create.
  pub fn get_or_create<F>(&self, key: &PartitionKey, create: F) -> Result<Arc<PartitionWriter>>
  where
    F: FnOnce() -> Result<PartitionWriter>,
  {
    let shard = self.shard(key);

    // 1. Optimistic read
    {
      let map = shard.read();
      if let Some(writer) = map.get(key) {
        return Ok(writer.clone());
      }
    }

    // 2. Write lock (creation)
    let mut map = shard.write();
    if let Some(writer) = map.get(key) {
      return Ok(writer.clone());
    }

    let writer = Arc::new(create()?);
    map.insert(key.clone(), writer.clone());
    Ok(writer)
  }

  pub fn get(&self, key: &PartitionKey) -> Option<Arc<PartitionWriter>> {
    self.shard(key).read().get(key).cloned()
  }

  /// Removes `key` if `predicate` accepts its writer. The predicate runs
  /// under the shard's write lock.
  pub fn remove_if<P>(&self, key: &PartitionKey, predicate: P) -> bool
  where
    P: FnOnce(&PartitionWriter) -> bool,
  {
    let mut map = self.shard(key).write();
    match map.get(key) {
      Some(writer) if predicate(writer) => {
        map.remove(key);
        true
      }
      _ => false,
    }
  }

  /// A point-in-time copy of every entry. Entries inserted afterwards are
  /// not included.
  pub fn snapshot(&self) -> Vec<(PartitionKey, Arc<PartitionWriter>)> {
    let mut entries = Vec::new();
    for shard in &self.shards {
      let map = shard.read();
      entries.extend(map.iter().map(|(k, w)| (k.clone(), w.clone())));
    }
    entries
  }

  /// Removes and returns every entry.
  pub fn drain(&self) -> Vec<(PartitionKey, Arc<PartitionWriter>)> {
    let mut entries = Vec::new();
    for shard in &self.shards {
      entries.extend(shard.write().drain());
    }
    entries
  }

  pub fn keys(&self) -> Vec<PartitionKey> {
    let mut keys: Vec<_> = self.shards.iter().flat_map(|s| s.read().keys().cloned().collect::<Vec<_>>()).collect();
    keys.sort();
    keys
  }

  pub fn len(&self) -> usize {
    self.shards.iter().map(|s| s.read().len()).sum()
  }
}
