#![allow(dead_code)]

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use ironsink::{
  Codec, CreateMode, FileStatus, InputStream, LocalStorage, OutputStream, PartitionStrategy, PartitionedWriter,
  Storage, WriterConfig,
};
use tempfile::TempDir;

pub struct TestEnv {
  pub storage: Arc<LocalStorage>,
  // The TempDir guard must be kept alive to prevent premature deletion of the directory.
  pub _dir: TempDir,
  pub root: PathBuf,
}

impl TestEnv {
  pub fn new() -> Self {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let storage = Arc::new(LocalStorage::new(&root).unwrap());
    Self {
      storage,
      _dir: dir,
      root,
    }
  }

  pub fn writer<P>(&self, config: WriterConfig, strategy: P) -> PartitionedWriter<str>
  where
    P: PartitionStrategy<str> + 'static,
  {
    PartitionedWriter::new(config, self.storage.clone(), strategy).unwrap()
  }

  /// Regular files under `dir` (relative to the storage root), recursively, sorted.
  pub fn files(&self, dir: &str) -> Vec<FileStatus> {
    let mut out = Vec::new();
    let mut pending = vec![PathBuf::from(dir)];
    while let Some(dir) = pending.pop() {
      for status in self.storage.list(&dir).unwrap() {
        if status.is_dir {
          pending.push(status.path);
        } else {
          out.push(status);
        }
      }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
  }

  pub fn file_names(&self, dir: &str) -> Vec<String> {
    self
      .files(dir)
      .into_iter()
      .map(|s| s.path.strip_prefix(dir).unwrap().to_string_lossy().into_owned())
      .collect()
  }

  pub fn read_raw(&self, path: impl AsRef<Path>) -> Vec<u8> {
    std::fs::read(self.root.join(path)).unwrap()
  }

  /// Reads a whole file through `codec`.
  pub fn read_decoded(&self, path: impl AsRef<Path>, codec: Option<Codec>) -> Vec<u8> {
    let input = self.storage.open(path.as_ref()).unwrap();
    let mut out = Vec::new();
    match codec {
      Some(codec) => {
        codec.wrap_input(input, None).unwrap().read_to_end(&mut out).unwrap();
      }
      None => {
        let mut input = input;
        input.read_to_end(&mut out).unwrap();
      }
    }
    out
  }

  pub fn lines(&self, path: impl AsRef<Path>, codec: Option<Codec>) -> Vec<String> {
    String::from_utf8(self.read_decoded(path, codec))
      .unwrap()
      .lines()
      .map(str::to_string)
      .collect()
  }
}

/// Storage wrapper whose `create` fails a set number of times before
/// delegating.
pub struct FlakyStorage {
  inner: LocalStorage,
  failures_left: AtomicU32,
  pub create_calls: AtomicU32,
}

impl FlakyStorage {
  pub fn new(inner: LocalStorage, failures: u32) -> Self {
    Self {
      inner,
      failures_left: AtomicU32::new(failures),
      create_calls: AtomicU32::new(0),
    }
  }
}

impl Storage for FlakyStorage {
  fn create(&self, path: &Path, mode: CreateMode) -> ironsink::Result<Box<dyn OutputStream>> {
    self.create_calls.fetch_add(1, Ordering::SeqCst);
    let fail = self
      .failures_left
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if fail {
      return Err(std::io::Error::new(std::io::ErrorKind::Other, "injected create failure").into());
    }
    self.inner.create(path, mode)
  }

  fn open(&self, path: &Path) -> ironsink::Result<Box<dyn InputStream>> {
    self.inner.open(path)
  }

  fn exists(&self, path: &Path) -> ironsink::Result<bool> {
    self.inner.exists(path)
  }

  fn rename(&self, src: &Path, dst: &Path) -> ironsink::Result<()> {
    self.inner.rename(src, dst)
  }

  fn delete(&self, path: &Path, recursive: bool) -> ironsink::Result<bool> {
    self.inner.delete(path, recursive)
  }

  fn list(&self, path: &Path) -> ironsink::Result<Vec<FileStatus>> {
    self.inner.list(path)
  }
}
