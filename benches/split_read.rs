use std::hint::black_box;
use std::path::Path;
use std::sync::Arc;

use criterion::{Bencher, Criterion, criterion_group, criterion_main};
use ironsink::{Codec, LocalStorage, NoPartition, PartitionedWriter, SlopSplitter, TextReader, WriterConfig};
use rand::{Rng, rng};
use tempfile::TempDir;

const RECORDS: usize = 20_000;

// Writes one file of RECORDS lines and returns the storage it lives in.
fn setup_file(codec: Option<Codec>) -> (LocalStorage, TempDir) {
  let dir = tempfile::tempdir().unwrap();
  let storage = LocalStorage::new(dir.path()).unwrap();
  let mut config = WriterConfig::new("bench");
  config.codec = codec;

  let writer: PartitionedWriter<str> = PartitionedWriter::new(config, Arc::new(storage.clone()), NoPartition).unwrap();
  for i in 0..RECORDS {
    writer.write(&format!("{:08}-{}", i, "payload".repeat(8))).unwrap();
  }
  writer.close().unwrap();
  (storage, dir)
}

fn count_split_records(storage: &LocalStorage, path: &Path, codec: Option<Codec>, split_size: u64) -> usize {
  let splits = SlopSplitter::new(split_size).splits_for(storage, path).unwrap();
  let mut count = 0;
  for split in splits {
    let reader = TextReader::open(storage, path, codec, Some(split)).unwrap();
    for record in reader {
      black_box(record.unwrap());
      count += 1;
    }
  }
  count
}

fn bench_reads(c: &mut Criterion) {
  let mut group = c.benchmark_group("Split Read");

  let (plain, _plain_dir) = setup_file(None);
  let (block, _block_dir) = setup_file(Some(Codec::lz4_block().with_block_size(16 * 1024)));
  let (gzip, _gzip_dir) = setup_file(Some(Codec::gzip()));

  group.bench_function("raw_64k_splits", |b: &mut Bencher| {
    b.iter(|| {
      let n = count_split_records(&plain, Path::new("bench/data-0"), None, 64 * 1024);
      assert_eq!(n, RECORDS);
    })
  });

  // A single task picking up one split, as a distributed reader would.
  let block_splits = SlopSplitter::new(64 * 1024)
    .splits_for(&block, Path::new("bench/data-0.blz4"))
    .unwrap();
  group.bench_function("lz4_block_random_split", |b: &mut Bencher| {
    b.iter(|| {
      let split = block_splits[rng().random_range(0..block_splits.len())];
      let reader =
        TextReader::open(&block, Path::new("bench/data-0.blz4"), Some(Codec::lz4_block()), Some(split)).unwrap();
      black_box(reader.count());
    })
  });

  group.bench_function("lz4_block_64k_splits", |b: &mut Bencher| {
    b.iter(|| {
      let n = count_split_records(&block, Path::new("bench/data-0.blz4"), Some(Codec::lz4_block()), 64 * 1024);
      assert_eq!(n, RECORDS);
    })
  });

  group.bench_function("gzip_whole_file", |b: &mut Bencher| {
    b.iter(|| {
      let mut reader =
        TextReader::open(&gzip, Path::new("bench/data-0.gz"), Some(Codec::gzip()), None).unwrap();
      let mut n = 0;
      while let Some(line) = reader.read().unwrap() {
        black_box(line);
        n += 1;
      }
      assert_eq!(n, RECORDS);
    })
  });

  group.finish();
}

criterion_group!(benches, bench_reads);
criterion_main!(benches);
