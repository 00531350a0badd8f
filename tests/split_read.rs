mod common;
use common::TestEnv;
use ironsink::{Error, SlopSplitter, Split, TextReader};
use std::path::Path;

fn write_file(env: &TestEnv, name: &str, records: &[String], delimiter: &str) -> u64 {
  let mut body = String::new();
  for record in records {
    body.push_str(record);
    body.push_str(delimiter);
  }
  std::fs::write(env.root.join(name), &body).unwrap();
  body.len() as u64
}

fn read_all_splits(env: &TestEnv, name: &str, splits: &[Split], delimiter: &[u8]) -> Vec<String> {
  let mut out = Vec::new();
  for split in splits {
    let reader =
      TextReader::open_with_delimiter(env.storage.as_ref(), Path::new(name), None, Some(*split), delimiter).unwrap();
    for record in reader {
      out.push(String::from_utf8(record.unwrap()).unwrap());
    }
  }
  out
}

fn records(n: usize) -> Vec<String> {
  // Varying lengths so split boundaries land everywhere inside records.
  (0..n).map(|i| format!("{}:{}", i, "v".repeat(i % 23))).collect()
}

#[test]
fn test_raw_splits_read_each_record_once() {
  let env = TestEnv::new();
  let expected = records(1000);
  let len = write_file(&env, "lines.txt", &expected, "\n");

  for split_size in [1, 7, 64, 333, 4096, len] {
    let splits = SlopSplitter::new(split_size).splits(len);
    let seen = read_all_splits(&env, "lines.txt", &splits, b"\n");
    assert_eq!(seen, expected, "split size {}", split_size);
  }
}

#[test]
fn test_multibyte_delimiter_across_boundaries() {
  let env = TestEnv::new();
  let expected = records(300);
  let len = write_file(&env, "crlf.txt", &expected, "\r\n");

  for split_size in [2, 5, 100] {
    let splits = SlopSplitter::new(split_size).splits(len);
    let seen = read_all_splits(&env, "crlf.txt", &splits, b"\r\n");
    assert_eq!(seen, expected, "split size {}", split_size);
  }
}

#[test]
fn test_split_on_record_boundary() {
  let env = TestEnv::new();
  write_file(&env, "f.txt", &["aaaa".to_string(), "bbbb".to_string(), "cccc".to_string()], "\n");

  // The first split ends exactly where "bbbb" starts, so it reads that
  // record too; the second split skips it.
  let first = read_all_splits(&env, "f.txt", &[Split::new(0, 5)], b"\n");
  assert_eq!(first, vec!["aaaa", "bbbb"]);
  let second = read_all_splits(&env, "f.txt", &[Split::new(5, 10)], b"\n");
  assert_eq!(second, vec!["cccc"]);
}

#[test]
fn test_empty_records_and_missing_trailing_delimiter() {
  let env = TestEnv::new();
  std::fs::write(env.root.join("gaps.txt"), b"a\n\nb\nlast").unwrap();

  let mut reader = TextReader::open(env.storage.as_ref(), Path::new("gaps.txt"), None, None).unwrap();
  assert_eq!(reader.read().unwrap(), Some(b"a".to_vec()));
  assert_eq!(reader.read().unwrap(), Some(Vec::new()));
  assert_eq!(reader.read_line().unwrap().as_deref(), Some("b"));
  assert_eq!(reader.read_line().unwrap().as_deref(), Some("last"));
  assert_eq!(reader.read().unwrap(), None);
  assert_eq!(reader.read().unwrap(), None);
}

#[test]
fn test_context_tracks_position() {
  let env = TestEnv::new();
  let len = write_file(&env, "p.txt", &records(100), "\n");

  let split = Split::new(50, 100);
  let mut reader = TextReader::open(env.storage.as_ref(), Path::new("p.txt"), None, Some(split)).unwrap();
  assert_eq!(reader.context().start(), 50);
  assert_eq!(reader.context().end(), 150);

  let mut last = reader.context().position();
  while reader.read().unwrap().is_some() {
    let position = reader.context().position();
    assert!(position > last);
    last = position;
  }
  // The last record read started at or before the split end.
  assert!(last > 150 && last <= len);
}

#[test]
fn test_splits_for_file() {
  let env = TestEnv::new();
  let len = write_file(&env, "s.txt", &records(200), "\n");
  let splits = SlopSplitter::new(256).splits_for(env.storage.as_ref(), Path::new("s.txt")).unwrap();
  assert_eq!(splits.iter().map(|s| s.length).sum::<u64>(), len);

  let missing = SlopSplitter::new(256).splits_for(env.storage.as_ref(), Path::new("nope.txt"));
  assert!(matches!(missing, Err(Error::Config(_))));
}

#[test]
fn test_invalid_utf8_is_reported() {
  let env = TestEnv::new();
  std::fs::write(env.root.join("bin.txt"), [0xFF, 0xFE, b'\n']).unwrap();
  let mut reader = TextReader::open(env.storage.as_ref(), Path::new("bin.txt"), None, None).unwrap();
  assert!(matches!(reader.read_line(), Err(Error::Corruption(_))));
}
