mod common;
use common::TestEnv;
use ironsink::{
  Error, FnSerializer, KeyPartitionStrategy, NamingChain, NamingStrategy, NoPartition, PartitionKey, PartitionedWriter,
  WriterConfig, WriterState,
};

fn by_prefix() -> KeyPartitionStrategy<impl Fn(&str) -> Option<String> + Send + Sync> {
  KeyPartitionStrategy::new(|line: &str| line.split_once(',').map(|(k, _)| k.to_string()))
}

#[test]
fn test_records_land_in_partition_directories() {
  let env = TestEnv::new();
  let writer = env.writer(WriterConfig::new("out"), by_prefix());

  writer.write("eu,1").unwrap();
  writer.write("us,2").unwrap();
  writer.write("eu,3").unwrap();
  assert_eq!(writer.open_partitions(), vec![PartitionKey::new("eu"), PartitionKey::new("us")]);
  writer.close().unwrap();

  assert_eq!(env.file_names("out"), vec!["eu/data-0", "us/data-0"]);
  assert_eq!(env.lines("out/eu/data-0", None), vec!["eu,1", "eu,3"]);
  assert_eq!(env.lines("out/us/data-0", None), vec!["us,2"]);
}

#[test]
fn test_records_without_key_use_fallback_writer() {
  let env = TestEnv::new();
  let writer = env.writer(WriterConfig::new("out"), by_prefix());

  writer.write("no-key-here").unwrap();
  writer.write("k,v").unwrap();
  writer.close().unwrap();

  assert_eq!(env.file_names("out"), vec!["data-0", "k/data-0"]);
  assert_eq!(env.lines("out/data-0", None), vec!["no-key-here"]);
}

#[test]
fn test_in_writing_name_until_close() {
  let env = TestEnv::new();
  let mut config = WriterConfig::new("out");
  config.in_writing_prefix = Some("_".into());
  config.in_writing_suffix = Some(".tmp".into());
  let writer = env.writer(config, NoPartition);

  writer.write("a").unwrap();
  writer.flush().unwrap();
  assert_eq!(env.file_names("out"), vec!["_data-0.tmp"]);

  let partition = writer.partition_writer(&PartitionKey::fallback()).unwrap();
  assert_eq!(partition.state(), WriterState::Open);
  assert_eq!(partition.bytes_since_open(), 2);
  assert!(partition.current_path().unwrap().ends_with("_data-0.tmp"));

  writer.close().unwrap();
  assert_eq!(partition.state(), WriterState::Closed);
  assert_eq!(env.file_names("out"), vec!["data-0"]);
  assert_eq!(env.read_raw("out/data-0"), b"a\n");
}

#[test]
fn test_write_after_close_fails() {
  let env = TestEnv::new();
  let writer = env.writer(WriterConfig::new("out"), NoPartition);
  writer.write("a").unwrap();
  assert!(writer.is_running());

  writer.close().unwrap();
  assert!(!writer.is_running());
  assert!(matches!(writer.write("b"), Err(Error::Closed)));
  // Idempotent
  writer.close().unwrap();
}

#[test]
fn test_partition_handle_is_dead_after_close() {
  let env = TestEnv::new();
  let mut config = WriterConfig::new("out");
  config.in_writing_suffix = Some(".tmp".into());
  let writer = env.writer(config, NoPartition);
  writer.write("a").unwrap();

  let partition = writer.partition_writer(&PartitionKey::fallback()).unwrap();
  writer.close().unwrap();

  // A handle kept across shutdown must not open a new file.
  assert!(matches!(partition.write(b"late"), Err(Error::Closed)));
  assert_eq!(partition.state(), WriterState::Closed);
  assert_eq!(env.file_names("out"), vec!["data-0"]);
}

#[test]
fn test_drop_commits_open_files() {
  let env = TestEnv::new();
  let mut config = WriterConfig::new("out");
  config.in_writing_suffix = Some(".tmp".into());
  {
    let writer = env.writer(config, by_prefix());
    writer.write("p,1").unwrap();
  }
  assert_eq!(env.file_names("out"), vec!["p/data-0"]);
}

#[test]
fn test_explicit_key_and_custom_delimiter() {
  let env = TestEnv::new();
  let mut config = WriterConfig::new("out");
  config.delimiter = b"\r\n".to_vec();
  config.naming = NamingChain::new(vec![NamingStrategy::fixed("events"), NamingStrategy::fixed_with_separator("log", ".")]);
  let writer = env.writer(config, NoPartition);

  writer.write_to("x", &PartitionKey::new("manual")).unwrap();
  writer.write_to("y", &PartitionKey::new("manual")).unwrap();
  writer.close().unwrap();

  assert_eq!(env.read_raw("out/manual/events.log"), b"x\r\ny\r\n");
}

#[test]
fn test_custom_serializer() {
  struct Event {
    user: String,
    clicks: u32,
  }

  let env = TestEnv::new();
  let strategy = KeyPartitionStrategy::new(|e: &Event| Some(e.user.clone()));
  let serializer = FnSerializer(|e: &Event, out: &mut Vec<u8>| -> ironsink::Result<()> {
    out.extend_from_slice(format!("{}:{}", e.user, e.clicks).as_bytes());
    Ok(())
  });
  let writer: PartitionedWriter<Event> =
    PartitionedWriter::with_serializer(WriterConfig::new("out"), env.storage.clone(), strategy, serializer).unwrap();

  writer.write(&Event { user: "ann".into(), clicks: 3 }).unwrap();
  writer.write(&Event { user: "bob".into(), clicks: 1 }).unwrap();
  writer.close().unwrap();

  assert_eq!(env.lines("out/ann/data-0", None), vec!["ann:3"]);
  assert_eq!(env.lines("out/bob/data-0", None), vec!["bob:1"]);
}

#[test]
fn test_unsafe_partition_key_is_sanitized() {
  let env = TestEnv::new();
  let writer = env.writer(WriterConfig::new("out"), by_prefix());
  writer.write("../../etc,boom").unwrap();
  writer.close().unwrap();

  assert_eq!(env.file_names("out"), vec!["..%2F..%2Fetc/data-0"]);
}

#[test]
fn test_similar_keys_get_separate_directories() {
  let env = TestEnv::new();
  let mut config = WriterConfig::new("out");
  config.overwrite = true;
  let writer = env.writer(config, by_prefix());
  writer.write("eu/west,1").unwrap();
  writer.write("eu_west,2").unwrap();
  writer.close().unwrap();

  assert_eq!(env.file_names("out"), vec!["eu%2Fwest/data-0", "eu_west/data-0"]);
  assert_eq!(env.lines("out/eu%2Fwest/data-0", None), vec!["eu/west,1"]);
  assert_eq!(env.lines("out/eu_west/data-0", None), vec!["eu_west,2"]);
}

#[test]
fn test_invalid_config_rejected() {
  let env = TestEnv::new();
  let mut config = WriterConfig::new("out");
  config.file_open_attempts = 0;
  let result: ironsink::Result<PartitionedWriter<str>> = PartitionedWriter::new(config, env.storage.clone(), NoPartition);
  assert!(matches!(result, Err(Error::Config(_))));
}
