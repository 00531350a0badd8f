use uuid::Uuid;

use crate::codec::Codec;

/// Default priorities. Lower runs first.
pub const STATIC_PRIORITY: i32 = 10;
pub const UUID_PRIORITY: i32 = 20;
pub const ROLLING_PRIORITY: i32 = 30;
pub const CODEC_PRIORITY: i32 = i32::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamingKind {
  /// A fixed literal segment.
  Static { segment: String, separator: String },
  /// `<separator><counter>`.
  Rolling { separator: String, initial: u64, counter: u64 },
  /// `<separator><id>`. The id is regenerated per instance unless supplied.
  Uuid { separator: String, id: String, supplied: bool },
  /// `.<codec suffix>`, inert until a codec is bound.
  Codec { codec: Option<Codec> },
}

/// One step of a naming chain.
///
/// `resolve` appends this strategy's segment to a file name, `init` strips it
/// back off an existing name (updating state where needed), `next` advances
/// state after a rollover and `reset` returns to the initial state.
/// A disabled strategy passes names through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingStrategy {
  kind: NamingKind,
  priority: i32,
  enabled: bool,
}

impl NamingStrategy {
  fn with_kind(kind: NamingKind, priority: i32) -> Self {
    Self {
      kind,
      priority,
      enabled: true,
    }
  }

  pub fn fixed(segment: impl Into<String>) -> Self {
    Self::fixed_with_separator(segment, "")
  }

  /// A static segment that is separated from a preceding name, e.g. `.extension`.
  pub fn fixed_with_separator(segment: impl Into<String>, separator: impl Into<String>) -> Self {
    Self::with_kind(
      NamingKind::Static {
        segment: segment.into(),
        separator: separator.into(),
      },
      STATIC_PRIORITY,
    )
  }

  pub fn rolling(separator: impl Into<String>) -> Self {
    Self::with_kind(
      NamingKind::Rolling {
        separator: separator.into(),
        initial: 0,
        counter: 0,
      },
      ROLLING_PRIORITY,
    )
  }

  /// A random identifier generated once per writer.
  pub fn uuid(separator: impl Into<String>) -> Self {
    Self::with_kind(
      NamingKind::Uuid {
        separator: separator.into(),
        id: Uuid::new_v4().to_string(),
        supplied: false,
      },
      UUID_PRIORITY,
    )
  }

  /// An identifier fixed by the caller, shared by every writer.
  pub fn uuid_with(separator: impl Into<String>, id: impl Into<String>) -> Self {
    Self::with_kind(
      NamingKind::Uuid {
        separator: separator.into(),
        id: id.into(),
        supplied: true,
      },
      UUID_PRIORITY,
    )
  }

  /// Appends the suffix of whatever codec the writer is configured with.
  pub fn codec() -> Self {
    Self::with_kind(NamingKind::Codec { codec: None }, CODEC_PRIORITY)
  }

  pub fn for_codec(codec: Codec) -> Self {
    Self::with_kind(NamingKind::Codec { codec: Some(codec) }, CODEC_PRIORITY)
  }

  pub fn with_priority(mut self, priority: i32) -> Self {
    self.priority = priority;
    self
  }

  pub fn with_enabled(mut self, enabled: bool) -> Self {
    self.enabled = enabled;
    self
  }

  /// Sets the value a rolling counter starts from (and resets to).
  pub fn with_initial(mut self, value: u64) -> Self {
    if let NamingKind::Rolling { initial, counter, .. } = &mut self.kind {
      *initial = value;
      *counter = value;
    }
    self
  }

  pub fn kind(&self) -> &NamingKind {
    &self.kind
  }

  pub fn priority(&self) -> i32 {
    self.priority
  }

  pub fn is_enabled(&self) -> bool {
    self.enabled
  }

  /// Current counter value for rolling strategies.
  pub fn counter(&self) -> Option<u64> {
    match &self.kind {
      NamingKind::Rolling { counter, .. } => Some(*counter),
      _ => None,
    }
  }

  pub(crate) fn bind_codec(&mut self, writer_codec: Option<Codec>) {
    if let NamingKind::Codec { codec } = &mut self.kind {
      if codec.is_none() {
        *codec = writer_codec;
      }
    }
  }

  /// A copy with fresh mutable state.
  pub(crate) fn instantiate(&self) -> Self {
    let mut copy = self.clone();
    copy.reset();
    if let NamingKind::Uuid { id, supplied: false, .. } = &mut copy.kind {
      *id = Uuid::new_v4().to_string();
    }
    copy
  }

  pub fn resolve(&self, name: Option<String>) -> Option<String> {
    if !self.enabled {
      return name;
    }
    match &self.kind {
      NamingKind::Static { segment, separator } => Some(match name {
        Some(n) => format!("{}{}{}", n, separator, segment),
        None => segment.clone(),
      }),
      NamingKind::Rolling { separator, counter, .. } => Some(match name {
        Some(n) => format!("{}{}{}", n, separator, counter),
        None => counter.to_string(),
      }),
      NamingKind::Uuid { separator, id, .. } => Some(match name {
        Some(n) => format!("{}{}{}", n, separator, id),
        None => id.clone(),
      }),
      NamingKind::Codec { codec: Some(codec) } => {
        Some(format!("{}.{}", name.unwrap_or_default(), codec.default_suffix()))
      }
      NamingKind::Codec { codec: None } => name,
    }
  }

  pub fn init(&mut self, name: Option<String>) -> Option<String> {
    if !self.enabled {
      return name;
    }
    let name = name?;
    match &mut self.kind {
      NamingKind::Static { .. } => Some(name),
      NamingKind::Rolling { separator, counter, .. } => match find_counter(&name, separator) {
        Some((end, value)) => {
          *counter = (*counter).max(value.saturating_add(1));
          remainder(&name, end)
        }
        None => Some(name),
      },
      NamingKind::Uuid { separator, id, .. } => {
        let segment = format!("{}{}", separator, id);
        match name.find(&segment) {
          Some(pos) => remainder(&name, pos + segment.len()),
          None if name.starts_with(id.as_str()) => remainder(&name, id.len()),
          None => Some(name),
        }
      }
      NamingKind::Codec { codec: Some(codec) } => {
        let suffix = format!(".{}", codec.default_suffix());
        match name.find(&suffix) {
          Some(pos) => remainder(&name, pos + suffix.len()),
          None => Some(name),
        }
      }
      NamingKind::Codec { codec: None } => Some(name),
    }
  }

  pub fn next(&mut self) {
    if !self.enabled {
      return;
    }
    if let NamingKind::Rolling { counter, .. } = &mut self.kind {
      *counter = counter.saturating_add(1);
    }
  }

  pub fn reset(&mut self) {
    if let NamingKind::Rolling { initial, counter, .. } = &mut self.kind {
      *counter = *initial;
    }
  }
}

fn remainder(name: &str, from: usize) -> Option<String> {
  let rest = &name[from..];
  if rest.is_empty() { None } else { Some(rest.to_string()) }
}

/// Finds the last `<separator><digits>` run in `name`. A digit run at the very
/// start of the name also counts, since a counter resolved without a preceding
/// segment carries no separator. Returns the end of the run and its value.
fn find_counter(name: &str, separator: &str) -> Option<(usize, u64)> {
  let bytes = name.as_bytes();
  let mut found = None;

  for start in 0..=bytes.len() {
    if !name.is_char_boundary(start) {
      continue;
    }
    let digits_from = if start == 0 && bytes.first().is_some_and(|b| b.is_ascii_digit()) {
      0
    } else if !separator.is_empty() && name[start..].starts_with(separator) {
      start + separator.len()
    } else if separator.is_empty() && start > 0 && !bytes[start - 1].is_ascii_digit() {
      start
    } else {
      continue;
    };

    let digits_to = digits_from + bytes[digits_from..].iter().take_while(|b| b.is_ascii_digit()).count();
    if digits_to == digits_from {
      continue;
    }
    if let Ok(value) = name[digits_from..digits_to].parse::<u64>() {
      found = Some((digits_to, value));
    }
  }
  found
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_rolling_init_resumes_counter() {
    let mut rolling = NamingStrategy::rolling("-");
    assert_eq!(rolling.init(Some("foo-7".into())), None);
    assert_eq!(rolling.counter(), Some(8));
    assert_eq!(rolling.resolve(Some("foo".into())), Some("foo-8".into()));
  }

  #[test]
  fn test_rolling_init_never_moves_backwards() {
    let mut rolling = NamingStrategy::rolling("-");
    rolling.init(Some("-9".into()));
    rolling.init(Some("-3".into()));
    assert_eq!(rolling.counter(), Some(10));
  }

  #[test]
  fn test_rolling_init_takes_last_match() {
    let mut rolling = NamingStrategy::rolling("-");
    assert_eq!(rolling.init(Some("a-1-22.txt".into())), Some(".txt".into()));
    assert_eq!(rolling.counter(), Some(23));
  }

  #[test]
  fn test_rolling_init_without_match_is_passthrough() {
    let mut rolling = NamingStrategy::rolling("-");
    assert_eq!(rolling.init(Some("plain".into())), Some("plain".into()));
    assert_eq!(rolling.counter(), Some(0));
  }

  #[test]
  fn test_rolling_bare_counter() {
    let mut rolling = NamingStrategy::rolling("-").with_initial(5);
    assert_eq!(rolling.resolve(None), Some("5".into()));
    assert_eq!(rolling.init(Some("12".into())), None);
    assert_eq!(rolling.counter(), Some(13));
    rolling.reset();
    assert_eq!(rolling.counter(), Some(5));
  }

  #[test]
  fn test_static_init_is_noop() {
    let mut fixed = NamingStrategy::fixed("data");
    assert_eq!(fixed.resolve(None), Some("data".into()));
    assert_eq!(fixed.resolve(Some("x".into())), Some("xdata".into()));
    assert_eq!(fixed.init(Some("data-1".into())), Some("data-1".into()));
  }

  #[test]
  fn test_uuid_strips_exact_segment() {
    let mut uuid = NamingStrategy::uuid_with("-", "abc");
    assert_eq!(uuid.resolve(Some("base".into())), Some("base-abc".into()));
    assert_eq!(uuid.init(Some("base-abc-3".into())), Some("-3".into()));
    assert_eq!(uuid.init(Some("base-xyz".into())), Some("base-xyz".into()));
  }

  #[test]
  fn test_generated_uuid_changes_per_instance() {
    let template = NamingStrategy::uuid("-");
    let a = template.instantiate();
    let b = template.instantiate();
    assert_ne!(a.resolve(None), b.resolve(None));

    let supplied = NamingStrategy::uuid_with("-", "fixed");
    assert_eq!(supplied.instantiate().resolve(None), Some("fixed".into()));
  }

  #[test]
  fn test_codec_suffix() {
    let mut codec = NamingStrategy::for_codec(Codec::gzip());
    assert_eq!(codec.resolve(Some("data".into())), Some("data.gz".into()));
    assert_eq!(codec.init(Some("data.gz".into())), None);

    let mut unbound = NamingStrategy::codec();
    assert_eq!(unbound.resolve(Some("data".into())), Some("data".into()));
    unbound.bind_codec(Some(Codec::lz4()));
    assert_eq!(unbound.resolve(Some("data".into())), Some("data.lz4".into()));
  }

  #[test]
  fn test_disabled_passthrough() {
    let mut rolling = NamingStrategy::rolling("-").with_enabled(false);
    assert_eq!(rolling.resolve(Some("a".into())), Some("a".into()));
    rolling.next();
    assert_eq!(rolling.init(Some("a-4".into())), Some("a-4".into()));
    assert_eq!(rolling.counter(), Some(0));
  }
}
