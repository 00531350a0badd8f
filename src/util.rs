use crate::error::{Error, Result};
use std::fmt::Write;
use std::path::{Component, Path, PathBuf};

/// Sanitizes a partition key so it is safe to use as a directory name.
///
/// Bytes outside `[A-Za-z0-9._=-]` (including `%`) are percent-escaped, so
/// distinct keys always map to distinct directories.
pub fn sanitize_partition_key(key: &str) -> Result<String> {
  if key.trim().is_empty() {
    return Err(Error::Config("Partition key cannot be empty".into()));
  }

  let mut sanitized = String::with_capacity(key.len());
  for byte in key.bytes() {
    match byte {
      b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'=' => sanitized.push(byte as char),
      // Path separators, nulls and anything else suspicious
      _ => {
        let _ = write!(sanitized, "%{:02X}", byte);
      }
    }
  }

  // Prevent directory traversal attacks
  if sanitized == ".." || sanitized == "." {
    return Err(Error::Config(format!("Invalid partition key: {}", key)));
  }

  Ok(sanitized)
}

/// Joins a partition sub-path under `root`, refusing anything that would
/// escape it.
pub fn ensure_safe_path(root: &Path, child: &Path) -> Result<PathBuf> {
  for component in child.components() {
    match component {
      Component::Normal(_) | Component::CurDir => {}
      _ => {
        return Err(Error::Config(format!(
          "Partition path must be relative and stay inside the base path: {}",
          child.display()
        )));
      }
    }
  }
  Ok(root.join(child))
}

/// Decorates the file name of `path` with the in-writing prefix and suffix.
pub fn in_writing_path(path: &Path, prefix: Option<&str>, suffix: Option<&str>) -> PathBuf {
  let prefix = prefix.unwrap_or("");
  let suffix = suffix.unwrap_or("");
  if prefix.is_empty() && suffix.is_empty() {
    return path.to_path_buf();
  }
  let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
  path.with_file_name(format!("{}{}{}", prefix, name, suffix))
}

/// Removes the in-writing prefix and suffix from a file name.
/// Returns `None` if the name does not carry the decoration.
pub fn strip_in_writing<'a>(name: &'a str, prefix: Option<&str>, suffix: Option<&str>) -> Option<&'a str> {
  let prefix = prefix.unwrap_or("");
  let suffix = suffix.unwrap_or("");
  if prefix.is_empty() && suffix.is_empty() {
    return None;
  }
  let stripped = name.strip_prefix(prefix)?.strip_suffix(suffix)?;
  if stripped.is_empty() { None } else { Some(stripped) }
}

/// Returns the file name of `path` as a `String`.
pub fn file_name(path: &Path) -> Option<String> {
  path.file_name().map(|n| n.to_string_lossy().into_owned())
}
