use crate::error::Result;

/// Turns a record into the bytes written for it. The delimiter is appended
/// by the writer.
pub trait Serializer<T: ?Sized>: Send + Sync {
  fn serialize(&self, record: &T, out: &mut Vec<u8>) -> Result<()>;
}

/// Writes a record's bytes unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawSerializer;

impl<T: AsRef<[u8]> + ?Sized> Serializer<T> for RawSerializer {
  fn serialize(&self, record: &T, out: &mut Vec<u8>) -> Result<()> {
    out.extend_from_slice(record.as_ref());
    Ok(())
  }
}

/// Adapts a closure into a `Serializer`.
pub struct FnSerializer<F>(pub F);

impl<T, F> Serializer<T> for FnSerializer<F>
where
  T: ?Sized,
  F: Fn(&T, &mut Vec<u8>) -> Result<()> + Send + Sync,
{
  fn serialize(&self, record: &T, out: &mut Vec<u8>) -> Result<()> {
    (self.0)(record, out)
  }
}
