mod primitive;

pub use primitive::LittleEndian;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BinaryReadError {
    #[error("not enough remaining bytes to read value")]
    NotEnoughRemainingBytes,
    #[error("blob of {0} bytes exceeds maximum size of {1} bytes")]
    BlobBytesExceedMaxSize(usize, usize),
    #[error("trailing bytes left unconsumed after reading frame")]
    TrailingBytes,
}

/// Fixed-width encode/decode for a single field of a self-contained binary record.
///
/// `Self` is never instantiated; it only names the encoding (see [`LittleEndian`]).
/// `T` is the value type being encoded. Callers always pre-allocate `get_write_size(value)`
/// bytes before calling `write`, matching the caller-owns-the-buffer contract used by
/// the replication write path.
pub trait SliceSerializable<'a, T> {
    type CopyType: Clone;

    fn read(bytes: &mut &'a [u8]) -> anyhow::Result<T>;

    fn get_write_size(data: Self::CopyType) -> usize;

    /// # Safety
    /// `bytes` must contain at least `get_write_size(data)` bytes.
    unsafe fn write<'b>(bytes: &'b mut [u8], data: Self::CopyType) -> &'b mut [u8];

    fn as_copy_type(t: &T) -> Self::CopyType;
}

/// A byte blob whose length is implied by the caller (not length-prefixed): used for the
/// `extra` tail of an entity snapshot record, which is bounded to `MAX_SIZE` bytes and
/// consumes exactly as many bytes as it was constructed with.
pub enum FixedBlob<const MAX_SIZE: usize> {}

impl<'a, const MAX_SIZE: usize> FixedBlob<MAX_SIZE> {
    pub fn read_exact(bytes: &mut &'a [u8], len: usize) -> anyhow::Result<&'a [u8]> {
        if len > MAX_SIZE {
            return Err(BinaryReadError::BlobBytesExceedMaxSize(len, MAX_SIZE).into());
        }
        if bytes.len() < len {
            return Err(BinaryReadError::NotEnoughRemainingBytes.into());
        }
        let (blob, rest) = bytes.split_at(len);
        *bytes = rest;
        Ok(blob)
    }
}
