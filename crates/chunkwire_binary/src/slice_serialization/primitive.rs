use super::*;

/// All entity-snapshot integer fields are little-endian, regardless of host byte order.
pub enum LittleEndian {}

macro_rules! for_primitive {
    ($typ:tt) => {
        impl SliceSerializable<'_, $typ> for LittleEndian {
            type CopyType = $typ;

            fn read(bytes: &mut &[u8]) -> anyhow::Result<$typ> {
                const SIZE: usize = std::mem::size_of::<$typ>();

                if bytes.len() < SIZE {
                    return Err(BinaryReadError::NotEnoughRemainingBytes.into());
                }

                let mut raw = [0u8; SIZE];
                raw.copy_from_slice(&bytes[..SIZE]);
                *bytes = &bytes[SIZE..];

                Ok($typ::from_le_bytes(raw))
            }

            fn get_write_size(_: $typ) -> usize {
                std::mem::size_of::<$typ>()
            }

            unsafe fn write<'b>(bytes: &'b mut [u8], value: $typ) -> &'b mut [u8] {
                const SIZE: usize = std::mem::size_of::<$typ>();

                debug_assert!(
                    bytes.len() >= SIZE,
                    "invariant: slice must contain at least {} bytes to perform write",
                    SIZE
                );

                bytes[..SIZE].copy_from_slice(&$typ::to_le_bytes(value));
                &mut bytes[SIZE..]
            }

            #[inline(always)]
            fn as_copy_type(t: &$typ) -> Self::CopyType {
                *t
            }
        }
    };
}

for_primitive!(u8);
for_primitive!(i8);
for_primitive!(u16);
for_primitive!(i16);
for_primitive!(u32);
for_primitive!(i32);
for_primitive!(u64);
for_primitive!(i64);
