use std::io::Cursor;
use std::mem::size_of;

pub trait FromByteStream where Self: Sized {
	fn read(stream: &mut Cursor<&[u8]>) -> std::io::Result<Self>;
}

macro_rules! impl_from_le_byte_stream {
	($($ty: ty),*) => {$(
		impl crate::utilities::FromByteStream for $ty {
			fn read(stream: &mut std::io::Cursor<&[u8]>) -> std::io::Result<Self> {
				let bytes = <[u8; size_of::<Self>()]>::read(stream)?;
				Ok(Self::from_le_bytes(bytes))
			}
		}
	)*};
}

impl FromByteStream for u8 {
	fn read(stream: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
		let mut byte = 0u8;
		std::io::Read::read_exact(stream, std::slice::from_mut(&mut byte))?;
		Ok(byte)
	}
}

impl_from_le_byte_stream!(u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl<const SIZE: usize> FromByteStream for [u8; SIZE] {
	fn read(stream: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
		let mut bytes = [0u8; SIZE];
		std::io::Read::read_exact(stream, &mut bytes)?;
		Ok(bytes)
	}
}

pub(crate) const fn round_to_multiple(value: usize, multiple: usize) -> usize {
	((value + (multiple - 1)) / multiple) * multiple
}

/// 32-bit DJB2-XOR over the UTF-8 bytes, the hash the wire format keys its
/// type and field names with.
pub fn hash_name(name: &str) -> u32 {
	name.bytes().fold(5381u32, |hash, byte| hash.wrapping_mul(33) ^ byte as u32)
}
