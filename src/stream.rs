use std::io::{Cursor, Error as IoError, ErrorKind};
use std::sync::Arc;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::utilities::{round_to_multiple, FromByteStream};

/// Positional little-endian reader over a borrowed EBX payload.
pub struct ByteReader<'l> {
	stream: Cursor<&'l [u8]>,
}

impl<'l> ByteReader<'l> {
	pub fn new(data: &'l [u8]) -> Self {
		Self { stream: Cursor::new(data) }
	}

	pub fn len(&self) -> u64 {
		self.stream.get_ref().len() as u64
	}

	pub fn tell(&self) -> u64 {
		self.stream.position()
	}

	pub fn seek(&mut self, position: u64) {
		self.stream.set_position(position);
	}

	/// Advances the position to the next multiple of `alignment`.
	pub fn pad(&mut self, alignment: u64) {
		let position = self.stream.position();
		self.stream.set_position(round_to_multiple(position as usize, alignment as usize) as u64);
	}

	pub fn read<T: FromByteStream>(&mut self) -> Result<T> {
		Ok(T::read(&mut self.stream)?)
	}

	pub fn read_guid(&mut self) -> Result<Uuid> {
		let bytes = <[u8; 16]>::read(&mut self.stream)?;
		Ok(Uuid::from_bytes_le(bytes))
	}

	/// Reads a NUL-terminated UTF-8 string and advances past the terminator.
	/// `limit` bounds the scan; a missing terminator within it is a corrupt
	/// pool.
	pub fn read_null_string(&mut self, limit: u64) -> Result<Arc<str>> {
		let start = self.stream.position() as usize;
		let end = (limit as usize).min(self.stream.get_ref().len());
		let slice = match self.stream.get_ref().get(start..end) {
			Some(slice) => slice,
			None => return Err(Error::CorruptString(start as u64)),
		};
		let Some(terminator) = slice.iter().position(|b| *b == 0) else {
			return Err(Error::CorruptString(start as u64));
		};
		let str = std::str::from_utf8(&slice[..terminator])
			.map_err(|_| IoError::from(ErrorKind::InvalidData))?;
		self.stream.set_position((start + terminator + 1) as u64);
		Ok(Arc::from(str))
	}

	/// Reads exactly `size` bytes and trims everything from the first NUL.
	pub fn read_fixed_string(&mut self, size: usize) -> Result<Arc<str>> {
		let start = self.stream.position() as usize;
		let Some(slice) = self.stream.get_ref().get(start..start + size) else {
			return Err(IoError::from(ErrorKind::UnexpectedEof).into());
		};
		let terminator = slice.iter().position(|b| *b == 0).unwrap_or(size);
		let str = std::str::from_utf8(&slice[..terminator])
			.map_err(|_| IoError::from(ErrorKind::InvalidData))?;
		self.stream.set_position((start + size) as u64);
		Ok(Arc::from(str))
	}
}

/// Positional little-endian writer over an owned buffer. Seeking past the end
/// zero-extends, which is what lets class bodies be filled field-by-field at
/// their descriptor offsets.
#[derive(Default)]
pub struct ByteWriter {
	buffer: Vec<u8>,
	position: usize,
}

macro_rules! impl_write_le {
	($($name: ident: $ty: ty),*) => {$(
		pub fn $name(&mut self, value: $ty) {
			self.write_bytes(&value.to_le_bytes());
		}
	)*};
}

impl ByteWriter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> u64 {
		self.buffer.len() as u64
	}

	pub fn is_empty(&self) -> bool {
		self.buffer.is_empty()
	}

	pub fn tell(&self) -> u64 {
		self.position as u64
	}

	pub fn seek(&mut self, position: u64) {
		self.position = position as usize;
		if self.position > self.buffer.len() {
			self.buffer.resize(self.position, 0);
		}
	}

	/// Zero-fills up to the next multiple of `alignment`.
	pub fn pad(&mut self, alignment: u64) {
		self.seek(round_to_multiple(self.position, alignment as usize) as u64);
	}

	pub fn write_bytes(&mut self, bytes: &[u8]) {
		let end = self.position + bytes.len();
		if end > self.buffer.len() {
			self.buffer.resize(end, 0);
		}
		self.buffer[self.position..end].copy_from_slice(bytes);
		self.position = end;
	}

	impl_write_le! {
		write_u8: u8, write_u16: u16, write_u32: u32, write_u64: u64,
		write_i8: i8, write_i16: i16, write_i32: i32, write_i64: i64,
		write_f32: f32, write_f64: f64
	}

	pub fn write_guid(&mut self, guid: Uuid) {
		self.write_bytes(&guid.to_bytes_le());
	}

	pub fn write_null_string(&mut self, value: &str) {
		self.write_bytes(value.as_bytes());
		self.write_u8(0);
	}

	/// Writes `value` into exactly `size` bytes, NUL-padded. The terminator
	/// must fit, so `value` is capped at `size - 1` bytes.
	pub fn write_fixed_string(&mut self, value: &str, size: usize) -> Result<()> {
		if value.len() >= size {
			return Err(IoError::new(ErrorKind::InvalidInput, "string exceeds fixed field").into());
		}
		let mut bytes = vec![0u8; size];
		bytes[..value.len()].copy_from_slice(value.as_bytes());
		self.write_bytes(&bytes);
		Ok(())
	}

	pub fn into_bytes(self) -> Vec<u8> {
		self.buffer
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reader_padding_and_seeks() {
		let data = [1u8, 0, 0, 0, 0, 0, 0, 0, 2, 0];
		let mut reader = ByteReader::new(&data);
		assert_eq!(reader.read::<u8>().unwrap(), 1);
		reader.pad(8);
		assert_eq!(reader.tell(), 8);
		assert_eq!(reader.read::<u16>().unwrap(), 2);
		reader.seek(0);
		assert_eq!(reader.read::<u32>().unwrap(), 1);
	}

	#[test]
	fn null_strings() {
		let data = b"Entity\0rest";
		let mut reader = ByteReader::new(data);
		let name = reader.read_null_string(data.len() as u64).unwrap();
		assert_eq!(&*name, "Entity");
		assert_eq!(reader.tell(), 7);

		let unterminated = b"Entity";
		let mut reader = ByteReader::new(unterminated);
		assert!(matches!(
			reader.read_null_string(unterminated.len() as u64),
			Err(Error::CorruptString(0))
		));
	}

	#[test]
	fn fixed_strings() {
		let mut data = [0u8; 32];
		data[..3].copy_from_slice(b"abc");
		let mut reader = ByteReader::new(&data);
		assert_eq!(&*reader.read_fixed_string(32).unwrap(), "abc");
		assert_eq!(reader.tell(), 32);
	}

	#[test]
	fn writer_zero_extends() {
		let mut writer = ByteWriter::new();
		writer.seek(4);
		writer.write_u16(0xBEEF);
		writer.seek(0);
		writer.write_u8(1);
		assert_eq!(writer.into_bytes(), vec![1, 0, 0, 0, 0xEF, 0xBE]);
	}

	#[test]
	fn writer_padding() {
		let mut writer = ByteWriter::new();
		writer.write_u8(7);
		writer.pad(16);
		assert_eq!(writer.tell(), 16);
		assert_eq!(writer.len(), 16);
	}

	#[test]
	fn guid_round_trip() {
		let guid = Uuid::from_u128(0x0123_4567_89AB_CDEF_0011_2233_4455_6677);
		let mut writer = ByteWriter::new();
		writer.write_guid(guid);
		let bytes = writer.into_bytes();
		let mut reader = ByteReader::new(&bytes);
		assert_eq!(reader.read_guid().unwrap(), guid);
	}
}
