use uuid::Uuid;

use crate::error::{Error, Result};
use crate::stream::{ByteReader, ByteWriter};

pub const MAGIC_V2: u32 = 2;
pub const MAGIC_V4: u32 = 4;

/// Fixed Partition header. All offsets absolute from the file start except
/// `boxed_values_offset`, which is stored relative to the end of the string
/// pool.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct EbxHeader {
	pub magic: u32,
	pub strings_offset: u32,
	pub strings_and_data_len: u32,
	pub import_count: u32,
	pub instance_count: u16,
	pub exported_count: u16,
	pub unique_type_count: u16,
	pub type_descriptor_count: u16,
	pub field_descriptor_count: u16,
	pub type_names_len: u16,
	pub strings_len: u32,
	pub array_count: u32,
	pub data_len: u32,
	pub file_guid: Uuid,
	pub boxed_values_count: u32,
	pub boxed_values_offset: u32,
}

impl EbxHeader {
	pub fn read(stream: &mut ByteReader) -> Result<Self> {
		let magic = stream.read::<u32>()?;
		if magic != MAGIC_V2 && magic != MAGIC_V4 {
			return Err(Error::BadMagic(magic));
		}

		let mut header = Self {
			magic,
			strings_offset: stream.read()?,
			strings_and_data_len: stream.read()?,
			import_count: stream.read()?,
			instance_count: stream.read()?,
			exported_count: stream.read()?,
			unique_type_count: stream.read()?,
			type_descriptor_count: stream.read()?,
			field_descriptor_count: stream.read()?,
			type_names_len: stream.read()?,
			strings_len: stream.read()?,
			array_count: stream.read()?,
			data_len: stream.read()?,
			file_guid: stream.read_guid()?,
			boxed_values_count: 0,
			boxed_values_offset: 0,
		};

		match magic {
			MAGIC_V4 => {
				header.boxed_values_count = stream.read()?;
				header.boxed_values_offset = stream.read()?;
			},
			_ => stream.seek(stream.tell() + 16),
		}

		Ok(header)
	}

	pub fn write(&self, out: &mut ByteWriter) {
		out.write_u32(self.magic);
		out.write_u32(self.strings_offset);
		out.write_u32(self.strings_and_data_len);
		out.write_u32(self.import_count);
		out.write_u16(self.instance_count);
		out.write_u16(self.exported_count);
		out.write_u16(self.unique_type_count);
		out.write_u16(self.type_descriptor_count);
		out.write_u16(self.field_descriptor_count);
		out.write_u16(self.type_names_len);
		out.write_u32(self.strings_len);
		out.write_u32(self.array_count);
		out.write_u32(self.data_len);
		out.write_guid(self.file_guid);
		match self.magic {
			MAGIC_V4 => {
				out.write_u32(self.boxed_values_count);
				out.write_u32(self.boxed_values_offset);
			},
			_ => out.write_bytes(&[0u8; 16]),
		}
	}

	/// Start of the array data region.
	pub fn arrays_offset(&self) -> u64 {
		self.strings_offset as u64 + self.strings_len as u64 + self.data_len as u64
	}

	/// Start of the boxed-value data region, rebased to an absolute offset.
	pub fn boxed_values_offset(&self) -> u64 {
		self.strings_offset as u64 + self.strings_len as u64 + self.boxed_values_offset as u64
	}

	/// Start of the instance data region.
	pub fn instance_data_offset(&self) -> u64 {
		self.strings_offset as u64 + self.strings_len as u64
	}

	pub fn size_in_bytes(magic: u32) -> u64 {
		match magic {
			MAGIC_V4 => 64,
			_ => 72,
		}
	}
}
