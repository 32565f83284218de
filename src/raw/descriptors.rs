use std::io::Cursor;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::stream::ByteWriter;
use crate::utilities::FromByteStream;

macro_rules! define_type_enum {
	($($id: ident = $discriminant: literal),* $(,)?) => {
		/// The 5-bit field kind carried in descriptor flag words. The
		/// discriminants are the Partition-dialect wire values; gaps are
		/// kinds this codec rejects as unsupported.
		#[repr(u16)]
		#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
		pub enum TypeEnum {
			$($id = $discriminant),*
		}

		impl TypeEnum {
			pub fn from_repr(value: u16) -> Option<Self> {
				match value {
					$($discriminant => Some(Self::$id),)*
					_ => None,
				}
			}
		}
	};
}

define_type_enum! {
	Inherited = 0x00,
	DbObject = 0x01,
	Struct = 0x02,
	Class = 0x03,
	Array = 0x04,
	String = 0x06,
	CString = 0x07,
	Enum = 0x08,
	FileRef = 0x09,
	Boolean = 0x0A,
	Int8 = 0x0B,
	UInt8 = 0x0C,
	Int16 = 0x0D,
	UInt16 = 0x0E,
	Int32 = 0x0F,
	UInt32 = 0x10,
	UInt64 = 0x11,
	Int64 = 0x12,
	Float32 = 0x13,
	Float64 = 0x14,
	Guid = 0x15,
	Sha1 = 0x16,
	ResourceRef = 0x17,
	TypeRef = 0x19,
	BoxedValueRef = 0x1A,
	Delegate = 0x1C,
	Void = 0x1D,
}

impl TypeEnum {
	/// On-wire footprint of a field of this kind, `(size, alignment)`.
	/// Struct layouts come from their type descriptor instead; Inherited,
	/// DbObject and Void occupy no field slot of their own.
	pub fn fixed_layout(self) -> Option<(u32, u32)> {
		Some(match self {
			TypeEnum::Boolean | TypeEnum::Int8 | TypeEnum::UInt8 => (1, 1),
			TypeEnum::Int16 | TypeEnum::UInt16 => (2, 2),
			TypeEnum::Int32 | TypeEnum::UInt32 | TypeEnum::Float32 | TypeEnum::Enum => (4, 4),
			TypeEnum::Int64 | TypeEnum::UInt64 | TypeEnum::Float64 | TypeEnum::ResourceRef => (8, 8),
			TypeEnum::Guid => (16, 4),
			TypeEnum::Sha1 => (20, 4),
			TypeEnum::String => (32, 1),
			TypeEnum::CString | TypeEnum::Array | TypeEnum::Class => (4, 4),
			TypeEnum::FileRef | TypeEnum::TypeRef | TypeEnum::Delegate => (8, 4),
			TypeEnum::BoxedValueRef => (16, 4),
			TypeEnum::Inherited | TypeEnum::DbObject | TypeEnum::Struct | TypeEnum::Void => return None,
		})
	}
}

/// The low nibble of a descriptor flag word.
#[repr(u16)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum FieldCategory {
	None = 0,
	Pointer = 1,
	Struct = 2,
	Primitive = 3,
	Array = 4,
	Enum = 5,
	Function = 6,
	Interface = 7,
	Delegate = 8,
}

macro_rules! impl_flag_word {
	($ty: ident) => {
		impl $ty {
			pub fn new(kind: TypeEnum, category: FieldCategory) -> Self {
				Self(((kind as u16) << 4) | category as u16)
			}

			pub fn raw(self) -> u16 {
				self.0
			}

			pub fn kind(self) -> Result<TypeEnum> {
				TypeEnum::from_repr((self.0 >> 4) & 0x1F)
					.ok_or(Error::Unsupported("unknown type kind in descriptor flags"))
			}

			pub fn category(self) -> u16 {
				self.0 & 0xF
			}
		}

		impl From<u16> for $ty {
			fn from(value: u16) -> Self {
				Self(value)
			}
		}
	};
}

#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct FieldFlags(u16);

#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TypeFlags(u16);

impl_flag_word!(FieldFlags);
impl_flag_word!(TypeFlags);

impl FieldFlags {
	const RELATIVE_TYPE_REF: u16 = 0x8000;

	/// When set, the field's type ref is a signed delta from the parent
	/// descriptor's index rather than a direct table index.
	pub fn has_relative_type_ref(self) -> bool {
		self.0 & Self::RELATIVE_TYPE_REF != 0
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct EbxFieldDescriptor {
	pub name_hash: u32,
	pub flags: FieldFlags,
	pub type_ref: u16,
	pub data_offset: u32,
	pub second_offset: u32,
	pub name: Arc<str>,
}

impl FromByteStream for EbxFieldDescriptor {
	fn read(stream: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
		Ok(Self {
			name_hash: u32::read(stream)?,
			flags: FieldFlags(u16::read(stream)?),
			type_ref: u16::read(stream)?,
			data_offset: u32::read(stream)?,
			second_offset: u32::read(stream)?,
			name: Arc::from(""),
		})
	}
}

impl EbxFieldDescriptor {
	pub fn write(&self, out: &mut ByteWriter) {
		out.write_u32(self.name_hash);
		out.write_u16(self.flags.0);
		out.write_u16(self.type_ref);
		out.write_u32(self.data_offset);
		out.write_u32(self.second_offset);
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct EbxTypeDescriptor {
	pub name_hash: u32,
	pub field_index: i32,
	pub field_count: u8,
	pub alignment: u8,
	pub flags: TypeFlags,
	pub size: u16,
	pub second_size: u16,
	pub name: Arc<str>,
	/// Position of this row in the type table; not serialized, but relative
	/// type refs resolve against it.
	pub index: u16,
}

impl FromByteStream for EbxTypeDescriptor {
	fn read(stream: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
		Ok(Self {
			name_hash: u32::read(stream)?,
			field_index: i32::read(stream)?,
			field_count: u8::read(stream)?,
			alignment: u8::read(stream)?,
			flags: TypeFlags(u16::read(stream)?),
			size: u16::read(stream)?,
			second_size: u16::read(stream)?,
			name: Arc::from(""),
			index: 0,
		})
	}
}

impl EbxTypeDescriptor {
	pub fn write(&self, out: &mut ByteWriter) {
		out.write_u32(self.name_hash);
		out.write_i32(self.field_index);
		out.write_u8(self.field_count);
		out.write_u8(self.alignment);
		out.write_u16(self.flags.0);
		out.write_u16(self.size);
		out.write_u16(self.second_size);
	}

	pub fn alignment(&self) -> u64 {
		(self.alignment as u64).max(1)
	}

	/// Non-4-aligned types carry an 8-byte object header on the wire before
	/// their body; alignment 0 counts as 4 here.
	pub fn has_object_header(&self) -> bool {
		!matches!(self.alignment, 0 | 4)
	}
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct EbxInstanceEntry {
	pub type_ref: u16,
	pub count: u16,
}

impl FromByteStream for EbxInstanceEntry {
	fn read(stream: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
		Ok(Self {
			type_ref: u16::read(stream)?,
			count: u16::read(stream)?,
		})
	}
}

impl EbxInstanceEntry {
	pub fn write(&self, out: &mut ByteWriter) {
		out.write_u16(self.type_ref);
		out.write_u16(self.count);
	}
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct EbxArray {
	pub offset: u32,
	pub count: u32,
	pub type_ref: i32,
}

impl FromByteStream for EbxArray {
	fn read(stream: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
		Ok(Self {
			offset: u32::read(stream)?,
			count: u32::read(stream)?,
			type_ref: i32::read(stream)?,
		})
	}
}

impl EbxArray {
	pub fn write(&self, out: &mut ByteWriter) {
		out.write_u32(self.offset);
		out.write_u32(self.count);
		out.write_i32(self.type_ref);
	}
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct EbxBoxedValue {
	pub offset: u32,
	pub type_ref: u16,
	pub kind: u16,
}

impl EbxBoxedValue {
	/// Sentinel type ref for boxed primitives, which have no descriptor row.
	pub const NO_TYPE_REF: u16 = 0xFFFF;

	pub fn type_enum(&self) -> Result<TypeEnum> {
		TypeEnum::from_repr(self.kind)
			.ok_or(Error::Unsupported("unknown type kind in boxed value row"))
	}

	pub fn write(&self, out: &mut ByteWriter) {
		out.write_u32(self.offset);
		out.write_u16(self.type_ref);
		out.write_u16(self.kind);
	}
}

impl FromByteStream for EbxBoxedValue {
	fn read(stream: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
		Ok(Self {
			offset: u32::read(stream)?,
			type_ref: u16::read(stream)?,
			kind: u16::read(stream)?,
		})
	}
}

/// Target of an external pointer: an exported object in another asset.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct EbxImportReference {
	pub file_guid: Uuid,
	pub class_guid: Uuid,
}

impl FromByteStream for EbxImportReference {
	fn read(stream: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
		Ok(Self {
			file_guid: Uuid::from_bytes_le(<[u8; 16]>::read(stream)?),
			class_guid: Uuid::from_bytes_le(<[u8; 16]>::read(stream)?),
		})
	}
}

impl EbxImportReference {
	pub fn write(&self, out: &mut ByteWriter) {
		out.write_guid(self.file_guid);
		out.write_guid(self.class_guid);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::stream::ByteReader;

	#[test]
	fn type_enum_discriminants() {
		assert_eq!(TypeEnum::from_repr(0x00), Some(TypeEnum::Inherited));
		assert_eq!(TypeEnum::from_repr(0x03), Some(TypeEnum::Class));
		assert_eq!(TypeEnum::from_repr(0x11), Some(TypeEnum::UInt64));
		assert_eq!(TypeEnum::from_repr(0x12), Some(TypeEnum::Int64));
		assert_eq!(TypeEnum::from_repr(0x05), None);
		assert_eq!(TypeEnum::from_repr(0x1B), None);
	}

	#[test]
	fn flag_words_pack_kind_and_category() {
		let flags = FieldFlags::new(TypeEnum::CString, FieldCategory::Primitive);
		assert_eq!(flags.kind().unwrap(), TypeEnum::CString);
		assert_eq!(flags.category(), FieldCategory::Primitive as u16);
		assert!(!flags.has_relative_type_ref());

		let relative = FieldFlags::from(flags.raw() | 0x8000);
		assert!(relative.has_relative_type_ref());
		assert_eq!(relative.kind().unwrap(), TypeEnum::CString);
	}

	#[test]
	fn field_descriptor_round_trip() {
		let row = EbxFieldDescriptor {
			name_hash: 0xDEADBEEF,
			flags: FieldFlags::new(TypeEnum::UInt32, FieldCategory::Primitive),
			type_ref: 3,
			data_offset: 8,
			second_offset: 8,
			name: Arc::from(""),
		};
		let mut out = ByteWriter::new();
		row.write(&mut out);
		let bytes = out.into_bytes();
		assert_eq!(bytes.len(), 16);
		let mut reader = ByteReader::new(&bytes);
		assert_eq!(reader.read::<EbxFieldDescriptor>().unwrap(), row);
	}

	#[test]
	fn type_descriptor_round_trip() {
		let row = EbxTypeDescriptor {
			name_hash: 1,
			field_index: 2,
			field_count: 3,
			alignment: 8,
			flags: TypeFlags::new(TypeEnum::Class, FieldCategory::Pointer),
			size: 24,
			second_size: 0,
			name: Arc::from(""),
			index: 0,
		};
		let mut out = ByteWriter::new();
		row.write(&mut out);
		let bytes = out.into_bytes();
		assert_eq!(bytes.len(), 16);
		let mut reader = ByteReader::new(&bytes);
		assert_eq!(reader.read::<EbxTypeDescriptor>().unwrap(), row);
		assert!(row.has_object_header());
	}

	#[test]
	fn object_header_rule_treats_zero_as_four() {
		let mut row = EbxTypeDescriptor {
			name_hash: 0,
			field_index: 0,
			field_count: 0,
			alignment: 0,
			flags: TypeFlags::new(TypeEnum::Class, FieldCategory::Pointer),
			size: 0,
			second_size: 0,
			name: Arc::from(""),
			index: 0,
		};
		assert!(!row.has_object_header());
		assert_eq!(row.alignment(), 1);
		row.alignment = 4;
		assert!(!row.has_object_header());
		row.alignment = 16;
		assert!(row.has_object_header());
	}
}
