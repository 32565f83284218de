use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use nohash_hasher::IntMap;
use uuid::Uuid;

use crate::raw::descriptors::{EbxImportReference, TypeEnum};

/// Handle to a runtime resource payload.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct ResourceRef(pub u64);

#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Sha1(pub [u8; 20]);

impl Debug for Sha1 {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str("Sha1(")?;
		for byte in self.0 {
			write!(f, "{byte:02x}")?;
		}
		f.write_str(")")
	}
}

#[repr(transparent)]
#[derive(Debug, Clone, Eq, PartialEq, Hash, Default)]
pub struct FileRef(pub Arc<str>);

/// A reference to a type, carried on the wire as a string: a type GUID when
/// it parses as one, otherwise a type name.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Default)]
pub enum TypeRefValue {
	#[default]
	Null,
	Guid(Uuid),
	Name(Arc<str>),
}

impl TypeRefValue {
	pub fn from_string(value: &str) -> Self {
		match value.is_empty() {
			true => Self::Null,
			false => match Uuid::parse_str(value) {
				Ok(guid) => Self::Guid(guid),
				Err(_) => Self::Name(Arc::from(value)),
			},
		}
	}
}

impl Display for TypeRefValue {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Null => Ok(()),
			Self::Guid(guid) => Display::fmt(guid, f),
			Self::Name(name) => f.write_str(name),
		}
	}
}

/// Per-asset object identity: an optional stable GUID plus the dense index of
/// the instance within its asset. Only exported instances carry a GUID.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct AssetClassGuid {
	pub guid: Option<Uuid>,
	pub index: u32,
}

impl AssetClassGuid {
	pub fn exported(guid: Uuid, index: u32) -> Self {
		Self { guid: Some(guid), index }
	}

	pub fn internal(index: u32) -> Self {
		Self { guid: None, index }
	}

	pub fn is_exported(&self) -> bool {
		self.guid.is_some()
	}
}

/// An in-band object reference.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub enum PointerRef {
	#[default]
	Null,
	/// Index into the owning asset's instance vector.
	Internal(usize),
	/// Target object in another asset.
	External(EbxImportReference),
}

/// A dynamically-typed payload whose runtime type travels with the value.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxedValue {
	pub kind: TypeEnum,
	/// Name hash of the payload's type for Enum/Struct/Array payloads, 0 for
	/// plain primitives.
	pub type_hash: u32,
	pub value: Value,
}

macro_rules! define_value_primitives {
	($($variant: ident($ty: ty)),* $(,)?) => { paste::paste! {
		$(
		impl From<$ty> for Value {
			fn from(value: $ty) -> Self {
				Value::$variant(value)
			}
		}
		)*

		impl Value {
			$(
			pub fn [<as_ $variant:lower>](&self) -> Option<$ty> {
				match self {
					Value::$variant(value) => Some(*value),
					_ => None,
				}
			}
			)*
		}
	}};
}

/// One decoded field. The tagged variants double as the normalization seam
/// between wire kinds and schema-declared property types.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	Boolean(bool),
	Int8(i8),
	UInt8(u8),
	Int16(i16),
	UInt16(u16),
	Int32(i32),
	UInt32(u32),
	Int64(i64),
	UInt64(u64),
	Float32(f32),
	Float64(f64),
	Guid(Uuid),
	Sha1(Sha1),
	/// Fixed 32-byte NUL-trimmed string.
	String(Arc<str>),
	CString(Arc<str>),
	FileRef(FileRef),
	TypeRef(TypeRefValue),
	Delegate(TypeRefValue),
	ResourceRef(ResourceRef),
	Enum(i32),
	Struct(Box<Instance>),
	Array(Vec<Value>),
	Pointer(PointerRef),
	Boxed(Option<Box<BoxedValue>>),
}

define_value_primitives! {
	Boolean(bool),
	Int8(i8),
	UInt8(u8),
	Int16(i16),
	UInt16(u16),
	Int32(i32),
	UInt32(u32),
	Int64(i64),
	UInt64(u64),
	Float32(f32),
	Float64(f64),
	Guid(Uuid),
	Sha1(Sha1),
	ResourceRef(ResourceRef),
}

impl Value {
	/// The blank slot value a freshly constructed instance carries for a
	/// property of the given kind. Struct slots are built by the schema,
	/// which knows the nested type.
	pub fn default_for(kind: TypeEnum) -> Option<Value> {
		Some(match kind {
			TypeEnum::Boolean => Value::Boolean(false),
			TypeEnum::Int8 => Value::Int8(0),
			TypeEnum::UInt8 => Value::UInt8(0),
			TypeEnum::Int16 => Value::Int16(0),
			TypeEnum::UInt16 => Value::UInt16(0),
			TypeEnum::Int32 => Value::Int32(0),
			TypeEnum::UInt32 => Value::UInt32(0),
			TypeEnum::Int64 => Value::Int64(0),
			TypeEnum::UInt64 => Value::UInt64(0),
			TypeEnum::Float32 => Value::Float32(0.0),
			TypeEnum::Float64 => Value::Float64(0.0),
			TypeEnum::Guid => Value::Guid(Uuid::nil()),
			TypeEnum::Sha1 => Value::Sha1(Sha1::default()),
			TypeEnum::String => Value::String(Arc::from("")),
			TypeEnum::CString => Value::CString(Arc::from("")),
			TypeEnum::FileRef => Value::FileRef(FileRef::default()),
			TypeEnum::TypeRef => Value::TypeRef(TypeRefValue::Null),
			TypeEnum::Delegate => Value::Delegate(TypeRefValue::Null),
			TypeEnum::ResourceRef => Value::ResourceRef(ResourceRef::default()),
			TypeEnum::Enum => Value::Enum(0),
			TypeEnum::Array => Value::Array(Vec::new()),
			TypeEnum::Class => Value::Pointer(PointerRef::Null),
			TypeEnum::BoxedValueRef => Value::Boxed(None),
			_ => return None,
		})
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::String(value) | Value::CString(value) => Some(value),
			_ => None,
		}
	}

	pub fn as_pointer(&self) -> Option<&PointerRef> {
		match self {
			Value::Pointer(pointer) => Some(pointer),
			_ => None,
		}
	}

	pub fn as_array(&self) -> Option<&[Value]> {
		match self {
			Value::Array(values) => Some(values),
			_ => None,
		}
	}

	pub fn as_struct(&self) -> Option<&Instance> {
		match self {
			Value::Struct(instance) => Some(instance),
			_ => None,
		}
	}
}

/// A schema-typed object: a concrete type hash plus one slot per declared
/// property (own and inherited), addressed by property name hash.
#[derive(Debug, Clone)]
pub struct Instance {
	type_hash: u32,
	guid: AssetClassGuid,
	slots: Vec<(u32, Value)>,
	by_hash: IntMap<u32, usize>,
}

impl Instance {
	pub fn new(type_hash: u32, slots: Vec<(u32, Value)>) -> Self {
		let by_hash = slots
			.iter()
			.enumerate()
			.map(|(index, (hash, _))| (*hash, index))
			.collect();
		Self {
			type_hash,
			guid: AssetClassGuid::default(),
			slots,
			by_hash,
		}
	}

	pub fn type_hash(&self) -> u32 {
		self.type_hash
	}

	pub fn guid(&self) -> AssetClassGuid {
		self.guid
	}

	pub fn set_guid(&mut self, guid: AssetClassGuid) {
		self.guid = guid;
	}

	pub fn get(&self, name_hash: u32) -> Option<&Value> {
		self.by_hash.get(&name_hash).map(|index| &self.slots[*index].1)
	}

	pub fn get_mut(&mut self, name_hash: u32) -> Option<&mut Value> {
		self.by_hash.get(&name_hash).map(|index| &mut self.slots[*index].1)
	}

	/// Stores `value` into the property slot with the given name hash.
	/// Returns false when no such property is declared, which callers treat
	/// as tolerated schema drift.
	pub fn set(&mut self, name_hash: u32, value: Value) -> bool {
		match self.by_hash.get(&name_hash) {
			Some(index) => {
				self.slots[*index].1 = value;
				true
			},
			None => false,
		}
	}

	pub fn fields(&self) -> impl Iterator<Item = (u32, &Value)> {
		self.slots.iter().map(|(hash, value)| (*hash, value))
	}
}

impl PartialEq for Instance {
	fn eq(&self, other: &Self) -> bool {
		self.type_hash == other.type_hash && self.guid == other.guid && self.slots == other.slots
	}
}
