use std::sync::Arc;

use nohash_hasher::IntMap;
use tracing::debug;

use crate::asset::{EbxAsset, EbxReadTarget};
use crate::error::{Error, Result};
use crate::raw::descriptors::{
	EbxArray, EbxBoxedValue, EbxFieldDescriptor, EbxImportReference, EbxInstanceEntry,
	EbxTypeDescriptor, TypeEnum,
};
use crate::raw::header::EbxHeader;
use crate::raw::resolver::TypeResolver;
use crate::schema::SchemaResolver;
use crate::stream::ByteReader;
use crate::utilities::hash_name;
use crate::value::{
	AssetClassGuid, BoxedValue, FileRef, Instance, PointerRef, ResourceRef, Sha1, TypeRefValue,
	Value,
};

/// Parser for the Partition dialect. Construction consumes the header and
/// descriptor tables; `read_asset` decodes the instance graph.
pub struct PartitionReader<'l> {
	stream: ByteReader<'l>,
	schema: &'l dyn SchemaResolver,
	header: EbxHeader,
	resolver: TypeResolver,
	imports: Vec<EbxImportReference>,
	instance_entries: Vec<EbxInstanceEntry>,
	arrays: Vec<EbxArray>,
	boxed_values: Vec<EbxBoxedValue>,
	ref_counts: Vec<u32>,
	arrays_offset: u64,
	boxed_values_offset: u64,
}

impl<'l> PartitionReader<'l> {
	pub fn new(data: &'l [u8], schema: &'l dyn SchemaResolver) -> Result<Self> {
		let mut stream = ByteReader::new(data);
		let header = EbxHeader::read(&mut stream)?;

		let mut imports = Vec::with_capacity(header.import_count as usize);
		for _ in 0..header.import_count {
			imports.push(stream.read::<EbxImportReference>()?);
		}

		// The type-name region is a dense run of NUL-terminated strings;
		// descriptors reference them by name hash only.
		let names_end = stream.tell() + header.type_names_len as u64;
		let mut names = IntMap::<u32, Arc<str>>::default();
		while stream.tell() < names_end {
			let name = stream.read_null_string(names_end)?;
			names.insert(hash_name(&name), name);
		}
		stream.seek(names_end);

		let named = |hash: u32, names: &IntMap<u32, Arc<str>>| -> Arc<str> {
			names.get(&hash).cloned().unwrap_or_else(|| Arc::from(""))
		};

		let mut fields = Vec::with_capacity(header.field_descriptor_count as usize);
		for _ in 0..header.field_descriptor_count {
			let mut field = stream.read::<EbxFieldDescriptor>()?;
			field.name = named(field.name_hash, &names);
			fields.push(field);
		}

		let mut types = Vec::with_capacity(header.type_descriptor_count as usize);
		for _ in 0..header.type_descriptor_count {
			let mut ty = stream.read::<EbxTypeDescriptor>()?;
			ty.name = named(ty.name_hash, &names);
			types.push(ty);
		}
		let resolver = TypeResolver::new(types, fields)?;

		let mut instance_entries = Vec::with_capacity(header.instance_count as usize);
		for _ in 0..header.instance_count {
			instance_entries.push(stream.read::<EbxInstanceEntry>()?);
		}

		stream.pad(16);
		let mut arrays = Vec::with_capacity(header.array_count as usize);
		for _ in 0..header.array_count {
			arrays.push(stream.read::<EbxArray>()?);
		}

		stream.pad(16);
		let mut boxed_values = Vec::with_capacity(header.boxed_values_count as usize);
		for _ in 0..header.boxed_values_count {
			boxed_values.push(stream.read::<EbxBoxedValue>()?);
		}

		Ok(Self {
			stream,
			schema,
			resolver,
			imports,
			instance_entries,
			arrays,
			boxed_values,
			ref_counts: Vec::new(),
			arrays_offset: header.arrays_offset(),
			boxed_values_offset: header.boxed_values_offset(),
			header,
		})
	}

	pub fn header(&self) -> &EbxHeader {
		&self.header
	}

	pub fn resolver(&self) -> &TypeResolver {
		&self.resolver
	}

	pub fn imports(&self) -> &[EbxImportReference] {
		&self.imports
	}

	pub fn arrays(&self) -> &[EbxArray] {
		&self.arrays
	}

	pub fn boxed_values(&self) -> &[EbxBoxedValue] {
		&self.boxed_values
	}

	/// Decodes the instance graph into a fresh read target.
	#[tracing::instrument(skip_all)]
	pub fn read_asset<A: EbxReadTarget>(&mut self) -> Result<A> {
		let mut objects = Vec::new();
		for entry in &self.instance_entries {
			let ty = self.resolver.resolve_type(entry.type_ref)?;
			for _ in 0..entry.count {
				let Some(instance) = self.schema.create_instance(ty.name_hash) else {
					return Err(Error::SchemaMismatch(ty.name_hash));
				};
				objects.push(instance);
			}
		}
		self.ref_counts = vec![0; objects.len()];

		self.stream.seek(self.header.instance_data_offset());
		let entries = self.instance_entries.clone();
		let mut index = 0usize;
		for (entry_index, entry) in entries.iter().enumerate() {
			let ty = self.resolver.resolve_type(entry.type_ref)?;
			let exported = entry_index < self.header.exported_count as usize;
			for _ in 0..entry.count {
				self.read_instance(&ty, &mut objects[index], index, exported)?;
				if self.stream.tell() > self.arrays_offset {
					return Err(Error::BadLayout("instance data overruns its region"));
				}
				index += 1;
			}
		}

		let mut target = A::default();
		target.populate(
			self.header.file_guid,
			objects,
			std::mem::take(&mut self.ref_counts),
			self.imports.clone(),
		);
		target.on_load_complete();
		Ok(target)
	}

	pub fn read_objects(&mut self) -> Result<Vec<Instance>> {
		Ok(self.read_asset::<EbxAsset>()?.into_objects())
	}

	/// The asset's primary instance.
	pub fn read_object(&mut self) -> Result<Instance> {
		let mut objects = self.read_objects()?;
		match objects.is_empty() {
			true => Err(Error::BadLayout("asset has no instances")),
			false => Ok(objects.remove(0)),
		}
	}

	fn read_instance(
		&mut self,
		ty: &EbxTypeDescriptor,
		obj: &mut Instance,
		index: usize,
		exported: bool,
	) -> Result<()> {
		self.stream.pad(ty.alignment());
		let guid = match exported {
			true => Some(self.stream.read_guid()?),
			false => None,
		};
		if ty.has_object_header() {
			self.stream.seek(self.stream.tell() + 8);
		}
		obj.set_guid(AssetClassGuid { guid, index: index as u32 });
		// Field offsets are measured from the wire object header, eight
		// bytes before the body.
		let start = self.stream.tell() - 8;
		self.read_class(ty, obj, start)
	}

	fn read_class(&mut self, ty: &EbxTypeDescriptor, obj: &mut Instance, start: u64) -> Result<()> {
		for j in 0..ty.field_count as usize {
			let field = self.resolver.field_of(ty, j)?;
			self.stream.seek(start + field.data_offset as u64);
			match field.flags.kind()? {
				TypeEnum::Inherited => {
					let base = self.resolver.resolve_field_type(ty, &field)?;
					self.read_class(&base, obj, start)?;
				},
				TypeEnum::Array => {
					let values = self.read_array(ty, &field)?;
					self.bind(obj, &field, Value::Array(values));
				},
				kind => {
					let value = self.read_field(ty, kind, &field)?;
					self.bind(obj, &field, value);
				},
			}
		}
		self.stream.pad(ty.alignment());
		// Inherited-field recursion can leave the cursor below the layout's
		// high-water mark; the body always spans the declared size.
		if self.stream.tell() < start + ty.size as u64 {
			self.stream.seek(start + ty.size as u64);
		}
		Ok(())
	}

	/// Property binding tolerates schema drift: a wire field the schema does
	/// not declare is decoded and dropped.
	fn bind(&self, obj: &mut Instance, field: &EbxFieldDescriptor, value: Value) {
		if !obj.set(field.name_hash, value) {
			debug!(
				field = &*field.name,
				name_hash = field.name_hash,
				"skipping field with no schema property"
			);
		}
	}

	fn read_array(&mut self, parent: &EbxTypeDescriptor, field: &EbxFieldDescriptor) -> Result<Vec<Value>> {
		let index = self.stream.read::<i32>()?;
		let resume = self.stream.tell();
		let Some(row) = usize::try_from(index).ok().and_then(|i| self.arrays.get(i).copied()) else {
			return Err(Error::BadLayout("array table index out of range"));
		};
		let array_type = self.resolver.resolve_field_type(parent, field)?;
		let values = self.read_array_elements(&array_type, &row)?;
		self.stream.seek(resume);
		Ok(values)
	}

	fn read_array_elements(&mut self, array_type: &EbxTypeDescriptor, row: &EbxArray) -> Result<Vec<Value>> {
		let element = self.resolver.field_of(array_type, 0)?;
		let kind = element.flags.kind()?;
		self.stream.seek(self.arrays_offset + row.offset as u64);
		let mut values = Vec::with_capacity(row.count as usize);
		for _ in 0..row.count {
			values.push(self.read_field(array_type, kind, &element)?);
		}
		Ok(values)
	}

	fn read_field(
		&mut self,
		parent: &EbxTypeDescriptor,
		kind: TypeEnum,
		field: &EbxFieldDescriptor,
	) -> Result<Value> {
		match kind {
			TypeEnum::Struct => {
				let inner = self.resolver.resolve_field_type(parent, field)?;
				self.stream.pad(inner.alignment());
				let Some(mut instance) = self.schema.create_instance(inner.name_hash) else {
					return Err(Error::SchemaMismatch(inner.name_hash));
				};
				// A struct body carries no object header; offsets are
				// measured from the value itself.
				let start = self.stream.tell();
				self.read_class(&inner, &mut instance, start)?;
				Ok(Value::Struct(Box::new(instance)))
			},
			TypeEnum::BoxedValueRef => self.read_boxed(),
			TypeEnum::Inherited | TypeEnum::Array => {
				Err(Error::BadLayout("composite kind in scalar field position"))
			},
			kind => self.read_basic(kind),
		}
	}

	fn read_basic(&mut self, kind: TypeEnum) -> Result<Value> {
		Ok(match kind {
			TypeEnum::Boolean => Value::Boolean(self.stream.read::<u8>()? != 0),
			TypeEnum::Int8 => Value::Int8(self.stream.read()?),
			TypeEnum::UInt8 => Value::UInt8(self.stream.read()?),
			TypeEnum::Int16 => Value::Int16(self.stream.read()?),
			TypeEnum::UInt16 => Value::UInt16(self.stream.read()?),
			TypeEnum::Int32 => Value::Int32(self.stream.read()?),
			TypeEnum::UInt32 => Value::UInt32(self.stream.read()?),
			TypeEnum::Int64 => Value::Int64(self.stream.read()?),
			TypeEnum::UInt64 => Value::UInt64(self.stream.read()?),
			TypeEnum::Float32 => Value::Float32(self.stream.read()?),
			TypeEnum::Float64 => Value::Float64(self.stream.read()?),
			TypeEnum::Guid => Value::Guid(self.stream.read_guid()?),
			TypeEnum::Sha1 => Value::Sha1(Sha1(self.stream.read()?)),
			TypeEnum::String => Value::String(self.stream.read_fixed_string(32)?),
			TypeEnum::CString => {
				let offset = self.stream.read::<u32>()?;
				Value::CString(self.read_pool_string(offset)?)
			},
			TypeEnum::FileRef => {
				let offset = self.stream.read::<u32>()?;
				let _padding = self.stream.read::<u32>()?;
				Value::FileRef(FileRef(self.read_pool_string(offset)?))
			},
			TypeEnum::TypeRef => {
				let offset = self.stream.read::<u32>()?;
				let _padding = self.stream.read::<u32>()?;
				Value::TypeRef(TypeRefValue::from_string(&self.read_pool_string(offset)?))
			},
			TypeEnum::Delegate => {
				let offset = self.stream.read::<u32>()?;
				let _padding = self.stream.read::<u32>()?;
				Value::Delegate(TypeRefValue::from_string(&self.read_pool_string(offset)?))
			},
			TypeEnum::ResourceRef => Value::ResourceRef(ResourceRef(self.stream.read()?)),
			TypeEnum::Enum => Value::Enum(self.stream.read()?),
			TypeEnum::Class => Value::Pointer(self.read_pointer()?),
			TypeEnum::DbObject => return Err(Error::Unsupported("DbObject fields")),
			_ => return Err(Error::Unsupported("field kind has no scalar encoding")),
		})
	}

	/// Resolves a string-pool offset without disturbing the field cursor.
	fn read_pool_string(&mut self, offset: u32) -> Result<Arc<str>> {
		if offset == u32::MAX {
			return Ok(Arc::from(""));
		}
		let resume = self.stream.tell();
		self.stream.seek(self.header.strings_offset as u64 + offset as u64);
		let value = self.stream.read_null_string(self.header.instance_data_offset())?;
		self.stream.seek(resume);
		Ok(value)
	}

	fn read_pointer(&mut self) -> Result<PointerRef> {
		let raw = self.stream.read::<u32>()?;
		if raw == 0 {
			return Ok(PointerRef::Null);
		}
		if raw & 0x8000_0000 != 0 {
			let index = (raw & 0x7FFF_FFFF) as usize;
			let Some(import) = self.imports.get(index) else {
				return Err(Error::BadLayout("external pointer exceeds import table"));
			};
			return Ok(PointerRef::External(*import));
		}
		let index = raw as usize - 1;
		let Some(count) = self.ref_counts.get_mut(index) else {
			return Err(Error::BadLayout("internal pointer exceeds instance table"));
		};
		*count += 1;
		Ok(PointerRef::Internal(index))
	}

	fn read_boxed(&mut self) -> Result<Value> {
		let index = self.stream.read::<i32>()?;
		self.stream.seek(self.stream.tell() + 12);
		if index == -1 {
			return Ok(Value::Boxed(None));
		}
		let Some(row) = usize::try_from(index).ok().and_then(|i| self.boxed_values.get(i).copied())
		else {
			return Err(Error::BadLayout("boxed value index out of range"));
		};
		let kind = row.type_enum()?;

		let resume = self.stream.tell();
		self.stream.seek(self.boxed_values_offset + row.offset as u64);
		let (type_hash, value) = match kind {
			TypeEnum::Array => {
				let array_type = self.resolver.resolve_type(row.type_ref)?;
				let array_index = self.stream.read::<i32>()?;
				let Some(array_row) =
					usize::try_from(array_index).ok().and_then(|i| self.arrays.get(i).copied())
				else {
					return Err(Error::BadLayout("boxed array index out of range"));
				};
				let values = self.read_array_elements(&array_type, &array_row)?;
				(array_type.name_hash, Value::Array(values))
			},
			TypeEnum::Enum => {
				let ty = self.resolver.resolve_type(row.type_ref)?;
				(ty.name_hash, Value::Enum(self.stream.read()?))
			},
			TypeEnum::Struct => {
				let ty = self.resolver.resolve_type(row.type_ref)?;
				self.stream.pad(ty.alignment());
				let Some(mut instance) = self.schema.create_instance(ty.name_hash) else {
					return Err(Error::SchemaMismatch(ty.name_hash));
				};
				let start = self.stream.tell();
				self.read_class(&ty, &mut instance, start)?;
				(ty.name_hash, Value::Struct(Box::new(instance)))
			},
			kind => (0, self.read_basic(kind)?),
		};
		self.stream.seek(resume);
		Ok(Value::Boxed(Some(Box::new(BoxedValue { kind, type_hash, value }))))
	}
}
