use std::sync::Arc;

use derivative::Derivative;
use fxhash::{FxHashMap, FxHashSet};
use nohash_hasher::IntMap;
use tracing::debug;

use crate::asset::EbxAsset;
use crate::error::{Error, Result};
use crate::raw::descriptors::{
	EbxArray, EbxBoxedValue, EbxFieldDescriptor, EbxImportReference, EbxInstanceEntry,
	EbxTypeDescriptor, TypeEnum,
};
use crate::raw::header::{EbxHeader, MAGIC_V2, MAGIC_V4};
use crate::schema::{SchemaField, SchemaResolver, SchemaType};
use crate::stream::ByteWriter;
use crate::utilities::round_to_multiple;
use crate::value::{BoxedValue, Instance, PointerRef, TypeRefValue, Value};

/// Interned string pool with eagerly maintained offsets.
#[derive(Debug, Default)]
struct StringPool {
	entries: Vec<Arc<str>>,
	offsets: FxHashMap<Arc<str>, u32>,
	len: u32,
}

impl StringPool {
	/// Returns the pool offset of `value`, appending it on first use.
	fn add(&mut self, value: &str) -> u32 {
		if let Some(offset) = self.offsets.get(value) {
			return *offset;
		}
		let offset = self.len;
		let entry: Arc<str> = Arc::from(value);
		self.offsets.insert(entry.clone(), offset);
		self.entries.push(entry);
		self.len += value.len() as u32 + 1;
		offset
	}

	fn len(&self) -> u32 {
		self.len
	}

	fn write(&self, out: &mut ByteWriter) {
		for entry in &self.entries {
			out.write_null_string(entry);
		}
	}
}

/// Emitter for the Partition dialect. One writer serializes one asset; the
/// side buffers it accumulates are dropped with it.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct PartitionWriter<'l> {
	#[derivative(Debug = "ignore")]
	schema: &'l dyn SchemaResolver,
	magic: u32,
	object_count: usize,
	collected: Vec<u32>,
	collected_set: FxHashSet<u32>,
	imports: Vec<EbxImportReference>,
	import_index: FxHashMap<EbxImportReference, usize>,
	type_table: Vec<EbxTypeDescriptor>,
	field_table: Vec<EbxFieldDescriptor>,
	type_index: IntMap<u32, u16>,
	type_names: StringPool,
	strings: StringPool,
	arrays: Vec<EbxArray>,
	#[derivative(Debug = "ignore")]
	array_data: ByteWriter,
	boxed_rows: Vec<EbxBoxedValue>,
	#[derivative(Debug = "ignore")]
	boxed_data: ByteWriter,
}

impl<'l> PartitionWriter<'l> {
	pub fn new(magic: u32, schema: &'l dyn SchemaResolver) -> Result<Self> {
		if magic != MAGIC_V2 && magic != MAGIC_V4 {
			return Err(Error::BadMagic(magic));
		}
		Ok(Self {
			schema,
			magic,
			object_count: 0,
			collected: Vec::new(),
			collected_set: FxHashSet::default(),
			imports: Vec::new(),
			import_index: FxHashMap::default(),
			type_table: Vec::new(),
			field_table: Vec::new(),
			type_index: IntMap::default(),
			type_names: StringPool::default(),
			strings: StringPool::default(),
			arrays: Vec::new(),
			array_data: ByteWriter::new(),
			boxed_rows: Vec::new(),
			boxed_data: ByteWriter::new(),
		})
	}

	/// Serializes the asset's partition GUID and object list into a complete
	/// Partition payload.
	#[tracing::instrument(skip_all)]
	pub fn write_asset(&mut self, asset: &EbxAsset) -> Result<Vec<u8>> {
		self.object_count = asset.objects().len();
		self.validate(asset)?;
		self.collect(asset)?;
		self.build_tables()?;

		let entries = self.instance_entries(asset)?;
		let exported_entries = entries.iter().filter(|(_, exported)| *exported).count();
		let data = self.write_instances(asset)?;
		self.assemble(asset, &entries, exported_entries, data)
	}

	/// Schema lookup detached from the writer's own borrow; the oracle
	/// outlives the writer.
	fn schema_type(&self, type_hash: u32) -> Result<&'l SchemaType> {
		let schema = self.schema;
		schema.type_by_hash(type_hash).ok_or(Error::SchemaMismatch(type_hash))
	}

	/// Exported instances must come first (the instance table encodes the
	/// split as a count of leading entries) and carry unique GUIDs.
	fn validate(&self, asset: &EbxAsset) -> Result<()> {
		let mut seen_non_exported = false;
		let mut guids = FxHashSet::default();
		for obj in asset.objects() {
			match obj.guid().guid {
				Some(guid) => {
					if seen_non_exported {
						return Err(Error::Graph(
							"exported instances must precede non-exported ones".to_string(),
						));
					}
					if !guids.insert(guid) {
						return Err(Error::Graph(format!("duplicate exported instance GUID {guid}")));
					}
				},
				None => seen_non_exported = true,
			}
		}
		Ok(())
	}

	// ---- pre-pass -------------------------------------------------------

	fn collect(&mut self, asset: &EbxAsset) -> Result<()> {
		let mut visited = vec![false; asset.objects().len()];
		for index in 0..asset.objects().len() {
			self.visit_object(asset, index, &mut visited)?;
		}
		Ok(())
	}

	fn visit_object(&mut self, asset: &EbxAsset, index: usize, visited: &mut Vec<bool>) -> Result<()> {
		if visited[index] {
			return Ok(());
		}
		visited[index] = true;
		let obj = &asset.objects()[index];
		self.add_type_chain(obj.type_hash())?;
		for field in self.chain_fields(obj.type_hash())? {
			self.visit_property(asset, obj, &field, visited)?;
		}
		Ok(())
	}

	fn visit_property(
		&mut self,
		asset: &EbxAsset,
		obj: &Instance,
		field: &SchemaField,
		visited: &mut Vec<bool>,
	) -> Result<()> {
		let Some(value) = obj.get(field.name_hash) else {
			return Err(Error::Graph(format!("instance lacks declared property {:?}", field.name)));
		};
		self.visit_value(asset, field.kind, value, visited)
	}

	fn visit_value(
		&mut self,
		asset: &EbxAsset,
		kind: TypeEnum,
		value: &Value,
		visited: &mut Vec<bool>,
	) -> Result<()> {
		match (kind, value) {
			(TypeEnum::Class, Value::Pointer(pointer)) => match pointer {
				PointerRef::Null => Ok(()),
				PointerRef::Internal(target) => {
					if *target >= asset.objects().len() {
						return Err(Error::Graph(format!("internal pointer to missing instance {target}")));
					}
					self.visit_object(asset, *target, visited)
				},
				PointerRef::External(import) => {
					if !self.import_index.contains_key(import) {
						self.import_index.insert(*import, self.imports.len());
						self.imports.push(*import);
					}
					Ok(())
				},
			},
			(TypeEnum::Struct, Value::Struct(instance)) => {
				self.add_type_chain(instance.type_hash())?;
				for field in self.chain_fields(instance.type_hash())? {
					self.visit_property(asset, instance, &field, visited)?;
				}
				Ok(())
			},
			(TypeEnum::Array, Value::Array(values)) => {
				for value in values {
					// Element kinds that can reach other objects are the
					// pointer and struct ones; the element value itself
					// discriminates.
					match value {
						Value::Pointer(_) => self.visit_value(asset, TypeEnum::Class, value, visited)?,
						Value::Struct(_) => self.visit_value(asset, TypeEnum::Struct, value, visited)?,
						_ => {},
					}
				}
				Ok(())
			},
			(TypeEnum::BoxedValueRef, Value::Boxed(boxed)) => match boxed {
				Some(boxed) => {
					// The payload's runtime type travels in the boxed row,
					// so it needs a descriptor even when nothing else in the
					// graph names it.
					if boxed.type_hash != 0 {
						self.add_type_chain(boxed.type_hash)?;
					}
					self.visit_value(asset, boxed.kind, &boxed.value, visited)
				},
				None => Ok(()),
			},
			_ => Ok(()),
		}
	}

	/// Records a concrete type and its bases, ascending while the base stays
	/// within the schema's root namespace.
	fn add_type_chain(&mut self, type_hash: u32) -> Result<()> {
		let mut current = type_hash;
		loop {
			let ty = self.schema_type(current)?;
			if self.collected_set.insert(current) {
				self.collected.push(current);
			}
			match ty.super_hash {
				Some(base) => {
					let base_ty = self.schema_type(base)?;
					if !base_ty.namespace.starts_with(self.schema.root_namespace()) {
						return Ok(());
					}
					current = base;
				},
				None => return Ok(()),
			}
		}
	}

	/// Persisted properties of a type, base-most first.
	fn chain_fields(&self, type_hash: u32) -> Result<Vec<SchemaField>> {
		let mut chain = Vec::new();
		let mut current = Some(type_hash);
		while let Some(hash) = current {
			let ty = self.schema_type(hash)?;
			chain.push(ty);
			current = ty.super_hash;
		}
		let mut fields = Vec::new();
		for ty in chain.iter().rev() {
			for field in &ty.fields {
				if !field.is_synthetic() && !field.is_transient() {
					fields.push(field.clone());
				}
			}
		}
		Ok(fields)
	}

	// ---- descriptor tables ----------------------------------------------

	/// Expands the collected set with field-referenced enum and array
	/// pseudo-types, assigns table indices, and synthesizes descriptor rows.
	fn build_tables(&mut self) -> Result<()> {
		let mut ordered = Vec::new();
		let mut seen = FxHashSet::default();
		let mut queue: Vec<u32> = self.collected.clone();
		let mut cursor = 0usize;
		while cursor < queue.len() {
			let hash = queue[cursor];
			cursor += 1;
			if !seen.insert(hash) {
				continue;
			}
			ordered.push(hash);
			let ty = self.schema_type(hash)?;
			for field in &ty.fields {
				match field.kind {
					TypeEnum::Enum | TypeEnum::Array | TypeEnum::Struct if field.type_ref_hash != 0 => {
						queue.push(field.type_ref_hash);
					},
					_ => {},
				}
			}
		}

		if ordered.len() > u16::MAX as usize {
			return Err(Error::Graph("type table exceeds 65535 rows".to_string()));
		}
		for (index, hash) in ordered.iter().enumerate() {
			self.type_index.insert(*hash, index as u16);
		}

		for hash in &ordered {
			let ty = self.schema_type(*hash)?;
			self.type_names.add(&ty.name);

			let field_index = self.field_table.len() as i32;
			let mut field_count = 0u8;
			for field in &ty.fields {
				if field.is_transient() {
					continue;
				}
				let type_ref = self.field_type_ref(field)?;
				self.type_names.add(&field.name);
				self.field_table.push(EbxFieldDescriptor {
					name_hash: field.name_hash,
					flags: field.wire_flags(),
					type_ref,
					data_offset: field.data_offset,
					second_offset: field.data_offset,
					name: field.name.clone(),
				});
				field_count = field_count
					.checked_add(1)
					.ok_or_else(|| Error::Graph(format!("type {:?} has too many fields", ty.name)))?;
			}

			self.type_table.push(EbxTypeDescriptor {
				name_hash: ty.name_hash,
				field_index,
				field_count,
				alignment: ty.alignment,
				flags: ty.wire_flags(),
				size: ty.size,
				second_size: 0,
				name: ty.name.clone(),
				index: 0,
			});
		}
		Ok(())
	}

	/// Table index of a type already synthesized into the descriptor tables,
	/// or `-1` when absent.
	fn find_existing_type(&self, type_hash: u32) -> i32 {
		match self.type_index.get(&type_hash) {
			Some(index) => *index as i32,
			None => -1,
		}
	}

	fn required_type_ref(&self, type_hash: u32) -> Result<u16> {
		match self.find_existing_type(type_hash) {
			-1 => Err(Error::SchemaMismatch(type_hash)),
			index => Ok(index as u16),
		}
	}

	fn field_type_ref(&self, field: &SchemaField) -> Result<u16> {
		match field.kind {
			TypeEnum::Inherited | TypeEnum::Struct | TypeEnum::Enum | TypeEnum::Array => {
				self.required_type_ref(field.type_ref_hash)
			},
			// Declared pointee classes are only materialized when the graph
			// actually instantiates them.
			TypeEnum::Class => match self.find_existing_type(field.type_ref_hash) {
				-1 => Ok(0),
				index => Ok(index as u16),
			},
			_ => Ok(0),
		}
	}

	// ---- instance emission ----------------------------------------------

	/// Run-length groups consecutive instances of one type; a run never
	/// mixes exported and non-exported objects.
	fn instance_entries(&self, asset: &EbxAsset) -> Result<Vec<(EbxInstanceEntry, bool)>> {
		let mut entries: Vec<(EbxInstanceEntry, bool)> = Vec::new();
		for obj in asset.objects() {
			let type_ref = self.required_type_ref(obj.type_hash())?;
			let exported = obj.guid().is_exported();
			match entries.last_mut() {
				Some((entry, entry_exported))
					if entry.type_ref == type_ref
						&& *entry_exported == exported && entry.count < u16::MAX =>
				{
					entry.count += 1;
				},
				_ => entries.push((EbxInstanceEntry { type_ref, count: 1 }, exported)),
			}
		}
		if entries.len() > u16::MAX as usize {
			return Err(Error::Graph("instance table exceeds 65535 entries".to_string()));
		}
		Ok(entries)
	}

	fn write_instances(&mut self, asset: &EbxAsset) -> Result<ByteWriter> {
		let mut data = ByteWriter::new();
		for obj in asset.objects() {
			let ty = self.schema_type(obj.type_hash())?;
			data.pad(ty.alignment.max(1) as u64);
			if let Some(guid) = obj.guid().guid {
				data.write_guid(guid);
			}
			if !matches!(ty.alignment, 0 | 4) {
				data.write_bytes(&[0u8; 8]);
			}
			// Field offsets are measured from the wire object header, eight
			// bytes before the body; for the first non-exported 4-aligned
			// instance that start is virtually negative.
			let start = data.tell() as i64 - 8;
			self.write_class(ty, obj, start, &mut data)?;
		}
		data.pad(16);
		Ok(data)
	}

	fn write_class(
		&mut self,
		ty: &SchemaType,
		obj: &Instance,
		start: i64,
		data: &mut ByteWriter,
	) -> Result<()> {
		for field in &ty.fields {
			if field.is_transient() {
				continue;
			}
			if field.is_synthetic() {
				let base = self.schema_type(field.type_ref_hash)?;
				self.write_class(base, obj, start, data)?;
				continue;
			}
			data.seek((start + field.data_offset as i64) as u64);
			let Some(value) = obj.get(field.name_hash) else {
				return Err(Error::Graph(format!("instance lacks declared property {:?}", field.name)));
			};
			self.write_field(field, value, data)?;
		}
		data.pad(ty.alignment.max(1) as u64);
		// Mirror of the reader: the body always spans the declared size.
		let end = (start + ty.size as i64) as u64;
		if data.tell() < end {
			data.seek(end);
		}
		Ok(())
	}

	fn write_field(&mut self, field: &SchemaField, value: &Value, data: &mut ByteWriter) -> Result<()> {
		match field.kind {
			TypeEnum::Array => {
				let Value::Array(values) = value else {
					return Err(self.mismatch(field, value));
				};
				let row = self.write_array(field.type_ref_hash, values)?;
				data.write_i32(row);
				Ok(())
			},
			TypeEnum::Struct => {
				let Value::Struct(instance) = value else {
					return Err(self.mismatch(field, value));
				};
				let inner = self.schema_type(field.type_ref_hash)?;
				data.pad(inner.alignment.max(1) as u64);
				let start = data.tell() as i64;
				self.write_class(inner, instance, start, data)
			},
			TypeEnum::BoxedValueRef => {
				let Value::Boxed(boxed) = value else {
					return Err(self.mismatch(field, value));
				};
				self.write_boxed(boxed.as_deref(), data)
			},
			_ => self.write_basic(field.kind, value, data),
		}
	}

	fn write_basic(&mut self, kind: TypeEnum, value: &Value, out: &mut ByteWriter) -> Result<()> {
		match (kind, value) {
			(TypeEnum::Boolean, Value::Boolean(v)) => out.write_u8(*v as u8),
			(TypeEnum::Int8, Value::Int8(v)) => out.write_i8(*v),
			(TypeEnum::UInt8, Value::UInt8(v)) => out.write_u8(*v),
			(TypeEnum::Int16, Value::Int16(v)) => out.write_i16(*v),
			(TypeEnum::UInt16, Value::UInt16(v)) => out.write_u16(*v),
			(TypeEnum::Int32, Value::Int32(v)) => out.write_i32(*v),
			(TypeEnum::UInt32, Value::UInt32(v)) => out.write_u32(*v),
			(TypeEnum::Int64, Value::Int64(v)) => out.write_i64(*v),
			(TypeEnum::UInt64, Value::UInt64(v)) => out.write_u64(*v),
			(TypeEnum::Float32, Value::Float32(v)) => out.write_f32(*v),
			(TypeEnum::Float64, Value::Float64(v)) => out.write_f64(*v),
			(TypeEnum::Guid, Value::Guid(v)) => out.write_guid(*v),
			(TypeEnum::Sha1, Value::Sha1(v)) => out.write_bytes(&v.0),
			(TypeEnum::String, Value::String(v)) => out.write_fixed_string(v, 32)?,
			(TypeEnum::CString, Value::CString(v)) => {
				let offset = self.string_offset(v);
				out.write_u32(offset);
			},
			(TypeEnum::FileRef, Value::FileRef(v)) => {
				let offset = self.string_offset(&v.0);
				out.write_u32(offset);
				out.write_u32(0);
			},
			(TypeEnum::TypeRef, Value::TypeRef(v)) | (TypeEnum::Delegate, Value::Delegate(v)) => {
				let offset = match v {
					TypeRefValue::Null => u32::MAX,
					value => self.strings.add(&value.to_string()),
				};
				out.write_u32(offset);
				out.write_u32(0);
			},
			(TypeEnum::ResourceRef, Value::ResourceRef(v)) => out.write_u64(v.0),
			(TypeEnum::Enum, Value::Enum(v)) => out.write_i32(*v),
			(TypeEnum::Class, Value::Pointer(pointer)) => {
				let raw = self.pointer_word(pointer)?;
				out.write_u32(raw);
			},
			(TypeEnum::DbObject, _) => return Err(Error::Unsupported("DbObject fields")),
			_ => return Err(Error::Graph("value does not match field kind".to_string())),
		}
		Ok(())
	}

	fn string_offset(&mut self, value: &str) -> u32 {
		match value.is_empty() {
			true => u32::MAX,
			false => self.strings.add(value),
		}
	}

	fn pointer_word(&self, pointer: &PointerRef) -> Result<u32> {
		match pointer {
			PointerRef::Null => Ok(0),
			PointerRef::Internal(index) => {
				if *index >= self.object_count {
					return Err(Error::Graph(format!("internal pointer to missing instance {index}")));
				}
				Ok(*index as u32 + 1)
			},
			PointerRef::External(import) => {
				let Some(index) = self.import_index.get(import) else {
					return Err(Error::Graph("external pointer missing from import set".to_string()));
				};
				if *index > 0x7FFF_FFFF {
					return Err(Error::Graph("import table exceeds 2^31 entries".to_string()));
				}
				Ok(0x8000_0000 | *index as u32)
			},
		}
	}

	/// Serializes one array into the array side region and returns its table
	/// row index. Nested arrays land in the region in completion order.
	fn write_array(&mut self, array_type_hash: u32, values: &[Value]) -> Result<i32> {
		let array_type = self.schema_type(array_type_hash)?;
		let Some(member) = array_type.fields.first().cloned() else {
			return Err(Error::Graph(format!("array type {:?} has no member field", array_type.name)));
		};
		let type_ref = self.required_type_ref(array_type_hash)? as i32;

		let mut chunk = ByteWriter::new();
		for value in values {
			self.write_field(&member, value, &mut chunk)?;
		}

		self.array_data.pad(16);
		let offset = self.array_data.tell() as u32;
		self.array_data.write_bytes(&chunk.into_bytes());
		let index = self.arrays.len();
		self.arrays.push(EbxArray { offset, count: values.len() as u32, type_ref });
		Ok(index as i32)
	}

	fn write_boxed(&mut self, boxed: Option<&BoxedValue>, out: &mut ByteWriter) -> Result<()> {
		let Some(boxed) = boxed else {
			out.write_i32(-1);
			out.write_bytes(&[0u8; 12]);
			return Ok(());
		};
		if self.magic == MAGIC_V2 {
			return Err(Error::Unsupported("boxed values in a version 2 partition"));
		}

		let mut chunk = ByteWriter::new();
		let type_ref = match boxed.kind {
			TypeEnum::Array => {
				let Value::Array(values) = &boxed.value else {
					return Err(Error::Graph("boxed array payload is not an array".to_string()));
				};
				let row = self.write_array(boxed.type_hash, values)?;
				chunk.write_i32(row);
				self.required_type_ref(boxed.type_hash)?
			},
			TypeEnum::Enum => {
				let Value::Enum(value) = boxed.value else {
					return Err(Error::Graph("boxed enum payload is not an enum".to_string()));
				};
				chunk.write_i32(value);
				self.required_type_ref(boxed.type_hash)?
			},
			TypeEnum::Struct => {
				let Value::Struct(instance) = &boxed.value else {
					return Err(Error::Graph("boxed struct payload is not a struct".to_string()));
				};
				let inner = self.schema_type(boxed.type_hash)?;
				self.write_class(inner, instance, 0, &mut chunk)?;
				self.required_type_ref(boxed.type_hash)?
			},
			kind => {
				self.write_basic(kind, &boxed.value, &mut chunk)?;
				EbxBoxedValue::NO_TYPE_REF
			},
		};

		self.boxed_data.pad(16);
		let offset = self.boxed_data.tell() as u32;
		self.boxed_data.write_bytes(&chunk.into_bytes());
		let index = self.boxed_rows.len();
		self.boxed_rows.push(EbxBoxedValue { offset, type_ref, kind: boxed.kind as u16 });

		out.write_i32(index as i32);
		out.write_bytes(&[0u8; 12]);
		Ok(())
	}

	fn mismatch(&self, field: &SchemaField, value: &Value) -> Error {
		Error::Graph(format!(
			"property {:?} declared {:?} cannot serialize {value:?}",
			field.name, field.kind
		))
	}

	// ---- final assembly -------------------------------------------------

	fn assemble(
		&mut self,
		asset: &EbxAsset,
		entries: &[(EbxInstanceEntry, bool)],
		exported_entries: usize,
		data: ByteWriter,
	) -> Result<Vec<u8>> {
		if self.type_names.len() > u16::MAX as u32 {
			return Err(Error::Graph("type name pool exceeds 65535 bytes".to_string()));
		}

		self.array_data.pad(16);
		let data_len = data.len() as u32;
		let array_data_len = self.array_data.len() as u32;
		let strings_len = round_to_multiple(self.strings.len() as usize, 16) as u32;

		let mut strings_offset = EbxHeader::size_in_bytes(self.magic) as u32;
		strings_offset += self.imports.len() as u32 * 32;
		strings_offset += self.type_names.len();
		strings_offset += self.field_table.len() as u32 * 16;
		strings_offset += self.type_table.len() as u32 * 16;
		strings_offset += entries.len() as u32 * 4;
		strings_offset = round_to_multiple(strings_offset as usize, 16) as u32;
		strings_offset += self.arrays.len() as u32 * 12;
		strings_offset = round_to_multiple(strings_offset as usize, 16) as u32;
		strings_offset += self.boxed_rows.len() as u32 * 8;
		strings_offset = round_to_multiple(strings_offset as usize, 16) as u32;

		let unique_type_count = {
			let mut seen = FxHashSet::default();
			entries.iter().filter(|(entry, _)| seen.insert(entry.type_ref)).count() as u16
		};

		let header = EbxHeader {
			magic: self.magic,
			strings_offset,
			strings_and_data_len: strings_len + data_len + array_data_len + self.boxed_data.len() as u32,
			import_count: self.imports.len() as u32,
			instance_count: entries.len() as u16,
			exported_count: exported_entries as u16,
			unique_type_count,
			type_descriptor_count: self.type_table.len() as u16,
			field_descriptor_count: self.field_table.len() as u16,
			type_names_len: self.type_names.len() as u16,
			strings_len,
			array_count: self.arrays.len() as u32,
			data_len,
			file_guid: asset.file_guid(),
			boxed_values_count: self.boxed_rows.len() as u32,
			boxed_values_offset: data_len + array_data_len,
		};

		let mut out = ByteWriter::new();
		header.write(&mut out);
		for import in &self.imports {
			import.write(&mut out);
		}
		self.type_names.write(&mut out);
		for field in &self.field_table {
			field.write(&mut out);
		}
		for ty in &self.type_table {
			ty.write(&mut out);
		}
		for (entry, _) in entries {
			entry.write(&mut out);
		}
		out.pad(16);
		for array in &self.arrays {
			array.write(&mut out);
		}
		out.pad(16);
		for row in &self.boxed_rows {
			row.write(&mut out);
		}
		out.pad(16);
		debug_assert_eq!(out.tell(), strings_offset as u64);

		self.strings.write(&mut out);
		out.pad(16);
		out.write_bytes(&data.into_bytes());
		out.write_bytes(&std::mem::take(&mut self.array_data).into_bytes());
		out.write_bytes(&std::mem::take(&mut self.boxed_data).into_bytes());

		debug!(
			bytes = out.len(),
			types = self.type_table.len(),
			instances = self.object_count,
			"partition payload assembled"
		);
		Ok(out.into_bytes())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn string_pool_interns_and_tracks_offsets() {
		let mut pool = StringPool::default();
		assert_eq!(pool.add("alpha"), 0);
		assert_eq!(pool.add("beta"), 6);
		assert_eq!(pool.add("alpha"), 0);
		assert_eq!(pool.len(), 11);

		let mut out = ByteWriter::new();
		pool.write(&mut out);
		assert_eq!(out.into_bytes(), b"alpha\0beta\0");
	}
}
