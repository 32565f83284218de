use std::sync::Arc;

use bitflags::bitflags;
use nohash_hasher::IntMap;

use crate::error::{Error, Result};
use crate::raw::descriptors::{FieldCategory, FieldFlags, TypeEnum, TypeFlags};
use crate::utilities::{hash_name, round_to_multiple};
use crate::value::{Instance, Value};

bitflags! {
	/// Schema-side attributes of a declared property.
	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
	pub struct PropertyAttributes: u16 {
		/// Never serialized; runtime-only state.
		const TRANSIENT = 0x0001;
	}
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SchemaKind {
	Class,
	Struct,
	Enum,
	Array,
}

impl SchemaKind {
	pub fn type_enum(self) -> TypeEnum {
		match self {
			SchemaKind::Class => TypeEnum::Class,
			SchemaKind::Struct => TypeEnum::Struct,
			SchemaKind::Enum => TypeEnum::Enum,
			SchemaKind::Array => TypeEnum::Array,
		}
	}
}

pub(crate) fn category_for(kind: TypeEnum) -> FieldCategory {
	match kind {
		TypeEnum::Class => FieldCategory::Pointer,
		TypeEnum::Struct => FieldCategory::Struct,
		TypeEnum::Array => FieldCategory::Array,
		TypeEnum::Enum => FieldCategory::Enum,
		TypeEnum::Delegate => FieldCategory::Delegate,
		TypeEnum::Inherited => FieldCategory::None,
		_ => FieldCategory::Primitive,
	}
}

/// A persisted field of a schema type, with its wire layout already
/// computed. Derived classes carry a synthetic Inherited field first.
#[derive(Debug, Clone)]
pub struct SchemaField {
	pub name: Arc<str>,
	pub name_hash: u32,
	pub kind: TypeEnum,
	/// Name hash of the referenced schema type: the struct or enum type, the
	/// pointee class, the array pseudo-type, or the base class for the
	/// synthetic Inherited field. 0 when the field references no type.
	pub type_ref_hash: u32,
	pub data_offset: u32,
	pub attributes: PropertyAttributes,
}

impl SchemaField {
	pub fn wire_flags(&self) -> FieldFlags {
		FieldFlags::new(self.kind, category_for(self.kind))
	}

	pub fn is_transient(&self) -> bool {
		self.attributes.contains(PropertyAttributes::TRANSIENT)
	}

	pub fn is_synthetic(&self) -> bool {
		self.kind == TypeEnum::Inherited
	}
}

/// One entry in the schema oracle: a type with its wire layout and persisted
/// field list.
#[derive(Debug, Clone)]
pub struct SchemaType {
	pub name: Arc<str>,
	pub name_hash: u32,
	pub namespace: Arc<str>,
	pub kind: SchemaKind,
	pub super_hash: Option<u32>,
	pub alignment: u8,
	pub size: u16,
	pub fields: Vec<SchemaField>,
	pub enumerators: Vec<(Arc<str>, i32)>,
}

impl SchemaType {
	pub fn wire_flags(&self) -> TypeFlags {
		let kind = self.kind.type_enum();
		TypeFlags::new(kind, category_for(kind))
	}
}

/// The schema oracle the codec consumes: type lookup by name hash, the
/// canonicalization anchors, and blank instance construction.
pub trait SchemaResolver {
	fn type_by_hash(&self, name_hash: u32) -> Option<&SchemaType>;

	/// The array pseudo-type registered for an element type, if any.
	fn array_type_for(&self, element_hash: u32) -> Option<&SchemaType>;

	/// Namespace prefix within which inheritance chains are walked.
	fn root_namespace(&self) -> &str;

	/// The container type pointer-element arrays canonicalize to.
	fn container_hash(&self) -> u32;

	/// Builds a blank instance of the type with the given name hash, with one
	/// default-valued slot per declared property across the inheritance
	/// chain. Arrays come up as empty collections, structs fully blank.
	fn create_instance(&self, name_hash: u32) -> Option<Instance> {
		let mut slots = Vec::new();
		let mut chain = Vec::new();
		let mut current = Some(name_hash);
		while let Some(hash) = current {
			let ty = self.type_by_hash(hash)?;
			chain.push(ty);
			current = ty.super_hash;
		}
		for ty in chain.iter().rev() {
			for field in &ty.fields {
				if field.is_synthetic() {
					continue;
				}
				let value = match field.kind {
					TypeEnum::Struct => Value::Struct(Box::new(self.create_instance(field.type_ref_hash)?)),
					kind => Value::default_for(kind)?,
				};
				slots.push((field.name_hash, value));
			}
		}
		Some(Instance::new(name_hash, slots))
	}
}

/// Precomputed, name-hash-keyed schema table.
#[derive(Debug)]
pub struct TypeRegistry {
	types: IntMap<u32, SchemaType>,
	arrays_by_element: IntMap<u32, u32>,
	root_namespace: Arc<str>,
	container_hash: u32,
}

impl SchemaResolver for TypeRegistry {
	fn type_by_hash(&self, name_hash: u32) -> Option<&SchemaType> {
		self.types.get(&name_hash)
	}

	fn array_type_for(&self, element_hash: u32) -> Option<&SchemaType> {
		self.arrays_by_element.get(&element_hash).and_then(|hash| self.types.get(hash))
	}

	fn root_namespace(&self) -> &str {
		&self.root_namespace
	}

	fn container_hash(&self) -> u32 {
		self.container_hash
	}
}

impl TypeRegistry {
	pub fn builder(root_namespace: &str, container: &str) -> RegistryBuilder {
		RegistryBuilder {
			root_namespace: Arc::from(root_namespace),
			container: container.to_string(),
			specs: Vec::new(),
		}
	}
}

/// Declaration of one property, before layout computation.
#[derive(Debug, Clone)]
pub struct Property {
	name: String,
	kind: TypeEnum,
	type_name: Option<String>,
	element: Option<(TypeEnum, Option<String>)>,
	attributes: PropertyAttributes,
}

impl Property {
	pub fn new(name: &str, kind: TypeEnum) -> Self {
		Self {
			name: name.to_string(),
			kind,
			type_name: None,
			element: None,
			attributes: PropertyAttributes::empty(),
		}
	}

	/// A property whose kind references another schema type: a struct or
	/// enum value, or the declared pointee of a Class pointer.
	pub fn typed(name: &str, kind: TypeEnum, type_name: &str) -> Self {
		let mut property = Self::new(name, kind);
		property.type_name = Some(type_name.to_string());
		property
	}

	/// An ordered-collection property with the given element kind; typed
	/// elements name their schema type.
	pub fn array(name: &str, element_kind: TypeEnum, element_type: Option<&str>) -> Self {
		let mut property = Self::new(name, TypeEnum::Array);
		property.element = Some((element_kind, element_type.map(str::to_string)));
		property
	}

	pub fn transient(mut self) -> Self {
		self.attributes |= PropertyAttributes::TRANSIENT;
		self
	}
}

/// Declaration of one type, before layout computation.
#[derive(Debug, Clone)]
pub struct TypeSpec {
	name: String,
	namespace: Option<String>,
	kind: SchemaKind,
	base: Option<String>,
	alignment: Option<u8>,
	properties: Vec<Property>,
	enumerators: Vec<(String, i32)>,
}

impl TypeSpec {
	pub fn class(name: &str) -> Self {
		Self {
			name: name.to_string(),
			namespace: None,
			kind: SchemaKind::Class,
			base: None,
			alignment: None,
			properties: Vec::new(),
			enumerators: Vec::new(),
		}
	}

	pub fn value_type(name: &str) -> Self {
		let mut spec = Self::class(name);
		spec.kind = SchemaKind::Struct;
		spec
	}

	pub fn enum_type(name: &str, enumerators: &[(&str, i32)]) -> Self {
		let mut spec = Self::class(name);
		spec.kind = SchemaKind::Enum;
		spec.enumerators = enumerators.iter().map(|(n, v)| (n.to_string(), *v)).collect();
		spec
	}

	pub fn base(mut self, base: &str) -> Self {
		self.base = Some(base.to_string());
		self
	}

	pub fn namespace(mut self, namespace: &str) -> Self {
		self.namespace = Some(namespace.to_string());
		self
	}

	pub fn align(mut self, alignment: u8) -> Self {
		self.alignment = Some(alignment);
		self
	}

	pub fn property(mut self, property: Property) -> Self {
		self.properties.push(property);
		self
	}
}

pub struct RegistryBuilder {
	root_namespace: Arc<str>,
	container: String,
	specs: Vec<TypeSpec>,
}

impl RegistryBuilder {
	pub fn register(mut self, spec: TypeSpec) -> Self {
		self.specs.push(spec);
		self
	}

	pub fn finish(self) -> Result<TypeRegistry> {
		Layouter::new(self)?.finish()
	}
}

struct Layouter {
	root_namespace: Arc<str>,
	container_hash: u32,
	specs: Vec<TypeSpec>,
	by_hash: IntMap<u32, usize>,
	layouts: IntMap<u32, (u16, u8)>,
	types: IntMap<u32, SchemaType>,
	arrays_by_element: IntMap<u32, u32>,
}

impl Layouter {
	fn new(builder: RegistryBuilder) -> Result<Self> {
		let container_hash = hash_name(&builder.container);
		let mut by_hash = IntMap::default();
		for (index, spec) in builder.specs.iter().enumerate() {
			if by_hash.insert(hash_name(&spec.name), index).is_some() {
				return Err(Error::Graph(format!("duplicate schema type {:?}", spec.name)));
			}
		}
		if !by_hash.contains_key(&container_hash) {
			return Err(Error::SchemaMismatch(container_hash));
		}
		Ok(Self {
			root_namespace: builder.root_namespace,
			container_hash,
			specs: builder.specs,
			by_hash,
			layouts: IntMap::default(),
			types: IntMap::default(),
			arrays_by_element: IntMap::default(),
		})
	}

	fn finish(mut self) -> Result<TypeRegistry> {
		for index in 0..self.specs.len() {
			let hash = hash_name(&self.specs[index].name);
			self.build_type(hash, 0)?;
		}
		Ok(TypeRegistry {
			types: self.types,
			arrays_by_element: self.arrays_by_element,
			root_namespace: self.root_namespace,
			container_hash: self.container_hash,
		})
	}

	/// Computes `(size, alignment)` for a type, building it on first use.
	/// `depth` guards against struct containment cycles.
	fn build_type(&mut self, name_hash: u32, depth: usize) -> Result<(u16, u8)> {
		if let Some(layout) = self.layouts.get(&name_hash) {
			return Ok(*layout);
		}
		if depth > self.specs.len() {
			return Err(Error::Graph("cyclic value-type containment in schema".to_string()));
		}
		let Some(&index) = self.by_hash.get(&name_hash) else {
			return Err(Error::SchemaMismatch(name_hash));
		};
		let spec = self.specs[index].clone();

		let (base_hash, mut offset, mut alignment) = match spec.kind {
			SchemaKind::Enum => {
				let ty = SchemaType {
					name: Arc::from(spec.name.as_str()),
					name_hash,
					namespace: self.namespace_of(&spec),
					kind: SchemaKind::Enum,
					super_hash: None,
					alignment: 4,
					size: 4,
					fields: Vec::new(),
					enumerators: spec
						.enumerators
						.iter()
						.map(|(n, v)| (Arc::from(n.as_str()), *v))
						.collect(),
				};
				self.layouts.insert(name_hash, (4, 4));
				self.types.insert(name_hash, ty);
				return Ok((4, 4));
			},
			SchemaKind::Class => match &spec.base {
				Some(base) => {
					let base_hash = hash_name(base);
					let (base_size, base_align) = self.build_type(base_hash, depth + 1)?;
					(Some(base_hash), base_size as u32, base_align.max(4))
				},
				// Object header slot.
				None => (None, 8, 4),
			},
			SchemaKind::Struct => (None, 0, 1),
			SchemaKind::Array => return Err(Error::Graph("array pseudo-types are auto-registered".to_string())),
		};

		let mut fields = Vec::with_capacity(spec.properties.len() + 1);
		if let Some(base_hash) = base_hash {
			fields.push(SchemaField {
				name: Arc::from("$"),
				name_hash: hash_name("$"),
				kind: TypeEnum::Inherited,
				type_ref_hash: base_hash,
				data_offset: 0,
				attributes: PropertyAttributes::empty(),
			});
		}

		for property in &spec.properties {
			let (type_ref_hash, size, align) = self.field_layout(property, depth)?;
			let field_offset = match property.attributes.contains(PropertyAttributes::TRANSIENT) {
				// Transient fields take no wire space.
				true => 0,
				false => {
					offset = round_to_multiple(offset as usize, align as usize) as u32;
					let at = offset;
					offset += size;
					alignment = alignment.max(align);
					at
				},
			};
			fields.push(SchemaField {
				name: Arc::from(property.name.as_str()),
				name_hash: hash_name(&property.name),
				kind: property.kind,
				type_ref_hash,
				data_offset: field_offset,
				attributes: property.attributes,
			});
		}

		let alignment = match spec.alignment {
			Some(explicit) => explicit,
			None => alignment,
		};
		let size = round_to_multiple(offset as usize, alignment.max(1) as usize) as u16;

		let ty = SchemaType {
			name: Arc::from(spec.name.as_str()),
			name_hash,
			namespace: self.namespace_of(&spec),
			kind: spec.kind,
			super_hash: base_hash,
			alignment,
			size,
			fields,
			enumerators: Vec::new(),
		};
		self.layouts.insert(name_hash, (size, alignment));
		self.types.insert(name_hash, ty);
		Ok((size, alignment))
	}

	/// `(referenced type hash, wire size, wire alignment)` of one property.
	fn field_layout(&mut self, property: &Property, depth: usize) -> Result<(u32, u32, u8)> {
		match property.kind {
			TypeEnum::Struct => {
				let Some(type_name) = &property.type_name else {
					return Err(Error::Graph(format!("struct property {:?} names no type", property.name)));
				};
				let hash = hash_name(type_name);
				let (size, align) = self.build_type(hash, depth + 1)?;
				Ok((hash, size as u32, align))
			},
			TypeEnum::Array => {
				let Some((element_kind, element_type)) = &property.element else {
					return Err(Error::Graph(format!("array property {:?} names no element", property.name)));
				};
				let array_hash = self.register_array(*element_kind, element_type.as_deref(), depth)?;
				let (size, align) = TypeEnum::Array.fixed_layout().unwrap_or((4, 4));
				Ok((array_hash, size, align as u8))
			},
			kind => {
				let type_ref_hash = match &property.type_name {
					Some(type_name) => {
						let hash = hash_name(type_name);
						if kind == TypeEnum::Enum {
							self.build_type(hash, depth + 1)?;
						}
						hash
					},
					None => 0,
				};
				let Some((size, align)) = kind.fixed_layout() else {
					return Err(Error::Unsupported("property kind has no wire layout"));
				};
				Ok((type_ref_hash, size, align as u8))
			},
		}
	}

	/// Ensures an array pseudo-type exists for the element and returns its
	/// name hash. Pointer elements canonicalize to the container type.
	fn register_array(
		&mut self,
		element_kind: TypeEnum,
		element_type: Option<&str>,
		depth: usize,
	) -> Result<u32> {
		let (element_hash, element_label) = match element_kind {
			TypeEnum::Class => (self.container_hash, self.container_name()),
			_ => match element_type {
				Some(name) => {
					let hash = hash_name(name);
					self.build_type(hash, depth + 1)?;
					(hash, Arc::from(name))
				},
				None => {
					let label: Arc<str> = Arc::from(format!("{element_kind:?}").as_str());
					(hash_name(&label), label)
				},
			},
		};

		if let Some(existing) = self.arrays_by_element.get(&element_hash) {
			return Ok(*existing);
		}

		let name: Arc<str> = Arc::from(format!("{element_label}-Array").as_str());
		let name_hash = hash_name(&name);
		let member_type_ref = match element_kind {
			TypeEnum::Struct | TypeEnum::Enum | TypeEnum::Class => element_hash,
			_ => 0,
		};
		let ty = SchemaType {
			name,
			name_hash,
			namespace: self.root_namespace.clone(),
			kind: SchemaKind::Array,
			super_hash: None,
			alignment: 4,
			size: 4,
			fields: vec![SchemaField {
				name: Arc::from("member"),
				name_hash: hash_name("member"),
				kind: element_kind,
				type_ref_hash: member_type_ref,
				data_offset: 0,
				attributes: PropertyAttributes::empty(),
			}],
			enumerators: Vec::new(),
		};
		self.layouts.insert(name_hash, (4, 4));
		self.types.insert(name_hash, ty);
		self.arrays_by_element.insert(element_hash, name_hash);
		Ok(name_hash)
	}

	fn container_name(&self) -> Arc<str> {
		match self.by_hash.get(&self.container_hash) {
			Some(&index) => Arc::from(self.specs[index].name.as_str()),
			None => Arc::from(""),
		}
	}

	fn namespace_of(&self, spec: &TypeSpec) -> Arc<str> {
		match &spec.namespace {
			Some(namespace) => Arc::from(namespace.as_str()),
			None => self.root_namespace.clone(),
		}
	}
}
