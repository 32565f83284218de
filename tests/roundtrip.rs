use ebx::asset::EbxAsset;
use ebx::error::Error;
use ebx::hash_name;
use ebx::partition::{PartitionReader, PartitionWriter};
use ebx::raw::descriptors::{EbxImportReference, TypeEnum};
use ebx::schema::{Property, SchemaResolver, TypeRegistry, TypeSpec};
use ebx::value::{
	AssetClassGuid, BoxedValue, FileRef, Instance, PointerRef, ResourceRef, Sha1, TypeRefValue,
	Value,
};
use uuid::Uuid;

fn registry() -> TypeRegistry {
	TypeRegistry::builder("Game", "DataContainer")
		.register(TypeSpec::class("DataContainer"))
		.register(TypeSpec::class("EmptyEntity"))
		.register(TypeSpec::class("Base").property(Property::new("a", TypeEnum::UInt32)))
		.register(TypeSpec::class("Child").base("Base").property(Property::new("b", TypeEnum::Float32)))
		.register(
			TypeSpec::value_type("Vec2")
				.property(Property::new("x", TypeEnum::UInt16))
				.property(Property::new("y", TypeEnum::UInt16)),
		)
		.register(
			TypeSpec::class("Holder")
				.base("DataContainer")
				.property(Property::array("points", TypeEnum::Struct, Some("Vec2"))),
		)
		.register(
			TypeSpec::class("Node")
				.base("DataContainer")
				.property(Property::typed("next", TypeEnum::Class, "Node")),
		)
		.register(TypeSpec::enum_type("Quality", &[("Low", 0), ("High", 7)]))
		.register(
			TypeSpec::class("BoxHolder")
				.base("DataContainer")
				.property(Property::new("any", TypeEnum::BoxedValueRef)),
		)
		.register(
			TypeSpec::class("Entity")
				.base("DataContainer")
				.property(Property::new("name", TypeEnum::CString))
				.property(Property::new("id", TypeEnum::Guid))
				.property(Property::new("mass", TypeEnum::Float32))
				.property(Property::new("tag", TypeEnum::String))
				.property(Property::new("path", TypeEnum::FileRef))
				.property(Property::new("kind", TypeEnum::TypeRef))
				.property(Property::new("hook", TypeEnum::Delegate))
				.property(Property::new("payload", TypeEnum::ResourceRef))
				.property(Property::new("digest", TypeEnum::Sha1))
				.property(Property::new("alive", TypeEnum::Boolean))
				.property(Property::new("level", TypeEnum::Int64))
				.property(Property::new("rate", TypeEnum::Float64))
				.property(Property::typed("quality", TypeEnum::Enum, "Quality"))
				.property(Property::typed("pos", TypeEnum::Struct, "Vec2"))
				.property(Property::array("values", TypeEnum::UInt32, None))
				.property(Property::array("children", TypeEnum::Class, None))
				.property(Property::typed("next", TypeEnum::Class, "Entity"))
				.property(Property::new("any", TypeEnum::BoxedValueRef))
				.property(Property::new("scratch", TypeEnum::UInt32).transient()),
		)
		.finish()
		.unwrap()
}

fn blank(registry: &TypeRegistry, type_name: &str) -> Instance {
	registry.create_instance(hash_name(type_name)).unwrap()
}

fn set(instance: &mut Instance, property: &str, value: Value) {
	assert!(instance.set(hash_name(property), value), "no property {property}");
}

fn get<'l>(instance: &'l Instance, property: &str) -> &'l Value {
	instance.get(hash_name(property)).unwrap()
}

fn write(registry: &TypeRegistry, asset: &EbxAsset, magic: u32) -> Vec<u8> {
	PartitionWriter::new(magic, registry).unwrap().write_asset(asset).unwrap()
}

fn read(registry: &TypeRegistry, bytes: &[u8]) -> EbxAsset {
	PartitionReader::new(bytes, registry).unwrap().read_asset::<EbxAsset>().unwrap()
}

fn vec2(registry: &TypeRegistry, x: u16, y: u16) -> Value {
	let mut value = blank(registry, "Vec2");
	set(&mut value, "x", Value::UInt16(x));
	set(&mut value, "y", Value::UInt16(y));
	Value::Struct(Box::new(value))
}

#[test]
fn empty_asset_partition_v2() {
	let registry = registry();
	let guid = Uuid::from_u128(0x1234_5678_9ABC_DEF0);
	let mut obj = blank(&registry, "EmptyEntity");
	obj.set_guid(AssetClassGuid::exported(guid, 0));
	let asset = EbxAsset::new(Uuid::from_u128(0xAA), vec![obj]);

	let bytes = write(&registry, &asset, 2);
	let mut reader = PartitionReader::new(&bytes, &registry).unwrap();
	let header = *reader.header();
	assert_eq!(header.magic, 2);
	assert_eq!(header.instance_count, 1);
	assert_eq!(header.exported_count, 1);
	assert_eq!(header.import_count, 0);
	assert_eq!(header.array_count, 0);

	let loaded = reader.read_asset::<EbxAsset>().unwrap();
	assert_eq!(loaded.file_guid(), Uuid::from_u128(0xAA));
	assert_eq!(loaded.objects().len(), 1);
	assert_eq!(loaded.objects()[0].guid(), AssetClassGuid::exported(guid, 0));
	assert_eq!(loaded.ref_counts(), &[0]);
	assert_eq!(reader.read_object().unwrap().type_hash(), hash_name("EmptyEntity"));
}

#[test]
fn inheritance_chain_places_base_fields() {
	let registry = registry();
	let mut child = blank(&registry, "Child");
	set(&mut child, "a", Value::UInt32(0xDEAD_BEEF));
	set(&mut child, "b", Value::Float32(1.5));
	child.set_guid(AssetClassGuid::exported(Uuid::from_u128(1), 0));
	let asset = EbxAsset::new(Uuid::from_u128(2), vec![child]);

	let bytes = write(&registry, &asset, 4);
	let reader = PartitionReader::new(&bytes, &registry).unwrap();
	let base = reader
		.resolver()
		.types()
		.iter()
		.find(|ty| ty.name_hash == hash_name("Base"))
		.unwrap()
		.clone();
	let b = reader
		.resolver()
		.fields()
		.iter()
		.find(|field| field.name_hash == hash_name("b"))
		.unwrap()
		.clone();
	assert_eq!(b.data_offset, base.size as u32);

	let loaded = read(&registry, &bytes);
	let child = &loaded.objects()[0];
	assert_eq!(get(child, "a").as_uint32(), Some(0xDEAD_BEEF));
	assert_eq!(get(child, "b").as_float32(), Some(1.5));
}

#[test]
fn array_of_structs() {
	let registry = registry();
	let mut holder = blank(&registry, "Holder");
	set(
		&mut holder,
		"points",
		Value::Array(vec![vec2(&registry, 1, 2), vec2(&registry, 3, 4), vec2(&registry, 5, 6)]),
	);
	holder.set_guid(AssetClassGuid::exported(Uuid::from_u128(3), 0));
	let asset = EbxAsset::new(Uuid::from_u128(4), vec![holder]);

	let bytes = write(&registry, &asset, 4);
	let reader = PartitionReader::new(&bytes, &registry).unwrap();
	assert_eq!(reader.arrays().len(), 1);
	let row = reader.arrays()[0];
	assert_eq!(row.count, 3);
	assert_eq!(row.offset, 0);
	assert!(row.type_ref >= 0);
	assert_eq!(reader.header().arrays_offset() % 16, 0);

	let loaded = read(&registry, &bytes);
	let points = get(&loaded.objects()[0], "points").as_array().unwrap();
	assert_eq!(points.len(), 3);
	for (point, (x, y)) in points.iter().zip([(1, 2), (3, 4), (5, 6)]) {
		let point = point.as_struct().unwrap();
		assert_eq!(get(point, "x").as_uint16(), Some(x));
		assert_eq!(get(point, "y").as_uint16(), Some(y));
	}
}

#[test]
fn internal_pointer_cycle() {
	let registry = registry();
	let mut x = blank(&registry, "Node");
	let mut y = blank(&registry, "Node");
	set(&mut x, "next", Value::Pointer(PointerRef::Internal(1)));
	set(&mut y, "next", Value::Pointer(PointerRef::Internal(0)));
	x.set_guid(AssetClassGuid::exported(Uuid::from_u128(5), 0));
	y.set_guid(AssetClassGuid::exported(Uuid::from_u128(6), 1));
	let asset = EbxAsset::new(Uuid::from_u128(7), vec![x, y]);

	let loaded = read(&registry, &write(&registry, &asset, 4));
	assert_eq!(loaded.ref_counts(), &[1, 1]);
	assert_eq!(
		get(&loaded.objects()[0], "next").as_pointer(),
		Some(&PointerRef::Internal(1))
	);
	assert_eq!(
		get(&loaded.objects()[1], "next").as_pointer(),
		Some(&PointerRef::Internal(0))
	);
}

#[test]
fn external_import() {
	let registry = registry();
	let import = EbxImportReference {
		file_guid: Uuid::from_u128(0xF11E),
		class_guid: Uuid::from_u128(0xC1A5),
	};
	let mut node = blank(&registry, "Node");
	set(&mut node, "next", Value::Pointer(PointerRef::External(import)));
	node.set_guid(AssetClassGuid::exported(Uuid::from_u128(8), 0));
	let asset = EbxAsset::new(Uuid::from_u128(9), vec![node]);

	let loaded = read(&registry, &write(&registry, &asset, 4));
	assert_eq!(loaded.imports(), &[import]);
	assert_eq!(loaded.dependencies(), &[import.file_guid]);
	assert_eq!(loaded.ref_counts(), &[0]);
	assert_eq!(
		get(&loaded.objects()[0], "next").as_pointer(),
		Some(&PointerRef::External(import))
	);
}

#[test]
fn boxed_enum_value() {
	let registry = registry();
	let mut holder = blank(&registry, "BoxHolder");
	set(
		&mut holder,
		"any",
		Value::Boxed(Some(Box::new(BoxedValue {
			kind: TypeEnum::Enum,
			type_hash: hash_name("Quality"),
			value: Value::Enum(7),
		}))),
	);
	holder.set_guid(AssetClassGuid::exported(Uuid::from_u128(10), 0));
	let asset = EbxAsset::new(Uuid::from_u128(11), vec![holder]);

	let bytes = write(&registry, &asset, 4);
	let reader = PartitionReader::new(&bytes, &registry).unwrap();
	assert_eq!(reader.boxed_values().len(), 1);
	assert_eq!(reader.boxed_values()[0].kind, TypeEnum::Enum as u16);
	assert_eq!(reader.header().boxed_values_offset() % 16, 0);

	let loaded = read(&registry, &bytes);
	let boxed = match get(&loaded.objects()[0], "any") {
		Value::Boxed(Some(boxed)) => boxed,
		other => panic!("expected boxed value, got {other:?}"),
	};
	assert_eq!(boxed.kind, TypeEnum::Enum);
	assert_eq!(boxed.type_hash, hash_name("Quality"));
	assert_eq!(boxed.value, Value::Enum(7));
}

fn kitchen_sink(registry: &TypeRegistry) -> EbxAsset {
	let mut e0 = blank(registry, "Entity");
	set(&mut e0, "name", Value::CString("hero".into()));
	set(&mut e0, "id", Value::Guid(Uuid::from_u128(0x1D)));
	set(&mut e0, "mass", Value::Float32(2.5));
	set(&mut e0, "tag", Value::String("alpha".into()));
	set(&mut e0, "path", Value::FileRef(FileRef("fx/sparks".into())));
	set(&mut e0, "kind", Value::TypeRef(TypeRefValue::Guid(Uuid::from_u128(0x7E))));
	set(&mut e0, "hook", Value::Delegate(TypeRefValue::Name("OnFire".into())));
	set(&mut e0, "payload", Value::ResourceRef(ResourceRef(0xDEAD_BEEF_CAFE)));
	set(&mut e0, "digest", Value::Sha1(Sha1([7; 20])));
	set(&mut e0, "alive", Value::Boolean(true));
	set(&mut e0, "level", Value::Int64(-9));
	set(&mut e0, "rate", Value::Float64(0.25));
	set(&mut e0, "quality", Value::Enum(7));
	set(&mut e0, "pos", vec2(registry, 3, 4));
	set(&mut e0, "values", Value::Array(vec![Value::UInt32(1), Value::UInt32(2), Value::UInt32(3)]));
	set(
		&mut e0,
		"children",
		Value::Array(vec![
			Value::Pointer(PointerRef::Internal(1)),
			Value::Pointer(PointerRef::Internal(2)),
			Value::Pointer(PointerRef::Null),
		]),
	);
	set(&mut e0, "next", Value::Pointer(PointerRef::Internal(1)));
	set(
		&mut e0,
		"any",
		Value::Boxed(Some(Box::new(BoxedValue {
			kind: TypeEnum::Struct,
			type_hash: hash_name("Vec2"),
			value: vec2(registry, 9, 9),
		}))),
	);
	e0.set_guid(AssetClassGuid::exported(Uuid::from_u128(0xE0), 0));

	let mut e1 = blank(registry, "Entity");
	set(&mut e1, "name", Value::CString("shadow".into()));
	e1.set_guid(AssetClassGuid::exported(Uuid::from_u128(0xE1), 1));

	let mut n2 = blank(registry, "Node");
	set(&mut n2, "next", Value::Pointer(PointerRef::Internal(0)));
	n2.set_guid(AssetClassGuid::internal(2));

	EbxAsset::new(Uuid::from_u128(0xF00D), vec![e0, e1, n2])
}

#[test]
fn semantic_round_trip() {
	let registry = registry();
	let asset = kitchen_sink(&registry);
	let loaded = read(&registry, &write(&registry, &asset, 4));

	assert_eq!(loaded.objects(), asset.objects());
	assert_eq!(loaded.ref_counts(), &[1, 2, 1]);
	assert!(loaded.imports().is_empty());
	assert_eq!(loaded.file_guid(), asset.file_guid());
}

#[test]
fn second_write_is_idempotent() {
	let registry = registry();
	let asset = kitchen_sink(&registry);
	let first = write(&registry, &asset, 4);
	let loaded = read(&registry, &first);
	let second = write(&registry, &loaded, 4);
	assert_eq!(first, second);
	assert_eq!(read(&registry, &second), loaded);
}

#[test]
fn writes_are_deterministic() {
	let registry = registry();
	let asset = kitchen_sink(&registry);
	assert_eq!(write(&registry, &asset, 4), write(&registry, &asset, 4));
}

#[test]
fn regions_are_aligned() {
	let registry = registry();
	let asset = kitchen_sink(&registry);
	let bytes = write(&registry, &asset, 4);
	let reader = PartitionReader::new(&bytes, &registry).unwrap();
	let header = reader.header();
	assert_eq!(header.strings_offset % 16, 0);
	assert_eq!(header.instance_data_offset() % 16, 0);
	assert_eq!(header.arrays_offset() % 16, 0);
	assert_eq!(header.boxed_values_offset() % 16, 0);
}

#[test]
fn transient_properties_are_not_serialized() {
	let registry = registry();
	let mut asset = kitchen_sink(&registry);
	set(&mut asset.objects_mut()[0], "scratch", Value::UInt32(55));
	let loaded = read(&registry, &write(&registry, &asset, 4));
	assert_eq!(get(&loaded.objects()[0], "scratch").as_uint32(), Some(0));
}

#[test]
fn v2_rejects_boxed_values() {
	let registry = registry();
	let mut holder = blank(&registry, "BoxHolder");
	set(
		&mut holder,
		"any",
		Value::Boxed(Some(Box::new(BoxedValue {
			kind: TypeEnum::Enum,
			type_hash: hash_name("Quality"),
			value: Value::Enum(1),
		}))),
	);
	holder.set_guid(AssetClassGuid::exported(Uuid::from_u128(12), 0));
	let asset = EbxAsset::new(Uuid::from_u128(13), vec![holder]);
	let result = PartitionWriter::new(2, &registry).unwrap().write_asset(&asset);
	assert!(matches!(result, Err(Error::Unsupported(_))));
}

#[test]
fn reader_rejects_unknown_magic() {
	let registry = registry();
	let mut bytes = vec![0u8; 72];
	bytes[0] = 6;
	assert!(matches!(
		PartitionReader::new(&bytes, &registry),
		Err(Error::BadMagic(6))
	));
}

#[test]
fn writer_rejects_exported_after_non_exported() {
	let registry = registry();
	let mut first = blank(&registry, "EmptyEntity");
	first.set_guid(AssetClassGuid::internal(0));
	let mut second = blank(&registry, "EmptyEntity");
	second.set_guid(AssetClassGuid::exported(Uuid::from_u128(14), 1));
	let asset = EbxAsset::new(Uuid::from_u128(15), vec![first, second]);
	let result = PartitionWriter::new(4, &registry).unwrap().write_asset(&asset);
	assert!(matches!(result, Err(Error::Graph(_))));
}

#[test]
fn writer_rejects_dangling_internal_pointer() {
	let registry = registry();
	let mut node = blank(&registry, "Node");
	set(&mut node, "next", Value::Pointer(PointerRef::Internal(7)));
	node.set_guid(AssetClassGuid::exported(Uuid::from_u128(16), 0));
	let asset = EbxAsset::new(Uuid::from_u128(17), vec![node]);
	let result = PartitionWriter::new(4, &registry).unwrap().write_asset(&asset);
	assert!(matches!(result, Err(Error::Graph(_))));
}

#[test]
fn dialect_factories_route_by_version() {
	let registry = registry();
	assert!(matches!(
		ebx::writer_for(6, &registry).err(),
		Some(Error::Unsupported(_))
	));
	let mut writer = ebx::writer_for(4, &registry).unwrap();
	let mut obj = blank(&registry, "EmptyEntity");
	obj.set_guid(AssetClassGuid::exported(Uuid::from_u128(18), 0));
	let asset = EbxAsset::new(Uuid::from_u128(19), vec![obj]);
	let bytes = writer.write_asset(&asset).unwrap();

	let mut reader = ebx::reader_for(4, &bytes, &registry).unwrap();
	let loaded = reader.read_asset().unwrap();
	assert_eq!(loaded.objects().len(), 1);
	assert!(matches!(ebx::reader_for(6, &bytes, &registry).err(), Some(Error::Unsupported(_))));
}
