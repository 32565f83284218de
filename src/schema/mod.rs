mod types;

pub use types::{
	Property, PropertyAttributes, RegistryBuilder, SchemaField, SchemaKind, SchemaResolver,
	SchemaType, TypeRegistry, TypeSpec,
};
