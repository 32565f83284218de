use std::sync::Arc;

use crate::error::{Error, Result};
use crate::raw::descriptors::{EbxFieldDescriptor, EbxTypeDescriptor};

/// Maps on-wire type refs to descriptor rows. Owns immutable slices of both
/// tables; readers and writers share one resolver per payload.
#[derive(Debug, Clone)]
pub struct TypeResolver {
	types: Arc<[EbxTypeDescriptor]>,
	fields: Arc<[EbxFieldDescriptor]>,
}

impl TypeResolver {
	pub fn new(mut types: Vec<EbxTypeDescriptor>, fields: Vec<EbxFieldDescriptor>) -> Result<Self> {
		for (index, ty) in types.iter_mut().enumerate() {
			ty.index = index as u16;
		}
		let resolver = Self {
			types: Arc::from(types),
			fields: Arc::from(fields),
		};
		resolver.validate()?;
		Ok(resolver)
	}

	fn validate(&self) -> Result<()> {
		for ty in self.types.iter() {
			if ty.field_index < 0 {
				return Err(Error::BadLayout("negative field index in type descriptor"));
			}
			let end = ty.field_index as usize + ty.field_count as usize;
			if end > self.fields.len() {
				return Err(Error::BadLayout("type descriptor field range exceeds field table"));
			}
		}
		Ok(())
	}

	pub fn types(&self) -> &[EbxTypeDescriptor] {
		&self.types
	}

	pub fn fields(&self) -> &[EbxFieldDescriptor] {
		&self.fields
	}

	/// Plain resolution: a direct index into the type table.
	pub fn resolve_type(&self, type_ref: u16) -> Result<EbxTypeDescriptor> {
		match self.types.get(type_ref as usize) {
			Some(ty) => Ok(ty.clone()),
			None => Err(Error::IndexOutOfRange { index: type_ref as usize, len: self.types.len() }),
		}
	}

	/// Resolution of a field's type ref against its containing type. With the
	/// relative bit set the ref is a signed delta from the parent's index.
	pub fn resolve_field_type(
		&self,
		parent: &EbxTypeDescriptor,
		field: &EbxFieldDescriptor,
	) -> Result<EbxTypeDescriptor> {
		match field.flags.has_relative_type_ref() {
			false => self.resolve_type(field.type_ref),
			true => {
				let index = parent.index as i64 + field.type_ref as i16 as i64;
				match usize::try_from(index).ok().and_then(|i| self.types.get(i)) {
					Some(ty) => Ok(ty.clone()),
					None => Err(Error::IndexOutOfRange {
						index: index.max(0) as usize,
						len: self.types.len(),
					}),
				}
			},
		}
	}

	/// The field descriptor at an absolute offset into the shared field table.
	pub fn field_at(&self, index: usize) -> Result<EbxFieldDescriptor> {
		match self.fields.get(index) {
			Some(field) => Ok(field.clone()),
			None => Err(Error::IndexOutOfRange { index, len: self.fields.len() }),
		}
	}

	/// The `j`-th declared field of `ty`.
	pub fn field_of(&self, ty: &EbxTypeDescriptor, j: usize) -> Result<EbxFieldDescriptor> {
		self.field_at(ty.field_index as usize + j)
	}
}
