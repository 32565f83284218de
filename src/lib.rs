//! Reader and writer for EBX, the object-graph serialization format used by
//! Frostbite-family game data.
//!
//! An EBX payload encodes an asset: a partition GUID plus an ordered cluster
//! of schema-typed instances whose fields may be primitives, nested
//! structures, arrays, intra-asset pointers, inter-asset imports, boxed
//! dynamically-typed values, and string or resource references. This crate
//! implements the Partition dialect (magic 2 and 4) end to end: the wire
//! layout in [`raw`], type-ref resolution in [`raw::resolver`], and the
//! schema-directed codec in [`partition`]. The seam in [`dialect`] routes
//! version 6 payloads to the external RIFF codec.
//!
//! The schema itself is consumed as an oracle through
//! [`schema::SchemaResolver`]; [`schema::TypeRegistry`] is the bundled
//! precomputed-table implementation.

pub mod asset;
pub mod dialect;
pub mod error;
pub mod partition;
pub mod raw;
pub mod schema;
pub mod stream;
pub mod utilities;
pub mod value;

pub use asset::{EbxAsset, EbxReadTarget};
pub use dialect::{dialect_for, reader_for, writer_for, EbxDialect, EbxReader, EbxWriter};
pub use error::{Error, Result};
pub use partition::{PartitionReader, PartitionWriter};
pub use utilities::hash_name;
pub use value::{AssetClassGuid, BoxedValue, Instance, PointerRef, Value};
