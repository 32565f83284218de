use crate::asset::EbxAsset;
use crate::error::{Error, Result};
use crate::partition::{PartitionReader, PartitionWriter};
use crate::schema::SchemaResolver;
use crate::value::Instance;

/// The two known wire dialects.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum EbxDialect {
	Partition,
	Riff,
}

/// Maps a profile's EBX version to its dialect. Version 6 payloads use the
/// RIFF container; everything else is Partition-framed.
pub fn dialect_for(version: u32) -> EbxDialect {
	match version {
		6 => EbxDialect::Riff,
		_ => EbxDialect::Partition,
	}
}

/// Dialect-independent read contract.
pub trait EbxReader {
	fn read_asset(&mut self) -> Result<EbxAsset>;
	fn read_objects(&mut self) -> Result<Vec<Instance>>;
}

/// Dialect-independent write contract.
pub trait EbxWriter {
	fn write_asset(&mut self, asset: &EbxAsset) -> Result<Vec<u8>>;
}

impl EbxReader for PartitionReader<'_> {
	fn read_asset(&mut self) -> Result<EbxAsset> {
		PartitionReader::read_asset::<EbxAsset>(self)
	}

	fn read_objects(&mut self) -> Result<Vec<Instance>> {
		PartitionReader::read_objects(self)
	}
}

impl EbxWriter for PartitionWriter<'_> {
	fn write_asset(&mut self, asset: &EbxAsset) -> Result<Vec<u8>> {
		PartitionWriter::write_asset(self, asset)
	}
}

/// Opens a reader for the dialect the profile version selects. The RIFF
/// codec lives outside this crate, so version 6 reports as unsupported here.
pub fn reader_for<'l>(
	version: u32,
	data: &'l [u8],
	schema: &'l dyn SchemaResolver,
) -> Result<Box<dyn EbxReader + 'l>> {
	match dialect_for(version) {
		EbxDialect::Riff => Err(Error::Unsupported("RIFF dialect codec")),
		EbxDialect::Partition => Ok(Box::new(PartitionReader::new(data, schema)?)),
	}
}

/// Opens a writer for the dialect the profile version selects.
pub fn writer_for<'l>(version: u32, schema: &'l dyn SchemaResolver) -> Result<Box<dyn EbxWriter + 'l>> {
	match dialect_for(version) {
		EbxDialect::Riff => Err(Error::Unsupported("RIFF dialect codec")),
		EbxDialect::Partition => Ok(Box::new(PartitionWriter::new(version, schema)?)),
	}
}
