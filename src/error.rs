use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("unsupported EBX magic {0:#010x}")]
	BadMagic(u32),

	#[error("malformed EBX layout: {0}")]
	BadLayout(&'static str),

	#[error("descriptor index {index} out of range ({len} rows)")]
	IndexOutOfRange { index: usize, len: usize },

	#[error("unsupported construct: {0}")]
	Unsupported(&'static str),

	#[error("schema has no type for name hash {0:#010x}")]
	SchemaMismatch(u32),

	#[error("unterminated string at pool offset {0:#x}")]
	CorruptString(u64),

	#[error("object graph cannot be serialized: {0}")]
	Graph(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
