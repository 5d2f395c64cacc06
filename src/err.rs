use crate::guid::Guid;

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OvmfVarsError>;

pub type DeserializationResult<T> = std::result::Result<T, DeserializationError>;
pub type SerializationResult<T> = std::result::Result<T, SerializationError>;
pub type DocumentResult<T> = std::result::Result<T, DocumentError>;

/// Errors raised while decoding an image.
///
/// Every variant means the input is not a variable store of the supported kind,
/// and aborts the whole decode.
#[derive(Debug, Error)]
pub enum DeserializationError {
    #[error("Offset {offset}: An I/O error has occurred while trying to read {what}: {source}")]
    FailedToRead {
        what: &'static str,
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("Invalid firmware volume signature, expected `_FVH` (0x4856465f), found `{magic:#010x}`")]
    InvalidVolumeSignature { magic: u32 },

    #[error("Unexpected firmware volume file system GUID `{guid}`, not an NV data volume")]
    UnexpectedVolumeGuid { guid: Guid },

    #[error("Unexpected variable store GUID `{guid}`, not an authenticated variable store")]
    UnexpectedStoreGuid { guid: Guid },

    #[error("Variable store format is `{format:#04x}`, expected FORMATTED (0x5a)")]
    UnexpectedStoreFormat { format: u8 },

    #[error("Variable store state is `{state:#04x}`, expected HEALTHY (0xfe)")]
    UnexpectedStoreState { state: u8 },

    #[error("Offset {offset}: Invalid variable header magic, expected `0x55aa`, found `{magic:#06x}`")]
    InvalidVariableMagic { magic: u16, offset: u64 },

    #[error("Offset {offset}: Variable {what} needs {need} bytes, but only {have} remain in the store")]
    Truncated {
        what: &'static str,
        offset: u64,
        need: usize,
        have: usize,
    },

    #[error("Offset {offset}: Failed to decode UTF-16 variable name")]
    InvalidVariableName { offset: u64 },
}

/// Errors raised while encoding records or assembling an image.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Variable `{name}`: declared name size {declared} does not match encoded size {actual}")]
    NameSizeMismatch {
        name: String,
        declared: u32,
        actual: usize,
    },

    #[error("Variable `{name}`: declared data size {declared} does not match payload size {actual}")]
    DataSizeMismatch {
        name: String,
        declared: u32,
        actual: usize,
    },

    #[error("Too many variables to fit in image: {needed} bytes needed, limit is {limit}")]
    Capacity { needed: usize, limit: usize },

    #[error("An I/O error has occurred while writing: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised while mapping between records and the structured document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Unknown vendor `{vendor}`: neither a registered name nor a GUID")]
    UnknownVendor { vendor: String },

    #[error("Variable `{name}`: invalid timestamp: {source}")]
    InvalidTimestamp {
        name: String,
        #[source]
        source: jiff::Error,
    },

    #[error("Variable `{name}`: timestamp {timestamp} is before year 1 and cannot be stored")]
    UnrepresentableTimestamp {
        name: String,
        timestamp: jiff::Timestamp,
    },

    #[error("Variable `{name}`: {what} of {len} bytes does not fit in a 32-bit size field")]
    TooLarge {
        name: String,
        what: &'static str,
        len: usize,
    },
}

#[derive(Debug, Error)]
pub enum OvmfVarsError {
    #[error(transparent)]
    Deserialization(#[from] DeserializationError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("Failed to open file {}: {source}", path.display())]
    FailedToOpenFile {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}
