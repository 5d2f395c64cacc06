#![deny(unused_must_use)]
#![forbid(unsafe_code)]
#![doc = "Decoder and encoder for `OVMF_VARS.fd` UEFI authenticated variable store images."]

pub use document::{Document, VariableEntry, VariableMap};
pub use guid::Guid;
pub use guid_registry::GuidRegistry;
pub use image::ImageBuilder;
pub use parser::{IterVariables, VarStoreParser};
pub use store_header::VariableStoreHeader;
pub use uefi_time::UefiTime;
pub use variable::{AuthenticatedVariable, VariableAttributes, VariableState};
pub use volume_header::{BlockMapEntry, FirmwareVolumeHeader};

#[macro_use]
mod macros;

pub mod document;
pub mod err;
pub mod guid;
pub mod guid_registry;
pub mod hexdump;
pub mod image;
pub mod parser;
pub mod store_header;
pub mod uefi_time;
pub mod variable;
pub mod volume_header;
