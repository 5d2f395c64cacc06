use crate::err::{DeserializationError, DeserializationResult, SerializationResult};
use crate::guid::Guid;
use crate::guid_registry::EFI_AUTHENTICATED_VARIABLE_GUID;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Cursor, Write};

pub const VARIABLE_STORE_HEADER_SIZE: usize = 28;

pub const VARIABLE_STORE_FORMATTED: u8 = 0x5A;
pub const VARIABLE_STORE_HEALTHY: u8 = 0xFE;

pub const DEFAULT_STORE_LENGTH: u32 = 262_072;

/// `VARIABLE_STORE_HEADER` of an authenticated variable store.
///
/// Only formatted and healthy stores are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableStoreHeader {
    pub signature: Guid,
    /// Length of the store, this header included.
    pub size: u32,
    pub format: u8,
    pub state: u8,
    pub reserved: u16,
    pub reserved1: u32,
}

impl VariableStoreHeader {
    pub fn from_stream(stream: &mut Cursor<&[u8]>) -> DeserializationResult<VariableStoreHeader> {
        let signature = Guid::from_stream(stream, "variable store signature")?;
        let size = try_read!(stream, read_u32, "variable store size");
        let format = try_read!(stream, read_u8, "variable store format");
        let state = try_read!(stream, read_u8, "variable store state");
        let reserved = try_read!(stream, read_u16, "variable store reserved");
        let reserved1 = try_read!(stream, read_u32, "variable store reserved");

        if signature != EFI_AUTHENTICATED_VARIABLE_GUID {
            return Err(DeserializationError::UnexpectedStoreGuid { guid: signature });
        }

        if format != VARIABLE_STORE_FORMATTED {
            return Err(DeserializationError::UnexpectedStoreFormat { format });
        }

        if state != VARIABLE_STORE_HEALTHY {
            return Err(DeserializationError::UnexpectedStoreState { state });
        }

        Ok(VariableStoreHeader {
            signature,
            size,
            format,
            state,
            reserved,
            reserved1,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> SerializationResult<()> {
        self.signature.write_to(w)?;
        w.write_u32::<LittleEndian>(self.size)?;
        w.write_u8(self.format)?;
        w.write_u8(self.state)?;
        w.write_u16::<LittleEndian>(self.reserved)?;
        w.write_u32::<LittleEndian>(self.reserved1)?;
        Ok(())
    }

    pub fn create_default() -> VariableStoreHeader {
        VariableStoreHeader {
            signature: EFI_AUTHENTICATED_VARIABLE_GUID,
            size: DEFAULT_STORE_LENGTH,
            format: VARIABLE_STORE_FORMATTED,
            state: VARIABLE_STORE_HEALTHY,
            reserved: 0,
            reserved1: 0,
        }
    }
}

impl fmt::Display for VariableStoreHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Variable Store Header")?;
        writeln!(f, "=====================")?;
        writeln!(
            f,
            "Length:              {} bytes ({:.1} KiB)",
            self.size,
            f64::from(self.size) / 1024.0
        )?;
        writeln!(f, "Format:              {:#04x}", self.format)?;
        writeln!(f, "State:               {:#04x}", self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume_header::DEFAULT_HEADER_LENGTH;
    use pretty_assertions::assert_eq;

    fn encoded(header: &VariableStoreHeader) -> Vec<u8> {
        let mut out = vec![];
        header.write_to(&mut out).unwrap();
        out
    }

    #[test]
    fn test_parses_store_header_after_volume_header() {
        let image = include_bytes!("../samples/OVMF_VARS.sample.fd");
        let mut reader = Cursor::new(&image[..]);
        reader.set_position(u64::from(DEFAULT_HEADER_LENGTH));

        let header = VariableStoreHeader::from_stream(&mut reader).unwrap();
        assert_eq!(header, VariableStoreHeader::create_default());
        assert_eq!(
            reader.position(),
            u64::from(DEFAULT_HEADER_LENGTH) + VARIABLE_STORE_HEADER_SIZE as u64
        );
    }

    #[test]
    fn test_encodes_fixed_size() {
        assert_eq!(
            encoded(&VariableStoreHeader::create_default()).len(),
            VARIABLE_STORE_HEADER_SIZE
        );
    }

    #[test]
    fn test_rejects_unformatted_or_unhealthy_stores() {
        let mut raw = encoded(&VariableStoreHeader::create_default());
        raw[20] = 0xFF;
        let err = VariableStoreHeader::from_stream(&mut Cursor::new(&raw[..])).unwrap_err();
        assert!(matches!(
            err,
            DeserializationError::UnexpectedStoreFormat { format: 0xFF }
        ));

        let mut raw = encoded(&VariableStoreHeader::create_default());
        raw[21] = 0xFF;
        let err = VariableStoreHeader::from_stream(&mut Cursor::new(&raw[..])).unwrap_err();
        assert!(matches!(
            err,
            DeserializationError::UnexpectedStoreState { state: 0xFF }
        ));
    }

    #[test]
    fn test_rejects_non_authenticated_store() {
        let mut header = VariableStoreHeader::create_default();
        // gEfiVariableGuid, a store without authentication fields.
        header.signature = Guid::from_str_const("1636cfdd-7532-6441-98b6-fe85707ffe7d");

        let err =
            VariableStoreHeader::from_stream(&mut Cursor::new(&encoded(&header)[..])).unwrap_err();
        assert!(matches!(
            err,
            DeserializationError::UnexpectedStoreGuid { .. }
        ));
    }
}
