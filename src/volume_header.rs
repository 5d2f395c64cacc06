use crate::err::{DeserializationError, DeserializationResult, SerializationResult};
use crate::guid::Guid;
use crate::guid_registry::{EFI_SYSTEM_NV_DATA_FV_GUID, GuidRegistry};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::trace;
use std::fmt;
use std::io::{Cursor, Write};

/// `_FVH`
pub const FVH_SIGNATURE: u32 = 0x4856_465F;
pub const FVH_REVISION: u8 = 0x02;

/// Size of the fixed part, before the block map.
pub const FVH_FIXED_SIZE: usize = 56;
pub const BLOCK_MAP_ENTRY_SIZE: usize = 8;

pub const DEFAULT_VOLUME_LENGTH: u64 = 528 * 1024;
pub const DEFAULT_ATTRIBUTES: u32 = 0x0004_FEFF;
pub const DEFAULT_HEADER_LENGTH: u16 = 72;
pub const DEFAULT_CHECKSUM: u16 = 0xB8AF;
pub const DEFAULT_BLOCK_MAP: [BlockMapEntry; 1] = [BlockMapEntry {
    num_blocks: 132,
    block_length: 4096,
}];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMapEntry {
    pub num_blocks: u32,
    pub block_length: u32,
}

impl BlockMapEntry {
    fn is_terminator(&self) -> bool {
        self.num_blocks == 0 && self.block_length == 0
    }
}

/// `EFI_FIRMWARE_VOLUME_HEADER` of the NV data volume.
///
/// The checksum is kept as found and never verified or recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareVolumeHeader {
    pub zero_vector: [u8; 16],
    pub file_system_guid: Guid,
    pub volume_length: u64,
    pub signature: u32,
    pub attributes: u32,
    pub header_length: u16,
    pub checksum: u16,
    pub ext_header_offset: u16,
    pub reserved: u8,
    pub revision: u8,
    /// Entries before the `(0, 0)` terminator.
    pub block_map: Vec<BlockMapEntry>,
}

impl FirmwareVolumeHeader {
    pub fn from_stream(stream: &mut Cursor<&[u8]>) -> DeserializationResult<FirmwareVolumeHeader> {
        let zero_vector = try_read_array!(stream, 16, "volume zero vector");
        let file_system_guid = Guid::from_stream(stream, "volume file system guid")?;
        let volume_length = try_read!(stream, read_u64, "volume length");
        let signature = try_read!(stream, read_u32, "volume signature");
        let attributes = try_read!(stream, read_u32, "volume attributes");
        let header_length = try_read!(stream, read_u16, "volume header length");
        let checksum = try_read!(stream, read_u16, "volume checksum");
        let ext_header_offset = try_read!(stream, read_u16, "volume ext header offset");
        let reserved = try_read!(stream, read_u8, "volume reserved");
        let revision = try_read!(stream, read_u8, "volume revision");

        if signature != FVH_SIGNATURE {
            return Err(DeserializationError::InvalidVolumeSignature { magic: signature });
        }

        if file_system_guid != EFI_SYSTEM_NV_DATA_FV_GUID {
            return Err(DeserializationError::UnexpectedVolumeGuid {
                guid: file_system_guid,
            });
        }

        // The map has no count, it runs until a (0, 0) pair.
        // Running off the end of the input fails the read instead of looping.
        let mut block_map = vec![];
        loop {
            let entry = BlockMapEntry {
                num_blocks: try_read!(stream, read_u32, "block map entry"),
                block_length: try_read!(stream, read_u32, "block map entry"),
            };
            if entry.is_terminator() {
                break;
            }
            trace!("Block map entry: {:?}", entry);
            block_map.push(entry);
        }

        Ok(FirmwareVolumeHeader {
            zero_vector,
            file_system_guid,
            volume_length,
            signature,
            attributes,
            header_length,
            checksum,
            ext_header_offset,
            reserved,
            revision,
            block_map,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> SerializationResult<()> {
        w.write_all(&self.zero_vector)?;
        self.file_system_guid.write_to(w)?;
        w.write_u64::<LittleEndian>(self.volume_length)?;
        w.write_u32::<LittleEndian>(self.signature)?;
        w.write_u32::<LittleEndian>(self.attributes)?;
        w.write_u16::<LittleEndian>(self.header_length)?;
        w.write_u16::<LittleEndian>(self.checksum)?;
        w.write_u16::<LittleEndian>(self.ext_header_offset)?;
        w.write_u8(self.reserved)?;
        w.write_u8(self.revision)?;

        for entry in self.block_map.iter() {
            w.write_u32::<LittleEndian>(entry.num_blocks)?;
            w.write_u32::<LittleEndian>(entry.block_length)?;
        }
        w.write_u32::<LittleEndian>(0)?;
        w.write_u32::<LittleEndian>(0)?;

        Ok(())
    }

    /// Encoded size, including the terminating block map pair.
    pub fn encoded_len(&self) -> usize {
        FVH_FIXED_SIZE + (self.block_map.len() + 1) * BLOCK_MAP_ENTRY_SIZE
    }

    /// The header of a blank 528 KiB `OVMF_VARS.fd`.
    pub fn create_default() -> FirmwareVolumeHeader {
        FirmwareVolumeHeader {
            zero_vector: [0; 16],
            file_system_guid: EFI_SYSTEM_NV_DATA_FV_GUID,
            volume_length: DEFAULT_VOLUME_LENGTH,
            signature: FVH_SIGNATURE,
            attributes: DEFAULT_ATTRIBUTES,
            header_length: DEFAULT_HEADER_LENGTH,
            checksum: DEFAULT_CHECKSUM,
            ext_header_offset: 0,
            reserved: 0,
            revision: FVH_REVISION,
            block_map: DEFAULT_BLOCK_MAP.to_vec(),
        }
    }

    pub fn display_with<'a>(&'a self, registry: &'a GuidRegistry) -> DisplayVolumeHeader<'a> {
        DisplayVolumeHeader {
            header: self,
            registry,
        }
    }
}

pub struct DisplayVolumeHeader<'a> {
    header: &'a FirmwareVolumeHeader,
    registry: &'a GuidRegistry,
}

impl fmt::Display for DisplayVolumeHeader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = self.header;
        writeln!(f, "Firmware Volume Header")?;
        writeln!(f, "======================")?;
        writeln!(f, "UUID:                {}", self.registry.resolve(&h.file_system_guid))?;
        writeln!(
            f,
            "FV Length:           {} bytes ({} KiB)",
            h.volume_length,
            h.volume_length as f64 / 1024.0
        )?;
        writeln!(f, "Flags:               {:#010x}", h.attributes)?;
        writeln!(f, "Header Length:       {} bytes", h.header_length)?;
        writeln!(f, "Checksum:            {:#06x}", h.checksum)?;
        writeln!(f, "Ext. Header Offset:  {:#x}", h.ext_header_offset)?;
        writeln!(f, "Revision:            {}", h.revision)?;
        writeln!(f)?;
        writeln!(f, "Blocks:")?;
        for entry in h.block_map.iter() {
            writeln!(
                f,
                "  {} * {} byte blocks ({} KiB total)",
                entry.num_blocks,
                entry.block_length,
                (u64::from(entry.num_blocks) * u64::from(entry.block_length)) as f64 / 1024.0
            )?;
        }
        Ok(())
    }
}
