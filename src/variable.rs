use crate::err::{
    DeserializationError, DeserializationResult, DocumentError, DocumentResult,
    SerializationError, SerializationResult,
};
use crate::guid::Guid;
use crate::guid_registry::GuidRegistry;
use crate::hexdump::write_hexdump;
use crate::uefi_time::UefiTime;

use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{trace, warn};
use std::fmt;
use std::io::{Cursor, Write};
use std::ops::Range;

/// `VARIABLE_DATA`, the start id of every record.
pub const VARIABLE_DATA: u16 = 0x55AA;
/// Erased flash, the end of the used part of the store.
pub const VARIABLE_ERASED: u16 = 0xFFFF;

/// Size of `AUTHENTICATED_VARIABLE_HEADER`, before the name.
pub const AUTHENTICATED_VARIABLE_HEADER_SIZE: usize = 60;
pub const VARIABLE_ALIGNMENT: u64 = 4;

bitflags! {
    /// `EFI_VARIABLE_*` attribute bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VariableAttributes: u32 {
        const NON_VOLATILE = 0x0000_0001;
        const BOOTSERVICE_ACCESS = 0x0000_0002;
        const RUNTIME_ACCESS = 0x0000_0004;
        const HARDWARE_ERROR_RECORD = 0x0000_0008;
        const AUTHENTICATED_WRITE_ACCESS = 0x0000_0010;
        const TIME_BASED_AUTHENTICATED_WRITE_ACCESS = 0x0000_0020;
        const APPEND_WRITE = 0x0000_0040;
    }
}

impl VariableAttributes {
    /// Bits outside of the named set.
    pub fn residual(&self) -> u32 {
        self.bits() & !Self::all().bits()
    }
}

bitflags! {
    /// Record state, in inverted form.
    ///
    /// Flash can only clear bits, so the stored byte starts as 0xFF and each
    /// transition clears one more bit. Inverting it gives a set of reached states.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VariableState: u8 {
        const IN_DELETED_TRANSITION = 0x01;
        const DELETED = 0x02;
        const HEADER_VALID_ONLY = 0x80;
        const ADDED = 0x40;
    }
}

/// Decomposition order used when describing a state.
const STATE_NAMES: [(&str, VariableState); 4] = [
    ("VAR_IN_DELETED_TRANSITION", VariableState::IN_DELETED_TRANSITION),
    ("VAR_DELETED", VariableState::DELETED),
    ("VAR_HEADER_VALID_ONLY", VariableState::HEADER_VALID_ONLY),
    ("VAR_ADDED", VariableState::ADDED),
];

/// Stored state byte of a valid, added and not deleted record (0x3F).
pub const VAR_ADDED_STATE: u8 = !VariableState::ADDED
    .union(VariableState::HEADER_VALID_ONLY)
    .bits();

/// One `AUTHENTICATED_VARIABLE_HEADER` record with its name and payload.
///
/// `name_size` and `data_size` are the declared sizes and are kept as read;
/// they are checked against `name` and `data` when encoding, never re-derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedVariable {
    pub state: u8,
    pub reserved: u8,
    pub attributes: VariableAttributes,
    pub monotonic_count: u64,
    pub timestamp: UefiTime,
    pub pubkey_index: u32,
    pub name_size: u32,
    pub data_size: u32,
    pub vendor_guid: Guid,
    pub name: String,
    pub data: Vec<u8>,
}

/// Byte size of `name` as stored: UTF-16LE code units plus the NUL terminator.
pub fn encoded_name_size(name: &str) -> usize {
    (name.encode_utf16().count() + 1) * 2
}

impl AuthenticatedVariable {
    /// A freshly added record with no timestamp and no authentication data.
    pub fn new(
        vendor_guid: Guid,
        name: impl Into<String>,
        data: Vec<u8>,
        attributes: VariableAttributes,
    ) -> DocumentResult<AuthenticatedVariable> {
        let name = name.into();
        let too_large = |what, len| DocumentError::TooLarge {
            name: name.clone(),
            what,
            len,
        };

        let name_len = encoded_name_size(&name);
        let name_size = u32::try_from(name_len).map_err(|_| too_large("name", name_len))?;
        let data_size = u32::try_from(data.len()).map_err(|_| too_large("data", data.len()))?;

        Ok(AuthenticatedVariable {
            state: VAR_ADDED_STATE,
            reserved: 0,
            attributes,
            monotonic_count: 0,
            timestamp: UefiTime::default(),
            pubkey_index: 0,
            name_size,
            data_size,
            vendor_guid,
            name,
            data,
        })
    }

    /// Decodes the record at the cursor.
    ///
    /// Returns `Ok(None)` at the end of the used store: an erased (0xFFFF) start
    /// id, or fewer than a header's worth of bytes left in `region`.
    /// Any other start id than 0x55AA is an error, never skipped.
    /// On success the cursor is left 4-byte aligned relative to `region.start`.
    pub fn from_stream(
        stream: &mut Cursor<&[u8]>,
        region: &Range<u64>,
    ) -> DeserializationResult<Option<AuthenticatedVariable>> {
        let offset = stream.position();

        if region.end.saturating_sub(offset) < AUTHENTICATED_VARIABLE_HEADER_SIZE as u64 {
            trace!("Offset {}: end of variable region reached", offset);
            return Ok(None);
        }

        let magic = try_read!(stream, read_u16, "variable start id");
        if magic == VARIABLE_ERASED {
            trace!("Offset {}: erased start id, no more variables", offset);
            return Ok(None);
        }
        if magic != VARIABLE_DATA {
            return Err(DeserializationError::InvalidVariableMagic { magic, offset });
        }

        let state = try_read!(stream, read_u8, "variable state");
        let reserved = try_read!(stream, read_u8, "variable reserved");
        let attributes =
            VariableAttributes::from_bits_retain(try_read!(stream, read_u32, "variable attributes"));
        let monotonic_count = try_read!(stream, read_u64, "variable monotonic count");
        let timestamp = UefiTime::from_stream(stream)?;
        let pubkey_index = try_read!(stream, read_u32, "variable public key index");
        let name_size = try_read!(stream, read_u32, "variable name size");
        let data_size = try_read!(stream, read_u32, "variable data size");
        let vendor_guid = Guid::from_stream(stream, "variable vendor guid")?;

        let name_offset = stream.position();
        let name_bytes = take_bytes(stream, name_size, "name", region.end)?;
        let name = decode_name(name_bytes)
            .ok_or(DeserializationError::InvalidVariableName {
                offset: name_offset,
            })?;
        let data = take_bytes(stream, data_size, "data", region.end)?.to_vec();

        // Filler up to the next record, its content is meaningless.
        let consumed = stream.position() - region.start;
        let padding = (VARIABLE_ALIGNMENT - consumed % VARIABLE_ALIGNMENT) % VARIABLE_ALIGNMENT;
        let next = stream.position() + padding;
        if next > region.end {
            warn!(
                "Offset {}: variable `{}` padding runs past the end of the store",
                offset, name
            );
        }
        stream.set_position(next.min(region.end));

        let variable = AuthenticatedVariable {
            state,
            reserved,
            attributes,
            monotonic_count,
            timestamp,
            pubkey_index,
            name_size,
            data_size,
            vendor_guid,
            name,
            data,
        };
        trace!(
            "Offset {}: decoded variable `{}` ({} data bytes)",
            offset, variable.name, variable.data_size
        );

        Ok(Some(variable))
    }

    /// Encodes the header, the NUL terminated name and the payload.
    ///
    /// Alignment padding before the next record is left to the caller.
    pub fn write_to<W: Write>(&self, w: &mut W) -> SerializationResult<()> {
        let name_len = encoded_name_size(&self.name);
        if self.name_size as usize != name_len {
            return Err(SerializationError::NameSizeMismatch {
                name: self.name.clone(),
                declared: self.name_size,
                actual: name_len,
            });
        }

        if self.data_size as usize != self.data.len() {
            return Err(SerializationError::DataSizeMismatch {
                name: self.name.clone(),
                declared: self.data_size,
                actual: self.data.len(),
            });
        }

        w.write_u16::<LittleEndian>(VARIABLE_DATA)?;
        w.write_u8(self.state)?;
        w.write_u8(self.reserved)?;
        w.write_u32::<LittleEndian>(self.attributes.bits())?;
        w.write_u64::<LittleEndian>(self.monotonic_count)?;
        self.timestamp.write_to(w)?;
        w.write_u32::<LittleEndian>(self.pubkey_index)?;
        w.write_u32::<LittleEndian>(self.name_size)?;
        w.write_u32::<LittleEndian>(self.data_size)?;
        self.vendor_guid.write_to(w)?;

        for unit in self.name.encode_utf16() {
            w.write_u16::<LittleEndian>(unit)?;
        }
        w.write_u16::<LittleEndian>(0)?;
        w.write_all(&self.data)?;

        Ok(())
    }

    /// Size of the record as declared by its header, without trailing padding.
    pub fn encoded_len(&self) -> usize {
        AUTHENTICATED_VARIABLE_HEADER_SIZE + self.name_size as usize + self.data_size as usize
    }

    /// Size of the record followed by its padding.
    pub fn aligned_len(&self) -> usize {
        align_up(self.encoded_len())
    }

    pub fn inverted_state(&self) -> VariableState {
        VariableState::from_bits_retain(!self.state)
    }

    pub fn is_deleted(&self) -> bool {
        self.inverted_state().contains(VariableState::DELETED)
    }

    /// The state as `VAR_*` names joined with ` | `, unknown bits in hex.
    pub fn state_description(&self) -> String {
        let mut state = self.inverted_state();
        let mut parts = vec![];

        for (name, mask) in STATE_NAMES {
            if state.contains(mask) {
                parts.push(name.to_owned());
                state.remove(mask);
            }
        }

        if !state.is_empty() {
            parts.push(format!("{:#x}", state.bits()));
        }

        parts.join(" | ")
    }

    /// The attributes as space separated `EFI_VARIABLE_*` suffixes.
    pub fn attributes_description(&self) -> String {
        let mut text = self
            .attributes
            .iter_names()
            .map(|(name, _)| name)
            .collect::<Vec<_>>()
            .join(" ");

        let residual = self.attributes.residual();
        if residual != 0 {
            text.push_str(&format!(" {:#010x}", residual));
        }

        text
    }

    pub fn display_with<'a>(&'a self, registry: &'a GuidRegistry) -> DisplayVariable<'a> {
        DisplayVariable {
            variable: self,
            registry,
        }
    }
}

pub(crate) fn align_up(len: usize) -> usize {
    let alignment = VARIABLE_ALIGNMENT as usize;
    len.div_ceil(alignment) * alignment
}

fn take_bytes<'a>(
    stream: &mut Cursor<&'a [u8]>,
    len: u32,
    what: &'static str,
    end: u64,
) -> DeserializationResult<&'a [u8]> {
    let start = stream.position();
    let have = end.saturating_sub(start);
    let truncated = || DeserializationError::Truncated {
        what,
        offset: start,
        need: len as usize,
        have: have as usize,
    };

    if u64::from(len) > have {
        return Err(truncated());
    }

    let buf: &'a [u8] = *stream.get_ref();
    let bytes = buf
        .get(start as usize..start as usize + len as usize)
        .ok_or_else(truncated)?;
    stream.set_position(start + u64::from(len));

    Ok(bytes)
}

/// UTF-16LE, trailing NULs dropped. `None` on odd length or unpaired surrogates.
fn decode_name(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }

    let mut units = vec![0_u16; bytes.len() / 2];
    LittleEndian::read_u16_into(bytes, &mut units);

    let name = String::from_utf16(&units).ok()?;
    Some(name.trim_end_matches('\0').to_owned())
}

pub struct DisplayVariable<'a> {
    variable: &'a AuthenticatedVariable,
    registry: &'a GuidRegistry,
}

impl fmt::Display for DisplayVariable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.variable;
        writeln!(f, "Authenticated Variable")?;
        writeln!(f, "======================")?;
        writeln!(f, "Name:                {:?}", v.name)?;
        writeln!(f, "Vendor UUID:         {}", self.registry.resolve(&v.vendor_guid))?;
        writeln!(f, "Monotonic Count:     {}", v.monotonic_count)?;
        writeln!(f, "Public Key Index:    {}", v.pubkey_index)?;
        writeln!(f, "State:               {}", v.state_description())?;
        writeln!(f, "Flags:               {}", v.attributes_description())?;
        if !v.timestamp.is_unset() {
            writeln!(f, "Timestamp:           {}", v.timestamp)?;
        }
        writeln!(f, "Data Length:         {} bytes", v.data_size)?;
        write_hexdump(f, &v.data, true)
    }
}
