use crate::err::{SerializationError, SerializationResult};
use crate::store_header::{VARIABLE_STORE_HEADER_SIZE, VariableStoreHeader};
use crate::variable::AuthenticatedVariable;
use crate::volume_header::{DEFAULT_VOLUME_LENGTH, FirmwareVolumeHeader};

use log::{debug, info, trace};
use std::io::{Cursor, Seek, SeekFrom, Write};

/// Size of a generated image.
pub const IMAGE_SIZE: usize = DEFAULT_VOLUME_LENGTH as usize;

/// Records must end before this offset, where the trailer starts.
pub const USABLE_REGION_END: usize = 0x41000;

/// Erased flash.
pub const ERASE_BYTE: u8 = 0xFF;

/// Fault tolerant write working block header, copied verbatim into every image.
pub const FTW_WORKING_BLOCK_HEADER: [u8; 32] = [
    0x2b, 0x29, 0x58, 0x9e, 0x68, 0x7c, 0x7d, 0x49, 0xa0, 0xce, 0x65, 0x00, 0xfd, 0x9f, 0x1b,
    0x95, 0x2c, 0xaf, 0x2c, 0x64, 0xfe, 0xff, 0xff, 0xff, 0xe0, 0x0f, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00,
];

/// Builds `OVMF_VARS` images around the default headers.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    volume_header: FirmwareVolumeHeader,
    store_header: VariableStoreHeader,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        ImageBuilder {
            volume_header: FirmwareVolumeHeader::create_default(),
            store_header: VariableStoreHeader::create_default(),
        }
    }
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset of the first record.
    pub fn variables_offset(&self) -> usize {
        self.volume_header.encoded_len() + VARIABLE_STORE_HEADER_SIZE
    }

    /// Bytes used by the headers and `variables`, each record padded to alignment.
    pub fn required_len(&self, variables: &[AuthenticatedVariable]) -> usize {
        self.variables_offset()
            + variables
                .iter()
                .map(AuthenticatedVariable::aligned_len)
                .sum::<usize>()
    }

    /// Assembles a complete image.
    ///
    /// Fails before anything is written if the records do not fit below
    /// [`USABLE_REGION_END`]. Records are laid out in the given order.
    pub fn assemble(&self, variables: &[AuthenticatedVariable]) -> SerializationResult<Vec<u8>> {
        let needed = self.required_len(variables);
        if needed > USABLE_REGION_END {
            return Err(SerializationError::Capacity {
                needed,
                limit: USABLE_REGION_END,
            });
        }

        let mut cursor = Cursor::new(vec![ERASE_BYTE; IMAGE_SIZE]);
        self.volume_header.write_to(&mut cursor)?;
        self.store_header.write_to(&mut cursor)?;

        for variable in variables {
            let start = cursor.position();
            variable.write_to(&mut cursor)?;
            // Padding is left as erased bytes.
            cursor.set_position(start + variable.aligned_len() as u64);
            trace!(
                "Offset {}: encoded variable `{}` ({} bytes)",
                start,
                variable.name,
                variable.encoded_len()
            );
        }
        debug!(
            "Wrote {} variables, {} of {} bytes used",
            variables.len(),
            cursor.position(),
            USABLE_REGION_END
        );

        cursor.seek(SeekFrom::Start(USABLE_REGION_END as u64))?;
        cursor.write_all(&FTW_WORKING_BLOCK_HEADER)?;

        info!("Assembled a {} byte image", IMAGE_SIZE);
        Ok(cursor.into_inner())
    }

    /// An image with an empty variable store.
    pub fn blank(&self) -> SerializationResult<Vec<u8>> {
        self.assemble(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guid_registry::EFI_GLOBAL_VARIABLE_GUID;
    use crate::parser::VarStoreParser;
    use crate::variable::VariableAttributes;
    use pretty_assertions::assert_eq;

    fn variable(name: &str, len: usize) -> AuthenticatedVariable {
        AuthenticatedVariable::new(
            EFI_GLOBAL_VARIABLE_GUID,
            name,
            vec![0xA5; len],
            VariableAttributes::NON_VOLATILE | VariableAttributes::BOOTSERVICE_ACCESS,
        )
        .unwrap()
    }

    #[test]
    fn test_blank_matches_reference_image() {
        let blank = ImageBuilder::new().blank().unwrap();
        assert_eq!(blank.len(), IMAGE_SIZE);
        assert!(blank[..] == include_bytes!("../samples/OVMF_VARS.blank.fd")[..]);
    }

    #[test]
    fn test_assembled_image_decodes_in_order() {
        let variables = vec![variable("Zeta", 1), variable("Alpha", 7), variable("Mid", 0)];
        let image = ImageBuilder::new().assemble(&variables).unwrap();

        assert_eq!(image.len(), IMAGE_SIZE);
        assert_eq!(&image[0x41000..0x41020], &FTW_WORKING_BLOCK_HEADER);
        assert!(image[0x41020..].iter().all(|&b| b == ERASE_BYTE));

        let parser = VarStoreParser::from_buffer(image).unwrap();
        assert_eq!(parser.collect_variables().unwrap(), variables);
    }

    #[test]
    fn test_padding_is_erased() {
        let image = ImageBuilder::new().assemble(&[variable("A", 1)]).unwrap();
        // 100 + 60 + 4 (name) + 1 (data), padded to 168.
        assert_eq!(&image[165..168], &[ERASE_BYTE; 3]);
        assert_eq!(&image[168..170], &[0xFF, 0xFF]);
    }

    #[test]
    fn test_capacity_boundary() {
        let builder = ImageBuilder::new();
        let offset = builder.variables_offset();
        // Header 60 + name "X" 4 bytes.
        let fill = |len| vec![variable("X", len)];

        let exact = USABLE_REGION_END - offset - 64;
        assert_eq!(builder.required_len(&fill(exact)), USABLE_REGION_END);
        let image = builder.assemble(&fill(exact)).unwrap();
        assert_eq!(
            VarStoreParser::from_buffer(image)
                .unwrap()
                .collect_variables()
                .unwrap(),
            fill(exact)
        );

        let err = builder.assemble(&fill(exact + 1)).unwrap_err();
        assert!(matches!(
            err,
            SerializationError::Capacity {
                needed,
                limit: USABLE_REGION_END
            } if needed == USABLE_REGION_END + 4
        ));
    }

    #[test]
    fn test_inconsistent_record_fails_assembly() {
        let mut broken = variable("Broken", 2);
        broken.data_size = 3;
        assert!(matches!(
            ImageBuilder::new().assemble(&[broken]),
            Err(SerializationError::DataSizeMismatch { .. })
        ));
    }
}
