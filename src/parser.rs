use crate::err::{DeserializationError, DeserializationResult, OvmfVarsError, Result};
use crate::image::USABLE_REGION_END;
use crate::store_header::VariableStoreHeader;
use crate::variable::AuthenticatedVariable;
use crate::volume_header::FirmwareVolumeHeader;

use log::{debug, trace};
use std::fs;
use std::io::Cursor;
use std::ops::Range;
use std::path::Path;

/// Decoder for a whole `OVMF_VARS` image.
///
/// Both headers are decoded (and validated) eagerly on construction,
/// variables are decoded lazily by [`VarStoreParser::variables`].
#[derive(Debug)]
pub struct VarStoreParser {
    data: Vec<u8>,
    volume_header: FirmwareVolumeHeader,
    store_header: VariableStoreHeader,
    variable_region: Range<u64>,
}

impl VarStoreParser {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| OvmfVarsError::FailedToOpenFile {
            source,
            path: path.to_path_buf(),
        })?;

        Ok(Self::from_buffer(data)?)
    }

    pub fn from_buffer(data: Vec<u8>) -> DeserializationResult<Self> {
        let mut cursor = Cursor::new(&data[..]);

        let volume_header = FirmwareVolumeHeader::from_stream(&mut cursor)?;
        debug!("Volume header: {:?}", volume_header);

        let store_start = cursor.position();
        let store_header = VariableStoreHeader::from_stream(&mut cursor)?;
        debug!("Store header: {:?}", store_header);

        // Records may extend past the declared store end up to the trailer.
        let declared_end = store_start + u64::from(store_header.size);
        let variable_region =
            cursor.position()..(USABLE_REGION_END as u64).min(data.len() as u64);
        debug!(
            "Variable region spans {:#x}..{:#x} (declared store end {:#x})",
            variable_region.start, variable_region.end, declared_end
        );

        Ok(VarStoreParser {
            data,
            volume_header,
            store_header,
            variable_region,
        })
    }

    pub fn volume_header(&self) -> &FirmwareVolumeHeader {
        &self.volume_header
    }

    pub fn store_header(&self) -> &VariableStoreHeader {
        &self.store_header
    }

    /// Byte range of the image scanned for variable records.
    pub fn variable_region(&self) -> Range<u64> {
        self.variable_region.clone()
    }

    /// Every record in on-disk order, deleted ones included.
    pub fn variables(&self) -> IterVariables<'_> {
        let mut cursor = Cursor::new(&self.data[..]);
        cursor.set_position(self.variable_region.start);

        IterVariables {
            cursor,
            region: self.variable_region.clone(),
            state: ScanState::Scanning,
            decoded: 0,
        }
    }

    /// Decodes all records, failing on the first malformed one.
    pub fn collect_variables(&self) -> DeserializationResult<Vec<AuthenticatedVariable>> {
        self.variables().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Scanning,
    Done,
}

/// Iterator over the variable records of an image.
///
/// Ends at the erased sentinel or at the end of the variable region.
/// After an error it yields nothing further.
pub struct IterVariables<'a> {
    cursor: Cursor<&'a [u8]>,
    region: Range<u64>,
    state: ScanState,
    decoded: usize,
}

impl Iterator for IterVariables<'_> {
    type Item = std::result::Result<AuthenticatedVariable, DeserializationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == ScanState::Done {
            return None;
        }

        match AuthenticatedVariable::from_stream(&mut self.cursor, &self.region) {
            Ok(Some(variable)) => {
                self.decoded += 1;
                Some(Ok(variable))
            }
            Ok(None) => {
                self.state = ScanState::Done;
                debug!(
                    "Scan finished at offset {:#x} after {} variables",
                    self.cursor.position(),
                    self.decoded
                );
                None
            }
            Err(e) => {
                trace!("Scan aborted after {} variables", self.decoded);
                self.state = ScanState::Done;
                Some(Err(e))
            }
        }
    }
}

impl std::iter::FusedIterator for IterVariables<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume_header::DEFAULT_HEADER_LENGTH;
    use pretty_assertions::assert_eq;

    fn sample() -> VarStoreParser {
        VarStoreParser::from_buffer(include_bytes!("../samples/OVMF_VARS.sample.fd").to_vec())
            .unwrap()
    }

    #[test]
    fn test_variable_region_follows_store_header() {
        let parser = sample();
        assert_eq!(parser.variable_region(), 100..USABLE_REGION_END as u64);
        assert_eq!(
            u64::from(DEFAULT_HEADER_LENGTH) + u64::from(parser.store_header().size),
            0x40000
        );
    }

    #[test]
    fn test_records_past_declared_store_end_are_decoded() {
        use crate::guid_registry::EFI_GLOBAL_VARIABLE_GUID;
        use crate::image::ImageBuilder;
        use crate::variable::{AuthenticatedVariable, VariableAttributes};

        let variable = |name: &str, len: usize| {
            AuthenticatedVariable::new(
                EFI_GLOBAL_VARIABLE_GUID,
                name,
                vec![0x5A; len],
                VariableAttributes::NON_VOLATILE | VariableAttributes::BOOTSERVICE_ACCESS,
            )
            .unwrap()
        };

        // "Big" ends 200 bytes before 0x40000, so "Tail" straddles the declared end.
        let straddling = vec![
            variable("Big", 0x40000 - 100 - 68 - 200),
            variable("Tail", 300),
            variable("After", 8),
        ];
        // "Lost" starts 40 bytes before 0x40000, too close for a whole header.
        let beyond = vec![variable("Big", 0x40000 - 100 - 68 - 40), variable("Lost", 16)];

        for variables in [straddling, beyond] {
            let image = ImageBuilder::new().assemble(&variables).unwrap();
            let parser = VarStoreParser::from_buffer(image).unwrap();
            assert_eq!(parser.collect_variables().unwrap(), variables);
        }
    }

    #[test]
    fn test_iterates_all_records_in_disk_order() {
        let names: Vec<String> = sample()
            .variables()
            .map(|v| v.unwrap().name)
            .collect();

        assert_eq!(
            names,
            [
                "BootOrder",
                "Boot0000",
                "Timeout",
                "Timeout",
                "MemoryTypeInformation",
                "SecureBootEnable",
                "certdb",
                "MTC",
                "Odd"
            ]
        );
    }

    #[test]
    fn test_iterator_is_fused_after_error() {
        let mut image = include_bytes!("../samples/OVMF_VARS.sample.fd").to_vec();
        // Second record (Boot0000) starts at 184.
        image[184] = 0x12;
        image[185] = 0x34;

        let parser = VarStoreParser::from_buffer(image).unwrap();
        let mut iter = parser.variables();

        assert!(iter.next().unwrap().is_ok());
        assert!(matches!(
            iter.next(),
            Some(Err(DeserializationError::InvalidVariableMagic {
                magic: 0x3412,
                offset: 184
            }))
        ));
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
        assert!(parser.collect_variables().is_err());
    }

    #[test]
    fn test_truncated_input_clamps_region() {
        let mut image = include_bytes!("../samples/OVMF_VARS.sample.fd").to_vec();
        // Cut in the middle of the second record's name.
        image.truncate(250);

        let parser = VarStoreParser::from_buffer(image).unwrap();
        assert_eq!(parser.variable_region(), 100..250);

        let results: Vec<_> = parser.variables().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(DeserializationError::Truncated { .. })
        ));
    }

    #[test]
    fn test_rejects_images_with_foreign_headers() {
        let mut image = include_bytes!("../samples/OVMF_VARS.sample.fd").to_vec();
        image[40] = 0;
        assert!(matches!(
            VarStoreParser::from_buffer(image),
            Err(DeserializationError::InvalidVolumeSignature { .. })
        ));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = VarStoreParser::from_path("/nonexistent/OVMF_VARS.fd").unwrap_err();
        assert!(matches!(err, OvmfVarsError::FailedToOpenFile { .. }));
        assert!(err.to_string().contains("/nonexistent/OVMF_VARS.fd"));
    }
}
