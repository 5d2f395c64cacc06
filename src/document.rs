//! Structured, human-editable form of a variable store.
//!
//! ```yaml
//! Variables:
//!   gEfiGlobalVariableGuid:
//!     BootOrder:
//!       Data: AAABAA==
//!       Boot Access: true
//!       Runtime Access: true
//! ```
//!
//! Only live variables are exported. Fields holding their default value are
//! omitted, and filled back in on import.

use crate::err::{DocumentError, DocumentResult};
use crate::guid::Guid;
use crate::guid_registry::GuidRegistry;
use crate::uefi_time::UefiTime;
use crate::variable::{AuthenticatedVariable, VariableAttributes};

use indexmap::IndexMap;
use jiff::Timestamp;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

/// Variable name to entry, in document order.
pub type VariableMap = IndexMap<String, VariableEntry>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Vendor name (or GUID) to variable name to entry.
    #[serde(rename = "Variables", default)]
    pub variables: IndexMap<String, VariableMap>,
}

/// One variable. Every field except `Data` is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableEntry {
    #[serde(rename = "Data", with = "base64_data")]
    pub data: Vec<u8>,

    #[serde(rename = "Monotonic Count", default, skip_serializing_if = "is_zero")]
    pub monotonic_count: u64,

    #[serde(rename = "Public Key Index", default, skip_serializing_if = "is_zero")]
    pub public_key_index: u32,

    /// Set when the `NON_VOLATILE` attribute is *not*.
    #[serde(rename = "Volatile", default, skip_serializing_if = "is_false")]
    pub volatile: bool,

    #[serde(rename = "Boot Access", default, skip_serializing_if = "is_false")]
    pub boot_access: bool,

    #[serde(rename = "Runtime Access", default, skip_serializing_if = "is_false")]
    pub runtime_access: bool,

    #[serde(rename = "Hardware Error Record", default, skip_serializing_if = "is_false")]
    pub hardware_error_record: bool,

    #[serde(
        rename = "Authenticated Write Access",
        default,
        skip_serializing_if = "is_false"
    )]
    pub authenticated_write_access: bool,

    #[serde(
        rename = "Time Based Authenticated Write Access",
        default,
        skip_serializing_if = "is_false"
    )]
    pub time_based_authenticated_write_access: bool,

    #[serde(rename = "Append Write", default, skip_serializing_if = "is_false")]
    pub append_write: bool,

    /// Attribute bits without a name of their own.
    #[serde(rename = "Flags", default, skip_serializing_if = "is_zero")]
    pub flags: u32,

    #[serde(rename = "Timestamp", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

fn is_zero<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl VariableEntry {
    pub fn from_variable(variable: &AuthenticatedVariable) -> DocumentResult<VariableEntry> {
        let attributes = variable.attributes;
        let timestamp = variable.timestamp.to_timestamp().map_err(|source| {
            DocumentError::InvalidTimestamp {
                name: variable.name.clone(),
                source,
            }
        })?;

        Ok(VariableEntry {
            data: variable.data.clone(),
            monotonic_count: variable.monotonic_count,
            public_key_index: variable.pubkey_index,
            volatile: !attributes.contains(VariableAttributes::NON_VOLATILE),
            boot_access: attributes.contains(VariableAttributes::BOOTSERVICE_ACCESS),
            runtime_access: attributes.contains(VariableAttributes::RUNTIME_ACCESS),
            hardware_error_record: attributes.contains(VariableAttributes::HARDWARE_ERROR_RECORD),
            authenticated_write_access: attributes
                .contains(VariableAttributes::AUTHENTICATED_WRITE_ACCESS),
            time_based_authenticated_write_access: attributes
                .contains(VariableAttributes::TIME_BASED_AUTHENTICATED_WRITE_ACCESS),
            append_write: attributes.contains(VariableAttributes::APPEND_WRITE),
            flags: attributes.residual(),
            timestamp,
        })
    }

    /// Attribute bits described by this entry.
    ///
    /// Named flags are added on top of `Flags`, never cleared from it.
    pub fn attributes(&self) -> VariableAttributes {
        let mut attributes = VariableAttributes::from_bits_retain(self.flags);
        let named = [
            (VariableAttributes::NON_VOLATILE, !self.volatile),
            (VariableAttributes::BOOTSERVICE_ACCESS, self.boot_access),
            (VariableAttributes::RUNTIME_ACCESS, self.runtime_access),
            (
                VariableAttributes::HARDWARE_ERROR_RECORD,
                self.hardware_error_record,
            ),
            (
                VariableAttributes::AUTHENTICATED_WRITE_ACCESS,
                self.authenticated_write_access,
            ),
            (
                VariableAttributes::TIME_BASED_AUTHENTICATED_WRITE_ACCESS,
                self.time_based_authenticated_write_access,
            ),
            (VariableAttributes::APPEND_WRITE, self.append_write),
        ];

        for (flag, enabled) in named {
            if enabled {
                attributes.insert(flag);
            }
        }
        attributes
    }

    /// Lifts the entry into a freshly added record.
    pub fn to_variable(&self, vendor: Guid, name: &str) -> DocumentResult<AuthenticatedVariable> {
        let mut variable =
            AuthenticatedVariable::new(vendor, name, self.data.clone(), self.attributes())?;
        variable.monotonic_count = self.monotonic_count;
        variable.pubkey_index = self.public_key_index;

        if let Some(timestamp) = self.timestamp {
            variable.timestamp = UefiTime::from_timestamp(timestamp).ok_or_else(|| {
                DocumentError::UnrepresentableTimestamp {
                    name: name.to_owned(),
                    timestamp,
                }
            })?;
        }

        Ok(variable)
    }
}

impl Document {
    /// Groups the live records by vendor, then by name, in order of appearance.
    ///
    /// A later record with the same vendor and name replaces the earlier one in place.
    pub fn from_variables<'a>(
        variables: impl IntoIterator<Item = &'a AuthenticatedVariable>,
        registry: &GuidRegistry,
    ) -> DocumentResult<Document> {
        let mut document = Document::default();
        let mut skipped = 0;

        for variable in variables {
            if variable.is_deleted() {
                trace!("Skipping deleted variable `{}`", variable.name);
                skipped += 1;
                continue;
            }

            let vendor = registry.resolve(&variable.vendor_guid);
            let entry = VariableEntry::from_variable(variable)?;
            let vendor_variables = document.variables.entry(vendor.to_string()).or_default();

            if vendor_variables.insert(variable.name.clone(), entry).is_some() {
                warn!(
                    "Variable `{}` of vendor `{}` appears more than once, keeping the last one",
                    variable.name, vendor
                );
            }
        }

        debug!(
            "Exported {} vendors, skipped {} deleted variables",
            document.variables.len(),
            skipped
        );
        Ok(document)
    }

    /// Lifts every entry into a record, in document order.
    pub fn to_variables(&self, registry: &GuidRegistry) -> DocumentResult<Vec<AuthenticatedVariable>> {
        let mut variables = vec![];

        for (vendor, entries) in &self.variables {
            let guid = registry.lookup(vendor)?;
            for (name, entry) in entries {
                variables.push(entry.to_variable(guid, name)?);
            }
        }

        debug!("Imported {} variables", variables.len());
        Ok(variables)
    }
}

/// de/serialize a `Vec<u8>` to/from a base64 encoded string.
///
/// Whitespace inside the string is ignored, so folded multi-line payloads read back.
mod base64_data {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ptr_arg)] // required by serde
    pub fn serialize<S: Serializer>(v: &Vec<u8>, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        let compact: String = s.split_whitespace().collect();
        STANDARD.decode(compact).map_err(serde::de::Error::custom)
    }
}
