//! Display names for well-known vendor and header GUIDs.
//!
//! The registry is built once and only read afterwards; decoders, printers and the
//! document mapper take it by reference.

use crate::err::{DocumentError, DocumentResult};
use crate::guid::Guid;

use std::borrow::Cow;
use std::sync::LazyLock;

pub const EFI_SYSTEM_NV_DATA_FV_GUID: Guid =
    Guid::from_str_const("8d2bf1ff-9676-8b4c-a985-2747075b4f50");
pub const EFI_AUTHENTICATED_VARIABLE_GUID: Guid =
    Guid::from_str_const("782cf3aa-7b94-9a43-a180-2e144ec37792");
pub const EFI_GLOBAL_VARIABLE_GUID: Guid =
    Guid::from_str_const("61dfe48b-ca93-d211-aa0d-00e098032b8c");

const KNOWN_GUIDS: &[(Guid, &str)] = &[
    (EFI_SYSTEM_NV_DATA_FV_GUID, "gEfiSystemNvDataFvGuid"),
    (EFI_AUTHENTICATED_VARIABLE_GUID, "gEfiAuthenticatedVariableGuid"),
    (
        Guid::from_str_const("e87fb304-aef6-0b48-bdd5-37d98c5e89aa"),
        "gEdkiiVarErrorFlagGuid",
    ),
    (
        Guid::from_str_const("9f04194c-3741-d34d-9c10-8b97a83ffdfa"),
        "gEfiMemoryTypeInformationGuid",
    ),
    (
        Guid::from_str_const("114070eb-0214-d311-8e77-00a0c969723b"),
        "gMtcVendorGuid",
    ),
    (EFI_GLOBAL_VARIABLE_GUID, "gEfiGlobalVariableGuid"),
    (
        Guid::from_str_const("45493259-44ec-0d4c-b1cd-9db139df070c"),
        "gEfiIscsiInitiatorNameProtocolGuid",
    ),
    (
        Guid::from_str_const("d16e445b-0be3-aa4f-871a-3654eca36080"),
        "gEfiIp4Config2ProtocolGuid",
    ),
    (
        Guid::from_str_const("cbb219d7-3a3d-9645-a3bc-dad00e67656f"),
        "gEfiImageSecurityDatabaseGuid",
    ),
    (
        Guid::from_str_const("f0a30bc7-af08-4556-99c4-001009c93a44"),
        "gEfiSecureBootEnableDisableGuid",
    ),
    (
        Guid::from_str_const("0cec76c0-2870-9943-a072-71ee5c448b9f"),
        "gEfiCustomModeEnableGuid",
    ),
    (
        Guid::from_str_const("16d6474b-d6a8-5245-9d44-ccad2e0f4cf9"),
        "gIScsiConfigGuid",
    ),
    (
        Guid::from_str_const("6ee5bed9-dc75-d949-b4d7-b534210f637a"),
        "gEfiCertDbGuid",
    ),
    (
        Guid::from_str_const("bd9afa77-5903-324d-bd60-28f4e78f784b"),
        "gMicrosoftVendorGuid",
    ),
    (
        Guid::from_str_const("e0e47390-ec60-6e4b-9903-4c223c260f3c"),
        "gEfiVendorKeysNvGuid",
    ),
    (
        Guid::from_str_const("e1e9b7fa-dd39-2b4f-8408-e20e906cb6de"),
        "mBmHardDriveBootVariableGuid",
    ),
];

static BUILTIN: LazyLock<GuidRegistry> = LazyLock::new(|| {
    KNOWN_GUIDS
        .iter()
        .fold(GuidRegistry::new(), |registry, (guid, name)| {
            registry.with(*guid, *name)
        })
});

#[derive(Debug, Clone, Default)]
pub struct GuidRegistry {
    entries: Vec<(Guid, Cow<'static, str>)>,
}

impl GuidRegistry {
    /// An empty registry, every GUID resolves to its textual form.
    pub fn new() -> Self {
        GuidRegistry::default()
    }

    /// The process-wide registry of well-known EDK II GUIDs.
    pub fn builtin() -> &'static GuidRegistry {
        &BUILTIN
    }

    /// Adds a name. The first registration of a GUID wins when resolving.
    pub fn with(mut self, guid: Guid, name: impl Into<Cow<'static, str>>) -> Self {
        self.entries.push((guid, name.into()));
        self
    }

    pub fn name_of(&self, guid: &Guid) -> Option<&str> {
        self.entries
            .iter()
            .find(|(g, _)| g == guid)
            .map(|(_, name)| name.as_ref())
    }

    /// Returns the registered name of `guid`, or its canonical text.
    pub fn resolve(&self, guid: &Guid) -> Cow<'_, str> {
        match self.name_of(guid) {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(guid.to_string()),
        }
    }

    /// Inverse of [`GuidRegistry::resolve`]: accepts a registered name or GUID text.
    pub fn lookup(&self, name: &str) -> DocumentResult<Guid> {
        if let Some((guid, _)) = self.entries.iter().find(|(_, n)| n == name) {
            return Ok(*guid);
        }

        name.parse().map_err(|_| DocumentError::UnknownVendor {
            vendor: name.to_owned(),
        })
    }
}
