use std::collections::HashMap;
use std::sync::LazyLock;

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

/// Advertised local names of known Braava robots.
pub const KNOWN_PRODUCT_NAMES: [&str; 3] = ["iRobot Braava", "iRobot Braav", "Altadena"];

/// Known Braava protocol endpoints.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, Display)]
pub enum EndpointId {
    /// Primary robot service, also advertised during discovery.
    #[strum(to_string = "robot_service")]
    RobotService,
    /// Characteristic receiving 4-byte transaction control frames.
    #[strum(to_string = "control_characteristic")]
    ControlCharacteristic,
    /// Characteristic receiving the padded 20-byte command payload.
    #[strum(to_string = "payload_characteristic")]
    PayloadCharacteristic,
    /// Readable characteristic. Resolved when present, never written.
    #[strum(to_string = "read_characteristic")]
    ReadCharacteristic,
    /// Characteristic pushing status notifications.
    #[strum(to_string = "notify_characteristic")]
    NotifyCharacteristic,
}

/// Endpoint category in GATT.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub(crate) enum EndpointKind {
    #[strum(to_string = "service")]
    Service,
    #[strum(to_string = "characteristic")]
    Characteristic,
}

/// Descriptive metadata for one protocol endpoint.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct EndpointMetadata {
    name: &'static str,
    uuid: &'static str,
    kind: EndpointKind,
    required: bool,
}

impl EndpointMetadata {
    /// Human-readable endpoint name.
    pub(crate) fn name(self) -> &'static str {
        self.name
    }

    /// Endpoint UUID in lower-case hyphenated form.
    pub(crate) fn uuid(self) -> &'static str {
        self.uuid
    }

    /// Endpoint kind.
    pub(crate) fn kind(self) -> EndpointKind {
        self.kind
    }

    /// Whether a session cannot operate without this endpoint.
    pub(crate) fn required(self) -> bool {
        self.required
    }
}

static ENDPOINTS_BY_ID: LazyLock<HashMap<EndpointId, EndpointMetadata>> = LazyLock::new(|| {
    EndpointId::iter()
        .map(|endpoint| (endpoint, metadata_for(endpoint)))
        .collect()
});

/// Returns metadata for one endpoint.
pub(crate) fn endpoint_metadata(endpoint: EndpointId) -> EndpointMetadata {
    *ENDPOINTS_BY_ID
        .get(&endpoint)
        .unwrap_or(&metadata_for(endpoint))
}

/// Returns all known characteristic endpoints.
pub(crate) fn characteristic_endpoints() -> impl Iterator<Item = EndpointId> {
    EndpointId::iter()
        .filter(|endpoint| endpoint_metadata(*endpoint).kind() == EndpointKind::Characteristic)
}

/// Maps a UUID string onto a known endpoint, ignoring case.
pub(crate) fn endpoint_for_uuid(uuid: &str) -> Option<EndpointId> {
    EndpointId::iter().find(|endpoint| {
        endpoint_metadata(*endpoint)
            .uuid()
            .eq_ignore_ascii_case(uuid)
    })
}

fn metadata_for(endpoint: EndpointId) -> EndpointMetadata {
    match endpoint {
        EndpointId::RobotService => EndpointMetadata {
            name: "Braava robot service",
            uuid: "0bd51777-e7cb-469b-8e4d-2742f1ba77cc",
            kind: EndpointKind::Service,
            required: true,
        },
        EndpointId::ControlCharacteristic => EndpointMetadata {
            name: "Braava command control",
            uuid: "e7add780-b042-4876-aae1-112855353cc2",
            kind: EndpointKind::Characteristic,
            required: true,
        },
        EndpointId::PayloadCharacteristic => EndpointMetadata {
            name: "Braava command payload",
            uuid: "e7add780-b042-4876-aae1-112855353cc1",
            kind: EndpointKind::Characteristic,
            required: true,
        },
        EndpointId::ReadCharacteristic => EndpointMetadata {
            name: "Braava read data",
            uuid: "e7add780-b042-4876-aae1-112855353cc3",
            kind: EndpointKind::Characteristic,
            required: false,
        },
        EndpointId::NotifyCharacteristic => EndpointMetadata {
            name: "Braava status notify",
            uuid: "e7add780-b042-4876-aae1-112855353cc4",
            kind: EndpointKind::Characteristic,
            required: true,
        },
    }
}
