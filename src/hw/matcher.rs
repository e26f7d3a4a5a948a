use crate::protocol::{self, EndpointId, KNOWN_PRODUCT_NAMES};

use super::model::FoundDevice;

/// Decides whether an advertisement belongs to a Braava robot.
pub struct DeviceMatcher;

impl DeviceMatcher {
    /// Returns `true` when the robot service UUID is advertised (compared
    /// case-insensitively) or the local name is a known product name.
    #[must_use]
    pub fn matches_advertisement<S: AsRef<str>>(
        service_uuids: &[S],
        local_name: Option<&str>,
    ) -> bool {
        let robot_service = protocol::endpoint_metadata(EndpointId::RobotService).uuid();
        let advertises_service = service_uuids
            .iter()
            .any(|uuid| uuid.as_ref().eq_ignore_ascii_case(robot_service));

        let known_name = local_name.is_some_and(|name| KNOWN_PRODUCT_NAMES.contains(&name));
        advertises_service || known_name
    }

    /// Applies [`DeviceMatcher::matches_advertisement`] to a discovered device.
    #[must_use]
    pub fn matches(device: &FoundDevice) -> bool {
        Self::matches_advertisement(device.service_uuids(), device.local_name())
    }
}
