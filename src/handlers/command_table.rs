use serde_with::SerializeDisplay;
use strum_macros::{Display, EnumIter, EnumString};

/// Operations understood by the robot.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumIter, EnumString, SerializeDisplay,
)]
#[strum(serialize_all = "snake_case")]
pub enum RobotCommand {
    /// Start a cleaning run.
    Start,
    /// Return to the dock.
    Dock,
    /// Request a status report.
    Status,
}

impl RobotCommand {
    /// Name as typed by the user.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Dock => "dock",
            Self::Status => "status",
        }
    }

    /// Literal bytes sent for this command.
    #[must_use]
    pub fn bytes(self) -> &'static [u8] {
        match self {
            Self::Start => &[0x17, 0x04, 0x1B, 0x00],
            Self::Dock => &[0x04, 0x04, 0x09, 0x01],
            Self::Status => &[0x16, 0x03, 0x19],
        }
    }

    /// Resolves a command name. Matching is exact; callers normalise input first.
    #[must_use]
    pub fn lookup(name: &str) -> Option<Self> {
        name.parse().ok()
    }
}
