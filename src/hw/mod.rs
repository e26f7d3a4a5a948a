mod btleplug_backend;
mod fake_backend;
mod hardware;
mod matcher;
mod model;
mod scanner;

pub(crate) use self::fake_backend::{
    FakeBackendConfig, NotificationPayloads, ScanFixture, WriteOrdinals,
};
pub use self::fake_backend::{FakeRecorder, RecordedWrite};
pub use self::hardware::{DeviceSession, HardwareClient, NotificationFeed, WriteMode};
pub(crate) use self::hardware::{fake_hardware_client, real_hardware_client};
pub use self::matcher::DeviceMatcher;
pub use self::model::{FoundDevice, NotificationRunSummary, SessionStopReason};
pub use self::scanner::{DEFAULT_SCAN_WINDOW, DeviceScanner};
