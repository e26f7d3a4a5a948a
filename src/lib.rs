mod app;
mod cli;
mod error;
mod handlers;
mod hw;
mod notification;
mod protocol;
mod telemetry;
mod terminal;
mod utils;

pub use app::{fake_hardware_client, real_hardware_client, run, run_with_clients};
pub use cli::{Args, Command, FakeArgs, LogLevel, OutputFormat, RunSettings, SendArgs};
pub use error::{FixtureError, InteractionError};
pub use handlers::{
    CommandFramer, ControlSession, DispatchError, DispatchReceipt, FrameReceipt, FrameStep,
    FrameWrite, FramerError, MAX_COMMAND_LEN, RobotCommand, SETTLE_DELAY, STEP_DELAY,
};
pub use hw::{
    DEFAULT_SCAN_WINDOW, DeviceMatcher, DeviceScanner, DeviceSession, FakeRecorder, FoundDevice,
    HardwareClient, NotificationFeed, NotificationRunSummary, RecordedWrite, SessionStopReason,
    WriteMode,
};
pub use notification::{
    EmittedNotification, FilterVerdict, NotificationDecodeError, NotificationFilter,
};
pub use protocol::{EndpointId, KNOWN_PRODUCT_NAMES};
pub use terminal::TerminalClient;
