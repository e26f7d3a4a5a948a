use thiserror::Error;

use crate::protocol::EndpointId;

/// Errors returned by BLE interaction operations.
#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("BLE operation failed")]
    Ble(#[from] btleplug::Error),
    #[error("no BLE adapters were found")]
    NoAdapters,
    #[error("BLE scan failed")]
    Scan { source: btleplug::Error },
    #[error("failed to connect to `{device_id}`")]
    Connect {
        device_id: String,
        source: btleplug::Error,
    },
    #[error("device `{device_id}` was not seen during the last scan")]
    UnknownDevice { device_id: String },
    #[error("fake connection to `{device_id}` was refused")]
    FakeConnectRefused { device_id: String },
    #[error("required endpoint `{endpoint}` was not resolved on the connected device")]
    MissingEndpoint { endpoint: EndpointId },
    #[error("required Braava endpoints are missing: {missing}")]
    MissingRequiredEndpoints { missing: String },
    #[error("fake write #{ordinal} to `{endpoint}` was rejected")]
    FakeWriteRejected { ordinal: usize, endpoint: EndpointId },
    #[error("failed while waiting for Ctrl+C")]
    CtrlC { source: std::io::Error },
    #[error("failed to read a command from standard input")]
    CommandInput { source: std::io::Error },
}

/// Errors returned when parsing fake interaction fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("the fake discovery fixture is empty")]
    EmptyFixture,
    #[error("fixture records must contain four or five pipe-delimited fields")]
    InvalidRecordFieldCount,
    #[error("fixture records cannot contain empty mandatory fields")]
    EmptyRecordField,
    #[error("failed to parse RSSI value")]
    InvalidRssi(#[from] std::num::ParseIntError),
    #[error("hex payload length must be even")]
    InvalidHexLength,
    #[error("hex payload contains invalid byte `{value}`")]
    InvalidHexByte { value: String },
    #[error("write ordinal `{value}` is not a positive integer")]
    InvalidWriteOrdinal { value: String },
}

/// Errors returned when validating runtime backend options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("missing fake scan fixture while fake mode is enabled")]
    MissingFakeScanFixture,
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}
