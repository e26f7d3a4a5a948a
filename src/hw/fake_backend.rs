use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::debug;

use super::hardware::{ConnectedBleSession, NotificationFeed, WriteMode};
use super::model::FoundDevice;
use crate::error::{FixtureError, InteractionError};
use crate::protocol::EndpointId;

/// Parsed fake scan fixture records.
#[derive(Debug, Clone, derive_more::Into)]
pub(crate) struct ScanFixture {
    devices: Vec<FoundDevice>,
}

impl FromStr for ScanFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let devices = parse_scan_fixture(value)?;
        Ok(Self { devices })
    }
}

/// Parsed fake notification payload fixtures.
#[derive(Debug, Clone, derive_more::Into)]
pub(crate) struct NotificationPayloads {
    payloads: Vec<Vec<u8>>,
}

impl FromStr for NotificationPayloads {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let payloads = parse_notifications(value)?;
        Ok(Self { payloads })
    }
}

/// Parsed 1-based write ordinals that the fake transport rejects.
#[derive(Debug, Clone, derive_more::Into)]
pub(crate) struct WriteOrdinals {
    ordinals: Vec<usize>,
}

impl FromStr for WriteOrdinals {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let ordinals = parse_write_ordinals(value)?;
        Ok(Self { ordinals })
    }
}

/// One write accepted by the fake transport.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RecordedWrite {
    pub endpoint: EndpointId,
    pub payload: Vec<u8>,
    pub mode: WriteMode,
}

#[derive(Debug, Default)]
struct RecorderState {
    scans: usize,
    connect_attempts: usize,
    disconnects: usize,
    write_attempts: usize,
    writes: Vec<RecordedWrite>,
}

/// Shared log of everything the fake transport was asked to do.
///
/// Clones share the same log, so a test can keep one handle and pass
/// another to the fake client.
#[derive(Debug, Clone, Default)]
pub struct FakeRecorder {
    state: Arc<Mutex<RecorderState>>,
}

impl FakeRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of scans performed.
    #[must_use]
    pub fn scans(&self) -> usize {
        self.state.lock().scans
    }

    /// Number of connection attempts, successful or not.
    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.state.lock().connect_attempts
    }

    /// Number of sessions closed.
    #[must_use]
    pub fn disconnects(&self) -> usize {
        self.state.lock().disconnects
    }

    /// Number of write attempts, including rejected ones.
    #[must_use]
    pub fn write_attempts(&self) -> usize {
        self.state.lock().write_attempts
    }

    /// Writes accepted so far, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.state.lock().writes.clone()
    }

    fn record_scan(&self) {
        self.state.lock().scans += 1;
    }

    fn record_connect_attempt(&self) {
        self.state.lock().connect_attempts += 1;
    }

    fn record_disconnect(&self) {
        self.state.lock().disconnects += 1;
    }

    fn next_write_ordinal(&self) -> usize {
        let mut state = self.state.lock();
        state.write_attempts += 1;
        state.write_attempts
    }

    fn record_write(&self, write: RecordedWrite) {
        self.state.lock().writes.push(write);
    }
}

/// Settings for constructing a fake hardware backend.
#[derive(Debug, Builder)]
pub(crate) struct FakeBackendConfig {
    scan_fixture: ScanFixture,
    notifications: Option<NotificationPayloads>,
    fail_writes: Option<WriteOrdinals>,
    #[builder(default)]
    connect_fails: bool,
    #[builder(default)]
    recorder: FakeRecorder,
}

/// Fake backend used in tests and non-hardware environments.
#[derive(Debug)]
pub(crate) struct FakeBackend {
    devices: Vec<FoundDevice>,
    notifications: Vec<Vec<u8>>,
    fail_writes: Arc<[usize]>,
    connect_fails: bool,
    recorder: FakeRecorder,
}

impl FakeBackend {
    /// Creates a fake backend from explicit settings.
    pub(crate) fn new(config: FakeBackendConfig) -> Self {
        let notifications: Vec<Vec<u8>> = config.notifications.map(Into::into).unwrap_or_default();
        let fail_writes: Vec<usize> = config.fail_writes.map(Into::into).unwrap_or_default();

        Self {
            devices: config.scan_fixture.into(),
            notifications,
            fail_writes: fail_writes.into(),
            connect_fails: config.connect_fails,
            recorder: config.recorder,
        }
    }

    /// Waits out the scan window and returns every fixture device.
    pub(crate) async fn scan(
        &self,
        window: Duration,
    ) -> Result<Vec<FoundDevice>, InteractionError> {
        self.recorder.record_scan();
        if !window.is_zero() {
            sleep(window).await;
        }
        Ok(self.devices.clone())
    }

    /// Opens a fake session to a fixture device.
    pub(crate) fn connect(
        &self,
        device: &FoundDevice,
    ) -> Result<FakeDeviceSession, InteractionError> {
        self.recorder.record_connect_attempt();
        if self.connect_fails {
            return Err(InteractionError::FakeConnectRefused {
                device_id: device.device_id().to_string(),
            });
        }

        let Some(device) = self
            .devices
            .iter()
            .find(|candidate| candidate.device_id() == device.device_id())
        else {
            return Err(InteractionError::UnknownDevice {
                device_id: device.device_id().to_string(),
            });
        };

        Ok(FakeDeviceSession {
            device: device.clone(),
            notifications: self.notifications.clone(),
            fail_writes: Arc::clone(&self.fail_writes),
            recorder: self.recorder.clone(),
        })
    }
}

/// Fake connected session.
#[derive(Debug)]
pub(crate) struct FakeDeviceSession {
    device: FoundDevice,
    notifications: Vec<Vec<u8>>,
    fail_writes: Arc<[usize]>,
    recorder: FakeRecorder,
}

#[async_trait]
impl ConnectedBleSession for FakeDeviceSession {
    fn device(&self) -> &FoundDevice {
        &self.device
    }

    async fn write_endpoint(
        &self,
        endpoint: EndpointId,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), InteractionError> {
        let ordinal = self.recorder.next_write_ordinal();
        if self.fail_writes.contains(&ordinal) {
            debug!(ordinal, %endpoint, "rejecting fake write");
            return Err(InteractionError::FakeWriteRejected { ordinal, endpoint });
        }

        self.recorder.record_write(RecordedWrite {
            endpoint,
            payload: payload.to_vec(),
            mode,
        });
        Ok(())
    }

    async fn subscribe_endpoint(
        &self,
        endpoint: EndpointId,
    ) -> Result<NotificationFeed, InteractionError> {
        let (sender, feed) = mpsc::unbounded_channel();
        if endpoint == EndpointId::NotifyCharacteristic {
            for payload in &self.notifications {
                // The receiver is still held locally, so this cannot fail.
                let _ = sender.send(payload.clone());
            }
        }
        Ok(feed)
    }

    async fn close(self: Box<Self>) -> Result<(), InteractionError> {
        self.recorder.record_disconnect();
        Ok(())
    }
}

fn parse_scan_fixture(raw_fixture: &str) -> Result<Vec<FoundDevice>, FixtureError> {
    if raw_fixture.trim().is_empty() {
        return Err(FixtureError::EmptyFixture);
    }

    raw_fixture
        .split(';')
        .map(parse_scan_record)
        .collect::<Result<Vec<_>, _>>()
}

fn parse_scan_record(raw_record: &str) -> Result<FoundDevice, FixtureError> {
    let fields: Vec<&str> = raw_record.split('|').map(str::trim).collect();
    if !(4..=5).contains(&fields.len()) {
        return Err(FixtureError::InvalidRecordFieldCount);
    }
    if fields[..4].iter().any(|field| field.is_empty()) {
        return Err(FixtureError::EmptyRecordField);
    }

    let local_name = optional_field(fields[2]).map(str::to_string);
    let rssi = optional_field(fields[3])
        .map(str::parse::<i16>)
        .transpose()?;
    let service_uuids: Vec<String> = fields
        .get(4)
        .copied()
        .and_then(optional_field)
        .map(|uuids| {
            uuids
                .split(',')
                .map(str::trim)
                .filter(|uuid| !uuid.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(FoundDevice::new(
        fields[0].to_string(),
        fields[1].to_string(),
        local_name,
        rssi,
    )
    .with_service_uuids(service_uuids))
}

fn optional_field(field: &str) -> Option<&str> {
    if field.is_empty() || field == "-" {
        None
    } else {
        Some(field)
    }
}

fn parse_notifications(raw_value: &str) -> Result<Vec<Vec<u8>>, FixtureError> {
    if raw_value.trim().is_empty() {
        return Ok(Vec::new());
    }
    raw_value.split(',').map(parse_hex).collect()
}

fn parse_write_ordinals(raw_value: &str) -> Result<Vec<usize>, FixtureError> {
    raw_value
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| match value.parse::<usize>() {
            Ok(ordinal) if ordinal > 0 => Ok(ordinal),
            _ => Err(FixtureError::InvalidWriteOrdinal {
                value: value.to_string(),
            }),
        })
        .collect()
}

fn parse_hex(raw_value: &str) -> Result<Vec<u8>, FixtureError> {
    let cleaned: String = raw_value.chars().filter(|c| !c.is_whitespace()).collect();
    if !cleaned.len().is_multiple_of(2) {
        return Err(FixtureError::InvalidHexLength);
    }

    cleaned
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let text = String::from_utf8_lossy(pair);
            u8::from_str_radix(&text, 16).map_err(|_| FixtureError::InvalidHexByte {
                value: text.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    const ROBOT_SERVICE: &str = "0bd51777-e7cb-469b-8e4d-2742f1ba77cc";

    fn backend(config: FakeBackendConfig) -> FakeBackend {
        FakeBackend::new(config)
    }

    fn fixture(value: &str) -> ScanFixture {
        value.parse().expect("fixture should parse")
    }

    #[rstest]
    #[case("hci0|AA:BB|iRobot Braava|-43", 1)]
    #[case("hci0|AA:BB|Altadena|-43;hci1|CC:DD|Speaker|-55", 2)]
    #[case("hci0|AA:BB|-|-|0bd51777-e7cb-469b-8e4d-2742f1ba77cc", 1)]
    fn parse_scan_fixture_parses_records(#[case] fixture: &str, #[case] expected_count: usize) {
        let devices = parse_scan_fixture(fixture).expect("fixture should parse");
        assert_eq!(expected_count, devices.len());
    }

    #[test]
    fn parse_scan_record_reads_optional_fields() {
        let device = parse_scan_record(&format!("hci0|AA:BB|-|-|{ROBOT_SERVICE}, 180f"))
            .expect("record should parse");

        assert_eq!(None, device.local_name());
        assert_eq!(None, device.rssi());
        assert_eq!(
            vec![ROBOT_SERVICE.to_string(), "180f".to_string()],
            device.service_uuids().to_vec()
        );
    }

    #[rstest]
    #[case("hci0|AA:BB|Altadena")]
    #[case("hci0|AA:BB|Altadena|-4|x|y")]
    fn parse_scan_fixture_rejects_invalid_field_count(#[case] fixture: &str) {
        let result = parse_scan_fixture(fixture);
        assert_matches!(result, Err(FixtureError::InvalidRecordFieldCount));
    }

    #[test]
    fn parse_scan_fixture_rejects_empty_mandatory_field() {
        let result = parse_scan_fixture("hci0||Altadena|-40");
        assert_matches!(result, Err(FixtureError::EmptyRecordField));
    }

    #[test]
    fn parse_hex_rejects_odd_length() {
        assert_matches!(parse_hex("A"), Err(FixtureError::InvalidHexLength));
    }

    #[test]
    fn parse_hex_rejects_invalid_digits() {
        assert_matches!(
            parse_hex("0G"),
            Err(FixtureError::InvalidHexByte { value }) if value == "0G"
        );
    }

    #[test]
    fn parse_notifications_splits_payloads() {
        let payloads = parse_notifications("0500AA, 0600").expect("payloads should parse");
        assert_eq!(vec![vec![0x05, 0x00, 0xAA], vec![0x06, 0x00]], payloads);
    }

    #[rstest]
    #[case("4", vec![4])]
    #[case("4, 11", vec![4, 11])]
    fn parse_write_ordinals_accepts_positive_values(
        #[case] raw: &str,
        #[case] expected: Vec<usize>,
    ) {
        assert_eq!(expected, parse_write_ordinals(raw).expect("ordinals should parse"));
    }

    #[rstest]
    #[case("0")]
    #[case("four")]
    fn parse_write_ordinals_rejects_invalid_values(#[case] raw: &str) {
        assert_matches!(
            parse_write_ordinals(raw),
            Err(FixtureError::InvalidWriteOrdinal { .. })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn scan_waits_for_the_window() {
        let recorder = FakeRecorder::new();
        let backend = backend(
            FakeBackendConfig::builder()
                .scan_fixture(fixture("hci0|AA:BB|Altadena|-43"))
                .recorder(recorder.clone())
                .build(),
        );

        let started = tokio::time::Instant::now();
        let devices = backend
            .scan(Duration::from_secs(8))
            .await
            .expect("fake scan should succeed");

        assert!(started.elapsed() >= Duration::from_secs(8));
        assert_eq!(1, devices.len());
        assert_eq!(1, recorder.scans());
    }

    #[tokio::test]
    async fn rejected_write_is_counted_but_not_recorded() {
        let recorder = FakeRecorder::new();
        let backend = backend(
            FakeBackendConfig::builder()
                .scan_fixture(fixture("hci0|AA:BB|Altadena|-43"))
                .fail_writes("2".parse().expect("ordinals should parse"))
                .recorder(recorder.clone())
                .build(),
        );
        let device = backend.devices[0].clone();
        let session = backend.connect(&device).expect("fake connect should succeed");

        session
            .write_endpoint(EndpointId::ControlCharacteristic, &[0x01], WriteMode::WithResponse)
            .await
            .expect("first write should succeed");
        let rejected = session
            .write_endpoint(EndpointId::ControlCharacteristic, &[0x02], WriteMode::WithResponse)
            .await;

        assert_matches!(
            rejected,
            Err(InteractionError::FakeWriteRejected { ordinal: 2, .. })
        );
        assert_eq!(2, recorder.write_attempts());
        assert_eq!(1, recorder.writes().len());
    }

    #[test]
    fn connect_failure_is_injected_and_counted() {
        let recorder = FakeRecorder::new();
        let backend = backend(
            FakeBackendConfig::builder()
                .scan_fixture(fixture("hci0|AA:BB|Altadena|-43"))
                .connect_fails(true)
                .recorder(recorder.clone())
                .build(),
        );
        let device = backend.devices[0].clone();

        assert_matches!(
            backend.connect(&device),
            Err(InteractionError::FakeConnectRefused { .. })
        );
        assert_eq!(1, recorder.connect_attempts());
    }

    #[tokio::test]
    async fn subscribe_delivers_fixture_notifications_only_on_notify_endpoint() {
        let backend = backend(
            FakeBackendConfig::builder()
                .scan_fixture(fixture("hci0|AA:BB|Altadena|-43"))
                .notifications("0500,0600".parse().expect("payloads should parse"))
                .build(),
        );
        let device = backend.devices[0].clone();
        let session = backend.connect(&device).expect("fake connect should succeed");

        let mut feed = session
            .subscribe_endpoint(EndpointId::NotifyCharacteristic)
            .await
            .expect("subscribe should succeed");
        assert_eq!(Some(vec![0x05, 0x00]), feed.recv().await);
        assert_eq!(Some(vec![0x06, 0x00]), feed.recv().await);
        assert_eq!(None, feed.recv().await);

        let mut read_feed = session
            .subscribe_endpoint(EndpointId::ReadCharacteristic)
            .await
            .expect("subscribe should succeed");
        assert_eq!(None, read_feed.recv().await);
    }
}
