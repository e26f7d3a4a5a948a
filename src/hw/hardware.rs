use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, instrument};

use super::btleplug_backend::BtleplugBackend;
use super::fake_backend::{FakeBackend, FakeBackendConfig};
use super::model::FoundDevice;
use crate::error::InteractionError;
use crate::protocol::EndpointId;

/// Raw notification payloads pushed by the transport, in arrival order.
pub type NotificationFeed = mpsc::UnboundedReceiver<Vec<u8>>;

/// BLE write mode used for a single characteristic write.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Write with response (acknowledged by the peripheral).
    #[display("with_response")]
    WithResponse,
    /// Write without response (fire-and-forget).
    #[display("without_response")]
    WithoutResponse,
}

/// Creates a hardware client backed by the real BLE transport.
#[must_use]
pub(crate) fn real_hardware_client() -> Box<dyn HardwareClient> {
    Box::new(RealHardwareClient::default())
}

/// Creates a hardware client backed by fake BLE fixtures.
#[must_use]
pub(crate) fn fake_hardware_client(config: FakeBackendConfig) -> Box<dyn HardwareClient> {
    info!("using fake BLE backend");
    Box::new(FakeHardwareClient {
        backend: FakeBackend::new(config),
    })
}

/// BLE central operations needed to find and drive a robot.
#[async_trait]
pub trait HardwareClient: Send + Sync {
    /// Scans for the whole window and returns every device observed, in
    /// discovery order.
    async fn scan(&self, window: Duration) -> Result<Vec<FoundDevice>, InteractionError>;

    /// Opens a GATT connection to a device returned by [`HardwareClient::scan`].
    async fn connect(&self, device: &FoundDevice) -> Result<DeviceSession, InteractionError>;
}

#[derive(Debug, Default)]
struct RealHardwareClient {
    backend: tokio::sync::OnceCell<BtleplugBackend>,
}

impl RealHardwareClient {
    async fn backend(&self) -> Result<&BtleplugBackend, InteractionError> {
        self.backend.get_or_try_init(BtleplugBackend::new).await
    }
}

#[async_trait]
impl HardwareClient for RealHardwareClient {
    async fn scan(&self, window: Duration) -> Result<Vec<FoundDevice>, InteractionError> {
        self.backend().await?.scan(window).await
    }

    async fn connect(&self, device: &FoundDevice) -> Result<DeviceSession, InteractionError> {
        let session = self.backend().await?.connect(device).await?;
        Ok(DeviceSession::new(Box::new(session)))
    }
}

#[derive(Debug)]
struct FakeHardwareClient {
    backend: FakeBackend,
}

#[async_trait]
impl HardwareClient for FakeHardwareClient {
    async fn scan(&self, window: Duration) -> Result<Vec<FoundDevice>, InteractionError> {
        self.backend.scan(window).await
    }

    async fn connect(&self, device: &FoundDevice) -> Result<DeviceSession, InteractionError> {
        let session = self.backend.connect(device)?;
        Ok(DeviceSession::new(Box::new(session)))
    }
}

/// Operations available on an open GATT connection.
#[async_trait]
pub(crate) trait ConnectedBleSession: Send + Sync + std::fmt::Debug {
    fn device(&self) -> &FoundDevice;

    async fn write_endpoint(
        &self,
        endpoint: EndpointId,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), InteractionError>;

    async fn subscribe_endpoint(
        &self,
        endpoint: EndpointId,
    ) -> Result<NotificationFeed, InteractionError>;

    async fn close(self: Box<Self>) -> Result<(), InteractionError>;
}

/// An open connection to one robot.
///
/// Call [`DeviceSession::close`] on every exit path; dropping the session
/// without closing it leaves the link to the transport's own cleanup.
#[derive(Debug)]
pub struct DeviceSession {
    inner: Box<dyn ConnectedBleSession>,
}

impl DeviceSession {
    pub(crate) fn new(inner: Box<dyn ConnectedBleSession>) -> Self {
        Self { inner }
    }

    /// Returns the connected device.
    #[must_use]
    pub fn device(&self) -> &FoundDevice {
        self.inner.device()
    }

    /// Writes one payload and waits for the transport to complete it.
    ///
    /// # Errors
    ///
    /// Returns an error when the endpoint is unresolved or the write fails.
    #[instrument(
        skip(self, payload),
        level = "trace",
        fields(%endpoint, %mode, payload_len = payload.len())
    )]
    pub async fn write_endpoint(
        &self,
        endpoint: EndpointId,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), InteractionError> {
        self.inner.write_endpoint(endpoint, payload, mode).await
    }

    /// Enables notifications on an endpoint and returns the payload feed.
    ///
    /// # Errors
    ///
    /// Returns an error when the endpoint is unresolved or the subscription fails.
    #[instrument(skip(self), level = "debug", fields(%endpoint))]
    pub async fn subscribe_endpoint(
        &self,
        endpoint: EndpointId,
    ) -> Result<NotificationFeed, InteractionError> {
        self.inner.subscribe_endpoint(endpoint).await
    }

    /// Releases the connection.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport fails to disconnect.
    #[instrument(skip(self), level = "debug", fields(device_id = self.device().device_id()))]
    pub async fn close(self) -> Result<(), InteractionError> {
        self.inner.close().await
    }
}
