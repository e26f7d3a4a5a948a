use std::time::Duration;

use tracing::{debug, info, instrument};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use super::hardware::HardwareClient;
use super::matcher::DeviceMatcher;
use super::model::FoundDevice;
use crate::error::InteractionError;

/// Default length of one discovery window.
pub const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(8);

/// Runs one bounded scan and picks the first Braava robot it saw.
#[derive(Debug, Clone, Copy)]
pub struct DeviceScanner {
    window: Duration,
}

impl Default for DeviceScanner {
    fn default() -> Self {
        Self {
            window: DEFAULT_SCAN_WINDOW,
        }
    }
}

impl DeviceScanner {
    /// Creates a scanner with the default 8 second window.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the scan window.
    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Returns the configured scan window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Scans for the full window, then returns the first matching device in
    /// discovery order, or `None` when nothing matched.
    ///
    /// # Errors
    ///
    /// Returns the transport error when the scan itself fails. Nothing is retried.
    #[instrument(
        skip(self, client),
        level = "info",
        fields(window = ?self.window, progress = true)
    )]
    pub async fn find_first(
        &self,
        client: &dyn HardwareClient,
    ) -> Result<Option<FoundDevice>, InteractionError> {
        tracing::Span::current().pb_set_message("Scanning for Braava robots");
        let observed = client.scan(self.window).await?;
        debug!(observed = observed.len(), "scan window elapsed");

        let found = Self::first_match(observed);
        match &found {
            Some(device) => info!(
                device_id = device.device_id(),
                name = device.local_name().unwrap_or("<unknown>"),
                "found Braava robot"
            ),
            None => info!("no Braava robot found"),
        }
        Ok(found)
    }

    /// Returns the first device accepted by [`DeviceMatcher`].
    #[must_use]
    pub fn first_match(devices: impl IntoIterator<Item = FoundDevice>) -> Option<FoundDevice> {
        devices.into_iter().find(DeviceMatcher::matches)
    }
}
