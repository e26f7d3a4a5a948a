use serde::Serialize;

/// A BLE peripheral observed during a scan window.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct FoundDevice {
    adapter_name: String,
    device_id: String,
    local_name: Option<String>,
    rssi: Option<i16>,
    service_uuids: Vec<String>,
}

impl FoundDevice {
    /// Creates a new discovered-device record with no advertised services.
    pub(crate) fn new(
        adapter_name: String,
        device_id: String,
        local_name: Option<String>,
        rssi: Option<i16>,
    ) -> Self {
        Self {
            adapter_name,
            device_id,
            local_name,
            rssi,
            service_uuids: Vec::new(),
        }
    }

    /// Attaches the advertised service UUIDs.
    pub(crate) fn with_service_uuids(mut self, service_uuids: Vec<String>) -> Self {
        self.service_uuids = service_uuids;
        self
    }

    /// Returns the adapter name used to discover this device.
    #[must_use]
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Returns the backend-specific device identifier (the address on most platforms).
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns the advertised local name, if present.
    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    /// Returns the latest observed RSSI value, if present.
    #[must_use]
    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    /// Returns the advertised service UUIDs as reported by the transport.
    #[must_use]
    pub fn service_uuids(&self) -> &[String] {
        &self.service_uuids
    }
}

/// Counters collected by the notification filter task.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize)]
pub struct NotificationRunSummary {
    received: usize,
    emitted: usize,
    suppressed: usize,
    malformed: usize,
}

impl NotificationRunSummary {
    /// Total payloads delivered by the transport.
    #[must_use]
    pub fn received(&self) -> usize {
        self.received
    }

    /// Payloads that passed the filter.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Payloads dropped as sequence successors.
    #[must_use]
    pub fn suppressed(&self) -> usize {
        self.suppressed
    }

    /// Payloads too short to decode.
    #[must_use]
    pub fn malformed(&self) -> usize {
        self.malformed
    }

    pub(crate) fn record_received(&mut self) {
        self.received += 1;
    }

    pub(crate) fn record_emitted(&mut self) {
        self.emitted += 1;
    }

    pub(crate) fn record_suppressed(&mut self) {
        self.suppressed += 1;
    }

    pub(crate) fn record_malformed(&mut self) {
        self.malformed += 1;
    }
}

/// Why an interactive control session ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStopReason {
    /// The quit sentinel was entered.
    #[display("quit")]
    Quit,
    /// Ctrl+C was received between commands.
    #[display("interrupted")]
    Interrupted,
    /// The command input reached end-of-file.
    #[display("input_closed")]
    InputClosed,
}
