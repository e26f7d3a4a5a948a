use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, instrument, trace, warn};

use crate::hw::{NotificationFeed, NotificationRunSummary};
use crate::utils::format_hex;

/// Number of leading payload bytes holding the little-endian sequence value.
const SEQUENCE_PREFIX_LEN: usize = 2;

/// Errors returned while decoding notification payloads.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum NotificationDecodeError {
    #[error("notification payload has {len} byte(s); at least 2 are required")]
    TooShort { len: usize },
}

/// Outcome of offering one payload to the filter.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FilterVerdict {
    /// Payload carried a new value and was recorded.
    Emit(u16),
    /// Payload carried the successor of the recorded value and was dropped.
    Suppress(u16),
}

/// A notification that passed the filter.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct EmittedNotification {
    /// 1-based position among all received payloads.
    pub index: usize,
    /// Decoded sequence value.
    pub value: u16,
    /// Full raw payload.
    pub payload: Vec<u8>,
}

/// De-duplicates notifications by their embedded sequence counter.
///
/// The first two bytes of each payload are read as a little-endian `u16`.
/// A payload whose value is exactly one more than the last recorded value
/// is treated as noise and dropped; the recorded value only moves when a
/// payload is emitted.
#[derive(Debug, Default)]
pub struct NotificationFilter {
    previous: Option<u16>,
}

impl NotificationFilter {
    /// Creates a filter with no recorded value.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last recorded value.
    #[must_use]
    pub fn previous(&self) -> Option<u16> {
        self.previous
    }

    /// Offers one payload to the filter.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload is shorter than two bytes. The
    /// recorded value is left untouched in that case.
    pub fn observe(&mut self, payload: &[u8]) -> Result<FilterVerdict, NotificationDecodeError> {
        let current = sequence_value(payload)?;
        let is_successor = self
            .previous
            .and_then(|previous| previous.checked_add(1))
            .is_some_and(|expected| expected == current);
        if is_successor {
            return Ok(FilterVerdict::Suppress(current));
        }

        self.previous = Some(current);
        Ok(FilterVerdict::Emit(current))
    }

    /// Drains a notification feed until it closes, forwarding emitted payloads.
    ///
    /// Malformed payloads are logged and counted; they never stop the loop.
    #[instrument(skip_all, level = "debug")]
    pub(crate) async fn run(
        mut self,
        mut feed: NotificationFeed,
        emitted: mpsc::UnboundedSender<EmittedNotification>,
    ) -> NotificationRunSummary {
        let mut summary = NotificationRunSummary::default();

        while let Some(payload) = feed.recv().await {
            summary.record_received();
            let index = summary.received();
            match self.observe(&payload) {
                Ok(FilterVerdict::Emit(value)) => {
                    summary.record_emitted();
                    info!(index, value, payload = %format_hex(&payload), "notification");
                    let notification = EmittedNotification {
                        index,
                        value,
                        payload,
                    };
                    if emitted.send(notification).is_err() {
                        trace!("notification consumer dropped; continuing to drain feed");
                    }
                }
                Ok(FilterVerdict::Suppress(value)) => {
                    summary.record_suppressed();
                    trace!(index, value, "suppressed successor notification");
                }
                Err(error) => {
                    summary.record_malformed();
                    warn!(index, %error, payload = %format_hex(&payload), "notification error");
                }
            }
        }

        summary
    }
}

fn sequence_value(payload: &[u8]) -> Result<u16, NotificationDecodeError> {
    let Some(prefix) = payload.first_chunk::<SEQUENCE_PREFIX_LEN>() else {
        return Err(NotificationDecodeError::TooShort { len: payload.len() });
    };
    Ok(u16::from_le_bytes(*prefix))
}
