use std::io;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use super::ui::{
    CommandFailureView, DeviceView, NotificationView, Painter, ReceiptView, SessionReadyView,
    SessionSummaryView,
};
use super::{OutputFormat, write_json_line};
use crate::handlers::{DispatchError, DispatchReceipt};
use crate::hw::{FoundDevice, NotificationRunSummary, SessionStopReason};
use crate::notification::EmittedNotification;
use crate::utils::{format_error_chain, format_hex};

/// JSON record emitted for each reported event.
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ReportEvent<'a> {
    Scanned {
        found: bool,
        device: Option<&'a FoundDevice>,
        scan_window_ms: u128,
    },
    Ready {
        device: &'a FoundDevice,
    },
    Notification {
        index: usize,
        value: u16,
        payload: String,
    },
    Sent {
        receipt: &'a DispatchReceipt,
    },
    UnknownCommand {
        name: &'a str,
    },
    CommandFailed {
        name: &'a str,
        error: String,
    },
    Stopped {
        reason: Option<SessionStopReason>,
        summary: &'a NotificationRunSummary,
    },
}

/// Writes command results in the selected output format.
pub(crate) struct Reporter<'a, W> {
    out: &'a mut W,
    format: OutputFormat,
    painter: Painter,
    prompt: bool,
}

impl<'a, W> Reporter<'a, W>
where
    W: io::Write,
{
    /// `interactive` turns on colour and the input prompt.
    pub(crate) fn new(out: &'a mut W, format: OutputFormat, interactive: bool) -> Self {
        Self {
            out,
            format,
            painter: Painter::new(interactive),
            prompt: interactive && format == OutputFormat::Pretty,
        }
    }

    pub(crate) fn scanned(
        &mut self,
        device: Option<&FoundDevice>,
        window: Duration,
    ) -> Result<()> {
        match self.format {
            OutputFormat::Pretty => match device {
                Some(device) => {
                    writeln!(self.out, "{}", self.painter.heading("Found Braava robot:"))?;
                    writeln!(self.out, "{}", DeviceView::new(device, &self.painter))?;
                }
                None => writeln!(
                    self.out,
                    "{} {}",
                    self.painter.warning("No Braava robot found"),
                    self.painter
                        .muted(format!("(scanned {})", humantime::format_duration(window)))
                )?,
            },
            OutputFormat::Json => write_json_line(
                self.out,
                &ReportEvent::Scanned {
                    found: device.is_some(),
                    device,
                    scan_window_ms: window.as_millis(),
                },
            )?,
        }
        Ok(())
    }

    pub(crate) fn ready(
        &mut self,
        device: &FoundDevice,
        quit_sentinel: Option<&str>,
    ) -> Result<()> {
        match self.format {
            OutputFormat::Pretty => writeln!(
                self.out,
                "{}",
                SessionReadyView::new(device, quit_sentinel, &self.painter)
            )?,
            OutputFormat::Json => write_json_line(self.out, &ReportEvent::Ready { device })?,
        }
        Ok(())
    }

    pub(crate) fn notifications(&mut self, notifications: &[EmittedNotification]) -> Result<()> {
        for notification in notifications {
            match self.format {
                OutputFormat::Pretty => writeln!(
                    self.out,
                    "{}",
                    NotificationView::new(notification, &self.painter)
                )?,
                OutputFormat::Json => write_json_line(
                    self.out,
                    &ReportEvent::Notification {
                        index: notification.index,
                        value: notification.value,
                        payload: format_hex(&notification.payload),
                    },
                )?,
            }
        }
        Ok(())
    }

    pub(crate) fn sent(&mut self, receipt: &DispatchReceipt) -> Result<()> {
        match self.format {
            OutputFormat::Pretty => {
                writeln!(self.out, "{}", ReceiptView::new(receipt, &self.painter))?;
            }
            OutputFormat::Json => write_json_line(self.out, &ReportEvent::Sent { receipt })?,
        }
        Ok(())
    }

    pub(crate) fn rejected(&mut self, name: &str, error: &DispatchError) -> Result<()> {
        match (self.format, error) {
            (OutputFormat::Pretty, DispatchError::UnknownCommand { .. }) => writeln!(
                self.out,
                "{}",
                CommandFailureView::Unknown {
                    name,
                    painter: &self.painter,
                }
            )?,
            (OutputFormat::Pretty, DispatchError::Framer(_)) => writeln!(
                self.out,
                "{}",
                CommandFailureView::Failed {
                    name,
                    detail: format_error_chain(error),
                    painter: &self.painter,
                }
            )?,
            (OutputFormat::Json, DispatchError::UnknownCommand { .. }) => {
                write_json_line(self.out, &ReportEvent::UnknownCommand { name })?;
            }
            (OutputFormat::Json, DispatchError::Framer(_)) => write_json_line(
                self.out,
                &ReportEvent::CommandFailed {
                    name,
                    error: format_error_chain(error),
                },
            )?,
        }
        Ok(())
    }

    pub(crate) fn stopped(
        &mut self,
        reason: Option<SessionStopReason>,
        summary: &NotificationRunSummary,
    ) -> Result<()> {
        match self.format {
            OutputFormat::Pretty => writeln!(
                self.out,
                "{}",
                SessionSummaryView::new(reason, summary, &self.painter)
            )?,
            OutputFormat::Json => {
                write_json_line(self.out, &ReportEvent::Stopped { reason, summary })?;
            }
        }
        Ok(())
    }

    pub(crate) fn prompt(&mut self) -> Result<()> {
        if self.prompt {
            write!(self.out, "{} ", self.painter.muted(">"))?;
            self.out.flush()?;
        }
        Ok(())
    }
}
