use std::fmt::{self, Display, Formatter};

use strum::IntoEnumIterator;

use crate::handlers::{DispatchReceipt, RobotCommand};
use crate::hw::{FoundDevice, NotificationRunSummary, SessionStopReason};
use crate::notification::EmittedNotification;
use crate::utils::format_hex;

use super::device_view::DeviceView;
use super::painter::Painter;

fn command_names() -> String {
    RobotCommand::iter()
        .map(RobotCommand::name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders the connected robot and the accepted commands.
pub(crate) struct SessionReadyView<'a> {
    device: &'a FoundDevice,
    quit_sentinel: Option<&'a str>,
    painter: &'a Painter,
}

impl<'a> SessionReadyView<'a> {
    pub(crate) fn new(
        device: &'a FoundDevice,
        quit_sentinel: Option<&'a str>,
        painter: &'a Painter,
    ) -> Self {
        Self {
            device,
            quit_sentinel,
            painter,
        }
    }
}

impl Display for SessionReadyView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.painter.heading("Connected robot:"))?;
        write!(f, "\n{}", DeviceView::new(self.device, self.painter))?;
        if let Some(quit) = self.quit_sentinel {
            write!(
                f,
                "\n{} {}; {} to quit",
                self.painter.heading("Commands:"),
                self.painter.value(command_names()),
                self.painter.value(quit)
            )?;
        }
        Ok(())
    }
}

/// Renders one notification that passed the filter.
pub(crate) struct NotificationView<'a> {
    notification: &'a EmittedNotification,
    painter: &'a Painter,
}

impl<'a> NotificationView<'a> {
    pub(crate) fn new(notification: &'a EmittedNotification, painter: &'a Painter) -> Self {
        Self {
            notification,
            painter,
        }
    }
}

impl Display for NotificationView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let index_label = self
            .painter
            .muted(format!("[{:04}]", self.notification.index));
        let raw_payload = self
            .painter
            .muted(format!("raw={}", format_hex(&self.notification.payload)));
        write!(
            f,
            "{index_label} {} {raw_payload}",
            self.painter
                .value(format!("value={}", self.notification.value))
        )
    }
}

/// Renders a dispatched command.
pub(crate) struct ReceiptView<'a> {
    receipt: &'a DispatchReceipt,
    painter: &'a Painter,
}

impl<'a> ReceiptView<'a> {
    pub(crate) fn new(receipt: &'a DispatchReceipt, painter: &'a Painter) -> Self {
        Self { receipt, painter }
    }
}

impl Display for ReceiptView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.painter
                .success(format!("Sent {}:", self.receipt.command())),
            self.painter.value(format_hex(self.receipt.bytes())),
            self.painter.muted(format!(
                "(checksum 0x{:06X}, {} writes)",
                self.receipt.checksum(),
                self.receipt.writes()
            ))
        )
    }
}

/// Renders a command that was not sent or did not complete.
pub(crate) enum CommandFailureView<'a> {
    Unknown {
        name: &'a str,
        painter: &'a Painter,
    },
    Failed {
        name: &'a str,
        detail: String,
        painter: &'a Painter,
    },
}

impl Display for CommandFailureView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown { name, painter } => write!(
                f,
                "{} `{name}`; expected one of {}",
                painter.warning("Unknown command"),
                command_names()
            ),
            Self::Failed {
                name,
                detail,
                painter,
            } => write!(
                f,
                "{} {}",
                painter.failure(format!("Failed {name}:")),
                detail
            ),
        }
    }
}

/// Renders why a session stopped and the notification counters.
pub(crate) struct SessionSummaryView<'a> {
    stop_reason: Option<SessionStopReason>,
    summary: &'a NotificationRunSummary,
    painter: &'a Painter,
}

impl<'a> SessionSummaryView<'a> {
    pub(crate) fn new(
        stop_reason: Option<SessionStopReason>,
        summary: &'a NotificationRunSummary,
        painter: &'a Painter,
    ) -> Self {
        Self {
            stop_reason,
            summary,
            painter,
        }
    }
}

impl Display for SessionSummaryView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let stop_reason = match self.stop_reason {
            Some(SessionStopReason::Quit) => self.painter.success("quit"),
            Some(reason) => self.painter.warning(reason.to_string()),
            None => self.painter.success("done"),
        };
        write!(
            f,
            "{} {stop_reason} {}",
            self.painter.heading("Stopped:"),
            self.painter.value(format!(
                "- {} notification(s) shown, {} suppressed, {} malformed",
                self.summary.emitted(),
                self.summary.suppressed(),
                self.summary.malformed()
            ))
        )
    }
}
