use std::io;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

use crate::error::InteractionError;
use crate::handlers::{ControlSession, DispatchError, SETTLE_DELAY};
use crate::hw::{HardwareClient, SessionStopReason};
use crate::notification::NotificationFilter;

use super::report::Reporter;
use super::scan::{Discovery, find_robot, report_interrupted};

/// Input line that ends an interactive session.
pub(crate) const QUIT_SENTINEL: &str = "q";

/// Executes the `session` command: one connection, commands read line by line.
///
/// `shutdown` is checked during discovery, before connecting and while
/// waiting for input, so a command that has started always runs to
/// completion.
#[instrument(skip_all, level = "debug")]
pub(crate) async fn run<R, W>(
    client: &dyn HardwareClient,
    input: R,
    scan_window: Duration,
    shutdown: &CancellationToken,
    reporter: &mut Reporter<'_, W>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: io::Write,
{
    let device = match find_robot(client, scan_window, shutdown).await? {
        Discovery::Found(device) => device,
        Discovery::NotFound => return reporter.scanned(None, scan_window),
        Discovery::Interrupted => return report_interrupted(reporter),
    };
    if shutdown.is_cancelled() {
        return report_interrupted(reporter);
    }

    let mut session = ControlSession::open(client, &device).await?;
    let outcome = drive(&mut session, input, shutdown, reporter).await;
    let pending = session.drain_notifications();
    let close_result = session.close().await;

    let stop_reason = match outcome {
        Ok(stop_reason) => stop_reason,
        Err(error) => {
            if let Err(close_error) = close_result {
                trace!(?close_error, "failed to close session after session failure");
            }
            return Err(error);
        }
    };
    let summary = close_result?;
    info!(%stop_reason, "session ended");

    reporter.notifications(&pending)?;
    reporter.stopped(Some(stop_reason), &summary)
}

async fn drive<R, W>(
    session: &mut ControlSession,
    input: R,
    shutdown: &CancellationToken,
    reporter: &mut Reporter<'_, W>,
) -> Result<SessionStopReason>
where
    R: AsyncBufRead + Unpin,
    W: io::Write,
{
    session.subscribe(NotificationFilter::new()).await?;
    reporter.ready(session.device(), Some(QUIT_SENTINEL))?;

    let mut lines = input.lines();
    loop {
        reporter.notifications(&session.drain_notifications())?;
        reporter.prompt()?;

        let line = tokio::select! {
            biased;
            () = shutdown.cancelled() => return Ok(SessionStopReason::Interrupted),
            line = lines.next_line() => {
                line.map_err(|source| InteractionError::CommandInput { source })?
            }
        };
        let Some(line) = line else {
            return Ok(SessionStopReason::InputClosed);
        };

        let name = normalise_command_name(&line);
        if name.is_empty() {
            continue;
        }
        if name == QUIT_SENTINEL {
            return Ok(SessionStopReason::Quit);
        }

        match session.dispatch(&name).await {
            Ok(receipt) => reporter.sent(&receipt)?,
            Err(error @ DispatchError::UnknownCommand { .. }) => {
                reporter.rejected(&name, &error)?;
                continue;
            }
            Err(error) if error.is_connection_lost() => return Err(error.into()),
            Err(error) => {
                debug!(%error, command = %name, "command failed; session stays open");
                reporter.rejected(&name, &error)?;
            }
        }
        sleep(SETTLE_DELAY).await;
    }
}

fn normalise_command_name(line: &str) -> String {
    line.trim().to_ascii_lowercase()
}
