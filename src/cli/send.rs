use std::io;
use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace};

use crate::handlers::{ControlSession, DispatchReceipt, SETTLE_DELAY};
use crate::hw::HardwareClient;
use crate::notification::NotificationFilter;

use super::SendArgs;
use super::report::Reporter;
use super::scan::{Discovery, find_robot, report_interrupted};

/// Executes the `send` command: one scan, one connection, one command.
///
/// `shutdown` is honoured until the connection is opened; after that the
/// command always runs to completion.
#[instrument(skip_all, level = "debug", fields(command = args.command()))]
pub(crate) async fn run<W>(
    client: &dyn HardwareClient,
    args: &SendArgs,
    scan_window: Duration,
    shutdown: &CancellationToken,
    reporter: &mut Reporter<'_, W>,
) -> Result<()>
where
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
    let sent = send_with_session(&mut session, args).await;
    let notifications = session.drain_notifications();
    let close_result = session.close().await;

    let (receipt, summary) = match (sent, close_result) {
        (Ok(receipt), Ok(summary)) => (receipt, summary),
        (Ok(_receipt), Err(error)) => return Err(error.into()),
        (Err(error), close_result) => {
            if let Err(close_error) = close_result {
                trace!(?close_error, "failed to close session after send failure");
            }
            return Err(error);
        }
    };

    reporter.notifications(&notifications)?;
    reporter.sent(&receipt)?;
    reporter.stopped(None, &summary)
}

async fn send_with_session(
    session: &mut ControlSession,
    args: &SendArgs,
) -> Result<DispatchReceipt> {
    session.subscribe(NotificationFilter::new()).await?;
    let receipt = session.dispatch(args.command()).await?;
    sleep(SETTLE_DELAY).await;
    Ok(receipt)
}
