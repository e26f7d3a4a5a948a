use std::io;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::hw::{
    DeviceScanner, FoundDevice, HardwareClient, NotificationRunSummary, SessionStopReason,
};

use super::report::Reporter;

/// Result of a discovery that the user may interrupt.
#[derive(Debug)]
pub(crate) enum Discovery {
    Found(FoundDevice),
    NotFound,
    Interrupted,
}

/// Executes the `scan` command.
pub(crate) async fn run<W>(
    client: &dyn HardwareClient,
    scan_window: Duration,
    shutdown: &CancellationToken,
    reporter: &mut Reporter<'_, W>,
) -> Result<()>
where
    W: io::Write,
{
    match find_robot(client, scan_window, shutdown).await? {
        Discovery::Found(device) => reporter.scanned(Some(&device), scan_window),
        Discovery::NotFound => reporter.scanned(None, scan_window),
        Discovery::Interrupted => report_interrupted(reporter),
    }
}

/// Runs one bounded scan and returns the first robot seen.
///
/// An interrupt abandons the scan window immediately.
pub(crate) async fn find_robot(
    client: &dyn HardwareClient,
    scan_window: Duration,
    shutdown: &CancellationToken,
) -> Result<Discovery> {
    let scanner = DeviceScanner::new().with_window(scan_window);
    let found = tokio::select! {
        biased;
        () = shutdown.cancelled() => {
            info!("interrupted during discovery");
            return Ok(Discovery::Interrupted);
        }
        found = scanner.find_first(client) => found?,
    };
    Ok(found.map_or(Discovery::NotFound, Discovery::Found))
}

/// Reports a run that stopped before any connection was opened.
pub(crate) fn report_interrupted<W>(reporter: &mut Reporter<'_, W>) -> Result<()>
where
    W: io::Write,
{
    reporter.stopped(
        Some(SessionStopReason::Interrupted),
        &NotificationRunSummary::default(),
    )
}
