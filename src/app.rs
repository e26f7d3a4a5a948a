use std::io;

use anyhow::Result;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{debug, instrument, warn};

use crate::cli::report::Reporter;
use crate::cli::{Command, FakeArgs, LogLevel, OutputFormat, RunSettings};
use crate::error::InteractionError;
use crate::hw::{
    HardwareClient, fake_hardware_client as build_fake_hardware_client,
    real_hardware_client as build_real_hardware_client,
};
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

/// Creates a hardware client backed by the real BLE transport.
#[must_use]
pub fn real_hardware_client() -> Box<dyn HardwareClient> {
    build_real_hardware_client()
}

/// Creates a hardware client backed by fake BLE fixtures.
///
/// Keep a clone of the recorder passed to [`FakeArgs`] to inspect the
/// traffic afterwards.
#[must_use]
pub fn fake_hardware_client(fake_args: FakeArgs) -> Box<dyn HardwareClient> {
    build_fake_hardware_client(fake_args.into_backend_config())
}

/// Runs the CLI command against the process stdin and terminal.
///
/// Ctrl+C cancels the shutdown token in `settings` for the rest of the run.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = braava::Args::try_parse_from([
///     "braava",
///     "--fake",
///     "--fake-scan",
///     "hci0|AA:BB:CC|Altadena|-43",
///     "--scan-window",
///     "10ms",
///     "scan",
/// ])?;
/// let settings = args.run_settings();
/// let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
/// let hardware_client = match maybe_fake_args {
///     Some(fake_args) => braava::fake_hardware_client(fake_args),
///     None => braava::real_hardware_client(),
/// };
/// let mut out = Vec::new();
/// braava::run(command, &mut out, hardware_client, settings).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails, or
/// output writing fails.
pub async fn run<W>(
    command: Command,
    out: &mut W,
    hardware_client: Box<dyn HardwareClient>,
    settings: RunSettings,
) -> Result<()>
where
    W: io::Write,
{
    let shutdown = settings.shutdown().clone();
    let ctrl_c = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                debug!("interrupt received");
                shutdown.cancel();
            }
            Err(source) => {
                let error = InteractionError::CtrlC { source };
                warn!(%error, "interrupts will not stop the session");
            }
        }
    });

    let input = BufReader::new(tokio::io::stdin());
    let result = run_with_clients(
        command,
        input,
        out,
        &SystemTerminalClient,
        hardware_client,
        settings,
    )
    .await;
    ctrl_c.abort();
    result
}

/// Runs the CLI command with injected clients and command input.
///
/// `input` only feeds the `session` command.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// struct FakeTerminal;
/// impl braava::TerminalClient for FakeTerminal {
///     fn stdout_is_terminal(&self) -> bool { false }
///     fn stderr_is_terminal(&self) -> bool { false }
/// }
///
/// let fake_args = braava::FakeArgs::builder()
///     .scan("hci0|AA:BB:CC|Altadena|-43")?
///     .build();
/// let settings = braava::RunSettings::builder()
///     .scan_window(std::time::Duration::from_millis(10))
///     .output_format(braava::OutputFormat::Json)
///     .build();
/// let mut out = Vec::new();
/// braava::run_with_clients(
///     braava::Command::Session,
///     "status\nq\n".as_bytes(),
///     &mut out,
///     &FakeTerminal,
///     braava::fake_hardware_client(fake_args),
///     settings,
/// ).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails, or
/// output writing fails.
#[instrument(
    skip(input, out, terminal_client, hardware_client, settings),
    level = "info",
    fields(command = command.name(), log_level = ?settings.log_level())
)]
pub async fn run_with_clients<R, W>(
    command: Command,
    input: R,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    hardware_client: Box<dyn HardwareClient>,
    settings: RunSettings,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: io::Write,
{
    telemetry::initialise_tracing(
        "braava",
        terminal_client.stderr_is_terminal(),
        settings.log_level().map(LogLevel::as_level_filter),
    )?;

    let interactive = terminal_client.stdout_is_terminal();
    let format = settings.output_format().unwrap_or(if interactive {
        OutputFormat::Pretty
    } else {
        OutputFormat::Json
    });
    let mut reporter = Reporter::new(out, format, interactive);
    let client = hardware_client.as_ref();

    match command {
        Command::Scan => {
            crate::cli::scan::run(
                client,
                settings.scan_window(),
                settings.shutdown(),
                &mut reporter,
            )
            .await
        }
        Command::Send(args) => {
            crate::cli::send::run(
                client,
                &args,
                settings.scan_window(),
                settings.shutdown(),
                &mut reporter,
            )
            .await
        }
        Command::Session => {
            crate::cli::session::run(
                client,
                input,
                settings.scan_window(),
                settings.shutdown(),
                &mut reporter,
            )
            .await
        }
    }
}
