use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use super::{LogLevel, OutputFormat};
use crate::error::{CliConfigError, FixtureError};
use crate::hw::{
    DEFAULT_SCAN_WINDOW, FakeBackendConfig, FakeRecorder, NotificationPayloads, ScanFixture,
    WriteOrdinals,
};

/// Command-line options for the Braava BLE tool.
#[derive(Debug, Parser)]
#[command(name = "braava", about = "Drive iRobot Braava floor-cleaning robots over BLE.")]
pub struct Args {
    /// Log verbosity. Overrides `RUST_LOG`; defaults to `warn`.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format. Defaults to `pretty` on a terminal and `json` otherwise.
    #[arg(long, global = true, value_enum)]
    output: Option<OutputFormat>,
    /// How long one discovery scan runs (e.g. `8s`, `1500ms`).
    #[arg(long, global = true, value_parser = parse_duration)]
    scan_window: Option<Duration>,
    /// Uses the fake BLE backend with fixture-driven discovery and payloads.
    #[arg(long, global = true)]
    fake: bool,
    /// Fake scan records `adapter|device_id|local_name|rssi[|uuid,uuid];...`, `-` for absent.
    #[arg(long, global = true, requires = "fake", required_if_eq("fake", "true"))]
    fake_scan: Option<ScanFixture>,
    /// Fake notification payloads as comma-separated hexadecimal payloads.
    #[arg(long, global = true, requires = "fake")]
    fake_notifications: Option<NotificationPayloads>,
    /// Comma-separated 1-based write numbers the fake transport rejects.
    #[arg(long, global = true, requires = "fake")]
    fake_fail_writes: Option<WriteOrdinals>,
    /// Makes every fake connection attempt fail.
    #[arg(long, global = true, requires = "fake")]
    fake_connect_fails: bool,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Returns the requested log level, if any.
    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    /// Returns the requested output format, if any.
    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output
    }

    /// Returns run settings derived from the global flags.
    #[must_use]
    pub fn run_settings(&self) -> RunSettings {
        RunSettings::builder()
            .maybe_scan_window(self.scan_window)
            .maybe_output_format(self.output)
            .maybe_log_level(self.log_level)
            .build()
    }

    /// Splits parsed CLI arguments into command and optional fake-client settings.
    ///
    /// # Errors
    ///
    /// Returns an error if CLI backend configuration is invalid.
    pub fn into_command_and_fake_args(self) -> anyhow::Result<(Command, Option<FakeArgs>)> {
        let Args {
            fake,
            fake_scan,
            fake_notifications,
            fake_fail_writes,
            fake_connect_fails,
            command,
            ..
        } = self;

        let fake_args = if fake {
            let Some(scan) = fake_scan else {
                return Err(CliConfigError::MissingFakeScanFixture.into());
            };
            Some(FakeArgs {
                scan,
                notifications: fake_notifications,
                fail_writes: fake_fail_writes,
                connect_fails: fake_connect_fails,
                recorder: FakeRecorder::default(),
            })
        } else {
            None
        };

        Ok((command, fake_args))
    }
}

/// Settings shared by every command run.
#[derive(Debug, Clone, Builder)]
pub struct RunSettings {
    /// Discovery window for the scanner.
    #[builder(default = DEFAULT_SCAN_WINDOW)]
    scan_window: Duration,
    /// Output format; chosen from the terminal when absent.
    output_format: Option<OutputFormat>,
    /// Log level override.
    log_level: Option<LogLevel>,
    /// Cancelled when the user interrupts the run.
    #[builder(default)]
    shutdown: CancellationToken,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RunSettings {
    pub(crate) fn scan_window(&self) -> Duration {
        self.scan_window
    }

    pub(crate) fn output_format(&self) -> Option<OutputFormat> {
        self.output_format
    }

    pub(crate) fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    pub(crate) fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }
}

/// Fake backend arguments for programmatic runs.
#[derive(Debug, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    scan: ScanFixture,
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    notifications: Option<NotificationPayloads>,
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    fail_writes: Option<WriteOrdinals>,
    #[builder(default)]
    connect_fails: bool,
    #[builder(default)]
    recorder: FakeRecorder,
}

impl FakeArgs {
    pub(crate) fn into_backend_config(self) -> FakeBackendConfig {
        let Self {
            scan,
            notifications,
            fail_writes,
            connect_fails,
            recorder,
        } = self;

        FakeBackendConfig::builder()
            .scan_fixture(scan)
            .maybe_notifications(notifications)
            .maybe_fail_writes(fail_writes)
            .connect_fails(connect_fails)
            .recorder(recorder)
            .build()
    }
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan once and print the first Braava robot found.
    Scan,
    /// Connect to the first Braava robot found and send one command.
    Send(SendArgs),
    /// Connect to the first Braava robot found and send commands typed on stdin.
    Session,
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Send(_args) => "send",
            Self::Session => "session",
        }
    }
}

/// Arguments for the `send` command.
#[derive(Debug, clap::Args)]
pub struct SendArgs {
    /// Command name: `start`, `dock` or `status`.
    command: String,
}

impl SendArgs {
    /// Creates `send` arguments for one command name.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub(crate) fn command(&self) -> &str {
        &self.command
    }
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use clap::error::ErrorKind;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn fake_mode_requires_scan_fixture() {
        let result = Args::try_parse_from(["braava", "--fake", "scan"]);

        let error = result.expect_err("missing --fake-scan should fail argument parsing");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }

    #[test]
    fn fake_fixture_flags_require_fake_mode() {
        let result = Args::try_parse_from(["braava", "--fake-notifications", "0500", "scan"]);

        let error = result.expect_err("fake payload flags should require --fake");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }

    #[test]
    fn invalid_fixture_is_a_value_error() {
        let result = Args::try_parse_from([
            "braava",
            "--fake",
            "--fake-scan",
            "hci0|AA:BB|Altadena",
            "scan",
        ]);

        let error = result.expect_err("three-field record should be rejected");
        assert_eq!(ErrorKind::ValueValidation, error.kind());
    }

    #[test]
    fn fake_mode_builds_fake_settings() {
        let cli = Args::try_parse_from([
            "braava",
            "--fake",
            "--fake-scan",
            "hci0|AA:BB:CC|Altadena|-43",
            "--fake-fail-writes",
            "4",
            "send",
            "start",
        ])
        .expect("valid fake arguments should parse");

        let (command, fake_args) = cli
            .into_command_and_fake_args()
            .expect("valid fake arguments should resolve fake settings");
        assert_matches!(command, Command::Send(args) if args.command() == "start");
        assert_matches!(fake_args, Some(_));
    }

    #[test]
    fn scan_window_defaults_to_eight_seconds() {
        let cli = Args::try_parse_from(["braava", "scan"]).expect("scan should parse");
        assert_eq!(Duration::from_secs(8), cli.run_settings().scan_window());

        let cli = Args::try_parse_from(["braava", "--scan-window", "1500ms", "scan"])
            .expect("scan window should parse");
        assert_eq!(Duration::from_millis(1500), cli.run_settings().scan_window());
    }

    #[test]
    fn global_flags_are_accepted_after_subcommand() {
        let cli = Args::try_parse_from([
            "braava",
            "session",
            "--log-level",
            "debug",
            "--output",
            "json",
        ])
        .expect("global flags should parse after the subcommand");

        assert_eq!(Some(LogLevel::Debug), cli.log_level());
        assert_eq!(Some(OutputFormat::Json), cli.output_format());
        assert_matches!(
            cli.into_command_and_fake_args(),
            Ok((Command::Session, None))
        );
    }
}
