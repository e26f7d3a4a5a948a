use std::io::{self, IsTerminal};
use std::sync::OnceLock;
use std::time::Duration;

use indicatif::ProgressStyle;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
use tracing::level_filters::LevelFilter;
use tracing::{Level, Metadata};
use tracing_indicatif::{IndicatifLayer, TickSettings};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::{self, EnvFilter};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::TelemetryError;

/// Span field marking spans that render as terminal spinners.
const PROGRESS_FIELD: &str = "progress";

/// Only spans from this crate become spinners.
const PROGRESS_TARGET_PREFIX: &str = "braava::";

const DEFAULT_DIRECTIVE: &str = "warn";

const SPINNER_TICK: Duration = Duration::from_millis(90);

static TRACING_INITIALISED: OnceLock<Result<(), TelemetryError>> = OnceLock::new();

/// Where human-facing log lines go.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum LogSink {
    /// Pretty lines interleaved with progress spinners.
    Spinners,
    /// One JSON object per line on stderr.
    JsonLines,
}

impl LogSink {
    fn select(interactive_terminal: bool) -> Self {
        if interactive_terminal && io::stderr().is_terminal() {
            Self::Spinners
        } else {
            Self::JsonLines
        }
    }
}

/// Installs the process-wide tracing subscriber.
///
/// Logs go to stderr so stdout only carries command results. Only the first
/// call in a process configures the subscriber; later calls return the
/// first outcome.
pub(crate) fn initialise_tracing(
    service_name: &str,
    interactive_terminal: bool,
    level_override: Option<LevelFilter>,
) -> Result<(), &'static TelemetryError> {
    TRACING_INITIALISED
        .get_or_init(|| {
            let sink = LogSink::select(interactive_terminal);
            install_subscriber(service_name, sink, log_filter(level_override))
        })
        .as_ref()
        .copied()
}

fn install_subscriber(
    service_name: &str,
    sink: LogSink,
    log_filter: EnvFilter,
) -> Result<(), TelemetryError> {
    let tracer = tracer(service_name);

    match sink {
        LogSink::Spinners => {
            let spinners = IndicatifLayer::new()
                .with_progress_style(spinner_style())
                .with_tick_settings(TickSettings {
                    default_tick_interval: Some(SPINNER_TICK),
                    ..TickSettings::default()
                });
            let lines = fmt::layer()
                .pretty()
                .with_target(false)
                .with_writer(spinners.get_stderr_writer())
                .with_filter(log_filter);

            tracing_subscriber::registry()
                .with(lines)
                .with(spinners.with_filter(filter::filter_fn(is_progress_span)))
                .with(OpenTelemetryLayer::new(tracer))
                .try_init()?;
        }
        LogSink::JsonLines => {
            let lines = fmt::layer()
                .json()
                .with_target(false)
                .with_writer(io::stderr)
                .with_filter(log_filter);

            tracing_subscriber::registry()
                .with(lines)
                .with(OpenTelemetryLayer::new(tracer))
                .try_init()?;
        }
    }

    Ok(())
}

fn tracer(service_name: &str) -> SdkTracer {
    let provider = SdkTracerProvider::builder().build();
    let tracer = provider.tracer(service_name.to_owned());
    global::set_tracer_provider(provider);
    tracer
}

/// `--log-level` wins over `RUST_LOG`, which wins over `warn`.
fn log_filter(level_override: Option<LevelFilter>) -> EnvFilter {
    match level_override {
        Some(level) => EnvFilter::new(level.to_string()),
        None => {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
        }
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan.bold} {msg} {elapsed:.dim}")
        .unwrap_or_else(|_error| ProgressStyle::default_spinner())
}

fn is_progress_span(metadata: &Metadata<'_>) -> bool {
    metadata.is_span()
        && *metadata.level() <= Level::INFO
        && metadata.target().starts_with(PROGRESS_TARGET_PREFIX)
        && metadata.fields().field(PROGRESS_FIELD).is_some()
}
