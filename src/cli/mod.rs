use std::io;

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;
use tracing::level_filters::LevelFilter;

pub(crate) mod command;
pub(crate) mod report;
pub(crate) mod scan;
pub(crate) mod send;
pub(crate) mod session;
pub(crate) mod ui;

pub use self::command::{Args, Command, FakeArgs, RunSettings, SendArgs};

/// Log verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Trace => LevelFilter::TRACE,
            Self::Debug => LevelFilter::DEBUG,
            Self::Info => LevelFilter::INFO,
            Self::Warn => LevelFilter::WARN,
            Self::Error => LevelFilter::ERROR,
        }
    }
}

/// Rendering used for command results on stdout.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables and lines.
    Pretty,
    /// One pretty-printed JSON document per result.
    Json,
}

pub(crate) fn write_json_line(out: &mut impl io::Write, value: &impl Serialize) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(LogLevel::Trace, LevelFilter::TRACE)]
    #[case(LogLevel::Warn, LevelFilter::WARN)]
    #[case(LogLevel::Error, LevelFilter::ERROR)]
    fn log_level_maps_to_filter(#[case] level: LogLevel, #[case] expected: LevelFilter) {
        assert_eq!(expected, level.as_level_filter());
    }

    #[test]
    fn write_json_line_terminates_document() {
        let mut out = Vec::new();
        write_json_line(&mut out, &serde_json::json!({ "found": false }))
            .expect("writing to a vector should succeed");
        assert_eq!("{\n  \"found\": false\n}\n", String::from_utf8_lossy(&out));
    }
}
