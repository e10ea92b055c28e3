use std::str::FromStr;

use color_eyre::eyre::{Result, eyre};
use tracing::Level;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format `{other}` (expected pretty or json)")),
        }
    }
}

pub fn parse_level(level: &str) -> Result<Level> {
    Level::from_str(level).map_err(|_| eyre!("unknown log level `{level}`"))
}

/// Install the global subscriber. Logs go to stderr; stdout carries bridge replies.
pub fn init_tracing(level: Level, format: LogFormat) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    let result = match format {
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => {
            tracing::subscriber::set_global_default(builder.with_ansi(false).json().finish())
        }
    };
    result.map_err(|e| eyre!("failed to set tracing subscriber: {e}"))
}
