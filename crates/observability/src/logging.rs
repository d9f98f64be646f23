//! Logging initialization
//!
//! The subscriber is one output layer, shaped by the configured format and
//! boxed so every format flows through the same composition, stacked under
//! an `EnvFilter`. The log level comes from `RUST_LOG` and defaults to
//! `info`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable with source locations (default)
    #[default]
    Pretty,
    /// JSON lines for log aggregation
    Json,
    /// Terse single-line output
    Compact,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
            LogFormat::Compact => "compact",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Build the single output layer for the chosen format.
fn output_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    let base = fmt::layer().with_target(true);
    match format {
        LogFormat::Pretty => base.with_file(true).with_line_number(true).boxed(),
        LogFormat::Json => base.json().boxed(),
        LogFormat::Compact => base.compact().boxed(),
    }
}

/// Install the global subscriber for a named service.
///
/// Fails if a subscriber is already installed (tests install their own).
pub fn init_logging(service_name: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(output_layer(format))
        .with(filter)
        .try_init()?;

    tracing::info!(
        service = service_name,
        format = format.as_str(),
        "Logging initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_round_trips_through_config_strings() {
        for format in [LogFormat::Pretty, LogFormat::Json, LogFormat::Compact] {
            assert_eq!(format.as_str().parse::<LogFormat>(), Ok(format));
        }
    }

    #[test]
    fn test_parse_is_case_insensitive_and_strict() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert!("syslog".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }
}
