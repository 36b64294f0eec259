//! Tracing subscriber setup for the CLI.
//!
//! Logs go to stderr so stdout stays reserved for decisions and reports.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LogFormat;

/// Build the filter, falling back to `warn` when the directive does not parse.
pub fn build_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(directive: &str, format: LogFormat) -> Result<()> {
    let registry = tracing_subscriber::registry().with(build_filter(directive));
    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_accepts_directives() {
        assert_eq!(build_filter("debug").to_string(), "debug");
        assert_eq!(
            build_filter("pipeline_governor=trace").to_string(),
            "pipeline_governor=trace"
        );
    }

    #[test]
    fn test_build_filter_falls_back_on_garbage() {
        assert_eq!(build_filter("pipeline_governor=loudest").to_string(), "warn");
    }
}
