//! Process-wide log output for the service and the admin CLI.

use std::str::FromStr;

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

use crate::util::env::env_opt;

/// Directives used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Line layout of log events, chosen with `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Target, level, span context and source line.
    #[default]
    Full,
    /// One short line per event, for interactive CLI use.
    Compact,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "compact" => Ok(Self::Compact),
            other => Err(anyhow!("unknown log format {other:?} (expected full or compact)")),
        }
    }
}

impl LogFormat {
    /// `LOG_FORMAT` if set and valid, otherwise `fallback`.
    pub fn from_env_or(fallback: LogFormat) -> Self {
        env_opt("LOG_FORMAT")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(fallback)
    }
}

fn build_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(default_filter: &str, format: LogFormat) -> Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(build_filter(default_filter));
    let installed = match format {
        LogFormat::Full => builder.with_target(true).with_line_number(true).try_init(),
        LogFormat::Compact => builder.compact().with_target(false).try_init(),
    };
    installed.map_err(|e| anyhow!("install tracing subscriber: {e}"))
}
