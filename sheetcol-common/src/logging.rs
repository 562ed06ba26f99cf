//! Logging setup for the sheetcol services.
//!
//! HTTP plumbing and the workbook reader log a lot at `debug`. Their targets
//! are capped at `warn` so bot activity stays readable at any configured
//! level. A `RUST_LOG` variable replaces the generated filter entirely.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::ObservabilityConfig;

/// Library targets capped at `warn`.
pub const QUIET_TARGETS: &[&str] = &[
    "hyper",
    "hyper_util",
    "reqwest",
    "h2",
    "rustls",
    "tower_http",
    "calamine",
];

/// Output style of the log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, with span fields, for log shippers.
    Json,
    /// Colored single-line text for terminals.
    Pretty,
}

impl LogFormat {
    /// Anything other than `json` falls back to pretty output.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Filter directives: the base level, then every capped target.
fn filter_directives(level: &str, extra_targets: &[String]) -> String {
    let capped = QUIET_TARGETS
        .iter()
        .copied()
        .chain(extra_targets.iter().map(String::as_str))
        .map(|target| format!("{target}=warn"));

    std::iter::once(level.to_string())
        .chain(capped)
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber described by `config`.
///
/// Calling this twice is harmless; the second subscriber is ignored.
pub fn init_logging(config: &ObservabilityConfig) {
    let directives = filter_directives(&config.log_level, &config.excluded_targets);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));
    let format = LogFormat::parse(&config.log_format);

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_ansi(true).with_target(true))
            .try_init(),
    };

    if installed.is_ok() {
        tracing::info!(
            level = %config.log_level,
            format = ?format,
            capped_targets = QUIET_TARGETS.len() + config.excluded_targets.len(),
            "Logging ready"
        );
    }
}

/// Fresh id tying together the log lines of one handled message.
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
