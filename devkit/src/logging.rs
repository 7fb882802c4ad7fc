//! Tracing setup shared by the devkit binaries.
//!
//! Filtering comes from `RUST_LOG`; `DEVKIT_LOG_FORMAT=json` switches the
//! output to one JSON object per line with span fields included.

use std::io::{self, Write};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    /// Read `DEVKIT_LOG_FORMAT`. Unknown values fall back to compact.
    pub fn from_env() -> Self {
        Self::parse(std::env::var("DEVKIT_LOG_FORMAT").ok().as_deref())
    }

    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Install the global subscriber writing to stdout.
///
/// `default_directive` applies when `RUST_LOG` is unset, e.g. `"info"`.
pub fn init(default_directive: &str) {
    init_with_writer(default_directive, LogFormat::from_env(), io::stdout);
}

/// Install the global subscriber writing to stderr, for CLIs whose stdout is data.
pub fn init_stderr(default_directive: &str) {
    init_with_writer(default_directive, LogFormat::from_env(), io::stderr);
}

fn init_with_writer<W>(default_directive: &str, format: LogFormat, writer: W)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(writer),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(writer))
            .try_init(),
    };
    if let Err(err) = result {
        let _ = writeln!(io::stderr(), "tracing already initialized: {err}");
    }
}
