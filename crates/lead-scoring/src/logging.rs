use crate::config::TelemetryConfig;
use std::fmt;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
pub enum LoggingError {
    EnvFilter { value: String, source: ParseError },
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoggingError::EnvFilter { value, .. } => {
                write!(f, "invalid log filter '{value}'")
            }
            LoggingError::Subscriber(err) => write!(f, "logging setup error: {err}"),
        }
    }
}

impl std::error::Error for LoggingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoggingError::EnvFilter { source, .. } => Some(source),
            LoggingError::Subscriber(err) => Some(&**err),
        }
    }
}

/// Targets that follow a bare configured level; dependencies stay at `warn`.
const WORKSPACE_TARGETS: [&str; 2] = ["lead_scoring", "lead_scoring_api"];

/// Expand a bare level such as `debug` into directives scoped to this workspace's crates.
/// Anything that already names targets or lists directives is used as given.
pub fn filter_directives(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }

    let mut directives = vec!["warn".to_string()];
    directives.extend(
        WORKSPACE_TARGETS
            .iter()
            .map(|target| format!("{target}={level}")),
    );
    directives.join(",")
}

/// Filter from the configured level, used when `RUST_LOG` is absent or unparsable.
pub fn configured_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(filter_directives(level)).map_err(|source| LoggingError::EnvFilter {
        value: level.to_string(),
        source,
    })
}

/// Install the global tracing subscriber.
pub fn init(config: &TelemetryConfig) -> Result<(), LoggingError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => configured_filter(&config.log_level)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(LoggingError::Subscriber)
}
