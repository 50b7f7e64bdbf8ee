//! Structured logging setup
//!
//! Console events go to stderr in one of three formats; an optional file sink
//! always receives JSON lines, rotated daily or appended to a single file.
//! `RUST_LOG` takes precedence over the configured level.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: LogLevel,

    /// Console format
    pub format: LogFormat,

    /// JSON log file; console only when unset
    pub file_path: Option<PathBuf>,

    /// Roll the log file over each day instead of appending forever
    pub rotation: bool,

    /// Emit span enter/close events and span context
    pub include_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: LogLevel::Warn,
            format: LogFormat::Pretty,
            file_path: None,
            rotation: true,
            include_spans: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const ALL: [LogLevel; 5] = [
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }

    /// `EnvFilter` directive scoping this level to the crate's own events
    pub fn filter_directive(&self) -> String {
        format!("{}={}", env!("CARGO_CRATE_NAME"), self)
    }

    /// One step more verbose per `-v`, never quieter than configured
    pub fn raised_by(self, verbosity: u8) -> LogLevel {
        let steps = usize::from(verbosity);
        let index = Self::ALL.iter().position(|l| *l == self).unwrap_or(1);
        Self::ALL[(index + steps).min(Self::ALL.len() - 1)].max(self)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        if wanted == "warning" {
            return Ok(LogLevel::Warn);
        }
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == wanted)
            .ok_or_else(|| format!("Unknown log level '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, colored; for interactive use
    Pretty,
    /// One JSON object per event
    Json,
    /// Single-line text
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => Err(format!("Unknown log format '{}'", other)),
        }
    }
}

fn console_layer<S>(config: &LogConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    let spans = if config.include_spans {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let base = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_span_events(spans);

    match config.format {
        LogFormat::Pretty => base.pretty().with_line_number(true).boxed(),
        LogFormat::Json => base
            .json()
            .with_current_span(config.include_spans)
            .with_span_list(config.include_spans)
            .boxed(),
        LogFormat::Compact => base.compact().boxed(),
    }
}

/// Writer for the log file: a daily rolling appender in the file's directory,
/// or the file itself opened for append
fn file_writer(path: &Path, rotation: bool) -> std::io::Result<BoxMakeWriter> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(directory)?;

    if rotation {
        let prefix = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.log", env!("CARGO_CRATE_NAME")));
        Ok(BoxMakeWriter::new(tracing_appender::rolling::daily(directory, prefix)))
    } else {
        let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        Ok(BoxMakeWriter::new(Mutex::new(file)))
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.filter_directive()));

    let file_layer = match &config.file_path {
        Some(path) => Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer(path, config.rotation)?)
                .with_target(true)
                .with_current_span(config.include_spans)
                .with_span_list(config.include_spans),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer(config))
        .with(file_layer)
        .try_init()?;

    tracing::debug!(
        level = %config.level,
        format = ?config.format,
        file = ?config.file_path,
        "Logging ready"
    );
    Ok(())
}
