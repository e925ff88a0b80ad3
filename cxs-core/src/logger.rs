//! Forwards diagnostics from the bridge to the host application.
//!
//! Everything the bridge cannot report to a caller (handle release failures,
//! repeated or unknown completions, late completions) is emitted through the
//! `log` facade. Hosts receive those records by installing a [`Logger`].

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use strum::{Display, EnumString};

/// Receiver of log records, implemented by the host application.
///
/// Exported via `UniFFI`, so it can be implemented in the host language.
///
/// # Examples
///
/// ```rust
/// use cxs_core::logger::{LogLevel, Logger};
///
/// struct StderrLogger;
///
/// impl Logger for StderrLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         eprintln!("[{level}] {message}");
///     }
/// }
/// ```
#[uniffi::export(with_foreign)]
pub trait Logger: Sync + Send {
    /// Records `message` at `level`.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a log record.
///
/// Parses from its lowercase name, so hosts can keep the level in their own
/// configuration as a string (`"debug".parse::<LogLevel>()`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, uniffi::Enum)]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    /// Per-call tracing: dispatch, completion, release.
    Trace,
    /// Lifecycle events and late completions.
    Debug,
    /// Informational messages.
    Info,
    /// Protocol anomalies that were ignored, such as repeated completions.
    Warn,
    /// Failures with no caller to report to, such as a failed handle release.
    Error,
}

impl LogLevel {
    const fn level_filter(self) -> log::LevelFilter {
        match self {
            Self::Trace => log::LevelFilter::Trace,
            Self::Debug => log::LevelFilter::Debug,
            Self::Info => log::LevelFilter::Info,
            Self::Warn => log::LevelFilter::Warn,
            Self::Error => log::LevelFilter::Error,
        }
    }
}

const fn log_level(level: log::Level) -> LogLevel {
    match level {
        log::Level::Error => LogLevel::Error,
        log::Level::Warn => LogLevel::Warn,
        log::Level::Info => LogLevel::Info,
        log::Level::Debug => LogLevel::Debug,
        log::Level::Trace => LogLevel::Trace,
    }
}

/// Only debug and trace records from this crate are forwarded; other crates
/// are forwarded from `info` up.
fn is_forwarded(level: log::Level, module_path: Option<&str>) -> bool {
    let is_from_cxs = module_path.is_some_and(|path| path.starts_with("cxs"));
    let is_debug_or_trace = level == log::Level::Debug || level == log::Level::Trace;
    is_from_cxs || !is_debug_or_trace
}

/// `log::Log` implementation handing records to the installed [`Logger`].
struct ForeignLogger;

impl log::Log for ForeignLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if !is_forwarded(record.level(), record.module_path()) {
            return;
        }

        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(log_level(record.level()), format!("{}", record.args()));
        } else {
            eprintln!("Logger not set: {}", record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Installs the host's logger. Only the first call has an effect.
///
/// Records up to `trace` are forwarded unless [`set_log_level`] says otherwise.
#[uniffi::export]
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        println!("Logger already set");
    }

    if let Err(e) = init_logger() {
        eprintln!("Failed to set logger: {e}");
    }
}

static LOG_LEVEL: Mutex<LogLevel> = Mutex::new(LogLevel::Trace);

fn configured_level() -> LogLevel {
    *LOG_LEVEL.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sets the most verbose level that is still recorded.
///
/// May be called before [`set_logger`]; the level applies once a logger is installed.
#[uniffi::export]
pub fn set_log_level(level: LogLevel) {
    *LOG_LEVEL.lock().unwrap_or_else(PoisonError::into_inner) = level;
    log::set_max_level(level.level_filter());
}

fn init_logger() -> Result<(), log::SetLoggerError> {
    static LOGGER: ForeignLogger = ForeignLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(configured_level().level_filter());
    Ok(())
}
