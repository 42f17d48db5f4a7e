use overlay_error::{OVError, OVResult};
use std::str::FromStr;
use tracing::{subscriber::set_global_default, Level};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{filter::LevelFilter, fmt, layer::SubscriberExt, Layer, Registry};

const LOG_FILE_NAME: &str = "overlay.log";

/// Console plus daily rolling file logging at one level.
pub struct Logger {
    level: Level,
    _file_guard: Option<WorkerGuard>,
}

impl Logger {
    pub fn new(level: Option<Level>) -> Self {
        Logger {
            level: level.unwrap_or(Level::INFO),
            _file_guard: None,
        }
    }

    /// Build a logger from the configured level name, falling back to
    /// `DEBUG` in debug builds and `INFO` otherwise.
    pub fn from_setting(level: Option<&str>) -> OVResult<Self> {
        let level = match level {
            Some(name) => Level::from_str(name)
                .map_err(|_| OVError::from(format!("Invalid log level: {name}")))?,
            None if cfg!(debug_assertions) => Level::DEBUG,
            None => Level::INFO,
        };
        Ok(Logger::new(Some(level)))
    }

    #[inline]
    pub fn level(&self) -> Level {
        self.level
    }

    /// Install the global subscriber, writing to stdout and `<log_dir>/overlay.log`.
    pub fn initialize(&mut self, log_dir: &str) -> OVResult<()> {
        let file_appender = rolling::daily(log_dir, LOG_FILE_NAME);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        self._file_guard = Some(guard);

        let console_filter = LevelFilter::from_level(self.level);
        let file_filter = LevelFilter::from_level(self.level);

        let console_layer = {
            #[cfg(debug_assertions)]
            let layer = fmt::layer()
                .pretty()
                .with_writer(std::io::stdout)
                .with_file(true)
                .with_line_number(true);

            #[cfg(not(debug_assertions))]
            let layer = fmt::layer()
                .with_writer(std::io::stdout)
                .with_file(false)
                .with_line_number(false);

            layer.with_filter(console_filter)
        };

        let file_layer = {
            #[cfg(debug_assertions)]
            let layer = fmt::layer()
                .pretty()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true);

            #[cfg(not(debug_assertions))]
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_file(false)
                .with_line_number(false);

            layer.with_filter(file_filter)
        };

        let subscriber = Registry::default().with(console_layer).with(file_layer);
        set_global_default(subscriber).map_err(|_| OVError::from("Failed to set logger"))?;
        Ok(())
    }
}
