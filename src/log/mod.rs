mod errors;
mod file;
mod formatter;
mod macros;

pub use errors::LogError;

use std::sync::atomic::{AtomicBool, Ordering};

// Global flag for enabling debug logging
static DEBUG_MODE: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Copy)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

#[derive(Clone)]
pub struct Logger {
    file_logger: file::FileLogger,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    pub fn new() -> Self {
        Self {
            file_logger: file::FileLogger::new(),
        }
    }

    pub fn enable_debug(&self) {
        DEBUG_MODE.store(true, Ordering::SeqCst);
    }

    pub fn is_debug_enabled(&self) -> bool {
        DEBUG_MODE.load(Ordering::SeqCst)
    }

    pub fn log_debug(&self, message: &str) -> Result<(), LogError> {
        if self.is_debug_enabled() {
            self.file_logger.log(LogLevel::Debug, message)?;
        }
        Ok(())
    }

    pub fn log_info(&self, message: &str) -> Result<(), LogError> {
        self.file_logger.log(LogLevel::Info, message)
    }

    pub fn log_warn(&self, message: &str) -> Result<(), LogError> {
        self.file_logger.log(LogLevel::Warning, message)
    }

    pub fn log_error(&self, message: &str) -> Result<(), LogError> {
        self.file_logger.log(LogLevel::Error, message)
    }

    /// Force-flush any buffered log output. Used before process exit.
    pub fn flush(&self) -> Result<(), LogError> {
        self.file_logger.flush()
    }
}
