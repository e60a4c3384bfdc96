//! Logging macros used throughout the crate.
//!
//! Each macro builds a `Logger` front-end at the call site and enqueues the
//! formatted message on the shared worker; failures to log are swallowed so
//! logging never changes control flow.

/// Check if debug logging is enabled
#[macro_export]
macro_rules! debug_enabled {
    () => {{
        let logger = $crate::log::Logger::new();
        logger.is_debug_enabled()
    }};
}

/// Log a debug message (only when debug mode is enabled)
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        let logger = $crate::log::Logger::new();
        let _ = logger.log_debug(&format!($($arg)*));
    };
}

/// Log an informational message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        let logger = $crate::log::Logger::new();
        let _ = logger.log_info(&format!($($arg)*));
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        let logger = $crate::log::Logger::new();
        let _ = logger.log_warn(&format!($($arg)*));
    };
}

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        let logger = $crate::log::Logger::new();
        let _ = logger.log_error(&format!($($arg)*));
    };
}
