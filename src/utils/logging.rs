//! Logging setup plus macros gated on a module-level `ENABLE_LOGS` flag.
//!
//! Usage:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_debug, log_info};
//!
//! log_info!("session saved for circuit {}", circuit_id);
//! ```
//!
//! Each calling module defines the flag, so noisy modules can be muted without
//! touching `RUST_LOG`.

use log::LevelFilter;

/// Install the global `env_logger`. `RUST_LOG` wins over `default_level`.
/// Safe to call more than once; later calls are ignored.
pub fn init(default_level: &str) {
    let level = default_level.parse().unwrap_or(LevelFilter::Info);
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
