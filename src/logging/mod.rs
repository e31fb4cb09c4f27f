//! Structured logging module for the onboarding engine
//!
//! Provides file-based logging with rotation and structured log output.
//! Logs are written to: %APPDATA%/netonboard/logs/

pub mod macros;

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the logging system
///
/// Creates log directory and sets up daily rotating log files.
/// Logs are written to: `%APPDATA%/netonboard/logs/netonboard.log.YYYY-MM-DD`
///
/// # Log Levels
/// - ERROR: Critical errors that need immediate attention
/// - WARN: Warning conditions
/// - INFO: Informational messages (default)
/// - DEBUG: Detailed information for debugging
/// - TRACE: Very detailed trace information
///
/// Set `RUST_LOG` environment variable to control log level:
/// - `RUST_LOG=debug` for debug level
/// - `RUST_LOG=trace` for trace level
pub fn init_logging() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let log_dir = get_log_directory()?;

    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "netonboard.log");

    // Console layer (for stderr)
    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .compact();

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false) // No ANSI colors in file
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .json(); // JSON format for easier parsing

    // Default to INFO level unless RUST_LOG is set
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let init_result = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    if let Err(e) = init_result {
        // Avoid panicking when another subsystem/test already installed a global subscriber.
        if e.to_string().contains("already been set") {
            return Ok(log_dir);
        }
        return Err(Box::new(e));
    }

    tracing::info!("Logging initialized. Log directory: {}", log_dir.display());

    Ok(log_dir)
}

/// Get log directory path
///
/// Returns: `%APPDATA%/netonboard/logs` on Windows
///          `~/.config/netonboard/logs` on Linux/macOS
fn get_log_directory() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let base_dir = if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .ok_or("Could not find APPDATA directory")?
            .join("netonboard")
    } else {
        dirs::config_dir()
            .ok_or("Could not find config directory")?
            .join("netonboard")
    };

    Ok(base_dir.join("logs"))
}
