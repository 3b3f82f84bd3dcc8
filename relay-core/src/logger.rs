use crate::config::{ConfigError, LoggingConfig};
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use std::fs::OpenOptions;

pub fn parse_level(level: &str) -> Option<LevelFilter> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Some(LevelFilter::Trace),
        "debug" => Some(LevelFilter::Debug),
        "info" => Some(LevelFilter::Info),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "error" => Some(LevelFilter::Error),
        "off" => Some(LevelFilter::Off),
        _ => None,
    }
}

/// Install the global logger. Call once, early; a second call fails.
pub fn setup_logger(config: &LoggingConfig) -> Result<(), ConfigError> {
    let log_level = parse_level(config.level()).unwrap_or(LevelFilter::Info);

    let colors = ColoredLevelConfig::new()
        .trace(Color::BrightBlack)
        .debug(Color::BrightBlue)
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red);

    let base_config = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(log_level);

    let dispatch = match config.file() {
        Some(file_path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(file_path)
                .map_err(|e| {
                    ConfigError::Logger(format!("failed to open log file '{file_path}': {e}"))
                })?;
            base_config.chain(file)
        }
        None => base_config.chain(std::io::stderr()),
    };

    dispatch
        .apply()
        .map_err(|e| ConfigError::Logger(e.to_string()))?;

    log::info!("Logger initialized with level: {}", config.level());
    Ok(())
}
