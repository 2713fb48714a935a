//! Initialisation and configuration of the program's logging system.
//!
//! Log messages are written to the terminal (warnings and errors to stderr, everything else to
//! stdout) and, when an output directory is given, to plain-text log files in that directory.
use anyhow::{Context, Result};
use chrono::Local;
use fern::colors::{Color, ColoredLevelConfig};
use fern::{Dispatch, FormatCallback};
use log::{LevelFilter, Record};
use std::env;
use std::fmt::{Arguments, Display};
use std::io::IsTerminal;
use std::path::Path;
use std::sync::OnceLock;

/// The default log level for the program.
///
/// Used as a fallback if the user hasn't specified something else with the `REBALANCE_LOG_LEVEL`
/// environment variable or the settings file.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable which overrides the log level from the settings file
const LOG_LEVEL_ENV_VAR: &str = "REBALANCE_LOG_LEVEL";

/// The file name for the log file containing messages about the ordinary operation of the program
const LOG_INFO_FILE_NAME: &str = "rebalance_info.log";

/// The file name for the log file containing all messages, including debug output
const LOG_DEBUG_FILE_NAME: &str = "rebalance_debug.log";

/// Used to check whether the logger has been initialised
static LOGGER_INIT: OnceLock<()> = OnceLock::new();

/// Whether the program logger has been initialised
pub fn is_logger_initialised() -> bool {
    LOGGER_INIT.get().is_some()
}

/// Parse a log level from a string, case-insensitively
fn parse_log_level(log_level: &str) -> Result<LevelFilter> {
    log_level
        .parse::<LevelFilter>()
        .ok()
        .with_context(|| format!("Unknown log level: {log_level}"))
}

/// Initialise the program logger using the `fern` logging library.
///
/// The user can specify their preferred logging level via the `log_level` setting in the settings
/// file, which can be overridden with the `REBALANCE_LOG_LEVEL` environment variable. If neither
/// is set, [`DEFAULT_LOG_LEVEL`] is used.
///
/// # Arguments
///
/// * `log_level_from_settings` - The log level specified in the settings file
/// * `log_file_path` - The directory in which to write log files, if any
pub fn init(log_level_from_settings: &str, log_file_path: Option<&Path>) -> Result<()> {
    let log_level = env::var(LOG_LEVEL_ENV_VAR).unwrap_or_else(|_| log_level_from_settings.into());
    let log_level = parse_log_level(&log_level)?;

    let colours = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::Magenta);

    // Only use colours if writing to a terminal
    let use_colour_stdout = std::io::stdout().is_terminal();
    let use_colour_stderr = std::io::stderr().is_terminal();

    let mut dispatch = Dispatch::new()
        .chain(
            // Non-error messages go to stdout
            Dispatch::new()
                .filter(|metadata| metadata.level() > LevelFilter::Warn)
                .format(move |out, message, record| {
                    write_log_colour(out, message, record, use_colour_stdout, &colours);
                })
                .level(log_level)
                .chain(std::io::stdout()),
        )
        .chain(
            // Warnings and errors go to stderr
            Dispatch::new()
                .format(move |out, message, record| {
                    write_log_colour(out, message, record, use_colour_stderr, &colours);
                })
                .level(log_level.min(LevelFilter::Warn))
                .chain(std::io::stderr()),
        );

    if let Some(log_file_path) = log_file_path {
        let info_log_file = log_file_path.join(LOG_INFO_FILE_NAME);
        let debug_log_file = log_file_path.join(LOG_DEBUG_FILE_NAME);

        dispatch = dispatch
            .chain(
                Dispatch::new()
                    .format(write_log_plain)
                    .level(log_level.min(LevelFilter::Info))
                    .chain(fern::log_file(&info_log_file).with_context(|| {
                        format!("Could not open log file {}", info_log_file.display())
                    })?),
            )
            .chain(
                Dispatch::new()
                    .format(write_log_plain)
                    .level(log_level.max(LevelFilter::Debug))
                    .chain(fern::log_file(&debug_log_file).with_context(|| {
                        format!("Could not open log file {}", debug_log_file.display())
                    })?),
            );
    }

    dispatch.apply().context("Logger already initialised")?;
    LOGGER_INIT.get_or_init(|| ());

    Ok(())
}

/// Write to the log in the format we want for the program
fn write_log<T: Display>(out: FormatCallback, level: T, target: &str, message: &Arguments) {
    let timestamp = Local::now().format("%H:%M:%S");

    out.finish(format_args!("[{timestamp} {level} {target}] {message}"));
}

/// Write to the log with no colours
fn write_log_plain(out: FormatCallback, message: &Arguments, record: &Record) {
    write_log(out, record.level(), record.target(), message);
}

/// Write to the log with optional colours
fn write_log_colour(
    out: FormatCallback,
    message: &Arguments,
    record: &Record,
    use_colour: bool,
    colours: &ColoredLevelConfig,
) {
    if use_colour {
        write_log(out, colours.color(record.level()), record.target(), message);
    } else {
        write_log_plain(out, message, record);
    }
}
