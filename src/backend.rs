//! FFmpeg backend initialisation and log control.
//!
//! The codec, muxer, and scaling backends are all provided by FFmpeg. This
//! module owns the process-wide side of that: running `ffmpeg_next::init`
//! once, and tuning how chatty FFmpeg's own console logger is. Embedding
//! hosts usually want it silent, so pipelines do not touch the level
//! themselves.
//!
//! # Example
//!
//! ```no_run
//! use framepipe::FfmpegLogLevel;
//!
//! framepipe::set_ffmpeg_log_level(FfmpegLogLevel::Quiet);
//! ```
//!
//! This is unrelated to the Rust-side diagnostics emitted through the
//! [`log`](https://crates.io/crates/log) facade.

use std::sync::OnceLock;

use ffmpeg_next::util::log::Level;

use crate::error::EncodeError;

static INITIALIZED: OnceLock<Result<(), String>> = OnceLock::new();

/// Initialise the FFmpeg libraries for this process.
///
/// Safe to call any number of times; the underlying initialisation runs once
/// and its outcome is remembered.
///
/// # Errors
///
/// Returns [`EncodeError::ResourceAllocation`] if FFmpeg fails to initialise.
pub fn initialize() -> Result<(), EncodeError> {
    INITIALIZED
        .get_or_init(|| {
            log::debug!("Initialising FFmpeg backend");
            ffmpeg_next::init().map_err(|error| error.to_string())
        })
        .clone()
        .map_err(|reason| {
            EncodeError::ResourceAllocation(format!("FFmpeg initialisation failed: {reason}"))
        })
}

/// FFmpeg internal log verbosity, from most quiet to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// No output at all.
    Quiet,
    /// Only conditions that abort the process.
    Panic,
    /// Unrecoverable errors.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Verbose informational messages.
    Verbose,
    /// Debugging messages.
    Debug,
    /// Everything.
    Trace,
}

impl From<FfmpegLogLevel> for Level {
    fn from(level: FfmpegLogLevel) -> Self {
        match level {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }
}

impl From<Level> for FfmpegLogLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Quiet => FfmpegLogLevel::Quiet,
            Level::Panic => FfmpegLogLevel::Panic,
            Level::Fatal => FfmpegLogLevel::Fatal,
            Level::Error => FfmpegLogLevel::Error,
            Level::Warning => FfmpegLogLevel::Warning,
            Level::Info => FfmpegLogLevel::Info,
            Level::Verbose => FfmpegLogLevel::Verbose,
            Level::Debug => FfmpegLogLevel::Debug,
            Level::Trace => FfmpegLogLevel::Trace,
        }
    }
}

impl FfmpegLogLevel {
    /// Every level, from most quiet to most verbose.
    pub const ALL: [FfmpegLogLevel; 9] = [
        FfmpegLogLevel::Quiet,
        FfmpegLogLevel::Panic,
        FfmpegLogLevel::Fatal,
        FfmpegLogLevel::Error,
        FfmpegLogLevel::Warning,
        FfmpegLogLevel::Info,
        FfmpegLogLevel::Verbose,
        FfmpegLogLevel::Debug,
        FfmpegLogLevel::Trace,
    ];

    /// Parse a level name as accepted on the command line.
    ///
    /// Matching is case-insensitive; `warn` is accepted for `warning`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "quiet" => Some(FfmpegLogLevel::Quiet),
            "panic" => Some(FfmpegLogLevel::Panic),
            "fatal" => Some(FfmpegLogLevel::Fatal),
            "error" => Some(FfmpegLogLevel::Error),
            "warning" | "warn" => Some(FfmpegLogLevel::Warning),
            "info" => Some(FfmpegLogLevel::Info),
            "verbose" => Some(FfmpegLogLevel::Verbose),
            "debug" => Some(FfmpegLogLevel::Debug),
            "trace" => Some(FfmpegLogLevel::Trace),
            _ => None,
        }
    }
}

/// Set FFmpeg's own console log level for the whole process.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.into());
}

/// Current FFmpeg console log level, if it maps to a known variant.
pub fn get_ffmpeg_log_level() -> Option<FfmpegLogLevel> {
    ffmpeg_next::util::log::get_level().ok().map(FfmpegLogLevel::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_aliases_and_case() {
        assert_eq!(FfmpegLogLevel::parse("QUIET"), Some(FfmpegLogLevel::Quiet));
        assert_eq!(FfmpegLogLevel::parse("warn"), Some(FfmpegLogLevel::Warning));
        assert_eq!(FfmpegLogLevel::parse("loud"), None);
    }

    #[test]
    fn every_name_parses_back() {
        let names = [
            "quiet", "panic", "fatal", "error", "warning", "info", "verbose", "debug", "trace",
        ];
        for name in names {
            let level = FfmpegLogLevel::parse(name).unwrap();
            assert_eq!(format!("{level:?}").to_ascii_lowercase(), name);
        }
    }

    #[test]
    fn set_level_is_read_back() {
        let previous = get_ffmpeg_log_level();
        for level in FfmpegLogLevel::ALL {
            set_ffmpeg_log_level(level);
            assert_eq!(get_ffmpeg_log_level(), Some(level));
        }
        set_ffmpeg_log_level(previous.unwrap_or(FfmpegLogLevel::Warning));
    }

    #[test]
    fn initialize_is_repeatable() {
        assert!(initialize().is_ok());
        assert!(initialize().is_ok());
    }
}
