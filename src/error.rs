//! Error types for tiny_clicker.
//!
//! Every error is handled where the operation was requested: parse problems are
//! shown inline, profile problems abort the load or save, and hotkey problems only
//! disable the hotkey. None of them terminate the process.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum ClickerError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Profile '{path}' is not a valid click profile: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    #[error("Cannot access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Pointer(#[from] PointerError),
}

/// Malformed coordinate or number text typed by the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Expected coordinates as \"x, y\", got '{input}'")]
    MissingField { input: String },

    #[error("{field} must be an integer, got '{value}'")]
    InvalidInteger { field: &'static str, value: String },

    #[error("{field} must be greater than zero, got '{value}'")]
    NotPositive { field: &'static str, value: String },
}

/// A profile file that is not a list of `{x, y, delay}` objects.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct FormatError(#[from] pub serde_json::Error);

/// Hotkey registration problems. These are logged and the application keeps
/// running without the hotkey.
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Global key listener failed: {0}")]
    ListenFailed(String),

    #[error("Global hotkeys are not available in this build")]
    Unsupported,

    #[error("Cannot start hotkey dispatcher: {0}")]
    DispatcherStart(#[source] std::io::Error),
}

/// Failures of the OS pointer primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PointerError {
    #[error("Pointer move to ({x}, {y}) failed: {reason}")]
    Move { x: i32, y: i32, reason: String },

    #[error("Click failed: {0}")]
    Click(String),

    #[error("Cannot query pointer position: {0}")]
    Location(String),
}

pub type Result<T> = std::result::Result<T, ClickerError>;
