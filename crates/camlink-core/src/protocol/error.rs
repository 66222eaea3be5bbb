//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to the camera over the serial link
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    Serial(String),

    #[error("No response from camera")]
    Timeout,

    #[error("No serial port selected")]
    NoPort,

    #[error("Invalid JSON from camera: {raw}")]
    Parse {
        /// Raw response text, kept for diagnostics
        raw: String,
    },

    #[error("Unexpected status {actual} (expected one of {expected:?}): {raw}")]
    UnexpectedStatus {
        expected: &'static [i64],
        actual: i64,
        raw: String,
    },

    #[error("Missing field `{0}` in camera reply")]
    MissingField(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
