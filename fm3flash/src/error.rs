//! Error types for fm3flash.

use crate::flasher::{DeviceMode, FlashStep};
use std::io;
use thiserror::Error;

/// Result type for fm3flash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for fm3flash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Device did not answer the liveness ping.
    #[error("Device not responding to ping")]
    NotResponding,

    /// Nothing arrived within the active read timeout.
    #[error("Timeout during {op}: no response")]
    Timeout {
        /// The exchange that went unanswered.
        op: &'static str,
    },

    /// A response had the wrong length or content.
    #[error("Unexpected response during {op}: expected {expected:02x?}, got {got:02x?}")]
    UnexpectedResponse {
        /// The exchange that produced the response.
        op: &'static str,
        /// The bytes the protocol requires here.
        expected: Vec<u8>,
        /// The bytes the device actually sent.
        got: Vec<u8>,
    },

    /// CRC of a flash block did not match its data.
    #[error("CRC mismatch: expected {expected:#06x}, got {actual:#06x}")]
    CrcMismatch {
        /// CRC computed over the received data.
        expected: u16,
        /// CRC the device sent.
        actual: u16,
    },

    /// Operation issued while the device is in the wrong loader stage.
    #[error("Operation requires {expected} mode, but device is in {actual} mode")]
    WrongMode {
        /// Mode the operation needs.
        expected: DeviceMode,
        /// Mode the engine currently tracks.
        actual: DeviceMode,
    },

    /// Stage-2 image is too short to hold the patched byte.
    #[error("Stage-2 image too short: {len} bytes")]
    ImageTooShort {
        /// Length of the offending image.
        len: usize,
    },

    /// Firmware image was not found on the search path.
    #[error("Firmware image not found: {name}")]
    ImageNotFound {
        /// The file name that was looked up.
        name: String,
    },

    /// No usable serial port was found.
    #[error("No serial port found")]
    PortNotFound,

    /// Read-back flash contents differ from the written image.
    #[error("Flash contents do not match the image")]
    VerifyMismatch,

    /// Invalid caller-supplied parameter.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A step of the reflash sequence failed.
    #[error("{step} failed")]
    Step {
        /// Which step of the sequence failed.
        step: FlashStep,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap an error with the reflash step it occurred in.
    pub fn step(step: FlashStep, source: Error) -> Self {
        Self::Step {
            step,
            source: Box::new(source),
        }
    }

    /// The reflash step this error belongs to, if any.
    pub fn failed_step(&self) -> Option<FlashStep> {
        match self {
            Self::Step { step, .. } => Some(*step),
            _ => None,
        }
    }
}
