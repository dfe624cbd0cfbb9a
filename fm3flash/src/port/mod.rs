//! Duplex byte-channel abstraction over the serial link.
//!
//! The protocol layer never talks to a serial port directly; it drives a
//! [`Channel`], which is any half-duplex byte stream with a mutable read
//! timeout. This keeps the engine testable against scripted in-memory
//! channels and independent of the `serialport` crate.
//!
//! ```text
//! +------------------+
//! |   Fm3Flasher     |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |  Channel trait   |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |    NativePort    |
//! |   (serialport)   |
//! +------------------+
//! ```

pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Serial link configuration.
///
/// The FM3 bootloader always runs 8N1 without flow control, so only the
/// parameters that actually vary are configurable.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate. Must match the crystal (9600 at 4 MHz and up from there).
    pub baud_rate: u32,
    /// Read timeout for ordinary status responses.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: crate::protocol::DEFAULT_BAUD,
            timeout: Duration::from_secs(1),
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the read timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A duplex byte stream with a mutable read timeout.
///
/// `read` blocks up to the current timeout and may return fewer bytes than
/// requested when the timeout expires. Writes are expected to complete or
/// fail; there is no partial-write recovery at this layer.
pub trait Channel: Read + Write + Send {
    /// Set the read timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current read timeout.
    fn timeout(&self) -> Duration;

    /// Discard any bytes received but not yet read.
    fn clear_input(&mut self) -> Result<()>;

    /// Discard any bytes written but not yet transmitted.
    fn clear_output(&mut self) -> Result<()>;

    /// Number of bytes available to read without blocking.
    fn bytes_available(&mut self) -> Result<usize>;

    /// Get the channel name/path.
    fn name(&self) -> &str;

    /// Close the channel and release resources.
    ///
    /// After calling this method, further I/O fails. Closing the channel is
    /// the only way to abort an in-flight operation from another context.
    fn close(&mut self) -> Result<()>;
}

// Re-export the serialport-backed implementation
pub use native::NativePort;
