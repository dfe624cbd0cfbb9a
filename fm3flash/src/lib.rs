//! # fm3flash
//!
//! A library for programming the flash of Fujitsu/Spansion/Cypress FM3
//! microcontrollers through their factory serial bootloader.
//!
//! The FM3 boot flow is two-staged: after reset a minimal mask-ROM loader
//! answers on the UART, and a vendor-supplied stage-2 firmware must be
//! downloaded into RAM before the flash erase/write/read commands become
//! available. This crate provides:
//!
//! - The command/response protocol engine for both stages
//! - Frame encoding with the vendor's 8-bit checksums and CRC-16/XMODEM
//!   block integrity checks
//! - Block-oriented erase, blank-check, write, read and verify operations
//! - Serial port discovery for common USB-UART bridges
//!
//! Only the protocol of the MB9AF132L (and its stage-2 firmware from the
//! genuine MCU Flash Programmer) is implemented; other FM3 models may or
//! may not behave the same.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fm3flash::{Fm3Flasher, SerialConfig, flasher::{PING_ATTEMPTS, PING_INTERVAL}};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SerialConfig::new("/dev/ttyUSB0", 9600);
//!     let mut flasher = Fm3Flasher::open(&config)?;
//!     flasher.reset_buffers()?;
//!
//!     if !flasher.ping(PING_ATTEMPTS, PING_INTERVAL)? {
//!         return Err("device not responding".into());
//!     }
//!
//!     // Enter the stage-2 loader, then reflash
//!     let stage2 = std::fs::read("m_flash.9a132l")?;
//!     flasher.download(&stage2, 0x2000_0000)?;
//!
//!     let image = std::fs::read("firmware.bin")?;
//!     flasher.flash_image(&image, 0x0002_0000, 512, |_, _, _| {})?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod flasher;
pub mod image;
pub mod port;
pub mod protocol;

// Re-exports for convenience
pub use {
    device::{DetectedPort, DeviceKind, auto_detect_port, detect_ports},
    error::{Error, Result},
    flasher::{DeviceMode, FlashStep, Fm3Flasher},
    image::{load_image, patch_stage2},
    port::{Channel, NativePort, SerialConfig},
    protocol::Frame,
};
