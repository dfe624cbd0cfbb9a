//! FM3 bootloader protocol definitions.
//!
//! There is no official documentation for this protocol; everything here
//! was reverse-engineered from UART captures of the vendor's MCU Flash
//! Programmer talking to an MB9AF132L. The command/response byte layout
//! appears to descend from the F2MC-16L bootloader, where a command byte
//! packs a type in its high nibble and a subtype in its low nibble, and a
//! response echoes the type with a result code (1 = OK, 2 = error) in the
//! low nibble. On FM3 the scheme grew extra result codes (0 = continue,
//! 4 = unknown), and programming became two-staged:
//!
//! - Right after reset the mask-ROM loader accepts only [`CMD_PING`],
//!   [`CMD_WRITE_RAM`] and the two unnamed exchanges used while starting
//!   the stage-2 firmware.
//! - Once the stage-2 firmware runs from RAM, the erase / blank-check /
//!   write / read command set becomes available. These commands answer
//!   `0x31` for final success and `0x30` for a successful interim step.
//!
//! All names are local to this crate.

pub mod crc;
pub mod frame;

// Re-export common types
pub use frame::{Frame, hex_preview};

/// Load a program into RAM (mask-ROM loader).
pub const CMD_WRITE_RAM: u8 = 0x00;
/// Liveness probe (mask-ROM loader).
pub const CMD_PING: u8 = 0x18;

/// Write one flash block (stage-2 loader).
pub const CMD_WRITE_FLASH: u8 = 0x08;
/// Read one flash block (stage-2 loader).
pub const CMD_READ_FLASH: u8 = 0x28;
/// Start a chip erase up to an end address (stage-2 loader).
pub const CMD_ERASE_START: u8 = 0x38;
/// Synchronize before/after an erase (stage-2 loader).
pub const CMD_ERASE_SYNC: u8 = 0x39;
/// Finish an erase sequence (stage-2 loader).
pub const CMD_ERASE_END: u8 = 0x3A;
/// Check an address range for blankness (stage-2 loader).
pub const CMD_CHECK_BLANK: u8 = 0x48;

/// Response to a successful [`CMD_PING`].
pub const STATUS_PING_OK: u8 = 0x11;
/// Response to a successful RAM write.
pub const STATUS_RAM_OK: u8 = 0x01;
/// Interim success ("started, not yet done").
pub const STATUS_ACCEPTED: u8 = 0x30;
/// Final success.
pub const STATUS_FINAL: u8 = 0x31;
/// The interim-then-final pair most stage-2 commands answer with.
pub const STATUS_PAIR: [u8; 2] = [STATUS_ACCEPTED, STATUS_FINAL];

/// Fixed marker payload of [`CMD_ERASE_SYNC`].
pub const ERASE_SYNC_MARKER: [u8; 4] = [0x11, 0x22, 0x33, 0x44];

/// First address of the security/CR-trim register blank check.
///
/// Verified on MB9AF132L only; treated as a protocol constant rather than
/// configuration.
pub const BLANK_REGISTER_START: u32 = 0x0010_0000;
/// End address of the security/CR-trim register blank check.
pub const BLANK_REGISTER_END: u32 = 0x0010_0002;

/// Fill byte for the final short block of a write.
pub const PAD_BYTE: u8 = 0xFF;

/// Default UART baud rate (4 MHz crystal; faster crystals allow more).
pub const DEFAULT_BAUD: u32 = 9600;
/// Default flash block transfer size in bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 512;
/// Default flash size (128 KiB, MB9AF132L).
pub const DEFAULT_FLASH_SIZE: u32 = 0x0002_0000;
/// Default RAM load address for the stage-2 firmware.
pub const DEFAULT_RAM_BASE: u32 = 0x2000_0000;
