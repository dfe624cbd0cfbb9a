//! Command frame encoding for the FM3 bootloader link.
//!
//! Frames on this link have no magic or length field; they are a bare
//! concatenation of optional parts, and the response length is implied by
//! the command that was sent:
//!
//! ```text
//! +---------+-----------+----------+---------+
//! | Command |  Payload  | Checksum |  CRC16  |
//! +---------+-----------+----------+---------+
//! | 0/1     | 0..n      | 0/1      | 0/2 BE  |
//! +---------+-----------+----------+---------+
//! ```
//!
//! The checksum byte is `(command + sum(payload)) mod 256` (command taken
//! as 0 when absent). The CRC trailer is CRC-16/XMODEM over the payload
//! only, appended big-endian; it is used for flash data blocks, which are
//! sent as payload-only frames.

use {
    crate::protocol::crc::{checksum8, crc16_xmodem},
    byteorder::{BigEndian, WriteBytesExt},
    std::fmt,
};

/// A single command or data frame, built up with the `with_*` methods and
/// serialized with [`Frame::encode`]. Pure in-memory construction; no I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    command: Option<u8>,
    payload: Vec<u8>,
    checksum: bool,
    crc: bool,
}

impl Frame {
    /// Create a frame that starts with the given command byte.
    pub fn command(command: u8) -> Self {
        Self {
            command: Some(command),
            payload: Vec::new(),
            checksum: false,
            crc: false,
        }
    }

    /// Create a frame with no command byte (raw data transfers).
    pub fn payload_only(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            command: None,
            payload: payload.into(),
            checksum: false,
            crc: false,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Append the 8-bit additive checksum when encoding.
    #[must_use]
    pub fn with_checksum(mut self) -> Self {
        self.checksum = true;
        self
    }

    /// Append the big-endian CRC-16/XMODEM of the payload when encoding.
    #[must_use]
    pub fn with_crc(mut self) -> Self {
        self.crc = true;
        self
    }

    /// The command byte, if this frame carries one.
    pub fn command_byte(&self) -> Option<u8> {
        self.command
    }

    /// The frame payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The checksum byte this frame encodes with, if requested.
    pub fn checksum(&self) -> Option<u8> {
        self.checksum
            .then(|| checksum8(&self.payload, self.command.unwrap_or(0)))
    }

    /// Serialize the frame to wire bytes.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.payload.len() + 3);
        if let Some(cmd) = self.command {
            buf.push(cmd);
        }
        buf.extend_from_slice(&self.payload);
        if let Some(chk) = self.checksum() {
            buf.push(chk);
        }
        if self.crc {
            buf.write_u16::<BigEndian>(crc16_xmodem(&self.payload)).unwrap();
        }
        buf
    }

    /// Parse wire bytes back into a frame.
    ///
    /// The layout of a frame is not self-describing, so the caller states
    /// whether a command byte and a checksum byte are present. Returns
    /// `None` when the data is too short or the checksum does not match.
    pub fn parse(data: &[u8], has_command: bool, has_checksum: bool) -> Option<Self> {
        let overhead = usize::from(has_command) + usize::from(has_checksum);
        if data.len() < overhead {
            return None;
        }

        let (command, rest) = if has_command {
            (Some(data[0]), &data[1..])
        } else {
            (None, data)
        };

        let (payload, trailer) = if has_checksum {
            rest.split_at(rest.len() - 1)
        } else {
            (rest, &[][..])
        };

        if has_checksum && trailer[0] != checksum8(payload, command.unwrap_or(0)) {
            return None;
        }

        Some(Self {
            command,
            payload: payload.to_vec(),
            checksum: has_checksum,
            crc: false,
        })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(cmd) = self.command {
            parts.push(format!("cmd:{cmd:02X}"));
        }
        if !self.payload.is_empty() {
            parts.push(format!("buf:{}", hex_preview(&self.payload)));
        }
        if let Some(chk) = self.checksum() {
            parts.push(format!("chk:{chk:02X}"));
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// Abbreviated hex view of a buffer for trace output.
///
/// Short buffers are shown in full; long ones as head and tail.
pub fn hex_preview(buf: &[u8]) -> String {
    const THRESHOLD: usize = 20;
    const HEAD: usize = 12;
    const TAIL: usize = 8;

    fn hex_join(bytes: &[u8]) -> String {
        bytes
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    if buf.len() < THRESHOLD {
        hex_join(buf)
    } else {
        format!(
            "{} ... {}",
            hex_join(&buf[..HEAD]),
            hex_join(&buf[buf.len() - TAIL..])
        )
    }
}
