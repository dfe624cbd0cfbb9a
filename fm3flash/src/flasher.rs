//! FM3 bootloader protocol engine.
//!
//! [`Fm3Flasher`] owns a [`Channel`] and drives the two-stage bootloader:
//! the mask-ROM loader that answers pings and accepts a RAM download, and
//! the stage-2 loader that exposes the flash erase/write/read commands.
//! Every operation is a strict half-duplex command/response sequence; a
//! send is always followed by a bounded-timeout receive, and responses are
//! positionally tied to the preceding request.
//!
//! ## Generic Channel Support
//!
//! The flasher is generic over the channel, so it works with a real serial
//! port or a scripted in-memory channel in tests:
//!
//! ```rust,no_run
//! use fm3flash::{Fm3Flasher, SerialConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SerialConfig::new("/dev/ttyUSB0", 9600);
//!     let mut flasher = Fm3Flasher::open(&config)?;
//!
//!     let stage2 = std::fs::read("m_flash.9a132l")?;
//!     flasher.download(&stage2, 0x2000_0000)?;
//!
//!     let image = std::fs::read("firmware.bin")?;
//!     flasher.flash_image(&image, 0x0002_0000, 512, |step, done, total| {
//!         println!("{step}: {done}/{total}");
//!     })?;
//!
//!     Ok(())
//! }
//! ```

use {
    crate::{
        error::{Error, Result},
        image,
        port::{Channel, NativePort, SerialConfig},
        protocol::{
            BLANK_REGISTER_END, BLANK_REGISTER_START, CMD_CHECK_BLANK, CMD_ERASE_END,
            CMD_ERASE_START, CMD_ERASE_SYNC, CMD_PING, CMD_READ_FLASH, CMD_WRITE_FLASH,
            CMD_WRITE_RAM, ERASE_SYNC_MARKER, Frame, PAD_BYTE, STATUS_ACCEPTED, STATUS_FINAL,
            STATUS_PAIR, STATUS_PING_OK, STATUS_RAM_OK, crc::crc16_xmodem, hex_preview,
        },
    },
    byteorder::{LittleEndian, WriteBytesExt},
    log::{debug, info, trace},
    std::{fmt, io, thread, time::Duration},
};

/// Default number of liveness ping attempts.
pub const PING_ATTEMPTS: u32 = 10;

/// Delay between liveness ping attempts.
pub const PING_INTERVAL: Duration = Duration::from_millis(500);

/// Extended timeout for the erase-completion wait, the one long-running
/// exchange in the protocol.
const ERASE_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Device settling delay between the erase sync and erase start exchanges.
const ERASE_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Device settling delay before each of the two loader-start exchanges.
const EXEC_SETTLE_DELAY: Duration = Duration::from_millis(300);

/// Sync response length of [`CMD_ERASE_SYNC`]; only its last byte is
/// meaningful.
const ERASE_SYNC_RESPONSE_LEN: usize = 10;

/// Which loader the device is currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    /// Mask-ROM loader, active right after reset.
    PreLoader,
    /// Stage-2 loader running from RAM.
    PostLoader,
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreLoader => write!(f, "pre-loader"),
            Self::PostLoader => write!(f, "post-loader"),
        }
    }
}

/// Steps of the full reflash sequence, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashStep {
    /// Chip erase.
    Erase,
    /// Blank check after the erase.
    BlankCheck,
    /// Block-wise flash write.
    Write,
    /// Read-back comparison.
    Verify,
}

impl fmt::Display for FlashStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Erase => write!(f, "erase"),
            Self::BlankCheck => write!(f, "blank check"),
            Self::Write => write!(f, "write"),
            Self::Verify => write!(f, "verify"),
        }
    }
}

/// FM3 bootloader driver.
///
/// Generic over the channel type `C`, which must implement the [`Channel`]
/// trait. The engine tracks the loader stage explicitly and rejects
/// out-of-order operations before touching the wire.
pub struct Fm3Flasher<C: Channel> {
    channel: C,
    mode: DeviceMode,
    dry_run: bool,
}

impl<C: Channel> Fm3Flasher<C> {
    /// Create a new flasher over an open channel.
    ///
    /// The device is assumed to be freshly reset, i.e. in
    /// [`DeviceMode::PreLoader`].
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            mode: DeviceMode::PreLoader,
            dry_run: false,
        }
    }

    /// Enable dry-run mode for tracing a command sequence without hardware
    /// attached: frames are trace-logged but never transmitted, every
    /// receive returns empty immediately, and response expectations pass
    /// vacuously so the sequence runs to completion. Reads yield pad bytes
    /// since there is no device to produce data.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Override the assumed loader stage.
    ///
    /// Use [`DeviceMode::PostLoader`] when a stage-2 loader is already
    /// running, e.g. after a previous invocation that skipped the reset.
    #[must_use]
    pub fn with_mode(mut self, mode: DeviceMode) -> Self {
        self.mode = mode;
        self
    }

    /// The loader stage the engine currently tracks.
    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    /// Get a reference to the underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Get a mutable reference to the underlying channel.
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Consume the flasher and return the underlying channel.
    pub fn into_channel(self) -> C {
        self.channel
    }

    /// Discard stale bytes on both sides of the channel.
    pub fn reset_buffers(&mut self) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        let pending = self.channel.bytes_available()?;
        if pending > 0 {
            debug!("Discarding {pending} stale input bytes");
        }
        self.channel.clear_input()?;
        self.channel.clear_output()
    }

    fn require(&self, expected: DeviceMode) -> Result<()> {
        if self.mode == expected {
            Ok(())
        } else {
            Err(Error::WrongMode {
                expected,
                actual: self.mode,
            })
        }
    }

    /// Send one frame to the device.
    fn send(&mut self, frame: &Frame) -> Result<()> {
        trace!("send {frame}");
        if self.dry_run {
            return Ok(());
        }
        self.channel.write_all(&frame.encode())?;
        self.channel.flush()?;
        Ok(())
    }

    /// Read up to `want` bytes, stopping at the channel's read timeout.
    ///
    /// A timeout is not an error here; it shows up as a short (possibly
    /// empty) result, and the caller decides what that means.
    fn recv(&mut self, want: usize) -> Result<Vec<u8>> {
        if self.dry_run {
            return Ok(Vec::new());
        }
        let mut data = Vec::with_capacity(want);
        let mut buf = [0u8; 256];
        while data.len() < want {
            let n = (want - data.len()).min(buf.len());
            match self.channel.read(&mut buf[..n]) {
                Ok(0) => break,
                Ok(r) => data.extend_from_slice(&buf[..r]),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        trace!("got {}", hex_preview(&data));
        Ok(data)
    }

    /// Read with a temporary timeout, restoring the previous one on every
    /// exit path.
    fn recv_with_timeout(&mut self, want: usize, timeout: Duration) -> Result<Vec<u8>> {
        let previous = self.channel.timeout();
        self.channel.set_timeout(timeout)?;
        let received = self.recv(want);
        let restored = self.channel.set_timeout(previous);
        let data = received?;
        restored?;
        Ok(data)
    }

    /// Compare a response against the expected bytes, unless this is a
    /// dry run (in which case no response can exist).
    fn check(&self, op: &'static str, expected: &[u8], got: Vec<u8>) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        check_response(op, expected, got)
    }

    /// Send a frame and require an exact response.
    fn expect(&mut self, frame: Frame, expected: &[u8], op: &'static str) -> Result<()> {
        self.send(&frame)?;
        let got = self.recv(expected.len())?;
        self.check(op, expected, got)
    }

    /// Probe the mask-ROM loader for liveness.
    ///
    /// Sends a bare ping frame up to `attempts` times, sleeping `interval`
    /// between attempts. An unanswered ping is reported as `Ok(false)`,
    /// never as an error; only channel faults propagate.
    pub fn ping(&mut self, attempts: u32, interval: Duration) -> Result<bool> {
        if self.dry_run {
            self.send(&Frame::command(CMD_PING))?;
            return Ok(true);
        }
        for attempt in 1..=attempts {
            self.send(&Frame::command(CMD_PING))?;
            if self.recv(1)? == [STATUS_PING_OK] {
                debug!("Ping acknowledged on attempt {attempt}");
                return Ok(true);
            }
            if attempt < attempts {
                thread::sleep(interval);
            }
        }
        Ok(false)
    }

    /// Load the stage-2 firmware into RAM and start it.
    ///
    /// On success the device leaves the mask-ROM loader for good and the
    /// engine transitions to [`DeviceMode::PostLoader`]. Any failing step
    /// short-circuits; retrying is a caller decision.
    #[allow(clippy::cast_possible_truncation)] // stage-2 images are a few KiB
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn download(&mut self, stage2: &[u8], ram_addr: u32) -> Result<()> {
        self.require(DeviceMode::PreLoader)?;

        if !self.ping(1, PING_INTERVAL)? {
            return Err(Error::NotResponding);
        }

        let staged = image::patch_stage2(stage2)?;
        debug!(
            "Loading stage-2 firmware ({} bytes) to {ram_addr:#010X}",
            staged.len()
        );

        let mut header = Vec::with_capacity(8);
        header.write_u32::<LittleEndian>(ram_addr).unwrap();
        header.write_u32::<LittleEndian>(staged.len() as u32).unwrap();
        self.expect(
            Frame::command(CMD_WRITE_RAM).with_payload(header).with_checksum(),
            &[STATUS_RAM_OK],
            "write ram",
        )?;

        self.expect(
            Frame::payload_only(staged).with_checksum(),
            &[STATUS_RAM_OK],
            "load image",
        )?;

        if !self.ping(1, PING_INTERVAL)? {
            return Err(Error::NotResponding);
        }

        // The meaning of the next two commands is unknown; the stock
        // programmer sends exactly these bytes before the loaded firmware
        // starts answering stage-2 commands.
        thread::sleep(EXEC_SETTLE_DELAY);
        self.expect(
            Frame::command(0xC0).with_payload([0u8; 8]).with_checksum(),
            &[STATUS_FINAL],
            "loader sync",
        )?;

        thread::sleep(EXEC_SETTLE_DELAY);
        self.expect(Frame::command(0xE8), &[STATUS_FINAL], "loader start")?;

        self.mode = DeviceMode::PostLoader;
        info!("Stage-2 loader running");
        Ok(())
    }

    /// One ERASE_SYNC exchange: fixed marker out, 10 bytes back, of which
    /// only the last must be the final status.
    fn erase_sync(&mut self) -> Result<()> {
        self.send(&Frame::command(CMD_ERASE_SYNC).with_payload(ERASE_SYNC_MARKER))?;
        let got = self.recv(ERASE_SYNC_RESPONSE_LEN)?;
        if self.dry_run {
            return Ok(());
        }
        match got.last() {
            None => Err(Error::Timeout { op: "erase sync" }),
            Some(&STATUS_FINAL) => Ok(()),
            Some(_) => Err(Error::UnexpectedResponse {
                op: "erase sync",
                expected: vec![STATUS_FINAL],
                got,
            }),
        }
    }

    /// Erase flash up to `end_addr` (inclusive).
    ///
    /// The wait for the completion status is the single long-running
    /// exchange in the protocol and uses its own extended timeout; the
    /// channel's ordinary timeout is restored afterwards no matter how the
    /// wait ends.
    pub fn erase(&mut self, end_addr: u32) -> Result<()> {
        self.require(DeviceMode::PostLoader)?;
        info!("Erasing flash up to {end_addr:#010X}");

        self.erase_sync()?;
        thread::sleep(ERASE_SETTLE_DELAY);

        self.expect(
            Frame::command(CMD_ERASE_START).with_payload(end_addr.to_le_bytes()),
            &[STATUS_ACCEPTED],
            "erase start",
        )?;

        let got = self.recv_with_timeout(1, ERASE_WAIT_TIMEOUT)?;
        self.check("erase wait", &[STATUS_FINAL], got)?;

        self.erase_sync()?;

        self.expect(
            Frame::command(CMD_ERASE_END).with_payload([0u8; 4]),
            &STATUS_PAIR,
            "erase end",
        )?;

        info!("Erase complete");
        Ok(())
    }

    /// Check `start..end` (end exclusive) for blankness.
    ///
    /// With `register_check`, the security/CR-trim register range is
    /// checked as well; both checks must pass.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn check_blank(&mut self, start: u32, end: u32, register_check: bool) -> Result<()> {
        self.require(DeviceMode::PostLoader)?;

        let mut range = Vec::with_capacity(8);
        range.write_u32::<LittleEndian>(start).unwrap();
        range.write_u32::<LittleEndian>(end).unwrap();
        self.expect(
            Frame::command(CMD_CHECK_BLANK).with_payload(range),
            &STATUS_PAIR,
            "blank check",
        )?;

        if register_check {
            let mut range = Vec::with_capacity(8);
            range.write_u32::<LittleEndian>(BLANK_REGISTER_START).unwrap();
            range.write_u32::<LittleEndian>(BLANK_REGISTER_END).unwrap();
            self.expect(
                Frame::command(CMD_CHECK_BLANK).with_payload(range),
                &STATUS_PAIR,
                "register blank check",
            )?;
        }

        Ok(())
    }

    /// Write an image to flash in `block_size` chunks starting at offset 0.
    ///
    /// The final short chunk is padded with `0xFF` to a whole block; each
    /// block carries a CRC-16 trailer. The first failing block aborts the
    /// whole write. `progress` receives `(bytes_written, total)`.
    #[allow(clippy::cast_possible_truncation)] // flash offsets fit in u32
    pub fn write_flash<F>(&mut self, image: &[u8], block_size: usize, mut progress: F) -> Result<()>
    where
        F: FnMut(usize, usize),
    {
        self.require(DeviceMode::PostLoader)?;
        if block_size == 0 {
            return Err(Error::Config("block size must be non-zero".into()));
        }

        let total = image.len();
        for (index, chunk) in image.chunks(block_size).enumerate() {
            let offset = index * block_size;
            self.expect(
                Frame::command(CMD_WRITE_FLASH).with_payload((offset as u32).to_le_bytes()),
                &STATUS_PAIR,
                "write setup",
            )?;

            let mut block = chunk.to_vec();
            block.resize(block_size, PAD_BYTE);
            self.expect(
                Frame::payload_only(block).with_crc(),
                &STATUS_PAIR,
                "write block",
            )?;

            progress(offset + chunk.len(), total);
        }

        Ok(())
    }

    /// Read `size` bytes of flash in `block_size` chunks.
    ///
    /// Whole blocks are returned, so the result may run past `size` by up
    /// to one block of pad bytes; the caller trims to the true length. Any
    /// CRC or status fault discards everything read so far.
    #[allow(clippy::cast_possible_truncation)] // flash offsets fit in u32
    pub fn read_flash<F>(&mut self, size: usize, block_size: usize, mut progress: F) -> Result<Vec<u8>>
    where
        F: FnMut(usize, usize),
    {
        self.require(DeviceMode::PostLoader)?;
        if block_size == 0 {
            return Err(Error::Config("block size must be non-zero".into()));
        }

        let mut contents = Vec::with_capacity(size.next_multiple_of(block_size));
        let mut offset = 0;
        while offset < size {
            self.expect(
                Frame::command(CMD_READ_FLASH).with_payload((offset as u32).to_le_bytes()),
                &STATUS_PAIR,
                "read setup",
            )?;

            if self.dry_run {
                contents.resize(contents.len() + block_size, PAD_BYTE);
                offset += block_size;
                progress(offset.min(size), size);
                continue;
            }

            let block = self.recv(block_size)?;
            if block.len() < block_size {
                return Err(Error::Timeout { op: "read block" });
            }

            let crc = self.recv(2)?;
            if crc.len() < 2 {
                return Err(Error::Timeout { op: "read block crc" });
            }
            let actual = u16::from_be_bytes([crc[0], crc[1]]);
            let expected = crc16_xmodem(&block);
            if actual != expected {
                return Err(Error::CrcMismatch { expected, actual });
            }

            let status = self.recv(1)?;
            self.check("read status", &[STATUS_FINAL], status)?;

            contents.extend_from_slice(&block);
            offset += block_size;
            progress(offset.min(size), size);
        }

        Ok(contents)
    }

    /// Read back `image.len()` bytes and compare.
    ///
    /// `Ok(false)` means the device answered correctly but the contents
    /// differ; protocol faults surface as errors.
    pub fn verify<F>(&mut self, image: &[u8], block_size: usize, progress: F) -> Result<bool>
    where
        F: FnMut(usize, usize),
    {
        let contents = self.read_flash(image.len(), block_size, progress)?;
        Ok(contents[..image.len()] == *image)
    }

    /// Full reflash: erase, blank-check, write, verify.
    ///
    /// `flash_size` is the exclusive end of the flash region; the erase
    /// command takes the inclusive last address. The first failing step
    /// stops the sequence, and the error records which step it was.
    /// `progress` receives `(step, bytes_done, total)` during the block
    /// transfer steps.
    pub fn flash_image<F>(
        &mut self,
        image: &[u8],
        flash_size: u32,
        block_size: usize,
        mut progress: F,
    ) -> Result<()>
    where
        F: FnMut(FlashStep, usize, usize),
    {
        self.erase(flash_size.saturating_sub(1))
            .map_err(|e| Error::step(FlashStep::Erase, e))?;

        self.check_blank(0, flash_size, false)
            .map_err(|e| Error::step(FlashStep::BlankCheck, e))?;

        self.write_flash(image, block_size, |done, total| {
            progress(FlashStep::Write, done, total);
        })
        .map_err(|e| Error::step(FlashStep::Write, e))?;

        let matches = self
            .verify(image, block_size, |done, total| {
                progress(FlashStep::Verify, done, total);
            })
            .map_err(|e| Error::step(FlashStep::Verify, e))?;
        if !matches {
            return Err(Error::step(FlashStep::Verify, Error::VerifyMismatch));
        }

        info!("Reflash complete ({} bytes)", image.len());
        Ok(())
    }
}

impl Fm3Flasher<NativePort> {
    /// Create a flasher by opening a serial port.
    ///
    /// Convenience constructor for the common case; use [`Fm3Flasher::new`]
    /// with any [`Channel`] implementation otherwise.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = NativePort::open(config)?;
        Ok(Self::new(port))
    }
}

/// Compare a received response against the expected bytes.
///
/// An empty response is a timeout (nothing arrived), anything else that
/// differs is a protocol mismatch.
fn check_response(op: &'static str, expected: &[u8], got: Vec<u8>) -> Result<()> {
    if got.is_empty() {
        return Err(Error::Timeout { op });
    }
    if got != expected {
        return Err(Error::UnexpectedResponse {
            op,
            expected: expected.to_vec(),
            got,
        });
    }
    Ok(())
}
