//! fm3flash CLI - flash programmer for FM3 microcontrollers.
//!
//! Drives the two-stage FM3 factory bootloader over a serial port:
//! the tool pings the mask-ROM loader, downloads the vendor's stage-2
//! firmware into RAM, then runs erase / blank-check / write / read /
//! verify against the stage-2 command set.
//!
//! Stage-2 firmware files ship with the genuine MCU Flash Programmer and
//! are looked up through `--lib-dir` directories and the `FM3FLASHDIR`
//! environment variable. Only the MB9AF132L has been tested.

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use console::style;
use env_logger::Env;
use fm3flash::flasher::{PING_ATTEMPTS, PING_INTERVAL};
use fm3flash::protocol::{DEFAULT_BAUD, DEFAULT_BLOCK_SIZE, DEFAULT_FLASH_SIZE, DEFAULT_RAM_BASE};
use fm3flash::{DeviceMode, Fm3Flasher, NativePort, SerialConfig, detect_ports, load_image};
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

mod config;
mod serial;

use config::Config;
use serial::{SerialOptions, ask_remember_port, select_serial_port};

/// Stage-2 firmware shipped with the vendor tool for MB9AF132L.
const DEFAULT_STAGE2: &str = "m_flash.9a132l";

/// Block size as a u32 for clap defaults.
#[allow(clippy::cast_possible_truncation)]
const BLOCK_SIZE_DEFAULT: u32 = DEFAULT_BLOCK_SIZE as u32;

/// fm3flash - Flash programmer for Fujitsu/Spansion/Cypress FM3 microcontrollers.
///
/// Environment variables:
///   FM3FLASH_PORT      - Default serial port
///   FM3FLASH_BAUD      - Default baud rate (default: 9600)
///   FM3FLASH_STAGE2    - Default stage-2 firmware file
///   FM3FLASHDIR        - Extra directory searched for firmware images
#[derive(Parser)]
#[command(name = "fm3flash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(
    after_help = "NOTE: the UART baud rate depends on the crystal (9600 at 4 MHz up to 48000 at 20 MHz),\n\
                  and stage-2 firmware files must be copied from the genuine MCU Flash Programmer."
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "FM3FLASH_PORT")]
    port: Option<String>,

    /// UART baud rate (default 9600).
    #[arg(short = 's', long, global = true, env = "FM3FLASH_BAUD")]
    baud: Option<u32>,

    /// Flash block transfer size in bytes.
    #[arg(short = 'b', long, global = true, default_value_t = BLOCK_SIZE_DEFAULT, value_parser = parse_int_auto)]
    block_size: u32,

    /// Flash size in bytes, hex or decimal (default 0x20000).
    #[arg(short = 'f', long, global = true, default_value_t = DEFAULT_FLASH_SIZE, value_parser = parse_int_auto)]
    flash_size: u32,

    /// RAM base address the stage-2 firmware is loaded to (default 0x20000000).
    #[arg(short = 'r', long, global = true, default_value_t = DEFAULT_RAM_BASE, value_parser = parse_int_auto)]
    ram_base: u32,

    /// Stage-2 firmware file name.
    #[arg(short = '2', long, global = true, env = "FM3FLASH_STAGE2")]
    stage2: Option<String>,

    /// Directory searched for firmware images (can be repeated).
    #[arg(short = 'L', long = "lib-dir", global = true)]
    lib_dirs: Vec<PathBuf>,

    /// Skip loading the stage-2 firmware (assume it is already running).
    #[arg(short = 'S', long, global = true)]
    skip: bool,

    /// Trace the command sequence without transmitting anything.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Confirm port selection even for auto-detected ports.
    #[arg(long, global = true)]
    confirm_port: bool,

    /// List all available ports (including unknown types).
    #[arg(long, global = true)]
    list_all_ports: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Full reflash: erase, blank-check, write, verify.
    Flash {
        /// Firmware image to program.
        image: PathBuf,
    },

    /// Erase flash memory.
    Erase,

    /// Check that flash is blank.
    BlankCheck {
        /// Also check the security/CR-trim register range.
        #[arg(long)]
        register_check: bool,
    },

    /// Write an image to flash (no erase or verify).
    Write {
        /// Firmware image to program.
        image: PathBuf,
    },

    /// Read flash contents into a file.
    Read {
        /// Output file for the dump.
        output: PathBuf,
    },

    /// Compare flash contents with an image.
    Verify {
        /// Image to compare against.
        image: PathBuf,
    },

    /// Check that the mask-ROM loader answers.
    Ping {
        /// Number of ping attempts.
        #[arg(long, default_value_t = PING_ATTEMPTS)]
        attempts: u32,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parse an integer that may be hex ("0x..") or decimal, with optional
/// underscore separators.
fn parse_int_auto(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let cleaned: String = s.chars().filter(|c| *c != '_').collect();
    let parsed = if let Some(hex) = cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16)
    } else {
        cleaned.parse()
    };
    parsed.map_err(|e| format!("Invalid number '{s}': {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    if env::var("NO_COLOR").is_ok() || !console::Term::stderr().is_term() {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    debug!("fm3flash v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Flash { image } => cmd_flash(&cli, &mut config, image)?,
        Commands::Erase => cmd_erase(&cli, &mut config)?,
        Commands::BlankCheck { register_check } => {
            cmd_blank_check(&cli, &mut config, *register_check)?;
        },
        Commands::Write { image } => cmd_write(&cli, &mut config, image)?,
        Commands::Read { output } => cmd_read(&cli, &mut config, output)?,
        Commands::Verify { image } => cmd_verify(&cli, &mut config, image)?,
        Commands::Ping { attempts } => cmd_ping(&cli, &mut config, *attempts)?,
        Commands::ListPorts { json } => cmd_list_ports(*json),
        Commands::Completions { shell } => cmd_completions(*shell),
    }

    Ok(())
}

/// Get serial port from CLI args, config, or interactive selection.
fn get_port(cli: &Cli, config: &mut Config) -> Result<String> {
    let options = SerialOptions {
        port: cli.port.clone(),
        list_all_ports: cli.list_all_ports,
        non_interactive: cli.non_interactive,
        confirm_port: cli.confirm_port,
    };

    let selected = select_serial_port(&options, config)?;

    // Offer to remember unrecognized USB devices in interactive mode
    if !selected.is_known && !cli.non_interactive {
        ask_remember_port(&selected.port, config)?;
    }

    Ok(selected.port.name)
}

fn resolved_baud(cli: &Cli, config: &Config) -> u32 {
    cli.baud.or(config.connection.baud).unwrap_or(DEFAULT_BAUD)
}

fn resolved_stage2(cli: &Cli, config: &Config) -> String {
    cli.stage2
        .clone()
        .or_else(|| config.firmware.stage2.clone())
        .unwrap_or_else(|| DEFAULT_STAGE2.to_string())
}

fn resolved_lib_dirs(cli: &Cli, config: &Config) -> Vec<PathBuf> {
    let mut dirs = cli.lib_dirs.clone();
    dirs.extend(config.firmware.lib_dir.iter().cloned());
    if let Ok(dir) = env::var("FM3FLASHDIR") {
        dirs.push(PathBuf::from(dir));
    }
    dirs
}

/// Open the serial port and build the protocol engine.
fn connect(cli: &Cli, config: &mut Config) -> Result<Fm3Flasher<NativePort>> {
    let mode = if cli.skip {
        DeviceMode::PostLoader
    } else {
        DeviceMode::PreLoader
    };

    if cli.dry_run {
        return Ok(Fm3Flasher::new(NativePort::detached("dry-run"))
            .with_dry_run(true)
            .with_mode(mode));
    }

    let port_name = get_port(cli, config)?;
    let baud = resolved_baud(cli, config);
    if !cli.quiet {
        eprintln!(
            "{} Using port {} at {} baud",
            style("🔌").cyan(),
            style(&port_name).cyan(),
            baud
        );
    }

    let serial = SerialConfig::new(&port_name, baud);
    let port = NativePort::open(&serial)
        .with_context(|| format!("Failed to open port {port_name}"))?;

    let mut flasher = Fm3Flasher::new(port).with_mode(mode);
    flasher.reset_buffers()?;
    Ok(flasher)
}

/// Bring the device into the stage-2 loader unless `--skip` was given.
fn enter_stage2(cli: &Cli, config: &Config, flasher: &mut Fm3Flasher<NativePort>) -> Result<()> {
    if cli.skip {
        return Ok(());
    }

    if !cli.quiet {
        eprintln!("{} Waiting for MCU...", style("⏳").yellow());
    }
    if !flasher.ping(PING_ATTEMPTS, PING_INTERVAL)? {
        bail!("MCU not responding; reset the device into serial boot mode");
    }

    let stage2_name = resolved_stage2(cli, config);
    let lib_dirs = resolved_lib_dirs(cli, config);
    let stage2 = load_image(&stage2_name, &lib_dirs)
        .with_context(|| format!("Failed to find stage-2 firmware {stage2_name}"))?;

    flasher
        .download(&stage2, cli.ram_base)
        .context("Failed to load stage-2 firmware")?;
    if !cli.quiet {
        eprintln!("{} Loaded stage-2 firmware", style("✓").green());
    }
    Ok(())
}

/// Print the per-step pass/fail label.
fn report(quiet: bool, step: &str, ok: bool) {
    if !quiet {
        let label = if ok {
            style("OK").green().bold()
        } else {
            style("NG").red().bold()
        };
        eprintln!("{step} {label}");
    }
}

/// Report a step result and stop the command sequence on failure.
fn run_step<T>(quiet: bool, step: &str, result: fm3flash::Result<T>) -> Result<T> {
    report(quiet, step, result.is_ok());
    result.map_err(Into::into)
}

/// Progress bar for block transfers; hidden when quiet or not a TTY.
fn make_progress(quiet: bool, total: u64) -> ProgressBar {
    if quiet || !console::Term::stderr().is_term() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(total);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    }
}

/// Flash command: erase, blank-check, write, verify.
fn cmd_flash(cli: &Cli, config: &mut Config, image_path: &Path) -> Result<()> {
    let image = fs::read(image_path)
        .with_context(|| format!("Failed to read image {}", image_path.display()))?;
    if !cli.quiet {
        eprintln!(
            "{} Flashing {} ({} bytes)",
            style("📦").cyan(),
            image_path.display(),
            image.len()
        );
    }

    let mut flasher = connect(cli, config)?;
    enter_stage2(cli, config, &mut flasher)?;

    let block_size = cli.block_size as usize;

    run_step(cli.quiet, "erase", flasher.erase(cli.flash_size.saturating_sub(1)))?;
    run_step(cli.quiet, "blankcheck", flasher.check_blank(0, cli.flash_size, false))?;

    let pb = make_progress(cli.quiet, image.len() as u64);
    pb.set_message("writing");
    let written = flasher.write_flash(&image, block_size, |done, _| {
        pb.set_position(done as u64);
    });
    pb.finish_and_clear();
    run_step(cli.quiet, "write", written)?;

    if cli.dry_run {
        // Nothing to read back without a device
        if !cli.quiet {
            eprintln!("verify {}", style("skipped").yellow());
        }
        return Ok(());
    }

    let pb = make_progress(cli.quiet, image.len() as u64);
    pb.set_message("verifying");
    let verified = flasher.verify(&image, block_size, |done, _| {
        pb.set_position(done as u64);
    });
    pb.finish_and_clear();
    let matches = verified?;
    report(cli.quiet, "verify", matches);
    if !matches {
        bail!("Flash contents do not match {}", image_path.display());
    }

    if !cli.quiet {
        eprintln!("\n{} Flashing completed", style("🎉").green().bold());
    }
    Ok(())
}

/// Erase command implementation.
fn cmd_erase(cli: &Cli, config: &mut Config) -> Result<()> {
    let mut flasher = connect(cli, config)?;
    enter_stage2(cli, config, &mut flasher)?;
    run_step(cli.quiet, "erase", flasher.erase(cli.flash_size.saturating_sub(1)))?;
    Ok(())
}

/// Blank-check command implementation.
fn cmd_blank_check(cli: &Cli, config: &mut Config, register_check: bool) -> Result<()> {
    let mut flasher = connect(cli, config)?;
    enter_stage2(cli, config, &mut flasher)?;
    run_step(
        cli.quiet,
        "blankcheck",
        flasher.check_blank(0, cli.flash_size, register_check),
    )?;
    Ok(())
}

/// Write command implementation.
fn cmd_write(cli: &Cli, config: &mut Config, image_path: &Path) -> Result<()> {
    let image = fs::read(image_path)
        .with_context(|| format!("Failed to read image {}", image_path.display()))?;

    let mut flasher = connect(cli, config)?;
    enter_stage2(cli, config, &mut flasher)?;

    let pb = make_progress(cli.quiet, image.len() as u64);
    pb.set_message("writing");
    let written = flasher.write_flash(&image, cli.block_size as usize, |done, _| {
        pb.set_position(done as u64);
    });
    pb.finish_and_clear();
    run_step(cli.quiet, "write", written)?;
    Ok(())
}

/// Read command implementation.
fn cmd_read(cli: &Cli, config: &mut Config, output: &Path) -> Result<()> {
    let mut flasher = connect(cli, config)?;
    enter_stage2(cli, config, &mut flasher)?;

    let size = cli.flash_size as usize;
    let pb = make_progress(cli.quiet, size as u64);
    pb.set_message("reading");
    let contents = flasher.read_flash(size, cli.block_size as usize, |done, _| {
        pb.set_position(done as u64);
    });
    pb.finish_and_clear();
    let contents = run_step(cli.quiet, "read", contents)?;

    fs::write(output, &contents)
        .with_context(|| format!("Failed to write dump to {}", output.display()))?;
    if !cli.quiet {
        eprintln!(
            "{} Wrote {} bytes to {}",
            style("✓").green(),
            contents.len(),
            output.display()
        );
    }
    Ok(())
}

/// Verify command implementation.
fn cmd_verify(cli: &Cli, config: &mut Config, image_path: &Path) -> Result<()> {
    let image = fs::read(image_path)
        .with_context(|| format!("Failed to read image {}", image_path.display()))?;

    let mut flasher = connect(cli, config)?;
    enter_stage2(cli, config, &mut flasher)?;

    let pb = make_progress(cli.quiet, image.len() as u64);
    pb.set_message("verifying");
    let verified = flasher.verify(&image, cli.block_size as usize, |done, _| {
        pb.set_position(done as u64);
    });
    pb.finish_and_clear();
    let matches = verified?;
    report(cli.quiet, "verify", matches);
    if !matches {
        bail!("Flash contents do not match {}", image_path.display());
    }
    Ok(())
}

/// Ping command implementation.
fn cmd_ping(cli: &Cli, config: &mut Config, attempts: u32) -> Result<()> {
    let mut flasher = connect(cli, config)?;
    let alive = flasher.ping(attempts, PING_INTERVAL)?;
    report(cli.quiet, "ping", alive);
    if !alive {
        bail!("MCU not responding after {attempts} attempts");
    }
    Ok(())
}

/// List ports command implementation.
fn cmd_list_ports(json: bool) {
    let detected = detect_ports();

    if json {
        let ports: Vec<serde_json::Value> = detected
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "device": p.device.name(),
                    "known": p.device.is_known(),
                    "vid": p.vid,
                    "pid": p.pid,
                    "manufacturer": p.manufacturer,
                    "product": p.product,
                    "serial": p.serial,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&ports).unwrap_or_default()
        );
        return;
    }

    eprintln!("{}", style("Available serial ports").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("no ports found").dim());
    } else {
        for line in fm3flash::device::format_port_list(&detected) {
            eprintln!("  {} {}", style("•").green(), line);
        }

        if let Ok(auto_port) = fm3flash::auto_detect_port() {
            eprintln!(
                "\n{} Would auto-select {}",
                style("→").green().bold(),
                style(&auto_port.name).cyan().bold()
            );
        }
    }
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::CommandFactory;

    // ---- clap validation ----

    #[test]
    fn test_cli_command_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_flash() {
        let cli = Cli::try_parse_from([
            "fm3flash",
            "--port",
            "/dev/ttyUSB0",
            "--baud",
            "38400",
            "flash",
            "firmware.bin",
        ])
        .unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(cli.baud, Some(38400));
        assert!(matches!(cli.command, Commands::Flash { .. }));
    }

    #[test]
    fn test_cli_parse_erase() {
        let cli = Cli::try_parse_from(["fm3flash", "erase"]).unwrap();
        assert!(matches!(cli.command, Commands::Erase));
    }

    #[test]
    fn test_cli_parse_blank_check() {
        let cli =
            Cli::try_parse_from(["fm3flash", "blank-check", "--register-check"]).unwrap();
        if let Commands::BlankCheck { register_check } = cli.command {
            assert!(register_check);
        } else {
            panic!("Expected BlankCheck command");
        }
    }

    #[test]
    fn test_cli_parse_read() {
        let cli = Cli::try_parse_from(["fm3flash", "read", "dump.bin"]).unwrap();
        if let Commands::Read { output } = cli.command {
            assert_eq!(output.to_str().unwrap(), "dump.bin");
        } else {
            panic!("Expected Read command");
        }
    }

    #[test]
    fn test_cli_parse_ping_default_attempts() {
        let cli = Cli::try_parse_from(["fm3flash", "ping"]).unwrap();
        if let Commands::Ping { attempts } = cli.command {
            assert_eq!(attempts, PING_ATTEMPTS);
        } else {
            panic!("Expected Ping command");
        }
    }

    #[test]
    fn test_cli_parse_list_ports_json() {
        let cli = Cli::try_parse_from(["fm3flash", "list-ports", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::ListPorts { json: true }));
    }

    #[test]
    fn test_cli_sizes_accept_hex_and_decimal() {
        let cli = Cli::try_parse_from([
            "fm3flash",
            "--flash-size",
            "0x40000",
            "--block-size",
            "256",
            "--ram-base",
            "0x2000_0000",
            "erase",
        ])
        .unwrap();
        assert_eq!(cli.flash_size, 0x40000);
        assert_eq!(cli.block_size, 256);
        assert_eq!(cli.ram_base, 0x2000_0000);
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["fm3flash", "erase"]).unwrap();
        assert!(cli.port.is_none());
        assert!(cli.baud.is_none());
        assert_eq!(cli.block_size, 512);
        assert_eq!(cli.flash_size, 0x20000);
        assert_eq!(cli.ram_base, 0x2000_0000);
        assert!(cli.stage2.is_none());
        assert!(cli.lib_dirs.is_empty());
        assert!(!cli.skip);
        assert!(!cli.dry_run);
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::try_parse_from([
            "fm3flash",
            "-p",
            "COM3",
            "-s",
            "19200",
            "-b",
            "128",
            "-2",
            "m_flash.9b",
            "-L",
            "/opt/fm3",
            "-L",
            "/usr/share/fm3",
            "-S",
            "--dry-run",
            "-vv",
            "erase",
        ])
        .unwrap();
        assert_eq!(cli.port.as_deref(), Some("COM3"));
        assert_eq!(cli.baud, Some(19200));
        assert_eq!(cli.block_size, 128);
        assert_eq!(cli.stage2.as_deref(), Some("m_flash.9b"));
        assert_eq!(cli.lib_dirs.len(), 2);
        assert!(cli.skip);
        assert!(cli.dry_run);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_missing_subcommand() {
        assert!(Cli::try_parse_from(["fm3flash"]).is_err());
    }

    #[test]
    fn test_cli_invalid_size() {
        assert!(Cli::try_parse_from(["fm3flash", "--flash-size", "zz", "erase"]).is_err());
    }

    // ---- parse_int_auto ----

    #[test]
    fn test_parse_int_auto_hex() {
        assert_eq!(parse_int_auto("0x20000").unwrap(), 0x20000);
        assert_eq!(parse_int_auto("0X20000").unwrap(), 0x20000);
    }

    #[test]
    fn test_parse_int_auto_decimal() {
        assert_eq!(parse_int_auto("512").unwrap(), 512);
        assert_eq!(parse_int_auto("131072").unwrap(), 0x20000);
    }

    #[test]
    fn test_parse_int_auto_underscores() {
        assert_eq!(parse_int_auto("0x2000_0000").unwrap(), 0x2000_0000);
        assert_eq!(parse_int_auto("131_072").unwrap(), 0x20000);
    }

    #[test]
    fn test_parse_int_auto_whitespace() {
        assert_eq!(parse_int_auto("  0xFF  ").unwrap(), 0xFF);
    }

    #[test]
    fn test_parse_int_auto_invalid() {
        assert!(parse_int_auto("not_a_number").is_err());
        assert!(parse_int_auto("0xGG").is_err());
        assert!(parse_int_auto("").is_err());
    }

    #[test]
    fn test_parse_int_auto_overflow() {
        assert!(parse_int_auto("0x1FFFFFFFF").is_err());
    }

    // ---- resolution helpers ----

    #[test]
    fn test_resolved_baud_prefers_cli() {
        let cli = Cli::try_parse_from(["fm3flash", "-s", "19200", "erase"]).unwrap();
        let mut config = Config::default();
        config.connection.baud = Some(38400);
        assert_eq!(resolved_baud(&cli, &config), 19200);
    }

    #[test]
    fn test_resolved_baud_falls_back_to_config_then_default() {
        let cli = Cli::try_parse_from(["fm3flash", "erase"]).unwrap();
        let mut config = Config::default();
        config.connection.baud = Some(38400);
        assert_eq!(resolved_baud(&cli, &config), 38400);
        assert_eq!(resolved_baud(&cli, &Config::default()), DEFAULT_BAUD);
    }

    #[test]
    fn test_resolved_stage2_default() {
        let cli = Cli::try_parse_from(["fm3flash", "erase"]).unwrap();
        assert_eq!(resolved_stage2(&cli, &Config::default()), DEFAULT_STAGE2);
    }

    #[test]
    fn test_resolved_lib_dirs_merges_config() {
        let cli = Cli::try_parse_from(["fm3flash", "-L", "/opt/fm3", "erase"]).unwrap();
        let mut config = Config::default();
        config.firmware.lib_dir.push(PathBuf::from("/usr/share/fm3"));
        let dirs = resolved_lib_dirs(&cli, &config);
        assert!(dirs.contains(&PathBuf::from("/opt/fm3")));
        assert!(dirs.contains(&PathBuf::from("/usr/share/fm3")));
    }
}
