//! Interactive serial port selection.
//!
//! Port resolution order: explicit `--port`, then the config file, then
//! detection. A single recognized USB-UART bridge is auto-selected;
//! multiple candidates prompt interactively. Non-interactive mode never
//! prompts and fails instead.

use {
    crate::config::Config,
    anyhow::{Result, anyhow, bail},
    console::style,
    dialoguer::{Confirm, Select, theme::ColorfulTheme},
    fm3flash::{DetectedPort, DeviceKind, detect_ports},
    log::{debug, error, info},
    std::io::IsTerminal,
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// List all ports (including unknown types).
    pub list_all_ports: bool,
    /// Non-interactive mode (fail if ambiguous).
    pub non_interactive: bool,
    /// Force confirmation even for single recognized ports.
    pub confirm_port: bool,
}

/// Result of port selection including whether it was a known device.
pub struct SelectedPort {
    /// The selected port info.
    pub port: DetectedPort,
    /// Whether this port matched a known/configured device.
    pub is_known: bool,
}

/// Select a serial port interactively or automatically.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<SelectedPort> {
    // If port explicitly specified, use it
    if let Some(port_name) = &options.port {
        return Ok(find_port_by_name(port_name));
    }

    // If port in config, use it
    if let Some(port_name) = &config.connection.serial {
        debug!("Using port from config: {port_name}");
        return Ok(find_port_by_name(port_name));
    }

    // Detect available ports
    let ports = detect_ports();

    if ports.is_empty() {
        bail!("No serial ports found; connect the board or pass --port");
    }

    // Filter to known devices (built-in bridges + config)
    let known_ports: Vec<DetectedPort> = ports
        .iter()
        .filter(|p| is_known_device(p, config))
        .cloned()
        .collect();

    // Select candidate set: known first unless the user asks for all
    let selection_ports: Vec<DetectedPort> = if options.list_all_ports || known_ports.is_empty() {
        ports
    } else {
        known_ports
    };

    if options.non_interactive {
        return match selection_ports.len() {
            1 => {
                let port = selection_ports.into_iter().next().expect("len checked");
                Ok(SelectedPort {
                    is_known: is_known_device(&port, config),
                    port,
                })
            },
            0 => bail!("No serial ports available"),
            _ => bail!("Multiple serial ports found; pass --port to choose one"),
        };
    }

    match selection_ports.len() {
        0 => bail!("No serial ports available"),
        1 => {
            let port = selection_ports.into_iter().next().expect("len checked");
            let is_known = is_known_device(&port, config);

            if is_known && !options.confirm_port {
                info!("Auto-selected port: {} [{}]", port.name, port.device.name());
                Ok(SelectedPort { port, is_known })
            } else {
                ensure_interactive_terminal()?;
                confirm_single_port(port, config)
            }
        },
        _ => {
            ensure_interactive_terminal()?;
            select_port_interactive(selection_ports, config)
        },
    }
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        bail!("Port selection requires a terminal; pass --port or use --non-interactive")
    }
}

/// Find a port by name.
fn find_port_by_name(name: &str) -> SelectedPort {
    let ports = detect_ports();

    // Exact match first, case-insensitive second (Windows COM ports)
    let found = ports
        .iter()
        .find(|p| p.name == name)
        .or_else(|| ports.iter().find(|p| p.name.eq_ignore_ascii_case(name)));

    if let Some(port) = found {
        return SelectedPort {
            port: port.clone(),
            is_known: port.device.is_known(),
        };
    }

    // Not in the detected list, but the user explicitly asked for it
    SelectedPort {
        port: DetectedPort {
            name: name.to_string(),
            device: DeviceKind::Unknown,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial: None,
        },
        is_known: false,
    }
}

/// Check if a port matches a known device (from config or built-in list).
fn is_known_device(port: &DetectedPort, config: &Config) -> bool {
    if port.device.is_known() {
        return true;
    }

    if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        return config.usb_device.iter().any(|d| d.matches(vid, pid));
    }

    false
}

/// Interactive port selection.
fn select_port_interactive(mut ports: Vec<DetectedPort>, config: &Config) -> Result<SelectedPort> {
    eprintln!(
        "{} Detected {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );

    // Sort: known devices first
    ports.sort_by_key(|p| !is_known_device(p, config));

    let port_names: Vec<String> = ports
        .iter()
        .map(|port| {
            let device_info = if port.device.is_known() {
                format!(" [{}]", style(port.device.name()).yellow())
            } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
                format!(" ({vid:04X}:{pid:04X})")
            } else {
                String::new()
            };

            let product = port
                .product
                .as_ref()
                .map(|p| format!(" - {}", style(p).dim()))
                .unwrap_or_default();

            format!("{}{device_info}{product}", port.name)
        })
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select serial port")
        .items(&port_names)
        .default(0)
        .interact_opt()
        .map_err(|e| anyhow!("Port selection prompt failed: {e}"))?;

    match selection {
        Some(index) => {
            let port = ports
                .into_iter()
                .nth(index)
                .ok_or_else(|| anyhow!("Invalid port index: {index}"))?;
            let is_known = is_known_device(&port, config);
            Ok(SelectedPort { port, is_known })
        },
        None => bail!("Port selection cancelled"),
    }
}

/// Confirm use of a single unrecognized port.
fn confirm_single_port(port: DetectedPort, _config: &Config) -> Result<SelectedPort> {
    let product_info = port
        .product
        .as_ref()
        .map(|p| format!(" - {p}"))
        .unwrap_or_default();

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Use port {}{product_info}?", port.name))
        .default(true)
        .interact_opt()
        .map_err(|e| anyhow!("Port confirmation prompt failed: {e}"))?
        .unwrap_or(false);

    if confirmed {
        Ok(SelectedPort {
            port,
            is_known: false,
        })
    } else {
        bail!("Port selection cancelled")
    }
}

/// Ask the user if they want to remember this port's USB device.
pub fn ask_remember_port(port: &DetectedPort, config: &mut Config) -> Result<()> {
    if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        if config.usb_device.iter().any(|d| d.matches(vid, pid)) {
            return Ok(()); // Already saved
        }

        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Remember this device for future auto-detection?")
            .default(false)
            .interact_opt()
            .map_err(|e| anyhow!("Prompt failed: {e}"))?
            .unwrap_or(false);

        if confirmed {
            if let Err(e) = config.remember_usb_device(vid, pid) {
                error!("Failed to save port configuration: {e}");
            }
        }
    }

    Ok(())
}
