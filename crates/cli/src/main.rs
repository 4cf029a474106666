//! usbraw
//!
//! Command-line access to USB devices exposing a vendor-specific raw
//! interface: list them, write to the bulk-OUT endpoint, read from the
//! bulk-IN endpoint and issue control transfers.

mod config;
mod hex;
mod logging;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use config::CliConfig;
use logging::setup_logging;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use usbraw::{DataOrLength, DeviceFilter, OpenOptions, ResourceName, RusbTransport, UsbRawDevice};

#[derive(Parser, Debug)]
#[command(name = "usbraw")]
#[command(
    author,
    version,
    about = "Talk to USB devices through their vendor-specific raw interface"
)]
#[command(long_about = "
Talk to USB devices that expose a vendor-specific (class 0xFF, subclass 0x00)
interface with a bulk-in and a bulk-out endpoint.

EXAMPLES:
    # List raw devices
    usbraw list

    # Send an identification query to a device by resource name
    usbraw --resource USB0::0x1AB1::0x04CE::DS1ZA000000001::RAW query '*IDN?'

    # Write a hex payload to the only device of a vendor
    usbraw --vid 0x1ab1 write '2a 49 44 4e 3f 0a'

    # Read at least 64 bytes into a file
    usbraw --vid 0x1ab1 --pid 0x04ce read 64 --output dump.bin

    # Vendor IN control request with a 4 byte data stage
    usbraw --vid 0x1ab1 ctrl 0xC0 0x01 --length 4

CONFIGURATION:
    The configuration file is looked up in the following order:
    1. Path specified with --config
    2. ~/.config/usbraw/config.toml
    3. /etc/usbraw/config.toml
    4. Built-in defaults
")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Transfer timeout in milliseconds
    #[arg(short, long, value_name = "MS")]
    timeout_ms: Option<u64>,

    #[command(flatten)]
    device: DeviceArgs,

    #[command(subcommand)]
    command: Command,
}

/// Which device to open
#[derive(Args, Debug)]
struct DeviceArgs {
    /// VISA resource name, e.g. USB0::0x1234::0x5678::SERIAL::RAW
    #[arg(short, long, value_name = "RESOURCE", conflicts_with_all = ["vid", "pid", "serial"])]
    resource: Option<ResourceName>,

    /// Vendor ID (decimal or 0x-prefixed hex)
    #[arg(long, value_name = "ID", value_parser = hex::parse_u16)]
    vid: Option<u16>,

    /// Product ID (decimal or 0x-prefixed hex)
    #[arg(long, value_name = "ID", value_parser = hex::parse_u16)]
    pid: Option<u16>,

    /// Serial number
    #[arg(long, value_name = "SERIAL")]
    serial: Option<String>,

    /// Raw interface number to claim
    #[arg(long, value_name = "NUMBER", value_parser = hex::parse_u8)]
    interface: Option<u8>,
}

impl DeviceArgs {
    /// Discovery criteria; a resource name takes precedence over the ID flags
    fn filter(&self) -> DeviceFilter {
        if let Some(resource) = &self.resource {
            return resource.filter();
        }
        DeviceFilter {
            vendor_id: self.vid,
            product_id: self.pid,
            serial_number: self.serial.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List raw USB devices
    List {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Write bytes to the bulk-OUT endpoint
    Write {
        /// Payload as hex digits
        #[arg(value_name = "HEX", required_unless_present = "file", conflicts_with = "file")]
        data: Option<String>,

        /// Send the contents of a file instead
        #[arg(short, long, value_name = "PATH")]
        file: Option<PathBuf>,
    },

    /// Read at least SIZE bytes from the bulk-IN endpoint
    Read {
        #[arg(value_name = "SIZE")]
        size: usize,

        /// Write the received bytes to a file instead of printing hex
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Write a text line and print the reply
    Query {
        /// Text to send; a newline is appended
        text: String,

        /// Minimum number of reply bytes to wait for
        #[arg(long, default_value_t = 1)]
        size: usize,
    },

    /// Perform a control transfer on endpoint 0
    Ctrl {
        /// bmRequestType
        #[arg(value_parser = hex::parse_u8)]
        request_type: u8,

        /// bRequest
        #[arg(value_parser = hex::parse_u8)]
        request: u8,

        /// wValue
        #[arg(long, default_value = "0", value_parser = hex::parse_u16)]
        value: u16,

        /// wIndex
        #[arg(long, default_value = "0", value_parser = hex::parse_u16)]
        index: u16,

        /// OUT data stage as hex digits
        #[arg(long, value_name = "HEX", conflicts_with = "length")]
        data: Option<String>,

        /// IN data stage length (wLength)
        #[arg(long, value_name = "BYTES", value_parser = hex::parse_u16)]
        length: Option<u16>,
    },

    /// Save default configuration to the default location and exit
    SaveConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load_config(path).context("Failed to load configuration")?,
        None => CliConfig::load_or_default(),
    };

    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.general.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;
    debug!("usbraw v{}", env!("CARGO_PKG_VERSION"));

    let timeout = cli
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.usb.timeout());
    let mut options = OpenOptions::default().with_timeout(timeout);
    if let Some(interface) = cli.device.interface {
        options = options.with_interface(interface);
    }

    match cli.command {
        Command::List { json } => list_devices(&config, &cli.device.filter(), json),
        Command::Write { data, file } => {
            let payload = match (data, file) {
                (Some(data), _) => hex::parse_bytes(&data)?,
                (None, Some(path)) => fs::read(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, None) => bail!("Nothing to write"),
            };

            let mut device = open_device(&cli.device, &options)?;
            let sent = device.write(&payload).context("Bulk write failed")?;
            println!("{} of {} bytes sent", sent, payload.len());
            Ok(())
        }
        Command::Read { size, output } => {
            let mut device = open_device(&cli.device, &options)?;
            let data = device.read(size).context("Bulk read failed")?;

            match output {
                Some(path) => {
                    fs::write(&path, &data)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("{} bytes written to {}", data.len(), path.display());
                }
                None => println!("{}", hex::format_bytes(&data)),
            }
            Ok(())
        }
        Command::Query { text, size } => {
            let mut device = open_device(&cli.device, &options)?;
            let mut payload = text.into_bytes();
            payload.push(b'\n');

            device.write(&payload).context("Bulk write failed")?;
            let reply = device.read(size).context("Bulk read failed")?;
            println!("{}", String::from_utf8_lossy(&reply).trim_end());
            Ok(())
        }
        Command::Ctrl {
            request_type,
            request,
            value,
            index,
            data,
            length,
        } => {
            let data_or_length = match (data, length) {
                (Some(data), _) => Some(DataOrLength::Data(hex::parse_bytes(&data)?)),
                (None, Some(length)) => Some(DataOrLength::Length(length)),
                (None, None) => None,
            };

            let mut device = open_device(&cli.device, &options)?;
            let (data, status) = device
                .control_transfer(request_type, request, value, index, data_or_length)
                .context("Control transfer failed")?;

            println!("status: {}", status);
            if !data.is_empty() {
                println!("data: {}", hex::format_bytes(&data));
            }
            Ok(())
        }
        Command::SaveConfig => {
            let path = CliConfig::default_path();
            CliConfig::default()
                .save(&path)
                .context("Failed to save configuration")?;
            println!("Configuration saved to: {}", path.display());
            Ok(())
        }
    }
}

/// Open the single device selected on the command line
fn open_device(args: &DeviceArgs, options: &OpenOptions) -> Result<UsbRawDevice<RusbTransport>> {
    let device = match &args.resource {
        Some(resource) => UsbRawDevice::open_resource(resource, options)
            .with_context(|| format!("Failed to open {}", resource))?,
        None => {
            let filter = args.filter();
            UsbRawDevice::open(&filter, options)
                .with_context(|| format!("Failed to open raw device matching {}", filter))?
        }
    };

    info!(
        "Using raw interface {} (timeout {:?})",
        device.transport().interface_number(),
        device.transport().timeout()
    );
    Ok(device)
}

/// List raw devices and exit
fn list_devices(config: &CliConfig, filter: &DeviceFilter, json: bool) -> Result<()> {
    let context = rusb::Context::new().context("Failed to initialise libusb")?;

    let mut devices = Vec::new();
    for info in usbraw::list_raw_devices(&context, filter).context("Failed to enumerate devices")? {
        if config.usb.allows(info.vendor_id, info.product_id)? {
            devices.push(info);
        } else {
            debug!(
                "Device {:04x}:{:04x} ignored by filter",
                info.vendor_id, info.product_id
            );
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No raw USB devices found.");
        return Ok(());
    }

    println!("Found {} raw USB device(s):\n", devices.len());
    for device in devices {
        match device.resource_name(0) {
            Some(resource) => println!("  {}", resource),
            None => println!("  (no serial number)"),
        }
        println!(
            "      {:04x}:{:04x} - {} {}",
            device.vendor_id,
            device.product_id,
            device
                .manufacturer
                .as_deref()
                .unwrap_or("Unknown Manufacturer"),
            device.product.as_deref().unwrap_or("Unknown Product")
        );
        println!(
            "      Bus {:03} Device {:03} Interface {}",
            device.bus_number, device.address, device.interface_number
        );
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_resource_and_ctrl() {
        let cli = Cli::try_parse_from([
            "usbraw",
            "--resource",
            "USB0::0x1234::0x5678::SN::RAW",
            "ctrl",
            "0xC0",
            "1",
            "--length",
            "4",
        ])
        .unwrap();

        assert_eq!(
            cli.device.resource,
            Some(ResourceName::new(0x1234, 0x5678, "SN"))
        );
        match cli.command {
            Command::Ctrl {
                request_type,
                request,
                value,
                index,
                data,
                length,
            } => {
                assert_eq!((request_type, request, value, index), (0xC0, 1, 0, 0));
                assert_eq!(data, None);
                assert_eq!(length, Some(4));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_device_filter_from_args() {
        let cli = Cli::try_parse_from(["usbraw", "--vid", "0x1ab1", "--serial", "X1", "list"]).unwrap();
        let filter = cli.device.filter();
        assert_eq!(filter.vendor_id, Some(0x1AB1));
        assert_eq!(filter.product_id, None);
        assert_eq!(filter.serial_number.as_deref(), Some("X1"));
    }

    #[test]
    fn test_list_filter_from_resource() {
        let cli = Cli::try_parse_from([
            "usbraw",
            "--resource",
            "USB0::0x1234::0x5678::SN::RAW",
            "list",
        ])
        .unwrap();
        let filter = cli.device.filter();
        assert_eq!(filter.vendor_id, Some(0x1234));
        assert_eq!(filter.product_id, Some(0x5678));
        assert_eq!(filter.serial_number.as_deref(), Some("SN"));
        assert!(!filter.matches(0x1234, 0x5678, Some("OTHER")));
    }

    #[test]
    fn test_resource_conflicts_with_vid() {
        let result = Cli::try_parse_from([
            "usbraw",
            "--resource",
            "USB0::0x1234::0x5678::SN::RAW",
            "--vid",
            "1",
            "list",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_resource_rejected() {
        assert!(Cli::try_parse_from(["usbraw", "--resource", "USB0::SN::INSTR", "list"]).is_err());
    }

    #[test]
    fn test_write_requires_payload() {
        assert!(Cli::try_parse_from(["usbraw", "write"]).is_err());
        assert!(Cli::try_parse_from(["usbraw", "write", "00ff"]).is_ok());
    }

    #[test]
    fn test_ctrl_data_conflicts_with_length() {
        let result = Cli::try_parse_from([
            "usbraw", "ctrl", "0x40", "2", "--data", "0102", "--length", "2",
        ]);
        assert!(result.is_err());
    }
}
