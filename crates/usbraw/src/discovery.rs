//! Raw device discovery
//!
//! Walks the devices known to a libusb context and keeps those that match a
//! [`DeviceFilter`] and expose a vendor-specific raw interface.

use crate::error::{Error, Result};
use crate::resource::ResourceName;
use rusb::{ConfigDescriptor, Device, DeviceDescriptor, InterfaceDescriptor, UsbContext};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, trace};

/// Interface class of a raw interface (vendor specific)
pub const RAW_INTERFACE_CLASS: u8 = 0xFF;
/// Interface subclass of a raw interface
pub const RAW_INTERFACE_SUBCLASS: u8 = 0x00;

/// Vendor ID, product ID and serial number criteria; absent fields match
/// anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub serial_number: Option<String>,
}

impl DeviceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vendor_id(mut self, vendor_id: u16) -> Self {
        self.vendor_id = Some(vendor_id);
        self
    }

    pub fn product_id(mut self, product_id: u16) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    pub fn matches_ids(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id.is_none_or(|v| v == vendor_id)
            && self.product_id.is_none_or(|p| p == product_id)
    }

    pub fn matches_serial(&self, serial_number: Option<&str>) -> bool {
        match &self.serial_number {
            None => true,
            Some(wanted) => serial_number == Some(wanted.as_str()),
        }
    }

    pub fn matches(&self, vendor_id: u16, product_id: u16, serial_number: Option<&str>) -> bool {
        self.matches_ids(vendor_id, product_id) && self.matches_serial(serial_number)
    }
}

/// Parses `VID:PID` patterns such as `0x04f9:*` or `1234:5678`
///
/// Each side is hexadecimal with an optional `0x` prefix, or `*`.
impl FromStr for DeviceFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (vid, pid) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidResource(format!("'{}' is not a VID:PID pattern", s)))?;

        Ok(Self {
            vendor_id: parse_pattern_id(vid, s)?,
            product_id: parse_pattern_id(pid, s)?,
            serial_number: None,
        })
    }
}

impl fmt::Display for DeviceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.vendor_id {
            Some(vid) => write!(f, "0x{:04x}", vid)?,
            None => write!(f, "*")?,
        }
        match self.product_id {
            Some(pid) => write!(f, ":0x{:04x}", pid)?,
            None => write!(f, ":*")?,
        }
        if let Some(serial) = &self.serial_number {
            write!(f, " ({})", serial)?;
        }
        Ok(())
    }
}

fn parse_pattern_id(part: &str, pattern: &str) -> Result<Option<u16>> {
    let part = part.trim();
    if part == "*" {
        return Ok(None);
    }

    let digits = part
        .strip_prefix("0x")
        .or_else(|| part.strip_prefix("0X"))
        .unwrap_or(part);
    if digits.is_empty() || digits.len() > 4 {
        return Err(Error::InvalidResource(format!(
            "invalid ID '{}' in pattern '{}'",
            part, pattern
        )));
    }

    u16::from_str_radix(digits, 16)
        .map(Some)
        .map_err(|_| Error::InvalidResource(format!("invalid ID '{}' in pattern '{}'", part, pattern)))
}

/// Whether an interface class/subclass pair denotes a raw interface
pub fn is_raw_interface(class: u8, subclass: u8) -> bool {
    class == RAW_INTERFACE_CLASS && subclass == RAW_INTERFACE_SUBCLASS
}

/// First raw interface alternate setting in `config`, optionally restricted
/// to one interface number
pub fn find_raw_interface<'a>(
    config: &'a ConfigDescriptor,
    interface_number: Option<u8>,
) -> Option<InterfaceDescriptor<'a>> {
    config
        .interfaces()
        .flat_map(|interface| interface.descriptors())
        .filter(|setting| interface_number.is_none_or(|n| n == setting.interface_number()))
        .find(|setting| is_raw_interface(setting.class_code(), setting.sub_class_code()))
}

/// Whether the active configuration of `device` has a raw interface
pub fn has_raw_interface<C: UsbContext>(device: &Device<C>) -> bool {
    raw_interface_number(device, None).is_some()
}

/// Number of the raw interface `RusbTransport::open` would claim on `device`
///
/// Looks at the active configuration only, optionally restricted to one
/// interface number.
///
/// [`RusbTransport::open`]: crate::RusbTransport::open
pub fn raw_interface_number<C: UsbContext>(device: &Device<C>, interface_number: Option<u8>) -> Option<u8> {
    let config = device.active_config_descriptor().ok()?;
    find_raw_interface(&config, interface_number).map(|setting| setting.interface_number())
}

fn read_serial_number<C: UsbContext>(
    device: &Device<C>,
    descriptor: &DeviceDescriptor,
) -> Option<String> {
    let index = descriptor.serial_number_string_index()?;
    let handle = device.open().ok()?;
    handle.read_string_descriptor_ascii(index).ok()
}

/// All devices in `context` that satisfy `filter` and `predicate`
///
/// The serial number is only read (which requires opening the device) when
/// the filter asks for one.
pub fn find_devices<C, P>(context: &C, filter: &DeviceFilter, mut predicate: P) -> Result<Vec<Device<C>>>
where
    C: UsbContext,
    P: FnMut(&Device<C>) -> bool,
{
    let mut found = Vec::new();

    for device in context.devices()?.iter() {
        let descriptor = match device.device_descriptor() {
            Ok(descriptor) => descriptor,
            Err(e) => {
                debug!(
                    "Skipping device bus={} addr={}: {}",
                    device.bus_number(),
                    device.address(),
                    e
                );
                continue;
            }
        };

        if !filter.matches_ids(descriptor.vendor_id(), descriptor.product_id()) {
            continue;
        }

        if filter.serial_number.is_some() {
            let serial = read_serial_number(&device, &descriptor);
            if !filter.matches_serial(serial.as_deref()) {
                trace!(
                    "Serial mismatch on bus={} addr={}: {:?}",
                    device.bus_number(),
                    device.address(),
                    serial
                );
                continue;
            }
        }

        if !predicate(&device) {
            continue;
        }

        debug!(
            "Matched device bus={} addr={} vid={:#06x} pid={:#06x}",
            device.bus_number(),
            device.address(),
            descriptor.vendor_id(),
            descriptor.product_id()
        );
        found.push(device);
    }

    Ok(found)
}

/// All devices matching `filter` that expose a raw interface and, when
/// given, are accepted by `custom_match`
pub fn find_raw_devices<C: UsbContext>(
    context: &C,
    filter: &DeviceFilter,
    custom_match: Option<&dyn Fn(&Device<C>) -> bool>,
) -> Result<Vec<Device<C>>> {
    find_devices(context, filter, |device| {
        accepts_raw_device(device, custom_match, has_raw_interface)
    })
}

/// Raw device predicate: `custom_match` (when given) is asked first, and
/// `has_raw` only runs for devices it accepts
pub fn accepts_raw_device<D: ?Sized>(
    device: &D,
    custom_match: Option<&dyn Fn(&D) -> bool>,
    has_raw: impl FnOnce(&D) -> bool,
) -> bool {
    custom_match.is_none_or(|custom_match| custom_match(device)) && has_raw(device)
}

/// Description of a discovered raw device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDeviceInfo {
    pub bus_number: u8,
    pub address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub interface_number: u8,
}

impl RawDeviceInfo {
    /// Describe `device`, reading string descriptors if the device can be
    /// opened
    pub fn from_device<C: UsbContext>(device: &Device<C>) -> Result<Self> {
        let descriptor = device.device_descriptor()?;
        let interface_number = raw_interface_number(device, None).ok_or(Error::NoRawInterface)?;

        let (manufacturer, product, serial_number) = match device.open() {
            Ok(handle) => (
                descriptor
                    .manufacturer_string_index()
                    .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok()),
                descriptor
                    .product_string_index()
                    .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok()),
                descriptor
                    .serial_number_string_index()
                    .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok()),
            ),
            Err(e) => {
                debug!(
                    "Cannot open bus={} addr={} for string descriptors: {}",
                    device.bus_number(),
                    device.address(),
                    e
                );
                (None, None, None)
            }
        };

        Ok(Self {
            bus_number: device.bus_number(),
            address: device.address(),
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
            manufacturer,
            product,
            serial_number,
            interface_number,
        })
    }

    /// VISA resource name for this device on `board`, if it reports a
    /// serial number
    pub fn resource_name(&self, board: u16) -> Option<ResourceName> {
        let serial_number = self.serial_number.clone()?;
        Some(ResourceName {
            board,
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            serial_number,
            interface: None,
        })
    }
}

/// Describe every raw device matching `filter`
pub fn list_raw_devices<C: UsbContext>(context: &C, filter: &DeviceFilter) -> Result<Vec<RawDeviceInfo>> {
    let devices = find_raw_devices(context, filter, None)?;
    let mut infos = Vec::with_capacity(devices.len());

    for device in &devices {
        match RawDeviceInfo::from_device(device) {
            Ok(info) => infos.push(info),
            Err(e) => debug!(
                "Failed to describe bus={} addr={}: {}",
                device.bus_number(),
                device.address(),
                e
            ),
        }
    }

    Ok(infos)
}
