//! libusb transport
//!
//! [`RusbTransport`] claims the raw interface of a device and performs single
//! bulk and control transfers on it through rusb.

use crate::discovery::find_raw_interface;
use crate::error::{Error, Result};
use crate::transport::{DataOrLength, Direction, RawTransport};
use rusb::{Context, Device, DeviceHandle, TransferType, UsbContext};
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for bulk and control transfers (2 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// How a device is opened
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Timeout applied to every transfer
    pub timeout: Duration,
    /// Raw interface to claim; the first one found when `None`
    pub interface: Option<u8>,
    /// Detach an active kernel driver from the interface before claiming it
    pub detach_kernel_driver: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            interface: None,
            detach_kernel_driver: true,
        }
    }
}

impl OpenOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interface(mut self, interface: u8) -> Self {
        self.interface = Some(interface);
        self
    }
}

/// Claimed raw interface of an open device
#[derive(Debug)]
pub struct RusbTransport<C: UsbContext = Context> {
    handle: DeviceHandle<C>,
    interface_number: u8,
    recv_ep: Option<u8>,
    send_ep: Option<u8>,
    timeout: Duration,
    state: ClaimState,
}

/// What `open` changed on the device and `Drop` has to undo
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClaimState {
    pub claimed: bool,
    pub kernel_driver_detached: bool,
}

/// Interface teardown calls of a device handle
pub trait InterfaceHandle {
    fn release_interface(&mut self, interface_number: u8) -> rusb::Result<()>;
    fn attach_kernel_driver(&mut self, interface_number: u8) -> rusb::Result<()>;
}

impl<C: UsbContext> InterfaceHandle for DeviceHandle<C> {
    fn release_interface(&mut self, interface_number: u8) -> rusb::Result<()> {
        DeviceHandle::release_interface(self, interface_number)
    }

    fn attach_kernel_driver(&mut self, interface_number: u8) -> rusb::Result<()> {
        DeviceHandle::attach_kernel_driver(self, interface_number)
    }
}

/// Undo whatever `state` records, leaving it cleared
///
/// Only a claimed interface is released. A detached kernel driver is
/// reattached even when claiming never succeeded.
pub fn release_claim<H: InterfaceHandle>(handle: &mut H, interface_number: u8, state: &mut ClaimState) {
    if state.claimed {
        match handle.release_interface(interface_number) {
            Ok(()) => debug!("Released interface {}", interface_number),
            Err(e) => warn!("Failed to release interface {}: {}", interface_number, e),
        }
        state.claimed = false;
    }

    if state.kernel_driver_detached {
        if let Err(e) = handle.attach_kernel_driver(interface_number) {
            debug!(
                "Could not reattach kernel driver to interface {}: {}",
                interface_number, e
            );
        }
        state.kernel_driver_detached = false;
    }
}

impl<C: UsbContext> RusbTransport<C> {
    /// Open `device` and claim its raw interface
    ///
    /// The bulk endpoints of the interface are recorded as found; a missing
    /// one is not an error here.
    pub fn open(device: Device<C>, options: &OpenOptions) -> Result<Self> {
        let config = device.active_config_descriptor()?;
        let setting = find_raw_interface(&config, options.interface).ok_or(Error::NoRawInterface)?;

        let interface_number = setting.interface_number();
        let setting_number = setting.setting_number();
        let (recv_ep, send_ep) = pick_bulk_endpoints(
            setting
                .endpoint_descriptors()
                .map(|endpoint| (endpoint.address(), endpoint.transfer_type())),
        );

        let handle = device.open()?;
        debug!(
            "Opened bus={} addr={}, raw interface {} alt {} (in={:?}, out={:?})",
            device.bus_number(),
            device.address(),
            interface_number,
            setting_number,
            recv_ep,
            send_ep
        );

        // From here on every early return goes through Drop
        let mut transport = Self {
            handle,
            interface_number,
            recv_ep,
            send_ep,
            timeout: options.timeout,
            state: ClaimState::default(),
        };

        if options.detach_kernel_driver {
            transport.detach_kernel_driver();
        }

        transport.handle.claim_interface(interface_number)?;
        transport.state.claimed = true;
        if setting_number != 0 {
            transport
                .handle
                .set_alternate_setting(interface_number, setting_number)?;
        }
        debug!("Claimed interface {}", interface_number);

        Ok(transport)
    }

    fn detach_kernel_driver(&mut self) {
        let interface_number = self.interface_number;
        match self.handle.kernel_driver_active(interface_number) {
            Ok(true) => match self.handle.detach_kernel_driver(interface_number) {
                Ok(()) => {
                    debug!("Detached kernel driver from interface {}", interface_number);
                    self.state.kernel_driver_detached = true;
                }
                Err(e) => warn!(
                    "Failed to detach kernel driver from interface {}: {}",
                    interface_number, e
                ),
            },
            Ok(false) => {}
            Err(e) => debug!(
                "Could not check kernel driver status for interface {}: {}",
                interface_number, e
            ),
        }
    }

    pub fn interface_number(&self) -> u8 {
        self.interface_number
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn handle(&self) -> &DeviceHandle<C> {
        &self.handle
    }
}

impl<C: UsbContext> RawTransport for RusbTransport<C> {
    type Error = rusb::Error;

    fn recv_endpoint(&self) -> Option<u8> {
        self.recv_ep
    }

    fn send_endpoint(&self) -> Option<u8> {
        self.send_ep
    }

    fn write(&mut self, data: &[u8]) -> std::result::Result<usize, rusb::Error> {
        let endpoint = self.send_ep.ok_or(rusb::Error::NotFound)?;
        self.handle.write_bulk(endpoint, data, self.timeout)
    }

    fn read(&mut self, max_size: usize) -> std::result::Result<Vec<u8>, rusb::Error> {
        let endpoint = self.recv_ep.ok_or(rusb::Error::NotFound)?;
        let mut buffer = vec![0u8; max_size];
        let len = self.handle.read_bulk(endpoint, &mut buffer, self.timeout)?;
        buffer.truncate(len);
        Ok(buffer)
    }

    fn ctrl_transfer(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data_or_length: Option<DataOrLength>,
    ) -> std::result::Result<(Vec<u8>, usize), rusb::Error> {
        match Direction::of_request_type(request_type) {
            Direction::In => {
                let mut buffer = vec![0u8; control_in_length(data_or_length.as_ref())];
                let len = self.handle.read_control(
                    request_type,
                    request,
                    value,
                    index,
                    &mut buffer,
                    self.timeout,
                )?;
                buffer.truncate(len);
                Ok((buffer, len))
            }
            Direction::Out => {
                let data = control_out_payload(data_or_length);
                let len = self.handle.write_control(
                    request_type,
                    request,
                    value,
                    index,
                    &data,
                    self.timeout,
                )?;
                Ok((Vec::new(), len))
            }
        }
    }
}

impl<C: UsbContext> Drop for RusbTransport<C> {
    fn drop(&mut self) {
        release_claim(&mut self.handle, self.interface_number, &mut self.state);
    }
}

/// `wLength` of an IN control transfer: the requested length, the size of a
/// supplied buffer, or 0 without a data stage
pub fn control_in_length(data_or_length: Option<&DataOrLength>) -> usize {
    match data_or_length {
        Some(DataOrLength::Length(length)) => usize::from(*length),
        Some(DataOrLength::Data(buffer)) => buffer.len(),
        None => 0,
    }
}

/// Data stage of an OUT control transfer; a bare length sends nothing
pub fn control_out_payload(data_or_length: Option<DataOrLength>) -> Vec<u8> {
    match data_or_length {
        Some(DataOrLength::Data(data)) => data,
        Some(DataOrLength::Length(_)) | None => Vec::new(),
    }
}

/// First bulk-IN and first bulk-OUT endpoint among `endpoints`
pub fn pick_bulk_endpoints(
    endpoints: impl IntoIterator<Item = (u8, TransferType)>,
) -> (Option<u8>, Option<u8>) {
    let mut recv_ep = None;
    let mut send_ep = None;

    for (address, transfer_type) in endpoints {
        if transfer_type != TransferType::Bulk {
            continue;
        }
        match Direction::of_endpoint(address) {
            Direction::In => {
                recv_ep.get_or_insert(address);
            }
            Direction::Out => {
                send_ep.get_or_insert(address);
            }
        }
    }

    (recv_ep, send_ep)
}
