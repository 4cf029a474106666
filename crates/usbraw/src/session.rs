//! Chunked raw USB session
//!
//! [`UsbRawDevice`] wraps a [`RawTransport`] and splits writes and reads into
//! transfers of at most [`RECV_CHUNK`] bytes. Transfer errors come back as the
//! transport's own error type, untouched.

use crate::backend::{OpenOptions, RusbTransport};
use crate::discovery::{DeviceFilter, find_raw_devices, raw_interface_number};
use crate::error::{Error, Result};
use crate::resource::ResourceName;
use crate::transport::{DataOrLength, Direction, RawTransport};
use rusb::{Context, Device, UsbContext};
use tracing::{debug, trace};

/// Upper bound on the size of a single bulk transfer (1 MiB)
pub const RECV_CHUNK: usize = 1024 * 1024;

/// An open device with both bulk endpoints of its raw interface available
#[derive(Debug)]
pub struct UsbRawDevice<T: RawTransport> {
    transport: T,
}

impl<T: RawTransport> UsbRawDevice<T> {
    /// Wrap a transport, checking that it exposes a bulk-IN and a bulk-OUT
    /// endpoint
    pub fn new(transport: T) -> Result<Self> {
        if transport.recv_endpoint().is_none() {
            return Err(Error::MissingEndpoint(Direction::In));
        }
        if transport.send_endpoint().is_none() {
            return Err(Error::MissingEndpoint(Direction::Out));
        }

        Ok(Self { transport })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Send `data` to the device, one bulk transfer per chunk
    ///
    /// Returns the total number of bytes the transport reported as sent,
    /// which can be less than `data.len()` on short writes. When the length
    /// is a multiple of [`RECV_CHUNK`] (including zero) a trailing empty
    /// transfer follows the last full chunk.
    pub fn write(&mut self, data: &[u8]) -> std::result::Result<usize, T::Error> {
        let size = data.len();
        let mut end = 0;
        let mut bytes_sent = 0;

        while end <= size {
            let begin = end;
            end = begin + RECV_CHUNK;
            let chunk = &data[begin..end.min(size)];

            let sent = self.transport.write(chunk)?;
            trace!(
                "Wrote chunk [{}..{}): {} bytes sent",
                begin,
                begin + chunk.len(),
                sent
            );
            bytes_sent += sent;
        }

        Ok(bytes_sent)
    }

    /// Receive at least `size` bytes from the device
    ///
    /// Chunks of up to [`RECV_CHUNK`] bytes are requested until enough data
    /// has arrived. The last chunk is kept whole, so the result can be longer
    /// than `size`. At least one transfer is always issued. There is no
    /// timeout of its own: a device that keeps answering with empty chunks
    /// keeps this looping until the transport fails.
    pub fn read(&mut self, size: usize) -> std::result::Result<Vec<u8>, T::Error> {
        let mut received = Vec::new();

        loop {
            let chunk = self.transport.read(RECV_CHUNK)?;
            received.extend_from_slice(&chunk);
            trace!(
                "Read chunk of {} bytes ({} of {} wanted)",
                chunk.len(),
                received.len(),
                size
            );

            if received.len() >= size {
                break;
            }
        }

        Ok(received)
    }

    /// Perform a control transfer on the default pipe
    ///
    /// Parameters map onto the setup packet: `bmRequestType`, `bRequest`,
    /// `wValue`, `wIndex`, and either the OUT payload or the IN `wLength`.
    /// Returns the received data buffer and the status reported by the
    /// transport.
    pub fn control_transfer(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data_or_length: Option<DataOrLength>,
    ) -> std::result::Result<(Vec<u8>, usize), T::Error> {
        self.transport
            .ctrl_transfer(request_type, request, value, index, data_or_length)
    }

    /// [`control_transfer`](Self::control_transfer) with `wValue` and
    /// `wIndex` of zero and no data stage
    pub fn control_transfer_default(
        &mut self,
        request_type: u8,
        request: u8,
    ) -> std::result::Result<(Vec<u8>, usize), T::Error> {
        self.control_transfer(request_type, request, 0, 0, None)
    }
}

impl<C: UsbContext> UsbRawDevice<RusbTransport<C>> {
    /// Open the single raw device matching `filter` and `custom_match`
    ///
    /// With `options.interface` set, only devices whose active configuration
    /// has that raw interface count as matches.
    ///
    /// Fails with [`Error::DeviceNotFound`] when nothing matches and with
    /// [`Error::MultipleDevices`] when the criteria are ambiguous.
    pub fn open_with(
        context: &C,
        filter: &DeviceFilter,
        custom_match: Option<&dyn Fn(&Device<C>) -> bool>,
        options: &OpenOptions,
    ) -> Result<Self> {
        // Only count devices whose raw interface open() can actually claim
        let wanted_interface = options.interface;
        let accepts = |device: &Device<C>| {
            custom_match.is_none_or(|custom_match| custom_match(device))
                && wanted_interface.is_none_or(|n| raw_interface_number(device, Some(n)).is_some())
        };
        let mut devices = find_raw_devices(context, filter, Some(&accepts))?;
        if devices.len() > 1 {
            return Err(Error::MultipleDevices(devices.len()));
        }
        let device = devices.pop().ok_or(Error::DeviceNotFound)?;

        debug!(
            "Opening raw device bus={} addr={}",
            device.bus_number(),
            device.address()
        );

        let transport = RusbTransport::open(device, options)?;
        Self::new(transport)
    }
}

impl UsbRawDevice<RusbTransport<Context>> {
    /// Open the single raw device matching `filter` in a fresh libusb context
    pub fn open(filter: &DeviceFilter, options: &OpenOptions) -> Result<Self> {
        let context = Context::new()?;
        Self::open_with(&context, filter, None, options)
    }

    /// Open the device addressed by a `USB...::RAW` resource name
    ///
    /// An interface number in the resource overrides the one in `options`.
    pub fn open_resource(resource: &ResourceName, options: &OpenOptions) -> Result<Self> {
        let mut options = options.clone();
        if let Some(interface) = resource.interface {
            options.interface = Some(interface);
        }
        Self::open(&resource.filter(), &options)
    }
}
