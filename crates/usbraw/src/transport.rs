//! Single-shot transport seam
//!
//! A [`RawTransport`] performs exactly one bulk write, one bulk read or one
//! control transfer per call. [`crate::UsbRawDevice`] builds chunked I/O on
//! top of it. [`crate::RusbTransport`] is the libusb-backed implementation and
//! [`crate::test_utils::MockTransport`] the in-memory one.

use std::fmt;

/// Transfer direction, as encoded in bit 7 of an endpoint address or
/// `bmRequestType`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Device to host
    In,
    /// Host to device
    Out,
}

impl Direction {
    const IN_BIT: u8 = 0x80;

    pub fn of_request_type(request_type: u8) -> Self {
        if request_type & Self::IN_BIT != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    pub fn of_endpoint(address: u8) -> Self {
        // Same bit for both
        Self::of_request_type(address)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "Bulk-In"),
            Direction::Out => write!(f, "Bulk-Out"),
        }
    }
}

/// Data stage of a control transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataOrLength {
    /// Payload sent to the device (OUT transfers)
    Data(Vec<u8>),
    /// Number of bytes to receive, the setup packet's `wLength` (IN transfers)
    Length(u16),
}

impl From<Vec<u8>> for DataOrLength {
    fn from(data: Vec<u8>) -> Self {
        DataOrLength::Data(data)
    }
}

impl From<&[u8]> for DataOrLength {
    fn from(data: &[u8]) -> Self {
        DataOrLength::Data(data.to_vec())
    }
}

impl From<u16> for DataOrLength {
    fn from(length: u16) -> Self {
        DataOrLength::Length(length)
    }
}

/// One-transfer-per-call access to a raw USB interface
pub trait RawTransport {
    type Error: std::error::Error;

    /// Bulk-IN endpoint address, if the interface has one
    fn recv_endpoint(&self) -> Option<u8>;

    /// Bulk-OUT endpoint address, if the interface has one
    fn send_endpoint(&self) -> Option<u8>;

    /// Issue one bulk-OUT transfer and return the number of bytes sent
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Issue one bulk-IN transfer of at most `max_size` bytes
    fn read(&mut self, max_size: usize) -> Result<Vec<u8>, Self::Error>;

    /// Issue one control transfer on endpoint 0
    ///
    /// Returns the data received during an IN data stage (empty for OUT) and
    /// the status value reported by the underlying call.
    fn ctrl_transfer(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data_or_length: Option<DataOrLength>,
    ) -> Result<(Vec<u8>, usize), Self::Error>;
}
