//! Test utilities for usbraw
//!
//! Provides an in-memory [`RawTransport`] and fixtures for testing sessions
//! without hardware.
//!
//! # Example
//!
//! ```
//! use usbraw::UsbRawDevice;
//! use usbraw::test_utils::MockTransport;
//!
//! let transport = MockTransport::new().with_read_chunks(vec![b"OK\n".to_vec()]);
//! let mut device = UsbRawDevice::new(transport).unwrap();
//! assert_eq!(device.write(b"PING\n").unwrap(), 5);
//! assert_eq!(device.read(3).unwrap(), b"OK\n");
//! ```

use crate::discovery::RawDeviceInfo;
use crate::transport::{DataOrLength, RawTransport};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

/// Bulk-IN endpoint address used by [`MockTransport::new`]
pub const MOCK_RECV_ENDPOINT: u8 = 0x81;
/// Bulk-OUT endpoint address used by [`MockTransport::new`]
pub const MOCK_SEND_ENDPOINT: u8 = 0x01;

/// Errors a [`MockTransport`] can be scripted to return
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MockError {
    #[error("Operation timed out")]
    Timeout,
    #[error("Pipe error")]
    Pipe,
    #[error("No such device (it may have been disconnected)")]
    NoDevice,
}

/// One call made on a [`MockTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// Bulk write of this many bytes
    Write(usize),
    /// Bulk read requesting at most this many bytes
    Read(usize),
    Control {
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data_or_length: Option<DataOrLength>,
    },
}

/// Scripted transport that records every call
///
/// Reads are served from a queue of chunks, then from a repeating chunk if
/// one is set, and otherwise fail with [`MockError::Timeout`]. Returned chunks
/// are cut to the requested size.
#[derive(Debug, Default)]
pub struct MockTransport {
    recv_ep: Option<u8>,
    send_ep: Option<u8>,
    calls: Vec<MockCall>,
    written: Vec<u8>,
    read_queue: VecDeque<Result<Vec<u8>, MockError>>,
    repeating_read: Option<Vec<u8>>,
    write_limit: Option<usize>,
    write_errors: HashMap<usize, MockError>,
    control_response: Option<Result<(Vec<u8>, usize), MockError>>,
}

impl MockTransport {
    /// Transport with both bulk endpoints present and nothing to read
    pub fn new() -> Self {
        Self {
            recv_ep: Some(MOCK_RECV_ENDPOINT),
            send_ep: Some(MOCK_SEND_ENDPOINT),
            ..Self::default()
        }
    }

    pub fn without_recv_endpoint(mut self) -> Self {
        self.recv_ep = None;
        self
    }

    pub fn without_send_endpoint(mut self) -> Self {
        self.send_ep = None;
        self
    }

    /// Queue chunks returned by successive reads
    pub fn with_read_chunks(mut self, chunks: Vec<Vec<u8>>) -> Self {
        self.read_queue.extend(chunks.into_iter().map(Ok));
        self
    }

    /// Queue a failing read after the chunks queued so far
    pub fn with_read_error(mut self, error: MockError) -> Self {
        self.read_queue.push_back(Err(error));
        self
    }

    /// Return `chunk` from every read once the queue is empty
    pub fn with_repeating_read(mut self, chunk: Vec<u8>) -> Self {
        self.repeating_read = Some(chunk);
        self
    }

    /// Report at most `limit` bytes sent per write
    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    /// Fail the write with zero-based position `call` with `error`
    pub fn with_write_error_at(mut self, call: usize, error: MockError) -> Self {
        self.write_errors.insert(call, error);
        self
    }

    pub fn with_control_response(mut self, response: Result<(Vec<u8>, usize), MockError>) -> Self {
        self.control_response = Some(response);
        self
    }

    pub fn calls(&self) -> &[MockCall] {
        &self.calls
    }

    /// All bytes accepted by writes, in order
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Length of every write, in order
    pub fn write_sizes(&self) -> Vec<usize> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                MockCall::Write(len) => Some(*len),
                _ => None,
            })
            .collect()
    }

    /// Requested size of every read, in order
    pub fn read_requests(&self) -> Vec<usize> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                MockCall::Read(max_size) => Some(*max_size),
                _ => None,
            })
            .collect()
    }
}

impl RawTransport for MockTransport {
    type Error = MockError;

    fn recv_endpoint(&self) -> Option<u8> {
        self.recv_ep
    }

    fn send_endpoint(&self) -> Option<u8> {
        self.send_ep
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, MockError> {
        let position = self.write_sizes().len();
        self.calls.push(MockCall::Write(data.len()));

        if let Some(error) = self.write_errors.remove(&position) {
            return Err(error);
        }

        let sent = self.write_limit.map_or(data.len(), |limit| data.len().min(limit));
        self.written.extend_from_slice(&data[..sent]);
        Ok(sent)
    }

    fn read(&mut self, max_size: usize) -> Result<Vec<u8>, MockError> {
        self.calls.push(MockCall::Read(max_size));

        let mut chunk = match self.read_queue.pop_front() {
            Some(result) => result?,
            None => self.repeating_read.clone().ok_or(MockError::Timeout)?,
        };
        chunk.truncate(max_size);
        Ok(chunk)
    }

    fn ctrl_transfer(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data_or_length: Option<DataOrLength>,
    ) -> Result<(Vec<u8>, usize), MockError> {
        self.calls.push(MockCall::Control {
            request_type,
            request,
            value,
            index,
            data_or_length,
        });

        self.control_response.clone().unwrap_or(Ok((Vec::new(), 0)))
    }
}

/// Create a mock RawDeviceInfo for testing
pub fn create_mock_device_info(vendor_id: u16, product_id: u16, serial: Option<&str>) -> RawDeviceInfo {
    RawDeviceInfo {
        bus_number: 1,
        address: 4,
        vendor_id,
        product_id,
        manufacturer: Some("Test Manufacturer".to_string()),
        product: Some("Test Instrument".to_string()),
        serial_number: serial.map(str::to_string),
        interface_number: 0,
    }
}

/// Deterministic payload of `len` bytes
pub fn pattern_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_read_queue_then_timeout() {
        let mut transport = MockTransport::new().with_read_chunks(vec![vec![1, 2, 3]]);
        assert_eq!(transport.read(2).unwrap(), vec![1, 2]);
        assert_eq!(transport.read(2), Err(MockError::Timeout));
        assert_eq!(transport.read_requests(), vec![2, 2]);
    }

    #[test]
    fn test_mock_write_limit() {
        let mut transport = MockTransport::new().with_write_limit(2);
        assert_eq!(transport.write(&[9, 8, 7]).unwrap(), 2);
        assert_eq!(transport.written(), &[9, 8]);
    }

    #[test]
    fn test_pattern_bytes() {
        let bytes = pattern_bytes(300);
        assert_eq!(bytes.len(), 300);
        assert_eq!(bytes[251], 0);
    }
}
