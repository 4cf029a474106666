//! Raw USB device sessions
//!
//! This crate talks to USB devices that expose a vendor-specific "raw"
//! interface (class `0xFF`, subclass `0x00`) with a bulk-in and a bulk-out
//! endpoint. It provides device discovery, VISA-style resource names, a
//! transport seam over rusb and the chunked [`UsbRawDevice`] session.

pub mod backend;
pub mod discovery;
pub mod error;
pub mod resource;
pub mod session;
pub mod test_utils;
pub mod transport;

pub use backend::{OpenOptions, RusbTransport};
pub use discovery::{DeviceFilter, RawDeviceInfo, find_devices, find_raw_devices, list_raw_devices};
pub use error::{Error, Result};
pub use resource::ResourceName;
pub use session::{RECV_CHUNK, UsbRawDevice};
pub use transport::{DataOrLength, Direction, RawTransport};
