//! Error types for opening raw USB sessions
//!
//! Transfer failures are not represented here: a session returns its
//! transport's own error type unchanged.

use crate::transport::Direction;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The raw interface lacks one of the two bulk endpoints
    #[error("USBRAW device must have both Bulk-In and Bulk-Out endpoints ({0} endpoint missing)")]
    MissingEndpoint(Direction),

    #[error("No matching USB raw device found")]
    DeviceNotFound,

    #[error("{0} matching USB raw devices found, narrow the search criteria")]
    MultipleDevices(usize),

    /// The device has no interface with class 0xFF / subclass 0x00
    #[error("Device has no vendor-specific raw interface")]
    NoRawInterface,

    #[error("Invalid resource name: {0}")]
    InvalidResource(String),

    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
