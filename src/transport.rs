//! Device transport seam.
//!
//! The vendor SDK (or network protocol) that actually talks to the camera is
//! reached through [`DeviceTransport`] and [`DeviceConnection`]. Everything
//! above this module speaks in sessions and frames; everything below it is
//! request/response calls against one device.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

use crate::types::{CapabilitySet, Resolution};

/// Network address of a camera interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceAddress {
    ip: Ipv4Addr,
}

impl DeviceAddress {
    pub fn new(ip: Ipv4Addr) -> Self {
        Self { ip }
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    /// Packed 32-bit form used for device detection.
    /// Example: "192.168.0.10" -> 0xC0A8000A
    pub fn as_u32(&self) -> u32 {
        u32::from(self.ip)
    }
}

impl FromStr for DeviceAddress {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<Ipv4Addr>().map(Self::new)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ip)
    }
}

/// Failures reported by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The device could not be reached or dropped the connection
    #[error("device unreachable: {0}")]
    Unreachable(String),
    /// The device did not answer within the allotted time
    #[error("device did not respond in time")]
    Timeout,
    /// The device refused a parameter
    #[error("device rejected request: {0}")]
    Rejected(String),
}

/// Opens connections to devices.
pub trait DeviceTransport: Send + Sync {
    /// Detect and open the device at `address`. One attempt, no retries.
    fn connect(&self, address: &DeviceAddress) -> Result<Box<dyn DeviceConnection>, TransportError>;
}

/// One open connection to a camera.
///
/// Calls are synchronous request/response operations. A connection is used
/// by a single session at a time, so it only needs to be `Send`.
pub trait DeviceConnection: Send {
    /// Query supported rates, resolutions and memory size.
    fn capabilities(&mut self) -> Result<CapabilitySet, TransportError>;

    /// Resolution and record rate the device is currently set to.
    fn current_settings(&mut self) -> Result<(Resolution, u32), TransportError>;

    fn set_resolution(&mut self, resolution: Resolution) -> Result<(), TransportError>;

    fn set_record_rate(&mut self, rate: u32) -> Result<(), TransportError>;

    /// Start streaming frames at the configured record rate.
    fn start_recording(&mut self) -> Result<(), TransportError>;

    /// Block until the next recorded frame arrives or `timeout` passes.
    fn next_frame(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    fn stop_recording(&mut self) -> Result<(), TransportError>;

    /// Grab one frame straight from the sensor, bypassing frame memory.
    fn capture_live(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Release the device. Called once when the session closes.
    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        let addr: DeviceAddress = "192.168.0.10".parse().unwrap();
        assert_eq!(addr.as_u32(), 0xC0A8000A);
        assert_eq!(format!("{}", addr), "192.168.0.10");
    }

    #[test]
    fn test_parse_address_trims() {
        let addr: DeviceAddress = " 10.0.0.1 ".parse().unwrap();
        assert_eq!(addr.as_u32(), 0x0A000001);
    }

    #[test]
    fn test_parse_invalid_address() {
        assert!("192.168.0".parse::<DeviceAddress>().is_err());
        assert!("camera.local".parse::<DeviceAddress>().is_err());
        assert!("192.168.0.256".parse::<DeviceAddress>().is_err());
    }

    #[test]
    fn test_transport_error_display() {
        assert_eq!(
            format!("{}", TransportError::Unreachable("link down".to_string())),
            "device unreachable: link down"
        );
        assert_eq!(
            format!("{}", TransportError::Timeout),
            "device did not respond in time"
        );
    }
}
