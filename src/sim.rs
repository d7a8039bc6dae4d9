//! In-process simulated camera.
//!
//! Implements the transport traits without hardware so sessions, recording
//! and frame retrieval can be exercised end to end. Frames are paced in real
//! time at the configured record rate and carry a deterministic gradient so
//! tests can tell them apart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::transport::{DeviceAddress, DeviceConnection, DeviceTransport, TransportError};
use crate::types::{CapabilitySet, PixelFormat, Resolution};

/// Injected device misbehaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFault {
    /// Drop the link after this many recorded frames
    DisconnectAfter(u64),
    /// Stop delivering recorded frames after this many
    StallAfter(u64),
    /// Never answer frame requests, recorded or live
    Unresponsive,
    /// Take this long to answer the capability query on open
    SlowQuery(Duration),
    /// Accept the connection but time out on the capability query
    QueryTimeout,
}

/// Profile of one simulated camera.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    capabilities: CapabilitySet,
    default_resolution: Resolution,
    default_rate: u32,
    fault: Option<SimFault>,
}

impl SimulatedDevice {
    /// A device with the given capabilities, defaulting to its largest
    /// resolution and slowest rate.
    pub fn new(capabilities: CapabilitySet) -> Self {
        let default_resolution = capabilities
            .resolutions()
            .last()
            .copied()
            .unwrap_or(Resolution::new(1, 1));
        let default_rate = capabilities.min_rate().unwrap_or(1);
        Self {
            capabilities,
            default_resolution,
            default_rate,
            fault: None,
        }
    }

    pub fn with_defaults(mut self, resolution: Resolution, rate: u32) -> Self {
        self.default_resolution = resolution;
        self.default_rate = rate;
        self
    }

    pub fn with_fault(mut self, fault: SimFault) -> Self {
        self.fault = Some(fault);
        self
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }
}

impl Default for SimulatedDevice {
    /// A high-speed camera with 64 MiB of frame memory and 8-bit output.
    fn default() -> Self {
        let rates = vec![50, 60, 125, 250, 500, 1000, 2000, 5000, 10000];
        let resolutions = vec![
            Resolution::new(128, 128),
            Resolution::new(256, 256),
            Resolution::new(512, 512),
            Resolution::new(1024, 512),
            Resolution::new(1024, 1024),
        ];
        let caps = CapabilitySet::new(rates, resolutions, 64 * 1024 * 1024, PixelFormat::Mono8);
        Self::new(caps).with_defaults(Resolution::new(1024, 1024), 1000)
    }
}

#[derive(Debug, Default)]
struct SimStats {
    connects: AtomicUsize,
    closes: AtomicUsize,
}

/// Transport serving a table of simulated devices keyed by address.
#[derive(Debug, Default)]
pub struct SimulatedTransport {
    devices: Mutex<HashMap<DeviceAddress, SimulatedDevice>>,
    stats: Arc<SimStats>,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`add_device`](Self::add_device).
    pub fn with_device(self, address: DeviceAddress, device: SimulatedDevice) -> Self {
        self.add_device(address, device);
        self
    }

    pub fn add_device(&self, address: DeviceAddress, device: SimulatedDevice) {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address, device);
    }

    /// Unplug a device. Existing connections keep working.
    pub fn remove_device(&self, address: &DeviceAddress) -> Option<SimulatedDevice> {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(address)
    }

    /// Successful connects so far.
    pub fn connect_count(&self) -> usize {
        self.stats.connects.load(Ordering::SeqCst)
    }

    /// Connections closed so far.
    pub fn close_count(&self) -> usize {
        self.stats.closes.load(Ordering::SeqCst)
    }
}

impl DeviceTransport for SimulatedTransport {
    fn connect(&self, address: &DeviceAddress) -> Result<Box<dyn DeviceConnection>, TransportError> {
        let device = self
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
            .ok_or_else(|| {
                TransportError::Unreachable(format!("no device detected at {:#010x}", address.as_u32()))
            })?;

        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimConnection {
            resolution: device.default_resolution,
            rate: device.default_rate,
            device,
            recording: None,
            sent: 0,
            live_sequence: 0,
            stats: Arc::clone(&self.stats),
            closed: false,
        }))
    }
}

struct SimConnection {
    device: SimulatedDevice,
    resolution: Resolution,
    rate: u32,
    /// Start instant of the active recording pass
    recording: Option<Instant>,
    sent: u64,
    live_sequence: u64,
    stats: Arc<SimStats>,
    closed: bool,
}

impl SimConnection {
    fn check_open(&self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Unreachable("connection closed".to_string()));
        }
        Ok(())
    }

    fn frame_bytes(&self, sequence: u64) -> Vec<u8> {
        let format = self.device.capabilities.pixel_format();
        gradient(self.resolution, format, sequence)
    }
}

impl DeviceConnection for SimConnection {
    fn capabilities(&mut self) -> Result<CapabilitySet, TransportError> {
        self.check_open()?;
        match self.device.fault {
            Some(SimFault::SlowQuery(delay)) => thread::sleep(delay),
            Some(SimFault::QueryTimeout) => return Err(TransportError::Timeout),
            _ => {}
        }
        Ok(self.device.capabilities.clone())
    }

    fn current_settings(&mut self) -> Result<(Resolution, u32), TransportError> {
        self.check_open()?;
        Ok((self.resolution, self.rate))
    }

    fn set_resolution(&mut self, resolution: Resolution) -> Result<(), TransportError> {
        self.check_open()?;
        if self.recording.is_some() {
            return Err(TransportError::Rejected("recording in progress".to_string()));
        }
        if !self.device.capabilities.supports_resolution(resolution) {
            return Err(TransportError::Rejected(format!("resolution {}", resolution)));
        }
        self.resolution = resolution;
        Ok(())
    }

    fn set_record_rate(&mut self, rate: u32) -> Result<(), TransportError> {
        self.check_open()?;
        if self.recording.is_some() {
            return Err(TransportError::Rejected("recording in progress".to_string()));
        }
        if !self.device.capabilities.supports_rate(rate) {
            return Err(TransportError::Rejected(format!("record rate {}", rate)));
        }
        self.rate = rate;
        Ok(())
    }

    fn start_recording(&mut self) -> Result<(), TransportError> {
        self.check_open()?;
        self.recording = Some(Instant::now());
        self.sent = 0;
        Ok(())
    }

    fn next_frame(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.check_open()?;
        let started = self
            .recording
            .ok_or_else(|| TransportError::Rejected("not recording".to_string()))?;

        match self.device.fault {
            Some(SimFault::DisconnectAfter(n)) if self.sent >= n => {
                return Err(TransportError::Unreachable("link lost".to_string()));
            }
            Some(SimFault::StallAfter(n)) if self.sent >= n => {
                thread::sleep(timeout);
                return Err(TransportError::Timeout);
            }
            Some(SimFault::Unresponsive) => {
                thread::sleep(timeout);
                return Err(TransportError::Timeout);
            }
            _ => {}
        }

        // Frame k (1-based) is exposed k / rate seconds into the pass
        let due = started + Duration::from_secs_f64((self.sent + 1) as f64 / self.rate as f64);
        let now = Instant::now();
        if due > now + timeout {
            thread::sleep(timeout);
            return Err(TransportError::Timeout);
        }
        if due > now {
            thread::sleep(due - now);
        }

        let data = self.frame_bytes(self.sent);
        self.sent += 1;
        Ok(data)
    }

    fn stop_recording(&mut self) -> Result<(), TransportError> {
        self.check_open()?;
        self.recording = None;
        Ok(())
    }

    fn capture_live(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.check_open()?;
        if self.device.fault == Some(SimFault::Unresponsive) {
            thread::sleep(timeout);
            return Err(TransportError::Timeout);
        }
        self.live_sequence += 1;
        Ok(self.frame_bytes(self.live_sequence))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.recording = None;
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Diagonal gradient shifted by `sequence`, row-major.
pub fn gradient(resolution: Resolution, format: PixelFormat, sequence: u64) -> Vec<u8> {
    let width = resolution.width as usize;
    let bpp = format.bytes_per_pixel();
    let shift = (sequence % 256) as usize;
    let mut data = Vec::with_capacity(format.frame_len(resolution));
    for i in 0..resolution.pixel_count() {
        let x = i % width.max(1);
        let y = i / width.max(1);
        let value = ((x + y + shift) % 256) as u8;
        data.extend(std::iter::repeat(value).take(bpp));
    }
    data
}
