//! Open camera sessions and their configuration.
//!
//! A [`Session`] owns one device connection, its capability snapshot and its
//! frame store. All device traffic for a session goes through a single mutex,
//! so acquisition and configuration calls on the same session run one at a
//! time; a caller arriving while another call is in flight waits for it.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::Config;
use crate::error::{CamError, CamResult};
use crate::frame_store::FrameStore;
use crate::transport::{DeviceAddress, DeviceConnection, TransportError};
use crate::types::{CapabilitySet, Frame, Resolution};

/// Lifecycle state of an open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, running on the device's default configuration
    Open,
    /// Resolution explicitly set
    Configured,
    /// A recording pass is in flight
    Recording,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Open,
            1 => SessionState::Configured,
            _ => SessionState::Recording,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SessionState::Open => 0,
            SessionState::Configured => 1,
            SessionState::Recording => 2,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Open => write!(f, "open"),
            SessionState::Configured => write!(f, "configured"),
            SessionState::Recording => write!(f, "recording"),
        }
    }
}

/// State guarded by the session lock.
pub(crate) struct SessionInner {
    pub(crate) conn: Box<dyn DeviceConnection>,
    pub(crate) resolution: Resolution,
    pub(crate) rate: u32,
    pub(crate) store: FrameStore,
}

/// One opened camera interface.
pub struct Session {
    handle: u64,
    address: DeviceAddress,
    capabilities: CapabilitySet,
    /// Capacity cap from configuration, reapplied on resolution changes
    config: Config,
    /// Lifecycle state, readable without waiting on the lock
    state: AtomicU8,
    closed: AtomicBool,
    inner: Mutex<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("handle", &format_args!("{:#x}", self.handle))
            .field("address", &self.address)
            .field("state", &self.current_state())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Take ownership of a fresh connection: snapshot capabilities and the
    /// device's current settings, and size the frame store accordingly.
    ///
    /// The session has no handle until the registry assigns one. If either
    /// query fails the connection is closed and the failure is reported as
    /// `DeviceUnreachable`, whatever the transport said.
    pub(crate) fn open(
        address: DeviceAddress,
        mut conn: Box<dyn DeviceConnection>,
        config: &Config,
    ) -> CamResult<Self> {
        let snapshot = conn
            .capabilities()
            .and_then(|caps| conn.current_settings().map(|settings| (caps, settings)));
        let (capabilities, (resolution, rate)) = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                conn.close();
                return Err(CamError::DeviceUnreachable {
                    address: address.to_string(),
                    message: format!("device answered but could not be queried: {}", e),
                });
            }
        };
        let capacity = config.clamp_capacity(capabilities.frames_at(resolution));
        let store = FrameStore::new(capacity, resolution, capabilities.pixel_format());

        Ok(Self {
            handle: 0,
            address,
            capabilities,
            config: config.clone(),
            state: AtomicU8::new(SessionState::Open.as_u8()),
            closed: AtomicBool::new(false),
            inner: Mutex::new(SessionInner {
                conn,
                resolution,
                rate,
                store,
            }),
        })
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub(crate) fn assign_handle(&mut self, handle: u64) {
        self.handle = handle;
    }

    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn is_recording(&self) -> bool {
        self.current_state() == SessionState::Recording
    }

    fn current_state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Acquire the session lock, waiting for any in-flight operation.
    pub(crate) fn lock(&self) -> CamResult<MutexGuard<'_, SessionInner>> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            return Err(CamError::InvalidHandle { handle: self.handle });
        }
        Ok(inner)
    }

    /// Release the device. Waits for an in-flight operation to finish.
    pub(crate) fn close(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.closed.swap(true, Ordering::SeqCst) {
            inner.store.clear();
            inner.conn.close();
            log::info!("Closed session {:#x} ({})", self.handle, self.address);
        }
    }

    /// Lifecycle state. Never waits for an in-flight operation.
    pub fn state(&self) -> CamResult<SessionState> {
        if self.is_closed() {
            return Err(CamError::InvalidHandle { handle: self.handle });
        }
        Ok(self.current_state())
    }

    /// Capture rates in ascending order; index 0 is the slowest.
    pub fn valid_capture_rates(&self) -> Vec<u32> {
        self.capabilities.capture_rates().to_vec()
    }

    pub fn current_resolution(&self) -> CamResult<Resolution> {
        Ok(self.lock()?.resolution)
    }

    pub fn current_capture_rate(&self) -> CamResult<u32> {
        Ok(self.lock()?.rate)
    }

    /// Set the sensor resolution.
    ///
    /// Every stored frame is invalidated, since the store's frame size and
    /// capacity follow the resolution.
    pub fn set_resolution(&self, resolution: Resolution) -> CamResult<()> {
        if !self.capabilities.supports_resolution(resolution) {
            return Err(CamError::UnsupportedParameter(format!(
                "resolution {} is not supported (supported: {})",
                resolution,
                self.capabilities
                    .resolutions()
                    .iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        let mut inner = self.lock()?;
        inner
            .conn
            .set_resolution(resolution)
            .map_err(|e| self.transport_error("set_resolution", Duration::ZERO, e))?;

        let capacity = self
            .config
            .clamp_capacity(self.capabilities.frames_at(resolution));
        let dropped = inner.store.count();
        inner.store.reset(capacity, resolution, self.capabilities.pixel_format());
        inner.resolution = resolution;
        self.set_state(SessionState::Configured);

        log::info!(
            "Session {:#x}: resolution set to {} ({} frame slots, {} stored frame(s) invalidated)",
            self.handle,
            resolution,
            capacity,
            dropped
        );
        Ok(())
    }

    /// Set the record rate in frames per second. Stored frames are kept.
    pub fn set_capture_rate(&self, rate: u32) -> CamResult<()> {
        if !self.capabilities.supports_rate(rate) {
            return Err(CamError::UnsupportedParameter(format!(
                "capture rate {} is not valid, see get_valid_capture_rates()",
                rate
            )));
        }

        let mut inner = self.lock()?;
        inner
            .conn
            .set_record_rate(rate)
            .map_err(|e| self.transport_error("set_capture_rate", Duration::ZERO, e))?;
        inner.rate = rate;

        log::info!("Session {:#x}: capture rate set to {} fps", self.handle, rate);
        Ok(())
    }

    /// Number of valid frames in memory.
    pub fn frame_count(&self) -> CamResult<usize> {
        Ok(self.lock()?.store.count())
    }

    pub fn frame_capacity(&self) -> CamResult<usize> {
        Ok(self.lock()?.store.capacity())
    }

    /// Copy of the frame at `index` (0 is the oldest retained frame).
    pub fn frame_at(&self, index: usize) -> CamResult<Frame> {
        let inner = self.lock()?;
        inner
            .store
            .frame_at(index)
            .ok_or(CamError::FrameIndexOutOfRange {
                index,
                count: inner.store.count(),
            })
    }

    pub(crate) fn transport_error(
        &self,
        operation: &'static str,
        elapsed: Duration,
        err: TransportError,
    ) -> CamError {
        transport_error(&self.address, operation, elapsed, err)
    }

    /// A raw buffer whose length disagrees with the negotiated geometry.
    pub(crate) fn malformed_frame(&self, actual: usize, expected: usize) -> CamError {
        CamError::DeviceUnreachable {
            address: self.address.to_string(),
            message: format!(
                "device returned a {} byte frame, expected {} bytes",
                actual, expected
            ),
        }
    }
}

/// Map a transport failure onto exactly one error kind.
fn transport_error(
    address: &DeviceAddress,
    operation: &'static str,
    elapsed: Duration,
    err: TransportError,
) -> CamError {
    match err {
        TransportError::Unreachable(message) => CamError::DeviceUnreachable {
            address: address.to_string(),
            message,
        },
        TransportError::Timeout => CamError::Timeout { operation, elapsed },
        TransportError::Rejected(message) => CamError::UnsupportedParameter(message),
    }
}
