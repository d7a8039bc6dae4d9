//! Public capture API.
//!
//! [`HsCam`] strings the components together in the order a caller uses
//! them: initialize the module, open a device, configure it, record or grab
//! a live frame, then read frames back. It keeps no state of its own and
//! returns component errors unchanged.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::CamResult;
use crate::module::ModuleState;
use crate::recording::{self, CancelToken, RecordingSummary};
use crate::registry::{Registry, SessionHandle};
use crate::session::SessionState;
use crate::transport::{DeviceAddress, DeviceTransport};
use crate::types::{CapabilitySet, Frame, Resolution};

/// Camera control surface.
#[derive(Debug)]
pub struct HsCam {
    registry: Registry,
}

impl HsCam {
    /// Create a facade with its own module state and default configuration.
    pub fn new(transport: Arc<dyn DeviceTransport>) -> Self {
        Self::with_config(transport, Config::default())
    }

    pub fn with_config(transport: Arc<dyn DeviceTransport>, config: Config) -> Self {
        Self::from_registry(Registry::with_config(ModuleState::new(), transport, config))
    }

    pub fn from_registry(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Initialize the module. Must run before any device is opened; calling
    /// it again has no effect.
    pub fn initialize_module(&self) {
        self.registry.initialize_module();
    }

    pub fn is_initialized(&self) -> bool {
        self.registry.module().is_initialized()
    }

    /// Close all sessions and uninitialize the module.
    pub fn teardown_module(&self) {
        self.registry.teardown_module();
    }

    /// Open the device at the given IPv4 address and return its handle.
    pub fn open_by_address(&self, address: &str) -> CamResult<SessionHandle> {
        self.registry.open_by_address(address)
    }

    pub fn close(&self, handle: SessionHandle) -> CamResult<()> {
        self.registry.close(handle)
    }

    pub fn open_sessions(&self) -> Vec<SessionHandle> {
        self.registry.open_sessions()
    }

    pub fn get_capabilities(&self, handle: SessionHandle) -> CamResult<CapabilitySet> {
        Ok(self.registry.session(handle)?.capabilities().clone())
    }

    pub fn session_state(&self, handle: SessionHandle) -> CamResult<SessionState> {
        self.registry.session(handle)?.state()
    }

    pub fn session_address(&self, handle: SessionHandle) -> CamResult<DeviceAddress> {
        Ok(self.registry.session(handle)?.address())
    }

    /// Set the resolution. Invalidates every frame in memory.
    pub fn set_resolution(&self, handle: SessionHandle, width: u32, height: u32) -> CamResult<()> {
        self.registry
            .session(handle)?
            .set_resolution(Resolution::new(width, height))
    }

    /// Current resolution as `(width, height)`.
    pub fn get_current_resolution(&self, handle: SessionHandle) -> CamResult<(u32, u32)> {
        let res = self.registry.session(handle)?.current_resolution()?;
        Ok((res.width, res.height))
    }

    /// Supported capture rates, slowest first.
    pub fn get_valid_capture_rates(&self, handle: SessionHandle) -> CamResult<Vec<u32>> {
        Ok(self.registry.session(handle)?.valid_capture_rates())
    }

    /// Alias of [`get_valid_capture_rates`](Self::get_valid_capture_rates).
    pub fn get_all_modes(&self, handle: SessionHandle) -> CamResult<Vec<u32>> {
        self.get_valid_capture_rates(handle)
    }

    pub fn set_capture_rate(&self, handle: SessionHandle, rate: u32) -> CamResult<()> {
        self.registry.session(handle)?.set_capture_rate(rate)
    }

    pub fn get_current_capture_rate(&self, handle: SessionHandle) -> CamResult<u32> {
        self.registry.session(handle)?.current_capture_rate()
    }

    /// Record for `duration_ms` milliseconds, blocking the caller.
    pub fn record_blocking(&self, handle: SessionHandle, duration_ms: u64) -> CamResult<RecordingSummary> {
        let session = self.registry.session(handle)?;
        recording::record_blocking(
            &session,
            Duration::from_millis(duration_ms),
            None,
            self.registry.config(),
        )
    }

    /// Like [`record_blocking`](Self::record_blocking), ending early once
    /// `cancel` fires. Frames captured before cancellation are kept.
    pub fn record_blocking_with_cancel(
        &self,
        handle: SessionHandle,
        duration_ms: u64,
        cancel: &CancelToken,
    ) -> CamResult<RecordingSummary> {
        let session = self.registry.session(handle)?;
        recording::record_blocking(
            &session,
            Duration::from_millis(duration_ms),
            Some(cancel),
            self.registry.config(),
        )
    }

    /// Number of frames currently held in memory.
    pub fn get_memory_frame_count(&self, handle: SessionHandle) -> CamResult<usize> {
        self.registry.session(handle)?.frame_count()
    }

    pub fn frame_capacity(&self, handle: SessionHandle) -> CamResult<usize> {
        self.registry.session(handle)?.frame_capacity()
    }

    /// Frame `index` from memory, counting from 0 (oldest).
    pub fn get_frame_from_memory(&self, handle: SessionHandle, index: usize) -> CamResult<Frame> {
        self.registry.session(handle)?.frame_at(index)
    }

    /// Pixel bytes of frame `index` from memory.
    pub fn get_image_from_memory(&self, handle: SessionHandle, index: usize) -> CamResult<Vec<u8>> {
        self.get_frame_from_memory(handle, index).map(Frame::into_bytes)
    }

    pub fn capture_live_frame(&self, handle: SessionHandle) -> CamResult<Frame> {
        let session = self.registry.session(handle)?;
        recording::capture_live_image(&session, self.registry.config())
    }

    /// Capture one image directly from the sensor and return its bytes.
    pub fn capture_live_image(&self, handle: SessionHandle) -> CamResult<Vec<u8>> {
        self.capture_live_frame(handle).map(Frame::into_bytes)
    }
}

impl Drop for HsCam {
    fn drop(&mut self) {
        self.registry.teardown_module();
    }
}
