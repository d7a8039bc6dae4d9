//! hscam: session and acquisition core for high-speed network cameras.
//!
//! The crate opens camera interfaces by address, negotiates resolution and
//! capture rate, drives timed recordings into the camera's frame memory and
//! reads frames back as raw pixel buffers. Device I/O goes through the
//! [`DeviceTransport`] trait; [`sim::SimulatedTransport`] provides a
//! hardware-free implementation.
//!
//! ```ignore
//! let cam = HsCam::new(transport);
//! cam.initialize_module();
//! let handle = cam.open_by_address("192.168.0.10")?;
//! cam.set_resolution(handle, 1024, 1024)?;
//! let rate = cam.get_valid_capture_rates(handle)?[0];
//! cam.set_capture_rate(handle, rate)?;
//! cam.record_blocking(handle, 250)?;
//! let n = cam.get_memory_frame_count(handle)?;
//! let last = cam.get_image_from_memory(handle, n - 1)?;
//! ```

pub mod config;
pub mod error;
pub mod facade;
pub mod frame_store;
pub mod module;
pub mod recording;
pub mod registry;
pub mod session;
pub mod sim;
pub mod transport;
pub mod types;

pub use config::{Config, ConfigError};
pub use error::{CamError, CamResult, ErrorKind};
pub use facade::HsCam;
pub use frame_store::FrameStore;
pub use module::ModuleState;
pub use recording::{CancelToken, RecordingSummary};
pub use registry::{Registry, SessionHandle};
pub use session::{Session, SessionState};
pub use transport::{DeviceAddress, DeviceConnection, DeviceTransport, TransportError};
pub use types::{CapabilitySet, Frame, PixelFormat, Resolution};
