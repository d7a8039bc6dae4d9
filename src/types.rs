//! Camera types and data structures.

use std::fmt;
use std::time::Instant;

/// Sensor resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels in one frame.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// Pixel format of frames produced by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// 8-bit grayscale (1 byte per pixel)
    #[default]
    Mono8,
    /// 16-bit grayscale, little endian (2 bytes per pixel)
    Mono16,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Mono8 => 1,
            PixelFormat::Mono16 => 2,
        }
    }

    /// Exact byte length of one frame at `resolution`.
    pub fn frame_len(&self, resolution: Resolution) -> usize {
        resolution.pixel_count() * self.bytes_per_pixel()
    }
}

/// Device-reported capabilities, fetched once when a session opens.
///
/// Capture rates are kept in ascending order so index 0 is always the
/// slowest supported rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySet {
    capture_rates: Vec<u32>,
    resolutions: Vec<Resolution>,
    memory_bytes: u64,
    pixel_format: PixelFormat,
}

impl CapabilitySet {
    /// Build a capability set. Rates and resolutions are sorted and
    /// deduplicated regardless of the order the device reported them in.
    pub fn new(
        mut capture_rates: Vec<u32>,
        mut resolutions: Vec<Resolution>,
        memory_bytes: u64,
        pixel_format: PixelFormat,
    ) -> Self {
        capture_rates.sort_unstable();
        capture_rates.dedup();
        resolutions.sort_unstable();
        resolutions.dedup();
        Self {
            capture_rates,
            resolutions,
            memory_bytes,
            pixel_format,
        }
    }

    /// Supported capture rates in frames per second, ascending.
    pub fn capture_rates(&self) -> &[u32] {
        &self.capture_rates
    }

    pub fn resolutions(&self) -> &[Resolution] {
        &self.resolutions
    }

    /// Size of the device's frame memory in bytes.
    pub fn memory_bytes(&self) -> u64 {
        self.memory_bytes
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub fn min_rate(&self) -> Option<u32> {
        self.capture_rates.first().copied()
    }

    pub fn supports_rate(&self, rate: u32) -> bool {
        self.capture_rates.binary_search(&rate).is_ok()
    }

    pub fn supports_resolution(&self, resolution: Resolution) -> bool {
        self.resolutions.binary_search(&resolution).is_ok()
    }

    /// How many frames of `resolution` fit in device memory (at least one).
    pub fn frames_at(&self, resolution: Resolution) -> usize {
        let frame_len = self.pixel_format.frame_len(resolution).max(1) as u64;
        ((self.memory_bytes / frame_len) as usize).max(1)
    }
}

/// A captured frame.
///
/// `data` is row-major and exactly `width * height * bytes_per_pixel` long.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Raw pixel data
    pub data: Vec<u8>,
    /// Resolution the frame was captured at
    pub resolution: Resolution,
    /// Pixel format
    pub format: PixelFormat,
    /// Position of this frame within its recording pass (0 for live captures)
    pub sequence: u64,
    /// Timestamp when the frame reached the host
    pub timestamp: Instant,
}

impl Frame {
    /// Wrap a raw buffer, checking that its length matches the resolution.
    ///
    /// Returns the expected length on mismatch.
    pub fn from_raw(
        data: Vec<u8>,
        resolution: Resolution,
        format: PixelFormat,
        sequence: u64,
    ) -> Result<Self, usize> {
        let expected = format.frame_len(resolution);
        if data.len() != expected {
            return Err(expected);
        }
        Ok(Self {
            data,
            resolution,
            format,
            sequence,
            timestamp: Instant::now(),
        })
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.format.bytes_per_pixel()
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    /// Consume the frame and return its pixel buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
