//! Recording controller: timed recording passes and live captures.
//!
//! Both operations block the calling thread. A recording pass holds the
//! session lock from start to finish, so configuration changes and other
//! acquisitions on the same session wait until it completes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::{CamError, CamResult};
use crate::session::{Session, SessionState};
use crate::types::Frame;

/// Granularity of the post-stream wait while checking for cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(5);

/// Cooperative stop signal for a recording pass.
///
/// Clone it, hand one copy to the recording call and call
/// [`cancel`](Self::cancel) from another thread to end the pass early.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Outcome of a completed recording pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingSummary {
    /// Frames delivered by the device during this pass
    pub frames_captured: usize,
    /// Frames in memory afterwards (captured, bounded by capacity)
    pub frames_stored: usize,
    pub elapsed: Duration,
    pub cancelled: bool,
}

/// Most frames a pass of `duration` can yield at `rate` fps.
pub fn expected_frames(duration: Duration, rate: u32) -> usize {
    usize::try_from(duration.as_millis() * rate as u128 / 1000).unwrap_or(usize::MAX)
}

/// Puts the session in `Recording` and restores the previous state when
/// the pass ends, however it ends.
struct RecordingGuard<'a> {
    session: &'a Session,
    prior: SessionState,
}

impl<'a> RecordingGuard<'a> {
    fn enter(session: &'a Session) -> CamResult<Self> {
        let prior = session.state()?;
        session.set_state(SessionState::Recording);
        Ok(Self { session, prior })
    }
}

impl Drop for RecordingGuard<'_> {
    fn drop(&mut self) {
        self.session.set_state(self.prior);
    }
}

/// Record into the session's frame memory for `duration`.
///
/// Each pass starts from an empty store. On a mid-stream device failure the
/// frames already captured stay in memory and the error is returned, so
/// callers should re-check the frame count.
pub fn record_blocking(
    session: &Session,
    duration: Duration,
    cancel: Option<&CancelToken>,
    config: &Config,
) -> CamResult<RecordingSummary> {
    let mut inner = session.lock()?;

    if duration.is_zero() {
        return Ok(RecordingSummary {
            frames_captured: 0,
            frames_stored: inner.store.count(),
            elapsed: Duration::ZERO,
            cancelled: false,
        });
    }

    let format = session.capabilities().pixel_format();
    let budget = expected_frames(duration, inner.rate);
    let _guard = RecordingGuard::enter(session)?;
    inner.store.clear();

    log::debug!(
        "Session {:#x}: recording {:?} at {} fps ({} frame(s) expected, {} slots)",
        session.handle(),
        duration,
        inner.rate,
        budget,
        inner.store.capacity()
    );

    let started = Instant::now();
    if let Err(e) = inner.conn.start_recording() {
        return Err(session.transport_error("record_blocking", started.elapsed(), e));
    }

    let deadline = started + duration;
    let hard_deadline = deadline + config.recording_turnaround();
    let mut captured = 0usize;
    let mut cancelled = false;

    let outcome: CamResult<()> = loop {
        if captured >= budget {
            break Ok(());
        }
        if cancel.is_some_and(|c| c.is_cancelled()) {
            cancelled = true;
            break Ok(());
        }

        let remaining = hard_deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break Err(CamError::Timeout {
                operation: "record_blocking",
                elapsed: started.elapsed(),
            });
        }

        match inner.conn.next_frame(remaining) {
            Ok(data) => {
                let actual = data.len();
                match Frame::from_raw(data, inner.resolution, format, captured as u64) {
                    Ok(frame) => {
                        inner.store.append(frame);
                        captured += 1;
                    }
                    Err(expected) => break Err(session.malformed_frame(actual, expected)),
                }
            }
            Err(e) => break Err(session.transport_error("record_blocking", started.elapsed(), e)),
        }
    };

    // The device keeps recording for the full duration even when the
    // expected frames arrived early.
    if outcome.is_ok() {
        while !cancelled {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            thread::sleep(left.min(CANCEL_POLL));
            cancelled = cancel.is_some_and(|c| c.is_cancelled());
        }
    }

    let stopped = inner.conn.stop_recording();
    let stored = inner.store.count();
    let elapsed = started.elapsed();

    match (outcome, stopped) {
        (Ok(()), Ok(())) => {
            log::info!(
                "Session {:#x}: recorded {} frame(s) in {:?}{}",
                session.handle(),
                captured,
                elapsed,
                if cancelled { " (cancelled)" } else { "" }
            );
            Ok(RecordingSummary {
                frames_captured: captured,
                frames_stored: stored,
                elapsed,
                cancelled,
            })
        }
        (Ok(()), Err(e)) => {
            log::warn!(
                "Session {:#x}: failed to stop recording after {} frame(s): {}",
                session.handle(),
                captured,
                e
            );
            Err(session.transport_error("record_blocking", elapsed, e))
        }
        (Err(e), stop_result) => {
            if let Err(stop_err) = stop_result {
                log::debug!("Session {:#x}: stop after failure also failed: {}", session.handle(), stop_err);
            }
            log::warn!(
                "Session {:#x}: recording aborted after {} frame(s), keeping partial results: {}",
                session.handle(),
                stored,
                e
            );
            Err(e)
        }
    }
}

/// Grab a single frame from the sensor without touching frame memory.
pub fn capture_live_image(session: &Session, config: &Config) -> CamResult<Frame> {
    let mut inner = session.lock()?;
    let format = session.capabilities().pixel_format();

    let started = Instant::now();
    let data = inner
        .conn
        .capture_live(config.live_capture_timeout())
        .map_err(|e| session.transport_error("capture_live_image", started.elapsed(), e))?;

    let actual = data.len();
    let frame = Frame::from_raw(data, inner.resolution, format, 0)
        .map_err(|expected| session.malformed_frame(actual, expected))?;

    log::debug!(
        "Session {:#x}: live capture {} in {:?}",
        session.handle(),
        frame.resolution,
        started.elapsed()
    );
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::sim::{SimFault, SimulatedDevice, SimulatedTransport};
    use crate::transport::{DeviceAddress, DeviceTransport};
    use crate::types::Resolution;

    fn open(device: SimulatedDevice) -> Session {
        let address: DeviceAddress = "192.168.0.10".parse().unwrap();
        let transport = SimulatedTransport::new().with_device(address, device);
        let conn = transport.connect(&address).unwrap();
        let session = Session::open(address, conn, &Config::default()).unwrap();
        session.set_resolution(Resolution::new(128, 128)).unwrap();
        session
    }

    #[test]
    fn test_expected_frames() {
        assert_eq!(expected_frames(Duration::from_millis(250), 50), 12);
        assert_eq!(expected_frames(Duration::from_millis(1000), 2000), 2000);
        assert_eq!(expected_frames(Duration::from_millis(19), 50), 0);
        assert_eq!(expected_frames(Duration::ZERO, 10000), 0);
        // Saturates instead of wrapping
        assert_eq!(expected_frames(Duration::MAX, u32::MAX), usize::MAX);
    }

    #[test]
    fn test_zero_duration_returns_immediately() {
        let session = open(SimulatedDevice::default());
        let start = Instant::now();
        let summary = record_blocking(&session, Duration::ZERO, None, &Config::default()).unwrap();
        assert_eq!(summary.frames_captured, 0);
        assert_eq!(session.frame_count().unwrap(), 0);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_record_fills_store() {
        let session = open(SimulatedDevice::default());
        session.set_capture_rate(1000).unwrap();
        let summary =
            record_blocking(&session, Duration::from_millis(40), None, &Config::default()).unwrap();

        assert_eq!(summary.frames_captured, 40);
        assert_eq!(session.frame_count().unwrap(), 40);
        assert!(summary.elapsed >= Duration::from_millis(40));
        assert_eq!(session.state().unwrap(), SessionState::Configured);

        let first = session.frame_at(0).unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(first.data.len(), 128 * 128);
    }

    #[test]
    fn test_record_saturates_at_capacity() {
        let mut config = Config::default();
        config.store.max_frames = Some(8);
        let address: DeviceAddress = "192.168.0.10".parse().unwrap();
        let transport = SimulatedTransport::new().with_device(address, SimulatedDevice::default());
        let session =
            Session::open(address, transport.connect(&address).unwrap(), &config).unwrap();
        session.set_resolution(Resolution::new(128, 128)).unwrap();
        session.set_capture_rate(1000).unwrap();

        let summary = record_blocking(&session, Duration::from_millis(30), None, &config).unwrap();
        assert_eq!(summary.frames_captured, 30);
        assert_eq!(summary.frames_stored, 8);
        // Oldest frames were evicted
        assert_eq!(session.frame_at(0).unwrap().sequence, 22);
    }

    #[test]
    fn test_each_pass_starts_empty() {
        let session = open(SimulatedDevice::default());
        session.set_capture_rate(1000).unwrap();
        record_blocking(&session, Duration::from_millis(20), None, &Config::default()).unwrap();
        record_blocking(&session, Duration::from_millis(10), None, &Config::default()).unwrap();
        assert_eq!(session.frame_count().unwrap(), 10);
    }

    #[test]
    fn test_disconnect_keeps_partial_frames() {
        let session = open(SimulatedDevice::default().with_fault(SimFault::DisconnectAfter(3)));
        session.set_capture_rate(1000).unwrap();
        let err = record_blocking(&session, Duration::from_millis(50), None, &Config::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceUnreachable);
        assert_eq!(session.frame_count().unwrap(), 3);
        assert!(!session.is_recording());
        assert_eq!(session.state().unwrap(), SessionState::Configured);
    }

    #[test]
    fn test_stall_times_out() {
        let mut config = Config::default();
        config.recording.turnaround_ms = 20;
        let session = open(SimulatedDevice::default().with_fault(SimFault::StallAfter(2)));
        session.set_capture_rate(1000).unwrap();

        let start = Instant::now();
        let err = record_blocking(&session, Duration::from_millis(30), None, &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(session.frame_count().unwrap(), 2);
        // Bounded by duration plus turnaround, with slack for the scheduler
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_cancel_stops_early() {
        let session = open(SimulatedDevice::default());
        session.set_capture_rate(50).unwrap();
        let token = CancelToken::new();
        token.cancel();

        let summary =
            record_blocking(&session, Duration::from_secs(5), Some(&token), &Config::default())
                .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.frames_captured, 0);
        assert!(summary.elapsed < Duration::from_secs(1));
    }

    #[test]
    fn test_live_capture_bypasses_store() {
        let session = open(SimulatedDevice::default());
        let frame = capture_live_image(&session, &Config::default()).unwrap();
        assert_eq!(frame.data.len(), 128 * 128);
        assert_eq!(frame.resolution, Resolution::new(128, 128));
        assert_eq!(session.frame_count().unwrap(), 0);
    }

    #[test]
    fn test_live_capture_timeout() {
        let mut config = Config::default();
        config.recording.live_capture_timeout_ms = 10;
        let session = open(SimulatedDevice::default().with_fault(SimFault::Unresponsive));
        let err = capture_live_image(&session, &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }
}
