//! Bounded ring of recorded frames.
//!
//! Mirrors the camera's on-board frame memory: a fixed number of slots, the
//! oldest frame evicted first once full. Index 0 is always the oldest frame
//! still retained.

use std::collections::VecDeque;

use crate::types::{Frame, PixelFormat, Resolution};

#[derive(Debug)]
pub struct FrameStore {
    frames: VecDeque<Frame>,
    capacity: usize,
    resolution: Resolution,
    format: PixelFormat,
    /// Frames evicted since the last reset
    evicted: u64,
}

impl FrameStore {
    /// Create an empty store for frames of `resolution`. Capacity is
    /// clamped to at least one slot.
    pub fn new(capacity: usize, resolution: Resolution, format: PixelFormat) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            resolution,
            format,
            evicted: 0,
        }
    }

    /// Number of valid frames.
    pub fn count(&self) -> usize {
        self.frames.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Byte size every stored frame has.
    pub fn frame_len(&self) -> usize {
        self.format.frame_len(self.resolution)
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Copy of the frame at `index`, or `None` if `index >= count`.
    pub fn frame_at(&self, index: usize) -> Option<Frame> {
        self.frames.get(index).cloned()
    }

    /// Insert a frame at the next slot, evicting the oldest when full.
    pub(crate) fn append(&mut self, frame: Frame) {
        debug_assert_eq!(frame.data.len(), self.frame_len());
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
            self.evicted += 1;
        }
        self.frames.push_back(frame);
    }

    /// Drop every stored frame, keeping the current geometry.
    pub(crate) fn clear(&mut self) {
        self.frames.clear();
        self.evicted = 0;
    }

    /// Drop every stored frame and adopt a new geometry.
    pub(crate) fn reset(&mut self, capacity: usize, resolution: Resolution, format: PixelFormat) {
        *self = Self::new(capacity, resolution, format);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u64) -> Frame {
        Frame::from_raw(vec![seq as u8; 4], Resolution::new(2, 2), PixelFormat::Mono8, seq).unwrap()
    }

    fn store(capacity: usize) -> FrameStore {
        FrameStore::new(capacity, Resolution::new(2, 2), PixelFormat::Mono8)
    }

    #[test]
    fn test_empty_store() {
        let store = store(4);
        assert_eq!(store.count(), 0);
        assert!(store.is_empty());
        assert!(store.frame_at(0).is_none());
        assert_eq!(store.frame_len(), 4);
    }

    #[test]
    fn test_append_and_read() {
        let mut store = store(4);
        store.append(frame(0));
        store.append(frame(1));
        assert_eq!(store.count(), 2);
        assert_eq!(store.frame_at(0).unwrap().sequence, 0);
        assert_eq!(store.frame_at(1).unwrap().sequence, 1);
        assert!(store.frame_at(2).is_none());
    }

    #[test]
    fn test_read_does_not_consume() {
        let mut store = store(2);
        store.append(frame(7));
        let first = store.frame_at(0).unwrap();
        let second = store.frame_at(0).unwrap();
        assert_eq!(first.data, second.data);
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let mut store = store(3);
        for seq in 0..5 {
            store.append(frame(seq));
        }
        assert_eq!(store.count(), 3);
        assert_eq!(store.evicted(), 2);
        assert_eq!(store.frame_at(0).unwrap().sequence, 2);
        assert_eq!(store.frame_at(2).unwrap().sequence, 4);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut store = store(0);
        assert_eq!(store.capacity(), 1);
        store.append(frame(0));
        store.append(frame(1));
        assert_eq!(store.count(), 1);
        assert_eq!(store.frame_at(0).unwrap().sequence, 1);
    }

    #[test]
    fn test_reset_invalidates() {
        let mut store = store(3);
        store.append(frame(0));
        store.reset(10, Resolution::new(4, 4), PixelFormat::Mono16);
        assert_eq!(store.count(), 0);
        assert_eq!(store.capacity(), 10);
        assert_eq!(store.frame_len(), 32);
    }

    #[test]
    fn test_clear_keeps_geometry() {
        let mut store = store(3);
        store.append(frame(0));
        store.clear();
        assert_eq!(store.count(), 0);
        assert_eq!(store.capacity(), 3);
        assert_eq!(store.frame_len(), 4);
    }
}
