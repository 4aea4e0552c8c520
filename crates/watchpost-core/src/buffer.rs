//! Double-buffered latest-frame cache between ingestion and readers

use crate::frame::Frame;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Slots {
    front: Option<Frame>,
    back: Option<Frame>,
}

/// Ingestion writes the back slot and promotes it with [`FrameBuffer::swap`];
/// readers only ever see the front slot.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    slots: Mutex<Slots>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        // A panicking writer cannot leave the slots half-updated.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn write(&self, frame: Frame) {
        self.slots().back = Some(frame);
    }

    /// Promote the back slot to the front. Called by ingestion only.
    pub fn swap(&self) {
        let mut slots = self.slots();
        slots.front = slots.back.clone();
    }

    /// Copy of the front frame, if one has been promoted
    pub fn read(&self) -> Option<Frame> {
        self.slots().front.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::Arc;

    fn frame(sequence: u64) -> Frame {
        Frame::new(RgbImage::new(4, 4), sequence)
    }

    #[test]
    fn test_empty_until_swap() {
        let buffer = FrameBuffer::new();
        assert!(buffer.read().is_none());

        buffer.write(frame(1));
        assert!(buffer.read().is_none());

        buffer.swap();
        assert_eq!(buffer.read().map(|f| f.sequence()), Some(1));
    }

    #[test]
    fn test_write_does_not_disturb_front() {
        let buffer = FrameBuffer::new();
        buffer.write(frame(1));
        buffer.swap();
        buffer.write(frame(2));

        assert_eq!(buffer.read().map(|f| f.sequence()), Some(1));
        buffer.swap();
        assert_eq!(buffer.read().map(|f| f.sequence()), Some(2));
        // Repeated swaps without a write keep the latest frame.
        buffer.swap();
        assert_eq!(buffer.read().map(|f| f.sequence()), Some(2));
    }

    #[test]
    fn test_readers_see_monotonic_recency() {
        let buffer = Arc::new(FrameBuffer::new());
        let writer = {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                for seq in 1..=500 {
                    buffer.write(frame(seq));
                    buffer.swap();
                }
            })
        };

        let mut last = 0;
        while !writer.is_finished() {
            if let Some(f) = buffer.read() {
                assert!(f.sequence() >= last);
                last = f.sequence();
            }
        }
        writer.join().unwrap();
        assert_eq!(buffer.read().map(|f| f.sequence()), Some(500));
    }
}
