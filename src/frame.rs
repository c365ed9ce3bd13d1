//! Frame types and the single-slot frame hand-off.
//!
//! - `Frame`: Immutable pixel buffer plus capture metadata.
//! - `FrameBuffer`: Holds at most one pending frame. The producer overwrites,
//!   the consumer drains.
//!
//! There is no queue. Only the single most recent frame is ever visible,
//! which models intentional frame-dropping backpressure: a slow consumer
//! never slows the camera down, it just sees fewer frames.

use std::sync::{Condvar, Mutex};

// ----------------------------------------------------------------------------
// Frame: immutable image buffer + capture metadata
// ----------------------------------------------------------------------------

/// Pixel layout tag for a captured frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameFormat {
    /// Packed 8-bit RGB, 3 bytes per pixel.
    #[default]
    Rgb8,
    /// Android-style YUV 4:2:0 with interleaved VU plane.
    Nv21,
    /// Single 8-bit luminance plane.
    Gray8,
}

/// Capture metadata attached to every frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameMetadata {
    pub width: u32,
    pub height: u32,
    /// Clockwise rotation needed to bring the image upright, in degrees.
    pub rotation_degrees: u32,
    /// Capture timestamp in milliseconds since the epoch.
    pub timestamp_ms: u64,
    pub format: FrameFormat,
    /// Monotonic capture sequence number assigned by the source.
    pub seq: u64,
}

/// One captured camera image. The pixel data is immutable: frames are
/// replaced, never mutated, until a consumer claims them.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    metadata: FrameMetadata,
}

impl Frame {
    pub fn new(data: Vec<u8>, metadata: FrameMetadata) -> Self {
        Self { data, metadata }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn metadata(&self) -> &FrameMetadata {
        &self.metadata
    }

    pub fn width(&self) -> u32 {
        self.metadata.width
    }

    pub fn height(&self) -> u32 {
        self.metadata.height
    }

    pub fn seq(&self) -> u64 {
        self.metadata.seq
    }
}

// ----------------------------------------------------------------------------
// FrameBuffer: single-slot producer/consumer hand-off
// ----------------------------------------------------------------------------

struct Slot {
    frame: Option<Frame>,
    closed: bool,
    dropped: u64,
}

/// Single-slot frame hand-off between the camera callback and the processing
/// worker.
///
/// Invariant: at any instant the slot holds either nothing or exactly one
/// frame, always the most recently produced one not yet claimed for
/// processing.
pub struct FrameBuffer {
    slot: Mutex<Slot>,
    available: Condvar,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                frame: None,
                closed: false,
                dropped: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Store a frame, discarding any previously unclaimed frame. Never blocks
    /// the producer. Frames offered to a closed buffer are dropped.
    pub fn set(&self, frame: Frame) {
        let mut slot = self.lock_slot();
        if slot.closed {
            return;
        }
        if let Some(stale) = slot.frame.replace(frame) {
            slot.dropped += 1;
            log::trace!("frame buffer: dropped unclaimed frame seq={}", stale.seq());
        }
        self.available.notify_one();
    }

    /// Remove and return the current frame, blocking until one is available
    /// or the buffer is closed. Returns `None` only after `close()`.
    pub fn take_latest(&self) -> Option<Frame> {
        let mut slot = self.lock_slot();
        loop {
            if let Some(frame) = slot.frame.take() {
                return Some(frame);
            }
            if slot.closed {
                return None;
            }
            slot = self
                .available
                .wait(slot)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Non-blocking variant of `take_latest`.
    pub fn try_take(&self) -> Option<Frame> {
        self.lock_slot().frame.take()
    }

    /// Close the buffer and wake every waiting consumer promptly. Idempotent.
    /// Any unclaimed frame is discarded.
    pub fn close(&self) {
        let mut slot = self.lock_slot();
        slot.closed = true;
        slot.frame = None;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock_slot().closed
    }

    /// Number of frames overwritten before any consumer claimed them.
    pub fn dropped_frames(&self) -> u64 {
        self.lock_slot().dropped
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Slot> {
        // A poisoned slot lock only means a consumer panicked mid-take; the
        // slot itself is still a valid Option.
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_frame(seq: u64) -> Frame {
        Frame::new(
            vec![seq as u8; 16],
            FrameMetadata {
                width: 4,
                height: 4,
                rotation_degrees: 0,
                timestamp_ms: 1_000 + seq,
                format: FrameFormat::Rgb8,
                seq,
            },
        )
    }

    #[test]
    fn take_latest_returns_only_the_newest_frame() {
        let buffer = FrameBuffer::new();
        for seq in 1..=5 {
            buffer.set(test_frame(seq));
        }

        let frame = buffer.take_latest().expect("frame available");
        assert_eq!(frame.seq(), 5);
        assert_eq!(buffer.dropped_frames(), 4);
        assert!(buffer.try_take().is_none());
    }

    #[test]
    fn take_latest_blocks_until_set() {
        let buffer = Arc::new(FrameBuffer::new());
        let producer = {
            let buffer = buffer.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                buffer.set(test_frame(7));
            })
        };

        let frame = buffer.take_latest().expect("woken by set");
        assert_eq!(frame.seq(), 7);
        producer.join().expect("producer thread");
    }

    #[test]
    fn close_wakes_blocked_consumer() {
        let buffer = Arc::new(FrameBuffer::new());
        let consumer = {
            let buffer = buffer.clone();
            std::thread::spawn(move || buffer.take_latest())
        };

        std::thread::sleep(Duration::from_millis(20));
        buffer.close();
        assert!(consumer.join().expect("consumer thread").is_none());
    }

    #[test]
    fn set_after_close_is_dropped() {
        let buffer = FrameBuffer::new();
        assert!(!buffer.is_closed());
        buffer.close();
        assert!(buffer.is_closed());
        buffer.set(test_frame(1));
        assert!(buffer.try_take().is_none());
        assert!(buffer.take_latest().is_none());
    }
}
