//! Frame processor: bridges the frame buffer to a detection capability.
//!
//! One dedicated worker thread drains the `FrameBuffer`; a second thread owns
//! the `Detector` and runs the actual detection calls. The worker never
//! blocks on detection: at most one detection is outstanding (`in_flight`),
//! and frames arriving while one is outstanding are simply dropped. The
//! buffer's overwrite semantics already guarantee only the latest survives.
//!
//! Completed detections are marshaled over an `mpsc` mailbox and consumed on
//! the designated callback context (the session's pump thread), which is the
//! only place workflow and overlay state are mutated.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;

use crate::detect::Detector;
use crate::frame::{Frame, FrameBuffer};

/// Outcome of one submitted frame, delivered exactly once to the mailbox.
pub enum DetectionEvent<T> {
    Success { frame: Frame, result: T },
    Failure { error: anyhow::Error },
}

/// Owns the processing worker and the detection capability for one camera
/// session. Dropping the processor stops it.
pub struct FrameProcessor {
    buffer: Arc<FrameBuffer>,
    stopped: Arc<AtomicBool>,
    in_flight: Arc<AtomicBool>,
    submitted: Arc<AtomicU64>,
    /// Serializes event dispatch against `stop`: a dispatch holds this while
    /// it checks `stopped` and sends, and `stop` takes it once after setting
    /// the flag, so no send can begin after `stop` returns.
    dispatch: Arc<Mutex<()>>,
    worker: Option<JoinHandle<()>>,
}

impl FrameProcessor {
    /// Start a processor around `detector`. Completed detections are sent to
    /// `events`; the receiver side is the designated callback context.
    pub fn spawn<D: Detector>(
        detector: D,
        events: mpsc::Sender<DetectionEvent<D::Output>>,
    ) -> Self {
        let buffer = Arc::new(FrameBuffer::new());
        let stopped = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(AtomicBool::new(false));
        let submitted = Arc::new(AtomicU64::new(0));
        let dispatch = Arc::new(Mutex::new(()));

        let (detect_tx, detect_rx) = mpsc::channel::<Frame>();

        {
            let stopped = stopped.clone();
            let in_flight = in_flight.clone();
            let dispatch = dispatch.clone();
            std::thread::spawn(move || {
                run_detect(detector, detect_rx, events, stopped, in_flight, dispatch);
            });
        }

        let worker = {
            let buffer = buffer.clone();
            let stopped = stopped.clone();
            let in_flight = in_flight.clone();
            let submitted = submitted.clone();
            std::thread::spawn(move || {
                run_worker(buffer, detect_tx, stopped, in_flight, submitted);
            })
        };

        Self {
            buffer,
            stopped,
            in_flight,
            submitted,
            dispatch,
            worker: Some(worker),
        }
    }

    /// The buffer the camera source feeds. Cloning the handle is how the
    /// capture callback gets installed.
    pub fn buffer(&self) -> Arc<FrameBuffer> {
        self.buffer.clone()
    }

    /// Offer a frame for processing. Never blocks; overwrites any pending
    /// unprocessed frame.
    pub fn process(&self, frame: Frame) {
        self.buffer.set(frame);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Frames actually handed to the detector (skipped frames excluded).
    pub fn frames_submitted(&self) -> u64 {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Halt the worker and release the detection capability. Idempotent, and
    /// safe to call while a detection is in flight: the processor is marked
    /// stopped first, and taking the dispatch lock waits out any send that
    /// already passed its flag check, so no success/failure event is enqueued
    /// after this returns. The detect thread finishes any outstanding call on
    /// its own and closes the detector; joining it here could block behind a
    /// hung detection, which `stop` must not.
    pub fn stop(&mut self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        drop(
            self.dispatch
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        self.buffer.close();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("frame processor worker panicked");
            }
        }
    }
}

impl Drop for FrameProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(
    buffer: Arc<FrameBuffer>,
    detect_tx: mpsc::Sender<Frame>,
    stopped: Arc<AtomicBool>,
    in_flight: Arc<AtomicBool>,
    submitted: Arc<AtomicU64>,
) {
    // Exiting this loop drops `detect_tx`, which lets the detect thread
    // finish its current job, close the detector and exit.
    while let Some(frame) = buffer.take_latest() {
        if stopped.load(Ordering::SeqCst) {
            break;
        }
        if in_flight.load(Ordering::SeqCst) {
            // A detection is outstanding: neither cancel it nor queue behind
            // it. Drop the interim frame.
            log::trace!("frame seq={} skipped, detection in flight", frame.seq());
            continue;
        }
        in_flight.store(true, Ordering::SeqCst);
        submitted.fetch_add(1, Ordering::SeqCst);
        if detect_tx.send(frame).is_err() {
            break;
        }
    }
}

fn run_detect<D: Detector>(
    mut detector: D,
    frames: mpsc::Receiver<Frame>,
    events: mpsc::Sender<DetectionEvent<D::Output>>,
    stopped: Arc<AtomicBool>,
    in_flight: Arc<AtomicBool>,
    dispatch: Arc<Mutex<()>>,
) {
    let name = detector.name();
    for frame in frames {
        let seq = frame.seq();
        let outcome = detector.detect(&frame);

        // Stop suppression: once the processor is stopped, results of an
        // in-flight detection must not reach the callback context. The
        // dispatch guard is never held across `detect`, only across the
        // check-and-send, so `stop` cannot block behind a hung detection.
        let _dispatch = dispatch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if stopped.load(Ordering::SeqCst) {
            log::trace!("{}: result for seq={} suppressed after stop", name, seq);
            in_flight.store(false, Ordering::SeqCst);
            continue;
        }

        let event = match outcome {
            Ok(result) => DetectionEvent::Success { frame, result },
            Err(error) => {
                log::warn!("{}: detection failed for seq={}: {:#}", name, seq, error);
                DetectionEvent::Failure { error }
            }
        };
        if events.send(event).is_err() {
            log::debug!("{}: event mailbox disconnected", name);
        }
        in_flight.store(false, Ordering::SeqCst);
    }

    if let Err(error) = detector.close() {
        log::error!("{}: failed to release detector: {:#}", name, error);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
