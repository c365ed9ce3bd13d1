//! Camera frame source.
//!
//! `CameraSource` stands in for the camera capability: it owns the installed
//! `FrameProcessor`, delivers captured frames to it, and can be started,
//! stopped and released. Real hardware lives outside this crate; the built-in
//! backend synthesizes frames for `stub://` devices, periodically embedding
//! the stub barcode marker so the downstream pipeline has something to find.
//!
//! Failure model: `start()` may raise a resource-acquisition error (device
//! unavailable). The caller treats that as non-fatal but disabling: the
//! camera reference is dropped and no retry loop exists here.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::detect::{MARKER, MARKER_LEN};
use crate::frame::{Frame, FrameBuffer, FrameFormat, FrameMetadata};
use crate::processor::FrameProcessor;

/// Frames per marker cycle in the synthetic scene.
const MARKER_PERIOD: u64 = 50;
/// Leading frames of each cycle that carry the marker.
const MARKER_BURST: u64 = 10;

/// Which way the camera points. Front-facing previews are mirrored by the
/// overlay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    #[default]
    Back,
    Front,
}

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device URI (e.g., "stub://front_camera").
    pub device: String,
    pub facing: CameraFacing,
    /// Capture width in pixels.
    pub width: u32,
    /// Capture height in pixels.
    pub height: u32,
    /// Target frame rate; the synthetic backend paces itself to this.
    pub target_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "stub://back_camera".to_string(),
            facing: CameraFacing::Back,
            width: 640,
            height: 480,
            target_fps: 30,
        }
    }
}

/// A conforming device reference MUST be scheme-qualified.
///
/// Allowed: "stub://back_camera", "v4l2://dev/video0"
/// Disallowed: bare paths, whitespace, empty authority.
pub fn validate_device_uri(device: &str) -> Result<()> {
    static DEVICE_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = DEVICE_RE
        .get_or_init(|| regex::Regex::new(r"^[a-z][a-z0-9+.-]*://[^\s/][^\s]*$").unwrap());
    if !re.is_match(device) {
        return Err(anyhow!(
            "camera device must be a scheme-qualified URI, got '{}'",
            device
        ));
    }
    Ok(())
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_produced: u64,
    pub device: String,
}

struct CaptureHandle {
    shutdown: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

/// Camera capability: produces frames into the installed processor.
pub struct CameraSource {
    config: CameraConfig,
    /// Shared with the capture thread; swapping the processor re-points it.
    sink: Arc<Mutex<Option<Arc<FrameBuffer>>>>,
    processor: Option<FrameProcessor>,
    capture: Option<CaptureHandle>,
    frames_produced: Arc<AtomicU64>,
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        validate_device_uri(&config.device)?;
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        Ok(Self {
            config,
            sink: Arc::new(Mutex::new(None)),
            processor: None,
            capture: None,
            frames_produced: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Install a fresh frame processor, stopping and replacing any previous
    /// one. Subsequent captured frames are delivered to the new processor.
    pub fn set_frame_processor(&mut self, processor: FrameProcessor) {
        if let Some(mut old) = self.processor.take() {
            old.stop();
        }
        *lock(&self.sink) = Some(processor.buffer());
        self.processor = Some(processor);
    }

    /// Start capturing. Fails with a resource-acquisition error when the
    /// device cannot be opened; only `stub://` devices are available in this
    /// build. Starting an already-started source is a no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.capture.is_some() {
            return Ok(());
        }
        if !self.config.device.starts_with("stub://") {
            return Err(anyhow!(
                "failed to acquire camera device '{}'",
                self.config.device
            ));
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let join = {
            let shutdown = shutdown.clone();
            let sink = self.sink.clone();
            let frames_produced = self.frames_produced.clone();
            let config = self.config.clone();
            std::thread::spawn(move || {
                run_capture(config, sink, frames_produced, shutdown);
            })
        };
        self.capture = Some(CaptureHandle { shutdown, join });
        log::info!("camera: started {} (synthetic)", self.config.device);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.capture.is_some()
    }

    /// Stop the capture thread and the installed processor. The processor
    /// stays installed (stopped); `set_frame_processor` replaces it on the
    /// next session resume.
    pub fn stop_preview(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.shutdown.store(true, Ordering::SeqCst);
            if capture.join.join().is_err() {
                log::error!("camera capture thread panicked");
            }
            log::info!("camera: stopped {}", self.config.device);
        }
        if let Some(processor) = self.processor.as_mut() {
            processor.stop();
        }
    }

    /// Release the camera unconditionally. Idempotent; subsequent releases
    /// are no-ops.
    pub fn release(&mut self) {
        self.stop_preview();
        *lock(&self.sink) = None;
        self.processor = None;
    }

    pub fn stats(&self) -> CameraStats {
        CameraStats {
            frames_produced: self.frames_produced.load(Ordering::SeqCst),
            device: self.config.device.clone(),
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ----------------------------------------------------------------------------
// Synthetic capture backend
// ----------------------------------------------------------------------------

fn run_capture(
    config: CameraConfig,
    sink: Arc<Mutex<Option<Arc<FrameBuffer>>>>,
    frames_produced: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
) {
    let interval = frame_interval(config.target_fps);
    let mut seq = 0u64;
    while !shutdown.load(Ordering::SeqCst) {
        seq += 1;
        let frame = synthesize_frame(&config, seq);
        frames_produced.fetch_add(1, Ordering::SeqCst);
        if let Some(buffer) = lock(&sink).as_ref() {
            buffer.set(frame);
        }
        std::thread::sleep(interval);
    }
}

fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(100)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}

/// Generate one synthetic frame.
///
/// The scene is a moving gradient with per-frame noise. For the leading
/// frames of every marker cycle, the stub barcode marker is written at the
/// frame center with a payload derived from the cycle index, so each burst
/// decodes to one stable value and different bursts decode differently.
fn synthesize_frame(config: &CameraConfig, seq: u64) -> Frame {
    let pixel_count = (config.width * config.height * 3) as usize;
    let mut data = vec![0u8; pixel_count];
    let mut rng = rand::thread_rng();
    for (i, byte) in data.iter_mut().enumerate() {
        let noise: u8 = rng.gen_range(0..8);
        *byte = ((i as u64 + seq) % 248) as u8 + noise;
    }

    if seq % MARKER_PERIOD < MARKER_BURST {
        let center = ((config.height / 2) * config.width + config.width / 2) as usize * 3;
        let at = center.min(pixel_count.saturating_sub(MARKER_LEN));
        if pixel_count >= MARKER_LEN {
            data[at..at + MARKER.len()].copy_from_slice(&MARKER);
            let cycle = seq / MARKER_PERIOD;
            data[at + MARKER.len()..at + MARKER_LEN].copy_from_slice(&cycle.to_le_bytes());
        }
    }

    Frame::new(
        data,
        FrameMetadata {
            width: config.width,
            height: config.height,
            rotation_degrees: 0,
            timestamp_ms: now_ms(),
            format: FrameFormat::Rgb8,
            seq,
        },
    )
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubBarcodeDetector;
    use crate::processor::DetectionEvent;
    use std::sync::mpsc;
    use std::time::Instant;

    fn stub_config() -> CameraConfig {
        CameraConfig {
            device: "stub://test".to_string(),
            facing: CameraFacing::Back,
            width: 64,
            height: 64,
            target_fps: 200,
        }
    }

    #[test]
    fn rejects_malformed_device_uris() {
        for device in ["", "/dev/video0", "stub://", "has space://x"] {
            let config = CameraConfig {
                device: device.to_string(),
                ..stub_config()
            };
            assert!(CameraSource::new(config).is_err(), "accepted '{}'", device);
        }
    }

    #[test]
    fn start_fails_for_unavailable_device() -> Result<()> {
        let config = CameraConfig {
            device: "v4l2://dev/video0".to_string(),
            ..stub_config()
        };
        let mut camera = CameraSource::new(config)?;
        assert!(camera.start().is_err());
        assert!(!camera.is_running());
        Ok(())
    }

    #[test]
    fn synthetic_capture_feeds_installed_processor() -> Result<()> {
        let mut camera = CameraSource::new(stub_config())?;
        let (tx, rx) = mpsc::channel();
        camera.set_frame_processor(FrameProcessor::spawn(StubBarcodeDetector::new(), tx));
        camera.start()?;

        // The first frames of each cycle carry the marker, so the stub
        // detector decodes within a cycle.
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut decoded = false;
        while Instant::now() < deadline {
            match rx.recv_timeout(Duration::from_secs(1)) {
                Ok(DetectionEvent::Success { result, .. }) if !result.is_empty() => {
                    decoded = true;
                    break;
                }
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        camera.release();

        assert!(decoded, "synthetic marker burst never decoded");
        assert!(camera.stats().frames_produced > 0);
        Ok(())
    }

    #[test]
    fn release_is_idempotent() -> Result<()> {
        let mut camera = CameraSource::new(stub_config())?;
        let (tx, _rx) = mpsc::channel();
        camera.set_frame_processor(FrameProcessor::spawn(StubBarcodeDetector::new(), tx));
        camera.start()?;

        camera.release();
        camera.release();
        assert!(!camera.is_running());
        Ok(())
    }

    #[test]
    fn start_twice_is_a_noop() -> Result<()> {
        let mut camera = CameraSource::new(stub_config())?;
        camera.start()?;
        camera.start()?;
        camera.release();
        Ok(())
    }
}
