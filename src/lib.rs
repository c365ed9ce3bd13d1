//! scanstream: a live camera scanning pipeline.
//!
//! Frames flow from a `CameraSource` into a single-slot `FrameBuffer` that
//! always holds only the newest frame, through a `FrameProcessor` that keeps
//! at most one detection in flight, and out as `DetectionEvent`s drained by a
//! `ScanSession` on its designated callback context. The session routes
//! results into the shared `WorkflowModel` state machine and paints bounding
//! boxes on the `GraphicOverlay`, which an independent render context draws
//! on its own schedule.
//!
//! The pipeline prefers freshness over completeness: under load, frames are
//! dropped rather than queued, so detection always works on a recent view of
//! the scene.

pub mod camera;
pub mod config;
pub mod detect;
pub mod frame;
pub mod overlay;
pub mod processor;
pub mod session;
pub mod workflow;

pub use camera::{CameraConfig, CameraFacing, CameraSource};
pub use config::ScanstreamConfig;
pub use detect::{Barcode, BarcodeFormat, Detector, StubBarcodeDetector};
pub use frame::{Frame, FrameBuffer, FrameFormat, FrameMetadata};
pub use overlay::{BarcodeBoxGraphic, DrawCanvas, Graphic, GraphicOverlay};
pub use processor::{DetectionEvent, FrameProcessor};
pub use session::ScanSession;
pub use workflow::{ObservableValue, WorkflowModel, WorkflowState};
