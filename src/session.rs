//! Scan session orchestration.
//!
//! `ScanSession` ties the pieces together for one live scanning lifetime:
//! it owns the camera source, the shared workflow model and the overlay, and
//! it is the designated callback context. Detection events produced by the
//! `FrameProcessor` land in an mpsc mailbox; only `pump`, called from the
//! session owner's thread, drains that mailbox and mutates workflow and
//! overlay state. Nothing else in the pipeline touches them.
//!
//! Lifecycle mirrors a foreground surface: `resume` rebuilds the processor
//! and starts the preview, `pause` freezes and stops it, `close` releases the
//! camera for good. A session can be resumed again after `pause`.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::camera::{CameraConfig, CameraSource};
use crate::detect::{Barcode, StubBarcodeDetector};
use crate::overlay::{BarcodeBoxGraphic, GraphicOverlay};
use crate::processor::{DetectionEvent, FrameProcessor};
use crate::workflow::{WorkflowModel, WorkflowState};

type BarcodeEvent = DetectionEvent<Vec<Barcode>>;

/// One live scanning session.
pub struct ScanSession {
    camera_config: CameraConfig,
    camera: Option<CameraSource>,
    workflow: Arc<WorkflowModel<Barcode>>,
    overlay: GraphicOverlay,
    events: Option<mpsc::Receiver<BarcodeEvent>>,
}

impl ScanSession {
    pub fn new(camera_config: CameraConfig) -> Self {
        let overlay = GraphicOverlay::new();
        overlay.set_preview_size(camera_config.width, camera_config.height);
        overlay.set_facing(camera_config.facing);
        Self {
            camera_config,
            camera: None,
            workflow: Arc::new(WorkflowModel::new()),
            overlay,
            events: None,
        }
    }

    /// Shared workflow model; subscribe here for state and result changes.
    pub fn workflow(&self) -> &Arc<WorkflowModel<Barcode>> {
        &self.workflow
    }

    pub fn overlay(&self) -> &GraphicOverlay {
        &self.overlay
    }

    /// Bring the session to the foreground: reset to `NotStarted`, attach a
    /// fresh processor and detector to the camera, and start detecting. A
    /// stopped processor is never reused.
    pub fn resume(&mut self) -> Result<()> {
        self.workflow.mark_camera_frozen();
        self.workflow.set_workflow_state(WorkflowState::NotStarted);
        self.overlay.clear();

        if self.camera.is_none() {
            self.camera = Some(CameraSource::new(self.camera_config.clone())?);
        }

        let (tx, rx) = mpsc::channel();
        let processor = FrameProcessor::spawn(StubBarcodeDetector::new(), tx);
        if let Some(camera) = self.camera.as_mut() {
            camera.set_frame_processor(processor);
        }
        self.events = Some(rx);

        self.set_state_and_react(WorkflowState::Detecting);
        Ok(())
    }

    /// Send the session to the background: freeze results, stop the preview
    /// and the processor, and park the workflow at `NotStarted`.
    pub fn pause(&mut self) {
        self.stop_camera_preview();
        self.workflow.set_workflow_state(WorkflowState::NotStarted);
    }

    /// Release the camera and drop the mailbox. Terminal; called on drop.
    pub fn close(&mut self) {
        self.stop_camera_preview();
        if let Some(mut camera) = self.camera.take() {
            camera.release();
        }
        self.events = None;
    }

    /// Wait up to `timeout` for one detection event and apply it. Returns
    /// true when an event was applied. This is the only place detection
    /// results reach the workflow model and the overlay.
    pub fn pump(&mut self, timeout: Duration) -> bool {
        let event = match self.events.as_ref() {
            Some(rx) => rx.recv_timeout(timeout).ok(),
            None => None,
        };
        match event {
            Some(event) => {
                self.apply_event(event);
                true
            }
            None => false,
        }
    }

    /// Apply every event already waiting in the mailbox without blocking.
    pub fn pump_pending(&mut self) -> usize {
        let mut applied = 0;
        loop {
            let event = match self.events.as_ref() {
                Some(rx) => rx.try_recv().ok(),
                None => None,
            };
            match event {
                Some(event) => {
                    self.apply_event(event);
                    applied += 1;
                }
                None => return applied,
            }
        }
    }

    /// Transition the workflow state and perform the side effects the new
    /// state demands. Detection-type states need a live preview; terminal
    /// result states stop it.
    pub fn set_state_and_react(&mut self, state: WorkflowState) {
        self.workflow.set_workflow_state(state);
        match state {
            WorkflowState::Detecting | WorkflowState::Confirming | WorkflowState::Searching => {
                self.start_camera_preview()
            }
            WorkflowState::Detected | WorkflowState::Confirmed | WorkflowState::Searched => {
                self.stop_camera_preview()
            }
            WorkflowState::NotStarted => {}
        }
    }

    /// Start the preview if the camera is present and not already live.
    /// A start failure is non-fatal but disabling: it is logged, the live
    /// flag is rolled back and the camera reference is dropped.
    fn start_camera_preview(&mut self) {
        if self.workflow.is_camera_live() {
            return;
        }
        let Some(camera) = self.camera.as_mut() else {
            return;
        };
        self.workflow.mark_camera_live();
        if let Err(error) = camera.start() {
            log::error!("failed to start camera preview: {:#}", error);
            self.workflow.mark_camera_frozen();
            if let Some(mut camera) = self.camera.take() {
                camera.release();
            }
        }
    }

    fn stop_camera_preview(&mut self) {
        if !self.workflow.is_camera_live() {
            return;
        }
        self.workflow.mark_camera_frozen();
        if let Some(camera) = self.camera.as_mut() {
            camera.stop_preview();
        }
    }

    /// Route one detection event. Failures are always logged; successful
    /// results arriving after the camera was frozen are discarded wholesale,
    /// they describe a preview the user no longer sees.
    fn apply_event(&mut self, event: BarcodeEvent) {
        match event {
            DetectionEvent::Failure { error } => {
                log::warn!("detection error: {:#}", error);
            }
            DetectionEvent::Success { frame, result } => {
                if !self.workflow.is_camera_live() {
                    return;
                }
                log::trace!("frame seq={}: {} barcode(s)", frame.seq(), result.len());
                self.overlay.clear();
                match result.first() {
                    None => {
                        // Nothing in view; keep scanning.
                        self.set_state_and_react(WorkflowState::Detecting);
                    }
                    Some(barcode) => {
                        if let Some(graphic) = BarcodeBoxGraphic::new(barcode) {
                            self.overlay.add(Box::new(graphic));
                        }
                        self.set_state_and_react(WorkflowState::Detected);
                        self.workflow.set_detected(barcode.clone());
                    }
                }
            }
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.close();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
