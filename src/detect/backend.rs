use anyhow::Result;

use crate::frame::Frame;

/// Pluggable detection capability.
///
/// A detector converts one frame into zero or more domain results. The frame
/// processor invokes `detect` from its own detection thread, so one `detect`
/// call is outstanding at most at any time; implementations need no internal
/// synchronization.
///
/// Implementations must treat the frame as read-only and ephemeral: results
/// carry everything downstream consumers need.
pub trait Detector: Send + 'static {
    /// Payload produced for one frame. An empty collection type is the
    /// conventional "nothing found this cycle".
    type Output: Send + 'static;

    /// Detector identifier, used in logs.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// Errors are reported to the failure callback and do not stop the
    /// pipeline; the processor keeps accepting subsequent frames.
    fn detect(&mut self, frame: &Frame) -> Result<Self::Output>;

    /// Release any resources held by the detector.
    ///
    /// Called exactly once when the owning processor shuts down. Failures
    /// here are logged by the caller, never propagated.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
