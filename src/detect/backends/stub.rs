use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::Detector;
use crate::detect::barcode::{Barcode, BarcodeFormat, RectF};
use crate::frame::Frame;

/// Byte sequence the synthetic camera embeds to simulate a visible barcode.
pub const MARKER: [u8; 6] = [0xAA, 0x55, 0xC3, 0x3C, 0xAA, 0x55];

/// Marker plus the 8-byte payload window that follows it.
pub const MARKER_LEN: usize = MARKER.len() + PAYLOAD_LEN;

const PAYLOAD_LEN: usize = 8;

/// Stub barcode detector. Scans frame pixels for the synthetic marker and
/// derives a stable payload from a hash of the bytes that follow it.
pub struct StubBarcodeDetector {
    decoded: u64,
}

impl StubBarcodeDetector {
    pub fn new() -> Self {
        Self { decoded: 0 }
    }
}

impl Default for StubBarcodeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for StubBarcodeDetector {
    type Output = Vec<Barcode>;

    fn name(&self) -> &'static str {
        "stub-barcode"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Barcode>> {
        let data = frame.data();
        let Some(at) = find_marker(data) else {
            return Ok(vec![]);
        };

        let payload_start = at + MARKER.len();
        let payload_end = payload_start + PAYLOAD_LEN;
        if payload_end > data.len() {
            // Marker truncated by the frame edge; treat as not decoded.
            return Ok(vec![]);
        }

        let digest: [u8; 32] = Sha256::digest(&data[payload_start..payload_end]).into();
        let raw_value = format!("stub:{}", hex::encode(&digest[..6]));
        self.decoded += 1;

        Ok(vec![Barcode {
            raw_value,
            format: BarcodeFormat::QrCode,
            bounding_box: Some(marker_box(frame, at)),
        }])
    }

    fn close(&mut self) -> Result<()> {
        log::debug!("stub-barcode detector closed after {} decodes", self.decoded);
        Ok(())
    }
}

fn find_marker(data: &[u8]) -> Option<usize> {
    data.windows(MARKER.len()).position(|w| w == MARKER)
}

/// Localize the marker as a small box around the pixel it starts at,
/// expressed in preview coordinates.
fn marker_box(frame: &Frame, offset: usize) -> RectF {
    let width = frame.width().max(1) as f32;
    let height = frame.height().max(1) as f32;
    let pixel = (offset / 3) as u32;
    let x = (pixel % frame.width().max(1)) as f32;
    let y = (pixel / frame.width().max(1)) as f32;
    let half = (width.min(height) * 0.1).max(1.0);
    RectF {
        left: (x - half).max(0.0),
        top: (y - half).max(0.0),
        right: (x + half).min(width),
        bottom: (y + half).min(height),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameFormat, FrameMetadata};

    fn frame_with(data: Vec<u8>) -> Frame {
        Frame::new(
            data,
            FrameMetadata {
                width: 32,
                height: 32,
                rotation_degrees: 0,
                timestamp_ms: 0,
                format: FrameFormat::Rgb8,
                seq: 1,
            },
        )
    }

    #[test]
    fn plain_frame_decodes_nothing() -> Result<()> {
        let mut detector = StubBarcodeDetector::new();
        let frame = frame_with(vec![7u8; 32 * 32 * 3]);
        assert!(detector.detect(&frame)?.is_empty());
        Ok(())
    }

    #[test]
    fn marker_frame_decodes_one_barcode() -> Result<()> {
        let mut detector = StubBarcodeDetector::new();
        let mut data = vec![7u8; 32 * 32 * 3];
        let at = 300;
        data[at..at + MARKER.len()].copy_from_slice(&MARKER);

        let results = detector.detect(&frame_with(data))?;
        assert_eq!(results.len(), 1);
        assert!(results[0].raw_value.starts_with("stub:"));
        assert_eq!(results[0].format, BarcodeFormat::QrCode);
        assert!(results[0].bounding_box.is_some());
        Ok(())
    }

    #[test]
    fn same_payload_decodes_to_same_value() -> Result<()> {
        let mut detector = StubBarcodeDetector::new();
        let mut data = vec![7u8; 32 * 32 * 3];
        data[0..MARKER.len()].copy_from_slice(&MARKER);

        let first = detector.detect(&frame_with(data.clone()))?;
        let second = detector.detect(&frame_with(data))?;
        assert_eq!(first[0].raw_value, second[0].raw_value);
        Ok(())
    }

    #[test]
    fn truncated_marker_is_ignored() -> Result<()> {
        let mut detector = StubBarcodeDetector::new();
        let mut data = vec![7u8; 64];
        let at = data.len() - MARKER.len();
        data[at..].copy_from_slice(&MARKER);
        assert!(detector.detect(&frame_with(data))?.is_empty());
        Ok(())
    }
}
