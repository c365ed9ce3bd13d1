use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in preview coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RectF {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

/// Symbology of a decoded barcode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarcodeFormat {
    #[default]
    Unknown,
    QrCode,
    Code128,
    Ean13,
}

/// One decoded barcode. The lifetime of a result ends when the session's
/// callback consumes it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Barcode {
    /// Decoded payload.
    pub raw_value: String,
    pub format: BarcodeFormat,
    /// Where the symbol was found, in preview coordinates. Synthetic
    /// detectors may not localize, hence optional.
    pub bounding_box: Option<RectF>,
}
