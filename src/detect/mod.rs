mod backend;
mod backends;
mod barcode;

pub use backend::Detector;
pub use backends::stub::{StubBarcodeDetector, MARKER, MARKER_LEN};
pub use barcode::{Barcode, BarcodeFormat, RectF};
