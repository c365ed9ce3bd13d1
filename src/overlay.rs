//! Shared graphic overlay rendered atop the camera preview.
//!
//! The overlay is a mutex-guarded, insertion-ordered list of drawable
//! graphics. Producers (the detection result handler, any thread) mutate the
//! list; the render surface calls `render` on its own schedule from an
//! independent rendering context. One lock covers both, and its scope is kept
//! minimal: never held across detection work or I/O, only across list
//! mutation and the draw loop itself.
//!
//! Graphics are expressed in preview coordinates. Scale factors are derived
//! from the destination surface's current pixel size on every render pass;
//! the surface may resize between frames, so they are never cached.

use std::sync::{Arc, Mutex};

use crate::camera::CameraFacing;
use crate::detect::Barcode;

// ----------------------------------------------------------------------------
// Render seam
// ----------------------------------------------------------------------------

/// RGBA color, 8 bits per channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

/// Minimal drawing surface the render context hands to the overlay.
///
/// The concrete surface (a view, a framebuffer, a test recorder) lives
/// outside this crate; the overlay only needs its current pixel size and a
/// couple of primitives.
pub trait DrawCanvas {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn stroke_rect(&mut self, left: f32, top: f32, right: f32, bottom: f32, color: Color);
    fn fill_rect(&mut self, left: f32, top: f32, right: f32, bottom: f32, color: Color);
}

/// Preview-to-surface mapping for one render pass.
#[derive(Clone, Copy, Debug)]
pub struct OverlayTransform {
    width_scale: f32,
    height_scale: f32,
    surface_width: f32,
    mirrored: bool,
}

impl OverlayTransform {
    pub fn scale_x(&self, value: f32) -> f32 {
        value * self.width_scale
    }

    pub fn scale_y(&self, value: f32) -> f32 {
        value * self.height_scale
    }

    /// Map a preview x coordinate to the surface, mirroring for
    /// front-facing cameras.
    pub fn translate_x(&self, x: f32) -> f32 {
        if self.mirrored {
            self.surface_width - self.scale_x(x)
        } else {
            self.scale_x(x)
        }
    }

    pub fn translate_y(&self, y: f32) -> f32 {
        self.scale_y(y)
    }
}

/// A drawable unit owned exclusively by the overlay once added.
pub trait Graphic: Send {
    fn draw(&self, canvas: &mut dyn DrawCanvas, transform: &OverlayTransform);
}

/// Token identifying an added graphic, used to remove it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GraphicId(u64);

// ----------------------------------------------------------------------------
// GraphicOverlay
// ----------------------------------------------------------------------------

struct OverlayInner {
    preview_width: u32,
    preview_height: u32,
    facing: CameraFacing,
    graphics: Vec<(GraphicId, Box<dyn Graphic>)>,
    next_id: u64,
}

type RedrawListener = Box<dyn Fn() + Send + Sync>;

/// Cheaply cloneable handle to the shared overlay state. One clone lives with
/// the render surface, others with whoever produces graphics.
#[derive(Clone)]
pub struct GraphicOverlay {
    inner: Arc<Mutex<OverlayInner>>,
    redraw: Arc<Mutex<Option<RedrawListener>>>,
}

impl GraphicOverlay {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(OverlayInner {
                preview_width: 0,
                preview_height: 0,
                facing: CameraFacing::Back,
                graphics: Vec::new(),
                next_id: 0,
            })),
            redraw: Arc::new(Mutex::new(None)),
        }
    }

    /// Install the redraw request hook, typically wired to the render
    /// surface's invalidation entry point. Invoked after every mutation.
    pub fn set_redraw_listener(&self, listener: impl Fn() + Send + Sync + 'static) {
        *lock(&self.redraw) = Some(Box::new(listener));
    }

    /// Record the camera preview size graphics are expressed against.
    pub fn set_preview_size(&self, width: u32, height: u32) {
        {
            let mut inner = lock(&self.inner);
            inner.preview_width = width;
            inner.preview_height = height;
        }
        self.request_redraw();
    }

    /// Record the camera facing; front-facing previews are mirrored.
    pub fn set_facing(&self, facing: CameraFacing) {
        lock(&self.inner).facing = facing;
        self.request_redraw();
    }

    pub fn add(&self, graphic: Box<dyn Graphic>) -> GraphicId {
        let id = {
            let mut inner = lock(&self.inner);
            let id = GraphicId(inner.next_id);
            inner.next_id += 1;
            inner.graphics.push((id, graphic));
            id
        };
        self.request_redraw();
        id
    }

    /// Remove a graphic. Returns false when the id is unknown.
    pub fn remove(&self, id: GraphicId) -> bool {
        let removed = {
            let mut inner = lock(&self.inner);
            let before = inner.graphics.len();
            inner.graphics.retain(|(existing, _)| *existing != id);
            inner.graphics.len() != before
        };
        if removed {
            self.request_redraw();
        }
        removed
    }

    pub fn clear(&self) {
        lock(&self.inner).graphics.clear();
        self.request_redraw();
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).graphics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Draw every graphic in insertion order. Called from the rendering
    /// context. The scale factors reflect the canvas's size on this pass,
    /// and the lock is released before returning.
    pub fn render(&self, canvas: &mut dyn DrawCanvas) {
        let inner = lock(&self.inner);
        let transform = OverlayTransform {
            width_scale: if inner.preview_width > 0 {
                canvas.width() as f32 / inner.preview_width as f32
            } else {
                1.0
            },
            height_scale: if inner.preview_height > 0 {
                canvas.height() as f32 / inner.preview_height as f32
            } else {
                1.0
            },
            surface_width: canvas.width() as f32,
            mirrored: inner.facing == CameraFacing::Front,
        };
        for (_, graphic) in &inner.graphics {
            graphic.draw(canvas, &transform);
        }
    }

    fn request_redraw(&self) {
        // Taken after the graphics lock is released, so a listener may call
        // back into the overlay.
        let listener = lock(&self.redraw);
        if let Some(listener) = listener.as_ref() {
            listener();
        }
    }
}

impl Default for GraphicOverlay {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // A poisoned lock means a graphic panicked mid-draw; keep rendering.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ----------------------------------------------------------------------------
// BarcodeBoxGraphic
// ----------------------------------------------------------------------------

/// Outline around a detected barcode's bounding box.
pub struct BarcodeBoxGraphic {
    bounds: crate::detect::RectF,
}

impl BarcodeBoxGraphic {
    pub fn new(barcode: &Barcode) -> Option<Self> {
        barcode.bounding_box.map(|bounds| Self { bounds })
    }
}

impl Graphic for BarcodeBoxGraphic {
    fn draw(&self, canvas: &mut dyn DrawCanvas, transform: &OverlayTransform) {
        let x0 = transform.translate_x(self.bounds.left);
        let x1 = transform.translate_x(self.bounds.right);
        canvas.stroke_rect(
            x0.min(x1),
            transform.translate_y(self.bounds.top),
            x0.max(x1),
            transform.translate_y(self.bounds.bottom),
            Color::WHITE,
        );
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Canvas that records draw calls for assertions.
    pub(crate) struct RecordingCanvas {
        pub width: u32,
        pub height: u32,
        pub rects: Vec<(f32, f32, f32, f32)>,
    }

    impl RecordingCanvas {
        pub(crate) fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                rects: Vec::new(),
            }
        }
    }

    impl DrawCanvas for RecordingCanvas {
        fn width(&self) -> u32 {
            self.width
        }

        fn height(&self) -> u32 {
            self.height
        }

        fn stroke_rect(&mut self, left: f32, top: f32, right: f32, bottom: f32, _color: Color) {
            self.rects.push((left, top, right, bottom));
        }

        fn fill_rect(&mut self, left: f32, top: f32, right: f32, bottom: f32, _color: Color) {
            self.rects.push((left, top, right, bottom));
        }
    }

    struct TaggedRect(f32);

    impl Graphic for TaggedRect {
        fn draw(&self, canvas: &mut dyn DrawCanvas, transform: &OverlayTransform) {
            let x = transform.translate_x(self.0);
            canvas.stroke_rect(x, 0.0, x + 1.0, 1.0, Color::WHITE);
        }
    }

    #[test]
    fn renders_in_insertion_order() {
        let overlay = GraphicOverlay::new();
        overlay.set_preview_size(100, 100);
        overlay.add(Box::new(TaggedRect(10.0)));
        overlay.add(Box::new(TaggedRect(20.0)));
        overlay.add(Box::new(TaggedRect(30.0)));

        let mut canvas = RecordingCanvas::new(100, 100);
        overlay.render(&mut canvas);

        let xs: Vec<f32> = canvas.rects.iter().map(|r| r.0).collect();
        assert_eq!(xs, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn scale_factors_track_canvas_size_per_pass() {
        let overlay = GraphicOverlay::new();
        overlay.set_preview_size(100, 50);
        overlay.add(Box::new(TaggedRect(10.0)));

        let mut small = RecordingCanvas::new(100, 50);
        overlay.render(&mut small);
        assert_eq!(small.rects[0].0, 10.0);

        // Surface resized between frames: the next pass must pick it up.
        let mut large = RecordingCanvas::new(200, 100);
        overlay.render(&mut large);
        assert_eq!(large.rects[0].0, 20.0);
    }

    #[test]
    fn front_facing_mirrors_x() {
        let overlay = GraphicOverlay::new();
        overlay.set_preview_size(100, 100);
        overlay.set_facing(CameraFacing::Front);
        overlay.add(Box::new(TaggedRect(10.0)));

        let mut canvas = RecordingCanvas::new(100, 100);
        overlay.render(&mut canvas);
        assert_eq!(canvas.rects[0].0, 90.0);
    }

    #[test]
    fn remove_and_clear_mutate_the_list() {
        let overlay = GraphicOverlay::new();
        let id = overlay.add(Box::new(TaggedRect(1.0)));
        overlay.add(Box::new(TaggedRect(2.0)));

        assert!(overlay.remove(id));
        assert!(!overlay.remove(id));
        assert_eq!(overlay.len(), 1);

        overlay.clear();
        assert!(overlay.is_empty());
    }

    #[test]
    fn mutations_request_redraw() {
        let overlay = GraphicOverlay::new();
        let redraws = Arc::new(AtomicUsize::new(0));
        let counter = redraws.clone();
        overlay.set_redraw_listener(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let id = overlay.add(Box::new(TaggedRect(1.0)));
        overlay.remove(id);
        overlay.clear();
        overlay.set_preview_size(10, 10);

        assert_eq!(redraws.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn barcode_box_graphic_scales_bounds() {
        let barcode = Barcode {
            raw_value: "stub:1".to_string(),
            format: crate::detect::BarcodeFormat::QrCode,
            bounding_box: Some(crate::detect::RectF {
                left: 10.0,
                top: 10.0,
                right: 20.0,
                bottom: 20.0,
            }),
        };
        let graphic = BarcodeBoxGraphic::new(&barcode).expect("bounded barcode");

        let overlay = GraphicOverlay::new();
        overlay.set_preview_size(100, 100);
        overlay.add(Box::new(graphic));

        let mut canvas = RecordingCanvas::new(200, 200);
        overlay.render(&mut canvas);
        assert_eq!(canvas.rects[0], (20.0, 20.0, 40.0, 40.0));
    }
}
