//! # Strip Warp
//!
//! This crate provides an interactive "free transform" for raster images: four draggable
//! corner handles define a destination quadrilateral, and the image is re-warped into it
//! on every move. The default engine is a strip-based approximation of a perspective
//! transform; a true homography warp and a contour-detection pipeline are available
//! through `imageproc`.
//!
//! ## Features
//!
//! - Strip warp: per-row interpolated position, rotation and scale along the quad's
//!   lateral edges, clipped to the quad outline
//! - Parallel stamping and compositing with rayon
//! - Homography warp via `imageproc` projections
//! - Canny edge and external contour detection with visualization
//! - Corner-drag state machine with move coalescing and a latest-wins background warper
//! - Optional debug logging (enable with `logger` feature)
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use strip_warp::{warp, Point};
//!
//! // Load the source and pull the top corners inwards
//! let source = image::open("example.png").unwrap().to_rgba8();
//! let (w, h) = (source.width() as f32, source.height() as f32);
//! let quad = [
//!     Point::new(w * 0.2, 0.0),
//!     Point::new(w * 0.8, 0.0),
//!     Point::new(w, h),
//!     Point::new(0.0, h),
//! ];
//!
//! let warped = warp(&source, quad, source.width(), source.height()).unwrap();
//! warped.save("warped_output.png").unwrap();
//! ```
//!
//! ## Optional Features
//!
//! ### Logger Feature
//!
//! Enable debug logging to monitor the warp pipeline:
//!
//! ```toml
//! [dependencies]
//! strip-warp = { version = "0.1.0", features = ["logger"] }
//! log = "0.4"
//! env_logger = "0.11"
//! ```
//!
//! ```rust,no_run
//! use strip_warp::{warp, Quad};
//!
//! // Initialize logger to see debug output
//! env_logger::init();
//!
//! let source = image::open("example.png").unwrap().to_rgba8();
//! let quad = Quad::from_rect(source.width(), source.height());
//! let warped = warp(&source, quad, source.width(), source.height()).unwrap();
//! // With logger feature, you'll see debug messages like:
//! // DEBUG strip_warp::strip: strip warp 640x480 -> 640x480
//! // DEBUG strip_warp::strip: stamped 240 strips, skipped 0
//! ```
//!
//! ## Advanced Usage
//!
//! ```rust,no_run
//! use strip_warp::{
//!     AngleMode, FreeTransform, OverlayConfig, Point, PointerEvent, StampExtent,
//!     StripWarpOptions,
//! };
//!
//! // Reproduce the canvas prototype exactly: full-image stamps, slope-based angles
//! let config = OverlayConfig {
//!     strip: StripWarpOptions {
//!         step: 2,
//!         extent: StampExtent::FullImage,
//!         angle: AngleMode::SlopeAtan,
//!     },
//!     ..Default::default()
//! };
//!
//! let mut transform = FreeTransform::new(config);
//! transform.load(image::open("example.png").unwrap()).unwrap();
//!
//! // Drag the top-left handle
//! transform.handle(PointerEvent::Down(Point::new(0.0, 0.0))).unwrap();
//! transform.handle(PointerEvent::Move(Point::new(40.0, 25.0))).unwrap();
//! transform.handle(PointerEvent::Up).unwrap();
//!
//! transform.render_overlay().unwrap().save("free_transform.png").unwrap();
//! ```

// Conditional logging macros
#[cfg(feature = "logger")]
macro_rules! debug {
    ($($arg:tt)*) => {
        log::debug!($($arg)*);
    };
}

#[cfg(not(feature = "logger"))]
macro_rules! debug {
    ($($arg:tt)*) => {};
}

pub mod dispatch;
mod error;
pub mod geometry;
pub mod overlay;
pub mod raster;
pub mod strip;
pub mod vision;

pub use dispatch::{BackgroundWarper, MoveCoalescer, Rendered};
pub use error::{WarpError, WarpResult};
pub use geometry::{Point, Quad};
pub use overlay::{
    DragState, FreeTransform, OverlayConfig, OverlayStyle, PointerEvent, WarpMethod,
    HANDLE_TOLERANCE,
};
pub use raster::{allocate_canvas, decode_source, open_source, to_source, Flip};
pub use strip::{
    warp, AngleMode, StampExtent, StripPlacement, StripWarp, StripWarpOptions, WarpStats,
};
pub use vision::{detect_objects, perspective_warp, visualize_contours, Detection, DetectionParams};

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_logger_feature_compilation() {
        // The debug! macro must compile with and without the logger feature
        let image = RgbaImage::from_fn(10, 10, |_x, _y| Rgba([128u8, 128, 128, 255]));

        debug!("Test debug message");

        let warped = warp(&image, Quad::from_rect(10, 10), 10, 10).unwrap();
        assert_eq!(warped.len(), 400); // 10x10 RGBA
    }

    #[test]
    fn test_debug_macro_no_panic() {
        debug!("Starting test");
        debug!("Processing data: {}", 42);
        debug!("Test completed successfully");
    }

    #[test]
    fn square_quad_on_100px_source_equals_source() {
        let source = RgbaImage::from_fn(100, 100, |x, y| {
            Rgba([(x * 2) as u8, (y * 2) as u8, (x ^ y) as u8, 255])
        });
        let quad = [
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 100.0),
            Point::new(0.0, 100.0),
        ];
        assert_eq!(warp(&source, quad, 100, 100).unwrap(), source);
    }

    #[test]
    fn warp_rejects_three_points() {
        let source = RgbaImage::new(8, 8);
        let quad = vec![Point::default(); 3];
        assert!(matches!(
            warp(&source, &quad, 8, 8),
            Err(WarpError::InvalidQuad(3))
        ));
    }
}
