//! Matrix-based warping and object detection through `imageproc`.
//!
//! These are the "exact" counterparts of the strip warp: a true homography
//! solved from the four corner correspondences, plus a blur → Canny → contour
//! pipeline for outlining objects.

use image::{imageops::grayscale, GrayImage, Rgba, RgbaImage};
use imageproc::{
    contours::{find_contours, BorderType, Contour},
    drawing::draw_filled_rect_mut,
    edges::canny,
    filter::gaussian_blur_f32,
    geometric_transformations::{warp_into, Interpolation, Projection},
    rect::Rect,
};
use rayon::prelude::*;

use crate::{
    geometry::Quad,
    raster::{allocate_canvas, TRANSPARENT},
    WarpError, WarpResult,
};

/// Contour outline colour used by [`DetectionParams::default`].
pub const CONTOUR_GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);

/// Warps `source` so its corners land on `quad` using a true projective mapping.
///
/// The source corners are the pixel centres `(0,0) (w-1,0) (w-1,h-1) (0,h-1)`.
/// Pixels that map outside the source stay transparent. Self-intersecting quads
/// are accepted as long as a projection onto them exists.
///
/// # Arguments
///
/// * `source` - Image to warp
/// * `quad` - Destination corners, clockwise from the top-left
/// * `dest_width`, `dest_height` - Size of the returned raster
/// * `interpolation` - Sampling used by `imageproc`'s `warp_into`
///
/// # Returns
///
/// A fresh `dest_width × dest_height` raster holding the warped source.
///
/// # Errors
///
/// * [`WarpError::DegenerateGeometry`] if the source is less than 2 pixels wide
///   or tall, the quad collapses onto a line, or no projection exists between
///   the two quadrilaterals
/// * [`WarpError::ResourceUnavailable`] for an empty source or canvas
///
/// # Examples
///
/// ```rust,no_run
/// use imageproc::geometric_transformations::Interpolation;
/// use strip_warp::{perspective_warp, Point, Quad};
///
/// let source = image::open("input.png").unwrap().to_rgba8();
/// let quad = Quad::new([
///     Point::new(30.0, 20.0),
///     Point::new(280.0, 5.0),
///     Point::new(300.0, 210.0),
///     Point::new(0.0, 190.0),
/// ]);
/// let (width, height) = quad.canvas_size();
/// let warped = perspective_warp(&source, &quad, width, height, Interpolation::Bilinear).unwrap();
/// warped.save("perspective.png").unwrap();
/// ```
pub fn perspective_warp(
    source: &RgbaImage,
    quad: &Quad,
    dest_width: u32,
    dest_height: u32,
    interpolation: Interpolation,
) -> WarpResult<RgbaImage> {
    let (ow, oh) = source.dimensions();
    if ow == 0 || oh == 0 {
        return Err(WarpError::ResourceUnavailable(format!(
            "cannot warp an empty {ow}x{oh} source"
        )));
    }
    if ow < 2 || oh < 2 {
        return Err(WarpError::DegenerateGeometry(format!(
            "corners of a {ow}x{oh} source coincide"
        )));
    }
    let (min, max) = quad.bounding_box();
    if !(max.x - min.x > 0.0 && max.y - min.y > 0.0) {
        return Err(WarpError::DegenerateGeometry(
            "destination quad collapses onto a line".into(),
        ));
    }

    let (right, bottom) = ((ow - 1) as f32, (oh - 1) as f32);
    let from = [(0.0, 0.0), (right, 0.0), (right, bottom), (0.0, bottom)];
    let projection =
        Projection::from_control_points(from, quad.control_points()).ok_or_else(|| {
            WarpError::DegenerateGeometry("no projection maps the source onto the quad".into())
        })?;

    let mut out = allocate_canvas(dest_width, dest_height)?;
    debug!("homography warp {}x{} -> {}x{}", ow, oh, dest_width, dest_height);
    warp_into(source, &projection, interpolation, TRANSPARENT, &mut out);
    Ok(out)
}

/// Parameters of the blur → Canny → contour pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    /// Gaussian sigma; 1.1 matches a 5×5 kernel with automatic sigma.
    pub blur_sigma: f32,
    pub low_threshold: f32,
    pub high_threshold: f32,
    pub outline: Rgba<u8>,
    /// Outline thickness in pixels.
    pub thickness: u32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            blur_sigma: 1.1,
            low_threshold: 50.0,
            high_threshold: 150.0,
            outline: CONTOUR_GREEN,
            thickness: 2,
        }
    }
}

impl DetectionParams {
    pub fn validate(&self) -> WarpResult<()> {
        if !(self.blur_sigma > 0.0) {
            return Err(WarpError::InvalidParameters(format!(
                "blur sigma must be positive, got {}",
                self.blur_sigma
            )));
        }
        if !(0.0..=self.high_threshold).contains(&self.low_threshold) {
            return Err(WarpError::InvalidParameters(format!(
                "thresholds must satisfy 0 <= low <= high, got {} / {}",
                self.low_threshold, self.high_threshold
            )));
        }
        if self.thickness == 0 {
            return Err(WarpError::InvalidParameters(
                "outline thickness must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Result of [`detect_objects`].
#[derive(Debug, Clone)]
pub struct Detection {
    /// Binary Canny edge map (255 = edge).
    pub edges: GrayImage,
    /// Outer, top-level contours only.
    pub contours: Vec<Contour<i32>>,
}

/// Finds object outlines: grayscale, Gaussian blur, Canny, then the external
/// contours of the edge map.
///
/// # Examples
///
/// ```rust,no_run
/// use strip_warp::{detect_objects, visualize_contours, DetectionParams};
///
/// let source = image::open("input.png").unwrap().to_rgba8();
/// let params = DetectionParams::default();
/// let detection = detect_objects(&source, &params).unwrap();
/// println!("found {} objects", detection.contours.len());
/// visualize_contours(&source, &detection.contours, &params).save("contours.png").unwrap();
/// ```
pub fn detect_objects(source: &RgbaImage, params: &DetectionParams) -> WarpResult<Detection> {
    params.validate()?;
    let gray = grayscale(source);
    let blurred = gaussian_blur_f32(&gray, params.blur_sigma);
    let edges = canny(&blurred, params.low_threshold, params.high_threshold);
    debug!("edge map ok");

    let contours: Vec<Contour<i32>> = find_contours::<i32>(&edges)
        .into_iter()
        .filter(|c| c.parent.is_none() && matches!(c.border_type, BorderType::Outer))
        .collect();
    debug!("external contours: {}", contours.len());

    Ok(Detection { edges, contours })
}

/// Draws contour points over a copy of `source` as `thickness`-wide squares in
/// the outline colour.
///
/// Points are bounds-filtered in parallel; drawing is serial.
pub fn visualize_contours(
    source: &RgbaImage,
    contours: &[Contour<i32>],
    params: &DetectionParams,
) -> RgbaImage {
    let mut canvas = source.clone();
    let (width, height) = canvas.dimensions();
    let size = params.thickness.max(1);
    let offset = (size as i32 - 1) / 2;

    let points: Vec<(i32, i32)> = contours
        .par_iter()
        .flat_map_iter(|c| c.points.iter().map(|p| (p.x, p.y)))
        .filter(|&(x, y)| x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height)
        .collect();

    for (x, y) in points {
        draw_filled_rect_mut(
            &mut canvas,
            Rect::at(x - offset, y - offset).of_size(size, size),
            params.outline,
        );
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    fn square_scene() -> RgbaImage {
        RgbaImage::from_fn(60, 60, |x, y| {
            if (20..40).contains(&x) && (20..40).contains(&y) {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        })
    }

    #[test]
    fn detects_outer_contour_of_square() {
        let detection = detect_objects(&square_scene(), &DetectionParams::default()).unwrap();
        assert!(detection.edges.pixels().any(|p| p[0] == 255));
        assert!(!detection.contours.is_empty());
        for contour in &detection.contours {
            assert!(contour.parent.is_none());
            for p in &contour.points {
                assert!((14..46).contains(&p.x) && (14..46).contains(&p.y));
            }
        }
    }

    #[test]
    fn flat_image_has_no_contours() {
        let flat = RgbaImage::from_pixel(30, 30, Rgba([90, 90, 90, 255]));
        let detection = detect_objects(&flat, &DetectionParams::default()).unwrap();
        assert!(detection.contours.is_empty());
    }

    #[test]
    fn visualize_paints_contour_points() {
        let source = square_scene();
        let params = DetectionParams::default();
        let detection = detect_objects(&source, &params).unwrap();
        let drawn = visualize_contours(&source, &detection.contours, &params);
        let p = detection.contours[0].points[0];
        assert_eq!(drawn.get_pixel(p.x as u32, p.y as u32), &CONTOUR_GREEN);
        assert_eq!(drawn.get_pixel(0, 0), source.get_pixel(0, 0));
    }

    #[test]
    fn invalid_detection_params_are_rejected() {
        let source = square_scene();
        for params in [
            DetectionParams {
                blur_sigma: 0.0,
                ..Default::default()
            },
            DetectionParams {
                low_threshold: 200.0,
                ..Default::default()
            },
            DetectionParams {
                thickness: 0,
                ..Default::default()
            },
        ] {
            assert!(matches!(
                detect_objects(&source, &params),
                Err(WarpError::InvalidParameters(_))
            ));
        }
    }

    #[test]
    fn identity_homography_keeps_interior() {
        let colour = Rgba([10, 200, 30, 255]);
        let source = RgbaImage::from_pixel(50, 40, colour);
        let quad = Quad::new([
            Point::new(0.0, 0.0),
            Point::new(49.0, 0.0),
            Point::new(49.0, 39.0),
            Point::new(0.0, 39.0),
        ]);
        let warped = perspective_warp(&source, &quad, 50, 40, Interpolation::Nearest).unwrap();
        assert_eq!(warped.dimensions(), (50, 40));
        assert_eq!(warped.get_pixel(25, 20), &colour);
        assert_eq!(warped.get_pixel(1, 1), &colour);
    }

    #[test]
    fn shrunk_homography_leaves_outside_transparent() {
        let source = RgbaImage::from_pixel(40, 40, Rgba([255, 0, 0, 255]));
        let quad = Quad::new([
            Point::new(0.0, 0.0),
            Point::new(19.0, 0.0),
            Point::new(19.0, 19.0),
            Point::new(0.0, 19.0),
        ]);
        let warped = perspective_warp(&source, &quad, 40, 40, Interpolation::Nearest).unwrap();
        assert_eq!(warped.get_pixel(10, 10)[3], 255);
        assert_eq!(warped.get_pixel(30, 30), &TRANSPARENT);
    }

    #[test]
    fn bowtie_quad_with_zero_area_still_warps() {
        let source = RgbaImage::from_pixel(40, 40, Rgba([200, 50, 50, 255]));
        let quad = Quad::new([
            Point::new(0.0, 0.0),
            Point::new(40.0, 0.0),
            Point::new(0.0, 40.0),
            Point::new(40.0, 40.0),
        ]);
        assert_eq!(quad.area(), 0.0);
        let warped = perspective_warp(&source, &quad, 40, 40, Interpolation::Nearest).unwrap();
        assert_eq!(warped.dimensions(), (40, 40));
        assert!(warped.pixels().any(|p| p[3] == 255));
    }

    #[test]
    fn single_pixel_source_has_no_projection() {
        let source = RgbaImage::from_pixel(1, 8, Rgba([1, 2, 3, 255]));
        assert!(matches!(
            perspective_warp(&source, &Quad::from_rect(1, 8), 1, 8, Interpolation::Nearest),
            Err(WarpError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn collapsed_quad_is_degenerate() {
        let source = RgbaImage::from_pixel(10, 10, Rgba([1, 1, 1, 255]));
        let quad = Quad::new([Point::new(3.0, 3.0); 4]);
        assert!(matches!(
            perspective_warp(&source, &quad, 10, 10, Interpolation::Nearest),
            Err(WarpError::DegenerateGeometry(_))
        ));
    }
}
