//! Strip-based perspective approximation.
//!
//! The source is walked top to bottom in steps of [`StripWarpOptions::step`] rows.
//! For each sampled row `y` the row is placed on the segment between the points
//! at fraction `y / oh` along the quad's left edge (corner 0 to corner 3) and
//! right edge (corner 1 to corner 2). The source is then stamped there, rotated
//! to the segment's angle and uniformly scaled to its length. Later stamps
//! overdraw earlier ones. Finally the stamped buffer is clipped to the quad
//! outline and composited onto the destination.
//!
//! This is not a true projective mapping. Use
//! [`perspective_warp`](crate::vision::perspective_warp) for that.

use std::ops::Range;

use image::RgbaImage;
use rayon::prelude::*;

use crate::{
    geometry::{Point, Quad},
    raster::{allocate_canvas, blend_over},
    WarpError, WarpResult,
};

/// How the per-row rotation is derived from the strip segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AngleMode {
    /// `atan2(dy, dx)`, correct in every quadrant.
    #[default]
    Atan2,
    /// `atan(dy / dx)`. Leftward segments lose half a turn and vertical ones
    /// snap to ±90°. Kept for output parity with the canvas prototype.
    SlopeAtan,
}

/// How much of the source each stamp draws.
///
/// The classic strip algorithm draws the whole source at every sampled row
/// ([`FullImage`](Self::FullImage)), so the last stamps cover most of the
/// output. [`Band`](Self::Band) draws only a slice of rows from the sampled
/// row down, which is what [`StripWarpOptions::default`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampExtent {
    /// The whole source, shifted so the sampled row sits on the strip.
    FullImage,
    /// Only the sampled row and the following `n - 1` rows.
    Band(u32),
}

/// Tuning for [`StripWarp`].
///
/// The default is `step = 2`, [`StampExtent::Band`] of `5 * step` rows and
/// [`AngleMode::Atan2`]. Set `extent` to [`StampExtent::FullImage`] for the
/// literal full-image stamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripWarpOptions {
    /// Vertical sampling interval in source rows.
    pub step: u32,
    pub extent: StampExtent,
    pub angle: AngleMode,
}

impl Default for StripWarpOptions {
    fn default() -> Self {
        Self {
            step: 2,
            extent: StampExtent::Band(2 * 5),
            angle: AngleMode::Atan2,
        }
    }
}

impl StripWarpOptions {
    pub fn validate(&self) -> WarpResult<()> {
        if self.step == 0 {
            return Err(WarpError::InvalidParameters(
                "strip step must be at least 1".into(),
            ));
        }
        if self.extent == StampExtent::Band(0) {
            return Err(WarpError::InvalidParameters(
                "stamp band must cover at least 1 row".into(),
            ));
        }
        Ok(())
    }
}

/// Where and how one sampled source row is stamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StripPlacement {
    /// Source row at the transform origin.
    pub row: u32,
    /// Interpolated point on the left edge.
    pub start: Point,
    /// Interpolated point on the right edge.
    pub end: Point,
    /// Rotation in radians.
    pub angle: f32,
    /// Uniform scale, `distance(start, end) / ow`.
    pub scale: f32,
}

impl StripPlacement {
    /// Whether the placement can be inverted. Zero-length or non-finite strips
    /// are skipped rather than drawn.
    pub fn is_drawable(&self) -> bool {
        self.angle.is_finite() && self.scale.is_finite() && self.scale > 0.0
    }
}

/// Counters reported by [`StripWarp::warp_into`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WarpStats {
    /// Rows stamped onto the intermediate buffer.
    pub stamped: usize,
    /// Rows skipped because of degenerate geometry.
    pub skipped: usize,
}

/// The strip warp engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct StripWarp {
    options: StripWarpOptions,
}

impl StripWarp {
    /// Creates an engine. Options are validated on each warp, not here.
    pub fn new(options: StripWarpOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &StripWarpOptions {
        &self.options
    }

    /// Computes the placement of every sampled row, drawable or not.
    ///
    /// # Arguments
    ///
    /// * `quad` - Destination corners; only the left (0→3) and right (1→2) edges
    ///   are used
    /// * `ow`, `oh` - Source dimensions
    ///
    /// # Returns
    ///
    /// One [`StripPlacement`] per sampled row `0, step, 2 * step, …` below `oh`,
    /// in drawing order. Check [`StripPlacement::is_drawable`] before use.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use strip_warp::{Quad, StripWarp};
    ///
    /// let placements = StripWarp::default().placements(&Quad::from_rect(100, 50), 100, 50);
    /// assert_eq!(placements.len(), 25);
    /// assert_eq!(placements[3].row, 6);
    /// assert!((placements[3].scale - 1.0).abs() < 1e-6);
    /// ```
    pub fn placements(&self, quad: &Quad, ow: u32, oh: u32) -> Vec<StripPlacement> {
        let step = self.options.step.max(1) as usize;
        (0..oh)
            .step_by(step)
            .map(|row| self.place(quad, row, ow, oh))
            .collect()
    }

    fn place(&self, quad: &Quad, row: u32, ow: u32, oh: u32) -> StripPlacement {
        let r = row as f32 / oh as f32;
        let start = quad[Quad::TOP_LEFT].lerp(quad[Quad::BOTTOM_LEFT], r);
        let end = quad[Quad::TOP_RIGHT].lerp(quad[Quad::BOTTOM_RIGHT], r);
        let (dx, dy) = (end.x - start.x, end.y - start.y);
        let angle = match self.options.angle {
            AngleMode::Atan2 => dy.atan2(dx),
            AngleMode::SlopeAtan => (dy / dx).atan(),
        };
        StripPlacement {
            row,
            start,
            end,
            angle,
            scale: start.distance(end) / ow as f32,
        }
    }

    /// Warps `source` into a fresh transparent `dest_width × dest_height` raster.
    ///
    /// # Arguments
    ///
    /// * `source` - Image to warp
    /// * `quad` - Exactly four corners, clockwise from the top-left
    /// * `dest_width`, `dest_height` - Size of the returned raster
    ///
    /// # Errors
    ///
    /// * [`WarpError::InvalidQuad`] if `quad` does not hold four points
    /// * [`WarpError::InvalidParameters`] for invalid [`StripWarpOptions`]
    /// * [`WarpError::ResourceUnavailable`] if the raster cannot be allocated
    pub fn warp<Q: AsRef<[Point]>>(
        &self,
        source: &RgbaImage,
        quad: Q,
        dest_width: u32,
        dest_height: u32,
    ) -> WarpResult<RgbaImage> {
        let quad = Quad::from_points(quad.as_ref())?;
        let mut dest = allocate_canvas(dest_width, dest_height)?;
        self.warp_quad_into(source, &quad, &mut dest)?;
        Ok(dest)
    }

    /// Warps `source` onto `dest`, touching only pixels inside the quad.
    ///
    /// Everything is validated before the first write, so on error `dest` is
    /// unchanged.
    pub fn warp_into<Q: AsRef<[Point]>>(
        &self,
        source: &RgbaImage,
        quad: Q,
        dest: &mut RgbaImage,
    ) -> WarpResult<WarpStats> {
        let quad = Quad::from_points(quad.as_ref())?;
        self.warp_quad_into(source, &quad, dest)
    }

    fn warp_quad_into(
        &self,
        source: &RgbaImage,
        quad: &Quad,
        dest: &mut RgbaImage,
    ) -> WarpResult<WarpStats> {
        self.options.validate()?;
        let (ow, oh) = source.dimensions();
        let (width, height) = dest.dimensions();
        let mut stamped = allocate_canvas(width, height)?;
        debug!("strip warp {}x{} -> {}x{}", ow, oh, width, height);

        let mut stats = WarpStats::default();
        for placement in self.placements(quad, ow, oh) {
            if !placement.is_drawable() {
                debug!("skip degenerate strip at row {}", placement.row);
                stats.skipped += 1;
                continue;
            }
            let rows = match self.options.extent {
                StampExtent::FullImage => 0..oh,
                StampExtent::Band(n) => {
                    placement.row..placement.row.saturating_add(n).min(oh)
                }
            };
            stamp(source, &placement, rows, &mut stamped);
            stats.stamped += 1;
        }

        composite_clipped(&stamped, quad, dest);
        debug!("stamped {} strips, skipped {}", stats.stamped, stats.skipped);
        Ok(stats)
    }
}

/// Warps with the default options: `step = 2`, banded stamps and `atan2` angles.
///
/// Each stamp draws a band of `10` source rows starting at its sampled row, not
/// the whole source. With whole-image stamps the last rows' stamps overdraw
/// most of the quad, so the output differs as soon as the quad is not a
/// rectangle. Use [`StripWarp`] with [`StampExtent::FullImage`] for the literal
/// whole-image stamping.
///
/// # Arguments
///
/// * `source` - Image to warp
/// * `quad` - Four destination corners, clockwise from the top-left; anything
///   that derefs to a `[Point]` works
/// * `dest_width`, `dest_height` - Size of the returned raster
///
/// # Returns
///
/// A new transparent raster with the warped source composited inside the quad.
///
/// # Errors
///
/// Same as [`StripWarp::warp`].
///
/// # Examples
///
/// ```rust,no_run
/// use strip_warp::{warp, Point};
///
/// let source = image::open("input.png").unwrap().to_rgba8();
/// let quad = [
///     Point::new(40.0, 10.0),
///     Point::new(260.0, 0.0),
///     Point::new(300.0, 200.0),
///     Point::new(0.0, 180.0),
/// ];
/// let warped = warp(&source, quad, 300, 200).unwrap();
/// warped.save("warped.png").unwrap();
/// ```
pub fn warp<Q: AsRef<[Point]>>(
    source: &RgbaImage,
    quad: Q,
    dest_width: u32,
    dest_height: u32,
) -> WarpResult<RgbaImage> {
    StripWarp::default().warp(source, quad, dest_width, dest_height)
}

/// Draws source rows `rows` onto `target` under the placement's similarity
/// transform `start + R(angle) * scale * (u, v - row)`.
///
/// Destination pixels are inverse-mapped from their centres and sampled nearest.
/// Rows of the covered bounding box are filled in parallel; pixels of one stamp
/// never depend on each other.
fn stamp(
    source: &RgbaImage,
    placement: &StripPlacement,
    rows: Range<u32>,
    target: &mut RgbaImage,
) {
    if rows.is_empty() || source.width() == 0 {
        return;
    }
    let (ow, width, height) = (source.width(), target.width(), target.height());
    let (sin, cos) = placement.angle.sin_cos();
    let scale = placement.scale;
    let origin = placement.start;
    let row = placement.row as f32;

    let forward = |u: f32, v: f32| {
        let (lx, ly) = (u * scale, (v - row) * scale);
        Point::new(
            origin.x + lx * cos - ly * sin,
            origin.y + lx * sin + ly * cos,
        )
    };
    let corners = [
        forward(0.0, rows.start as f32),
        forward(ow as f32, rows.start as f32),
        forward(ow as f32, rows.end as f32),
        forward(0.0, rows.end as f32),
    ];
    let (min, max) = Quad::new(corners).bounding_box();
    let clamp = |v: f32, hi: u32| v.max(0.0).min(hi as f32) as u32;
    let (x0, x1) = (clamp(min.x.floor(), width), clamp(max.x.ceil(), width));
    let (y0, y1) = (clamp(min.y.floor(), height), clamp(max.y.ceil(), height));
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let (v_lo, v_hi) = (rows.start as f32, rows.end as f32);
    let stride = width as usize * 4;
    let src = source.as_raw();
    let buffer: &mut [u8] = target;
    buffer[y0 as usize * stride..y1 as usize * stride]
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(i, line)| {
            let py = (y0 as usize + i) as f32 + 0.5;
            for x in x0..x1 {
                let dx = x as f32 + 0.5 - origin.x;
                let dy = py - origin.y;
                let u = (dx * cos + dy * sin) / scale;
                let v = (dy * cos - dx * sin) / scale + row;
                if u < 0.0 || u >= ow as f32 || v < v_lo || v >= v_hi {
                    continue;
                }
                let sx = (u as u32).min(ow - 1) as usize;
                let sy = (v as u32).min(rows.end - 1) as usize;
                let s = (sy * ow as usize + sx) * 4;
                let d = x as usize * 4;
                blend_over(&mut line[d..d + 4], &src[s..s + 4]);
            }
        });
}

/// Composites `stamped` onto `dest` wherever a pixel centre lies inside `quad`.
fn composite_clipped(stamped: &RgbaImage, quad: &Quad, dest: &mut RgbaImage) {
    let stride = dest.width() as usize * 4;
    let src = stamped.as_raw();
    let buffer: &mut [u8] = dest;
    buffer
        .par_chunks_mut(stride)
        .zip(src.par_chunks(stride))
        .enumerate()
        .for_each(|(y, (line, stamped_line))| {
            let py = y as f32 + 0.5;
            for (x, (d, s)) in line
                .chunks_exact_mut(4)
                .zip(stamped_line.chunks_exact(4))
                .enumerate()
            {
                if quad.contains(Point::new(x as f32 + 0.5, py)) {
                    blend_over(d, s);
                }
            }
        });
}
