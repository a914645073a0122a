//! Draggable-corner free transform.
//!
//! [`FreeTransform`] owns the loaded source, the current [`Quad`], the rendered
//! canvas and the drag state. Warps happen only in response to explicit events:
//! an image load, a corner move, or an explicit [`FreeTransform::render`].

use std::time::{Duration, Instant};

use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::{
    drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut},
    geometric_transformations::Interpolation,
};

use crate::{
    dispatch::MoveCoalescer,
    geometry::{Point, Quad},
    raster::{decode_source, Flip},
    strip::{StripWarp, StripWarpOptions},
    vision::perspective_warp,
    WarpError, WarpResult,
};

/// Default per-axis pick distance for corner handles, in pixels.
pub const HANDLE_TOLERANCE: f32 = 20.0;

/// Drag state of the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    /// Corner index being dragged.
    Dragging(usize),
}

/// Pointer input in canvas-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down(Point),
    Move(Point),
    Up,
    Leave,
}

/// Engine used to redraw the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WarpMethod {
    #[default]
    Strip,
    Homography,
}

/// Look of the handles and guide outline drawn by [`FreeTransform::render_overlay`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub handle_radius: i32,
    pub handle_fill: Rgba<u8>,
    pub handle_stroke: Rgba<u8>,
    pub guide: Rgba<u8>,
    /// Dash on/off lengths of the guide outline.
    pub dash: (f32, f32),
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            handle_radius: 5,
            handle_fill: Rgba([255, 255, 255, 255]),
            handle_stroke: Rgba([0, 0, 255, 255]),
            guide: Rgba([0, 0, 255, 255]),
            dash: (10.0, 5.0),
        }
    }
}

/// Settings of a [`FreeTransform`].
#[derive(Debug, Clone, Copy)]
pub struct OverlayConfig {
    pub handle_tolerance: f32,
    pub method: WarpMethod,
    pub strip: StripWarpOptions,
    /// Sampling used by [`WarpMethod::Homography`].
    pub interpolation: Interpolation,
    /// Mirroring applied to every loaded image.
    pub flip: Flip,
    /// Moves closer together than this are coalesced by [`FreeTransform::dispatch`].
    pub coalesce_window: Duration,
    pub style: OverlayStyle,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            handle_tolerance: HANDLE_TOLERANCE,
            method: WarpMethod::Strip,
            strip: StripWarpOptions::default(),
            interpolation: Interpolation::Bilinear,
            flip: Flip::default(),
            coalesce_window: Duration::ZERO,
            style: OverlayStyle::default(),
        }
    }
}

/// Interactive free-transform controller.
///
/// # Examples
///
/// ```rust,no_run
/// use strip_warp::{FreeTransform, OverlayConfig, Point, PointerEvent};
///
/// let mut transform = FreeTransform::new(OverlayConfig::default());
/// transform.load(image::open("input.png").unwrap()).unwrap();
///
/// // Grab the bottom-right handle and pull it inwards.
/// let (w, h) = transform.source().unwrap().dimensions();
/// transform.handle(PointerEvent::Down(Point::new(w as f32, h as f32))).unwrap();
/// transform.handle(PointerEvent::Move(Point::new(w as f32 * 0.8, h as f32 * 0.9))).unwrap();
/// transform.handle(PointerEvent::Up).unwrap();
///
/// transform.render_overlay().unwrap().save("overlay.png").unwrap();
/// ```
#[derive(Debug)]
pub struct FreeTransform {
    config: OverlayConfig,
    engine: StripWarp,
    source: Option<RgbaImage>,
    quad: Option<Quad>,
    canvas: Option<RgbaImage>,
    state: DragState,
    coalescer: MoveCoalescer,
}

impl FreeTransform {
    pub fn new(config: OverlayConfig) -> Self {
        Self {
            engine: StripWarp::new(config.strip),
            coalescer: MoveCoalescer::new(config.coalesce_window),
            config,
            source: None,
            quad: None,
            canvas: None,
            state: DragState::Idle,
        }
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn source(&self) -> Option<&RgbaImage> {
        self.source.as_ref()
    }

    pub fn quad(&self) -> Option<&Quad> {
        self.quad.as_ref()
    }

    /// Last successfully rendered warp.
    pub fn canvas(&self) -> Option<&RgbaImage> {
        self.canvas.as_ref()
    }

    /// Loads a decoded image, replacing any previous one.
    pub fn load(&mut self, image: DynamicImage) -> WarpResult<()> {
        self.load_rgba(image.into_rgba8())
    }

    /// Decodes and loads encoded image bytes. On failure the current image, quad
    /// and canvas are kept.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> WarpResult<()> {
        let source = decode_source(bytes)?;
        self.load_rgba(source)
    }

    /// Loads an RGBA source. The quad starts as the image rectangle.
    ///
    /// The configured [`Flip`] is applied first. The new image replaces the
    /// current one only once its first render succeeded, and a successful load
    /// also ends any drag in progress.
    ///
    /// # Errors
    ///
    /// * [`WarpError::ResourceUnavailable`] for an empty image or a canvas that
    ///   cannot be allocated
    /// * any error of the configured [`WarpMethod`]
    pub fn load_rgba(&mut self, mut source: RgbaImage) -> WarpResult<()> {
        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            return Err(WarpError::ResourceUnavailable(format!(
                "cannot load an empty {width}x{height} image"
            )));
        }
        self.config.flip.apply(&mut source);
        let quad = Quad::from_rect(width, height);
        let canvas = self.render_with(&source, &quad)?;
        debug!("loaded {}x{} source", width, height);

        self.source = Some(source);
        self.quad = Some(quad);
        self.canvas = Some(canvas);
        self.state = DragState::Idle;
        self.coalescer.reset();
        Ok(())
    }

    /// Drops the loaded image and everything derived from it.
    pub fn unload(&mut self) {
        self.source = None;
        self.quad = None;
        self.canvas = None;
        self.state = DragState::Idle;
        self.coalescer.reset();
    }

    /// Re-renders the canvas from the current source and quad.
    ///
    /// The canvas is rebuilt from a clean buffer; if the warp fails the previous
    /// canvas is kept.
    pub fn render(&mut self) -> WarpResult<()> {
        let (Some(source), Some(quad)) = (self.source.as_ref(), self.quad.as_ref()) else {
            return Ok(());
        };
        let canvas = self.render_with(source, quad)?;
        self.canvas = Some(canvas);
        Ok(())
    }

    fn render_with(&self, source: &RgbaImage, quad: &Quad) -> WarpResult<RgbaImage> {
        let (width, height) = quad.canvas_size();
        match self.config.method {
            WarpMethod::Strip => self.engine.warp(source, quad, width, height),
            WarpMethod::Homography => {
                perspective_warp(source, quad, width, height, self.config.interpolation)
            }
        }
    }

    /// Moves corner `index` to `point` and re-renders.
    ///
    /// # Arguments
    ///
    /// * `index` - Corner index, see [`Quad::TOP_LEFT`] and friends
    /// * `point` - New corner position in canvas coordinates
    ///
    /// # Errors
    ///
    /// Returns the render error if the moved quad cannot be drawn, e.g.
    /// [`WarpError::ResourceUnavailable`] when its canvas would be too large. The
    /// quad and canvas then stay as they were, so the overlay keeps showing the
    /// last corner position that rendered.
    pub fn set_corner(&mut self, index: usize, point: Point) -> WarpResult<()> {
        let (Some(source), Some(quad)) = (self.source.as_ref(), self.quad.as_ref()) else {
            return Ok(());
        };
        let mut moved = *quad;
        moved.set_corner(index, point)?;
        let canvas = self.render_with(source, &moved)?;
        self.quad = Some(moved);
        self.canvas = Some(canvas);
        Ok(())
    }

    /// Restores the identity quad for the loaded image.
    pub fn reset_quad(&mut self) -> WarpResult<()> {
        let Some(source) = self.source.as_ref() else {
            return Ok(());
        };
        let quad = Quad::from_rect(source.width(), source.height());
        let canvas = self.render_with(source, &quad)?;
        self.quad = Some(quad);
        self.canvas = Some(canvas);
        Ok(())
    }

    /// Index of the handle within the per-axis tolerance of `p`, nearest first.
    pub fn hit_test(&self, p: Point) -> Option<usize> {
        let tolerance = self.config.handle_tolerance;
        self.quad?
            .corners()
            .iter()
            .enumerate()
            .filter(|(_, c)| (p.x - c.x).abs() < tolerance && (p.y - c.y).abs() < tolerance)
            .min_by(|(_, a), (_, b)| a.distance(p).total_cmp(&b.distance(p)))
            .map(|(i, _)| i)
    }

    /// Applies one pointer event immediately.
    ///
    /// A move while dragging performs exactly one warp. Events before an image is
    /// loaded are ignored.
    ///
    /// # Arguments
    ///
    /// * `event` - Pointer input in canvas-local coordinates
    ///
    /// # Returns
    ///
    /// `true` if the canvas was redrawn, `false` for events that only change the
    /// drag state or are ignored.
    ///
    /// # Errors
    ///
    /// Propagates the error of [`set_corner`](Self::set_corner) for a failed
    /// move. The drag stays active, so the next move can still succeed.
    pub fn handle(&mut self, event: PointerEvent) -> WarpResult<bool> {
        match (event, self.state) {
            (PointerEvent::Down(p), _) => {
                self.state = match self.hit_test(p) {
                    Some(index) => {
                        debug!("grab corner {}", index);
                        DragState::Dragging(index)
                    }
                    None => DragState::Idle,
                };
                Ok(false)
            }
            (PointerEvent::Move(p), DragState::Dragging(index)) => {
                self.set_corner(index, p)?;
                Ok(self.canvas.is_some())
            }
            (PointerEvent::Move(_), DragState::Idle) => Ok(false),
            (PointerEvent::Up | PointerEvent::Leave, _) => {
                self.state = DragState::Idle;
                Ok(false)
            }
        }
    }

    /// Applies an event observed at `at` through the move-coalescing policy.
    ///
    /// Moves within the configured window of the last applied move are held, and
    /// only the newest is kept. A held move is applied when the drag ends.
    pub fn dispatch(&mut self, event: PointerEvent, at: Instant) -> WarpResult<bool> {
        match event {
            PointerEvent::Move(p) => {
                if !matches!(self.state, DragState::Dragging(_)) {
                    return Ok(false);
                }
                match self.coalescer.offer(at, p) {
                    Some(p) => self.handle(PointerEvent::Move(p)),
                    None => Ok(false),
                }
            }
            PointerEvent::Up | PointerEvent::Leave => {
                let redrawn = match self.coalescer.flush() {
                    Some(p) => self.handle(PointerEvent::Move(p))?,
                    None => false,
                };
                self.coalescer.reset();
                self.handle(event)?;
                Ok(redrawn)
            }
            PointerEvent::Down(_) => {
                self.coalescer.reset();
                self.handle(event)
            }
        }
    }

    /// The canvas with a dashed guide outline and the corner handles on top.
    pub fn render_overlay(&self) -> Option<RgbaImage> {
        let mut out = self.canvas.clone()?;
        let quad = self.quad?;
        let style = &self.config.style;
        let corners = quad.corners();

        for i in 0..4 {
            draw_dashed_segment(&mut out, corners[i], corners[(i + 1) % 4], style);
        }
        for c in corners {
            let center = (c.x.round() as i32, c.y.round() as i32);
            draw_filled_circle_mut(&mut out, center, style.handle_radius, style.handle_fill);
            draw_hollow_circle_mut(&mut out, center, style.handle_radius, style.handle_stroke);
        }
        Some(out)
    }
}

/// Draws `a`–`b` in `style.dash` dashes, phase anchored at `a`.
///
/// Only the part of the segment that can touch `canvas` is walked. Positions are
/// tracked in `f64` so corners far off the canvas keep their dash phase.
fn draw_dashed_segment(canvas: &mut RgbaImage, a: Point, b: Point, style: &OverlayStyle) {
    let (on, off) = (style.dash.0 as f64, style.dash.1 as f64);
    let period = on + off.max(0.0);
    if !(on > 0.0 && period.is_finite()) {
        return;
    }
    let (ax, ay) = (a.x as f64, a.y as f64);
    let (dx, dy) = (b.x as f64 - ax, b.y as f64 - ay);
    let length = dx.hypot(dy);
    if !(length > 0.0 && length.is_finite()) {
        return;
    }
    let bounds = (canvas.width() as f64, canvas.height() as f64);
    let Some((s0, s1)) = visible_span((ax, ay), (dx, dy), bounds) else {
        return;
    };

    let at = |t: f64| {
        let s = t / length;
        ((ax + dx * s) as f32, (ay + dy * s) as f32)
    };
    let (t0, t1) = (s0 * length, s1 * length);
    let first = (t0 / period).floor() as u64;
    let last = (t1 / period).ceil() as u64;
    for k in first..last {
        let t = k as f64 * period;
        let (from, to) = (t.max(t0), (t + on).min(t1));
        if from < to {
            draw_line_segment_mut(canvas, at(from), at(to), style.guide);
        }
    }
}

/// Parameter range `[s0, s1]` within `[0, 1]` of `origin + s * delta` that lies
/// inside `bounds` grown by one pixel (Liang–Barsky).
fn visible_span(
    origin: (f64, f64),
    delta: (f64, f64),
    bounds: (f64, f64),
) -> Option<(f64, f64)> {
    let ((x, y), (dx, dy), (width, height)) = (origin, delta, bounds);
    let (mut s0, mut s1) = (0.0f64, 1.0f64);
    for (p, q) in [
        (-dx, x + 1.0),
        (dx, width + 1.0 - x),
        (-dy, y + 1.0),
        (dy, height + 1.0 - y),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else if p < 0.0 {
            s0 = s0.max(q / p);
        } else {
            s1 = s1.min(q / p);
        }
    }
    (s0 < s1).then_some((s0, s1))
}
