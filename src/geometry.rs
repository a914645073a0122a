//! Corner points and destination quadrilaterals.

use std::ops::Index;

use crate::{WarpError, WarpResult};

/// A point in image/canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Linear interpolation towards `other`; `t = 0` gives `self`, `t = 1` gives `other`.
    pub fn lerp(self, other: Point, t: f32) -> Point {
        Point::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }

    /// Euclidean distance to `other`.
    pub fn distance(self, other: Point) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Point::new(x, y)
    }
}

impl From<Point> for (f32, f32) {
    fn from(p: Point) -> Self {
        (p.x, p.y)
    }
}

/// Four destination corners ordered `[top_left, top_right, bottom_right, bottom_left]`.
///
/// Nothing checks that the quad is convex or simple. A self-intersecting quad is
/// accepted and just produces a visually broken warp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    corners: [Point; 4],
}

impl Quad {
    pub const TOP_LEFT: usize = 0;
    pub const TOP_RIGHT: usize = 1;
    pub const BOTTOM_RIGHT: usize = 2;
    pub const BOTTOM_LEFT: usize = 3;

    pub const fn new(corners: [Point; 4]) -> Self {
        Self { corners }
    }

    /// Builds a quad from a point slice, failing with [`WarpError::InvalidQuad`]
    /// unless it holds exactly four points.
    pub fn from_points(points: &[Point]) -> WarpResult<Self> {
        let corners: [Point; 4] = points
            .try_into()
            .map_err(|_| WarpError::InvalidQuad(points.len()))?;
        Ok(Self { corners })
    }

    /// The rectangle `(0,0) (w,0) (w,h) (0,h)`, i.e. the identity mapping for a
    /// `width × height` raster.
    pub fn from_rect(width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self::new([
            Point::new(0.0, 0.0),
            Point::new(w, 0.0),
            Point::new(w, h),
            Point::new(0.0, h),
        ])
    }

    pub fn corners(&self) -> &[Point; 4] {
        &self.corners
    }

    /// Moves one corner.
    pub fn set_corner(&mut self, index: usize, point: Point) -> WarpResult<()> {
        let slot = self.corners.get_mut(index).ok_or_else(|| {
            WarpError::InvalidParameters(format!("corner index {index} out of range"))
        })?;
        *slot = point;
        Ok(())
    }

    /// Corner coordinates as tuples, in the layout `imageproc` projections expect.
    pub fn control_points(&self) -> [(f32, f32); 4] {
        self.corners.map(Into::into)
    }

    /// Smallest axis-aligned box containing all corners, as `(min, max)`.
    pub fn bounding_box(&self) -> (Point, Point) {
        self.corners.iter().fold(
            (
                Point::new(f32::INFINITY, f32::INFINITY),
                Point::new(f32::NEG_INFINITY, f32::NEG_INFINITY),
            ),
            |(min, max), p| {
                (
                    Point::new(min.x.min(p.x), min.y.min(p.y)),
                    Point::new(max.x.max(p.x), max.y.max(p.y)),
                )
            },
        )
    }

    /// Canvas size able to hold the quad when drawn from the origin.
    pub fn canvas_size(&self) -> (u32, u32) {
        let (_, max) = self.bounding_box();
        let side = |v: f32| if v.is_finite() { v.ceil().max(1.0) as u32 } else { 1 };
        (side(max.x), side(max.y))
    }

    /// Absolute polygon area (shoelace). Self-intersecting quads may report less
    /// than their visual footprint.
    pub fn area(&self) -> f32 {
        let twice: f32 = (0..4)
            .map(|i| {
                let a = self.corners[i];
                let b = self.corners[(i + 1) % 4];
                a.x * b.y - b.x * a.y
            })
            .sum();
        twice.abs() * 0.5
    }

    /// Nonzero-winding containment test, the same fill rule a canvas clip path uses.
    pub fn contains(&self, p: Point) -> bool {
        let mut winding = 0i32;
        for i in 0..4 {
            let a = self.corners[i];
            let b = self.corners[(i + 1) % 4];
            let side = (b.x - a.x) * (p.y - a.y) - (p.x - a.x) * (b.y - a.y);
            if a.y <= p.y {
                if b.y > p.y && side > 0.0 {
                    winding += 1;
                }
            } else if b.y <= p.y && side < 0.0 {
                winding -= 1;
            }
        }
        winding != 0
    }
}

impl Index<usize> for Quad {
    type Output = Point;

    fn index(&self, index: usize) -> &Point {
        &self.corners[index]
    }
}

impl AsRef<[Point]> for Quad {
    fn as_ref(&self) -> &[Point] {
        &self.corners
    }
}

impl TryFrom<&[Point]> for Quad {
    type Error = WarpError;

    fn try_from(points: &[Point]) -> WarpResult<Self> {
        Quad::from_points(points)
    }
}

impl From<[Point; 4]> for Quad {
    fn from(corners: [Point; 4]) -> Self {
        Quad::new(corners)
    }
}
