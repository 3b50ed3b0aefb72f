//! 2D point types.
//!
//! Integer points are used for every polygon algorithm in the support
//! generator. Floating-point points are used for direction vectors and for
//! the few computations that need sub-unit precision (circle placement,
//! segment intersection parameters).

use crate::{scale, unscale, Coord, CoordF};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// A 2D point with scaled integer coordinates.
///
/// ```
/// use slicer_support::geometry::Point;
/// use slicer_support::scale;
///
/// let p = Point::new_scale(1.0, 2.0);
/// assert_eq!(p, Point::new(scale(1.0), scale(2.0)));
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    pub x: Coord,
    pub y: Coord,
}

impl Point {
    #[inline]
    pub const fn new(x: Coord, y: Coord) -> Self {
        Self { x, y }
    }

    /// Create a point from coordinates in mm.
    #[inline]
    pub fn new_scale(x: CoordF, y: CoordF) -> Self {
        Self {
            x: scale(x),
            y: scale(y),
        }
    }

    #[inline]
    pub const fn zero() -> Self {
        Self { x: 0, y: 0 }
    }

    /// Squared distance, computed in i128 so that it never overflows.
    #[inline]
    pub fn distance_squared(&self, other: &Point) -> i128 {
        let dx = (other.x - self.x) as i128;
        let dy = (other.y - self.y) as i128;
        dx * dx + dy * dy
    }

    #[inline]
    pub fn distance(&self, other: &Point) -> CoordF {
        (self.distance_squared(other) as CoordF).sqrt()
    }

    #[inline]
    pub fn length_squared(&self) -> i128 {
        (self.x as i128) * (self.x as i128) + (self.y as i128) * (self.y as i128)
    }

    #[inline]
    pub fn length(&self) -> CoordF {
        (self.length_squared() as CoordF).sqrt()
    }

    /// Rotate around the origin by an angle in radians.
    #[inline]
    pub fn rotate(&self, angle: CoordF) -> Self {
        self.rotate_by_cos_sin(angle.cos(), angle.sin())
    }

    /// Rotate by precomputed cos and sin values.
    #[inline]
    pub fn rotate_by_cos_sin(&self, cos_a: CoordF, sin_a: CoordF) -> Self {
        let x = self.x as CoordF;
        let y = self.y as CoordF;
        Self {
            x: (cos_a * x - sin_a * y).round() as Coord,
            y: (cos_a * y + sin_a * x).round() as Coord,
        }
    }

    /// 2D cross product. Positive if `other` is counter-clockwise from `self`.
    #[inline]
    pub fn cross(&self, other: &Point) -> i128 {
        (self.x as i128) * (other.y as i128) - (self.y as i128) * (other.x as i128)
    }

    #[inline]
    pub fn dot(&self, other: &Point) -> i128 {
        (self.x as i128) * (other.x as i128) + (self.y as i128) * (other.y as i128)
    }

    /// Index of the closest point in `points`.
    pub fn nearest_point_index(&self, points: &[Point]) -> Option<usize> {
        points
            .iter()
            .enumerate()
            .min_by_key(|(_, p)| self.distance_squared(p))
            .map(|(i, _)| i)
    }

    /// Closest point on segment `a`-`b`.
    pub fn project_onto_segment(&self, a: Point, b: Point) -> Point {
        let ab = b - a;
        let len_sq = ab.length_squared();
        if len_sq == 0 {
            return a;
        }
        let t = ((*self - a).dot(&ab) as CoordF / len_sq as CoordF).clamp(0.0, 1.0);
        a.lerp(b, t)
    }

    /// Point at parameter `t` along the segment from `self` to `other`.
    #[inline]
    pub fn lerp(&self, other: Point, t: CoordF) -> Point {
        Point::new(
            self.x + ((other.x - self.x) as CoordF * t).round() as Coord,
            self.y + ((other.y - self.y) as CoordF * t).round() as Coord,
        )
    }

}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point({}, {})", self.x, self.y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", unscale(self.x), unscale(self.y))
    }
}

impl Add for Point {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y)
    }
}

impl AddAssign for Point {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl Sub for Point {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

impl SubAssign for Point {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.x -= other.x;
        self.y -= other.y;
    }
}

impl Neg for Point {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl Mul<CoordF> for Point {
    type Output = Self;

    #[inline]
    fn mul(self, factor: CoordF) -> Self {
        Self::new(
            (self.x as CoordF * factor).round() as Coord,
            (self.y as CoordF * factor).round() as Coord,
        )
    }
}

impl From<(Coord, Coord)> for Point {
    #[inline]
    fn from((x, y): (Coord, Coord)) -> Self {
        Self::new(x, y)
    }
}

impl From<PointF> for Point {
    /// Rounds a point that is already expressed in scaled units.
    #[inline]
    fn from(p: PointF) -> Self {
        Self::new(p.x.round() as Coord, p.y.round() as Coord)
    }
}

/// A 2D point or vector with floating-point coordinates.
///
/// `PointF::from(Point)` keeps scaled units, used for directions and
/// normals.
#[derive(Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PointF {
    pub x: CoordF,
    pub y: CoordF,
}

impl PointF {
    #[inline]
    pub const fn new(x: CoordF, y: CoordF) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn length_squared(&self) -> CoordF {
        self.x * self.x + self.y * self.y
    }

    #[inline]
    pub fn length(&self) -> CoordF {
        self.length_squared().sqrt()
    }

    #[inline]
    pub fn distance(&self, other: &PointF) -> CoordF {
        (*other - *self).length()
    }

    /// Unit vector in the same direction, or `self` for a zero vector.
    #[inline]
    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len > 0.0 {
            Self::new(self.x / len, self.y / len)
        } else {
            *self
        }
    }

    /// Perpendicular vector (90 degrees counter-clockwise).
    #[inline]
    pub fn perp(&self) -> Self {
        Self::new(-self.y, self.x)
    }

    #[inline]
    pub fn dot(&self, other: &PointF) -> CoordF {
        self.x * other.x + self.y * other.y
    }

    #[inline]
    pub fn cross(&self, other: &PointF) -> CoordF {
        self.x * other.y - self.y * other.x
    }
}

impl fmt::Debug for PointF {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PointF({:.6}, {:.6})", self.x, self.y)
    }
}

impl Add for PointF {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for PointF {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

impl Mul<CoordF> for PointF {
    type Output = Self;

    #[inline]
    fn mul(self, factor: CoordF) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }
}

impl From<Point> for PointF {
    /// Keeps scaled units.
    #[inline]
    fn from(p: Point) -> Self {
        Self::new(p.x as CoordF, p.y as CoordF)
    }
}

/// A collection of points.
pub type Points = Vec<Point>;
