//! Line segment type.

use super::{Point, PointF};
use crate::CoordF;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A line segment between two points.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Line {
    pub a: Point,
    pub b: Point,
}

impl Line {
    #[inline]
    pub const fn new(a: Point, b: Point) -> Self {
        Self { a, b }
    }

    #[inline]
    pub fn length(&self) -> CoordF {
        self.a.distance(&self.b)
    }

    #[inline]
    pub fn direction(&self) -> Point {
        self.b - self.a
    }

    /// Unit direction in floating point (zero vector for a degenerate segment).
    #[inline]
    pub fn unit_direction(&self) -> PointF {
        PointF::from(self.direction()).normalize()
    }

    #[inline]
    pub fn midpoint(&self) -> Point {
        Point::new((self.a.x + self.b.x) / 2, (self.a.y + self.b.y) / 2)
    }

    #[inline]
    pub fn is_point(&self) -> bool {
        self.a == self.b
    }

    /// Squared distance from `p` to the closest point of the segment.
    pub fn distance_to_squared(&self, p: &Point) -> CoordF {
        let q = p.project_onto_segment(self.a, self.b);
        p.distance_squared(&q) as CoordF
    }

    /// Intersection parameters `(t, u)` of two segments, where `t` runs along
    /// `self` and `u` along `other`. `None` for parallel or disjoint segments.
    pub fn intersection_params(&self, other: &Line) -> Option<(CoordF, CoordF)> {
        let p = PointF::from(self.a);
        let r = PointF::from(self.direction());
        let q = PointF::from(other.a);
        let s = PointF::from(other.direction());
        let denom = r.cross(&s);
        if denom.abs() < 1e-9 {
            return None;
        }
        let qp = q - p;
        let t = qp.cross(&s) / denom;
        let u = qp.cross(&r) / denom;
        if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
            Some((t, u))
        } else {
            None
        }
    }

    /// Intersection point of two segments, if any.
    pub fn intersection(&self, other: &Line) -> Option<Point> {
        self.intersection_params(other)
            .map(|(t, _)| self.a.lerp(self.b, t))
    }
}

impl fmt::Debug for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line({:?} -> {:?})", self.a, self.b)
    }
}

/// A collection of line segments.
pub type Lines = Vec<Line>;
