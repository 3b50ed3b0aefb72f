//! ExPolygon type for polygons with holes.
//!
//! Every region handled by the support generator (contacts, interfaces,
//! base layers, raft footprints) is a set of ExPolygons.

use super::{BoundingBox, Line, Point, Polygon, Polyline};
use crate::{Coord, CoordF};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A polygon with holes. The contour is counter-clockwise, holes are
/// clockwise once the ExPolygon has been through a boolean operation.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExPolygon {
    pub contour: Polygon,
    pub holes: Vec<Polygon>,
}

impl ExPolygon {
    #[inline]
    pub fn new(contour: Polygon) -> Self {
        Self {
            contour,
            holes: Vec::new(),
        }
    }

    #[inline]
    pub fn with_holes(contour: Polygon, holes: Vec<Polygon>) -> Self {
        Self { contour, holes }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.contour.is_empty()
    }

    /// Contour area minus hole areas, in scaled units squared.
    pub fn area(&self) -> CoordF {
        self.contour.area() - self.holes.iter().map(Polygon::area).sum::<CoordF>()
    }

    #[inline]
    pub fn bounding_box(&self) -> BoundingBox {
        self.contour.bounding_box()
    }

    /// Inside the contour and outside every hole.
    pub fn contains_point(&self, p: &Point) -> bool {
        self.contour.contains_point(p) && !self.holes.iter().any(|h| h.contains_point(p))
    }

    /// Boundary edges of the contour and all holes.
    pub fn lines(&self) -> Vec<Line> {
        let mut lines = self.contour.lines();
        for hole in &self.holes {
            lines.extend(hole.lines());
        }
        lines
    }

    /// Contour and holes as polygons.
    pub fn to_polygons(&self) -> Vec<Polygon> {
        let mut result = Vec::with_capacity(1 + self.holes.len());
        result.push(self.contour.clone());
        result.extend(self.holes.iter().cloned());
        result
    }

    /// Contour and holes as closed polylines.
    pub fn to_polylines(&self) -> Vec<Polyline> {
        let mut result = Vec::with_capacity(1 + self.holes.len());
        result.push(self.contour.split_at_first_point());
        result.extend(self.holes.iter().map(Polygon::split_at_first_point));
        result
    }

    pub fn translate(&mut self, v: Point) {
        self.contour.translate(v);
        for hole in &mut self.holes {
            hole.translate(v);
        }
    }

    pub fn rotate(&mut self, angle: CoordF) {
        self.contour.rotate(angle);
        for hole in &mut self.holes {
            hole.rotate(angle);
        }
    }

    pub fn rectangle(min: Point, max: Point) -> Self {
        Self::new(Polygon::rectangle(min, max))
    }

    pub fn square(center: Point, half_size: Coord) -> Self {
        Self::new(Polygon::square(center, half_size))
    }

    /// Total vertex count.
    pub fn point_count(&self) -> usize {
        self.contour.len() + self.holes.iter().map(|h| h.len()).sum::<usize>()
    }
}

impl fmt::Debug for ExPolygon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ExPolygon(contour: {} points, {} holes)",
            self.contour.len(),
            self.holes.len()
        )
    }
}

impl From<Polygon> for ExPolygon {
    fn from(polygon: Polygon) -> Self {
        Self::new(polygon)
    }
}

/// A collection of ExPolygons.
pub type ExPolygons = Vec<ExPolygon>;

/// Flatten ExPolygons into contours and holes.
pub fn to_polygons(expolygons: &[ExPolygon]) -> Vec<Polygon> {
    expolygons.iter().flat_map(ExPolygon::to_polygons).collect()
}

/// Bounding box of a set of ExPolygons.
pub fn get_extents(expolygons: &[ExPolygon]) -> BoundingBox {
    let mut bbox = BoundingBox::new();
    for expoly in expolygons {
        bbox.merge(&expoly.bounding_box());
    }
    bbox
}
