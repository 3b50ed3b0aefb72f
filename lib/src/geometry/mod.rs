//! Geometry primitives for support generation.
//!
//! - [`Point`] / [`PointF`] - integer (scaled) and floating-point 2D points
//! - [`Line`] - segment between two points
//! - [`Polygon`] - closed contour
//! - [`Polyline`] - open path
//! - [`ExPolygon`] - contour with holes
//! - [`BoundingBox`] - axis-aligned box
//!
//! ## Coordinate System
//!
//! Coordinates are scaled by `SCALING_FACTOR` (1,000,000), so 1 unit is one
//! nanometer. Use `scale()` / `unscale()` to convert from and to mm.

mod bounding_box;
mod expolygon;
mod line;
mod point;
mod polygon;
mod polyline;

pub use bounding_box::BoundingBox;
pub use expolygon::{get_extents, to_polygons, ExPolygon, ExPolygons};
pub use line::{Line, Lines};
pub use point::{Point, PointF, Points};
pub use polygon::{Polygon, Polygons};
pub use polyline::{total_length, Polyline, Polylines};
