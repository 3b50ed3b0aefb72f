//! Polygon boolean and offset operations.
//!
//! Closed-region operations (union, intersection, difference, offsets and
//! the morphological closing/opening built on them) go through the
//! geo-clipper library. Coordinates are handed to Clipper in scaled units
//! with a factor of 1.0, so results land exactly on the integer grid.
//!
//! Open-path clipping (`intersection_pl`, `diff_pl`) is done natively with
//! parametric segment intersection: split points are computed once per
//! segment/edge pair, which keeps the inside and outside pieces of a path
//! sharing bit-identical endpoints. Loop stitching and fragment re-chaining
//! rely on that.

use crate::geometry::{BoundingBox, ExPolygon, ExPolygons, Line, Point, Polygon, Polyline, Polylines};
use crate::{scaled, Coord, CoordF, SCALED_EPSILON};
use geo::{Coord as GeoCoord, LineString, MultiPolygon, Polygon as GeoPolygon};
use geo_clipper::{Clipper, EndType, JoinType};

/// Clipper works directly on scaled integer coordinates.
const CLIPPER_FACTOR: f64 = 1.0;

/// Arc tolerance for round joins (mm).
const ARC_TOLERANCE: CoordF = 0.005;

/// Miter limit, relative to the offset distance.
const MITER_LIMIT: CoordF = 3.0;

/// Join type for offset corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetJoinType {
    /// Square corners. Used for support surfaces.
    Square,
    /// Round corners.
    #[default]
    Round,
    /// Mitered corners.
    Miter,
}

impl From<OffsetJoinType> for JoinType {
    fn from(jt: OffsetJoinType) -> Self {
        match jt {
            OffsetJoinType::Square => JoinType::Square,
            OffsetJoinType::Round => JoinType::Round(scaled(ARC_TOLERANCE)),
            OffsetJoinType::Miter => JoinType::Miter(MITER_LIMIT),
        }
    }
}

fn ring_to_geo(poly: &Polygon, counter_clockwise: bool) -> LineString<f64> {
    let mut coords: Vec<GeoCoord<f64>> = poly
        .points()
        .iter()
        .map(|p| GeoCoord {
            x: p.x as f64,
            y: p.y as f64,
        })
        .collect();
    if poly.is_counter_clockwise() != counter_clockwise {
        coords.reverse();
    }
    if let Some(&first) = coords.first() {
        coords.push(first);
    }
    LineString::new(coords)
}

/// Contours are forced counter-clockwise and holes clockwise, as Clipper
/// fills with the non-zero rule.
fn expolygon_to_geo(expoly: &ExPolygon) -> GeoPolygon<f64> {
    GeoPolygon::new(
        ring_to_geo(&expoly.contour, true),
        expoly.holes.iter().map(|h| ring_to_geo(h, false)).collect(),
    )
}

fn geo_to_ring(ring: &LineString<f64>) -> Polygon {
    let mut points: Vec<Point> = ring
        .coords()
        .map(|c| Point::new(c.x.round() as Coord, c.y.round() as Coord))
        .collect();
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    Polygon::from_points(points)
}

fn geo_to_expolygon(geo_poly: &GeoPolygon<f64>) -> ExPolygon {
    let mut contour = geo_to_ring(geo_poly.exterior());
    contour.make_counter_clockwise();
    let holes = geo_poly
        .interiors()
        .iter()
        .map(|ring| {
            let mut hole = geo_to_ring(ring);
            hole.make_clockwise();
            hole
        })
        .filter(|h| h.len() >= 3)
        .collect();
    ExPolygon::with_holes(contour, holes)
}

fn to_geo(expolys: &[ExPolygon]) -> MultiPolygon<f64> {
    MultiPolygon::new(
        expolys
            .iter()
            .filter(|e| e.contour.len() >= 3)
            .map(expolygon_to_geo)
            .collect(),
    )
}

fn from_geo(multi: &MultiPolygon<f64>) -> ExPolygons {
    multi
        .0
        .iter()
        .map(geo_to_expolygon)
        .filter(|e| e.contour.len() >= 3 && e.area() > 0.0)
        .collect()
}

// ============================================================================
// Boolean Operations
// ============================================================================

/// Union of two sets of polygons.
pub fn union(subject: &[ExPolygon], clip: &[ExPolygon]) -> ExPolygons {
    if subject.is_empty() {
        return union_ex(clip);
    }
    if clip.is_empty() {
        return union_ex(subject);
    }
    from_geo(&to_geo(subject).union(&to_geo(clip), CLIPPER_FACTOR))
}

/// Union of a single set of potentially overlapping polygons.
pub fn union_ex(polygons: &[ExPolygon]) -> ExPolygons {
    if polygons.is_empty() {
        return Vec::new();
    }
    from_geo(&to_geo(polygons).union(&MultiPolygon::new(Vec::new()), CLIPPER_FACTOR))
}

/// Union with a tiny positive offset that closes numerical gaps between
/// touching polygons, followed by the inverse offset.
pub fn union_safety_offset_ex(polygons: &[ExPolygon]) -> ExPolygons {
    let eps = crate::unscale(SCALED_EPSILON);
    offset_ex(&offset_ex(polygons, eps, OffsetJoinType::Miter), -eps, OffsetJoinType::Miter)
}

/// Intersection of two sets of polygons.
pub fn intersection(subject: &[ExPolygon], clip: &[ExPolygon]) -> ExPolygons {
    if subject.is_empty() || clip.is_empty() {
        return Vec::new();
    }
    from_geo(&to_geo(subject).intersection(&to_geo(clip), CLIPPER_FACTOR))
}

/// Difference `subject - clip`.
pub fn diff(subject: &[ExPolygon], clip: &[ExPolygon]) -> ExPolygons {
    if subject.is_empty() {
        return Vec::new();
    }
    if clip.is_empty() {
        return union_ex(subject);
    }
    from_geo(&to_geo(subject).difference(&to_geo(clip), CLIPPER_FACTOR))
}

/// Difference where the clip set is first grown by a safety offset, so that
/// slivers along shared boundaries do not survive.
pub fn diff_with_safety_offset(subject: &[ExPolygon], clip: &[ExPolygon]) -> ExPolygons {
    let eps = crate::unscale(SCALED_EPSILON);
    diff(subject, &offset_ex(clip, eps, OffsetJoinType::Miter))
}

// ============================================================================
// Offset Operations
// ============================================================================

/// Offset a set of ExPolygons by `delta` mm. Positive grows, negative shrinks.
/// Overlapping results are merged.
pub fn offset_ex(expolygons: &[ExPolygon], delta: CoordF, join_type: OffsetJoinType) -> ExPolygons {
    if expolygons.is_empty() {
        return Vec::new();
    }
    if delta == 0.0 {
        return union_ex(expolygons);
    }
    let result = to_geo(expolygons).offset(
        scaled(delta),
        join_type.into(),
        EndType::ClosedPolygon,
        CLIPPER_FACTOR,
    );
    from_geo(&result)
}

/// Offset bare polygons (each treated as a hole-free contour) by `delta` mm.
pub fn offset_polygons(polygons: &[Polygon], delta: CoordF, join_type: OffsetJoinType) -> ExPolygons {
    let expolys: ExPolygons = polygons.iter().cloned().map(ExPolygon::new).collect();
    offset_ex(&expolys, delta, join_type)
}

/// Two successive offsets.
pub fn offset2_ex(
    expolygons: &[ExPolygon],
    delta1: CoordF,
    delta2: CoordF,
    join_type: OffsetJoinType,
) -> ExPolygons {
    offset_ex(&offset_ex(expolygons, delta1, join_type), delta2, join_type)
}

/// Morphological closing: grow by `grow`, then shrink by `shrink`.
/// Fills gaps and notches narrower than twice the distance.
pub fn closing_ex(
    expolygons: &[ExPolygon],
    grow: CoordF,
    shrink: CoordF,
    join_type: OffsetJoinType,
) -> ExPolygons {
    offset2_ex(expolygons, grow.abs(), -shrink.abs(), join_type)
}

/// Morphological opening: shrink by `shrink`, then grow by `grow`.
/// Removes features narrower than twice the distance.
pub fn opening_ex(
    expolygons: &[ExPolygon],
    shrink: CoordF,
    grow: CoordF,
    join_type: OffsetJoinType,
) -> ExPolygons {
    offset2_ex(expolygons, -shrink.abs(), grow.abs(), join_type)
}

/// Cut every reflex corner (with material on the left of the traversal)
/// by up to `clip_dist` mm along both adjacent edges. The result only ever
/// adds material, so it smooths concave jaggies outward.
pub fn smooth_outward(expolygons: &[ExPolygon], clip_dist: CoordF) -> ExPolygons {
    let clip = scaled(clip_dist);
    let smooth = |poly: &Polygon| -> Polygon {
        let n = poly.len();
        if n < 3 {
            return poly.clone();
        }
        let mut out = Vec::with_capacity(n * 2);
        for i in 0..n {
            let prev = poly.point_at(i + n - 1);
            let cur = poly[i];
            let next = poly.point_at(i + 1);
            let turn = (cur - prev).cross(&(next - cur));
            if turn < 0 {
                let d_prev = clip.min(0.5 * prev.distance(&cur));
                let d_next = clip.min(0.5 * cur.distance(&next));
                out.push(cur.lerp(prev, d_prev / prev.distance(&cur).max(1.0)));
                out.push(cur.lerp(next, d_next / cur.distance(&next).max(1.0)));
            } else {
                out.push(cur);
            }
        }
        out.dedup();
        Polygon::from_points(out)
    };
    let smoothed: ExPolygons = expolygons
        .iter()
        .map(|e| ExPolygon::with_holes(smooth(&e.contour), e.holes.iter().map(smooth).collect()))
        .collect();
    union(&smoothed, expolygons)
}

/// Thicken open polylines into regions of half-width `half_width` mm with
/// butt ends. Each segment becomes a rectangle; the rectangles are unioned.
pub fn offset_polylines(polylines: &[Polyline], half_width: CoordF) -> ExPolygons {
    let w = scaled(half_width);
    let mut rects: ExPolygons = Vec::new();
    for polyline in polylines {
        for line in polyline.lines() {
            if line.is_point() {
                continue;
            }
            let n = line.unit_direction().perp() * w;
            let n = Point::from(n);
            let mut rect = Polygon::from_points(vec![line.a - n, line.b - n, line.b + n, line.a + n]);
            rect.make_counter_clockwise();
            rects.push(ExPolygon::new(rect));
        }
    }
    union_ex(&rects)
}

// ============================================================================
// Open-path clipping
// ============================================================================

struct EdgeIndex {
    edges: Vec<(Line, BoundingBox)>,
}

impl EdgeIndex {
    fn new(clip: &[ExPolygon]) -> Self {
        let edges = clip
            .iter()
            .flat_map(ExPolygon::lines)
            .map(|l| (l, BoundingBox::from_points(&[l.a, l.b])))
            .collect();
        Self { edges }
    }

    /// Sorted parameters in [0, 1] where `segment` crosses a clip edge,
    /// including both endpoints.
    fn split_params(&self, segment: &Line) -> Vec<CoordF> {
        let bbox = BoundingBox::from_points(&[segment.a, segment.b]);
        let mut ts = vec![0.0, 1.0];
        for (edge, edge_bbox) in &self.edges {
            if !bbox.intersects(edge_bbox) {
                continue;
            }
            if let Some((t, _)) = segment.intersection_params(edge) {
                ts.push(t);
            }
        }
        ts.sort_by(|a, b| a.total_cmp(b));
        ts.dedup_by(|a, b| (*a - *b).abs() < 1e-12);
        ts
    }
}

/// Point-in-region test against a set of ExPolygons.
pub fn contains_point(expolygons: &[ExPolygon], p: &Point) -> bool {
    expolygons
        .iter()
        .any(|e| e.bounding_box().contains_point(p) && e.contains_point(p))
}

fn clip_polylines(polylines: &[Polyline], clip: &[ExPolygon], keep_inside: bool) -> Polylines {
    let index = EdgeIndex::new(clip);
    let mut out = Vec::new();
    for polyline in polylines {
        let mut current: Option<Polyline> = None;
        for segment in polyline.lines() {
            if segment.is_point() {
                continue;
            }
            let ts = index.split_params(&segment);
            for w in ts.windows(2) {
                let (t0, t1) = (w[0], w[1]);
                let p0 = segment.a.lerp(segment.b, t0);
                let p1 = segment.a.lerp(segment.b, t1);
                if p0 == p1 {
                    continue;
                }
                let mid = segment.a.lerp(segment.b, 0.5 * (t0 + t1));
                if contains_point(clip, &mid) == keep_inside {
                    match current.as_mut() {
                        Some(cur) if cur.last_point() == p0 => cur.push(p1),
                        _ => {
                            if let Some(done) = current.take() {
                                out.push(done);
                            }
                            current = Some(Polyline::from_points(vec![p0, p1]));
                        }
                    }
                } else if let Some(done) = current.take() {
                    out.push(done);
                }
            }
        }
        if let Some(done) = current.take() {
            out.push(done);
        }
    }
    out
}

/// Parts of the polylines inside the clip region.
pub fn intersection_pl(polylines: &[Polyline], clip: &[ExPolygon]) -> Polylines {
    if polylines.is_empty() || clip.is_empty() {
        return Vec::new();
    }
    clip_polylines(polylines, clip, true)
}

/// Parts of the polylines outside the clip region.
pub fn diff_pl(polylines: &[Polyline], clip: &[ExPolygon]) -> Polylines {
    if clip.is_empty() {
        return polylines.iter().filter(|p| p.is_valid()).cloned().collect();
    }
    clip_polylines(polylines, clip, false)
}

// ============================================================================
// Utility Functions
// ============================================================================

/// Total area in scaled units squared.
pub fn total_area(expolygons: &[ExPolygon]) -> CoordF {
    expolygons.iter().map(ExPolygon::area).sum()
}

/// Total area in mm².
pub fn total_area_mm2(expolygons: &[ExPolygon]) -> CoordF {
    total_area(expolygons) / (crate::SCALING_FACTOR * crate::SCALING_FACTOR)
}

/// Whether two sets of polygons overlap with a non-zero area.
pub fn polygons_overlap(a: &[ExPolygon], b: &[ExPolygon]) -> bool {
    !intersection(a, b).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale;

    fn square_mm(x: f64, y: f64, size: f64) -> ExPolygon {
        ExPolygon::rectangle(Point::new_scale(x, y), Point::new_scale(x + size, y + size))
    }

    fn polyline_mm(points: &[(f64, f64)]) -> Polyline {
        points.iter().map(|&(x, y)| Point::new_scale(x, y)).collect()
    }

    #[test]
    fn test_offset_grow_square_join() {
        let grown = offset_ex(&[square_mm(0.0, 0.0, 10.0)], 1.0, OffsetJoinType::Square);
        assert_eq!(grown.len(), 1);
        // Square joins cut the corners slightly, so the area is just below 12x12.
        let area = total_area_mm2(&grown);
        assert!(area > 140.0 && area <= 144.0 + 1e-6, "area = {}", area);
    }

    #[test]
    fn test_offset_shrink_to_nothing() {
        let shrunk = offset_ex(&[square_mm(0.0, 0.0, 2.0)], -1.5, OffsetJoinType::Miter);
        assert!(shrunk.is_empty());
    }

    #[test]
    fn test_union_overlapping() {
        let result = union(&[square_mm(0.0, 0.0, 10.0)], &[square_mm(5.0, 0.0, 10.0)]);
        assert_eq!(result.len(), 1);
        assert!((total_area_mm2(&result) - 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_union_ex_merges_single_set() {
        let result = union_ex(&[square_mm(0.0, 0.0, 10.0), square_mm(5.0, 5.0, 10.0)]);
        assert_eq!(result.len(), 1);
        assert!((total_area_mm2(&result) - 175.0).abs() < 1e-6);
    }

    #[test]
    fn test_intersection_and_diff() {
        let a = [square_mm(0.0, 0.0, 10.0)];
        let b = [square_mm(5.0, 0.0, 10.0)];
        assert!((total_area_mm2(&intersection(&a, &b)) - 50.0).abs() < 1e-6);
        assert!((total_area_mm2(&diff(&a, &b)) - 50.0).abs() < 1e-6);
        assert!(intersection(&a, &[square_mm(20.0, 0.0, 1.0)]).is_empty());
    }

    #[test]
    fn test_diff_creates_hole() {
        let result = diff(&[square_mm(0.0, 0.0, 10.0)], &[square_mm(4.0, 4.0, 2.0)]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].holes.len(), 1);
        assert!((total_area_mm2(&result) - 96.0).abs() < 1e-6);
    }

    #[test]
    fn test_closing_fills_narrow_gap() {
        let a = square_mm(0.0, 0.0, 10.0);
        let b = square_mm(10.2, 0.0, 10.0);
        let closed = closing_ex(&[a, b], 0.5, 0.5, OffsetJoinType::Miter);
        assert_eq!(closed.len(), 1);
    }

    #[test]
    fn test_opening_removes_thin_strip() {
        let thin = ExPolygon::rectangle(Point::new_scale(0.0, 0.0), Point::new_scale(10.0, 0.3));
        assert!(opening_ex(&[thin], 0.5, 0.5, OffsetJoinType::Miter).is_empty());
    }

    #[test]
    fn test_smooth_outward_never_removes_material() {
        // L-shape with a reflex corner.
        let l_shape = ExPolygon::new(Polygon::from_points(vec![
            Point::new_scale(0.0, 0.0),
            Point::new_scale(10.0, 0.0),
            Point::new_scale(10.0, 5.0),
            Point::new_scale(5.0, 5.0),
            Point::new_scale(5.0, 10.0),
            Point::new_scale(0.0, 10.0),
        ]));
        let smoothed = smooth_outward(&[l_shape.clone()], 1.0);
        let before = total_area_mm2(&[l_shape.clone()]);
        let after = total_area_mm2(&smoothed);
        assert!(after > before);
        assert!(diff(&[l_shape], &smoothed).is_empty());
    }

    #[test]
    fn test_offset_polylines_thickens() {
        let line = polyline_mm(&[(0.0, 0.0), (10.0, 0.0)]);
        let thick = offset_polylines(&[line], 0.5);
        assert_eq!(thick.len(), 1);
        assert!((total_area_mm2(&thick) - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_intersection_pl_splits_at_boundary() {
        let clip = [square_mm(0.0, 0.0, 10.0)];
        let line = polyline_mm(&[(-5.0, 5.0), (15.0, 5.0)]);
        let inside = intersection_pl(&[line.clone()], &clip);
        assert_eq!(inside.len(), 1);
        assert_eq!(inside[0].first_point(), Point::new_scale(0.0, 5.0));
        assert_eq!(inside[0].last_point(), Point::new_scale(10.0, 5.0));

        let outside = diff_pl(&[line], &clip);
        assert_eq!(outside.len(), 2);
        assert_eq!(outside[0].last_point(), inside[0].first_point());
        assert_eq!(outside[1].first_point(), inside[0].last_point());
    }

    #[test]
    fn test_intersection_pl_keeps_polyline_joints() {
        let clip = [square_mm(0.0, 0.0, 10.0)];
        let path = polyline_mm(&[(1.0, 1.0), (5.0, 1.0), (5.0, 5.0), (1.0, 5.0)]);
        let inside = intersection_pl(&[path.clone()], &clip);
        assert_eq!(inside.len(), 1);
        assert_eq!(inside[0], path);
        assert!(diff_pl(&[path], &clip).is_empty());
    }

    #[test]
    fn test_diff_pl_with_hole() {
        let ring = diff(&[square_mm(0.0, 0.0, 10.0)], &[square_mm(4.0, 4.0, 2.0)]);
        let line = polyline_mm(&[(0.5, 5.0), (9.5, 5.0)]);
        let inside = intersection_pl(&[line], &ring);
        assert_eq!(inside.len(), 2);
        let total: CoordF = inside.iter().map(Polyline::length).sum();
        assert!((total - scale(7.0) as CoordF).abs() < 2.0);
    }
}
