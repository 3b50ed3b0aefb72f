//! Contact loops under overhangs.
//!
//! Instead of a zig-zag, the outline of a top contact facing an overhang is
//! printed as a loop. The loop detours around small hexagonal holes
//! spaced along it, and only the parts running under the overhang are kept.

use super::bridges::SUPPORT_MATERIAL_MARGIN;
use super::toolpaths::SupportGeneratorLayerExtruded;
use crate::clipper::{diff, intersection_pl, offset_ex, offset_polylines, opening_ex, union_ex, OffsetJoinType};
use crate::edge_grid::ClosestPointGrid;
use crate::extrusion::ExtrusionRole;
use crate::flow::Flow;
use crate::geometry::{ExPolygon, ExPolygons, Point, PointF, Polygon, Polylines};
use crate::{unscale, unscaled, Coord, CoordF, Result, SCALED_EPSILON};
use std::collections::HashMap;

/// Stitching state of a loop's split point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SplitPoint {
    Unmatched,
    /// Seen on one clipped piece, index of that piece.
    First(usize),
    Joined,
}

#[derive(Debug, Clone)]
pub struct LoopInterfaceProcessor {
    n_contact_loops: usize,
    /// Radius of the holes in the loops (scaled).
    circle_radius: CoordF,
    /// Minimum distance of two hole centers (scaled).
    circle_distance: CoordF,
    /// Hole shape centered at the origin.
    circle: Polygon,
}

impl LoopInterfaceProcessor {
    /// A processor generating no loops, with holes of radius `circle_radius`
    /// (scaled).
    pub fn new(circle_radius: CoordF) -> Self {
        Self {
            n_contact_loops: 0,
            circle_radius,
            circle_distance: 3.0 * circle_radius,
            circle: Polygon::regular(Point::zero(), circle_radius, 6),
        }
    }

    pub fn with_contact_loops(mut self, n_contact_loops: usize) -> Self {
        self.n_contact_loops = n_contact_loops;
        self
    }

    pub fn n_contact_loops(&self) -> usize {
        self.n_contact_loops
    }

    /// Print the outline of `top_contact` facing the overhang as loops.
    ///
    /// The loops are added to the extrusions of the layer, the rest of the
    /// layer is left for the regular fill.
    pub fn generate(&self, top_contact: &mut SupportGeneratorLayerExtruded, interface_flow: &Flow) -> Result<()> {
        if self.n_contact_loops == 0 || top_contact.is_empty() {
            return Ok(());
        }
        let Some(layer) = top_contact.layer.as_mut() else {
            return Ok(());
        };
        let flow = interface_flow.with_height(layer.height)?;
        let overhang = layer.overhang_polygons.take().unwrap_or_default();

        // Centerline of the outermost loop.
        let contact_expolygons = offset_ex(&union_ex(&layer.polygons), -0.5 * flow.width(), OffsetJoinType::Miter);
        let overhang_with_margin = offset_ex(&union_ex(&overhang), 0.5 * flow.width(), OffsetJoinType::Miter);

        let mut external_loops = ExPolygons::new();
        let mut circles = ExPolygons::new();
        for expoly in &contact_expolygons {
            let mut lookup: ClosestPointGrid<()> =
                ClosestPointGrid::new(self.circle_distance as Coord - SCALED_EPSILON);
            let mut centers: Vec<Point> = Vec::new();
            let mut center_last = Point::zero();
            let mut contour_faces_overhang = false;
            let mut facing_holes = Vec::new();
            for (i_contour, contour) in std::iter::once(&expoly.contour).chain(expoly.holes.iter()).enumerate() {
                if intersection_pl(&[contour.split_at_first_point()], &overhang_with_margin).is_empty() {
                    continue;
                }
                self.place_circles(contour, &mut lookup, &mut centers, &mut center_last);
                if i_contour == 0 {
                    contour_faces_overhang = true;
                } else {
                    facing_holes.push(contour.clone());
                }
            }
            if contour_faces_overhang {
                external_loops.push(ExPolygon::with_holes(expoly.contour.clone(), facing_holes));
            } else {
                // A hole alone is a loop around a filled region.
                external_loops.extend(facing_holes.into_iter().map(|mut hole| {
                    hole.make_counter_clockwise();
                    ExPolygon::new(hole)
                }));
            }
            circles.extend(centers.iter().map(|&center| {
                let mut circle = self.circle.clone();
                circle.translate(center);
                ExPolygon::new(circle)
            }));
        }
        let loops0 = diff(&external_loops, &circles);

        // Further loops inside the first one.
        let spacing = unscale(flow.scaled_spacing());
        let mut loop_polygons: Vec<Polygon> = loops0.iter().flat_map(ExPolygon::to_polygons).collect();
        for i in 1..self.n_contact_loops {
            let inner = opening_ex(&loops0, i as CoordF * spacing + 0.5 * spacing, 0.5 * spacing, OffsetJoinType::Miter);
            loop_polygons.extend(inner.iter().flat_map(ExPolygon::to_polygons));
        }

        // Split the loops, clip them to the overhang and stitch the pieces
        // meeting at a split point back together.
        let mut split_points: HashMap<Point, SplitPoint> = HashMap::with_capacity(loop_polygons.len());
        let mut loop_lines = Polylines::with_capacity(loop_polygons.len());
        for polygon in &loop_polygons {
            if let Some(&first) = polygon.points().first() {
                split_points.insert(first, SplitPoint::Unmatched);
                loop_lines.push(polygon.split_at_first_point());
            }
        }
        let overhang_expanded = offset_ex(&overhang, SUPPORT_MATERIAL_MARGIN, OffsetJoinType::Miter);
        let mut loop_lines = intersection_pl(&loop_lines, &overhang_expanded);
        stitch_at_split_points(&mut loop_lines, &mut split_points);
        loop_lines.retain(|pl| pl.is_valid());

        // The loops take their share of the contact area. Growing them by
        // more than the hole radius leaves no tiny islands inside the holes.
        let covered = offset_polylines(&loop_lines, unscaled(1.1 * self.circle_radius));
        let to_extrude = diff(&layer.polygons, &covered);
        log::trace!(
            "Contact loops at {:.4}: {} lines, {} holes",
            layer.print_z,
            loop_lines.len(),
            circles.len()
        );
        top_contact.set_polygons_to_extrude(to_extrude);
        top_contact
            .extrusions
            .append_paths(loop_lines, ExtrusionRole::SupportMaterialInterface, &flow);
        Ok(())
    }

    /// Walk `contour` and place hole centers at least `circle_distance`
    /// apart from the last one placed and from all others in `lookup`.
    fn place_circles(
        &self,
        contour: &Polygon,
        lookup: &mut ClosestPointGrid<()>,
        centers: &mut Vec<Point>,
        center_last: &mut Point,
    ) {
        let points = contour.points();
        if points.is_empty() {
            return;
        }
        // Segment (index of its first point) and parameter of the last center.
        let mut seg_current: Option<(usize, CoordF)> = None;
        if centers.is_empty() {
            seg_current = Some((0, 0.0));
            *center_last = points[0];
            lookup.insert(*center_last, ());
            centers.push(*center_last);
        }
        let r2 = self.circle_distance * self.circle_distance;
        let mut k = 1;
        while k < points.len() {
            let p1 = points[k - 1];
            let p2 = points[k];
            // Intersection of the segment with a circle of radius
            // circle_distance around the last center.
            let v_seg = PointF::from(p2 - p1);
            let v_cntr = PointF::from(p1 - *center_last);
            let a = v_seg.length_squared();
            let b = 2.0 * v_seg.dot(&v_cntr);
            let c = v_cntr.length_squared() - r2;
            let disc = b * b - 4.0 * a * c;
            if disc > 0.0 {
                let t1 = (-b - disc.sqrt()) / (2.0 * a);
                let t2 = (-b + disc.sqrt()) / (2.0 * a);
                let t0 = match seg_current {
                    Some((seg, t)) if seg == k - 1 => t,
                    _ => 0.0,
                };
                // Lowest t in <t0, 1> outside of <t1, t2>.
                let t = if t0 <= t1 {
                    t0
                } else if t2 <= 1.0 {
                    t2
                } else {
                    seg_current = None;
                    k += 1;
                    continue;
                };
                seg_current = Some((k - 1, t));
                *center_last = p1 + Point::new((v_seg.x * t) as Coord, (v_seg.y * t) as Coord);
                // Far enough from the last center, but maybe not from the others.
                if lookup.find(center_last).is_some() {
                    continue;
                }
            } else {
                // The whole segment is outside of the circle.
                seg_current = Some((k - 1, 0.0));
                *center_last = p1;
            }
            lookup.insert(*center_last, ());
            centers.push(*center_last);
            k += 1;
        }
    }
}

/// Join pairs of clipped loop pieces ending at the same split point.
fn stitch_at_split_points(loop_lines: &mut Polylines, split_points: &mut HashMap<Point, SplitPoint>) {
    for i in 0..loop_lines.len() {
        if loop_lines[i].is_empty() {
            continue;
        }
        for at_start in [true, false] {
            let pt = if at_start {
                loop_lines[i].first_point()
            } else {
                loop_lines[i].last_point()
            };
            let Some(state) = split_points.get_mut(&pt) else {
                continue;
            };
            match *state {
                SplitPoint::First(j) if j != i => {
                    let mut polyline = std::mem::take(&mut loop_lines[i]);
                    if !at_start {
                        polyline.reverse();
                    }
                    let first = &mut loop_lines[j];
                    debug_assert!(first.first_point() == pt || first.last_point() == pt);
                    if first.first_point() == pt {
                        first.reverse();
                    }
                    first.append(&polyline);
                    *state = SplitPoint::Joined;
                }
                SplitPoint::First(_) => {}
                SplitPoint::Unmatched => *state = SplitPoint::First(i),
                SplitPoint::Joined => {
                    // Several loops crossing at one split point.
                    debug_assert!(false, "split point {:?} hit a third time", pt);
                    log::warn!("Contact loop split point {:?} hit a third time", pt);
                    *state = SplitPoint::First(i);
                }
            }
            // A piece is handled at its first end that is a split point.
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extrusion::ExtrusionEntity;
    use crate::geometry::Polyline;
    use crate::support::{SupportGeneratorLayer, SupportLayerType};

    fn flow() -> Flow {
        Flow::new(0.4, 0.2, 0.4).unwrap()
    }

    fn processor() -> LoopInterfaceProcessor {
        LoopInterfaceProcessor::new(1.5 * flow().scaled_width() as CoordF).with_contact_loops(1)
    }

    fn contact(overhang: ExPolygons) -> SupportGeneratorLayerExtruded {
        let mut layer = SupportGeneratorLayer::new(SupportLayerType::TopContact)
            .with_z(1.0, 0.8, 0.2)
            .with_polygons(vec![ExPolygon::rectangle(Point::new_scale(0.0, 0.0), Point::new_scale(20.0, 20.0))]);
        layer.overhang_polygons = Some(overhang);
        SupportGeneratorLayerExtruded::from_layer(layer)
    }

    #[test]
    fn test_no_loops_configured() {
        let mut top = contact(Vec::new());
        LoopInterfaceProcessor::new(1000.0).generate(&mut top, &flow()).unwrap();
        assert!(top.extrusions.is_empty());
        assert!(top.layer.as_ref().unwrap().overhang_polygons.is_some());
    }

    #[test]
    fn test_loops_follow_overhang() {
        // Overhang covering the whole contact.
        let overhang = vec![ExPolygon::rectangle(Point::new_scale(-1.0, -1.0), Point::new_scale(21.0, 21.0))];
        let mut top = contact(overhang);
        processor().generate(&mut top, &flow()).unwrap();
        assert!(!top.extrusions.is_empty());
        assert!(top.extrusions.entities.iter().all(|e| matches!(
            e,
            ExtrusionEntity::Path(p) if p.role == ExtrusionRole::SupportMaterialInterface
        )));
        // The outline detours around the holes.
        let length: CoordF = top.extrusions.paths().iter().map(|p| p.length()).sum();
        assert!(length > crate::scale(75.0) as CoordF);
        // The loops took their share of the contact area.
        let rest = crate::clipper::total_area_mm2(top.polygons_to_extrude());
        assert!(rest < 400.0);
        assert!(rest > 300.0);
        assert!(top.layer.as_ref().unwrap().overhang_polygons.is_none());
    }

    #[test]
    fn test_loops_skip_contour_away_from_overhang() {
        // Overhang far off the contact outline.
        let overhang = vec![ExPolygon::rectangle(Point::new_scale(8.0, 8.0), Point::new_scale(12.0, 12.0))];
        let mut top = contact(overhang);
        processor().generate(&mut top, &flow()).unwrap();
        assert!(top.extrusions.is_empty());
        assert!((crate::clipper::total_area_mm2(top.polygons_to_extrude()) - 400.0).abs() < 0.5);
    }

    #[test]
    fn test_stitching_rejoins_split_loop() {
        let split = Point::new_scale(0.0, 0.0);
        let mut lines = vec![
            Polyline::from_points(vec![split, Point::new_scale(5.0, 0.0)]),
            Polyline::from_points(vec![Point::new_scale(0.0, 5.0), split]),
        ];
        let mut split_points = HashMap::from([(split, SplitPoint::Unmatched)]);
        stitch_at_split_points(&mut lines, &mut split_points);
        lines.retain(|pl| pl.is_valid());
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0].points(),
            &[Point::new_scale(5.0, 0.0), split, Point::new_scale(0.0, 5.0)]
        );
        assert_eq!(split_points[&split], SplitPoint::Joined);
    }
}
