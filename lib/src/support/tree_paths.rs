//! Perimeter toolpaths for tree support branches.
//!
//! A branch cross-section is printed as its outline only. Every loop is
//! opened at a seam and extended with an anchor running along a second,
//! virtual loop one extrusion width inside, so the loop starts on a short
//! straight run instead of a blob at the seam. Thick branches get a second
//! wall.

use crate::clipper::{closing_ex, diff, offset2_ex, offset_polygons, OffsetJoinType};
use crate::extrusion::{ExtrusionEntityCollection, ExtrusionRole};
use crate::flow::Flow;
use crate::geometry::{ExPolygon, Point, PointF, Polyline, Polylines};
use crate::{CoordF, EPSILON};
use std::collections::HashMap;

/// Tag of anchor candidate vertices created where two offset contours
/// intersect.
const TAG_INTERSECTION: i32 = -1;

/// Closed outlines of an ExPolygon, contour counter-clockwise and holes
/// clockwise, opened at their first point and shortened by `clip_length`
/// (scaled) so the nozzle does not land on the start point again.
pub fn draw_perimeters(expoly: &ExPolygon, clip_length: CoordF) -> Polylines {
    std::iter::once(&expoly.contour)
        .chain(expoly.holes.iter())
        .map(|loop_| {
            let mut pl = loop_.split_at_first_point();
            pl.push(pl.first_point());
            pl.clip_end(clip_length);
            pl
        })
        .collect()
}

/// A ring of anchor candidate points. Each point is tagged with the index of
/// the source contour it was offset from (0 for the outer contour, `1 + i`
/// for hole `i`) or with [`TAG_INTERSECTION`].
type TaggedRing = Vec<(Point, i32)>;

/// Shrink `expoly` by `delta` mm, keeping track of which source contour
/// every output vertex came from. Output rings are clockwise.
fn shrink_with_contour_idx(expoly: &ExPolygon, delta: CoordF) -> Vec<TaggedRing> {
    let contours = offset_polygons(std::slice::from_ref(&expoly.contour), -delta, OffsetJoinType::Miter);
    if contours.is_empty() {
        return Vec::new();
    }
    let mut tags: HashMap<Point, i32> = HashMap::new();
    for ex in &contours {
        for ring in ex.to_polygons() {
            tags.extend(ring.points().iter().map(|&p| (p, 0)));
        }
    }

    let mut holes = Vec::new();
    for (i, hole) in expoly.holes.iter().enumerate() {
        let mut hole = hole.clone();
        hole.make_counter_clockwise();
        let grown = offset_polygons(std::slice::from_ref(&hole), delta, OffsetJoinType::Miter);
        for ex in &grown {
            for ring in ex.to_polygons() {
                tags.extend(ring.points().iter().map(|&p| (p, 1 + i as i32)));
            }
        }
        holes.extend(grown);
    }

    let shrunk = if holes.is_empty() {
        contours
    } else {
        let out = diff(&contours, &holes);
        if out.is_empty() {
            return Vec::new();
        }
        out
    };

    shrunk
        .iter()
        .flat_map(ExPolygon::to_polygons)
        .map(|mut ring| {
            ring.make_clockwise();
            ring.points()
                .iter()
                .map(|&p| (p, tags.get(&p).copied().unwrap_or(TAG_INTERSECTION)))
                .collect()
        })
        .collect()
}

/// Foot of the seam on the anchor candidates offset from loop `idx_loop`.
struct SeamFoot {
    ring: usize,
    segment: usize,
    t: CoordF,
    point: PointF,
    d2: CoordF,
}

fn closest_anchor_foot(candidates: &[TaggedRing], idx_loop: i32, seam: PointF) -> Option<SeamFoot> {
    let mut best: Option<SeamFoot> = None;
    for (ring_idx, ring) in candidates.iter().enumerate() {
        let n = ring.len();
        for i in 0..n {
            let j = (i + 1) % n;
            let (pi, ti) = ring[i];
            let (pj, tj) = ring[j];
            if ti != idx_loop && tj != idx_loop {
                continue;
            }
            let pi = PointF::from(pi);
            let v = PointF::from(pj) - pi;
            let w = seam - pi;
            let l2 = v.length_squared();
            let t = if l2 == 0.0 { 0.0 } else { (v.dot(&w) / l2).clamp(0.0, 1.0) };
            // Part of the segment sitting on an intersection belongs to the
            // other contour.
            if (ti == idx_loop || t > EPSILON) && (tj == idx_loop || t < 1.0 - EPSILON) {
                let foot = pi + v * t;
                let d2 = (foot - seam).length_squared();
                if best.as_ref().map_or(true, |b| d2 < b.d2) {
                    best = Some(SeamFoot {
                        ring: ring_idx,
                        segment: i,
                        t,
                        point: foot,
                        d2,
                    });
                }
            }
        }
    }
    best
}

/// Append an anchor of `anchor_length` (scaled) to the end of `pl`, running
/// from the seam foot along the candidate ring.
fn append_anchor(pl: &mut Polyline, ring: &TaggedRing, foot: &SeamFoot, idx_loop: i32, anchor_length: CoordF) {
    let seam = PointF::from(pl.last_point());
    pl.push(Point::from(foot.point));
    let mut remaining = anchor_length - (seam - foot.point).length();
    let n = ring.len();
    let mut i = foot.segment;
    let mut j = (i + 1) % n;
    let mut pi = PointF::from(ring[i].0);
    let mut pj = PointF::from(ring[j].0);
    let mut v = pj - pi;
    let mut l = v.length();
    if remaining < (1.0 - foot.t) * l {
        pl.push(Point::from(foot.point + v * (remaining / l)));
        return;
    }
    // Rest of the current segment, then the following ones.
    pl.push(ring[j].0);
    remaining -= (1.0 - foot.t) * l;
    pi = pj;
    i = j;
    while ring[i].1 == idx_loop && remaining > 0.0 {
        j = (i + 1) % n;
        if i == foot.segment {
            break;
        }
        pj = PointF::from(ring[j].0);
        v = pj - pi;
        l = v.length();
        if remaining <= l {
            pl.push(Point::from(pi + v * (remaining / l)));
            break;
        }
        pl.push(ring[j].0);
        remaining -= l;
        pi = pj;
        i = j;
    }
}

/// Draw `expoly` as perimeters starting with an anchor. All loops are
/// printed clockwise.
fn anchored_perimeters(expoly: &ExPolygon, flow: &Flow) -> Polylines {
    let width = flow.scaled_width() as CoordF;
    let spacing = flow.scaled_spacing() as CoordF;
    let clip_length = 0.15 * spacing;
    let anchor_length = 6.0 * spacing;
    let candidates = shrink_with_contour_idx(expoly, flow.width());

    let mut polylines = Polylines::with_capacity(expoly.holes.len() + 1);
    for (idx_loop, loop_) in std::iter::once(&expoly.contour).chain(expoly.holes.iter()).enumerate() {
        let idx_loop = idx_loop as i32;
        let mut pl = Polyline::from_points(loop_.points().to_vec());
        if idx_loop == 0 {
            pl.reverse();
        }
        pl.push(pl.first_point());
        pl.clip_end(clip_length);
        if pl.len() < 2 {
            continue;
        }
        let seam = PointF::from(pl.last_point());
        if let Some(foot) = closest_anchor_foot(&candidates, idx_loop, seam) {
            if foot.d2 < (3.0 * width) * (3.0 * width) {
                append_anchor(&mut pl, &candidates[foot.ring], &foot, idx_loop, anchor_length);
            }
        }
        // Start with the anchor.
        pl.reverse();
        polylines.push(pl);
    }
    polylines
}

/// Toolpaths of tree support branch cross-sections.
///
/// Regions larger than `double_wall_area` (scaled², 0 disables) get an
/// inner wall printed before the outer one.
pub fn tree_supports_generate_paths(
    dst: &mut ExtrusionEntityCollection,
    polygons: &[ExPolygon],
    flow: &Flow,
    double_wall_area: CoordF,
) {
    let width = flow.width();
    let clip_length = 0.15 * flow.scaled_spacing() as CoordF;
    for expoly in closing_ex(polygons, EPSILON, EPSILON + 0.5 * width, OffsetJoinType::Miter) {
        let mut eec: Option<ExtrusionEntityCollection> = None;
        let mut regions = vec![expoly.clone()];
        if double_wall_area > 0.0 {
            let area = expoly.area();
            if area > double_wall_area {
                log::trace!("Tree support double wall: area {:.0} > {:.0}", area, double_wall_area);
                // Keep the inner loop first.
                let mut walls = ExtrusionEntityCollection::new();
                walls.no_sort = true;
                let level2 = offset2_ex(std::slice::from_ref(&expoly), -1.5 * width, 0.5 * width, OffsetJoinType::Miter);
                if !level2.is_empty() {
                    regions = level2;
                    walls.append_paths(draw_perimeters(&expoly, clip_length), ExtrusionRole::SupportMaterial, flow);
                }
                eec = Some(walls);
            }
        }
        for region in &regions {
            let polylines = anchored_perimeters(region, flow);
            eec.as_mut()
                .unwrap_or(&mut *dst)
                .append_paths(polylines, ExtrusionRole::SupportMaterial, flow);
        }
        if let Some(mut walls) = eec {
            walls.entities.reverse();
            dst.push_collection(walls);
        }
    }
}
