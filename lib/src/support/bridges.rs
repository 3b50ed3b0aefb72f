//! Bridge-aware refinement of top contact regions.
//!
//! Straight perimeter runs that hang over a gap but are anchored on both
//! sides are printed as bridges and need no support. The same holds for
//! bottom bridge surfaces with a known direction. Both are cut out of the
//! contact region, except near bridge edges that are not anchored.

use crate::clipper::{diff, diff_pl, diff_with_safety_offset, offset_ex, offset_polylines, union_ex, OffsetJoinType};
use crate::geometry::{ExPolygon, ExPolygons, Polygon, Polyline, Polylines};
use crate::slice::{Layer, LayerRegion};
use crate::{unscaled, CoordF};

/// Margin kept under unsupported bridge edges (mm).
pub const SUPPORT_MATERIAL_MARGIN: CoordF = 1.5;

/// Remove the regions printed as bridges from `contact_polygons`.
///
/// `lower_layer` is the object layer under `layerm`, `fw` the external
/// perimeter width in scaled units. Without a lower layer nothing can be
/// anchored and the contact is returned unchanged.
pub fn remove_bridges_from_contacts(
    lower_layer: Option<&Layer>,
    layerm: &LayerRegion,
    fw: CoordF,
    contact_polygons: &[ExPolygon],
) -> ExPolygons {
    let Some(lower_layer) = lower_layer else {
        return contact_polygons.to_vec();
    };
    if contact_polygons.is_empty() {
        return Vec::new();
    }

    // Perimeters running over the lower layer grown by half a nozzle count
    // as supported.
    let lower_grown_slices = offset_ex(
        &lower_layer.lslices,
        0.5 * layerm.nozzle_diameter,
        OffsetJoinType::Square,
    );
    let perimeters: Polylines = layerm
        .perimeters
        .iter()
        .map(Polygon::split_at_first_point)
        .collect();
    let overhang_perimeters = diff_pl(&perimeters, &lower_grown_slices);

    // Bridging threads may be thinner than their spacing, take the larger
    // of both so no gaps are left between neighbouring threads.
    let bridge_flow = layerm.bridging_flow();
    let w = 0.5 * (bridge_flow.scaled_width().max(bridge_flow.scaled_spacing()) as CoordF)
        + crate::scaled(0.001);

    let mut bridges: ExPolygons = Vec::new();
    for mut polyline in overhang_perimeters {
        if !polyline.is_straight() {
            continue;
        }
        polyline.extend_start(fw);
        polyline.extend_end(fw);
        if anchored_at_both_ends(lower_layer, &polyline) {
            bridges.extend(offset_polylines(std::slice::from_ref(&polyline), unscaled(w)));
        }
    }
    let mut bridges = union_ex(&bridges);

    bridges.extend(
        layerm
            .fill_surfaces
            .iter()
            .filter(|s| s.is_anchored_bridge())
            .map(|s| s.expolygon.clone()),
    );

    // Keep support under the edges that hang in the air.
    let unsupported_edges =
        offset_polylines(&layerm.unsupported_bridge_edges, SUPPORT_MATERIAL_MARGIN);
    let bridges = diff(&bridges, &unsupported_edges);

    if bridges.is_empty() {
        return contact_polygons.to_vec();
    }
    diff_with_safety_offset(contact_polygons, &bridges)
}

fn anchored_at_both_ends(lower_layer: &Layer, polyline: &Polyline) -> bool {
    let ends = [polyline.first_point(), polyline.last_point()];
    let mut supported = [false, false];
    for (island, bbox) in lower_layer.islands() {
        for (end, flag) in ends.iter().zip(supported.iter_mut()) {
            if !*flag && bbox.contains_point(end) && island.contains_point(end) {
                *flag = true;
            }
        }
        if supported[0] && supported[1] {
            return true;
        }
    }
    false
}
