//! Filling support regions with extrusions.

use super::params::SupportParameters;
use super::tree_paths::{draw_perimeters, tree_supports_generate_paths};
use crate::clipper::{closing_ex, offset_ex, OffsetJoinType};
use crate::extrusion::{ExtrusionEntityCollection, ExtrusionRole};
use crate::flow::Flow;
use crate::geometry::ExPolygon;
use crate::infill::{Fill, FillParams};
use crate::{unscale, CoordF, EPSILON};

/// Fill `expolygons` with `filler` and append the lines as paths.
pub fn fill_expolygons_generate_paths(
    dst: &mut ExtrusionEntityCollection,
    expolygons: &[ExPolygon],
    filler: &dyn Fill,
    fill_params: &FillParams,
    role: ExtrusionRole,
    flow: &Flow,
) {
    if fill_params.density <= 0.0 {
        return;
    }
    let polylines = filler.fill_expolygons(expolygons, fill_params);
    dst.append_paths(polylines, role, flow);
}

/// Fill support regions, optionally wrapped in a perimeter.
///
/// Without a sheath the regions are filled directly. With a sheath every
/// island gets an outline printed with the support flow and the fill is
/// inset by 0.4 of the spacing. A sheath with zero density leaves only the
/// outline, drawn the way tree branches are. `no_sort` keeps each outline
/// ahead of its fill.
#[allow(clippy::too_many_arguments)]
pub fn fill_expolygons_with_sheath_generate_paths(
    dst: &mut ExtrusionEntityCollection,
    polygons: &[ExPolygon],
    filler: &dyn Fill,
    fill_params: &FillParams,
    role: ExtrusionRole,
    flow: &Flow,
    params: &SupportParameters,
    with_sheath: bool,
    no_sort: bool,
) {
    if polygons.is_empty() {
        return;
    }
    if !with_sheath {
        let closed = closing_ex(polygons, EPSILON, EPSILON, OffsetJoinType::Miter);
        fill_expolygons_generate_paths(dst, &closed, filler, fill_params, role, flow);
        return;
    }
    if fill_params.density <= 0.0 {
        tree_supports_generate_paths(dst, polygons, flow, params.tree_branch_diameter_double_wall_area_scaled);
        return;
    }

    let spacing = flow.scaled_spacing() as CoordF;
    let clip_length = 0.15 * spacing;
    let inset = 0.4 * unscale(flow.scaled_spacing());
    for expoly in closing_ex(polygons, EPSILON, EPSILON + 0.5 * flow.width(), OffsetJoinType::Miter) {
        let mut island = ExtrusionEntityCollection::new();
        island.no_sort = no_sort;
        island.append_paths(draw_perimeters(&expoly, clip_length), ExtrusionRole::SupportMaterial, flow);
        let inner = offset_ex(std::slice::from_ref(&expoly), -inset, OffsetJoinType::Miter);
        fill_expolygons_generate_paths(&mut island, &inner, filler, fill_params, role, flow);
        if no_sort {
            dst.push_collection(island);
        } else {
            dst.extend(island);
        }
    }
}
