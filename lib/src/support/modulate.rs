//! Extrusion height modulation over overlapping support layers.
//!
//! Contact layers are not synchronized with the other support layers, so a
//! contact may overlap in Z with a thinner layer printed below it. The
//! nozzle keeps the contact's `print_z`, but above an overlapping layer the
//! extrusion is only as thick as the gap between both tops.
//!
//! Paths are cut by the overlapping regions, the pieces get a reduced flow,
//! and the pieces of each source path are chained back together in their
//! original order and direction.

use super::layer::SupportGeneratorLayer;
use crate::clipper::{diff_pl, intersection_pl, offset_ex, union_ex, OffsetJoinType};
use crate::edge_grid::ClosestPointGrid;
use crate::extrusion::{
    ExtrusionAttributes, ExtrusionEntity, ExtrusionEntityCollection, ExtrusionMultiPath, ExtrusionPath,
};
use crate::flow::Flow;
use crate::geometry::{Point, Polyline, Polylines};
use crate::{Coord, CoordF};

/// Fragment ends closer than this (scaled units) are chained.
const FRAGMENT_SEARCH_RADIUS: Coord = 7;

/// Pieces of the source paths printed with one cross-section.
struct PathFragments {
    polylines: Polylines,
    attributes: ExtrusionAttributes,
}

#[derive(Debug, Clone, Copy)]
struct FragmentEnd {
    layer_idx: usize,
    polyline_idx: usize,
    is_start: bool,
}

/// Reduce the extrusion height of `extrusions` printed at `this_layer`
/// wherever they run over one of `overlapping`, sorted bottom up.
///
/// Only plain paths are modulated. Other entities are kept as they are,
/// nested sheath collections included. The cross-section of the first plain
/// path, wherever it sits in the collection, is the template for all
/// fragments.
pub fn modulate_extrusion_by_overlapping_layers(
    extrusions: &mut ExtrusionEntityCollection,
    this_layer: &SupportGeneratorLayer,
    overlapping: &[&SupportGeneratorLayer],
    nozzle_diameter: CoordF,
) {
    if overlapping.is_empty() || extrusions.is_empty() {
        return;
    }
    let Some((role, template)) = extrusions.entities.iter().find_map(|e| match e {
        ExtrusionEntity::Path(p) => Some((p.role, p.attributes())),
        _ => None,
    }) else {
        return;
    };

    let mut kept = Vec::new();
    let mut source = Polylines::new();
    let mut path_ends: Vec<(Point, Point)> = Vec::new();
    for entity in std::mem::take(&mut extrusions.entities) {
        match entity {
            ExtrusionEntity::Path(path) => {
                path_ends.push((path.first_point(), path.last_point()));
                source.push(path.polyline);
            }
            other => kept.push(other),
        }
    }

    // One fragment set per overlapping layer, the last one for this layer.
    let mut fragments: Vec<PathFragments> = (0..=overlapping.len())
        .map(|_| PathFragments {
            polylines: Polylines::new(),
            attributes: template,
        })
        .collect();
    fragments[overlapping.len()].polylines = source;

    // Trim by the highest overlapping layer first.
    for (i, layer) in overlapping.iter().enumerate().rev() {
        let height = this_layer.print_z - layer.print_z;
        if height <= 0.0 {
            debug_assert!(false, "overlapping layer at or above {}", this_layer.print_z);
            log::warn!(
                "Support layer at {:.4} overlaps a layer at {:.4}",
                this_layer.print_z,
                layer.print_z
            );
            continue;
        }
        let trimming = offset_ex(&union_ex(&layer.polygons), 0.5 * template.width, OffsetJoinType::Miter);
        let rest = std::mem::take(&mut fragments[overlapping.len()].polylines);
        fragments[i].polylines = intersection_pl(&rest, &trimming);
        fragments[overlapping.len()].polylines = diff_pl(&rest, &trimming);
        // Non-bridging flow of the reduced height.
        match Flow::new(template.width, height, nozzle_diameter).and_then(|f| f.mm3_per_mm()) {
            Ok(mm3_per_mm) => {
                fragments[i].attributes = ExtrusionAttributes {
                    mm3_per_mm,
                    width: template.width,
                    height,
                };
            }
            Err(err) => log::warn!("Cannot modulate support extrusion height {:.4}: {}", height, err),
        }
    }

    // Both ends of every fragment go to the grid, since clipping may flip
    // the direction of a piece.
    let mut ends = ClosestPointGrid::new(FRAGMENT_SEARCH_RADIUS);
    for (layer_idx, frag) in fragments.iter().enumerate() {
        for (polyline_idx, polyline) in frag.polylines.iter().enumerate() {
            if polyline.len() >= 2 {
                ends.insert(polyline.first_point(), FragmentEnd { layer_idx, polyline_idx, is_start: true });
                ends.insert(polyline.last_point(), FragmentEnd { layer_idx, polyline_idx, is_start: false });
            }
        }
    }

    extrusions.entities = kept;
    for (start, end) in path_ends {
        let mut current = start;
        let mut chain: Vec<ExtrusionPath> = Vec::new();
        loop {
            let found = ends
                .find_if(&current, |e| !fragments[e.layer_idx].polylines[e.polyline_idx].is_empty())
                .map(|(_, e, _)| *e);
            let Some(fragment_end) = found else {
                break;
            };
            let frag = &mut fragments[fragment_end.layer_idx];
            let mut polyline: Polyline = std::mem::take(&mut frag.polylines[fragment_end.polyline_idx]);
            if !fragment_end.is_start {
                polyline.reverse();
            }
            // Successive fragments share their end points exactly.
            polyline.points_mut()[0] = current;
            let attributes = frag.attributes;
            match chain.last_mut() {
                Some(path) if path.attributes() == attributes => path.polyline.append(&polyline),
                _ => chain.push(ExtrusionPath::new(polyline, role, attributes)),
            }
            current = chain.last().map_or(current, |p| p.last_point());
            if current == end {
                break;
            }
        }
        if chain.len() == 1 {
            if let Some(path) = chain.pop() {
                extrusions.push_path(path);
            }
        } else {
            extrusions.push_multi_path(ExtrusionMultiPath::new(chain));
        }
    }

    // Fragments that could not be chained.
    let mut orphans = 0;
    for frag in fragments {
        for polyline in frag.polylines {
            if !polyline.is_empty() {
                orphans += 1;
                extrusions.push_path(ExtrusionPath::new(polyline, role, frag.attributes));
            }
        }
    }
    if orphans > 0 {
        log::warn!(
            "{} support extrusion fragments at {:.4} could not be chained",
            orphans,
            this_layer.print_z
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extrusion::ExtrusionRole;
    use crate::geometry::ExPolygon;
    use crate::support::SupportLayerType;

    fn flow() -> Flow {
        Flow::new(0.4, 0.3, 0.4).unwrap()
    }

    fn layer(print_z: f64, height: f64, x0: f64, x1: f64) -> SupportGeneratorLayer {
        SupportGeneratorLayer::new(SupportLayerType::Base)
            .with_z(print_z, print_z - height, height)
            .with_polygons(vec![ExPolygon::rectangle(Point::new_scale(x0, -5.0), Point::new_scale(x1, 5.0))])
    }

    fn line(x0: f64, x1: f64) -> Polyline {
        Polyline::from_points(vec![Point::new_scale(x0, 0.0), Point::new_scale(x1, 0.0)])
    }

    #[test]
    fn test_no_overlap_keeps_paths() {
        let mut eec = ExtrusionEntityCollection::new();
        eec.append_paths(vec![line(0.0, 10.0)], ExtrusionRole::SupportMaterialInterface, &flow());
        let before = eec.clone();
        let this = layer(1.0, 0.3, 0.0, 10.0);
        modulate_extrusion_by_overlapping_layers(&mut eec, &this, &[], 0.4);
        assert_eq!(eec, before);
    }

    #[test]
    fn test_overlap_reduces_height_and_chains() {
        let mut eec = ExtrusionEntityCollection::new();
        eec.append_paths(vec![line(0.0, 10.0)], ExtrusionRole::SupportMaterialInterface, &flow());
        let this = layer(1.0, 0.3, 0.0, 10.0);
        let below = layer(0.8, 0.2, 4.0, 6.0);
        modulate_extrusion_by_overlapping_layers(&mut eec, &this, &[&below], 0.4);

        assert_eq!(eec.len(), 1);
        let ExtrusionEntity::MultiPath(multi) = &eec.entities[0] else {
            panic!("expected a chained multi-path");
        };
        assert_eq!(multi.paths.len(), 3);
        // Direction and continuity preserved.
        assert_eq!(multi.first_point(), Some(Point::new_scale(0.0, 0.0)));
        assert_eq!(multi.last_point(), Some(Point::new_scale(10.0, 0.0)));
        for pair in multi.paths.windows(2) {
            assert_eq!(pair[0].last_point(), pair[1].first_point());
        }
        let middle = &multi.paths[1];
        assert!((middle.height - 0.2).abs() < 1e-9);
        assert!(middle.mm3_per_mm < multi.paths[0].mm3_per_mm);
        // Overlap region grown by half the extrusion width.
        assert!((middle.length() - crate::scale(2.4) as f64).abs() < 10.0);
        assert!((multi.length() - crate::scale(10.0) as f64).abs() < 10.0);
    }

    #[test]
    fn test_non_path_entities_kept() {
        let mut eec = ExtrusionEntityCollection::new();
        let mut nested = ExtrusionEntityCollection::new();
        nested.append_paths(vec![line(0.0, 10.0)], ExtrusionRole::SupportMaterial, &flow());
        eec.push_collection(nested.clone());
        eec.append_paths(vec![line(0.0, 10.0)], ExtrusionRole::SupportMaterial, &flow());
        let this = layer(1.0, 0.3, 0.0, 10.0);
        let below = layer(0.8, 0.2, -1.0, 11.0);
        modulate_extrusion_by_overlapping_layers(&mut eec, &this, &[&below], 0.4);
        assert_eq!(eec.len(), 2);
        assert_eq!(eec.entities[0], ExtrusionEntity::Collection(nested));
        let ExtrusionEntity::Path(path) = &eec.entities[1] else {
            panic!("expected a single modulated path");
        };
        assert!((path.height - 0.2).abs() < 1e-9);
    }
}
