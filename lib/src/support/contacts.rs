//! Post-processing of detected contact layers: merging contact layers that
//! are too close to print separately and trimming top contacts by the
//! bottom contacts they overlap.

use super::layer::{LayerHandle, LayerList, LayerStorage};
use crate::clipper::diff;
use crate::geometry::ExPolygons;
use crate::slice::SlicingParams;
use crate::{CoordF, EPSILON};
use rayon::prelude::*;

/// Merge contact layers closer than `support_layer_height_min` into one.
///
/// Layers below the first layer height (plus the minimum height) are merged
/// into the lowest one, which is snapped onto the first layer. Every other
/// run of layers starting within the minimum height of its first member is
/// merged into that member. Returns the surviving layers sorted by
/// `print_z`.
pub fn merge_contact_layers(
    slicing: &SlicingParams,
    support_layer_height_min: CoordF,
    storage: &mut LayerStorage,
    mut layers: LayerList,
) -> LayerList {
    storage.sort_by_print_z(&mut layers);
    let mut out = LayerList::with_capacity(layers.len());

    let first_z_max = slicing.first_print_layer_height + support_layer_height_min - EPSILON;
    let mut i = 0;
    while i < layers.len() && storage[layers[i]].print_z < first_z_max {
        i += 1;
    }
    if i > 0 {
        let dst = layers[0];
        for &src in &layers[1..i] {
            storage.merge(dst, src);
        }
        let first = &mut storage[dst];
        first.print_z = slicing.first_print_layer_height;
        first.height = slicing.first_print_layer_height;
        first.bottom_z = 0.0;
        out.push(dst);
    }

    while i < layers.len() {
        let dst = layers[i];
        let z_max = storage[dst].print_z + support_layer_height_min + EPSILON;
        let mut j = i + 1;
        while j < layers.len() && storage[layers[j]].print_z < z_max {
            storage.merge(dst, layers[j]);
            j += 1;
        }
        out.push(dst);
        i = j;
    }

    if out.len() < layers.len() {
        log::debug!(
            "Merged {} contact layers into {}",
            layers.len(),
            out.len()
        );
    }
    out
}

/// Remove from every top contact the regions of the bottom contacts it
/// overlaps in Z, so the two never print on top of each other.
///
/// `bottom_contacts` must be sorted by `print_z`.
pub fn trim_top_contacts_by_bottom_contacts(
    storage: &mut LayerStorage,
    bottom_contacts: &[LayerHandle],
    top_contacts: &[LayerHandle],
) {
    let trimmed: Vec<(LayerHandle, ExPolygons)> = {
        let storage = &*storage;
        top_contacts
            .par_iter()
            .filter_map(|&top_handle| {
                let top = &storage[top_handle];
                // Bottom contacts starting below the top contact's bottom.
                let end = bottom_contacts
                    .partition_point(|&h| storage[h].bottom_print_z() - EPSILON <= top.bottom_z);
                let mut polygons: Option<ExPolygons> = None;
                for &bottom_handle in bottom_contacts[..end].iter().rev() {
                    let bottom = &storage[bottom_handle];
                    if top.print_z < bottom.print_z + EPSILON {
                        let current = polygons.as_deref().unwrap_or(&top.polygons);
                        polygons = Some(diff(current, &bottom.polygons));
                    } else {
                        break;
                    }
                }
                polygons.map(|p| (top_handle, p))
            })
            .collect()
    };
    for (handle, polygons) in trimmed {
        storage[handle].polygons = polygons;
    }
}
