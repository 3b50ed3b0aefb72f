//! Dense interface and base-interface layers.
//!
//! Each intermediate support layer collects the top contacts lying within
//! the configured number of interface layers above it and the bottom
//! contacts within the configured number below it. Their union, clipped to
//! the intermediate layer, becomes an interface layer and is removed from
//! the intermediate layer. Contacts further away than the interface-only
//! count produce base-interface layers instead, printed with the base
//! flow.

use super::layer::{LayerHandle, LayerList, LayerStorage, SupportGeneratorLayer, SupportLayerType};
use super::params::SupportParameters;
use super::SupportStyle;
use crate::clipper::{closing_ex, diff, intersection, smooth_outward, union, union_safety_offset_ex, OffsetJoinType};
use crate::geometry::ExPolygons;
use crate::{CoordF, EPSILON};
use rayon::prelude::*;

/// Output of [`generate_interface_layers`], both lists sorted by `print_z`.
#[derive(Debug, Clone, Default)]
pub struct InterfaceLayers {
    pub interface_layers: LayerList,
    pub base_interface_layers: LayerList,
}

/// Layers pre-computed by organic supports, merged into the generated ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrganicInterfaces<'a> {
    pub top_interface_layers: &'a [LayerHandle],
    pub top_base_interface_layers: &'a [LayerHandle],
}

/// How the projected contacts of one intermediate layer are merged.
#[derive(Debug, Clone, Copy)]
struct Merging {
    smooth: bool,
    closing_distance: CoordF,
    smoothing_distance: CoordF,
    minimum_island_radius: CoordF,
}

/// A layer produced for one intermediate layer.
struct Placed {
    handle: LayerHandle,
    /// New contents of a reused organic layer.
    reused: Option<SupportGeneratorLayer>,
}

struct IntermediateResult {
    intermediate: LayerHandle,
    trimmed: Option<ExPolygons>,
    interface: Option<Placed>,
    base_interface: Option<Placed>,
}

/// Turn parts of the intermediate layers into interface and base-interface
/// layers. The intermediate layers lose the converted regions.
///
/// All input lists must be sorted by `print_z`. Without any interface
/// layers configured both output lists are empty.
pub fn generate_interface_layers(
    params: &SupportParameters,
    storage: &mut LayerStorage,
    bottom_contacts: &[LayerHandle],
    top_contacts: &[LayerHandle],
    organic: OrganicInterfaces<'_>,
    intermediate_layers: &[LayerHandle],
) -> InterfaceLayers {
    if intermediate_layers.is_empty() || !params.has_interfaces() {
        return InterfaceLayers::default();
    }

    let smoothing_distance = 1.5 * params.support_material_interface_flow.spacing();
    let merging = Merging {
        smooth: params.support_style != SupportStyle::Grid,
        closing_distance: params.closing_radius.unwrap_or(smoothing_distance),
        smoothing_distance,
        minimum_island_radius: params.support_material_interface_flow.spacing()
            / params.interface_density,
    };
    let snug = params.support_style == SupportStyle::Snug;

    let results: Vec<IntermediateResult> = {
        let storage = &*storage;
        (0..intermediate_layers.len())
            .into_par_iter()
            .map(|idx| {
                process_intermediate(
                    params,
                    storage,
                    merging,
                    snug,
                    bottom_contacts,
                    top_contacts,
                    organic,
                    intermediate_layers,
                    idx,
                )
            })
            .collect()
    };
    storage.flush();

    let mut interface_layers = LayerList::new();
    let mut base_interface_layers = LayerList::new();
    for result in results {
        if let Some(trimmed) = result.trimmed {
            storage[result.intermediate].polygons = trimmed;
        }
        for (placed, out) in [
            (result.interface, &mut interface_layers),
            (result.base_interface, &mut base_interface_layers),
        ] {
            let Some(placed) = placed else { continue };
            if let Some(update) = placed.reused {
                let layer = &mut storage[placed.handle];
                layer.polygons = update.polygons;
                layer.print_z = update.print_z;
                layer.bottom_z = update.bottom_z;
                layer.height = update.height;
                layer.bridging = update.bridging;
            }
            out.push(placed.handle);
        }
    }

    let interface_layers =
        merge_remove_empty(storage, interface_layers, organic.top_interface_layers);
    let base_interface_layers =
        merge_remove_empty(storage, base_interface_layers, organic.top_base_interface_layers);
    log::debug!(
        "Generated {} interface and {} base interface layers",
        interface_layers.len(),
        base_interface_layers.len()
    );
    InterfaceLayers {
        interface_layers,
        base_interface_layers,
    }
}

#[allow(clippy::too_many_arguments)]
fn process_intermediate(
    params: &SupportParameters,
    storage: &LayerStorage,
    merging: Merging,
    snug: bool,
    bottom_contacts: &[LayerHandle],
    top_contacts: &[LayerHandle],
    organic: OrganicInterfaces<'_>,
    intermediate_layers: &[LayerHandle],
    idx: usize,
) -> IntermediateResult {
    let n = intermediate_layers.len();
    let intermediate = &storage[intermediate_layers[idx]];

    let mut top_interface = ExPolygons::new();
    let mut top_base = ExPolygons::new();
    let mut bottom_interface = ExPolygons::new();
    let mut bottom_base = ExPolygons::new();

    if params.num_top_interface_layers > 0 {
        // Top of the slab collecting the top contacts.
        let top_z = storage[intermediate_layers[(idx + params.num_top_interface_layers - 1).min(n - 1)]].print_z;
        let top_interface_z = if params.num_top_base_interface_layers == 0 {
            CoordF::MAX
        } else if params.num_top_interface_layers_only() == 0 {
            -CoordF::MAX
        } else {
            storage[intermediate_layers[(idx + params.num_top_interface_layers_only() - 1).min(n - 1)]]
                .print_z
        };
        let first = storage.partition_point(top_contacts, |l| l.print_z >= intermediate.print_z);
        for contact in storage.layers(&top_contacts[first..]) {
            if contact.bottom_z - EPSILON > top_z {
                break;
            }
            let projected = if snug {
                contact.overhang_polygons.as_ref().unwrap_or(&contact.polygons)
            } else {
                &contact.polygons
            };
            let dst = if contact.bottom_z - EPSILON > top_interface_z {
                &mut top_base
            } else {
                &mut top_interface
            };
            dst.extend(projected.iter().cloned());
        }
    }

    if params.num_bottom_interface_layers > 0 {
        // Bottom of the slab collecting the bottom contacts.
        let bottom_z = storage[intermediate_layers[(idx + 1).saturating_sub(params.num_bottom_interface_layers)]].bottom_z;
        let bottom_interface_z = if params.num_bottom_base_interface_layers == 0 {
            -CoordF::MAX
        } else if params.num_bottom_interface_layers_only() == 0 {
            CoordF::MAX
        } else {
            storage[intermediate_layers[idx.saturating_sub(params.num_bottom_interface_layers_only())]]
                .bottom_z
        };
        let first = storage.partition_point(bottom_contacts, |l| l.print_z >= bottom_z - EPSILON);
        for contact in storage.layers(&bottom_contacts[first..]) {
            if contact.print_z - EPSILON > intermediate.bottom_z {
                break;
            }
            let dst = if contact.print_z - EPSILON > bottom_interface_z {
                &mut bottom_interface
            } else {
                &mut bottom_base
            };
            dst.extend(contact.polygons.iter().cloned());
        }
    }

    let top_interface_layer = resolve_same_layer(storage, organic.top_interface_layers, intermediate.print_z);
    let top_base_interface_layer =
        resolve_same_layer(storage, organic.top_base_interface_layers, intermediate.print_z);

    let mut remaining = intermediate.polygons.clone();
    let mut trimmed = false;

    let has_organic = |h: Option<LayerHandle>| h.is_some_and(|h| !storage[h].is_empty());
    let mut interface = None;
    if !bottom_interface.is_empty() || !top_interface.is_empty() || has_organic(top_interface_layer) {
        let layer_type = if top_interface.is_empty() {
            SupportLayerType::BottomInterface
        } else {
            SupportLayerType::TopInterface
        };
        interface = insert_layer(
            storage,
            merging,
            intermediate,
            &mut remaining,
            bottom_interface,
            top_interface,
            top_interface_layer,
            None,
            layer_type,
        );
        trimmed |= interface.is_some();
    }

    let mut base_interface = None;
    if !bottom_base.is_empty() || !top_base.is_empty() || has_organic(top_base_interface_layer) {
        let subtract = interface.as_ref().map(|(_, polygons)| polygons);
        base_interface = insert_layer(
            storage,
            merging,
            intermediate,
            &mut remaining,
            bottom_base,
            top_base,
            top_base_interface_layer,
            subtract,
            SupportLayerType::Base,
        );
        trimmed |= base_interface.is_some();
    }

    IntermediateResult {
        intermediate: intermediate_layers[idx],
        trimmed: trimmed.then_some(remaining),
        interface: interface.map(|(placed, _)| placed),
        base_interface: base_interface.map(|(placed, _)| placed),
    }
}

/// Merge projected contacts into a layer at the Z of `intermediate`.
/// Returns the placed layer and its regions before any subtraction.
#[allow(clippy::too_many_arguments)]
fn insert_layer(
    storage: &LayerStorage,
    merging: Merging,
    intermediate: &SupportGeneratorLayer,
    remaining: &mut ExPolygons,
    mut bottom: ExPolygons,
    top: ExPolygons,
    organic_layer: Option<LayerHandle>,
    subtract: Option<&ExPolygons>,
    layer_type: SupportLayerType,
) -> Option<(Placed, ExPolygons)> {
    bottom.extend(top);
    let merged = if merging.smooth {
        smooth_outward(
            &closing_ex(
                &bottom,
                merging.closing_distance + merging.minimum_island_radius,
                merging.closing_distance,
                OffsetJoinType::Square,
            ),
            merging.smoothing_distance,
        )
    } else {
        union_safety_offset_ex(&bottom)
    };
    let mut polygons = intersection(&merged, remaining);
    if let Some(organic) = organic_layer {
        // Precomputed organic interfaces may span several tree tips, keep
        // them whole.
        let organic = &storage[organic].polygons;
        if !organic.is_empty() {
            polygons = union(organic, &polygons);
        }
    }
    if polygons.is_empty() {
        return None;
    }

    *remaining = diff(remaining, &polygons);
    let interface_polygons = polygons.clone();
    if let Some(subtract) = subtract {
        polygons = diff(&polygons, subtract);
    }

    let layer = SupportGeneratorLayer::new(layer_type)
        .with_z(intermediate.print_z, intermediate.bottom_z, intermediate.height)
        .with_bridging(intermediate.bridging)
        .with_polygons(polygons);
    let placed = match organic_layer {
        Some(handle) => Placed {
            handle,
            reused: Some(layer),
        },
        None => Placed {
            handle: storage.allocate(layer),
            reused: None,
        },
    };
    Some((placed, interface_polygons))
}

/// Layer of `layers` printed at `print_z`, if any.
fn resolve_same_layer(storage: &LayerStorage, layers: &[LayerHandle], print_z: CoordF) -> Option<LayerHandle> {
    let idx = storage.partition_point(layers, |l| l.print_z > print_z - EPSILON);
    layers
        .get(idx)
        .copied()
        .filter(|&h| storage[h].print_z < print_z + EPSILON)
}

/// Drop empty layers from both lists and merge them by `print_z`. A reused
/// organic layer appears in both lists and is kept once.
fn merge_remove_empty(storage: &LayerStorage, generated: LayerList, organic: &[LayerHandle]) -> LayerList {
    let mut out: LayerList = generated
        .into_iter()
        .chain(organic.iter().copied())
        .filter(|&h| !storage[h].is_empty())
        .collect();
    out.sort_unstable();
    out.dedup();
    storage.sort_by_print_z(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipper::total_area_mm2;
    use crate::geometry::{ExPolygon, Point};
    use crate::slice::SlicingParams;
    use crate::support::SupportConfig;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> ExPolygon {
        ExPolygon::rectangle(Point::new_scale(x0, y0), Point::new_scale(x1, y1))
    }

    fn params(config: SupportConfig) -> SupportParameters {
        SupportParameters::new(&config, &SlicingParams::default()).unwrap()
    }

    /// Intermediate layers 0.2..=2.0 covering 60×60, one top contact of
    /// 40×40 at 2.2.
    fn stack(storage: &mut LayerStorage) -> (LayerList, LayerList) {
        let intermediate: LayerList = (1..=10)
            .map(|i| {
                let z = 0.2 * i as f64;
                storage.allocate_unguarded(
                    SupportGeneratorLayer::new(SupportLayerType::Base)
                        .with_z(z, z - 0.2, 0.2)
                        .with_polygons(vec![rect(0.0, 0.0, 60.0, 60.0)]),
                )
            })
            .collect();
        let top = storage.allocate_unguarded(
            SupportGeneratorLayer::new(SupportLayerType::TopContact)
                .with_z(2.2, 2.0, 0.2)
                .with_polygons(vec![rect(10.0, 10.0, 50.0, 50.0)]),
        );
        (intermediate, vec![top])
    }

    #[test]
    fn test_no_interfaces_configured() {
        let mut storage = LayerStorage::new();
        let (intermediate, top) = stack(&mut storage);
        let p = params(SupportConfig::default().with_interface_layers(0, Some(0)));
        let out = generate_interface_layers(&p, &mut storage, &[], &top, OrganicInterfaces::default(), &intermediate);
        assert!(out.interface_layers.is_empty() && out.base_interface_layers.is_empty());
        assert!((total_area_mm2(&storage[intermediate[9]].polygons) - 3600.0).abs() < 0.01);
    }

    #[test]
    fn test_top_interfaces_below_contact() {
        let mut storage = LayerStorage::new();
        let (intermediate, top) = stack(&mut storage);
        let p = params(SupportConfig::default().with_interface_layers(2, Some(0)));
        let out = generate_interface_layers(&p, &mut storage, &[], &top, OrganicInterfaces::default(), &intermediate);
        assert_eq!(out.interface_layers.len(), 2);
        for layer in storage.layers(&out.interface_layers) {
            assert_eq!(layer.layer_type, SupportLayerType::TopInterface);
            assert!(layer.print_z > 1.7);
            assert!((total_area_mm2(&layer.polygons) - 1600.0).abs() < 1.0);
        }
        // The converted region left the intermediate layer.
        assert!((total_area_mm2(&storage[intermediate[9]].polygons) - 2000.0).abs() < 1.0);
        assert!((total_area_mm2(&storage[intermediate[0]].polygons) - 3600.0).abs() < 0.01);
    }

    #[test]
    fn test_base_interfaces_below_interfaces() {
        let mut storage = LayerStorage::new();
        let (intermediate, top) = stack(&mut storage);
        let p = params(
            SupportConfig::default()
                .with_interface_layers(3, Some(0))
                .with_base_interface_layers(1, 0),
        );
        let out = generate_interface_layers(&p, &mut storage, &[], &top, OrganicInterfaces::default(), &intermediate);
        assert_eq!(out.interface_layers.len(), 2);
        assert_eq!(out.base_interface_layers.len(), 1);
        let base = &storage[out.base_interface_layers[0]];
        assert_eq!(base.layer_type, SupportLayerType::Base);
        assert!((base.print_z - 1.6).abs() < 1e-9);
    }

    #[test]
    fn test_bottom_interfaces_above_bottom_contact() {
        let mut storage = LayerStorage::new();
        let (intermediate, _) = stack(&mut storage);
        let bottom = storage.allocate_unguarded(
            SupportGeneratorLayer::new(SupportLayerType::BottomContact)
                .with_z(0.2, 0.0, 0.2)
                .with_polygons(vec![rect(0.0, 0.0, 20.0, 20.0)]),
        );
        let p = params(SupportConfig::default().with_interface_layers(0, Some(2)));
        let out = generate_interface_layers(&p, &mut storage, &[bottom], &[], OrganicInterfaces::default(), &intermediate);
        assert_eq!(out.interface_layers.len(), 2);
        for layer in storage.layers(&out.interface_layers) {
            assert_eq!(layer.layer_type, SupportLayerType::BottomInterface);
            // The two layers right above the contact.
            assert!(layer.print_z > 0.3 && layer.print_z < 0.7);
        }
    }

    #[test]
    fn test_organic_interface_reused() {
        let mut storage = LayerStorage::new();
        let (intermediate, top) = stack(&mut storage);
        let organic = storage.allocate_unguarded(
            SupportGeneratorLayer::new(SupportLayerType::TopInterface)
                .with_z(2.0, 1.8, 0.2)
                .with_polygons(vec![rect(55.0, 55.0, 58.0, 58.0)]),
        );
        let p = params(SupportConfig::default().with_interface_layers(1, Some(0)));
        let organic_list = [organic];
        let out = generate_interface_layers(
            &p,
            &mut storage,
            &[],
            &top,
            OrganicInterfaces {
                top_interface_layers: &organic_list,
                top_base_interface_layers: &[],
            },
            &intermediate,
        );
        assert_eq!(out.interface_layers, vec![organic]);
        assert_eq!(storage[organic].polygons.len(), 2);
    }
}
