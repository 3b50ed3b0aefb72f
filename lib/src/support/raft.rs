//! Raft under the object and support.
//!
//! A raft of more than one layer is a stack of base layers printed with the
//! support flow, topped by interface layers printed with the interface
//! flow. The raft contact layer itself is the lowest top contact and is not
//! generated here.
//!
//! Without a raft (or with a single raft layer, which is printed like a
//! plain first layer) the first support layer is expanded in small steps,
//! each trimmed by the object's first layer, and kept clear of the brim.

use super::layer::{LayerHandle, LayerList, LayerStorage, SupportGeneratorLayer, SupportLayerType};
use super::params::SupportParameters;
use crate::clipper::{diff, offset_ex, offset_polygons, union, union_ex, OffsetJoinType};
use crate::geometry::{ExPolygon, ExPolygons, Polygon};
use crate::print::PrintObject;
use crate::slice::SlicingParams;
use crate::{scale, CoordF, EPSILON, SCALED_EPSILON};

/// Raft layers ready to be stored, plus updated regions of existing
/// support layers.
#[derive(Debug, Default)]
pub struct RaftStack {
    /// New raft layers, bottom to top.
    pub layers: Vec<SupportGeneratorLayer>,
    /// Support layers whose regions were trimmed or expanded.
    pub trimmed: Vec<(LayerHandle, ExPolygons)>,
}

impl RaftStack {
    /// Apply the trimmed regions and store the raft layers. Returns the
    /// raft layer list, bottom to top.
    pub fn commit(self, storage: &mut LayerStorage) -> LayerList {
        for (handle, polygons) in self.trimmed {
            storage[handle].polygons = polygons;
        }
        self.layers
            .into_iter()
            .map(|layer| storage.allocate_unguarded(layer))
            .collect()
    }
}

/// Region covered by the brim around the first layer islands, empty when
/// no brim is printed.
pub fn brim_region(object: &PrintObject) -> ExPolygons {
    if !object.has_brim() {
        return Vec::new();
    }
    let brim = object.brim();
    let gap = brim.brim_object_gap;
    let mut region = ExPolygons::new();
    for island in object.first_layer_islands() {
        if brim.outer() && brim.inner() {
            region.extend(offset_ex(std::slice::from_ref(&island), gap, OffsetJoinType::Miter));
            continue;
        }
        let contour = if brim.outer() {
            offset_polygons(std::slice::from_ref(&island.contour), gap, OffsetJoinType::Round)
        } else {
            vec![ExPolygon::new(island.contour.clone())]
        };
        let holes: Vec<Polygon> = island
            .holes
            .iter()
            .map(|hole| {
                let mut hole = hole.clone();
                hole.make_counter_clockwise();
                hole
            })
            .collect();
        let holes = if brim.inner() {
            offset_polygons(&holes, -gap, OffsetJoinType::Round)
        } else {
            holes.into_iter().map(ExPolygon::new).collect()
        };
        region.extend(diff(&contour, &holes));
    }
    union_ex(&region)
}

/// Lowest layer of a sorted list, if it satisfies `pred`.
fn front_if(
    storage: &LayerStorage,
    list: &[LayerHandle],
    pred: impl Fn(&SupportGeneratorLayer) -> bool,
) -> Option<LayerHandle> {
    list.first().copied().filter(|&h| pred(&storage[h]))
}

/// Grow `polygons` by `inflate` mm, trimming by `trimming` after every
/// step. Small steps keep the expansion from leaking through thin object
/// walls.
fn inflate_in_steps(
    mut polygons: ExPolygons,
    inflate: CoordF,
    params: &SupportParameters,
    trimming: &[ExPolygon],
) -> ExPolygons {
    if scale(inflate) <= SCALED_EPSILON {
        return if trimming.is_empty() { polygons } else { diff(&polygons, trimming) };
    }
    let nsteps = ((inflate / params.first_layer_flow.width()).ceil() as usize).max(5);
    let step = inflate / nsteps as CoordF;
    for _ in 0..nsteps {
        polygons = offset_ex(&polygons, step, OffsetJoinType::Miter);
        if !trimming.is_empty() {
            polygons = diff(&polygons, trimming);
        }
    }
    polygons
}

/// Build the raft under the support columns.
///
/// All lists must be sorted by `print_z`. `base_layers` are the
/// intermediate support layers.
#[allow(clippy::too_many_arguments)]
pub fn generate_raft_base(
    object: &PrintObject,
    params: &SupportParameters,
    slicing: &SlicingParams,
    storage: &LayerStorage,
    top_contacts: &[LayerHandle],
    interface_layers: &[LayerHandle],
    base_interface_layers: &[LayerHandle],
    base_layers: &[LayerHandle],
) -> RaftStack {
    let brim = brim_region(object);

    // Growth of the columns to make them stable, and of the first layer.
    let inflate_factor_fine = if slicing.raft_layers() > 1 { 0.5 } else { EPSILON };
    let inflate_factor_1st_layer = (params.raft_first_layer_expansion - inflate_factor_fine).max(0.0);

    let contacts = front_if(storage, top_contacts, |l| {
        l.print_z <= slicing.first_print_layer_height.max(slicing.raft_contact_top_z) + EPSILON
    });
    let below_raft_top = |l: &SupportGeneratorLayer| l.bottom_print_z() <= slicing.raft_interface_top_z + EPSILON;
    let interfaces = front_if(storage, interface_layers, below_raft_top);
    let base_interfaces = front_if(storage, base_interface_layers, below_raft_top);
    let columns_base = front_if(storage, base_layers, below_raft_top);

    let mut interface_polygons = ExPolygons::new();
    for handle in [contacts, interfaces, base_interfaces].into_iter().flatten() {
        let polygons = &storage[handle].polygons;
        if !polygons.is_empty() {
            interface_polygons.extend(offset_ex(polygons, inflate_factor_fine, OffsetJoinType::Square));
        }
    }
    let interface_polygons = union_ex(&interface_polygons);

    let mut stack = RaftStack::default();

    if slicing.raft_layers() > 1 {
        let mut base = ExPolygons::new();
        let mut columns = ExPolygons::new();
        let mut first_layer = ExPolygons::new();
        if let Some(handle) = columns_base {
            let layer = &storage[handle];
            if layer.bottom_print_z() > slicing.raft_interface_top_z - EPSILON {
                // Columns standing on the raft.
                base = layer.polygons.clone();
                columns = if interface_polygons.is_empty() {
                    base.clone()
                } else {
                    diff(&base, &interface_polygons)
                };
            } else {
                // Organic trunks standing on the bed next to the raft.
                first_layer = layer.polygons.clone();
            }
        }
        if !interface_polygons.is_empty() {
            base = union(&base, &interface_polygons);
        }

        let first_layer_type = if slicing.base_raft_layers > 0 {
            SupportLayerType::RaftBase
        } else {
            SupportLayerType::RaftInterface
        };
        let first_layer = union(&first_layer, &base);
        let first_layer = inflate_in_steps(first_layer, inflate_factor_1st_layer, params, &[]);
        let first_z = slicing.first_print_layer_height;
        stack.layers.push(
            SupportGeneratorLayer::new(first_layer_type)
                .with_z(first_z, 0.0, first_z)
                .with_polygons(first_layer),
        );

        let mut print_z = first_z;
        for _ in 1..slicing.base_raft_layers {
            let height = slicing.base_raft_layer_height;
            stack.layers.push(
                SupportGeneratorLayer::new(SupportLayerType::RaftBase)
                    .with_z(print_z + height, print_z, height)
                    .with_polygons(base.clone()),
            );
            print_z += height;
        }
        for _ in 1..slicing.interface_raft_layers {
            let height = slicing.interface_raft_layer_height;
            let mut layer = SupportGeneratorLayer::new(SupportLayerType::RaftInterface)
                .with_z(print_z + height, print_z, height)
                .with_polygons(interface_polygons.clone());
            // Support columns cutting through the raft interface.
            layer.contact_polygons = Some(columns.clone());
            stack.layers.push(layer);
            print_z += height;
        }
        log::debug!("Generated {} raft layers", stack.layers.len());
    } else {
        let mut columns_polygons = None;
        if let Some(handle) = columns_base {
            let first_layer_islands = object.first_layer_islands();
            let trimming = offset_ex(&first_layer_islands, params.gap_xy_first_layer, OffsetJoinType::Square);
            let mut raft = inflate_in_steps(storage[handle].polygons.clone(), inflate_factor_1st_layer, params, &trimming);
            if !interface_polygons.is_empty() {
                raft = diff(&raft, &interface_polygons);
            }
            columns_polygons = Some((handle, raft));
        }
        if !brim.is_empty() {
            if let Some((_, raft)) = columns_polygons.as_mut() {
                *raft = diff(raft, &brim);
            }
            for handle in [contacts, interfaces, base_interfaces].into_iter().flatten() {
                stack.trimmed.push((handle, diff(&storage[handle].polygons, &brim)));
            }
        }
        stack.trimmed.extend(columns_polygons);
    }
    stack
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipper::{polygons_overlap, total_area_mm2};
    use crate::geometry::Point;
    use crate::print::{BrimConfig, BrimType};
    use crate::slice::{Layer, LayerRegion};
    use crate::support::SupportConfig;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> ExPolygon {
        ExPolygon::rectangle(Point::new_scale(x0, y0), Point::new_scale(x1, y1))
    }

    fn object(slicing: &SlicingParams, brim: BrimConfig) -> PrintObject {
        let mut first = Layer::new(0, slicing.object_print_z_min + 0.2, 0.2);
        first.add_region(LayerRegion::with_slices(vec![rect(0.0, 0.0, 20.0, 20.0)], 0.4));
        PrintObject::new(vec![first], slicing.clone()).with_brim(brim)
    }

    fn params(slicing: &SlicingParams) -> SupportParameters {
        SupportParameters::new(&SupportConfig::default(), slicing).unwrap()
    }

    fn layer(storage: &mut LayerStorage, layer_type: SupportLayerType, print_z: f64, height: f64, region: ExPolygon) -> LayerHandle {
        storage.allocate_unguarded(
            SupportGeneratorLayer::new(layer_type)
                .with_z(print_z, print_z - height, height)
                .with_polygons(vec![region]),
        )
    }

    #[test]
    fn test_brim_region() {
        let slicing = SlicingParams::default();
        let none = object(&slicing, BrimConfig::default());
        assert!(brim_region(&none).is_empty());
        let outer = object(&slicing, BrimConfig::new(BrimType::OuterOnly, 5.0, 1.0));
        let area = total_area_mm2(&brim_region(&outer));
        assert!(area > 400.0 && area < 22.0 * 22.0, "area {}", area);
    }

    #[test]
    fn test_multi_layer_raft_stack() {
        let slicing = SlicingParams::with_layer_heights(0.2, 0.25).raft(4, 0.4);
        let object = object(&slicing, BrimConfig::default());
        let mut storage = LayerStorage::new();
        let contact_z = slicing.raft_contact_top_z;
        let contact = layer(&mut storage, SupportLayerType::TopContact, contact_z, 0.3, rect(30.0, 0.0, 40.0, 10.0));
        let column = layer(&mut storage, SupportLayerType::Base, contact_z + 0.5, 0.2, rect(50.0, 0.0, 60.0, 10.0));
        let p = params(&slicing);
        let stack = generate_raft_base(&object, &p, &slicing, &storage, &[contact], &[], &[], &[column]);
        // Base layers and interface layers below the contact layer.
        assert_eq!(stack.layers.len(), slicing.raft_layers() - 1);
        assert_eq!(stack.layers[0].layer_type, SupportLayerType::RaftBase);
        assert!((stack.layers[0].print_z - 0.25).abs() < 1e-9);
        assert_eq!(stack.layers[0].bottom_z, 0.0);
        for pair in stack.layers.windows(2) {
            assert!((pair[1].bottom_z - pair[0].print_z).abs() < 1e-9);
        }
        let top = stack.layers.last().unwrap();
        assert_eq!(top.layer_type, SupportLayerType::RaftInterface);
        assert!((top.print_z - slicing.raft_interface_top_z).abs() < 1e-9);
        assert!(top.contact_polygons.is_some());
        // The first layer is expanded beyond the contact.
        assert!(total_area_mm2(&stack.layers[0].polygons) > 100.0);
        assert!(stack.trimmed.is_empty());

        let raft = stack.commit(&mut storage);
        assert_eq!(raft.len(), slicing.raft_layers() - 1);
    }

    #[test]
    fn test_single_layer_expansion_avoids_object() {
        let slicing = SlicingParams::with_layer_heights(0.2, 0.2);
        let object = object(&slicing, BrimConfig::default());
        let mut storage = LayerStorage::new();
        let column = layer(&mut storage, SupportLayerType::Base, 0.2, 0.2, rect(22.0, 0.0, 30.0, 10.0));
        let p = params(&slicing);
        let stack = generate_raft_base(&object, &p, &slicing, &storage, &[], &[], &[], &[column]);
        assert!(stack.layers.is_empty());
        assert_eq!(stack.trimmed.len(), 1);
        let (handle, expanded) = &stack.trimmed[0];
        assert_eq!(*handle, column);
        assert!(total_area_mm2(expanded) > 80.0);
        assert!(!polygons_overlap(expanded, &object.first_layer_islands()));
    }

    #[test]
    fn test_brim_trims_first_layer_support() {
        let slicing = SlicingParams::with_layer_heights(0.2, 0.2);
        let brim = BrimConfig::new(BrimType::OuterOnly, 5.0, 3.0);
        let object = object(&slicing, brim);
        let mut storage = LayerStorage::new();
        let contact = layer(&mut storage, SupportLayerType::TopContact, 0.2, 0.2, rect(18.0, 0.0, 30.0, 10.0));
        let p = params(&slicing);
        let stack = generate_raft_base(&object, &p, &slicing, &storage, &[contact], &[], &[], &[]);
        assert_eq!(stack.trimmed.len(), 1);
        let region = brim_region(&object);
        assert!(!polygons_overlap(&stack.trimmed[0].1, &region));
    }
}
