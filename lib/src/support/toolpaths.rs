//! Toolpaths of the assembled support layers.
//!
//! Raft layers are filled first. For every other support layer the layers
//! of all lists sitting at its `print_z` are collected, merged where they
//! print alike and filled. Contact layers are not synchronized with the
//! rest, so in a last pass their extrusion height is modulated over the
//! layers they overlap in Z.

use super::fill::{fill_expolygons_generate_paths, fill_expolygons_with_sheath_generate_paths};
use super::layer::{LayerHandle, LayerList, LayerStorage, SupportGeneratorLayer, SupportLayerLists, SupportLayerType};
use super::loop_interface::LoopInterfaceProcessor;
use super::modulate::modulate_extrusion_by_overlapping_layers;
use super::params::SupportParameters;
use super::tree_paths::tree_supports_generate_paths;
use super::SupportStyle;
use crate::clipper::{diff, union_ex, union_safety_offset_ex};
use crate::extrusion::{ExtrusionEntityCollection, ExtrusionRole};
use crate::flow::Flow;
use crate::geometry::{ExPolygon, ExPolygons};
use crate::infill::{new_from_type, Fill, FillParams, InfillPattern};
use crate::print::PrintObject;
use crate::slice::SlicingParams;
use crate::{CoordF, Result, EPSILON};
use rayon::prelude::*;
use std::f64::consts::FRAC_PI_2;

/// A generator layer being turned into extrusions.
///
/// Holds a copy of the source layer. Merging moves regions between copies,
/// the final regions are written back to the storage afterwards.
#[derive(Debug, Clone, Default)]
pub struct SupportGeneratorLayerExtruded {
    handle: Option<LayerHandle>,
    /// Copy of the source layer. Carries the Z range and the bridging flag.
    pub layer: Option<SupportGeneratorLayer>,
    pub extrusions: ExtrusionEntityCollection,
    /// Part of the layer still to be filled, once something else (the
    /// contact loops) took a share of it.
    polygons_to_extrude: Option<ExPolygons>,
}

impl SupportGeneratorLayerExtruded {
    pub fn new(storage: &LayerStorage, handle: LayerHandle) -> Self {
        Self {
            handle: Some(handle),
            layer: Some(storage[handle].clone()),
            ..Default::default()
        }
    }

    /// A layer not backed by the storage.
    pub fn from_layer(layer: SupportGeneratorLayer) -> Self {
        Self {
            layer: Some(layer),
            ..Default::default()
        }
    }

    pub fn handle(&self) -> Option<LayerHandle> {
        self.handle
    }

    pub fn is_empty(&self) -> bool {
        self.layer.as_ref().map_or(true, SupportGeneratorLayer::is_empty)
    }

    pub fn polygons_to_extrude(&self) -> &[ExPolygon] {
        match (&self.polygons_to_extrude, &self.layer) {
            (Some(polygons), _) => polygons,
            (None, Some(layer)) => &layer.polygons,
            (None, None) => &[],
        }
    }

    pub fn set_polygons_to_extrude(&mut self, polygons: ExPolygons) {
        self.polygons_to_extrude = Some(polygons);
    }

    /// Regions to fill together with the collection to fill them into.
    fn split_mut(&mut self) -> (&[ExPolygon], &mut ExtrusionEntityCollection) {
        let polygons: &[ExPolygon] = match (&self.polygons_to_extrude, &self.layer) {
            (Some(polygons), _) => polygons,
            (None, Some(layer)) => &layer.polygons,
            (None, None) => &[],
        };
        (polygons, &mut self.extrusions)
    }

    /// Both layers print something with the same height and flow type.
    pub fn could_merge(&self, other: &Self) -> bool {
        match (&self.layer, &other.layer) {
            (Some(a), Some(b)) => {
                !a.is_empty()
                    && !b.is_empty()
                    && (a.height - b.height).abs() < EPSILON
                    && a.bridging == b.bridging
            }
            _ => false,
        }
    }

    /// Take over the regions and extrusions of `other`, leaving it empty.
    pub fn merge(&mut self, other: &mut Self) {
        let (Some(layer), Some(other_layer)) = (self.layer.as_mut(), other.layer.as_mut()) else {
            return;
        };
        if let Some(other_to_extrude) = other.polygons_to_extrude.take() {
            let mut to_extrude = self
                .polygons_to_extrude
                .take()
                .unwrap_or_else(|| layer.polygons.clone());
            to_extrude.extend(other_to_extrude);
            self.polygons_to_extrude = Some(union_safety_offset_ex(&to_extrude));
        } else if let Some(to_extrude) = self.polygons_to_extrude.as_mut() {
            to_extrude.extend(other_layer.polygons.iter().cloned());
            *to_extrude = union_safety_offset_ex(to_extrude);
        }
        self.extrusions.extend(std::mem::take(&mut other.extrusions));
        let mut polygons = std::mem::take(&mut layer.polygons);
        polygons.append(&mut other_layer.polygons);
        layer.polygons = union_safety_offset_ex(&polygons);
    }
}

/// How a contact or interface layer is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceExtrusionType {
    TopContact,
    BottomContact,
    /// Top contact sitting on the raft.
    RaftContact,
    Interface,
    /// Filled like a base layer when no interfaces are configured.
    InterfaceAsBase,
}

impl InterfaceExtrusionType {
    pub fn role(self) -> ExtrusionRole {
        match self {
            Self::InterfaceAsBase => ExtrusionRole::SupportMaterial,
            _ => ExtrusionRole::SupportMaterialInterface,
        }
    }

    /// Non-bridging flow, spacing and density of this type.
    fn flow_and_density(self, params: &SupportParameters) -> (&Flow, CoordF) {
        match self {
            Self::RaftContact => (&params.raft_interface_flow, params.raft_interface_density),
            Self::InterfaceAsBase => (&params.support_material_flow, params.support_density),
            _ => (&params.support_material_interface_flow, params.interface_density),
        }
    }
}

/// A non-empty layer printed at a support layer, with the layers below it
/// it overlaps in Z.
struct LayerCacheItem {
    extruded: SupportGeneratorLayerExtruded,
    overlapping: LayerList,
}

#[derive(Default)]
struct LayerCache {
    /// Thickest first.
    items: Vec<LayerCacheItem>,
    /// Regions of the touched layers after merging.
    updated: Vec<(LayerHandle, ExPolygons)>,
    islands: ExPolygons,
}

struct ToolpathContext<'a> {
    params: &'a SupportParameters,
    slicing: &'a SlicingParams,
    storage: &'a LayerStorage,
    lists: &'a SupportLayerLists,
    angles: Vec<CoordF>,
    loop_interface: LoopInterfaceProcessor,
    filler_interface: Box<dyn Fill>,
    filler_first_layer: Box<dyn Fill>,
    filler_raft_contact: Box<dyn Fill>,
    filler_raft_interface: Box<dyn Fill>,
    filler_base_interface: Box<dyn Fill>,
    filler_support: Box<dyn Fill>,
}

/// Generate the extrusions of all support layers registered on `object`.
///
/// The lists must be sorted by the layer ordering and the support layers
/// assembled from them. Regions merged while filling are written back to
/// `storage`.
pub fn generate_support_toolpaths(
    object: &mut PrintObject,
    params: &SupportParameters,
    slicing: &SlicingParams,
    storage: &mut LayerStorage,
    lists: &SupportLayerLists,
) -> Result<()> {
    let mut loop_interface =
        LoopInterfaceProcessor::new(1.5 * params.support_material_interface_flow.scaled_width() as CoordF);
    if params.loop_interface {
        loop_interface = loop_interface.with_contact_loops(params.num_contact_loops.max(1));
    }
    let raft_contact_pattern = if params.num_top_interface_layers == 0 {
        params.raft_interface_fill_pattern
    } else {
        params.contact_fill_pattern
    };
    let base_interface_pattern = if params.interface_density > 0.95 || params.with_sheath {
        InfillPattern::Rectilinear
    } else {
        InfillPattern::SupportBase
    };

    let support_layers: Vec<(CoordF, usize)> =
        object.support_layers().iter().map(|l| (l.print_z, l.interface_id)).collect();
    let n_raft = support_layers.len().min(slicing.raft_layers().saturating_sub(1));

    let caches: Vec<LayerCache> = {
        let ctx = ToolpathContext {
            params,
            slicing,
            storage,
            lists,
            angles: params.base_angles(),
            loop_interface,
            filler_interface: new_from_type(params.contact_fill_pattern),
            filler_first_layer: new_from_type(InfillPattern::Rectilinear),
            filler_raft_contact: new_from_type(raft_contact_pattern),
            filler_raft_interface: new_from_type(params.raft_interface_fill_pattern),
            filler_base_interface: new_from_type(base_interface_pattern),
            filler_support: new_from_type(params.base_fill_pattern),
        };

        let raft_fills = (0..n_raft)
            .into_par_iter()
            .map(|id| ctx.raft_layer_toolpaths(id, support_layers[id].0, support_layers[id].1))
            .collect::<Result<Vec<_>>>()?;
        for (support_layer, fills) in object.support_layers_mut().iter_mut().zip(raft_fills) {
            support_layer.support_fills = fills;
        }

        (n_raft..support_layers.len())
            .into_par_iter()
            .map(|id| ctx.layer_cache(id, support_layers[id].0, support_layers[id].1))
            .collect::<Result<Vec<_>>>()?
    };

    // Merging is done, overlapping layers are read from the storage now.
    let mut num_items = 0;
    for cache in &caches {
        num_items += cache.items.len();
        for (handle, polygons) in &cache.updated {
            storage[*handle].polygons = polygons.clone();
        }
    }
    log::debug!(
        "Support toolpaths: {} raft layers, {} extruded layers over {} support layers",
        n_raft,
        num_items,
        support_layers.len()
    );

    let storage: &LayerStorage = storage;
    let nozzle_diameter = params.support_material_flow.nozzle_diameter();
    object.support_layers_mut()[n_raft..]
        .par_iter_mut()
        .zip(caches.into_par_iter())
        .for_each(|(support_layer, cache)| {
            for mut item in cache.items {
                if let Some(layer) = item.extruded.layer.as_ref() {
                    let overlapping: Vec<&SupportGeneratorLayer> =
                        item.overlapping.iter().map(|&h| &storage[h]).collect();
                    modulate_extrusion_by_overlapping_layers(
                        &mut item.extruded.extrusions,
                        layer,
                        &overlapping,
                        nozzle_diameter,
                    );
                }
                support_layer.support_fills.extend(item.extruded.extrusions);
            }
            support_layer.support_islands = cache.islands;
        });
    Ok(())
}

impl ToolpathContext<'_> {
    /// Raft layer `id`: the flange, the raft base or the raft interface,
    /// with tree branches cutting through.
    fn raft_layer_toolpaths(&self, id: usize, print_z: CoordF, interface_id: usize) -> Result<ExtrusionEntityCollection> {
        let params = self.params;
        let mut dst = ExtrusionEntityCollection::new();
        let Some(&raft_handle) = self.lists.raft_layers.get(id) else {
            log::warn!("Support layer {} has no raft layer", id);
            return Ok(dst);
        };
        let raft = &self.storage[raft_handle];
        let tree_polygons: &[ExPolygon] = match self.lists.intermediate_layers.get(id) {
            Some(&h) if id > 0 && self.storage[h].is_at(print_z) => &self.storage[h].polygons,
            _ => &[],
        };
        let trimmed = |polygons: &[ExPolygon]| {
            if tree_polygons.is_empty() {
                polygons.to_vec()
            } else {
                diff(polygons, tree_polygons)
            }
        };
        let nozzle_diameter = params.support_material_flow.nozzle_diameter();

        if id > 0 {
            // Support columns below the raft interface.
            let to_infill: &[ExPolygon] = if id < self.slicing.base_raft_layers {
                &raft.polygons
            } else {
                raft.contact_polygons.as_deref().unwrap_or(&[])
            };
            let flow = Flow::new(params.support_material_flow.width(), raft.height, nozzle_diameter)?;
            if !to_infill.is_empty() {
                fill_expolygons_with_sheath_generate_paths(
                    &mut dst,
                    &trimmed(to_infill),
                    self.filler_support.as_ref(),
                    &FillParams::new(params.support_density, params.raft_angle_base, params.support_material_flow.spacing()),
                    ExtrusionRole::SupportMaterial,
                    &flow,
                    params,
                    params.with_sheath,
                    false,
                );
            }
            if !tree_polygons.is_empty() {
                tree_supports_generate_paths(&mut dst, tree_polygons, &flow, params.tree_branch_diameter_double_wall_area_scaled);
            }
        }

        let (fill_params, flow) = if id == 0 {
            // Flange.
            (
                FillParams::new(
                    params.raft_first_layer_density,
                    params.raft_angle_1st_layer,
                    params.first_layer_flow.spacing(),
                ),
                params.first_layer_flow,
            )
        } else if id >= self.slicing.base_raft_layers {
            // Constant spacing keeps the raft interface lines aligned.
            (
                FillParams::new(
                    params.raft_interface_density,
                    params.raft_interface_angle(interface_id),
                    params.support_material_flow.spacing(),
                ),
                Flow::new(params.raft_interface_flow.width(), raft.height, nozzle_diameter)?,
            )
        } else {
            return Ok(dst);
        };
        let role = if id < self.slicing.base_raft_layers {
            ExtrusionRole::SupportMaterial
        } else {
            ExtrusionRole::SupportMaterialInterface
        };
        fill_expolygons_with_sheath_generate_paths(
            &mut dst,
            &trimmed(&raft.polygons),
            self.filler_raft_interface.as_ref(),
            &fill_params,
            role,
            &flow,
            params,
            id == 0,
            id == 0,
        );
        Ok(dst)
    }

    /// Collect, merge and fill the layers printed at support layer `id`.
    fn layer_cache(&self, id: usize, print_z: CoordF, interface_id: usize) -> Result<LayerCache> {
        let params = self.params;
        let storage = self.storage;
        let lists = self.lists;

        // First layer of each list at this height.
        let find = |list: &LayerList| -> (usize, SupportGeneratorLayerExtruded) {
            let idx = storage.partition_point(list, |l| l.print_z >= print_z - EPSILON);
            let layer = list
                .get(idx)
                .filter(|&&h| storage[h].print_z < print_z + EPSILON)
                .map(|&h| SupportGeneratorLayerExtruded::new(storage, h))
                .unwrap_or_default();
            (idx, layer)
        };
        let (_, mut bottom_contact) = find(&lists.bottom_contacts);
        let (idx_top_contact, mut top_contact) = find(&lists.top_contacts);
        let (idx_intermediate, mut base) = find(&lists.intermediate_layers);
        let (idx_interface, mut interface) = find(&lists.interface_layers);
        let (idx_base_interface, mut base_interface) = find(&lists.base_interface_layers);

        let raft_contact = self.slicing.interface_raft_layers > 0
            && top_contact
                .layer
                .as_ref()
                .map_or(false, |l| l.is_at(self.slicing.raft_contact_top_z));
        let top_interfaces = params.num_top_interface_layers > 0;
        let bottom_interfaces = top_interfaces && params.num_bottom_interface_layers > 0;

        if !top_interfaces {
            // The contact prints like a base layer. Raft contacts stay apart.
            if params.can_merge_support_regions && !raft_contact {
                if base.could_merge(&top_contact) {
                    base.merge(&mut top_contact);
                } else if base.is_empty() {
                    base = std::mem::take(&mut top_contact);
                }
            }
        } else {
            self.loop_interface
                .generate(&mut top_contact, &params.support_material_interface_flow)?;
            // The contact is not synchronized with the other layers, the
            // merged layer trims the layers overlapping it.
            if top_contact.could_merge(&interface) && !raft_contact {
                top_contact.merge(&mut interface);
            }
        }
        if (!top_interfaces || params.num_bottom_interface_layers == 0) && params.can_merge_support_regions {
            if base.could_merge(&bottom_contact) {
                base.merge(&mut bottom_contact);
            } else if base.is_empty()
                && !bottom_contact.is_empty()
                && !bottom_contact.layer.as_ref().map_or(false, |l| l.bridging)
            {
                base = std::mem::take(&mut bottom_contact);
            }
        } else if bottom_contact.could_merge(&top_contact) && !raft_contact {
            top_contact.merge(&mut bottom_contact);
        } else if bottom_contact.could_merge(&interface) {
            bottom_contact.merge(&mut interface);
        }

        let top_type = if raft_contact {
            InterfaceExtrusionType::RaftContact
        } else if top_interfaces {
            InterfaceExtrusionType::TopContact
        } else {
            InterfaceExtrusionType::InterfaceAsBase
        };
        let bottom_type = if bottom_interfaces {
            InterfaceExtrusionType::BottomContact
        } else {
            InterfaceExtrusionType::InterfaceAsBase
        };
        let interface_type = if top_interfaces {
            InterfaceExtrusionType::Interface
        } else {
            InterfaceExtrusionType::InterfaceAsBase
        };
        self.extrude_interface(&mut top_contact, top_type, id, interface_id)?;
        self.extrude_interface(&mut bottom_contact, bottom_type, id, interface_id)?;
        self.extrude_interface(&mut interface, interface_type, id, interface_id)?;
        self.extrude_base_interface(&mut base_interface, interface_id)?;
        self.extrude_base(&mut base, id, print_z)?;

        // Avoid a retraction between base interface and base.
        if !base.polygons_to_extrude().is_empty()
            && !base_interface.polygons_to_extrude().is_empty()
            && base.could_merge(&base_interface)
        {
            base.merge(&mut base_interface);
        }

        let mut cache = LayerCache::default();
        let mut islands = ExPolygons::new();
        for extruded in [bottom_contact, top_contact, interface, base_interface, base] {
            if let (Some(handle), Some(layer)) = (extruded.handle, extruded.layer.as_ref()) {
                cache.updated.push((handle, layer.polygons.clone()));
            }
            if extruded.is_empty() {
                continue;
            }
            let Some(layer) = extruded.layer.as_ref() else {
                continue;
            };
            islands.extend(layer.polygons.iter().cloned());

            // Layers below sharing a Z range with this one.
            let bottom_z = layer.bottom_print_z() + EPSILON;
            let mut overlapping = LayerList::new();
            let mut add_overlapping = |list: &LayerList, idx_top: usize| {
                overlapping.extend(
                    list[..idx_top.min(list.len())]
                        .iter()
                        .rev()
                        .take_while(|&&h| storage[h].print_z > bottom_z),
                );
            };
            add_overlapping(&lists.top_contacts, idx_top_contact);
            if layer.layer_type == SupportLayerType::BottomContact {
                // A bottom contact may overlap base layers turned interface.
                add_overlapping(&lists.intermediate_layers, idx_intermediate);
                add_overlapping(&lists.interface_layers, idx_interface);
                add_overlapping(&lists.base_interface_layers, idx_base_interface);
            }
            storage.sort(&mut overlapping);
            cache.items.push(LayerCacheItem { extruded, overlapping });
        }
        cache.items.sort_by(|a, b| {
            let height = |item: &LayerCacheItem| item.extruded.layer.as_ref().map_or(0.0, |l| l.height);
            height(b).total_cmp(&height(a))
        });
        if !islands.is_empty() {
            cache.islands = union_ex(&islands);
        }
        Ok(cache)
    }

    fn extrude_interface(
        &self,
        layer_ex: &mut SupportGeneratorLayerExtruded,
        kind: InterfaceExtrusionType,
        id: usize,
        interface_id: usize,
    ) -> Result<()> {
        let params = self.params;
        let Some(layer) = layer_ex.layer.as_ref() else {
            return Ok(());
        };
        if layer.is_empty() || layer_ex.polygons_to_extrude().is_empty() {
            return Ok(());
        }
        let (base_flow, density) = kind.flow_and_density(params);
        // Bottom interfaces hang in the air.
        let flow = if layer.bridging {
            Flow::bridging_flow(layer.height, params.support_material_bottom_interface_flow.nozzle_diameter())
        } else {
            base_flow.with_height(layer.height)?
        };
        let (filler, angle) = match kind {
            InterfaceExtrusionType::InterfaceAsBase => {
                (self.filler_interface.as_ref(), self.angles[id % self.angles.len()])
            }
            InterfaceExtrusionType::RaftContact => {
                (self.filler_raft_contact.as_ref(), params.raft_interface_angle(interface_id))
            }
            _ => (self.filler_interface.as_ref(), params.support_interface_angle(interface_id)),
        };
        let fill_params = FillParams::new(density, angle, base_flow.spacing());
        let (polygons, extrusions) = layer_ex.split_mut();
        fill_expolygons_generate_paths(
            extrusions,
            &union_safety_offset_ex(polygons),
            filler,
            &fill_params,
            kind.role(),
            &flow,
        );
        Ok(())
    }

    /// Base interface layers between a soluble interface and the base.
    fn extrude_base_interface(&self, layer_ex: &mut SupportGeneratorLayerExtruded, interface_id: usize) -> Result<()> {
        let params = self.params;
        let Some(layer) = layer_ex.layer.as_ref() else {
            return Ok(());
        };
        if layer.is_empty() || layer_ex.polygons_to_extrude().is_empty() {
            return Ok(());
        }
        debug_assert!(!layer.bridging);
        let flow = params.support_material_flow.with_height(layer.height)?;
        let fill_params = FillParams::new(
            params.interface_density,
            params.support_interface_angle(interface_id),
            params.support_material_interface_flow.spacing(),
        );
        let (polygons, extrusions) = layer_ex.split_mut();
        fill_expolygons_generate_paths(
            extrusions,
            &union_safety_offset_ex(polygons),
            self.filler_base_interface.as_ref(),
            &fill_params,
            ExtrusionRole::SupportMaterial,
            &flow,
        );
        Ok(())
    }

    /// Base support, or the flange on the first layer.
    fn extrude_base(&self, layer_ex: &mut SupportGeneratorLayerExtruded, id: usize, print_z: CoordF) -> Result<()> {
        let params = self.params;
        let Some(layer) = layer_ex.layer.as_ref() else {
            return Ok(());
        };
        if layer.is_empty() || layer_ex.polygons_to_extrude().is_empty() {
            return Ok(());
        }
        debug_assert!(!layer.bridging);
        let first_layer = layer.bottom_z < EPSILON;
        let mut filler = self.filler_support.as_ref();
        // Constant spacing keeps the base lines aligned between layers.
        let mut fill_params = FillParams::new(
            params.support_density,
            self.angles[id % self.angles.len()],
            params.support_material_flow.spacing(),
        );
        let mut flow = params.support_material_flow.with_height(layer.height)?;
        let mut sheath = params.with_sheath;
        let mut no_sort = false;
        if first_layer {
            // Flange. Nothing to align with below it.
            filler = self.filler_first_layer.as_ref();
            flow = params.first_layer_flow;
            fill_params = FillParams::new(params.raft_first_layer_density, params.base_angle + FRAC_PI_2, flow.spacing());
            sheath = true;
            no_sort = true;
        } else if params.support_style == SupportStyle::Organic {
            // Tall trees get a double wall everywhere.
            let double_wall_area = if print_z > 100.0 {
                0.1
            } else {
                params.tree_branch_diameter_double_wall_area_scaled
            };
            let (polygons, extrusions) = layer_ex.split_mut();
            tree_supports_generate_paths(extrusions, polygons, &flow, double_wall_area);
            return Ok(());
        }
        let (polygons, extrusions) = layer_ex.split_mut();
        fill_expolygons_with_sheath_generate_paths(
            extrusions,
            polygons,
            filler,
            &fill_params,
            ExtrusionRole::SupportMaterial,
            &flow,
            params,
            sheath,
            no_sort,
        );
        Ok(())
    }
}
