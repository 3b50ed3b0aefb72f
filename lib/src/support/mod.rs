//! Support structure generation.
//!
//! This module turns detected support contacts into a printable support
//! stack, including:
//! - Bridge-aware refinement of top contacts
//! - Dense interface and base-interface layers
//! - A raft beneath the object
//! - Assembly of all layers into physical support layers
//! - Toolpaths for every support layer
//!
//! # Algorithm Overview
//!
//! 1. **Contact refinement**: Regions printed as anchored bridges are cut
//!    out of the top contacts.
//!
//! 2. **Contact merging**: Contact layers too close to each other to be
//!    printed separately are merged, contacts on the first layer are snapped
//!    onto it, and top contacts lose the regions of the bottom contacts they
//!    overlap.
//!
//! 3. **Interfaces**: The intermediate layers close to a contact are split
//!    into dense interface layers and base-interface layers.
//!
//! 4. **Raft**: Raft layers are stacked under the support columns, or the
//!    first support layer is widened when there is no raft.
//!
//! 5. **Assembly**: All layers are sorted by Z and grouped into physical
//!    support layers, each with an interface orientation id.
//!
//! 6. **Toolpaths**: Every support layer is filled. Contacts overlapping
//!    thinner layers below get a reduced extrusion height.
//!
//! Layers live in a [`LayerStorage`] arena and every stage passes around
//! [`LayerList`]s of handles into it.

pub mod assemble;
pub mod bridges;
pub mod contacts;
pub mod fill;
pub mod interface;
pub mod layer;
pub mod loop_interface;
pub mod modulate;
pub mod params;
pub mod raft;
pub mod toolpaths;
pub mod tree_paths;

pub use interface::{InterfaceLayers, OrganicInterfaces};
pub use layer::{
    LayerHandle, LayerList, LayerStorage, SupportGeneratorLayer, SupportLayerLists,
    SupportLayerType,
};
pub use loop_interface::LoopInterfaceProcessor;
pub use params::SupportParameters;
pub use raft::RaftStack;
pub use toolpaths::{InterfaceExtrusionType, SupportGeneratorLayerExtruded};

use crate::geometry::ExPolygons;
use crate::print::PrintObject;
use crate::slice::SlicingParams;
use crate::{scaled, Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Shape of the support columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SupportStyle {
    /// Columns follow the overhang projected onto a regular grid.
    #[default]
    Grid,
    /// Columns hug the overhang.
    Snug,
    /// Organic tree branches. Their layers are generated upstream and only
    /// merged here.
    Organic,
}

/// Pattern of the sparse support body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SupportBasePattern {
    #[default]
    Rectilinear,
    /// Rectilinear, alternating the angle between layers.
    RectilinearGrid,
    /// Not generated yet, rejected by [`SupportConfig::validate`].
    Honeycomb,
    /// Not generated yet, rejected by [`SupportConfig::validate`].
    Lightning,
    /// Hollow base, only walls. Not generated yet, rejected by
    /// [`SupportConfig::validate`].
    Hollow,
}

/// Pattern of the support interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SupportInterfacePattern {
    /// Concentric for soluble interfaces, rectilinear otherwise.
    #[default]
    Auto,
    Rectilinear,
    Concentric,
    /// Not generated yet, rejected by [`SupportConfig::validate`].
    RectilinearInterlaced,
    /// Not generated yet, rejected by [`SupportConfig::validate`].
    Grid,
}

/// Support generation configuration parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportConfig {
    /// Enable support generation. A raft is generated regardless.
    pub enable_support: bool,
    /// Support column style
    pub style: SupportStyle,
    /// Pattern of the support body
    pub base_pattern: SupportBasePattern,
    /// Pattern of the interfaces
    pub interface_pattern: SupportInterfacePattern,
    /// Wrap contact layers in loops following the overhang
    pub interface_loop_pattern: bool,
    /// Number of loops of a looped contact layer
    pub contact_loops: usize,
    /// Fill angle of the support body (degrees)
    pub support_angle: f64,
    /// Gap between support body lines (mm)
    pub base_pattern_spacing: f64,
    /// Gap between interface lines (mm), 0 = solid
    pub interface_spacing: f64,
    /// Number of dense interface layers under the object
    pub top_interface_layers: usize,
    /// Number of dense interface layers over the object, `None` = same as
    /// the top
    pub bottom_interface_layers: Option<usize>,
    /// Number of top interface layers printed with the body material
    pub top_base_interface_layers: usize,
    /// Number of bottom interface layers printed with the body material
    pub bottom_base_interface_layers: usize,
    /// Extruder of the support body, 0 = current
    pub support_extruder: usize,
    /// Extruder of the interfaces, 0 = current
    pub interface_extruder: usize,
    /// Closing distance when merging contacts (mm), `None` = derived
    pub closing_radius: Option<f64>,
    /// Print a perimeter around the support body
    pub with_sheath: bool,
    /// Do not support regions printed as anchored bridges
    pub dont_support_bridges: bool,
    /// Growth of the first raft layer (mm)
    pub raft_first_layer_expansion: f64,
    /// Fill density of the first raft layer (0.0 - 1.0]
    pub raft_first_layer_density: f64,
    /// Tree branches thicker than this get a second wall (mm), 0 = never
    pub tree_branch_diameter_double_wall: f64,
    /// Nozzle diameter (mm)
    pub nozzle_diameter: f64,
    /// Default line width (mm), 0 = nozzle diameter
    pub line_width: f64,
    /// Support line width (mm), 0 = default line width
    pub support_line_width: f64,
    /// First layer line width (mm), 0 = support line width
    pub initial_layer_line_width: f64,
    /// XY distance between support and object (mm)
    pub gap_xy: f64,
    /// XY distance between support and object on the first layer (mm)
    pub gap_xy_first_layer: f64,
    /// Flow ratio of bridging interfaces
    pub bridge_flow_ratio: f64,
    /// Print bridging interfaces with a round thread as thick as the nozzle
    pub thick_bridges: bool,
}

impl Default for SupportConfig {
    fn default() -> Self {
        Self {
            enable_support: true,
            style: SupportStyle::Grid,
            base_pattern: SupportBasePattern::Rectilinear,
            interface_pattern: SupportInterfacePattern::Auto,
            interface_loop_pattern: false,
            contact_loops: 1,
            support_angle: 0.0,
            base_pattern_spacing: 2.5,
            interface_spacing: 0.5,
            top_interface_layers: 3,
            bottom_interface_layers: None,
            top_base_interface_layers: 0,
            bottom_base_interface_layers: 0,
            support_extruder: 0,
            interface_extruder: 0,
            closing_radius: None,
            with_sheath: false,
            dont_support_bridges: true,
            raft_first_layer_expansion: 3.0,
            raft_first_layer_density: 0.9,
            tree_branch_diameter_double_wall: 3.0,
            nozzle_diameter: 0.4,
            line_width: 0.0,
            support_line_width: 0.0,
            initial_layer_line_width: 0.0,
            gap_xy: 0.8,
            gap_xy_first_layer: 0.8,
            bridge_flow_ratio: 1.0,
            thick_bridges: true,
        }
    }
}

impl SupportConfig {
    /// Builder method to set the support style
    pub fn with_style(mut self, style: SupportStyle) -> Self {
        self.style = style;
        self
    }

    /// Builder method to set the number of interface layers
    pub fn with_interface_layers(mut self, top: usize, bottom: Option<usize>) -> Self {
        self.top_interface_layers = top;
        self.bottom_interface_layers = bottom;
        self
    }

    /// Builder method to set the number of base-interface layers
    pub fn with_base_interface_layers(mut self, top: usize, bottom: usize) -> Self {
        self.top_base_interface_layers = top;
        self.bottom_base_interface_layers = bottom;
        self
    }

    /// Builder method to set the body and interface line gaps
    pub fn with_spacing(mut self, base_pattern_spacing: f64, interface_spacing: f64) -> Self {
        self.base_pattern_spacing = base_pattern_spacing;
        self.interface_spacing = interface_spacing;
        self
    }

    /// Builder method to enable looped contact layers
    pub fn with_contact_loops(mut self, contact_loops: usize) -> Self {
        self.interface_loop_pattern = contact_loops > 0;
        self.contact_loops = contact_loops;
        self
    }

    /// Builder method to wrap the support body in a sheath
    pub fn with_sheath(mut self, value: bool) -> Self {
        self.with_sheath = value;
        self
    }

    /// Builder method to set the support and interface extruders
    pub fn with_extruders(mut self, support: usize, interface: usize) -> Self {
        self.support_extruder = support;
        self.interface_extruder = interface;
        self
    }

    /// Check the configuration for values no support can be generated with.
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: f64) -> Result<()> {
            if value > 0.0 {
                Ok(())
            } else {
                Err(Error::Config(format!("{} must be positive, got {}", name, value)))
            }
        }
        fn non_negative(name: &str, value: f64) -> Result<()> {
            if value >= 0.0 {
                Ok(())
            } else {
                Err(Error::Config(format!("{} must not be negative, got {}", name, value)))
            }
        }

        positive("nozzle diameter", self.nozzle_diameter)?;
        positive("bridge flow ratio", self.bridge_flow_ratio)?;
        non_negative("support spacing", self.base_pattern_spacing)?;
        non_negative("interface spacing", self.interface_spacing)?;
        non_negative("line width", self.line_width)?;
        non_negative("support line width", self.support_line_width)?;
        non_negative("first layer line width", self.initial_layer_line_width)?;
        non_negative("support XY gap", self.gap_xy)?;
        non_negative("first layer support XY gap", self.gap_xy_first_layer)?;
        non_negative("raft first layer expansion", self.raft_first_layer_expansion)?;
        non_negative("tree branch double wall diameter", self.tree_branch_diameter_double_wall)?;
        if let Some(radius) = self.closing_radius {
            non_negative("closing radius", radius)?;
        }
        match self.base_pattern {
            SupportBasePattern::Rectilinear | SupportBasePattern::RectilinearGrid => {}
            pattern => {
                return Err(Error::Config(format!("support base pattern {:?} is not supported", pattern)));
            }
        }
        match self.interface_pattern {
            SupportInterfacePattern::Auto
            | SupportInterfacePattern::Rectilinear
            | SupportInterfacePattern::Concentric => {}
            pattern => {
                return Err(Error::Config(format!(
                    "support interface pattern {:?} is not supported",
                    pattern
                )));
            }
        }
        if !(self.raft_first_layer_density > 0.0 && self.raft_first_layer_density <= 1.0) {
            return Err(Error::Config(format!(
                "raft first layer density must be in (0, 1], got {}",
                self.raft_first_layer_density
            )));
        }
        Ok(())
    }
}

/// Contact layers detected upstream, allocated in `storage`.
#[derive(Debug, Default)]
pub struct SupportGenerationInput {
    pub storage: LayerStorage,
    /// Layers touching the object from below.
    pub top_contacts: LayerList,
    /// Layers standing on the object.
    pub bottom_contacts: LayerList,
    /// Support body layers between the contacts.
    pub intermediate_layers: LayerList,
    /// Interface layers produced by organic supports.
    pub top_interface_layers: LayerList,
    /// Base-interface layers produced by organic supports.
    pub top_base_interface_layers: LayerList,
}

impl SupportGenerationInput {
    pub fn new(storage: LayerStorage) -> Self {
        Self {
            storage,
            ..Default::default()
        }
    }
}

/// Layers of a finished support generation pass. The physical support
/// layers and their toolpaths are registered on the object.
#[derive(Debug, Default)]
pub struct SupportGenerationResult {
    pub storage: LayerStorage,
    /// Every generated layer list, sorted by the layer ordering.
    pub lists: SupportLayerLists,
    /// All layers in assembly order.
    pub layers_sorted: LayerList,
}

/// Support generator - main entry point for support generation
#[derive(Debug)]
pub struct SupportGenerator {
    config: SupportConfig,
    slicing: SlicingParams,
    params: SupportParameters,
}

impl SupportGenerator {
    /// Create a new support generator, validating the configuration.
    pub fn new(config: SupportConfig, slicing: SlicingParams) -> Result<Self> {
        config.validate()?;
        if !slicing.is_valid() {
            return Err(Error::Config(format!("invalid slicing parameters: {}", slicing)));
        }
        let params = SupportParameters::new(&config, &slicing)?;
        Ok(Self {
            config,
            slicing,
            params,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &SupportConfig {
        &self.config
    }

    pub fn slicing_params(&self) -> &SlicingParams {
        &self.slicing
    }

    /// Get the derived parameters
    pub fn params(&self) -> &SupportParameters {
        &self.params
    }

    /// Generate the support layers of `object` from the detected contacts.
    ///
    /// Support layers registered on the object before are replaced.
    pub fn generate(
        &self,
        object: &mut PrintObject,
        input: SupportGenerationInput,
    ) -> Result<SupportGenerationResult> {
        let SupportGenerationInput {
            mut storage,
            top_contacts,
            bottom_contacts,
            mut intermediate_layers,
            mut top_interface_layers,
            mut top_base_interface_layers,
        } = input;
        storage.flush();
        object.clear_support_layers();

        if !self.config.enable_support && !self.slicing.has_raft() {
            log::info!("Support generator - Support disabled, nothing to do");
            return Ok(SupportGenerationResult {
                storage,
                ..Default::default()
            });
        }

        if self.config.dont_support_bridges && !self.slicing.soluble_interface {
            log::info!("Support generator - Removing bridges from top contacts");
            refine_top_contacts(object, &mut storage, &top_contacts);
        }

        log::info!("Support generator - Merging contact layers");
        let min_height = self.params.support_layer_height_min;
        let top_contacts = contacts::merge_contact_layers(&self.slicing, min_height, &mut storage, top_contacts);
        let bottom_contacts =
            contacts::merge_contact_layers(&self.slicing, min_height, &mut storage, bottom_contacts);
        contacts::trim_top_contacts_by_bottom_contacts(&mut storage, &bottom_contacts, &top_contacts);
        storage.sort_by_print_z(&mut intermediate_layers);
        storage.sort_by_print_z(&mut top_interface_layers);
        storage.sort_by_print_z(&mut top_base_interface_layers);

        log::info!("Support generator - Creating interfaces");
        let InterfaceLayers {
            interface_layers,
            base_interface_layers,
        } = interface::generate_interface_layers(
            &self.params,
            &mut storage,
            &bottom_contacts,
            &top_contacts,
            OrganicInterfaces {
                top_interface_layers: &top_interface_layers,
                top_base_interface_layers: &top_base_interface_layers,
            },
            &intermediate_layers,
        );

        log::info!("Support generator - Creating raft");
        let raft = raft::generate_raft_base(
            object,
            &self.params,
            &self.slicing,
            &storage,
            &top_contacts,
            &interface_layers,
            &base_interface_layers,
            &intermediate_layers,
        );
        let raft_layers = raft.commit(&mut storage);

        let mut lists = SupportLayerLists {
            raft_layers,
            bottom_contacts,
            top_contacts,
            intermediate_layers,
            interface_layers,
            base_interface_layers,
        };
        lists.sort(&storage);
        log::debug!(
            "Support generator - {} raft, {} bottom contact, {} top contact, {} intermediate, {} interface, {} base interface layers",
            lists.raft_layers.len(),
            lists.bottom_contacts.len(),
            lists.top_contacts.len(),
            lists.intermediate_layers.len(),
            lists.interface_layers.len(),
            lists.base_interface_layers.len()
        );

        log::info!("Support generator - Creating layers");
        let layers_sorted = assemble::generate_support_layers(object, &mut storage, &lists);

        log::info!("Support generator - Generating tool paths");
        toolpaths::generate_support_toolpaths(object, &self.params, &self.slicing, &mut storage, &lists)?;

        log::info!("Support generator - End");
        Ok(SupportGenerationResult {
            storage,
            lists,
            layers_sorted,
        })
    }
}

/// Cut the regions printed as anchored bridges out of every top contact
/// that knows the object layer above it.
fn refine_top_contacts(object: &PrintObject, storage: &mut LayerStorage, top_contacts: &[LayerHandle]) {
    let layers = object.layers();
    let refined: Vec<(LayerHandle, ExPolygons)> = {
        let storage = &*storage;
        top_contacts
            .par_iter()
            .filter_map(|&handle| {
                let contact = &storage[handle];
                let idx = contact.idx_object_layer_above?;
                let layer = layers.get(idx)?;
                let lower_layer = idx.checked_sub(1).and_then(|i| layers.get(i));
                let mut polygons = contact.polygons.clone();
                for layerm in layer.regions() {
                    let fw = scaled(layerm.external_perimeter_width());
                    polygons = bridges::remove_bridges_from_contacts(lower_layer, layerm, fw, &polygons);
                }
                Some((handle, polygons))
            })
            .collect()
    };
    for (handle, polygons) in refined {
        storage[handle].polygons = polygons;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{ExPolygon, Point};
    use crate::slice::Layer;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> ExPolygon {
        ExPolygon::rectangle(Point::new_scale(x0, y0), Point::new_scale(x1, y1))
    }

    #[test]
    fn test_default_config() {
        let config = SupportConfig::default();
        assert!(config.enable_support);
        assert_eq!(config.style, SupportStyle::Grid);
        assert_eq!(config.top_interface_layers, 3);
        assert!(config.bottom_interface_layers.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = SupportConfig::default()
            .with_style(SupportStyle::Snug)
            .with_interface_layers(2, Some(1))
            .with_contact_loops(2);
        assert_eq!(config.style, SupportStyle::Snug);
        assert_eq!(config.top_interface_layers, 2);
        assert_eq!(config.bottom_interface_layers, Some(1));
        assert!(config.interface_loop_pattern);
        assert_eq!(config.contact_loops, 2);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = SupportConfig {
            base_pattern_spacing: -1.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = SupportConfig {
            raft_first_layer_density: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SupportConfig {
            nozzle_diameter: 0.0,
            ..Default::default()
        };
        assert!(SupportGenerator::new(config, SlicingParams::default()).is_err());
    }

    #[test]
    fn test_validate_rejects_unsupported_patterns() {
        for base_pattern in [
            SupportBasePattern::Honeycomb,
            SupportBasePattern::Lightning,
            SupportBasePattern::Hollow,
        ] {
            let config = SupportConfig {
                base_pattern,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(Error::Config(_))), "{:?}", base_pattern);
        }
        for interface_pattern in [SupportInterfacePattern::RectilinearInterlaced, SupportInterfacePattern::Grid] {
            let config = SupportConfig {
                interface_pattern,
                ..Default::default()
            };
            assert!(SupportGenerator::new(config, SlicingParams::default()).is_err());
        }

        let config = SupportConfig {
            base_pattern: SupportBasePattern::RectilinearGrid,
            interface_pattern: SupportInterfacePattern::Concentric,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_is_serde() {
        fn assert_serde<T: Serialize + for<'de> Deserialize<'de>>() {}
        assert_serde::<SupportConfig>();
        assert_serde::<SupportStyle>();
    }

    #[test]
    fn test_disabled_support_generates_nothing() {
        let config = SupportConfig {
            enable_support: false,
            ..Default::default()
        };
        let generator = SupportGenerator::new(config, SlicingParams::default()).unwrap();
        let mut object = PrintObject::new(Vec::new(), SlicingParams::default());
        let mut storage = LayerStorage::new();
        let contact = storage.allocate_unguarded(
            SupportGeneratorLayer::new(SupportLayerType::TopContact)
                .with_z(1.0, 0.8, 0.2)
                .with_polygons(vec![rect(0.0, 0.0, 10.0, 10.0)]),
        );
        let input = SupportGenerationInput {
            top_contacts: vec![contact],
            ..SupportGenerationInput::new(storage)
        };
        let result = generator.generate(&mut object, input).unwrap();
        assert!(result.layers_sorted.is_empty());
        assert!(object.support_layers().is_empty());
    }

    #[test]
    fn test_generate_single_column() {
        let slicing = SlicingParams::default();
        let config = SupportConfig::default().with_interface_layers(1, Some(0));
        let generator = SupportGenerator::new(config, slicing.clone()).unwrap();
        let mut object = PrintObject::new(vec![Layer::new(0, 1.2, 0.2)], slicing);

        let mut storage = LayerStorage::new();
        let square = vec![rect(0.0, 0.0, 10.0, 10.0)];
        let top = storage.allocate_unguarded(
            SupportGeneratorLayer::new(SupportLayerType::TopContact)
                .with_z(1.0, 0.8, 0.2)
                .with_polygons(square.clone()),
        );
        let intermediate = (1..=4)
            .map(|i| {
                let print_z = 0.2 * i as f64;
                storage.allocate_unguarded(
                    SupportGeneratorLayer::new(SupportLayerType::Base)
                        .with_z(print_z, print_z - 0.2, 0.2)
                        .with_polygons(square.clone()),
                )
            })
            .collect();
        let input = SupportGenerationInput {
            top_contacts: vec![top],
            intermediate_layers: intermediate,
            ..SupportGenerationInput::new(storage)
        };
        let result = generator.generate(&mut object, input).unwrap();

        let support_layers = object.support_layers();
        assert_eq!(support_layers.len(), 5);
        for pair in support_layers.windows(2) {
            assert!(pair[0].print_z < pair[1].print_z);
        }
        assert!(support_layers.iter().all(|l| !l.support_fills.is_empty()));
        assert_eq!(result.lists.interface_layers.len(), 1);
        let interface = &result.storage[result.lists.interface_layers[0]];
        assert_eq!(interface.layer_type, SupportLayerType::TopInterface);
        assert!((interface.print_z - 0.8).abs() < crate::EPSILON);
    }
}
