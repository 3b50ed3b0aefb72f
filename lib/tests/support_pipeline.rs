//! Support Pipeline Integration Tests
//!
//! These tests run the support generator end to end on small objects with
//! hand-placed contact layers, the way the upstream contact detection
//! hands them over.

use slicer_support::clipper::{polygons_overlap, total_area_mm2};
use slicer_support::extrusion::ExtrusionRole;
use slicer_support::geometry::{ExPolygon, Point, Polygon};
use slicer_support::slice::{Layer, LayerRegion};
use slicer_support::support::interface::{generate_interface_layers, OrganicInterfaces};
use slicer_support::{
    LayerHandle, LayerStorage, PrintObject, SlicingParams, SupportConfig, SupportGenerationInput,
    SupportGenerator, SupportGeneratorLayer, SupportLayer, SupportLayerType, SupportParameters,
    SupportStyle, EPSILON,
};
use std::f64::consts::{FRAC_PI_2, PI};

fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> ExPolygon {
    ExPolygon::rectangle(Point::new_scale(x0, y0), Point::new_scale(x1, y1))
}

fn object_layer(id: usize, print_z: f64, slices: Vec<ExPolygon>) -> Layer {
    let mut layer = Layer::new(id, print_z, 0.2);
    layer.add_region(LayerRegion::with_slices(slices, 0.4));
    layer
}

fn support_layer(
    storage: &mut LayerStorage,
    layer_type: SupportLayerType,
    print_z: f64,
    region: ExPolygon,
) -> LayerHandle {
    storage.allocate_unguarded(
        SupportGeneratorLayer::new(layer_type)
            .with_z(print_z, print_z - 0.2, 0.2)
            .with_polygons(vec![region]),
    )
}

/// A 60×60 box whose walls rise to 2.0 mm and whose lid starts at 2.2 mm.
/// The 40×40 middle of the lid overhangs the inside of the box.
fn lidded_box(slicing: &SlicingParams) -> PrintObject {
    let mut hole = Polygon::rectangle(Point::new_scale(8.0, 8.0), Point::new_scale(52.0, 52.0));
    hole.make_clockwise();
    let walls = ExPolygon::with_holes(rect(0.0, 0.0, 60.0, 60.0).contour, vec![hole]);
    let mut layers = Vec::new();
    for i in 0..10 {
        layers.push(object_layer(i, 0.2 * (i + 1) as f64, vec![walls.clone()]));
    }
    for i in 10..15 {
        layers.push(object_layer(i, 0.2 * (i + 1) as f64, vec![rect(0.0, 0.0, 60.0, 60.0)]));
    }
    PrintObject::new(layers, slicing.clone())
}

/// A 40×40 column under the lid of [`lidded_box`]: one top contact under
/// the lid and base layers down to the bed.
fn lid_column_input() -> SupportGenerationInput {
    let mut storage = LayerStorage::new();
    let column = rect(10.0, 10.0, 50.0, 50.0);
    let mut contact = SupportGeneratorLayer::new(SupportLayerType::TopContact)
        .with_z(2.0, 1.8, 0.2)
        .with_polygons(vec![column.clone()]);
    contact.overhang_polygons = Some(vec![rect(8.0, 8.0, 52.0, 52.0)]);
    contact.idx_object_layer_above = Some(10);
    let top_contact = storage.allocate_unguarded(contact);
    let intermediate_layers = (1..=9)
        .map(|i| support_layer(&mut storage, SupportLayerType::Base, 0.2 * i as f64, column.clone()))
        .collect();
    SupportGenerationInput {
        top_contacts: vec![top_contact],
        intermediate_layers,
        ..SupportGenerationInput::new(storage)
    }
}

/// Direction in [0, π) of the longest interface segment printed at a layer.
fn interface_direction(layer: &SupportLayer) -> f64 {
    let mut best = (0.0, 0.0);
    for path in layer.support_fills.paths() {
        if path.role != ExtrusionRole::SupportMaterialInterface {
            continue;
        }
        for w in path.polyline.points().windows(2) {
            let length = w[0].distance(&w[1]);
            if length > best.0 {
                let d = w[1] - w[0];
                best = (length, (d.y as f64).atan2(d.x as f64).rem_euclid(PI));
            }
        }
    }
    assert!(best.0 > 0.0, "no interface printed at {}", layer.print_z);
    best.1
}

#[test]
fn test_lidded_box_interfaces() {
    let _ = env_logger::builder().is_test(true).try_init();
    let slicing = SlicingParams::default();
    let config = SupportConfig::default()
        .with_style(SupportStyle::Grid)
        .with_interface_layers(2, None)
        .with_base_interface_layers(0, 0);
    let generator = SupportGenerator::new(config, slicing.clone()).unwrap();
    let mut object = lidded_box(&slicing);

    let result = generator.generate(&mut object, lid_column_input()).unwrap();
    let storage = &result.storage;

    assert!(result.lists.raft_layers.is_empty());
    assert!(result.lists.base_interface_layers.is_empty());
    assert_eq!(result.lists.top_contacts.len(), 1);

    // Exactly two interfaces right under the contact.
    let interfaces: Vec<&SupportGeneratorLayer> = storage.layers(&result.lists.interface_layers).collect();
    assert_eq!(interfaces.len(), 2);
    assert!(interfaces.iter().all(|l| l.layer_type == SupportLayerType::TopInterface));
    assert!((interfaces[0].print_z - 1.6).abs() < EPSILON);
    assert!((interfaces[1].print_z - 1.8).abs() < EPSILON);

    // Base layers below them, emptied above.
    for layer in storage.layers(&result.lists.intermediate_layers) {
        assert_eq!(layer.layer_type, SupportLayerType::Base);
        if layer.print_z < 1.5 {
            assert!(!layer.is_empty(), "empty base layer at {}", layer.print_z);
        } else {
            assert!(layer.is_empty(), "base layer left at {}", layer.print_z);
        }
    }

    let support_layers = object.support_layers();
    assert_eq!(support_layers.len(), 10);
    for pair in support_layers.windows(2) {
        assert!(pair[0].print_z < pair[1].print_z);
    }
    let ids: Vec<usize> = support_layers.iter().map(|l| l.interface_id).collect();
    assert_eq!(ids, vec![0, 0, 0, 0, 0, 0, 0, 0, 1, 2]);

    // The first layer is widened but keeps clear of the walls.
    let first = &support_layers[0];
    assert!(total_area_mm2(&first.support_islands) > 40.0 * 40.0);
    assert!(!polygons_overlap(&first.support_islands, &object.first_layer_islands()));

    for layer in support_layers {
        assert!(!layer.support_fills.is_empty(), "no fills at {}", layer.print_z);
        assert!(layer.support_fills.paths().iter().all(|p| p.is_valid()));
    }
}

#[test]
fn test_snug_contact_without_overhang_uses_polygons() {
    let slicing = SlicingParams::default();
    let config = SupportConfig::default()
        .with_style(SupportStyle::Snug)
        .with_interface_layers(1, Some(0));
    let params = SupportParameters::new(&config, &slicing).unwrap();

    let mut storage = LayerStorage::new();
    let square = rect(0.0, 0.0, 10.0, 10.0);
    let contact = support_layer(&mut storage, SupportLayerType::TopContact, 0.8, square.clone());
    assert!(storage[contact].overhang_polygons.is_none());
    let intermediate: Vec<LayerHandle> = (1..=3)
        .map(|i| support_layer(&mut storage, SupportLayerType::Base, 0.2 * i as f64, square.clone()))
        .collect();

    let out = generate_interface_layers(
        &params,
        &mut storage,
        &[],
        &[contact],
        OrganicInterfaces::default(),
        &intermediate,
    );
    assert_eq!(out.interface_layers.len(), 1);
    let interface = &storage[out.interface_layers[0]];
    assert!((interface.print_z - 0.6).abs() < EPSILON);
    let area = total_area_mm2(&interface.polygons);
    assert!((area - 100.0).abs() < 1.0, "area {}", area);
    assert!(storage[intermediate[2]].is_empty());
}

#[test]
fn test_single_raft_layer_widens_first_layer() {
    let slicing = SlicingParams::default().raft(1, 0.4);
    assert_eq!(slicing.raft_layers(), 1);
    let generator = SupportGenerator::new(SupportConfig::default(), slicing.clone()).unwrap();
    let first_z = slicing.object_print_z_min + 0.2;
    let mut object = PrintObject::new(vec![object_layer(0, first_z, vec![rect(30.0, 0.0, 40.0, 10.0)])], slicing);

    let mut storage = LayerStorage::new();
    let square = rect(0.0, 0.0, 10.0, 10.0);
    let top_contact = support_layer(&mut storage, SupportLayerType::TopContact, 1.0, square.clone());
    let intermediate_layers = (1..=4)
        .map(|i| support_layer(&mut storage, SupportLayerType::Base, 0.2 * i as f64, square.clone()))
        .collect();
    let input = SupportGenerationInput {
        top_contacts: vec![top_contact],
        intermediate_layers,
        ..SupportGenerationInput::new(storage)
    };
    let result = generator.generate(&mut object, input).unwrap();

    // Printed like a plain first layer: no raft stack, a widened first layer.
    assert!(result.lists.raft_layers.is_empty());
    let first = &result.storage[result.lists.intermediate_layers[0]];
    assert!(total_area_mm2(&first.polygons) > 150.0);
    assert!(!polygons_overlap(&first.polygons, &object.first_layer_islands()));
    assert!(object
        .support_layers()
        .iter()
        .all(|l| !l.support_fills.is_empty()));
}

#[test]
fn test_regenerate_replaces_support_layers() {
    let slicing = SlicingParams::default();
    let generator = SupportGenerator::new(SupportConfig::default(), slicing.clone()).unwrap();
    let mut object = PrintObject::new(Vec::new(), slicing);
    for _ in 0..2 {
        let mut storage = LayerStorage::new();
        let square = rect(0.0, 0.0, 10.0, 10.0);
        let intermediate_layers = (1..=3)
            .map(|i| support_layer(&mut storage, SupportLayerType::Base, 0.2 * i as f64, square.clone()))
            .collect();
        let input = SupportGenerationInput {
            intermediate_layers,
            ..SupportGenerationInput::new(storage)
        };
        generator.generate(&mut object, input).unwrap();
        assert_eq!(object.support_layers().len(), 3);
    }
}

#[test]
fn test_snug_interfaces_cross_between_layers() {
    let slicing = SlicingParams::default();
    let config = SupportConfig {
        interface_spacing: 0.0,
        ..SupportConfig::default()
            .with_style(SupportStyle::Snug)
            .with_interface_layers(2, None)
            .with_base_interface_layers(0, 0)
    };
    let generator = SupportGenerator::new(config, slicing.clone()).unwrap();
    let mut object = lidded_box(&slicing);
    generator.generate(&mut object, lid_column_input()).unwrap();

    let layer_at = |z: f64| {
        object
            .support_layers()
            .iter()
            .find(|l| (l.print_z - z).abs() < EPSILON)
            .unwrap_or_else(|| panic!("no support layer at {}", z))
    };
    let (lower, upper) = (layer_at(1.6), layer_at(1.8));
    assert_eq!(upper.interface_id, lower.interface_id + 1);
    let turn = (interface_direction(lower) - interface_direction(upper)).abs();
    assert!((turn - FRAC_PI_2).abs() < 0.05, "interfaces turned by {}", turn);
}

#[test]
fn test_grid_interfaces_keep_their_angle() {
    let slicing = SlicingParams::default();
    let config = SupportConfig {
        interface_spacing: 0.0,
        ..SupportConfig::default()
            .with_style(SupportStyle::Grid)
            .with_interface_layers(2, None)
            .with_base_interface_layers(0, 0)
    };
    let generator = SupportGenerator::new(config, slicing.clone()).unwrap();
    let mut object = lidded_box(&slicing);
    generator.generate(&mut object, lid_column_input()).unwrap();

    let interfaces: Vec<&SupportLayer> = object
        .support_layers()
        .iter()
        .filter(|l| l.print_z > 1.5 && l.print_z < 1.9)
        .collect();
    assert_eq!(interfaces.len(), 2);
    let turn = (interface_direction(interfaces[0]) - interface_direction(interfaces[1])).abs();
    assert!(turn < 0.05, "interfaces turned by {}", turn);
}
