//! Assembly of the generated layer lists into physical support layers.

use super::layer::{LayerList, LayerStorage, SupportLayerLists, SupportLayerType};
use crate::print::PrintObject;
use crate::EPSILON;

/// Merge all layer lists into one sequence sorted by the layer ordering and
/// register a support layer on `object` for every run of non-empty layers
/// sharing the same `print_z`.
///
/// Layers of a run are snapped onto the run's average `print_z`. Each
/// registered layer gets an interface orientation id. Layers with an
/// interface advance the shared id. A layer printing nothing but a top
/// contact takes the id following the one of the layer it stands on, so the
/// contact crosses the interface below it.
///
/// Returns the sorted sequence, including layers of empty runs.
pub fn generate_support_layers(
    object: &mut PrintObject,
    storage: &mut LayerStorage,
    lists: &SupportLayerLists,
) -> LayerList {
    let mut layers_sorted: LayerList = lists.all().into_iter().flatten().copied().collect();
    // Handle order first so equal layers keep a fixed order whatever the
    // order of the input lists.
    layers_sorted.sort_unstable();
    layers_sorted.dedup();
    storage.sort(&mut layers_sorted);

    let mut layer_id_interface = 0;
    let mut i = 0;
    while i < layers_sorted.len() {
        let zmax = storage[layers_sorted[i]].print_z + EPSILON;
        let j = i + layers_sorted[i..].partition_point(|&h| storage[h].print_z <= zmax);
        let run = &layers_sorted[i..j];
        let zavg = 0.5 * (storage[run[0]].print_z + storage[run[run.len() - 1]].print_z);

        let mut height_min = storage[run[0]].height;
        let mut empty = true;
        let mut num_interfaces = 0;
        let mut num_top_contacts = 0;
        let mut top_contact_bottom_z = 0.0;
        for &handle in run {
            let layer = &mut storage[handle];
            if !layer.polygons.is_empty() {
                empty = false;
                if layer.layer_type.is_interface() {
                    num_interfaces += 1;
                }
                if layer.layer_type == SupportLayerType::TopContact {
                    num_top_contacts += 1;
                    top_contact_bottom_z = layer.bottom_z;
                }
            }
            layer.print_z = zavg;
            height_min = height_min.min(layer.height);
        }
        if num_top_contacts > 1 {
            debug_assert!(false, "{} top contacts at z {}", num_top_contacts, zavg);
            log::warn!("{} top contact layers share print_z {:.4}", num_top_contacts, zavg);
        }

        if !empty {
            let contacts_only = num_top_contacts > 0 && num_top_contacts == num_interfaces;
            let mut interface_id = layer_id_interface;
            if contacts_only {
                // The lowest registered layer wins when several sit within
                // EPSILON of the contact bottom.
                if let Some(below) = object
                    .support_layers()
                    .iter()
                    .find(|l| (l.print_z - top_contact_bottom_z).abs() < EPSILON)
                {
                    interface_id = below.interface_id + 1;
                }
            }
            object.add_support_layer(interface_id, zavg, height_min, zavg - height_min);
            if num_interfaces > 0 && !contacts_only {
                layer_id_interface += 1;
            }
        }
        i = j;
    }

    log::debug!(
        "Assembled {} support layers from {} generated layers",
        object.support_layers().len(),
        layers_sorted.len()
    );
    layers_sorted
}
