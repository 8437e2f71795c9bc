//! Geometric and energetic proximity features of a (daughter, parent) pair.

use itertools::iproduct;
use pfa_event::{CaloHit, CartesianVector, Cluster, ClusterId, EventStore, PseudoLayer, Track};
use serde::Serialize;

use crate::config::ContactParameters;
use crate::error::Result;

/// Proximity features of a candidate fragment and a track-anchored parent
///
/// Contacts are snapshots: they are valid for the merge-loop iteration that
/// built them and are discarded once either cluster changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterContact {
    pub daughter: ClusterId,
    pub parent: ClusterId,

    /// Inner layer of the daughter when the contact was built
    pub daughter_inner_layer: PseudoLayer,

    /// Layers in which a daughter hit and a parent hit are adjacent
    pub n_contact_layers: u32,
    /// Contact layers over the daughter layers in the overlap region
    pub contact_fraction: f32,

    /// Fractions of daughter hits inside the parent's cone, widest first
    pub cone_fraction_1: f32,
    pub cone_fraction_2: f32,
    pub cone_fraction_3: f32,

    /// Fractions of daughter hits near a parent hit, loosest band first
    pub close_hit_fraction_1: f32,
    pub close_hit_fraction_2: f32,

    pub mean_distance_to_helix: f32,
    pub closest_distance_to_helix: f32,
    pub distance_to_closest_hit: f32,

    /// Summed energy at closest approach of the parent's tracks
    pub parent_track_energy: f32,
}

impl ClusterContact {
    pub fn new(
        store: &EventStore,
        daughter: &Cluster,
        parent: &Cluster,
        params: &ContactParameters,
    ) -> Result<Self> {
        let tracks = store.associated_tracks(parent.id)?;
        let parent_track_energy = tracks.iter().map(|track| track.energy_at_dca).sum();

        let (n_contact_layers, contact_fraction) =
            contact_layers(daughter, parent, params.distance_threshold);

        let cone = Cone::of_parent(parent);
        let cone_fraction = |cosine: f32| cone.as_ref().map_or(0.0, |cone| cone.fraction_of_hits(daughter, cosine));

        let nearest = nearest_parent_hit_distances(daughter, parent);
        let close_fraction = |distance: f32| fraction_below(&nearest, distance);
        let distance_to_closest_hit = nearest.iter().copied().fold(f32::MAX, f32::min);

        let (closest_distance_to_helix, mean_distance_to_helix) =
            helix_distances(daughter, &tracks, params);

        Ok(Self {
            daughter: daughter.id,
            parent: parent.id,
            daughter_inner_layer: daughter.inner_layer(),
            n_contact_layers,
            contact_fraction,
            cone_fraction_1: cone_fraction(params.cone_cosine_half_angle_1),
            cone_fraction_2: cone_fraction(params.cone_cosine_half_angle_2),
            cone_fraction_3: cone_fraction(params.cone_cosine_half_angle_3),
            close_hit_fraction_1: close_fraction(params.close_hit_distance_1),
            close_hit_fraction_2: close_fraction(params.close_hit_distance_2),
            mean_distance_to_helix,
            closest_distance_to_helix,
            distance_to_closest_hit,
            parent_track_energy,
        })
    }
}

/// Count layers where the clusters touch, and that count over the daughter's layers
///
/// Only layers inside both clusters' layer ranges that hold daughter hits are
/// considered. Two hits touch when closer than `distance_threshold` cell
/// lengths of the daughter hit.
pub fn contact_layers(daughter: &Cluster, parent: &Cluster, distance_threshold: f32) -> (u32, f32) {
    if daughter.is_empty() || parent.is_empty() {
        return (0, 0.0);
    }

    let start = daughter.inner_layer().max(parent.inner_layer());
    let end = daughter.outer_layer().min(parent.outer_layer());

    let mut n_spanned = 0u32;
    let mut n_contact = 0u32;
    for layer in start..=end {
        let daughter_hits = daughter.hits_in_layer(layer);
        if daughter_hits.is_empty() {
            continue;
        }
        n_spanned += 1;

        let parent_hits = parent.hits_in_layer(layer);
        let touching = iproduct!(daughter_hits, parent_hits).any(|(d, p)| {
            d.distance_to(p) < distance_threshold * d.cell_length_scale
        });
        if touching {
            n_contact += 1;
        }
    }

    let fraction = if n_spanned == 0 {
        0.0
    } else {
        n_contact as f32 / n_spanned as f32
    };
    (n_contact, fraction)
}

/// Projected cone of a parent cluster
struct Cone {
    apex: CartesianVector,
    axis: CartesianVector,
}

impl Cone {
    /// Apex at the inner-layer centroid, axis along the all-hits fit
    fn of_parent(parent: &Cluster) -> Option<Self> {
        let apex = parent.centroid(parent.inner_layer())?;
        let fit = parent.fit_to_all_hits();
        let axis = if fit.successful {
            fit.direction
        } else {
            parent.overall_centroid()? - apex
        };

        let norm = axis.norm();
        if norm <= f32::EPSILON {
            return None;
        }
        Some(Self {
            apex,
            axis: axis / norm,
        })
    }

    fn fraction_of_hits(&self, daughter: &Cluster, cosine_half_angle: f32) -> f32 {
        let n_hits = daughter.n_calo_hits();
        if n_hits == 0 {
            return 0.0;
        }

        let inside = daughter
            .hits()
            .filter(|hit| {
                let offset = hit.position - self.apex;
                let distance = offset.norm();
                distance > 0.0 && offset.dot(&self.axis) / distance > cosine_half_angle
            })
            .count();
        inside as f32 / n_hits as f32
    }
}

/// Distance from each daughter hit to its nearest parent hit
fn nearest_parent_hit_distances(daughter: &Cluster, parent: &Cluster) -> Vec<f32> {
    daughter
        .hits()
        .map(|d| {
            parent
                .hits()
                .map(|p| d.distance_to(p))
                .fold(f32::MAX, f32::min)
        })
        .collect()
}

fn fraction_below(distances: &[f32], threshold: f32) -> f32 {
    if distances.is_empty() {
        return 0.0;
    }
    distances.iter().filter(|&&d| d < threshold).count() as f32 / distances.len() as f32
}

/// Closest and mean distance of the daughter's leading hits to the best parent helix
///
/// Both values stay at `f32::MAX` when the parent has no tracks or the
/// daughter has no hits in the comparison window.
fn helix_distances(daughter: &Cluster, tracks: &[&Track], params: &ContactParameters) -> (f32, f32) {
    let start = daughter.inner_layer();
    let end = start.saturating_add(params.helix_comparison_n_layers);
    let hits: Vec<&CaloHit> = daughter
        .ordered_hits()
        .range(start..=end)
        .take(params.helix_comparison_max_occupied_layers)
        .flat_map(|(_, hits)| hits.iter())
        .collect();

    let mut closest = f32::MAX;
    let mut mean = f32::MAX;
    if hits.is_empty() {
        return (closest, mean);
    }

    for track in tracks {
        let distances: Vec<f32> = hits
            .iter()
            .map(|hit| track.helix.distance_to_point(&hit.position).total)
            .collect();
        let track_closest = distances.iter().copied().fold(f32::MAX, f32::min);
        let track_mean = distances.iter().sum::<f32>() / distances.len() as f32;

        closest = closest.min(track_closest);
        mean = mean.min(track_mean);
    }
    (closest, mean)
}
