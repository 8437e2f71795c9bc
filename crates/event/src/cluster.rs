use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::fit::{self, ClusterFitResult};
use crate::types::{CaloHit, CartesianVector, ClusterId, PseudoLayer, TrackId};

/// Hits of a cluster grouped by pseudo layer, innermost layer first
pub type OrderedCaloHitList = BTreeMap<PseudoLayer, Vec<CaloHit>>;

/// Group of calorimeter hits treated as one candidate particle signature
///
/// Derived quantities (energies, layer extent, fits) are computed on demand
/// from the current hits, so they stay correct as hits are absorbed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ClusterRecord", into = "ClusterRecord")]
pub struct Cluster {
    pub id: ClusterId,

    /// Tracks associated with this cluster
    pub associated_tracks: Vec<TrackId>,

    /// Result of the fast photon identification
    pub is_photon_fast: bool,

    /// Shower-profile start (in radiation lengths)
    pub shower_profile_start: f32,

    /// Discrepancy between observed and expected electromagnetic profile
    pub shower_profile_discrepancy: f32,

    ordered_hits: OrderedCaloHitList,
}

impl Cluster {
    pub fn new(id: ClusterId) -> Self {
        Self {
            id,
            associated_tracks: Vec::new(),
            is_photon_fast: false,
            shower_profile_start: f32::MAX,
            shower_profile_discrepancy: f32::MAX,
            ordered_hits: OrderedCaloHitList::new(),
        }
    }

    pub fn with_hits(mut self, hits: impl IntoIterator<Item = CaloHit>) -> Self {
        for hit in hits {
            self.add_hit(hit);
        }
        self
    }

    pub fn with_track(mut self, track: TrackId) -> Self {
        self.associated_tracks.push(track);
        self
    }

    pub fn with_photon_profile(mut self, shower_start: f32, shower_discrepancy: f32) -> Self {
        self.is_photon_fast = true;
        self.shower_profile_start = shower_start;
        self.shower_profile_discrepancy = shower_discrepancy;
        self
    }

    pub fn add_hit(&mut self, hit: CaloHit) {
        self.ordered_hits.entry(hit.layer).or_default().push(hit);
    }

    /// Move all hits and track associations of `other` into this cluster
    pub fn absorb(&mut self, other: Cluster) {
        for (layer, hits) in other.ordered_hits {
            self.ordered_hits.entry(layer).or_default().extend(hits);
        }
        for track in other.associated_tracks {
            if !self.associated_tracks.contains(&track) {
                self.associated_tracks.push(track);
            }
        }
    }

    pub fn ordered_hits(&self) -> &OrderedCaloHitList {
        &self.ordered_hits
    }

    /// All hits, innermost layer first
    pub fn hits(&self) -> impl Iterator<Item = &CaloHit> {
        self.ordered_hits.values().flatten()
    }

    pub fn hits_in_layer(&self, layer: PseudoLayer) -> &[CaloHit] {
        self.ordered_hits
            .get(&layer)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn has_associated_tracks(&self) -> bool {
        !self.associated_tracks.is_empty()
    }

    pub fn n_calo_hits(&self) -> usize {
        self.ordered_hits.values().map(Vec::len).sum()
    }

    pub fn n_occupied_layers(&self) -> usize {
        self.ordered_hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered_hits.is_empty()
    }

    /// Innermost occupied layer (0 for an empty cluster)
    pub fn inner_layer(&self) -> PseudoLayer {
        self.ordered_hits.keys().next().copied().unwrap_or(0)
    }

    /// Outermost occupied layer (0 for an empty cluster)
    pub fn outer_layer(&self) -> PseudoLayer {
        self.ordered_hits.keys().next_back().copied().unwrap_or(0)
    }

    pub fn hadronic_energy(&self) -> f32 {
        self.hits().map(|hit| hit.hadronic_energy).sum()
    }

    /// Hadronic energy after energy corrections
    ///
    /// No correction functions are registered, so this equals
    /// [`Cluster::hadronic_energy`].
    pub fn corrected_hadronic_energy(&self) -> f32 {
        self.hadronic_energy()
    }

    /// Unweighted mean hit position in `layer`
    pub fn centroid(&self, layer: PseudoLayer) -> Option<CartesianVector> {
        let hits = self.ordered_hits.get(&layer)?;
        if hits.is_empty() {
            return None;
        }
        let sum: CartesianVector = hits.iter().map(|hit| hit.position).sum();
        Some(sum / hits.len() as f32)
    }

    /// Unweighted mean position over all hits
    pub fn overall_centroid(&self) -> Option<CartesianVector> {
        let n = self.n_calo_hits();
        if n == 0 {
            return None;
        }
        let sum: CartesianVector = self.hits().map(|hit| hit.position).sum();
        Some(sum / n as f32)
    }

    /// Fraction of hits flagged as possible minimum-ionising deposits
    pub fn mip_fraction(&self) -> f32 {
        let n = self.n_calo_hits();
        if n == 0 {
            return 0.0;
        }
        self.hits().filter(|hit| hit.is_possible_mip).count() as f32 / n as f32
    }

    /// Straight-line fit through every hit of the cluster
    pub fn fit_to_all_hits(&self) -> ClusterFitResult {
        fit::fit_all_hits(self)
    }
}

/// Flat serialised form of a [`Cluster`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClusterRecord {
    id: ClusterId,
    #[serde(default)]
    hits: Vec<CaloHit>,
    #[serde(default)]
    associated_tracks: Vec<TrackId>,
    #[serde(default)]
    is_photon_fast: bool,
    #[serde(default = "unset_profile")]
    shower_profile_start: f32,
    #[serde(default = "unset_profile")]
    shower_profile_discrepancy: f32,
}

fn unset_profile() -> f32 {
    f32::MAX
}

impl From<ClusterRecord> for Cluster {
    fn from(record: ClusterRecord) -> Self {
        let mut cluster = Cluster::new(record.id).with_hits(record.hits);
        cluster.associated_tracks = record.associated_tracks;
        cluster.is_photon_fast = record.is_photon_fast;
        cluster.shower_profile_start = record.shower_profile_start;
        cluster.shower_profile_discrepancy = record.shower_profile_discrepancy;
        cluster
    }
}

impl From<Cluster> for ClusterRecord {
    fn from(cluster: Cluster) -> Self {
        let hits = cluster.ordered_hits.into_values().flatten().collect();
        Self {
            id: cluster.id,
            hits,
            associated_tracks: cluster.associated_tracks,
            is_photon_fast: cluster.is_photon_fast,
            shower_profile_start: cluster.shower_profile_start,
            shower_profile_discrepancy: cluster.shower_profile_discrepancy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hit(id: u32, layer: PseudoLayer, x: f32, energy: f32) -> CaloHit {
        CaloHit::new(id, layer, CartesianVector::new(x, 0.0, 0.0), energy)
    }

    #[test]
    fn derived_quantities_follow_hits() {
        let cluster = Cluster::new(ClusterId(1)).with_hits([
            hit(1, 4, 1000.0, 0.5),
            hit(2, 2, 980.0, 0.25),
            hit(3, 4, 1002.0, 0.25),
        ]);

        assert_eq!(cluster.n_calo_hits(), 3);
        assert_eq!(cluster.n_occupied_layers(), 2);
        assert_eq!(cluster.inner_layer(), 2);
        assert_eq!(cluster.outer_layer(), 4);
        assert!((cluster.hadronic_energy() - 1.0).abs() < 1e-6);
        assert_eq!(cluster.centroid(4), Some(CartesianVector::new(1001.0, 0.0, 0.0)));
        assert_eq!(cluster.centroid(3), None);
    }

    #[test]
    fn absorb_moves_hits_and_tracks() {
        let mut parent = Cluster::new(ClusterId(1))
            .with_hits([hit(1, 1, 100.0, 1.0)])
            .with_track(TrackId(7));
        let daughter = Cluster::new(ClusterId(2))
            .with_hits([hit(2, 1, 110.0, 0.5), hit(3, 5, 150.0, 0.5)])
            .with_track(TrackId(7));

        parent.absorb(daughter);

        assert_eq!(parent.n_calo_hits(), 3);
        assert_eq!(parent.outer_layer(), 5);
        assert_eq!(parent.associated_tracks, vec![TrackId(7)]);
    }

    #[test]
    fn serde_round_trip_preserves_layers() {
        let cluster = Cluster::new(ClusterId(3))
            .with_hits([hit(1, 3, 10.0, 0.1), hit(2, 1, 5.0, 0.2)])
            .with_photon_profile(1.5, 0.4);

        let json = serde_json::to_string(&cluster).unwrap();
        let back: Cluster = serde_json::from_str(&json).unwrap();

        assert_eq!(back, cluster);
        assert_eq!(back.inner_layer(), 1);
    }

    #[test]
    fn empty_cluster_is_harmless() {
        let cluster = Cluster::new(ClusterId(9));
        assert_eq!(cluster.inner_layer(), 0);
        assert_eq!(cluster.mip_fraction(), 0.0);
        assert!(cluster.overall_centroid().is_none());
        assert!(!cluster.fit_to_all_hits().successful);
    }
}
