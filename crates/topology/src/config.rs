use serde::{Deserialize, Serialize};

use crate::error::{Result, TopologyError};

/// Settings of the looping-tracks association
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoopingTracksConfig {
    /// Occupied layers at the end of each cluster used for the end fit
    pub n_layers_to_fit: usize,
    pub fit_chi2_cut: f32,
    pub n_deep_in_hcal_layers: u32,

    pub can_merge_min_mip_fraction: f32,
    pub can_merge_max_rms: f32,
    pub min_hits_in_cluster: usize,
    pub min_occupied_layers_in_cluster: usize,

    pub max_outer_layer_difference: u32,
    pub max_centroid_difference: f32,
    pub fit_direction_dot_product_cut_ecal: f32,
    pub fit_direction_dot_product_cut_hcal: f32,
    pub closest_hit_distance_cut_ecal: f32,
    pub closest_hit_distance_cut_hcal: f32,
    pub fit_results_closest_approach_cut_ecal: f32,
    pub fit_results_closest_approach_cut_hcal: f32,

    pub n_good_features_for_cluster_merge: u32,
    pub good_features_max_fit_dot_product: f32,
    pub good_features_max_fit_approach: f32,
    pub good_features_max_layer_difference: u32,
    pub good_features_min_mip_fraction: f32,
}

impl Default for LoopingTracksConfig {
    fn default() -> Self {
        Self {
            n_layers_to_fit: 5,
            fit_chi2_cut: 100.0,
            n_deep_in_hcal_layers: 10,

            can_merge_min_mip_fraction: 0.7,
            can_merge_max_rms: 5.0,
            min_hits_in_cluster: 4,
            min_occupied_layers_in_cluster: 2,

            max_outer_layer_difference: 6,
            max_centroid_difference: 2000.0,
            fit_direction_dot_product_cut_ecal: -0.1,
            fit_direction_dot_product_cut_hcal: 0.0,
            closest_hit_distance_cut_ecal: 250.0,
            closest_hit_distance_cut_hcal: 500.0,
            fit_results_closest_approach_cut_ecal: 50.0,
            fit_results_closest_approach_cut_hcal: 200.0,

            n_good_features_for_cluster_merge: 2,
            good_features_max_fit_dot_product: -0.5,
            good_features_max_fit_approach: 50.0,
            good_features_max_layer_difference: 4,
            good_features_min_mip_fraction: 0.9,
        }
    }
}

impl LoopingTracksConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_layers_to_fit < 2 {
            return Err(TopologyError::invalid_parameter(
                "n_layers_to_fit",
                format!("a line fit needs at least 2 layers (got {})", self.n_layers_to_fit),
            ));
        }
        if !(self.fit_chi2_cut > 0.0) {
            return Err(TopologyError::invalid_parameter(
                "fit_chi2_cut",
                format!("must be positive (got {})", self.fit_chi2_cut),
            ));
        }
        Ok(())
    }
}

/// Settings of the muon-track association and calorimeter-hit absorption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MuonReconstructionConfig {
    pub max_cluster_calo_hits: usize,
    pub min_cluster_occupied_layers: usize,
    pub min_cluster_layer_span: u32,
    /// Occupied layers at the start of a muon cluster used for its direction
    pub n_cluster_layers_to_fit: usize,
    pub max_distance_to_track: f32,
    pub min_track_candidate_energy: f32,
    pub min_helix_cluster_cos_angle: f32,

    /// Muon clusters with any other number of tracks absorb no calorimeter hits
    pub n_expected_tracks_per_cluster: usize,
    pub min_helix_calo_hit_cos_angle: f32,
    pub region_1_generic_distance: f32,
    pub region_2_generic_distance: f32,
    pub isolated_min_region_1_hits: usize,
    pub isolated_max_region_2_hits: usize,
    pub max_generic_distance: f32,
    pub isolated_max_generic_distance: f32,
    pub should_cluster_isolated_hits: bool,
    /// Hit list the absorbed calorimeter hits are taken from
    pub calo_hit_list_name: String,
}

impl Default for MuonReconstructionConfig {
    fn default() -> Self {
        Self {
            max_cluster_calo_hits: 30,
            min_cluster_occupied_layers: 8,
            min_cluster_layer_span: 8,
            n_cluster_layers_to_fit: 100,
            max_distance_to_track: 1500.0,
            min_track_candidate_energy: 4.0,
            min_helix_cluster_cos_angle: 0.95,

            n_expected_tracks_per_cluster: 1,
            min_helix_calo_hit_cos_angle: 0.95,
            region_1_generic_distance: 3.0,
            region_2_generic_distance: 6.0,
            isolated_min_region_1_hits: 1,
            isolated_max_region_2_hits: 0,
            max_generic_distance: 6.0,
            isolated_max_generic_distance: 3.0,
            should_cluster_isolated_hits: false,
            calo_hit_list_name: "CaloHits".to_string(),
        }
    }
}

impl MuonReconstructionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_expected_tracks_per_cluster == 0 {
            return Err(TopologyError::invalid_parameter(
                "n_expected_tracks_per_cluster",
                "hits are absorbed along a track, so at least one is needed",
            ));
        }
        if self.n_cluster_layers_to_fit < 2 {
            return Err(TopologyError::invalid_parameter(
                "n_cluster_layers_to_fit",
                format!("a line fit needs at least 2 layers (got {})", self.n_cluster_layers_to_fit),
            ));
        }
        if self.region_1_generic_distance > self.region_2_generic_distance {
            return Err(TopologyError::invalid_parameter(
                "region_1_generic_distance",
                format!(
                    "must not exceed region_2_generic_distance ({} > {})",
                    self.region_1_generic_distance, self.region_2_generic_distance
                ),
            ));
        }
        Ok(())
    }
}
