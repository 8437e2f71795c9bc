use pfa_event::LeavingDetectorCriteria;
use serde::{Deserialize, Serialize};

use crate::error::{FragmentError, Result};

/// Geometric settings used when extracting cluster contact features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContactParameters {
    /// Hit separation, in cell lengths, below which two hits are in contact
    pub distance_threshold: f32,

    /// Cosine of the cone half angles, narrowing from 1 to 3
    pub cone_cosine_half_angle_1: f32,
    pub cone_cosine_half_angle_2: f32,
    pub cone_cosine_half_angle_3: f32,

    /// Distance bands (mm) for the close-hit fractions
    pub close_hit_distance_1: f32,
    pub close_hit_distance_2: f32,

    /// Layers after the daughter's inner layer compared against parent helices
    pub helix_comparison_n_layers: u32,

    /// Maximum occupied daughter layers used in the helix comparison
    pub helix_comparison_max_occupied_layers: usize,
}

impl Default for ContactParameters {
    fn default() -> Self {
        Self {
            distance_threshold: 2.0,
            cone_cosine_half_angle_1: 0.9,
            cone_cosine_half_angle_2: 0.95,
            cone_cosine_half_angle_3: 0.985,
            close_hit_distance_1: 100.0,
            close_hit_distance_2: 50.0,
            helix_comparison_n_layers: 20,
            helix_comparison_max_occupied_layers: 9,
        }
    }
}

/// Configuration of the fragment-removal merge engine
///
/// Every key is optional when deserialising; absent keys take the defaults
/// below. Call [`FragmentRemovalConfig::validate`] before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FragmentRemovalConfig {
    // Daughter selection
    pub min_daughter_calo_hits: usize,
    pub min_daughter_hadronic_energy: f32,

    // Contact admissibility cuts
    pub contact_cut_max_distance: f32,
    pub contact_cut_n_layers: u32,
    pub contact_cut_cone_fraction_1: f32,
    pub contact_cut_close_hit_fraction_1: f32,
    pub contact_cut_close_hit_fraction_2: f32,
    pub contact_cut_mean_distance_to_helix: f32,
    pub contact_cut_closest_distance_to_helix: f32,
    pub contact_cut_layers_from_ecal: u32,
    pub contact_cut_near_ecal_distance: f32,

    // Track-cluster compatibility
    pub max_chi2: f32,
    pub max_global_chi2: f32,
    pub chi2_base: f32,
    pub global_chi2_penalty: f32,
    pub hadronic_energy_resolution: f32,

    // Correction layer
    pub correction_layer_n_hit_layers: usize,
    pub correction_layer_energy_fraction: f32,

    // Total evidence: contact layers
    pub contact_evidence_n_layers_1: u32,
    pub contact_evidence_n_layers_2: u32,
    pub contact_evidence_n_layers_3: u32,
    pub contact_evidence_1: f32,
    pub contact_evidence_2: f32,
    pub contact_evidence_3: f32,

    // Total evidence: cone
    pub cone_evidence_fraction_1: f32,
    pub cone_evidence_ecal_multiplier: f32,

    // Total evidence: track extrapolation
    pub closest_track_evidence_1: f32,
    pub closest_track_evidence_1d: f32,
    pub closest_track_evidence_2: f32,
    pub closest_track_evidence_2d: f32,
    pub mean_track_evidence_1: f32,
    pub mean_track_evidence_1d: f32,
    pub mean_track_evidence_2: f32,
    pub mean_track_evidence_2d: f32,

    // Total evidence: distance of closest approach
    pub distance_evidence_1: f32,
    pub distance_evidence_1d: f32,
    pub distance_evidence_close_fraction_1_multiplier: f32,
    pub distance_evidence_close_fraction_2_multiplier: f32,

    // Total evidence weights
    pub contact_weight: f32,
    pub cone_weight: f32,
    pub distance_weight: f32,
    pub track_extrapolation_weight: f32,

    // Required evidence: layer correction
    pub layer_correction_1: f32,
    pub layer_correction_2: f32,
    pub layer_correction_3: f32,
    pub layer_correction_4: f32,
    pub layer_correction_5: f32,
    pub layer_correction_6: f32,
    pub n_deep_in_hcal_layers: u32,
    pub layer_correction_layer_span: u32,
    pub layer_correction_min_inner_layer: u32,
    pub layer_correction_layers_from_ecal: u32,

    // Required evidence: leaving-detector correction
    pub leaving_correction: f32,
    pub use_muon_hits_in_leaving_correction: bool,
    pub muon_hit_list_name: String,
    pub muon_hit_compatibility_cosine: f32,
    pub many_compatible_muon_hits: usize,
    pub leaving_correction_many_muon_hits: f32,
    pub leaving_correction_no_muon_hits: f32,

    // Required evidence: energy corrections
    pub energy_correction_threshold: f32,
    pub low_energy_correction_threshold: f32,
    pub low_energy_correction_n_hit_layers_1: usize,
    pub low_energy_correction_n_hit_layers_2: usize,
    pub low_energy_correction_1: f32,
    pub low_energy_correction_2: f32,
    pub low_energy_correction_3: f32,

    // Required evidence: angular correction
    pub angular_correction_offset: f32,
    pub angular_correction_constant: f32,
    pub angular_correction_gradient: f32,

    // Required evidence: photon correction
    pub photon_correction_energy_1: f32,
    pub photon_correction_energy_2: f32,
    pub photon_correction_energy_3: f32,
    pub photon_correction_shower_start_1: f32,
    pub photon_correction_shower_start_2: f32,
    pub photon_correction_shower_discrepancy_1: f32,
    pub photon_correction_shower_discrepancy_2: f32,
    pub photon_correction_1: f32,
    pub photon_correction_2: f32,
    pub photon_correction_3: f32,
    pub photon_correction_4: f32,
    pub photon_correction_5: f32,
    pub photon_correction_6: f32,
    pub photon_correction_7: f32,

    /// Floor applied to every required-evidence value
    pub min_required_evidence: f32,

    pub contact: ContactParameters,
    pub leaving: LeavingDetectorCriteria,
}

impl Default for FragmentRemovalConfig {
    fn default() -> Self {
        Self {
            min_daughter_calo_hits: 5,
            min_daughter_hadronic_energy: 0.025,

            contact_cut_max_distance: 750.0,
            contact_cut_n_layers: 0,
            contact_cut_cone_fraction_1: 0.25,
            contact_cut_close_hit_fraction_1: 0.25,
            contact_cut_close_hit_fraction_2: 0.15,
            contact_cut_mean_distance_to_helix: 250.0,
            contact_cut_closest_distance_to_helix: 150.0,
            contact_cut_layers_from_ecal: 10,
            contact_cut_near_ecal_distance: 250.0,

            max_chi2: 16.0,
            max_global_chi2: 9.0,
            chi2_base: 5.0,
            global_chi2_penalty: 5.0,
            hadronic_energy_resolution: 0.6,

            correction_layer_n_hit_layers: 3,
            correction_layer_energy_fraction: 0.25,

            contact_evidence_n_layers_1: 10,
            contact_evidence_n_layers_2: 4,
            contact_evidence_n_layers_3: 1,
            contact_evidence_1: 2.0,
            contact_evidence_2: 1.0,
            contact_evidence_3: 0.5,

            cone_evidence_fraction_1: 0.5,
            cone_evidence_ecal_multiplier: 0.5,

            closest_track_evidence_1: 200.0,
            closest_track_evidence_1d: 100.0,
            closest_track_evidence_2: 50.0,
            closest_track_evidence_2d: 20.0,
            mean_track_evidence_1: 200.0,
            mean_track_evidence_1d: 100.0,
            mean_track_evidence_2: 50.0,
            mean_track_evidence_2d: 50.0,

            distance_evidence_1: 100.0,
            distance_evidence_1d: 100.0,
            distance_evidence_close_fraction_1_multiplier: 1.0,
            distance_evidence_close_fraction_2_multiplier: 2.0,

            contact_weight: 1.0,
            cone_weight: 1.0,
            distance_weight: 1.0,
            track_extrapolation_weight: 1.0,

            layer_correction_1: 2.0,
            layer_correction_2: 0.0,
            layer_correction_3: -1.0,
            layer_correction_4: -2.0,
            layer_correction_5: -2.0,
            layer_correction_6: -3.0,
            n_deep_in_hcal_layers: 20,
            layer_correction_layer_span: 4,
            layer_correction_min_inner_layer: 5,
            layer_correction_layers_from_ecal: 4,

            leaving_correction: 5.0,
            use_muon_hits_in_leaving_correction: true,
            muon_hit_list_name: "MuonYokeHits".to_string(),
            muon_hit_compatibility_cosine: 0.8,
            many_compatible_muon_hits: 5,
            leaving_correction_many_muon_hits: 10.0,
            leaving_correction_no_muon_hits: 2.0,

            energy_correction_threshold: 3.0,
            low_energy_correction_threshold: 1.5,
            low_energy_correction_n_hit_layers_1: 6,
            low_energy_correction_n_hit_layers_2: 4,
            low_energy_correction_1: -1.0,
            low_energy_correction_2: -1.0,
            low_energy_correction_3: -1.0,

            angular_correction_offset: 0.75,
            angular_correction_constant: -0.5,
            angular_correction_gradient: 2.0,

            photon_correction_energy_1: 2.0,
            photon_correction_energy_2: 0.5,
            photon_correction_energy_3: 1.0,
            photon_correction_shower_start_1: 5.0,
            photon_correction_shower_start_2: 2.5,
            photon_correction_shower_discrepancy_1: 0.8,
            photon_correction_shower_discrepancy_2: 1.0,
            photon_correction_1: 10.0,
            photon_correction_2: 100.0,
            photon_correction_3: 5.0,
            photon_correction_4: 10.0,
            photon_correction_5: 2.0,
            photon_correction_6: 2.0,
            photon_correction_7: 0.0,

            min_required_evidence: 0.5,

            contact: ContactParameters::default(),
            leaving: LeavingDetectorCriteria::default(),
        }
    }
}

impl FragmentRemovalConfig {
    /// Reject values that would make evidence evaluation undefined
    pub fn validate(&self) -> Result<()> {
        let denominators = [
            ("closest_track_evidence_1d", self.closest_track_evidence_1d),
            ("closest_track_evidence_2d", self.closest_track_evidence_2d),
            ("mean_track_evidence_1d", self.mean_track_evidence_1d),
            ("mean_track_evidence_2d", self.mean_track_evidence_2d),
            ("distance_evidence_1d", self.distance_evidence_1d),
        ];

        for (name, value) in denominators {
            if value == 0.0 || !value.is_finite() {
                return Err(FragmentError::invalid_parameter(
                    name,
                    format!("scale must be finite and non-zero (got {value})"),
                ));
            }
        }

        if !(self.hadronic_energy_resolution > 0.0) || !self.hadronic_energy_resolution.is_finite() {
            return Err(FragmentError::invalid_parameter(
                "hadronic_energy_resolution",
                format!("must be positive (got {})", self.hadronic_energy_resolution),
            ));
        }

        if !(0.0..=1.0).contains(&self.correction_layer_energy_fraction) {
            return Err(FragmentError::invalid_parameter(
                "correction_layer_energy_fraction",
                format!("must lie in [0, 1] (got {})", self.correction_layer_energy_fraction),
            ));
        }

        if self.correction_layer_n_hit_layers == 0 {
            return Err(FragmentError::invalid_parameter(
                "correction_layer_n_hit_layers",
                "must be at least 1",
            ));
        }

        Ok(())
    }
}
