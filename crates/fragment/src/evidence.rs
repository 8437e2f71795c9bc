//! Evidence for and against merging a daughter into a parent.
//!
//! [`EvidenceModel::total_evidence`] scores how strongly a contact favours a
//! merge; [`EvidenceModel::required_evidence`] sets the bar that score must
//! clear. A pair merges when total evidence exceeds required evidence.

use pfa_event::{is_cluster_leaving_detector, Cluster, DetectorGeometry, EventStore, PseudoLayer};
use serde::Serialize;

use crate::config::FragmentRemovalConfig;
use crate::contact::ClusterContact;
use crate::context::RunContext;
use crate::error::{FragmentError, Result};

/// Energy compatibility of a cluster with a track, in standard deviations
pub fn track_cluster_compatibility(cluster_energy: f32, track_energy: f32, resolution: f32) -> Result<f32> {
    if track_energy <= 0.0 || !track_energy.is_finite() {
        return Err(FragmentError::invalid_parameter(
            "track_energy",
            format!("track energy must be positive (got {track_energy})"),
        ));
    }
    if resolution <= 0.0 {
        return Err(FragmentError::invalid_parameter(
            "hadronic_energy_resolution",
            format!("must be positive (got {resolution})"),
        ));
    }

    Ok((cluster_energy - track_energy) / (resolution * track_energy.sqrt()))
}

/// Layer by which the daughter's shower has developed
///
/// Walks the occupied layers outwards and stops once enough layers have been
/// visited or enough energy has accumulated.
pub fn correction_layer(daughter: &Cluster, config: &FragmentRemovalConfig) -> PseudoLayer {
    let total_energy = daughter.hadronic_energy();
    let energy_limit = config.correction_layer_energy_fraction * total_energy;

    let mut energy = 0.0_f32;
    for (visited, (&layer, hits)) in daughter.ordered_hits().iter().enumerate() {
        energy += hits.iter().map(|hit| hit.hadronic_energy).sum::<f32>();
        if visited + 1 >= config.correction_layer_n_hit_layers || energy > energy_limit {
            return layer;
        }
    }

    daughter.inner_layer()
}

/// Breakdown of the evidence required before a contact may merge
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RequiredEvidence {
    pub chi2_evidence: f32,
    pub global_chi2_evidence: f32,
    pub using_global_chi2: bool,
    pub layer_correction: f32,
    pub leaving_correction: f32,
    pub energy_correction: f32,
    pub low_energy_correction: f32,
    pub angular_correction: f32,
    pub photon_correction: f32,
    /// Final requirement, never below the configured floor
    pub value: f32,
}

pub struct EvidenceModel<'a> {
    config: &'a FragmentRemovalConfig,
    geometry: DetectorGeometry,
}

impl<'a> EvidenceModel<'a> {
    pub fn new(config: &'a FragmentRemovalConfig, geometry: DetectorGeometry) -> Self {
        Self { config, geometry }
    }

    /// Weighted sum of the four evidence heuristics
    pub fn total_evidence(&self, contact: &ClusterContact) -> f32 {
        let config = self.config;
        config.contact_weight * self.contact_evidence(contact)
            + config.cone_weight * self.cone_evidence(contact)
            + config.distance_weight * self.distance_evidence(contact)
            + config.track_extrapolation_weight * self.track_extrapolation_evidence(contact)
    }

    pub fn contact_evidence(&self, contact: &ClusterContact) -> f32 {
        let config = self.config;
        let tier = if contact.n_contact_layers > config.contact_evidence_n_layers_1 {
            config.contact_evidence_1
        } else if contact.n_contact_layers > config.contact_evidence_n_layers_2 {
            config.contact_evidence_2
        } else if contact.n_contact_layers > config.contact_evidence_n_layers_3 {
            config.contact_evidence_3
        } else {
            0.0
        };

        tier * (1.0 + contact.contact_fraction)
    }

    pub fn cone_evidence(&self, contact: &ClusterContact) -> f32 {
        let config = self.config;
        if contact.cone_fraction_1 <= config.cone_evidence_fraction_1 {
            return 0.0;
        }

        let evidence = contact.cone_fraction_1 + contact.cone_fraction_2 + contact.cone_fraction_3;
        if contact.daughter_inner_layer < self.geometry.ecal_layers {
            evidence * config.cone_evidence_ecal_multiplier
        } else {
            evidence
        }
    }

    pub fn track_extrapolation_evidence(&self, contact: &ClusterContact) -> f32 {
        let config = self.config;
        let closest = contact.closest_distance_to_helix;
        let mean = contact.mean_distance_to_helix;
        if closest >= config.closest_track_evidence_1 {
            return 0.0;
        }

        let mut evidence = (config.closest_track_evidence_1 - closest) / config.closest_track_evidence_1d;
        if closest < config.closest_track_evidence_2 {
            evidence += (config.closest_track_evidence_2 - closest) / config.closest_track_evidence_2d;
        }

        evidence += (config.mean_track_evidence_1 - mean) / config.mean_track_evidence_1d;
        if mean < config.mean_track_evidence_2 {
            evidence += (config.mean_track_evidence_2 - mean) / config.mean_track_evidence_2d;
        }

        evidence
    }

    pub fn distance_evidence(&self, contact: &ClusterContact) -> f32 {
        let config = self.config;
        if contact.distance_to_closest_hit >= config.distance_evidence_1 {
            return 0.0;
        }

        (config.distance_evidence_1 - contact.distance_to_closest_hit) / config.distance_evidence_1d
            + config.distance_evidence_close_fraction_1_multiplier * contact.close_hit_fraction_1
            + config.distance_evidence_close_fraction_2_multiplier * contact.close_hit_fraction_2
    }

    /// Evidence demanded before `contact` may merge its daughter into its parent
    ///
    /// `global_delta_chi2` is the change in χ² when the daughter's energy is
    /// added to all of its contacted parents at once.
    pub fn required_evidence(
        &self,
        store: &EventStore,
        context: &mut RunContext,
        daughter: &Cluster,
        contact: &ClusterContact,
        correction_layer: PseudoLayer,
        global_delta_chi2: f32,
    ) -> Result<RequiredEvidence> {
        let config = self.config;
        let parent = store.cluster(contact.parent)?;

        let parent_energy = parent.corrected_hadronic_energy();
        let daughter_energy = daughter.corrected_hadronic_energy();
        let resolution = config.hadronic_energy_resolution;
        let old_chi = track_cluster_compatibility(parent_energy, contact.parent_track_energy, resolution)?;
        let new_chi =
            track_cluster_compatibility(parent_energy + daughter_energy, contact.parent_track_energy, resolution)?;
        let (old_chi2, new_chi2) = (old_chi * old_chi, new_chi * new_chi);

        let chi2_evidence = config.chi2_base - (old_chi2 - new_chi2);
        let global_chi2_evidence = config.chi2_base + config.global_chi2_penalty - global_delta_chi2;
        let using_global_chi2 =
            (new_chi2 > old_chi2 && new_chi2 > config.max_global_chi2) || global_chi2_evidence < chi2_evidence;

        let hadronic_energy = daughter.hadronic_energy();
        let layer_correction = self.layer_correction(daughter, correction_layer);
        let leaving_correction = self.leaving_correction(store, context, parent)?;
        let energy_correction = self.energy_correction(hadronic_energy);
        let low_energy_correction = self.low_energy_correction(daughter, correction_layer);
        let angular_correction = self.angular_correction(daughter);
        let photon_correction = self.photon_correction(daughter);

        let basis = if using_global_chi2 {
            global_chi2_evidence
        } else {
            chi2_evidence + low_energy_correction
        };
        let sum = basis + layer_correction + angular_correction + energy_correction + leaving_correction + photon_correction;

        Ok(RequiredEvidence {
            chi2_evidence,
            global_chi2_evidence,
            using_global_chi2,
            layer_correction,
            leaving_correction,
            energy_correction,
            low_energy_correction,
            angular_correction,
            photon_correction,
            value: sum.max(config.min_required_evidence),
        })
    }

    /// Correction keyed to how deep in the calorimeter the daughter develops
    pub fn layer_correction(&self, daughter: &Cluster, correction_layer: PseudoLayer) -> f32 {
        let config = self.config;
        let n_ecal = self.geometry.ecal_layers;

        let mut correction = if correction_layer > n_ecal.saturating_add(config.n_deep_in_hcal_layers) {
            config.layer_correction_4
        } else if correction_layer > n_ecal {
            config.layer_correction_3
        } else if correction_layer > n_ecal / 2 {
            config.layer_correction_2
        } else {
            config.layer_correction_1
        };

        let inner = daughter.inner_layer();
        let span = daughter.outer_layer().saturating_sub(inner);
        if span < config.layer_correction_layer_span && inner > config.layer_correction_min_inner_layer {
            correction = config.layer_correction_5;
        }

        if correction_layer.abs_diff(n_ecal) < config.layer_correction_layers_from_ecal {
            correction = config.layer_correction_6;
        }

        correction
    }

    /// Penalty for parents that appear to leave the calorimeter
    ///
    /// When muon hits are available the penalty is sharpened by how many of
    /// them line up with the parent.
    pub fn leaving_correction(&self, store: &EventStore, context: &mut RunContext, parent: &Cluster) -> Result<f32> {
        let config = self.config;
        if !is_cluster_leaving_detector(parent, &self.geometry, &config.leaving) {
            return Ok(0.0);
        }

        let mut correction = config.leaving_correction;
        if config.use_muon_hits_in_leaving_correction {
            match context.n_compatible_muon_hits(store, parent, config)? {
                Some(n) if n > config.many_compatible_muon_hits => {
                    correction = config.leaving_correction_many_muon_hits;
                }
                Some(0) => correction = config.leaving_correction_no_muon_hits,
                _ => {}
            }
        }

        Ok(correction)
    }

    /// Relief for daughters below the energy threshold
    ///
    /// Lowers the requirement by the daughter's shortfall below the
    /// threshold.
    pub fn energy_correction(&self, daughter_energy: f32) -> f32 {
        let threshold = self.config.energy_correction_threshold;
        if daughter_energy < threshold {
            daughter_energy - threshold
        } else {
            0.0
        }
    }

    pub fn low_energy_correction(&self, daughter: &Cluster, correction_layer: PseudoLayer) -> f32 {
        let config = self.config;
        if daughter.hadronic_energy() >= config.low_energy_correction_threshold {
            return 0.0;
        }

        let n_hit_layers = daughter.n_occupied_layers();
        let mut correction = 0.0;
        if n_hit_layers < config.low_energy_correction_n_hit_layers_1 {
            correction += config.low_energy_correction_1;
        }
        if n_hit_layers < config.low_energy_correction_n_hit_layers_2 {
            correction += config.low_energy_correction_2;
        }
        if correction_layer > self.geometry.ecal_layers {
            correction += config.low_energy_correction_3;
        }
        correction
    }

    /// Correction for daughters that do not point away from the interaction point
    pub fn angular_correction(&self, daughter: &Cluster) -> f32 {
        let config = self.config;
        let fit = daughter.fit_to_all_hits();
        let radial_cosine = if fit.successful {
            fit.radial_direction_cosine
        } else {
            0.0
        };

        if radial_cosine < config.angular_correction_offset {
            config.angular_correction_constant
                + (radial_cosine - config.angular_correction_offset) * config.angular_correction_gradient
        } else {
            0.0
        }
    }

    /// Correction for photon-like daughters; the last matching condition wins
    pub fn photon_correction(&self, daughter: &Cluster) -> f32 {
        let config = self.config;
        if !daughter.is_photon_fast {
            return 0.0;
        }

        let energy = daughter.hadronic_energy();
        let start = daughter.shower_profile_start;
        let discrepancy = daughter.shower_profile_discrepancy;

        let conditions = [
            (
                energy > config.photon_correction_energy_1 && start < config.photon_correction_shower_start_1,
                config.photon_correction_1,
            ),
            (
                energy > config.photon_correction_energy_1 && start < config.photon_correction_shower_start_2,
                config.photon_correction_2,
            ),
            (
                energy < config.photon_correction_energy_1 && start < config.photon_correction_shower_start_2,
                config.photon_correction_3,
            ),
            (
                energy < config.photon_correction_energy_1
                    && start < config.photon_correction_shower_start_2
                    && discrepancy < config.photon_correction_shower_discrepancy_1,
                config.photon_correction_4,
            ),
            (
                energy < config.photon_correction_energy_1 && start > config.photon_correction_shower_start_2,
                config.photon_correction_5,
            ),
            (
                energy < config.photon_correction_energy_2
                    && (start > config.photon_correction_shower_start_2
                        || discrepancy > config.photon_correction_shower_discrepancy_2),
                config.photon_correction_6,
            ),
            (
                energy < config.photon_correction_energy_3 && start > config.photon_correction_shower_start_2,
                config.photon_correction_7,
            ),
        ];

        conditions
            .iter()
            .filter(|(matches, _)| *matches)
            .last()
            .map_or(0.0, |&(_, correction)| correction)
    }
}
