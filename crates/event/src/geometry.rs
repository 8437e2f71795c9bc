use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;
use crate::fit;
use crate::types::PseudoLayer;

/// Layer structure of the calorimeter and the muon-system envelope
///
/// Pseudo layers are numbered from 1 at the ECal front face; the first
/// `ecal_layers` belong to the electromagnetic section, the following
/// `hcal_layers` to the hadronic section. Lengths are in mm, fields in T.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorGeometry {
    pub ecal_layers: u32,
    pub hcal_layers: u32,

    pub ecal_endcap_inner_radius: f32,
    pub hcal_endcap_inner_radius: f32,

    pub coil_inner_radius: f32,
    pub coil_outer_radius: f32,
    pub muon_endcap_inner_z: f32,

    /// Return-yoke field seen by tracks leaving through the barrel
    pub muon_barrel_b_field: f32,
    /// Field seen by tracks leaving through the endcaps
    pub muon_endcap_b_field: f32,
}

impl Default for DetectorGeometry {
    fn default() -> Self {
        Self {
            ecal_layers: 30,
            hcal_layers: 48,

            ecal_endcap_inner_radius: 400.0,
            hcal_endcap_inner_radius: 350.0,

            coil_inner_radius: 3425.0,
            coil_outer_radius: 3945.0,
            muon_endcap_inner_z: 4072.0,

            muon_barrel_b_field: 1.5,
            muon_endcap_b_field: 4.0,
        }
    }
}

impl DetectorGeometry {
    pub fn total_layers(&self) -> u32 {
        self.ecal_layers.saturating_add(self.hcal_layers)
    }

    pub fn is_in_ecal(&self, layer: PseudoLayer) -> bool {
        layer <= self.ecal_layers
    }

    /// Radius halfway through the solenoid coil, where the barrel muon system begins
    pub fn coil_mid_point_radius(&self) -> f32 {
        0.5 * (self.coil_inner_radius + self.coil_outer_radius)
    }

    /// Inner radius of the endcap section a hit in `layer` belongs to
    pub fn endcap_inner_radius(&self, layer: PseudoLayer) -> f32 {
        if self.is_in_ecal(layer) {
            self.ecal_endcap_inner_radius
        } else {
            self.hcal_endcap_inner_radius
        }
    }
}

/// Thresholds used to decide whether a cluster escapes the calorimeter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LeavingDetectorCriteria {
    /// Layers at the back of the HCal counted as "outer sampling layers"
    pub n_outer_sampling_layers: u32,
    /// Outer occupied layers used for the direction fit
    pub n_fit_layers: usize,
    /// Minimum radial cosine of the outer fit for an outgoing cluster
    pub min_outgoing_cosine: f32,
}

impl Default for LeavingDetectorCriteria {
    fn default() -> Self {
        Self {
            n_outer_sampling_layers: 2,
            n_fit_layers: 4,
            min_outgoing_cosine: 0.0,
        }
    }
}

/// Whether `cluster` appears to exit the instrumented volume
///
/// Requires a hit in the outermost sampling layers and, when the outer
/// layers can be fitted, a fitted direction pointing outwards.
pub fn is_cluster_leaving_detector(
    cluster: &Cluster,
    geometry: &DetectorGeometry,
    criteria: &LeavingDetectorCriteria,
) -> bool {
    let outermost = geometry.total_layers();
    let first_outer = outermost.saturating_sub(criteria.n_outer_sampling_layers.saturating_sub(1));

    if cluster.is_empty() || cluster.outer_layer() < first_outer {
        return false;
    }

    let fit = fit::fit_end(cluster, criteria.n_fit_layers);
    if !fit.successful {
        return true;
    }

    fit.radial_direction_cosine > criteria.min_outgoing_cosine
}
