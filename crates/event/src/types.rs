use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::helix::Helix;

/// Cartesian position or direction in detector coordinates (mm)
pub type CartesianVector = Vector3<f32>;

/// Discretised detector depth index, increasing outwards
pub type PseudoLayer = u32;

/// Stable handle of a cluster inside an [`crate::EventStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(pub u32);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cluster#{}", self.0)
    }
}

/// Stable handle of a track inside an [`crate::EventStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u32);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track#{}", self.0)
    }
}

/// Single calorimeter energy deposit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaloHit {
    /// Hit identifier (unique within an event)
    pub id: u32,

    /// Pseudo layer the hit was recorded in
    pub layer: PseudoLayer,

    /// Hit position (mm)
    pub position: CartesianVector,

    /// Energy deposit under the hadronic energy scale (GeV)
    pub hadronic_energy: f32,

    /// Typical cell size around the hit (mm)
    #[serde(default = "default_cell_length_scale")]
    pub cell_length_scale: f32,

    /// Whether the deposit is compatible with a minimum-ionising particle
    #[serde(default)]
    pub is_possible_mip: bool,

    /// Flagged as isolated from the main shower by hit preparation
    #[serde(default)]
    pub is_isolated: bool,

    /// Recorded in an endcap rather than the barrel
    #[serde(default)]
    pub is_in_endcap: bool,
}

fn default_cell_length_scale() -> f32 {
    10.0
}

impl CaloHit {
    pub fn new(id: u32, layer: PseudoLayer, position: CartesianVector, hadronic_energy: f32) -> Self {
        Self {
            id,
            layer,
            position,
            hadronic_energy,
            cell_length_scale: default_cell_length_scale(),
            is_possible_mip: false,
            is_isolated: false,
            is_in_endcap: false,
        }
    }

    pub fn with_cell_length_scale(mut self, cell_length_scale: f32) -> Self {
        self.cell_length_scale = cell_length_scale;
        self
    }

    pub fn with_possible_mip(mut self, is_possible_mip: bool) -> Self {
        self.is_possible_mip = is_possible_mip;
        self
    }

    pub fn with_isolated(mut self, is_isolated: bool) -> Self {
        self.is_isolated = is_isolated;
        self
    }

    pub fn with_endcap(mut self, is_in_endcap: bool) -> Self {
        self.is_in_endcap = is_in_endcap;
        self
    }

    /// Distance between two hit positions
    pub fn distance_to(&self, other: &CaloHit) -> f32 {
        (self.position - other.position).norm()
    }
}

/// Reconstructed charged-particle trajectory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,

    /// Energy at the distance of closest approach to the interaction point (GeV)
    pub energy_at_dca: f32,

    /// Helix fit at the calorimeter front face
    pub helix: Helix,

    /// Whether the track may seed a reconstructed particle
    #[serde(default = "default_can_form_pfo")]
    pub can_form_pfo: bool,

    /// Tracks produced by a decay or kink of this one
    #[serde(default)]
    pub daughter_tracks: Vec<TrackId>,
}

fn default_can_form_pfo() -> bool {
    true
}

impl Track {
    pub fn new(id: TrackId, energy_at_dca: f32, helix: Helix) -> Self {
        Self {
            id,
            energy_at_dca,
            helix,
            can_form_pfo: default_can_form_pfo(),
            daughter_tracks: Vec::new(),
        }
    }

    pub fn with_daughter_track(mut self, daughter: TrackId) -> Self {
        self.daughter_tracks.push(daughter);
        self
    }
}
