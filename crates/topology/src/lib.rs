//! Topological cluster association.
//!
//! [`LoopingTracks`] joins the segments a low-momentum charged track leaves
//! when it curls back inside the calorimeter: two clusters whose end fits
//! point back towards each other and nearly meet are merged.
//!
//! [`MuonReconstruction`] pairs clusters found in the muon system with the
//! track that leads into them, then pulls the calorimeter hits that track
//! crossed on its way out into the muon cluster.

mod config;
mod error;
mod looping;
mod muon;

pub use config::{LoopingTracksConfig, MuonReconstructionConfig};
pub use error::{Result, TopologyError};
pub use looping::{
    can_merge_cluster, closest_outer_layer_hit_distance, LoopingMerge, LoopingTracks, LoopingTracksReport,
};
pub use muon::{muon_entry_helix, AbsorbedHit, MuonReconstruction, MuonReconstructionReport, MuonTrackAssociation};
