use pfa_event::DetectorGeometry;
use pfa_fragment::FragmentRemovalConfig;
use pfa_topology::{LoopingTracksConfig, MuonReconstructionConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{PipelineError, Result};

/// Reconstruction pipeline read from a TOML document
///
/// ```toml
/// algorithms = ["LoopingTracks", "MainFragmentRemoval"]
///
/// [fragment_removal]
/// chi2_base = 5.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Algorithm names, run in order
    pub algorithms: Vec<String>,

    /// Overrides the geometry stored in the event file
    pub geometry: Option<DetectorGeometry>,

    pub fragment_removal: FragmentRemovalConfig,
    pub looping_tracks: LoopingTracksConfig,
    pub muon_reconstruction: MuonReconstructionConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            algorithms: vec!["MainFragmentRemoval".to_string()],
            geometry: None,
            fragment_removal: FragmentRemovalConfig::default(),
            looping_tracks: LoopingTracksConfig::default(),
            muon_reconstruction: MuonReconstructionConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|err| PipelineError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section that a configured algorithm will read
    pub fn validate(&self) -> Result<()> {
        if self.algorithms.is_empty() {
            return Err(PipelineError::Config("no algorithms configured".to_string()));
        }

        self.fragment_removal.validate()?;
        self.looping_tracks.validate()?;
        self.muon_reconstruction.validate()?;
        Ok(())
    }
}
