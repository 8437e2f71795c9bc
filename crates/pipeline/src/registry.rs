use std::collections::BTreeMap;

use pfa_fragment::MainFragmentRemoval;
use pfa_topology::{LoopingTracks, MuonReconstruction};

use crate::algorithm::{Algorithm, LOOPING_TRACKS, MAIN_FRAGMENT_REMOVAL, MUON_RECONSTRUCTION};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// Builds a configured algorithm instance
pub type AlgorithmFactory = fn(&PipelineConfig) -> Result<Box<dyn Algorithm>>;

/// Maps algorithm names to their factories
#[derive(Clone)]
pub struct AlgorithmRegistry {
    factories: BTreeMap<String, AlgorithmFactory>,
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl AlgorithmRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry holding every algorithm shipped with the workspace
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(MAIN_FRAGMENT_REMOVAL, |config| {
            Ok(Box::new(MainFragmentRemoval::new(config.fragment_removal.clone())?))
        });
        registry.register(LOOPING_TRACKS, |config| {
            Ok(Box::new(LoopingTracks::new(config.looping_tracks.clone())?))
        });
        registry.register(MUON_RECONSTRUCTION, |config| {
            Ok(Box::new(MuonReconstruction::new(config.muon_reconstruction.clone())?))
        });
        registry
    }

    /// Add or replace the factory for `name`
    pub fn register(&mut self, name: impl Into<String>, factory: AlgorithmFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn create(&self, name: &str, config: &PipelineConfig) -> Result<Box<dyn Algorithm>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| PipelineError::UnknownAlgorithm(name.to_string()))?;
        factory(config)
    }
}
