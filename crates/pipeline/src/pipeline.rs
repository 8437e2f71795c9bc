use pfa_event::{DetectorGeometry, EventStore};

use crate::algorithm::{Algorithm, AlgorithmReport};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::registry::AlgorithmRegistry;

/// Ordered list of configured algorithms
pub struct Pipeline {
    geometry: Option<DetectorGeometry>,
    stages: Vec<Box<dyn Algorithm>>,
}

impl Pipeline {
    /// Instantiate every configured algorithm, failing on the first unknown name
    pub fn from_config(registry: &AlgorithmRegistry, config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        let stages = config
            .algorithms
            .iter()
            .map(|name| registry.create(name, config))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            geometry: config.geometry,
            stages,
        })
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run each stage in order, stopping at the first failure
    pub fn run(&self, store: &mut EventStore) -> Result<Vec<AlgorithmReport>> {
        if let Some(geometry) = self.geometry {
            store.geometry = geometry;
        }

        let mut reports = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            log::info!("running {}", stage.name());
            let report = stage.run(store)?;
            log::info!(
                "{}: {} -> {} clusters",
                report.name,
                report.clusters_before,
                report.clusters_after
            );
            reports.push(report);
        }
        Ok(reports)
    }
}
