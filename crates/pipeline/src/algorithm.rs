use pfa_event::{ClusterId, EventStore};
use pfa_fragment::MainFragmentRemoval;
use pfa_topology::{LoopingTracks, MuonReconstruction};
use serde::Serialize;

use crate::error::Result;

/// A reconstruction stage that mutates the event's cluster list
pub trait Algorithm {
    /// Registered name of the stage
    fn name(&self) -> &'static str;

    fn run(&self, store: &mut EventStore) -> Result<AlgorithmReport>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub parent: ClusterId,
    pub daughter: ClusterId,
}

/// What one stage did to the event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlgorithmReport {
    pub name: String,
    pub clusters_before: usize,
    pub clusters_after: usize,
    pub merges: Vec<MergeSummary>,
    /// Stage-specific run summary
    pub details: serde_json::Value,
}

impl AlgorithmReport {
    fn new(name: &str, clusters_before: usize, store: &EventStore, details: impl Serialize) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            clusters_before,
            clusters_after: store.n_clusters(),
            merges: Vec::new(),
            details: serde_json::to_value(details)?,
        })
    }
}

pub const MAIN_FRAGMENT_REMOVAL: &str = "MainFragmentRemoval";
pub const LOOPING_TRACKS: &str = "LoopingTracks";
pub const MUON_RECONSTRUCTION: &str = "MuonReconstruction";

impl Algorithm for MainFragmentRemoval {
    fn name(&self) -> &'static str {
        MAIN_FRAGMENT_REMOVAL
    }

    fn run(&self, store: &mut EventStore) -> Result<AlgorithmReport> {
        let before = store.n_clusters();
        let report = MainFragmentRemoval::run(self, store)?;
        let merges = report
            .merges
            .iter()
            .map(|merge| MergeSummary {
                parent: merge.parent,
                daughter: merge.daughter,
            })
            .collect();

        Ok(AlgorithmReport {
            merges,
            ..AlgorithmReport::new(MAIN_FRAGMENT_REMOVAL, before, store, &report)?
        })
    }
}

impl Algorithm for LoopingTracks {
    fn name(&self) -> &'static str {
        LOOPING_TRACKS
    }

    fn run(&self, store: &mut EventStore) -> Result<AlgorithmReport> {
        let before = store.n_clusters();
        let report = LoopingTracks::run(self, store)?;
        let merges = report
            .merges
            .iter()
            .map(|merge| MergeSummary {
                parent: merge.parent,
                daughter: merge.daughter,
            })
            .collect();

        Ok(AlgorithmReport {
            merges,
            ..AlgorithmReport::new(LOOPING_TRACKS, before, store, &report)?
        })
    }
}

/// Muon clusters live outside the calorimeter cluster list, so this stage
/// never merges; its track associations and absorbed hits go into `details`.
impl Algorithm for MuonReconstruction {
    fn name(&self) -> &'static str {
        MUON_RECONSTRUCTION
    }

    fn run(&self, store: &mut EventStore) -> Result<AlgorithmReport> {
        let before = store.n_clusters();
        let report = MuonReconstruction::run(self, store)?;
        AlgorithmReport::new(MUON_RECONSTRUCTION, before, store, &report)
    }
}
