use pfa_event::{ClusterId, EventStore};
use serde::Serialize;

use crate::config::FragmentRemovalConfig;
use crate::contact_map::{AffectedClusters, BuildScope, ContactGraphBuilder, ContactMap};
use crate::context::RunContext;
use crate::error::Result;
use crate::invalidator::affected_clusters;
use crate::selector::MergeSelector;

/// State of the merge loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Recalculating,
    Converged,
}

/// One merge performed by the loop
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeRecord {
    pub parent: ClusterId,
    pub daughter: ClusterId,
    pub total_evidence: f32,
    pub required_evidence: f32,
    pub excess_evidence: f32,
}

/// Summary of a fragment-removal run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FragmentRemovalReport {
    pub iterations: usize,
    pub initial_clusters: usize,
    pub final_clusters: usize,
    pub merges: Vec<MergeRecord>,
}

/// Iterative evidence-based merging of cluster fragments into track-anchored parents
#[derive(Debug, Clone)]
pub struct MainFragmentRemoval {
    config: FragmentRemovalConfig,
}

impl MainFragmentRemoval {
    /// Validates `config` before any evaluation can take place
    pub fn new(config: FragmentRemovalConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FragmentRemovalConfig {
        &self.config
    }

    /// Merge fragments until no contact has positive excess evidence
    ///
    /// On error the event keeps every merge performed so far.
    pub fn run(&self, store: &mut EventStore) -> Result<FragmentRemovalReport> {
        let mut context = RunContext::new(store.geometry);
        let outcome = self.merge_until_converged(store, &mut context);
        context.clear();
        outcome
    }

    fn merge_until_converged(&self, store: &mut EventStore, context: &mut RunContext) -> Result<FragmentRemovalReport> {
        let geometry = context.geometry();
        let builder = ContactGraphBuilder::new(&self.config, geometry);
        let selector = MergeSelector::new(&self.config, geometry);

        let mut report = FragmentRemovalReport {
            initial_clusters: store.n_clusters(),
            ..Default::default()
        };
        let mut contacts = ContactMap::new();
        let mut affected: Option<AffectedClusters> = None;
        let mut state = LoopState::Recalculating;

        while state == LoopState::Recalculating {
            report.iterations += 1;

            let scope = match &affected {
                None => BuildScope::FirstPass,
                Some(affected) => BuildScope::Affected(affected),
            };
            builder.update(store, scope, &mut contacts)?;

            state = match selector.select(store, context, &contacts)? {
                Some(candidate) => {
                    affected = Some(affected_clusters(&contacts, candidate.parent, candidate.daughter)?);
                    contacts.remove(&candidate.daughter);
                    store.merge_and_delete_clusters(candidate.parent, candidate.daughter)?;

                    log::debug!(
                        "merged {} into {} (evidence {:.3}, required {:.3})",
                        candidate.daughter,
                        candidate.parent,
                        candidate.total_evidence,
                        candidate.required_evidence.value
                    );
                    report.merges.push(MergeRecord {
                        parent: candidate.parent,
                        daughter: candidate.daughter,
                        total_evidence: candidate.total_evidence,
                        required_evidence: candidate.required_evidence.value,
                        excess_evidence: candidate.excess_evidence,
                    });
                    LoopState::Recalculating
                }
                None => LoopState::Converged,
            };
        }

        report.final_clusters = store.n_clusters();
        log::info!(
            "fragment removal: {} merges in {} iterations, {} -> {} clusters",
            report.merges.len(),
            report.iterations,
            report.initial_clusters,
            report.final_clusters
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FragmentError;

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let config = FragmentRemovalConfig {
            mean_track_evidence_2d: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            MainFragmentRemoval::new(config),
            Err(FragmentError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_empty_event_converges_immediately() {
        let algorithm = MainFragmentRemoval::new(FragmentRemovalConfig::default()).unwrap();
        let mut store = EventStore::default();

        let report = algorithm.run(&mut store).unwrap();
        assert_eq!(report.iterations, 1);
        assert!(report.merges.is_empty());
        assert_eq!(report.final_clusters, 0);
    }
}
