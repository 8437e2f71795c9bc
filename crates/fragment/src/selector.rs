use pfa_event::{Cluster, ClusterId, DetectorGeometry, EventStore};
use serde::Serialize;

use crate::config::FragmentRemovalConfig;
use crate::contact::ClusterContact;
use crate::contact_map::ContactMap;
use crate::context::RunContext;
use crate::error::{FragmentError, Result};
use crate::evidence::{correction_layer, track_cluster_compatibility, EvidenceModel, RequiredEvidence};

/// Outcome of the per-daughter χ² gate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preselection {
    pub passes: bool,
    /// Old minus new χ² with the daughter shared across every contacted parent
    pub global_delta_chi2: f32,
}

/// Whether adding the daughter to some parent keeps or improves energy compatibility
pub fn preselect(
    store: &EventStore,
    daughter: &Cluster,
    contacts: &[ClusterContact],
    config: &FragmentRemovalConfig,
) -> Result<Preselection> {
    if contacts.is_empty() {
        return Ok(Preselection {
            passes: false,
            global_delta_chi2: 0.0,
        });
    }

    let resolution = config.hadronic_energy_resolution;
    let daughter_energy = daughter.corrected_hadronic_energy();

    let mut passes = false;
    let mut total_parent_energy = 0.0_f32;
    let mut total_track_energy = 0.0_f32;
    for contact in contacts {
        let parent_energy = store.cluster(contact.parent)?.corrected_hadronic_energy();
        let track_energy = contact.parent_track_energy;
        total_parent_energy += parent_energy;
        total_track_energy += track_energy;

        let old_chi = track_cluster_compatibility(parent_energy, track_energy, resolution)?;
        let new_chi = track_cluster_compatibility(parent_energy + daughter_energy, track_energy, resolution)?;
        let (old_chi2, new_chi2) = (old_chi * old_chi, new_chi * new_chi);
        if new_chi2 < config.max_chi2 || new_chi2 < old_chi2 {
            passes = true;
        }
    }

    let old_chi = track_cluster_compatibility(total_parent_energy, total_track_energy, resolution)?;
    let new_chi = track_cluster_compatibility(total_parent_energy + daughter_energy, total_track_energy, resolution)?;
    let (old_chi2, new_chi2) = (old_chi * old_chi, new_chi * new_chi);
    if new_chi2 < config.max_global_chi2 || new_chi2 < old_chi2 {
        passes = true;
    }

    Ok(Preselection {
        passes,
        global_delta_chi2: old_chi2 - new_chi2,
    })
}

/// Pair chosen for merging, with the evidence that selected it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeCandidate {
    pub parent: ClusterId,
    pub daughter: ClusterId,
    pub total_evidence: f32,
    pub required_evidence: RequiredEvidence,
    pub excess_evidence: f32,
}

/// Finds the contact with the largest positive excess evidence
pub struct MergeSelector<'a> {
    config: &'a FragmentRemovalConfig,
    model: EvidenceModel<'a>,
}

impl<'a> MergeSelector<'a> {
    pub fn new(config: &'a FragmentRemovalConfig, geometry: DetectorGeometry) -> Self {
        Self {
            config,
            model: EvidenceModel::new(config, geometry),
        }
    }

    /// Best merge in `contacts`, or `None` when no pair has positive excess
    ///
    /// Ties keep the earliest pair in map order.
    pub fn select(
        &self,
        store: &EventStore,
        context: &mut RunContext,
        contacts: &ContactMap,
    ) -> Result<Option<MergeCandidate>> {
        let mut best: Option<MergeCandidate> = None;
        let mut highest_excess = 0.0_f32;

        for (&daughter_id, daughter_contacts) in contacts {
            if let Some(stray) = daughter_contacts.iter().find(|c| c.daughter != daughter_id) {
                return Err(FragmentError::invariant(format!(
                    "contact {} -> {} stored under {}",
                    stray.daughter, stray.parent, daughter_id
                )));
            }

            let daughter = store.cluster(daughter_id)?;
            let preselection = preselect(store, daughter, daughter_contacts, self.config)?;
            if !preselection.passes {
                continue;
            }

            let correction_layer = correction_layer(daughter, self.config);
            for contact in daughter_contacts {
                let total_evidence = self.model.total_evidence(contact);
                let required_evidence = self.model.required_evidence(
                    store,
                    context,
                    daughter,
                    contact,
                    correction_layer,
                    preselection.global_delta_chi2,
                )?;
                let excess_evidence = total_evidence - required_evidence.value;

                log::trace!(
                    "{} -> {}: evidence {:.3}, required {:.3}",
                    daughter_id,
                    contact.parent,
                    total_evidence,
                    required_evidence.value
                );

                if excess_evidence > highest_excess {
                    highest_excess = excess_evidence;
                    best = Some(MergeCandidate {
                        parent: contact.parent,
                        daughter: daughter_id,
                        total_evidence,
                        required_evidence,
                        excess_evidence,
                    });
                }
            }
        }

        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pfa_event::{CaloHit, CartesianVector, Helix, Track, TrackId};
    use pretty_assertions::assert_eq;

    fn line(id: u32, layers: std::ops::RangeInclusive<u32>, y: f32, energy: f32) -> Cluster {
        Cluster::new(ClusterId(id)).with_hits(layers.map(|layer| {
            CaloHit::new(
                id * 1000 + layer,
                layer,
                CartesianVector::new(2000.0 + 20.0 * layer as f32, y, 0.0),
                energy,
            )
        }))
    }

    fn event(track_energy: f32) -> EventStore {
        let mut store = EventStore::default();
        store
            .insert_track(Track::new(
                TrackId(1),
                track_energy,
                Helix::straight(CartesianVector::zeros(), CartesianVector::new(1.0, 0.0, 0.0)),
            ))
            .unwrap();
        store.insert_cluster(line(1, 1..=30, 0.0, 0.5).with_track(TrackId(1))).unwrap();
        store.insert_cluster(line(2, 1..=12, 15.0, 0.05)).unwrap();
        store
    }

    fn contact(daughter: u32, parent: u32, track_energy: f32) -> ClusterContact {
        ClusterContact {
            daughter: ClusterId(daughter),
            parent: ClusterId(parent),
            daughter_inner_layer: 1,
            n_contact_layers: 12,
            contact_fraction: 1.0,
            cone_fraction_1: 0.0,
            cone_fraction_2: 0.0,
            cone_fraction_3: 0.0,
            close_hit_fraction_1: 1.0,
            close_hit_fraction_2: 1.0,
            mean_distance_to_helix: 15.0,
            closest_distance_to_helix: 15.0,
            distance_to_closest_hit: 15.0,
            parent_track_energy: track_energy,
        }
    }

    #[test]
    fn test_preselection_passes_when_daughter_improves_compatibility() {
        let store = event(15.5);
        let config = FragmentRemovalConfig::default();
        let daughter = store.cluster(ClusterId(2)).unwrap();

        let preselection = preselect(&store, daughter, &[contact(2, 1, 15.5)], &config).unwrap();
        assert!(preselection.passes);
        assert!(preselection.global_delta_chi2 > 0.0);
    }

    #[test]
    fn test_preselection_fails_when_parent_already_saturates_track() {
        // Parent carries 15 GeV against a 1 GeV track: adding energy only worsens chi2
        let store = event(1.0);
        let config = FragmentRemovalConfig::default();
        let daughter = store.cluster(ClusterId(2)).unwrap();

        let preselection = preselect(&store, daughter, &[contact(2, 1, 1.0)], &config).unwrap();
        assert!(!preselection.passes);
        assert!(preselection.global_delta_chi2 < 0.0);
    }

    #[test]
    fn test_selects_pair_with_positive_excess() {
        let store = event(15.5);
        let config = FragmentRemovalConfig::default();
        let selector = MergeSelector::new(&config, store.geometry);
        let mut context = RunContext::new(store.geometry);

        let contacts = ContactMap::from([(ClusterId(2), vec![contact(2, 1, 15.5)])]);
        let candidate = selector.select(&store, &mut context, &contacts).unwrap().unwrap();

        assert_eq!(candidate.parent, ClusterId(1));
        assert_eq!(candidate.daughter, ClusterId(2));
        assert!(candidate.excess_evidence > 0.0);
        assert!((candidate.excess_evidence - (candidate.total_evidence - candidate.required_evidence.value)).abs() < 1e-6);
    }

    #[test]
    fn test_weak_contact_yields_no_candidate() {
        let store = event(15.5);
        let config = FragmentRemovalConfig::default();
        let selector = MergeSelector::new(&config, store.geometry);
        let mut context = RunContext::new(store.geometry);

        let mut weak = contact(2, 1, 15.5);
        weak.n_contact_layers = 0;
        weak.contact_fraction = 0.0;
        weak.close_hit_fraction_1 = 0.0;
        weak.close_hit_fraction_2 = 0.0;
        weak.mean_distance_to_helix = f32::MAX;
        weak.closest_distance_to_helix = f32::MAX;
        weak.distance_to_closest_hit = 400.0;

        let contacts = ContactMap::from([(ClusterId(2), vec![weak])]);
        assert_eq!(selector.select(&store, &mut context, &contacts).unwrap(), None);
    }

    #[test]
    fn test_mismatched_daughter_is_invariant_violation() {
        let store = event(15.5);
        let config = FragmentRemovalConfig::default();
        let selector = MergeSelector::new(&config, store.geometry);
        let mut context = RunContext::new(store.geometry);

        let contacts = ContactMap::from([(ClusterId(2), vec![contact(7, 1, 15.5)])]);
        assert!(matches!(
            selector.select(&store, &mut context, &contacts),
            Err(FragmentError::InvariantViolation(_))
        ));
    }
}
