use pfa_event::{Cluster, ClusterId, DetectorGeometry, EventStore};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::FragmentRemovalConfig;
use crate::contact::ClusterContact;
use crate::error::Result;

/// Surviving contacts of every candidate daughter, keyed by daughter
pub type ContactMap = BTreeMap<ClusterId, Vec<ClusterContact>>;

/// Clusters whose contacts are stale after a merge
pub type AffectedClusters = BTreeSet<ClusterId>;

/// Which daughters a builder pass reconsiders
#[derive(Debug, Clone, Copy)]
pub enum BuildScope<'a> {
    /// Every cluster in the event
    FirstPass,
    /// Only the clusters invalidated by the previous merge
    Affected(&'a AffectedClusters),
}

/// Populates the contact map from the current cluster list
pub struct ContactGraphBuilder<'a> {
    config: &'a FragmentRemovalConfig,
    geometry: DetectorGeometry,
}

impl<'a> ContactGraphBuilder<'a> {
    pub fn new(config: &'a FragmentRemovalConfig, geometry: DetectorGeometry) -> Self {
        Self { config, geometry }
    }

    /// Rebuild the entries of every daughter within `scope`
    ///
    /// Entries outside the scope are left untouched.
    pub fn update(&self, store: &EventStore, scope: BuildScope<'_>, contacts: &mut ContactMap) -> Result<()> {
        for daughter in store.clusters() {
            if let BuildScope::Affected(affected) = scope {
                if !affected.contains(&daughter.id) {
                    continue;
                }
                contacts.remove(&daughter.id);
            }

            if !self.is_candidate_daughter(daughter) {
                continue;
            }

            let mut daughter_contacts = Vec::new();
            for parent in store.clusters() {
                if parent.id == daughter.id || !parent.has_associated_tracks() {
                    continue;
                }

                let contact = ClusterContact::new(store, daughter, parent, &self.config.contact)?;
                if self.passes_contact_cuts(&contact) {
                    daughter_contacts.push(contact);
                }
            }

            if !daughter_contacts.is_empty() {
                log::trace!("{} has {} contacts", daughter.id, daughter_contacts.len());
                contacts.insert(daughter.id, daughter_contacts);
            }
        }

        Ok(())
    }

    /// Trackless clusters with enough hits and energy may be fragments
    pub fn is_candidate_daughter(&self, cluster: &Cluster) -> bool {
        !cluster.has_associated_tracks()
            && cluster.n_calo_hits() >= self.config.min_daughter_calo_hits
            && cluster.hadronic_energy() >= self.config.min_daughter_hadronic_energy
    }

    /// Coarse admissibility filter applied to every freshly built contact
    pub fn passes_contact_cuts(&self, contact: &ClusterContact) -> bool {
        let config = self.config;
        if contact.distance_to_closest_hit > config.contact_cut_max_distance {
            return false;
        }

        if contact.n_contact_layers > config.contact_cut_n_layers
            || contact.cone_fraction_1 > config.contact_cut_cone_fraction_1
            || contact.close_hit_fraction_1 > config.contact_cut_close_hit_fraction_1
            || contact.close_hit_fraction_2 > config.contact_cut_close_hit_fraction_2
            || contact.mean_distance_to_helix < config.contact_cut_mean_distance_to_helix
            || contact.closest_distance_to_helix < config.contact_cut_closest_distance_to_helix
        {
            return true;
        }

        contact.distance_to_closest_hit < config.contact_cut_near_ecal_distance
            && contact.daughter_inner_layer.saturating_add(config.contact_cut_layers_from_ecal) > self.geometry.ecal_layers
    }
}
