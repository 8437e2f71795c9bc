use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::cluster::Cluster;
use crate::error::{EventError, Result};
use crate::geometry::DetectorGeometry;
use crate::types::{CaloHit, ClusterId, Track, TrackId};

/// In-memory container for one event's clusters, tracks and named hit lists
///
/// Clusters are addressed by stable [`ClusterId`] handles; iteration is
/// always in handle order so that every pass over the event is deterministic.
/// Muon-system clusters live in their own list but share the handle space
/// with calorimeter clusters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EventRecord", into = "EventRecord")]
pub struct EventStore {
    pub geometry: DetectorGeometry,
    clusters: BTreeMap<ClusterId, Cluster>,
    muon_clusters: BTreeMap<ClusterId, Cluster>,
    tracks: BTreeMap<TrackId, Track>,
    hit_lists: BTreeMap<String, Vec<CaloHit>>,
}

impl EventStore {
    pub fn new(geometry: DetectorGeometry) -> Self {
        Self {
            geometry,
            ..Default::default()
        }
    }

    /// Load an event from a JSON document on disk
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Write the event as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn insert_cluster(&mut self, cluster: Cluster) -> Result<()> {
        self.check_new_cluster(&cluster)?;
        self.clusters.insert(cluster.id, cluster);
        Ok(())
    }

    /// Add a cluster formed from muon-system hits
    pub fn insert_muon_cluster(&mut self, cluster: Cluster) -> Result<()> {
        self.check_new_cluster(&cluster)?;
        self.muon_clusters.insert(cluster.id, cluster);
        Ok(())
    }

    fn check_new_cluster(&self, cluster: &Cluster) -> Result<()> {
        if self.clusters.contains_key(&cluster.id) || self.muon_clusters.contains_key(&cluster.id) {
            return Err(EventError::invalid_parameter(format!("duplicate {}", cluster.id)));
        }
        Ok(())
    }

    pub fn insert_track(&mut self, track: Track) -> Result<()> {
        if self.tracks.contains_key(&track.id) {
            return Err(EventError::invalid_parameter(format!("duplicate {}", track.id)));
        }
        self.tracks.insert(track.id, track);
        Ok(())
    }

    pub fn insert_hit_list(&mut self, name: impl Into<String>, hits: Vec<CaloHit>) {
        self.hit_lists.insert(name.into(), hits);
    }

    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    pub fn n_clusters(&self) -> usize {
        self.clusters.len()
    }

    pub fn contains_cluster(&self, id: ClusterId) -> bool {
        self.clusters.contains_key(&id)
    }

    pub fn cluster(&self, id: ClusterId) -> Result<&Cluster> {
        self.clusters.get(&id).ok_or(EventError::ClusterNotFound(id))
    }

    /// Handles of every muon-system cluster, in ascending order
    pub fn muon_cluster_ids(&self) -> Vec<ClusterId> {
        self.muon_clusters.keys().copied().collect()
    }

    pub fn muon_cluster(&self, id: ClusterId) -> Result<&Cluster> {
        self.muon_clusters.get(&id).ok_or(EventError::ClusterNotFound(id))
    }

    pub fn n_muon_clusters(&self) -> usize {
        self.muon_clusters.len()
    }

    fn any_cluster_mut(&mut self, id: ClusterId) -> Result<&mut Cluster> {
        match self.clusters.get_mut(&id) {
            Some(cluster) => Ok(cluster),
            None => self.muon_clusters.get_mut(&id).ok_or(EventError::ClusterNotFound(id)),
        }
    }

    fn all_clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values().chain(self.muon_clusters.values())
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn track(&self, id: TrackId) -> Result<&Track> {
        self.tracks.get(&id).ok_or(EventError::TrackNotFound(id))
    }

    /// Tracks associated with cluster `id`
    pub fn associated_tracks(&self, id: ClusterId) -> Result<Vec<&Track>> {
        self.cluster(id)?
            .associated_tracks
            .iter()
            .map(|&track| self.track(track))
            .collect()
    }

    /// Named hit list, e.g. the muon-system hits
    pub fn hit_list(&self, name: &str) -> Result<&[CaloHit]> {
        self.hit_lists
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| EventError::HitListNotFound(name.to_string()))
    }

    /// Move every hit of `daughter` into `parent` and delete `daughter`
    ///
    /// Both handles are resolved before anything is mutated, so a failed
    /// call leaves the event untouched.
    pub fn merge_and_delete_clusters(&mut self, parent: ClusterId, daughter: ClusterId) -> Result<()> {
        if parent == daughter {
            return Err(EventError::SelfMerge(parent));
        }
        if !self.clusters.contains_key(&parent) {
            return Err(EventError::ClusterNotFound(parent));
        }

        let daughter_cluster = self
            .clusters
            .remove(&daughter)
            .ok_or(EventError::ClusterNotFound(daughter))?;

        log::debug!(
            "merging {} ({} hits) into {}",
            daughter,
            daughter_cluster.n_calo_hits(),
            parent
        );

        self.clusters
            .get_mut(&parent)
            .ok_or(EventError::ClusterNotFound(parent))?
            .absorb(daughter_cluster);

        Ok(())
    }

    /// Add `hit` to the calorimeter or muon cluster `id`
    pub fn add_hit_to_cluster(&mut self, id: ClusterId, hit: CaloHit) -> Result<()> {
        self.any_cluster_mut(id)?.add_hit(hit);
        Ok(())
    }

    /// Whether any cluster, calorimeter or muon, lists `track` as associated
    pub fn track_has_associated_cluster(&self, track: TrackId) -> bool {
        self.all_clusters()
            .any(|cluster| cluster.associated_tracks.contains(&track))
    }

    /// Associate `track` with cluster `id`; a track belongs to at most one cluster
    pub fn add_track_cluster_association(&mut self, track: TrackId, id: ClusterId) -> Result<()> {
        self.track(track)?;
        if self.track_has_associated_cluster(track) {
            return Err(EventError::invalid_parameter(format!(
                "{track} is already associated with a cluster"
            )));
        }
        self.any_cluster_mut(id)?.associated_tracks.push(track);
        Ok(())
    }

    /// Identifiers of every hit already owned by a cluster
    pub fn clustered_hit_ids(&self) -> BTreeSet<u32> {
        self.all_clusters()
            .flat_map(|cluster| cluster.hits().map(|hit| hit.id))
            .collect()
    }
}

/// Serialised event document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct EventRecord {
    geometry: DetectorGeometry,
    clusters: Vec<Cluster>,
    muon_clusters: Vec<Cluster>,
    tracks: Vec<Track>,
    hit_lists: BTreeMap<String, Vec<CaloHit>>,
}

impl TryFrom<EventRecord> for EventStore {
    type Error = EventError;

    fn try_from(record: EventRecord) -> Result<Self> {
        let mut store = EventStore::new(record.geometry);
        for track in record.tracks {
            store.insert_track(track)?;
        }
        for cluster in record.clusters.iter().chain(&record.muon_clusters) {
            if let Some(track) = cluster
                .associated_tracks
                .iter()
                .find(|track| !store.tracks.contains_key(track))
            {
                return Err(EventError::TrackNotFound(*track));
            }
        }
        for cluster in record.clusters {
            store.insert_cluster(cluster)?;
        }
        for cluster in record.muon_clusters {
            store.insert_muon_cluster(cluster)?;
        }
        store.hit_lists = record.hit_lists;
        Ok(store)
    }
}

impl From<EventStore> for EventRecord {
    fn from(store: EventStore) -> Self {
        Self {
            geometry: store.geometry,
            clusters: store.clusters.into_values().collect(),
            muon_clusters: store.muon_clusters.into_values().collect(),
            tracks: store.tracks.into_values().collect(),
            hit_lists: store.hit_lists,
        }
    }
}
