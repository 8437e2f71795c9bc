use pfa_event::{CartesianVector, Cluster, DetectorGeometry, EventStore};

use crate::config::FragmentRemovalConfig;
use crate::error::Result;

/// State scoped to a single merge-loop run
///
/// Holds the geometry snapshot read at the start of the run and the lazily
/// populated muon-hit direction cache.
#[derive(Debug, Clone)]
pub struct RunContext {
    geometry: DetectorGeometry,
    muon_directions: Vec<CartesianVector>,
    muon_lookup_done: bool,
}

impl RunContext {
    pub fn new(geometry: DetectorGeometry) -> Self {
        Self {
            geometry,
            muon_directions: Vec::new(),
            muon_lookup_done: false,
        }
    }

    pub fn geometry(&self) -> DetectorGeometry {
        self.geometry
    }

    /// Number of cached muon-hit directions compatible with the parent's outer layer
    ///
    /// Returns `None` when no muon hits are available for this event. A
    /// missing hit list is not an error.
    pub fn n_compatible_muon_hits(
        &mut self,
        store: &EventStore,
        parent: &Cluster,
        config: &FragmentRemovalConfig,
    ) -> Result<Option<usize>> {
        if !self.muon_lookup_done {
            self.muon_lookup_done = true;
            match store.hit_list(&config.muon_hit_list_name) {
                Ok(hits) => {
                    self.muon_directions = hits.iter().filter_map(|hit| unit(hit.position)).collect();
                }
                Err(err) if err.is_not_found() => {
                    log::warn!("{err}, leaving corrections ignore muon hits");
                }
                Err(err) => return Err(err.into()),
            }
        }

        if self.muon_directions.is_empty() {
            return Ok(None);
        }

        let Some(direction) = parent.centroid(parent.outer_layer()).and_then(unit) else {
            return Ok(Some(0));
        };

        let n_compatible = self
            .muon_directions
            .iter()
            .filter(|muon| muon.dot(&direction) > config.muon_hit_compatibility_cosine)
            .count();
        Ok(Some(n_compatible))
    }

    /// Drop transient caches at the end of a run
    pub fn clear(&mut self) {
        self.muon_directions.clear();
        self.muon_lookup_done = false;
    }
}

fn unit(vector: CartesianVector) -> Option<CartesianVector> {
    let norm = vector.norm();
    (norm > 0.0).then(|| vector / norm)
}
