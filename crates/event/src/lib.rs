//! # PFA Event
//!
//! Event data model for calorimeter reconstruction passes.
//!
//! ## Contents
//!
//! - **Hits, clusters, tracks** - calorimeter deposits grouped by pseudo layer,
//!   with derived energies, layer extent and centroids
//! - **Helix** - charged-track trajectory with point-distance queries and
//!   extrapolation to planes in z and cylinders around the beam axis
//! - **Fits** - principal-axis line fits over all, first or last cluster layers
//! - **Geometry** - ECal/HCal layer structure and the leaving-detector test
//! - **EventStore** - handle-addressed container with merge-and-delete,
//!   hit absorption and track-cluster association
//!
//! ```text
//! EventStore
//!     ├─ clusters: ClusterId -> Cluster (hits by PseudoLayer, tracks)
//!     ├─ muon_clusters: ClusterId -> Cluster (muon-system hits)
//!     ├─ tracks:   TrackId   -> Track (energy at DCA, Helix)
//!     └─ hit_lists: name     -> [CaloHit]   (e.g. muon-system hits)
//! ```

mod cluster;
mod error;
pub mod fit;
mod geometry;
mod helix;
mod store;
mod types;

pub use cluster::{Cluster, OrderedCaloHitList};
pub use error::{EventError, Result};
pub use fit::ClusterFitResult;
pub use geometry::{is_cluster_leaving_detector, DetectorGeometry, LeavingDetectorCriteria};
pub use helix::{Helix, HelixDistance};
pub use store::EventStore;
pub use types::{CaloHit, CartesianVector, ClusterId, PseudoLayer, Track, TrackId};
