use std::collections::{BTreeMap, BTreeSet};

use pfa_event::fit;
use pfa_event::{CaloHit, CartesianVector, Cluster, ClusterId, DetectorGeometry, EventStore, Helix, PseudoLayer, Track, TrackId};
use serde::Serialize;

use crate::config::MuonReconstructionConfig;
use crate::error::Result;

/// Cosine of the angle between two vectors; 0 when either is null
fn cos_opening_angle(lhs: &CartesianVector, rhs: &CartesianVector) -> f32 {
    let norms = lhs.norm() * rhs.norm();
    if norms <= f32::EPSILON {
        0.0
    } else {
        lhs.dot(rhs) / norms
    }
}

/// Trajectory of a track once it has left the calorimeter
///
/// The track is followed to the muon endcap plane on the side of `towards_z`;
/// if it is already beyond the coil there, it leaves through the barrel and is
/// restarted at the coil mid radius instead. The returned position is the
/// entry point into the muon system.
pub fn muon_entry_helix(helix: &Helix, geometry: &DetectorGeometry, towards_z: f32) -> pfa_event::Result<(CartesianVector, Helix)> {
    let endcap_z = if towards_z < 0.0 {
        -geometry.muon_endcap_inner_z
    } else {
        geometry.muon_endcap_inner_z
    };
    let coil_mid_radius = geometry.coil_mid_point_radius();

    let mut entry = helix.point_in_z(endcap_z)?;
    let is_in_barrel = entry.x.hypot(entry.y) > coil_mid_radius;
    if is_in_barrel {
        entry = helix.point_on_circle(coil_mid_radius)?;
    }

    // The return-yoke field points against the solenoid field
    let (charge, b_field) = if is_in_barrel {
        (-helix.charge, geometry.muon_barrel_b_field)
    } else {
        (helix.charge, geometry.muon_endcap_b_field)
    };

    let momentum = helix.extrapolated_momentum(&entry);
    Ok((entry, Helix::new(entry, momentum, charge, b_field)))
}

/// Track chosen for a muon-system cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MuonTrackAssociation {
    pub cluster: ClusterId,
    pub track: TrackId,
    pub distance_to_track: f32,
}

/// Calorimeter hit absorbed into a muon cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbsorbedHit {
    pub cluster: ClusterId,
    pub hit: u32,
    pub layer: PseudoLayer,
    /// Distance to the track helix in units of the hit's cell size
    pub generic_distance: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MuonReconstructionReport {
    pub muon_clusters: usize,
    pub associations: Vec<MuonTrackAssociation>,
    pub absorbed_hits: Vec<AbsorbedHit>,
}

/// Associates muon-system clusters with tracks, then collects the
/// calorimeter hits each associated track left on its way out
#[derive(Debug, Clone)]
pub struct MuonReconstruction {
    config: MuonReconstructionConfig,
}

impl MuonReconstruction {
    pub fn new(config: MuonReconstructionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MuonReconstructionConfig {
        &self.config
    }

    pub fn run(&self, store: &mut EventStore) -> Result<MuonReconstructionReport> {
        let mut report = MuonReconstructionReport {
            muon_clusters: store.n_muon_clusters(),
            ..Default::default()
        };
        if report.muon_clusters == 0 {
            log::debug!("muon reconstruction: no muon clusters");
            return Ok(report);
        }

        self.associate_tracks(store, &mut report)?;
        self.add_calo_hits(store, &mut report)?;

        log::info!(
            "muon reconstruction: {} track associations, {} calorimeter hits absorbed",
            report.associations.len(),
            report.absorbed_hits.len()
        );
        Ok(report)
    }

    /// Inner-layer centroid and start direction of a muon cluster passing the shape cuts
    fn cluster_start(&self, cluster: &Cluster) -> Option<(CartesianVector, CartesianVector)> {
        let config = &self.config;
        if cluster.n_calo_hits() > config.max_cluster_calo_hits
            || cluster.n_occupied_layers() < config.min_cluster_occupied_layers
            || cluster.outer_layer().saturating_sub(cluster.inner_layer()) < config.min_cluster_layer_span
        {
            return None;
        }

        let fit = fit::fit_start(cluster, config.n_cluster_layers_to_fit);
        if !fit.successful {
            return None;
        }
        cluster
            .centroid(cluster.inner_layer())
            .map(|centroid| (centroid, fit.direction))
    }

    fn is_track_candidate(&self, store: &EventStore, track: &Track) -> bool {
        track.can_form_pfo
            && track.daughter_tracks.is_empty()
            && track.energy_at_dca >= self.config.min_track_candidate_energy
            && !store.track_has_associated_cluster(track.id)
    }

    fn associate_tracks(&self, store: &mut EventStore, report: &mut MuonReconstructionReport) -> Result<()> {
        let geometry = store.geometry;

        for id in store.muon_cluster_ids() {
            let Some((inner_centroid, direction)) = self.cluster_start(store.muon_cluster(id)?) else {
                continue;
            };

            let mut best_track = None;
            let mut best_distance = self.config.max_distance_to_track;
            let mut best_energy = 0.0_f32;

            for track in store.tracks() {
                if !self.is_track_candidate(store, track) {
                    continue;
                }

                let (entry, external_helix) = match muon_entry_helix(&track.helix, &geometry, inner_centroid.z) {
                    Ok(extrapolation) => extrapolation,
                    Err(err) => {
                        log::debug!("muon reconstruction: {} not extrapolated: {err}", track.id);
                        continue;
                    }
                };

                if cos_opening_angle(&entry, &direction) < self.config.min_helix_cluster_cos_angle {
                    continue;
                }

                let distance = external_helix.distance_to_point(&inner_centroid).total;
                if distance < best_distance || (distance == best_distance && track.energy_at_dca > best_energy) {
                    best_track = Some(track.id);
                    best_distance = distance;
                    best_energy = track.energy_at_dca;
                }
            }

            if let Some(track) = best_track {
                store.add_track_cluster_association(track, id)?;
                log::debug!("muon reconstruction: {track} associated with {id} (distance {best_distance:.1})");
                report.associations.push(MuonTrackAssociation {
                    cluster: id,
                    track,
                    distance_to_track: best_distance,
                });
            }
        }

        Ok(())
    }

    /// Distance of a calorimeter hit to the helix in cell units, if the hit
    /// lies ahead of the track and within the instrumented endcap region
    fn generic_distance(&self, helix: &Helix, geometry: &DetectorGeometry, hit: &CaloHit) -> Option<f32> {
        let direction = helix.extrapolated_momentum(&hit.position);
        if cos_opening_angle(&hit.position, &direction) < self.config.min_helix_calo_hit_cos_angle {
            return None;
        }

        if hit.is_in_endcap {
            let intersection = match helix.point_in_z(hit.position.z) {
                Ok(point) => point,
                Err(err) => {
                    log::debug!("muon reconstruction: hit {} skipped: {err}", hit.id);
                    return None;
                }
            };
            if intersection.x.hypot(intersection.y) < geometry.endcap_inner_radius(hit.layer) {
                return None;
            }
        }

        if hit.cell_length_scale == 0.0 {
            return None;
        }
        Some(helix.distance_to_point(&hit.position).total / hit.cell_length_scale)
    }

    fn add_calo_hits(&self, store: &mut EventStore, report: &mut MuonReconstructionReport) -> Result<()> {
        let config = &self.config;
        let geometry = store.geometry;

        let calo_hits = match store.hit_list(&config.calo_hit_list_name) {
            Ok(hits) => hits.to_vec(),
            Err(err) if err.is_not_found() => {
                log::warn!("muon reconstruction: {err}, no calorimeter hits added");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let mut hits_by_layer: BTreeMap<PseudoLayer, Vec<CaloHit>> = BTreeMap::new();
        for hit in calo_hits {
            hits_by_layer.entry(hit.layer).or_default().push(hit);
        }
        let mut used: BTreeSet<u32> = store.clustered_hit_ids();

        for id in store.muon_cluster_ids() {
            let cluster = store.muon_cluster(id)?;
            if cluster.associated_tracks.len() != config.n_expected_tracks_per_cluster {
                continue;
            }
            let Some(&track) = cluster.associated_tracks.first() else {
                continue;
            };
            let helix = store.track(track)?.helix.clone();

            for (&layer, hits) in &hits_by_layer {
                let mut candidates: Vec<(&CaloHit, f32)> = Vec::new();
                let mut n_region_1 = 0;
                let mut n_region_2 = 0;

                for hit in hits {
                    if used.contains(&hit.id) || (!config.should_cluster_isolated_hits && hit.is_isolated) {
                        continue;
                    }
                    let Some(distance) = self.generic_distance(&helix, &geometry, hit) else {
                        continue;
                    };

                    candidates.push((hit, distance));
                    if distance < config.region_1_generic_distance {
                        n_region_1 += 1;
                    } else if distance < config.region_2_generic_distance {
                        n_region_2 += 1;
                    }
                }

                // A lone track crossing leaves a tight cluster of hits; anything
                // busier only contributes its closest hit
                let is_isolated =
                    n_region_1 >= config.isolated_min_region_1_hits && n_region_2 <= config.isolated_max_region_2_hits;
                candidates.sort_by(|a, b| a.1.total_cmp(&b.1));

                for (hit, distance) in candidates {
                    if distance > config.max_generic_distance
                        || (is_isolated && distance > config.isolated_max_generic_distance)
                    {
                        break;
                    }

                    store.add_hit_to_cluster(id, hit.clone())?;
                    used.insert(hit.id);
                    report.absorbed_hits.push(AbsorbedHit {
                        cluster: id,
                        hit: hit.id,
                        layer,
                        generic_distance: distance,
                    });

                    if !is_isolated {
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruction() -> MuonReconstruction {
        MuonReconstruction::new(MuonReconstructionConfig::default()).unwrap()
    }

    fn hit(layer: PseudoLayer, position: CartesianVector) -> CaloHit {
        CaloHit::new(layer, layer, position, 0.1).with_cell_length_scale(10.0)
    }

    #[test]
    fn test_cos_opening_angle_of_null_vector_is_zero() {
        let x = CartesianVector::new(1.0, 0.0, 0.0);
        assert_eq!(cos_opening_angle(&x, &CartesianVector::zeros()), 0.0);
        assert!((cos_opening_angle(&x, &CartesianVector::new(2.0, 2.0, 0.0)) - 0.5_f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_barrel_exit_restarts_at_coil_with_reversed_charge() {
        let geometry = DetectorGeometry::default();
        let helix = Helix::new(CartesianVector::zeros(), CartesianVector::new(10.0, 0.0, 0.5), 1.0, 0.0);

        let (entry, external) = muon_entry_helix(&helix, &geometry, 1.0).unwrap();

        assert!((entry.x.hypot(entry.y) - geometry.coil_mid_point_radius()).abs() < 0.5);
        assert_eq!(external.charge, -1.0);
        assert_eq!(external.b_field, geometry.muon_barrel_b_field);
    }

    #[test]
    fn test_forward_exit_stays_on_the_endcap_plane() {
        let geometry = DetectorGeometry::default();
        let helix = Helix::new(CartesianVector::zeros(), CartesianVector::new(1.0, 0.0, -10.0), 1.0, 0.0);

        let (entry, external) = muon_entry_helix(&helix, &geometry, -1.0).unwrap();

        assert!((entry.z + geometry.muon_endcap_inner_z).abs() < 1e-2);
        assert_eq!(external.charge, 1.0);
        assert_eq!(external.b_field, geometry.muon_endcap_b_field);
    }

    #[test]
    fn test_transverse_track_cannot_reach_the_endcap() {
        let helix = Helix::straight(CartesianVector::zeros(), CartesianVector::new(10.0, 0.0, 0.0));
        assert!(muon_entry_helix(&helix, &DetectorGeometry::default(), 1.0).is_err());
    }

    #[test]
    fn test_generic_distance_cuts() {
        let reconstruction = reconstruction();
        let geometry = DetectorGeometry::default();
        let along_x = Helix::straight(CartesianVector::zeros(), CartesianVector::new(10.0, 0.0, 0.5));

        let on_track = hit(5, CartesianVector::new(2000.0, 0.0, 100.0));
        assert!(reconstruction.generic_distance(&along_x, &geometry, &on_track).unwrap() < 1e-3);

        let offset = hit(5, CartesianVector::new(2000.0, 25.0, 100.0));
        let distance = reconstruction.generic_distance(&along_x, &geometry, &offset).unwrap();
        assert!((distance - 2.5).abs() < 1e-2, "{distance}");

        let behind = hit(5, CartesianVector::new(-2000.0, 0.0, -100.0));
        assert_eq!(reconstruction.generic_distance(&along_x, &geometry, &behind), None);

        let unsized_hit = CaloHit::new(6, 5, CartesianVector::new(2000.0, 0.0, 100.0), 0.1).with_cell_length_scale(0.0);
        assert_eq!(reconstruction.generic_distance(&along_x, &geometry, &unsized_hit), None);
    }

    #[test]
    fn test_endcap_hits_inside_the_beam_hole_are_skipped() {
        let reconstruction = reconstruction();
        let geometry = DetectorGeometry::default();
        let forward = Helix::straight(CartesianVector::zeros(), CartesianVector::new(1.0, 0.0, 10.0));

        let near_beam = hit(5, CartesianVector::new(300.0, 0.0, 3000.0)).with_endcap(true);
        assert_eq!(reconstruction.generic_distance(&forward, &geometry, &near_beam), None);

        let barrel_flagged = hit(5, CartesianVector::new(300.0, 0.0, 3000.0));
        assert!(reconstruction.generic_distance(&forward, &geometry, &barrel_flagged).is_some());
    }
}
