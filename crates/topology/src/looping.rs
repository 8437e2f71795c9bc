use pfa_event::fit::{self, ClusterFitResult};
use pfa_event::{Cluster, ClusterId, DetectorGeometry, EventStore};
use serde::Serialize;

use crate::config::LoopingTracksConfig;
use crate::error::Result;

/// Whether a cluster is a plausible piece of a charged track
///
/// Anything not flagged photon-like qualifies; photon-like clusters need a
/// high MIP fraction or a narrow straight-line profile.
pub fn can_merge_cluster(cluster: &Cluster, min_mip_fraction: f32, max_all_hit_fit_rms: f32) -> bool {
    if !cluster.is_photon_fast {
        return true;
    }

    if cluster.mip_fraction() - min_mip_fraction > f32::EPSILON {
        return true;
    }

    let fit = cluster.fit_to_all_hits();
    fit.successful && fit.rms < max_all_hit_fit_rms
}

/// Smallest separation between hits in the outer layers of two clusters
pub fn closest_outer_layer_hit_distance(lhs: &Cluster, rhs: &Cluster) -> f32 {
    let lhs_hits = lhs.hits_in_layer(lhs.outer_layer());
    let rhs_hits = rhs.hits_in_layer(rhs.outer_layer());

    lhs_hits
        .iter()
        .flat_map(|l| rhs_hits.iter().map(move |r| l.distance_to(r)))
        .fold(f32::MAX, f32::min)
}

/// One merge of a curling-track segment into its partner
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopingMerge {
    pub parent: ClusterId,
    pub daughter: ClusterId,
    pub fit_closest_approach: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoopingTracksReport {
    pub candidates: usize,
    pub merges: Vec<LoopingMerge>,
}

struct FitRelation {
    cluster: ClusterId,
    fit: ClusterFitResult,
    defunct: bool,
}

/// Joins cluster segments left by low-momentum tracks curling inside the calorimeter
#[derive(Debug, Clone)]
pub struct LoopingTracks {
    config: LoopingTracksConfig,
}

impl LoopingTracks {
    pub fn new(config: LoopingTracksConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &LoopingTracksConfig {
        &self.config
    }

    pub fn run(&self, store: &mut EventStore) -> Result<LoopingTracksReport> {
        let geometry = store.geometry;
        let mut relations = self.fit_candidates(store);
        let mut report = LoopingTracksReport {
            candidates: relations.len(),
            ..Default::default()
        };

        // A parent that absorbed a partner is examined again before moving on
        let mut i = 0;
        while i < relations.len() {
            if relations[i].defunct {
                i += 1;
                continue;
            }

            match self.best_partner(store, &geometry, &relations, i)? {
                Some((j, approach)) => {
                    let parent = relations[i].cluster;
                    let daughter = relations[j].cluster;
                    store.merge_and_delete_clusters(parent, daughter)?;
                    relations[j].defunct = true;

                    log::debug!("looping track: merged {daughter} into {parent} (approach {approach:.1})");
                    report.merges.push(LoopingMerge {
                        parent,
                        daughter,
                        fit_closest_approach: approach,
                    });
                }
                None => i += 1,
            }
        }

        log::info!(
            "looping tracks: {} merges among {} candidates",
            report.merges.len(),
            report.candidates
        );
        Ok(report)
    }

    /// End fits of every mergeable cluster, ordered by inner layer
    fn fit_candidates(&self, store: &EventStore) -> Vec<FitRelation> {
        let config = &self.config;
        let mut clusters: Vec<&Cluster> = store.clusters().collect();
        clusters.sort_by_key(|cluster| cluster.inner_layer());

        clusters
            .into_iter()
            .filter(|cluster| {
                can_merge_cluster(cluster, config.can_merge_min_mip_fraction, config.can_merge_max_rms)
                    && cluster.n_calo_hits() >= config.min_hits_in_cluster
                    && cluster.n_occupied_layers() >= config.min_occupied_layers_in_cluster
            })
            .filter_map(|cluster| {
                let fit = fit::fit_end(cluster, config.n_layers_to_fit);
                (fit.successful && fit.chi2 < config.fit_chi2_cut).then_some(FitRelation {
                    cluster: cluster.id,
                    fit,
                    defunct: false,
                })
            })
            .collect()
    }

    /// Later candidate whose end fit best continues the parent's, if any
    fn best_partner(
        &self,
        store: &EventStore,
        geometry: &DetectorGeometry,
        relations: &[FitRelation],
        parent_index: usize,
    ) -> Result<Option<(usize, f32)>> {
        let config = &self.config;
        let parent_relation = &relations[parent_index];
        let parent = store.cluster(parent_relation.cluster)?;
        let parent_fit = &parent_relation.fit;

        let n_ecal = geometry.ecal_layers;
        let deep_in_hcal = n_ecal.saturating_add(config.n_deep_in_hcal_layers);
        let parent_outer_layer = parent.outer_layer();
        let Some(parent_centroid) = parent.centroid(parent_outer_layer) else {
            return Ok(None);
        };

        let mut best = None;
        let mut min_approach = f32::MAX;

        for (j, relation) in relations.iter().enumerate().skip(parent_index + 1) {
            if relation.defunct {
                continue;
            }

            let daughter = store.cluster(relation.cluster)?;
            let daughter_fit = &relation.fit;
            let daughter_outer_layer = daughter.outer_layer();

            let is_outside_ecal = parent_outer_layer > n_ecal && daughter_outer_layer > n_ecal;
            let is_deep_in_hcal = parent_outer_layer > deep_in_hcal && daughter_outer_layer > deep_in_hcal;

            let outer_layer_difference = parent_outer_layer.abs_diff(daughter_outer_layer);
            if outer_layer_difference > config.max_outer_layer_difference {
                continue;
            }

            let Some(daughter_centroid) = daughter.centroid(daughter_outer_layer) else {
                continue;
            };
            let centroid_difference = parent_centroid - daughter_centroid;
            if centroid_difference.norm() > config.max_centroid_difference {
                continue;
            }

            // Segments of a curling track head back towards each other
            let dot_product_cut = if is_deep_in_hcal {
                config.fit_direction_dot_product_cut_hcal
            } else {
                config.fit_direction_dot_product_cut_ecal
            };
            let fit_dot_product = parent_fit.direction.dot(&daughter_fit.direction);
            if fit_dot_product > dot_product_cut {
                continue;
            }

            if centroid_difference.dot(&(daughter_fit.direction - parent_fit.direction)) <= 0.0 {
                continue;
            }

            let hit_distance_cut = if is_deep_in_hcal {
                config.closest_hit_distance_cut_hcal
            } else {
                config.closest_hit_distance_cut_ecal
            };
            if closest_outer_layer_hit_distance(parent, daughter) > hit_distance_cut {
                continue;
            }

            let approach_cut = if is_outside_ecal {
                config.fit_results_closest_approach_cut_hcal
            } else {
                config.fit_results_closest_approach_cut_ecal
            };
            let Ok(approach) = fit::fit_results_closest_approach(parent_fit, daughter_fit) else {
                continue;
            };
            if approach > approach_cut || approach > min_approach {
                continue;
            }

            let mut n_good_features = 0;
            if !is_deep_in_hcal {
                if fit_dot_product < config.good_features_max_fit_dot_product {
                    n_good_features += 1;
                }
                if approach < config.good_features_max_fit_approach {
                    n_good_features += 1;
                }
                if outer_layer_difference < config.good_features_max_layer_difference {
                    n_good_features += 1;
                }
                if parent.mip_fraction() > config.good_features_min_mip_fraction
                    && daughter.mip_fraction() > config.good_features_min_mip_fraction
                {
                    n_good_features += 1;
                }
            }

            if is_deep_in_hcal || n_good_features >= config.n_good_features_for_cluster_merge {
                best = Some((j, approach));
                min_approach = approach;
            }
        }

        Ok(best)
    }
}
