//! Straight-line fits to cluster hits.
//!
//! The fitted axis is the principal eigenvector of the hit scatter matrix,
//! oriented from the innermost towards the outermost fitted layer.

use nalgebra::{Matrix3, SymmetricEigen};

use crate::cluster::Cluster;
use crate::error::{EventError, Result};
use crate::types::{CaloHit, CartesianVector, PseudoLayer};

/// Outcome of a straight-line fit; `successful == false` means the other
/// fields carry no information.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterFitResult {
    pub successful: bool,
    /// Unit vector along the fitted line
    pub direction: CartesianVector,
    /// Point on the fitted line (mean of fitted positions)
    pub intercept: CartesianVector,
    /// Sum of squared perpendicular residuals in units of cell size, per degree of freedom
    pub chi2: f32,
    /// Root-mean-square perpendicular residual (mm)
    pub rms: f32,
    /// Cosine between fitted direction and the radial direction at the intercept
    pub radial_direction_cosine: f32,
}

impl ClusterFitResult {
    pub fn failed() -> Self {
        Self {
            successful: false,
            direction: CartesianVector::zeros(),
            intercept: CartesianVector::zeros(),
            chi2: 0.0,
            rms: 0.0,
            radial_direction_cosine: 0.0,
        }
    }
}

/// Fit a line through `hits`; hits are expected innermost layer first
pub fn fit_hits<'a>(hits: impl IntoIterator<Item = &'a CaloHit>) -> ClusterFitResult {
    let hits: Vec<&CaloHit> = hits.into_iter().collect();
    if hits.len() < 2 {
        return ClusterFitResult::failed();
    }

    let n = hits.len() as f32;
    let intercept: CartesianVector = hits.iter().map(|hit| hit.position).sum::<CartesianVector>() / n;

    let mut scatter = Matrix3::<f32>::zeros();
    for hit in &hits {
        let offset = hit.position - intercept;
        scatter += offset * offset.transpose();
    }

    let eigen = SymmetricEigen::new(scatter);
    let (principal, largest) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .fold((0, f32::MIN), |best, (i, &value)| if value > best.1 { (i, value) } else { best });

    if largest <= f32::EPSILON {
        return ClusterFitResult::failed();
    }

    let mut direction: CartesianVector = eigen.eigenvectors.column(principal).into_owned();
    let norm = direction.norm();
    if norm <= 0.0 {
        return ClusterFitResult::failed();
    }
    direction /= norm;

    let inner_layer = hits.iter().map(|hit| hit.layer).min().unwrap_or(0);
    let outer_layer = hits.iter().map(|hit| hit.layer).max().unwrap_or(0);
    let orientation = if outer_layer > inner_layer {
        layer_mean(&hits, outer_layer) - layer_mean(&hits, inner_layer)
    } else {
        intercept
    };
    if direction.dot(&orientation) < 0.0 {
        direction = -direction;
    }

    let mut sum_squared = 0.0_f32;
    let mut chi2 = 0.0_f32;
    for hit in &hits {
        let offset = hit.position - intercept;
        let perpendicular = offset - direction * offset.dot(&direction);
        let residual_squared = perpendicular.norm_squared();
        sum_squared += residual_squared;
        let scale = hit.cell_length_scale.max(1.0);
        chi2 += residual_squared / (scale * scale);
    }
    let dof = hits.len().saturating_sub(2).max(1) as f32;

    let intercept_norm = intercept.norm();
    let radial_direction_cosine = if intercept_norm > 0.0 {
        direction.dot(&intercept) / intercept_norm
    } else {
        0.0
    };

    ClusterFitResult {
        successful: true,
        direction,
        intercept,
        chi2: chi2 / dof,
        rms: (sum_squared / n).sqrt(),
        radial_direction_cosine,
    }
}

fn layer_mean(hits: &[&CaloHit], layer: PseudoLayer) -> CartesianVector {
    let (sum, count) = hits
        .iter()
        .filter(|hit| hit.layer == layer)
        .fold((CartesianVector::zeros(), 0usize), |(sum, count), hit| (sum + hit.position, count + 1));
    if count == 0 {
        sum
    } else {
        sum / count as f32
    }
}

/// Fit every hit in the cluster
pub fn fit_all_hits(cluster: &Cluster) -> ClusterFitResult {
    fit_hits(cluster.hits())
}

/// Fit hits in the first `max_occupied_layers` occupied layers
pub fn fit_start(cluster: &Cluster, max_occupied_layers: usize) -> ClusterFitResult {
    fit_hits(
        cluster
            .ordered_hits()
            .values()
            .take(max_occupied_layers)
            .flatten(),
    )
}

/// Fit hits in the last `max_occupied_layers` occupied layers
pub fn fit_end(cluster: &Cluster, max_occupied_layers: usize) -> ClusterFitResult {
    let mut layers: Vec<&Vec<CaloHit>> = cluster
        .ordered_hits()
        .values()
        .rev()
        .take(max_occupied_layers)
        .collect();
    layers.reverse();
    fit_hits(layers.into_iter().flatten())
}

/// Distance of closest approach between two fitted lines
///
/// Fails for unsuccessful fits and for parallel lines, where the closest
/// approach is not unique.
pub fn fit_results_closest_approach(lhs: &ClusterFitResult, rhs: &ClusterFitResult) -> Result<f32> {
    if !lhs.successful || !rhs.successful {
        return Err(EventError::invalid_parameter("closest approach of unsuccessful fit"));
    }

    let normal = lhs.direction.cross(&rhs.direction);
    let normal_norm = normal.norm();
    if normal_norm < f32::EPSILON {
        return Err(EventError::invalid_parameter("closest approach of parallel fits"));
    }

    Ok(((rhs.intercept - lhs.intercept).dot(&normal) / normal_norm).abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClusterId;

    fn line_cluster(direction: CartesianVector, offset: CartesianVector, n_layers: u32) -> Cluster {
        Cluster::new(ClusterId(1)).with_hits((1..=n_layers).map(|layer| {
            CaloHit::new(layer, layer, offset + direction * (layer as f32 * 20.0), 0.1)
        }))
    }

    #[test]
    fn fits_straight_line_outwards() {
        let cluster = line_cluster(
            CartesianVector::new(1.0, 0.0, 0.0),
            CartesianVector::new(1500.0, 0.0, 0.0),
            8,
        );
        let fit = cluster.fit_to_all_hits();

        assert!(fit.successful);
        assert!((fit.direction.x - 1.0).abs() < 1e-4);
        assert!(fit.rms < 1e-2);
        assert!((fit.radial_direction_cosine - 1.0).abs() < 1e-4);
    }

    #[test]
    fn fit_uses_individual_hits_not_layer_centroids() {
        // Two hits per layer at y = +-5: the layer centroids sit on the axis
        let cluster = Cluster::new(ClusterId(1)).with_hits((1..=6u32).flat_map(|layer| {
            let x = 1500.0 + 20.0 * layer as f32;
            [
                CaloHit::new(2 * layer, layer, CartesianVector::new(x, 5.0, 0.0), 0.1),
                CaloHit::new(2 * layer + 1, layer, CartesianVector::new(x, -5.0, 0.0), 0.1),
            ]
        }));
        let fit = fit_all_hits(&cluster);

        assert!(fit.successful);
        assert!((fit.direction.x - 1.0).abs() < 1e-4);
        assert!((fit.rms - 5.0).abs() < 1e-3, "{}", fit.rms);
    }

    #[test]
    fn orientation_follows_layer_order() {
        // Layers increase towards -x: fitted direction must point to -x
        let cluster = line_cluster(
            CartesianVector::new(-1.0, 0.0, 0.0),
            CartesianVector::new(1500.0, 0.0, 0.0),
            6,
        );
        let fit = cluster.fit_to_all_hits();
        assert!(fit.direction.x < -0.99);
        assert!(fit.radial_direction_cosine < -0.99);
    }

    #[test]
    fn single_layer_single_hit_fails() {
        let cluster = line_cluster(CartesianVector::new(1.0, 0.0, 0.0), CartesianVector::zeros(), 1);
        assert!(!cluster.fit_to_all_hits().successful);
    }

    #[test]
    fn fit_end_uses_outer_layers() {
        let mut cluster = line_cluster(
            CartesianVector::new(1.0, 0.0, 0.0),
            CartesianVector::new(1500.0, 0.0, 0.0),
            4,
        );
        // Outer layers turn towards +y
        for layer in 5..=8u32 {
            cluster.add_hit(CaloHit::new(
                100 + layer,
                layer,
                CartesianVector::new(1580.0, (layer - 4) as f32 * 20.0, 0.0),
                0.1,
            ));
        }

        let fit = fit_end(&cluster, 4);
        assert!(fit.successful);
        assert!(fit.direction.y > 0.99);

        let fit = fit_start(&cluster, 4);
        assert!(fit.direction.x > 0.99);
    }

    #[test]
    fn closest_approach_of_skew_lines() {
        let a = ClusterFitResult {
            successful: true,
            direction: CartesianVector::new(1.0, 0.0, 0.0),
            intercept: CartesianVector::zeros(),
            ..ClusterFitResult::failed()
        };
        let b = ClusterFitResult {
            successful: true,
            direction: CartesianVector::new(0.0, 1.0, 0.0),
            intercept: CartesianVector::new(0.0, 0.0, 30.0),
            ..ClusterFitResult::failed()
        };

        let distance = fit_results_closest_approach(&a, &b).unwrap();
        assert!((distance - 30.0).abs() < 1e-4);
        assert!(fit_results_closest_approach(&a, &a).is_err());
    }
}
