use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use crate::error::{EventError, Result};
use crate::types::CartesianVector;

/// Curvature constant: radius (mm) = pT (GeV) / (FCT * B (T))
const FCT: f32 = 2.997_924_6e-4;

/// Transverse momentum below which a helix is treated as a straight line
const MIN_TRANSVERSE_MOMENTUM: f32 = 1.0e-6;

/// Separation between a point and a helix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HelixDistance {
    /// Distance in the transverse (xy) plane
    pub xy: f32,
    /// Distance along z at the nearest turn
    pub z: f32,
    /// Combined distance, `sqrt(xy^2 + z^2)`
    pub total: f32,
}

/// Charged-particle helix in a solenoidal field along +z
///
/// Parameterised by a reference point on the trajectory and the momentum
/// at that point. A zero field or zero charge degenerates to a straight line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Helix {
    /// Point on the trajectory (mm)
    pub reference_point: CartesianVector,

    /// Momentum at the reference point (GeV)
    pub momentum: CartesianVector,

    /// Charge in units of e
    pub charge: f32,

    /// Solenoid field strength (T)
    #[serde(default)]
    pub b_field: f32,
}

/// Transverse circle of a curved helix
#[derive(Debug, Clone, Copy)]
struct TransverseCircle {
    x_centre: f32,
    y_centre: f32,
    radius: f32,
    /// +1 when the track turns clockwise seen from +z
    turn_sign: f32,
    /// Azimuth of the reference point around the centre
    phi_reference: f32,
}

impl Helix {
    pub fn new(reference_point: CartesianVector, momentum: CartesianVector, charge: f32, b_field: f32) -> Self {
        Self {
            reference_point,
            momentum,
            charge,
            b_field,
        }
    }

    /// Straight-line trajectory through `reference_point` along `momentum`
    pub fn straight(reference_point: CartesianVector, momentum: CartesianVector) -> Self {
        Self::new(reference_point, momentum, 0.0, 0.0)
    }

    fn transverse_momentum(&self) -> f32 {
        self.momentum.x.hypot(self.momentum.y)
    }

    fn is_straight(&self) -> bool {
        self.charge == 0.0 || self.b_field == 0.0 || self.transverse_momentum() < MIN_TRANSVERSE_MOMENTUM
    }

    /// Radius of the transverse circle (mm); infinite for straight tracks
    pub fn radius(&self) -> f32 {
        if self.is_straight() {
            return f32::INFINITY;
        }
        self.transverse_momentum() / (FCT * self.b_field.abs())
    }

    fn transverse_circle(&self) -> Option<TransverseCircle> {
        if self.is_straight() {
            return None;
        }

        let pt = self.transverse_momentum();
        let radius = self.radius();

        // Positive charge in a positive field turns clockwise seen from +z
        let turn_sign = (self.charge * self.b_field).signum();
        let x_centre = self.reference_point.x + turn_sign * radius * self.momentum.y / pt;
        let y_centre = self.reference_point.y - turn_sign * radius * self.momentum.x / pt;
        let phi_reference = (self.reference_point.y - y_centre).atan2(self.reference_point.x - x_centre);

        Some(TransverseCircle {
            x_centre,
            y_centre,
            radius,
            turn_sign,
            phi_reference,
        })
    }

    /// Turning angle travelled from the reference point to azimuth `phi`, wrapped to (-pi, pi]
    fn turning_angle(circle: &TransverseCircle, phi: f32) -> f32 {
        let mut delta_phi = -circle.turn_sign * (phi - circle.phi_reference);
        while delta_phi > PI {
            delta_phi -= 2.0 * PI;
        }
        while delta_phi <= -PI {
            delta_phi += 2.0 * PI;
        }
        delta_phi
    }

    fn position_at(&self, circle: &TransverseCircle, delta_phi: f32) -> CartesianVector {
        let phi = circle.phi_reference - circle.turn_sign * delta_phi;
        let tan_lambda = self.momentum.z / self.transverse_momentum();
        CartesianVector::new(
            circle.x_centre + circle.radius * phi.cos(),
            circle.y_centre + circle.radius * phi.sin(),
            self.reference_point.z + circle.radius * delta_phi * tan_lambda,
        )
    }

    /// Distance from `point` to the trajectory
    pub fn distance_to_point(&self, point: &CartesianVector) -> HelixDistance {
        let Some(circle) = self.transverse_circle() else {
            return self.line_distance_to_point(point);
        };

        let dx = point.x - circle.x_centre;
        let dy = point.y - circle.y_centre;
        let distance_xy = (dx.hypot(dy) - circle.radius).abs();
        let delta_phi = Self::turning_angle(&circle, dy.atan2(dx));

        let tan_lambda = self.momentum.z / self.transverse_momentum();
        let z_on_helix = self.reference_point.z + circle.radius * delta_phi * tan_lambda;
        let mut distance_z = point.z - z_on_helix;

        // Pick the nearest turn of the helix
        let z_per_turn = 2.0 * PI * circle.radius * tan_lambda;
        if z_per_turn.abs() > f32::EPSILON {
            let n_turns = (distance_z / z_per_turn).round();
            distance_z -= n_turns * z_per_turn;
        }
        let distance_z = distance_z.abs();

        HelixDistance {
            xy: distance_xy,
            z: distance_z,
            total: distance_xy.hypot(distance_z),
        }
    }

    fn line_distance_to_point(&self, point: &CartesianVector) -> HelixDistance {
        let offset = point - self.reference_point;
        let norm = self.momentum.norm();

        let separation = if norm > 0.0 {
            let direction = self.momentum / norm;
            offset - direction * offset.dot(&direction)
        } else {
            offset
        };

        HelixDistance {
            xy: separation.x.hypot(separation.y),
            z: separation.z.abs(),
            total: separation.norm(),
        }
    }

    /// Momentum on the trajectory at the azimuth of `point`
    pub fn extrapolated_momentum(&self, point: &CartesianVector) -> CartesianVector {
        let Some(circle) = self.transverse_circle() else {
            return self.momentum;
        };

        let phi = (point.y - circle.y_centre).atan2(point.x - circle.x_centre);
        let rotation = -circle.turn_sign * Self::turning_angle(&circle, phi);
        let (sin, cos) = rotation.sin_cos();
        CartesianVector::new(
            self.momentum.x * cos - self.momentum.y * sin,
            self.momentum.x * sin + self.momentum.y * cos,
            self.momentum.z,
        )
    }

    /// Point where the trajectory crosses the plane at `z`
    ///
    /// Fails when the track does not move along z.
    pub fn point_in_z(&self, z: f32) -> Result<CartesianVector> {
        if self.momentum.z.abs() < MIN_TRANSVERSE_MOMENTUM {
            return Err(EventError::invalid_parameter(format!("helix never reaches z = {z}")));
        }

        match self.transverse_circle() {
            None => {
                let step = (z - self.reference_point.z) / self.momentum.z;
                Ok(self.reference_point + self.momentum * step)
            }
            Some(circle) => {
                let tan_lambda = self.momentum.z / self.transverse_momentum();
                let delta_phi = (z - self.reference_point.z) / (circle.radius * tan_lambda);
                Ok(self.position_at(&circle, delta_phi))
            }
        }
    }

    /// First point ahead of the reference point at transverse distance `radius` from the z axis
    pub fn point_on_circle(&self, radius: f32) -> Result<CartesianVector> {
        let unreachable = || EventError::invalid_parameter(format!("helix never reaches r = {radius}"));

        let Some(circle) = self.transverse_circle() else {
            let (px, py) = (self.momentum.x, self.momentum.y);
            let (rx, ry) = (self.reference_point.x, self.reference_point.y);
            let a = px * px + py * py;
            if a < f32::EPSILON {
                return Err(unreachable());
            }
            let b = 2.0 * (rx * px + ry * py);
            let c = rx * rx + ry * ry - radius * radius;
            let discriminant = b * b - 4.0 * a * c;
            if discriminant < 0.0 {
                return Err(unreachable());
            }

            let root = discriminant.sqrt();
            let step = [(-b - root) / (2.0 * a), (-b + root) / (2.0 * a)]
                .into_iter()
                .filter(|&step| step >= 0.0)
                .fold(f32::MAX, f32::min);
            if step == f32::MAX {
                return Err(unreachable());
            }
            return Ok(self.reference_point + self.momentum * step);
        };

        // Intersections of the track circle with the circle of `radius` around the origin
        let centre_distance = circle.x_centre.hypot(circle.y_centre);
        if centre_distance < f32::EPSILON
            || centre_distance > radius + circle.radius
            || centre_distance < (radius - circle.radius).abs()
        {
            return Err(unreachable());
        }

        let along = (radius * radius - circle.radius * circle.radius + centre_distance * centre_distance)
            / (2.0 * centre_distance);
        let across = (radius * radius - along * along).max(0.0).sqrt();
        let (ux, uy) = (circle.x_centre / centre_distance, circle.y_centre / centre_distance);

        let delta_phi = [1.0_f32, -1.0]
            .into_iter()
            .map(|side| {
                let x = along * ux - side * across * uy;
                let y = along * uy + side * across * ux;
                let phi = (y - circle.y_centre).atan2(x - circle.x_centre);
                (-circle.turn_sign * (phi - circle.phi_reference)).rem_euclid(2.0 * PI)
            })
            .fold(f32::MAX, f32::min);

        Ok(self.position_at(&circle, delta_phi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f32, b: f32, tolerance: f32) {
        assert!((a - b).abs() < tolerance, "{a} != {b} (tolerance {tolerance})");
    }

    #[test]
    fn straight_line_distance() {
        let helix = Helix::straight(CartesianVector::zeros(), CartesianVector::new(10.0, 0.0, 0.0));
        let d = helix.distance_to_point(&CartesianVector::new(2000.0, 30.0, 40.0));

        assert_close(d.total, 50.0, 1e-3);
        assert_close(d.xy, 30.0, 1e-3);
        assert_close(d.z, 40.0, 1e-3);
    }

    #[test]
    fn point_on_curved_helix_has_zero_distance() {
        let helix = Helix::new(
            CartesianVector::zeros(),
            CartesianVector::new(1.0, 0.0, 0.0),
            1.0,
            3.5,
        );
        let radius = helix.radius();
        assert_close(radius, 1.0 / (FCT * 3.5), 1e-2);

        // Clockwise from the origin: centre sits at (0, -R)
        let angle = 0.3_f32;
        let point = CartesianVector::new(radius * angle.sin(), -radius + radius * angle.cos(), 0.0);
        let d = helix.distance_to_point(&point);
        assert!(d.total < 0.5, "distance {:?}", d);
    }

    #[test]
    fn radial_offset_is_reported_in_xy() {
        let helix = Helix::new(
            CartesianVector::zeros(),
            CartesianVector::new(2.0, 0.0, 0.0),
            -1.0,
            4.0,
        );
        let radius = helix.radius();

        // Counter-clockwise: centre at (0, +R); a point 25 mm outside the circle
        let point = CartesianVector::new(0.0, radius + radius + 25.0, 0.0);
        let d = helix.distance_to_point(&point);
        assert_close(d.xy, 25.0, 0.5);
    }

    #[test]
    fn zero_charge_is_straight() {
        let helix = Helix::new(
            CartesianVector::zeros(),
            CartesianVector::new(0.0, 5.0, 0.0),
            0.0,
            3.5,
        );
        assert!(helix.radius().is_infinite());
        let d = helix.distance_to_point(&CartesianVector::new(7.0, 1500.0, 0.0));
        assert_close(d.total, 7.0, 1e-3);
    }

    #[test]
    fn straight_track_reaches_plane_and_cylinder() {
        let helix = Helix::straight(CartesianVector::new(0.0, 0.0, 10.0), CartesianVector::new(3.0, 0.0, 4.0));

        let point = helix.point_in_z(410.0).unwrap();
        assert_close(point.x, 300.0, 1e-3);
        assert_close(point.z, 410.0, 1e-3);

        let point = helix.point_on_circle(150.0).unwrap();
        assert_close(point.x, 150.0, 1e-3);
        assert_close(point.z, 210.0, 1e-3);

        let flat = Helix::straight(CartesianVector::zeros(), CartesianVector::new(1.0, 0.0, 0.0));
        assert!(flat.point_in_z(100.0).is_err());
    }

    #[test]
    fn straight_track_only_crosses_cylinder_ahead() {
        // Moving away from the axis from outside the cylinder
        let helix = Helix::straight(CartesianVector::new(500.0, 0.0, 0.0), CartesianVector::new(1.0, 0.0, 0.0));
        assert!(helix.point_on_circle(100.0).is_err());
    }

    #[test]
    fn curved_track_extrapolations_stay_on_helix() {
        let helix = Helix::new(
            CartesianVector::zeros(),
            CartesianVector::new(1.0, 0.0, 0.5),
            1.0,
            3.5,
        );

        let point = helix.point_in_z(300.0).unwrap();
        assert_close(point.z, 300.0, 1e-2);
        assert!(helix.distance_to_point(&point).total < 0.5);

        let point = helix.point_on_circle(400.0).unwrap();
        assert_close(point.x.hypot(point.y), 400.0, 0.5);
        assert!(helix.distance_to_point(&point).total < 0.5);
        // First crossing ahead of the start: still moving outwards along +x
        assert!(point.x > 0.0);

        let radius = helix.radius();
        assert!(helix.point_on_circle(2.5 * radius).is_err());
    }

    #[test]
    fn extrapolated_momentum_rotates_with_the_track() {
        let helix = Helix::new(
            CartesianVector::zeros(),
            CartesianVector::new(1.0, 0.0, 0.0),
            1.0,
            3.5,
        );
        let at_start = helix.extrapolated_momentum(&CartesianVector::zeros());
        assert_close(at_start.x, 1.0, 1e-5);
        assert_close(at_start.y, 0.0, 1e-5);

        // A quarter turn clockwise from the origin the track moves along -y
        let radius = helix.radius();
        let quarter = helix.extrapolated_momentum(&CartesianVector::new(radius, -radius, 0.0));
        assert_close(quarter.x, 0.0, 1e-4);
        assert_close(quarter.y, -1.0, 1e-4);
        assert_close(quarter.norm(), 1.0, 1e-5);

        let straight = Helix::straight(CartesianVector::zeros(), CartesianVector::new(0.0, 2.0, 0.0));
        assert_eq!(straight.extrapolated_momentum(&CartesianVector::new(5.0, 5.0, 5.0)), straight.momentum);
    }
}
