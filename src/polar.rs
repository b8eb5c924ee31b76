//! Cartesian <-> relative polar state conversion.
//!
//! A relative polar state `{r, vr, theta, omega, t}` describes the position and
//! velocity of one particle relative to another (or to the origin).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativePolar {
    pub r: f64,
    pub vr: f64,
    pub theta: f64,
    pub omega: f64,
    pub t: f64,
}

impl RelativePolar {
    /// Polar state of a relative displacement `(dx, dy)` moving at `(vx, vy)`.
    ///
    /// At `r == 0` the decomposition is singular; the velocity's own magnitude
    /// and angle stand in for `vr` and `theta`, and `omega` is zero. Force laws
    /// are authored against this convention.
    pub fn from_relative(dx: f64, dy: f64, vx: f64, vy: f64, t: f64) -> Self {
        let r = dx.hypot(dy);
        let v = vx.hypot(vy);
        let rang = dy.atan2(dx);
        let vang = vy.atan2(vx);
        let dang = vang - rang;
        if r == 0.0 {
            Self { r, vr: v, theta: vang, omega: 0.0, t }
        } else {
            Self { r, vr: v * dang.cos(), theta: rang, omega: v * dang.sin() / r, t }
        }
    }

    /// Polar state of a single particle `[x, vx, y, vy, t]` about the origin.
    pub fn from_particle(state: &[f64]) -> Self {
        Self::from_relative(state[0], state[2], state[1], state[3], state[4])
    }

    /// Polar state of particle 1 relative to particle 2 in a two-body state
    /// `[x1, vx1, y1, vy1, x2, vx2, y2, vy2, t]`.
    pub fn from_pair(state: &[f64]) -> Self {
        Self::from_relative(
            state[0] - state[4],
            state[2] - state[6],
            state[1] - state[5],
            state[3] - state[7],
            state[8],
        )
    }

    /// Relative cartesian `(dx, dy, vx, vy)` described by this state.
    pub fn to_relative(&self) -> [f64; 4] {
        let (sin, cos) = self.theta.sin_cos();
        let tangential = self.r * self.omega;
        [
            self.r * cos,
            self.r * sin,
            self.vr * cos - tangential * sin,
            self.vr * sin + tangential * cos,
        ]
    }

    /// Particle 1 `[x, vx, y, vy]` given particle 2 `[x, vx, y, vy]`.
    pub fn locate_from(&self, other: &[f64]) -> [f64; 4] {
        let [dx, dy, vx, vy] = self.to_relative();
        [other[0] + dx, other[1] + vx, other[2] + dy, other[3] + vy]
    }

    /// `[r, vr, theta, omega, t]`, the variable order polar force laws see.
    pub fn as_array(&self) -> [f64; 5] {
        [self.r, self.vr, self.theta, self.omega, self.t]
    }

    /// Projects radial and tangential components onto the x and y axes.
    pub fn project(&self, f_r: f64, f_theta: f64) -> (f64, f64) {
        let (sin, cos) = self.theta.sin_cos();
        (f_r * cos - f_theta * sin, f_r * sin + f_theta * cos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn pair_round_trip_restores_positions() {
        let pairs = [
            [1.0, 0.3, 2.0, -0.4, -0.5, 0.1, 0.25, 0.9, 3.0],
            [-4.0, 2.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            [0.0, -1.0, 1e-3, 5.0, 0.0, 1.0, -1e-3, -5.0, 0.0],
        ];
        for s in pairs {
            let polar = RelativePolar::from_pair(&s);
            assert!(polar.r > 0.0);
            let p1 = polar.locate_from(&s[4..8]);
            for (got, want) in p1.iter().zip(&s[0..4]) {
                assert_abs_diff_eq!(*got, *want, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn coincident_particles_use_velocity_direction() {
        let s = [1.0, 0.0, 1.0, 2.0, 1.0, 0.0, 1.0, 0.0, 7.0];
        let polar = RelativePolar::from_pair(&s);
        assert_eq!(polar.r, 0.0);
        assert_eq!(polar.vr, 2.0);
        assert_abs_diff_eq!(polar.theta, std::f64::consts::FRAC_PI_2, epsilon = 1e-15);
        assert_eq!(polar.omega, 0.0);
        assert_eq!(polar.t, 7.0);
    }

    #[test]
    fn circular_motion_is_purely_tangential() {
        // unit circle at angle 0, moving up at speed 2
        let polar = RelativePolar::from_particle(&[1.0, 0.0, 0.0, 2.0, 0.0]);
        assert_abs_diff_eq!(polar.vr, 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(polar.omega, 2.0, epsilon = 1e-15);
        let (fx, fy) = polar.project(-1.0, 0.0);
        assert_abs_diff_eq!(fx, -1.0, epsilon = 1e-15);
        assert_abs_diff_eq!(fy, 0.0, epsilon = 1e-15);
    }
}
