//! Single particle driven by a user force law.

use std::collections::HashMap;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::document::TrackId;
use crate::force::{Expr, UserFunction};
use crate::integrator::Rk4;
use crate::polar::RelativePolar;

/// Length of a particle state `[x, vx, y, vy, t]`.
pub const PARTICLE_STATE_LEN: usize = 5;

/// Coordinates the two force functions are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForceFrame {
    /// `fx, fy` of `[x, vx, y, vy, t]`.
    Cartesian,
    /// `fr, ftheta` of `[r, vr, theta, omega, t]` about the world origin.
    Polar,
}

/// Initial position and velocity in world units.
///
/// `t` is refreshed from the clip whenever the start frame moves.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialValues {
    pub t: f64,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
}

impl InitialValues {
    pub fn new(x: f64, y: f64, vx: f64, vy: f64) -> Self {
        Self { t: 0.0, x, y, vx, vy }
    }

    pub fn from_polar(r: f64, theta: f64, vr: f64, omega: f64) -> Self {
        let polar = RelativePolar { r, vr, theta, omega, t: 0.0 };
        let [x, y, vx, vy] = polar.to_relative();
        Self::new(x, y, vx, vy)
    }

    /// `[x, vx, y, vy, t]`
    pub fn state(&self) -> [f64; PARTICLE_STATE_LEN] {
        [self.x, self.vx, self.y, self.vy, self.t]
    }
}

#[derive(Debug, Clone)]
pub struct DynamicParticle {
    frame: ForceFrame,
    forces: [UserFunction; 2],
    initial: InitialValues,
    state: DVector<f64>,
    solver: Rk4,
    frame_states: HashMap<usize, DVector<f64>>,
    pub(crate) booster: Option<TrackId>,
    pub(crate) system: Option<TrackId>,
}

impl DynamicParticle {
    pub fn new(frame: ForceFrame, forces: [UserFunction; 2], initial: InitialValues) -> Self {
        Self {
            frame,
            forces,
            initial,
            state: DVector::zeros(PARTICLE_STATE_LEN),
            solver: Rk4::new(PARTICLE_STATE_LEN, 0.0),
            frame_states: HashMap::new(),
            booster: None,
            system: None,
        }
    }

    pub fn cartesian(fx: Expr, fy: Expr, initial: InitialValues) -> Self {
        let forces = [UserFunction::new("fx", fx), UserFunction::new("fy", fy)];
        Self::new(ForceFrame::Cartesian, forces, initial)
    }

    pub fn polar(fr: Expr, ftheta: Expr, initial: InitialValues) -> Self {
        let forces = [UserFunction::new("fr", fr), UserFunction::new("ftheta", ftheta)];
        Self::new(ForceFrame::Polar, forces, initial)
    }

    pub fn force_frame(&self) -> ForceFrame {
        self.frame
    }

    pub fn forces(&self) -> &[UserFunction; 2] {
        &self.forces
    }

    pub fn set_forces(&mut self, forces: [UserFunction; 2]) {
        self.forces = forces;
    }

    pub fn initial(&self) -> &InitialValues {
        &self.initial
    }

    pub fn set_initial(&mut self, initial: InitialValues) {
        self.initial = initial;
    }

    pub(crate) fn initial_mut(&mut self) -> &mut InitialValues {
        &mut self.initial
    }

    pub fn booster(&self) -> Option<TrackId> {
        self.booster
    }

    /// System this particle belongs to, if any.
    pub fn system(&self) -> Option<TrackId> {
        self.system
    }

    pub fn state(&self) -> &DVector<f64> {
        &self.state
    }

    /// World force on the particle in the cartesian state `[x, vx, y, vy, t]`.
    pub fn xy_forces(&self, state: &[f64]) -> (f64, f64) {
        xy_forces(self.frame, &self.forces, state)
    }

    /// Rate `[vx, ax, vy, ay, 1]` of the state `[x, vx, y, vy, t]`.
    pub fn rate(&self, mass: f64, state: &DVector<f64>, rate: &mut DVector<f64>) {
        particle_rate(self.frame, &self.forces, mass, state, rate);
    }

    pub(crate) fn reset_state(&mut self, t0: f64) {
        self.initial.t = t0;
        self.state = DVector::from_row_slice(&self.initial.state());
        self.frame_states.clear();
    }

    pub(crate) fn initialize_solver(&mut self, dt: f64) {
        self.solver.initialize(PARTICLE_STATE_LEN, dt);
    }

    pub(crate) fn advance(&mut self, mass: f64, iterations: usize) {
        let Self { frame, forces, state, solver, .. } = self;
        for _ in 0..iterations {
            solver.step(state, |s, out| particle_rate(*frame, forces, mass, s, out));
        }
    }

    pub(crate) fn save_state(&mut self, frame: usize) {
        self.frame_states.insert(frame, self.state.clone());
    }

    pub(crate) fn restore_state(&mut self, frame: usize) -> bool {
        match self.frame_states.get(&frame) {
            Some(saved) => {
                self.state.copy_from(saved);
                true
            }
            None => false,
        }
    }
}

fn xy_forces(frame: ForceFrame, forces: &[UserFunction; 2], state: &[f64]) -> (f64, f64) {
    match frame {
        ForceFrame::Cartesian => (forces[0].evaluate(state), forces[1].evaluate(state)),
        ForceFrame::Polar => {
            let polar = RelativePolar::from_particle(state);
            let vars = polar.as_array();
            polar.project(forces[0].evaluate(&vars), forces[1].evaluate(&vars))
        }
    }
}

fn particle_rate(
    frame: ForceFrame,
    forces: &[UserFunction; 2],
    mass: f64,
    state: &DVector<f64>,
    rate: &mut DVector<f64>,
) {
    let s = state.as_slice();
    let (fx, fy) = xy_forces(frame, forces, s);
    rate[0] = s[1];
    rate[1] = fx / mass;
    rate[2] = s[3];
    rate[3] = fy / mass;
    rate[4] = 1.0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn free_particle_moves_in_a_straight_line() {
        let mut p = DynamicParticle::cartesian(Expr::zero(), Expr::zero(), InitialValues::new(1.0, 2.0, 3.0, -1.0));
        p.reset_state(0.5);
        p.initialize_solver(0.01);
        p.advance(2.0, 100);
        let s = p.state();
        assert_abs_diff_eq!(s[4], 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(s[0], 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s[2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn polar_force_points_along_the_radius() {
        // fr = -1: a unit pull towards the origin
        let p = DynamicParticle::polar(Expr::constant(-1.0), Expr::zero(), InitialValues::default());
        let (fx, fy) = p.xy_forces(&[0.0, 0.0, 2.0, 0.0, 0.0]);
        assert_abs_diff_eq!(fx, 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(fy, -1.0, epsilon = 1e-15);
    }

    #[test]
    fn saved_states_restore_exactly() {
        let mut p = DynamicParticle::cartesian(Expr::constant(1.0), Expr::zero(), InitialValues::default());
        p.reset_state(0.0);
        p.initialize_solver(0.1);
        p.advance(1.0, 3);
        p.save_state(3);
        let saved = p.state().clone();
        p.advance(1.0, 3);
        assert!(p.restore_state(3));
        assert_eq!(p.state(), &saved);
        assert!(!p.restore_state(4));
    }

    #[test]
    fn polar_initial_values_convert_to_cartesian() {
        let init = InitialValues::from_polar(2.0, std::f64::consts::FRAC_PI_2, 0.0, 1.0);
        assert_abs_diff_eq!(init.x, 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(init.y, 2.0, epsilon = 1e-15);
        assert_abs_diff_eq!(init.vx, -2.0, epsilon = 1e-15);
        assert_abs_diff_eq!(init.vy, 0.0, epsilon = 1e-15);
    }
}
