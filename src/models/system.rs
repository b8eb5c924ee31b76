//! Two-body system: up to two dynamic particles stepped as one state.
//!
//! The system state is `[x1, vx1, y1, vy1, (x2, vx2, y2, vy2), t]`. Each
//! member keeps its own external force law; the system adds an internal
//! interaction `fr, ftheta` of the relative polar state of particle 1 about
//! particle 2, applied with opposite signs to the two particles.

use std::collections::{BTreeMap, HashMap};

use nalgebra::{DVector, Point2};

use crate::document::TrackId;
use crate::force::{Expr, UserFunction};
use crate::integrator::Rk4;
use crate::models::dynamic::DynamicParticle;
use crate::polar::RelativePolar;

pub const MAX_PARTICLES: usize = 2;

/// A resolved member: its force law and mass.
#[derive(Debug, Clone, Copy)]
pub struct Member<'a> {
    pub particle: &'a DynamicParticle,
    pub mass: f64,
}

#[derive(Debug, Clone)]
pub struct DynamicSystem {
    pub(crate) members: Vec<TrackId>,
    /// Member names read from a saved document and not yet resolved.
    pub(crate) pending_names: Vec<String>,
    forces: [UserFunction; 2],
    state: DVector<f64>,
    solver: Rk4,
    frame_states: HashMap<usize, DVector<f64>>,
    relative_states: BTreeMap<usize, RelativePolar>,
    pub(crate) inspector: Option<(i32, i32)>,
}

impl DynamicSystem {
    pub fn new(fr: Expr, ftheta: Expr) -> Self {
        Self {
            members: Vec::new(),
            pending_names: Vec::new(),
            forces: [UserFunction::new("fr", fr), UserFunction::new("ftheta", ftheta)],
            state: DVector::zeros(1),
            solver: Rk4::new(1, 0.0),
            frame_states: HashMap::new(),
            relative_states: BTreeMap::new(),
            inspector: None,
        }
    }

    pub fn members(&self) -> &[TrackId] {
        &self.members
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn pending_names(&self) -> &[String] {
        &self.pending_names
    }

    /// Internal interaction forces `[fr, ftheta]`.
    pub fn forces(&self) -> &[UserFunction; 2] {
        &self.forces
    }

    pub fn set_forces(&mut self, forces: [UserFunction; 2]) {
        self.forces = forces;
    }

    pub fn inspector_position(&self) -> Option<(i32, i32)> {
        self.inspector
    }

    pub fn set_inspector_position(&mut self, position: Option<(i32, i32)>) {
        self.inspector = position;
    }

    pub fn state(&self) -> &DVector<f64> {
        &self.state
    }

    pub fn state_len(&self) -> usize {
        4 * self.members.len() + 1
    }

    /// Relative polar state recorded when `frame` was committed.
    pub fn relative_state(&self, frame: usize) -> Option<RelativePolar> {
        self.relative_states.get(&frame).copied()
    }

    /// Rate at `state`, taking it as the stored state as well.
    pub fn rate(&self, members: &[Member<'_>], state: &DVector<f64>, rate: &mut DVector<f64>) {
        system_rate(members, &self.forces, state, state, rate);
    }

    /// Concatenates the members' initial states; `t` is `t0`.
    pub(crate) fn reset_state(&mut self, members: &[Member<'_>], t0: f64) {
        let mut state = DVector::zeros(4 * members.len() + 1);
        for (i, m) in members.iter().enumerate() {
            let init = m.particle.initial().state();
            state.rows_mut(4 * i, 4).copy_from_slice(&init[..4]);
        }
        let last = state.len() - 1;
        state[last] = t0;
        self.state = state;
        self.frame_states.clear();
        self.relative_states.clear();
    }

    pub(crate) fn initialize_solver(&mut self, dt: f64) {
        self.solver.initialize(self.state.len(), dt);
    }

    pub(crate) fn advance(&mut self, members: &[Member<'_>], iterations: usize) {
        let Self { forces, state, solver, .. } = self;
        let mut stored = state.clone();
        for _ in 0..iterations {
            stored.copy_from(state);
            solver.step(state, |s, out| system_rate(members, forces, &stored, s, out));
        }
    }

    /// Member positions followed by the centre of mass.
    pub(crate) fn positions(&self, members: &[Member<'_>], out: &mut Vec<Point2<f64>>) {
        if members.is_empty() {
            return;
        }
        let s = &self.state;
        let mut mass = 0.0;
        let mut cm = Point2::<f64>::origin();
        for (i, m) in members.iter().enumerate() {
            out.push(Point2::new(s[4 * i], s[4 * i + 2]));
            mass += m.mass;
            cm.x += m.mass * s[4 * i];
            cm.y += m.mass * s[4 * i + 2];
        }
        out.push(Point2::new(cm.x / mass, cm.y / mass));
    }

    pub(crate) fn save_state(&mut self, frame: usize) {
        self.frame_states.insert(frame, self.state.clone());
        if self.state.len() == 4 * MAX_PARTICLES + 1 {
            self.relative_states.insert(frame, RelativePolar::from_pair(self.state.as_slice()));
        }
    }

    pub(crate) fn restore_state(&mut self, frame: usize) -> bool {
        match self.frame_states.get(&frame) {
            Some(saved) if saved.len() == self.state.len() => {
                self.state.copy_from(saved);
                true
            }
            _ => false,
        }
    }
}

impl Default for DynamicSystem {
    fn default() -> Self {
        Self::new(Expr::zero(), Expr::zero())
    }
}

/// Time derivative of a system state.
///
/// With no members only `dt/dt = 1` is set. With one member the particle's
/// own force law drives it. With two, the internal forces are projected from
/// the relative polar frame and applied with opposite signs.
///
/// Each member's own force law sees `stored`, the state at the start of the
/// step, not the stage `state`.
pub fn system_rate(
    members: &[Member<'_>],
    internal: &[UserFunction; 2],
    stored: &DVector<f64>,
    state: &DVector<f64>,
    rate: &mut DVector<f64>,
) {
    let last = state.len() - 1;
    rate[last] = 1.0;
    let t = stored[last];
    let particle_state = |i: usize| {
        [stored[4 * i], stored[4 * i + 1], stored[4 * i + 2], stored[4 * i + 3], t]
    };
    let (fr, ftheta, sin, cos) = if members.len() == MAX_PARTICLES {
        let polar = RelativePolar::from_pair(state.as_slice());
        let vars = polar.as_array();
        let (sin, cos) = polar.theta.sin_cos();
        (internal[0].evaluate(&vars), internal[1].evaluate(&vars), sin, cos)
    } else {
        (0.0, 0.0, 0.0, 0.0)
    };
    for (i, m) in members.iter().take(MAX_PARTICLES).enumerate() {
        let (fx, fy) = m.particle.xy_forces(&particle_state(i));
        let sign = if i == 0 { 1.0 } else { -1.0 };
        rate[4 * i] = state[4 * i + 1];
        rate[4 * i + 1] = (fx + sign * fr * cos - sign * ftheta * sin) / m.mass;
        rate[4 * i + 2] = state[4 * i + 3];
        rate[4 * i + 3] = (fy + sign * fr * sin + sign * ftheta * cos) / m.mass;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dynamic::InitialValues;
    use approx::assert_abs_diff_eq;

    fn free(x: f64, vy: f64) -> DynamicParticle {
        DynamicParticle::cartesian(Expr::zero(), Expr::zero(), InitialValues::new(x, 0.0, 0.0, vy))
    }

    #[test]
    fn empty_system_only_advances_time() {
        let state = DVector::from_vec(vec![3.0]);
        let mut rate = DVector::zeros(1);
        system_rate(&[], &DynamicSystem::default().forces, &state, &state, &mut rate);
        assert_eq!(rate[0], 1.0);
    }

    #[test]
    fn single_member_uses_its_own_force() {
        let p = DynamicParticle::cartesian(Expr::constant(2.0), Expr::constant(-4.0), InitialValues::default());
        let members = [Member { particle: &p, mass: 2.0 }];
        let state = DVector::from_vec(vec![0.0, 1.0, 0.0, 3.0, 0.0]);
        let mut rate = DVector::zeros(5);
        system_rate(&members, &DynamicSystem::default().forces, &state, &state, &mut rate);
        assert_eq!(rate.as_slice(), &[1.0, 1.0, 3.0, -2.0, 1.0]);
    }

    #[test]
    fn member_forces_read_the_stored_state() {
        // fx = -x, fy = y
        let p = DynamicParticle::cartesian(
            Expr::spring(1.0, 0, 0.0),
            Expr::var(2),
            InitialValues::default(),
        );
        let members = [Member { particle: &p, mass: 1.0 }];
        let stored = DVector::from_vec(vec![2.0, 0.0, 5.0, 0.0, 0.0]);
        let stage = DVector::from_vec(vec![7.0, 1.5, -3.0, 0.5, 0.1]);
        let mut rate = DVector::zeros(5);
        system_rate(&members, &DynamicSystem::default().forces, &stored, &stage, &mut rate);
        assert_eq!(rate.as_slice(), &[1.5, -2.0, 0.5, 5.0, 1.0]);
    }

    #[test]
    fn internal_forces_obey_the_third_law() {
        let (a, b) = (free(1.0, 0.0), free(-1.0, 0.0));
        let members = [Member { particle: &a, mass: 1.0 }, Member { particle: &b, mass: 3.0 }];
        // attraction of 6 along the line between them
        let system = DynamicSystem::new(Expr::constant(-6.0), Expr::constant(0.5));
        let state = DVector::from_vec(vec![1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0]);
        let mut rate = DVector::zeros(9);
        system.rate(&members, &state, &mut rate);
        assert_abs_diff_eq!(rate[1], -6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rate[5], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(1.0 * rate[1] + 3.0 * rate[5], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(1.0 * rate[3] + 3.0 * rate[7], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rate[3], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn committed_frames_cache_the_relative_state() {
        let (a, b) = (free(2.0, 1.0), free(0.0, 0.0));
        let members = [Member { particle: &a, mass: 1.0 }, Member { particle: &b, mass: 1.0 }];
        let mut system = DynamicSystem::default();
        system.members = vec![0, 1];
        system.reset_state(&members, 0.0);
        system.save_state(4);
        let rel = system.relative_state(4).unwrap();
        assert_abs_diff_eq!(rel.r, 2.0, epsilon = 1e-15);
        assert_abs_diff_eq!(rel.omega, 0.5, epsilon = 1e-15);
        assert!(system.relative_state(5).is_none());
        let mut out = Vec::new();
        system.positions(&members, &mut out);
        assert_eq!(out.len(), 3);
        assert_eq!(out[2], Point2::new(1.0, 0.0));
    }
}
