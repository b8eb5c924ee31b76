//! Fixed-step classical RK4 over a dynamically sized state.

use nalgebra::DVector;

/// RK4 stepper with preallocated stage buffers, so stepping does not allocate.
#[derive(Debug, Clone)]
pub struct Rk4 {
    dt: f64,
    k1: DVector<f64>,
    k2: DVector<f64>,
    k3: DVector<f64>,
    k4: DVector<f64>,
    tmp: DVector<f64>,
}

impl Rk4 {
    pub fn new(dimension: usize, dt: f64) -> Self {
        let zero = || DVector::zeros(dimension);
        Self { dt, k1: zero(), k2: zero(), k3: zero(), k4: zero(), tmp: zero() }
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Sets the step size and resizes the buffers to `dimension`.
    pub fn initialize(&mut self, dimension: usize, dt: f64) {
        self.dt = dt;
        if self.k1.len() != dimension {
            *self = Rk4::new(dimension, dt);
        }
    }

    /// One step. `rate(state, out)` writes the time derivative of `state` into `out`.
    pub fn step<F>(&mut self, state: &mut DVector<f64>, mut rate: F)
    where
        F: FnMut(&DVector<f64>, &mut DVector<f64>),
    {
        let dt = self.dt;
        if self.k1.len() != state.len() {
            self.initialize(state.len(), dt);
        }

        // k1
        rate(&*state, &mut self.k1);

        // k2
        self.tmp.copy_from(state);
        self.tmp.axpy(0.5 * dt, &self.k1, 1.0);
        rate(&self.tmp, &mut self.k2);

        // k3
        self.tmp.copy_from(state);
        self.tmp.axpy(0.5 * dt, &self.k2, 1.0);
        rate(&self.tmp, &mut self.k3);

        // k4
        self.tmp.copy_from(state);
        self.tmp.axpy(dt, &self.k3, 1.0);
        rate(&self.tmp, &mut self.k4);

        for i in 0..state.len() {
            state[i] += dt * (self.k1[i] + 2.0 * self.k2[i] + 2.0 * self.k3[i] + self.k4[i]) / 6.0;
        }
    }
}
