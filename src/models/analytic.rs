use nalgebra::Point2;

use crate::force::{Expr, UserFunction};

/// Particle whose position is a closed-form function of time.
#[derive(Debug, Clone)]
pub struct AnalyticParticle {
    x: UserFunction,
    y: UserFunction,
}

impl AnalyticParticle {
    pub fn new(x: UserFunction, y: UserFunction) -> Self {
        Self { x, y }
    }

    /// `x(t)` and `y(t)` as expressions of variable 0.
    pub fn from_exprs(x: Expr, y: Expr) -> Self {
        Self::new(UserFunction::new("x", x), UserFunction::new("y", y))
    }

    pub fn functions(&self) -> [&UserFunction; 2] {
        [&self.x, &self.y]
    }

    pub fn set_functions(&mut self, x: UserFunction, y: UserFunction) {
        self.x = x;
        self.y = y;
    }

    pub fn position(&self, t: f64) -> Point2<f64> {
        let vars = [t];
        Point2::new(self.x.evaluate(&vars), self.y.evaluate(&vars))
    }
}

impl Default for AnalyticParticle {
    fn default() -> Self {
        Self::from_exprs(Expr::zero(), Expr::zero())
    }
}
