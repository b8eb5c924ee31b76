//! User-authored functions of a state vector.
//!
//! The stepper treats force and position laws as opaque: anything that maps a
//! slice of doubles to one double. Laws built from [`Expr`] can be saved with
//! the document; closures cannot.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Scalar function of a state vector.
pub trait ForceLaw {
    fn evaluate(&self, state: &[f64]) -> f64;
}

// Convenience: plain closures are force laws.
impl<F> ForceLaw for F
where
    F: Fn(&[f64]) -> f64,
{
    fn evaluate(&self, state: &[f64]) -> f64 {
        (self)(state)
    }
}

/// Serializable expression over the variables of a state vector.
///
/// Variables are addressed by index; an index past the end of the state
/// evaluates to `NaN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Expr {
    Constant { value: f64 },
    Var { index: usize },
    /// `constant + sum(coefficients[i] * state[i])`
    Linear {
        #[serde(default)]
        constant: f64,
        coefficients: Vec<f64>,
    },
    /// `sum(coefficients[k] * state[var]^k)`
    Polynomial { var: usize, coefficients: Vec<f64> },
    /// `coefficient * state[var]^power`
    Power { coefficient: f64, var: usize, power: f64 },
    /// `amplitude * sin(frequency * state[var] + phase)`
    Sine {
        amplitude: f64,
        frequency: f64,
        #[serde(default)]
        phase: f64,
        var: usize,
    },
    Sum { terms: Vec<Expr> },
    Product { factors: Vec<Expr> },
}

impl Expr {
    pub fn zero() -> Self {
        Expr::Constant { value: 0.0 }
    }

    pub fn constant(value: f64) -> Self {
        Expr::Constant { value }
    }

    pub fn var(index: usize) -> Self {
        Expr::Var { index }
    }

    /// Hooke's law on one variable about a rest value: `-k * (state[var] - rest)`.
    pub fn spring(k: f64, var: usize, rest: f64) -> Self {
        let mut coefficients = vec![0.0; var + 1];
        coefficients[var] = -k;
        Expr::Linear { constant: k * rest, coefficients }
    }

    /// Inverse-square attraction on one variable: `-k / state[var]^2`.
    pub fn inverse_square(k: f64, var: usize) -> Self {
        Expr::Power { coefficient: -k, var, power: -2.0 }
    }
}

fn var_of(state: &[f64], index: usize) -> f64 {
    state.get(index).copied().unwrap_or(f64::NAN)
}

impl ForceLaw for Expr {
    fn evaluate(&self, state: &[f64]) -> f64 {
        match self {
            Expr::Constant { value } => *value,
            Expr::Var { index } => var_of(state, *index),
            Expr::Linear { constant, coefficients } => coefficients
                .iter()
                .enumerate()
                .filter(|(_, c)| **c != 0.0)
                .fold(*constant, |acc, (i, c)| acc + c * var_of(state, i)),
            Expr::Polynomial { var, coefficients } => {
                let x = var_of(state, *var);
                coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
            }
            Expr::Power { coefficient, var, power } => coefficient * var_of(state, *var).powf(*power),
            Expr::Sine { amplitude, frequency, phase, var } => {
                amplitude * (frequency * var_of(state, *var) + phase).sin()
            }
            Expr::Sum { terms } => terms.iter().map(|t| t.evaluate(state)).sum(),
            Expr::Product { factors } => factors.iter().map(|f| f.evaluate(state)).product(),
        }
    }
}

#[derive(Clone)]
pub enum FunctionBody {
    Expr(Expr),
    Native(Rc<dyn ForceLaw>),
}

/// A named function as edited by the user.
#[derive(Clone)]
pub struct UserFunction {
    name: String,
    body: FunctionBody,
}

impl UserFunction {
    pub fn new(name: impl Into<String>, expr: Expr) -> Self {
        Self { name: name.into(), body: FunctionBody::Expr(expr) }
    }

    pub fn native<F>(name: impl Into<String>, law: F) -> Self
    where
        F: ForceLaw + 'static,
    {
        Self { name: name.into(), body: FunctionBody::Native(Rc::new(law)) }
    }

    pub fn zero(name: impl Into<String>) -> Self {
        Self::new(name, Expr::zero())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &FunctionBody {
        &self.body
    }

    pub fn evaluate(&self, state: &[f64]) -> f64 {
        match &self.body {
            FunctionBody::Expr(expr) => expr.evaluate(state),
            FunctionBody::Native(law) => law.evaluate(state),
        }
    }

    /// The saveable form of this function.
    pub fn to_expr(&self) -> Result<Expr> {
        match &self.body {
            FunctionBody::Expr(expr) => Ok(expr.clone()),
            FunctionBody::Native(_) => Err(ModelError::UnsavableFunction(self.name.clone())),
        }
    }
}

impl fmt::Debug for UserFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            FunctionBody::Expr(expr) => write!(f, "{} = {:?}", self.name, expr),
            FunctionBody::Native(_) => write!(f, "{} = <native>", self.name),
        }
    }
}
