use crate::error::{ModelError, Result};
use crate::force::Expr;
use crate::models::{InitialValues, ParticleModel};

pub const MODEL_ANALYTIC: &str = "analytic";
pub const MODEL_DYNAMIC: &str = "dynamic";
pub const MODEL_DYNAMIC_POLAR: &str = "dynamic-polar";
pub const MODEL_TWO_BODY: &str = "two-body-system";

pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub fn model_catalog() -> &'static [ModelInfo] {
    &[
        ModelInfo {
            id: MODEL_ANALYTIC,
            name: "Analytic particle",
            description: "Position given directly as x(t), y(t).",
        },
        ModelInfo {
            id: MODEL_DYNAMIC,
            name: "Dynamic particle (cartesian)",
            description: "Forces fx, fy of [x, vx, y, vy, t], integrated with RK4.",
        },
        ModelInfo {
            id: MODEL_DYNAMIC_POLAR,
            name: "Dynamic particle (polar)",
            description: "Forces fr, ftheta of [r, vr, theta, omega, t] about the origin.",
        },
        ModelInfo {
            id: MODEL_TWO_BODY,
            name: "Two-body system",
            description: "Two dynamic particles with an internal interaction fr, ftheta.",
        },
    ]
}

pub fn normalize_model_id(id: &str) -> Option<&'static str> {
    match id {
        MODEL_ANALYTIC | "analytic-particle" => Some(MODEL_ANALYTIC),
        MODEL_DYNAMIC | "cartesian" | "dynamic-particle" => Some(MODEL_DYNAMIC),
        MODEL_DYNAMIC_POLAR | "polar" => Some(MODEL_DYNAMIC_POLAR),
        MODEL_TWO_BODY | "system" | "two-body" | "dynamic-system" => Some(MODEL_TWO_BODY),
        _ => None,
    }
}

/// Builds a model of a catalog kind with zero functions and initial values.
pub fn build_model(model_id: &str) -> Result<ParticleModel> {
    let id = normalize_model_id(model_id)
        .ok_or_else(|| ModelError::UnknownModelKind(model_id.to_string()))?;
    let model = match id {
        MODEL_ANALYTIC => ParticleModel::analytic(Expr::zero(), Expr::zero()),
        MODEL_DYNAMIC => ParticleModel::dynamic(Expr::zero(), Expr::zero(), InitialValues::default()),
        MODEL_DYNAMIC_POLAR => {
            ParticleModel::dynamic_polar(Expr::zero(), Expr::zero(), InitialValues::default())
        }
        _ => ParticleModel::system(Expr::zero(), Expr::zero()),
    };
    Ok(model)
}
