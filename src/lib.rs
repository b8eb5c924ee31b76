//! Model-driven particle tracks stepped across a video timeline.
//!
//! A [`Document`] holds a [`VideoClip`], a coordinate system and tracks. Model
//! tracks synthesize their positions: analytic models from `x(t), y(t)`,
//! dynamic particles and two-body systems by RK4 integration of user force
//! laws. Moving to a frame with [`Document::set_frame`] steps every visible
//! model up to it.

pub mod config;
pub mod coords;
pub mod document;
pub mod engine;
pub mod error;
pub mod export;
pub mod force;
pub mod integrator;
pub mod models;
pub mod persist;
pub mod polar;
mod stepper;
pub mod steps;
pub mod timeline;
pub mod trace;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use config::StepperConfig;
pub use coords::{CoordFrame, CoordSystem, ImageCoords, ImageTransform, ReferenceFrame};
pub use document::{
    ChangeKind, Document, ModelEvent, Notice, PaintHold, PaintMonitor, StepPhase, Track,
    TrackChange, TrackId,
};
pub use error::{ModelError, Result};
pub use export::DataRow;
pub use force::{Expr, ForceLaw, UserFunction};
pub use models::{
    AnalyticParticle, DynamicParticle, DynamicSystem, ForceFrame, InitialValues, ModelKind,
    ParticleModel,
};
pub use persist::{DocumentRecord, TrackKindRecord, TrackRecord};
pub use polar::RelativePolar;
pub use timeline::{Timeline, VideoClip};
pub use trace::TraceBuffer;
