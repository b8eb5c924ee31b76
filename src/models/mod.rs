//! Stepped particle models.
//!
//! A [`ParticleModel`] carries what every model shares (frame range,
//! watermark, key frames) and a [`ModelKind`] with the per-kind behaviour the
//! stepper dispatches on: state size, how the state advances between two
//! sub-steps, which tracks receive positions.

pub mod analytic;
pub mod dynamic;
pub mod system;

use std::collections::BTreeSet;

use nalgebra::Point2;

use crate::document::{Document, TrackId};
use crate::force::Expr;

pub use analytic::AnalyticParticle;
pub use dynamic::{DynamicParticle, ForceFrame, InitialValues};
pub use system::{DynamicSystem, Member};

#[derive(Debug, Clone)]
pub enum ModelKind {
    Analytic(AnalyticParticle),
    Particle(DynamicParticle),
    System(DynamicSystem),
}

impl ModelKind {
    /// Short kind name used in logs and saved documents.
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Analytic(_) => "analytic",
            ModelKind::Particle(p) => match p.force_frame() {
                ForceFrame::Cartesian => "dynamic",
                ForceFrame::Polar => "dynamic-polar",
            },
            ModelKind::System(_) => "system",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParticleModel {
    pub(crate) kind: ModelKind,
    pub(crate) start_frame: usize,
    /// `None` when the model runs to the end of the clip.
    pub(crate) end_frame: Option<usize>,
    pub(crate) watermark: Option<usize>,
    pub(crate) key_frames: BTreeSet<usize>,
    pub(crate) t0: f64,
    pub(crate) invalid_warning_shown: bool,
    pub(crate) derivs_deferred: bool,
    pub(crate) adjusting: bool,
    pub(crate) use_default_reference_frame: bool,
}

impl ParticleModel {
    pub fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            start_frame: 0,
            end_frame: None,
            watermark: None,
            key_frames: BTreeSet::new(),
            t0: 0.0,
            invalid_warning_shown: false,
            derivs_deferred: false,
            adjusting: false,
            use_default_reference_frame: false,
        }
    }

    pub fn analytic(x: Expr, y: Expr) -> Self {
        Self::new(ModelKind::Analytic(AnalyticParticle::from_exprs(x, y)))
    }

    pub fn dynamic(fx: Expr, fy: Expr, initial: InitialValues) -> Self {
        Self::new(ModelKind::Particle(DynamicParticle::cartesian(fx, fy, initial)))
    }

    pub fn dynamic_polar(fr: Expr, ftheta: Expr, initial: InitialValues) -> Self {
        Self::new(ModelKind::Particle(DynamicParticle::polar(fr, ftheta, initial)))
    }

    /// Empty two-body system with internal forces `fr, ftheta`.
    pub fn system(fr: Expr, ftheta: Expr) -> Self {
        Self::new(ModelKind::System(DynamicSystem::new(fr, ftheta)))
    }

    pub fn with_start_frame(mut self, frame: usize) -> Self {
        self.start_frame = frame;
        self
    }

    pub fn with_end_frame(mut self, frame: Option<usize>) -> Self {
        self.end_frame = frame;
        self
    }

    pub fn with_default_reference_frame(mut self, use_default: bool) -> Self {
        self.use_default_reference_frame = use_default;
        self
    }

    pub fn kind(&self) -> &ModelKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut ModelKind {
        &mut self.kind
    }

    pub fn start_frame(&self) -> usize {
        self.start_frame
    }

    pub fn end_frame(&self) -> Option<usize> {
        self.end_frame
    }

    /// Highest frame whose steps are computed, `None` before the first reset.
    pub fn watermark(&self) -> Option<usize> {
        self.watermark
    }

    pub fn key_frames(&self) -> &BTreeSet<usize> {
        &self.key_frames
    }

    /// Time at the start frame, in seconds.
    pub fn t0(&self) -> f64 {
        self.t0
    }

    pub fn is_adjusting(&self) -> bool {
        self.adjusting
    }

    pub fn use_default_reference_frame(&self) -> bool {
        self.use_default_reference_frame
    }

    pub fn as_particle(&self) -> Option<&DynamicParticle> {
        match &self.kind {
            ModelKind::Particle(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_particle_mut(&mut self) -> Option<&mut DynamicParticle> {
        match &mut self.kind {
            ModelKind::Particle(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_system(&self) -> Option<&DynamicSystem> {
        match &self.kind {
            ModelKind::System(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_system_mut(&mut self) -> Option<&mut DynamicSystem> {
        match &mut self.kind {
            ModelKind::System(s) => Some(s),
            _ => None,
        }
    }

    /// System this model is stepped by, if it is a member particle.
    pub fn system_id(&self) -> Option<TrackId> {
        self.as_particle().and_then(DynamicParticle::system)
    }

    /// Tracks that receive positions when this model steps, in trace order.
    /// A system lists its members then itself (the centre of mass).
    pub fn models(&self, id: TrackId) -> Vec<TrackId> {
        match &self.kind {
            ModelKind::System(s) => s.members.iter().copied().chain(Some(id)).collect(),
            _ => vec![id],
        }
    }

    pub fn state_len(&self) -> usize {
        match &self.kind {
            ModelKind::Analytic(_) => 1,
            ModelKind::Particle(_) => dynamic::PARTICLE_STATE_LEN,
            ModelKind::System(s) => s.state_len(),
        }
    }

    pub(crate) fn is_empty_system(&self) -> bool {
        self.as_system().is_some_and(DynamicSystem::is_empty)
    }

    pub(crate) fn invalidate(&mut self) {
        self.watermark = None;
        self.key_frames.clear();
    }

    // stepping hooks, driven by the stepper in `crate::stepper`

    pub(crate) fn reset_state(&mut self, doc: &Document, t0: f64) {
        self.t0 = t0;
        match &mut self.kind {
            ModelKind::Analytic(_) => {}
            ModelKind::Particle(p) => p.reset_state(t0),
            ModelKind::System(s) => {
                let members = resolve_members(doc, &s.members);
                s.reset_state(&members, t0);
            }
        }
    }

    pub(crate) fn initialize_solver(&mut self, dt: f64) {
        match &mut self.kind {
            ModelKind::Analytic(_) => {}
            ModelKind::Particle(p) => p.initialize_solver(dt),
            ModelKind::System(s) => s.initialize_solver(dt),
        }
    }

    /// Runs `iterations` solver steps. Analytic models hold no state.
    pub(crate) fn advance(&mut self, doc: &Document, id: TrackId, iterations: usize) {
        match &mut self.kind {
            ModelKind::Analytic(_) => {}
            ModelKind::Particle(p) => p.advance(doc.mass(id), iterations),
            ModelKind::System(s) => {
                let members = resolve_members(doc, &s.members);
                s.advance(&members, iterations);
            }
        }
    }

    /// World positions at `time` for each track in [`Self::models`].
    pub(crate) fn trace_positions(&self, doc: &Document, time: f64, out: &mut Vec<Point2<f64>>) {
        match &self.kind {
            ModelKind::Analytic(a) => out.push(a.position(time)),
            ModelKind::Particle(p) => {
                let s = p.state();
                out.push(Point2::new(s[0], s[2]));
            }
            ModelKind::System(s) => {
                let members = resolve_members(doc, &s.members);
                s.positions(&members, out);
            }
        }
    }

    pub(crate) fn save_state(&mut self, frame: usize) {
        match &mut self.kind {
            ModelKind::Analytic(_) => {}
            ModelKind::Particle(p) => p.save_state(frame),
            ModelKind::System(s) => s.save_state(frame),
        }
    }

    /// Returns false when the model has state but none was saved at `frame`.
    pub(crate) fn restore_state(&mut self, frame: usize) -> bool {
        match &mut self.kind {
            ModelKind::Analytic(_) => true,
            ModelKind::Particle(p) => p.restore_state(frame),
            ModelKind::System(s) => s.restore_state(frame),
        }
    }
}

/// Looks up the member particles of a system in the document.
pub(crate) fn resolve_members<'a>(doc: &'a Document, ids: &[TrackId]) -> Vec<Member<'a>> {
    ids.iter()
        .filter_map(|&id| {
            let particle = doc.track(id)?.model()?.as_particle()?;
            Some(Member { particle, mass: doc.mass(id) })
        })
        .collect()
}
