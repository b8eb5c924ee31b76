//! The document: a video clip, its coordinate system and the tracks on it.
//!
//! All stepping runs synchronously on the caller's thread. A model is checked
//! out of its track for the duration of a refresh, so the loop can read the
//! rest of the document while it owns the model; a refresh requested for a
//! model that is already stepping is ignored.

use std::cell::Cell;
use std::rc::Rc;

use log::{debug, info};
use nalgebra::{Point2, Vector2};

use crate::config::StepperConfig;
use crate::coords::{CoordSystem, ImageCoords, ImageTransform, ReferenceFrame};
use crate::error::{ModelError, Result};
use crate::force::{Expr, UserFunction};
use crate::models::{InitialValues, ModelKind, ParticleModel, system::MAX_PARTICLES};
use crate::steps::StepArray;
use crate::timeline::{Timeline, VideoClip};
use crate::trace::TraceBuffer;

/// Index of a track in its document. Tracks are never removed.
pub type TrackId = usize;

pub const DEFAULT_MASS: f64 = 1.0;

/// Whether a track's model is inside a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepPhase {
    #[default]
    Idle,
    Stepping,
}

/// Edits that invalidate a model's steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelEvent {
    /// A force or position function was edited.
    FunctionChanged,
    StartTimeChanged,
    FrameDurationChanged,
    StartFrameChanged,
    StepSizeChanged,
    /// A live edit started (`true`) or ended (`false`).
    Adjusting(bool),
}

/// Warnings raised while stepping, drained by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// A model produced positions outside the drawable envelope.
    OffScreen { track: TrackId, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// One new step at the given (displayed) frame.
    Step(usize),
    /// Any other change to a track's steps.
    Steps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackChange {
    pub track: TrackId,
    pub kind: ChangeKind,
}

/// Counts repaint requests; requests made while painting is held collapse
/// into one repaint when the last hold is released.
#[derive(Debug, Default)]
pub struct PaintMonitor {
    holds: Cell<usize>,
    pending: Cell<bool>,
    repaints: Cell<usize>,
}

impl PaintMonitor {
    pub fn request(&self) {
        if self.holds.get() > 0 {
            self.pending.set(true);
        } else {
            self.repaints.set(self.repaints.get() + 1);
        }
    }

    pub fn is_held(&self) -> bool {
        self.holds.get() > 0
    }

    pub fn repaint_count(&self) -> usize {
        self.repaints.get()
    }
}

/// Scoped hold on painting, released when dropped.
#[derive(Debug)]
pub struct PaintHold {
    monitor: Rc<PaintMonitor>,
}

impl PaintHold {
    pub fn new(monitor: &Rc<PaintMonitor>) -> Self {
        monitor.holds.set(monitor.holds.get() + 1);
        Self { monitor: Rc::clone(monitor) }
    }
}

impl Drop for PaintHold {
    fn drop(&mut self) {
        let m = &self.monitor;
        m.holds.set(m.holds.get().saturating_sub(1));
        if m.holds.get() == 0 && m.pending.replace(false) {
            m.repaints.set(m.repaints.get() + 1);
        }
    }
}

#[derive(Debug, Clone)]
pub struct Track {
    name: String,
    pub(crate) mass: f64,
    pub(crate) visible: bool,
    pub(crate) steps: StepArray,
    pub(crate) trace: TraceBuffer,
    pub(crate) phase: StepPhase,
    pub(crate) model: Option<ParticleModel>,
    is_model: bool,
}

impl Track {
    fn new(name: impl Into<String>, model: Option<ParticleModel>) -> Self {
        Self {
            name: name.into(),
            mass: DEFAULT_MASS,
            visible: true,
            steps: StepArray::new(),
            trace: TraceBuffer::new(),
            phase: StepPhase::Idle,
            is_model: model.is_some(),
            model,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// True for model tracks, false for point masses marked by hand.
    pub fn is_model(&self) -> bool {
        self.is_model
    }

    pub fn steps(&self) -> &StepArray {
        &self.steps
    }

    pub fn trace(&self) -> &TraceBuffer {
        &self.trace
    }

    pub fn phase(&self) -> StepPhase {
        self.phase
    }

    /// `None` for point masses and for a model that is currently stepping.
    pub fn model(&self) -> Option<&ParticleModel> {
        self.model.as_ref()
    }
}

pub struct Document {
    pub(crate) clip: VideoClip,
    pub(crate) coords: CoordSystem,
    pub(crate) config: StepperConfig,
    pub(crate) tracks: Vec<Track>,
    pub(crate) frame: usize,
    pub(crate) playing: bool,
    pub(crate) notices: Vec<Notice>,
    pub(crate) changes: Vec<TrackChange>,
    pub(crate) paint: Rc<PaintMonitor>,
}

impl Document {
    pub fn new(clip: VideoClip) -> Self {
        Self::with_config(clip, StepperConfig::default())
    }

    pub fn with_config(clip: VideoClip, config: StepperConfig) -> Self {
        let frame = clip.first_frame();
        Self {
            clip,
            coords: CoordSystem::default(),
            config,
            tracks: Vec::new(),
            frame,
            playing: false,
            notices: Vec::new(),
            changes: Vec::new(),
            paint: Rc::new(PaintMonitor::default()),
        }
    }

    pub fn clip(&self) -> &VideoClip {
        &self.clip
    }

    pub fn coords(&self) -> &CoordSystem {
        &self.coords
    }

    pub fn config(&self) -> &StepperConfig {
        &self.config
    }

    /// Replaces the stepper configuration and re-steps every model.
    pub fn set_config(&mut self, config: StepperConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.invalidate_all(ModelEvent::FunctionChanged);
        Ok(())
    }

    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn paint_monitor(&self) -> &PaintMonitor {
        &self.paint
    }

    pub(crate) fn hold_painting(&self) -> PaintHold {
        PaintHold::new(&self.paint)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(id)
    }

    pub(crate) fn track_checked(&self, id: TrackId) -> Result<&Track> {
        self.tracks.get(id).ok_or(ModelError::UnknownTrack(id))
    }

    pub fn track_id(&self, name: &str) -> Option<TrackId> {
        self.tracks.iter().position(|t| t.name == name)
    }

    pub fn model(&self, id: TrackId) -> Option<&ParticleModel> {
        self.tracks.get(id)?.model.as_ref()
    }

    pub(crate) fn model_mut(&mut self, id: TrackId) -> Option<&mut ParticleModel> {
        self.tracks.get_mut(id)?.model.as_mut()
    }

    pub(crate) fn model_checked(&self, id: TrackId) -> Result<&ParticleModel> {
        let track = self.track_checked(id)?;
        track.model.as_ref().ok_or_else(|| ModelError::NotAModel(track.name.clone()))
    }

    pub(crate) fn model_checked_mut(&mut self, id: TrackId) -> Result<&mut ParticleModel> {
        let track = self.tracks.get_mut(id).ok_or(ModelError::UnknownTrack(id))?;
        match track.model.as_mut() {
            Some(model) => Ok(model),
            None => Err(ModelError::NotAModel(track.name.clone())),
        }
    }

    pub(crate) fn name_of(&self, id: TrackId) -> String {
        self.tracks.get(id).map(|t| t.name.clone()).unwrap_or_default()
    }

    /// Mass of a track; a system weighs as much as its particles together.
    pub fn mass(&self, id: TrackId) -> f64 {
        let Some(track) = self.tracks.get(id) else {
            return f64::NAN;
        };
        match track.model.as_ref().and_then(ParticleModel::as_system) {
            Some(system) => system.members.iter().map(|&m| self.mass(m)).sum(),
            None => track.mass,
        }
    }

    /// Sets the mass of a point mass or a particle and re-steps what it drives.
    pub fn set_mass(&mut self, id: TrackId, mass: f64) -> Result<()> {
        if !(mass > 0.0 && mass.is_finite()) {
            return Err(ModelError::InvalidMass(mass));
        }
        let track = self.track_checked(id)?;
        if track.model.as_ref().is_some_and(|m| m.as_system().is_some()) {
            return Err(ModelError::DerivedMass(track.name.clone()));
        }
        if track.mass == mass {
            return Ok(());
        }
        self.tracks[id].mass = mass;
        if self.tracks[id].is_model {
            self.notify(id, ModelEvent::FunctionChanged)?;
        }
        Ok(())
    }

    pub fn set_visible(&mut self, id: TrackId, visible: bool) -> Result<()> {
        self.track_checked(id)?;
        self.tracks[id].visible = visible;
        if visible && self.tracks[id].is_model {
            self.refresh(id);
        }
        Ok(())
    }

    fn push_track(&mut self, track: Track) -> TrackId {
        self.tracks.push(track);
        self.tracks.len() - 1
    }

    /// Adds a track without stepping it.
    pub(crate) fn insert_track(&mut self, name: impl Into<String>, model: Option<ParticleModel>) -> TrackId {
        self.push_track(Track::new(name, model))
    }

    /// Adds a hand-marked point mass.
    pub fn add_point_mass(&mut self, name: impl Into<String>) -> TrackId {
        self.insert_track(name, None)
    }

    /// Marks a point mass at `frame` in image coordinates.
    pub fn mark_step(&mut self, id: TrackId, frame: usize, image: Point2<f64>) -> Result<()> {
        let track = self.track_checked(id)?;
        if track.is_model || track.phase == StepPhase::Stepping {
            return Err(ModelError::Locked(track.name.clone()));
        }
        let last = self.clip.frame_count.saturating_sub(1);
        if frame > last {
            return Err(ModelError::FrameOutOfRange { frame, last });
        }
        let ss = self.clip.step_size();
        let duration = self.clip.mean_step_duration();
        let window_start = frame.saturating_sub(2 * ss).max(self.clip.first_frame());
        let coords = &self.coords;
        let track = &mut self.tracks[id];
        track.steps.set_position(frame, image);
        track.steps.update_derivatives(
            window_start,
            5,
            ss,
            duration,
            |n, p| coords.to_world(n, p),
        );
        self.changes.push(TrackChange { track: id, kind: ChangeKind::Step(frame) });
        if self.coords.origin_track() == Some(id) {
            self.refresh_origins(id);
            self.transform_changed();
        }
        self.paint.request();
        Ok(())
    }

    /// Adds a model track and steps it up to the current frame.
    pub fn add_model(&mut self, name: impl Into<String>, mut model: ParticleModel) -> TrackId {
        let first = self.clip.first_frame();
        let last = self.clip.last_frame();
        model.start_frame = model.start_frame.clamp(first, last);
        model.invalidate();
        let id = self.insert_track(name, Some(model));
        debug!("added model '{}' ({})", self.name_of(id), self.describe(id));
        self.refresh(id);
        id
    }

    /// Adds a default model of a catalog kind, see [`crate::engine::model_catalog`].
    pub fn add_model_by_id(&mut self, name: impl Into<String>, model_id: &str) -> Result<TrackId> {
        let model = crate::engine::build_model(model_id)?;
        Ok(self.add_model(name, model))
    }

    fn describe(&self, id: TrackId) -> &'static str {
        self.model(id).map(|m| m.kind().name()).unwrap_or("point mass")
    }

    /// Moves to `frame` and brings every visible model up to it.
    pub fn set_frame(&mut self, frame: usize) -> Result<()> {
        let last = self.clip.frame_count.saturating_sub(1);
        if frame > last {
            return Err(ModelError::FrameOutOfRange { frame, last });
        }
        self.frame = frame;
        self.refresh_visible();
        Ok(())
    }

    pub(crate) fn refresh_visible(&mut self) {
        let _hold = self.hold_painting();
        for id in 0..self.tracks.len() {
            if self.tracks[id].visible && self.tracks[id].is_model {
                self.refresh(id);
            }
        }
        self.paint.request();
    }

    /// Starts or stops live playback. Stopping brings deferred derivatives up to date.
    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
        if !playing {
            for id in 0..self.tracks.len() {
                self.refresh_derivs_if_needed(id);
            }
        }
    }

    /// Replaces the base coordinates, keeping any reference frame.
    pub fn set_coords(&mut self, coords: ImageCoords) {
        *self.coords.base_mut() = coords;
        self.transform_changed();
    }

    /// Makes the track `origin` the moving origin of the coordinate system.
    pub fn set_reference_frame(&mut self, origin: TrackId) -> Result<()> {
        self.track_checked(origin)?;
        info!("reference frame origin set to '{}'", self.name_of(origin));
        self.coords.set_reference(Some(ReferenceFrame::new(origin)));
        self.refresh_origins(origin);
        self.transform_changed();
        Ok(())
    }

    pub fn clear_reference_frame(&mut self) {
        if self.coords.reference().is_some() {
            self.coords.set_reference(None);
            self.transform_changed();
        }
    }

    /// Copies the image positions of `origin` into the reference frame.
    pub(crate) fn refresh_origins(&mut self, origin: TrackId) {
        let Some(track) = self.tracks.get(origin) else {
            return;
        };
        let origins: Vec<_> = (0..track.steps.len()).map(|n| track.steps.position(n)).collect();
        if let Some(reference) = self.coords.reference_mut() {
            if reference.origin_track() == origin {
                reference.set_origins(origins);
            }
        }
    }

    /// The origin track of the reference frame plus, when it is a system,
    /// the system's particles.
    pub fn origin_chain(&self) -> Vec<TrackId> {
        let Some(origin) = self.coords.origin_track() else {
            return Vec::new();
        };
        let mut chain = vec![origin];
        if let Some(system) = self.model(origin).and_then(ParticleModel::as_system) {
            chain.extend_from_slice(&system.members);
        }
        chain
    }

    /// Notifies every model that the coordinate transform changed.
    ///
    /// A model whose own tracks are in the origin chain ignores the event:
    /// the origin update is rewriting exactly those positions.
    pub fn transform_changed(&mut self) {
        let chain = self.origin_chain();
        let _hold = self.hold_painting();
        for id in 0..self.tracks.len() {
            let Some(model) = self.tracks[id].model.as_mut() else {
                continue;
            };
            if model.system_id().is_some() || model.models(id).iter().any(|m| chain.contains(m)) {
                continue;
            }
            model.invalidate();
            if self.tracks[id].visible {
                self.refresh(id);
            }
        }
        self.paint.request();
    }

    /// Changes the clip step size and re-steps every model.
    pub fn set_step_size(&mut self, step_size: usize) {
        self.clip.set_step_size(step_size);
        self.invalidate_all(ModelEvent::StepSizeChanged);
    }

    pub fn set_start_time(&mut self, seconds: f64) {
        self.clip.start_time = seconds;
        self.invalidate_all(ModelEvent::StartTimeChanged);
    }

    pub fn set_frame_duration(&mut self, seconds: f64) {
        self.clip.frame_duration = seconds;
        self.invalidate_all(ModelEvent::FrameDurationChanged);
    }

    /// Moves the first frame of the clip. Models starting before it follow.
    pub fn set_clip_start_frame(&mut self, frame: usize) {
        self.clip.set_start_frame(frame);
        let first = self.clip.first_frame();
        for model in self.tracks.iter_mut().filter_map(|t| t.model.as_mut()) {
            model.start_frame = model.start_frame.max(first);
        }
        self.frame = self.frame.max(first);
        self.invalidate_all(ModelEvent::StartFrameChanged);
    }

    fn invalidate_all(&mut self, event: ModelEvent) {
        for id in 0..self.tracks.len() {
            let standalone = self.model(id).is_some_and(|m| m.system_id().is_none());
            if standalone {
                let _ = self.notify(id, event);
            }
        }
    }

    /// Delivers an edit event to a model.
    pub fn notify(&mut self, id: TrackId, event: ModelEvent) -> Result<()> {
        let model = self.model_checked_mut(id)?;
        if let Some(system) = model.system_id() {
            // members are stepped by their system
            return self.notify(system, event);
        }
        match event {
            ModelEvent::Adjusting(adjusting) => {
                model.adjusting = adjusting;
                if !adjusting && self.tracks[id].visible {
                    self.refresh(id);
                }
            }
            _ => {
                model.invalidate();
                if self.tracks[id].visible {
                    self.refresh(id);
                }
            }
        }
        Ok(())
    }

    /// Replaces a model's two functions: `x, y` for analytic models, the
    /// force pair for particles and the interaction pair for systems.
    pub fn set_functions(&mut self, id: TrackId, f1: Expr, f2: Expr) -> Result<()> {
        let model = self.model_checked_mut(id)?;
        match model.kind_mut() {
            ModelKind::Analytic(a) => a.set_functions(UserFunction::new("x", f1), UserFunction::new("y", f2)),
            ModelKind::Particle(p) => {
                let [n1, n2] = p.forces().each_ref().map(|f| f.name().to_string());
                p.set_forces([UserFunction::new(n1, f1), UserFunction::new(n2, f2)]);
            }
            ModelKind::System(s) => {
                s.set_forces([UserFunction::new("fr", f1), UserFunction::new("ftheta", f2)]);
            }
        }
        self.notify(id, ModelEvent::FunctionChanged)
    }

    /// Replaces the initial values of a dynamic particle.
    pub fn set_initial_values(&mut self, id: TrackId, initial: InitialValues) -> Result<()> {
        let name = self.name_of(id);
        let particle = self
            .model_checked_mut(id)?
            .as_particle_mut()
            .ok_or(ModelError::NotADynamicParticle(name))?;
        particle.set_initial(initial);
        self.notify(id, ModelEvent::FunctionChanged)
    }

    /// Sets the "use default reference frame" flag of a model.
    pub fn set_use_default_reference_frame(&mut self, id: TrackId, use_default: bool) -> Result<()> {
        let model = self.model_checked_mut(id)?;
        if model.use_default_reference_frame != use_default {
            model.use_default_reference_frame = use_default;
            self.notify(id, ModelEvent::FunctionChanged)?;
        }
        Ok(())
    }

    /// World position of a track at `frame` in the active coordinates.
    pub fn world_position(&self, id: TrackId, frame: usize) -> Option<Point2<f64>> {
        let p = self.tracks.get(id)?.steps.position(frame)?;
        Some(self.coords.to_world(frame, &p))
    }

    pub fn image_position(&self, id: TrackId, frame: usize) -> Option<Point2<f64>> {
        self.tracks.get(id)?.steps.position(frame)
    }

    /// World velocity at `frame`, in world units per second.
    pub fn velocity(&self, id: TrackId, frame: usize) -> Option<Vector2<f64>> {
        self.tracks.get(id)?.steps.velocity(frame)
    }

    pub fn acceleration(&self, id: TrackId, frame: usize) -> Option<Vector2<f64>> {
        self.tracks.get(id)?.steps.acceleration(frame)
    }

    /// `[x, vx, y, vy, t]` of a track at `frame`, world units.
    /// Components without data are `NaN`; `None` if there is no position.
    pub fn kinematics_at(&self, id: TrackId, frame: usize) -> Option<[f64; 5]> {
        let p = self.world_position(id, frame)?;
        let v = self.velocity(id, frame).unwrap_or(Vector2::new(f64::NAN, f64::NAN));
        Some([p.x, v.x, p.y, v.y, self.clip.frame_time(frame)])
    }

    pub fn trace(&self, id: TrackId) -> Option<&TraceBuffer> {
        self.tracks.get(id).map(|t| &t.trace)
    }

    /// Current solver state of a dynamic model.
    pub fn system_state(&self, id: TrackId) -> Option<Vec<f64>> {
        match self.model(id)?.kind() {
            ModelKind::Analytic(_) => None,
            ModelKind::Particle(p) => Some(p.state().as_slice().to_vec()),
            ModelKind::System(s) => Some(s.state().as_slice().to_vec()),
        }
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn take_changes(&mut self) -> Vec<TrackChange> {
        std::mem::take(&mut self.changes)
    }

    /// Copies the steps of a track into a new point mass.
    pub fn stamp(&mut self, id: TrackId) -> Result<TrackId> {
        let source = self.track_checked(id)?;
        let mut track = Track::new(format!("{} stamp", source.name), None);
        track.mass = self.mass(id);
        track.steps = source.steps.clone();
        let stamp = self.push_track(track);
        self.changes.push(TrackChange { track: stamp, kind: ChangeKind::Steps });
        Ok(stamp)
    }

    // system membership

    fn system_checked_mut(&mut self, id: TrackId) -> Result<&mut ParticleModel> {
        let name = self.name_of(id);
        let model = self.model_checked_mut(id)?;
        if model.as_system().is_none() {
            return Err(ModelError::NotASystem(name));
        }
        Ok(model)
    }

    fn check_dynamic(&self, id: TrackId) -> Result<()> {
        match self.model_checked(id)?.as_particle() {
            Some(_) => Ok(()),
            None => Err(ModelError::NotADynamicParticle(self.name_of(id))),
        }
    }

    /// True if `target` is the booster of `particle`, or of its booster, and so on.
    pub fn is_boosted_by(&self, particle: TrackId, target: TrackId) -> bool {
        let mut seen = Vec::new();
        let mut next = self.model(particle).and_then(|m| m.as_particle()?.booster());
        while let Some(booster) = next {
            if booster == target {
                return true;
            }
            if seen.contains(&booster) {
                break;
            }
            seen.push(booster);
            next = self.model(booster).and_then(|m| m.as_particle()?.booster());
        }
        false
    }

    /// Adds a dynamic particle to a system.
    pub fn add_particle(&mut self, system: TrackId, particle: TrackId) -> Result<()> {
        self.check_dynamic(particle)?;
        let members = {
            let model = self.system_checked_mut(system)?;
            model.as_system().map(|s| s.members.clone()).unwrap_or_default()
        };
        if members.contains(&particle) {
            return Ok(());
        }
        if members.len() >= MAX_PARTICLES {
            return Err(ModelError::SystemFull(self.name_of(system)));
        }
        if let Some(owner) = self.model(particle).and_then(ParticleModel::system_id) {
            return Err(ModelError::AlreadyMember {
                particle: self.name_of(particle),
                system: self.name_of(owner),
            });
        }
        if members.iter().any(|&m| self.is_boosted_by(m, particle) || self.is_boosted_by(particle, m)) {
            return Err(ModelError::BoostCycle(self.name_of(particle)));
        }
        let mut members = members;
        members.push(particle);
        self.apply_members(system, members)
    }

    /// Removes a particle from a system; it steps on its own again.
    pub fn remove_particle(&mut self, system: TrackId, particle: TrackId) -> Result<()> {
        let members = {
            let model = self.system_checked_mut(system)?;
            model.as_system().map(|s| s.members.clone()).unwrap_or_default()
        };
        if !members.contains(&particle) {
            return Ok(());
        }
        let members = members.into_iter().filter(|&m| m != particle).collect();
        self.apply_members(system, members)
    }

    /// Replaces the particles of a system.
    pub fn set_particles(&mut self, system: TrackId, particles: &[TrackId]) -> Result<()> {
        self.system_checked_mut(system)?;
        if particles.len() > MAX_PARTICLES {
            return Err(ModelError::SystemFull(self.name_of(system)));
        }
        for (i, &p) in particles.iter().enumerate() {
            self.check_dynamic(p)?;
            if particles[..i].contains(&p) {
                return Err(ModelError::AlreadyMember {
                    particle: self.name_of(p),
                    system: self.name_of(system),
                });
            }
            if let Some(owner) = self.model(p).and_then(ParticleModel::system_id) {
                if owner != system {
                    return Err(ModelError::AlreadyMember {
                        particle: self.name_of(p),
                        system: self.name_of(owner),
                    });
                }
            }
        }
        if let [a, b] = particles {
            if self.is_boosted_by(*a, *b) || self.is_boosted_by(*b, *a) {
                return Err(ModelError::BoostCycle(self.name_of(*a)));
            }
        }
        self.apply_members(system, particles.to_vec())
    }

    pub(crate) fn apply_members(&mut self, system: TrackId, members: Vec<TrackId>) -> Result<()> {
        let previous = self
            .model(system)
            .and_then(ParticleModel::as_system)
            .map(|s| s.members.clone())
            .unwrap_or_default();
        for &p in previous.iter().filter(|p| !members.contains(p)) {
            if let Some(particle) = self.model_mut(p).and_then(ParticleModel::as_particle_mut) {
                particle.system = None;
            }
            if let Some(model) = self.model_mut(p) {
                model.invalidate();
            }
            self.refresh(p);
        }
        for &p in &members {
            if let Some(particle) = self.model_mut(p).and_then(ParticleModel::as_particle_mut) {
                particle.system = Some(system);
            }
            if let Some(model) = self.model_mut(p) {
                model.invalidate();
            }
            let track = &mut self.tracks[p];
            track.steps.clear();
            track.trace.clear();
        }
        debug!("system '{}' particles: {:?}", self.name_of(system), members);
        let model = self.system_checked_mut(system)?;
        if let Some(s) = model.as_system_mut() {
            s.members = members;
            s.pending_names.clear();
        }
        model.invalidate();
        let track = &mut self.tracks[system];
        track.steps.clear();
        track.trace.clear();
        self.changes.push(TrackChange { track: system, kind: ChangeKind::Steps });
        self.refresh(system);
        Ok(())
    }

    /// Makes `booster` the source of a particle's initial conditions.
    pub fn set_booster(&mut self, particle: TrackId, booster: Option<TrackId>) -> Result<()> {
        self.check_dynamic(particle)?;
        if let Some(b) = booster {
            self.track_checked(b)?;
            if b == particle || self.is_boosted_by(b, particle) {
                return Err(ModelError::BoostCycle(self.name_of(particle)));
            }
            if let Some(system) = self.model(particle).and_then(ParticleModel::system_id) {
                let members = self.model(system).and_then(ParticleModel::as_system).map(|s| s.members.clone());
                if members.is_some_and(|m| m.contains(&b)) {
                    return Err(ModelError::BoostCycle(self.name_of(particle)));
                }
            }
        }
        if let Some(p) = self.model_mut(particle).and_then(ParticleModel::as_particle_mut) {
            p.booster = booster;
        }
        self.boost(particle);
        Ok(())
    }

    /// Copies the booster's position and velocity at the start frame into the
    /// particle's initial values and re-steps it.
    pub(crate) fn boost(&mut self, particle: TrackId) {
        let Some(model) = self.model(particle) else {
            return;
        };
        let start = match model.system_id() {
            Some(system) => self.model(system).map_or(model.start_frame, |s| s.start_frame),
            None => model.start_frame,
        };
        let Some(booster) = model.as_particle().and_then(|p| p.booster()) else {
            return;
        };
        let Some([x, vx, y, vy, _]) = self.kinematics_at(booster, start) else {
            return;
        };
        if let Some(p) = self.model_mut(particle).and_then(ParticleModel::as_particle_mut) {
            let init = p.initial_mut();
            for (slot, value) in [(&mut init.x, x), (&mut init.vx, vx), (&mut init.y, y), (&mut init.vy, vy)] {
                if !value.is_nan() {
                    *slot = value;
                }
            }
        }
        let _ = self.notify(particle, ModelEvent::FunctionChanged);
    }
}
