//! Saving and loading documents as YAML.
//!
//! Only what cannot be recomputed is saved: the clip, the coordinates, each
//! track's mass, frame range and functions, and for systems the ordered
//! particle names. Steps and traces of models are re-stepped after a load.
//!
//! ```yaml
//! clip: { frame_count: 30, start_frame: 0, step_size: 1, step_count: 30, frame_duration: 0.1 }
//! tracks:
//!   - name: ball
//!     mass: 2.0
//!     model:
//!       kind: dynamic
//!       fx: { kind: constant, value: 0.0 }
//!       fy: { kind: constant, value: -9.8 }
//!       initial: { vx: 1.0 }
//! ```

use std::fs;
use std::path::Path;

use log::{info, warn};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::config::StepperConfig;
use crate::coords::{CoordSystem, ImageCoords, ImageTransform, ReferenceFrame};
use crate::document::{DEFAULT_MASS, Document, TrackId};
use crate::error::{ModelError, Result};
use crate::force::Expr;
use crate::models::{ForceFrame, InitialValues, ModelKind, ParticleModel, system::MAX_PARTICLES};
use crate::timeline::{Timeline, VideoClip};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub clip: VideoClip,
    #[serde(default)]
    pub coords: ImageCoords,
    /// Name of the track whose position is the moving origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_origin: Option<String>,
    #[serde(default)]
    pub frame: usize,
    #[serde(default)]
    pub config: StepperConfig,
    #[serde(default)]
    pub tracks: Vec<TrackRecord>,
}

fn default_mass() -> f64 {
    DEFAULT_MASS
}

fn is_default_mass(mass: &f64) -> bool {
    *mass == DEFAULT_MASS
}

fn default_visible() -> bool {
    true
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub name: String,
    #[serde(default = "default_mass", skip_serializing_if = "is_default_mass")]
    pub mass: f64,
    /// Saved only when past frame 0; a missing value means the clip's first frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_frame: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_frame: Option<usize>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub use_default_reference_frame: bool,
    pub model: TrackKindRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub frame: usize,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TrackKindRecord {
    /// Hand-marked positions, image coordinates.
    PointMass {
        #[serde(default)]
        steps: Vec<StepRecord>,
    },
    Analytic {
        x: Expr,
        y: Expr,
    },
    Dynamic {
        fx: Expr,
        fy: Expr,
        #[serde(default)]
        initial: InitialValues,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        booster: Option<String>,
    },
    DynamicPolar {
        fr: Expr,
        ftheta: Expr,
        #[serde(default)]
        initial: InitialValues,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        booster: Option<String>,
    },
    System {
        #[serde(default)]
        particles: Vec<String>,
        fr: Expr,
        ftheta: Expr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        inspector: Option<(i32, i32)>,
    },
}

impl Document {
    pub fn to_record(&self) -> Result<DocumentRecord> {
        let tracks = (0..self.tracks.len()).map(|id| self.track_record(id)).collect::<Result<_>>()?;
        Ok(DocumentRecord {
            clip: self.clip.clone(),
            coords: self.coords.base().clone(),
            reference_origin: self.coords.origin_track().map(|id| self.name_of(id)),
            frame: self.frame,
            config: self.config.clone(),
            tracks,
        })
    }

    fn track_record(&self, id: TrackId) -> Result<TrackRecord> {
        let track = self.track_checked(id)?;
        let mut record = TrackRecord {
            name: track.name().to_string(),
            mass: track.mass,
            start_frame: None,
            end_frame: None,
            visible: track.is_visible(),
            use_default_reference_frame: false,
            model: TrackKindRecord::PointMass { steps: Vec::new() },
        };
        let Some(model) = track.model() else {
            let steps = track
                .steps()
                .iter()
                .filter(|s| s.valid)
                .map(|s| StepRecord { frame: s.frame, x: s.position.x, y: s.position.y })
                .collect();
            record.model = TrackKindRecord::PointMass { steps };
            return Ok(record);
        };
        record.start_frame = (model.start_frame() > 0).then_some(model.start_frame());
        record.end_frame = model.end_frame();
        record.use_default_reference_frame = model.use_default_reference_frame();
        record.model = match model.kind() {
            ModelKind::Analytic(a) => {
                let [x, y] = a.functions();
                TrackKindRecord::Analytic { x: x.to_expr()?, y: y.to_expr()? }
            }
            ModelKind::Particle(p) => {
                let [f1, f2] = p.forces();
                let (f1, f2, initial) = (f1.to_expr()?, f2.to_expr()?, *p.initial());
                let booster = p.booster().map(|b| self.name_of(b));
                match p.force_frame() {
                    ForceFrame::Cartesian => TrackKindRecord::Dynamic { fx: f1, fy: f2, initial, booster },
                    ForceFrame::Polar => TrackKindRecord::DynamicPolar { fr: f1, ftheta: f2, initial, booster },
                }
            }
            ModelKind::System(s) => {
                let [fr, ftheta] = s.forces();
                let particles = if s.members().is_empty() {
                    s.pending_names().to_vec()
                } else {
                    s.members().iter().map(|&m| self.name_of(m)).collect()
                };
                TrackKindRecord::System {
                    particles,
                    fr: fr.to_expr()?,
                    ftheta: ftheta.to_expr()?,
                    inspector: s.inspector_position(),
                }
            }
        };
        Ok(record)
    }

    /// Serializes the document to YAML. Fails if a function is native code.
    pub fn save(&self) -> Result<String> {
        let record = self.to_record()?;
        info!("saving document with {} tracks", record.tracks.len());
        Ok(serde_yaml::to_string(&record)?)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.save()?)?;
        Ok(())
    }

    pub fn load(yaml: &str) -> Result<Document> {
        let record: DocumentRecord = serde_yaml::from_str(yaml)?;
        Document::from_record(record)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Document> {
        Document::load(&fs::read_to_string(path)?)
    }

    /// Builds a document from a record. System particles and boosters are
    /// looked up by name; system particles that are not found stay pending
    /// until [`Document::load_tracks`] supplies them.
    pub fn from_record(record: DocumentRecord) -> Result<Document> {
        record.config.validate()?;
        record.clip.validate()?;
        let mut doc = Document::with_config(record.clip, record.config);
        doc.coords = CoordSystem::new(record.coords);
        let last = doc.clip.frame_count.saturating_sub(1);
        doc.frame = record.frame.clamp(doc.clip.first_frame(), last);
        let boosters = doc.insert_records(record.tracks)?;
        if let Some(name) = record.reference_origin {
            match doc.track_id(&name) {
                Some(origin) => doc.coords.set_reference(Some(ReferenceFrame::new(origin))),
                None => warn!("reference frame origin '{}' not found", name),
            }
        }
        doc.resolve_boosters(boosters);
        doc.resolve_pending_members();
        if let Some(origin) = doc.coords.origin_track() {
            doc.refresh_origins(origin);
        }
        doc.refresh_visible();
        info!("loaded document with {} tracks", doc.tracks.len());
        Ok(doc)
    }

    /// Appends tracks from a YAML list of track records, then retries the
    /// particle names of systems still waiting for them.
    pub fn load_tracks(&mut self, yaml: &str) -> Result<Vec<TrackId>> {
        let records: Vec<TrackRecord> = serde_yaml::from_str(yaml)?;
        let first = self.tracks.len();
        let boosters = self.insert_records(records)?;
        self.resolve_boosters(boosters);
        self.resolve_pending_members();
        self.refresh_visible();
        info!("loaded {} tracks", self.tracks.len() - first);
        Ok((first..self.tracks.len()).collect())
    }

    /// Adds tracks without stepping them. Returns the booster names to resolve.
    fn insert_records(&mut self, records: Vec<TrackRecord>) -> Result<Vec<(TrackId, String)>> {
        let mut boosters = Vec::new();
        for record in records {
            if !(record.mass > 0.0 && record.mass.is_finite()) {
                return Err(ModelError::InvalidMass(record.mass));
            }
            let (model, booster) = match record.model {
                TrackKindRecord::PointMass { steps } => {
                    let id = self.insert_track(record.name, None);
                    let track = &mut self.tracks[id];
                    track.mass = record.mass;
                    track.visible = record.visible;
                    for s in steps {
                        track.steps.set_position(s.frame, Point2::new(s.x, s.y));
                    }
                    let ss = self.clip.step_size();
                    let duration = self.clip.mean_step_duration();
                    let coords = &self.coords;
                    self.tracks[id]
                        .steps
                        .update_all_derivatives(ss, duration, |n, p| coords.to_world(n, p));
                    continue;
                }
                TrackKindRecord::Analytic { x, y } => (ParticleModel::analytic(x, y), None),
                TrackKindRecord::Dynamic { fx, fy, initial, booster } => {
                    (ParticleModel::dynamic(fx, fy, initial), booster)
                }
                TrackKindRecord::DynamicPolar { fr, ftheta, initial, booster } => {
                    (ParticleModel::dynamic_polar(fr, ftheta, initial), booster)
                }
                TrackKindRecord::System { particles, fr, ftheta, inspector } => {
                    let mut model = ParticleModel::system(fr, ftheta);
                    if let Some(system) = model.as_system_mut() {
                        system.pending_names = particles;
                        system.inspector = inspector;
                    }
                    (model, None)
                }
            };
            let first = self.clip.first_frame();
            let start = record.start_frame.unwrap_or(first).clamp(first, self.clip.last_frame());
            let model = model
                .with_start_frame(start)
                .with_end_frame(record.end_frame.map(|e| e.max(start)))
                .with_default_reference_frame(record.use_default_reference_frame);
            let id = self.insert_track(record.name, Some(model));
            let track = &mut self.tracks[id];
            track.mass = record.mass;
            track.visible = record.visible;
            if let Some(name) = booster {
                boosters.push((id, name));
            }
        }
        Ok(boosters)
    }

    fn resolve_boosters(&mut self, boosters: Vec<(TrackId, String)>) {
        for (particle, name) in boosters {
            match self.track_id(&name) {
                Some(b) if b != particle && !self.is_boosted_by(b, particle) => {
                    if let Some(p) = self.model_mut(particle).and_then(ParticleModel::as_particle_mut) {
                        p.booster = Some(b);
                    }
                }
                _ => warn!("booster '{}' of '{}' not found", name, self.name_of(particle)),
            }
        }
    }

    /// Gives each system with pending particle names its particles, once
    /// every name matches a free dynamic particle.
    fn resolve_pending_members(&mut self) {
        for system in 0..self.tracks.len() {
            let pending = match self.model(system).and_then(ParticleModel::as_system) {
                Some(s) if !s.pending_names().is_empty() => s.pending_names().to_vec(),
                _ => continue,
            };
            let resolved: Option<Vec<TrackId>> = pending
                .iter()
                .take(MAX_PARTICLES)
                .map(|name| {
                    let id = self.track_id(name)?;
                    let particle = self.model(id)?.as_particle()?;
                    particle.system().is_none_or(|s| s == system).then_some(id)
                })
                .collect();
            match resolved {
                Some(members) => {
                    let _ = self.apply_members(system, members);
                }
                None => info!("system '{}' waits for particles {:?}", self.name_of(system), pending),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_start_frame_means_the_clip_start() {
        let yaml = "
clip: { frame_count: 10, start_frame: 2, step_size: 1, step_count: 8, frame_duration: 0.1 }
tracks:
  - name: a
    model: { kind: analytic, x: { kind: var, index: 0 }, y: { kind: constant, value: 1.0 } }
";
        let doc = Document::load(yaml).unwrap();
        let model = doc.model(0).unwrap();
        assert_eq!(model.start_frame(), 2);
        assert_eq!(model.end_frame(), None);
        assert_eq!(doc.frame(), 2);
    }

    #[test]
    fn malformed_clips_fail_to_load() {
        let past_end = "
clip: { frame_count: 10, start_frame: 12, step_size: 1, step_count: 1, frame_duration: 0.1 }
";
        assert!(matches!(Document::load(past_end), Err(ModelError::Config(_))));
        let no_step = "
clip: { frame_count: 10, start_frame: 0, step_size: 0, step_count: 10, frame_duration: 0.1 }
";
        assert!(matches!(Document::load(no_step), Err(ModelError::Config(_))));
    }

    #[test]
    fn default_mass_is_left_out() {
        let mut doc = Document::new(VideoClip::new(5, 0.1));
        let light = doc.add_model("light", ParticleModel::analytic(Expr::zero(), Expr::zero()));
        doc.add_model("plain", ParticleModel::analytic(Expr::zero(), Expr::zero()));
        doc.set_mass(light, 0.25).unwrap();
        let record = doc.to_record().unwrap();
        let text = serde_yaml::to_string(&record.tracks).unwrap();
        assert_eq!(text.matches("mass:").count(), 1);
        let back = Document::load(&doc.save().unwrap()).unwrap();
        assert_eq!(back.mass(0), 0.25);
        assert_eq!(back.mass(1), DEFAULT_MASS);
    }

    #[test]
    fn native_functions_cannot_be_saved() {
        let mut doc = Document::new(VideoClip::new(5, 0.1));
        let mut model = ParticleModel::analytic(Expr::zero(), Expr::zero());
        if let ModelKind::Analytic(a) = model.kind_mut() {
            a.set_functions(
                crate::force::UserFunction::native("x", |s: &[f64]| s[0]),
                crate::force::UserFunction::zero("y"),
            );
        }
        doc.add_model("native", model);
        assert!(matches!(doc.save(), Err(ModelError::UnsavableFunction(name)) if name == "x"));
    }
}
