//! The stepping loop.
//!
//! `refresh` brings a model's steps from its watermark up to the displayed
//! frame (bounded by the model's end frame and the clip), in
//! `trace_points_per_step` sub-steps per clip step. Trace growth is staged and
//! swapped in after the loop. Every `trace_points_per_step`-th sub-step
//! commits a position step.
//!
//! `trim` walks the watermark back after the end frame moved below it.

use log::{debug, warn};
use nalgebra::Point2;

use crate::coords::{CoordSystem, ImageTransform};
use crate::document::{ChangeKind, Document, ModelEvent, Notice, StepPhase, TrackChange, TrackId};
use crate::error::Result;
use crate::models::ParticleModel;
use crate::timeline::Timeline;
use crate::trace::TraceBuffer;

const NAN_POINT: Point2<f64> = Point2::new(f64::NAN, f64::NAN);

impl Document {
    /// Brings a model up to the current frame. Does nothing for point masses,
    /// for particles stepped by a system, and for a model already stepping.
    pub fn refresh(&mut self, id: TrackId) {
        let origin_moved = self.with_model(id, |doc, model| {
            if model.system_id().is_some() {
                return false;
            }
            doc.refresh_model(id, model)
        });
        if origin_moved == Some(true) {
            self.transform_changed();
        }
    }

    /// Checks a model out of its track, runs `f`, and checks it back in.
    fn with_model<R>(
        &mut self,
        id: TrackId,
        f: impl FnOnce(&mut Document, &mut ParticleModel) -> R,
    ) -> Option<R> {
        let track = self.tracks.get_mut(id)?;
        if track.phase == StepPhase::Stepping {
            return None;
        }
        let mut model = track.model.take()?;
        track.phase = StepPhase::Stepping;
        let _hold = self.hold_painting();
        let out = f(self, &mut model);
        let track = &mut self.tracks[id];
        track.model = Some(model);
        track.phase = StepPhase::Idle;
        Some(out)
    }

    /// True when the model owns a track of the origin chain, or asks for it.
    fn uses_default_coords(&self, id: TrackId, model: &ParticleModel) -> bool {
        if model.use_default_reference_frame {
            return true;
        }
        let chain = self.origin_chain();
        model.models(id).iter().any(|m| chain.contains(m))
    }

    fn stepping_coords(&self, id: TrackId, model: &ParticleModel) -> CoordSystem {
        if self.uses_default_coords(id, model) {
            self.coords.underlying()
        } else {
            self.coords.clone()
        }
    }

    /// Last frame at or before `end` that the clip includes, not before `start`.
    fn last_included(&self, mut end: usize, start: usize) -> usize {
        while end > start && !self.clip.includes_frame(end) {
            end -= 1;
        }
        end
    }

    /// Returns true when the model is (part of) the moving origin and its
    /// steps moved it, so every other model must be re-stepped.
    fn refresh_model(&mut self, id: TrackId, model: &mut ParticleModel) -> bool {
        if model.adjusting || model.is_empty_system() {
            return false;
        }
        let n = self.frame;
        let end = model.end_frame.unwrap_or(usize::MAX).min(n);
        let end = self.last_included(end, model.start_frame);
        if model.watermark.is_some_and(|w| end <= w) {
            return false;
        }
        let was_reset = model.watermark.is_none();
        if was_reset {
            self.reset_model(id, model);
        }
        let Some(start) = model.watermark.filter(|&w| end > w) else {
            return was_reset && self.anchor_models(&model.models(id));
        };

        debug!("'{}' refreshing steps {} to {}", self.name_of(id), start, end);
        let playing = self.playing;
        let coords = self.stepping_coords(id, model);
        let trace_points = self.config.trace_points_per_step;
        let iterations = self.config.iterations_per_step;
        let step_size = self.clip.step_size();
        let sub_dt = self.clip.mean_step_duration() / trace_points as f64;
        let start_time = model.t0
            + sub_dt * (trace_points * (start - model.start_frame)) as f64 / step_size as f64;
        let step_count = trace_points * (end - start) / step_size;
        let models = model.models(id);

        let mut growth: Vec<_> =
            models.iter().map(|&m| self.tracks[m].trace.begin_growth(step_count)).collect();
        let mut commits: Vec<Vec<(usize, Point2<f64>)>> = vec![Vec::new(); models.len()];
        let mut offscreen = false;
        let mut points = Vec::with_capacity(models.len());
        for i in 0..step_count {
            let step_number = i + 1;
            let frame = start + step_number * step_size / trace_points;
            let time = start_time + step_number as f64 * sub_dt;
            model.advance(self, id, iterations);
            points.clear();
            model.trace_positions(self, time, &mut points);
            if points.is_empty() {
                continue;
            }
            let commit = step_number % trace_points == 0;
            for (j, world) in points.iter().enumerate().take(models.len()) {
                let image = coords.to_image(frame, world);
                let image = if self.config.in_bounds(image.x, image.y) {
                    image
                } else {
                    offscreen = true;
                    NAN_POINT
                };
                growth[j].set(i, image);
                if commit {
                    commits[j].push((frame, image));
                }
            }
            if commit {
                model.save_state(frame);
            }
        }

        if offscreen && !model.invalid_warning_shown {
            model.invalid_warning_shown = true;
            let name = self.name_of(id);
            warn!("'{}' has positions outside the drawable area; they are left blank", name);
            self.notices.push(Notice::OffScreen { track: id, name });
        }

        let start_update = self.derivative_window_start(start);
        let count = 4 + (end - start) / step_size;
        model.watermark = Some(end);
        for ((&m, grown), committed) in models.iter().zip(growth).zip(commits) {
            let track = &mut self.tracks[m];
            track.trace.commit(grown);
            for (frame, image) in committed {
                track.steps.set_position(frame, image);
            }
            track.steps.set_len(end + 1);
        }
        // the origin must sit at zero before its derivatives are taken
        let anchored = self.anchor_models(&models);
        for &m in &models {
            if playing {
                model.derivs_deferred = true;
            } else {
                self.update_derivatives(m, start_update, count);
                let kind = if end - start == 1 { ChangeKind::Step(n) } else { ChangeKind::Steps };
                self.changes.push(TrackChange { track: m, kind });
            }
        }
        self.paint.request();
        anchored
    }

    /// First frame of a derivative window: `frame` stepped back up to two
    /// clip steps, so neighbours of the old watermark pick up new values.
    fn derivative_window_start(&self, frame: usize) -> usize {
        let step_size = self.clip.step_size();
        let mut start = frame;
        for _ in 0..2 {
            if start > step_size {
                start -= step_size;
            }
        }
        start
    }

    /// Anchors the reference frame to whichever of `models` is its origin.
    /// Returns true if one was.
    fn anchor_models(&mut self, models: &[TrackId]) -> bool {
        match self.coords.origin_track() {
            Some(origin) if models.contains(&origin) => {
                self.anchor_origin(origin);
                true
            }
            _ => false,
        }
    }

    /// Resets a model to its initial values and places its first step at
    /// the first frame both the model and the clip include.
    fn reset_model(&mut self, id: TrackId, model: &mut ParticleModel) {
        let trace_points = self.config.trace_points_per_step;
        let iterations = self.config.iterations_per_step;
        let start = model.start_frame;
        model.key_frames.clear();
        model.reset_state(self, self.clip.frame_time(start));
        let sub_dt = self.clip.mean_step_duration() / trace_points as f64;
        model.initialize_solver(sub_dt / iterations as f64);

        let models = model.models(id);
        let last = self.clip.frame_count.saturating_sub(1);
        let end = self.last_included(model.end_frame.unwrap_or(last).min(last), start);
        if model.is_empty_system() || (end == start && !self.clip.includes_frame(start)) {
            for &m in &models {
                let track = &mut self.tracks[m];
                track.steps.clear();
                track.trace.clear();
                self.changes.push(TrackChange { track: m, kind: ChangeKind::Steps });
            }
            model.watermark = None;
            return;
        }
        let mut first = start;
        while first < end && !self.clip.includes_frame(first) {
            first += 1;
        }
        let pre_steps = (first - start) * trace_points * iterations / self.clip.step_size();
        model.advance(self, id, pre_steps);
        let mut points = Vec::with_capacity(models.len());
        model.trace_positions(self, self.clip.frame_time(first), &mut points);
        let coords = self.stepping_coords(id, model);
        for (&m, world) in models.iter().zip(&points) {
            let image = coords.to_image(first, world);
            let track = &mut self.tracks[m];
            track.steps.clear();
            track.steps.set_len(first + 1);
            track.steps.set_position(first, image);
            track.trace = TraceBuffer::from_point(image);
            self.changes.push(TrackChange { track: m, kind: ChangeKind::Step(first) });
        }
        model.save_state(first);
        model.key_frames.insert(first);
        model.watermark = Some(first);
        debug!("'{}' reset at frame {}", self.name_of(id), first);
    }

    /// Refreshes the reference frame from the origin track's steps, then
    /// rewrites each of its steps as the transform's zero point.
    fn anchor_origin(&mut self, origin: TrackId) {
        self.refresh_origins(origin);
        let coords = &self.coords;
        let steps = &mut self.tracks[origin].steps;
        for i in 0..self.clip.step_count() {
            let frame = self.clip.step_to_frame(i);
            if steps.get(frame).is_some() {
                steps.set_position(frame, coords.to_image(frame, &Point2::origin()));
            }
        }
    }

    pub(crate) fn update_derivatives(&mut self, id: TrackId, start: usize, count: usize) {
        let step_size = self.clip.step_size();
        let duration = self.clip.mean_step_duration();
        let coords = &self.coords;
        if let Some(track) = self.tracks.get_mut(id) {
            track.steps.update_derivatives(start, count, step_size, duration, |n, p| {
                coords.to_world(n, p)
            });
        }
    }

    fn update_all_derivatives(&mut self, id: TrackId) {
        let step_size = self.clip.step_size();
        let duration = self.clip.mean_step_duration();
        let coords = &self.coords;
        if let Some(track) = self.tracks.get_mut(id) {
            track.steps.update_all_derivatives(step_size, duration, |n, p| coords.to_world(n, p));
        }
    }

    /// Recomputes derivatives that were skipped during live playback.
    pub(crate) fn refresh_derivs_if_needed(&mut self, id: TrackId) {
        let models = match self.model_mut(id) {
            Some(model) if model.derivs_deferred => {
                model.derivs_deferred = false;
                model.models(id)
            }
            _ => return,
        };
        for m in models {
            self.update_all_derivatives(m);
            self.changes.push(TrackChange { track: m, kind: ChangeKind::Steps });
        }
        self.paint.request();
    }

    /// Drops the steps after the model's end frame. Returns true if the
    /// reference frame origin was among the trimmed tracks.
    fn trim_model(&mut self, id: TrackId, model: &mut ParticleModel) -> bool {
        let Some(watermark) = model.watermark else {
            return false;
        };
        let last = self.clip.frame_count.saturating_sub(1);
        let end = self.last_included(model.end_frame.unwrap_or(last).min(last), model.start_frame);
        if end >= watermark {
            return false;
        }
        let models = model.models(id);
        let target = if model.restore_state(end) {
            Some(end)
        } else {
            let keys: Vec<usize> = model.key_frames.range(..=end).rev().copied().collect();
            keys.into_iter().find(|&k| model.restore_state(k))
        };
        let trim_count = target
            .map(|t| self.config.trace_points_per_step * (watermark - t) / self.clip.step_size())
            .filter(|&n| models.iter().all(|&m| self.tracks[m].trace.len() >= n));
        let (Some(target), Some(trim_count)) = (target, trim_count) else {
            debug!("'{}' has no usable state at or before {}; resetting", self.name_of(id), end);
            model.invalidate();
            for &m in &models {
                let track = &mut self.tracks[m];
                track.steps.clear();
                track.trace.clear();
                self.changes.push(TrackChange { track: m, kind: ChangeKind::Steps });
            }
            return false;
        };
        debug!("'{}' trimming steps {} to {}", self.name_of(id), watermark, target);
        for &m in &models {
            let track = &mut self.tracks[m];
            track.trace.truncate(trim_count);
            track.steps.set_len(target + 1);
        }
        model.watermark = Some(target);
        model.key_frames.insert(target);
        let anchored = self.anchor_models(&models);
        let start_update = self.derivative_window_start(target);
        let count = 3 + (watermark - target) / self.clip.step_size();
        for &m in &models {
            self.update_derivatives(m, start_update, count);
            self.changes.push(TrackChange { track: m, kind: ChangeKind::Steps });
        }
        self.paint.request();
        anchored
    }

    /// Sets the first frame a model produces steps for. Members forward to
    /// their system.
    pub fn set_start_frame(&mut self, id: TrackId, frame: usize) -> Result<()> {
        let model = self.model_checked(id)?;
        if let Some(system) = model.system_id() {
            return self.set_start_frame(system, frame);
        }
        let end = model.end_frame.unwrap_or(usize::MAX);
        let frame = frame.max(self.clip.first_frame()).min(self.clip.last_frame()).min(end);
        if frame == model.start_frame {
            return Ok(());
        }
        let model = self.model_checked_mut(id)?;
        model.start_frame = frame;
        model.invalidate();
        let boosted = self.boosted_models(id);
        for particle in boosted {
            self.boost(particle);
        }
        self.refresh(id);
        self.paint.request();
        Ok(())
    }

    /// Particles driven by `id` whose boosters supply initial values.
    fn boosted_models(&self, id: TrackId) -> Vec<TrackId> {
        let Some(model) = self.model(id) else {
            return Vec::new();
        };
        model
            .models(id)
            .into_iter()
            .filter(|&m| self.model(m).and_then(|p| p.as_particle()?.booster()).is_some())
            .collect()
    }

    /// Sets the last frame a model produces steps for; frames at or past
    /// the clip's last frame mean "to the end". Members forward to their system.
    pub fn set_end_frame(&mut self, id: TrackId, frame: usize) -> Result<()> {
        let model = self.model_checked(id)?;
        if let Some(system) = model.system_id() {
            return self.set_end_frame(system, frame);
        }
        let frame = frame.max(model.start_frame);
        let current = model.end_frame.unwrap_or(usize::MAX);
        if frame == current {
            return Ok(());
        }
        let last = self.clip.last_frame();
        let watermark = model.watermark;
        self.model_checked_mut(id)?.end_frame = (frame < last).then_some(frame);
        if watermark.is_some_and(|w| frame < w) {
            let origin_moved = self.with_model(id, |doc, model| doc.trim_model(id, model));
            if origin_moved == Some(true) {
                self.transform_changed();
            }
        }
        // a trim may fall back to an earlier saved frame
        self.refresh(id);
        self.paint.request();
        Ok(())
    }

    /// Starts or ends a live edit of a model's parameters. Stepping is
    /// suspended until the edit ends.
    pub fn set_adjusting(&mut self, id: TrackId, adjusting: bool) -> Result<()> {
        self.notify(id, ModelEvent::Adjusting(adjusting))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::force::Expr;
    use crate::models::InitialValues;
    use crate::timeline::VideoClip;

    fn linear_model() -> ParticleModel {
        ParticleModel::dynamic(Expr::zero(), Expr::zero(), InitialValues::new(0.0, 0.0, 1.0, 0.0))
    }

    #[test]
    fn trim_boundary_becomes_a_key_frame() {
        let mut doc = Document::new(VideoClip::new(12, 0.1));
        let id = doc.add_model("ball", linear_model());
        doc.set_frame(11).unwrap();
        doc.set_end_frame(id, 6).unwrap();
        let model = doc.model(id).unwrap();
        assert_eq!(model.watermark(), Some(6));
        assert!(model.key_frames().contains(&0));
        assert!(model.key_frames().contains(&6));
    }

    #[test]
    fn refresh_is_a_no_op_once_covered() {
        let mut doc = Document::new(VideoClip::new(10, 1.0));
        let id = doc.add_model("ball", linear_model());
        doc.set_frame(4).unwrap();
        let before = doc.trace(id).unwrap().clone();
        doc.refresh(id);
        assert_eq!(doc.trace(id).unwrap(), &before);
        assert_eq!(before.len(), 1 + 4 * 10);
    }

    #[test]
    fn re_entrant_refresh_is_ignored() {
        let mut doc = Document::new(VideoClip::new(10, 1.0));
        let id = doc.add_model("ball", linear_model());
        let inner = doc.with_model(id, |doc, _| {
            assert_eq!(doc.track(id).unwrap().phase(), StepPhase::Stepping);
            doc.with_model(id, |_, _| ())
        });
        assert_eq!(inner, Some(None));
        assert_eq!(doc.track(id).unwrap().phase(), StepPhase::Idle);
        assert!(!doc.paint_monitor().is_held());
    }

    #[test]
    fn stepped_clip_commits_only_included_frames() {
        let mut clip = VideoClip::new(11, 0.1);
        clip.set_step_size(2);
        let mut doc = Document::new(clip);
        let id = doc.add_model("ball", linear_model());
        doc.set_frame(7).unwrap();
        let model = doc.model(id).unwrap();
        assert_eq!(model.watermark(), Some(6));
        let steps = doc.track(id).unwrap().steps();
        assert!(steps.get(4).is_some());
        assert!(steps.get(5).is_none());
        // three clip steps of ten sub-steps after the reset point
        assert_eq!(doc.trace(id).unwrap().len(), 1 + 3 * 10);
    }
}
