//! Per-frame position samples and their finite-difference derivatives.

use nalgebra::{Point2, Vector2};

/// One committed position sample, in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionStep {
    pub frame: usize,
    pub position: Point2<f64>,
    pub valid: bool,
}

impl PositionStep {
    pub fn new(frame: usize, position: Point2<f64>) -> Self {
        let valid = !position.x.is_nan() && !position.y.is_nan();
        Self { frame, position, valid }
    }

    pub fn set_position(&mut self, position: Point2<f64>) {
        self.position = position;
        self.valid = !position.x.is_nan() && !position.y.is_nan();
    }
}

/// Frame-indexed step storage of one track.
///
/// Velocity and acceleration are kept in world units per second and are only
/// meaningful for frames whose neighbours at one (velocity) or two
/// (acceleration) clip steps are valid.
#[derive(Debug, Clone, Default)]
pub struct StepArray {
    steps: Vec<Option<PositionStep>>,
    velocity: Vec<Option<Vector2<f64>>>,
    acceleration: Vec<Option<Vector2<f64>>>,
}

impl StepArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frame slots, not the number of steps present.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.iter().all(Option::is_none)
    }

    pub fn get(&self, frame: usize) -> Option<&PositionStep> {
        self.steps.get(frame).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, frame: usize) -> Option<&mut PositionStep> {
        self.steps.get_mut(frame).and_then(Option::as_mut)
    }

    /// Valid position at `frame`, if any.
    pub fn position(&self, frame: usize) -> Option<Point2<f64>> {
        self.get(frame).filter(|s| s.valid).map(|s| s.position)
    }

    pub fn set(&mut self, frame: usize, step: Option<PositionStep>) {
        if frame >= self.steps.len() {
            self.set_len(frame + 1);
        }
        self.steps[frame] = step;
    }

    /// Creates or updates the step at `frame`.
    pub fn set_position(&mut self, frame: usize, position: Point2<f64>) {
        match self.get_mut(frame) {
            Some(step) => step.set_position(position),
            None => self.set(frame, Some(PositionStep::new(frame, position))),
        }
    }

    /// Grows with empty slots or drops every slot at and after `len`.
    pub fn set_len(&mut self, len: usize) {
        self.steps.resize(len, None);
        self.velocity.resize(len, None);
        self.acceleration.resize(len, None);
    }

    pub fn clear(&mut self) {
        self.steps.clear();
        self.clear_derivatives();
    }

    pub fn clear_derivatives(&mut self) {
        self.velocity = vec![None; self.steps.len()];
        self.acceleration = vec![None; self.steps.len()];
    }

    pub fn iter(&self) -> impl Iterator<Item = &PositionStep> + '_ {
        self.steps.iter().flatten()
    }

    pub fn velocity(&self, frame: usize) -> Option<Vector2<f64>> {
        self.velocity.get(frame).copied().flatten()
    }

    pub fn acceleration(&self, frame: usize) -> Option<Vector2<f64>> {
        self.acceleration.get(frame).copied().flatten()
    }

    /// Recomputes derivatives for `count` clip steps starting at `start`,
    /// that is frames `start, start + step_size, ...`.
    ///
    /// `to_world(frame, image)` maps a stored position to world coordinates,
    /// `step_size` is the clip step in frames and `step_duration` its length
    /// in seconds.
    pub fn update_derivatives<F>(
        &mut self,
        start: usize,
        count: usize,
        step_size: usize,
        step_duration: f64,
        to_world: F,
    ) where
        F: Fn(usize, &Point2<f64>) -> Point2<f64>,
    {
        let ss = step_size.max(1);
        let frames: Vec<usize> = (0..count).map(|k| start + k * ss).collect();
        self.update_frames(&frames, ss, step_duration, to_world);
    }

    /// Recomputes derivatives for every frame.
    pub fn update_all_derivatives<F>(&mut self, step_size: usize, step_duration: f64, to_world: F)
    where
        F: Fn(usize, &Point2<f64>) -> Point2<f64>,
    {
        let frames: Vec<usize> = (0..self.steps.len()).collect();
        self.update_frames(&frames, step_size.max(1), step_duration, to_world);
    }

    fn update_frames<F>(&mut self, frames: &[usize], ss: usize, step_duration: f64, to_world: F)
    where
        F: Fn(usize, &Point2<f64>) -> Point2<f64>,
    {
        let len = self.steps.len();
        let world = |n: usize| self.position(n).map(|p| to_world(n, &p));
        let mut updates = Vec::with_capacity(frames.len());
        for &n in frames.iter().take_while(|&&n| n < len) {
            let v = match (n.checked_sub(ss).and_then(world), world(n + ss)) {
                (Some(prev), Some(next)) => Some((next - prev) / (2.0 * step_duration)),
                _ => None,
            };
            let a = match (n.checked_sub(2 * ss).and_then(world), world(n), world(n + 2 * ss)) {
                (Some(prev), Some(here), Some(next)) => Some(
                    (next.coords - 2.0 * here.coords + prev.coords)
                        / (4.0 * step_duration * step_duration),
                ),
                _ => None,
            };
            updates.push((n, v, a));
        }
        for (n, v, a) in updates {
            self.velocity[n] = v;
            self.acceleration[n] = a;
        }
    }
}
