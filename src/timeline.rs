//! Read-only view of the video timeline the models step across.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Queries the stepper makes against the active clip.
pub trait Timeline {
    /// Total number of frames in the underlying video.
    fn frame_count(&self) -> usize;
    fn first_frame(&self) -> usize;
    fn last_frame(&self) -> usize;
    /// Frames between two consecutive clip steps.
    fn step_size(&self) -> usize;
    fn step_count(&self) -> usize;
    fn includes_frame(&self, frame: usize) -> bool;
    fn step_to_frame(&self, step: usize) -> usize;
    fn frame_to_step(&self, frame: usize) -> usize;
    /// Time of a frame in seconds.
    fn frame_time(&self, frame: usize) -> f64;
    /// Duration of one clip step in seconds.
    fn mean_step_duration(&self) -> f64;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoClip {
    pub frame_count: usize,
    pub start_frame: usize,
    pub step_size: usize,
    pub step_count: usize,
    /// Seconds per video frame.
    pub frame_duration: f64,
    /// Time of `start_frame` in seconds.
    #[serde(default)]
    pub start_time: f64,
}

impl VideoClip {
    /// A clip covering every frame of a video, one frame per step.
    pub fn new(frame_count: usize, frame_duration: f64) -> Self {
        Self {
            frame_count,
            start_frame: 0,
            step_size: 1,
            step_count: frame_count,
            frame_duration,
            start_time: 0.0,
        }
    }

    /// Checks a clip read from outside, typically a saved document.
    pub fn validate(&self) -> Result<()> {
        if self.frame_count == 0 || self.step_count == 0 {
            return Err(ModelError::config("clip must have at least one frame and one step"));
        }
        if self.step_size == 0 {
            return Err(ModelError::config("clip step_size must be at least 1"));
        }
        let last = (self.step_count - 1)
            .checked_mul(self.step_size)
            .and_then(|span| span.checked_add(self.start_frame));
        if last.is_none_or(|last| last >= self.frame_count) {
            return Err(ModelError::config(format!(
                "clip of {} steps of {} from frame {} overruns the video's {} frames",
                self.step_count, self.step_size, self.start_frame, self.frame_count
            )));
        }
        if !(self.frame_duration.is_finite() && self.frame_duration > 0.0) {
            return Err(ModelError::config(format!(
                "frame_duration must be positive, got {}",
                self.frame_duration
            )));
        }
        if !self.start_time.is_finite() {
            return Err(ModelError::config("clip start_time must be finite"));
        }
        Ok(())
    }

    /// Changes the step size, keeping the clip inside the video.
    pub fn set_step_size(&mut self, step_size: usize) {
        let step_size = step_size.max(1);
        let span = self.last_frame() - self.start_frame;
        self.step_size = step_size;
        let max_steps = (self.frame_count.saturating_sub(1) - self.start_frame) / step_size + 1;
        self.step_count = (span / step_size + 1).min(max_steps);
    }

    pub fn set_start_frame(&mut self, start_frame: usize) {
        let last = self.frame_count.saturating_sub(1);
        self.start_frame = start_frame.min(last);
        let max_steps = (last - self.start_frame) / self.step_size + 1;
        self.step_count = self.step_count.clamp(1, max_steps);
    }
}

impl Timeline for VideoClip {
    fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn first_frame(&self) -> usize {
        self.start_frame
    }

    fn last_frame(&self) -> usize {
        self.start_frame + self.step_count.saturating_sub(1) * self.step_size
    }

    fn step_size(&self) -> usize {
        self.step_size
    }

    fn step_count(&self) -> usize {
        self.step_count
    }

    fn includes_frame(&self, frame: usize) -> bool {
        frame >= self.start_frame
            && frame <= self.last_frame()
            && (frame - self.start_frame) % self.step_size == 0
    }

    fn step_to_frame(&self, step: usize) -> usize {
        self.start_frame + step * self.step_size
    }

    fn frame_to_step(&self, frame: usize) -> usize {
        frame.saturating_sub(self.start_frame) / self.step_size
    }

    fn frame_time(&self, frame: usize) -> f64 {
        self.start_time + (frame as f64 - self.start_frame as f64) * self.frame_duration
    }

    fn mean_step_duration(&self) -> f64 {
        self.frame_duration * self.step_size as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepped_clip_only_includes_its_grid() {
        let mut clip = VideoClip::new(20, 0.5);
        clip.set_start_frame(2);
        clip.set_step_size(3);
        assert_eq!(clip.last_frame(), 17);
        assert!(clip.includes_frame(5));
        assert!(!clip.includes_frame(6));
        assert!(!clip.includes_frame(1));
        assert_eq!(clip.frame_to_step(8), 2);
        assert_eq!(clip.step_to_frame(2), 8);
        assert_eq!(clip.mean_step_duration(), 1.5);
    }

    #[test]
    fn malformed_clips_are_rejected() {
        assert!(VideoClip::new(10, 0.1).validate().is_ok());
        let mut clip = VideoClip::new(10, 0.1);
        clip.step_size = 0;
        assert!(matches!(clip.validate(), Err(ModelError::Config(_))));
        let mut clip = VideoClip::new(10, 0.1);
        clip.start_frame = 12;
        assert!(matches!(clip.validate(), Err(ModelError::Config(_))));
        assert!(VideoClip::new(10, 0.0).validate().is_err());
        assert!(VideoClip::new(0, 0.1).validate().is_err());
    }

    #[test]
    fn frame_time_is_relative_to_clip_start() {
        let mut clip = VideoClip::new(10, 0.1);
        clip.start_time = 1.0;
        clip.set_start_frame(4);
        assert!((clip.frame_time(4) - 1.0).abs() < 1e-12);
        assert!((clip.frame_time(6) - 1.2).abs() < 1e-12);
    }
}
