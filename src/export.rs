//! Per-frame data rows handed to tables and plots.

use nalgebra::Vector2;
use serde::Serialize;

use crate::document::{Document, TrackId};
use crate::error::Result;
use crate::timeline::Timeline;

/// One row per frame with a committed step, world units. Quantities without
/// data (no neighbouring steps, no relative state) are `NaN`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DataRow {
    pub t: f64,
    pub x: f64,
    pub y: f64,
    pub r: f64,
    pub theta_r: f64,
    pub vx: f64,
    pub vy: f64,
    pub v: f64,
    pub theta_v: f64,
    pub ax: f64,
    pub ay: f64,
    pub a: f64,
    pub theta_a: f64,
    pub step: usize,
    pub frame: usize,
    pub px: f64,
    pub py: f64,
    pub p: f64,
    pub theta_p: f64,
    /// Polar state of the first particle about the second, systems only.
    pub r_rel: f64,
    pub theta_rel: f64,
    pub vr_rel: f64,
    pub omega_rel: f64,
}

/// `(x, y, |v|, angle)` of a vector, all `NaN` when absent.
fn components(v: Option<Vector2<f64>>) -> (f64, f64, f64, f64) {
    match v {
        Some(v) => (v.x, v.y, v.norm(), v.y.atan2(v.x)),
        None => (f64::NAN, f64::NAN, f64::NAN, f64::NAN),
    }
}

impl Document {
    /// Data rows of a track for every frame in the clip that has a valid step.
    pub fn data_table(&self, id: TrackId) -> Result<Vec<DataRow>> {
        let track = self.track_checked(id)?;
        let mass = self.mass(id);
        let system = track.model().and_then(|m| m.as_system());
        let mut rows = Vec::new();
        for step in track.steps().iter() {
            let n = step.frame;
            if !self.clip.includes_frame(n) {
                continue;
            }
            let Some(world) = self.world_position(id, n) else {
                continue;
            };
            let (vx, vy, v, theta_v) = components(self.velocity(id, n));
            let (ax, ay, a, theta_a) = components(self.acceleration(id, n));
            let rel = system.and_then(|s| s.relative_state(n));
            rows.push(DataRow {
                t: self.clip.frame_time(n),
                x: world.x,
                y: world.y,
                r: world.coords.norm(),
                theta_r: world.y.atan2(world.x),
                vx,
                vy,
                v,
                theta_v,
                ax,
                ay,
                a,
                theta_a,
                step: self.clip.frame_to_step(n),
                frame: n,
                px: mass * vx,
                py: mass * vy,
                p: mass * v,
                theta_p: theta_v,
                r_rel: rel.map_or(f64::NAN, |s| s.r),
                theta_rel: rel.map_or(f64::NAN, |s| s.theta),
                vr_rel: rel.map_or(f64::NAN, |s| s.vr),
                omega_rel: rel.map_or(f64::NAN, |s| s.omega),
            });
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::force::Expr;
    use crate::models::{InitialValues, ParticleModel};
    use crate::timeline::VideoClip;
    use approx::assert_abs_diff_eq;

    #[test]
    fn rows_carry_momentum_and_blank_edges() {
        let mut doc = Document::new(VideoClip::new(6, 0.5));
        let init = InitialValues::new(0.0, 0.0, 2.0, 0.0);
        let id = doc.add_model("ball", ParticleModel::dynamic(Expr::zero(), Expr::zero(), init));
        doc.set_mass(id, 3.0).unwrap();
        doc.set_frame(5).unwrap();
        let rows = doc.data_table(id).unwrap();
        assert_eq!(rows.len(), 6);
        assert!(rows[0].vx.is_nan());
        assert!(rows[0].r_rel.is_nan());
        let row = &rows[2];
        assert_eq!(row.frame, 2);
        assert_abs_diff_eq!(row.t, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(row.x, 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(row.vx, 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(row.px, 6.0, epsilon = 1e-9);
        assert_abs_diff_eq!(row.ax, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(row.theta_p, 0.0, epsilon = 1e-12);
    }
}
