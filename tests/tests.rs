use approx::assert_abs_diff_eq;
use nalgebra::Point2;
use rtrace::{
    ChangeKind, Document, Expr, InitialValues, ModelError, Notice, ParticleModel, TrackChange,
    TrackId, VideoClip,
};

/// Force-free particle starting at `(x, 0)` with velocity `(vx, 0)`.
pub fn free_particle(x: f64, vx: f64) -> ParticleModel {
    ParticleModel::dynamic(Expr::zero(), Expr::zero(), InitialValues::new(x, 0.0, vx, 0.0))
}

/// Document with one-second frames and the default identity coordinates.
pub fn unit_clip(frames: usize) -> Document {
    Document::new(VideoClip::new(frames, 1.0))
}

/// Total momentum `(px, py)` of a two-body system state.
pub fn momentum(state: &[f64], m1: f64, m2: f64) -> (f64, f64) {
    (m1 * state[1] + m2 * state[5], m1 * state[3] + m2 * state[7])
}

pub fn two_body(doc: &mut Document, m2: f64) -> (TrackId, TrackId, TrackId) {
    let a = doc.add_model(
        "A",
        ParticleModel::dynamic(Expr::zero(), Expr::zero(), InitialValues::new(1.0, 0.0, 0.0, 0.35)),
    );
    let b = doc.add_model(
        "B",
        ParticleModel::dynamic(Expr::zero(), Expr::zero(), InitialValues::new(-1.0, 0.0, 0.0, -0.35)),
    );
    doc.set_mass(b, m2).unwrap();
    let system = doc.add_model("pair", ParticleModel::system(Expr::inverse_square(1.0, 0), Expr::zero()));
    doc.add_particle(system, a).unwrap();
    doc.add_particle(system, b).unwrap();
    (a, b, system)
}

// ==================================================================================
// Stepping
// ==================================================================================

#[test]
fn unit_mass_reaches_five_at_frame_five() {
    let mut doc = unit_clip(10);
    let id = doc.add_model("ball", free_particle(0.0, 1.0));
    doc.set_frame(5).unwrap();

    let p = doc.world_position(id, 5).unwrap();
    assert_abs_diff_eq!(p.x, 5.0, epsilon = 1e-9);
    assert_abs_diff_eq!(p.y, 0.0, epsilon = 1e-12);
    assert_eq!(doc.model(id).unwrap().watermark(), Some(5));
    assert_eq!(doc.trace(id).unwrap().len(), 1 + 5 * 10);
}

#[test]
fn free_particle_moves_linearly_at_every_sub_step() {
    let mut doc = unit_clip(10);
    let id = doc.add_model("ball", free_particle(0.5, 2.0));
    doc.set_frame(6).unwrap();

    let trace = doc.trace(id).unwrap();
    let per_step = doc.config().trace_points_per_step;
    assert_eq!(trace.len(), 1 + 6 * per_step);
    for (k, (x, y)) in trace.xs().iter().zip(trace.ys()).enumerate() {
        let t = k as f64 / per_step as f64;
        assert_abs_diff_eq!(*x, 0.5 + 2.0 * t, epsilon = 1e-9);
        assert_abs_diff_eq!(*y, 0.0, epsilon = 1e-12);
    }
}

#[test]
fn stepped_clip_keeps_derivatives_one_step_at_a_time() {
    let mut doc = unit_clip(21);
    doc.set_step_size(4);
    let id = doc.add_model("ball", free_particle(0.0, 1.0));
    for frame in [4, 8, 12, 16, 20] {
        doc.set_frame(frame).unwrap();
    }

    assert_eq!(doc.velocity(id, 0), None);
    for n in [4, 8, 12, 16] {
        let v = doc.velocity(id, n).unwrap();
        assert_abs_diff_eq!(v.x, 1.0, epsilon = 1e-9);
    }
    assert_eq!(doc.velocity(id, 20), None);
    let a = doc.acceleration(id, 12).unwrap();
    assert_abs_diff_eq!(a.x, 0.0, epsilon = 1e-9);
}

#[test]
fn analytic_model_follows_its_law() {
    let mut doc = Document::new(VideoClip::new(8, 0.25));
    let x = Expr::Linear { constant: 1.0, coefficients: vec![2.0] };
    let id = doc.add_model("line", ParticleModel::analytic(x, Expr::constant(-3.0)));
    doc.set_frame(7).unwrap();
    for n in 0..=7 {
        let p = doc.world_position(id, n).unwrap();
        assert_abs_diff_eq!(p.x, 1.0 + 2.0 * 0.25 * n as f64, epsilon = 1e-12);
        assert_abs_diff_eq!(p.y, -3.0, epsilon = 1e-12);
    }
    let v = doc.velocity(id, 3).unwrap();
    assert_abs_diff_eq!(v.x, 2.0, epsilon = 1e-9);
}

#[test]
fn refreshing_twice_changes_nothing() {
    let mut doc = unit_clip(10);
    let id = doc.add_model("ball", free_particle(0.0, 1.0));
    doc.set_frame(6).unwrap();
    let trace = doc.trace(id).unwrap().clone();
    let repaints = doc.paint_monitor().repaint_count();
    doc.take_changes();

    doc.refresh(id);
    doc.set_frame(6).unwrap();
    assert_eq!(doc.trace(id).unwrap(), &trace);
    assert!(doc.take_changes().is_empty());
    // set_frame still asks for one repaint of its own
    assert_eq!(doc.paint_monitor().repaint_count(), repaints + 1);
}

#[test]
fn single_frame_advances_report_one_step() {
    let mut doc = unit_clip(10);
    let id = doc.add_model("ball", free_particle(0.0, 1.0));
    doc.take_changes();
    doc.set_frame(1).unwrap();
    assert_eq!(doc.take_changes(), vec![TrackChange { track: id, kind: ChangeKind::Step(1) }]);
    doc.set_frame(4).unwrap();
    assert_eq!(doc.take_changes(), vec![TrackChange { track: id, kind: ChangeKind::Steps }]);
}

#[test]
fn stepping_back_keeps_computed_steps() {
    let mut doc = unit_clip(10);
    let id = doc.add_model("ball", free_particle(0.0, 1.0));
    doc.set_frame(8).unwrap();
    doc.set_frame(2).unwrap();
    assert_eq!(doc.model(id).unwrap().watermark(), Some(8));
    assert!(doc.world_position(id, 8).is_some());
}

#[test]
fn start_frame_moves_the_first_step() {
    let mut doc = unit_clip(10);
    let id = doc.add_model("ball", free_particle(0.0, 1.0));
    doc.set_frame(9).unwrap();
    doc.set_start_frame(id, 4).unwrap();

    assert!(doc.world_position(id, 3).is_none());
    // initial values now apply at frame 4
    assert_abs_diff_eq!(doc.world_position(id, 4).unwrap().x, 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(doc.world_position(id, 9).unwrap().x, 5.0, epsilon = 1e-9);
    assert_abs_diff_eq!(doc.model(id).unwrap().t0(), 4.0, epsilon = 1e-12);
}

#[test]
fn adjusting_suspends_stepping() {
    let mut doc = unit_clip(10);
    let id = doc.add_model("ball", free_particle(0.0, 1.0));
    doc.set_adjusting(id, true).unwrap();
    doc.set_frame(5).unwrap();
    assert_eq!(doc.model(id).unwrap().watermark(), Some(0));

    doc.set_adjusting(id, false).unwrap();
    assert_eq!(doc.model(id).unwrap().watermark(), Some(5));
}

#[test]
fn offscreen_samples_warn_once_and_release_painting() {
    let mut doc = unit_clip(10);
    let id = doc.add_model("rocket", free_particle(0.0, 10_000.0));
    doc.set_frame(3).unwrap();

    let notices = doc.take_notices();
    assert_eq!(notices, vec![Notice::OffScreen { track: id, name: "rocket".to_string() }]);
    assert!(!doc.paint_monitor().is_held());
    let trace = doc.trace(id).unwrap();
    assert_eq!(trace.len(), 31);
    assert!(trace.xs()[30].is_nan());
    assert!(trace.points().count() < trace.len());
    assert!(doc.world_position(id, 3).is_none());

    doc.set_frame(6).unwrap();
    assert!(doc.take_notices().is_empty());
}

#[test]
fn playback_defers_derivatives_until_it_stops() {
    let mut doc = unit_clip(10);
    let id = doc.add_model("ball", free_particle(0.0, 1.0));
    doc.set_playing(true);
    doc.set_frame(6).unwrap();
    assert!(doc.world_position(id, 6).is_some());
    assert!(doc.velocity(id, 3).is_none());

    doc.set_playing(false);
    let v = doc.velocity(id, 3).unwrap();
    assert_abs_diff_eq!(v.x, 1.0, epsilon = 1e-9);
}

// ==================================================================================
// Two-body systems
// ==================================================================================

#[test]
fn two_body_system_conserves_momentum() {
    let mut doc = Document::new(VideoClip::new(40, 0.05));
    let (a, b, system) = two_body(&mut doc, 3.0);
    doc.set_frame(39).unwrap();

    let state = doc.system_state(system).unwrap();
    assert_eq!(state.len(), 9);
    let (px, py) = momentum(&state, 1.0, 3.0);
    assert_abs_diff_eq!(px, 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(py, 0.35 - 3.0 * 0.35, epsilon = 1e-9);
    assert_abs_diff_eq!(state[8], 39.0 * 0.05, epsilon = 1e-9);

    // the particles were pulled towards each other
    assert!(state[1] < 0.0 && state[5] > 0.0);
    assert!(doc.world_position(a, 39).is_some());
    assert!(doc.world_position(b, 39).is_some());
    assert_abs_diff_eq!(doc.mass(system), 4.0);
}

#[test]
fn system_track_is_the_centre_of_mass() {
    let mut doc = Document::new(VideoClip::new(20, 0.05));
    let (a, b, system) = two_body(&mut doc, 3.0);
    doc.set_frame(19).unwrap();
    for n in [0, 7, 19] {
        let pa = doc.world_position(a, n).unwrap();
        let pb = doc.world_position(b, n).unwrap();
        let cm = doc.world_position(system, n).unwrap();
        assert_abs_diff_eq!(cm.x, (pa.x + 3.0 * pb.x) / 4.0, epsilon = 1e-9);
        assert_abs_diff_eq!(cm.y, (pa.y + 3.0 * pb.y) / 4.0, epsilon = 1e-9);
    }
    // centre of mass drifts at constant velocity
    let v = doc.velocity(system, 10).unwrap();
    assert_abs_diff_eq!(v.y, (0.35 - 3.0 * 0.35) / 4.0, epsilon = 1e-6);
}

#[test]
fn system_rows_carry_the_relative_state() {
    let mut doc = Document::new(VideoClip::new(10, 0.05));
    let (_, _, system) = two_body(&mut doc, 1.0);
    doc.set_frame(9).unwrap();
    let rows = doc.data_table(system).unwrap();
    assert_eq!(rows.len(), 10);
    assert_abs_diff_eq!(rows[0].r_rel, 2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(rows[0].omega_rel, 0.35, epsilon = 1e-12);
    assert!(rows.iter().all(|r| r.r_rel.is_finite() && r.r_rel < 2.0 + 1e-9));
}

#[test]
fn members_forward_frame_range_to_their_system() {
    let mut doc = Document::new(VideoClip::new(20, 0.05));
    let (a, _, system) = two_body(&mut doc, 1.0);
    doc.set_frame(19).unwrap();
    doc.set_start_frame(a, 3).unwrap();
    assert_eq!(doc.model(system).unwrap().start_frame(), 3);
    assert!(doc.world_position(a, 2).is_none());
    assert!(doc.world_position(a, 3).is_some());

    doc.set_end_frame(a, 12).unwrap();
    assert_eq!(doc.model(system).unwrap().end_frame(), Some(12));
    assert_eq!(doc.model(system).unwrap().watermark(), Some(12));
    assert!(doc.world_position(a, 13).is_none());
}

#[test]
fn removing_a_member_lets_it_step_alone() {
    let mut doc = Document::new(VideoClip::new(20, 0.05));
    let (a, _, system) = two_body(&mut doc, 1.0);
    doc.set_frame(19).unwrap();
    doc.remove_particle(system, a).unwrap();

    assert_eq!(doc.model(system).unwrap().as_system().unwrap().members().len(), 1);
    assert!(doc.model(a).unwrap().system_id().is_none());
    // free again: straight line at vy = 0.35
    let p = doc.world_position(a, 19).unwrap();
    assert_abs_diff_eq!(p.y, 0.35 * 19.0 * 0.05, epsilon = 1e-9);
}

#[test]
fn membership_rules_are_enforced() {
    let mut doc = unit_clip(10);
    let (a, b, system) = two_body(&mut doc, 1.0);
    let c = doc.add_model("C", free_particle(0.0, 0.0));
    let line = doc.add_model("line", ParticleModel::analytic(Expr::zero(), Expr::zero()));
    let other = doc.add_model("other", ParticleModel::system(Expr::zero(), Expr::zero()));

    assert!(matches!(doc.add_particle(system, c), Err(ModelError::SystemFull(_))));
    assert!(matches!(doc.add_particle(other, line), Err(ModelError::NotADynamicParticle(_))));
    assert!(matches!(doc.add_particle(other, a), Err(ModelError::AlreadyMember { .. })));
    assert!(matches!(doc.add_particle(line, c), Err(ModelError::NotASystem(_))));
    assert!(matches!(doc.set_mass(system, 2.0), Err(ModelError::DerivedMass(_))));
    assert!(matches!(doc.set_mass(c, -1.0), Err(ModelError::InvalidMass(_))));
    assert!(matches!(doc.set_booster(a, Some(b)), Err(ModelError::BoostCycle(_))));
    assert!(matches!(doc.set_booster(c, Some(c)), Err(ModelError::BoostCycle(_))));
    assert!(matches!(
        doc.mark_step(c, 1, Point2::new(1.0, 1.0)),
        Err(ModelError::Locked(_))
    ));
}

#[test]
fn booster_supplies_initial_values() {
    let mut doc = unit_clip(10);
    let source = doc.add_model("source", free_particle(0.0, 2.0));
    let target = doc.add_model("target", free_particle(0.0, 0.0));
    doc.set_frame(9).unwrap();
    doc.set_start_frame(target, 3).unwrap();
    doc.set_booster(target, Some(source)).unwrap();

    let initial = *doc.model(target).unwrap().as_particle().unwrap().initial();
    assert_abs_diff_eq!(initial.x, 6.0, epsilon = 1e-9);
    assert_abs_diff_eq!(initial.vx, 2.0, epsilon = 1e-9);
    assert_abs_diff_eq!(doc.world_position(target, 9).unwrap().x, 18.0, epsilon = 1e-8);
}

#[test]
fn stamp_copies_steps_into_a_point_mass() {
    let mut doc = unit_clip(10);
    let id = doc.add_model("ball", free_particle(0.0, 1.0));
    doc.set_frame(4).unwrap();
    let stamp = doc.stamp(id).unwrap();
    assert_eq!(doc.track(stamp).unwrap().name(), "ball stamp");
    assert!(!doc.track(stamp).unwrap().is_model());
    assert_eq!(doc.image_position(stamp, 4), doc.image_position(id, 4));
}

// ==================================================================================
// Reference frames
// ==================================================================================

#[test]
fn origin_track_sits_at_zero_in_its_own_frame() {
    let mut doc = unit_clip(10);
    let a = doc.add_model("A", free_particle(0.0, 1.0));
    let b = doc.add_model("B", free_particle(2.0, 0.5));
    doc.set_reference_frame(a).unwrap();
    doc.set_frame(9).unwrap();

    for n in 0..=9 {
        assert_eq!(doc.world_position(a, n), Some(Point2::new(0.0, 0.0)));
        // B follows its own law in the moving frame and is drawn relative to A
        let world = doc.world_position(b, n).unwrap();
        assert_abs_diff_eq!(world.x, 2.0 + 0.5 * n as f64, epsilon = 1e-9);
        let image = doc.image_position(b, n).unwrap();
        assert_abs_diff_eq!(image.x, 2.0 + 1.5 * n as f64, epsilon = 1e-9);
    }
    assert_origin_at_rest(&doc, a, 9);
}

/// Velocity and acceleration of `origin` vanish wherever they are defined.
fn assert_origin_at_rest(doc: &Document, origin: TrackId, last: usize) {
    for n in 1..last {
        let v = doc.velocity(origin, n).unwrap();
        assert_abs_diff_eq!(v.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(v.y, 0.0, epsilon = 1e-12);
    }
    for n in 2..last - 1 {
        let a = doc.acceleration(origin, n).unwrap();
        assert_abs_diff_eq!(a.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(a.y, 0.0, epsilon = 1e-12);
    }
}

#[test]
fn origin_stepped_frame_by_frame_stays_at_rest() {
    let mut doc = unit_clip(10);
    let a = doc.add_model("A", free_particle(0.0, 1.0));
    doc.set_reference_frame(a).unwrap();
    for frame in 1..=9 {
        doc.set_frame(frame).unwrap();
    }

    for n in 0..=9 {
        assert_eq!(doc.world_position(a, n), Some(Point2::new(0.0, 0.0)));
    }
    assert_origin_at_rest(&doc, a, 9);
}

#[test]
fn system_origin_guards_its_members() {
    let mut doc = Document::new(VideoClip::new(10, 0.05));
    let (a, _, system) = two_body(&mut doc, 1.0);
    doc.set_reference_frame(system).unwrap();
    doc.set_frame(9).unwrap();

    assert_eq!(doc.origin_chain(), vec![system, a, a + 1]);
    assert_eq!(doc.world_position(system, 9), Some(Point2::new(0.0, 0.0)));
    // equal masses: A is half the separation from the centre of mass
    let pa = doc.world_position(a, 9).unwrap();
    let state = doc.system_state(system).unwrap();
    assert_abs_diff_eq!(pa.x, (state[0] - state[4]) / 2.0, epsilon = 1e-9);
}

#[test]
fn default_reference_frame_flag_ignores_the_origin() {
    let mut doc = unit_clip(10);
    let a = doc.add_model("A", free_particle(0.0, 1.0));
    let b = doc.add_model("B", free_particle(2.0, 0.0).with_default_reference_frame(true));
    doc.set_reference_frame(a).unwrap();
    doc.set_frame(5).unwrap();
    let image = doc.image_position(b, 5).unwrap();
    assert_abs_diff_eq!(image.x, 2.0, epsilon = 1e-9);
}

// ==================================================================================
// Trimming
// ==================================================================================

#[test]
fn trim_then_extend_restores_the_trace() {
    let mut doc = Document::new(VideoClip::new(20, 0.1));
    let spring = ParticleModel::dynamic(Expr::spring(4.0, 0, 0.0), Expr::zero(), InitialValues::new(1.0, 0.0, 0.0, 0.0));
    let id = doc.add_model("spring", spring);
    doc.set_frame(19).unwrap();
    let full = doc.trace(id).unwrap().clone();
    let v10 = doc.velocity(id, 10);

    doc.set_end_frame(id, 10).unwrap();
    let model = doc.model(id).unwrap();
    assert_eq!(model.end_frame(), Some(10));
    assert_eq!(model.watermark(), Some(10));
    let trimmed = doc.trace(id).unwrap();
    assert_eq!(trimmed.len(), 1 + 10 * 10);
    assert_eq!(trimmed.xs(), &full.xs()[..101]);
    assert!(doc.world_position(id, 11).is_none());
    assert!(doc.velocity(id, 10).is_none());

    doc.set_end_frame(id, 30).unwrap();
    assert_eq!(doc.model(id).unwrap().end_frame(), None);
    assert_eq!(doc.trace(id).unwrap(), &full);
    assert_eq!(doc.velocity(id, 10), v10);
}

#[test]
fn end_frame_before_start_is_clamped() {
    let mut doc = unit_clip(10);
    let id = doc.add_model("ball", free_particle(0.0, 1.0).with_start_frame(4));
    doc.set_frame(9).unwrap();
    doc.set_end_frame(id, 2).unwrap();
    let model = doc.model(id).unwrap();
    assert_eq!(model.end_frame(), Some(4));
    assert_eq!(model.watermark(), Some(4));
    assert_eq!(doc.trace(id).unwrap().len(), 1);
}

// ==================================================================================
// Persistence
// ==================================================================================

#[test]
fn saved_scenario_reloads_to_the_same_steps() {
    let mut doc = Document::load(include_str!("../scenarios/two_body.yaml")).unwrap();
    doc.set_frame(39).unwrap();
    let yaml = doc.save().unwrap();
    let reloaded = Document::load(&yaml).unwrap();

    assert_eq!(reloaded.frame(), 39);
    for (id, track) in doc.tracks().iter().enumerate() {
        assert_eq!(reloaded.tracks()[id].name(), track.name());
        let a = doc.world_position(id, 39).unwrap();
        let b = reloaded.world_position(id, 39).unwrap();
        assert_abs_diff_eq!(a.x, b.x, epsilon = 1e-12);
        assert_abs_diff_eq!(a.y, b.y, epsilon = 1e-12);
    }
    let ball = reloaded.track_id("ball").unwrap();
    assert_eq!(reloaded.model(ball).unwrap().start_frame(), 5);
    assert_abs_diff_eq!(reloaded.mass(ball), 0.5);
}

#[test]
fn unresolved_particles_wait_for_later_tracks() {
    let yaml = "
clip: { frame_count: 10, start_frame: 0, step_size: 1, step_count: 10, frame_duration: 0.1 }
frame: 9
tracks:
  - name: pair
    model:
      kind: system
      particles: [A, B]
      fr: { kind: constant, value: 0.0 }
      ftheta: { kind: constant, value: 0.0 }
  - name: A
    model:
      kind: dynamic
      fx: { kind: constant, value: 0.0 }
      fy: { kind: constant, value: 0.0 }
      initial: { vx: 1.0 }
";
    let mut doc = Document::load(yaml).unwrap();
    let system = doc.track_id("pair").unwrap();
    let a = doc.track_id("A").unwrap();
    let pending = doc.model(system).unwrap().as_system().unwrap();
    assert!(pending.members().is_empty());
    assert_eq!(pending.pending_names(), ["A", "B"]);
    // A steps on its own meanwhile
    assert!(doc.world_position(a, 9).is_some());
    assert!(doc.world_position(system, 0).is_none());

    let added = doc
        .load_tracks(
            "
- name: B
  model:
    kind: dynamic
    fx: { kind: constant, value: 0.0 }
    fy: { kind: constant, value: 0.0 }
    initial: { x: 1.0 }
",
        )
        .unwrap();
    let b = added[0];
    let members = doc.model(system).unwrap().as_system().unwrap().members().to_vec();
    assert_eq!(members, vec![a, b]);
    let cm = doc.world_position(system, 9).unwrap();
    assert_abs_diff_eq!(cm.x, (0.9 + 1.0) / 2.0, epsilon = 1e-9);
}

#[test]
fn point_mass_steps_survive_a_round_trip() {
    let mut doc = unit_clip(5);
    let id = doc.add_point_mass("hand");
    for n in 0..5 {
        doc.mark_step(id, n, Point2::new(n as f64 * 2.0, 1.0)).unwrap();
    }
    let reloaded = Document::load(&doc.save().unwrap()).unwrap();
    assert_eq!(reloaded.image_position(id, 3), Some(Point2::new(6.0, 1.0)));
    assert_abs_diff_eq!(reloaded.velocity(id, 2).unwrap().x, 2.0, epsilon = 1e-12);
}
