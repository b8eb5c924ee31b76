//! World <-> image coordinate transforms.
//!
//! A [`CoordSystem`] maps model ("world") positions to image positions frame by
//! frame. It may carry a [`ReferenceFrame`], in which case the origin follows a
//! track: the origin of frame `n` is that track's image position at `n`.

use std::collections::BTreeMap;

use nalgebra::{Matrix3, Point2, Rotation2, Vector2};
use serde::{Deserialize, Serialize};

use crate::document::TrackId;

/// Transform collaborator used by the stepper.
pub trait ImageTransform {
    /// Homogeneous world-to-image matrix valid at `frame`.
    fn image_transform(&self, frame: usize) -> Matrix3<f64>;
    fn to_image(&self, frame: usize, world: &Point2<f64>) -> Point2<f64>;
    fn to_world(&self, frame: usize, image: &Point2<f64>) -> Point2<f64>;
    /// Track whose position is used as a moving origin, if any.
    fn origin_track(&self) -> Option<TrackId>;
}

/// Origin, rotation and scale of the world axes in image space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordFrame {
    pub origin: [f64; 2],
    /// Angle of the world x axis, radians counter-clockwise.
    #[serde(default)]
    pub angle: f64,
    /// Image units per world unit. A negative `scale_y` flips the y axis.
    pub scale_x: f64,
    pub scale_y: f64,
}

impl Default for CoordFrame {
    fn default() -> Self {
        Self { origin: [0.0, 0.0], angle: 0.0, scale_x: 1.0, scale_y: 1.0 }
    }
}

impl CoordFrame {
    fn with_origin(mut self, origin: Point2<f64>) -> Self {
        self.origin = [origin.x, origin.y];
        self
    }

    fn origin(&self) -> Vector2<f64> {
        Vector2::new(self.origin[0], self.origin[1])
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        let (sin, cos) = self.angle.sin_cos();
        Matrix3::new(
            cos * self.scale_x, -sin * self.scale_y, self.origin[0],
            sin * self.scale_x, cos * self.scale_y, self.origin[1],
            0.0, 0.0, 1.0,
        )
    }

    pub fn to_image(&self, world: &Point2<f64>) -> Point2<f64> {
        let scaled = Vector2::new(world.x * self.scale_x, world.y * self.scale_y);
        Point2::from(Rotation2::new(self.angle) * scaled + self.origin())
    }

    // Translate first so that the origin itself maps to exactly (0, 0).
    pub fn to_world(&self, image: &Point2<f64>) -> Point2<f64> {
        let local = Rotation2::new(-self.angle) * (image.coords - self.origin());
        Point2::new(local.x / self.scale_x, local.y / self.scale_y)
    }
}

/// Fixed coordinates with optional per-frame overrides.
///
/// The frame in force at `n` is the override at the greatest key `<= n`, or
/// the default frame when there is none.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageCoords {
    #[serde(default)]
    pub default: CoordFrame,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keyed: BTreeMap<usize, CoordFrame>,
}

impl ImageCoords {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn fixed(frame: CoordFrame) -> Self {
        Self { default: frame, keyed: BTreeMap::new() }
    }

    pub fn set_frame_at(&mut self, frame: usize, coords: CoordFrame) {
        self.keyed.insert(frame, coords);
    }

    pub fn frame_at(&self, frame: usize) -> CoordFrame {
        self.keyed
            .range(..=frame)
            .next_back()
            .map(|(_, f)| *f)
            .unwrap_or(self.default)
    }

    pub fn is_fixed(&self) -> bool {
        self.keyed.is_empty()
    }
}

/// Coordinates whose origin follows a track.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceFrame {
    origin_track: TrackId,
    origins: Vec<Option<Point2<f64>>>,
}

impl ReferenceFrame {
    pub fn new(origin_track: TrackId) -> Self {
        Self { origin_track, origins: Vec::new() }
    }

    pub fn origin_track(&self) -> TrackId {
        self.origin_track
    }

    /// Replaces the per-frame origins with the given image positions.
    /// Frames without a valid position fall back to the underlying origin.
    pub fn set_origins<I>(&mut self, positions: I)
    where
        I: IntoIterator<Item = Option<Point2<f64>>>,
    {
        self.origins = positions
            .into_iter()
            .map(|p| p.filter(|p| p.x.is_finite() && p.y.is_finite()))
            .collect();
    }

    fn origin_at(&self, frame: usize) -> Option<Point2<f64>> {
        self.origins.get(frame).copied().flatten()
    }
}

/// The document's active coordinate system.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordSystem {
    base: ImageCoords,
    reference: Option<ReferenceFrame>,
}

impl CoordSystem {
    pub fn new(base: ImageCoords) -> Self {
        Self { base, reference: None }
    }

    pub fn base(&self) -> &ImageCoords {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut ImageCoords {
        &mut self.base
    }

    pub fn reference(&self) -> Option<&ReferenceFrame> {
        self.reference.as_ref()
    }

    pub fn reference_mut(&mut self) -> Option<&mut ReferenceFrame> {
        self.reference.as_mut()
    }

    pub fn set_reference(&mut self, reference: Option<ReferenceFrame>) {
        self.reference = reference;
    }

    /// The same coordinates with any reference frame stripped.
    pub fn underlying(&self) -> CoordSystem {
        CoordSystem::new(self.base.clone())
    }

    fn frame_at(&self, frame: usize) -> CoordFrame {
        let coords = self.base.frame_at(frame);
        match self.reference.as_ref().and_then(|r| r.origin_at(frame)) {
            Some(origin) => coords.with_origin(origin),
            None => coords,
        }
    }
}

impl ImageTransform for CoordSystem {
    fn image_transform(&self, frame: usize) -> Matrix3<f64> {
        self.frame_at(frame).matrix()
    }

    fn to_image(&self, frame: usize, world: &Point2<f64>) -> Point2<f64> {
        self.frame_at(frame).to_image(world)
    }

    fn to_world(&self, frame: usize, image: &Point2<f64>) -> Point2<f64> {
        self.frame_at(frame).to_world(image)
    }

    fn origin_track(&self) -> Option<TrackId> {
        self.reference.as_ref().map(ReferenceFrame::origin_track)
    }
}
