//! Error type shared by the document, the models and persistence.

use thiserror::Error;

use crate::document::TrackId;

/// Errors surfaced by document and model operations.
///
/// Numerical trouble inside the stepping loop is not an error: bad samples
/// are recorded as `NaN` and reported through [`crate::document::Notice`].
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("unknown track id {0}")]
    UnknownTrack(TrackId),

    #[error("track '{0}' is not a particle model")]
    NotAModel(String),

    #[error("track '{0}' is not a dynamic particle")]
    NotADynamicParticle(String),

    #[error("track '{0}' is not a dynamic system")]
    NotASystem(String),

    #[error("system '{0}' already has two particles")]
    SystemFull(String),

    #[error("particle '{particle}' already belongs to system '{system}'")]
    AlreadyMember { particle: String, system: String },

    #[error("particle '{0}' is boosted by another member of the system")]
    BoostCycle(String),

    #[error("steps of '{0}' are locked")]
    Locked(String),

    #[error("mass of system '{0}' is the sum of its particles")]
    DerivedMass(String),

    #[error("mass must be positive and finite, got {0}")]
    InvalidMass(f64),

    #[error("frame {frame} is outside the clip (last frame {last})")]
    FrameOutOfRange { frame: usize, last: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown model id '{0}'")]
    UnknownModelKind(String),

    #[error("function '{0}' is native code and cannot be saved")]
    UnsavableFunction(String),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelError {
    pub fn config(message: impl Into<String>) -> Self {
        ModelError::Config(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
