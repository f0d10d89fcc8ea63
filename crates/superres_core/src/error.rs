//! Error types shared by every stage of batch preparation.

use thiserror::Error;

use crate::loader::VolumeLoadError;

/// Errors raised while building a volume store or assembling batches.
#[derive(Error, Debug)]
pub enum SuperResError {
    /// Patch size, scale factor, dimensionality or channel selection is
    /// inconsistent with the loaded volume.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A random window would need an empty range of start positions.
    #[error(
        "sampling range error: axis {axis} has extent {extent}, shorter than patch length {patch_len}"
    )]
    SamplingRange {
        axis: usize,
        extent: usize,
        patch_len: usize,
    },

    /// The input volume could not be read.
    #[error(transparent)]
    Load(#[from] VolumeLoadError),
}

impl SuperResError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SuperResError>;
