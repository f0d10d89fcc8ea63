//! Super-Resolution Batch Core Library
//!
//! Training batch preparation for super-resolution generators on segmented
//! micrographs: reads a labelled TIFF volume, expands it with the symmetries
//! of the square, one-hot encodes the phases and samples random 2D/3D patches,
//! optionally downsampled to their low resolution counterpart.
//! This crate contains all sampling logic without Python bindings.

pub mod augment;
pub mod batch;
pub mod config;
pub mod downsample;
pub mod encoding;
pub mod error;
pub mod float_trait;
pub mod loader;
pub mod sampler;
pub mod volume;

// Re-export commonly used types at the crate root
pub use augment::rotate_and_mirror;
pub use batch::{Batch, BatchMaker};
pub use config::{BatchMakerConfig, Device, CROP, HIGH_L_3D};
pub use downsample::downsample;
pub use encoding::{one_hot_encode, LabelVolume, OneHotVolume, PhaseId, PhaseSet};
pub use error::{Result, SuperResError};
pub use float_trait::BatchFloat;
pub use loader::{load_label_volume, VolumeLoadError};
pub use sampler::{Patch, SamplerMode, PERMS};
pub use volume::VolumeStore;
