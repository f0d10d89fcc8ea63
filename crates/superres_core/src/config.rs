//! Batch maker configuration.
//!
//! All parameters have defaults matching the super-resolution training setup
//! (3D generator, stacked input, scale factor 4). Use `Default::default()`
//! and override the fields that differ; every path is taken as given, the
//! process working directory is never consulted.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::encoding::PhaseId;
use crate::error::{Result, SuperResError};

// =============================================================================
// Constants
// =============================================================================

/// Voxels trimmed from each end of every axis when cropping is enabled.
pub const CROP: usize = 4;

/// Edge length of a high resolution 3D training cube.
pub const HIGH_L_3D: usize = 64;

/// Default scale factor between low and high resolution.
const DEFAULT_SCALE_FACTOR: usize = 4;

/// Default generator dimensionality.
const DEFAULT_DIMS: usize = 3;

// =============================================================================
// Types
// =============================================================================

/// Compute target a batch is destined for.
///
/// The sampler never schedules work on it; the tag travels with every batch so
/// the consumer can move the data accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    /// Accelerator with the given ordinal, e.g. `cuda:1`.
    Cuda(usize),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(ordinal) => write!(f, "cuda:{}", ordinal),
        }
    }
}

impl FromStr for Device {
    type Err = SuperResError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        if s == "cpu" {
            return Ok(Self::Cpu);
        }
        if s == "cuda" {
            return Ok(Self::Cuda(0));
        }
        if let Some(ordinal) = s.strip_prefix("cuda:") {
            return ordinal
                .parse::<usize>()
                .map(Self::Cuda)
                .map_err(|_| SuperResError::config(format!("invalid device ordinal in '{}'", s)));
        }
        Err(SuperResError::config(format!("unknown device '{}'", s)))
    }
}

/// Configuration of a [`crate::BatchMaker`] and its [`crate::VolumeStore`].
#[derive(Debug, Clone)]
pub struct BatchMakerConfig {
    /// Segmented multi-page TIFF to sample from.
    pub path: PathBuf,
    /// Compute target attached to every batch. Default: Cpu
    pub device: Device,
    /// Ratio between high and low resolution edge lengths. Default: 4
    pub scale_factor: usize,
    /// Generator dimensionality, 2 or 3. Default: 3
    pub dims: usize,
    /// Treat the volume as a stack of independent 2D slices. Default: true
    pub stack: bool,
    /// Trim `crop_margin` voxels from every edge. Default: false
    pub crop: bool,
    /// Margin used when `crop` is set. Default: 4
    pub crop_margin: usize,
    /// Return low resolution batches from the batch calls. Default: false
    pub down_sample: bool,
    /// Sample patches already at low resolution size. Default: false
    pub low_res: bool,
    /// Expand the stack with its 8 rotations and mirrors. Default: true
    pub rot_and_mir: bool,
    /// Collapse every non-pore phase into one material channel. Default: false
    pub squash: bool,
    /// Channels pooled by the downsampler; `None` selects every channel but
    /// the pore channel. Default: None
    pub to_low_idx: Option<Vec<usize>>,
    /// Phase ids to encode instead of the ones found in the volume. Default: None
    pub phases: Option<Vec<PhaseId>>,
    /// Base edge length of high resolution patches. Default: 64
    pub high_res_len: usize,
    /// Seed of the batch random stream; `None` seeds from entropy. Default: None
    pub seed: Option<u64>,
}

impl Default for BatchMakerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            device: Device::Cpu,
            scale_factor: DEFAULT_SCALE_FACTOR,
            dims: DEFAULT_DIMS,
            stack: true,
            crop: false,
            crop_margin: CROP,
            down_sample: false,
            low_res: false,
            rot_and_mir: true,
            squash: false,
            to_low_idx: None,
            phases: None,
            high_res_len: HIGH_L_3D,
            seed: None,
        }
    }
}

impl BatchMakerConfig {
    /// Create a configuration for `path` with default values.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Edge length of sampled high resolution patches.
    ///
    /// `low_res` divides the base length by the scale factor; 2D generators
    /// double it.
    pub fn high_l(&self) -> usize {
        let mut high_l = self.high_res_len;
        if self.low_res && self.scale_factor > 0 {
            high_l /= self.scale_factor;
        }
        if self.dims == 2 {
            high_l *= 2;
        }
        high_l
    }

    /// Validate the parameters that do not depend on the volume.
    pub fn validate(&self) -> Result<()> {
        if self.scale_factor == 0 {
            return Err(SuperResError::config("scale_factor must be > 0"));
        }
        if self.dims != 2 && self.dims != 3 {
            return Err(SuperResError::config(format!(
                "dims must be 2 or 3, got {}",
                self.dims
            )));
        }
        if self.high_res_len == 0 {
            return Err(SuperResError::config("high_res_len must be > 0"));
        }
        let high_l = self.high_l();
        if high_l == 0 {
            return Err(SuperResError::config(format!(
                "patch length is zero: high_res_len {} with scale_factor {}",
                self.high_res_len, self.scale_factor
            )));
        }
        if self.down_sample && high_l % self.scale_factor != 0 {
            return Err(SuperResError::config(format!(
                "patch length {} is not divisible by scale_factor {}",
                high_l, self.scale_factor
            )));
        }
        if self.crop && self.crop_margin == 0 {
            return Err(SuperResError::config("crop_margin must be > 0 when crop is set"));
        }
        if let Some(idx) = &self.to_low_idx {
            if idx.is_empty() {
                return Err(SuperResError::config("to_low_idx must not be empty"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BatchMakerConfig::new("/data/volume.tif");
        assert!(config.validate().is_ok());
        assert_eq!(config.high_l(), HIGH_L_3D);
        assert_eq!(config.crop_margin, CROP);
        assert!(config.rot_and_mir);
    }

    #[test]
    fn test_high_l_low_res_and_2d() {
        let mut config = BatchMakerConfig::default();
        config.low_res = true;
        assert_eq!(config.high_l(), 16);
        config.dims = 2;
        assert_eq!(config.high_l(), 32);
        config.low_res = false;
        assert_eq!(config.high_l(), 128);
    }

    #[test]
    fn test_invalid_dims_rejected() {
        let config = BatchMakerConfig {
            dims: 4,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SuperResError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_scale_factor_rejected() {
        let config = BatchMakerConfig {
            scale_factor: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_indivisible_patch_rejected_when_downsampling() {
        let config = BatchMakerConfig {
            high_res_len: 10,
            scale_factor: 4,
            down_sample: true,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BatchMakerConfig {
            down_sample: false,
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_low_res_collapsing_patch_rejected() {
        let config = BatchMakerConfig {
            high_res_len: 3,
            scale_factor: 4,
            low_res: true,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_device_round_trip() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("CUDA:2".parse::<Device>().unwrap(), Device::Cuda(2));
        assert_eq!("cuda".parse::<Device>().unwrap(), Device::Cuda(0));
        assert_eq!(Device::Cuda(3).to_string(), "cuda:3");
        assert!("tpu".parse::<Device>().is_err());
        assert!("cuda:x".parse::<Device>().is_err());
    }
}
