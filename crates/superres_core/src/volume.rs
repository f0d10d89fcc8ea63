use ndarray::{s, Array3, Axis};
use tracing::{info, warn};

use crate::augment::rotate_and_mirror;
use crate::config::BatchMakerConfig;
use crate::encoding::{one_hot_encode, LabelVolume, OneHotVolume, PhaseSet};
use crate::error::{Result, SuperResError};
use crate::loader::load_label_volume;

/// Dimension labels of the spatial axes, used in diagnostics.
pub const AXIS_LABELS: [&str; 3] = ["x", "y", "z"];

/// One-hot encoded training volume.
///
/// Built once (load, augment, crop, encode) and read-only afterwards, so it
/// can be shared between any number of batch makers.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeStore {
    /// Channel-first encoded data
    encoded: OneHotVolume,
    /// Phase ids in channel order (before squashing)
    phases: PhaseSet,
    /// Number of spatial axes of the source image (2 or 3)
    image_dims: usize,
    /// Edge length of sampled high resolution patches
    high_l: usize,
}

impl VolumeStore {
    /// Read the volume at `config.path` and prepare it for sampling.
    pub fn initialize(config: &BatchMakerConfig) -> Result<Self> {
        config.validate()?;
        let labels = load_label_volume(&config.path)?;
        let store = Self::from_labels(labels, config)?;
        info!(
            path = %config.path.display(),
            shape = ?store.encoded.shape(),
            phases = ?store.phases.ids(),
            high_l = store.high_l,
            "volume store ready"
        );
        Ok(store)
    }

    /// Prepare an in-memory label volume for sampling.
    pub fn from_labels(labels: LabelVolume, config: &BatchMakerConfig) -> Result<Self> {
        config.validate()?;

        let labels = if config.rot_and_mir {
            augment_labels(labels)?
        } else {
            labels
        };

        // Phases are collected before cropping so that every phase of the
        // original volume owns a channel.
        let phases = match &config.phases {
            Some(hint) => PhaseSet::from_hint(hint, &labels)?,
            None => PhaseSet::from_labels(&labels),
        };
        if config.squash && phases.len() < 2 {
            return Err(SuperResError::config(format!(
                "squash needs a pore and at least one material phase, found {:?}",
                phases.ids()
            )));
        }

        let labels = if config.crop {
            crop_labels(labels, config.crop_margin)?
        } else {
            labels
        };
        let image_dims = labels.ndim();
        if config.dims == 3 && image_dims != 3 {
            return Err(SuperResError::config(
                "3D batches need a 3D volume, but the input is a single 2D image",
            ));
        }

        let encoded = one_hot_encode(&labels, &phases, config.squash)?;
        let store = Self {
            encoded,
            phases,
            image_dims,
            high_l: config.high_l(),
        };
        store.check_patch_fits(config.stack && config.dims == 2)?;
        Ok(store)
    }

    /// Fail when a patch of `high_l` does not fit every axis that gets windowed.
    fn check_patch_fits(&self, planar_stack: bool) -> Result<()> {
        let spatial = self.spatial_shape();
        let first_windowed = if self.image_dims == 3 && planar_stack {
            1
        } else {
            0
        };
        for (axis, &extent) in spatial.iter().enumerate().skip(first_windowed) {
            if self.high_l > extent {
                return Err(SuperResError::config(format!(
                    "patch length {} exceeds extent {} of axis {} ({}) in volume of shape {:?}",
                    self.high_l, extent, axis, AXIS_LABELS[axis], spatial
                )));
            }
        }
        Ok(())
    }

    pub fn encoded(&self) -> &OneHotVolume {
        &self.encoded
    }

    pub fn phases(&self) -> &PhaseSet {
        &self.phases
    }

    /// Number of one-hot channels (2 when squashed).
    pub fn channels(&self) -> usize {
        self.encoded.channels()
    }

    /// Spatial extents after augmentation and cropping.
    pub fn spatial_shape(&self) -> &[usize] {
        self.encoded.spatial_shape()
    }

    /// Dimensionality of the source image (2 or 3).
    pub fn image_dims(&self) -> usize {
        self.image_dims
    }

    pub fn high_l(&self) -> usize {
        self.high_l
    }
}

/// Expand the labels with all rotations and mirrors of their slices.
///
/// A single image is treated as a one-slice stack, so the result is always a
/// stack.
fn augment_labels(labels: LabelVolume) -> Result<LabelVolume> {
    let stack: Array3<_> = match labels {
        LabelVolume::Image(img) => img.insert_axis(Axis(0)),
        LabelVolume::Volume(vol) => vol,
    };
    Ok(LabelVolume::Volume(rotate_and_mirror(stack.view())?))
}

fn crop_bounds(extent: usize, margin: usize, axis: usize) -> Result<(usize, usize)> {
    if extent <= 2 * margin {
        return Err(SuperResError::config(format!(
            "cannot crop {} voxels from both ends of axis {} with extent {}",
            margin, axis, extent
        )));
    }
    if 4 * margin > extent {
        warn!(axis, extent, margin, "cropping removes more than half of the axis");
    }
    Ok((margin, extent - margin))
}

/// Trim `margin` voxels from both ends of every axis.
fn crop_labels(labels: LabelVolume, margin: usize) -> Result<LabelVolume> {
    match labels {
        LabelVolume::Image(img) => {
            let (h0, h1) = crop_bounds(img.len_of(Axis(0)), margin, 0)?;
            let (w0, w1) = crop_bounds(img.len_of(Axis(1)), margin, 1)?;
            Ok(LabelVolume::Image(img.slice(s![h0..h1, w0..w1]).to_owned()))
        }
        LabelVolume::Volume(vol) => {
            let (d0, d1) = crop_bounds(vol.len_of(Axis(0)), margin, 0)?;
            let (h0, h1) = crop_bounds(vol.len_of(Axis(1)), margin, 1)?;
            let (w0, w1) = crop_bounds(vol.len_of(Axis(2)), margin, 2)?;
            Ok(LabelVolume::Volume(
                vol.slice(s![d0..d1, h0..h1, w0..w1]).to_owned(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::channel_sum;
    use ndarray::Array2;
    use rand::prelude::*;

    fn random_volume(shape: (usize, usize, usize), num_phases: u32, seed: u64) -> LabelVolume {
        let mut rng = StdRng::seed_from_u64(seed);
        LabelVolume::Volume(Array3::from_shape_fn(shape, |_| rng.gen_range(0..num_phases)))
    }

    fn plain_config(high_res_len: usize) -> BatchMakerConfig {
        BatchMakerConfig {
            high_res_len,
            rot_and_mir: false,
            stack: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_store_shape_and_channels() {
        let store = VolumeStore::from_labels(random_volume((20, 20, 20), 3, 1), &plain_config(8))
            .unwrap();
        assert_eq!(store.channels(), 3);
        assert_eq!(store.spatial_shape(), &[20, 20, 20]);
        assert_eq!(store.image_dims(), 3);
        assert_eq!(store.high_l(), 8);
        assert!(channel_sum(store.encoded()).iter().all(|&s| s == 1));
    }

    #[test]
    fn test_augmentation_multiplies_slice_count() {
        let config = BatchMakerConfig {
            rot_and_mir: true,
            ..plain_config(8)
        };
        let store = VolumeStore::from_labels(random_volume((3, 10, 10), 2, 2), &config).unwrap();
        assert_eq!(store.spatial_shape(), &[24, 10, 10]);
    }

    #[test]
    fn test_augmenting_an_image_yields_a_stack() {
        let config = BatchMakerConfig {
            rot_and_mir: true,
            dims: 2,
            stack: true,
            high_res_len: 4,
            ..Default::default()
        };
        let image = LabelVolume::Image(Array2::from_shape_fn((9, 9), |(r, c)| ((r + c) % 2) as u32));
        let store = VolumeStore::from_labels(image, &config).unwrap();
        assert_eq!(store.spatial_shape(), &[8, 9, 9]);
        assert_eq!(store.image_dims(), 3);
    }

    #[test]
    fn test_crop_trims_every_axis() {
        let config = BatchMakerConfig {
            crop: true,
            ..plain_config(8)
        };
        let store = VolumeStore::from_labels(random_volume((20, 18, 16), 3, 3), &config).unwrap();
        assert_eq!(store.spatial_shape(), &[12, 10, 8]);
    }

    #[test]
    fn test_phases_are_collected_before_cropping() {
        let mut labels = Array3::<u32>::zeros((12, 12, 12));
        labels[[0, 0, 0]] = 5;
        labels[[6, 6, 6]] = 1;
        let config = BatchMakerConfig {
            crop: true,
            ..plain_config(4)
        };
        let store = VolumeStore::from_labels(LabelVolume::Volume(labels), &config).unwrap();
        assert_eq!(store.phases().ids(), &[0, 1, 5]);
        assert_eq!(store.channels(), 3);
    }

    #[test]
    fn test_crop_larger_than_volume_rejected() {
        let config = BatchMakerConfig {
            crop: true,
            ..plain_config(1)
        };
        let err = VolumeStore::from_labels(random_volume((8, 20, 20), 2, 4), &config).unwrap_err();
        assert!(matches!(err, SuperResError::Configuration(_)));
    }

    #[test]
    fn test_patch_equal_to_extent_is_accepted() {
        let store = VolumeStore::from_labels(random_volume((8, 8, 8), 2, 5), &plain_config(8));
        assert!(store.is_ok());
    }

    #[test]
    fn test_patch_longer_than_extent_rejected() {
        let err = VolumeStore::from_labels(random_volume((9, 8, 9), 2, 6), &plain_config(9))
            .unwrap_err();
        assert!(matches!(err, SuperResError::Configuration(msg) if msg.contains("axis 1")));
    }

    #[test]
    fn test_stack_depth_is_not_windowed_for_2d() {
        let config = BatchMakerConfig {
            dims: 2,
            stack: true,
            ..plain_config(4)
        };
        // high_l doubles to 8 for 2D; only 2 slices but 8x8 in plane.
        let store = VolumeStore::from_labels(random_volume((2, 8, 8), 2, 7), &config).unwrap();
        assert_eq!(store.high_l(), 8);
    }

    #[test]
    fn test_3d_batches_need_3d_volume() {
        let config = BatchMakerConfig {
            dims: 3,
            ..plain_config(2)
        };
        let image = LabelVolume::Image(Array2::zeros((8, 8)));
        assert!(VolumeStore::from_labels(image, &config).is_err());
    }

    #[test]
    fn test_squash_needs_two_phases() {
        let config = BatchMakerConfig {
            squash: true,
            ..plain_config(2)
        };
        let uniform = LabelVolume::Volume(Array3::zeros((4, 4, 4)));
        assert!(VolumeStore::from_labels(uniform, &config).is_err());
    }

    #[test]
    fn test_same_labels_give_identical_stores() {
        let labels = random_volume((10, 12, 14), 4, 8);
        let a = VolumeStore::from_labels(labels.clone(), &plain_config(6)).unwrap();
        let b = VolumeStore::from_labels(labels, &plain_config(6)).unwrap();
        assert_eq!(a, b);
    }
}
