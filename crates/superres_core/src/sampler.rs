//! Random patch extraction from a [`VolumeStore`].
//!
//! ## Modes
//!
//! - **Volume3D**: random cube, spatial axes permuted so that `axis` becomes the
//!   primary viewing axis.
//! - **Stack2D**: random window inside one random slice of a stack.
//! - **Slice2D**: random window on a random cut of a true 3D volume, cut
//!   perpendicular to `axis`.
//! - **Plane2D**: random window of a single 2D image.

use ndarray::{s, Array3, Array4, ArrayD, ArrayView3, ArrayView4};
use rand::Rng;

use crate::encoding::OneHotVolume;
use crate::error::{Result, SuperResError};
use crate::float_trait::BatchFloat;
use crate::volume::VolumeStore;

/// Spatial axis order (1-indexed, channel axis is 0) of a cube for each
/// viewing axis: x keeps the cube, y swaps the first two axes, z rolls the
/// last axis to the front.
pub const PERMS: [[usize; 3]; 3] = [[1, 2, 3], [2, 1, 3], [3, 1, 2]];

/// A freshly allocated training sample, channel axis first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch {
    /// Shape [channels, high_l, high_l].
    Planar(Array3<u8>),
    /// Shape [channels, high_l, high_l, high_l].
    Volumetric(Array4<u8>),
}

impl Patch {
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Planar(p) => p.shape(),
            Self::Volumetric(p) => p.shape(),
        }
    }

    /// Occupancy values converted to `F`, dimensionality erased.
    pub fn to_float<F: BatchFloat>(&self) -> ArrayD<F> {
        match self {
            Self::Planar(p) => p.mapv(F::from_occupancy).into_dyn(),
            Self::Volumetric(p) => p.mapv(F::from_occupancy).into_dyn(),
        }
    }
}

/// Sampling strategy, fixed once when the batch maker is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerMode {
    /// 3D cubes from a 3D volume or stack.
    Volume3D,
    /// 2D windows from one slice of a stack.
    Stack2D,
    /// 2D windows from a cut through a true 3D volume.
    Slice2D,
    /// 2D windows from a single 2D image.
    Plane2D,
}

impl SamplerMode {
    /// Strategy used for 2D batches.
    pub fn planar(volume: &VolumeStore, stack: bool) -> Self {
        if volume.image_dims() == 2 {
            Self::Plane2D
        } else if stack {
            Self::Stack2D
        } else {
            Self::Slice2D
        }
    }

    /// Strategy used for 3D batches.
    pub fn volumetric(volume: &VolumeStore) -> Result<Self> {
        if volume.image_dims() == 3 {
            Ok(Self::Volume3D)
        } else {
            Err(SuperResError::config(
                "3D patches cannot be sampled from a 2D image",
            ))
        }
    }

    /// Number of spatial axes of the patches this mode produces.
    pub fn spatial_dims(&self) -> usize {
        match self {
            Self::Volume3D => 3,
            Self::Stack2D | Self::Slice2D | Self::Plane2D => 2,
        }
    }

    /// Draw one patch of edge `volume.high_l()` viewed along `axis`.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        volume: &VolumeStore,
        axis: usize,
        rng: &mut R,
    ) -> Result<Patch> {
        if axis > 2 {
            return Err(SuperResError::config(format!(
                "axis must be 0, 1 or 2, got {}",
                axis
            )));
        }
        let len = volume.high_l();

        match (self, volume.encoded()) {
            (Self::Volume3D, OneHotVolume::Volume(vol)) => {
                let (_, d, h, w) = vol.dim();
                let start = [
                    random_start(rng, d, len, 0)?,
                    random_start(rng, h, len, 1)?,
                    random_start(rng, w, len, 2)?,
                ];
                Ok(Patch::Volumetric(extract_cube(vol.view(), start, len, axis)))
            }
            (Self::Stack2D, OneHotVolume::Volume(vol)) => {
                let (_, n, h, w) = vol.dim();
                let slice = random_index(rng, n, 0)?;
                let start = [random_start(rng, h, len, 1)?, random_start(rng, w, len, 2)?];
                Ok(Patch::Planar(extract_stack_slice(vol.view(), slice, start, len)))
            }
            (Self::Slice2D, OneHotVolume::Volume(vol)) => {
                let extents = &vol.shape()[1..];
                let free: Vec<usize> = (0..3).filter(|&a| a != axis).collect();
                let index = random_index(rng, extents[axis], axis)?;
                let start = [
                    random_start(rng, extents[free[0]], len, free[0])?,
                    random_start(rng, extents[free[1]], len, free[1])?,
                ];
                Ok(Patch::Planar(extract_cut(vol.view(), axis, index, start, len)))
            }
            (Self::Plane2D, OneHotVolume::Image(img)) => {
                let (_, h, w) = img.dim();
                let start = [random_start(rng, h, len, 0)?, random_start(rng, w, len, 1)?];
                Ok(Patch::Planar(extract_window(img.view(), start, len)))
            }
            (mode, encoded) => Err(SuperResError::config(format!(
                "{:?} sampling does not apply to a volume of shape {:?}",
                mode,
                encoded.shape()
            ))),
        }
    }
}

/// Uniform start in `0..=extent - len`.
fn random_start<R: Rng + ?Sized>(rng: &mut R, extent: usize, len: usize, axis: usize) -> Result<usize> {
    if len > extent {
        return Err(SuperResError::SamplingRange {
            axis,
            extent,
            patch_len: len,
        });
    }
    Ok(rng.gen_range(0..=extent - len))
}

/// Uniform index in `0..extent`.
fn random_index<R: Rng + ?Sized>(rng: &mut R, extent: usize, axis: usize) -> Result<usize> {
    if extent == 0 {
        return Err(SuperResError::SamplingRange {
            axis,
            extent,
            patch_len: 1,
        });
    }
    Ok(rng.gen_range(0..extent))
}

/// Cube of edge `len` at `start`, spatial axes reordered by [`PERMS`]`[axis]`.
pub fn extract_cube<T: Clone>(
    vol: ArrayView4<'_, T>,
    start: [usize; 3],
    len: usize,
    axis: usize,
) -> Array4<T> {
    let [x, y, z] = start;
    let perm = PERMS[axis];
    vol.slice(s![.., x..x + len, y..y + len, z..z + len])
        .permuted_axes([0, perm[0], perm[1], perm[2]])
        .as_standard_layout()
        .into_owned()
}

/// Window of slice `slice` of a channel-first stack.
pub fn extract_stack_slice<T: Clone>(
    vol: ArrayView4<'_, T>,
    slice: usize,
    start: [usize; 2],
    len: usize,
) -> Array3<T> {
    let [h, w] = start;
    vol.slice(s![.., slice, h..h + len, w..w + len]).to_owned()
}

/// Window on the cut `index` perpendicular to `axis`; the two free axes keep
/// their source order.
pub fn extract_cut<T: Clone>(
    vol: ArrayView4<'_, T>,
    axis: usize,
    index: usize,
    start: [usize; 2],
    len: usize,
) -> Array3<T> {
    let [a, b] = start;
    match axis {
        0 => vol.slice(s![.., index, a..a + len, b..b + len]).to_owned(),
        1 => vol.slice(s![.., a..a + len, index, b..b + len]).to_owned(),
        _ => vol.slice(s![.., a..a + len, b..b + len, index]).to_owned(),
    }
}

/// Square window of a channel-first 2D image.
pub fn extract_window<T: Clone>(img: ArrayView3<'_, T>, start: [usize; 2], len: usize) -> Array3<T> {
    let [h, w] = start;
    img.slice(s![.., h..h + len, w..w + len]).to_owned()
}
