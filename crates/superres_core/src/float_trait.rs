//! Float trait abstraction for f32/f64 batches.
//!
//! Batches are produced in either precision; this trait gathers the bounds
//! the sampler and the downsampler need from the element type.

use num_traits::{Float, FromPrimitive, NumAssign};
use rand::distributions::uniform::SampleUniform;
use std::fmt::Debug;
use std::iter::Sum;

/// Floating point element type of a training batch.
///
/// Combines:
/// - Basic float operations (Float, NumAssign)
/// - Uniform sampling for the tie-breaking noise (SampleUniform)
/// - Conversion from primitive types (FromPrimitive)
/// - Iteration support (Sum)
pub trait BatchFloat:
    Float + FromPrimitive + NumAssign + SampleUniform + Sum + Debug + Send + Sync + 'static
{
    /// Binarization threshold applied after pooling.
    const HALF: Self;

    /// Half-width of the uniform tie-breaking noise.
    const TIE_NOISE: Self;

    /// Convert a one-hot occupancy byte.
    fn from_occupancy(val: u8) -> Self;
}

impl BatchFloat for f32 {
    const HALF: Self = 0.5;
    const TIE_NOISE: Self = 0.005;

    #[inline]
    fn from_occupancy(val: u8) -> Self {
        val as f32
    }
}

impl BatchFloat for f64 {
    const HALF: Self = 0.5;
    const TIE_NOISE: Self = 0.005;

    #[inline]
    fn from_occupancy(val: u8) -> Self {
        val as f64
    }
}
