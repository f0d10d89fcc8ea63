//! Low resolution counterpart of a high resolution one-hot batch.
//!
//! 1. Select the material channels (optionally squashed into one).
//! 2. Mean-pool every `scale_factor^dims` spatial block.
//! 3. Add uniform noise in `[-TIE_NOISE, TIE_NOISE)` so blocks sitting exactly
//!    on the 0.5 threshold do not always resolve the same way.
//! 4. Threshold at 0.5.
//! 5. Rebuild the pore channel as the complement of the material channels and
//!    put it first.

use ndarray::{concatenate, ArrayD, ArrayViewD, Axis, Zip};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::error::{Result, SuperResError};
use crate::float_trait::BatchFloat;

/// Material channels used when no explicit selection is given: every channel
/// except the pore channel 0.
pub fn default_phase_select(channels: usize) -> Vec<usize> {
    (1..channels).collect()
}

fn check_inputs(shape: &[usize], phase_select: &[usize], scale_factor: usize) -> Result<()> {
    if shape.len() != 4 && shape.len() != 5 {
        return Err(SuperResError::config(format!(
            "downsampling expects a (batch, channel, spatial...) batch with 2 or 3 spatial axes, got shape {:?}",
            shape
        )));
    }
    if scale_factor == 0 {
        return Err(SuperResError::config("scale_factor must be > 0"));
    }
    let channels = shape[1];
    if phase_select.is_empty() {
        return Err(SuperResError::config(
            "no material channel selected for downsampling",
        ));
    }
    if let Some(&bad) = phase_select.iter().find(|&&c| c >= channels) {
        return Err(SuperResError::config(format!(
            "downsampling channel {} out of range for {} channels",
            bad, channels
        )));
    }
    for (axis, &extent) in shape.iter().enumerate().skip(2) {
        if extent % scale_factor != 0 {
            return Err(SuperResError::config(format!(
                "spatial extent {} of batch axis {} is not divisible by scale_factor {}",
                extent, axis, scale_factor
            )));
        }
    }
    Ok(())
}

/// Mean of every `scale_factor` block along the spatial axes (axis 2 onwards).
pub fn block_mean<F: BatchFloat>(batch: ArrayViewD<'_, F>, scale_factor: usize) -> ArrayD<F> {
    let chunk: Vec<usize> = batch
        .shape()
        .iter()
        .enumerate()
        .map(|(axis, _)| if axis < 2 { 1 } else { scale_factor })
        .collect();
    Zip::from(batch.exact_chunks(chunk.as_slice()))
        .map_collect(|block| block.mean().unwrap_or_else(F::zero))
}

/// Downsample a one-hot batch by `scale_factor`.
///
/// `phase_select` names the material channels to pool (default: all but the
/// pore channel). With `squash` they are summed into a single material
/// channel first. The result holds `1 + materials` channels, pore first, with
/// values in {0, 1}.
pub fn downsample<F: BatchFloat, R: Rng + ?Sized>(
    high_res: ArrayViewD<'_, F>,
    phase_select: Option<&[usize]>,
    scale_factor: usize,
    squash: bool,
    rng: &mut R,
) -> Result<ArrayD<F>> {
    let shape = high_res.shape().to_vec();
    let default_select;
    let phase_select = match phase_select {
        Some(select) => select,
        None => {
            default_select = default_phase_select(shape.get(1).copied().unwrap_or(0));
            default_select.as_slice()
        }
    };
    check_inputs(&shape, phase_select, scale_factor)?;

    let mut material = high_res.select(Axis(1), phase_select);
    if squash {
        material = material.sum_axis(Axis(1)).insert_axis(Axis(1));
    }

    let mut material_low_res = block_mean(material.view(), scale_factor);
    let noise = Uniform::new(-F::TIE_NOISE, F::TIE_NOISE);
    material_low_res.mapv_inplace(|v| {
        if v + noise.sample(rng) > F::HALF {
            F::one()
        } else {
            F::zero()
        }
    });

    // Clamped so a tie resolved upwards in two channels still yields a binary pore.
    let pore_phase = material_low_res
        .sum_axis(Axis(1))
        .insert_axis(Axis(1))
        .mapv(|s| (F::one() - s).max(F::zero()));

    concatenate(Axis(1), &[pore_phase.view(), material_low_res.view()])
        .map_err(|e| SuperResError::config(e.to_string()))
}
