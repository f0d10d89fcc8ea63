//! Label volumes, phase sets and one-hot encoding.

use ndarray::{
    Array, Array2, Array3, Array4, ArrayD, ArrayViewD, Axis, Dimension, Ix3, Ix4, IxDyn, Zip,
};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

use crate::error::{Result, SuperResError};

/// Discrete material id stored in a segmented image.
pub type PhaseId = u32;

/// Segmented image as read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelVolume {
    /// Single 2D image, shape [height, width].
    Image(Array2<PhaseId>),
    /// True 3D volume or stack of 2D slices, shape [depth, height, width].
    Volume(Array3<PhaseId>),
}

impl LabelVolume {
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Image(img) => img.shape(),
            Self::Volume(vol) => vol.shape(),
        }
    }

    /// Number of spatial axes (2 or 3).
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = &PhaseId> + '_> {
        match self {
            Self::Image(img) => Box::new(img.iter()),
            Self::Volume(vol) => Box::new(vol.iter()),
        }
    }
}

/// Ordered set of unique phase ids; its length is the channel count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSet {
    ids: Vec<PhaseId>,
}

impl PhaseSet {
    /// Sorted distinct ids actually present in `labels`.
    pub fn from_labels(labels: &LabelVolume) -> Self {
        let ids: BTreeSet<PhaseId> = labels.iter().copied().collect();
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    /// Use caller-provided ids, checking they cover every label present.
    pub fn from_hint(hint: &[PhaseId], labels: &LabelVolume) -> Result<Self> {
        let ids: BTreeSet<PhaseId> = hint.iter().copied().collect();
        if ids.is_empty() {
            return Err(SuperResError::config("phase hint must not be empty"));
        }
        let present = Self::from_labels(labels);
        if let Some(missing) = present.ids.iter().find(|id| !ids.contains(*id)) {
            return Err(SuperResError::config(format!(
                "phase hint {:?} does not contain label {} present in the volume",
                hint, missing
            )));
        }
        Ok(Self {
            ids: ids.into_iter().collect(),
        })
    }

    pub fn ids(&self) -> &[PhaseId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Channel each phase id is written to.
    ///
    /// With `squash` the first (background) phase keeps channel 0 and every
    /// other phase shares channel 1.
    fn channel_lookup(&self, squash: bool) -> FxHashMap<PhaseId, usize> {
        self.ids
            .iter()
            .enumerate()
            .map(|(c, &id)| (id, if squash { c.min(1) } else { c }))
            .collect()
    }

    /// Number of channels produced by [`one_hot_encode`].
    pub fn channel_count(&self, squash: bool) -> usize {
        if squash {
            2
        } else {
            self.ids.len()
        }
    }
}

/// Channel-first one-hot volume with values in {0, 1}.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OneHotVolume {
    /// Shape [channels, height, width].
    Image(Array3<u8>),
    /// Shape [channels, depth, height, width].
    Volume(Array4<u8>),
}

impl OneHotVolume {
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Image(img) => img.shape(),
            Self::Volume(vol) => vol.shape(),
        }
    }

    pub fn channels(&self) -> usize {
        self.shape()[0]
    }

    pub fn spatial_shape(&self) -> &[usize] {
        &self.shape()[1..]
    }
}

fn encode_channels(
    labels: ArrayViewD<'_, PhaseId>,
    lookup: &FxHashMap<PhaseId, usize>,
    channels: usize,
) -> Result<ArrayD<u8>> {
    if let Some(unknown) = labels.iter().find(|l| !lookup.contains_key(*l)) {
        return Err(SuperResError::config(format!(
            "label {} is not part of the phase set",
            unknown
        )));
    }
    let channel_of = labels.mapv(|l| lookup[&l]);

    let mut shape = vec![channels];
    shape.extend_from_slice(labels.shape());
    let mut encoded = ArrayD::<u8>::zeros(IxDyn(&shape));
    for (c, mut plane) in encoded.axis_iter_mut(Axis(0)).enumerate() {
        Zip::from(&mut plane)
            .and(&channel_of)
            .for_each(|out, &ch| *out = u8::from(ch == c));
    }
    Ok(encoded)
}

fn into_fixed<D: Dimension>(encoded: ArrayD<u8>) -> Result<Array<u8, D>> {
    encoded
        .into_dimensionality::<D>()
        .map_err(|e| SuperResError::config(e.to_string()))
}

/// Encode `labels` into one binary channel per phase.
pub fn one_hot_encode(labels: &LabelVolume, phases: &PhaseSet, squash: bool) -> Result<OneHotVolume> {
    let lookup = phases.channel_lookup(squash);
    let channels = phases.channel_count(squash);
    match labels {
        LabelVolume::Image(img) => {
            let encoded = encode_channels(img.view().into_dyn(), &lookup, channels)?;
            Ok(OneHotVolume::Image(into_fixed::<Ix3>(encoded)?))
        }
        LabelVolume::Volume(vol) => {
            let encoded = encode_channels(vol.view().into_dyn(), &lookup, channels)?;
            Ok(OneHotVolume::Volume(into_fixed::<Ix4>(encoded)?))
        }
    }
}

/// Sum of all channels at every spatial location.
pub fn channel_sum(encoded: &OneHotVolume) -> ArrayD<u32> {
    match encoded {
        OneHotVolume::Image(img) => img.mapv(u32::from).sum_axis(Axis(0)).into_dyn(),
        OneHotVolume::Volume(vol) => vol.mapv(u32::from).sum_axis(Axis(0)).into_dyn(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};
    use rand::prelude::*;

    fn random_labels(shape: (usize, usize, usize), phases: &[PhaseId], seed: u64) -> LabelVolume {
        let mut rng = StdRng::seed_from_u64(seed);
        LabelVolume::Volume(Array3::from_shape_fn(shape, |_| {
            phases[rng.gen_range(0..phases.len())]
        }))
    }

    #[test]
    fn test_phase_set_is_sorted_and_unique() {
        let labels = LabelVolume::Image(array![[7, 0, 255], [0, 7, 7]]);
        let phases = PhaseSet::from_labels(&labels);
        assert_eq!(phases.ids(), &[0, 7, 255]);
        assert_eq!(phases.len(), 3);
    }

    #[test]
    fn test_phase_hint_may_add_absent_phases() {
        let labels = LabelVolume::Image(array![[0, 1], [1, 0]]);
        let phases = PhaseSet::from_hint(&[2, 1, 0], &labels).unwrap();
        assert_eq!(phases.ids(), &[0, 1, 2]);
    }

    #[test]
    fn test_phase_hint_missing_label_is_rejected() {
        let labels = LabelVolume::Image(array![[0, 1], [2, 0]]);
        let err = PhaseSet::from_hint(&[0, 1], &labels).unwrap_err();
        assert!(matches!(err, SuperResError::Configuration(_)));
    }

    #[test]
    fn test_one_hot_is_a_partition_of_unity() {
        let labels = random_labels((6, 7, 8), &[0, 1, 2, 5], 42);
        let phases = PhaseSet::from_labels(&labels);
        let encoded = one_hot_encode(&labels, &phases, false).unwrap();

        assert_eq!(encoded.shape(), &[phases.len(), 6, 7, 8]);
        assert!(channel_sum(&encoded).iter().all(|&s| s == 1));
    }

    #[test]
    fn test_one_hot_marks_the_matching_channel() {
        let labels = LabelVolume::Image(array![[0, 3], [9, 3]]);
        let phases = PhaseSet::from_labels(&labels);
        let OneHotVolume::Image(encoded) = one_hot_encode(&labels, &phases, false).unwrap() else {
            panic!("2D labels must encode to a 2D one-hot image");
        };
        assert_eq!(encoded[[0, 0, 0]], 1);
        assert_eq!(encoded[[1, 0, 1]], 1);
        assert_eq!(encoded[[1, 1, 1]], 1);
        assert_eq!(encoded[[2, 1, 0]], 1);
        assert_eq!(encoded[[2, 0, 0]], 0);
    }

    #[test]
    fn test_squash_keeps_pore_and_merges_material() {
        let labels = random_labels((4, 5, 5), &[0, 1, 2], 7);
        let phases = PhaseSet::from_labels(&labels);
        let OneHotVolume::Volume(encoded) = one_hot_encode(&labels, &phases, true).unwrap() else {
            panic!("3D labels must encode to a 3D one-hot volume");
        };
        let LabelVolume::Volume(raw) = &labels else {
            unreachable!()
        };

        assert_eq!(encoded.shape()[0], 2);
        for ((d, h, w), &label) in raw.indexed_iter() {
            let pore = u8::from(label == 0);
            assert_eq!(encoded[[0, d, h, w]], pore);
            assert_eq!(encoded[[1, d, h, w]], 1 - pore);
        }
    }

    #[test]
    fn test_label_outside_phase_set_is_rejected() {
        let labels = LabelVolume::Image(array![[0, 4]]);
        let phases = PhaseSet::from_hint(&[0, 4], &labels).unwrap();
        let other = LabelVolume::Image(array![[0, 5]]);
        assert!(one_hot_encode(&other, &phases, false).is_err());
    }
}
