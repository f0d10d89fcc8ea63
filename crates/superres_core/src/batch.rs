//! Batch assembly: repeated patch sampling, optional downsampling.

use std::iter;
use std::marker::PhantomData;
use std::sync::Arc;

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use crate::config::{BatchMakerConfig, Device};
use crate::downsample::downsample;
use crate::encoding::{OneHotVolume, PhaseSet};
use crate::error::{Result, SuperResError};
use crate::float_trait::BatchFloat;
use crate::sampler::{Patch, SamplerMode};
use crate::volume::VolumeStore;

/// A batch of training samples, `(batch, channel, spatial...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<F> {
    data: ArrayD<F>,
    device: Device,
}

impl<F> Batch<F> {
    pub fn new(data: ArrayD<F>, device: Device) -> Self {
        Self { data, device }
    }

    pub fn data(&self) -> &ArrayD<F> {
        &self.data
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn into_array(self) -> ArrayD<F> {
        self.data
    }
}

/// Produces random training batches from a shared [`VolumeStore`].
///
/// Each call draws one seed per batch element from the maker's own random
/// stream and fills the elements in parallel, so a configured `seed` yields
/// the same batches whatever the thread count.
#[derive(Debug)]
pub struct BatchMaker<F: BatchFloat = f32> {
    store: Arc<VolumeStore>,
    config: BatchMakerConfig,
    planar: SamplerMode,
    volumetric: Option<SamplerMode>,
    rng: StdRng,
    _float: PhantomData<F>,
}

impl<F: BatchFloat> BatchMaker<F> {
    /// Load the volume named by `config.path` and build a maker on it.
    pub fn new(config: BatchMakerConfig) -> Result<Self> {
        let store = VolumeStore::initialize(&config)?;
        Self::with_store(Arc::new(store), config)
    }

    /// Build a maker on an existing store.
    ///
    /// The store must have been prepared with the same patch length.
    pub fn with_store(store: Arc<VolumeStore>, config: BatchMakerConfig) -> Result<Self> {
        config.validate()?;
        if store.high_l() != config.high_l() {
            return Err(SuperResError::config(format!(
                "store was prepared for patch length {}, configuration asks for {}",
                store.high_l(),
                config.high_l()
            )));
        }
        let planar = SamplerMode::planar(&store, config.stack);
        let volumetric = SamplerMode::volumetric(&store).ok();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            store,
            config,
            planar,
            volumetric,
            rng,
            _float: PhantomData,
        })
    }

    // =========================================================================
    // Batches
    // =========================================================================

    /// Batch of real samples for the discriminator; always 2D.
    pub fn random_batch_for_real(&mut self, batch_size: usize, axis: usize) -> Result<Batch<F>> {
        self.random_batch2d(batch_size, axis)
    }

    /// Batch shaped like the generator output: 3D for a 3D generator, else 2D.
    pub fn random_batch_for_fake(&mut self, batch_size: usize, axis: usize) -> Result<Batch<F>> {
        if self.config.dims == 3 {
            self.random_batch3d(batch_size, axis)
        } else {
            self.random_batch2d(batch_size, axis)
        }
    }

    /// `(batch_size, C, high_l, high_l, high_l)` cubes viewed along `axis`.
    pub fn random_batch3d(&mut self, batch_size: usize, axis: usize) -> Result<Batch<F>> {
        let mode = self.volumetric.ok_or_else(|| {
            SuperResError::config("3D batches cannot be sampled from a 2D image")
        })?;
        self.sample_batch(mode, batch_size, axis)
    }

    /// `(batch_size, C, high_l, high_l)` windows.
    pub fn random_batch2d(&mut self, batch_size: usize, axis: usize) -> Result<Batch<F>> {
        self.sample_batch(self.planar, batch_size, axis)
    }

    /// The whole encoded volume as a batch of one.
    pub fn all_image_batch(&self) -> Batch<F> {
        let data = match self.store.encoded() {
            OneHotVolume::Image(img) => img.mapv(F::from_occupancy).into_dyn(),
            OneHotVolume::Volume(vol) => vol.mapv(F::from_occupancy).into_dyn(),
        };
        Batch::new(data.insert_axis(Axis(0)), self.config.device)
    }

    /// Downsample a high resolution batch with this maker's scale factor,
    /// channel selection and squash setting.
    pub fn down_sample_batch(&mut self, high_res: ArrayViewD<'_, F>) -> Result<ArrayD<F>> {
        downsample(
            high_res,
            self.config.to_low_idx.as_deref(),
            self.config.scale_factor,
            self.config.squash,
            &mut self.rng,
        )
    }

    fn sample_batch(&mut self, mode: SamplerMode, batch_size: usize, axis: usize) -> Result<Batch<F>> {
        let high_l = self.store.high_l();
        debug!(
            mode = ?mode,
            batch_size,
            axis,
            high_l,
            down_sample = self.config.down_sample,
            "sampling batch"
        );

        let seeds: Vec<u64> = (0..batch_size).map(|_| self.rng.gen()).collect();
        let store = self.store.as_ref();
        let patches: Vec<Patch> = seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                mode.sample(store, axis, &mut rng)
            })
            .collect::<Result<Vec<_>>>()?;

        let shape: Vec<usize> = [batch_size, store.channels()]
            .into_iter()
            .chain(iter::repeat(high_l).take(mode.spatial_dims()))
            .collect();
        let mut data = ArrayD::<F>::zeros(IxDyn(&shape));
        for (i, patch) in patches.iter().enumerate() {
            data.index_axis_mut(Axis(0), i).assign(&patch.to_float::<F>());
        }

        let data = if self.config.down_sample {
            self.down_sample_batch(data.view())?
        } else {
            data
        };
        Ok(Batch::new(data, self.config.device))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn store(&self) -> &Arc<VolumeStore> {
        &self.store
    }

    pub fn config(&self) -> &BatchMakerConfig {
        &self.config
    }

    pub fn phases(&self) -> &PhaseSet {
        self.store.phases()
    }

    pub fn high_l(&self) -> usize {
        self.store.high_l()
    }

    pub fn device(&self) -> Device {
        self.config.device
    }

    /// Sampling strategy of 2D batches.
    pub fn planar_mode(&self) -> SamplerMode {
        self.planar
    }

    /// Sampling strategy of 3D batches, `None` for a 2D image.
    pub fn volumetric_mode(&self) -> Option<SamplerMode> {
        self.volumetric
    }
}
