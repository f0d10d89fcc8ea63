//! PyO3 Python bindings for super-resolution batch preparation.
//!
//! This crate provides thin Python bindings for the superres_core library.
//! All sampling logic is in superres_core; this crate only handles
//! Python/NumPy type conversions.

use std::path::PathBuf;

use numpy::{IntoPyArray, PyArray3, PyArrayDyn, PyReadonlyArray3, PyReadonlyArrayDyn};
use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;

use superres_core::{BatchMaker, BatchMakerConfig, Batch, Device, SuperResError};

fn to_py_err(err: SuperResError) -> PyErr {
    match err {
        SuperResError::Load(e) => PyIOError::new_err(e.to_string()),
        other => PyValueError::new_err(other.to_string()),
    }
}

fn batch_to_py<'py>(py: Python<'py>, batch: PyResult<Batch<f32>>) -> PyResult<&'py PyArrayDyn<f32>> {
    Ok(batch?.into_array().into_pyarray(py))
}

/// Random training batches from a segmented TIFF volume.
#[pyclass(name = "BatchMaker")]
pub struct PyBatchMaker {
    inner: BatchMaker<f32>,
}

#[pymethods]
impl PyBatchMaker {
    #[new]
    #[pyo3(signature = (
        path,
        device = "cpu",
        sf = 4,
        dims = 3,
        stack = true,
        crop = false,
        down_sample = false,
        low_res = false,
        rot_and_mir = true,
        squash = false,
        to_low_idx = None,
        seed = None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        py: Python<'_>,
        path: PathBuf,
        device: &str,
        sf: usize,
        dims: usize,
        stack: bool,
        crop: bool,
        down_sample: bool,
        low_res: bool,
        rot_and_mir: bool,
        squash: bool,
        to_low_idx: Option<Vec<usize>>,
        seed: Option<u64>,
    ) -> PyResult<Self> {
        let device: Device = device.parse().map_err(to_py_err)?;
        let config = BatchMakerConfig {
            device,
            scale_factor: sf,
            dims,
            stack,
            crop,
            down_sample,
            low_res,
            rot_and_mir,
            squash,
            to_low_idx,
            seed,
            ..BatchMakerConfig::new(path)
        };
        let inner = py.allow_threads(|| BatchMaker::new(config).map_err(to_py_err))?;
        Ok(Self { inner })
    }

    /// Batch of real 2D samples, shape (batch_size, C, high_l, high_l).
    #[pyo3(signature = (batch_size, axis = 0))]
    fn random_batch_for_real<'py>(
        &mut self,
        py: Python<'py>,
        batch_size: usize,
        axis: usize,
    ) -> PyResult<&'py PyArrayDyn<f32>> {
        let inner = &mut self.inner;
        let batch = py.allow_threads(|| inner.random_batch_for_real(batch_size, axis).map_err(to_py_err));
        batch_to_py(py, batch)
    }

    /// Batch shaped like the generator output.
    #[pyo3(signature = (batch_size, axis = 0))]
    fn random_batch_for_fake<'py>(
        &mut self,
        py: Python<'py>,
        batch_size: usize,
        axis: usize,
    ) -> PyResult<&'py PyArrayDyn<f32>> {
        let inner = &mut self.inner;
        let batch = py.allow_threads(|| inner.random_batch_for_fake(batch_size, axis).map_err(to_py_err));
        batch_to_py(py, batch)
    }

    #[pyo3(signature = (batch_size, axis = 0))]
    fn random_batch3d<'py>(
        &mut self,
        py: Python<'py>,
        batch_size: usize,
        axis: usize,
    ) -> PyResult<&'py PyArrayDyn<f32>> {
        let inner = &mut self.inner;
        let batch = py.allow_threads(|| inner.random_batch3d(batch_size, axis).map_err(to_py_err));
        batch_to_py(py, batch)
    }

    #[pyo3(signature = (batch_size, axis = 0))]
    fn random_batch2d<'py>(
        &mut self,
        py: Python<'py>,
        batch_size: usize,
        axis: usize,
    ) -> PyResult<&'py PyArrayDyn<f32>> {
        let inner = &mut self.inner;
        let batch = py.allow_threads(|| inner.random_batch2d(batch_size, axis).map_err(to_py_err));
        batch_to_py(py, batch)
    }

    /// The whole encoded volume with a leading batch axis of 1.
    fn all_image_batch<'py>(&self, py: Python<'py>) -> &'py PyArrayDyn<f32> {
        self.inner.all_image_batch().into_array().into_pyarray(py)
    }

    /// Downsample a high resolution batch with this maker's settings.
    fn down_sample<'py>(
        &mut self,
        py: Python<'py>,
        high_res: PyReadonlyArrayDyn<f32>,
    ) -> PyResult<&'py PyArrayDyn<f32>> {
        let low = self
            .inner
            .down_sample_batch(high_res.as_array())
            .map_err(to_py_err)?;
        Ok(low.into_pyarray(py))
    }

    #[getter]
    fn phases(&self) -> Vec<u32> {
        self.inner.phases().ids().to_vec()
    }

    #[getter]
    fn high_l(&self) -> usize {
        self.inner.high_l()
    }

    /// Shape of the encoded volume, channel axis first.
    #[getter]
    fn shape(&self) -> Vec<usize> {
        self.inner.store().encoded().shape().to_vec()
    }

    #[getter]
    fn device(&self) -> String {
        self.inner.device().to_string()
    }
}

/// Expand an (N, H, W) label stack into the (8N, H, W) stack of its
/// rotations and mirrors.
#[pyfunction]
#[pyo3(name = "rotate_and_mirror")]
pub fn rotate_and_mirror_py<'py>(
    py: Python<'py>,
    stack: PyReadonlyArray3<u32>,
) -> PyResult<&'py PyArray3<u32>> {
    let expanded = superres_core::rotate_and_mirror(stack.as_array()).map_err(to_py_err)?;
    Ok(expanded.into_pyarray(py))
}

/// Super-resolution batch maker module
#[pymodule]
fn superres_batch(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyBatchMaker>()?;
    m.add_function(wrap_pyfunction!(rotate_and_mirror_py, m)?)?;
    Ok(())
}
