use ndarray::{Array2, Array3};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::ColorType;

use crate::encoding::{LabelVolume, PhaseId};

#[derive(Error, Debug)]
pub enum VolumeLoadError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("TIFF error: {0}")]
    TiffError(String),
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),
    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),
}

fn to_phase_ids<T>(data: Vec<T>, page: usize) -> Result<Vec<PhaseId>, VolumeLoadError>
where
    T: Copy + std::fmt::Display,
    PhaseId: TryFrom<T>,
{
    data.into_iter()
        .map(|v| {
            PhaseId::try_from(v).map_err(|_| {
                VolumeLoadError::UnsupportedDataType(format!(
                    "page {} holds label {} which is not a non-negative 32-bit phase id",
                    page, v
                ))
            })
        })
        .collect()
}

fn decode_page(image_data: DecodingResult, page: usize) -> Result<Vec<PhaseId>, VolumeLoadError> {
    match image_data {
        DecodingResult::U8(data) => Ok(data.into_iter().map(PhaseId::from).collect()),
        DecodingResult::U16(data) => Ok(data.into_iter().map(PhaseId::from).collect()),
        DecodingResult::U32(data) => Ok(data),
        DecodingResult::U64(data) => to_phase_ids(data, page),
        DecodingResult::I8(data) => to_phase_ids(data, page),
        DecodingResult::I16(data) => to_phase_ids(data, page),
        DecodingResult::I32(data) => to_phase_ids(data, page),
        DecodingResult::I64(data) => to_phase_ids(data, page),
        DecodingResult::F32(_) | DecodingResult::F64(_) => {
            Err(VolumeLoadError::UnsupportedDataType(format!(
                "page {} stores floating point samples; segmented labels must be integers",
                page
            )))
        }
    }
}

/// Load a segmented label image from a (multi-page) TIFF.
///
/// A single page yields a 2D image of shape [height, width]; several pages
/// yield a volume of shape [num_pages, height, width].
pub fn load_label_volume(path: &Path) -> Result<LabelVolume, VolumeLoadError> {
    let file = File::open(path)
        .map_err(|e| VolumeLoadError::IoError(format!("{}: {}", path.display(), e)))?;
    let reader = BufReader::new(file);
    let mut decoder = Decoder::new(reader).map_err(|e| VolumeLoadError::TiffError(e.to_string()))?;

    let mut pages: Vec<Vec<PhaseId>> = Vec::new();
    let mut width = 0usize;
    let mut height = 0usize;

    loop {
        let (w, h) = decoder
            .dimensions()
            .map_err(|e| VolumeLoadError::TiffError(e.to_string()))?;
        let color_type = decoder
            .colortype()
            .map_err(|e| VolumeLoadError::TiffError(e.to_string()))?;

        // Labels are single-channel
        if !matches!(
            color_type,
            ColorType::Gray(8) | ColorType::Gray(16) | ColorType::Gray(32) | ColorType::Gray(64)
        ) {
            return Err(VolumeLoadError::UnsupportedDataType(format!(
                "Unsupported TIFF color type: {:?}. Only grayscale label images are supported.",
                color_type
            )));
        }

        if pages.is_empty() {
            width = w as usize;
            height = h as usize;
        } else if w as usize != width || h as usize != height {
            return Err(VolumeLoadError::InvalidDimensions(format!(
                "TIFF pages have inconsistent dimensions: expected {}x{}, got {}x{}",
                width, height, w, h
            )));
        }

        let image_data = decoder
            .read_image()
            .map_err(|e| VolumeLoadError::TiffError(e.to_string()))?;
        pages.push(decode_page(image_data, pages.len())?);

        if !decoder.more_images() {
            break;
        }
        decoder
            .next_image()
            .map_err(|e| VolumeLoadError::TiffError(e.to_string()))?;
    }

    let num_pages = pages.len();
    if num_pages == 0 {
        return Err(VolumeLoadError::TiffError("No pages found in TIFF".to_string()));
    }

    let flat: Vec<PhaseId> = pages.into_iter().flatten().collect();
    if num_pages == 1 {
        let image = Array2::from_shape_vec((height, width), flat)
            .map_err(|e| VolumeLoadError::InvalidDimensions(e.to_string()))?;
        Ok(LabelVolume::Image(image))
    } else {
        let volume = Array3::from_shape_vec((num_pages, height, width), flat)
            .map_err(|e| VolumeLoadError::InvalidDimensions(e.to_string()))?;
        Ok(LabelVolume::Volume(volume))
    }
}
