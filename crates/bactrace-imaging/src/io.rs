// crates/bactrace-imaging/src/io.rs

//! Grayscale and RGB file I/O over `ndarray` buffers.
//!
//! Inputs must decode to 8-bit grayscale; anything else is rejected so a
//! mis-exported micrograph fails loudly instead of silently flattening
//! channels. Outputs clamp to `[0, 1]` before quantization.

use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, RgbImage};
use ndarray::{Array2, Array3};
use thiserror::Error;

/// Errors from image decoding and encoding.
#[derive(Debug, Error)]
pub enum ImagingError {
    /// The file could not be opened or decoded at all.
    #[error("failed to read image {path}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    /// The file decoded, but not to 8-bit grayscale.
    #[error("expected an 8-bit grayscale image: {path}")]
    NotGrayscale { path: PathBuf },
    /// The file could not be written.
    #[error("failed to write image {path}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    /// Pixel buffer and declared dimensions disagree.
    #[error("inconsistent pixel buffer for {path}")]
    Buffer { path: PathBuf },
}

/// Decode an 8-bit grayscale image into an `Array2<f64>` scaled to `[0, 1]`.
pub fn load_grayscale(path: &Path) -> Result<Array2<f64>, ImagingError> {
    let decoded = image::open(path).map_err(|source| ImagingError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let DynamicImage::ImageLuma8(gray) = decoded else {
        return Err(ImagingError::NotGrayscale {
            path: path.to_path_buf(),
        });
    };

    let (w, h) = gray.dimensions();
    let mut out = Array2::zeros((h as usize, w as usize));
    for (x, y, pixel) in gray.enumerate_pixels() {
        out[[y as usize, x as usize]] = f64::from(pixel.0[0]) / 255.0;
    }
    Ok(out)
}

/// Encode an `Array2<f64>` as an 8-bit grayscale file.
pub fn save_grayscale(path: &Path, img: &Array2<f64>) -> Result<(), ImagingError> {
    let (h, w) = img.dim();
    let bytes: Vec<u8> = img.iter().map(|&v| quantize(v)).collect();
    let buf = GrayImage::from_raw(w as u32, h as u32, bytes).ok_or_else(|| {
        ImagingError::Buffer {
            path: path.to_path_buf(),
        }
    })?;
    buf.save(path).map_err(|source| ImagingError::Encode {
        path: path.to_path_buf(),
        source,
    })
}

/// Encode an `(h, w, 3)` buffer as an 8-bit RGB file.
pub fn save_rgb(path: &Path, img: &Array3<f64>) -> Result<(), ImagingError> {
    let (h, w, _) = img.dim();
    let mut bytes = Vec::with_capacity(h * w * 3);
    for row in 0..h {
        for col in 0..w {
            for channel in 0..3 {
                bytes.push(quantize(img[[row, col, channel]]));
            }
        }
    }
    let buf = RgbImage::from_raw(w as u32, h as u32, bytes).ok_or_else(|| {
        ImagingError::Buffer {
            path: path.to_path_buf(),
        }
    })?;
    buf.save(path).map_err(|source| ImagingError::Encode {
        path: path.to_path_buf(),
        source,
    })
}

#[inline]
fn quantize(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}
