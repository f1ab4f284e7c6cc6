// crates/bactrace-imaging/src/lib.rs

//! Image utilities shared by the bactrace engine and CLI.
//!
//! Everything here operates on `ndarray` buffers: grayscale images are
//! `Array2<f64>` in `[0, 1]` indexed `[row, col]`, color buffers are
//! `Array3<f64>` shaped `(height, width, 3)`. File en/decoding goes
//! through the `image` crate and is restricted to 8-bit inputs.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::unwrap_used, clippy::expect_used)]

pub mod colormap;
pub mod draw;
pub mod edt;
pub mod filter;
pub mod io;

pub use colormap::diverging_rgb;
pub use draw::{draw_arc, draw_line};
pub use edt::distance_transform;
pub use filter::gaussian_blur;
pub use io::{load_grayscale, save_grayscale, save_rgb, ImagingError};
