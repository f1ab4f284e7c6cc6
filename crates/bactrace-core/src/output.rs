// crates/bactrace-core/src/output.rs

//! Rendering of user-facing artifacts: outline overlays and residual
//! heatmaps.

use ndarray::{Array2, Array3};

use bactrace_imaging::diverging_rgb;

use crate::cell::Bacillus;
use crate::render::draw_outline;

const OUTLINE_COLOR: [f64; 3] = [1.0, 0.0, 0.0];

/// Expand a grayscale image into identical RGB channels.
#[must_use]
pub fn grayscale_to_rgb(gray: &Array2<f64>) -> Array3<f64> {
    let (h, w) = gray.dim();
    let mut rgb = Array3::zeros((h, w, 3));
    for ((r, c), &v) in gray.indexed_iter() {
        for channel in 0..3 {
            rgb[[r, c, channel]] = v;
        }
    }
    rgb
}

/// The real image with every cell's outline in red, clamped to `[0, 1]`.
#[must_use]
pub fn render_overlay(real: &Array2<f64>, cells: &[&Bacillus]) -> Array3<f64> {
    let mut frame = grayscale_to_rgb(real);
    for cell in cells {
        draw_outline(&mut frame, cell, OUTLINE_COLOR);
    }
    frame.mapv_inplace(|v| v.clamp(0.0, 1.0));
    frame
}

/// `real - synth`, clipped to `[vmin, vmax]`, through the diverging
/// blue-white-red map.
#[must_use]
pub fn render_residual(
    real: &Array2<f64>,
    synth: &Array2<f64>,
    vmin: f64,
    vmax: f64,
) -> Array3<f64> {
    let (h, w) = real.dim();
    let mut rgb = Array3::zeros((h, w, 3));
    for r in 0..h {
        for c in 0..w {
            let value = (real[[r, c]] - synth[[r, c]]).clamp(vmin, vmax);
            let color = diverging_rgb(value, vmin, vmax);
            for channel in 0..3 {
                rgb[[r, c, channel]] = color[channel];
            }
        }
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_paints_outlines_in_red() {
        let real = Array2::from_elem((40, 40), 0.5);
        let cell = Bacillus::new("a", 20.0, 20.0, 6.0, 14.0, 0.0);
        let overlay = render_overlay(&real, &[&cell]);

        let mut red_pixels = 0;
        for r in 0..40 {
            for c in 0..40 {
                if overlay[[r, c, 0]] == 1.0 && overlay[[r, c, 1]] == 0.0 {
                    red_pixels += 1;
                }
            }
        }
        assert!(red_pixels > 10);
        // Far corner keeps the grayscale value on all channels.
        assert_eq!(overlay[[1, 1, 0]], 0.5);
        assert_eq!(overlay[[1, 1, 2]], 0.5);
    }

    #[test]
    fn residual_of_identical_images_is_white() {
        let real = Array2::from_elem((4, 4), 0.3);
        let rgb = render_residual(&real, &real, -1.0, 1.0);
        assert!(rgb.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn residual_sign_picks_the_ends_of_the_map() {
        let real = Array2::from_elem((2, 2), 1.0);
        let synth = Array2::zeros((2, 2));
        let hot = render_residual(&real, &synth, -1.0, 1.0);
        // real above synth saturates red.
        assert_eq!(hot[[0, 0, 0]], 1.0);
        assert_eq!(hot[[0, 0, 2]], 0.0);

        let cold = render_residual(&synth, &real, -1.0, 1.0);
        assert_eq!(cold[[0, 0, 2]], 1.0);
        assert_eq!(cold[[0, 0, 0]], 0.0);
    }
}
