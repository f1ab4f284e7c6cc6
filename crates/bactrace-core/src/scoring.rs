// crates/bactrace-core/src/scoring.rs

//! Pixelwise objectives over rectangular regions.
//!
//! Both objectives are sums over a clipped region, so a change can score
//! itself on any box containing every pixel it touches and the local
//! delta equals the full-image delta.

use ndarray::Array2;

use crate::geometry::Rect;

/// Weights of the overlap penalty term.
#[derive(Clone, Copy, Debug)]
pub struct CostParams {
    pub overlap_cost: f64,
    pub cell_importance: f64,
}

/// Sum of squared residuals plus the overlap penalty over `region`.
///
/// With `distmap` present, each residual is weighted by the distance map
/// before squaring.
#[must_use]
pub fn region_cost(
    real: &Array2<f64>,
    synth: &Array2<f64>,
    cellmap: &Array2<i32>,
    distmap: Option<&Array2<f64>>,
    region: Rect,
    params: CostParams,
) -> f64 {
    let r = region.clamp_to(real.dim());
    let mut residual = 0.0;
    let mut overlap = 0.0;
    for y in r.rows() {
        for x in r.cols() {
            let idx = [y as usize, x as usize];
            let mut d = real[idx] - synth[idx];
            if let Some(map) = distmap {
                d *= map[idx];
            }
            residual += d * d;
            overlap += f64::from((cellmap[idx] - 1).max(0));
        }
    }
    residual + params.overlap_cost * overlap * params.cell_importance
}

/// Distance weight map for the distance objective: the Euclidean
/// distance transform of `real < 0.5`, scaled by
/// `1 / (divisor * pixels_per_micron)`, then offset by one so background
/// pixels carry weight >= 1.
#[must_use]
pub fn distance_weight_map(real: &Array2<f64>, divisor: f64, pixels_per_micron: f64) -> Array2<f64> {
    let mask = real.mapv(|v| v < 0.5);
    let mut map = bactrace_imaging::distance_transform(&mask);
    let scale = divisor * pixels_per_micron;
    map.mapv_inplace(|d| d / scale + 1.0);
    map
}

/// Everything the engine holds per frame.
#[derive(Clone, Debug)]
pub struct FrameBuffers {
    pub real: Array2<f64>,
    pub synth: Array2<f64>,
    pub cellmap: Array2<i32>,
    /// Present iff the run uses the distance objective.
    pub distmap: Option<Array2<f64>>,
}

impl FrameBuffers {
    /// Cost of the current buffers over `region`.
    #[must_use]
    pub fn cost(&self, region: Rect, params: CostParams) -> f64 {
        region_cost(
            &self.real,
            &self.synth,
            &self.cellmap,
            self.distmap.as_ref(),
            region,
            params,
        )
    }

    /// Cost over the whole frame.
    #[must_use]
    pub fn full_cost(&self, params: CostParams) -> f64 {
        self.cost(Rect::of_shape(self.real.dim()), params)
    }

    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.real.dim()
    }
}
