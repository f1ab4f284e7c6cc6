// crates/bactrace-core/src/temperature.rs

//! Geometric temperature schedules and the automatic calibration
//! bracket.

use crate::error::Result;

/// Geometric interpolation: `a * (b / a)^t`.
#[inline]
#[must_use]
pub fn gerp(a: f64, b: f64, t: f64) -> f64 {
    a * (b / a).powf(t)
}

/// Endpoint temperatures of an annealing run.
#[derive(Clone, Copy, Debug)]
pub struct TemperatureRange {
    pub start: f64,
    pub end: f64,
}

impl TemperatureRange {
    /// Temperature for one iteration of a window pass.
    ///
    /// `offset` is the frame's position inside the window (0 = oldest);
    /// newer frames run hotter. Within the pass the temperature decays
    /// geometrically from the frame's start level to its end level as
    /// `iteration` runs to `run_count - 1`.
    #[must_use]
    pub fn at(&self, offset: usize, window: usize, iteration: usize, run_count: usize) -> f64 {
        let w = window as f64;
        let frame_start = gerp(self.end, self.start, (offset as f64 + 1.0) / w);
        let frame_end = gerp(self.end, self.start, offset as f64 / w);
        let t = if run_count > 1 {
            iteration as f64 / (run_count as f64 - 1.0)
        } else {
            0.0
        };
        gerp(frame_start, frame_end, t)
    }
}

/// Mean acceptance probability of bad moves at which the start
/// temperature is pinned.
const TARGET_PBAD: f64 = 0.40;

/// Bad-move acceptance below which the end temperature is pinned.
const END_PBAD: f64 = 1e-10;

/// Bracket start and end temperatures from a bad-move acceptance probe.
///
/// `probe(t)` must run a constant-temperature pass and report the mean
/// acceptance probability of cost-increasing proposals. Coarse decade
/// steps bracket the target rate, then 10% steps pin the start
/// temperature as the smallest `t` with `probe(t) >= 0.40`; the end
/// temperature divides down by decades until bad moves are essentially
/// never accepted.
pub fn calibrate<F>(mut probe: F) -> Result<TemperatureRange>
where
    F: FnMut(f64) -> Result<f64>,
{
    let mut start = 1.0;
    while probe(start)? < TARGET_PBAD {
        start *= 10.0;
    }
    while probe(start)? > TARGET_PBAD {
        start /= 10.0;
    }
    while probe(start)? < TARGET_PBAD {
        start *= 1.1;
    }

    let mut end = start;
    while probe(end)? > END_PBAD {
        end /= 10.0;
    }

    Ok(TemperatureRange { start, end })
}
