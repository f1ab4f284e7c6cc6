// crates/bactrace-core/src/constraints.rs

//! Biological feasibility checks for candidate cells.

use crate::cell::Bacillus;
use crate::config::{Bounds, ImageType};

/// Check individual cells and (prior-frame, current-frame) pairs against
/// the hard limits. Returns `false` on the first violation.
///
/// Pair checks cover displacement, rotation delta, and growth per frame
/// step; individual checks cover image bounds, size, and (in
/// graySynthetic mode) opacity positivity.
#[must_use]
pub fn check_constraints(
    bounds: &Bounds,
    image_type: ImageType,
    shape: (usize, usize),
    cells: &[&Bacillus],
    pairs: &[(Bacillus, Bacillus)],
) -> bool {
    let (h, w) = shape;
    for cell in cells {
        if !(0.0..w as f64).contains(&cell.x) || !(0.0..h as f64).contains(&cell.y) {
            return false;
        }
        if cell.width < bounds.min_width || cell.width > bounds.max_width {
            return false;
        }
        if !(cell.length > bounds.min_length && cell.length < bounds.max_length) {
            return false;
        }
        if image_type == ImageType::GraySynthetic && cell.opacity <= 0.0 {
            return false;
        }
    }

    for (prior, current) in pairs {
        let displacement = (current.position() - prior.position()).norm();
        if displacement > bounds.max_displacement {
            return false;
        }
        if (current.rotation - prior.rotation).abs() > bounds.max_rotation {
            return false;
        }
        let growth = current.length - prior.length;
        if !(growth > bounds.min_growth && growth < bounds.max_growth) {
            return false;
        }
    }

    true
}
