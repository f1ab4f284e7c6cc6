// crates/bactrace-core/src/config.rs

//! Typed configuration for the fitting run.
//!
//! The on-disk format is a JSON document whose keys are dotted, matching
//! the established config files for this kind of experiment
//! (`"bacilli.maxSpeed"`, `"prob.split"`, ...). Nested `perturbation` and
//! `simulation` sections hold the proposal sampling parameters and the
//! per-frame rendering settings.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// How cells are rendered onto the synthetic image.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub enum ImageType {
    /// Additive coverage counts; the background level is 0.
    #[serde(rename = "binary")]
    Binary,
    /// Flat gray interiors over a gray background, with an optional
    /// Gaussian diffraction halo.
    #[serde(rename = "graySynthetic")]
    GraySynthetic,
    /// Multi-ring rendering mimicking phase-contrast optics.
    #[serde(rename = "phaseContrast")]
    PhaseContrast,
}

/// Per-frame rendering settings. Copied forward on every frame advance;
/// only `background_color` drifts (via the background-offset change).
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub struct SimulationConfig {
    #[serde(rename = "image.type")]
    pub image_type: ImageType,
    /// Grayscale baseline the synthetic image is filled with.
    #[serde(rename = "background.color")]
    pub background_color: f64,
    /// Interior level of a drawn cell in graySynthetic mode.
    #[serde(rename = "cell.color", default = "default_cell_color")]
    pub cell_color: f64,
    /// Diffraction halo spread; 0 disables the halo.
    #[serde(rename = "diffraction.sigma", default = "default_diffraction_sigma")]
    pub diffraction_sigma: f64,
    /// Diffraction halo brightness; 0 disables the halo.
    #[serde(
        rename = "diffraction.strength",
        default = "default_diffraction_strength"
    )]
    pub diffraction_strength: f64,
}

fn default_cell_color() -> f64 {
    0.15
}

fn default_diffraction_sigma() -> f64 {
    3.0
}

fn default_diffraction_strength() -> f64 {
    0.5
}

/// Per-attribute sampling parameters for the perturbation proposal.
#[derive(Clone, Debug, Deserialize)]
pub struct PerturbationConfig {
    #[serde(rename = "prob.x")]
    pub prob_x: f64,
    #[serde(rename = "prob.y")]
    pub prob_y: f64,
    #[serde(rename = "prob.width")]
    pub prob_width: f64,
    #[serde(rename = "prob.length")]
    pub prob_length: f64,
    #[serde(rename = "prob.rotation")]
    pub prob_rotation: f64,
    /// Drawn only in graySynthetic mode; no modification is emitted.
    #[serde(rename = "prob.opacity", default)]
    pub prob_opacity: f64,
    #[serde(rename = "prob.background_offset")]
    pub prob_background_offset: f64,

    #[serde(rename = "modification.x.mu")]
    pub x_mu: f64,
    #[serde(rename = "modification.x.sigma")]
    pub x_sigma: f64,
    #[serde(rename = "modification.y.mu")]
    pub y_mu: f64,
    #[serde(rename = "modification.y.sigma")]
    pub y_sigma: f64,
    #[serde(rename = "modification.width.mu")]
    pub width_mu: f64,
    #[serde(rename = "modification.width.sigma")]
    pub width_sigma: f64,
    #[serde(rename = "modification.length.mu")]
    pub length_mu: f64,
    #[serde(rename = "modification.length.sigma")]
    pub length_sigma: f64,
    #[serde(rename = "modification.rotation.mu")]
    pub rotation_mu: f64,
    #[serde(rename = "modification.rotation.sigma")]
    pub rotation_sigma: f64,
    #[serde(rename = "modification.background_offset.mu")]
    pub background_offset_mu: f64,
    #[serde(rename = "modification.background_offset.sigma")]
    pub background_offset_sigma: f64,
}

/// Full run configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(rename = "global.framesPerSecond")]
    pub frames_per_second: f64,
    #[serde(rename = "global.pixelsPerMicron")]
    pub pixels_per_micron: f64,
    #[serde(rename = "global.cellType")]
    pub cell_type: String,

    #[serde(rename = "bacilli.maxSpeed")]
    pub max_speed: f64,
    #[serde(rename = "bacilli.maxSpin")]
    pub max_spin: f64,
    #[serde(rename = "bacilli.minGrowth")]
    pub min_growth: f64,
    #[serde(rename = "bacilli.maxGrowth")]
    pub max_growth: f64,
    #[serde(rename = "bacilli.minWidth")]
    pub min_width: f64,
    #[serde(rename = "bacilli.maxWidth")]
    pub max_width: f64,
    #[serde(rename = "bacilli.minLength")]
    pub min_length: f64,
    #[serde(rename = "bacilli.maxLength")]
    pub max_length: f64,
    #[serde(rename = "bacilli.distanceCostDivisor", default = "default_one")]
    pub distance_cost_divisor: f64,

    #[serde(rename = "overlap.cost")]
    pub overlap_cost: f64,
    #[serde(rename = "cell.importance")]
    pub cell_importance: f64,
    /// Soft prior against spurious divisions: added on split, subtracted
    /// on combine.
    #[serde(rename = "split.cost")]
    pub split_cost: f64,

    #[serde(rename = "global_optimizer.window_size")]
    pub window_size: usize,

    #[serde(rename = "prob.perturbation")]
    pub prob_perturbation: f64,
    #[serde(rename = "prob.combine")]
    pub prob_combine: f64,
    #[serde(rename = "prob.split")]
    pub prob_split: f64,

    pub perturbation: PerturbationConfig,
    pub simulation: SimulationConfig,

    #[serde(rename = "residual.vmin", default = "default_vmin")]
    pub residual_vmin: f64,
    #[serde(rename = "residual.vmax", default = "default_one")]
    pub residual_vmax: f64,
}

fn default_one() -> f64 {
    1.0
}

fn default_vmin() -> f64 {
    -1.0
}

impl Config {
    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON config string.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.cell_type != "bacilli" {
            return Err(Error::Config(format!(
                "unsupported global.cellType \"{}\" (only \"bacilli\")",
                self.cell_type
            )));
        }
        if self.window_size == 0 {
            return Err(Error::Config(
                "global_optimizer.window_size must be at least 1".into(),
            ));
        }
        if self.frames_per_second <= 0.0 {
            return Err(Error::Config(
                "global.framesPerSecond must be positive".into(),
            ));
        }
        let total = self.prob_perturbation
            + self.prob_combine
            + self.prob_split
            + self.perturbation.prob_background_offset;
        if (total - 1.0).abs() > 1e-6 {
            return Err(Error::Config(format!(
                "change probabilities must sum to 1, got {total}"
            )));
        }
        Ok(())
    }

    /// Hard motion/size limits for one frame step.
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        Bounds {
            max_displacement: self.max_speed / self.frames_per_second,
            max_rotation: self.max_spin / self.frames_per_second,
            min_growth: self.min_growth,
            max_growth: self.max_growth,
            min_width: self.min_width,
            max_width: self.max_width,
            min_length: self.min_length,
            max_length: self.max_length,
        }
    }
}

/// Biological feasibility limits, already divided down to per-frame
/// magnitudes.
#[derive(Clone, Copy, Debug)]
pub struct Bounds {
    pub max_displacement: f64,
    pub max_rotation: f64,
    pub min_growth: f64,
    pub max_growth: f64,
    pub min_width: f64,
    pub max_width: f64,
    pub min_length: f64,
    pub max_length: f64,
}


#[cfg(test)]
mod tests {
    use super::testing::{example, EXAMPLE_JSON};
    use super::*;

    #[test]
    fn parses_dotted_keys() {
        let config = example();
        assert_eq!(config.window_size, 3);
        assert_eq!(config.simulation.image_type, ImageType::Binary);
        assert_eq!(config.perturbation.prob_x, 0.35);
        // Defaults fill the optional rendering constants.
        assert_eq!(config.simulation.diffraction_sigma, 3.0);
        assert_eq!(config.simulation.cell_color, 0.15);
    }

    #[test]
    fn rejects_bad_probability_mass() {
        let broken =
            EXAMPLE_JSON.replace("\"prob.perturbation\": 0.8", "\"prob.perturbation\": 0.5");
        assert!(matches!(
            Config::from_json(&broken),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn rejects_missing_key() {
        let broken = EXAMPLE_JSON.replace("\"bacilli.maxSpeed\": 10.0,", "");
        assert!(matches!(
            Config::from_json(&broken),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn bounds_divide_by_frame_rate() {
        let mut config = example();
        config.frames_per_second = 2.0;
        let bounds = config.bounds();
        assert_eq!(bounds.max_displacement, 5.0);
        assert_eq!(bounds.max_rotation, 0.5);
    }
}
