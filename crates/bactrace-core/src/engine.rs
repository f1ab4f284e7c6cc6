// crates/bactrace-core/src/engine.rs

//! The sliding-window simulated-annealing driver.
//!
//! The window advances one frame per outer step. When a new frame enters
//! the window, the lineage is copied forward and the frame's buffers are
//! rendered; the frames inside the window are then jointly re-optimized
//! with temperatures that run colder for older frames. When a frame
//! leaves the window its artifacts go to the [`FrameSink`].
//!
//! The loop is strictly sequential: every proposal observes the result
//! of the previous accept/reject before it is scored.

use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::cell::Bacillus;
use crate::changes::{
    sample_change_kind, split_proba, BackgroundOffset, ChangeKind, CombineChange, Perturbation,
    Proposal, SplitChange,
};
use crate::config::{Config, ImageType};
use crate::constraints::check_constraints;
use crate::error::{Error, Result};
use crate::lineage::Lineage;
use crate::output::{render_overlay, render_residual};
use crate::render::generate_synthetic_image;
use crate::scoring::{distance_weight_map, CostParams, FrameBuffers};
use crate::temperature::{calibrate, TemperatureRange};

/// Tolerance for the incremental-vs-recomputed cost comparison.
const COST_DRIFT_TOLERANCE: f64 = 1e-7;

/// Iteration budget per cell during calibration probes.
const PROBE_ITERATIONS_PER_CELL: usize = 500;

/// One finished frame handed to the sink.
pub struct FrameArtifacts<'a> {
    pub frame_index: usize,
    /// The fitted synthetic image.
    pub bestfit: &'a Array2<f64>,
    /// Real image with cell outlines in red.
    pub overlay: Array3<f64>,
    /// Residual heatmap, when enabled.
    pub residual: Option<Array3<f64>>,
}

/// One (frame, cell) row of the reconstructed lineage.
#[derive(Clone, Debug, PartialEq)]
pub struct LineageRow {
    pub frame_index: usize,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub length: f64,
    pub rotation: f64,
}

/// Receives per-frame artifacts during the run and the lineage table at
/// the end.
pub trait FrameSink {
    fn emit_frame(&mut self, artifacts: &FrameArtifacts<'_>) -> Result<()>;
    fn emit_lineage(&mut self, rows: &[LineageRow]) -> Result<()>;
}

/// Settings for one optimization run.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub temperatures: TemperatureRange,
    pub iterations_per_cell: usize,
    pub use_distance_objective: bool,
    pub emit_residual: bool,
    /// Fixed master seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

/// Sliding-window annealing driver over one lineage.
#[derive(Debug)]
pub struct Optimizer<'a> {
    config: &'a Config,
    realimages: &'a [Array2<f64>],
    shape: (usize, usize),
    lineage: Lineage,
    buffers: Vec<FrameBuffers>,
    /// Incrementally tracked objective per frame buffer.
    frame_costs: Vec<f64>,
    rng: StdRng,
    options: RunOptions,
    use_distance_objective: bool,
    pbad_total: f64,
    bad_count: u64,
}

impl<'a> Optimizer<'a> {
    /// Seed the lineage from the initial colony.
    ///
    /// Fails with [`Error::InitialConstraintViolation`] if any colony
    /// cell breaks the per-cell invariants, naming the first offender.
    pub fn new(
        config: &'a Config,
        realimages: &'a [Array2<f64>],
        initial_colony: &[Bacillus],
        options: RunOptions,
    ) -> Result<Self> {
        let shape = realimages
            .first()
            .map(|image| image.dim())
            .ok_or_else(|| Error::Config("at least one input image is required".into()))?;
        for (frame, image) in realimages.iter().enumerate() {
            if image.dim() != shape {
                return Err(Error::ShapeMismatch {
                    frame,
                    got: image.dim(),
                    expected: shape,
                });
            }
        }

        let bounds = config.bounds();
        for cell in initial_colony {
            if !check_constraints(&bounds, config.simulation.image_type, shape, &[cell], &[]) {
                return Err(Error::InitialConstraintViolation {
                    name: cell.name.clone(),
                });
            }
        }

        let mut lineage = Lineage::new(config.simulation);
        for cell in initial_colony {
            lineage.add_cell(0, cell.clone());
        }

        let rng = options
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        let use_distance_objective = options.use_distance_objective;

        Ok(Self {
            config,
            realimages,
            shape,
            lineage,
            buffers: Vec::new(),
            frame_costs: Vec::new(),
            rng,
            options,
            use_distance_objective,
            pbad_total: 0.0,
            bad_count: 0,
        })
    }

    /// Drive the sliding window across all frames, emitting artifacts as
    /// frames leave the window. Returns the summed final cost.
    pub fn run(&mut self, sink: &mut dyn FrameSink) -> Result<f64> {
        let n = self.realimages.len() as isize;
        let window = self.config.window_size as isize;

        for window_start in (1 - window)..n {
            let window_end = window_start + window;
            if window_end <= n {
                self.extend_window(window_end as usize);
            }
            self.anneal_window(window_start, window_end, None)?;
            if window_start >= 0 {
                self.finish_frame(window_start as usize, sink)?;
            }
        }

        sink.emit_lineage(&self.lineage_rows())?;
        Ok(self.frame_costs.iter().sum())
    }

    /// Constant-temperature probe over the leading window only. Returns
    /// the mean acceptance probability of cost-increasing proposals, or
    /// 0 when none were proposed.
    pub fn probe_pbad(&mut self, temperature: f64) -> Result<f64> {
        let window = self.config.window_size as isize;
        self.extend_window(1);
        self.anneal_window(1 - window, 1, Some(temperature))?;
        if self.bad_count == 0 {
            Ok(0.0)
        } else {
            Ok(self.pbad_total / self.bad_count as f64)
        }
    }

    /// Bring the frame at `window_end - 1` into existence: copy the
    /// lineage forward (except for frame 0) and render its buffers.
    fn extend_window(&mut self, window_end: usize) {
        if window_end > 1 {
            self.lineage.copy_forward();
        }
        let frame_index = window_end - 1;
        let real = &self.realimages[frame_index];
        let sim = self.lineage.frame(frame_index).simulation;
        let cells: Vec<&Bacillus> = self
            .lineage
            .frame(frame_index)
            .node_ids()
            .map(|id| self.lineage.cell(id))
            .collect();
        let (synth, cellmap) = generate_synthetic_image(cells, self.shape, &sim);
        let distmap = self.use_distance_objective.then(|| {
            distance_weight_map(
                real,
                self.config.distance_cost_divisor,
                self.config.pixels_per_micron,
            )
        });

        let buffers = FrameBuffers {
            real: real.clone(),
            synth,
            cellmap,
            distmap,
        };
        let cost = buffers.full_cost(self.cost_params());
        debug!(frame = frame_index, cost, "window extended");
        self.buffers.push(buffers);
        self.frame_costs.push(cost);
    }

    fn anneal_window(
        &mut self,
        window_start: isize,
        window_end: isize,
        constant_temp: Option<f64>,
    ) -> Result<()> {
        let window = self.config.window_size;
        let cells_in_window = self.lineage.count_cells_in(window_start, window_end);
        let run_count = (self.options.iterations_per_cell * cells_in_window).div_ceil(window);
        debug!(window_start, window_end, run_count, "annealing window");

        for iteration in 0..run_count {
            let frame_index =
                self.lineage
                    .choose_random_frame_index(window_start, window_end, &mut self.rng)?;
            let temperature = constant_temp.unwrap_or_else(|| {
                let offset = (frame_index as isize - window_start) as usize;
                self.options
                    .temperatures
                    .at(offset, window, iteration, run_count)
            });
            self.step(frame_index, temperature);
        }
        Ok(())
    }

    /// One proposal: sample, validate, score, accept or drop.
    fn step(&mut self, frame_index: usize, temperature: f64) {
        let (node, cell_length) = {
            let frame = self.lineage.frame(frame_index);
            if frame.is_empty() {
                return;
            }
            let pick = self.rng.random_range(0..frame.len());
            let Some(node) = self.lineage.frame(frame_index).node_ids().nth(pick) else {
                return;
            };
            (node, self.lineage.cell(node).length)
        };

        let proposal = match sample_change_kind(self.config, &mut self.rng) {
            ChangeKind::Split => {
                if frame_index == 0 || self.rng.random::<f64>() >= split_proba(cell_length) {
                    None
                } else {
                    SplitChange::propose(&self.lineage, node, frame_index, &mut self.rng)
                        .map(Proposal::Split)
                }
            }
            ChangeKind::Perturbation => Perturbation::propose(
                &self.lineage,
                node,
                frame_index,
                self.config,
                self.shape,
                &mut self.rng,
            )
            .map(Proposal::Perturb),
            ChangeKind::Combine => {
                if frame_index == 0 {
                    None
                } else {
                    CombineChange::propose(&self.lineage, node, frame_index).map(Proposal::Combine)
                }
            }
            ChangeKind::BackgroundOffset => {
                if frame_index == 0
                    || self.lineage.frame(frame_index).simulation.image_type
                        != ImageType::GraySynthetic
                {
                    None
                } else {
                    Some(Proposal::Background(BackgroundOffset::propose(
                        &self.lineage,
                        frame_index,
                        self.config,
                        self.shape,
                        &mut self.rng,
                    )))
                }
            }
        };

        let Some(proposal) = proposal else {
            return;
        };
        if !proposal.is_valid(&self.lineage, self.config, self.shape) {
            return;
        }

        let costdiff = proposal.costdiff(&self.lineage, &self.buffers[frame_index], self.config);
        let acceptance = if costdiff <= 0.0 {
            1.0
        } else {
            self.bad_count += 1;
            let a = (-costdiff / temperature).exp();
            self.pbad_total += a;
            a
        };

        if acceptance > self.rng.random::<f64>() {
            // The ledger tracks the image objective only; the division
            // prior is not part of the pixel cost.
            let image_delta = match &proposal {
                Proposal::Split(_) => costdiff - self.config.split_cost,
                Proposal::Combine(_) => costdiff + self.config.split_cost,
                _ => costdiff,
            };
            proposal.apply(&mut self.lineage, &mut self.buffers[frame_index]);
            self.frame_costs[frame_index] += image_delta;
        }
    }

    /// A frame left the window: verify the cost ledger, render artifacts,
    /// and hand them to the sink.
    fn finish_frame(&mut self, frame_index: usize, sink: &mut dyn FrameSink) -> Result<()> {
        let actual = self.buffers[frame_index].full_cost(self.cost_params());
        let tracked = self.frame_costs[frame_index];
        if (actual - tracked).abs() > COST_DRIFT_TOLERANCE {
            warn!(
                frame = frame_index,
                incremental = tracked,
                recomputed = actual,
                "incremental cost diverged from recomputed cost"
            );
        }
        self.frame_costs[frame_index] = actual;

        let buffers = &self.buffers[frame_index];
        let cells: Vec<&Bacillus> = self
            .lineage
            .frame(frame_index)
            .node_ids()
            .map(|id| self.lineage.cell(id))
            .collect();
        let overlay = render_overlay(&buffers.real, &cells);
        let residual = self.options.emit_residual.then(|| {
            render_residual(
                &buffers.real,
                &buffers.synth,
                self.config.residual_vmin,
                self.config.residual_vmax,
            )
        });
        info!(
            frame = frame_index,
            cost = actual,
            cells = cells.len(),
            "frame finished"
        );
        sink.emit_frame(&FrameArtifacts {
            frame_index,
            bestfit: &buffers.synth,
            overlay,
            residual,
        })
    }

    fn lineage_rows(&self) -> Vec<LineageRow> {
        let mut rows = Vec::new();
        for frame_index in 0..self.lineage.frame_count() {
            for id in self.lineage.frame(frame_index).node_ids() {
                let cell = self.lineage.cell(id);
                rows.push(LineageRow {
                    frame_index,
                    name: cell.name.clone(),
                    x: cell.x,
                    y: cell.y,
                    width: cell.width,
                    length: cell.length,
                    rotation: cell.rotation,
                });
            }
        }
        rows
    }

    fn cost_params(&self) -> CostParams {
        CostParams {
            overlap_cost: self.config.overlap_cost,
            cell_importance: self.config.cell_importance,
        }
    }
}

/// Bracket start/end temperatures by probing the bad-move acceptance
/// rate over the leading window. Every probe starts from a fresh copy of
/// the initial state so earlier probes cannot bias later ones.
pub fn calibrate_temperatures(
    config: &Config,
    realimages: &[Array2<f64>],
    initial_colony: &[Bacillus],
    use_distance_objective: bool,
    seed: Option<u64>,
) -> Result<TemperatureRange> {
    calibrate(|temperature| {
        let options = RunOptions {
            temperatures: TemperatureRange {
                start: temperature,
                end: temperature,
            },
            iterations_per_cell: PROBE_ITERATIONS_PER_CELL,
            use_distance_objective,
            emit_residual: false,
            seed,
        };
        let mut optimizer = Optimizer::new(config, realimages, initial_colony, options)?;
        let pbad = optimizer.probe_pbad(temperature)?;
        info!(temperature, pbad, "calibration probe");
        Ok(pbad)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::testing::example;

    const SHAPE: (usize, usize) = (30, 30);

    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<usize>,
        residuals: usize,
        rows: Vec<LineageRow>,
    }

    impl FrameSink for RecordingSink {
        fn emit_frame(&mut self, artifacts: &FrameArtifacts<'_>) -> Result<()> {
            self.frames.push(artifacts.frame_index);
            if artifacts.residual.is_some() {
                self.residuals += 1;
            }
            Ok(())
        }
        fn emit_lineage(&mut self, rows: &[LineageRow]) -> Result<()> {
            self.rows = rows.to_vec();
            Ok(())
        }
    }

    fn options() -> RunOptions {
        RunOptions {
            temperatures: TemperatureRange {
                start: 10.0,
                end: 0.01,
            },
            iterations_per_cell: 3,
            use_distance_objective: false,
            emit_residual: true,
            seed: Some(42),
        }
    }

    fn colony() -> Vec<Bacillus> {
        vec![Bacillus::new("a", 15.0, 15.0, 6.0, 14.0, 0.0)]
    }

    #[test]
    fn window_schedule_emits_every_frame_once() {
        let config = example();
        let realimages = vec![Array2::zeros(SHAPE); 5];
        let mut sink = RecordingSink::default();

        let mut optimizer =
            Optimizer::new(&config, &realimages, &colony(), options()).unwrap();
        optimizer.run(&mut sink).unwrap();

        assert_eq!(sink.frames, vec![0, 1, 2, 3, 4]);
        assert_eq!(sink.residuals, 5);
        // Every frame contributes at least one lineage row.
        for frame in 0..5 {
            assert!(sink.rows.iter().any(|row| row.frame_index == frame));
        }
    }

    #[test]
    fn initial_colony_must_satisfy_the_invariants() {
        let config = example();
        let realimages = vec![Array2::zeros(SHAPE); 2];
        let bad = vec![Bacillus::new("far", 200.0, 200.0, 6.0, 14.0, 0.0)];
        let err = Optimizer::new(&config, &realimages, &bad, options()).unwrap_err();
        assert!(matches!(
            err,
            Error::InitialConstraintViolation { name } if name == "far"
        ));
    }

    #[test]
    fn probe_reports_a_probability() {
        let config = example();
        let realimages = vec![Array2::zeros(SHAPE); 3];
        let mut optimizer =
            Optimizer::new(&config, &realimages, &colony(), options()).unwrap();
        let pbad = optimizer.probe_pbad(1.0).unwrap();
        assert!((0.0..=1.0).contains(&pbad));
        // The probe touches only the leading window.
        assert_eq!(optimizer.lineage.frame_count(), 1);
    }

    #[test]
    fn distance_objective_builds_weight_maps() {
        let mut opts = options();
        opts.use_distance_objective = true;
        let config = example();
        let realimages = vec![Array2::from_elem(SHAPE, 1.0); 3];
        let mut sink = RecordingSink::default();
        let mut optimizer = Optimizer::new(&config, &realimages, &colony(), opts).unwrap();
        optimizer.run(&mut sink).unwrap();
        assert!(optimizer.buffers.iter().all(|b| b.distmap.is_some()));
    }
}
