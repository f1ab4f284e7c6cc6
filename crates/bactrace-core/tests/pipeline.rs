// crates/bactrace-core/tests/pipeline.rs

//! End-to-end runs of the sliding-window driver on rendered scenes.
//!
//! The "real" images are themselves renders of a known colony, so the
//! optimizer starts near the optimum and every run exercises the full
//! window schedule, buffer ledger, and sink protocol.

use ndarray::Array2;

use bactrace_core::engine::{FrameArtifacts, FrameSink, LineageRow};
use bactrace_core::render::generate_synthetic_image;
use bactrace_core::{
    Bacillus, Config, Optimizer, Result, RunOptions, TemperatureRange,
};

const CONFIG_JSON: &str = r#"{
    "global.framesPerSecond": 1.0,
    "global.pixelsPerMicron": 1.0,
    "global.cellType": "bacilli",
    "bacilli.maxSpeed": 10.0,
    "bacilli.maxSpin": 1.0,
    "bacilli.minGrowth": -2.0,
    "bacilli.maxGrowth": 2.0,
    "bacilli.minWidth": 3.0,
    "bacilli.maxWidth": 9.0,
    "bacilli.minLength": 10.0,
    "bacilli.maxLength": 50.0,
    "bacilli.distanceCostDivisor": 1.0,
    "overlap.cost": 1.0,
    "cell.importance": 1.0,
    "split.cost": 10.0,
    "global_optimizer.window_size": 3,
    "prob.perturbation": 0.85,
    "prob.combine": 0.05,
    "prob.split": 0.1,
    "perturbation": {
        "prob.x": 0.35,
        "prob.y": 0.35,
        "prob.width": 0.1,
        "prob.length": 0.2,
        "prob.rotation": 0.2,
        "prob.background_offset": 0.0,
        "modification.x.mu": 0.0,
        "modification.x.sigma": 0.5,
        "modification.y.mu": 0.0,
        "modification.y.sigma": 0.5,
        "modification.width.mu": 0.0,
        "modification.width.sigma": 0.1,
        "modification.length.mu": 0.0,
        "modification.length.sigma": 1.0,
        "modification.rotation.mu": 0.0,
        "modification.rotation.sigma": 0.2,
        "modification.background_offset.mu": 0.0,
        "modification.background_offset.sigma": 0.01
    },
    "simulation": {
        "image.type": "binary",
        "background.color": 0.0
    },
    "residual.vmin": -1.0,
    "residual.vmax": 1.0
}"#;

const SHAPE: (usize, usize) = (40, 40);

fn colony() -> Vec<Bacillus> {
    vec![Bacillus::new("a", 20.0, 20.0, 6.0, 14.0, 0.0)]
}

/// Render "real" micrographs straight from the colony.
fn scene(config: &Config, frames: usize) -> Vec<Array2<f64>> {
    let cells = colony();
    let (real, _) =
        generate_synthetic_image(cells.iter(), SHAPE, &config.simulation);
    vec![real; frames]
}

#[derive(Default)]
struct RecordingSink {
    frames: Vec<usize>,
    rows: Vec<LineageRow>,
}

impl FrameSink for RecordingSink {
    fn emit_frame(&mut self, artifacts: &FrameArtifacts<'_>) -> Result<()> {
        self.frames.push(artifacts.frame_index);
        assert_eq!(artifacts.bestfit.dim(), SHAPE);
        assert_eq!(artifacts.overlay.dim(), (SHAPE.0, SHAPE.1, 3));
        Ok(())
    }

    fn emit_lineage(&mut self, rows: &[LineageRow]) -> Result<()> {
        self.rows = rows.to_vec();
        Ok(())
    }
}

fn options(seed: u64) -> RunOptions {
    RunOptions {
        temperatures: TemperatureRange {
            start: 5.0,
            end: 0.001,
        },
        iterations_per_cell: 20,
        use_distance_objective: false,
        emit_residual: false,
        seed: Some(seed),
    }
}

#[test]
fn five_frame_run_emits_all_frames_in_order() {
    let config = Config::from_json(CONFIG_JSON).unwrap();
    let realimages = scene(&config, 5);
    let mut sink = RecordingSink::default();

    let mut optimizer = Optimizer::new(&config, &realimages, &colony(), options(1)).unwrap();
    let cost = optimizer.run(&mut sink).unwrap();

    assert_eq!(sink.frames, vec![0, 1, 2, 3, 4]);
    assert!(cost.is_finite());

    // Every frame has rows, every row descends from the seed cell.
    for frame in 0..5 {
        assert!(sink.rows.iter().any(|row| row.frame_index == frame));
    }
    assert!(sink.rows.iter().all(|row| row.name.starts_with('a')));
}

#[test]
fn distance_objective_run_completes() {
    let config = Config::from_json(CONFIG_JSON).unwrap();
    let realimages = scene(&config, 3);
    let mut sink = RecordingSink::default();

    let mut opts = options(2);
    opts.use_distance_objective = true;
    let mut optimizer = Optimizer::new(&config, &realimages, &colony(), opts).unwrap();
    let cost = optimizer.run(&mut sink).unwrap();

    assert_eq!(sink.frames, vec![0, 1, 2]);
    assert!(cost.is_finite());
}

#[test]
fn seeded_runs_are_reproducible() {
    let config = Config::from_json(CONFIG_JSON).unwrap();
    let realimages = scene(&config, 3);

    let run = |seed: u64| {
        let mut sink = RecordingSink::default();
        let mut optimizer =
            Optimizer::new(&config, &realimages, &colony(), options(seed)).unwrap();
        let cost = optimizer.run(&mut sink).unwrap();
        (cost, sink.rows)
    };

    let (cost_a, rows_a) = run(7);
    let (cost_b, rows_b) = run(7);
    assert_eq!(cost_a, cost_b);
    assert_eq!(rows_a, rows_b);
}
