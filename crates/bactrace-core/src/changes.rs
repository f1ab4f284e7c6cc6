// crates/bactrace-core/src/changes.rs

//! Candidate edits to one frame of the lineage.
//!
//! Each change is single-shot: it is built against a snapshot of the
//! target node, validated against the biological constraints, scored
//! over the local region it touches, and (if accepted) applied exactly
//! once. The cost delta replays the edit on cloned buffers, so the local
//! delta equals the full-image delta.
//!
//! Four kinds exist: perturb one cell's parameters, move a division one
//! frame earlier (split), move it one frame later (combine), and shift a
//! frame's background level.

use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::cell::Bacillus;
use crate::config::{Config, ImageType, SimulationConfig};
use crate::constraints::check_constraints;
use crate::geometry::Rect;
use crate::lineage::{Lineage, NodeId};
use crate::render::{draw_cell, generate_synthetic_image, simulated_region, Polarity};
use crate::scoring::{region_cost, CostParams, FrameBuffers};

/// Sampling attempts before a perturbation is abandoned.
const MAX_SAMPLE_ATTEMPTS: usize = 50;

/// Empirical division probability as a function of cell length; zero
/// outside the observed division range.
#[must_use]
pub fn split_proba(length: f64) -> f64 {
    use std::f64::consts::PI;
    if (14.0..=45.0).contains(&length) {
        ((length - 14.0) / (2.0 * PI * PI)).sin()
    } else {
        0.0
    }
}

/// Gaussian increment; degenerate sigmas collapse to the mean.
fn gauss<R: Rng + ?Sized>(rng: &mut R, mu: f64, sigma: f64) -> f64 {
    Normal::new(mu, sigma).map_or(mu, |n| n.sample(rng))
}

/// Replay removals and additions on cloned buffers and return the local
/// cost delta over the union of the touched regions.
fn redraw_delta(
    bufs: &FrameBuffers,
    sim: &SimulationConfig,
    params: CostParams,
    remove: &[&Bacillus],
    add: &[&Bacillus],
) -> f64 {
    let mut region: Option<Rect> = None;
    for cell in remove.iter().chain(add.iter()) {
        let r = simulated_region(cell, sim);
        region = Some(region.map_or(r, |acc| acc.union(r)));
    }
    let Some(region) = region else {
        return 0.0;
    };

    let start = bufs.cost(region, params);
    let mut synth = bufs.synth.clone();
    let mut cellmap = bufs.cellmap.clone();
    for cell in remove {
        draw_cell(&mut synth, &mut cellmap, cell, Polarity::Background, sim);
    }
    for cell in add {
        draw_cell(&mut synth, &mut cellmap, cell, Polarity::Cell, sim);
    }
    let end = region_cost(
        &bufs.real,
        &synth,
        &cellmap,
        bufs.distmap.as_ref(),
        region,
        params,
    );
    end - start
}

/* ------------------------------ perturbation ------------------------------ */

/// Replace one cell with a randomly nudged copy.
#[derive(Clone, Debug)]
pub struct Perturbation {
    node: NodeId,
    frame_index: usize,
    old_cell: Bacillus,
    replacement: Bacillus,
}

impl Perturbation {
    /// Sample a replacement for `node`'s cell.
    ///
    /// Attribute selection is a Bernoulli vector over
    /// `{x, y, width, length, rotation}` (plus opacity in graySynthetic
    /// mode, which is drawn but never modified); an all-miss vector is
    /// redrawn so at least one attribute changes. The whole sampling is
    /// retried until the candidate validates, up to 50 times; `None`
    /// means the proposal is abandoned.
    pub fn propose<R: Rng + ?Sized>(
        lineage: &Lineage,
        node: NodeId,
        frame_index: usize,
        config: &Config,
        shape: (usize, usize),
        rng: &mut R,
    ) -> Option<Self> {
        let cell = lineage.cell(node).clone();
        let p = &config.perturbation;
        let gray = lineage.frame(frame_index).simulation.image_type == ImageType::GraySynthetic;

        let mut probs = vec![p.prob_x, p.prob_y, p.prob_width, p.prob_length, p.prob_rotation];
        if gray {
            probs.push(p.prob_opacity);
        }

        for _ in 0..MAX_SAMPLE_ATTEMPTS {
            let mut draws: Vec<f64> = probs.iter().map(|_| rng.random()).collect();
            while draws.iter().zip(&probs).all(|(d, prob)| d >= prob) {
                draws = probs.iter().map(|_| rng.random()).collect();
            }

            let mut replacement = cell.clone();
            if draws[0] < probs[0] {
                replacement.x = cell.x + gauss(rng, p.x_mu, p.x_sigma);
            }
            if draws[1] < probs[1] {
                replacement.y = cell.y + gauss(rng, p.y_mu, p.y_sigma);
            }
            if draws[2] < probs[2] {
                replacement.width = cell.width + gauss(rng, p.width_mu, p.width_sigma);
            }
            if draws[3] < probs[3] {
                replacement.length = cell.length + gauss(rng, p.length_mu, p.length_sigma);
            }
            if draws[4] < probs[4] {
                replacement.rotation = cell.rotation + gauss(rng, p.rotation_mu, p.rotation_sigma);
            }
            // An opacity draw (index 5) can be selected in gray mode but
            // has no modification handler.

            let candidate = Self {
                node,
                frame_index,
                old_cell: cell.clone(),
                replacement,
            };
            if candidate.is_valid(lineage, config, shape) {
                return Some(candidate);
            }
        }
        None
    }

    #[must_use]
    pub fn is_valid(&self, lineage: &Lineage, config: &Config, shape: (usize, usize)) -> bool {
        let sim = lineage.frame(self.frame_index).simulation;
        check_constraints(
            &config.bounds(),
            sim.image_type,
            shape,
            &[&self.replacement],
            &self.pair_checks(lineage),
        )
    }

    /// Pairs to check: the parent in the previous frame (re-projected
    /// through the stored split fraction when the parent divided) and
    /// each child in the next frame (likewise re-projected when this
    /// node divides).
    fn pair_checks(&self, lineage: &Lineage) -> Vec<(Bacillus, Bacillus)> {
        let mut pairs = Vec::new();
        let node = lineage.node(self.node);

        if let Some(parent_id) = node.parent {
            let parent = lineage.node(parent_id);
            match parent.children.len() {
                1 => pairs.push((parent.cell.clone(), self.replacement.clone())),
                2 => {
                    if let Some(alpha) = node.cell.split_alpha {
                        let (p1, p2) = parent.cell.split(alpha);
                        if p1.name == self.replacement.name {
                            pairs.push((p1, self.replacement.clone()));
                        } else if p2.name == self.replacement.name {
                            pairs.push((p2, self.replacement.clone()));
                        }
                    }
                }
                _ => {}
            }
        }

        match node.children.len() {
            1 => pairs.push((
                self.replacement.clone(),
                lineage.cell(node.children[0]).clone(),
            )),
            2 => {
                if let Some(alpha) = lineage.cell(node.children[0]).split_alpha {
                    let (p1, p2) = self.replacement.split(alpha);
                    for &child in &node.children {
                        let child_cell = lineage.cell(child);
                        if child_cell.name == p1.name {
                            pairs.push((p1.clone(), child_cell.clone()));
                        } else if child_cell.name == p2.name {
                            pairs.push((p2.clone(), child_cell.clone()));
                        }
                    }
                }
            }
            _ => {}
        }
        pairs
    }

    #[must_use]
    pub fn costdiff(&self, bufs: &FrameBuffers, sim: &SimulationConfig, params: CostParams) -> f64 {
        redraw_delta(bufs, sim, params, &[&self.old_cell], &[&self.replacement])
    }

    pub fn apply(self, lineage: &mut Lineage, bufs: &mut FrameBuffers) {
        let sim = lineage.frame(self.frame_index).simulation;
        draw_cell(
            &mut bufs.synth,
            &mut bufs.cellmap,
            &self.old_cell,
            Polarity::Background,
            &sim,
        );
        draw_cell(
            &mut bufs.synth,
            &mut bufs.cellmap,
            &self.replacement,
            Polarity::Cell,
            &sim,
        );
        lineage.add_cell(self.frame_index, self.replacement);
    }
}

/* --------------------------------- split --------------------------------- */

/// Move a division one frame earlier: the selected node, its parent's
/// only child, is replaced by two daughters in its own frame.
#[derive(Clone, Debug)]
pub struct SplitChange {
    parent: NodeId,
    child: NodeId,
    frame_index: usize,
    child_cell: Bacillus,
    s1: Bacillus,
    s2: Bacillus,
}

impl SplitChange {
    /// Split the selected node at a fraction drawn from `[0.4, 0.6]`.
    pub fn propose<R: Rng + ?Sized>(
        lineage: &Lineage,
        selected: NodeId,
        frame_index: usize,
        rng: &mut R,
    ) -> Option<Self> {
        let parent_id = lineage.node(selected).parent?;
        if lineage.node(parent_id).children.len() != 1 {
            return None;
        }
        let alpha = 0.4 + 0.2 * rng.random::<f64>();
        let child_cell = lineage.cell(selected).clone();
        let (s1, s2) = child_cell.split(alpha);
        Some(Self {
            parent: parent_id,
            child: selected,
            frame_index,
            child_cell,
            s1,
            s2,
        })
    }

    #[must_use]
    pub fn is_valid(&self, lineage: &Lineage, config: &Config, shape: (usize, usize)) -> bool {
        let parent = lineage.node(self.parent);
        if parent.children.len() != 1 {
            return false;
        }
        // Grandchildren must rejoin the daughters by name, so exactly one
        // is unresolvable.
        let grandchildren = &lineage.node(self.child).children;
        if grandchildren.len() == 1 {
            return false;
        }

        let mut pairs = Vec::new();
        if let Some(alpha) = self.s1.split_alpha {
            let (p1, p2) = parent.cell.split(alpha);
            for projected in [p1, p2] {
                if projected.name == self.s1.name {
                    pairs.push((projected, self.s1.clone()));
                } else if projected.name == self.s2.name {
                    pairs.push((projected, self.s2.clone()));
                }
            }
        }
        for &gc in grandchildren {
            let gc_cell = lineage.cell(gc);
            if gc_cell.name == self.s1.name {
                pairs.push((self.s1.clone(), gc_cell.clone()));
            } else if gc_cell.name == self.s2.name {
                pairs.push((self.s2.clone(), gc_cell.clone()));
            }
        }

        let sim = lineage.frame(self.frame_index).simulation;
        check_constraints(
            &config.bounds(),
            sim.image_type,
            shape,
            &[&self.s1, &self.s2],
            &pairs,
        )
    }

    #[must_use]
    pub fn costdiff(
        &self,
        bufs: &FrameBuffers,
        sim: &SimulationConfig,
        params: CostParams,
        split_cost: f64,
    ) -> f64 {
        redraw_delta(
            bufs,
            sim,
            params,
            &[&self.child_cell],
            &[&self.s1, &self.s2],
        ) + split_cost
    }

    pub fn apply(self, lineage: &mut Lineage, bufs: &mut FrameBuffers) {
        let sim = lineage.frame(self.frame_index).simulation;
        draw_cell(
            &mut bufs.synth,
            &mut bufs.cellmap,
            &self.child_cell,
            Polarity::Background,
            &sim,
        );
        draw_cell(&mut bufs.synth, &mut bufs.cellmap, &self.s1, Polarity::Cell, &sim);
        draw_cell(&mut bufs.synth, &mut bufs.cellmap, &self.s2, Polarity::Cell, &sim);

        let s1_name = self.s1.name.clone();
        let s2_name = self.s2.name.clone();
        let grandchildren = lineage.clear_children(self.child);
        lineage.frame_remove(self.frame_index, &self.child_cell.name);
        lineage.clear_children(self.parent);
        let n1 = lineage.make_child(self.parent, self.s1);
        let n2 = lineage.make_child(self.parent, self.s2);
        lineage.frame_insert(self.frame_index, n1);
        lineage.frame_insert(self.frame_index, n2);
        for gc in grandchildren {
            let name = lineage.cell(gc).name.clone();
            if name == s1_name {
                lineage.adopt(n1, gc);
            } else if name == s2_name {
                lineage.adopt(n2, gc);
            }
        }
    }
}

/* -------------------------------- combine -------------------------------- */

/// Move a division one frame later: the selected node's parent has two
/// children, which are merged back into one cell in their frame.
#[derive(Clone, Debug)]
pub struct CombineChange {
    parent: NodeId,
    frame_index: usize,
    children: [NodeId; 2],
    child_cells: [Bacillus; 2],
    combination: Bacillus,
}

impl CombineChange {
    pub fn propose(lineage: &Lineage, selected: NodeId, frame_index: usize) -> Option<Self> {
        let parent_id = lineage.node(selected).parent?;
        let parent = lineage.node(parent_id);
        if parent.children.len() != 2 {
            return None;
        }
        let c0 = parent.children[0];
        let c1 = parent.children[1];
        let cell0 = lineage.cell(c0).clone();
        let cell1 = lineage.cell(c1).clone();
        let combination = cell0.combine(&cell1);
        Some(Self {
            parent: parent_id,
            frame_index,
            children: [c0, c1],
            child_cells: [cell0, cell1],
            combination,
        })
    }

    #[must_use]
    pub fn is_valid(&self, lineage: &Lineage, config: &Config, shape: (usize, usize)) -> bool {
        let parent = lineage.node(self.parent);
        if parent.children.len() != 2 {
            return false;
        }
        let grandchildren = lineage.grandchildren(self.parent);
        if grandchildren.len() > 2 {
            return false;
        }

        let mut pairs = vec![(parent.cell.clone(), self.combination.clone())];
        if let Some(alpha) = self.child_cells[0].split_alpha {
            let (p1, p2) = self.combination.split(alpha);
            for &gc in &grandchildren {
                let gc_cell = lineage.cell(gc);
                if gc_cell.name == p1.name {
                    pairs.push((p1.clone(), gc_cell.clone()));
                } else if gc_cell.name == p2.name {
                    pairs.push((p2.clone(), gc_cell.clone()));
                }
            }
        }

        let sim = lineage.frame(self.frame_index).simulation;
        check_constraints(
            &config.bounds(),
            sim.image_type,
            shape,
            &[&self.combination],
            &pairs,
        )
    }

    #[must_use]
    pub fn costdiff(
        &self,
        bufs: &FrameBuffers,
        sim: &SimulationConfig,
        params: CostParams,
        split_cost: f64,
    ) -> f64 {
        redraw_delta(
            bufs,
            sim,
            params,
            &[&self.child_cells[0], &self.child_cells[1]],
            &[&self.combination],
        ) - split_cost
    }

    pub fn apply(self, lineage: &mut Lineage, bufs: &mut FrameBuffers) {
        let sim = lineage.frame(self.frame_index).simulation;
        for cell in &self.child_cells {
            draw_cell(&mut bufs.synth, &mut bufs.cellmap, cell, Polarity::Background, &sim);
        }
        draw_cell(
            &mut bufs.synth,
            &mut bufs.cellmap,
            &self.combination,
            Polarity::Cell,
            &sim,
        );

        let grandchildren = lineage.grandchildren(self.parent);
        for (id, cell) in self.children.iter().zip(&self.child_cells) {
            lineage.clear_children(*id);
            lineage.frame_remove(self.frame_index, &cell.name);
        }
        lineage.clear_children(self.parent);
        let combined = lineage.make_child(self.parent, self.combination);
        lineage.frame_insert(self.frame_index, combined);
        for gc in grandchildren {
            lineage.adopt(combined, gc);
        }
    }
}

/* ---------------------------- background offset --------------------------- */

/// Shift a frame's background level and re-render its synthetic image.
#[derive(Clone, Debug)]
pub struct BackgroundOffset {
    frame_index: usize,
    new_simulation: SimulationConfig,
    new_synth: Array2<f64>,
}

impl BackgroundOffset {
    pub fn propose<R: Rng + ?Sized>(
        lineage: &Lineage,
        frame_index: usize,
        config: &Config,
        shape: (usize, usize),
        rng: &mut R,
    ) -> Self {
        let mut sim = lineage.frame(frame_index).simulation;
        sim.background_color += gauss(
            rng,
            config.perturbation.background_offset_mu,
            config.perturbation.background_offset_sigma,
        );
        let cells: Vec<&Bacillus> = lineage
            .frame(frame_index)
            .node_ids()
            .map(|id| lineage.cell(id))
            .collect();
        let (new_synth, _) = generate_synthetic_image(cells, shape, &sim);
        Self {
            frame_index,
            new_simulation: sim,
            new_synth,
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.new_simulation.background_color > 0.0
    }

    #[must_use]
    pub fn costdiff(&self, bufs: &FrameBuffers, params: CostParams) -> f64 {
        let region = Rect::of_shape(bufs.shape());
        let start = bufs.cost(region, params);
        let end = region_cost(
            &bufs.real,
            &self.new_synth,
            &bufs.cellmap,
            bufs.distmap.as_ref(),
            region,
            params,
        );
        end - start
    }

    pub fn apply(self, lineage: &mut Lineage, bufs: &mut FrameBuffers) {
        bufs.synth = self.new_synth;
        *lineage.simulation_mut(self.frame_index) = self.new_simulation;
    }
}

/* ------------------------------- dispatch -------------------------------- */

/// A validated-or-not candidate edit; the driver pattern-matches.
#[derive(Clone, Debug)]
pub enum Proposal {
    Perturb(Perturbation),
    Split(SplitChange),
    Combine(CombineChange),
    Background(BackgroundOffset),
}

impl Proposal {
    #[must_use]
    pub fn is_valid(&self, lineage: &Lineage, config: &Config, shape: (usize, usize)) -> bool {
        match self {
            Self::Perturb(p) => p.is_valid(lineage, config, shape),
            Self::Split(s) => s.is_valid(lineage, config, shape),
            Self::Combine(c) => c.is_valid(lineage, config, shape),
            Self::Background(b) => b.is_valid(),
        }
    }

    /// Local cost delta, including the division prior for structural
    /// edits.
    #[must_use]
    pub fn costdiff(&self, lineage: &Lineage, bufs: &FrameBuffers, config: &Config) -> f64 {
        let params = CostParams {
            overlap_cost: config.overlap_cost,
            cell_importance: config.cell_importance,
        };
        match self {
            Self::Perturb(p) => {
                let sim = lineage.frame(p.frame_index).simulation;
                p.costdiff(bufs, &sim, params)
            }
            Self::Split(s) => {
                let sim = lineage.frame(s.frame_index).simulation;
                s.costdiff(bufs, &sim, params, config.split_cost)
            }
            Self::Combine(c) => {
                let sim = lineage.frame(c.frame_index).simulation;
                c.costdiff(bufs, &sim, params, config.split_cost)
            }
            Self::Background(b) => b.costdiff(bufs, params),
        }
    }

    pub fn apply(self, lineage: &mut Lineage, bufs: &mut FrameBuffers) {
        match self {
            Self::Perturb(p) => p.apply(lineage, bufs),
            Self::Split(s) => s.apply(lineage, bufs),
            Self::Combine(c) => c.apply(lineage, bufs),
            Self::Background(b) => b.apply(lineage, bufs),
        }
    }
}

/// Edit families, sampled per iteration from the configured categorical
/// distribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Split,
    Perturbation,
    Combine,
    BackgroundOffset,
}

pub fn sample_change_kind<R: Rng + ?Sized>(config: &Config, rng: &mut R) -> ChangeKind {
    let u: f64 = rng.random();
    let mut acc = config.prob_split;
    if u < acc {
        return ChangeKind::Split;
    }
    acc += config.prob_perturbation;
    if u < acc {
        return ChangeKind::Perturbation;
    }
    acc += config.prob_combine;
    if u < acc {
        return ChangeKind::Combine;
    }
    ChangeKind::BackgroundOffset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::testing::example;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SHAPE: (usize, usize) = (40, 40);

    fn buffers_for_frame(lineage: &Lineage, frame_index: usize) -> FrameBuffers {
        let sim = lineage.frame(frame_index).simulation;
        let cells: Vec<&Bacillus> = lineage
            .frame(frame_index)
            .node_ids()
            .map(|id| lineage.cell(id))
            .collect();
        let (synth, cellmap) = generate_synthetic_image(cells, SHAPE, &sim);
        FrameBuffers {
            real: Array2::zeros(SHAPE),
            synth,
            cellmap,
            distmap: None,
        }
    }

    fn params(config: &Config) -> CostParams {
        CostParams {
            overlap_cost: config.overlap_cost,
            cell_importance: config.cell_importance,
        }
    }

    fn two_frame_lineage(length: f64) -> (Config, Lineage) {
        let config = example();
        let mut lineage = Lineage::new(config.simulation);
        lineage.add_cell(0, Bacillus::new("a", 20.0, 20.0, 6.0, length, 0.0));
        lineage.copy_forward();
        (config, lineage)
    }

    #[test]
    fn growth_within_limits_is_valid_and_applies() {
        let (config, mut lineage) = two_frame_lineage(14.0);
        let node = lineage.frame(1).get("a").unwrap();
        let mut replacement = lineage.cell(node).clone();
        replacement.length = 14.5;

        let change = Perturbation {
            node,
            frame_index: 1,
            old_cell: lineage.cell(node).clone(),
            replacement,
        };
        assert!(change.is_valid(&lineage, &config, SHAPE));

        let mut bufs = buffers_for_frame(&lineage, 1);
        let before = bufs.full_cost(params(&config));
        let sim = lineage.frame(1).simulation;
        let costdiff = change.costdiff(&bufs, &sim, params(&config));
        change.apply(&mut lineage, &mut bufs);
        let after = bufs.full_cost(params(&config));

        // Local delta matches the full-image delta.
        assert_abs_diff_eq!(after - before, costdiff, epsilon = 1e-7);
        assert_abs_diff_eq!(lineage.cell(node).length, 14.5, epsilon = 1e-12);

        // The updated frame still round-trips against a fresh render.
        let fresh = buffers_for_frame(&lineage, 1);
        assert_eq!(fresh.synth, bufs.synth);
        assert_eq!(fresh.cellmap, bufs.cellmap);
    }

    #[test]
    fn illegal_growth_is_rejected() {
        let (config, lineage) = two_frame_lineage(14.0);
        let node = lineage.frame(1).get("a").unwrap();
        let mut replacement = lineage.cell(node).clone();
        replacement.length = 30.0;

        let change = Perturbation {
            node,
            frame_index: 1,
            old_cell: lineage.cell(node).clone(),
            replacement,
        };
        assert!(!change.is_valid(&lineage, &config, SHAPE));
    }

    #[test]
    fn split_then_combine_restores_the_frame() {
        let (config, mut lineage) = two_frame_lineage(30.0);
        let mut bufs = buffers_for_frame(&lineage, 1);
        let mut rng = StdRng::seed_from_u64(11);

        let node = lineage.frame(1).get("a").unwrap();
        let split = SplitChange::propose(&lineage, node, 1, &mut rng).unwrap();
        assert!(split.is_valid(&lineage, &config, SHAPE));

        let sim = lineage.frame(1).simulation;
        let split_delta = split.costdiff(&bufs, &sim, params(&config), config.split_cost);
        let before = bufs.full_cost(params(&config));
        split.apply(&mut lineage, &mut bufs);
        let after = bufs.full_cost(params(&config));
        // Image delta excludes the division prior.
        assert_abs_diff_eq!(after - before, split_delta - config.split_cost, epsilon = 1e-7);

        assert!(lineage.frame(1).get("a").is_none());
        let d0 = lineage.frame(1).get("a0").unwrap();
        assert!(lineage.frame(1).get("a1").is_some());

        let combine = CombineChange::propose(&lineage, d0, 1).unwrap();
        assert!(combine.is_valid(&lineage, &config, SHAPE));
        combine.apply(&mut lineage, &mut bufs);

        assert_eq!(lineage.frame(1).len(), 1);
        let merged = lineage.cell(lineage.frame(1).get("a").unwrap());
        assert_abs_diff_eq!(merged.length, 30.0, epsilon = 1e-6);
        assert_abs_diff_eq!(merged.x, 20.0, epsilon = 1e-6);
        assert_abs_diff_eq!(merged.y, 20.0, epsilon = 1e-6);
    }

    #[test]
    fn perturbation_sampler_changes_at_least_one_attribute() {
        let (config, lineage) = two_frame_lineage(14.0);
        let node = lineage.frame(1).get("a").unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let change =
            Perturbation::propose(&lineage, node, 1, &config, SHAPE, &mut rng).unwrap();
        assert_ne!(change.replacement, change.old_cell);
        assert!(change.is_valid(&lineage, &config, SHAPE));
    }

    #[test]
    fn background_offset_requires_positive_color() {
        let (mut config, mut lineage) = {
            let mut config = example();
            config.simulation.image_type = ImageType::GraySynthetic;
            config.simulation.background_color = 0.39;
            let mut lineage = Lineage::new(config.simulation);
            lineage.add_cell(0, Bacillus::new("a", 20.0, 20.0, 6.0, 14.0, 0.0));
            lineage.copy_forward();
            (config, lineage)
        };
        config.perturbation.background_offset_mu = -1.0;
        config.perturbation.background_offset_sigma = 0.0;
        let mut rng = StdRng::seed_from_u64(5);
        let negative = BackgroundOffset::propose(&lineage, 1, &config, SHAPE, &mut rng);
        assert!(!negative.is_valid());

        config.perturbation.background_offset_mu = 0.05;
        let positive = BackgroundOffset::propose(&lineage, 1, &config, SHAPE, &mut rng);
        assert!(positive.is_valid());

        let mut bufs = buffers_for_frame(&lineage, 1);
        let delta = positive.costdiff(&bufs, params(&config));
        let before = bufs.full_cost(params(&config));
        positive.apply(&mut lineage, &mut bufs);
        let after = bufs.full_cost(params(&config));
        assert_abs_diff_eq!(after - before, delta, epsilon = 1e-7);
        assert_abs_diff_eq!(
            lineage.frame(1).simulation.background_color,
            0.44,
            epsilon = 1e-12
        );
    }

    #[test]
    fn split_probability_window() {
        assert_eq!(split_proba(10.0), 0.0);
        assert_eq!(split_proba(50.0), 0.0);
        assert!(split_proba(30.0) > 0.0);
        assert!(split_proba(45.0) <= 1.0);
    }

    #[test]
    fn change_kind_sampling_covers_all_kinds() {
        let config = example();
        let mut rng = StdRng::seed_from_u64(9);
        let mut seen = [false; 4];
        for _ in 0..2000 {
            match sample_change_kind(&config, &mut rng) {
                ChangeKind::Split => seen[0] = true,
                ChangeKind::Perturbation => seen[1] = true,
                ChangeKind::Combine => seen[2] = true,
                ChangeKind::BackgroundOffset => seen[3] = true,
            }
        }
        assert!(seen.iter().all(|&s| s));
    }
}
