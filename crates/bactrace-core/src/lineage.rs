// crates/bactrace-core/src/lineage.rs

//! The lineage forest: time-ordered frames of named cells linked by
//! parent/child edges.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]; `parent` is a
//! plain back-reference, so there is no ownership cycle. Each frame maps
//! cell names to node ids. A node with two children marks a division
//! between its frame and the next. Structural edits detach nodes from
//! their frame map and parent; detached nodes stay in the arena but are
//! unreachable from then on.

use std::collections::BTreeMap;

use rand::Rng;

use crate::cell::Bacillus;
use crate::config::SimulationConfig;
use crate::error::{Error, Result};

/// Stable handle into the node arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One observed cell and its cross-frame links.
#[derive(Clone, Debug)]
pub struct CellNode {
    pub cell: Bacillus,
    pub parent: Option<NodeId>,
    /// 0, 1 (same cell persisting), or 2 (division).
    pub children: Vec<NodeId>,
}

/// One time step: name-to-node map plus that frame's rendering settings.
///
/// The name map is ordered so frame iteration (and thus seeded runs) is
/// deterministic.
#[derive(Clone, Debug)]
pub struct Frame {
    nodes: BTreeMap<String, NodeId>,
    pub simulation: SimulationConfig,
}

impl Frame {
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<NodeId> {
        self.nodes.get(name).copied()
    }

    /// Node ids in name order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.values().copied()
    }
}

/// The whole forest. Frames are appended, never removed.
#[derive(Clone, Debug)]
pub struct Lineage {
    arena: Vec<CellNode>,
    frames: Vec<Frame>,
}

impl Lineage {
    /// Start with a single empty frame carrying `sim`.
    #[must_use]
    pub fn new(sim: SimulationConfig) -> Self {
        Self {
            arena: Vec::new(),
            frames: vec![Frame {
                nodes: BTreeMap::new(),
                simulation: sim,
            }],
        }
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn frame(&self, index: usize) -> &Frame {
        &self.frames[index]
    }

    pub fn simulation_mut(&mut self, frame_index: usize) -> &mut SimulationConfig {
        &mut self.frames[frame_index].simulation
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &CellNode {
        &self.arena[id.0]
    }

    #[must_use]
    pub fn cell(&self, id: NodeId) -> &Bacillus {
        &self.arena[id.0].cell
    }

    /// Children of `id`'s children, flattened in order.
    #[must_use]
    pub fn grandchildren(&self, id: NodeId) -> Vec<NodeId> {
        self.arena[id.0]
            .children
            .iter()
            .flat_map(|&child| self.arena[child.0].children.iter().copied())
            .collect()
    }

    /// Insert `cell` into `frame_index`, linking it to the previous frame.
    ///
    /// In order of preference: replace a same-name node in this frame,
    /// attach as child of the same-name node in the previous frame (the
    /// cell persisting), attach as child of the node whose name is
    /// `cell.name` minus its last character (a newly born daughter), or
    /// create a root.
    pub fn add_cell(&mut self, frame_index: usize, cell: Bacillus) -> NodeId {
        if let Some(&id) = self.frames[frame_index].nodes.get(&cell.name) {
            self.arena[id.0].cell = cell;
            return id;
        }

        let parent = frame_index.checked_sub(1).and_then(|prev| {
            let prev_frame = &self.frames[prev];
            prev_frame.nodes.get(&cell.name).copied().or_else(|| {
                let stem = &cell.name[..cell.name.len().saturating_sub(1)];
                prev_frame.nodes.get(stem).copied()
            })
        });

        let name = cell.name.clone();
        let id = NodeId(self.arena.len());
        self.arena.push(CellNode {
            cell,
            parent,
            children: Vec::new(),
        });
        if let Some(pid) = parent {
            self.arena[pid.0].children.push(id);
        }
        self.frames[frame_index].nodes.insert(name, id);
        id
    }

    /// Append an empty frame; its settings copy the current tail's.
    pub fn forward(&mut self) {
        let sim = self.frames[self.frames.len() - 1].simulation;
        self.frames.push(Frame {
            nodes: BTreeMap::new(),
            simulation: sim,
        });
    }

    /// [`Self::forward`], then re-add every tail cell as the initial
    /// estimate for the new frame.
    pub fn copy_forward(&mut self) {
        self.forward();
        let prev = self.frames.len() - 2;
        let cells: Vec<Bacillus> = self.frames[prev]
            .node_ids()
            .map(|id| self.arena[id.0].cell.clone())
            .collect();
        for cell in cells {
            self.add_cell(prev + 1, cell);
        }
    }

    #[must_use]
    pub fn total_cell_count(&self) -> usize {
        self.frames.iter().map(Frame::len).sum()
    }

    fn clamp_range(&self, start: isize, end: isize) -> (usize, usize) {
        let len = self.frames.len() as isize;
        let start = start.clamp(0, len) as usize;
        let end = end.clamp(start as isize, len) as usize;
        (start, end)
    }

    /// Number of cells across frames `[start, end)`, clipped to the
    /// existing frames.
    #[must_use]
    pub fn count_cells_in(&self, start: isize, end: isize) -> usize {
        let (start, end) = self.clamp_range(start, end);
        self.frames[start..end].iter().map(Frame::len).sum()
    }

    /// Draw a frame index in `[start, end)` weighted by per-frame cell
    /// count.
    pub fn choose_random_frame_index<R: Rng + ?Sized>(
        &self,
        start: isize,
        end: isize,
        rng: &mut R,
    ) -> Result<usize> {
        let (start, end) = self.clamp_range(start, end);
        let total = self.frames[start..end].iter().map(Frame::len).sum::<usize>();
        let mut threshold = (rng.random::<f64>() * total as f64) as usize;
        for index in start..end {
            let here = self.frames[index].len();
            if here > threshold {
                return Ok(index);
            }
            threshold -= here;
        }
        Err(Error::InternalInconsistency(
            "weighted frame choice exhausted the window",
        ))
    }

    /* ------------- surgery primitives for structural changes ------------- */

    /// Allocate a node for `cell` under `parent` without touching any
    /// frame map.
    pub fn make_child(&mut self, parent: NodeId, cell: Bacillus) -> NodeId {
        let id = NodeId(self.arena.len());
        self.arena.push(CellNode {
            cell,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.arena[parent.0].children.push(id);
        id
    }

    /// Register an existing node in a frame's name map.
    pub fn frame_insert(&mut self, frame_index: usize, id: NodeId) {
        let name = self.arena[id.0].cell.name.clone();
        self.frames[frame_index].nodes.insert(name, id);
    }

    /// Remove a name from a frame's map; the node itself stays allocated.
    pub fn frame_remove(&mut self, frame_index: usize, name: &str) -> Option<NodeId> {
        self.frames[frame_index].nodes.remove(name)
    }

    /// Detach and return all children of `id`.
    pub fn clear_children(&mut self, id: NodeId) -> Vec<NodeId> {
        let children = std::mem::take(&mut self.arena[id.0].children);
        for &child in &children {
            self.arena[child.0].parent = None;
        }
        children
    }

    /// Re-parent `child` under `parent`.
    pub fn adopt(&mut self, parent: NodeId, child: NodeId) {
        self.arena[child.0].parent = Some(parent);
        self.arena[parent.0].children.push(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::testing::example;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn cell(name: &str) -> Bacillus {
        Bacillus::new(name, 20.0, 20.0, 6.0, 14.0, 0.0)
    }

    fn lineage() -> Lineage {
        Lineage::new(example().simulation)
    }

    #[test]
    fn same_name_links_as_persisting_cell() {
        let mut lin = lineage();
        let root = lin.add_cell(0, cell("a"));
        lin.forward();
        let next = lin.add_cell(1, cell("a"));
        assert_eq!(lin.node(next).parent, Some(root));
        assert_eq!(lin.node(root).children, vec![next]);
    }

    #[test]
    fn daughter_names_link_to_the_divided_parent() {
        let mut lin = lineage();
        let root = lin.add_cell(0, cell("a"));
        lin.forward();
        let d0 = lin.add_cell(1, cell("a0"));
        let d1 = lin.add_cell(1, cell("a1"));
        assert_eq!(lin.node(d0).parent, Some(root));
        assert_eq!(lin.node(d1).parent, Some(root));
        assert_eq!(lin.node(root).children.len(), 2);
    }

    #[test]
    fn replacing_a_cell_keeps_the_node() {
        let mut lin = lineage();
        let id = lin.add_cell(0, cell("a"));
        let mut wider = cell("a");
        wider.width = 7.0;
        let same = lin.add_cell(0, wider);
        assert_eq!(id, same);
        assert_eq!(lin.cell(id).width, 7.0);
        assert_eq!(lin.frame(0).len(), 1);
    }

    #[test]
    fn copy_forward_carries_the_whole_frame() {
        let mut lin = lineage();
        lin.add_cell(0, cell("a"));
        lin.add_cell(0, cell("b"));
        lin.copy_forward();
        assert_eq!(lin.frame_count(), 2);
        assert_eq!(lin.frame(1).len(), 2);
        assert_eq!(lin.total_cell_count(), 4);
        assert_eq!(lin.count_cells_in(1, 2), 2);
        // Negative starts clip to frame zero.
        assert_eq!(lin.count_cells_in(-3, 1), 2);
    }

    #[test]
    fn random_frame_choice_lands_on_populated_frames() {
        let mut lin = lineage();
        lin.add_cell(0, cell("a"));
        lin.copy_forward();
        lin.copy_forward();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let index = lin.choose_random_frame_index(-1, 3, &mut rng).unwrap();
            assert!(index < 3);
            assert!(lin.frame(index).len() > 0);
        }
    }

    #[test]
    fn grandchildren_flatten_across_children() {
        let mut lin = lineage();
        let root = lin.add_cell(0, cell("a"));
        lin.forward();
        lin.add_cell(1, cell("a0"));
        lin.add_cell(1, cell("a1"));
        lin.forward();
        lin.add_cell(2, cell("a0"));
        lin.add_cell(2, cell("a1"));
        assert_eq!(lin.grandchildren(root).len(), 2);
    }
}
