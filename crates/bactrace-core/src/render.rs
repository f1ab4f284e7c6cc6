// crates/bactrace-core/src/render.rs

//! Rasterization of bacilli onto the synthetic image and the overlap
//! cell map.
//!
//! Coverage is conservative: a pixel belongs to a cell iff its integer
//! center lies inside the union of the body quadrilateral and the two
//! end-cap disks. Every draw clips to the image; out-of-bounds pixels are
//! dropped silently. Drawing with [`Polarity::Background`] reverses a
//! prior [`Polarity::Cell`] draw of the same cell on the same buffers.

use ndarray::{Array2, Array3};

use bactrace_imaging::{draw_arc, draw_line, gaussian_blur};

use crate::cell::{Bacillus, Body};
use crate::config::{ImageType, SimulationConfig};
use crate::geometry::{Rect, Vec3};

/// Rendering levels for phase-contrast mode (8-bit 65/160/100 over 255).
const PHASE_BODY_LEVEL: f64 = 0.25;
const PHASE_RIDGE_LEVEL: f64 = 0.63;
const PHASE_CORE_LEVEL: f64 = 0.39;
const PHASE_BACKGROUND_LEVEL: f64 = 0.39;

/// Whether a draw adds a cell or restores background.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Polarity {
    Cell,
    Background,
}

/// Test the capsule coverage rule at a pixel center.
#[inline]
fn covered(body: &Body, x: f64, y: f64) -> bool {
    let p = Vec3::xy(x, y);
    in_disk(p, body.head_center, body.radius)
        || in_disk(p, body.tail_center, body.radius)
        || point_in_quad(
            p,
            &[
                body.head_left,
                body.head_right,
                body.tail_right,
                body.tail_left,
            ],
        )
}

#[inline]
fn in_disk(p: Vec3, center: Vec3, radius: f64) -> bool {
    let d = p - center;
    d.dot(d) <= radius * radius
}

/// Convex-polygon membership: the point sees every edge on the same side.
fn point_in_quad(p: Vec3, quad: &[Vec3; 4]) -> bool {
    let mut pos = false;
    let mut neg = false;
    for i in 0..4 {
        let a = quad[i];
        let b = quad[(i + 1) % 4];
        let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
        if cross > 0.0 {
            pos = true;
        }
        if cross < 0.0 {
            neg = true;
        }
    }
    !(pos && neg)
}

/// Padding the diffraction halo adds around the capsule region, in
/// pixels. Zero outside graySynthetic mode or when the halo is disabled.
#[must_use]
pub fn diffraction_pad(sim: &SimulationConfig) -> i64 {
    if sim.image_type == ImageType::GraySynthetic
        && sim.diffraction_sigma > 0.0
        && sim.diffraction_strength > 0.0
    {
        (2.0 * sim.diffraction_sigma).floor() as i64
    } else {
        0
    }
}

/// Bounding box of every pixel a draw of `cell` may touch, including the
/// diffraction halo.
#[must_use]
pub fn simulated_region(cell: &Bacillus, sim: &SimulationConfig) -> Rect {
    cell.region().pad(diffraction_pad(sim))
}

/// Apply `cell`'s contribution to the synthetic image and the cell map.
pub fn draw_cell(
    synth: &mut Array2<f64>,
    cellmap: &mut Array2<i32>,
    cell: &Bacillus,
    polarity: Polarity,
    sim: &SimulationConfig,
) {
    let body = cell.body();
    let shape = synth.dim();
    let map_delta: i32 = match polarity {
        Polarity::Cell => 1,
        Polarity::Background => -1,
    };

    match sim.image_type {
        ImageType::Binary => {
            let delta = f64::from(map_delta);
            for_each_covered(&body, shape, |r, c| {
                synth[[r, c]] += delta;
                cellmap[[r, c]] += map_delta;
            });
        }
        ImageType::GraySynthetic => {
            draw_halo(synth, &body, polarity, sim);
            // The hard overwrite lands after the halo add/subtract.
            let level = match polarity {
                Polarity::Cell => sim.cell_color,
                Polarity::Background => sim.background_color,
            };
            for_each_covered(&body, shape, |r, c| {
                synth[[r, c]] = level;
                cellmap[[r, c]] += map_delta;
            });
        }
        ImageType::PhaseContrast => match polarity {
            Polarity::Background => {
                for_each_covered(&body, shape, |r, c| {
                    synth[[r, c]] = PHASE_BACKGROUND_LEVEL;
                    cellmap[[r, c]] += map_delta;
                });
            }
            Polarity::Cell => {
                // Inner rings: the upper half of the body along the width
                // axis, then the middle third, both from corner-weighted
                // vertex averages.
                let upper = [
                    body.head_left,
                    (body.head_left + body.head_right) / 2.0,
                    (body.tail_left + body.tail_right) / 2.0,
                    body.tail_left,
                ];
                let middle = [
                    (2.0 * body.head_left + body.head_right) / 3.0,
                    (body.head_left + 2.0 * body.head_right) / 3.0,
                    (body.tail_left + 2.0 * body.tail_right) / 3.0,
                    (2.0 * body.tail_left + body.tail_right) / 3.0,
                ];
                for_each_covered(&body, shape, |r, c| {
                    let p = Vec3::xy(c as f64, r as f64);
                    let mut level = PHASE_BODY_LEVEL;
                    if point_in_quad(p, &upper) {
                        level = PHASE_RIDGE_LEVEL;
                    }
                    if point_in_quad(p, &middle) {
                        level = PHASE_CORE_LEVEL;
                    }
                    synth[[r, c]] = level;
                    cellmap[[r, c]] += map_delta;
                });
            }
        },
    }
}

/// Visit every covered pixel of the clipped capsule region.
fn for_each_covered(body: &Body, shape: (usize, usize), mut visit: impl FnMut(usize, usize)) {
    let region = body.region.clamp_to(shape);
    for y in region.rows() {
        for x in region.cols() {
            if covered(body, x as f64, y as f64) {
                visit(y as usize, x as usize);
            }
        }
    }
}

/// Add (or subtract) the Gaussian diffraction halo over the padded tile.
fn draw_halo(synth: &mut Array2<f64>, body: &Body, polarity: Polarity, sim: &SimulationConfig) {
    let pad = if sim.diffraction_sigma > 0.0 && sim.diffraction_strength > 0.0 {
        (2.0 * sim.diffraction_sigma).floor() as i64
    } else {
        return;
    };
    let tile_rect = body.region.pad(pad);
    let (th, tw) = (tile_rect.height() as usize, tile_rect.width() as usize);

    let mut tile = Array2::<f64>::zeros((th, tw));
    for r in 0..th {
        for c in 0..tw {
            let x = (tile_rect.left + c as i64) as f64;
            let y = (tile_rect.top + r as i64) as f64;
            if covered(body, x, y) {
                tile[[r, c]] = sim.diffraction_strength;
            }
        }
    }
    let blurred = gaussian_blur(&tile, sim.diffraction_sigma);

    let sign = match polarity {
        Polarity::Cell => 1.0,
        Polarity::Background => -1.0,
    };
    let clipped = tile_rect.clamp_to(synth.dim());
    for y in clipped.rows() {
        for x in clipped.cols() {
            let r = (y - tile_rect.top) as usize;
            let c = (x - tile_rect.left) as usize;
            synth[[y as usize, x as usize]] += sign * blurred[[r, c]];
        }
    }
}

/// Background-filled frame buffers for `sim`'s image type.
#[must_use]
pub fn blank_frame(shape: (usize, usize), sim: &SimulationConfig) -> (Array2<f64>, Array2<i32>) {
    let fill = match sim.image_type {
        ImageType::Binary => 0.0,
        ImageType::GraySynthetic => sim.background_color,
        ImageType::PhaseContrast => PHASE_BACKGROUND_LEVEL,
    };
    (Array2::from_elem(shape, fill), Array2::zeros(shape))
}

/// Render a full frame from scratch: background fill, then every cell.
#[must_use]
pub fn generate_synthetic_image<'a, I>(
    cells: I,
    shape: (usize, usize),
    sim: &SimulationConfig,
) -> (Array2<f64>, Array2<i32>)
where
    I: IntoIterator<Item = &'a Bacillus>,
{
    let (mut synth, mut cellmap) = blank_frame(shape, sim);
    for cell in cells {
        draw_cell(&mut synth, &mut cellmap, cell, Polarity::Cell, sim);
    }
    (synth, cellmap)
}

/// Draw the cell outline (two long sides plus the end-cap arcs) onto an
/// RGB overlay buffer.
pub fn draw_outline(image: &mut Array3<f64>, cell: &Bacillus, color: [f64; 3]) {
    let b = cell.body();

    draw_line(
        image,
        b.tail_left.x as i64,
        b.tail_left.y as i64,
        b.head_left.x as i64,
        b.head_left.y as i64,
        color,
    );
    draw_line(
        image,
        b.tail_right.x as i64,
        b.tail_right.y as i64,
        b.head_right.x as i64,
        b.head_right.y as i64,
        color,
    );

    let r0 = b.head_right - b.head_center;
    let r1 = b.head_left - b.head_center;
    draw_arc(
        image,
        b.head_center.x,
        b.head_center.y,
        b.radius,
        r1.y.atan2(r1.x),
        r0.y.atan2(r0.x),
        color,
    );

    let r0 = b.tail_right - b.tail_center;
    let r1 = b.tail_left - b.tail_center;
    draw_arc(
        image,
        b.tail_center.x,
        b.tail_center.y,
        b.radius,
        r0.y.atan2(r0.x),
        r1.y.atan2(r1.x),
        color,
    );
}
