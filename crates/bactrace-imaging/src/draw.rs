// crates/bactrace-imaging/src/draw.rs

//! Line and arc drawing onto RGB overlay buffers.
//!
//! Pixels outside the buffer are dropped silently, matching the clipping
//! behavior of the cell rasterizer.

use ndarray::Array3;

/// Write one RGB pixel, ignoring out-of-bounds coordinates.
#[inline]
pub fn put_pixel(img: &mut Array3<f64>, x: i64, y: i64, color: [f64; 3]) {
    let (h, w, _) = img.dim();
    if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
        return;
    }
    for (channel, &v) in color.iter().enumerate() {
        img[[y as usize, x as usize, channel]] = v;
    }
}

/// Bresenham line from `(x0, y0)` to `(x1, y1)`.
pub fn draw_line(img: &mut Array3<f64>, x0: i64, y0: i64, x1: i64, y1: i64, color: [f64; 3]) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);
    loop {
        put_pixel(img, x, y, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Arc of radius `radius` around `(cx, cy)`, swept from angle `t0` to `t1`
/// (radians, counter-clockwise; `t1` below `t0` wraps by a full turn).
pub fn draw_arc(
    img: &mut Array3<f64>,
    cx: f64,
    cy: f64,
    radius: f64,
    t0: f64,
    t1: f64,
    color: [f64; 3],
) {
    let sweep = if t1 >= t0 {
        t1 - t0
    } else {
        t1 - t0 + std::f64::consts::TAU
    };
    // Step fine enough that consecutive samples land on adjacent pixels.
    let steps = ((radius * sweep).ceil() as usize * 2).max(4);
    for i in 0..=steps {
        let t = t0 + sweep * i as f64 / steps as f64;
        let x = (cx + radius * t.cos()).round() as i64;
        let y = (cy + radius * t.sin()).round() as i64;
        put_pixel(img, x, y, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [f64; 3] = [1.0, 0.0, 0.0];

    #[test]
    fn line_hits_both_endpoints() {
        let mut img = Array3::zeros((10, 10, 3));
        draw_line(&mut img, 1, 2, 7, 5, RED);
        assert_eq!(img[[2, 1, 0]], 1.0);
        assert_eq!(img[[5, 7, 0]], 1.0);
    }

    #[test]
    fn out_of_bounds_is_dropped() {
        let mut img = Array3::zeros((4, 4, 3));
        draw_line(&mut img, -5, -5, 8, 8, RED);
        // In-bounds diagonal got painted, nothing panicked.
        assert_eq!(img[[1, 1, 0]], 1.0);
    }

    #[test]
    fn arc_stays_near_the_circle() {
        let mut img = Array3::zeros((40, 40, 3));
        draw_arc(&mut img, 20.0, 20.0, 8.0, 0.0, std::f64::consts::PI, RED);
        for ((y, x, channel), &v) in img.indexed_iter() {
            if channel != 0 || v == 0.0 {
                continue;
            }
            let d = ((x as f64 - 20.0).powi(2) + (y as f64 - 20.0).powi(2)).sqrt();
            assert!((d - 8.0).abs() < 1.0, "pixel ({x}, {y}) off the arc");
        }
    }
}
