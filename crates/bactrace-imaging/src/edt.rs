// crates/bactrace-imaging/src/edt.rs

//! Exact Euclidean distance transform.
//!
//! Two passes of the Felzenszwalb-Huttenlocher 1-D squared-distance
//! transform (lower envelope of parabolas), columns first then rows.
//! For every `true` pixel the result is the distance to the nearest
//! `false` pixel; `false` pixels map to 0.

use ndarray::Array2;

// Finite stand-in for infinity; keeps the envelope arithmetic NaN-free
// when a whole scanline is foreground.
const INF: f64 = 1e20;

/// Euclidean distance transform of a boolean mask.
#[must_use]
pub fn distance_transform(mask: &Array2<bool>) -> Array2<f64> {
    let (h, w) = mask.dim();
    let mut g = Array2::<f64>::zeros((h, w));
    for ((r, c), &inside) in mask.indexed_iter() {
        g[[r, c]] = if inside { INF } else { 0.0 };
    }

    let n = h.max(w);
    let mut f = vec![0.0; n];
    let mut d = vec![0.0; n];
    let mut v = vec![0usize; n];
    let mut z = vec![0.0; n + 1];

    for c in 0..w {
        for r in 0..h {
            f[r] = g[[r, c]];
        }
        dt_1d(&f[..h], &mut d[..h], &mut v[..h], &mut z[..=h]);
        for r in 0..h {
            g[[r, c]] = d[r];
        }
    }
    for r in 0..h {
        for c in 0..w {
            f[c] = g[[r, c]];
        }
        dt_1d(&f[..w], &mut d[..w], &mut v[..w], &mut z[..=w]);
        for c in 0..w {
            g[[r, c]] = d[c].sqrt();
        }
    }
    g
}

/// 1-D squared distance transform of the sampled function `f`.
fn dt_1d(f: &[f64], d: &mut [f64], v: &mut [usize], z: &mut [f64]) {
    let n = f.len();
    if n == 0 {
        return;
    }

    // Abscissa where the parabolas rooted at q and p intersect.
    let intersect = |q: usize, p: usize| -> f64 {
        (f[q] + (q * q) as f64 - f[p] - (p * p) as f64) / ((2 * q) as f64 - (2 * p) as f64)
    };

    let mut k = 0usize;
    v[0] = 0;
    z[0] = -INF;
    z[1] = INF;
    for q in 1..n {
        let mut s = intersect(q, v[k]);
        while s <= z[k] {
            k -= 1;
            s = intersect(q, v[k]);
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = INF;
    }

    k = 0;
    for (q, out) in d.iter_mut().enumerate() {
        while z[k + 1] < q as f64 {
            k += 1;
        }
        let dq = q as f64 - v[k] as f64;
        *out = dq * dq + f[v[k]];
    }
}
