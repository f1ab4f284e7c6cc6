// crates/bactrace-core/src/cell.rs

//! The parametric bacillus: a rectangle with hemispherical end caps.

use serde::{Deserialize, Serialize};

use crate::geometry::{Rect, Vec3};

/// Rod-shaped cell described by center, size, and orientation.
///
/// `name` encodes the lineage path: a division appends `'0'` (head half)
/// or `'1'` (tail half) to the parent's name, combining drops the
/// trailing character. Cells are plain value types; derived placement is
/// recomputed from the raw parameters on demand via [`Bacillus::body`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bacillus {
    pub name: String,
    /// Center, in pixels.
    pub x: f64,
    pub y: f64,
    /// Cap diameter; `length >= width`.
    pub width: f64,
    /// End-to-end extent along the long axis.
    pub length: f64,
    /// Radians.
    pub rotation: f64,
    /// Grayscale opacity, only constrained in graySynthetic mode.
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    /// The split fraction that produced this cell, when it was born from
    /// a division. Needed to re-project the parent for constraint checks.
    #[serde(skip)]
    pub split_alpha: Option<f64>,
}

fn default_opacity() -> f64 {
    1.0
}

/// Derived placement: cap centers, body corners, and bounding region.
#[derive(Clone, Copy, Debug)]
pub struct Body {
    pub head_center: Vec3,
    pub tail_center: Vec3,
    pub head_right: Vec3,
    pub head_left: Vec3,
    pub tail_right: Vec3,
    pub tail_left: Vec3,
    /// Cap radius, `width / 2`.
    pub radius: f64,
    /// Integer box covering the whole capsule.
    pub region: Rect,
}

impl Bacillus {
    pub fn new(
        name: impl Into<String>,
        x: f64,
        y: f64,
        width: f64,
        length: f64,
        rotation: f64,
    ) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            width,
            length,
            rotation,
            opacity: default_opacity(),
            split_alpha: None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn position(&self) -> Vec3 {
        Vec3::xy(self.x, self.y)
    }

    /// Recompute the derived geometry from the raw parameters.
    #[must_use]
    pub fn body(&self) -> Body {
        let direction = Vec3::xy(self.rotation.cos(), self.rotation.sin());
        let displacement = ((self.length - self.width) / 2.0) * direction;
        let head_center = self.position() + displacement;
        let tail_center = self.position() - displacement;

        let side = Vec3::xy(-self.rotation.sin(), self.rotation.cos());
        let radius = self.width / 2.0;

        // The caps bound the body corners, so the capsule region is the
        // box around the two cap circles.
        let region = Rect::enclosing(
            head_center.x.min(tail_center.x) - radius,
            head_center.y.min(tail_center.y) - radius,
            head_center.x.max(tail_center.x) + radius,
            head_center.y.max(tail_center.y) + radius,
        );

        Body {
            head_center,
            tail_center,
            head_right: head_center + radius * side,
            head_left: head_center - radius * side,
            tail_right: tail_center + radius * side,
            tail_left: tail_center - radius * side,
            radius,
            region,
        }
    }

    /// Bounding region of the capsule alone (no diffraction halo).
    #[must_use]
    pub fn region(&self) -> Rect {
        self.body().region
    }

    /// Split along the long axis at fraction `alpha` of the length.
    ///
    /// The head half keeps `alpha * length` and the `'0'` suffix, the tail
    /// half gets the rest and `'1'`. Both remember `alpha` so the division
    /// can be re-projected later.
    #[must_use]
    pub fn split(&self, alpha: f64) -> (Self, Self) {
        let direction = Vec3::xy(self.rotation.cos(), self.rotation.sin());
        let unit = self.length * direction;

        let front = self.position() + unit / 2.0;
        let back = self.position() - unit / 2.0;
        let center = self.position() + (0.5 - alpha) * unit;

        let head_pos = (front + center) / 2.0;
        let tail_pos = (center + back) / 2.0;

        let head = Self {
            name: format!("{}0", self.name),
            x: head_pos.x,
            y: head_pos.y,
            width: self.width,
            length: self.length * alpha,
            rotation: self.rotation,
            opacity: self.opacity,
            split_alpha: Some(alpha),
        };
        let tail = Self {
            name: format!("{}1", self.name),
            x: tail_pos.x,
            y: tail_pos.y,
            width: self.width,
            length: self.length * (1.0 - alpha),
            rotation: self.rotation,
            opacity: self.opacity,
            split_alpha: Some(alpha),
        };
        (head, tail)
    }

    /// Reverse a split: merge this cell with its sibling into the parent.
    ///
    /// The long axis is taken from the center-to-center displacement; each
    /// cell's far cap is projected onto that axis to find the merged front
    /// and back. The result carries the parent name (trailing character
    /// dropped), the averaged width/opacity, and the front-to-back length.
    #[must_use]
    pub fn combine(&self, other: &Self) -> Self {
        let separation = self.position() - other.position();
        let direction = separation / separation.norm();

        // Front: this cell's cap farthest along `direction`.
        let dir1 = Vec3::xy(self.rotation.cos(), self.rotation.sin());
        let dist1 = self.length - self.width;
        let head1 = if dir1.dot(direction) >= 0.0 {
            self.position() + dist1 * dir1 / 2.0
        } else {
            self.position() - dist1 * dir1 / 2.0
        };
        let extent1 = head1 + self.width * direction / 2.0;
        let front = self.position() + (extent1 - self.position()).dot(direction) * direction;

        // Back: the other cell's cap farthest against `direction`.
        let dir2 = Vec3::xy(other.rotation.cos(), other.rotation.sin());
        let dist2 = other.length - other.width;
        let tail2 = if dir2.dot(direction) >= 0.0 {
            other.position() - dist2 * dir2 / 2.0
        } else {
            other.position() + dist2 * dir2 / 2.0
        };
        let extent2 = tail2 - other.width * direction / 2.0;
        let back = other.position() + (extent2 - other.position()).dot(direction) * direction;

        let position = (front + back) / 2.0;
        let mut name = self.name.clone();
        name.pop();

        Self {
            name,
            x: position.x,
            y: position.y,
            width: (self.width + other.width) / 2.0,
            length: (front - back).norm(),
            rotation: direction.y.atan2(direction.x),
            opacity: (self.opacity + other.opacity) / 2.0,
            split_alpha: None,
        }
    }
}
