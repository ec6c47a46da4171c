// Touchrelay Transform - Screen Geometry
// 2D vectors and the logical-screen / raw-touch scale relationship

use std::ops::{Add, Div, Mul, Sub};

/// A 2D point or size in either raw device space or logical screen space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Same vector with the axes exchanged.
    pub fn swapped(self) -> Self {
        Self::new(self.y, self.x)
    }
}

impl From<(f32, f32)> for Vector2 {
    fn from((x, y): (f32, f32)) -> Self {
        Self::new(x, y)
    }
}

impl Add for Vector2 {
    type Output = Vector2;

    fn add(self, rhs: Vector2) -> Vector2 {
        Vector2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vector2 {
    type Output = Vector2;

    fn sub(self, rhs: Vector2) -> Vector2 {
        Vector2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Component-wise product
impl Mul for Vector2 {
    type Output = Vector2;

    fn mul(self, rhs: Vector2) -> Vector2 {
        Vector2::new(self.x * rhs.x, self.y * rhs.y)
    }
}

/// Component-wise quotient
impl Div for Vector2 {
    type Output = Vector2;

    fn div(self, rhs: Vector2) -> Vector2 {
        Vector2::new(self.x / rhs.x, self.y / rhs.y)
    }
}

/// Logical screen size and its relationship to the reference panel's raw range.
///
/// `screen_size` always stores the longer axis first. `touch_scale` converts
/// an unrotated logical coordinate into raw panel space (`raw = logical * scale`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenGeometry {
    pub screen_size: Vector2,
    pub touch_scale: Vector2,
    pub raw_size: Vector2,
}

impl Default for ScreenGeometry {
    fn default() -> Self {
        Self {
            screen_size: Vector2::ZERO,
            touch_scale: Vector2::new(1.0, 1.0),
            raw_size: Vector2::ZERO,
        }
    }
}

impl ScreenGeometry {
    /// Build the geometry for a logical screen of `size` pixels and a panel whose
    /// raw axes end at `raw_size`.
    ///
    /// The panel's native raw axes run along the short screen edge for X, so the
    /// logical size is brought into portrait order before dividing. Panels wired
    /// the other way (`other_touch`) swap it back.
    pub fn new(size: Vector2, raw_size: Vector2, other_touch: bool) -> Self {
        let screen_size = if size.x > size.y { size } else { size.swapped() };

        let mut portrait = if size.x > size.y { size.swapped() } else { size };
        if other_touch {
            portrait = portrait.swapped();
        }

        Self {
            screen_size,
            touch_scale: raw_size / portrait,
            raw_size,
        }
    }

    /// Map an unrotated logical coordinate into raw panel space.
    pub fn to_raw(&self, logical: Vector2) -> Vector2 {
        logical * self.touch_scale
    }

    /// Map a raw panel coordinate into unrotated logical space.
    pub fn from_raw(&self, raw: Vector2) -> Vector2 {
        raw / self.touch_scale
    }
}
