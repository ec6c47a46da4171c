// Touchrelay Transform
// Raw panel space to logical screen space

pub mod geometry;
pub mod orientation;

pub use geometry::{ScreenGeometry, Vector2};
pub use orientation::{screen_to_touch, touch_to_screen, Orientation};
