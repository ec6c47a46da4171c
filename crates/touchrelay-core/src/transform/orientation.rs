// Touchrelay Transform - Orientation Mapping
// Raw panel coordinates to rotated logical screen coordinates

use strum_macros::{Display, EnumIter};

use super::geometry::{ScreenGeometry, Vector2};

/// Device rotation relative to the panel's native raw axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter)]
#[repr(u8)]
pub enum Orientation {
    #[default]
    #[strum(serialize = "0")]
    Rotation0 = 0,
    #[strum(serialize = "90")]
    Rotation90 = 1,
    #[strum(serialize = "180")]
    Rotation180 = 2,
    #[strum(serialize = "270")]
    Rotation270 = 3,
}

impl Orientation {
    /// Interpret a display rotation index (0-3). Anything else is treated as
    /// the unrotated state, matching how display providers report unknowns.
    pub fn from_index(index: i32) -> Self {
        match index {
            1 => Orientation::Rotation90,
            2 => Orientation::Rotation180,
            3 => Orientation::Rotation270,
            _ => Orientation::Rotation0,
        }
    }

    pub fn index(self) -> u8 {
        self as u8
    }
}

/// Map a raw panel coordinate to a logical screen coordinate.
///
/// `other_touch` selects the alternate digitizer wiring table. Both tables
/// mirror against `screen_size`, whose first component is the long edge.
pub fn touch_to_screen(
    raw: Vector2,
    geometry: &ScreenGeometry,
    orientation: Orientation,
    other_touch: bool,
) -> Vector2 {
    let t = geometry.from_raw(raw);
    let long = geometry.screen_size.x;
    let short = geometry.screen_size.y;

    if other_touch {
        match orientation {
            Orientation::Rotation0 => Vector2::new(short - t.y, t.x),
            Orientation::Rotation90 => Vector2::new(t.x, t.y),
            Orientation::Rotation180 => Vector2::new(short - t.x, t.y),
            Orientation::Rotation270 => Vector2::new(short - t.x, long - t.y),
        }
    } else {
        match orientation {
            Orientation::Rotation0 => Vector2::new(t.x, t.y),
            Orientation::Rotation90 => Vector2::new(t.y, short - t.x),
            Orientation::Rotation180 => Vector2::new(short - t.x, long - t.y),
            Orientation::Rotation270 => Vector2::new(long - t.y, t.x),
        }
    }
}

/// Inverse of [`touch_to_screen`] for the same orientation and wiring.
pub fn screen_to_touch(
    screen: Vector2,
    geometry: &ScreenGeometry,
    orientation: Orientation,
    other_touch: bool,
) -> Vector2 {
    let long = geometry.screen_size.x;
    let short = geometry.screen_size.y;
    let s = screen;

    let t = if other_touch {
        match orientation {
            Orientation::Rotation0 => Vector2::new(s.y, short - s.x),
            Orientation::Rotation90 => Vector2::new(s.x, s.y),
            Orientation::Rotation180 => Vector2::new(short - s.x, s.y),
            Orientation::Rotation270 => Vector2::new(short - s.x, long - s.y),
        }
    } else {
        match orientation {
            Orientation::Rotation0 => Vector2::new(s.x, s.y),
            Orientation::Rotation90 => Vector2::new(short - s.y, s.x),
            Orientation::Rotation180 => Vector2::new(short - s.x, long - s.y),
            Orientation::Rotation270 => Vector2::new(s.y, long - s.x),
        }
    };

    geometry.to_raw(t)
}
