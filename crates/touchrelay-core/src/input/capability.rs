// Touchrelay Input Layer - Capability Probing
// Absolute-axis capability analysis and multi-touch detection

use std::collections::HashSet;

use super::event::codes::{ABS_MT_POSITION_X, ABS_MT_POSITION_Y, ABS_MT_SLOT};

/// Axes a device must expose to be driven through the slot protocol.
const MULTITOUCH_AXES: &[u16] = &[ABS_MT_SLOT, ABS_MT_POSITION_X, ABS_MT_POSITION_Y];

/// Absolute-axis capabilities extracted from a device's EV_ABS bitmap
#[derive(Debug, Clone, Default)]
pub struct AbsCapabilities {
    /// Supported absolute axis codes
    pub axes: Vec<u16>,
}

impl AbsCapabilities {
    pub fn new(axes: Vec<u16>) -> Self {
        Self { axes }
    }

    /// Read the EV_ABS capability bitmap of an open evdev device.
    pub fn from_device(device: &evdev::Device) -> Self {
        let axes = device
            .supported_absolute_axes()
            .map(|set| set.iter().map(|axis| axis.0).collect())
            .unwrap_or_default();
        Self { axes }
    }

    pub fn supports_axis(&self, code: u16) -> bool {
        self.axes.contains(&code)
    }

    pub fn axis_set(&self) -> HashSet<u16> {
        self.axes.iter().copied().collect()
    }
}

/// Determine whether a device is a multi-touch panel.
///
/// True only when the slot selector and both MT position axes are present.
/// Single-touch panels, tablets reporting only ABS_X/ABS_Y, and
/// touchpads without slot support are rejected.
pub fn is_multitouch(capabilities: &AbsCapabilities) -> bool {
    let set = capabilities.axis_set();
    MULTITOUCH_AXES.iter().all(|code| set.contains(code))
}
