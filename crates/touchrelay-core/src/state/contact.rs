// Touchrelay Contact Table
// Per-device, per-slot contact state shared between readers and the uploader

use std::path::PathBuf;

use crate::transform::Vector2;

/// Hardware multi-touch slot limit assumed for every panel.
pub const MAX_SLOTS: usize = 10;

/// Tracking id of the injected contact. Device-derived ids start at
/// `MAX_SLOTS`, so this value never collides with a physical contact.
pub const SYNTHETIC_TRACKING_ID: i32 = (MAX_SLOTS - 1) as i32;

/// Tracking id for a physical contact, encoding the device index and slot.
pub fn device_tracking_id(device_index: usize, slot: usize) -> i32 {
    ((device_index * 2 + 1) * MAX_SLOTS + slot) as i32
}

/// One contact point. Positions are in the reference panel's raw space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Contact {
    pub position: Vector2,
    pub tracking_id: i32,
    pub is_down: bool,
}

/// Raw range of one absolute axis as reported by EVIOCGABS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisRange {
    pub minimum: i32,
    pub maximum: i32,
    pub resolution: i32,
}

impl AxisRange {
    pub fn new(minimum: i32, maximum: i32) -> Self {
        Self {
            minimum,
            maximum,
            resolution: 0,
        }
    }
}

/// Raw ranges of a panel's MT position axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisRanges {
    pub x: AxisRange,
    pub y: AxisRange,
}

impl AxisRanges {
    pub fn new(x: AxisRange, y: AxisRange) -> Self {
        Self { x, y }
    }

    /// Axis maxima, the raw extent used for every scale computation.
    pub fn raw_size(&self) -> Vector2 {
        Vector2::new(self.x.maximum as f32, self.y.maximum as f32)
    }
}

/// Contact state of one physical panel.
#[derive(Debug, Clone)]
pub struct TrackedDevice {
    pub path: PathBuf,
    pub name: String,
    pub axes: AxisRanges,
    /// Factor from this device's raw space into the reference panel's raw space.
    pub scale: Vector2,
    pub contacts: [Contact; MAX_SLOTS],
}

impl TrackedDevice {
    pub fn new(path: PathBuf, name: String, axes: AxisRanges, screen_raw: Vector2) -> Self {
        let raw = axes.raw_size();
        let scale = Vector2::new(
            if raw.x > 0.0 { screen_raw.x / raw.x } else { 1.0 },
            if raw.y > 0.0 { screen_raw.y / raw.y } else { 1.0 },
        );
        Self {
            path,
            name,
            axes,
            scale,
            contacts: [Contact::default(); MAX_SLOTS],
        }
    }

    pub fn down_count(&self) -> usize {
        self.contacts.iter().filter(|c| c.is_down).count()
    }
}

/// Address of a contact inside a [`ContactTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactRef {
    /// A slot of a physical device
    Device { device: usize, slot: usize },
    /// The reserved contact driven by the injection API
    Synthetic,
}

/// Every tracked contact: one row per physical device plus the injected contact.
#[derive(Debug, Clone, Default)]
pub struct ContactTable {
    pub devices: Vec<TrackedDevice>,
    pub synthetic: Contact,
}

impl ContactTable {
    pub fn new(devices: Vec<TrackedDevice>) -> Self {
        Self {
            devices,
            synthetic: Contact {
                tracking_id: SYNTHETIC_TRACKING_ID,
                ..Contact::default()
            },
        }
    }

    pub fn get(&self, contact: ContactRef) -> Option<&Contact> {
        match contact {
            ContactRef::Device { device, slot } => {
                self.devices.get(device).and_then(|d| d.contacts.get(slot))
            }
            ContactRef::Synthetic => Some(&self.synthetic),
        }
    }

    pub fn get_mut(&mut self, contact: ContactRef) -> Option<&mut Contact> {
        match contact {
            ContactRef::Device { device, slot } => self
                .devices
                .get_mut(device)
                .and_then(|d| d.contacts.get_mut(slot)),
            ContactRef::Synthetic => Some(&mut self.synthetic),
        }
    }

    /// Every contact currently down, devices first, the injected contact last.
    pub fn active(&self) -> impl Iterator<Item = (ContactRef, &Contact)> + '_ {
        let physical = self.devices.iter().enumerate().flat_map(|(device, d)| {
            d.contacts
                .iter()
                .enumerate()
                .map(move |(slot, c)| (ContactRef::Device { device, slot }, c))
        });
        physical
            .chain(std::iter::once((ContactRef::Synthetic, &self.synthetic)))
            .filter(|(_, c)| c.is_down)
    }

    pub fn any_down(&self) -> bool {
        self.active().next().is_some()
    }

    pub fn clear(&mut self) {
        self.devices.clear();
        self.synthetic = Contact {
            tracking_id: SYNTHETIC_TRACKING_ID,
            ..Contact::default()
        };
    }
}
