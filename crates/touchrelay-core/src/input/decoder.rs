// Touchrelay Input Layer - Slot Protocol Decoder
// Rebuilds multi-touch frames from raw EV_ABS / EV_SYN streams

use super::event::codes::*;
use super::event::RawEvent;
use crate::state::{device_tracking_id, TrackedDevice, MAX_SLOTS};
use crate::transform::Vector2;

/// Result of feeding one event to the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// The event was absorbed into the pending frame
    Pending,
    /// A frame boundary was reached; call [`SlotDecoder::commit`]
    Frame,
}

/// Pending writes to one slot since the last frame boundary.
#[derive(Debug, Clone, Copy, Default)]
struct SlotUpdate {
    down: Option<bool>,
    x: Option<f32>,
    y: Option<f32>,
}

impl SlotUpdate {
    fn is_empty(&self) -> bool {
        self.down.is_none() && self.x.is_none() && self.y.is_none()
    }
}

/// Per-device decoder for the kernel multi-touch protocol.
///
/// Updates are staged locally and applied to the shared table only in
/// [`commit`](Self::commit), so a reader never exposes half a frame.
///
/// Type B streams select slots with `ABS_MT_SLOT` and the selection
/// persists across frames. Type A streams delimit anonymous contacts with
/// `SYN_MT_REPORT`; each non-empty packet takes the next slot and any slot
/// not reported before `SYN_REPORT` is lifted.
#[derive(Debug, Clone)]
pub struct SlotDecoder {
    device_index: usize,
    scale: Vector2,
    slot: i32,
    last_slot: usize,
    pending: [SlotUpdate; MAX_SLOTS],
    type_a_frame: bool,
    type_a_reported: usize,
    dropped: bool,
}

impl SlotDecoder {
    pub fn new(device_index: usize, scale: Vector2) -> Self {
        Self {
            device_index,
            scale,
            slot: 0,
            last_slot: 0,
            pending: [SlotUpdate::default(); MAX_SLOTS],
            type_a_frame: false,
            type_a_reported: 0,
            dropped: false,
        }
    }

    pub fn device_index(&self) -> usize {
        self.device_index
    }

    /// Slot most recently written by the committed frame.
    pub fn last_slot(&self) -> usize {
        self.last_slot
    }

    /// True while updates are staged and no boundary has been seen yet.
    pub fn is_accumulating(&self) -> bool {
        self.type_a_frame || self.pending.iter().any(|u| !u.is_empty())
    }

    fn current(&mut self) -> Option<&mut SlotUpdate> {
        let slot = usize::try_from(self.slot).ok()?;
        let update = self.pending.get_mut(slot)?;
        self.last_slot = slot;
        Some(update)
    }

    pub fn feed(&mut self, event: RawEvent) -> Decoded {
        // After SYN_DROPPED everything up to and including the next report is stale
        if self.dropped {
            if event.is_report() {
                self.dropped = false;
            }
            return Decoded::Pending;
        }

        match (event.kind, event.code) {
            (EV_ABS, ABS_MT_SLOT) => self.slot = event.value,
            (EV_ABS, ABS_MT_TRACKING_ID) => {
                let down = event.value != TRACKING_ID_LIFT;
                match self.current() {
                    Some(update) => update.down = Some(down),
                    None => log::warn!("Dropping tracking id for out-of-range slot {}", self.slot),
                }
            }
            (EV_ABS, ABS_MT_POSITION_X) => {
                let x = event.value as f32 * self.scale.x;
                match self.current() {
                    Some(update) => {
                        update.x = Some(x);
                        update.down.get_or_insert(true);
                    }
                    None => log::warn!("Dropping position for out-of-range slot {}", self.slot),
                }
            }
            (EV_ABS, ABS_MT_POSITION_Y) => {
                let y = event.value as f32 * self.scale.y;
                match self.current() {
                    Some(update) => {
                        update.y = Some(y);
                        update.down.get_or_insert(true);
                    }
                    None => log::warn!("Dropping position for out-of-range slot {}", self.slot),
                }
            }
            (EV_SYN, SYN_MT_REPORT) => {
                if !self.type_a_frame {
                    self.type_a_frame = true;
                    self.type_a_reported = 0;
                }
                let occupied = usize::try_from(self.slot)
                    .ok()
                    .and_then(|slot| self.pending.get(slot))
                    .map(|u| !u.is_empty())
                    .unwrap_or(false);
                if occupied {
                    self.type_a_reported += 1;
                    self.slot += 1;
                }
            }
            (EV_SYN, SYN_DROPPED) => {
                log::debug!("Device {} dropped events, discarding partial frame", self.device_index);
                self.pending = [SlotUpdate::default(); MAX_SLOTS];
                self.type_a_frame = false;
                self.type_a_reported = 0;
                self.dropped = true;
            }
            (EV_SYN, SYN_REPORT) => return Decoded::Frame,
            _ => {}
        }
        Decoded::Pending
    }

    /// Apply the staged frame to `device` and reset for the next one.
    ///
    /// Each (slot, field) receives the last value written before the boundary.
    pub fn commit(&mut self, device: &mut TrackedDevice) {
        for (slot, update) in self.pending.iter_mut().enumerate() {
            let contact = &mut device.contacts[slot];
            if let Some(x) = update.x {
                contact.position.x = x;
            }
            if let Some(y) = update.y {
                contact.position.y = y;
            }
            if let Some(down) = update.down {
                if down {
                    contact.tracking_id = device_tracking_id(self.device_index, slot);
                }
                contact.is_down = down;
            }
            *update = SlotUpdate::default();
        }

        if self.type_a_frame {
            for contact in device.contacts.iter_mut().skip(self.type_a_reported) {
                contact.is_down = false;
            }
            self.type_a_frame = false;
            self.type_a_reported = 0;
            self.slot = 0;
        }
    }
}
