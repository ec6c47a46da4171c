// Touchrelay Output Layer
// Frame encoding and the virtual touchscreen it is written to

mod encoder;
mod identity;
mod uinput;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::input::RawEvent;

pub use encoder::{FrameEncoder, MAX_FRAME_CONTACTS};
pub use identity::{RandomIdentity, MAX_IDENT_LEN, MIN_IDENT_LEN};
pub use uinput::{DeviceTemplate, UInputError, VirtualTouchscreen, TRACKING_ID_MAX};

/// Destination for encoded frames.
///
/// Each call receives one complete frame ending in `SYN_REPORT` and must
/// deliver it whole or fail.
pub trait EventSink: Send {
    fn write_frame(&mut self, events: &[RawEvent]) -> Result<(), UInputError>;
}

/// In-memory sink that keeps every frame it receives.
///
/// Clones share the same buffer, so one clone can be handed to a session
/// while another inspects what was written.
#[derive(Debug, Clone, Default)]
pub struct FrameRecorder {
    frames: Arc<Mutex<Vec<Vec<RawEvent>>>>,
}

impl FrameRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<Vec<RawEvent>> {
        self.frames.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    pub fn last(&self) -> Option<Vec<RawEvent>> {
        self.frames.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.frames.lock().clear();
    }
}

impl EventSink for FrameRecorder {
    fn write_frame(&mut self, events: &[RawEvent]) -> Result<(), UInputError> {
        self.frames.lock().push(events.to_vec());
        Ok(())
    }
}
