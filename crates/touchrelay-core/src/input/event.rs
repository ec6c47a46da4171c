// Touchrelay Input Layer - Raw Event Records
// Typed {type, code, value} records and the input-event-codes this crate speaks

/// Linux input-event-codes.h values used by the decoder and encoder.
pub mod codes {
    pub const EV_SYN: u16 = 0x00;
    pub const EV_KEY: u16 = 0x01;
    pub const EV_ABS: u16 = 0x03;

    pub const SYN_REPORT: u16 = 0;
    pub const SYN_MT_REPORT: u16 = 2;
    pub const SYN_DROPPED: u16 = 3;

    pub const ABS_X: u16 = 0x00;
    pub const ABS_Y: u16 = 0x01;
    pub const ABS_MT_SLOT: u16 = 0x2f;
    pub const ABS_MT_POSITION_X: u16 = 0x35;
    pub const ABS_MT_POSITION_Y: u16 = 0x36;
    pub const ABS_MT_TRACKING_ID: u16 = 0x39;

    pub const BTN_TOUCH: u16 = 0x14a;
    pub const BTN_TOOL_FINGER: u16 = 0x145;

    /// Tracking id value the kernel uses to signal a lifted contact.
    pub const TRACKING_ID_LIFT: i32 = -1;
}

use codes::*;

/// A single kernel input event without its timestamp.
///
/// The kernel fills in the time on write, and the decoder never looks at it,
/// so the record is kept to the three fields that carry protocol meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawEvent {
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl RawEvent {
    pub const fn new(kind: u16, code: u16, value: i32) -> Self {
        Self { kind, code, value }
    }

    pub const fn abs(code: u16, value: i32) -> Self {
        Self::new(EV_ABS, code, value)
    }

    pub const fn key(code: u16, value: i32) -> Self {
        Self::new(EV_KEY, code, value)
    }

    pub const fn syn(code: u16) -> Self {
        Self::new(EV_SYN, code, 0)
    }

    /// Frame boundary marker.
    pub const fn report() -> Self {
        Self::syn(SYN_REPORT)
    }

    /// Type A contact packet terminator.
    pub const fn mt_report() -> Self {
        Self::syn(SYN_MT_REPORT)
    }

    pub fn is_report(&self) -> bool {
        self.kind == EV_SYN && self.code == SYN_REPORT
    }

    pub fn is_mt_report(&self) -> bool {
        self.kind == EV_SYN && self.code == SYN_MT_REPORT
    }

    /// Convert to the kernel's wire record with a zeroed timestamp.
    pub fn to_input_event(self) -> libc::input_event {
        libc::input_event {
            time: libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
            type_: self.kind,
            code: self.code,
            value: self.value,
        }
    }
}

impl From<evdev::InputEvent> for RawEvent {
    fn from(event: evdev::InputEvent) -> Self {
        Self::new(event.event_type().0, event.code(), event.value())
    }
}

impl From<libc::input_event> for RawEvent {
    fn from(event: libc::input_event) -> Self {
        Self::new(event.type_, event.code, event.value)
    }
}
