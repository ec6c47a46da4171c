// Touchrelay Core Library
// Synthetic multi-touch injection for the Linux input subsystem

pub mod event;
pub mod input;
pub mod output;
pub mod session;
pub mod settings;
pub mod state;
pub mod transform;

pub use input::{
    discover_touch_devices, is_multitouch, list_touch_devices, AbsCapabilities, DeviceError,
    DeviceInfo, RawEvent, SlotDecoder, TouchDevice,
};
pub use output::{EventSink, FrameEncoder, FrameRecorder, UInputError, VirtualTouchscreen};
pub use session::{
    FrameContext, FrameSnapshot, FrameSource, OutputFactory, PointerSink, Session, SessionConfig,
    SessionError,
};
pub use settings::{Settings, SettingsError};
pub use state::{AxisRange, AxisRanges, Contact, ContactRef, ContactTable, TrackedDevice};
pub use transform::{screen_to_touch, touch_to_screen, Orientation, ScreenGeometry, Vector2};
