// Touchrelay Input Layer
// Panel discovery, capability probing and slot-protocol decoding

mod capability;
pub mod decoder;
mod device;
pub mod event;

pub use capability::{is_multitouch, AbsCapabilities};
pub use decoder::{Decoded, SlotDecoder};
pub use device::{
    discover_touch_devices, event_nodes, list_touch_devices, DeviceError, DeviceIdentity,
    DeviceInfo, TouchDevice,
};
pub use event::{codes, RawEvent};
