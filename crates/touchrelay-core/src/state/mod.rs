// Touchrelay State
// Shared contact table

mod contact;

pub use contact::{
    device_tracking_id, AxisRange, AxisRanges, Contact, ContactRef, ContactTable, TrackedDevice,
    MAX_SLOTS, SYNTHETIC_TRACKING_ID,
};
