// Touchrelay Event Handling
// Per-panel reader threads feeding the session

pub(crate) mod reader;

pub use reader::{poll_readable, Readiness};
