// Touchrelay Panel Reader
// Poll loop that decodes one grabbed panel into committed frames

use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;

use crate::input::{RawEvent, SlotDecoder, TouchDevice};
use crate::session::Shared;

/// Outcome of waiting on a device descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Events are available
    Readable,
    /// Timeout or EINTR; check the running flag and retry
    Idle,
    /// The descriptor hung up or became invalid
    Closed,
}

/// Wait up to `timeout_ms` for `fd` to become readable.
///
/// EINTR is reported as [`Readiness::Idle`] so the caller can observe
/// cancellation. Other poll failures are returned as errors.
pub fn poll_readable(fd: RawFd, timeout_ms: i32) -> std::io::Result<Readiness> {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    let rc = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
    if rc < 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            return Ok(Readiness::Idle);
        }
        return Err(err);
    }
    if rc == 0 {
        return Ok(Readiness::Idle);
    }
    if pollfd.revents & libc::POLLIN != 0 {
        return Ok(Readiness::Readable);
    }
    if pollfd.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0 {
        return Ok(Readiness::Closed);
    }
    Ok(Readiness::Idle)
}

/// Reader thread body. Returns when the session stops running, the device
/// disappears, or an upload fails. Dropping `device` releases the grab.
pub(crate) fn run(shared: Arc<Shared>, mut device: TouchDevice, mut decoder: SlotDecoder, timeout_ms: i32) {
    log::debug!(
        "Reader {} started on {} ({})",
        decoder.device_index(),
        device.path().display(),
        device.name()
    );

    while shared.is_running() {
        match poll_readable(device.as_raw_fd(), timeout_ms) {
            Ok(Readiness::Readable) => {}
            Ok(Readiness::Idle) => continue,
            Ok(Readiness::Closed) => {
                log::warn!("{} went away, stopping its reader", device.path().display());
                break;
            }
            Err(e) => {
                log::debug!("poll on {} failed: {}", device.path().display(), e);
                continue;
            }
        }

        if !shared.is_running() {
            break;
        }

        let events = match device.fetch_events() {
            Ok(events) => events,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => {
                log::debug!("Read from {} failed: {}", device.path().display(), e);
                continue;
            }
        };

        if let Err(e) = shared.process_events(&mut decoder, events.into_iter().map(RawEvent::from)) {
            log::debug!("Reader {} stopping: {}", decoder.device_index(), e);
            shared.stop();
            break;
        }
    }

    log::debug!("Reader {} exiting", decoder.device_index());
}
