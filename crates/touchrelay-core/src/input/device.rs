// Touchrelay Input Layer - Device Registry
// Touch panel discovery, axis range queries and exclusive grabs

use std::fs;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use evdev::{AbsoluteAxisCode, Device, InputEvent};

use super::capability::{is_multitouch, AbsCapabilities};
use crate::state::{AxisRange, AxisRanges};

/// Errors raised while opening or querying input devices
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Event device error: {0}")]
    Evdev(String),

    #[error("Missing MT axis info on {0}")]
    MissingAxisInfo(PathBuf),

    #[error("Cannot read input directory {}: {source}", path.display())]
    InputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Bus/vendor/product/version quadruple of an input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceIdentity {
    pub bus_type: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
}

/// Summary of a touch panel for `--list-devices`
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub path: PathBuf,
    pub axes: AxisRanges,
}

/// An open multi-touch panel.
///
/// Dropping the device releases its grab before the descriptor closes, so a
/// panel never stays captured after its reader goes away.
pub struct TouchDevice {
    path: PathBuf,
    name: String,
    device: Device,
    axes: AxisRanges,
    grabbed: bool,
}

impl TouchDevice {
    /// Open `path` and keep it only if it is a multi-touch panel.
    ///
    /// Returns `Ok(None)` for devices that lack the slot protocol axes.
    pub fn open(path: &Path) -> Result<Option<Self>, DeviceError> {
        let device = Device::open(path)?;
        if !is_multitouch(&AbsCapabilities::from_device(&device)) {
            return Ok(None);
        }

        let axes = read_axis_ranges(&device)
            .ok_or_else(|| DeviceError::MissingAxisInfo(path.to_path_buf()))?;
        let name = device.name().unwrap_or("Unknown").to_string();

        Ok(Some(Self {
            path: path.to_path_buf(),
            name,
            device,
            axes,
            grabbed: false,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn axes(&self) -> AxisRanges {
        self.axes
    }

    pub fn is_grabbed(&self) -> bool {
        self.grabbed
    }

    /// Take sole ownership of the panel's event stream.
    pub fn grab(&mut self) -> Result<(), DeviceError> {
        if !self.grabbed {
            self.device.grab()?;
            self.grabbed = true;
        }
        Ok(())
    }

    pub fn ungrab(&mut self) {
        if self.grabbed {
            if let Err(e) = self.device.ungrab() {
                log::debug!("Ungrab of {} failed: {}", self.path.display(), e);
            }
            self.grabbed = false;
        }
    }

    pub fn identity(&self) -> DeviceIdentity {
        let id = self.device.input_id();
        DeviceIdentity {
            bus_type: id.bus_type().0,
            vendor: id.vendor(),
            product: id.product(),
            version: id.version(),
        }
    }

    /// EV_KEY codes this panel advertises.
    pub fn supported_keys(&self) -> Vec<u16> {
        self.device
            .supported_keys()
            .map(|keys| keys.iter().map(|key| key.code()).collect())
            .unwrap_or_default()
    }

    /// Read whatever events the kernel has queued for this panel.
    pub fn fetch_events(&mut self) -> std::io::Result<Vec<InputEvent>> {
        Ok(self.device.fetch_events()?.collect())
    }

    pub fn info(&self, index: usize) -> DeviceInfo {
        DeviceInfo {
            index,
            name: self.name.clone(),
            path: self.path.clone(),
            axes: self.axes,
        }
    }
}

impl AsRawFd for TouchDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.device.as_raw_fd()
    }
}

impl Drop for TouchDevice {
    fn drop(&mut self) {
        self.ungrab();
    }
}

impl std::fmt::Debug for TouchDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TouchDevice")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("axes", &self.axes)
            .field("grabbed", &self.grabbed)
            .finish()
    }
}

fn read_axis_ranges(device: &Device) -> Option<AxisRanges> {
    let state = device.get_abs_state().ok()?;
    let range = |axis: AbsoluteAxisCode| {
        let info = state.get(axis.0 as usize)?;
        Some(AxisRange {
            minimum: info.minimum,
            maximum: info.maximum,
            resolution: info.resolution,
        })
    };
    Some(AxisRanges::new(
        range(AbsoluteAxisCode::ABS_MT_POSITION_X)?,
        range(AbsoluteAxisCode::ABS_MT_POSITION_Y)?,
    ))
}

/// Parse the `N` out of an `eventN` node name.
fn event_number(name: &str) -> Option<u32> {
    name.strip_prefix("event")?.parse().ok()
}

/// Event nodes under `dir`, in numeric order.
pub fn event_nodes(dir: &Path) -> Result<Vec<PathBuf>, DeviceError> {
    let entries = fs::read_dir(dir).map_err(|source| DeviceError::InputDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut nodes: Vec<(u32, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let number = event_number(entry.file_name().to_str()?)?;
            Some((number, entry.path()))
        })
        .collect();
    nodes.sort_by_key(|(number, _)| *number);
    Ok(nodes.into_iter().map(|(_, path)| path).collect())
}

/// Open every multi-touch panel under `dir`, grabbing each unless `grab` is false.
///
/// Nodes that cannot be opened or that are not touch panels are skipped.
/// A grab failure releases every panel opened so far and returns the error.
pub fn discover_touch_devices(dir: &Path, grab: bool) -> Result<Vec<TouchDevice>, DeviceError> {
    let mut devices = Vec::new();

    for path in event_nodes(dir)? {
        let mut device = match TouchDevice::open(&path) {
            Ok(Some(device)) => device,
            Ok(None) => {
                log::debug!("Skipping {}: not a multi-touch panel", path.display());
                continue;
            }
            Err(e) => {
                log::debug!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        if grab {
            device.grab()?;
        }

        log::debug!(
            "Found touch panel {} ({}) x=[{}, {}] y=[{}, {}]",
            device.name,
            path.display(),
            device.axes.x.minimum,
            device.axes.x.maximum,
            device.axes.y.minimum,
            device.axes.y.maximum
        );
        devices.push(device);
    }

    Ok(devices)
}

/// List multi-touch panels without grabbing them.
pub fn list_touch_devices(dir: &Path) -> Result<Vec<DeviceInfo>, DeviceError> {
    Ok(discover_touch_devices(dir, false)?
        .iter()
        .enumerate()
        .map(|(index, device)| device.info(index))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_number() {
        assert_eq!(event_number("event0"), Some(0));
        assert_eq!(event_number("event12"), Some(12));
        assert_eq!(event_number("mouse0"), None);
        assert_eq!(event_number("event"), None);
        assert_eq!(event_number("eventX"), None);
    }

    #[test]
    fn test_event_nodes_sorted_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["event10", "event2", "mice", "event0", "by-id"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let nodes = event_nodes(dir.path()).unwrap();
        let names: Vec<String> = nodes
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["event0", "event2", "event10"]);
    }

    #[test]
    fn test_discover_skips_non_device_nodes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("event0"), b"not a device").unwrap();
        let devices = discover_touch_devices(dir.path(), false).unwrap();
        assert!(devices.is_empty());
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let result = discover_touch_devices(Path::new("/nonexistent/touchrelay/input"), false);
        match result {
            Err(DeviceError::InputDir { path, source }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/touchrelay/input"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("Unexpected result: {:?}", other.map(|d| d.len())),
        }
    }
}
