// Touchrelay uinput Output Layer
// Virtual touchscreen creation and frame emission

use std::ffi::CString;
use std::os::unix::io::AsRawFd;

use evdev::uinput::VirtualDevice;
use evdev::{
    AbsInfo, AbsoluteAxisCode, AttributeSet, BusType, InputId, KeyCode, PropType, UinputAbsSetup,
};

use super::identity::{RandomBytes, RandomIdentity};
use super::EventSink;
use crate::input::codes::{BTN_TOOL_FINGER, BTN_TOUCH};
use crate::input::{DeviceIdentity, RawEvent, TouchDevice};

/// UI_DEV_DESTROY = _IO('U', 2)
const UI_DEV_DESTROY: libc::Ioctl = 0x5502;

/// Upper bound advertised for ABS_MT_TRACKING_ID.
pub const TRACKING_ID_MAX: i32 = 65535;

/// Error types for uinput operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum UInputError {
    #[error("Failed to create virtual device: {0}")]
    DeviceCreation(String),

    #[error("Failed to write event: {0}")]
    WriteError(String),

    #[error("Short write to virtual device: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
}

/// Everything copied from the reference panel into the virtual device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTemplate {
    pub identity: DeviceIdentity,
    /// Key codes advertised by the reference panel
    pub reference_keys: Vec<u16>,
    /// Raw axis maxima of the reference panel
    pub raw_max_x: i32,
    pub raw_max_y: i32,
}

impl DeviceTemplate {
    pub fn from_reference(device: &TouchDevice) -> Self {
        let axes = device.axes();
        Self {
            identity: device.identity(),
            reference_keys: device.supported_keys(),
            raw_max_x: axes.x.maximum,
            raw_max_y: axes.y.maximum,
        }
    }

    /// Finger/touch buttons followed by every other key the reference exposes.
    pub fn key_codes(&self) -> Vec<u16> {
        let mut codes = vec![BTN_TOOL_FINGER, BTN_TOUCH];
        codes.extend(
            self.reference_keys
                .iter()
                .copied()
                .filter(|code| *code != BTN_TOUCH && *code != BTN_TOOL_FINGER),
        );
        codes
    }

    /// Reference identity, or a small random one when the panel reports none.
    pub fn input_id(&self) -> DeviceIdentity {
        if self.identity != DeviceIdentity::default() {
            return self.identity;
        }
        let mut rng = RandomBytes::new();
        DeviceIdentity {
            bus_type: 0,
            vendor: rng.in_range(5, 14) as u16,
            product: rng.in_range(5, 14) as u16,
            version: rng.in_range(5, 14) as u16,
        }
    }
}

/// Virtual uinput touchscreen mirroring a physical panel.
pub struct VirtualTouchscreen {
    device: VirtualDevice,
    name: String,
    phys: String,
    destroyed: bool,
}

impl VirtualTouchscreen {
    /// Create and register the virtual device.
    pub fn new(template: &DeviceTemplate) -> Result<Self, UInputError> {
        let identity = RandomIdentity::generate();
        let phys = CString::new(identity.phys.as_str())
            .map_err(|e| UInputError::DeviceCreation(e.to_string()))?;
        let id = template.input_id();

        let mut keys = AttributeSet::<KeyCode>::new();
        for code in template.key_codes() {
            keys.insert(KeyCode::new(code));
        }

        let mut props = AttributeSet::<PropType>::new();
        props.insert(PropType::DIRECT);

        let x_abs = AbsInfo::new(0, 0, template.raw_max_x, 0, 0, 0);
        let y_abs = AbsInfo::new(0, 0, template.raw_max_y, 0, 0, 0);
        let tracking_abs = AbsInfo::new(0, 0, TRACKING_ID_MAX, 0, 0, 0);

        let device = VirtualDevice::builder()
            .map_err(|e: std::io::Error| UInputError::DeviceCreation(e.to_string()))?
            .name(&identity.name)
            .input_id(InputId::new(BusType(id.bus_type), id.vendor, id.product, id.version))
            .with_phys(&phys)
            .map_err(|e: std::io::Error| UInputError::DeviceCreation(e.to_string()))?
            .with_properties(&props)
            .map_err(|e: std::io::Error| UInputError::DeviceCreation(e.to_string()))?
            .with_keys(&keys)
            .map_err(|e: std::io::Error| UInputError::DeviceCreation(e.to_string()))?
            .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_X, x_abs))
            .map_err(|e: std::io::Error| UInputError::DeviceCreation(e.to_string()))?
            .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_Y, y_abs))
            .map_err(|e: std::io::Error| UInputError::DeviceCreation(e.to_string()))?
            .with_absolute_axis(&UinputAbsSetup::new(
                AbsoluteAxisCode::ABS_MT_POSITION_X,
                x_abs,
            ))
            .map_err(|e: std::io::Error| UInputError::DeviceCreation(e.to_string()))?
            .with_absolute_axis(&UinputAbsSetup::new(
                AbsoluteAxisCode::ABS_MT_POSITION_Y,
                y_abs,
            ))
            .map_err(|e: std::io::Error| UInputError::DeviceCreation(e.to_string()))?
            .with_absolute_axis(&UinputAbsSetup::new(
                AbsoluteAxisCode::ABS_MT_TRACKING_ID,
                tracking_abs,
            ))
            .map_err(|e: std::io::Error| UInputError::DeviceCreation(e.to_string()))?
            .build()
            .map_err(|e: std::io::Error| UInputError::DeviceCreation(e.to_string()))?;

        log::info!(
            "Created virtual touchscreen '{}' ({}x{} raw, {} keys)",
            identity.name,
            template.raw_max_x,
            template.raw_max_y,
            keys.iter().count()
        );

        Ok(Self {
            device,
            name: identity.name,
            phys: identity.phys,
            destroyed: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phys(&self) -> &str {
        &self.phys
    }

    /// Sysfs directory of the registered device, e.g. `/sys/devices/virtual/input/input42`.
    pub fn syspath(&mut self) -> std::io::Result<std::path::PathBuf> {
        self.device.get_syspath()
    }

    /// Unregister the device from the kernel. Safe to call more than once.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        let rc = unsafe { libc::ioctl(self.device.as_raw_fd(), UI_DEV_DESTROY) };
        if rc < 0 {
            log::debug!(
                "UI_DEV_DESTROY on '{}' failed: {}",
                self.name,
                std::io::Error::last_os_error()
            );
        } else {
            log::info!("Destroyed virtual touchscreen '{}'", self.name);
        }
    }
}

impl EventSink for VirtualTouchscreen {
    /// Write the whole frame with a single write(2).
    fn write_frame(&mut self, events: &[RawEvent]) -> Result<(), UInputError> {
        let records: Vec<libc::input_event> =
            events.iter().map(|event| event.to_input_event()).collect();
        let expected = std::mem::size_of_val(records.as_slice());

        let written = unsafe {
            libc::write(
                self.device.as_raw_fd(),
                records.as_ptr().cast(),
                expected,
            )
        };
        if written < 0 {
            return Err(UInputError::WriteError(
                std::io::Error::last_os_error().to_string(),
            ));
        }
        if written as usize != expected {
            return Err(UInputError::ShortWrite {
                written: written as usize,
                expected,
            });
        }
        Ok(())
    }
}

impl Drop for VirtualTouchscreen {
    fn drop(&mut self) {
        self.destroy();
    }
}
