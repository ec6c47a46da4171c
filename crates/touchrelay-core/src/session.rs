// Touchrelay Session
// Owns the contact table, the virtual touchscreen and one reader per panel

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;

use crate::event::reader;
use crate::input::{
    discover_touch_devices, Decoded, DeviceError, RawEvent, SlotDecoder, TouchDevice,
};
use crate::output::{DeviceTemplate, EventSink, FrameEncoder, UInputError, VirtualTouchscreen};
use crate::state::{AxisRanges, Contact, ContactRef, ContactTable, TrackedDevice};
use crate::transform::{screen_to_touch, touch_to_screen, Orientation, ScreenGeometry, Vector2};

/// Default directory scanned for event nodes
pub const DEFAULT_INPUT_DIR: &str = "/dev/input";

/// Default reader poll timeout; bounds how long `close` waits for readers
pub const DEFAULT_POLL_TIMEOUT_MS: i32 = 100;

/// Errors surfaced by session operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No multi-touch devices found")]
    NoDevicesFound,

    #[error("Virtual device creation failed: {0}")]
    VirtualDeviceCreateFailed(#[source] UInputError),

    #[error("Upload to virtual device failed: {0}")]
    UploadWriteFailed(#[source] UInputError),

    #[error("Session is not initialized")]
    NotInitialized,

    #[error("Unknown contact: {0:?}")]
    UnknownContact(ContactRef),

    #[error("Failed to spawn reader thread: {0}")]
    Spawn(#[source] io::Error),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Core-facing configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Directory holding `eventN` nodes
    pub input_dir: PathBuf,
    /// Reader poll timeout in milliseconds
    pub poll_timeout_ms: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
        }
    }
}

/// Receives a single-pointer view of every committed frame.
///
/// `position` is in rotated logical screen space. Implementations run on
/// reader threads and should return quickly.
pub trait PointerSink: Send + Sync {
    fn update(&self, position: Vector2, pressed: bool);
}

/// Where a published frame came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSource {
    Device(usize),
    Injected,
}

/// Copy of the down contacts at a committed frame boundary
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    pub source: FrameSource,
    pub contacts: SmallVec<[(ContactRef, Contact); 4]>,
}

type FrameCallback = Box<dyn FnMut(&mut FrameContext<'_>) + Send>;

/// Builds the output a non-read-only `init` writes to, from the reference panel.
pub type OutputFactory =
    Box<dyn Fn(&DeviceTemplate) -> Result<Box<dyn EventSink>, UInputError> + Send + Sync>;

fn virtual_touchscreen(template: &DeviceTemplate) -> Result<Box<dyn EventSink>, UInputError> {
    Ok(Box::new(VirtualTouchscreen::new(template)?))
}

/// A panel `init` can start a reader for.
pub(crate) trait Panel: Send + 'static {
    fn template(&self) -> DeviceTemplate;
    fn axes(&self) -> AxisRanges;
    fn label(&self) -> (PathBuf, String);
    /// Move the panel onto its own reader thread.
    fn spawn_reader(
        self,
        shared: Arc<Shared>,
        decoder: SlotDecoder,
        timeout_ms: i32,
    ) -> io::Result<JoinHandle<()>>;
}

impl Panel for TouchDevice {
    fn template(&self) -> DeviceTemplate {
        DeviceTemplate::from_reference(self)
    }

    fn axes(&self) -> AxisRanges {
        TouchDevice::axes(self)
    }

    fn label(&self) -> (PathBuf, String) {
        (self.path().to_path_buf(), self.name().to_string())
    }

    fn spawn_reader(
        self,
        shared: Arc<Shared>,
        decoder: SlotDecoder,
        timeout_ms: i32,
    ) -> io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name(format!("touchrelay-reader-{}", decoder.device_index()))
            .spawn(move || reader::run(shared, self, decoder, timeout_ms))
    }
}

/// State guarded by the session lock: everything an upload reads.
pub(crate) struct FrameState {
    table: ContactTable,
    encoder: FrameEncoder,
    output: Option<Box<dyn EventSink>>,
}

impl FrameState {
    fn new() -> Self {
        Self {
            table: ContactTable::default(),
            encoder: FrameEncoder::new(),
            output: None,
        }
    }

    /// Encode and write the table. A failed write leaves the encoder's
    /// touch edge as it was, so the next frame repeats the button events.
    fn upload(&mut self) -> Result<(), SessionError> {
        let previous = self.encoder.clone();
        let frame = self.encoder.encode(&self.table);
        match self.output.as_mut() {
            Some(sink) => {
                if let Err(e) = sink.write_frame(&frame) {
                    self.encoder = previous;
                    return Err(SessionError::UploadWriteFailed(e));
                }
                Ok(())
            }
            None => {
                log::trace!("Read-only session, discarding {} events", frame.len());
                Ok(())
            }
        }
    }

    fn snapshot(&self, source: FrameSource) -> FrameSnapshot {
        FrameSnapshot {
            source,
            contacts: self.table.active().map(|(r, c)| (r, *c)).collect(),
        }
    }
}

/// View handed to the frame callback while the session lock is held.
///
/// The callback must not call back into the [`Session`]; use
/// [`upload`](Self::upload) here to forward the frame.
pub struct FrameContext<'a> {
    state: &'a mut FrameState,
    touch_scale: Vector2,
    source: usize,
    upload_failure: Option<UInputError>,
}

impl FrameContext<'_> {
    /// Index of the device whose frame boundary triggered this call
    pub fn source_device(&self) -> usize {
        self.source
    }

    pub fn devices(&self) -> &[TrackedDevice] {
        &self.state.table.devices
    }

    pub fn devices_mut(&mut self) -> &mut [TrackedDevice] {
        &mut self.state.table.devices
    }

    /// Every contact currently down
    pub fn contacts(&self) -> Vec<(ContactRef, Contact)> {
        self.state.table.active().map(|(r, c)| (r, *c)).collect()
    }

    pub fn contact_mut(&mut self, contact: ContactRef) -> Option<&mut Contact> {
        self.state.table.get_mut(contact)
    }

    /// Reposition a contact to unrotated logical `(x, y)` without uploading.
    pub fn move_contact(&mut self, contact: ContactRef, x: f32, y: f32) -> Result<(), SessionError> {
        let position = Vector2::new(x, y) * self.touch_scale;
        let target = self
            .state
            .table
            .get_mut(contact)
            .ok_or(SessionError::UnknownContact(contact))?;
        target.position = position;
        Ok(())
    }

    /// Encode the table and write it to the virtual device.
    ///
    /// A write failure stops the session once the callback returns, whether
    /// or not the callback handles the error.
    pub fn upload(&mut self) -> Result<(), SessionError> {
        let result = self.state.upload();
        if let Err(SessionError::UploadWriteFailed(e)) = &result {
            self.upload_failure = Some(e.clone());
        }
        result
    }
}

/// State shared between the session and its reader threads.
pub(crate) struct Shared {
    running: AtomicBool,
    read_only: AtomicBool,
    orientation: AtomicU8,
    other_touch: AtomicBool,
    geometry: RwLock<ScreenGeometry>,
    frame: Mutex<FrameState>,
    callback: Mutex<Option<FrameCallback>>,
    pointer: RwLock<Option<Arc<dyn PointerSink>>>,
    subscribers: Mutex<Vec<Sender<FrameSnapshot>>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            read_only: AtomicBool::new(false),
            orientation: AtomicU8::new(Orientation::Rotation0.index()),
            other_touch: AtomicBool::new(false),
            geometry: RwLock::new(ScreenGeometry::default()),
            frame: Mutex::new(FrameState::new()),
            callback: Mutex::new(None),
            pointer: RwLock::new(None),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub(crate) fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Frame state may no longer match what the kernel saw; stop the session.
    fn stop_on_upload_failure(&self, result: &Result<(), SessionError>) {
        if let Err(e @ SessionError::UploadWriteFailed(_)) = result {
            log::error!("Stopping session: {}", e);
            self.stop();
        }
    }

    fn orientation(&self) -> Orientation {
        Orientation::from_index(i32::from(self.orientation.load(Ordering::Relaxed)))
    }

    fn other_touch(&self) -> bool {
        self.other_touch.load(Ordering::Relaxed)
    }

    fn touch_to_screen(&self, raw: Vector2) -> Vector2 {
        let geometry = *self.geometry.read();
        touch_to_screen(raw, &geometry, self.orientation(), self.other_touch())
    }

    fn wants_snapshots(&self) -> bool {
        !self.subscribers.lock().is_empty()
    }

    fn publish(&self, snapshot: FrameSnapshot) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(snapshot.clone()).is_ok());
    }

    /// Feed raw events through `decoder`, committing each complete frame.
    pub(crate) fn process_events(
        &self,
        decoder: &mut SlotDecoder,
        events: impl IntoIterator<Item = RawEvent>,
    ) -> Result<(), SessionError> {
        for event in events {
            if decoder.feed(event) == Decoded::Frame {
                self.commit_frame(decoder)?;
            }
        }
        Ok(())
    }

    /// Apply one decoded frame under the lock and hand it on.
    fn commit_frame(&self, decoder: &mut SlotDecoder) -> Result<(), SessionError> {
        let index = decoder.device_index();
        let touch_scale = self.geometry.read().touch_scale;
        let wants_snapshot = self.wants_snapshots();

        let mut guard = self.frame.lock();
        let state = &mut *guard;
        let Some(device) = state.table.devices.get_mut(index) else {
            log::debug!("Frame from unknown device {}, dropping", index);
            return Ok(());
        };
        decoder.commit(device);

        let result = if self.read_only.load(Ordering::Relaxed) {
            Ok(())
        } else {
            let mut callback = self.callback.lock();
            match callback.as_mut() {
                Some(callback) => {
                    let mut ctx = FrameContext {
                        state: &mut *state,
                        touch_scale,
                        source: index,
                        upload_failure: None,
                    };
                    callback(&mut ctx);
                    match ctx.upload_failure {
                        Some(e) => Err(SessionError::UploadWriteFailed(e)),
                        None => Ok(()),
                    }
                }
                None => state.upload(),
            }
        };
        self.stop_on_upload_failure(&result);

        // Taken after the callback so the mirror reflects any repositioning
        let pointer = state
            .table
            .get(ContactRef::Device {
                device: index,
                slot: decoder.last_slot(),
            })
            .copied()
            .unwrap_or_default();

        let snapshot = wants_snapshot.then(|| state.snapshot(FrameSource::Device(index)));
        drop(guard);

        log::trace!(
            "Committed frame from device {} (slot {} down={})",
            index,
            decoder.last_slot(),
            pointer.is_down
        );

        if let Some(sink) = self.pointer.read().as_ref() {
            sink.update(self.touch_to_screen(pointer.position), pointer.is_down);
        }
        if let Some(snapshot) = snapshot {
            self.publish(snapshot);
        }
        result
    }

    /// Mutate the table through `f` and upload, bypassing any callback.
    fn inject<F>(&self, f: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut ContactTable, Vector2) -> Result<(), SessionError>,
    {
        if !self.is_running() {
            return Err(SessionError::NotInitialized);
        }
        let touch_scale = self.geometry.read().touch_scale;
        let wants_snapshot = self.wants_snapshots();

        let mut state = self.frame.lock();
        f(&mut state.table, touch_scale)?;
        let result = state.upload();
        self.stop_on_upload_failure(&result);
        let snapshot = wants_snapshot.then(|| state.snapshot(FrameSource::Injected));
        drop(state);

        if let Some(snapshot) = snapshot {
            self.publish(snapshot);
        }
        result
    }
}

/// A synthetic multi-touch session.
///
/// `init` discovers and grabs panels, creates the virtual touchscreen and
/// starts one reader thread per panel. All methods take `&self`, so the
/// session can be shared as `Arc<Session>` between a control thread and a
/// GUI or automation thread.
pub struct Session {
    shared: Arc<Shared>,
    config: SessionConfig,
    output_factory: OutputFactory,
    readers: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            config,
            output_factory: Box::new(virtual_touchscreen),
            readers: Mutex::new(Vec::new()),
        }
    }

    /// Replace the uinput touchscreen `init` creates with another output.
    pub fn with_output_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&DeviceTemplate) -> Result<Box<dyn EventSink>, UInputError> + Send + Sync + 'static,
    {
        self.output_factory = Box::new(factory);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start a session for a logical screen of `screen_size` pixels.
    ///
    /// Any previous session is closed first. On error nothing stays grabbed
    /// and no virtual device exists. With `read_only` the panels are neither
    /// grabbed nor re-emitted; frames still reach the pointer sink and
    /// subscribers. A missing or unreadable input directory counts as no
    /// panels.
    pub fn init(&self, screen_size: Vector2, read_only: bool) -> Result<(), SessionError> {
        let mut readers = self.readers.lock();
        self.close_locked(&mut readers);

        let devices = match discover_touch_devices(&self.config.input_dir, !read_only) {
            Ok(devices) => devices,
            Err(DeviceError::InputDir { path, source }) => {
                log::warn!("Cannot scan {}: {}", path.display(), source);
                return Err(SessionError::NoDevicesFound);
            }
            Err(e) => return Err(e.into()),
        };
        self.start_panels(&mut readers, screen_size, read_only, devices)
    }

    fn start_panels<P: Panel>(
        &self,
        readers: &mut Vec<JoinHandle<()>>,
        screen_size: Vector2,
        read_only: bool,
        panels: Vec<P>,
    ) -> Result<(), SessionError> {
        if panels.is_empty() {
            log::warn!(
                "No multi-touch panels under {}",
                self.config.input_dir.display()
            );
            return Err(SessionError::NoDevicesFound);
        }
        log::info!("Found {} touch panel(s)", panels.len());

        let output = if read_only {
            None
        } else {
            // On failure `panels` drops here, releasing every grab
            let sink = (self.output_factory)(&panels[0].template())
                .map_err(SessionError::VirtualDeviceCreateFailed)?;
            Some(sink)
        };

        let axes: Vec<AxisRanges> = panels.iter().map(Panel::axes).collect();
        let scales = self.start(screen_size, read_only, &axes, output, |index| {
            panels[index].label()
        });

        for (index, panel) in panels.into_iter().enumerate() {
            let decoder = SlotDecoder::new(index, scales[index]);
            let spawned =
                panel.spawn_reader(Arc::clone(&self.shared), decoder, self.config.poll_timeout_ms);
            match spawned {
                Ok(handle) => readers.push(handle),
                Err(e) => {
                    self.close_locked(readers);
                    return Err(SessionError::Spawn(e));
                }
            }
        }

        log::info!(
            "Session started: screen {}x{}, read_only={}",
            screen_size.x,
            screen_size.y,
            read_only
        );
        Ok(())
    }

    /// Start a session over panels that are fed by the caller.
    ///
    /// No device is opened and no reader is spawned; frames enter through
    /// [`process_events`](Self::process_events) with a decoder from
    /// [`decoder`](Self::decoder). `axes[0]` is the reference panel.
    pub fn attach(
        &self,
        screen_size: Vector2,
        axes: &[AxisRanges],
        output: Option<Box<dyn EventSink>>,
    ) -> Result<(), SessionError> {
        let mut readers = self.readers.lock();
        self.close_locked(&mut readers);

        if axes.is_empty() {
            return Err(SessionError::NoDevicesFound);
        }
        let read_only = output.is_none();
        self.start(screen_size, read_only, axes, output, |index| {
            (PathBuf::new(), format!("attached-{}", index))
        });
        Ok(())
    }

    /// Install the table, geometry and output; returns per-device scales.
    fn start(
        &self,
        screen_size: Vector2,
        read_only: bool,
        axes: &[AxisRanges],
        output: Option<Box<dyn EventSink>>,
        label: impl Fn(usize) -> (PathBuf, String),
    ) -> Vec<Vector2> {
        let screen_raw = axes[0].raw_size();
        let tracked: Vec<TrackedDevice> = axes
            .iter()
            .enumerate()
            .map(|(index, axes)| {
                let (path, name) = label(index);
                TrackedDevice::new(path, name, *axes, screen_raw)
            })
            .collect();
        let scales = tracked.iter().map(|d| d.scale).collect();

        let mut state = self.shared.frame.lock();
        state.table = ContactTable::new(tracked);
        state.encoder.reset();
        state.output = output;
        *self.shared.geometry.write() =
            ScreenGeometry::new(screen_size, screen_raw, self.shared.other_touch());
        self.shared.read_only.store(read_only, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);
        scales
    }

    /// Stop readers, release panels and destroy the virtual device.
    ///
    /// Idempotent; safe after a failed `init`.
    pub fn close(&self) {
        let mut readers = self.readers.lock();
        self.close_locked(&mut readers);
    }

    fn close_locked(&self, readers: &mut Vec<JoinHandle<()>>) {
        let was_running = self.shared.running.swap(false, Ordering::SeqCst);

        for handle in readers.drain(..) {
            if handle.join().is_err() {
                log::error!("Reader thread panicked");
            }
        }

        let mut state = self.shared.frame.lock();
        let had_output = state.output.take().is_some();
        state.table.clear();
        state.encoder.reset();
        drop(state);

        if was_running || had_output {
            log::info!("Session closed");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.is_running()
    }

    pub fn device_count(&self) -> usize {
        self.shared.frame.lock().table.devices.len()
    }

    /// Decoder for an attached device, using that device's scale.
    pub fn decoder(&self, device_index: usize) -> Option<SlotDecoder> {
        let state = self.shared.frame.lock();
        let device = state.table.devices.get(device_index)?;
        Some(SlotDecoder::new(device_index, device.scale))
    }

    /// Feed raw events for one device, committing at every `SYN_REPORT`.
    pub fn process_events(
        &self,
        decoder: &mut SlotDecoder,
        events: impl IntoIterator<Item = RawEvent>,
    ) -> Result<(), SessionError> {
        if !self.is_initialized() {
            return Err(SessionError::NotInitialized);
        }
        self.shared.process_events(decoder, events)
    }

    /// Press the injected contact at unrotated logical `(x, y)`.
    pub fn down(&self, x: f32, y: f32) -> Result<(), SessionError> {
        self.shared.inject(|table, scale| {
            let contact = &mut table.synthetic;
            contact.position = Vector2::new(x, y) * scale;
            contact.is_down = true;
            Ok(())
        })
    }

    /// Move the injected contact; presses it if it was up.
    pub fn move_to(&self, x: f32, y: f32) -> Result<(), SessionError> {
        self.down(x, y)
    }

    /// Release the injected contact.
    pub fn up(&self) -> Result<(), SessionError> {
        self.shared.inject(|table, _| {
            table.synthetic.is_down = false;
            Ok(())
        })
    }

    /// Reposition any contact to unrotated logical `(x, y)` and upload.
    pub fn move_contact(&self, contact: ContactRef, x: f32, y: f32) -> Result<(), SessionError> {
        self.shared.inject(|table, scale| {
            let target = table
                .get_mut(contact)
                .ok_or(SessionError::UnknownContact(contact))?;
            target.position = Vector2::new(x, y) * scale;
            Ok(())
        })
    }

    /// Encode the current table and write it to the virtual device.
    pub fn upload(&self) -> Result<(), SessionError> {
        self.shared.inject(|_, _| Ok(()))
    }

    /// Route committed frames to `callback` instead of uploading them.
    ///
    /// The callback runs on reader threads with the session lock held. It
    /// must forward frames itself via [`FrameContext::upload`] and must not
    /// call methods on this session.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: FnMut(&mut FrameContext<'_>) + Send + 'static,
    {
        *self.shared.callback.lock() = Some(Box::new(callback));
    }

    /// Return to uploading every committed frame.
    pub fn clear_callback(&self) {
        *self.shared.callback.lock() = None;
    }

    pub fn set_pointer_sink(&self, sink: Arc<dyn PointerSink>) {
        *self.shared.pointer.write() = Some(sink);
    }

    pub fn clear_pointer_sink(&self) {
        *self.shared.pointer.write() = None;
    }

    /// Receive a snapshot after every committed or injected frame.
    pub fn subscribe(&self) -> Receiver<FrameSnapshot> {
        let (tx, rx) = mpsc::channel();
        self.shared.subscribers.lock().push(tx);
        rx
    }

    /// Down contacts in the table right now
    pub fn contacts(&self) -> Vec<(ContactRef, Contact)> {
        self.shared
            .frame
            .lock()
            .table
            .active()
            .map(|(r, c)| (r, *c))
            .collect()
    }

    /// Map a raw contact position to rotated logical screen space.
    pub fn touch_to_screen(&self, raw: Vector2) -> Vector2 {
        self.shared.touch_to_screen(raw)
    }

    /// Map a rotated logical screen position back to raw panel space.
    pub fn screen_to_touch(&self, screen: Vector2) -> Vector2 {
        let geometry = *self.shared.geometry.read();
        screen_to_touch(
            screen,
            &geometry,
            self.shared.orientation(),
            self.shared.other_touch(),
        )
    }

    /// Raw-per-logical-pixel ratio computed at init
    pub fn scale(&self) -> Vector2 {
        self.shared.geometry.read().touch_scale
    }

    pub fn geometry(&self) -> ScreenGeometry {
        *self.shared.geometry.read()
    }

    /// Set the display rotation (0-3) used by subsequent transforms.
    pub fn set_orientation(&self, orientation: i32) {
        let orientation = Orientation::from_index(orientation);
        self.shared
            .orientation
            .store(orientation.index(), Ordering::Relaxed);
    }

    pub fn orientation(&self) -> Orientation {
        self.shared.orientation()
    }

    /// Select the alternate digitizer wiring table. The touch scale picks
    /// this up at the next `init`.
    pub fn set_other_touch(&self, other_touch: bool) {
        self.shared.other_touch.store(other_touch, Ordering::Relaxed);
    }

    pub fn other_touch(&self) -> bool {
        self.shared.other_touch()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use crate::input::codes::*;
    use crate::output::FrameRecorder;
    use crate::state::AxisRange;

    fn panel() -> AxisRanges {
        AxisRanges::new(AxisRange::new(0, 4095), AxisRange::new(0, 4095))
    }

    /// Stand-in for a grabbed panel; counts how many were released.
    struct FakePanel {
        released: Arc<AtomicUsize>,
        spawn_fails: bool,
    }

    impl FakePanel {
        fn new(released: &Arc<AtomicUsize>) -> Self {
            Self {
                released: Arc::clone(released),
                spawn_fails: false,
            }
        }
    }

    impl Drop for FakePanel {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Panel for FakePanel {
        fn template(&self) -> DeviceTemplate {
            DeviceTemplate {
                identity: Default::default(),
                reference_keys: Vec::new(),
                raw_max_x: 4095,
                raw_max_y: 4095,
            }
        }

        fn axes(&self) -> AxisRanges {
            panel()
        }

        fn label(&self) -> (PathBuf, String) {
            (PathBuf::from("/dev/input/event7"), "fake panel".to_string())
        }

        fn spawn_reader(
            self,
            shared: Arc<Shared>,
            _decoder: SlotDecoder,
            timeout_ms: i32,
        ) -> io::Result<JoinHandle<()>> {
            if self.spawn_fails {
                return Err(io::Error::new(io::ErrorKind::WouldBlock, "thread limit reached"));
            }
            std::thread::Builder::new().spawn(move || {
                let _panel = self;
                while shared.is_running() {
                    std::thread::sleep(Duration::from_millis(timeout_ms as u64));
                }
            })
        }
    }

    fn start_fake(session: &Session, panels: Vec<FakePanel>) -> Result<(), SessionError> {
        let mut readers = session.readers.lock();
        session.close_locked(&mut readers);
        session.start_panels(&mut readers, Vector2::new(1080.0, 1920.0), false, panels)
    }

    fn assert_fully_closed(session: &Session) {
        assert!(!session.is_initialized());
        assert_eq!(session.device_count(), 0);
        assert!(session.shared.frame.lock().output.is_none());
        assert!(session.readers.lock().is_empty());
    }

    struct FailingSink;

    impl EventSink for FailingSink {
        fn write_frame(&mut self, _events: &[RawEvent]) -> Result<(), UInputError> {
            Err(UInputError::WriteError("device gone".to_string()))
        }
    }

    fn attached(recorder: &FrameRecorder) -> Session {
        let session = Session::default();
        session
            .attach(
                Vector2::new(1080.0, 1920.0),
                &[panel()],
                Some(Box::new(recorder.clone())),
            )
            .unwrap();
        session
    }

    #[test]
    fn test_api_requires_initialization() {
        let session = Session::default();
        assert!(matches!(session.down(1.0, 1.0), Err(SessionError::NotInitialized)));
        assert!(matches!(session.up(), Err(SessionError::NotInitialized)));
        assert!(matches!(session.upload(), Err(SessionError::NotInitialized)));
    }

    #[test]
    fn test_attach_without_devices() {
        let session = Session::default();
        let result = session.attach(Vector2::new(1080.0, 1920.0), &[], None);
        assert!(matches!(result, Err(SessionError::NoDevicesFound)));
        assert!(!session.is_initialized());
    }

    #[test]
    fn test_down_scales_into_raw_space() {
        let recorder = FrameRecorder::new();
        let session = attached(&recorder);
        session.down(540.0, 960.0).unwrap();

        let contacts = session.contacts();
        assert_eq!(contacts.len(), 1);
        let (contact_ref, contact) = contacts[0];
        assert_eq!(contact_ref, ContactRef::Synthetic);
        assert!((contact.position.x - 2047.5).abs() < 0.01);
        assert!((contact.position.y - 2047.5).abs() < 0.01);
    }

    #[test]
    fn test_frame_boundary_is_the_commit_point() {
        let recorder = FrameRecorder::new();
        let session = attached(&recorder);
        let mut decoder = session.decoder(0).unwrap();

        session
            .process_events(
                &mut decoder,
                [
                    RawEvent::abs(ABS_MT_SLOT, 0),
                    RawEvent::abs(ABS_MT_TRACKING_ID, 1),
                    RawEvent::abs(ABS_MT_POSITION_X, 100),
                ],
            )
            .unwrap();
        assert!(session.contacts().is_empty());
        assert!(recorder.is_empty());

        session
            .process_events(&mut decoder, [RawEvent::report()])
            .unwrap();
        assert_eq!(session.contacts().len(), 1);
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn test_callback_replaces_upload() {
        let recorder = FrameRecorder::new();
        let session = attached(&recorder);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_cb = Arc::clone(&seen);
        session.set_callback(move |ctx| {
            seen_in_cb.lock().push(ctx.contacts().len());
        });

        let mut decoder = session.decoder(0).unwrap();
        session
            .process_events(
                &mut decoder,
                [RawEvent::abs(ABS_MT_POSITION_X, 5), RawEvent::report()],
            )
            .unwrap();

        assert_eq!(*seen.lock(), vec![1]);
        assert!(recorder.is_empty());

        // Injection bypasses the callback
        session.down(1.0, 1.0).unwrap();
        assert_eq!(recorder.len(), 1);
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_callback_can_move_and_upload() {
        let recorder = FrameRecorder::new();
        let session = attached(&recorder);
        session.set_callback(|ctx| {
            let contacts = ctx.contacts();
            for (contact, _) in contacts {
                ctx.move_contact(contact, 0.0, 0.0).unwrap();
            }
            ctx.upload().unwrap();
        });

        let mut decoder = session.decoder(0).unwrap();
        session
            .process_events(
                &mut decoder,
                [
                    RawEvent::abs(ABS_MT_POSITION_X, 500),
                    RawEvent::abs(ABS_MT_POSITION_Y, 600),
                    RawEvent::report(),
                ],
            )
            .unwrap();

        let frame = recorder.last().unwrap();
        assert!(frame.contains(&RawEvent::abs(ABS_MT_POSITION_X, 0)));
        assert!(frame.contains(&RawEvent::abs(ABS_MT_POSITION_Y, 0)));
    }

    #[test]
    fn test_read_only_skips_upload_and_callback() {
        let session = Session::default();
        session
            .attach(Vector2::new(1080.0, 1920.0), &[panel()], None)
            .unwrap();
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        session.set_callback(move |_| flag.store(true, Ordering::SeqCst));
        let rx = session.subscribe();

        let mut decoder = session.decoder(0).unwrap();
        session
            .process_events(
                &mut decoder,
                [RawEvent::abs(ABS_MT_POSITION_X, 5), RawEvent::report()],
            )
            .unwrap();

        assert!(!called.load(Ordering::SeqCst));
        let snapshot = rx.try_recv().unwrap();
        assert_eq!(snapshot.source, FrameSource::Device(0));
        assert_eq!(snapshot.contacts.len(), 1);
    }

    #[test]
    fn test_pointer_sink_sees_mapped_position() {
        struct Last(Mutex<Option<(Vector2, bool)>>);
        impl PointerSink for Last {
            fn update(&self, position: Vector2, pressed: bool) {
                *self.0.lock() = Some((position, pressed));
            }
        }

        let recorder = FrameRecorder::new();
        let session = attached(&recorder);
        let sink = Arc::new(Last(Mutex::new(None)));
        session.set_pointer_sink(sink.clone());

        let mut decoder = session.decoder(0).unwrap();
        session
            .process_events(
                &mut decoder,
                [
                    RawEvent::abs(ABS_MT_POSITION_X, 2048),
                    RawEvent::abs(ABS_MT_POSITION_Y, 2048),
                    RawEvent::report(),
                ],
            )
            .unwrap();

        let (position, pressed) = sink.0.lock().unwrap();
        assert!(pressed);
        assert!((position.x - 540.0).abs() < 0.5);
        assert!((position.y - 960.0).abs() < 0.5);
    }

    #[test]
    fn test_move_contact_unknown() {
        let recorder = FrameRecorder::new();
        let session = attached(&recorder);
        let result = session.move_contact(ContactRef::Device { device: 3, slot: 0 }, 1.0, 1.0);
        assert!(matches!(result, Err(SessionError::UnknownContact(_))));
    }

    #[test]
    fn test_output_creation_failure_releases_panels() {
        let released = Arc::new(AtomicUsize::new(0));
        let session = Session::default().with_output_factory(|_| {
            Err(UInputError::DeviceCreation("uinput unavailable".to_string()))
        });

        let result = start_fake(
            &session,
            vec![FakePanel::new(&released), FakePanel::new(&released)],
        );

        assert!(matches!(result, Err(SessionError::VirtualDeviceCreateFailed(_))));
        assert_eq!(released.load(Ordering::SeqCst), 2);
        assert_fully_closed(&session);
    }

    #[test]
    fn test_spawn_failure_unwinds_started_readers() {
        let released = Arc::new(AtomicUsize::new(0));
        let recorder = FrameRecorder::new();
        let output = recorder.clone();
        let session = Session::default()
            .with_output_factory(move |_| Ok(Box::new(output.clone()) as Box<dyn EventSink>));
        let mut failing = FakePanel::new(&released);
        failing.spawn_fails = true;

        let result = start_fake(
            &session,
            vec![FakePanel::new(&released), failing, FakePanel::new(&released)],
        );

        assert!(matches!(result, Err(SessionError::Spawn(_))));
        assert_eq!(released.load(Ordering::SeqCst), 3);
        assert_fully_closed(&session);
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_started_panels_write_through_factory_output() {
        let released = Arc::new(AtomicUsize::new(0));
        let recorder = FrameRecorder::new();
        let output = recorder.clone();
        let session = Session::default()
            .with_output_factory(move |template: &DeviceTemplate| {
                assert_eq!(template.raw_max_x, 4095);
                Ok(Box::new(output.clone()) as Box<dyn EventSink>)
            });

        start_fake(&session, vec![FakePanel::new(&released)]).unwrap();
        assert!(session.is_initialized());
        assert_eq!(session.device_count(), 1);
        session.down(540.0, 960.0).unwrap();
        assert_eq!(recorder.len(), 1);

        session.close();
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_fully_closed(&session);
    }

    #[test]
    fn test_failed_write_keeps_touch_edge() {
        let mut state = FrameState::new();
        state.table = ContactTable::new(Vec::new());
        state.table.synthetic.is_down = true;
        state.output = Some(Box::new(FailingSink));

        assert!(matches!(state.upload(), Err(SessionError::UploadWriteFailed(_))));
        assert!(!state.encoder.is_touching());

        let recorder = FrameRecorder::new();
        state.output = Some(Box::new(recorder.clone()));
        state.upload().unwrap();
        let frame = recorder.last().unwrap();
        assert_eq!(frame[0], RawEvent::key(BTN_TOUCH, 1));
        assert_eq!(frame[1], RawEvent::key(BTN_TOOL_FINGER, 1));
        assert!(state.encoder.is_touching());
    }

    #[test]
    fn test_callback_upload_failure_stops_session() {
        let session = Session::default();
        session
            .attach(
                Vector2::new(1080.0, 1920.0),
                &[panel()],
                Some(Box::new(FailingSink)),
            )
            .unwrap();
        // The callback swallows the error; the session must still stop
        session.set_callback(|ctx| {
            let _ = ctx.upload();
        });

        let mut decoder = session.decoder(0).unwrap();
        let result = session.process_events(
            &mut decoder,
            [RawEvent::abs(ABS_MT_POSITION_X, 5), RawEvent::report()],
        );

        assert!(matches!(result, Err(SessionError::UploadWriteFailed(_))));
        assert!(!session.is_initialized());
    }

    #[test]
    fn test_pointer_sink_sees_callback_repositioning() {
        struct Last(Mutex<Option<(Vector2, bool)>>);
        impl PointerSink for Last {
            fn update(&self, position: Vector2, pressed: bool) {
                *self.0.lock() = Some((position, pressed));
            }
        }

        let recorder = FrameRecorder::new();
        let session = attached(&recorder);
        let sink = Arc::new(Last(Mutex::new(None)));
        session.set_pointer_sink(sink.clone());
        session.set_callback(|ctx| {
            let contacts = ctx.contacts();
            for (contact, _) in contacts {
                ctx.move_contact(contact, 100.0, 200.0).unwrap();
            }
            ctx.upload().unwrap();
        });

        let mut decoder = session.decoder(0).unwrap();
        session
            .process_events(
                &mut decoder,
                [
                    RawEvent::abs(ABS_MT_POSITION_X, 2048),
                    RawEvent::abs(ABS_MT_POSITION_Y, 2048),
                    RawEvent::report(),
                ],
            )
            .unwrap();

        let (position, pressed) = sink.0.lock().unwrap();
        assert!(pressed);
        assert!((position.x - 100.0).abs() < 0.5);
        assert!((position.y - 200.0).abs() < 0.5);
    }

    #[test]
    fn test_close_clears_table() {
        let recorder = FrameRecorder::new();
        let session = attached(&recorder);
        session.down(1.0, 1.0).unwrap();
        session.close();
        assert!(!session.is_initialized());
        assert_eq!(session.device_count(), 0);
        assert!(session.contacts().is_empty());
    }
}
