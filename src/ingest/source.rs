use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{default_opener, CaptureDevice, DeviceOpener, SourceKind};
use crate::error::CaptureError;
use crate::frame::{Frame, Mailbox};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Acquisition lifecycle.
///
/// `Stopped → Connecting → Connected ⇄ Disconnected → Connecting → … →
/// Stopping → Stopped`. A fatal capture error goes straight to `Stopped`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceState {
    Stopped,
    Connecting,
    Connected,
    Disconnected,
    Stopping,
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceState::Stopped => "stopped",
            SourceState::Connecting => "connecting",
            SourceState::Connected => "connected",
            SourceState::Disconnected => "disconnected",
            SourceState::Stopping => "stopping",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, Default)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub reconnects: u64,
    pub last_error: Option<String>,
}

struct Shared {
    mailbox: Mailbox<Frame>,
    state: Mutex<SourceState>,
    connected: AtomicBool,
    running: AtomicBool,
    frames: AtomicU64,
    reconnects: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl Shared {
    fn set_state(&self, state: SourceState) {
        match self.state.lock() {
            Ok(mut guard) => *guard = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
        self.connected
            .store(state == SourceState::Connected, Ordering::SeqCst);
    }

    fn state(&self) -> SourceState {
        match self.state.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn record_error(&self, err: &CaptureError) {
        let message = Some(err.message().to_string());
        match self.last_error.lock() {
            Ok(mut guard) => *guard = message,
            Err(poisoned) => *poisoned.into_inner() = message,
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sleep up to `total`, waking early once the source is asked to stop.
    fn sleep_while_running(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

/// One camera's acquisition thread.
///
/// The thread writes each decoded frame into a single-slot mailbox; readers
/// call [`FrameSource::snapshot`] and never wait on the camera.
pub struct FrameSource {
    camera_id: String,
    uri: String,
    reconnect_interval: Duration,
    opener: DeviceOpener,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl FrameSource {
    pub fn new(camera_id: impl Into<String>, uri: impl Into<String>, reconnect_interval: Duration) -> Self {
        Self::with_opener(camera_id, uri, reconnect_interval, default_opener())
    }

    pub fn with_opener(
        camera_id: impl Into<String>,
        uri: impl Into<String>,
        reconnect_interval: Duration,
        opener: DeviceOpener,
    ) -> Self {
        Self {
            camera_id: camera_id.into(),
            uri: uri.into(),
            reconnect_interval,
            opener,
            shared: Arc::new(Shared {
                mailbox: Mailbox::new(),
                state: Mutex::new(SourceState::Stopped),
                connected: AtomicBool::new(false),
                running: AtomicBool::new(false),
                frames: AtomicU64::new(0),
                reconnects: AtomicU64::new(0),
                last_error: Mutex::new(None),
            }),
            worker: None,
        }
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Spawn the acquisition thread. No-op if already running.
    ///
    /// The synthetic `test` source is connected and holds a frame by the time
    /// this returns.
    pub fn start(&mut self) -> anyhow::Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        self.shared.running.store(true, Ordering::SeqCst);

        let mut initial: Option<Box<dyn CaptureDevice>> = None;
        if matches!(SourceKind::parse(&self.uri), Ok(SourceKind::Test)) {
            let mut device = (self.opener)(&self.uri)?;
            device.connect()?;
            let frame = device.read()?;
            self.shared.mailbox.post(frame);
            self.shared.frames.fetch_add(1, Ordering::SeqCst);
            self.shared.set_state(SourceState::Connected);
            initial = Some(device);
        }

        let worker = Worker {
            camera_id: self.camera_id.clone(),
            uri: self.uri.clone(),
            reconnect_interval: self.reconnect_interval,
            opener: self.opener.clone(),
            shared: self.shared.clone(),
        };
        let handle = std::thread::Builder::new()
            .name(format!("capture-{}", self.camera_id))
            .spawn(move || worker.run(initial))?;
        self.worker = Some(handle);
        Ok(())
    }

    /// Ask the thread to stop and wait for it. Bounded by one in-flight read.
    pub fn stop(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.set_state(SourceState::Stopping);
        if handle.join().is_err() {
            log::error!("FrameSource[{}]: acquisition thread panicked", self.camera_id);
        }
        self.shared.set_state(SourceState::Stopped);
        self.shared.mailbox.clear();
        log::info!("FrameSource[{}]: stopped", self.camera_id);
    }

    /// Most recent frame, if any. Never blocks on the acquisition thread.
    pub fn snapshot(&self) -> Option<Frame> {
        self.shared.mailbox.peek()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SourceState {
        self.shared.state()
    }

    pub fn stats(&self) -> SourceStats {
        let last_error = match self.shared.last_error.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        SourceStats {
            frames_captured: self.shared.frames.load(Ordering::SeqCst),
            reconnects: self.shared.reconnects.load(Ordering::SeqCst),
            last_error,
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

// ----------------------------------------------------------------------------
// Acquisition loop
// ----------------------------------------------------------------------------

struct Worker {
    camera_id: String,
    uri: String,
    reconnect_interval: Duration,
    opener: DeviceOpener,
    shared: Arc<Shared>,
}

impl Worker {
    fn run(self, initial: Option<Box<dyn CaptureDevice>>) {
        let mut device = initial;
        while self.shared.is_running() {
            if device.is_none() {
                match self.connect() {
                    Ok(opened) => device = Some(opened),
                    Err(err) if err.is_transient() => {
                        self.back_off(&err);
                        continue;
                    }
                    Err(err) => {
                        self.give_up(&err);
                        return;
                    }
                }
            }
            let Some(current) = device.as_mut() else {
                continue;
            };

            match current.read() {
                Ok(frame) => {
                    self.shared.mailbox.post(frame);
                    self.shared.frames.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    current.disconnect();
                    device = None;
                    if !err.is_transient() {
                        self.give_up(&err);
                        return;
                    }
                    self.back_off(&err);
                }
            }
        }

        if let Some(mut current) = device {
            current.disconnect();
        }
    }

    fn connect(&self) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        self.shared.set_state(SourceState::Connecting);
        let mut device = (self.opener)(&self.uri)?;
        device.connect()?;
        self.shared.set_state(SourceState::Connected);
        log::info!("FrameSource[{}]: connected to {}", self.camera_id, self.uri);
        Ok(device)
    }

    fn back_off(&self, err: &CaptureError) {
        self.shared.record_error(err);
        self.shared.set_state(SourceState::Disconnected);
        self.shared.reconnects.fetch_add(1, Ordering::Relaxed);
        log::warn!(
            "FrameSource[{}]: {}; retrying in {:?}",
            self.camera_id,
            err,
            self.reconnect_interval
        );
        self.shared.sleep_while_running(self.reconnect_interval);
    }

    fn give_up(&self, err: &CaptureError) {
        self.shared.record_error(err);
        self.shared.set_state(SourceState::Stopped);
        log::error!("FrameSource[{}]: {}; source stopped", self.camera_id, err);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
