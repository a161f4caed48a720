// THEORY:
// The `camera` module owns the one physical camera the server talks to. A
// `CameraSession` is created by the serving layer and shared by handle with
// every route that touches the device: streaming, capture, initialize and
// cleanup all go through the same mutex, so the device is only ever read by
// one caller at a time.
//
// Key architectural principles:
// 1.  **Explicit lifecycle**: The session is `Closed`, `Open` or `Streaming`.
//     Opening replaces any previous device, releasing it first.
// 2.  **Short critical sections**: The lock is held only while a single frame
//     is read. JPEG encoding and face analysis happen after it is released,
//     so a slow analysis never stalls the live feed.
// 3.  **Cooperative cancellation**: Each initialization starts a new stream
//     generation and flips a `watch` flag. A stream stops as soon as the flag
//     drops or its generation is superseded, and a stale stream ending never
//     deactivates a newer one.

use crate::mjpeg;
use bytes::Bytes;
use futures_util::Stream;
use pehechan::Frame;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Pause between two streamed frames (~30 fps).
pub const FRAME_INTERVAL: Duration = Duration::from_millis(33);
/// Pause after the device returned no frame.
pub const RETRY_DELAY: Duration = Duration::from_millis(100);

/// How the camera is opened and how the live feed is rendered.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub index: i32,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Frames the driver may queue; 1 keeps the feed current.
    pub buffer_size: u32,
    /// Settling time after opening, before the first test read.
    pub warmup_ms: u64,
    pub jpeg_quality: u8,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            index: 0,
            width: 640,
            height: 480,
            fps: 30.0,
            buffer_size: 1,
            warmup_ms: 1000,
            jpeg_quality: 90,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("Could not open camera")]
    OpenFailed,
    #[error("Camera opened but cannot read frames")]
    NoFrames,
    #[error("Camera not initialized")]
    NotInitialized,
    #[error("Failed to capture frame")]
    CaptureFailed,
    #[error("Camera stream is not active")]
    Inactive,
    #[error("Camera backend error: {0}")]
    Backend(String),
}

/// An opened capture device. Dropping it releases the hardware.
pub trait CameraDevice: Send {
    /// Reads the next frame. `Ok(None)` means the device had nothing to give.
    fn read_frame(&mut self) -> Result<Option<Frame>, CameraError>;
}

/// Opens capture devices.
pub trait CameraBackend: Send + Sync {
    fn open(&self, settings: &CameraSettings) -> Result<Box<dyn CameraDevice>, CameraError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Closed,
    Open,
    Streaming,
}

enum DeviceSlot {
    Closed,
    Open {
        device: Box<dyn CameraDevice>,
        streaming: bool,
        generation: u64,
    },
}

pub struct CameraSession {
    backend: Arc<dyn CameraBackend>,
    settings: CameraSettings,
    slot: Mutex<DeviceSlot>,
    next_generation: AtomicU64,
    active: watch::Sender<bool>,
}

impl CameraSession {
    pub fn new(backend: Arc<dyn CameraBackend>, settings: CameraSettings) -> Self {
        let (active, _) = watch::channel(false);
        Self {
            backend,
            settings,
            slot: Mutex::new(DeviceSlot::Closed),
            next_generation: AtomicU64::new(1),
            active,
        }
    }

    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, DeviceSlot> {
        // A panic while holding the lock leaves the slot itself consistent.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        match &*self.lock() {
            DeviceSlot::Closed => Lifecycle::Closed,
            DeviceSlot::Open { streaming: true, .. } => Lifecycle::Streaming,
            DeviceSlot::Open { .. } => Lifecycle::Open,
        }
    }

    /// Opens the camera and starts a new stream generation. Any previously
    /// opened device is released before the new one is opened. Blocking.
    pub fn initialize(&self) -> Result<(), CameraError> {
        let mut slot = self.lock();
        if matches!(*slot, DeviceSlot::Open { .. }) {
            tracing::info!("releasing previous camera before reinitializing");
        }
        *slot = DeviceSlot::Closed;
        self.active.send_replace(false);

        let device = self.backend.open(&self.settings)?;
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        *slot = DeviceSlot::Open {
            device,
            streaming: true,
            generation,
        };
        self.active.send_replace(true);
        tracing::info!(index = self.settings.index, generation, "camera initialized");
        Ok(())
    }

    /// Grabs one frame for analysis. Blocking.
    pub fn capture_frame(&self) -> Result<Frame, CameraError> {
        let mut slot = self.lock();
        let DeviceSlot::Open { device, .. } = &mut *slot else {
            return Err(CameraError::NotInitialized);
        };
        match device.read_frame() {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => Err(CameraError::CaptureFailed),
            Err(err) => {
                tracing::warn!(error = %err, "camera read failed during capture");
                Err(CameraError::CaptureFailed)
            }
        }
    }

    /// Stops streaming and releases the device. Returns whether a device was
    /// open. Blocking.
    pub fn cleanup(&self) -> bool {
        let mut slot = self.lock();
        self.active.send_replace(false);
        let was_open = matches!(*slot, DeviceSlot::Open { .. });
        *slot = DeviceSlot::Closed;
        if was_open {
            tracing::info!("camera released");
        }
        was_open
    }

    /// `cleanup` for async shutdown paths, run on the blocking pool. A failed
    /// teardown task is logged and reported as nothing released.
    pub async fn shutdown(self: Arc<Self>) -> bool {
        match tokio::task::spawn_blocking(move || self.cleanup()).await {
            Ok(released) => released,
            Err(err) => {
                tracing::error!(error = %err, "camera teardown task failed");
                false
            }
        }
    }

    fn streaming_generation(&self) -> Option<u64> {
        match &*self.lock() {
            DeviceSlot::Open {
                streaming: true,
                generation,
                ..
            } => Some(*generation),
            _ => None,
        }
    }

    /// Reads one frame for stream `generation`, refusing once that stream has
    /// been stopped or superseded.
    fn read_stream_frame(&self, generation: u64) -> Result<Option<Frame>, CameraError> {
        let mut slot = self.lock();
        match &mut *slot {
            DeviceSlot::Open {
                device,
                streaming: true,
                generation: current,
            } if *current == generation => device.read_frame(),
            _ => Err(CameraError::Inactive),
        }
    }

    fn stop_streaming(&self, generation: u64) {
        let mut slot = self.lock();
        if let DeviceSlot::Open {
            streaming,
            generation: current,
            ..
        } = &mut *slot
        {
            if *current == generation && *streaming {
                *streaming = false;
                self.active.send_replace(false);
                tracing::debug!(generation, "camera stream ended");
            }
        }
    }

    /// The live feed as `multipart/x-mixed-replace` body parts.
    ///
    /// The stream is empty when the camera is not streaming, and ends when the
    /// session is cleaned up or reinitialized. Dropping it (the browser went
    /// away) clears the streaming flag; the device stays open for capture.
    pub fn stream(self: &Arc<Self>) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        let session = Arc::clone(self);
        let mut active = self.active.subscribe();

        async_stream::stream! {
            let Some(generation) = session.streaming_generation() else {
                return;
            };
            let _guard = StreamGuard { session: Arc::clone(&session), generation };

            loop {
                if !*active.borrow_and_update() {
                    break;
                }

                let reader = Arc::clone(&session);
                let read = tokio::task::spawn_blocking(move || {
                    let frame = reader.read_stream_frame(generation)?;
                    let settings = reader.settings();
                    Ok::<_, CameraError>(frame.and_then(|frame| {
                        mjpeg::encode_display_jpeg(&frame, settings.width, settings.height, settings.jpeg_quality)
                            .inspect_err(|err| tracing::warn!(error = %err, "dropping unencodable frame"))
                            .ok()
                    }))
                })
                .await;

                let pause = match read {
                    Ok(Ok(Some(jpeg))) => {
                        yield Ok(mjpeg::multipart_part(&jpeg));
                        FRAME_INTERVAL
                    }
                    Ok(Ok(None)) => RETRY_DELAY,
                    Ok(Err(CameraError::Inactive)) => break,
                    Ok(Err(err)) => {
                        tracing::warn!(error = %err, "camera read failed while streaming");
                        break;
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "stream reader task failed");
                        break;
                    }
                };

                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    changed = active.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.cleanup();
    }
}

struct StreamGuard {
    session: Arc<CameraSession>,
    generation: u64,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.session.stop_streaming(self.generation);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::sync::atomic::AtomicUsize;

    /// A textured gray frame that passes the default quality gate.
    pub(crate) fn test_frame() -> Frame {
        let (width, height) = (320u32, 240u32);
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                let v = if ((x / 8) + (y / 8)) % 2 == 0 { 100 } else { 160 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        Frame::bgr(width, height, data)
    }

    #[derive(Default)]
    pub(crate) struct FakeBackend {
        pub(crate) opened: AtomicUsize,
        pub(crate) released: Arc<AtomicUsize>,
        pub(crate) fail_open: bool,
        pub(crate) blank_frames: bool,
    }

    struct FakeDevice {
        released: Arc<AtomicUsize>,
        blank: bool,
    }

    impl CameraDevice for FakeDevice {
        fn read_frame(&mut self) -> Result<Option<Frame>, CameraError> {
            if self.blank { Ok(None) } else { Ok(Some(test_frame())) }
        }
    }

    impl Drop for FakeDevice {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CameraBackend for FakeBackend {
        fn open(&self, _settings: &CameraSettings) -> Result<Box<dyn CameraDevice>, CameraError> {
            if self.fail_open {
                return Err(CameraError::OpenFailed);
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeDevice {
                released: Arc::clone(&self.released),
                blank: self.blank_frames,
            }))
        }
    }

    fn session_with(backend: FakeBackend) -> (Arc<CameraSession>, Arc<AtomicUsize>) {
        let released = Arc::clone(&backend.released);
        let session = Arc::new(CameraSession::new(Arc::new(backend), CameraSettings::default()));
        (session, released)
    }

    #[test]
    fn capture_requires_initialization() {
        let (session, _) = session_with(FakeBackend::default());
        assert_eq!(session.lifecycle(), Lifecycle::Closed);
        assert_eq!(session.capture_frame(), Err(CameraError::NotInitialized));
    }

    #[test]
    fn initialize_then_capture() {
        let (session, _) = session_with(FakeBackend::default());
        session.initialize().unwrap();
        assert_eq!(session.lifecycle(), Lifecycle::Streaming);
        assert_eq!(session.capture_frame().unwrap().width, 320);
    }

    #[test]
    fn reinitialize_releases_the_old_device() {
        let (session, released) = session_with(FakeBackend::default());
        session.initialize().unwrap();
        session.initialize().unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(session.cleanup());
        assert_eq!(released.load(Ordering::SeqCst), 2);
        assert!(!session.cleanup());
        assert_eq!(session.lifecycle(), Lifecycle::Closed);
    }

    #[test]
    fn failed_open_leaves_session_closed() {
        let (session, _) = session_with(FakeBackend {
            fail_open: true,
            ..FakeBackend::default()
        });
        assert_eq!(session.initialize(), Err(CameraError::OpenFailed));
        assert_eq!(session.lifecycle(), Lifecycle::Closed);
    }

    #[test]
    fn empty_read_is_a_capture_failure() {
        let (session, _) = session_with(FakeBackend {
            blank_frames: true,
            ..FakeBackend::default()
        });
        session.initialize().unwrap();
        assert_eq!(session.capture_frame(), Err(CameraError::CaptureFailed));
    }

    #[test]
    fn dropping_the_session_releases_the_device() {
        let (session, released) = session_with(FakeBackend::default());
        session.initialize().unwrap();
        drop(session);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_releases_the_device_once() {
        let (session, released) = session_with(FakeBackend::default());
        session.initialize().unwrap();

        assert!(Arc::clone(&session).shutdown().await);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(session.lifecycle(), Lifecycle::Closed);
        assert!(!Arc::clone(&session).shutdown().await);
    }

    #[tokio::test]
    async fn stream_is_empty_without_camera() {
        let (session, _) = session_with(FakeBackend::default());
        let mut stream = Box::pin(session.stream());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn stream_yields_jpeg_parts_until_cleanup() {
        let (session, _) = session_with(FakeBackend::default());
        session.initialize().unwrap();

        let mut stream = Box::pin(session.stream());
        let part = stream.next().await.unwrap().unwrap();
        assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xFF\xD8"));
        assert!(part.ends_with(b"\r\n"));

        session.cleanup();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn dropped_stream_clears_streaming_but_keeps_device() {
        let (session, _) = session_with(FakeBackend::default());
        session.initialize().unwrap();

        let mut stream = Box::pin(session.stream());
        stream.next().await.unwrap().unwrap();
        drop(stream);

        assert_eq!(session.lifecycle(), Lifecycle::Open);
        assert!(session.capture_frame().is_ok());
    }

    #[tokio::test]
    async fn superseded_stream_does_not_stop_the_new_one() {
        let (session, _) = session_with(FakeBackend::default());
        session.initialize().unwrap();
        let mut old = Box::pin(session.stream());
        old.next().await.unwrap().unwrap();

        session.initialize().unwrap();
        assert!(old.next().await.is_none());
        drop(old);

        assert_eq!(session.lifecycle(), Lifecycle::Streaming);
        let mut fresh = Box::pin(session.stream());
        assert!(fresh.next().await.is_some());
    }
}
