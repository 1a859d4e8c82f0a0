//! Capture widget controller.
//!
//! Owns the camera stream and drives the capture cycle:
//! flash → read frame → crop to 9:16 → draw 360x640 → encode JPEG → upload.
//! All platform access goes through the [`MediaBackend`], [`Viewfinder`],
//! [`Uploader`] and [`Timer`] seams so the whole state machine runs under test
//! without a browser.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use crate::camera::{acquire_with_fallback, CameraStream, MediaBackend};
use crate::config::WidgetConfig;
use crate::crop::{crop_to_aspect, CropRect, FrameSize, OUTPUT_SIZE};
use crate::error::CaptureError;
use crate::flash::{schedule_flash_off, Timer};
use crate::state::StateStore;
use crate::upload::{UploadReply, Uploader};

/// Preview surface plus the offscreen buffer stills are rendered into.
#[allow(async_fn_in_trait)]
pub trait Viewfinder<Stream> {
    /// Encoded still handed to the uploader.
    type Image;

    /// Show the live stream in the preview.
    fn attach(&self, stream: &Stream);

    /// Intrinsic size of the current video frame, if one is available.
    fn frame_size(&self) -> Option<FrameSize>;

    /// Copy `crop` of the current frame into an `output`-sized buffer.
    /// Runs synchronously; returns false if the buffer has no 2D context.
    fn draw(&self, crop: CropRect, output: FrameSize) -> bool;

    /// Encode the buffer as JPEG. `None` when the encoder yields no data.
    async fn encode(&self, quality: f64) -> Option<Self::Image>;
}

/// Result of one call to [`CaptureWidget::capture`].
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Endpoint accepted the image.
    Uploaded,
    /// Upload failed; the error is shown to the user.
    Failed(CaptureError),
    /// No frame or no encoded image; silently dropped.
    Aborted,
    /// Another cycle is in flight.
    Busy,
    /// Camera not ready (initializing or unavailable).
    NotReady,
}

pub struct CaptureWidget<M: MediaBackend, V, U, T> {
    backend: M,
    viewfinder: V,
    uploader: U,
    timer: T,
    config: WidgetConfig,
    store: Rc<StateStore>,
    stream: RefCell<Option<M::Stream>>,
    started: Cell<bool>,
    torn_down: Cell<bool>,
}

impl<M, V, U, T> CaptureWidget<M, V, U, T>
where
    M: MediaBackend,
    V: Viewfinder<M::Stream>,
    U: Uploader<V::Image>,
    T: Timer,
{
    pub fn new(backend: M, viewfinder: V, uploader: U, timer: T, config: WidgetConfig) -> Self {
        Self {
            backend,
            viewfinder,
            uploader,
            timer,
            config,
            store: Rc::new(StateStore::new()),
            stream: RefCell::new(None),
            started: Cell::new(false),
            torn_down: Cell::new(false),
        }
    }

    pub fn store(&self) -> &Rc<StateStore> {
        &self.store
    }

    /// Acquire the camera and bind it to the preview.
    ///
    /// Runs once; later calls are ignored, including calls made while the
    /// first is still waiting on the camera. A stream that arrives after
    /// teardown is released on the spot.
    pub async fn initialize(&self) {
        if self.torn_down.get() || self.started.replace(true) {
            log::debug!("[CaptureWidget] Initialize ignored, already started");
            return;
        }

        match acquire_with_fallback(&self.backend).await {
            Ok(stream) => {
                if self.torn_down.get() {
                    let stopped = stream.stop_tracks();
                    log::info!(
                        "[CaptureWidget] Camera arrived after teardown, released {} track(s)",
                        stopped
                    );
                    return;
                }
                self.viewfinder.attach(&stream);
                if let Some(previous) = self.stream.borrow_mut().replace(stream) {
                    previous.stop_tracks();
                }
                self.store.update(|s| s.camera_ready());
                log::info!("[CaptureWidget] Camera ready");
            }
            Err(e) => {
                log::error!("[CaptureWidget] Camera unavailable: {}", e);
                self.store.update(|s| s.camera_failed(e.to_string()));
            }
        }
    }

    /// Run one capture cycle. Rejected while another is in flight.
    pub async fn capture(&self) -> CaptureOutcome {
        let state = self.store.snapshot();
        if state.is_capturing() {
            log::debug!("[CaptureWidget] Capture ignored, cycle already in flight");
            return CaptureOutcome::Busy;
        }
        if !state.can_capture() {
            return CaptureOutcome::NotReady;
        }

        // Check and set happen with no await in between.
        self.store.update(|s| s.capture_started());
        schedule_flash_off(
            &self.store,
            &self.timer,
            Duration::from_millis(u64::from(self.config.flash_ms)),
        );

        let outcome = self.run_cycle().await;

        self.store.update(|s| match &outcome {
            CaptureOutcome::Uploaded => s.upload_succeeded(),
            CaptureOutcome::Failed(e) => s.upload_failed(e.to_string()),
            _ => s.capture_aborted(),
        });
        outcome
    }

    async fn run_cycle(&self) -> CaptureOutcome {
        let Some(source) = self.viewfinder.frame_size().filter(|s| !s.is_empty()) else {
            log::warn!("[CaptureWidget] No video frame available yet");
            return CaptureOutcome::Aborted;
        };

        let crop = crop_to_aspect(source, OUTPUT_SIZE);
        if !self.viewfinder.draw(crop, OUTPUT_SIZE) {
            log::warn!("[CaptureWidget] Capture buffer has no 2D context");
            return CaptureOutcome::Aborted;
        }

        let Some(image) = self.viewfinder.encode(self.config.jpeg_quality).await else {
            log::warn!("[CaptureWidget] {}", CaptureError::Encoding);
            return CaptureOutcome::Aborted;
        };

        match self
            .uploader
            .upload(image)
            .await
            .and_then(UploadReply::into_result)
        {
            Ok(()) => {
                log::info!("[CaptureWidget] Upload succeeded");
                CaptureOutcome::Uploaded
            }
            Err(e) => {
                log::error!("[CaptureWidget] {}", e);
                CaptureOutcome::Failed(e)
            }
        }
    }
}

impl<M: MediaBackend, V, U, T> CaptureWidget<M, V, U, T> {
    /// Release the camera. Returns the number of tracks stopped; repeated
    /// calls and calls without a stream stop nothing.
    pub fn teardown(&self) -> usize {
        self.torn_down.set(true);
        match self.stream.borrow_mut().take() {
            Some(stream) => {
                let stopped = stream.stop_tracks();
                log::info!("[CaptureWidget] Released camera ({} track(s))", stopped);
                stopped
            }
            None => 0,
        }
    }
}

impl<M: MediaBackend, V, U, T> Drop for CaptureWidget<M, V, U, T> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::tests::{FakeBackend, FakeStream};
    use crate::camera::{AcquireError, AcquireErrorKind};
    use crate::flash::tests::ManualTimer;
    use crate::state::{AttemptStatus, Phase};
    use crate::upload::tests::{reply, FakeUploader};
    use futures::executor::LocalPool;
    use futures::task::LocalSpawnExt;

    struct FakeViewfinder {
        size: Option<FrameSize>,
        encodes: bool,
        attached: Rc<Cell<bool>>,
        draws: Rc<RefCell<Vec<CropRect>>>,
    }

    impl FakeViewfinder {
        fn landscape_camera() -> Self {
            Self {
                size: Some(FrameSize::new(1280, 720)),
                encodes: true,
                attached: Rc::new(Cell::new(false)),
                draws: Rc::new(RefCell::new(Vec::new())),
            }
        }
    }

    impl Viewfinder<FakeStream> for FakeViewfinder {
        type Image = Vec<u8>;

        fn attach(&self, _stream: &FakeStream) {
            self.attached.set(true);
        }

        fn frame_size(&self) -> Option<FrameSize> {
            self.size
        }

        fn draw(&self, crop: CropRect, output: FrameSize) -> bool {
            assert_eq!(output, OUTPUT_SIZE);
            self.draws.borrow_mut().push(crop);
            true
        }

        async fn encode(&self, _quality: f64) -> Option<Vec<u8>> {
            self.encodes.then(|| vec![0xFF, 0xD8, 0xFF])
        }
    }

    type TestWidget = CaptureWidget<FakeBackend, FakeViewfinder, FakeUploader, ManualTimer>;

    fn widget(backend: FakeBackend, viewfinder: FakeViewfinder, uploader: FakeUploader) -> TestWidget {
        CaptureWidget::new(
            backend,
            viewfinder,
            uploader,
            ManualTimer::default(),
            WidgetConfig::new("https://hooks.example/scan"),
        )
    }

    fn ready_widget(uploader: FakeUploader) -> TestWidget {
        let w = widget(FakeBackend::with_camera(), FakeViewfinder::landscape_camera(), uploader);
        pollster::block_on(w.initialize());
        assert_eq!(w.store().snapshot().phase, Phase::Ready);
        w
    }

    #[test]
    fn test_initialize_binds_stream() {
        let viewfinder = FakeViewfinder::landscape_camera();
        let attached = Rc::clone(&viewfinder.attached);
        let w = widget(FakeBackend::with_camera(), viewfinder, FakeUploader::new(vec![]));
        pollster::block_on(w.initialize());
        assert!(attached.get());
        let state = w.store().snapshot();
        assert_eq!(state.phase, Phase::Ready);
        assert_eq!(state.error, None);
    }

    #[test]
    fn test_unsupported_browser_never_acquires() {
        let backend = FakeBackend::new(false, vec![]);
        let w = widget(backend, FakeViewfinder::landscape_camera(), FakeUploader::new(vec![]));
        pollster::block_on(w.initialize());

        let state = w.store().snapshot();
        assert_eq!(state.phase, Phase::NoCamera);
        assert!(state.error.unwrap().contains("not supported in this browser"));
        assert!(w.backend.requests.borrow().is_empty());
        assert_eq!(pollster::block_on(w.capture()), CaptureOutcome::NotReady);
    }

    #[test]
    fn test_no_camera_device_message() {
        let not_found = || AcquireError::new(AcquireErrorKind::NotFound, "not found");
        let backend = FakeBackend::new(true, vec![Err(not_found()), Err(not_found())]);
        let w = widget(backend, FakeViewfinder::landscape_camera(), FakeUploader::new(vec![]));
        pollster::block_on(w.initialize());

        let state = w.store().snapshot();
        assert_eq!(state.phase, Phase::NoCamera);
        assert!(state.error.unwrap().starts_with("No camera device found"));
    }

    #[test]
    fn test_successful_upload_increments_counter() {
        let w = ready_widget(FakeUploader::new(vec![reply(200, "OK")]));
        assert_eq!(pollster::block_on(w.capture()), CaptureOutcome::Uploaded);

        let state = w.store().snapshot();
        assert_eq!(state.success_count, 1);
        assert!(!state.is_capturing());
        assert_eq!(state.error, None);
        assert_eq!(state.attempt, AttemptStatus::Succeeded);
    }

    #[test]
    fn test_server_error_reports_status_text() {
        let w = ready_widget(FakeUploader::new(vec![reply(500, "Internal Server Error")]));
        let outcome = pollster::block_on(w.capture());
        assert!(matches!(outcome, CaptureOutcome::Failed(_)));

        let state = w.store().snapshot();
        assert!(state.error.as_deref().unwrap().contains("Internal Server Error"));
        assert_eq!(state.success_count, 0);
        assert!(!state.is_capturing());
    }

    #[test]
    fn test_status_without_reason_phrase_reports_code() {
        let w = ready_widget(FakeUploader::new(vec![reply(503, "")]));
        pollster::block_on(w.capture());
        let state = w.store().snapshot();
        assert_eq!(state.error.as_deref(), Some("Failed to upload: 503"));
    }

    #[test]
    fn test_transport_failure_reports_message() {
        let w = ready_widget(FakeUploader::new(vec![Err(CaptureError::UploadTransport(Some(
            "Failed to fetch".to_string(),
        )))]));
        pollster::block_on(w.capture());
        let state = w.store().snapshot();
        assert_eq!(state.error.as_deref(), Some("Error uploading: Failed to fetch"));
        assert!(state.can_capture());
    }

    #[test]
    fn test_counter_counts_only_successes() {
        let w = ready_widget(FakeUploader::new(vec![
            reply(200, "OK"),
            reply(502, "Bad Gateway"),
            reply(201, "Created"),
            reply(204, "No Content"),
            Err(CaptureError::UploadTimeout { timeout_ms: 30_000 }),
        ]));
        let outcomes: Vec<_> = (0..5).map(|_| pollster::block_on(w.capture())).collect();
        assert_eq!(
            outcomes[1],
            CaptureOutcome::Failed(CaptureError::UploadStatus {
                status: 502,
                status_text: "Bad Gateway".to_string(),
            })
        );

        let state = w.store().snapshot();
        assert_eq!(state.success_count, 3);
        assert_eq!(state.attempt, AttemptStatus::Failed);
        assert!(state.error.as_deref().unwrap().contains("timed out"));
    }

    #[test]
    fn test_next_attempt_clears_previous_error() {
        let w = ready_widget(FakeUploader::new(vec![reply(500, "Internal Server Error"), reply(200, "OK")]));
        pollster::block_on(w.capture());
        assert!(w.store().snapshot().error.is_some());
        pollster::block_on(w.capture());
        assert_eq!(w.store().snapshot().error, None);
    }

    #[test]
    fn test_encoding_failure_aborts_silently() {
        let uploader = FakeUploader::new(vec![]);
        let calls = Rc::clone(&uploader.calls);
        let mut viewfinder = FakeViewfinder::landscape_camera();
        viewfinder.encodes = false;
        let w = widget(FakeBackend::with_camera(), viewfinder, uploader);
        pollster::block_on(w.initialize());

        assert_eq!(pollster::block_on(w.capture()), CaptureOutcome::Aborted);
        let state = w.store().snapshot();
        assert!(!state.is_capturing());
        assert_eq!(state.error, None);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_capture_uses_centered_crop() {
        let viewfinder = FakeViewfinder::landscape_camera();
        let draws = Rc::clone(&viewfinder.draws);
        let w = widget(FakeBackend::with_camera(), viewfinder, FakeUploader::new(vec![reply(200, "OK")]));
        pollster::block_on(w.initialize());
        pollster::block_on(w.capture());

        let draws = draws.borrow();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0], crop_to_aspect(FrameSize::new(1280, 720), OUTPUT_SIZE));
    }

    #[test]
    fn test_flash_fires_independently() {
        let uploader = FakeUploader::new(vec![reply(200, "OK")]);
        let gate = uploader.gate_next();
        let w = Rc::new(ready_widget(uploader));
        let mut pool = LocalPool::new();
        let task = Rc::clone(&w);
        pool.spawner()
            .spawn_local(async move {
                task.capture().await;
            })
            .unwrap();
        pool.run_until_stalled();

        assert!(w.store().snapshot().flash);
        w.timer.fire_all();
        let state = w.store().snapshot();
        assert!(!state.flash);
        assert!(state.is_capturing());

        gate.send(()).unwrap();
        pool.run_until_stalled();
        assert_eq!(w.store().snapshot().success_count, 1);
    }

    #[test]
    fn test_rapid_triggers_allow_one_upload_in_flight() {
        let uploader = FakeUploader::new(vec![reply(200, "OK")]);
        let gate = uploader.gate_next();
        let calls = Rc::clone(&uploader.calls);
        let max_in_flight = Rc::clone(&uploader.max_in_flight);
        let w = Rc::new(ready_widget(uploader));

        let mut pool = LocalPool::new();
        for _ in 0..4 {
            let task = Rc::clone(&w);
            pool.spawner()
                .spawn_local(async move {
                    task.capture().await;
                })
                .unwrap();
        }
        pool.run_until_stalled();
        assert!(w.store().snapshot().is_capturing());
        assert_eq!(pollster::block_on(w.capture()), CaptureOutcome::Busy);

        gate.send(()).unwrap();
        pool.run_until_stalled();

        assert_eq!(calls.get(), 1);
        assert_eq!(max_in_flight.get(), 1);
        let state = w.store().snapshot();
        assert_eq!(state.success_count, 1);
        assert!(!state.is_capturing());
    }

    #[test]
    fn test_concurrent_initialize_acquires_once() {
        let backend = FakeBackend::new(true, vec![Ok(1), Ok(1)]);
        let permission = backend.gate_next();
        let stop_calls = Rc::clone(&backend.stop_calls);
        let w = Rc::new(widget(backend, FakeViewfinder::landscape_camera(), FakeUploader::new(vec![])));

        let mut pool = LocalPool::new();
        for _ in 0..2 {
            let task = Rc::clone(&w);
            pool.spawner()
                .spawn_local(async move {
                    task.initialize().await;
                })
                .unwrap();
        }
        pool.run_until_stalled();
        permission.send(()).unwrap();
        pool.run_until_stalled();

        assert_eq!(w.backend.requests.borrow().len(), 1);
        assert_eq!(w.store().snapshot().phase, Phase::Ready);
        assert_eq!(w.teardown(), 1);
        assert_eq!(stop_calls.get(), 1);
    }

    #[test]
    fn test_initialize_after_ready_is_ignored() {
        let w = ready_widget(FakeUploader::new(vec![]));
        pollster::block_on(w.initialize());
        assert_eq!(w.backend.requests.borrow().len(), 1);
    }

    #[test]
    fn test_teardown_stops_tracks_once() {
        let w = ready_widget(FakeUploader::new(vec![]));
        let stop_calls = Rc::clone(&w.backend.stop_calls);
        assert_eq!(w.teardown(), 1);
        assert_eq!(w.teardown(), 0);
        drop(w);
        assert_eq!(stop_calls.get(), 1);
    }

    #[test]
    fn test_teardown_without_stream_is_noop() {
        let backend = FakeBackend::new(false, vec![]);
        let stop_calls = Rc::clone(&backend.stop_calls);
        let w = widget(backend, FakeViewfinder::landscape_camera(), FakeUploader::new(vec![]));
        assert_eq!(w.teardown(), 0);
        drop(w);
        assert_eq!(stop_calls.get(), 0);
    }

    #[test]
    fn test_drop_releases_stream() {
        let w = ready_widget(FakeUploader::new(vec![]));
        let stop_calls = Rc::clone(&w.backend.stop_calls);
        drop(w);
        assert_eq!(stop_calls.get(), 1);
    }

    #[test]
    fn test_teardown_before_initialize_skips_acquisition() {
        let w = widget(FakeBackend::with_camera(), FakeViewfinder::landscape_camera(), FakeUploader::new(vec![]));
        w.teardown();
        pollster::block_on(w.initialize());
        assert!(w.backend.requests.borrow().is_empty());
        assert_eq!(w.store().snapshot().phase, Phase::Initializing);
    }

    #[test]
    fn test_stream_arriving_after_teardown_is_released() {
        let backend = FakeBackend::with_camera();
        let permission = backend.gate_next();
        let stop_calls = Rc::clone(&backend.stop_calls);
        let viewfinder = FakeViewfinder::landscape_camera();
        let attached = Rc::clone(&viewfinder.attached);
        let w = Rc::new(widget(backend, viewfinder, FakeUploader::new(vec![])));

        let mut pool = LocalPool::new();
        let task = Rc::clone(&w);
        pool.spawner()
            .spawn_local(async move {
                task.initialize().await;
            })
            .unwrap();
        pool.run_until_stalled();

        // Unmounted while the permission prompt is still open.
        assert_eq!(w.teardown(), 0);
        permission.send(()).unwrap();
        pool.run_until_stalled();

        assert_eq!(stop_calls.get(), 1);
        assert!(!attached.get());
        assert_eq!(w.store().snapshot().phase, Phase::Initializing);
    }
}
