//! Camera acquisition behind a small capability interface.
//!
//! [`MediaBackend`] covers capability detection and stream acquisition,
//! [`CameraStream`] covers release. The browser implementation talks to
//! `navigator.mediaDevices`; tests substitute fakes.

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use crate::error::{js_error_message, CaptureError};

/// Which camera to ask the browser for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingPreference {
    /// Rear camera on phones; best for document and cover scanning.
    Environment,
    /// Whatever camera the browser picks.
    Any,
}

/// Classification of an acquisition failure, from the DOMException name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireErrorKind {
    NotFound,
    NotAllowed,
    NotReadable,
    Overconstrained,
    Other,
}

impl AcquireErrorKind {
    pub fn from_dom_name(name: &str) -> Self {
        match name {
            "NotFoundError" | "DevicesNotFoundError" => Self::NotFound,
            "NotAllowedError" | "PermissionDeniedError" | "SecurityError" => Self::NotAllowed,
            "NotReadableError" | "TrackStartError" | "AbortError" => Self::NotReadable,
            "OverconstrainedError" | "ConstraintNotSatisfiedError" => Self::Overconstrained,
            _ => Self::Other,
        }
    }
}

/// A failed `getUserMedia` call.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquireError {
    pub kind: AcquireErrorKind,
    pub message: Option<String>,
}

impl AcquireError {
    pub fn new(kind: AcquireErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: Some(message.into()),
        }
    }

    /// User-facing error for a total acquisition failure.
    pub fn into_capture_error(self) -> CaptureError {
        match self.kind {
            AcquireErrorKind::NotFound => CaptureError::DeviceNotFound,
            _ => CaptureError::Acquisition(self.message),
        }
    }
}

/// A live camera stream.
pub trait CameraStream {
    /// Stop every track. Returns how many tracks were stopped.
    fn stop_tracks(&self) -> usize;
}

/// Camera capability of the runtime.
#[allow(async_fn_in_trait)]
pub trait MediaBackend {
    type Stream: CameraStream;

    /// Whether the runtime exposes camera access at all.
    fn is_supported(&self) -> bool;

    async fn acquire(&self, facing: FacingPreference) -> Result<Self::Stream, AcquireError>;
}

/// Acquire a stream, preferring the environment-facing camera and falling
/// back to any camera. Only the fallback's error is reported.
pub async fn acquire_with_fallback<B: MediaBackend>(backend: &B) -> Result<B::Stream, CaptureError> {
    if !backend.is_supported() {
        return Err(CaptureError::CapabilityMissing);
    }

    match backend.acquire(FacingPreference::Environment).await {
        Ok(stream) => return Ok(stream),
        Err(e) => {
            log::warn!(
                "[Camera] Environment-facing camera unavailable ({:?}: {}), trying any camera",
                e.kind,
                e.message.as_deref().unwrap_or("no message")
            );
        }
    }

    backend
        .acquire(FacingPreference::Any)
        .await
        .map_err(AcquireError::into_capture_error)
}

// ============================================================================
// Browser implementation
// ============================================================================

/// `navigator.mediaDevices` backed camera access.
#[derive(Default)]
pub struct BrowserCamera;

/// A `MediaStream` obtained from `getUserMedia`.
pub struct BrowserStream(pub web_sys::MediaStream);

impl CameraStream for BrowserStream {
    fn stop_tracks(&self) -> usize {
        let tracks = self.0.get_tracks();
        let mut stopped = 0;
        for track in tracks.iter() {
            if let Ok(track) = track.dyn_into::<web_sys::MediaStreamTrack>() {
                track.stop();
                stopped += 1;
            }
        }
        stopped
    }
}

impl BrowserCamera {
    fn media_devices() -> Option<web_sys::MediaDevices> {
        let window = web_sys::window()?;
        let navigator = window.navigator();
        // Insecure contexts leave `navigator.mediaDevices` undefined.
        let devices = js_sys::Reflect::get(&navigator, &JsValue::from_str("mediaDevices")).ok()?;
        if devices.is_undefined() || devices.is_null() {
            return None;
        }
        Some(devices.unchecked_into())
    }

    fn constraints(facing: FacingPreference) -> Result<web_sys::MediaStreamConstraints, JsValue> {
        let constraints = web_sys::MediaStreamConstraints::new();
        match facing {
            FacingPreference::Environment => {
                let video = js_sys::Object::new();
                js_sys::Reflect::set(
                    &video,
                    &JsValue::from_str("facingMode"),
                    &JsValue::from_str("environment"),
                )?;
                constraints.set_video(&video);
            }
            FacingPreference::Any => constraints.set_video(&JsValue::TRUE),
        }
        Ok(constraints)
    }

    fn classify(err: &JsValue) -> AcquireError {
        let kind = err
            .dyn_ref::<web_sys::DomException>()
            .map(|e| AcquireErrorKind::from_dom_name(&e.name()))
            .or_else(|| {
                js_sys::Reflect::get(err, &JsValue::from_str("name"))
                    .ok()
                    .and_then(|n| n.as_string())
                    .map(|n| AcquireErrorKind::from_dom_name(&n))
            })
            .unwrap_or(AcquireErrorKind::Other);
        AcquireError {
            kind,
            message: js_error_message(err),
        }
    }
}

impl MediaBackend for BrowserCamera {
    type Stream = BrowserStream;

    fn is_supported(&self) -> bool {
        let Some(devices) = Self::media_devices() else {
            return false;
        };
        js_sys::Reflect::get(&devices, &JsValue::from_str("getUserMedia"))
            .map(|f| f.is_function())
            .unwrap_or(false)
    }

    async fn acquire(&self, facing: FacingPreference) -> Result<BrowserStream, AcquireError> {
        let devices = Self::media_devices().ok_or(AcquireError {
            kind: AcquireErrorKind::Other,
            message: None,
        })?;
        let constraints = Self::constraints(facing).map_err(|e| Self::classify(&e))?;
        let promise = devices
            .get_user_media_with_constraints(&constraints)
            .map_err(|e| Self::classify(&e))?;
        let stream = JsFuture::from(promise).await.map_err(|e| Self::classify(&e))?;
        log::info!("[Camera] Acquired stream ({:?})", facing);
        Ok(BrowserStream(stream.unchecked_into()))
    }
}
