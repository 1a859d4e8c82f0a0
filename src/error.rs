//! Central error types for the capture widget.
//!
//! Every variant's `Display` text is what the user sees in the error banner,
//! so the wording here is part of the UI.

use serde::Serialize;
use thiserror::Error;
use wasm_bindgen::JsValue;

/// Main error type for capture widget operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// Camera API not exposed by the runtime (old browser or insecure context)
    #[error("Camera access is not supported in this browser. Please use a modern browser (Chrome, Safari, Firefox) and ensure the page is served over HTTPS.")]
    CapabilityMissing,

    /// No camera hardware found
    #[error("No camera device found. Please ensure your camera is connected and not being used by another application.")]
    DeviceNotFound,

    /// Permission denied, device busy, or any other acquisition failure
    #[error("Unable to access camera: {}", .0.as_deref().unwrap_or("Unknown error"))]
    Acquisition(Option<String>),

    /// Frame could not be encoded to an image blob
    #[error("Failed to encode captured frame")]
    Encoding,

    /// Endpoint answered with a non-success status
    #[error("Failed to upload: {}", status_label(.status, .status_text))]
    UploadStatus { status: u16, status_text: String },

    /// Network or transport failure before a response arrived
    #[error("Error uploading: {}", .0.as_deref().unwrap_or("Unknown error"))]
    UploadTransport(Option<String>),

    /// Upload aborted because it exceeded the configured timeout
    #[error("Error uploading: request timed out after {timeout_ms} ms")]
    UploadTimeout { timeout_ms: u32 },

    /// Upload endpoint was never configured
    #[error("Webhook not configured. Please set CAPTURE_WEBHOOK when building, or pass an endpoint to mountWithConfig.")]
    NotConfigured,

    /// Configuration object could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// DOM construction or lookup failed
    #[error("DOM error: {0}")]
    Dom(String),
}

impl Serialize for CaptureError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<CaptureError> for JsValue {
    fn from(err: CaptureError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

impl From<JsValue> for CaptureError {
    fn from(value: JsValue) -> Self {
        CaptureError::Dom(js_error_message(&value).unwrap_or_else(|| format!("{:?}", value)))
    }
}

impl From<serde_wasm_bindgen::Error> for CaptureError {
    fn from(err: serde_wasm_bindgen::Error) -> Self {
        CaptureError::Config(err.to_string())
    }
}

/// HTTP/2 responses carry no reason phrase; show the numeric code instead.
fn status_label(status: &u16, status_text: &str) -> String {
    match status_text.trim() {
        "" => status.to_string(),
        text => text.to_string(),
    }
}

/// Extract the `message` of a thrown JS value (`Error` or `DOMException`).
///
/// Returns `None` for values that carry no usable message, mirroring how a
/// non-`Error` throw would be reported as "Unknown error".
pub fn js_error_message(value: &JsValue) -> Option<String> {
    if let Some(text) = value.as_string() {
        return Some(text);
    }
    let message = js_sys::Reflect::get(value, &JsValue::from_str("message")).ok()?;
    message.as_string().filter(|m| !m.is_empty())
}

/// Extension trait for adding context to Option types.
pub trait OptionExt<T> {
    /// Convert None to `CaptureError::Dom` with the given message.
    fn context(self, msg: &str) -> CaptureResult<T>;

    /// Convert None to `CaptureError::Dom` with a lazily evaluated message.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> CaptureResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn context(self, msg: &str) -> CaptureResult<T> {
        self.ok_or_else(|| CaptureError::Dom(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> CaptureResult<T> {
        self.ok_or_else(|| CaptureError::Dom(f()))
    }
}

/// Type alias for Results using CaptureError.
pub type CaptureResult<T> = Result<T, CaptureError>;
