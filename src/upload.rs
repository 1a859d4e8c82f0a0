//! Multipart upload of the captured JPEG.

use std::cell::Cell;
use std::rc::Rc;

use gloo::timers::callback::Timeout;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use crate::error::{js_error_message, CaptureError, CaptureResult};

/// Form field the image is attached under.
pub const IMAGE_FIELD: &str = "image";
/// Filename reported for the attached image.
pub const IMAGE_FILENAME: &str = "capture.jpg";
/// MIME type of the encoded image.
pub const IMAGE_MIME: &str = "image/jpeg";

/// Status line of the endpoint's response. The body is never read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReply {
    pub status: u16,
    pub status_text: String,
}

impl UploadReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Map a non-success status onto the upload error.
    pub fn into_result(self) -> CaptureResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(CaptureError::UploadStatus {
                status: self.status,
                status_text: self.status_text,
            })
        }
    }
}

/// Sends an encoded image to the configured endpoint.
///
/// `Err` is reserved for transport failures and timeouts; any HTTP response,
/// successful or not, comes back as `Ok`.
#[allow(async_fn_in_trait)]
pub trait Uploader<Image> {
    async fn upload(&self, image: Image) -> CaptureResult<UploadReply>;
}

/// `fetch` based uploader with an abort timeout.
pub struct FetchUploader {
    endpoint: String,
    timeout_ms: u32,
}

impl FetchUploader {
    pub fn new(endpoint: impl Into<String>, timeout_ms: u32) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout_ms,
        }
    }

    fn form_body(image: &web_sys::Blob) -> Result<web_sys::FormData, JsValue> {
        let form = web_sys::FormData::new()?;
        form.append_with_blob_and_filename(IMAGE_FIELD, image, IMAGE_FILENAME)?;
        Ok(form)
    }

    fn transport_error(&self, err: &JsValue, timed_out: bool) -> CaptureError {
        let aborted = err
            .dyn_ref::<web_sys::DomException>()
            .map(|e| e.name() == "AbortError")
            .unwrap_or(false);
        if timed_out || aborted {
            CaptureError::UploadTimeout {
                timeout_ms: self.timeout_ms,
            }
        } else {
            CaptureError::UploadTransport(js_error_message(err))
        }
    }
}

impl Uploader<web_sys::Blob> for FetchUploader {
    async fn upload(&self, image: web_sys::Blob) -> CaptureResult<UploadReply> {
        let window = web_sys::window().ok_or(CaptureError::UploadTransport(Some(
            "No window".to_string(),
        )))?;
        let form = Self::form_body(&image).map_err(|e| self.transport_error(&e, false))?;

        let controller = web_sys::AbortController::new()
            .map_err(|e| self.transport_error(&e, false))?;
        let init = web_sys::RequestInit::new();
        init.set_method("POST");
        init.set_body(&form);
        init.set_signal(Some(&controller.signal()));

        let timed_out = Rc::new(Cell::new(false));
        // Dropping the Timeout cancels it, so it only fires while awaiting.
        let _deadline = {
            let timed_out = Rc::clone(&timed_out);
            Timeout::new(self.timeout_ms, move || {
                timed_out.set(true);
                controller.abort();
            })
        };

        log::debug!("[Upload] POST {} ({} bytes)", self.endpoint, image.size());
        let response = JsFuture::from(window.fetch_with_str_and_init(&self.endpoint, &init))
            .await
            .map_err(|e| self.transport_error(&e, timed_out.get()))?;
        let response: web_sys::Response = response
            .dyn_into()
            .map_err(|e| self.transport_error(&e, false))?;

        Ok(UploadReply {
            status: response.status(),
            status_text: response.status_text(),
        })
    }
}
