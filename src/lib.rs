//! Camera Capture Widget
//!
//! Browser widget that shows a live camera preview, grabs a 9:16 still on
//! demand and POSTs it as `multipart/form-data` to a configured webhook.
//!
//! The controller in [`widget`] is platform agnostic; [`host`] wires it to
//! `web-sys` implementations and exposes `mount` / `mountWithConfig` to
//! JavaScript.

use wasm_bindgen::prelude::*;

pub mod camera;
pub mod config;
pub mod crop;
pub mod error;
pub mod flash;
pub mod host;
pub mod state;
pub mod upload;
pub mod view;
pub mod widget;

pub use config::WidgetConfig;
pub use error::{CaptureError, CaptureResult};
pub use host::{mount, mount_with_config, MountedCapture};
pub use widget::{CaptureOutcome, CaptureWidget};

/// Initialize panic hook and logging for better error messages
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Info).ok();
    log::info!("[CaptureWidget] WASM module initialized");
}
