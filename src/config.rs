//! Widget configuration.
//!
//! The upload endpoint is the only required value. It is baked in at build
//! time from `CAPTURE_WEBHOOK` (resolved once into [`BUILD_CONFIG`]) or
//! supplied by the host page at mount time. Either way it is immutable once
//! the widget exists.

use lazy_static::lazy_static;
use serde::{Deserialize, Deserializer, Serialize};
use wasm_bindgen::JsValue;

use crate::error::{CaptureError, CaptureResult};

/// Build-time environment variable holding the upload endpoint.
pub const ENDPOINT_ENV_VAR: &str = "CAPTURE_WEBHOOK";

lazy_static! {
    /// Configuration resolved from the build environment. `None` when the
    /// endpoint was not set or was blank.
    pub static ref BUILD_CONFIG: Option<WidgetConfig> =
        WidgetConfig::from_endpoint(option_env!("CAPTURE_WEBHOOK"));
}

/// Capture widget settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    /// URL the captured JPEG is POSTed to. Missing or null reads as blank.
    #[serde(default, deserialize_with = "endpoint_or_blank")]
    pub endpoint: String,

    /// Upload is aborted after this many milliseconds (1000-300000).
    #[serde(default = "default_upload_timeout_ms")]
    pub upload_timeout_ms: u32,

    /// JPEG encoder quality passed to `canvas.toBlob` (0.1-1.0).
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: f64,

    /// How long the capture flash overlay stays visible.
    #[serde(default = "default_flash_ms")]
    pub flash_ms: u32,
}

fn endpoint_or_blank<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_upload_timeout_ms() -> u32 {
    30_000
}

fn default_jpeg_quality() -> f64 {
    0.92
}

fn default_flash_ms() -> u32 {
    120
}

impl WidgetConfig {
    /// Config with default tuning for the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            upload_timeout_ms: default_upload_timeout_ms(),
            jpeg_quality: default_jpeg_quality(),
            flash_ms: default_flash_ms(),
        }
    }

    /// Build a config from an optional endpoint; blank endpoints count as absent.
    pub fn from_endpoint(endpoint: Option<&str>) -> Option<Self> {
        let endpoint = endpoint.map(str::trim).filter(|e| !e.is_empty())?;
        Some(Self::new(endpoint))
    }

    /// Parse a config object handed over from JavaScript.
    ///
    /// `undefined`, `null` and objects without an endpoint resolve to `None`.
    pub fn from_js(value: JsValue) -> CaptureResult<Option<Self>> {
        let config: Option<WidgetConfig> = serde_wasm_bindgen::from_value(value)?;
        Self::resolve(config)
    }

    /// Normalize a parsed config, treating a blank endpoint as absent.
    pub fn resolve(config: Option<Self>) -> CaptureResult<Option<Self>> {
        let Some(mut config) = config else {
            return Ok(None);
        };
        match config.normalize() {
            Ok(()) => Ok(Some(config)),
            Err(CaptureError::NotConfigured) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Trim the endpoint, reject it if blank, and clamp tuning values.
    pub fn normalize(&mut self) -> CaptureResult<()> {
        let trimmed = self.endpoint.trim();
        if trimmed.is_empty() {
            return Err(CaptureError::NotConfigured);
        }
        if trimmed.len() != self.endpoint.len() {
            self.endpoint = trimmed.to_string();
        }
        self.validate();
        Ok(())
    }

    /// Clamp settings to acceptable ranges.
    pub fn validate(&mut self) {
        self.upload_timeout_ms = self.upload_timeout_ms.clamp(1_000, 300_000);
        self.jpeg_quality = if self.jpeg_quality.is_finite() {
            self.jpeg_quality.clamp(0.1, 1.0)
        } else {
            default_jpeg_quality()
        };
        self.flash_ms = self.flash_ms.min(1_000);
    }
}
