//! Single-page host shell.
//!
//! Resolves the endpoint once, then renders either the capture widget or a
//! configuration error. Without an endpoint the camera is never touched.

use std::rc::Rc;

use gloo::events::EventListener;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{Document, Element};

use crate::camera::BrowserCamera;
use crate::config::{WidgetConfig, BUILD_CONFIG, ENDPOINT_ENV_VAR};
use crate::error::{CaptureError, CaptureResult, OptionExt};
use crate::flash::BrowserTimer;
use crate::upload::FetchUploader;
use crate::view::{styled, CanvasViewfinder, CaptureView};
use crate::widget::CaptureWidget;

const PAGE_TITLE: &str = "Book Cover Scanner";

type BrowserWidget = CaptureWidget<BrowserCamera, CanvasViewfinder, FetchUploader, BrowserTimer>;

/// A mounted widget. Dropping it (or calling `unmount`) releases the camera
/// and removes the widget from the page.
#[wasm_bindgen]
pub struct MountedCapture {
    page: Element,
    widget: Rc<BrowserWidget>,
    _click: EventListener,
}

#[wasm_bindgen]
impl MountedCapture {
    /// Number of successful uploads so far.
    #[wasm_bindgen(js_name = successCount)]
    pub fn success_count(&self) -> u32 {
        self.widget.store().snapshot().success_count
    }

    /// Tear the widget down.
    pub fn unmount(self) {
        drop(self);
    }
}

impl Drop for MountedCapture {
    fn drop(&mut self) {
        // Explicit, since a pending initialize task may still hold the widget.
        self.widget.teardown();
        self.page.remove();
        log::info!("[Host] Capture widget unmounted");
    }
}

/// Mount using the endpoint baked in at build time.
///
/// Returns `None` when no endpoint is configured; the page then shows the
/// configuration error instead of the widget.
#[wasm_bindgen]
pub fn mount(root_id: &str) -> Result<Option<MountedCapture>, JsValue> {
    Ok(mount_into(root_id, BUILD_CONFIG.clone())?)
}

/// Mount with a configuration object supplied by the page, e.g.
/// `{ endpoint: "https://…", uploadTimeoutMs: 15000 }`.
///
/// `undefined`, `null` or an object without an endpoint render the
/// configuration error, the same as an unset `CAPTURE_WEBHOOK`.
#[wasm_bindgen(js_name = mountWithConfig)]
pub fn mount_with_config(root_id: &str, config: JsValue) -> Result<Option<MountedCapture>, JsValue> {
    let config = WidgetConfig::from_js(config)?;
    Ok(mount_into(root_id, config)?)
}

/// What the page shows under its heading.
#[derive(Debug, PartialEq)]
enum PageBody {
    /// No endpoint. The banner text is shown and the camera is never touched.
    ConfigError(String),
    Widget(WidgetConfig),
}

impl PageBody {
    fn for_config(config: Option<WidgetConfig>) -> Self {
        match config {
            Some(config) => PageBody::Widget(config),
            None => PageBody::ConfigError(CaptureError::NotConfigured.to_string()),
        }
    }
}

/// Builds the page detached and attaches it to the root last, so a failed
/// DOM call leaves the root untouched.
fn mount_into(root_id: &str, config: Option<WidgetConfig>) -> CaptureResult<Option<MountedCapture>> {
    let document = web_sys::window()
        .context("No window")?
        .document()
        .context("No document")?;
    let root = document
        .get_element_by_id(root_id)
        .with_context(|| format!("Mount root #{} not found", root_id))?;

    let page = document.create_element("div")?;
    let heading = document.create_element("h1")?;
    heading.set_class_name("text-center");
    heading.set_text_content(Some(PAGE_TITLE));
    page.append_child(&heading)?;

    let config = match PageBody::for_config(config) {
        PageBody::ConfigError(message) => {
            log::error!("[Host] No upload endpoint ({} unset)", ENDPOINT_ENV_VAR);
            render_config_error(&document, &page, &message)?;
            root.append_child(&page)?;
            return Ok(None);
        }
        PageBody::Widget(config) => config,
    };

    log::info!("[Host] Mounting capture widget for {}", config.endpoint);
    let view = Rc::new(CaptureView::build(&document)?);
    page.append_child(view.root())?;
    root.append_child(&page)?;

    let uploader = FetchUploader::new(config.endpoint.clone(), config.upload_timeout_ms);
    let widget = Rc::new(CaptureWidget::new(
        BrowserCamera,
        view.viewfinder(),
        uploader,
        BrowserTimer,
        config,
    ));

    {
        let view = Rc::clone(&view);
        widget.store().subscribe(move |state| view.render(state));
    }

    let click = {
        let widget = Rc::clone(&widget);
        EventListener::new(view.button(), "click", move |_| {
            let widget = Rc::clone(&widget);
            spawn_local(async move {
                widget.capture().await;
            });
        })
    };

    {
        let widget = Rc::clone(&widget);
        spawn_local(async move {
            widget.initialize().await;
        });
    }

    Ok(Some(MountedCapture {
        page,
        widget,
        _click: click,
    }))
}

fn render_config_error(document: &Document, page: &Element, message: &str) -> CaptureResult<()> {
    let banner = styled(document, "div", "color: red;")?;
    banner.set_text_content(Some(message));
    page.append_child(&banner)?;
    Ok(())
}
