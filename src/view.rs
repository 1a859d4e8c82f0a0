//! DOM for the capture widget.
//!
//! Built once with `web-sys`, then patched from each [`WidgetState`] snapshot.

use futures::channel::oneshot;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Blob, CanvasRenderingContext2d, Document, Element, HtmlButtonElement, HtmlCanvasElement,
    HtmlElement, HtmlVideoElement,
};

use crate::camera::BrowserStream;
use crate::crop::{CropRect, FrameSize};
use crate::state::WidgetState;
use crate::upload::IMAGE_MIME;
use crate::widget::Viewfinder;

const WRAPPER_CSS: &str =
    "display: flex; flex-direction: column; align-items: center; gap: 16px;";
const PREVIEW_CSS: &str = "width: 100%; max-width: 360px; aspect-ratio: 9 / 16; background: #222; position: relative; overflow: hidden; border-radius: 16px; border: 2px solid #333;";
const VIDEO_CSS: &str =
    "width: 100%; height: 100%; object-fit: cover; position: absolute; top: 0; left: 0;";
const FLASH_CSS: &str = "position: absolute; top: 0; left: 0; width: 100%; height: 100%; background: rgba(255,255,255,0.4); pointer-events: none;";
const COUNTER_CSS: &str = "margin-top: 8px; font-size: 16px;";
const ERROR_CSS: &str = "color: red;";

fn button_css(capturing: bool) -> String {
    let (background, cursor) = if capturing {
        ("#005bb5", "not-allowed")
    } else {
        ("#0070f3", "pointer")
    };
    format!(
        "padding: 12px 24px; font-size: 18px; border-radius: 8px; background: {}; color: white; border: none; cursor: {}; transition: background 0.2s;",
        background, cursor
    )
}

/// Create an element and apply inline CSS.
pub(crate) fn styled(document: &Document, tag: &str, css: &str) -> Result<HtmlElement, JsValue> {
    let el: HtmlElement = document.create_element(tag)?.unchecked_into();
    el.set_attribute("style", css)?;
    Ok(el)
}

fn set_visible(el: &HtmlElement, visible: bool) {
    let _ = el
        .style()
        .set_property("display", if visible { "block" } else { "none" });
}

/// Widget DOM handles.
pub struct CaptureView {
    root: HtmlElement,
    video: HtmlVideoElement,
    flash: HtmlElement,
    canvas: HtmlCanvasElement,
    button: HtmlButtonElement,
    count: HtmlElement,
    error: HtmlElement,
}

impl CaptureView {
    pub fn build(document: &Document) -> Result<Self, JsValue> {
        let root = styled(document, "div", WRAPPER_CSS)?;

        let preview = styled(document, "div", PREVIEW_CSS)?;
        let video: HtmlVideoElement = styled(document, "video", VIDEO_CSS)?.unchecked_into();
        video.set_autoplay(true);
        video.set_muted(true);
        video.set_attribute("playsinline", "")?;
        preview.append_child(&video)?;

        let flash = styled(document, "div", FLASH_CSS)?;
        set_visible(&flash, false);
        preview.append_child(&flash)?;
        root.append_child(&preview)?;

        let canvas: HtmlCanvasElement = styled(document, "canvas", "display: none;")?.unchecked_into();
        root.append_child(&canvas)?;

        let button: HtmlButtonElement = styled(document, "button", &button_css(false))?.unchecked_into();
        button.set_text_content(Some("Capture"));
        button.set_class_name("capture-btn");
        root.append_child(&button)?;

        let counter = styled(document, "div", COUNTER_CSS)?;
        counter.set_text_content(Some("Successful Captures: "));
        let count = document.create_element("strong")?.unchecked_into::<HtmlElement>();
        count.set_text_content(Some("0"));
        counter.append_child(&count)?;
        root.append_child(&counter)?;

        let error = styled(document, "div", ERROR_CSS)?;
        set_visible(&error, false);
        root.append_child(&error)?;

        Ok(Self {
            root,
            video,
            flash,
            canvas,
            button,
            count,
            error,
        })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn button(&self) -> &HtmlButtonElement {
        &self.button
    }

    /// Viewfinder sharing this view's video and canvas elements.
    pub fn viewfinder(&self) -> CanvasViewfinder {
        CanvasViewfinder {
            video: self.video.clone(),
            canvas: self.canvas.clone(),
        }
    }

    /// Apply a full state snapshot.
    pub fn render(&self, state: &WidgetState) {
        let capturing = state.is_capturing();
        self.button.set_disabled(!state.can_capture());
        self.button
            .set_class_name(if capturing { "capture-btn capturing" } else { "capture-btn" });
        let _ = self.button.set_attribute("style", &button_css(capturing));

        set_visible(&self.flash, state.flash);
        self.count
            .set_text_content(Some(&state.success_count.to_string()));

        match &state.error {
            Some(message) => {
                self.error.set_text_content(Some(message));
                set_visible(&self.error, true);
            }
            None => {
                self.error.set_text_content(None);
                set_visible(&self.error, false);
            }
        }
    }
}

/// Live `<video>` preview plus the hidden capture `<canvas>`.
pub struct CanvasViewfinder {
    video: HtmlVideoElement,
    canvas: HtmlCanvasElement,
}

impl Viewfinder<BrowserStream> for CanvasViewfinder {
    type Image = Blob;

    fn attach(&self, stream: &BrowserStream) {
        self.video.set_src_object(Some(&stream.0));
    }

    fn frame_size(&self) -> Option<FrameSize> {
        let size = FrameSize::new(self.video.video_width(), self.video.video_height());
        (!size.is_empty()).then_some(size)
    }

    fn draw(&self, crop: CropRect, output: FrameSize) -> bool {
        self.canvas.set_width(output.width);
        self.canvas.set_height(output.height);

        let ctx = match self.canvas.get_context("2d") {
            Ok(Some(ctx)) => ctx.unchecked_into::<CanvasRenderingContext2d>(),
            _ => return false,
        };

        ctx.draw_image_with_html_video_element_and_sw_and_sh_and_dx_and_dy_and_dw_and_dh(
            &self.video,
            crop.x,
            crop.y,
            crop.width,
            crop.height,
            0.0,
            0.0,
            output.width as f64,
            output.height as f64,
        )
        .map_err(|e| log::warn!("[CaptureWidget] drawImage failed: {:?}", e))
        .is_ok()
    }

    async fn encode(&self, quality: f64) -> Option<Blob> {
        let (tx, rx) = oneshot::channel::<Option<Blob>>();
        let callback = Closure::once(move |blob: JsValue| {
            let _ = tx.send(blob.dyn_into::<Blob>().ok());
        });

        if let Err(e) = self.canvas.to_blob_with_type_and_encoder_options(
            callback.as_ref().unchecked_ref(),
            IMAGE_MIME,
            &JsValue::from_f64(quality),
        ) {
            log::warn!("[CaptureWidget] toBlob failed: {:?}", e);
            return None;
        }

        // The callback must stay alive until the browser invokes it.
        let blob = rx.await.ok().flatten();
        drop(callback);
        blob
    }
}
