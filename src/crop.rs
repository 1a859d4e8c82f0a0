//! Centered crop geometry for mapping a camera frame onto the portrait output.

/// Width and height of a frame in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width divided by height. Zero-height frames report 0.
    pub fn aspect(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Fixed 9:16 output buffer the captured still is rendered into.
pub const OUTPUT_SIZE: FrameSize = FrameSize::new(360, 640);

/// Source-frame region copied into the output buffer.
///
/// Kept in floating point because `drawImage` accepts fractional source
/// rectangles and rounding would shift the crop off-center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    pub fn full(source: FrameSize) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: source.width as f64,
            height: source.height as f64,
        }
    }
}

/// Compute the centered crop of `source` that matches the aspect of `target`.
///
/// Wider sources lose equal strips on the left and right, taller sources on
/// the top and bottom. A source already at the target aspect is returned whole.
pub fn crop_to_aspect(source: FrameSize, target: FrameSize) -> CropRect {
    let source_w = source.width as f64;
    let source_h = source.height as f64;
    let target_aspect = target.aspect();

    if source.is_empty() || target.is_empty() {
        return CropRect::full(source);
    }

    // Compare with cross-multiplication so exact ratios like 1080x1920 hit
    // the no-crop branch without float noise.
    let lhs = source.width as u64 * target.height as u64;
    let rhs = target.width as u64 * source.height as u64;

    if lhs > rhs {
        let width = source_h * target_aspect;
        CropRect {
            x: (source_w - width) / 2.0,
            y: 0.0,
            width,
            height: source_h,
        }
    } else if lhs < rhs {
        let height = source_w / target_aspect;
        CropRect {
            x: 0.0,
            y: (source_h - height) / 2.0,
            width: source_w,
            height,
        }
    } else {
        CropRect::full(source)
    }
}
