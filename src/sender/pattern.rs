use crate::core::cancel::CancellationToken;

/// A planar YUV 4:2:0 picture with tightly packed planes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YuvImage {
    pub width: u32,
    pub height: u32,
    /// Position in the generated sequence, starting at zero.
    pub index: u64,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
}

impl YuvImage {
    pub fn chroma_width(&self) -> u32 {
        self.width / 2
    }

    pub fn chroma_height(&self) -> u32 {
        self.height / 2
    }
}

/// Endless animated gradient, generated lazily one frame at a time.
///
/// Every plane drifts at its own speed so consecutive frames differ everywhere, which
/// keeps the encoder producing real P-frames. Iteration ends once `cancel` fires.
pub struct FlowPattern {
    width: u32,
    height: u32,
    index: u64,
    cancel: CancellationToken,
}

impl FlowPattern {
    /// `width` and `height` must be even for 4:2:0 subsampling; odd values are rounded down.
    pub fn new(width: u32, height: u32, cancel: CancellationToken) -> Self {
        Self {
            width: width & !1,
            height: height & !1,
            index: 0,
            cancel,
        }
    }

    /// Starts the animation over from the first frame.
    pub fn restart(&mut self) {
        self.index = 0;
    }

    fn render(&self) -> YuvImage {
        let (width, height) = (self.width as usize, self.height as usize);
        let (chroma_width, chroma_height) = (width / 2, height / 2);
        let step = self.index as usize;

        let mut y = Vec::with_capacity(width * height);
        for row in 0..height {
            y.extend((0..width).map(|col| (col + row + step * 3) as u8));
        }

        let mut u = Vec::with_capacity(chroma_width * chroma_height);
        let mut v = Vec::with_capacity(chroma_width * chroma_height);
        for row in 0..chroma_height {
            u.extend((0..chroma_width).map(|_| (128 + row + step * 2) as u8));
            v.extend((0..chroma_width).map(|col| (64 + col + step * 5) as u8));
        }

        YuvImage {
            width: self.width,
            height: self.height,
            index: self.index,
            y,
            u,
            v,
        }
    }
}

impl Iterator for FlowPattern {
    type Item = YuvImage;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let image = self.render();
        self.index += 1;
        Some(image)
    }
}
