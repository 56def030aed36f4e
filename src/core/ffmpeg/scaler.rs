use ffmpeg_next::frame;
use ffmpeg_next::software::scaling;

use crate::core::backend::{Converter, DecodedFrame};
use crate::core::image::{FrameLayout, Image, OutputFormat};
use crate::error::{Error, Result};

/// libswscale converter for one source layout, with a reusable output frame.
pub struct FfmpegConverter {
    scaler: scaling::Context,
    layout: FrameLayout,
    target: OutputFormat,
    output: frame::Video,
}

impl FfmpegConverter {
    pub(crate) fn new(source: &frame::Video, target: OutputFormat) -> Result<Self> {
        let layout = source.layout();
        if !layout.resolution.is_valid() {
            return Err(Error::ConversionFailed(format!(
                "frame has invalid size {}",
                layout.resolution
            )));
        }
        let (width, height) = (layout.resolution.width, layout.resolution.height);

        let scaler = scaling::Context::get(
            source.format(),
            width,
            height,
            target.pixel(),
            width,
            height,
            scaling::Flags::BILINEAR,
        )
        .map_err(|e| {
            Error::ConversionFailed(format!(
                "cannot convert {:?} {} to {}: {e}",
                source.format(),
                layout.resolution,
                target
            ))
        })?;

        Ok(Self {
            scaler,
            layout,
            target,
            output: frame::Video::new(target.pixel(), width, height),
        })
    }
}

impl Converter for FfmpegConverter {
    type Frame = frame::Video;

    fn layout(&self) -> FrameLayout {
        self.layout
    }

    fn convert(&mut self, frame: &Self::Frame, sequence: u64) -> Result<Image> {
        self.scaler
            .run(frame, &mut self.output)
            .map_err(|e| Error::ConversionFailed(e.to_string()))?;

        Image::from_strided_plane(
            self.layout.resolution,
            self.target,
            sequence,
            self.output.data(0),
            self.output.stride(0),
        )
        .ok_or_else(|| Error::ConversionFailed("converted plane is smaller than expected".into()))
    }
}
