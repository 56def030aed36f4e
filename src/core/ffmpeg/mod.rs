//! [`MediaBackend`] implementation on top of FFmpeg.
//!
//! * transport/container: libavformat in RTMP listen mode, interruptible through
//!   `AVIOInterruptCB`
//! * decoder: libavcodec
//! * converter: libswscale

mod decoder;
mod input;
mod scaler;

pub use decoder::FfmpegDecoder;
pub use input::FfmpegConnection;
pub use scaler::FfmpegConverter;

use std::ffi::CStr;

use ffmpeg_next::codec;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::frame;
use ffmpeg_sys_next::{av_get_pix_fmt_name, avcodec_get_name, AVCodecID, AVPixelFormat};

use crate::core::backend::{DecodedFrame, Endpoint, MediaBackend};
use crate::core::cancel::CancellationToken;
use crate::core::image::{FrameLayout, OutputFormat, Resolution};
use crate::core::stream_info::StreamDescriptor;
use crate::error::Result;

/// The production backend: FFmpeg for transport, decoding and pixel conversion.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegBackend;

impl MediaBackend for FfmpegBackend {
    type Frame = frame::Video;
    type Connection = FfmpegConnection;
    type Decoder = FfmpegDecoder;
    type Converter = FfmpegConverter;

    fn open(&self, endpoint: &Endpoint, cancel: &CancellationToken) -> Result<Self::Connection> {
        FfmpegConnection::listen(endpoint, cancel)
    }

    fn open_decoder(
        &self,
        connection: &Self::Connection,
        stream: &StreamDescriptor,
    ) -> Result<Self::Decoder> {
        connection.open_decoder(stream.index)
    }

    fn build_converter(&self, frame: &Self::Frame, target: OutputFormat) -> Result<Self::Converter> {
        FfmpegConverter::new(frame, target)
    }
}

impl DecodedFrame for frame::Video {
    fn layout(&self) -> FrameLayout {
        FrameLayout {
            pixel_format: AVPixelFormat::from(self.format()) as i32,
            resolution: Resolution::new(self.width(), self.height()),
        }
    }
}

fn codec_name(id: codec::Id) -> String {
    // SAFETY: avcodec_get_name is a pure lookup that returns a static string
    // pointer for any AVCodecID value. We null-check before dereferencing.
    unsafe {
        let ptr = avcodec_get_name(AVCodecID::from(id));
        if ptr.is_null() {
            "Unknown codec".into()
        } else {
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }
}

fn pixel_format_name(pixel: Pixel) -> String {
    // SAFETY: av_get_pix_fmt_name returns a static string or null for unknown formats.
    unsafe {
        let ptr = av_get_pix_fmt_name(AVPixelFormat::from(pixel));
        if ptr.is_null() {
            "none".into()
        } else {
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }
}
