use ffmpeg_next::codec;
use ffmpeg_next::frame;
use ffmpeg_next::util::error::EAGAIN;
use log::debug;

use crate::core::backend::{Decoder, DecoderDescription, DecoderFault};
use crate::core::ffmpeg::{codec_name, pixel_format_name};
use crate::core::image::Resolution;
use crate::core::packet::Packet;
use crate::error::{Error, Result};

/// libavcodec video decoder bound to one stream.
pub struct FfmpegDecoder {
    decoder: ffmpeg_next::decoder::Video,
}

impl FfmpegDecoder {
    pub(crate) fn open(stream: &ffmpeg_next::format::stream::Stream) -> Result<Self> {
        let parameters = stream.parameters();
        let codec_id = parameters.id();
        if ffmpeg_next::codec::decoder::find(codec_id).is_none() {
            return Err(Error::NoSuitableStream(format!(
                "no decoder available for codec {}",
                codec_name(codec_id)
            )));
        }

        let context = codec::context::Context::from_parameters(parameters)
            .map_err(|e| Error::DecoderOpenFailed(e.to_string()))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| Error::DecoderOpenFailed(e.to_string()))?;

        Ok(Self { decoder })
    }
}

/// Errors that leave the codec context unusable are unrecoverable; anything else only
/// affects the packet at hand.
fn classify(error: ffmpeg_next::Error) -> DecoderFault {
    match error {
        ffmpeg_next::Error::Eof
        | ffmpeg_next::Error::Bug
        | ffmpeg_next::Error::Bug2
        | ffmpeg_next::Error::External => DecoderFault::Unrecoverable(error.to_string()),
        ffmpeg_next::Error::Other { errno } if errno == libc::ENOMEM => {
            DecoderFault::Unrecoverable(error.to_string())
        }
        _ => DecoderFault::Recoverable(error.to_string()),
    }
}

impl Decoder for FfmpegDecoder {
    type Frame = frame::Video;

    fn describe(&self) -> DecoderDescription {
        DecoderDescription {
            codec: codec_name(self.decoder.id()),
            pixel_format: pixel_format_name(self.decoder.format()),
            resolution: Resolution::new(self.decoder.width(), self.decoder.height()),
        }
    }

    fn submit(&mut self, packet: &Packet) -> std::result::Result<(), DecoderFault> {
        // An empty packet is FFmpeg's flush signal; it would end the decoder.
        if packet.is_empty() {
            debug!("Skipping empty packet");
            return Ok(());
        }

        let mut av_packet = ffmpeg_next::Packet::copy(packet.data());
        av_packet.set_pts(packet.pts());
        av_packet.set_dts(packet.dts());
        if packet.is_keyframe() {
            av_packet.set_flags(codec::packet::Flags::KEY);
        }

        self.decoder.send_packet(&av_packet).map_err(classify)
    }

    fn receive_frame(&mut self) -> std::result::Result<Option<Self::Frame>, DecoderFault> {
        let mut frame = frame::Video::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => Ok(Some(frame)),
            // Both mean there is no output frame available, but nothing went wrong.
            Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => Ok(None),
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(e) => Err(classify(e)),
        }
    }
}
