use ffmpeg_next::codec;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::frame;
use ffmpeg_next::util::error::EAGAIN;
use ffmpeg_next::{Dictionary, Rational};
use ffmpeg_sys_next::av_frame_make_writable;
use log::info;

use crate::error::{av_err2str, Error, Result};
use crate::sender::pattern::YuvImage;

const PREFERRED_ENCODER: &str = "libx264";
const GOP_SIZE: u32 = 5;

/// Encoder configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Target bit rate in bits per second.
    pub bitrate: usize,
}

impl EncoderSettings {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(Error::invalid_settings(
                "resolution",
                format!("{}x{} must be non-zero and even", self.width, self.height),
            ));
        }
        if self.fps == 0 {
            return Err(Error::invalid_settings("fps", "must be greater than zero"));
        }
        if self.bitrate == 0 {
            return Err(Error::invalid_settings("bitrate", "must be greater than zero"));
        }
        Ok(())
    }
}

/// H.264 encoder for [`YuvImage`]s, tuned for live streaming: no B-frames, short GOP,
/// zero-latency rate control.
pub struct H264Encoder {
    encoder: ffmpeg_next::encoder::video::Encoder,
    frame: frame::Video,
    time_base: Rational,
    next_pts: i64,
}

fn encode_error(context: &str, e: ffmpeg_next::Error) -> Error {
    Error::Encode(format!("{context}: {e}"))
}

impl H264Encoder {
    /// Opens `libx264` if available, otherwise FFmpeg's default H.264 encoder.
    ///
    /// `global_header` must be set when the container wants codec extradata out of band
    /// (FLV does).
    pub fn new(settings: EncoderSettings, global_header: bool) -> Result<Self> {
        settings.validate()?;
        crate::core::initialize_ffmpeg();

        let codec = ffmpeg_next::encoder::find_by_name(PREFERRED_ENCODER)
            .or_else(|| ffmpeg_next::encoder::find(codec::Id::H264))
            .ok_or_else(|| Error::Encode("no H.264 encoder available".to_string()))?;

        let codec_name = codec.name().to_string();
        let context = codec::context::Context::new_with_codec(codec);
        let mut encoder = context
            .encoder()
            .video()
            .map_err(|e| encode_error("failed to create encoder", e))?;

        let time_base = Rational::new(1, settings.fps as i32);
        encoder.set_width(settings.width);
        encoder.set_height(settings.height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(time_base);
        encoder.set_frame_rate(Some(Rational::new(settings.fps as i32, 1)));
        encoder.set_bit_rate(settings.bitrate);
        encoder.set_gop(GOP_SIZE);
        encoder.set_max_b_frames(0);
        if global_header {
            encoder.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut options = Dictionary::new();
        options.set("preset", "ultrafast");
        options.set("tune", "zerolatency");
        let encoder = encoder
            .open_with(options)
            .map_err(|e| encode_error("failed to open encoder", e))?;

        info!(
            "Opened {} encoder {}x{}@{} {}bps",
            codec_name,
            settings.width,
            settings.height,
            settings.fps,
            settings.bitrate
        );

        Ok(Self {
            encoder,
            frame: frame::Video::new(Pixel::YUV420P, settings.width, settings.height),
            time_base,
            next_pts: 0,
        })
    }

    /// Time base of the packets this encoder produces.
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub(crate) fn encoder(&self) -> &ffmpeg_next::encoder::video::Encoder {
        &self.encoder
    }

    /// Encodes one image and hands every packet that became ready to `on_packet`.
    pub fn encode<F>(&mut self, image: &YuvImage, mut on_packet: F) -> Result<()>
    where
        F: FnMut(&mut ffmpeg_next::Packet) -> Result<()>,
    {
        if image.width != self.frame.width() || image.height != self.frame.height() {
            return Err(Error::Encode(format!(
                "image is {}x{}, encoder expects {}x{}",
                image.width,
                image.height,
                self.frame.width(),
                self.frame.height()
            )));
        }

        // SAFETY: frame owns a valid AVFrame; making it writable may reallocate its buffers
        // when the encoder still references the previous ones.
        let ret = unsafe { av_frame_make_writable(self.frame.as_mut_ptr()) };
        if ret < 0 {
            return Err(Error::Encode(format!(
                "failed to make frame writable: {}",
                av_err2str(ret)
            )));
        }

        copy_plane(&mut self.frame, 0, &image.y, image.width as usize);
        copy_plane(&mut self.frame, 1, &image.u, image.chroma_width() as usize);
        copy_plane(&mut self.frame, 2, &image.v, image.chroma_width() as usize);

        self.frame.set_pts(Some(self.next_pts));
        self.next_pts += 1;

        self.encoder
            .send_frame(&self.frame)
            .map_err(|e| encode_error("failed to send frame", e))?;
        self.receive_packets(&mut on_packet)
    }

    /// Drains the encoder at end of stream.
    pub fn flush<F>(&mut self, mut on_packet: F) -> Result<()>
    where
        F: FnMut(&mut ffmpeg_next::Packet) -> Result<()>,
    {
        self.encoder
            .send_eof()
            .map_err(|e| encode_error("failed to flush encoder", e))?;
        self.receive_packets(&mut on_packet)
    }

    fn receive_packets<F>(&mut self, on_packet: &mut F) -> Result<()>
    where
        F: FnMut(&mut ffmpeg_next::Packet) -> Result<()>,
    {
        let mut packet = ffmpeg_next::Packet::empty();
        loop {
            match self.encoder.receive_packet(&mut packet) {
                Ok(()) => on_packet(&mut packet)?,
                Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => return Ok(()),
                Err(ffmpeg_next::Error::Eof) => return Ok(()),
                Err(e) => return Err(encode_error("failed to receive packet", e)),
            }
        }
    }
}

/// Copies tightly packed rows of `row_bytes` into the frame plane, honouring its stride.
fn copy_plane(frame: &mut frame::Video, plane: usize, source: &[u8], row_bytes: usize) {
    let stride = frame.stride(plane);
    let data = frame.data_mut(plane);
    for (row, chunk) in source.chunks_exact(row_bytes).enumerate() {
        let start = row * stride;
        if start + row_bytes > data.len() {
            break;
        }
        data[start..start + row_bytes].copy_from_slice(chunk);
    }
}
