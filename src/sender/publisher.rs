use ffmpeg_next::format::context::Output;
use ffmpeg_next::{Dictionary, Rational};
use log::{debug, info};

use crate::error::{Error, Result};
use crate::sender::h264_encoder::H264Encoder;

fn publish_error(context: &str, e: ffmpeg_next::Error) -> Error {
    Error::Publish(format!("{context}: {e}"))
}

/// FLV-over-RTMP output carrying a single H.264 video stream.
///
/// Lifecycle: [`connect`](RtmpPublisher::connect), open an encoder with
/// [`needs_global_header`](RtmpPublisher::needs_global_header), then
/// [`start`](RtmpPublisher::start), any number of [`write`](RtmpPublisher::write)s and
/// finally [`finish`](RtmpPublisher::finish).
pub struct RtmpPublisher {
    output: Output,
    url: String,
    stream: Option<(usize, Rational)>,
}

impl RtmpPublisher {
    /// Connects to the RTMP server at `url` as a live publisher.
    pub fn connect(url: &str) -> Result<Self> {
        crate::core::initialize_ffmpeg();

        let mut options = Dictionary::new();
        options.set("rtmp_live", "live");

        info!("Trying to connect to {url}");
        let output = ffmpeg_next::format::output_as_with(&url, "flv", options)
            .map_err(|e| publish_error(&format!("failed to connect to {url}"), e))?;

        Ok(Self {
            output,
            url: url.to_string(),
            stream: None,
        })
    }

    /// Whether encoders feeding this output must emit codec extradata out of band.
    pub fn needs_global_header(&self) -> bool {
        self.output
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER)
    }

    /// Adds the video stream described by `encoder` and writes the container header.
    pub fn start(&mut self, encoder: &H264Encoder) -> Result<()> {
        if self.stream.is_some() {
            return Err(Error::Publish("publisher already started".to_string()));
        }

        let codec = encoder.encoder().codec();
        let index = {
            let mut stream = self
                .output
                .add_stream(codec)
                .map_err(|e| publish_error("failed to add video stream", e))?;
            stream.set_parameters(encoder.encoder());
            stream.set_time_base(encoder.time_base());
            stream.index()
        };

        self.output
            .write_header()
            .map_err(|e| publish_error("failed to write header", e))?;

        // The muxer may pick its own time base while writing the header.
        let time_base = self
            .output
            .stream(index)
            .map(|stream| stream.time_base())
            .unwrap_or_else(|| encoder.time_base());
        self.stream = Some((index, time_base));

        debug!(
            "Publishing stream #{index} to {} with time base {}/{}",
            self.url,
            time_base.numerator(),
            time_base.denominator()
        );
        Ok(())
    }

    /// Rescales `packet` from `source_time_base` and writes it interleaved.
    pub fn write(&mut self, packet: &mut ffmpeg_next::Packet, source_time_base: Rational) -> Result<()> {
        let (index, time_base) = self
            .stream
            .ok_or_else(|| Error::Publish("publisher not started".to_string()))?;
        packet.set_stream(index);
        packet.rescale_ts(source_time_base, time_base);
        packet
            .write_interleaved(&mut self.output)
            .map_err(|e| publish_error("failed to write packet", e))
    }

    /// Writes the container trailer and closes the connection.
    pub fn finish(mut self) -> Result<()> {
        if self.stream.is_none() {
            return Ok(());
        }
        self.output
            .write_trailer()
            .map_err(|e| publish_error("failed to write trailer", e))?;
        info!("Finished publishing to {}", self.url);
        Ok(())
    }
}
