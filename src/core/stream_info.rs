use std::fmt;

use crate::core::image::Resolution;

/// Media type of a demultiplexed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
    Subtitle,
    Data,
    Attachment,
    Unknown,
}

impl MediaKind {
    /// Returns a human-readable label for this stream type (e.g. `"Video"`).
    pub fn label(&self) -> &'static str {
        match self {
            MediaKind::Video => "Video",
            MediaKind::Audio => "Audio",
            MediaKind::Subtitle => "Subtitle",
            MediaKind::Data => "Data",
            MediaKind::Attachment => "Attachment",
            MediaKind::Unknown => "Unknown",
        }
    }
}

/// Description of one stream inside an opened connection, as reported by the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    /// The index of the stream within the connection.
    pub index: usize,

    /// Video, audio, ...
    pub kind: MediaKind,

    /// A human-readable name of the codec (e.g. `"h264"`).
    pub codec_name: String,

    /// Frame size reported by the container. Zero for non-video streams and for video
    /// streams whose size is not yet known.
    pub resolution: Resolution,
}

impl StreamDescriptor {
    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }

    pub fn is_audio(&self) -> bool {
        self.kind == MediaKind::Audio
    }
}

impl fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} {}", self.index, self.kind.label(), self.codec_name)?;
        if self.is_video() {
            write!(f, " {}", self.resolution)?;
        }
        Ok(())
    }
}

/// Snapshot of the selected video stream, published through the connected handler once
/// per connection and valid until the matching disconnected handler fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// Codec name of the selected stream (e.g. `"h264"`).
    pub codec: String,

    /// Native pixel format of the decoder (e.g. `"yuv420p"`).
    pub pixel_format: String,

    /// Frame size announced at connection time. Frames may change size later; the decode
    /// worker follows such changes without republishing this snapshot.
    pub resolution: Resolution,

    /// Index of the selected stream within the connection.
    pub stream_index: usize,
}

impl fmt::Display for StreamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "codec={} fmt={} width={} height={} stream_index={}",
            self.codec,
            self.pixel_format,
            self.resolution.width,
            self.resolution.height,
            self.stream_index
        )
    }
}
