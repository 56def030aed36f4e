//! Seams between the ingest pipeline and the media library that does the actual work.
//!
//! The pipeline only needs four capabilities: accept a connection, read packets from it,
//! decode packets into frames, and convert frames into [`Image`]s. [`MediaBackend`] bundles
//! them so the controller can be generic over the implementation. The production
//! implementation is [`FfmpegBackend`](crate::FfmpegBackend).

use std::time::Duration;

use crate::core::cancel::CancellationToken;
use crate::core::image::{FrameLayout, Image, OutputFormat, Resolution};
use crate::core::packet::Packet;
use crate::core::stream_info::{MediaKind, StreamDescriptor};
use crate::error::Result;

/// Where and how to wait for the inbound connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Listening URL, e.g. `rtmp://0.0.0.0:1935/live`.
    pub url: String,

    /// Transport buffer budget (RTMP `rtmp_buffer`).
    pub buffer_time: Duration,

    /// How long to wait for a client before giving up. `None` waits until cancelled.
    pub listen_timeout: Option<Duration>,
}

/// What the decoder reports about the stream once opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderDescription {
    pub codec: String,
    pub pixel_format: String,
    pub resolution: Resolution,
}

/// Failure modes of a decoder call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderFault {
    /// The packet or frame is bad; the decoder can keep going with the next packet.
    Recoverable(String),

    /// The decoder is in a state it cannot leave; the connection should be restarted.
    Unrecoverable(String),
}

impl DecoderFault {
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, DecoderFault::Unrecoverable(_))
    }

    pub fn reason(&self) -> &str {
        match self {
            DecoderFault::Recoverable(reason) | DecoderFault::Unrecoverable(reason) => reason,
        }
    }
}

/// An accepted, demultiplexed transport connection. Closed on drop.
pub trait Connection {
    /// Discovers the streams carried by the connection.
    fn probe_streams(&mut self) -> Result<Vec<StreamDescriptor>>;

    /// Index of the stream the container ranks best for `kind`.
    fn best_stream(&self, kind: MediaKind) -> Option<usize>;

    /// Reads the next packet of any stream.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(packet))` for every packet read.
    /// * `Ok(None)` when the peer ended the stream.
    /// * `Err(Error::Cancelled)` when the read was interrupted by the cancellation token.
    /// * `Err(Error::TransportReadFailed(_))` on any other transport failure.
    fn read_packet(&mut self) -> Result<Option<Packet>>;
}

/// A decoded frame, owned by the decode worker until it has been converted.
pub trait DecodedFrame {
    fn layout(&self) -> FrameLayout;
}

/// A stateful video decoder bound to one stream. Closed on drop.
pub trait Decoder {
    type Frame: DecodedFrame;

    fn describe(&self) -> DecoderDescription;

    /// Feeds one compressed packet.
    fn submit(&mut self, packet: &Packet) -> std::result::Result<(), DecoderFault>;

    /// Pulls the next decoded frame. `Ok(None)` means the decoder needs more input.
    fn receive_frame(&mut self) -> std::result::Result<Option<Self::Frame>, DecoderFault>;
}

/// Converts frames of one fixed [`FrameLayout`] into [`Image`]s. Closed on drop.
pub trait Converter {
    type Frame;

    /// The source layout this converter was built for.
    fn layout(&self) -> FrameLayout;

    /// Converts `frame`, stamping the resulting image with `sequence`.
    fn convert(&mut self, frame: &Self::Frame, sequence: u64) -> Result<Image>;
}

/// Factory for connections, decoders and converters.
///
/// The backend is shared between the read worker (which opens connections and decoders)
/// and the decode worker (which builds converters), so it must be `Send + Sync`. The
/// objects it creates are each owned by a single worker.
pub trait MediaBackend: Send + Sync + 'static {
    type Frame: DecodedFrame;
    type Connection: Connection;
    type Decoder: Decoder<Frame = Self::Frame> + Send + 'static;
    type Converter: Converter<Frame = Self::Frame>;

    /// Opens or accepts a connection. Must return promptly with `Error::Cancelled` once
    /// `cancel` fires, even while blocked waiting for a peer.
    ///
    /// The connection may keep `cancel` to interrupt later blocking reads.
    fn open(&self, endpoint: &Endpoint, cancel: &CancellationToken) -> Result<Self::Connection>;

    /// Opens a decoder for `stream`.
    ///
    /// Returns `Error::NoSuitableStream` when no decoder exists for the stream's codec and
    /// `Error::DecoderOpenFailed` when one exists but cannot be opened.
    fn open_decoder(
        &self,
        connection: &Self::Connection,
        stream: &StreamDescriptor,
    ) -> Result<Self::Decoder>;

    /// Builds a converter from `frame`'s layout to `target` at the same size.
    fn build_converter(&self, frame: &Self::Frame, target: OutputFormat) -> Result<Self::Converter>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_fault_classification() {
        let fault = DecoderFault::Unrecoverable("Internal bug".to_string());
        assert!(fault.is_unrecoverable());
        assert_eq!(fault.reason(), "Internal bug");
        let fault = DecoderFault::Recoverable("Invalid data".to_string());
        assert!(!fault.is_unrecoverable());
    }
}
