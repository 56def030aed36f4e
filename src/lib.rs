//! # rtmp-ingest
//!
//! A single-connection **RTMP ingest server** built on FFmpeg. It listens on an RTMP URL,
//! accepts a live publisher (OBS, `ffmpeg -f flv rtmp://...`, the bundled `rtmp-sender`),
//! decodes the publisher's best video stream and hands every decoded frame to your code as
//! a packed [`Image`] in the pixel format you ask for.
//!
//! When the publisher disconnects, the server goes back to listening for the next one
//! until it is stopped.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rtmp_ingest::{OutputFormat, RtmpServer};
//!
//! let server = RtmpServer::builder()
//!     .url("rtmp://0.0.0.0:1935/live")
//!     .output_format(OutputFormat::Bgr24)
//!     .build()?;
//!
//! server.set_connected_handler(|info| println!("publisher connected: {info}"));
//! server.set_disconnected_handler(|| println!("publisher left"));
//! server.set_image_handler(|image| {
//!     // `image.data()` holds `height` rows of `width * 3` bytes.
//!     println!("frame #{} {}", image.sequence(), image.resolution());
//! });
//! server.set_error_handler(|e| eprintln!("{e}"));
//!
//! server.start()?;
//! // ... later
//! server.stop();
//! ```
//!
//! ## Threads and handlers
//!
//! Each server runs two threads: `rtmp-read-worker` (accept, probe, read) and
//! `rtmp-decode-worker` (decode, convert, deliver). Handlers are called on those threads
//! and should return quickly; a slow image handler throttles the publisher rather than
//! dropping frames. [`RtmpServer::stop`] joins both threads; no handler fires after it
//! returns.
//!
//! ## Custom backends
//!
//! The pipeline is generic over [`MediaBackend`]. [`FfmpegBackend`] is the default; a
//! different transport or decoder can be plugged in with [`RtmpServer::with_backend`].
//!
//! ## Sender
//!
//! The [`sender`] module publishes a synthetic H.264 test pattern to an RTMP URL. It backs
//! the `rtmp-sender` binary and the end-to-end tests.
//!
//! ## Feature Flags
//!
//! - **`static`**: link FFmpeg statically.
//! - **`cli`**: build the `rtmp-server` and `rtmp-sender` binaries.

pub mod core;
pub mod error;
pub mod rtmp;
pub mod sender;

pub use self::core::backend::{
    Connection, Converter, DecodedFrame, Decoder, DecoderDescription, DecoderFault, Endpoint,
    MediaBackend,
};
pub use self::core::cancel::CancellationToken;
pub use self::core::ffmpeg::FfmpegBackend;
pub use self::core::image::{FrameLayout, Image, OutputFormat, Resolution};
pub use self::core::packet::Packet;
pub use self::core::stream_info::{MediaKind, StreamDescriptor, StreamInfo};
pub use self::error::{Error, ErrorKind, Result};
pub use self::rtmp::packet_queue::PacketQueue;
pub use self::rtmp::rtmp_server::RtmpServer;
pub use self::rtmp::settings::{ServerBuilder, ServerSettings};
