//! The **RTMP** module contains the ingest session ([`RtmpServer`](rtmp_server::RtmpServer)):
//! it listens for one publisher at a time, decodes the publisher's video and delivers every
//! frame to the application as an [`Image`](crate::Image).
//!
//! # Architecture
//!
//! Two threads per session, connected by a bounded packet queue:
//!
//! - `rtmp-read-worker`: connection state machine. Accepts a publisher, probes its streams,
//!   opens the decoder and forwards packets of the selected video stream into the queue.
//! - `rtmp-decode-worker`: one per connection. Decodes queued packets, converts frames to
//!   the configured output format and invokes the image handler.
//!
//! ```text
//!   publisher ──► [read worker] ──► PacketQueue ──► [decode worker] ──► image handler
//!                   │                                   │
//!                   └── connected / disconnected        └── per-packet errors
//! ```
//!
//! ## Connection lifecycle
//!
//! | State | Leaves on | Next |
//! |-------|-----------|------|
//! | Connecting | accepted / failure (retried after `reconnect_delay`) | Probing / Connecting |
//! | Probing | decoder opened / no usable video | Streaming / Connecting |
//! | Streaming | end of stream, transport error, decoder fault, stop | Disconnecting |
//! | Disconnecting | decode worker joined, queue drained, connection closed | Connecting |
//!
//! ## Backpressure
//!
//! The queue never drops packets. When it is full the read worker stops reading from the
//! network until the decode worker catches up, so a slow image handler slows the publisher
//! down instead of losing frames.
//!
//! ## Cancellation
//!
//! Every blocking call (accept, read, queue push, reconnect sleep) observes a
//! [`CancellationToken`](crate::CancellationToken). [`stop`](rtmp_server::RtmpServer::stop)
//! cancels the session token and joins both workers, so it returns well under a second
//! from any state.
//!
//! # Example
//!
//! ```rust,ignore
//! let server = RtmpServer::builder()
//!     .url("rtmp://0.0.0.0:1935/live")
//!     .output_format(OutputFormat::Rgb24)
//!     .build()?;
//!
//! server.set_image_handler(|image| {
//!     println!("{} {} bytes", image.resolution(), image.data().len());
//! });
//! server.start()?;
//! ```

mod callbacks;
mod decode_worker;
pub mod packet_queue;
mod prober;
mod read_worker;
pub mod rtmp_server;
pub mod settings;

#[cfg(test)]
mod mock;

pub use callbacks::{ConnectedHandler, DisconnectedHandler, ErrorHandler, ImageHandler};
