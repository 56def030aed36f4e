//! Test-pattern publisher: generates an animated YUV gradient, encodes it to H.264 and
//! pushes it to an RTMP server as a live FLV stream.
//!
//! Used by the `rtmp-sender` binary and by the end-to-end tests of
//! [`RtmpServer`](crate::RtmpServer).
//!
//! ```rust,ignore
//! let cancel = CancellationToken::new();
//! let sent = publish("rtmp://127.0.0.1:1935/live", &PublishSettings::default(), &cancel)?;
//! ```

pub mod fps_limiter;
pub mod h264_encoder;
pub mod pattern;
pub mod publisher;

pub use fps_limiter::FpsLimiter;
pub use h264_encoder::{EncoderSettings, H264Encoder};
pub use pattern::{FlowPattern, YuvImage};
pub use publisher::RtmpPublisher;

use log::{debug, info};

use crate::core::cancel::CancellationToken;
use crate::error::Result;

/// What to publish and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate: usize,
    /// Stop after this many frames. `None` streams until cancelled.
    pub max_frames: Option<u64>,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 60,
            bitrate: 4_000_000,
            max_frames: None,
        }
    }
}

impl PublishSettings {
    pub fn encoder_settings(&self) -> EncoderSettings {
        EncoderSettings {
            width: self.width,
            height: self.height,
            fps: self.fps,
            bitrate: self.bitrate,
        }
    }
}

/// Streams the flow pattern to `url` at the configured rate until `cancel` fires or
/// `max_frames` have been sent.
///
/// # Returns
///
/// * `Ok(frames)` with the number of frames encoded, after the trailer has been written.
/// * `Err(Error::InvalidSettings)`, `Err(Error::Encode)` or `Err(Error::Publish)` otherwise.
pub fn publish(url: &str, settings: &PublishSettings, cancel: &CancellationToken) -> Result<u64> {
    let encoder_settings = settings.encoder_settings();
    encoder_settings.validate()?;

    let mut publisher = RtmpPublisher::connect(url)?;
    let mut encoder = H264Encoder::new(encoder_settings, publisher.needs_global_header())?;
    publisher.start(&encoder)?;
    let time_base = encoder.time_base();

    info!(
        "Start sending {}x{}@{} to {url}",
        settings.width, settings.height, settings.fps
    );

    let mut limiter = FpsLimiter::new(settings.fps);
    let limit = settings.max_frames.unwrap_or(u64::MAX);
    let mut sent = 0u64;
    for image in FlowPattern::new(settings.width, settings.height, cancel.clone()) {
        if sent >= limit {
            break;
        }
        encoder.encode(&image, |packet| publisher.write(packet, time_base))?;
        sent += 1;
        if sent % u64::from(settings.fps.max(1)) == 0 {
            debug!("Sent {sent} frames");
        }
        if limiter.wait(cancel) {
            break;
        }
    }

    encoder.flush(|packet| publisher.write(packet, time_base))?;
    publisher.finish()?;
    info!("Stopped sending after {sent} frames");
    Ok(sent)
}
