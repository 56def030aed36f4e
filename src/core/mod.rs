pub mod backend;
pub mod cancel;
pub mod ffmpeg;
pub mod image;
pub mod packet;
pub mod stream_info;

use log::error;
use std::sync::Once;

static FFMPEG_INIT: Once = Once::new();

/// Initializes FFmpeg (including networking) once per process and quiets its own logger
/// down to errors.
pub(crate) fn initialize_ffmpeg() {
    FFMPEG_INIT.call_once(|| {
        if let Err(e) = ffmpeg_next::init() {
            error!("Failed to initialize FFmpeg: {e}");
        }
        ffmpeg_next::util::log::set_level(ffmpeg_next::util::log::Level::Error);
    });
}
