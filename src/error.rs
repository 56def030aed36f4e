use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while ingesting a stream.
///
/// Errors raised inside the workers never unwind across a thread boundary. They are
/// delivered to the error handler registered on [`RtmpServer`](crate::RtmpServer) on the
/// thread that detected them, and dropped (with a log line) when no handler is registered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid server settings: {field} {reason}")]
    InvalidSettings { field: &'static str, reason: String },

    #[error("Failed to open or accept connection on {url}: {reason}")]
    ConnectFailed { url: String, reason: String },

    #[error("No suitable video stream: {0}")]
    NoSuitableStream(String),

    #[error("Failed to open decoder: {0}")]
    DecoderOpenFailed(String),

    #[error("Failed to submit packet to decoder: {0}")]
    SubmitFailed(String),

    #[error("Failed to decode frame: {0}")]
    DecodeFailed(String),

    #[error("Unrecoverable decoder fault: {0}")]
    DecoderFault(String),

    #[error("Failed to convert frame: {0}")]
    ConversionFailed(String),

    #[error("Failed to read packet from transport: {0}")]
    TransportReadFailed(String),

    #[error("Operation interrupted by cancellation")]
    Cancelled,

    #[error("Failed to spawn thread {name}: {reason}")]
    ThreadSpawn { name: &'static str, reason: String },

    #[error("Server already stopped")]
    ServerStopped,

    #[error("Encoder error: {0}")]
    Encode(String),

    #[error("Publish error: {0}")]
    Publish(String),
}

/// Flat classification of [`Error`], convenient for matching in callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidSettings,
    ConnectFailed,
    NoSuitableStream,
    DecoderOpenFailed,
    SubmitFailed,
    DecodeFailed,
    DecoderFault,
    ConversionFailed,
    TransportReadFailed,
    Cancelled,
    ThreadSpawn,
    ServerStopped,
    Encode,
    Publish,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidSettings { .. } => ErrorKind::InvalidSettings,
            Error::ConnectFailed { .. } => ErrorKind::ConnectFailed,
            Error::NoSuitableStream(_) => ErrorKind::NoSuitableStream,
            Error::DecoderOpenFailed(_) => ErrorKind::DecoderOpenFailed,
            Error::SubmitFailed(_) => ErrorKind::SubmitFailed,
            Error::DecodeFailed(_) => ErrorKind::DecodeFailed,
            Error::DecoderFault(_) => ErrorKind::DecoderFault,
            Error::ConversionFailed(_) => ErrorKind::ConversionFailed,
            Error::TransportReadFailed(_) => ErrorKind::TransportReadFailed,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::ThreadSpawn { .. } => ErrorKind::ThreadSpawn,
            Error::ServerStopped => ErrorKind::ServerStopped,
            Error::Encode(_) => ErrorKind::Encode,
            Error::Publish(_) => ErrorKind::Publish,
        }
    }

    pub(crate) fn invalid_settings(field: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidSettings {
            field,
            reason: reason.into(),
        }
    }
}

/// Renders an FFmpeg return code the way `av_err2str` would.
pub(crate) fn av_err2str(ret: libc::c_int) -> String {
    ffmpeg_next::Error::from(ret).to_string()
}
