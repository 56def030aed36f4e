use std::time::Duration;

use crate::core::backend::Endpoint;
use crate::core::image::OutputFormat;
use crate::error::{Error, Result};

pub const DEFAULT_BUFFER_TIME: Duration = Duration::from_millis(1000);
pub const DEFAULT_QUEUE_SIZE: usize = 64;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(500);

/// Configuration of one [`RtmpServer`](crate::RtmpServer), fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Listening URL, e.g. `rtmp://0.0.0.0:1935/live`.
    pub url: String,

    /// Transport buffer budget passed to the RTMP demuxer.
    pub buffer_time: Duration,

    /// Capacity of the packet queue between the read and decode workers.
    pub queue_size: usize,

    /// How long one accept attempt waits for a publisher. `None` waits until stopped.
    pub listen_timeout: Option<Duration>,

    /// Pause before the next accept attempt after a failed connect or probe, or after a
    /// connection dropped by the decode worker. A publisher that disconnects on its own is
    /// accepted again immediately.
    pub reconnect_delay: Duration,

    /// Pixel layout of the images handed to the image handler.
    pub output_format: OutputFormat,

    /// Drop the connection when the decoder reports an unrecoverable fault.
    pub reconnect_on_decoder_fault: bool,
}

impl ServerSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            buffer_time: DEFAULT_BUFFER_TIME,
            queue_size: DEFAULT_QUEUE_SIZE,
            listen_timeout: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            output_format: OutputFormat::default(),
            reconnect_on_decoder_fault: true,
        }
    }

    /// Checks the settings before any worker is created.
    ///
    /// # Returns
    ///
    /// * `Ok(())` when the settings are usable.
    /// * `Err(Error::InvalidSettings)` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(Error::invalid_settings("url", "must not be empty"));
        }
        if !url.contains("://") {
            return Err(Error::invalid_settings(
                "url",
                format!("'{url}' has no scheme (expected e.g. rtmp://host:port/app)"),
            ));
        }
        if self.queue_size == 0 {
            return Err(Error::invalid_settings("queue_size", "must be greater than zero"));
        }
        if self.buffer_time.is_zero() {
            return Err(Error::invalid_settings("buffer_time", "must be greater than zero"));
        }
        if let Some(timeout) = self.listen_timeout {
            if timeout.is_zero() {
                return Err(Error::invalid_settings(
                    "listen_timeout",
                    "must be greater than zero when set",
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn endpoint(&self) -> Endpoint {
        Endpoint {
            url: self.url.clone(),
            buffer_time: self.buffer_time,
            listen_timeout: self.listen_timeout,
        }
    }
}

/// Chained construction of [`ServerSettings`] and the server itself.
///
/// ```rust,ignore
/// let server = RtmpServer::builder()
///     .url("rtmp://0.0.0.0:1935/live")
///     .queue_size(128)
///     .output_format(OutputFormat::Rgb24)
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ServerBuilder {
    url: Option<String>,
    buffer_time: Option<Duration>,
    queue_size: Option<usize>,
    listen_timeout: Option<Duration>,
    reconnect_delay: Option<Duration>,
    output_format: Option<OutputFormat>,
    reconnect_on_decoder_fault: Option<bool>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn buffer_time(mut self, buffer_time: Duration) -> Self {
        self.buffer_time = Some(buffer_time);
        self
    }

    pub fn queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = Some(queue_size);
        self
    }

    pub fn listen_timeout(mut self, listen_timeout: Duration) -> Self {
        self.listen_timeout = Some(listen_timeout);
        self
    }

    pub fn reconnect_delay(mut self, reconnect_delay: Duration) -> Self {
        self.reconnect_delay = Some(reconnect_delay);
        self
    }

    pub fn output_format(mut self, output_format: OutputFormat) -> Self {
        self.output_format = Some(output_format);
        self
    }

    pub fn reconnect_on_decoder_fault(mut self, enabled: bool) -> Self {
        self.reconnect_on_decoder_fault = Some(enabled);
        self
    }

    /// Assembles and validates the settings.
    pub fn settings(self) -> Result<ServerSettings> {
        let url = self
            .url
            .ok_or_else(|| Error::invalid_settings("url", "is required"))?;

        let mut settings = ServerSettings::new(url);
        if let Some(buffer_time) = self.buffer_time {
            settings.buffer_time = buffer_time;
        }
        if let Some(queue_size) = self.queue_size {
            settings.queue_size = queue_size;
        }
        settings.listen_timeout = self.listen_timeout;
        if let Some(reconnect_delay) = self.reconnect_delay {
            settings.reconnect_delay = reconnect_delay;
        }
        if let Some(output_format) = self.output_format {
            settings.output_format = output_format;
        }
        if let Some(enabled) = self.reconnect_on_decoder_fault {
            settings.reconnect_on_decoder_fault = enabled;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Builds an FFmpeg-backed server from the collected settings.
    pub fn build(self) -> Result<crate::rtmp::rtmp_server::RtmpServer> {
        crate::rtmp::rtmp_server::RtmpServer::new(self.settings()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_defaults() {
        let settings = ServerSettings::new("rtmp://0.0.0.0:1935/live");
        assert_eq!(settings.buffer_time, Duration::from_millis(1000));
        assert_eq!(settings.queue_size, 64);
        assert_eq!(settings.listen_timeout, None);
        assert_eq!(settings.output_format, OutputFormat::Bgr24);
        assert!(settings.reconnect_on_decoder_fault);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let settings = ServerBuilder::new()
            .url("rtmp://127.0.0.1:1936/app")
            .buffer_time(Duration::from_millis(250))
            .queue_size(8)
            .listen_timeout(Duration::from_secs(5))
            .reconnect_delay(Duration::from_millis(20))
            .output_format(OutputFormat::Rgba)
            .reconnect_on_decoder_fault(false)
            .settings()
            .unwrap();
        assert_eq!(settings.url, "rtmp://127.0.0.1:1936/app");
        assert_eq!(settings.buffer_time, Duration::from_millis(250));
        assert_eq!(settings.queue_size, 8);
        assert_eq!(settings.listen_timeout, Some(Duration::from_secs(5)));
        assert_eq!(settings.reconnect_delay, Duration::from_millis(20));
        assert_eq!(settings.output_format, OutputFormat::Rgba);
        assert!(!settings.reconnect_on_decoder_fault);

        let endpoint = settings.endpoint();
        assert_eq!(endpoint.url, settings.url);
        assert_eq!(endpoint.listen_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_missing_url() {
        let err = ServerBuilder::new().queue_size(4).settings().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSettings);
        assert_eq!(err, Error::invalid_settings("url", "is required"));
    }

    #[test]
    fn test_invalid_values() {
        let base = ServerSettings::new("rtmp://0.0.0.0:1935/live");

        let mut settings = base.clone();
        settings.queue_size = 0;
        assert!(matches!(
            settings.validate(),
            Err(Error::InvalidSettings { field: "queue_size", .. })
        ));

        let mut settings = base.clone();
        settings.url = "   ".to_string();
        assert!(matches!(
            settings.validate(),
            Err(Error::InvalidSettings { field: "url", .. })
        ));

        let mut settings = base.clone();
        settings.url = "0.0.0.0:1935".to_string();
        assert!(matches!(
            settings.validate(),
            Err(Error::InvalidSettings { field: "url", .. })
        ));

        let mut settings = base.clone();
        settings.buffer_time = Duration::ZERO;
        assert!(matches!(
            settings.validate(),
            Err(Error::InvalidSettings { field: "buffer_time", .. })
        ));

        let mut settings = base;
        settings.listen_timeout = Some(Duration::ZERO);
        assert!(matches!(
            settings.validate(),
            Err(Error::InvalidSettings { field: "listen_timeout", .. })
        ));
    }
}
