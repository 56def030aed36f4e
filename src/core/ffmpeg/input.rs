use std::ffi::CString;
use std::ptr::{null, null_mut};
use std::time::Duration;

use bytes::Bytes;
use ffmpeg_next::format::context::Input;
use ffmpeg_next::media;
use ffmpeg_next::util::error::EAGAIN;
use ffmpeg_sys_next::{
    av_dict_free, av_dict_set, avformat_alloc_context, avformat_close_input,
    avformat_find_stream_info, avformat_open_input, AVDictionary, AVIOInterruptCB, AVERROR_EXIT,
};
use libc::{c_int, c_void};
use log::{debug, info};

use crate::core::backend::{Connection, Endpoint};
use crate::core::cancel::CancellationToken;
use crate::core::ffmpeg::{codec_name, FfmpegDecoder};
use crate::core::image::Resolution;
use crate::core::packet::Packet;
use crate::core::stream_info::{MediaKind, StreamDescriptor};
use crate::error::{av_err2str, Error, Result};

/// Sleep between `av_read_frame` retries when the demuxer reports `EAGAIN`.
const EAGAIN_BACKOFF: Duration = Duration::from_millis(10);

/// A single accepted RTMP connection.
pub struct FfmpegConnection {
    // Must stay declared before `interrupt`: the format context is closed first and its
    // interrupt callback points into the boxed token.
    input: Input,
    interrupt: Box<CancellationToken>,
    url: String,
    stream_info_found: bool,
}

/// Polled by FFmpeg while blocked in accept/read. Non-zero aborts the call with
/// `AVERROR_EXIT`.
unsafe extern "C" fn interrupt_callback(opaque: *mut c_void) -> c_int {
    if opaque.is_null() {
        return 0;
    }
    // SAFETY: opaque points at the CancellationToken boxed inside FfmpegConnection (or
    // inside `listen` while opening), which outlives the format context.
    let token = &*(opaque as *const CancellationToken);
    token.is_cancelled() as c_int
}

fn listen_options(endpoint: &Endpoint) -> Vec<(&'static str, String)> {
    let mut options = vec![
        ("listen", "1".to_string()),
        ("rtmp_buffer", endpoint.buffer_time.as_millis().to_string()),
    ];
    if let Some(timeout) = endpoint.listen_timeout {
        // The RTMP protocol takes whole seconds here.
        let secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
        options.push(("timeout", secs.to_string()));
    }
    options
}

fn to_media_type(kind: MediaKind) -> media::Type {
    match kind {
        MediaKind::Video => media::Type::Video,
        MediaKind::Audio => media::Type::Audio,
        MediaKind::Subtitle => media::Type::Subtitle,
        MediaKind::Data => media::Type::Data,
        MediaKind::Attachment => media::Type::Attachment,
        MediaKind::Unknown => media::Type::Unknown,
    }
}

fn to_media_kind(medium: media::Type) -> MediaKind {
    match medium {
        media::Type::Video => MediaKind::Video,
        media::Type::Audio => MediaKind::Audio,
        media::Type::Subtitle => MediaKind::Subtitle,
        media::Type::Data => MediaKind::Data,
        media::Type::Attachment => MediaKind::Attachment,
        media::Type::Unknown => MediaKind::Unknown,
    }
}

fn describe_stream(stream: &ffmpeg_next::format::stream::Stream) -> StreamDescriptor {
    let parameters = stream.parameters();
    let kind = to_media_kind(parameters.medium());
    let resolution = if kind == MediaKind::Video {
        // SAFETY: parameters wraps the stream's non-null AVCodecParameters, valid while
        // `stream` borrows the format context.
        unsafe {
            let codecpar = &*parameters.as_ptr();
            Resolution::new(codecpar.width.max(0) as u32, codecpar.height.max(0) as u32)
        }
    } else {
        Resolution::default()
    };

    StreamDescriptor {
        index: stream.index(),
        kind,
        codec_name: codec_name(parameters.id()),
        resolution,
    }
}

impl FfmpegConnection {
    /// Waits for a publisher on `endpoint.url` and opens its stream.
    ///
    /// Blocks until a client connects, the listen timeout expires, or `cancel` fires.
    pub(crate) fn listen(endpoint: &Endpoint, cancel: &CancellationToken) -> Result<Self> {
        crate::core::initialize_ffmpeg();

        let connect_failed = |reason: String| Error::ConnectFailed {
            url: endpoint.url.clone(),
            reason,
        };

        // Convert strings before allocating FFmpeg resources so a NUL-byte error
        // cannot leak the AVFormatContext.
        let url = CString::new(endpoint.url.as_str()).map_err(|e| connect_failed(e.to_string()))?;
        let mut options = Vec::new();
        for (key, value) in listen_options(endpoint) {
            let key = CString::new(key).map_err(|e| connect_failed(e.to_string()))?;
            let value = CString::new(value).map_err(|e| connect_failed(e.to_string()))?;
            options.push((key, value));
        }

        let interrupt = Box::new(cancel.clone());

        info!("Waiting for rtmp connection on {}", endpoint.url);

        // SAFETY: avformat_open_input takes ownership of fmt_ctx on success and frees it
        // (setting it to null) on failure; avformat_close_input accepts null. The interrupt
        // opaque pointer stays valid because `interrupt` is moved into the returned
        // connection, which closes the context before dropping the box.
        unsafe {
            let mut fmt_ctx = avformat_alloc_context();
            if fmt_ctx.is_null() {
                return Err(connect_failed("out of memory".to_string()));
            }
            (*fmt_ctx).interrupt_callback = AVIOInterruptCB {
                callback: Some(interrupt_callback),
                opaque: &*interrupt as *const CancellationToken as *mut c_void,
            };

            let mut format_opts: *mut AVDictionary = null_mut();
            for (key, value) in &options {
                av_dict_set(&mut format_opts, key.as_ptr(), value.as_ptr(), 0);
            }

            let ret = avformat_open_input(&mut fmt_ctx, url.as_ptr(), null(), &mut format_opts);

            // Free leftover options not consumed by avformat_open_input.
            av_dict_free(&mut format_opts);

            if ret < 0 {
                avformat_close_input(&mut fmt_ctx);
                if ret == AVERROR_EXIT || cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                return Err(connect_failed(av_err2str(ret)));
            }

            Ok(Self {
                input: Input::wrap(fmt_ctx),
                interrupt,
                url: endpoint.url.clone(),
                stream_info_found: false,
            })
        }
    }

    pub(crate) fn open_decoder(&self, index: usize) -> Result<FfmpegDecoder> {
        let stream = self
            .input
            .stream(index)
            .ok_or_else(|| Error::NoSuitableStream(format!("stream #{index} does not exist")))?;
        FfmpegDecoder::open(&stream)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connection for FfmpegConnection {
    fn probe_streams(&mut self) -> Result<Vec<StreamDescriptor>> {
        if !self.stream_info_found {
            // SAFETY: input owns a valid, opened AVFormatContext.
            let ret = unsafe { avformat_find_stream_info(self.input.as_mut_ptr(), null_mut()) };
            if ret < 0 {
                if ret == AVERROR_EXIT || self.interrupt.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                return Err(Error::NoSuitableStream(format!(
                    "failed to find stream info: {}",
                    av_err2str(ret)
                )));
            }
            self.stream_info_found = true;
        }

        Ok(self
            .input
            .streams()
            .map(|stream| describe_stream(&stream))
            .collect())
    }

    fn best_stream(&self, kind: MediaKind) -> Option<usize> {
        self.input
            .streams()
            .best(to_media_type(kind))
            .map(|stream| stream.index())
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        let mut packet = ffmpeg_next::Packet::empty();
        loop {
            match packet.read(&mut self.input) {
                Ok(()) => break,
                Err(ffmpeg_next::Error::Eof) => return Ok(None),
                Err(ffmpeg_next::Error::Exit) => return Err(Error::Cancelled),
                Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => {
                    if self.interrupt.sleep(EAGAIN_BACKOFF) {
                        return Err(Error::Cancelled);
                    }
                }
                Err(e) => {
                    if self.interrupt.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    return Err(Error::TransportReadFailed(e.to_string()));
                }
            }
        }

        let data = packet
            .data()
            .map(Bytes::copy_from_slice)
            .unwrap_or_default();
        Ok(Some(
            Packet::new(packet.stream(), data)
                .with_timestamps(packet.pts(), packet.dts())
                .with_keyframe(packet.is_key()),
        ))
    }
}

impl Drop for FfmpegConnection {
    fn drop(&mut self) {
        debug!("Closing rtmp connection on {}", self.url);
        // Input closes the format context.
    }
}
