use log::{debug, info};

use crate::core::backend::{Connection, Decoder, MediaBackend};
use crate::core::stream_info::{MediaKind, StreamInfo};
use crate::error::{Error, Result};

/// Outcome of probing a freshly accepted connection.
pub(crate) struct Probe<D> {
    pub(crate) info: StreamInfo,
    pub(crate) decoder: D,
}

/// Discovers the streams of `connection`, selects the best video stream and opens its
/// decoder.
///
/// # Returns
///
/// * `Ok(Probe)` with the published stream snapshot and an opened decoder.
/// * `Err(Error::NoSuitableStream)` when there is no video stream, no decoder for its
///   codec, or the decoder reports a non-positive frame size.
/// * `Err(Error::DecoderOpenFailed)` when the decoder exists but cannot be opened.
pub(crate) fn probe<B: MediaBackend>(
    backend: &B,
    connection: &mut B::Connection,
) -> Result<Probe<B::Decoder>> {
    let streams = connection.probe_streams()?;
    for stream in &streams {
        debug!("Found stream {stream}");
    }

    let index = connection
        .best_stream(MediaKind::Video)
        .ok_or_else(|| Error::NoSuitableStream(format!("none of {} streams is video", streams.len())))?;
    let stream = streams
        .iter()
        .find(|stream| stream.index == index)
        .ok_or_else(|| Error::NoSuitableStream(format!("stream #{index} is not listed")))?;
    if !stream.is_video() {
        return Err(Error::NoSuitableStream(format!(
            "stream #{index} is {}, not video",
            stream.kind.label()
        )));
    }

    let decoder = backend.open_decoder(connection, stream)?;
    let description = decoder.describe();
    if !description.resolution.is_valid() {
        return Err(Error::NoSuitableStream(format!(
            "decoder reports invalid frame size {}",
            description.resolution
        )));
    }

    let info = StreamInfo {
        codec: description.codec,
        pixel_format: description.pixel_format,
        resolution: description.resolution,
        stream_index: index,
    };
    info!("Selected video stream: {info}");

    Ok(Probe { info, decoder })
}
