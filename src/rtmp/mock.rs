//! Scripted in-memory backend for driving the pipeline without FFmpeg.
//!
//! A test queues up what each `open` call should do ([`MockOpen`]), what each connection
//! yields when read ([`MockRead`]), and how the decoder reacts to each packet
//! ([`MockPlan`], keyed by the packet's first byte). Every handle the backend hands out is
//! counted in [`MockStats`] so tests can assert that nothing is left open.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::backend::{
    Connection, Converter, DecodedFrame, Decoder, DecoderDescription, DecoderFault, Endpoint,
    MediaBackend,
};
use crate::core::cancel::CancellationToken;
use crate::core::image::{FrameLayout, Image, OutputFormat, Resolution};
use crate::core::packet::Packet;
use crate::core::stream_info::{MediaKind, StreamDescriptor};
use crate::error::{Error, Result};

const MOCK_YUV420P: i32 = 0;
const BLOCK_POLL: Duration = Duration::from_millis(5);
const SUPPORTED_CODECS: [&str; 3] = ["h264", "hevc", "flv1"];

pub(crate) enum MockOpen {
    Fail(String),
    Connect(MockConnection),
    /// Blocks until the open is cancelled.
    Block,
}

pub(crate) enum MockRead {
    Packet(Packet),
    Fail(String),
    End,
}

/// How the decoder reacts to a packet.
#[derive(Debug, Clone)]
pub(crate) enum MockPlan {
    /// Emits these frames, in order, after the packet is submitted. May be empty.
    Frames(Vec<MockFrame>),
    FailSubmit,
    FailDecode,
    /// Emits one frame that the converter refuses.
    BadFrame,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MockFrame {
    pub(crate) label: u8,
    pub(crate) resolution: Resolution,
    pub(crate) convertible: bool,
}

impl MockFrame {
    pub(crate) fn new(label: u8, resolution: Resolution) -> Self {
        Self {
            label,
            resolution,
            convertible: true,
        }
    }
}

impl DecodedFrame for MockFrame {
    fn layout(&self) -> FrameLayout {
        FrameLayout {
            pixel_format: MOCK_YUV420P,
            resolution: self.resolution,
        }
    }
}

/// Live and cumulative handle counts.
#[derive(Debug, Default)]
pub(crate) struct MockStats {
    pub(crate) open_attempts: AtomicUsize,
    pub(crate) live_connections: AtomicUsize,
    pub(crate) live_decoders: AtomicUsize,
    pub(crate) live_converters: AtomicUsize,
    pub(crate) converter_builds: AtomicUsize,
    pub(crate) packets_submitted: AtomicUsize,
}

impl MockStats {
    pub(crate) fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub(crate) fn all_released(&self) -> bool {
        Self::get(&self.live_connections) == 0
            && Self::get(&self.live_decoders) == 0
            && Self::get(&self.live_converters) == 0
    }
}

#[derive(Default)]
pub(crate) struct MockBackend {
    opens: Mutex<VecDeque<MockOpen>>,
    stats: Arc<MockStats>,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script_open(&self, open: MockOpen) {
        self.opens.lock().unwrap().push_back(open);
    }

    pub(crate) fn stats(&self) -> Arc<MockStats> {
        self.stats.clone()
    }
}

fn block_until_cancelled(cancel: &CancellationToken) -> Error {
    while !cancel.sleep(BLOCK_POLL) {}
    Error::Cancelled
}

impl MediaBackend for MockBackend {
    type Frame = MockFrame;
    type Connection = MockConnection;
    type Decoder = MockDecoder;
    type Converter = MockConverter;

    fn open(&self, endpoint: &Endpoint, cancel: &CancellationToken) -> Result<Self::Connection> {
        self.stats.open_attempts.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let next = self.opens.lock().unwrap().pop_front();
        match next {
            Some(MockOpen::Fail(reason)) => Err(Error::ConnectFailed {
                url: endpoint.url.clone(),
                reason,
            }),
            Some(MockOpen::Connect(mut connection)) => {
                self.stats.live_connections.fetch_add(1, Ordering::SeqCst);
                connection.stats = Some(self.stats.clone());
                connection.cancel = cancel.clone();
                Ok(connection)
            }
            Some(MockOpen::Block) | None => Err(block_until_cancelled(cancel)),
        }
    }

    fn open_decoder(
        &self,
        connection: &Self::Connection,
        stream: &StreamDescriptor,
    ) -> Result<Self::Decoder> {
        if !SUPPORTED_CODECS.contains(&stream.codec_name.as_str()) {
            return Err(Error::NoSuitableStream(format!(
                "no decoder for codec {}",
                stream.codec_name
            )));
        }
        if connection.decoder_open_failure {
            return Err(Error::DecoderOpenFailed("Invalid argument".to_string()));
        }
        self.stats.live_decoders.fetch_add(1, Ordering::SeqCst);
        Ok(MockDecoder {
            codec: stream.codec_name.clone(),
            resolution: connection.decoder_resolution,
            plans: connection.plans.clone(),
            pending: VecDeque::new(),
            stats: self.stats.clone(),
        })
    }

    fn build_converter(&self, frame: &Self::Frame, target: OutputFormat) -> Result<Self::Converter> {
        self.stats.converter_builds.fetch_add(1, Ordering::SeqCst);
        self.stats.live_converters.fetch_add(1, Ordering::SeqCst);
        Ok(MockConverter {
            layout: frame.layout(),
            target,
            stats: self.stats.clone(),
        })
    }
}

pub(crate) struct MockConnection {
    streams: Vec<StreamDescriptor>,
    codec: String,
    decoder_resolution: Resolution,
    decoder_open_failure: bool,
    plans: HashMap<u8, MockPlan>,
    reads: VecDeque<MockRead>,
    hold_open: bool,
    block_in_probe: bool,
    cancel: CancellationToken,
    stats: Option<Arc<MockStats>>,
}

impl MockConnection {
    pub(crate) fn new() -> Self {
        Self {
            streams: Vec::new(),
            codec: "h264".to_string(),
            decoder_resolution: Resolution::new(640, 480),
            decoder_open_failure: false,
            plans: HashMap::new(),
            reads: VecDeque::new(),
            hold_open: false,
            block_in_probe: false,
            cancel: CancellationToken::new(),
            stats: None,
        }
    }

    pub(crate) fn with_video_stream(mut self, index: usize) -> Self {
        self.streams.push(StreamDescriptor {
            index,
            kind: MediaKind::Video,
            codec_name: String::new(),
            resolution: self.decoder_resolution,
        });
        self
    }

    pub(crate) fn with_audio_stream(mut self, index: usize) -> Self {
        self.streams.push(StreamDescriptor {
            index,
            kind: MediaKind::Audio,
            codec_name: "aac".to_string(),
            resolution: Resolution::default(),
        });
        self
    }

    pub(crate) fn with_codec(mut self, codec: &str) -> Self {
        self.codec = codec.to_string();
        self
    }

    pub(crate) fn with_decoder_resolution(mut self, resolution: Resolution) -> Self {
        self.decoder_resolution = resolution;
        self
    }

    pub(crate) fn with_decoder_open_failure(mut self) -> Self {
        self.decoder_open_failure = true;
        self
    }

    /// Sets how the decoder reacts to packets whose first byte is `id`.
    pub(crate) fn with_plan(mut self, id: u8, plan: MockPlan) -> Self {
        self.plans.insert(id, plan);
        self
    }

    /// Queues one single-byte packet per id on `stream_index`.
    pub(crate) fn with_packets(mut self, stream_index: usize, ids: impl IntoIterator<Item = u8>) -> Self {
        for id in ids {
            self.reads
                .push_back(MockRead::Packet(Packet::new(stream_index, vec![id])));
        }
        self
    }

    pub(crate) fn with_read(mut self, read: MockRead) -> Self {
        self.reads.push_back(read);
        self
    }

    /// Keeps the connection open (blocking reads) once the script is exhausted instead of
    /// reporting end of stream.
    pub(crate) fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Stream discovery never completes; it blocks until the connection is cancelled.
    pub(crate) fn block_in_probe(mut self) -> Self {
        self.block_in_probe = true;
        self
    }
}

impl Connection for MockConnection {
    fn probe_streams(&mut self) -> Result<Vec<StreamDescriptor>> {
        if self.block_in_probe {
            return Err(block_until_cancelled(&self.cancel));
        }
        Ok(self
            .streams
            .iter()
            .map(|stream| {
                let mut stream = stream.clone();
                if stream.is_video() {
                    stream.codec_name = self.codec.clone();
                }
                stream
            })
            .collect())
    }

    fn best_stream(&self, kind: MediaKind) -> Option<usize> {
        self.streams
            .iter()
            .find(|stream| stream.kind == kind)
            .map(|stream| stream.index)
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match self.reads.pop_front() {
            Some(MockRead::Packet(packet)) => Ok(Some(packet)),
            Some(MockRead::Fail(reason)) => Err(Error::TransportReadFailed(reason)),
            Some(MockRead::End) => Ok(None),
            None if self.hold_open => Err(block_until_cancelled(&self.cancel)),
            None => Ok(None),
        }
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        if let Some(stats) = &self.stats {
            stats.live_connections.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

pub(crate) struct MockDecoder {
    codec: String,
    resolution: Resolution,
    plans: HashMap<u8, MockPlan>,
    pending: VecDeque<std::result::Result<MockFrame, DecoderFault>>,
    stats: Arc<MockStats>,
}

impl Decoder for MockDecoder {
    type Frame = MockFrame;

    fn describe(&self) -> DecoderDescription {
        DecoderDescription {
            codec: self.codec.clone(),
            pixel_format: "yuv420p".to_string(),
            resolution: self.resolution,
        }
    }

    fn submit(&mut self, packet: &Packet) -> std::result::Result<(), DecoderFault> {
        let Some(&id) = packet.data().first() else {
            return Ok(());
        };
        self.stats.packets_submitted.fetch_add(1, Ordering::SeqCst);

        let plan = self
            .plans
            .get(&id)
            .cloned()
            .unwrap_or_else(|| MockPlan::Frames(vec![MockFrame::new(id, self.resolution)]));
        match plan {
            MockPlan::Frames(frames) => self.pending.extend(frames.into_iter().map(Ok)),
            MockPlan::FailSubmit => {
                return Err(DecoderFault::Recoverable("Invalid data found".to_string()))
            }
            MockPlan::FailDecode => self
                .pending
                .push_back(Err(DecoderFault::Recoverable("Corrupt frame".to_string()))),
            MockPlan::BadFrame => self.pending.push_back(Ok(MockFrame {
                label: id,
                resolution: self.resolution,
                convertible: false,
            })),
            MockPlan::Fatal => {
                return Err(DecoderFault::Unrecoverable("Internal bug".to_string()))
            }
        }
        Ok(())
    }

    fn receive_frame(&mut self) -> std::result::Result<Option<Self::Frame>, DecoderFault> {
        match self.pending.pop_front() {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(fault)) => Err(fault),
            None => Ok(None),
        }
    }
}

impl Drop for MockDecoder {
    fn drop(&mut self) {
        self.stats.live_decoders.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Produces one-byte images holding the source frame's label.
pub(crate) struct MockConverter {
    layout: FrameLayout,
    target: OutputFormat,
    stats: Arc<MockStats>,
}

impl Converter for MockConverter {
    type Frame = MockFrame;

    fn layout(&self) -> FrameLayout {
        self.layout
    }

    fn convert(&mut self, frame: &Self::Frame, sequence: u64) -> Result<Image> {
        if !frame.convertible {
            return Err(Error::ConversionFailed("unsupported frame".to_string()));
        }
        Ok(Image::new(frame.resolution, self.target, sequence, vec![frame.label]))
    }
}

impl Drop for MockConverter {
    fn drop(&mut self) {
        self.stats.live_converters.fetch_sub(1, Ordering::SeqCst);
    }
}
