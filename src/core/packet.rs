use bytes::Bytes;

/// A unit of compressed media as delivered by the transport, tagged with the stream it
/// belongs to.
///
/// The payload is a cheaply cloneable [`Bytes`] buffer and may be empty. Ownership moves
/// from the read worker into the packet queue and from there to the decode worker, which
/// drops it after submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    stream_index: usize,
    data: Bytes,
    pts: Option<i64>,
    dts: Option<i64>,
    is_keyframe: bool,
}

impl Packet {
    pub fn new(stream_index: usize, data: impl Into<Bytes>) -> Self {
        Self {
            stream_index,
            data: data.into(),
            pts: None,
            dts: None,
            is_keyframe: false,
        }
    }

    /// Attaches the presentation and decompression timestamps, in stream time-base units.
    pub fn with_timestamps(mut self, pts: Option<i64>, dts: Option<i64>) -> Self {
        self.pts = pts;
        self.dts = dts;
        self
    }

    pub fn with_keyframe(mut self, is_keyframe: bool) -> Self {
        self.is_keyframe = is_keyframe;
        self
    }

    /// The index of the stream this packet belongs to.
    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    pub fn dts(&self) -> Option<i64> {
        self.dts
    }

    pub fn is_keyframe(&self) -> bool {
        self.is_keyframe
    }
}
