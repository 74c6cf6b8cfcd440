//! Multiplexed output stream framing.
//!
//! Wire format: `[tag: u8][reserved: 3 bytes][len: u32 big-endian][payload: len bytes]`
//!
//! The tag is `1` for stdout and `2` for stderr. Any other tag is carried
//! through as [`StreamKind::Unknown`] so the consumer can skip it.

/// Size of the fixed frame header in bytes.
pub const HEADER_LEN: usize = 8;

/// Which output stream a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Tag `1`.
    Stdout,
    /// Tag `2`.
    Stderr,
    /// Any other tag, including `0` (stdin echo).
    Unknown(u8),
}

impl StreamKind {
    /// Maps a header tag byte to a stream kind.
    #[must_use]
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            1 => Self::Stdout,
            2 => Self::Stderr,
            other => Self::Unknown(other),
        }
    }

    /// Returns the header tag byte.
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Self::Stdout => 1,
            Self::Stderr => 2,
            Self::Unknown(tag) => tag,
        }
    }
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Stream the payload was written to.
    pub kind: StreamKind,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

/// Encodes a payload as a single frame.
///
/// # Panics
/// Panics if `payload` is longer than `u32::MAX` bytes.
#[must_use]
pub fn encode_frame(kind: StreamKind, payload: &[u8]) -> Vec<u8> {
    #[expect(clippy::expect_used, reason = "frame payloads never exceed 4 GiB")]
    let len = u32::try_from(payload.len()).expect("frame payload exceeds u32::MAX");
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.push(kind.tag());
    frame.extend_from_slice(&[0, 0, 0]);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Splits complete frames off the front of `prior ++ new_bytes`.
///
/// Returns the completed frames in arrival order and the bytes of any trailing
/// partial frame, to be passed back as `prior` with the next read.
#[must_use]
pub fn decode_frames(prior: Vec<u8>, new_bytes: &[u8]) -> (Vec<Frame>, Vec<u8>) {
    let mut decoder = FrameDecoder { buffer: prior };
    let frames = decoder.feed(new_bytes);
    (frames, decoder.buffer)
}

/// Streaming frame decoder: accumulates bytes and yields complete frames.
///
/// Reads from the runtime are not frame aligned; a header or payload may be
/// split across any number of chunks.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds bytes into the decoder and returns every frame now complete.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();
        let mut offset = 0;

        while let Some((frame, consumed)) = parse_one(&self.buffer[offset..]) {
            frames.push(frame);
            offset += consumed;
        }

        self.buffer.drain(..offset);
        frames
    }

    /// Number of buffered bytes belonging to an incomplete frame.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Consumes the decoder and returns the unparsed trailing bytes.
    #[must_use]
    pub fn into_remaining(self) -> Vec<u8> {
        self.buffer
    }
}

fn parse_one(buf: &[u8]) -> Option<(Frame, usize)> {
    let header = buf.get(..HEADER_LEN)?;
    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let end = HEADER_LEN.checked_add(len)?;
    let payload = buf.get(HEADER_LEN..end)?;
    Some((
        Frame {
            kind: StreamKind::from_tag(header[0]),
            payload: payload.to_vec(),
        },
        end,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_frame_writes_header_layout() {
        let frame = encode_frame(StreamKind::Stderr, b"oops");
        assert_eq!(&frame[..8], &[2, 0, 0, 0, 0, 0, 0, 4]);
        assert_eq!(&frame[8..], b"oops");
    }

    #[test]
    fn decode_frames_returns_complete_frames_and_remainder() {
        let mut bytes = encode_frame(StreamKind::Stdout, b"hi\n");
        let second = encode_frame(StreamKind::Stderr, b"err");
        bytes.extend_from_slice(&second[..5]);

        let (frames, rest) = decode_frames(Vec::new(), &bytes);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, StreamKind::Stdout);
        assert_eq!(frames[0].payload, b"hi\n");
        assert_eq!(rest, &second[..5]);

        let (frames, rest) = decode_frames(rest, &second[5..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, StreamKind::Stderr);
        assert_eq!(frames[0].payload, b"err");
        assert!(rest.is_empty());
    }

    #[test]
    fn decoder_reassembles_byte_at_a_time() {
        let bytes = encode_frame(StreamKind::Stdout, b"split across reads");
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for b in &bytes {
            frames.extend(decoder.feed(std::slice::from_ref(b)));
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, b"split across reads");
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn zero_length_frame_is_valid() {
        let bytes = encode_frame(StreamKind::Stdout, b"");
        let (frames, rest) = decode_frames(Vec::new(), &bytes);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].payload.is_empty());
        assert!(rest.is_empty());
    }

    #[test]
    fn unknown_tag_is_preserved_not_rejected() {
        let mut bytes = encode_frame(StreamKind::Unknown(7), b"?");
        bytes.extend(encode_frame(StreamKind::Stdout, b"ok"));
        let (frames, _) = decode_frames(Vec::new(), &bytes);
        assert_eq!(frames[0].kind, StreamKind::Unknown(7));
        assert_eq!(frames[1].kind, StreamKind::Stdout);
    }

    #[test]
    fn header_only_waits_for_payload() {
        let bytes = encode_frame(StreamKind::Stdout, b"abc");
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&bytes[..HEADER_LEN]).is_empty());
        assert_eq!(decoder.pending(), HEADER_LEN);
        assert_eq!(decoder.into_remaining().len(), HEADER_LEN);
    }

    proptest::proptest! {
        #[test]
        fn proptest_split_point_does_not_change_frames(
            payloads in proptest::collection::vec(
                (0u8..4, proptest::collection::vec(proptest::prelude::any::<u8>(), 0..64usize)),
                0..16usize,
            ),
            split in proptest::prelude::any::<proptest::sample::Index>(),
        ) {
            let mut stream = Vec::new();
            for (tag, payload) in &payloads {
                stream.extend(encode_frame(StreamKind::from_tag(*tag), payload));
            }
            let at = if stream.is_empty() { 0 } else { split.index(stream.len() + 1) };

            let (whole, whole_rest) = decode_frames(Vec::new(), &stream);
            let (mut first, rest) = decode_frames(Vec::new(), &stream[..at]);
            let (second, final_rest) = decode_frames(rest, &stream[at..]);
            first.extend(second);

            proptest::prop_assert_eq!(whole.len(), payloads.len());
            proptest::prop_assert_eq!(&first, &whole);
            proptest::prop_assert!(whole_rest.is_empty());
            proptest::prop_assert!(final_rest.is_empty());
        }

        #[test]
        fn proptest_decoder_never_panics_on_garbage(
            chunks in proptest::collection::vec(
                proptest::collection::vec(proptest::prelude::any::<u8>(), 0..32usize),
                0..8usize,
            ),
        ) {
            let mut decoder = FrameDecoder::new();
            for chunk in &chunks {
                let _ = decoder.feed(chunk);
            }
        }
    }
}
