//! Fuzz target: multiplexed output stream decoding.
//!
//! Splits arbitrary bytes at an input-chosen point and feeds both halves
//! through the demultiplexer. Decoding must never panic, and the split point
//! must not change what comes out.
#![no_main]

use libfuzzer_sys::fuzz_target;
use shellbox_core::{decode_frames, Demultiplexer};

fuzz_target!(|data: &[u8]| {
    let Some((&split, stream)) = data.split_first() else {
        return;
    };
    let split = usize::from(split).min(stream.len());

    let (whole, whole_rest) = decode_frames(Vec::new(), stream);

    let mut demux = Demultiplexer::new();
    let mut frames = demux.push(&stream[..split]);
    frames.extend(demux.push(&stream[split..]));
    assert_eq!(frames, whole);

    let output = demux.finish(None);
    assert_eq!(output.truncated, whole_rest.len());
    assert_eq!(output.frames, whole.len());
});
