//! Property-based tests for the ring buffer and pipe
//!
//! These tests verify that:
//! 1. Bytes read back equal the bytes written, in order, across wrap-arounds
//! 2. Resizing never changes what a full read returns
//! 3. Resizing below the buffered byte count always fails
//! 4. A pipe reports end-of-stream only after close + drain

use proptest::prelude::*;

use datapub_pipe::{Pipe, PipeRead, RingBuffer};

fn drain(ring: &mut RingBuffer) -> Vec<u8> {
    let mut out = vec![0u8; ring.len()];
    let n = ring.read(&mut out);
    out.truncate(n);
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn ring_conserves_bytes(
        capacity in 1usize..64,
        ops in prop::collection::vec((prop::collection::vec(any::<u8>(), 0..48), 0usize..64), 1..40),
    ) {
        let mut ring = RingBuffer::new(capacity);
        let mut written = Vec::new();
        let mut read = Vec::new();

        for (chunk, read_len) in ops {
            let n = ring.write(&chunk);
            prop_assert!(n <= chunk.len());
            written.extend_from_slice(&chunk[..n]);
            prop_assert!(ring.len() <= ring.capacity());

            let mut out = vec![0u8; read_len];
            let m = ring.read(&mut out);
            read.extend_from_slice(&out[..m]);
        }
        read.extend(drain(&mut ring));

        prop_assert_eq!(read, written);
        prop_assert!(ring.is_empty());
    }

    #[test]
    fn resize_preserves_content(
        capacity in 1usize..32,
        prefix in prop::collection::vec(any::<u8>(), 0..32),
        consumed in 0usize..32,
        extra in 0usize..64,
    ) {
        let mut ring = RingBuffer::new(capacity);
        ring.write(&prefix);
        let mut skip = vec![0u8; consumed];
        ring.read(&mut skip);
        ring.write(&prefix);

        let mut copy = ring.copy();
        let expected = drain(&mut copy);

        ring.resize(ring.len() + extra).unwrap();
        prop_assert_eq!(drain(&mut ring), expected);
    }

    #[test]
    fn resize_rejects_shrink(
        data in prop::collection::vec(any::<u8>(), 1..32),
        short_by in 1usize..32,
    ) {
        let mut ring = RingBuffer::new(32);
        ring.write(&data);
        let target = data.len().saturating_sub(short_by);
        prop_assume!(target < data.len());

        prop_assert!(ring.resize(target).is_err());
        prop_assert_eq!(drain(&mut ring), data);
    }

    #[test]
    fn pipe_eof_only_after_close_and_drain(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..16), 0..10),
        read_len in 1usize..16,
    ) {
        let mut pipe = Pipe::new(4);
        let mut expected = Vec::new();
        for chunk in &chunks {
            pipe.receive(chunk).unwrap();
            expected.extend_from_slice(chunk);
        }

        let mut got = Vec::new();
        let mut out = vec![0u8; read_len];
        loop {
            match pipe.read(&mut out).unwrap() {
                PipeRead::Data(n) => got.extend_from_slice(&out[..n]),
                PipeRead::Pending => break,
                PipeRead::EndOfStream => prop_assert!(false, "EOF before close"),
            }
        }
        prop_assert_eq!(&got, &expected);

        pipe.close_write();
        for _ in 0..3 {
            prop_assert_eq!(pipe.read(&mut out).unwrap(), PipeRead::EndOfStream);
        }
    }
}
