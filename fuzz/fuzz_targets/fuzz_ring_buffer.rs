//! Fuzz target: `RingBuffer` push/pop
//!
//! Interprets the input as a script of pushes and pops against a small
//! fixed buffer and checks every result against a `VecDeque`.
//!
//! cargo fuzz run fuzz_ring_buffer

#![no_main]

use std::collections::VecDeque;

use iotile_ble::RingBuffer;
use libfuzzer_sys::fuzz_target;

const CAPACITY: usize = 48;

fuzz_target!(|data: &[u8]| {
    let mut buf = RingBuffer::new(CAPACITY, false);
    let mut model: VecDeque<u8> = VecDeque::new();

    let mut rest = data;
    while let Some((&op, tail)) = rest.split_first() {
        let len = usize::from(op & 0x3F);
        if op & 0x80 == 0 {
            let take = len.min(tail.len());
            let (chunk, tail) = tail.split_at(take);
            let fits = model.len() + chunk.len() <= CAPACITY;
            assert_eq!(buf.push(chunk).is_ok(), fits);
            if fits {
                model.extend(chunk);
            }
            rest = tail;
        } else {
            match buf.pop(len) {
                Ok(out) => {
                    let expected: Vec<u8> = model.drain(..len).collect();
                    assert_eq!(out, expected);
                }
                Err(_) => assert!(len > model.len()),
            }
            rest = tail;
        }
        assert_eq!(buf.len(), model.len());
        assert_eq!(buf.capacity(), CAPACITY);
    }
});
