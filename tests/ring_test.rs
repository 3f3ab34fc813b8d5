// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Byte ring tests: the self-test trace, wrap-around, FIFO order and
//! accounting invariants.
//!
//! Run with: `cargo test`

use camring::storage::ring::ByteRing;

/// Distinct repeating pattern per buffer, so misordered bytes show up.
fn pattern(tag: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| tag.wrapping_add(i as u8)).collect()
}

#[test]
fn test_save_discard_trace() {
    let mut ring = ByteRing::with_capacity(100).expect("alloc ring");
    assert!(ring.is_empty());

    let p1 = pattern(1, 50);
    let p2 = pattern(2, 50);
    let p3 = pattern(3, 49);

    assert_eq!(ring.save(&p1), 50);
    assert_eq!(ring.save(&p2), 50);
    assert_eq!(ring.free_space(), 0);

    assert_eq!(ring.discard(30), 30);
    assert_eq!(ring.discard(20), 20);
    assert_eq!(ring.free_space(), 50);

    // 49 fits, then only a single byte remains.
    assert_eq!(ring.save(&p3), 49);
    assert_eq!(ring.save(&p1[..2]), 0);
    assert_eq!(ring.save(&p1[..1]), 1);
    assert_eq!(ring.free_space(), 0);

    // Over-discard empties but never exceeds the stored amount.
    assert_eq!(ring.discard(200), 100);
    assert!(ring.is_empty());

    // Wrapped save lands intact.
    let p4 = pattern(4, 65);
    assert_eq!(ring.save(&p4), 65);
    let mut out = vec![0u8; 65];
    assert_eq!(ring.get(&mut out), 65);
    assert_eq!(out, p4);
}

#[test]
fn test_wrap_and_fifo_order() {
    let mut ring = ByteRing::with_capacity(8).expect("alloc ring");

    assert_eq!(ring.save(&pattern(1, 6)), 6);
    assert_eq!(ring.save(&pattern(2, 4)), 0, "4 bytes must not fit in 2 free");
    assert_eq!(ring.discard(4), 4);

    // This save crosses the end of the backing buffer.
    assert_eq!(ring.save(&pattern(2, 4)), 4);
    assert_eq!(ring.occupied_space(), 6);

    let mut out = vec![0u8; 6];
    assert_eq!(ring.get(&mut out), 6);
    let mut expected = pattern(1, 6)[4..].to_vec();
    expected.extend_from_slice(&pattern(2, 4));
    assert_eq!(out, expected, "bytes must come out in the order they went in");
}

#[test]
fn test_get_is_a_peek() {
    let mut ring = ByteRing::with_capacity(16).expect("alloc ring");
    let p = pattern(7, 10);
    assert_eq!(ring.save(&p), 10);

    let mut out1 = vec![0u8; 10];
    let mut out2 = vec![0u8; 10];
    assert_eq!(ring.get(&mut out1), 10);
    assert_eq!(ring.get(&mut out2), 10);
    assert_eq!(out1, out2, "get must not consume");
    assert_eq!(ring.occupied_space(), 10);
}

#[test]
fn test_empty_ring_operations() {
    let mut ring = ByteRing::with_capacity(4).expect("alloc ring");
    let mut out = vec![0u8; 4];
    assert_eq!(ring.get(&mut out), 0);
    assert_eq!(ring.discard(4), 0);
    assert!(ring.is_empty());
}

#[test]
fn test_save_is_atomic() {
    let mut ring = ByteRing::with_capacity(10).expect("alloc ring");
    let p = pattern(9, 8);
    assert_eq!(ring.save(&p), 8);

    // A refused save must leave no partial bytes behind.
    assert_eq!(ring.save(&pattern(1, 5)), 0);
    assert_eq!(ring.occupied_space(), 8);
    let mut out = vec![0u8; 10];
    assert_eq!(ring.get(&mut out), 8);
    assert_eq!(&out[..8], &p[..]);
}

#[test]
fn test_accounting_invariant_under_interleaving() {
    let mut ring = ByteRing::with_capacity(64).expect("alloc ring");
    let mut model: std::collections::VecDeque<u8> = std::collections::VecDeque::new();

    // Deterministic pseudo-random op sequence against a queue model.
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };

    for step in 0..2000 {
        assert_eq!(
            ring.free_space() + ring.occupied_space(),
            64,
            "accounting broke at step {step}"
        );

        let r = next();
        let len = (r % 17) as usize;
        if r % 3 == 0 {
            let n = ring.discard(len);
            assert_eq!(n, len.min(model.len()));
            for _ in 0..n {
                model.pop_front();
            }
        } else {
            let data = pattern((r >> 8) as u8, len);
            let n = ring.save(&data);
            if model.len() + len <= 64 {
                assert_eq!(n, len);
                model.extend(&data);
            } else {
                assert_eq!(n, 0, "save must refuse when it does not fit");
            }
        }

        let mut out = vec![0u8; model.len()];
        assert_eq!(ring.get(&mut out), model.len());
        let expect: Vec<u8> = model.iter().copied().collect();
        assert_eq!(out, expect, "FIFO order broke at step {step}");
    }
}

#[test]
fn test_save_then_discard_restores_state() {
    let mut ring = ByteRing::with_capacity(32).expect("alloc ring");
    assert_eq!(ring.save(&pattern(1, 10)), 10);
    ring.discard(3);

    let free_before = ring.free_space();
    let mut before = vec![0u8; ring.occupied_space()];
    ring.get(&mut before);

    assert_eq!(ring.save(&pattern(5, 12)), 12);
    assert_eq!(ring.occupied_space(), before.len() + 12);
    // Consuming what was there before leaves exactly the new bytes.
    ring.discard(before.len());
    let mut after = vec![0u8; 12];
    assert_eq!(ring.get(&mut after), 12);
    assert_eq!(after, pattern(5, 12));
    assert_eq!(ring.free_space(), free_before + before.len() - 12);
}
