// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Writer thread tests: end-to-end file contents, per-handle ordering,
//! backpressure, slot reuse and recording through the offload sink.
//!
//! Run with: `cargo test`

use std::time::{Duration, Instant};

use bytes::Bytes;
use tempfile::TempDir;

use camring::capture::{CapturedFrame, FrameBuf};
use camring::extract::{extract_range, probe_index_file, ExtractRequest};
use camring::recorder::{CaptureSession, Recorder};
use camring::storage::format::{FrameDescriptor, TimeVal};
use camring::storage::rotate::Rotator;
use camring::storage::writer::{WriteThread, WthSink, MAX_HANDLES};

fn block(tag: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| tag.wrapping_add(i as u8)).collect()
}

#[test]
fn test_writer_thread_end_to_end() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("stream.bin");

    let wth = WriteThread::spawn(8 << 20).expect("spawn writer");
    let client = wth.client();

    let handle = client.open(&path).expect("open slot");
    let a = block(1, 1 << 20);
    let b = block(2, 1 << 20);
    let c = block(3, 1 << 20);
    assert_eq!(client.write(&handle, &a), a.len());
    assert_eq!(client.write(&handle, &b), b.len());
    assert_eq!(client.write(&handle, &c), c.len());

    // Close while writes may still be pending; the slot is released only
    // once everything reached the file.
    client.close(handle);
    wth.shutdown();

    let contents = std::fs::read(&path).expect("read back");
    assert_eq!(contents.len(), 3 << 20);
    assert_eq!(&contents[..1 << 20], &a[..]);
    assert_eq!(&contents[1 << 20..2 << 20], &b[..]);
    assert_eq!(&contents[2 << 20..], &c[..]);
}

#[test]
fn test_writer_per_handle_ordering() {
    let dir = TempDir::new().expect("tempdir");
    let path_a = dir.path().join("a.bin");
    let path_b = dir.path().join("b.bin");

    let wth = WriteThread::spawn(1 << 20).expect("spawn writer");
    let client = wth.client();

    let ha = client.open(&path_a).expect("open a");
    let hb = client.open(&path_b).expect("open b");

    // Interleave records across the two handles.
    let a1 = block(10, 4096);
    let b1 = block(20, 2048);
    let a2 = block(30, 1024);
    let b2 = block(40, 512);
    assert_eq!(client.write(&ha, &a1), a1.len());
    assert_eq!(client.write(&hb, &b1), b1.len());
    assert_eq!(client.write(&ha, &a2), a2.len());
    assert_eq!(client.write(&hb, &b2), b2.len());

    client.close(ha);
    client.close(hb);
    wth.shutdown();

    let got_a = std::fs::read(&path_a).expect("read a");
    let got_b = std::fs::read(&path_b).expect("read b");
    let mut want_a = a1;
    want_a.extend_from_slice(&a2);
    let mut want_b = b1;
    want_b.extend_from_slice(&b2);
    assert_eq!(got_a, want_a);
    assert_eq!(got_b, want_b);
}

#[test]
fn test_writer_backpressure_refuses_oversized_record() {
    let dir = TempDir::new().expect("tempdir");
    let wth = WriteThread::spawn(1024).expect("spawn writer");
    let client = wth.client();

    let handle = client.open(&dir.path().join("small.bin")).expect("open");

    // Header plus payload can never fit: refused whole, nothing enqueued.
    assert_eq!(client.write(&handle, &block(1, 2000)), 0);

    // A fitting record still goes through afterwards.
    let ok = block(2, 500);
    assert_eq!(client.write(&handle, &ok), ok.len());

    client.close(handle);
    wth.shutdown();

    let contents = std::fs::read(dir.path().join("small.bin")).expect("read");
    assert_eq!(contents, ok);
}

#[test]
fn test_writer_slot_exhaustion_and_reuse() {
    let dir = TempDir::new().expect("tempdir");
    let wth = WriteThread::spawn(1 << 20).expect("spawn writer");
    let client = wth.client();

    let mut handles = Vec::new();
    for i in 0..MAX_HANDLES {
        let h = client
            .open(&dir.path().join(format!("f{i}.bin")))
            .expect("open slot");
        assert_eq!(client.write(&h, &block(i as u8, 128)), 128);
        handles.push(h);
    }
    // Table is full now.
    assert!(client.open(&dir.path().join("overflow.bin")).is_err());

    for h in handles {
        client.close(h);
    }

    // Slots come back once their bytes are flushed.
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut reopened = Vec::new();
    loop {
        match client.open(&dir.path().join(format!("r{}.bin", reopened.len()))) {
            Ok(h) => {
                reopened.push(h);
                if reopened.len() == MAX_HANDLES {
                    break;
                }
            }
            Err(_) => {
                assert!(
                    Instant::now() < deadline,
                    "slots were not released after close"
                );
                std::thread::sleep(Duration::from_millis(20));
            }
        }
    }
    for h in reopened {
        client.close(h);
    }
    wth.shutdown();

    for i in 0..MAX_HANDLES {
        let contents = std::fs::read(dir.path().join(format!("f{i}.bin"))).expect("read");
        assert_eq!(contents, block(i as u8, 128));
    }
}

#[test]
fn test_writer_failed_open_discards_only_that_handle() {
    let dir = TempDir::new().expect("tempdir");
    let wth = WriteThread::spawn(1 << 20).expect("spawn writer");
    let client = wth.client();

    // Reservation succeeds; the open itself happens on the thread and
    // fails because the parent directory does not exist.
    let bad = client
        .open(&dir.path().join("missing/sub/dir.bin"))
        .expect("reserve slot");
    let good = client.open(&dir.path().join("good.bin")).expect("open good");

    assert_eq!(client.write(&bad, &block(1, 4096)), 4096);
    let payload = block(2, 4096);
    assert_eq!(client.write(&good, &payload), payload.len());

    client.close(bad);
    client.close(good);
    wth.shutdown();

    // The failed handle's bytes vanished without breaking the framing of
    // the good handle's record.
    assert!(!dir.path().join("missing").exists());
    let contents = std::fs::read(dir.path().join("good.bin")).expect("read good");
    assert_eq!(contents, payload);
}

#[test]
fn test_recording_through_writer_thread() {
    let dir = TempDir::new().expect("tempdir");
    let wth = WriteThread::spawn(4 << 20).expect("spawn writer");

    let session = CaptureSession::at(
        TimeVal::from_secs(1_700_000_000),
        TimeVal::from_secs(1_000),
    );
    let desc = FrameDescriptor { fps: 10, width: 640, height: 480 };
    let rotator = Rotator::new(dir.path(), 1 << 20, 8);
    let mut recorder = Recorder::new(WthSink::new(wth.client()), rotator, desc, session);

    for i in 0..30u64 {
        let data = block(i as u8, 256);
        let frame = CapturedFrame {
            buf: FrameBuf { index: 0, bytes_used: data.len(), data: Bytes::from(data) },
            timestamp: TimeVal::new(1_000 + i / 10, (i % 10) as u32 * 100_000),
        };
        recorder.handle_frame(&frame).expect("frame through writer");
    }
    let stats = recorder.finish();
    assert_eq!(stats.frames, 30);
    wth.shutdown();

    let probe = probe_index_file(&dir.path().join("idx_0000000000")).expect("probe");
    assert_eq!(probe.frame_count, 30);
    assert_eq!(probe.header.desc.fps, 10);

    let req = ExtractRequest {
        dir: dir.path().to_path_buf(),
        start_utc: 1_700_000_000 - 1_000 + 1_000,
        duration: 3,
        normalize: false,
    };
    let mut out: Vec<u8> = Vec::new();
    let summary = extract_range(&req, Some(&mut out)).expect("extract");
    assert_eq!(summary.frames, 30);
    assert_eq!(&out[..256], &block(0, 256)[..]);
    assert_eq!(&out[29 * 256..], &block(29, 256)[..]);
}
