// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Wire format tests: roundtrips, endianness, magic and bounds validation.

use camring::error::CamringError;
use camring::storage::format::{
    FrameDescriptor, FrameHeader, FrameIndexRecord, TimeVal, FRAME_HEADER_SIZE,
    FRAME_INDEX_SIZE,
};

fn sample_header() -> FrameHeader {
    FrameHeader {
        seq: 7,
        seq_limit: 32,
        frm_name: "frm_0000000007".into(),
        cap_utc: TimeVal::new(1_699_999_000, 250_000),
        cap_local: TimeVal::new(1_000, 750_000),
        first_frame: TimeVal::new(1_000, 900_000),
        desc: FrameDescriptor { fps: 30, width: 1280, height: 720 },
    }
}

#[test]
fn test_header_roundtrip() {
    let header = sample_header();
    let encoded = header.encode();
    assert_eq!(encoded.len(), FRAME_HEADER_SIZE);
    let decoded = FrameHeader::decode(&encoded).expect("decode header");
    assert_eq!(decoded, header);
}

#[test]
fn test_header_magic_rejected() {
    let mut encoded = sample_header().encode();
    encoded[0] = b'X';
    match FrameHeader::decode(&encoded) {
        Err(CamringError::Corrupt(_)) => {}
        other => panic!("expected corruption error, got {other:?}"),
    }
}

#[test]
fn test_index_roundtrip() {
    let rec = FrameIndexRecord {
        tv: TimeVal::new(12_345, 999_999),
        offset: 0x0102_0304_0506_0708,
        size: 0xA0B0_C0D0,
        seq: 42,
    };
    let encoded = rec.encode();
    assert_eq!(encoded.len(), FRAME_INDEX_SIZE);
    let decoded = FrameIndexRecord::decode(&encoded).expect("decode record");
    assert_eq!(decoded, rec);
}

#[test]
fn test_index_is_big_endian_on_disk() {
    let rec = FrameIndexRecord {
        tv: TimeVal::new(0x0102, 0x0304),
        offset: 0x1122_3344_5566_7788,
        size: 0xAABB_CCDD,
        seq: 1,
    };
    let encoded = rec.encode();
    assert_eq!(&encoded[0..2], b"AZ");
    // tv.sec, most significant byte first
    assert_eq!(&encoded[2..10], &[0, 0, 0, 0, 0, 0, 0x01, 0x02]);
    assert_eq!(&encoded[10..14], &[0, 0, 0x03, 0x04]);
    assert_eq!(
        &encoded[14..22],
        &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]
    );
    assert_eq!(&encoded[22..26], &[0xAA, 0xBB, 0xCC, 0xDD]);
}

#[test]
fn test_index_magic_rejected() {
    let mut encoded = FrameIndexRecord {
        tv: TimeVal::from_secs(1),
        offset: 0,
        size: 1,
        seq: 0,
    }
    .encode();
    encoded[1] = b'!';
    assert!(matches!(
        FrameIndexRecord::decode(&encoded),
        Err(CamringError::Corrupt(_))
    ));
}

#[test]
fn test_index_microseconds_bound() {
    let rec = FrameIndexRecord {
        tv: TimeVal::from_secs(5),
        offset: 0,
        size: 1,
        seq: 0,
    };
    let mut encoded = rec.encode();
    // Force an out-of-range microsecond field behind the encoder's back.
    encoded[10..14].copy_from_slice(&1_000_000u32.to_be_bytes());
    assert!(matches!(
        FrameIndexRecord::decode(&encoded),
        Err(CamringError::Corrupt(_))
    ));

    // decode_unchecked still reports the claimed value.
    let raw = FrameIndexRecord::decode_unchecked(&encoded);
    assert_eq!(raw.tv.usec, 1_000_000);
}

#[test]
fn test_header_name_padding() {
    let mut header = sample_header();
    header.frm_name = "frm_0000000001".into();
    let encoded = header.encode();
    // 14 name bytes, then NUL padding up to the 16-byte field.
    assert_eq!(&encoded[12..26], b"frm_0000000001");
    assert_eq!(&encoded[26..28], &[0, 0]);
    let decoded = FrameHeader::decode(&encoded).expect("decode");
    assert_eq!(decoded.frm_name, "frm_0000000001");
}

#[test]
fn test_timeval_arithmetic() {
    let a = TimeVal::new(10, 600_000);
    let b = TimeVal::new(2, 700_000);

    let sum = a.add(b);
    assert_eq!(sum, TimeVal::new(13, 300_000));

    let diff = a.saturating_sub(b);
    assert_eq!(diff, TimeVal::new(7, 900_000));

    // Subtraction floors at zero.
    assert_eq!(b.saturating_sub(a), TimeVal::ZERO);

    // Normalization carries microsecond overflow.
    assert_eq!(TimeVal::new(1, 2_500_000), TimeVal::new(3, 500_000));

    assert!(TimeVal::new(5, 1) > TimeVal::new(5, 0));
    assert!(TimeVal::new(4, 999_999) < TimeVal::new(5, 0));

    assert_eq!(TimeVal::new(7, 1_500).to_string(), "7.001500");
}

#[test]
fn test_timeval_add_secs() {
    let t = TimeVal::new(100, 123_456);
    assert_eq!(t.add_secs(30), TimeVal::new(130, 123_456));
}
