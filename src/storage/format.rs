// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! On-disk record formats for the index database.
//!
//! Every index file starts with one [`FrameHeader`] followed by a dense
//! array of [`FrameIndexRecord`]s. All multi-byte fields are big-endian
//! regardless of host order; records are byte-packed with no padding, so
//! file length must equal `FRAME_HEADER_SIZE + N * FRAME_INDEX_SIZE`.
//! Magic keys at fixed offsets double as torn-write detectors.

use std::io::Cursor;
use std::time::Instant;

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::{CamringError, Result};

pub const FRAME_HEADER_MAGIC: &[u8; 4] = b"SWIC";
pub const FRAME_INDEX_MAGIC: &[u8; 2] = b"AZ";

/// Encoded size of [`FrameHeader`].
pub const FRAME_HEADER_SIZE: usize = 69;
/// Encoded size of [`FrameIndexRecord`].
pub const FRAME_INDEX_SIZE: usize = 34;
/// Width of the NUL-padded frame-blob file name field in the header.
pub const FRM_NAME_LEN: usize = 16;

pub const MICROS_PER_SEC: u32 = 1_000_000;

// ─────────────────────────────── TimeVal ────────────────────────────────

/// Seconds + microseconds, the wire representation of every timestamp.
///
/// Normalized: `usec` is always below one million. Derived ordering is
/// correct because of that invariant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeVal {
    pub sec: u64,
    pub usec: u32,
}

impl TimeVal {
    pub const ZERO: TimeVal = TimeVal { sec: 0, usec: 0 };

    /// Build a normalized value; microsecond overflow carries into seconds.
    pub fn new(sec: u64, usec: u32) -> Self {
        TimeVal {
            sec: sec + (usec / MICROS_PER_SEC) as u64,
            usec: usec % MICROS_PER_SEC,
        }
    }

    pub fn from_secs(sec: u64) -> Self {
        TimeVal { sec, usec: 0 }
    }

    /// Wall clock, sampled via chrono.
    pub fn now_utc() -> Self {
        let now = chrono::Utc::now();
        TimeVal::new(now.timestamp().max(0) as u64, now.timestamp_subsec_micros())
    }

    /// Monotonic clock against a process-wide epoch. Only differences and
    /// comparisons between values of this clock are meaningful.
    pub fn now_mono() -> Self {
        static EPOCH: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        let epoch = *EPOCH.get_or_init(Instant::now);
        let elapsed = epoch.elapsed();
        TimeVal::new(elapsed.as_secs(), elapsed.subsec_micros())
    }

    pub fn add(self, other: TimeVal) -> TimeVal {
        let usec = self.usec + other.usec;
        TimeVal {
            sec: self.sec + other.sec + (usec / MICROS_PER_SEC) as u64,
            usec: usec % MICROS_PER_SEC,
        }
    }

    pub fn add_secs(self, secs: u64) -> TimeVal {
        TimeVal { sec: self.sec + secs, usec: self.usec }
    }

    /// Difference, floored at zero.
    pub fn saturating_sub(self, other: TimeVal) -> TimeVal {
        if self <= other {
            return TimeVal::ZERO;
        }
        if self.usec >= other.usec {
            TimeVal { sec: self.sec - other.sec, usec: self.usec - other.usec }
        } else {
            TimeVal {
                sec: self.sec - other.sec - 1,
                usec: MICROS_PER_SEC + self.usec - other.usec,
            }
        }
    }
}

impl std::fmt::Display for TimeVal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:06}", self.sec, self.usec)
    }
}

// ───────────────────────────── FrameHeader ──────────────────────────────

/// Geometry and rate of the captured stream, fixed per recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub fps: u8,
    pub width: u16,
    pub height: u16,
}

/// First record of every index file.
///
/// `cap_utc + cap_local` reconstructs the wall clock at stream-on;
/// `cap_local` and `first_frame` are on the same monotonic timeline as the
/// per-frame timestamps in the index records that follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Naming slot of this file within the rotation set.
    pub seq: u32,
    /// Rotation horizon; 0 means unlimited.
    pub seq_limit: u32,
    /// Name of the paired frame-blob file.
    pub frm_name: String,
    pub cap_utc: TimeVal,
    pub cap_local: TimeVal,
    /// Monotonic time of the first frame of the recording session.
    pub first_frame: TimeVal,
    pub desc: FrameDescriptor,
}

impl FrameHeader {
    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut b = [0u8; FRAME_HEADER_SIZE];
        b[0..4].copy_from_slice(FRAME_HEADER_MAGIC);
        b[4..8].copy_from_slice(&self.seq.to_be_bytes());
        b[8..12].copy_from_slice(&self.seq_limit.to_be_bytes());
        let name = self.frm_name.as_bytes();
        let n = name.len().min(FRM_NAME_LEN);
        b[12..12 + n].copy_from_slice(&name[..n]);
        b[28..36].copy_from_slice(&self.cap_utc.sec.to_be_bytes());
        b[36..40].copy_from_slice(&self.cap_utc.usec.to_be_bytes());
        b[40..48].copy_from_slice(&self.cap_local.sec.to_be_bytes());
        b[48..52].copy_from_slice(&self.cap_local.usec.to_be_bytes());
        b[52..60].copy_from_slice(&self.first_frame.sec.to_be_bytes());
        b[60..64].copy_from_slice(&self.first_frame.usec.to_be_bytes());
        b[64] = self.desc.fps;
        b[65..67].copy_from_slice(&self.desc.width.to_be_bytes());
        b[67..69].copy_from_slice(&self.desc.height.to_be_bytes());
        b
    }

    pub fn decode(buf: &[u8; FRAME_HEADER_SIZE]) -> Result<Self> {
        if &buf[0..4] != FRAME_HEADER_MAGIC {
            return Err(CamringError::Corrupt(format!(
                "bad header magic: {:02x?}",
                &buf[0..4]
            )));
        }

        let mut cur = Cursor::new(&buf[4..]);
        let seq = cur.read_u32::<BigEndian>()?;
        let seq_limit = cur.read_u32::<BigEndian>()?;

        let name_raw = &buf[12..12 + FRM_NAME_LEN];
        let name_end = name_raw.iter().position(|&c| c == 0).unwrap_or(FRM_NAME_LEN);
        let frm_name = std::str::from_utf8(&name_raw[..name_end])
            .map_err(|_| CamringError::Corrupt("frame file name is not UTF-8".into()))?
            .to_string();

        let mut cur = Cursor::new(&buf[28..]);
        let cap_utc = read_timeval(&mut cur)?;
        let cap_local = read_timeval(&mut cur)?;
        let first_frame = read_timeval(&mut cur)?;
        let fps = cur.read_u8()?;
        let width = cur.read_u16::<BigEndian>()?;
        let height = cur.read_u16::<BigEndian>()?;

        Ok(FrameHeader {
            seq,
            seq_limit,
            frm_name,
            cap_utc,
            cap_local,
            first_frame,
            desc: FrameDescriptor { fps, width, height },
        })
    }

    /// Wall clock at stream-on of this file's recording session.
    pub fn record_start_abs(&self) -> TimeVal {
        self.cap_utc.add(self.cap_local)
    }
}

// ─────────────────────────── FrameIndexRecord ───────────────────────────

/// One frame's location and time within a rotation slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameIndexRecord {
    /// Capture timestamp, monotonic reference.
    pub tv: TimeVal,
    /// Byte offset of the payload within the paired frame-blob file.
    pub offset: u64,
    /// Payload size in bytes.
    pub size: u32,
    /// Global frame sequence number, monotonic across rotations.
    pub seq: u64,
}

impl FrameIndexRecord {
    pub fn encode(&self) -> [u8; FRAME_INDEX_SIZE] {
        let mut b = [0u8; FRAME_INDEX_SIZE];
        b[0..2].copy_from_slice(FRAME_INDEX_MAGIC);
        b[2..10].copy_from_slice(&self.tv.sec.to_be_bytes());
        b[10..14].copy_from_slice(&self.tv.usec.to_be_bytes());
        b[14..22].copy_from_slice(&self.offset.to_be_bytes());
        b[22..26].copy_from_slice(&self.size.to_be_bytes());
        b[26..34].copy_from_slice(&self.seq.to_be_bytes());
        b
    }

    /// Parse fields without validating magic or bounds. The dump tool uses
    /// this to report what a damaged record claims to contain.
    pub fn decode_unchecked(buf: &[u8; FRAME_INDEX_SIZE]) -> Self {
        let mut sec = [0u8; 8];
        sec.copy_from_slice(&buf[2..10]);
        let mut usec = [0u8; 4];
        usec.copy_from_slice(&buf[10..14]);
        let mut offset = [0u8; 8];
        offset.copy_from_slice(&buf[14..22]);
        let mut size = [0u8; 4];
        size.copy_from_slice(&buf[22..26]);
        let mut seq = [0u8; 8];
        seq.copy_from_slice(&buf[26..34]);
        FrameIndexRecord {
            tv: TimeVal { sec: u64::from_be_bytes(sec), usec: u32::from_be_bytes(usec) },
            offset: u64::from_be_bytes(offset),
            size: u32::from_be_bytes(size),
            seq: u64::from_be_bytes(seq),
        }
    }

    pub fn decode(buf: &[u8; FRAME_INDEX_SIZE]) -> Result<Self> {
        if &buf[0..2] != FRAME_INDEX_MAGIC {
            return Err(CamringError::Corrupt(format!(
                "bad index magic: {:02x?}",
                &buf[0..2]
            )));
        }

        let rec = Self::decode_unchecked(buf);
        if rec.tv.usec >= MICROS_PER_SEC {
            return Err(CamringError::Corrupt(format!(
                "index record {}: microseconds out of range: {}",
                rec.seq, rec.tv.usec
            )));
        }
        Ok(rec)
    }
}

fn read_timeval(cur: &mut Cursor<&[u8]>) -> Result<TimeVal> {
    let sec = cur.read_u64::<BigEndian>()?;
    let usec = cur.read_u32::<BigEndian>()?;
    Ok(TimeVal { sec, usec })
}
