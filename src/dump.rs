// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Structural dump of an index file.
//!
//! Prints the header summary, then every record with running validation
//! against its predecessor. Meant for eyeballing a recording after the
//! fact; stops at the first record that fails validation.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{CamringError, Result};
use crate::storage::format::{
    FrameHeader, FrameIndexRecord, TimeVal, FRAME_HEADER_SIZE, FRAME_INDEX_MAGIC,
    FRAME_INDEX_SIZE, MICROS_PER_SEC,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct DumpStats {
    pub records: u64,
    pub errors: u64,
}

pub fn dump_index_file(path: &Path, out: &mut impl Write) -> Result<DumpStats> {
    let mut file = File::open(path)?;
    let file_size = file.metadata()?.len();

    let mut hbuf = [0u8; FRAME_HEADER_SIZE];
    file.read_exact(&mut hbuf)
        .map_err(|_| CamringError::Corrupt("unexpected end while reading header".into()))?;
    let header = FrameHeader::decode(&hbuf)?;

    let frames = file_size.saturating_sub(FRAME_HEADER_SIZE as u64) / FRAME_INDEX_SIZE as u64;
    let local = header.cap_local;
    let utc = header.cap_utc;
    let (symbol, diff) = if local > utc {
        ('-', local.saturating_sub(utc))
    } else {
        ('+', utc.saturating_sub(local))
    };
    writeln!(
        out,
        "# HEADER < frames = {}, fps = {}, fft = {}, local time = {}, UTC diff = {}{} >",
        frames, header.desc.fps, header.first_frame, local, symbol, diff
    )?;

    let mut stats = DumpStats::default();
    let mut prev: Option<FrameIndexRecord> = None;
    let mut rate_sec: u64 = 0;
    let mut rate: u32 = 0;

    loop {
        let mut buf = [0u8; FRAME_INDEX_SIZE];
        let mut filled = 0;
        while filled < FRAME_INDEX_SIZE {
            let n = file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            writeln!(out, "EOF")?;
            break;
        }
        if filled != FRAME_INDEX_SIZE {
            writeln!(
                out,
                "# index: unexpected end: {filled} bytes read, expected {FRAME_INDEX_SIZE}"
            )?;
            stats.errors += 1;
            break;
        }

        let line = stats.records + 1;
        let rec = FrameIndexRecord::decode_unchecked(&buf);
        let mut errors = 0u32;

        if &buf[0..2] != FRAME_INDEX_MAGIC {
            writeln!(out, "[{line:6}] invalid magic key: {:02x?}", &buf[0..2])?;
            errors += 1;
        }
        if rec.tv.usec >= MICROS_PER_SEC {
            writeln!(out, "[{line:6}] invalid microseconds value: {}", rec.tv.usec)?;
            errors += 1;
        }
        if let Some(p) = prev {
            if rec.tv < p.tv {
                writeln!(
                    out,
                    "[{line:6}] frame time invalid ({} < {})",
                    rec.tv, p.tv
                )?;
                errors += 1;
            }
            if p.offset + p.size as u64 > rec.offset {
                writeln!(
                    out,
                    "[{line:6}] offset value invalid: previous frame end > offset: {} > {}",
                    p.offset + p.size as u64,
                    rec.offset
                )?;
                errors += 1;
            }
            if rec.seq != p.seq + 1 {
                writeln!(
                    out,
                    "[{line:6}] sequence invalid: expected {}, received {}",
                    p.seq + 1,
                    rec.seq
                )?;
                errors += 1;
            }
        }

        let diff = prev
            .map(|p| rec.tv.saturating_sub(p.tv))
            .unwrap_or(TimeVal::ZERO);
        writeln!(
            out,
            "[{line:6}] {{ {:6} time = {}, offset = {:10}, size = {:10} }} time diff: {}",
            rec.seq, rec.tv, rec.offset, rec.size, diff
        )?;

        if errors > 0 {
            stats.errors += errors as u64;
            writeln!(out, "# index: invalid data")?;
            break;
        }

        if rec.tv.sec != rate_sec {
            if rate > 0 {
                writeln!(out, "# fps = {rate}, second = {rate_sec}")?;
            }
            rate_sec = rec.tv.sec;
            rate = 0;
        }
        rate += 1;

        stats.records += 1;
        prev = Some(rec);
    }

    Ok(stats)
}
