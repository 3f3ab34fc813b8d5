// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! File pair rotation.
//!
//! A recording is a rotating set of paired files per naming slot `u`:
//! `idx_{u:010}` (one FrameHeader, then FrameIndexRecords) and
//! `frm_{u:010}` (concatenated opaque payloads). Slot numbers reuse
//! `file_idx` modulo the horizon, so wrapping truncates the oldest slice.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{CamringError, Result};
use crate::storage::format::{
    FrameDescriptor, FrameHeader, TimeVal, FRAME_INDEX_SIZE,
};

pub const IDX_PREFIX: &str = "idx_";
pub const FRM_PREFIX: &str = "frm_";

pub fn idx_file_name(slot: u32) -> String {
    format!("{IDX_PREFIX}{slot:010}")
}

pub fn frm_file_name(slot: u32) -> String {
    format!("{FRM_PREFIX}{slot:010}")
}

/// Write seam between the recorder and the disk.
///
/// `write` returning fewer bytes than requested means the staging layer
/// refused the whole record; implementations never persist a prefix.
pub trait PairSink {
    type Handle;

    fn open(&mut self, path: &Path) -> Result<Self::Handle>;
    fn write(&mut self, handle: &mut Self::Handle, buf: &[u8]) -> Result<usize>;
    fn close(&mut self, handle: Self::Handle);
}

/// Inline blocking writes, no staging.
#[derive(Default)]
pub struct DirectSink;

impl DirectSink {
    pub fn new() -> Self {
        DirectSink
    }
}

impl PairSink for DirectSink {
    type Handle = File;

    fn open(&mut self, path: &Path) -> Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(path)?;
        Ok(file)
    }

    fn write(&mut self, handle: &mut File, buf: &[u8]) -> Result<usize> {
        handle.write_all(buf)?;
        Ok(buf.len())
    }

    fn close(&mut self, handle: File) {
        drop(handle);
    }
}

/// The currently open slot and its byte accounting.
pub struct FilePair<H> {
    pub index: H,
    pub frame: H,
    pub frm_name: String,
    pub written_index: u64,
    pub written_frame: u64,
}

/// Session-constant fields stamped into every rotation header.
#[derive(Debug, Clone, Copy)]
pub struct SessionHeader {
    pub cap_utc: TimeVal,
    pub cap_local: TimeVal,
    pub first_frame: TimeVal,
    pub desc: FrameDescriptor,
}

/// Decides when a slot is full and opens the next pair.
pub struct Rotator {
    dir: PathBuf,
    size_limit: u64,
    file_limit: u32,
    /// Monotonic count of pairs opened; the naming slot is this modulo
    /// the horizon.
    file_idx: u32,
}

impl Rotator {
    pub fn new(dir: impl Into<PathBuf>, size_limit: u64, file_limit: u32) -> Self {
        Rotator {
            dir: dir.into(),
            size_limit,
            file_limit,
            file_idx: 0,
        }
    }

    pub fn slot(&self) -> u32 {
        if self.file_limit > 0 {
            self.file_idx % self.file_limit
        } else {
            self.file_idx
        }
    }

    pub fn pairs_opened(&self) -> u32 {
        self.file_idx
    }

    /// True when the next frame cannot land in the current pair: no pair is
    /// open, or one more index record plus the payload would cross the
    /// combined size limit.
    pub fn needs_rotation<H>(&self, pair: Option<&FilePair<H>>, payload_len: u64) -> bool {
        match pair {
            None => true,
            Some(p) => {
                p.written_index + FRAME_INDEX_SIZE as u64 + p.written_frame + payload_len
                    > self.size_limit
            }
        }
    }

    /// Close `old` and open the next pair, emitting its header. Both files
    /// are opened create+truncate, so a wrapped slot loses its old slice.
    pub fn open_next<S: PairSink>(
        &mut self,
        sink: &mut S,
        old: Option<FilePair<S::Handle>>,
        session: &SessionHeader,
    ) -> Result<FilePair<S::Handle>> {
        if let Some(pair) = old {
            sink.close(pair.index);
            sink.close(pair.frame);
        }

        let slot = self.slot();
        if self.file_limit > 0 && self.file_idx >= self.file_limit {
            warn!(slot, "Rotation wrapped, oldest slice will be overwritten");
        }

        let idx_name = idx_file_name(slot);
        let frm_name = frm_file_name(slot);

        let frame = sink.open(&self.dir.join(&frm_name))?;
        let mut index = sink.open(&self.dir.join(&idx_name))?;

        let header = FrameHeader {
            seq: slot,
            seq_limit: self.file_limit,
            frm_name: frm_name.clone(),
            cap_utc: session.cap_utc,
            cap_local: session.cap_local,
            first_frame: session.first_frame,
            desc: session.desc,
        };
        let encoded = header.encode();
        let written = sink.write(&mut index, &encoded)?;
        if written != encoded.len() {
            // A refused header leaves the slot unusable; stop recording.
            sink.close(index);
            sink.close(frame);
            return Err(CamringError::Exhausted(
                "staging ring refused a file header".into(),
            ));
        }

        info!(file = %idx_name, blob = %frm_name, slot, "Opened rotation slot");
        self.file_idx += 1;

        Ok(FilePair {
            index,
            frame,
            frm_name,
            written_index: encoded.len() as u64,
            written_frame: 0,
        })
    }
}
