// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Time-window extraction over a recorded rotation set.
//!
//! Given an absolute start time and a duration, the walker scans the
//! directory for index files, maps the request onto each candidate file's
//! monotonic timeline, seeks to the first frame of the window, then streams
//! payloads forward, following rotation boundaries by header sequence
//! until the window ends.
//!
//! The window is half-open: a frame stamped exactly at the start belongs
//! to it, one stamped exactly at the end does not.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{CamringError, Result};
use crate::normalize::SecondNormalizer;
use crate::storage::format::{
    FrameHeader, FrameIndexRecord, TimeVal, FRAME_HEADER_SIZE, FRAME_INDEX_SIZE,
};
use crate::storage::rotate::{idx_file_name, IDX_PREFIX};

/// Payloads are streamed to the sink in chunks of this size.
pub const EXTRACT_BLOCK: usize = 4096;

#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub dir: PathBuf,
    /// Window start, UTC seconds.
    pub start_utc: u64,
    /// Window length in seconds.
    pub duration: u64,
    /// Pad or trim each wall second to the declared frame rate.
    pub normalize: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractSummary {
    pub frames: u64,
    pub bytes: u64,
    pub files_probed: usize,
}

/// Structural snapshot of one index file.
#[derive(Debug)]
pub struct IndexProbe {
    pub header: FrameHeader,
    pub frame_count: u64,
    pub first: FrameIndexRecord,
    pub last: FrameIndexRecord,
    pub file_size: u64,
}

/// Read header, first and last record of an index file, validating the
/// magic keys and that the file length sits on the record grid.
pub fn probe_index_file(path: &Path) -> Result<IndexProbe> {
    let mut file = File::open(path)?;
    let file_size = file.metadata()?.len();

    let header_size = FRAME_HEADER_SIZE as u64;
    let record_size = FRAME_INDEX_SIZE as u64;
    if file_size < header_size + record_size {
        return Err(CamringError::Corrupt(format!(
            "{}: too short for a header and one record ({file_size} bytes)",
            path.display()
        )));
    }
    if (file_size - header_size) % record_size != 0 {
        return Err(CamringError::Corrupt(format!(
            "{}: length {file_size} is not on the record grid",
            path.display()
        )));
    }

    file.seek(SeekFrom::End(-(FRAME_INDEX_SIZE as i64)))?;
    let last = read_record_exact(&mut file, path)?;

    file.seek(SeekFrom::Start(0))?;
    let mut hbuf = [0u8; FRAME_HEADER_SIZE];
    file.read_exact(&mut hbuf)?;
    let header = FrameHeader::decode(&hbuf)?;
    let first = read_record_exact(&mut file, path)?;

    Ok(IndexProbe {
        header,
        frame_count: (file_size - header_size) / record_size,
        first,
        last,
        file_size,
    })
}

/// Extract every frame of the requested window to `out`. Pass `None` to
/// walk and validate without emitting payload bytes.
pub fn extract_range<'a>(
    req: &'a ExtractRequest,
    out: Option<&'a mut dyn Write>,
) -> Result<ExtractSummary> {
    if let (Some(from), Some(to)) = (
        chrono::DateTime::from_timestamp(req.start_utc as i64, 0),
        chrono::DateTime::from_timestamp((req.start_utc + req.duration) as i64, 0),
    ) {
        info!(
            from = %from.format("%H:%M:%S"),
            to = %to.format("%H:%M:%S"),
            duration = req.duration,
            "Extracting window"
        );
    }

    let walker = Walker {
        dir: &req.dir,
        start: TimeVal::from_secs(req.start_utc),
        duration: req.duration,
        normalize: req.normalize,
        out,
        local_start: TimeVal::ZERO,
        local_end: TimeVal::ZERO,
        file_seq: 0,
        seq_limit: 0,
        fps: 0,
        frame_seq: 0,
        index: None,
        index_path: PathBuf::new(),
        frm_name: String::new(),
        frm_path: None,
        frm_file: None,
        normalizer: None,
        summary: ExtractSummary::default(),
    };
    walker.dir_walk()
}

enum FileOutcome {
    /// The file does not cover the window.
    Skipped,
    /// The full window was emitted.
    Completed,
    /// The recording ended before the window did.
    Partial,
}

struct Walker<'a> {
    dir: &'a Path,
    start: TimeVal,
    duration: u64,
    normalize: bool,
    out: Option<&'a mut dyn Write>,

    // Window mapped onto the current file chain's monotonic timeline.
    local_start: TimeVal,
    local_end: TimeVal,

    // Running rotation state.
    file_seq: u32,
    seq_limit: u32,
    fps: u8,
    frame_seq: u64,

    index: Option<File>,
    index_path: PathBuf,

    // Frame pack named by the current header, opened lazily and cached.
    frm_name: String,
    frm_path: Option<String>,
    frm_file: Option<File>,

    normalizer: Option<SecondNormalizer>,
    summary: ExtractSummary,
}

impl<'a> Walker<'a> {
    fn dir_walk(mut self) -> Result<ExtractSummary> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        for entry in std::fs::read_dir(self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(IDX_PREFIX) {
                candidates.push(entry.path());
            }
        }
        candidates.sort();

        if candidates.is_empty() {
            info!(dir = %self.dir.display(), "No frame index files found");
            return Ok(self.summary);
        }

        for path in candidates {
            self.summary.files_probed += 1;
            match self.walk_file(&path) {
                Ok(FileOutcome::Skipped) => continue,
                Ok(FileOutcome::Completed) => break,
                Ok(FileOutcome::Partial) => continue,
                Err(e @ CamringError::FrameData(_)) => return Err(e),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Index file abandoned");
                    continue;
                }
            }
        }

        info!(
            frames = self.summary.frames,
            bytes = self.summary.bytes,
            files = self.summary.files_probed,
            "Extraction done"
        );
        Ok(self.summary)
    }

    fn walk_file(&mut self, path: &Path) -> Result<FileOutcome> {
        let probe = probe_index_file(path)?;
        let header = probe.header;

        // Absolute start of the recording this file belongs to.
        let record_start_abs = header.record_start_abs();
        if record_start_abs > self.start {
            info!(
                file = %path.display(),
                record_start = %record_start_abs,
                request = %self.start,
                "Skipping file, record starts after the request"
            );
            return Ok(FileOutcome::Skipped);
        }

        // Map the absolute window onto the recording's monotonic timeline.
        let local_start = self.start.saturating_sub(header.cap_utc);
        let local_end = local_start.add_secs(self.duration);
        if probe.last.tv < local_start {
            info!(
                file = %path.display(),
                last = %probe.last.tv,
                start = %local_start,
                "Skipping file, ends before the requested window"
            );
            return Ok(FileOutcome::Skipped);
        }

        info!(
            file = %path.display(),
            start = %local_start,
            end = %local_end,
            frames = probe.frame_count,
            "Using index file"
        );

        self.local_start = local_start;
        self.local_end = local_end;
        self.file_seq = header.seq;
        self.seq_limit = header.seq_limit;
        self.fps = header.desc.fps;
        self.frm_name = header.frm_name.clone();
        self.frm_path = None;
        self.frm_file = None;
        self.normalizer = self
            .normalize
            .then(|| SecondNormalizer::new(header.desc.fps));

        let mut file = File::open(path)?;

        // Coarse seek by declared rate, clamped to the record range.
        let mut approx = header.desc.fps as u64
            * local_start.sec.saturating_sub(header.first_frame.sec);
        if approx >= probe.frame_count {
            approx = probe.frame_count - 1;
        }
        file.seek(SeekFrom::Start(
            FRAME_HEADER_SIZE as u64 + approx * FRAME_INDEX_SIZE as u64,
        ))?;
        let fi = read_record_exact(&mut file, path)?;

        let first = if self.local_start < fi.tv {
            self.seek_down(&mut file, path, fi)?
        } else if self.local_start > fi.tv {
            self.seek_up(&mut file, path, fi)?
        } else {
            fi
        };

        self.index = Some(file);
        self.index_path = path.to_path_buf();
        self.walk_until_end(first)
    }

    /// Step backwards one record at a time until a timestamp at or before
    /// the target is found. Bottoming out on the first record means the
    /// window starts before this file's first frame.
    fn seek_down(
        &mut self,
        file: &mut File,
        path: &Path,
        mut fi: FrameIndexRecord,
    ) -> Result<FrameIndexRecord> {
        let first_record_end = (FRAME_HEADER_SIZE + FRAME_INDEX_SIZE) as u64;
        loop {
            if self.local_start == fi.tv {
                return Ok(fi);
            }
            if self.local_start > fi.tv {
                // Overshot: the window starts at the following record.
                return match read_record_opt(file, path)? {
                    Some(next) => Ok(next),
                    None => Err(CamringError::Corrupt(format!(
                        "{}: start frame not found",
                        path.display()
                    ))),
                };
            }
            if file.stream_position()? <= first_record_end {
                return Ok(fi);
            }
            file.seek(SeekFrom::Current(-(2 * FRAME_INDEX_SIZE as i64)))?;
            fi = read_record_exact(file, path)?;
        }
    }

    /// Scan forward until a timestamp at or past the target.
    fn seek_up(
        &mut self,
        file: &mut File,
        path: &Path,
        mut fi: FrameIndexRecord,
    ) -> Result<FrameIndexRecord> {
        loop {
            if self.local_start <= fi.tv {
                return Ok(fi);
            }
            fi = match read_record_opt(file, path)? {
                Some(next) => next,
                None => {
                    return Err(CamringError::Corrupt(format!(
                        "{}: start frame not found",
                        path.display()
                    )))
                }
            };
        }
    }

    /// Emit frames forward from `first`, crossing rotation boundaries,
    /// until the window end or the end of the recording.
    fn walk_until_end(&mut self, first: FrameIndexRecord) -> Result<FileOutcome> {
        let mut rec = first;
        self.frame_seq = rec.seq;

        let completed = loop {
            if rec.tv >= self.local_end {
                break true;
            }
            self.emit(rec)?;

            let next = loop {
                match self.read_next()? {
                    Some(r) => break Some(r),
                    None => {
                        if !self.open_next_file()? {
                            break None;
                        }
                    }
                }
            };
            let Some(next) = next else {
                break false;
            };

            if next.seq != self.frame_seq + 1 {
                return Err(CamringError::Corrupt(format!(
                    "invalid frame sequence: expected {}, received {}",
                    self.frame_seq + 1,
                    next.seq
                )));
            }
            self.frame_seq = next.seq;
            rec = next;
        };

        self.flush_normalizer()?;
        if completed {
            Ok(FileOutcome::Completed)
        } else {
            info!("Recording ended inside the requested window");
            Ok(FileOutcome::Partial)
        }
    }

    fn read_next(&mut self) -> Result<Option<FrameIndexRecord>> {
        match self.index.as_mut() {
            Some(file) => read_record_opt(file, &self.index_path),
            None => Ok(None),
        }
    }

    /// Rotation follower: open the successor slot and revalidate its header
    /// against the running state.
    fn open_next_file(&mut self) -> Result<bool> {
        let mut next = self.file_seq.wrapping_add(1);
        if self.seq_limit > 0 {
            next %= self.seq_limit;
        }

        let name = idx_file_name(next);
        let path = self.dir.join(&name);
        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(file = %name, "No successor index file");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        info!(file = %name, "Opening next index file");

        let mut hbuf = [0u8; FRAME_HEADER_SIZE];
        file.read_exact(&mut hbuf).map_err(|_| {
            CamringError::Corrupt(format!("{name}: stripped frame header"))
        })?;
        let header = FrameHeader::decode(&hbuf)?;

        if header.seq != next {
            return Err(CamringError::Corrupt(format!(
                "inconsistent sequence: received {} expected {next}",
                header.seq
            )));
        }
        if header.seq_limit != self.seq_limit {
            return Err(CamringError::Corrupt(format!(
                "inconsistent sequence limit: received {} expected {}",
                header.seq_limit, self.seq_limit
            )));
        }
        if header.desc.fps != self.fps {
            return Err(CamringError::Corrupt(format!(
                "inconsistent frame rate: received {} expected {}",
                header.desc.fps, self.fps
            )));
        }

        self.frm_name = header.frm_name;
        self.file_seq = next;
        self.index = Some(file);
        self.index_path = path;
        Ok(true)
    }

    fn emit(&mut self, rec: FrameIndexRecord) -> Result<()> {
        if let Some(mut normalizer) = self.normalizer.take() {
            let result = normalizer.push(rec, &mut |r| self.emit_frame(r));
            self.normalizer = Some(normalizer);
            result
        } else {
            self.emit_frame(&rec)
        }
    }

    fn flush_normalizer(&mut self) -> Result<()> {
        if let Some(mut normalizer) = self.normalizer.take() {
            let result = normalizer.flush(&mut |r| self.emit_frame(r));
            self.normalizer = Some(normalizer);
            result
        } else {
            Ok(())
        }
    }

    /// Stream one payload from the frame pack to the output sink. Frame
    /// pack and output failures are fatal to the whole extraction.
    fn emit_frame(&mut self, rec: &FrameIndexRecord) -> Result<()> {
        if self.frm_path.as_deref() != Some(self.frm_name.as_str()) {
            match &self.frm_path {
                None => info!(file = %self.frm_name, "Opening frame pack"),
                Some(old) => info!(from = %old, to = %self.frm_name, "Switching frame pack"),
            }
            let path = self.dir.join(&self.frm_name);
            let file = File::open(&path).map_err(|e| {
                CamringError::FrameData(format!("open {}: {e}", path.display()))
            })?;
            self.frm_file = Some(file);
            self.frm_path = Some(self.frm_name.clone());
        }
        let Some(file) = self.frm_file.as_mut() else {
            return Err(CamringError::FrameData("no frame pack open".into()));
        };

        debug!(
            seq = rec.seq,
            time = %rec.tv,
            offset = rec.offset,
            size = rec.size,
            "Frame"
        );

        file.seek(SeekFrom::Start(rec.offset)).map_err(|e| {
            CamringError::FrameData(format!("seek to frame start {}: {e}", rec.offset))
        })?;

        let mut chunk = [0u8; EXTRACT_BLOCK];
        let mut remaining = rec.size as usize;
        while remaining > 0 {
            let n = remaining.min(EXTRACT_BLOCK);
            file.read_exact(&mut chunk[..n]).map_err(|e| {
                CamringError::FrameData(format!("frame pack read: {e}"))
            })?;
            if let Some(out) = self.out.as_mut() {
                out.write_all(&chunk[..n]).map_err(|e| {
                    CamringError::FrameData(format!("output write: {e}"))
                })?;
            }
            remaining -= n;
        }

        self.summary.frames += 1;
        self.summary.bytes += rec.size as u64;
        Ok(())
    }
}

fn read_record_opt(file: &mut File, path: &Path) -> Result<Option<FrameIndexRecord>> {
    let mut buf = [0u8; FRAME_INDEX_SIZE];
    let mut filled = 0;
    while filled < FRAME_INDEX_SIZE {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(CamringError::Corrupt(format!(
                "{}: truncated index record",
                path.display()
            )));
        }
        filled += n;
    }
    Ok(Some(FrameIndexRecord::decode(&buf)?))
}

fn read_record_exact(file: &mut File, path: &Path) -> Result<FrameIndexRecord> {
    match read_record_opt(file, path)? {
        Some(rec) => Ok(rec),
        None => Err(CamringError::Corrupt(format!(
            "{}: unexpected end of index",
            path.display()
        ))),
    }
}
