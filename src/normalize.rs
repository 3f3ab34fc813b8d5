//! Per-second frame rate normalization.
//!
//! Downstream consumers expect exactly `fps` frames per wall second even
//! when the device jittered. Records are grouped by their timestamp's
//! second; a finished group is emitted in order and padded by repeating
//! its last record, and frames beyond the declared rate are dropped.

use tracing::{debug, warn};

use crate::error::Result;
use crate::storage::format::FrameIndexRecord;

pub struct SecondNormalizer {
    fps: usize,
    current_sec: Option<u64>,
    group: Vec<FrameIndexRecord>,
    dropped: u64,
}

impl SecondNormalizer {
    pub fn new(fps: u8) -> Self {
        SecondNormalizer {
            fps: fps as usize,
            current_sec: None,
            group: Vec::with_capacity(fps as usize),
            dropped: 0,
        }
    }

    /// Feed one record. Emits the previous second's group through `sink`
    /// when a new second starts.
    pub fn push(
        &mut self,
        rec: FrameIndexRecord,
        sink: &mut dyn FnMut(&FrameIndexRecord) -> Result<()>,
    ) -> Result<()> {
        match self.current_sec {
            Some(sec) if sec == rec.tv.sec => {
                if self.group.len() >= self.fps {
                    self.dropped += 1;
                    warn!(
                        second = sec,
                        fps = self.fps,
                        "More frames than the declared rate in one second, dropping frame"
                    );
                    return Ok(());
                }
                self.group.push(rec);
            }
            Some(_) => {
                self.flush_group(sink)?;
                self.current_sec = Some(rec.tv.sec);
                self.group.push(rec);
            }
            None => {
                self.current_sec = Some(rec.tv.sec);
                self.group.push(rec);
            }
        }
        Ok(())
    }

    /// Emit the trailing group. Call once after the last record.
    pub fn flush(
        &mut self,
        sink: &mut dyn FnMut(&FrameIndexRecord) -> Result<()>,
    ) -> Result<()> {
        self.flush_group(sink)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn flush_group(
        &mut self,
        sink: &mut dyn FnMut(&FrameIndexRecord) -> Result<()>,
    ) -> Result<()> {
        if self.group.is_empty() {
            return Ok(());
        }
        for rec in &self.group {
            sink(rec)?;
        }
        if let Some(last) = self.group.last().copied() {
            let missing = self.fps.saturating_sub(self.group.len());
            if missing > 0 {
                debug!(
                    second = last.tv.sec,
                    have = self.group.len(),
                    fps = self.fps,
                    "Padding short second by repeating the last frame"
                );
                for _ in 0..missing {
                    sink(&last)?;
                }
            }
        }
        self.group.clear();
        Ok(())
    }
}
