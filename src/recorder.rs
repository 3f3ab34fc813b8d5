// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Recording pipeline.
//!
//! One task pulls frames from the capture source and serializes them into
//! the current rotation pair: payload bytes into the frame blob, one index
//! record per frame into the index file. All writes go through a
//! [`PairSink`], so the same state machine drives inline writes and the
//! offload writer thread.

use tracing::{error, info, warn};

use crate::capture::{CapturedFrame, FrameSource};
use crate::error::{CamringError, Result};
use crate::storage::format::{FrameDescriptor, FrameIndexRecord, TimeVal};
use crate::storage::rotate::{FilePair, PairSink, Rotator, SessionHeader};

/// Clock pair sampled together at stream-on.
///
/// `started_utc` is the wall clock, `started_mono` the monotonic clock at
/// the same instant. The header stores their difference plus the raw
/// monotonic value, which is what lets the extractor map an absolute
/// request onto the monotonic frame timestamps.
#[derive(Debug, Clone, Copy)]
pub struct CaptureSession {
    pub started_utc: TimeVal,
    pub started_mono: TimeVal,
}

impl CaptureSession {
    /// Sample both clocks now.
    pub fn begin() -> Self {
        let session = CaptureSession {
            started_utc: TimeVal::now_utc(),
            started_mono: TimeVal::now_mono(),
        };
        info!(
            utc = %session.started_utc,
            mono = %session.started_mono,
            "Capture started"
        );
        session
    }

    /// Build a session from explicit clock values.
    pub fn at(started_utc: TimeVal, started_mono: TimeVal) -> Self {
        CaptureSession { started_utc, started_mono }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecorderStats {
    /// Frames fully written (payload + index record).
    pub frames: u64,
    /// Frames refused by the staging layer.
    pub dropped: u64,
    /// Payload bytes written.
    pub bytes: u64,
}

/// Per-frame recording state machine.
pub struct Recorder<S: PairSink> {
    sink: S,
    rotator: Rotator,
    pair: Option<FilePair<S::Handle>>,
    desc: FrameDescriptor,
    session: CaptureSession,
    header: Option<SessionHeader>,
    /// Arrival counter; doubles as the global frame sequence number, so a
    /// dropped frame leaves a visible gap.
    frames_arrived: u64,
    stats: RecorderStats,
}

impl<S: PairSink> Recorder<S> {
    pub fn new(sink: S, rotator: Rotator, desc: FrameDescriptor, session: CaptureSession) -> Self {
        Recorder {
            sink,
            rotator,
            pair: None,
            desc,
            session,
            header: None,
            frames_arrived: 0,
            stats: RecorderStats::default(),
        }
    }

    pub fn frames_arrived(&self) -> u64 {
        self.frames_arrived
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats
    }

    /// Drive the recorder from the capture source until the stream ends,
    /// the device queue drains, or a write fails.
    pub async fn run(&mut self, source: &mut FrameSource) -> Result<RecorderStats> {
        info!("Recorder started");
        while let Some(frame) = source.read_frame().await {
            match self.handle_frame(&frame) {
                Ok(()) => {}
                Err(CamringError::Backpressure) => {
                    self.stats.dropped += 1;
                    warn!(
                        dropped = self.stats.dropped,
                        "Staging buffer has no free space, frame dropped"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Recording write failed, stopping");
                    self.finish();
                    return Err(e);
                }
            }

            if !source.requeue(frame.buf) {
                warn!("Buffer slot requeue failed");
            }
            if source.queued() == 0 {
                error!("Capture queue drained, stopping");
                break;
            }
        }
        Ok(self.finish())
    }

    /// Process one captured frame: rotate if the current pair is full,
    /// append the payload, append the index record.
    pub fn handle_frame(&mut self, frame: &CapturedFrame) -> Result<()> {
        let header = self.session_header(frame);
        let seq = self.frames_arrived;
        self.frames_arrived += 1;

        let payload = &frame.buf.data[..frame.buf.bytes_used];
        let payload_len = payload.len() as u64;

        if self.rotator.needs_rotation(self.pair.as_ref(), payload_len) {
            let old = self.pair.take();
            let next = self.rotator.open_next(&mut self.sink, old, &header)?;
            self.pair = Some(next);
        }
        let Some(pair) = self.pair.as_mut() else {
            return Err(CamringError::Io(std::io::Error::other("no open file pair")));
        };

        let written = self.sink.write(&mut pair.frame, payload)?;
        if written != payload.len() {
            return Err(CamringError::Backpressure);
        }
        pair.written_frame += payload_len;

        let record = FrameIndexRecord {
            tv: frame.timestamp,
            offset: pair.written_frame - payload_len,
            size: payload.len() as u32,
            seq,
        };
        let encoded = record.encode();
        let written = self.sink.write(&mut pair.index, &encoded)?;
        if written != encoded.len() {
            return Err(CamringError::Backpressure);
        }
        pair.written_index += encoded.len() as u64;

        self.stats.frames += 1;
        self.stats.bytes += payload_len;
        Ok(())
    }

    /// Close the current pair and report totals.
    pub fn finish(&mut self) -> RecorderStats {
        if let Some(pair) = self.pair.take() {
            self.sink.close(pair.index);
            self.sink.close(pair.frame);
        }
        info!(
            frames = self.stats.frames,
            dropped = self.stats.dropped,
            bytes = self.stats.bytes,
            files = self.rotator.pairs_opened(),
            "Recording finished"
        );
        self.stats
    }

    /// Header fields are fixed at the first frame and reused for every
    /// rotation of the session.
    fn session_header(&mut self, frame: &CapturedFrame) -> SessionHeader {
        if let Some(header) = self.header {
            return header;
        }
        let startup = frame.timestamp.saturating_sub(self.session.started_mono);
        info!(delay = %startup, "First frame arrived");
        let header = SessionHeader {
            cap_utc: self.session.started_utc.saturating_sub(self.session.started_mono),
            cap_local: self.session.started_mono,
            first_frame: frame.timestamp,
            desc: self.desc,
        };
        self.header = Some(header);
        header
    }
}
