// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Write offload thread.
//!
//! A dedicated OS thread owns one [`ByteRing`] and a fixed table of file
//! slots. Producers enqueue framed records (guarded header + payload) and
//! never touch a file descriptor; the thread drains the ring in chunks,
//! re-parses the framing, and issues the actual writes. A full ring refuses
//! the whole record, which is the recorder's backpressure signal.
//!
//! ```text
//! recorder ──open/write/close──▶ WthClient ──ring──▶ writer thread ──▶ idx_/frm_ files
//! ```

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::error::{CamringError, Result};
use crate::storage::ring::ByteRing;
use crate::storage::rotate::PairSink;

/// Size of the file slot table.
pub const MAX_HANDLES: usize = 16;
/// Largest chunk peeked from the ring per drain step.
pub const WRITE_BLOCK: usize = 1 << 20;
/// Encoded size of the framed-record header.
pub const REC_HEADER_SIZE: usize = 10;

const GUARD_L: [u8; 2] = *b"AZ";
const GUARD_R: [u8; 2] = *b"FN";

/// Opaque reference to a reserved file slot.
///
/// Obtainable only from [`WthClient::open`], so a stray integer can never
/// masquerade as a handle.
#[derive(Debug)]
pub struct WthHandle {
    slot: usize,
}

#[derive(Default)]
struct Slot {
    acquired: bool,
    path: PathBuf,
    open_requested: bool,
    expect_close: bool,
}

struct WthState {
    ring: ByteRing,
    slots: [Slot; MAX_HANDLES],
}

struct Shared {
    state: Mutex<WthState>,
    cv: Condvar,
    /// Bytes enqueued but not yet written per slot. Incremented by the
    /// producer under the state lock, decremented and read lock-free by
    /// the consumer for close decisions.
    pending: [AtomicU64; MAX_HANDLES],
    kill: AtomicBool,
}

/// Producer-side handle to the writer thread. Cheap to clone.
#[derive(Clone)]
pub struct WthClient {
    shared: Arc<Shared>,
}

impl WthClient {
    /// Reserve a slot for `path`. The file itself is opened by the writer
    /// thread; records written before that open completes are buffered in
    /// the ring.
    pub fn open(&self, path: &Path) -> Result<WthHandle> {
        let mut state = self.shared.state.lock();
        let slot = state
            .slots
            .iter()
            .position(|s| !s.acquired)
            .ok_or_else(|| CamringError::Exhausted("no free writer slots".into()))?;

        let s = &mut state.slots[slot];
        s.acquired = true;
        s.path = path.to_path_buf();
        s.open_requested = true;
        s.expect_close = false;
        self.shared.pending[slot].store(0, Ordering::Release);
        drop(state);

        self.shared.cv.notify_one();
        debug!(slot, path = %path.display(), "Writer slot reserved");
        Ok(WthHandle { slot })
    }

    /// Append one framed record. Returns the payload length, or 0 when the
    /// ring cannot take header plus payload (the record is dropped whole).
    pub fn write(&self, handle: &WthHandle, buf: &[u8]) -> usize {
        let mut state = self.shared.state.lock();
        if state.ring.free_space() < REC_HEADER_SIZE + buf.len() {
            return 0;
        }

        let mut header = [0u8; REC_HEADER_SIZE];
        header[0..2].copy_from_slice(&GUARD_L);
        header[2..4].copy_from_slice(&(handle.slot as u16).to_be_bytes());
        header[4..8].copy_from_slice(&(buf.len() as u32).to_be_bytes());
        header[8..10].copy_from_slice(&GUARD_R);

        state.ring.save(&header);
        state.ring.save(buf);
        self.shared.pending[handle.slot].fetch_add(buf.len() as u64, Ordering::Release);

        let occupied = state.ring.occupied_space();
        let capacity = state.ring.capacity();
        drop(state);

        // Coalesced wakeup once the ring is meaningfully occupied.
        if occupied * 10 > capacity {
            self.shared.cv.notify_one();
        }
        buf.len()
    }

    /// Mark a slot for closing. The underlying file is closed and the slot
    /// released only once every enqueued byte has been written.
    pub fn close(&self, handle: WthHandle) {
        let mut state = self.shared.state.lock();
        state.slots[handle.slot].expect_close = true;
        drop(state);
        self.shared.cv.notify_one();
    }
}

/// Owner of the writer thread. Dropping it (or calling [`shutdown`]) sends
/// the kill signal, waits for the ring to drain, and joins the thread.
///
/// [`shutdown`]: WriteThread::shutdown
pub struct WriteThread {
    shared: Arc<Shared>,
    join: Option<JoinHandle<()>>,
}

impl WriteThread {
    pub fn spawn(ring_capacity: usize) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(WthState {
                ring: ByteRing::with_capacity(ring_capacity)?,
                slots: std::array::from_fn(|_| Slot::default()),
            }),
            cv: Condvar::new(),
            pending: std::array::from_fn(|_| AtomicU64::new(0)),
            kill: AtomicBool::new(false),
        });

        let thread_shared = shared.clone();
        let join = std::thread::Builder::new()
            .name("camring-writer".into())
            .spawn(move || Drainer::new(thread_shared).run())
            .map_err(CamringError::Io)?;

        info!(ring_mb = ring_capacity / (1 << 20), "Writer thread started");
        Ok(WriteThread { shared, join: Some(join) })
    }

    pub fn client(&self) -> WthClient {
        WthClient { shared: self.shared.clone() }
    }

    /// Signal the thread to drain and exit, then join it.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(join) = self.join.take() {
            self.shared.kill.store(true, Ordering::Release);
            self.shared.cv.notify_all();
            if join.join().is_err() {
                error!("Writer thread panicked");
            }
        }
    }
}

impl Drop for WriteThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// [`PairSink`] adapter so the recorder can target the writer thread.
pub struct WthSink {
    client: WthClient,
}

impl WthSink {
    pub fn new(client: WthClient) -> Self {
        WthSink { client }
    }
}

impl PairSink for WthSink {
    type Handle = WthHandle;

    fn open(&mut self, path: &Path) -> Result<WthHandle> {
        self.client.open(path)
    }

    fn write(&mut self, handle: &mut WthHandle, buf: &[u8]) -> Result<usize> {
        Ok(self.client.write(handle, buf))
    }

    fn close(&mut self, handle: WthHandle) {
        self.client.close(handle);
    }
}

// ───────────────────────── consumer side ────────────────────────────────

/// Thread-local drain state: the open files and the framing parser cursor.
struct Drainer {
    shared: Arc<Shared>,
    files: [Option<File>; MAX_HANDLES],
    failed: [bool; MAX_HANDLES],
    header: [u8; REC_HEADER_SIZE],
    header_filled: usize,
    body_remaining: u64,
    body_slot: usize,
}

impl Drainer {
    fn new(shared: Arc<Shared>) -> Self {
        Drainer {
            shared,
            files: Default::default(),
            failed: [false; MAX_HANDLES],
            header: [0u8; REC_HEADER_SIZE],
            header_filled: 0,
            body_remaining: 0,
            body_slot: 0,
        }
    }

    fn run(&mut self) {
        let mut scratch = vec![0u8; WRITE_BLOCK];

        loop {
            self.wait_for_work();
            self.service_opens();

            loop {
                let n = {
                    let mut state = self.shared.state.lock();
                    let n = state.ring.occupied_space().min(WRITE_BLOCK);
                    if n > 0 {
                        state.ring.get(&mut scratch[..n]);
                        state.ring.discard(n);
                    }
                    n
                };
                if n == 0 {
                    break;
                }
                if let Err(e) = self.consume(&scratch[..n]) {
                    // Framing is byte-positional; once lost it cannot be
                    // re-synchronized.
                    error!(error = %e, "Record framing lost, writer thread stopping");
                    self.shared.kill.store(true, Ordering::Release);
                    return;
                }
            }

            self.release_closed();

            if self.shared.kill.load(Ordering::Acquire)
                && self.shared.state.lock().ring.is_empty()
            {
                break;
            }
        }

        info!("Writer thread drained and stopped");
    }

    fn wait_for_work(&mut self) {
        let mut state = self.shared.state.lock();
        while !self.shared.kill.load(Ordering::Acquire)
            && state.ring.is_empty()
            && !state
                .slots
                .iter()
                .any(|s| s.open_requested || (s.acquired && s.expect_close))
        {
            self.shared
                .cv
                .wait_for(&mut state, Duration::from_millis(100));
        }
    }

    /// Open files for slots reserved since the last pass.
    fn service_opens(&mut self) {
        let requests: Vec<(usize, PathBuf)> = {
            let mut state = self.shared.state.lock();
            state
                .slots
                .iter_mut()
                .enumerate()
                .filter(|(_, s)| s.open_requested)
                .map(|(i, s)| {
                    s.open_requested = false;
                    (i, s.path.clone())
                })
                .collect()
        };

        for (slot, path) in requests {
            match OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&path)
            {
                Ok(file) => {
                    self.files[slot] = Some(file);
                    self.failed[slot] = false;
                    debug!(slot, path = %path.display(), "Writer opened file");
                }
                Err(e) => {
                    // Bytes already enqueued for this slot will be skipped
                    // to keep the stream parseable.
                    self.files[slot] = None;
                    self.failed[slot] = true;
                    error!(slot, path = %path.display(), error = %e, "Writer open failed");
                }
            }
        }
    }

    /// Parse framed records out of one peeked chunk. A header or body may
    /// be split across chunk boundaries; the cursor fields carry the
    /// partial state over.
    fn consume(&mut self, mut chunk: &[u8]) -> Result<()> {
        while !chunk.is_empty() {
            if self.body_remaining > 0 {
                let take = (self.body_remaining.min(chunk.len() as u64)) as usize;
                self.write_body(&chunk[..take]);
                self.shared.pending[self.body_slot].fetch_sub(take as u64, Ordering::AcqRel);
                self.body_remaining -= take as u64;
                chunk = &chunk[take..];
            } else {
                let take = (REC_HEADER_SIZE - self.header_filled).min(chunk.len());
                self.header[self.header_filled..self.header_filled + take]
                    .copy_from_slice(&chunk[..take]);
                self.header_filled += take;
                chunk = &chunk[take..];
                if self.header_filled == REC_HEADER_SIZE {
                    self.header_filled = 0;
                    self.begin_record()?;
                }
            }
        }
        Ok(())
    }

    fn begin_record(&mut self) -> Result<()> {
        if self.header[0..2] != GUARD_L || self.header[8..10] != GUARD_R {
            return Err(CamringError::Corrupt(format!(
                "framed record guards mismatch: {:02x?}",
                &self.header[..]
            )));
        }
        let slot = u16::from_be_bytes([self.header[2], self.header[3]]) as usize;
        if slot >= MAX_HANDLES {
            return Err(CamringError::Corrupt(format!(
                "framed record slot out of range: {slot}"
            )));
        }
        let len = u32::from_be_bytes([
            self.header[4],
            self.header[5],
            self.header[6],
            self.header[7],
        ]);
        self.body_slot = slot;
        self.body_remaining = len as u64;

        // The reservation may be newer than the last open pass.
        if self.files[slot].is_none() && !self.failed[slot] {
            self.service_opens();
        }
        Ok(())
    }

    fn write_body(&mut self, body: &[u8]) {
        let slot = self.body_slot;
        match self.files[slot].as_mut() {
            Some(file) => {
                if let Err(e) = file.write_all(body) {
                    error!(slot, error = %e, "Writer write failed, discarding remaining slot bytes");
                    self.files[slot] = None;
                    self.failed[slot] = true;
                }
            }
            None => {
                if !self.failed[slot] {
                    warn!(slot, "No open file for slot, discarding bytes");
                    self.failed[slot] = true;
                }
            }
        }
    }

    /// Release slots whose close was requested and whose bytes are all on
    /// disk.
    fn release_closed(&mut self) {
        let mut state = self.shared.state.lock();
        for (slot, s) in state.slots.iter_mut().enumerate() {
            if s.acquired
                && s.expect_close
                && self.shared.pending[slot].load(Ordering::Acquire) == 0
            {
                self.files[slot] = None;
                self.failed[slot] = false;
                s.acquired = false;
                s.expect_close = false;
                debug!(slot, "Writer slot released");
            }
        }
    }
}
