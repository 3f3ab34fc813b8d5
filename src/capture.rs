//! Capture source abstraction.
//!
//! The device driver is an external collaborator; the recorder only ever
//! sees timestamped payload buffers and returns them through a requeue
//! channel, mirroring a queued-buffer capture protocol. `DeviceReader`
//! is the production feeder: each successful read of the device node
//! yields one compressed frame.

use std::path::PathBuf;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::CaptureConfig;
use crate::error::{CamringError, Result};
use crate::storage::format::TimeVal;

/// One device buffer slot's worth of captured bytes.
#[derive(Debug)]
pub struct FrameBuf {
    /// Slot index in the device-side queue.
    pub index: u32,
    pub data: Bytes,
    /// Valid prefix of `data`.
    pub bytes_used: usize,
}

/// A frame as delivered by the device readiness callback.
#[derive(Debug)]
pub struct CapturedFrame {
    pub buf: FrameBuf,
    /// Capture time on the monotonic clock.
    pub timestamp: TimeVal,
}

/// Consumer end of the capture pipe, held by the recorder.
pub struct FrameSource {
    rx: mpsc::Receiver<CapturedFrame>,
    requeue_tx: mpsc::Sender<u32>,
    queued: usize,
}

impl FrameSource {
    /// Receive the next frame. `None` when the feeder shut down.
    pub async fn read_frame(&mut self) -> Option<CapturedFrame> {
        let frame = self.rx.recv().await?;
        self.queued = self.queued.saturating_sub(1);
        Some(frame)
    }

    /// Return a drained buffer slot to the device queue. False when the
    /// slot could not be requeued and is lost to the stream.
    pub fn requeue(&mut self, buf: FrameBuf) -> bool {
        match self.requeue_tx.try_send(buf.index) {
            Ok(()) => {
                self.queued += 1;
                true
            }
            Err(_) => false,
        }
    }

    /// Device-side buffers believed to be queued for capture.
    pub fn queued(&self) -> usize {
        self.queued
    }
}

/// Producer end of the capture pipe, held by the device task (or a test).
pub struct FrameFeeder {
    pub tx: mpsc::Sender<CapturedFrame>,
    pub requeue_rx: mpsc::Receiver<u32>,
}

/// Build the capture pipe with `queue_depth` buffer slots believed queued.
pub fn frame_channel(queue_depth: usize) -> (FrameFeeder, FrameSource) {
    let (tx, rx) = mpsc::channel::<CapturedFrame>(queue_depth.max(1));
    let (requeue_tx, requeue_rx) = mpsc::channel::<u32>(queue_depth.max(1));
    (
        FrameFeeder { tx, requeue_rx },
        FrameSource { rx, requeue_tx, queued: queue_depth },
    )
}

/// Read-based frame feeder over a device node.
pub struct DeviceReader {
    path: PathBuf,
    frame_buffer: usize,
    queue_depth: usize,
}

impl DeviceReader {
    pub fn new(config: &CaptureConfig) -> Self {
        DeviceReader {
            path: config.device.clone(),
            frame_buffer: config.frame_buffer_kb * 1024,
            queue_depth: config.queue_depth,
        }
    }

    /// Open the device and start the feeder task. One read yields one
    /// frame; reads beyond the queue depth wait for requeued slots.
    pub async fn spawn(self) -> Result<(FrameSource, tokio::task::JoinHandle<()>)> {
        let mut file = tokio::fs::File::open(&self.path).await.map_err(|e| {
            CamringError::Config(format!("cannot open device {}: {e}", self.path.display()))
        })?;
        info!(device = %self.path.display(), "Capture device opened");

        let (mut feeder, source) = frame_channel(self.queue_depth);
        let frame_buffer = self.frame_buffer;
        let queue_depth = self.queue_depth as u32;
        let path = self.path;

        let handle = tokio::spawn(async move {
            let mut free: Vec<u32> = (0..queue_depth).collect();
            loop {
                // Reclaim returned slots; block only when none are free.
                loop {
                    match feeder.requeue_rx.try_recv() {
                        Ok(slot) => free.push(slot),
                        Err(_) => break,
                    }
                }
                let slot = match free.pop() {
                    Some(s) => s,
                    None => match feeder.requeue_rx.recv().await {
                        Some(s) => s,
                        None => break,
                    },
                };

                let mut buf = vec![0u8; frame_buffer];
                let n = match file.read(&mut buf).await {
                    Ok(0) => {
                        warn!(device = %path.display(), "Device stream ended");
                        break;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        error!(device = %path.display(), error = %e, "Device read failed");
                        break;
                    }
                };

                buf.truncate(n);
                let frame = CapturedFrame {
                    buf: FrameBuf { index: slot, data: Bytes::from(buf), bytes_used: n },
                    timestamp: TimeVal::now_mono(),
                };
                if feeder.tx.send(frame).await.is_err() {
                    break;
                }
            }
            info!("Device feeder stopped");
        });

        Ok((source, handle))
    }
}
