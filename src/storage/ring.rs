// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Bounded byte ring, the staging buffer between frame arrival and disk.
//!
//! Single producer, single consumer. `save` is all-or-nothing so a record
//! (header or frame payload) is never half-stored; `get` peeks without
//! consuming so the consumer can issue a short disk write and `discard`
//! only what actually landed.

use crate::error::{CamringError, Result};

/// Fixed-capacity FIFO over raw bytes with wrap-around.
pub struct ByteRing {
    buf: Vec<u8>,
    capacity: usize,
    free: usize,
    /// Consumer position: index of the oldest stored byte.
    start: usize,
    /// Producer position: index one past the newest stored byte.
    end: usize,
}

impl ByteRing {
    /// Allocate a ring of `capacity` bytes. Allocation failure is reported
    /// rather than aborting, since capacities here are tens of megabytes.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity).map_err(|e| {
            CamringError::Exhausted(format!("ring allocation of {capacity} bytes: {e}"))
        })?;
        buf.resize(capacity, 0);
        Ok(ByteRing {
            buf,
            capacity,
            free: capacity,
            start: 0,
            end: 0,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.free == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn free_space(&self) -> usize {
        self.free
    }

    pub fn occupied_space(&self) -> usize {
        self.capacity - self.free
    }

    /// Store `src` at the producer end. All-or-nothing: returns 0 and
    /// leaves the ring untouched when `src` does not fit, otherwise the
    /// full length.
    pub fn save(&mut self, src: &[u8]) -> usize {
        let len = src.len();
        if len > self.free {
            return 0;
        }

        let first = len.min(self.capacity - self.end);
        self.buf[self.end..self.end + first].copy_from_slice(&src[..first]);
        if first < len {
            self.buf[..len - first].copy_from_slice(&src[first..]);
        }
        self.end = (self.end + len) % self.capacity;
        self.free -= len;
        len
    }

    /// Peek up to `dst.len()` bytes from the consumer end without
    /// consuming them. Returns the number of bytes copied.
    pub fn get(&self, dst: &mut [u8]) -> usize {
        let len = dst.len().min(self.occupied_space());
        if len == 0 {
            return 0;
        }

        let first = len.min(self.capacity - self.start);
        dst[..first].copy_from_slice(&self.buf[self.start..self.start + first]);
        if first < len {
            dst[first..len].copy_from_slice(&self.buf[..len - first]);
        }
        len
    }

    /// Consume up to `len` bytes from the consumer end, zeroing the freed
    /// region. Returns the number of bytes discarded.
    pub fn discard(&mut self, len: usize) -> usize {
        let len = len.min(self.occupied_space());
        if len == 0 {
            return 0;
        }

        let first = len.min(self.capacity - self.start);
        self.buf[self.start..self.start + first].fill(0);
        if first < len {
            self.buf[..len - first].fill(0);
        }
        self.start = (self.start + len) % self.capacity;
        self.free += len;
        len
    }
}

impl std::fmt::Debug for ByteRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteRing")
            .field("capacity", &self.capacity)
            .field("free", &self.free)
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}
