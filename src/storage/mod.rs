// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Storage subsystem: byte ring + record formats + rotation + write thread.

pub mod format;
pub mod ring;
pub mod rotate;
pub mod writer;
