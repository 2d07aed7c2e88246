// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Real-time safe byte transport.
//!
//! This module provides the lock-free ring buffer used to hand sample data
//! between a feeder thread and the audio thread.
//!
//! # Real-Time Safety
//!
//! The audio thread has strict requirements:
//! - No memory allocation
//! - No locks (mutexes, RwLocks)
//! - No system calls (file I/O, network)
//! - Bounded execution time
//!
//! Every transfer operation here is O(length), never blocks and never
//! allocates. Allocation happens once, in [`RingBuffer::new`].

pub mod ringbuf;

pub use ringbuf::{RingBuffer, RingBufferError, RingBufferReader, RingBufferWriter};
