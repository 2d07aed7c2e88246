// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! SootRing - Lock-free byte transport for real-time audio.
//!
//! The core is [`realtime::RingBuffer`], a fixed-capacity single-producer
//! single-consumer byte ring that lets a feeder thread and an audio callback
//! exchange samples without locks or allocation. The remaining modules carry
//! configuration, console text posting and a transfer driver used by the
//! `sootring-pump` binary.

pub mod config;
pub mod post;
pub mod pump;
pub mod realtime;

pub use realtime::{RingBuffer, RingBufferError, RingBufferReader, RingBufferWriter};
