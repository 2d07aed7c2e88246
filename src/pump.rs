// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Producer/consumer transfer driver.
//!
//! Moves an incrementing byte sequence through a [`RingBuffer`] from a feeder
//! thread to a drain thread in randomly sized chunks, verifying on the drain
//! side that every byte arrives once and in order. Backpressure is the
//! caller's job here: both sides poll and yield on rejection.

use crate::config::{PumpConfig, RingConfig};
use crate::realtime::{RingBuffer, RingBufferError, RingBufferReader, RingBufferWriter};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PumpError {
    #[error("max_chunk must be at least 1")]
    InvalidChunk,
    #[error("sequence broken at byte {offset}: expected {expected}, found {found}")]
    SequenceBroken { offset: u64, expected: u8, found: u8 },
    #[error("checksum mismatch: sent {sent:#018x}, received {received:#018x}")]
    ChecksumMismatch { sent: u64, received: u64 },
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("ring buffer error: {0}")]
    Ring(#[from] RingBufferError),
}

/// Outcome of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub bytes: u64,
    pub write_chunks: u64,
    pub read_chunks: u64,
    /// Writes rejected for lack of space.
    pub write_rejections: u64,
    /// Polls that found nothing to read.
    pub empty_polls: u64,
    /// Times the read position wrapped past the end of storage.
    pub wraps: u64,
    pub checksum: u64,
    pub elapsed: Duration,
}

impl TransferReport {
    /// Throughput in MiB per second.
    pub fn mib_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.bytes as f64 / (1024.0 * 1024.0) / secs
    }
}

/// Running checksum over the transferred stream.
#[derive(Debug, Clone, Copy, Default)]
struct Checksum(u64);

impl Checksum {
    fn update(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = self.0.wrapping_mul(31).wrapping_add(b as u64);
        }
    }
}

struct ProducerStats {
    chunks: u64,
    rejections: u64,
    checksum: u64,
}

struct ConsumerStats {
    chunks: u64,
    empty_polls: u64,
    wraps: u64,
    checksum: u64,
}

/// Run a full transfer on two threads.
pub fn run(ring: &RingConfig, pump: &PumpConfig) -> Result<TransferReport, PumpError> {
    if pump.max_chunk == 0 {
        return Err(PumpError::InvalidChunk);
    }

    let buffer = RingBuffer::new(ring.capacity)?;
    let capacity = buffer.capacity();
    let max_chunk = pump.max_chunk.min(buffer.usable_capacity());
    let seed = pump.seed.unwrap_or_else(rand::random);
    let total = pump.total_bytes;

    info!(
        "Pumping {} bytes through {} byte ring (max chunk {}, seed {})",
        total, capacity, max_chunk, seed
    );

    let (writer, reader) = buffer.split();
    let stop = Arc::new(AtomicBool::new(false));
    let start = Instant::now();

    let producer_stop = Arc::clone(&stop);
    let producer = thread::Builder::new()
        .name("sootring-producer".to_string())
        .spawn(move || produce(writer, total, max_chunk, seed, &producer_stop))?;

    let consumed = consume(
        reader,
        total,
        max_chunk,
        seed.wrapping_add(1),
        capacity,
    );
    if consumed.is_err() {
        // The producer may be waiting on space nobody will free.
        stop.store(true, Ordering::Relaxed);
    }

    let produced = producer
        .join()
        .map_err(|_| PumpError::ThreadPanicked("producer"))?;
    let consumed = consumed?;
    let elapsed = start.elapsed();

    verify_checksums(produced.checksum, consumed.checksum)?;

    let report = TransferReport {
        bytes: total,
        write_chunks: produced.chunks,
        read_chunks: consumed.chunks,
        write_rejections: produced.rejections,
        empty_polls: consumed.empty_polls,
        wraps: consumed.wraps,
        checksum: consumed.checksum,
        elapsed,
    };
    debug!("Transfer finished: {:?}", report);
    Ok(report)
}

fn produce(
    mut writer: RingBufferWriter,
    total: u64,
    max_chunk: usize,
    seed: u64,
    stop: &AtomicBool,
) -> ProducerStats {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut chunk = Vec::with_capacity(max_chunk);
    let mut stats = ProducerStats {
        chunks: 0,
        rejections: 0,
        checksum: 0,
    };
    let mut checksum = Checksum::default();
    let mut sent = 0u64;

    while sent < total {
        let len = rng.gen_range(1..=max_chunk).min(remaining(total, sent));
        chunk.clear();
        chunk.extend((sent..sent + len as u64).map(|i| i as u8));

        while writer.write(&chunk).is_err() {
            if stop.load(Ordering::Relaxed) {
                return stats;
            }
            stats.rejections += 1;
            thread::yield_now();
        }

        checksum.update(&chunk);
        stats.chunks += 1;
        sent += len as u64;
    }

    stats.checksum = checksum.0;
    stats
}

fn consume(
    mut reader: RingBufferReader,
    total: u64,
    max_chunk: usize,
    seed: u64,
    capacity: usize,
) -> Result<ConsumerStats, PumpError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut buf = vec![0u8; max_chunk];
    let mut stats = ConsumerStats {
        chunks: 0,
        empty_polls: 0,
        wraps: 0,
        checksum: 0,
    };
    let mut checksum = Checksum::default();
    let mut received = 0u64;
    let mut position = 0usize;

    while received < total {
        let want = rng.gen_range(1..=max_chunk).min(remaining(total, received));
        // Only the producer can change this, and only upwards.
        let len = want.min(reader.available_to_read());
        if len == 0 {
            stats.empty_polls += 1;
            thread::yield_now();
            continue;
        }

        let data = &mut buf[..len];
        reader.read(data)?;
        verify_chunk(received, data)?;

        checksum.update(data);
        stats.chunks += 1;
        received += len as u64;
        position += len;
        if position >= capacity {
            position -= capacity;
            stats.wraps += 1;
        }
    }

    stats.checksum = checksum.0;
    Ok(stats)
}

/// Bytes left to move, saturated to what a chunk length can express.
fn remaining(total: u64, done: u64) -> usize {
    usize::try_from(total - done).unwrap_or(usize::MAX)
}

/// Check that `data` continues the incrementing sequence at `offset`.
fn verify_chunk(offset: u64, data: &[u8]) -> Result<(), PumpError> {
    for (i, &found) in data.iter().enumerate() {
        let offset = offset + i as u64;
        let expected = offset as u8;
        if found != expected {
            return Err(PumpError::SequenceBroken {
                offset,
                expected,
                found,
            });
        }
    }
    Ok(())
}

fn verify_checksums(sent: u64, received: u64) -> Result<(), PumpError> {
    if sent != received {
        return Err(PumpError::ChecksumMismatch { sent, received });
    }
    Ok(())
}
