// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Lock-free single-producer single-consumer byte ring buffer.
//!
//! Used for moving sample data between a non-real-time thread and the audio
//! callback without blocking either side.
//!
//! One slot of the backing store is never filled, so `write_pos == read_pos`
//! always means empty and a buffer of capacity `C` holds at most `C - 1`
//! bytes.
//!
//! # Example
//!
//! ```
//! use sootring::realtime::RingBuffer;
//!
//! let (mut writer, mut reader) = RingBuffer::new(1024).unwrap().split();
//!
//! // Feeder thread pushes samples
//! writer.write(&[1, 2, 3, 4]).unwrap();
//!
//! // Audio callback drains them
//! let mut out = [0u8; 4];
//! reader.read(&mut out).unwrap();
//! assert_eq!(out, [1, 2, 3, 4]);
//! ```

use std::cell::UnsafeCell;
use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by ring buffer operations.
///
/// Transfer errors are whole-request rejections: nothing was copied and no
/// index moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingBufferError {
    #[error("failed to allocate {capacity} byte ring buffer")]
    AllocationFailed { capacity: usize },
    #[error("ring buffer capacity must be at least 2, got {capacity}")]
    InvalidCapacity { capacity: usize },
    #[error("insufficient space: requested {requested} bytes, {available} available")]
    InsufficientSpace { requested: usize, available: usize },
    #[error("insufficient data: requested {requested} bytes, {available} available")]
    InsufficientData { requested: usize, available: usize },
}

/// A fixed-capacity lock-free byte ring buffer.
///
/// Share it between threads with [`RingBuffer::split`]; an unsplit buffer can
/// be used directly through `&mut self`.
pub struct RingBuffer {
    /// Backing store, one cell per byte.
    storage: Box<[UnsafeCell<u8>]>,
    /// Write position (only modified by the writer).
    write_pos: AtomicUsize,
    /// Read position (only modified by the reader).
    read_pos: AtomicUsize,
}

// SAFETY: The ring buffer is designed for SPSC access.
// Only the writer modifies write_pos and the free region of storage.
// Only the reader modifies read_pos and copies out of the filled region.
// A region changes hands only through a release store observed by an acquire load.
unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    /// Create a new ring buffer with `capacity` byte slots.
    ///
    /// Usable capacity is `capacity - 1`.
    pub fn new(capacity: usize) -> Result<Self, RingBufferError> {
        if capacity < 2 {
            return Err(RingBufferError::InvalidCapacity { capacity });
        }

        let mut storage = Vec::new();
        storage
            .try_reserve_exact(capacity)
            .map_err(|_| RingBufferError::AllocationFailed { capacity })?;
        storage.resize_with(capacity, || UnsafeCell::new(0));

        Ok(Self {
            storage: storage.into_boxed_slice(),
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
        })
    }

    /// Total byte slots in the backing store.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Maximum number of bytes the buffer can hold at once.
    pub fn usable_capacity(&self) -> usize {
        self.storage.len() - 1
    }

    /// Split into writer and reader handles.
    pub fn split(self) -> (RingBufferWriter, RingBufferReader) {
        let shared = Arc::new(self);
        (
            RingBufferWriter {
                inner: Arc::clone(&shared),
            },
            RingBufferReader { inner: shared },
        )
    }

    /// Get the number of bytes that can be written right now.
    pub fn available_to_write(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        self.free(write, read)
    }

    /// Get the number of bytes that can be read right now.
    pub fn available_to_read(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        self.filled(write, read)
    }

    /// Check if the buffer holds no data.
    pub fn is_empty(&self) -> bool {
        self.available_to_read() == 0
    }

    /// Check if the buffer has no free space.
    pub fn is_full(&self) -> bool {
        self.available_to_write() == 0
    }

    /// Write all of `data`, or nothing if it does not fit.
    pub fn write(&mut self, data: &[u8]) -> Result<(), RingBufferError> {
        // SAFETY: &mut self excludes any other writer or reader.
        unsafe { self.push(data) }
    }

    /// Fill `dest` completely, or copy nothing if not enough data is buffered.
    pub fn read(&mut self, dest: &mut [u8]) -> Result<(), RingBufferError> {
        // SAFETY: &mut self excludes any other writer or reader.
        unsafe { self.pop(dest) }
    }

    #[inline]
    fn filled(&self, write: usize, read: usize) -> usize {
        let capacity = self.storage.len();
        (capacity + write - read) % capacity
    }

    #[inline]
    fn free(&self, write: usize, read: usize) -> usize {
        let capacity = self.storage.len();
        (capacity + read - write - 1) % capacity
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.storage.as_ptr())
    }

    /// Producer side of a transfer.
    ///
    /// # Safety
    /// Must not run concurrently with another `push`.
    unsafe fn push(&self, data: &[u8]) -> Result<(), RingBufferError> {
        let write = self.write_pos.load(Ordering::Relaxed);
        // Acquire pairs with the reader's release so its copies out of the
        // freed slots finish before we overwrite them.
        let read = self.read_pos.load(Ordering::Acquire);

        let available = self.free(write, read);
        let len = data.len();
        if len > available {
            return Err(RingBufferError::InsufficientSpace {
                requested: len,
                available,
            });
        }

        let capacity = self.storage.len();
        let head = len.min(capacity - write);
        let base = self.base();
        ptr::copy_nonoverlapping(data.as_ptr(), base.add(write), head);
        ptr::copy_nonoverlapping(data.as_ptr().add(head), base, len - head);

        // Publish: a reader that sees the new position also sees the bytes.
        self.write_pos
            .store((write + len) % capacity, Ordering::Release);
        Ok(())
    }

    /// Consumer side of a transfer.
    ///
    /// # Safety
    /// Must not run concurrently with another `pop`.
    unsafe fn pop(&self, dest: &mut [u8]) -> Result<(), RingBufferError> {
        let read = self.read_pos.load(Ordering::Relaxed);
        // Acquire before touching storage.
        let write = self.write_pos.load(Ordering::Acquire);

        let available = self.filled(write, read);
        let len = dest.len();
        if len > available {
            return Err(RingBufferError::InsufficientData {
                requested: len,
                available,
            });
        }

        let capacity = self.storage.len();
        let head = len.min(capacity - read);
        let base = self.base();
        ptr::copy_nonoverlapping(base.add(read), dest.as_mut_ptr(), head);
        ptr::copy_nonoverlapping(base, dest.as_mut_ptr().add(head), len - head);

        self.read_pos
            .store((read + len) % capacity, Ordering::Release);
        Ok(())
    }
}

impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.storage.len())
            .field("write_pos", &self.write_pos)
            .field("read_pos", &self.read_pos)
            .finish()
    }
}

/// Writer handle for the ring buffer.
///
/// Exactly one writer exists per buffer.
#[derive(Debug)]
pub struct RingBufferWriter {
    inner: Arc<RingBuffer>,
}

impl RingBufferWriter {
    /// Write all of `data`, or nothing if it does not fit.
    ///
    /// Never blocks. On `InsufficientSpace` the caller decides whether to
    /// retry later or drop the data.
    pub fn write(&mut self, data: &[u8]) -> Result<(), RingBufferError> {
        // SAFETY: the writer is unique and `write` takes &mut self.
        unsafe { self.inner.push(data) }
    }

    /// Get the number of bytes that can be written right now.
    ///
    /// Only the reader can change this concurrently, and only upwards.
    pub fn available_to_write(&self) -> usize {
        let write = self.inner.write_pos.load(Ordering::Relaxed);
        let read = self.inner.read_pos.load(Ordering::Acquire);
        self.inner.free(write, read)
    }

    /// Get the number of bytes currently buffered.
    pub fn available_to_read(&self) -> usize {
        self.inner.available_to_read()
    }

    /// Total byte slots in the backing store.
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Check if the buffer has no free space.
    pub fn is_full(&self) -> bool {
        self.available_to_write() == 0
    }
}

/// Reader handle for the ring buffer.
///
/// Exactly one reader exists per buffer.
#[derive(Debug)]
pub struct RingBufferReader {
    inner: Arc<RingBuffer>,
}

impl RingBufferReader {
    /// Fill `dest` completely, or copy nothing if not enough data is buffered.
    pub fn read(&mut self, dest: &mut [u8]) -> Result<(), RingBufferError> {
        // SAFETY: the reader is unique and `read` takes &mut self.
        unsafe { self.inner.pop(dest) }
    }

    /// Get the number of bytes that can be read right now.
    ///
    /// Only the writer can change this concurrently, and only upwards.
    pub fn available_to_read(&self) -> usize {
        let read = self.inner.read_pos.load(Ordering::Relaxed);
        let write = self.inner.write_pos.load(Ordering::Acquire);
        self.inner.filled(write, read)
    }

    /// Get the number of bytes that can currently be written.
    pub fn available_to_write(&self) -> usize {
        self.inner.available_to_write()
    }

    /// Total byte slots in the backing store.
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Check if the buffer holds no data.
    pub fn is_empty(&self) -> bool {
        self.available_to_read() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::{Rng, SeedableRng};
    use std::collections::VecDeque;
    use std::thread;

    fn assert_conserved(rb: &RingBuffer) {
        assert_eq!(
            rb.available_to_read() + rb.available_to_write(),
            rb.capacity() - 1
        );
    }

    #[test]
    fn test_fresh_buffer() {
        for capacity in [2, 3, 8, 1000] {
            let rb = RingBuffer::new(capacity).unwrap();
            assert_eq!(rb.available_to_write(), capacity - 1);
            assert_eq!(rb.available_to_read(), 0);
            assert!(rb.is_empty());
        }
    }

    #[test]
    fn test_invalid_capacity() {
        assert_eq!(
            RingBuffer::new(0).unwrap_err(),
            RingBufferError::InvalidCapacity { capacity: 0 }
        );
        assert_eq!(
            RingBuffer::new(1).unwrap_err(),
            RingBufferError::InvalidCapacity { capacity: 1 }
        );
    }

    #[test]
    fn test_allocation_failure() {
        let err = RingBuffer::new(usize::MAX).unwrap_err();
        assert_eq!(
            err,
            RingBufferError::AllocationFailed {
                capacity: usize::MAX
            }
        );
    }

    #[test]
    fn test_wraparound() {
        let mut rb = RingBuffer::new(8).unwrap();

        rb.write(&[1, 2, 3, 4, 5]).unwrap();
        let mut out = [0u8; 3];
        rb.read(&mut out).unwrap();
        assert_eq!(out, [1, 2, 3]);

        // Crosses the end of storage
        rb.write(&[6, 7, 8, 9]).unwrap();
        assert_conserved(&rb);

        let mut out = [0u8; 6];
        rb.read(&mut out).unwrap();
        assert_eq!(out, [4, 5, 6, 7, 8, 9]);
        assert!(rb.is_empty());
    }

    #[test]
    fn test_full_empty_boundary() {
        let mut rb = RingBuffer::new(4).unwrap();

        rb.write(&[10, 20, 30]).unwrap();
        assert_eq!(rb.available_to_write(), 0);
        assert!(rb.is_full());
        assert_eq!(
            rb.write(&[40]),
            Err(RingBufferError::InsufficientSpace {
                requested: 1,
                available: 0
            })
        );

        let mut out = [0u8; 3];
        rb.read(&mut out).unwrap();
        assert_eq!(out, [10, 20, 30]);
        assert_eq!(rb.available_to_read(), 0);
        let mut one = [0u8; 1];
        assert_eq!(
            rb.read(&mut one),
            Err(RingBufferError::InsufficientData {
                requested: 1,
                available: 0
            })
        );
    }

    #[test]
    fn test_rejection_is_noop() {
        let mut rb = RingBuffer::new(8).unwrap();
        rb.write(&[1, 2, 3]).unwrap();

        assert!(rb.write(&[0; 5]).is_err());
        assert_eq!(rb.available_to_read(), 3);
        assert_eq!(rb.available_to_write(), 4);

        let mut dest = [0xEE; 4];
        assert!(rb.read(&mut dest).is_err());
        assert_eq!(dest, [0xEE; 4]);
        assert_eq!(rb.available_to_read(), 3);

        let mut out = [0u8; 3];
        rb.read(&mut out).unwrap();
        assert_eq!(out, [1, 2, 3]);
    }

    #[test]
    fn test_zero_length_transfers() {
        let mut rb = RingBuffer::new(2).unwrap();
        rb.write(&[7]).unwrap();
        rb.write(&[]).unwrap();
        rb.read(&mut []).unwrap();
        assert_eq!(rb.available_to_read(), 1);
    }

    #[test]
    fn test_split_handles() {
        let (mut writer, mut reader) = RingBuffer::new(16).unwrap().split();

        assert!(reader.is_empty());
        writer.write(b"hello").unwrap();
        assert_eq!(reader.available_to_read(), 5);
        assert_eq!(writer.available_to_write(), 10);

        let mut out = [0u8; 5];
        reader.read(&mut out).unwrap();
        assert_eq!(&out, b"hello");
        assert_eq!(writer.available_to_write(), 15);
        assert_eq!(writer.capacity(), 16);
    }

    #[test]
    fn test_concurrent_stress() {
        const CAPACITY: usize = 64;
        const TOTAL: usize = CAPACITY * 200;

        let (mut writer, mut reader) = RingBuffer::new(CAPACITY).unwrap().split();

        let producer = thread::spawn(move || {
            let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
            let mut next = 0usize;
            let mut checksum = 0u64;
            let mut chunk = Vec::with_capacity(CAPACITY);
            while next < TOTAL {
                let len = rng.gen_range(1..CAPACITY).min(TOTAL - next);
                chunk.clear();
                chunk.extend((next..next + len).map(|i| i as u8));
                while writer.write(&chunk).is_err() {
                    thread::yield_now();
                }
                checksum = chunk
                    .iter()
                    .fold(checksum, |acc, &b| acc.wrapping_mul(31).wrapping_add(b as u64));
                next += len;
            }
            checksum
        });

        let mut rng = rand::rngs::StdRng::seed_from_u64(0xfeed);
        let mut received = 0usize;
        let mut checksum = 0u64;
        let mut buf = [0u8; CAPACITY];
        while received < TOTAL {
            let want = rng.gen_range(1..CAPACITY).min(TOTAL - received);
            let len = want.min(reader.available_to_read());
            if len == 0 {
                thread::yield_now();
                continue;
            }
            reader.read(&mut buf[..len]).unwrap();
            for &b in &buf[..len] {
                assert_eq!(b, received as u8, "sequence broken at {}", received);
                checksum = checksum.wrapping_mul(31).wrapping_add(b as u64);
                received += 1;
            }
        }

        assert_eq!(producer.join().unwrap(), checksum);
        assert!(reader.is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Write(Vec<u8>),
        Read(usize),
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_matches_vecdeque(
            capacity in 2usize..24,
            ops in prop::collection::vec(
                prop_oneof![
                    prop::collection::vec(any::<u8>(), 0..24).prop_map(Op::Write),
                    (0usize..24).prop_map(Op::Read),
                ],
                1..100,
            ),
        ) {
            let mut rb = RingBuffer::new(capacity).unwrap();
            let mut model: VecDeque<u8> = VecDeque::new();

            for op in ops {
                match op {
                    Op::Write(data) => {
                        let fits = data.len() <= capacity - 1 - model.len();
                        prop_assert_eq!(rb.write(&data).is_ok(), fits);
                        if fits {
                            model.extend(data);
                        }
                    }
                    Op::Read(len) => {
                        let mut out = vec![0u8; len];
                        let fits = len <= model.len();
                        prop_assert_eq!(rb.read(&mut out).is_ok(), fits);
                        if fits {
                            let expected: Vec<u8> = model.drain(..len).collect();
                            prop_assert_eq!(out, expected);
                        }
                    }
                }
                prop_assert_eq!(rb.available_to_read(), model.len());
                prop_assert_eq!(
                    rb.available_to_read() + rb.available_to_write(),
                    capacity - 1
                );
            }
        }
    }
}
