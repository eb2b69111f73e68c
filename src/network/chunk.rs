// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{Buf, Bytes};

/// A buffer lent to a stream consumer.
///
/// The consumed prefix lives in a cursor shared with every [`ChunkTracker`] taken
/// from the chunk, so a tracker sees exactly how far the owner advanced. Moving
/// the chunk around does not touch the cursor, only `advance`/`take_bytes` do.
/// The chunk itself is not `Clone`: it is the single writer of its cursor.
#[derive(Debug)]
pub struct StreamChunk {
    data: Bytes,
    cursor: Arc<AtomicUsize>,
}

impl StreamChunk {
    pub fn new(data: Bytes) -> Self {
        StreamChunk {
            data,
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn position(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.data.len() - self.position()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes the next `n` bytes without copying and advances past them.
    ///
    /// Panics if fewer than `n` bytes remain.
    pub fn take_bytes(&mut self, n: usize) -> Bytes {
        let start = self.position();
        assert!(
            n <= self.data.len() - start,
            "take_bytes({}) on a chunk with {} bytes left",
            n,
            self.data.len() - start
        );
        let taken = self.data.slice(start..start + n);
        self.cursor.store(start + n, Ordering::Release);
        taken
    }

    /// A read-only view of this chunk's progress.
    pub fn tracker(&self) -> ChunkTracker {
        ChunkTracker {
            data: self.data.clone(),
            start: self.position(),
            cursor: self.cursor.clone(),
        }
    }

    /// The bytes not consumed yet.
    pub fn into_remaining(self) -> Bytes {
        let start = self.position();
        self.data.slice(start..)
    }
}

impl Buf for StreamChunk {
    fn remaining(&self) -> usize {
        self.len()
    }

    fn chunk(&self) -> &[u8] {
        &self.data[self.position()..]
    }

    fn advance(&mut self, cnt: usize) {
        let _ = self.take_bytes(cnt);
    }

    fn copy_to_bytes(&mut self, len: usize) -> Bytes {
        self.take_bytes(len)
    }
}

/// Shared, non-owning view of a [`StreamChunk`]'s consumed cursor.
#[derive(Debug)]
pub struct ChunkTracker {
    data: Bytes,
    start: usize,
    cursor: Arc<AtomicUsize>,
}

impl ChunkTracker {
    /// Bytes the owning chunk still holds.
    pub fn remaining_length(&self) -> usize {
        self.data.len() - self.cursor.load(Ordering::Acquire)
    }

    /// Bytes the owner advanced past since this tracker was taken, in order.
    pub fn consumed(&self) -> &[u8] {
        &self.data[self.start..self.cursor.load(Ordering::Acquire)]
    }

    /// Everything the chunk held when this tracker was taken.
    pub fn offered(&self) -> &[u8] {
        &self.data[self.start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_follows_owner() {
        let mut chunk = StreamChunk::new(Bytes::from_static(b"0123456789"));
        let tracker = chunk.tracker();
        assert_eq!(tracker.remaining_length(), 10);
        assert!(tracker.consumed().is_empty());

        assert_eq!(chunk.get_u16(), u16::from_be_bytes(*b"01"));
        assert_eq!(&chunk.take_bytes(3)[..], b"234");
        assert_eq!(tracker.remaining_length(), 5);
        assert_eq!(tracker.consumed(), b"01234");

        // moving ownership does not consume anything
        let moved = chunk;
        assert_eq!(tracker.remaining_length(), 5);
        assert_eq!(&moved.into_remaining()[..], b"56789");
        assert_eq!(tracker.remaining_length(), 5);
    }

    #[test]
    fn test_late_tracker_starts_at_cursor() {
        let mut chunk = StreamChunk::new(Bytes::from_static(b"abcdef"));
        chunk.advance(2);
        let tracker = chunk.tracker();
        chunk.advance(1);
        assert_eq!(tracker.consumed(), b"c");
        assert_eq!(tracker.offered(), b"cdef");
        assert_eq!(chunk.chunk(), b"def");
    }

    #[test]
    #[should_panic(expected = "take_bytes(4)")]
    fn test_take_past_end_panics() {
        let mut chunk = StreamChunk::new(Bytes::from_static(b"abc"));
        chunk.take_bytes(4);
    }
}
