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

//! Fragmented Buffer
//!
//! A byte sequence kept as a list of reference counted chunks, so frames larger
//! than a single socket read are never copied into one contiguous allocation.
//!
//! - `share` hands out a zero-copy view of a region
//! - `reader` hands out a consuming view that implements [`bytes::Buf`]
//! - `read_bytes` consumes from the front, copying only across chunk borders

use std::collections::VecDeque;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{AppError, AppResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentedBuffer {
    chunks: VecDeque<Bytes>,
    size: usize,
}

impl FragmentedBuffer {
    pub fn new() -> Self {
        FragmentedBuffer::default()
    }

    pub fn from_chunks<I: IntoIterator<Item = Bytes>>(chunks: I) -> Self {
        let mut buffer = FragmentedBuffer::new();
        for chunk in chunks {
            buffer.push(chunk);
        }
        buffer
    }

    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.size += chunk.len();
        self.chunks.push_back(chunk);
    }

    pub fn size_bytes(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Bytes> {
        self.chunks.iter()
    }

    /// Consuming view over the same chunks. Reading through it leaves this
    /// buffer untouched.
    pub fn reader(&self) -> FragmentedReader {
        FragmentedReader {
            chunks: self.chunks.clone(),
            remaining: self.size,
        }
    }

    /// Zero-copy view of `len` bytes starting at `pos`.
    ///
    /// Panics if the region does not lie inside the buffer.
    pub fn share(&self, pos: usize, len: usize) -> FragmentedBuffer {
        assert!(
            pos.checked_add(len).is_some_and(|end| end <= self.size),
            "share({}, {}) out of a {} byte buffer",
            pos,
            len,
            self.size
        );
        let mut shared = FragmentedBuffer::new();
        let mut skip = pos;
        let mut wanted = len;
        for chunk in &self.chunks {
            if wanted == 0 {
                break;
            }
            if skip >= chunk.len() {
                skip -= chunk.len();
                continue;
            }
            let take = (chunk.len() - skip).min(wanted);
            shared.push(chunk.slice(skip..skip + take));
            skip = 0;
            wanted -= take;
        }
        shared
    }

    /// Removes exactly `n` bytes from the front. Zero-copy when they sit in a
    /// single chunk.
    pub fn read_bytes(&mut self, n: usize) -> AppResult<Bytes> {
        if n > self.size {
            return Err(AppError::ShortRead {
                expected: n,
                actual: self.size,
            });
        }
        let mut reader = FragmentedReader {
            chunks: std::mem::take(&mut self.chunks),
            remaining: self.size,
        };
        let bytes = reader.copy_to_bytes(n);
        self.chunks = reader.chunks;
        self.size = reader.remaining;
        Ok(bytes)
    }

    /// Copies everything into one contiguous buffer.
    pub fn to_bytes(&self) -> Bytes {
        match self.chunks.len() {
            0 => Bytes::new(),
            1 => self.chunks[0].clone(),
            _ => {
                let mut linear = BytesMut::with_capacity(self.size);
                for chunk in &self.chunks {
                    linear.put_slice(chunk);
                }
                linear.freeze()
            }
        }
    }
}

impl From<Bytes> for FragmentedBuffer {
    fn from(value: Bytes) -> Self {
        FragmentedBuffer::from_chunks([value])
    }
}

/// Consuming view of a [`FragmentedBuffer`], one chunk at a time.
#[derive(Debug, Clone)]
pub struct FragmentedReader {
    chunks: VecDeque<Bytes>,
    remaining: usize,
}

impl FragmentedReader {
    /// Hands out the rest of the current chunk.
    pub fn next_chunk(&mut self) -> Option<Bytes> {
        let chunk = self.chunks.pop_front()?;
        self.remaining -= chunk.len();
        Some(chunk)
    }
}

impl Buf for FragmentedReader {
    fn remaining(&self) -> usize {
        self.remaining
    }

    fn chunk(&self) -> &[u8] {
        match self.chunks.front() {
            Some(chunk) => chunk,
            None => &[],
        }
    }

    fn advance(&mut self, mut cnt: usize) {
        assert!(
            cnt <= self.remaining,
            "advance({}) past the {} remaining bytes",
            cnt,
            self.remaining
        );
        self.remaining -= cnt;
        while cnt > 0 {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };
            if cnt < front.len() {
                front.advance(cnt);
                break;
            }
            cnt -= front.len();
            self.chunks.pop_front();
        }
    }

    fn copy_to_bytes(&mut self, len: usize) -> Bytes {
        assert!(
            len <= self.remaining,
            "copy_to_bytes({}) past the {} remaining bytes",
            len,
            self.remaining
        );
        if let Some(front) = self.chunks.front_mut() {
            if len <= front.len() {
                let bytes = front.split_to(len);
                if front.is_empty() {
                    self.chunks.pop_front();
                }
                self.remaining -= len;
                return bytes;
            }
        }
        let mut linear = BytesMut::with_capacity(len);
        linear.put((&mut *self).take(len));
        linear.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FragmentedBuffer {
        FragmentedBuffer::from_chunks([
            Bytes::from_static(b"abc"),
            Bytes::new(),
            Bytes::from_static(b"defg"),
            Bytes::from_static(b"hi"),
        ])
    }

    #[test]
    fn test_empty_chunks_are_skipped() {
        let buffer = sample();
        assert_eq!(buffer.size_bytes(), 9);
        assert_eq!(buffer.chunk_count(), 3);
        assert_eq!(&buffer.to_bytes()[..], b"abcdefghi");
    }

    #[test]
    fn test_share_region_across_chunks() {
        let buffer = sample();
        let shared = buffer.share(2, 5);
        assert_eq!(shared.size_bytes(), 5);
        assert_eq!(shared.chunk_count(), 2);
        assert_eq!(&shared.to_bytes()[..], b"cdefg");
        assert_eq!(buffer.share(9, 0).size_bytes(), 0);
        // the shared buffer keeps its own view
        assert_eq!(buffer.size_bytes(), 9);
    }

    #[test]
    #[should_panic(expected = "out of a 9 byte buffer")]
    fn test_share_out_of_range_panics() {
        sample().share(5, 5);
    }

    #[test]
    fn test_read_bytes() {
        let mut buffer = sample();
        assert_eq!(&buffer.read_bytes(2).unwrap()[..], b"ab");
        assert_eq!(&buffer.read_bytes(3).unwrap()[..], b"cde");
        assert_eq!(buffer.size_bytes(), 4);
        assert!(matches!(
            buffer.read_bytes(5),
            Err(AppError::ShortRead {
                expected: 5,
                actual: 4
            })
        ));
        assert_eq!(&buffer.read_bytes(4).unwrap()[..], b"fghi");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_reader_leaves_buffer_intact() {
        let buffer = sample();
        let mut reader = buffer.reader();
        assert_eq!(reader.get_u8(), b'a');
        reader.advance(3);
        assert_eq!(reader.chunk(), b"efg");
        assert_eq!(&reader.copy_to_bytes(4)[..], b"efgh");
        assert_eq!(reader.next_chunk().as_deref(), Some(&b"i"[..]));
        assert_eq!(reader.remaining(), 0);
        assert!(reader.next_chunk().is_none());
        assert_eq!(buffer.size_bytes(), 9);
    }
}
