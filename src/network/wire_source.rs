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

//! Checksummed reads on top of an [`InputStream`].
//!
//! Every byte handed out by a [`WireSource`] is folded into a running xxh64 and
//! counted, in stream order. The digest is compared against a frame's checksum
//! field once the frame has been read.

use bytes::Bytes;
use tokio::io::AsyncRead;
use xxhash_rust::xxh64::Xxh64;

use crate::network::{ConsumeSignal, FragmentedBuffer, InputStream, StreamChunk, StreamConsumer};
use crate::AppResult;

pub struct WireSource<'a, R> {
    stream: &'a mut InputStream<R>,
    hash: Xxh64,
    size: usize,
}

impl<'a, R: AsyncRead + Unpin> WireSource<'a, R> {
    pub fn new(stream: &'a mut InputStream<R>) -> Self {
        WireSource {
            stream,
            hash: Xxh64::new(0),
            size: 0,
        }
    }

    /// Same as [`InputStream::read_exactly`], folding whatever came back.
    pub async fn read_exactly(&mut self, n: usize) -> AppResult<Bytes> {
        let bytes = self.stream.read_exactly(n).await?;
        self.fold(&bytes);
        Ok(bytes)
    }

    /// Reads `n` bytes as fragments and folds each fragment in order.
    pub async fn read_fragbuf(&mut self, n: usize) -> AppResult<FragmentedBuffer> {
        let fragments = self.stream.read_fragmented(n).await?;
        let mut view = fragments.reader();
        while let Some(chunk) = view.next_chunk() {
            self.fold(&chunk);
        }
        Ok(fragments)
    }

    /// Runs `consumer` over the stream and folds, for every chunk, the prefix
    /// the stream will not hand out again.
    ///
    /// That is the whole chunk when the consumer continues or stops without a
    /// remainder, and everything before the remainder when it hands one back.
    /// A failing consumer still gets the bytes it advanced past folded.
    pub async fn consume<C>(&mut self, consumer: &mut C) -> AppResult<()>
    where
        C: StreamConsumer + Send,
    {
        let mut tracking = TrackingConsumer {
            inner: consumer,
            hash: &mut self.hash,
            size: &mut self.size,
        };
        self.stream.consume(&mut tracking).await
    }

    /// Bytes folded so far.
    pub fn size_bytes(&self) -> usize {
        self.size
    }

    /// Digest of the bytes folded so far. Reading on keeps extending it.
    pub fn checksum(&self) -> u64 {
        self.hash.digest()
    }

    fn fold(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.hash.update(bytes);
        self.size += bytes.len();
    }
}

struct TrackingConsumer<'c, C> {
    inner: &'c mut C,
    hash: &'c mut Xxh64,
    size: &'c mut usize,
}

impl<C: StreamConsumer + Send> StreamConsumer for TrackingConsumer<'_, C> {
    async fn consume(&mut self, chunk: StreamChunk) -> AppResult<ConsumeSignal> {
        let offered = chunk.len();
        let tracker = chunk.tracker();
        let signal = self.inner.consume(chunk).await;

        // what the stream keeps for later reads, the rest is gone for good
        let kept = match &signal {
            Ok(ConsumeSignal::Stop(Some(rest))) => {
                debug_assert_eq!(rest.len(), tracker.remaining_length());
                tracker.remaining_length()
            }
            Ok(ConsumeSignal::Continue) | Ok(ConsumeSignal::Stop(None)) => 0,
            Err(_) => tracker.remaining_length(),
        };
        let consumed = &tracker.offered()[..offered - kept];
        if !consumed.is_empty() {
            self.hash.update(consumed);
            *self.size += consumed.len();
        }
        signal
    }
}
