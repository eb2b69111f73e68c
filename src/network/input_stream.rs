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

use std::future::Future;
use std::io::ErrorKind;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::network::{FragmentedBuffer, StreamChunk};
use crate::{AppError, AppResult};

/// What a [`StreamConsumer`] wants after looking at a chunk.
#[derive(Debug)]
pub enum ConsumeSignal {
    /// Done with this chunk, offer the next one. The whole chunk counts as
    /// consumed, including bytes the consumer never advanced past.
    Continue,
    /// Stop consuming. A returned chunk is pushed back in front of the stream.
    Stop(Option<StreamChunk>),
}

/// Push-style parser fed by [`InputStream::consume`].
///
/// At end of input the consumer is offered one empty chunk; answering
/// `Continue` to it ends the loop as well.
pub trait StreamConsumer {
    fn consume(
        &mut self,
        chunk: StreamChunk,
    ) -> impl Future<Output = AppResult<ConsumeSignal>> + Send;
}

/// Buffered reader over a byte stream.
///
/// Data read from the socket is parked in `buffer` until a caller takes it, so
/// `read_exactly` and `read_up_to` can be cancelled (by a timeout or a `select!`)
/// without losing bytes.
#[derive(Debug)]
pub struct InputStream<R> {
    reader: R,
    buffer: BytesMut,
    read_size: usize,
    eof: bool,
}

impl<R: AsyncRead + Unpin> InputStream<R> {
    pub fn new(reader: R, read_size: usize) -> Self {
        InputStream {
            reader,
            buffer: BytesMut::with_capacity(read_size),
            read_size: read_size.max(1),
            eof: false,
        }
    }

    /// True once the peer closed its side and every buffered byte was handed out.
    pub fn eof(&self) -> bool {
        self.eof && self.buffer.is_empty()
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    async fn fill(&mut self) -> AppResult<usize> {
        if self.eof {
            return Ok(0);
        }
        self.buffer.reserve(self.read_size);
        let n = self
            .reader
            .read_buf(&mut self.buffer)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::ConnectionReset => AppError::ConnectionReset,
                _ => AppError::IoError(e),
            })?;
        if n == 0 {
            trace!("input stream reached end of file");
            self.eof = true;
        }
        Ok(n)
    }

    /// Reads exactly `n` bytes. Fewer bytes come back only when the stream ends
    /// first, an empty result meaning it ended before anything arrived.
    pub async fn read_exactly(&mut self, n: usize) -> AppResult<Bytes> {
        while self.buffer.len() < n {
            if self.fill().await? == 0 {
                break;
            }
        }
        let available = n.min(self.buffer.len());
        Ok(self.buffer.split_to(available).freeze())
    }

    /// Returns whatever is buffered, up to `n` bytes, reading once if nothing is.
    pub async fn read_up_to(&mut self, n: usize) -> AppResult<Bytes> {
        if self.buffer.is_empty() {
            self.fill().await?;
        }
        let available = n.min(self.buffer.len());
        Ok(self.buffer.split_to(available).freeze())
    }

    /// Reads `n` bytes as a list of chunks no larger than the read size. Stops
    /// short only at end of stream.
    ///
    /// Unlike `read_exactly` this is not cancel safe: chunks collected so far are
    /// lost if the future is dropped.
    pub async fn read_fragmented(&mut self, n: usize) -> AppResult<FragmentedBuffer> {
        let mut fragments = FragmentedBuffer::new();
        while fragments.size_bytes() < n {
            let wanted = (n - fragments.size_bytes()).min(self.read_size);
            let chunk = self.read_up_to(wanted).await?;
            if chunk.is_empty() {
                break;
            }
            fragments.push(chunk);
        }
        Ok(fragments)
    }

    /// Feeds buffered data and then fresh reads to `consumer` until it stops, or
    /// until it continues past the end-of-input chunk.
    pub async fn consume<C>(&mut self, consumer: &mut C) -> AppResult<()>
    where
        C: StreamConsumer + ?Sized,
    {
        loop {
            if self.buffer.is_empty() {
                self.fill().await?;
            }
            let at_eof = self.buffer.is_empty();
            let chunk = StreamChunk::new(self.buffer.split().freeze());
            match consumer.consume(chunk).await? {
                ConsumeSignal::Continue if at_eof => return Ok(()),
                ConsumeSignal::Continue => {}
                ConsumeSignal::Stop(rest) => {
                    if let Some(rest) = rest {
                        self.unread(rest);
                    }
                    return Ok(());
                }
            }
        }
    }

    fn unread(&mut self, rest: StreamChunk) {
        if !rest.has_remaining() {
            return;
        }
        let mut front = BytesMut::from(rest.chunk());
        front.unsplit(self.buffer.split());
        self.buffer = front;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tokio::io::{AsyncRead, ReadBuf};

    /// Hands out its data in the given pieces, one piece per read at most.
    #[derive(Debug, Default)]
    pub(crate) struct ChunkedReader {
        chunks: VecDeque<Vec<u8>>,
    }

    impl ChunkedReader {
        pub(crate) fn new<I, C>(chunks: I) -> Self
        where
            I: IntoIterator<Item = C>,
            C: AsRef<[u8]>,
        {
            ChunkedReader {
                chunks: chunks.into_iter().map(|c| c.as_ref().to_vec()).collect(),
            }
        }

        /// Splits `data` into pieces of `piece` bytes.
        pub(crate) fn split(data: &[u8], piece: usize) -> Self {
            ChunkedReader::new(data.chunks(piece.max(1)))
        }
    }

    impl AsyncRead for ChunkedReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if let Some(front) = self.chunks.front_mut() {
                let n = front.len().min(buf.remaining());
                buf.put_slice(&front[..n]);
                front.drain(..n);
                if front.is_empty() {
                    self.chunks.pop_front();
                }
            }
            Poll::Ready(Ok(()))
        }
    }
}
