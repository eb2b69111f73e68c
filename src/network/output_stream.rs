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

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use crate::{AppError, AppResult};

/// An outgoing message assembled from separately owned pieces.
#[derive(Debug, Default, Clone)]
pub struct ScatteredMessage {
    chunks: Vec<Bytes>,
    size: usize,
}

impl ScatteredMessage {
    pub fn new() -> Self {
        ScatteredMessage::default()
    }

    pub fn append(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.size += chunk.len();
        self.chunks.push(chunk);
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }
}

impl From<Bytes> for ScatteredMessage {
    fn from(value: Bytes) -> Self {
        let mut message = ScatteredMessage::new();
        message.append(value);
        message
    }
}

/// Buffered writer that pushes to the socket once `flush_threshold` bytes
/// are pending, or when flushed explicitly.
#[derive(Debug)]
pub struct BatchedOutputStream<W: AsyncWrite> {
    writer: BufWriter<W>,
    flush_threshold: usize,
    unflushed: usize,
    closed: bool,
}

impl<W: AsyncWrite + Unpin> BatchedOutputStream<W> {
    pub fn new(writer: W, flush_threshold: usize) -> Self {
        BatchedOutputStream {
            writer: BufWriter::with_capacity(flush_threshold.max(1), writer),
            flush_threshold,
            unflushed: 0,
            closed: false,
        }
    }

    pub async fn write(&mut self, message: ScatteredMessage) -> AppResult<()> {
        if self.closed {
            return Err(AppError::IllegalStateError(
                "write to a closed output stream".to_string(),
            ));
        }
        for chunk in &message.chunks {
            self.writer.write_all(chunk).await?;
        }
        self.unflushed += message.size;
        if self.unflushed >= self.flush_threshold {
            self.flush().await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> AppResult<()> {
        self.writer.flush().await?;
        self.unflushed = 0;
        Ok(())
    }

    /// Flushes and shuts the write side down. Closing twice is a no-op.
    pub async fn close(&mut self) -> AppResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.flush().await?;
        self.writer.shutdown().await?;
        Ok(())
    }

    pub fn unflushed_bytes(&self) -> usize {
        self.unflushed
    }
}
