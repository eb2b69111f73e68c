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

//! Frame Codec
//!
//! ```text
//! +-----------+-------------------+-------------+------------------+
//! | size: u32 | correlation_id u32| checksum u64| body: size bytes |
//! +-----------+-------------------+-------------+------------------+
//! ```
//!
//! All fields are big-endian. `checksum` is the xxh64 (seed 0) of the body. A
//! produce request carries encoded record batches back to back as its body, the
//! response carries a [`ProduceAck`].

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::AsyncRead;
use tracing::trace;
use xxhash_rust::xxh64::Xxh64;

use crate::message::{BatchReader, Offset, RecordBatch};
use crate::network::{FragmentedBuffer, InputStream, ScatteredMessage, WireSource};
use crate::{AppError, AppResult};

pub const FRAME_HEADER_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub size: u32,
    pub correlation_id: u32,
    pub checksum: u64,
}

impl FrameHeader {
    pub fn write_to(&self, buffer: &mut impl BufMut) {
        buffer.put_u32(self.size);
        buffer.put_u32(self.correlation_id);
        buffer.put_u64(self.checksum);
    }

    pub fn read_from(buffer: &mut impl Buf) -> AppResult<FrameHeader> {
        if buffer.remaining() < FRAME_HEADER_SIZE {
            return Err(AppError::ShortRead {
                expected: FRAME_HEADER_SIZE,
                actual: buffer.remaining(),
            });
        }
        Ok(FrameHeader {
            size: buffer.get_u32(),
            correlation_id: buffer.get_u32(),
            checksum: buffer.get_u64(),
        })
    }
}

#[derive(Debug)]
pub struct RequestFrame {
    pub header: FrameHeader,
    pub body: FragmentedBuffer,
}

impl RequestFrame {
    /// Reads one frame and verifies its checksum.
    ///
    /// Returns `Ok(None)` when the peer closed the stream cleanly between frames.
    /// Closing in the middle of a frame is a `ShortRead`, a body that does not
    /// match its checksum a `ChecksumMismatch`. In both cases the stream is left
    /// in an unknown position and the connection has to go.
    pub async fn read_from<R: AsyncRead + Unpin>(
        input: &mut InputStream<R>,
        max_frame_size: usize,
    ) -> AppResult<Option<RequestFrame>> {
        let mut header_bytes = input.read_exactly(FRAME_HEADER_SIZE).await?;
        if header_bytes.is_empty() {
            return Ok(None);
        }
        let header = FrameHeader::read_from(&mut header_bytes)?;
        let size = header.size as usize;
        if size > max_frame_size {
            return Err(AppError::MessageTooLarge(format!(
                "frame of {} bytes exceeds the limit of {} bytes",
                size, max_frame_size
            )));
        }

        let mut source = WireSource::new(input);
        let body = source.read_fragbuf(size).await?;
        if source.size_bytes() != size {
            return Err(AppError::ShortRead {
                expected: size,
                actual: source.size_bytes(),
            });
        }
        let computed = source.checksum();
        if computed != header.checksum {
            return Err(AppError::ChecksumMismatch {
                expected: header.checksum,
                computed,
            });
        }
        trace!(
            "read frame {} with {} byte body in {} fragments",
            header.correlation_id,
            size,
            body.chunk_count()
        );
        Ok(Some(RequestFrame { header, body }))
    }

    /// Decodes the body lazily, one record batch per slice. Bytes that do not
    /// form a whole batch surface as an error from the reader.
    pub fn into_batch_reader(self) -> BatchReader {
        let mut body = self.body.reader();
        BatchReader::from_generator(move || {
            let next = if body.has_remaining() {
                RecordBatch::read_from(&mut body).map(Some)
            } else {
                Ok(None)
            };
            std::future::ready(next)
        })
    }

    /// Prepends a header for `body`.
    pub fn encode(correlation_id: u32, body: FragmentedBuffer) -> AppResult<ScatteredMessage> {
        let size = u32::try_from(body.size_bytes()).map_err(|_| {
            AppError::MessageTooLarge(format!("frame body of {} bytes", body.size_bytes()))
        })?;
        let mut hash = Xxh64::new(0);
        for chunk in body.chunks() {
            hash.update(chunk);
        }
        let header = FrameHeader {
            size,
            correlation_id,
            checksum: hash.digest(),
        };

        let mut header_bytes = BytesMut::with_capacity(FRAME_HEADER_SIZE);
        header.write_to(&mut header_bytes);
        let mut message = ScatteredMessage::new();
        message.append(header_bytes.freeze());
        for chunk in body.chunks() {
            message.append(chunk.clone());
        }
        Ok(message)
    }

    /// A produce request carrying `batches`.
    pub fn encode_batches(correlation_id: u32, batches: &[RecordBatch]) -> AppResult<ScatteredMessage> {
        let mut body = FragmentedBuffer::new();
        for batch in batches {
            let mut encoded = BytesMut::with_capacity(batch.size_bytes());
            batch.write_to(&mut encoded);
            body.push(encoded.freeze());
        }
        RequestFrame::encode(correlation_id, body)
    }
}

pub const PRODUCE_ACK_SIZE: usize = 16;

/// Response to a produce request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProduceAck {
    pub batch_count: u32,
    pub record_count: u32,
    /// `Offset(-1)` when the request carried no batch.
    pub last_offset: Offset,
}

impl Default for ProduceAck {
    fn default() -> Self {
        ProduceAck {
            batch_count: 0,
            record_count: 0,
            last_offset: Offset(-1),
        }
    }
}

impl ProduceAck {
    pub fn encode(&self) -> Bytes {
        let mut buffer = BytesMut::with_capacity(PRODUCE_ACK_SIZE);
        buffer.put_u32(self.batch_count);
        buffer.put_u32(self.record_count);
        buffer.put_i64(self.last_offset.value());
        buffer.freeze()
    }

    pub fn decode(buffer: &mut impl Buf) -> AppResult<ProduceAck> {
        if buffer.remaining() != PRODUCE_ACK_SIZE {
            return Err(AppError::MalformedProtocol(format!(
                "produce ack of {} bytes, expected {}",
                buffer.remaining(),
                PRODUCE_ACK_SIZE
            )));
        }
        Ok(ProduceAck {
            batch_count: buffer.get_u32(),
            record_count: buffer.get_u32(),
            last_offset: Offset(buffer.get_i64()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{BatchConsumer, RecordBatchBuilder, StopIteration};
    use crate::network::input_stream::testing::ChunkedReader;
    use crate::utils::NO_TIMEOUT;

    fn batch(base: i64, records: usize) -> RecordBatch {
        let mut builder = RecordBatchBuilder::new(Offset(base));
        for i in 0..records {
            builder
                .append_record(None, None, format!("k{}", i), format!("v{}", i), None)
                .unwrap();
        }
        builder.build()
    }

    fn flatten(message: &ScatteredMessage) -> Vec<u8> {
        message.chunks().iter().flat_map(|c| c.iter().copied()).collect()
    }

    #[derive(Default)]
    struct Offsets(Vec<Offset>);

    impl BatchConsumer for Offsets {
        type Output = Vec<Offset>;

        async fn consume(&mut self, batch: RecordBatch) -> AppResult<StopIteration> {
            self.0.push(batch.base_offset());
            Ok(StopIteration::No)
        }

        fn end_of_stream(self) -> Self::Output {
            self.0
        }
    }

    #[tokio::test]
    async fn test_frame_to_batches() {
        let batches = vec![batch(0, 3), batch(3, 1), batch(4, 5)];
        let message = RequestFrame::encode_batches(42, &batches).unwrap();
        let wire = flatten(&message);

        let mut input = InputStream::new(ChunkedReader::split(&wire, 13), 16);
        let frame = RequestFrame::read_from(&mut input, 1 << 20)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.header.correlation_id, 42);
        assert_eq!(frame.header.size as usize, wire.len() - FRAME_HEADER_SIZE);

        let mut reader = frame.into_batch_reader();
        let offsets = reader.consume(Offsets::default(), NO_TIMEOUT).await.unwrap();
        assert_eq!(offsets, vec![Offset(0), Offset(3), Offset(4)]);
        assert!(reader.end_of_stream());

        assert!(RequestFrame::read_from(&mut input, 1 << 20)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_checksum_mismatch() {
        let message = RequestFrame::encode_batches(1, &[batch(0, 2)]).unwrap();
        let mut wire = flatten(&message);
        let last = wire.len() - 1;
        wire[last] ^= 0xff;

        let mut input = InputStream::new(ChunkedReader::split(&wire, 7), 16);
        let result = RequestFrame::read_from(&mut input, 1 << 20).await;
        assert!(matches!(result, Err(AppError::ChecksumMismatch { .. })));
    }

    #[tokio::test]
    async fn test_truncated_frames() {
        let message = RequestFrame::encode_batches(1, &[batch(0, 2)]).unwrap();
        let wire = flatten(&message);

        let mut input = InputStream::new(ChunkedReader::split(&wire[..10], 4), 16);
        let result = RequestFrame::read_from(&mut input, 1 << 20).await;
        assert!(matches!(
            result,
            Err(AppError::ShortRead {
                expected: FRAME_HEADER_SIZE,
                actual: 10
            })
        ));

        let cut = wire.len() - 5;
        let mut input = InputStream::new(ChunkedReader::split(&wire[..cut], 4), 16);
        let result = RequestFrame::read_from(&mut input, 1 << 20).await;
        assert!(matches!(result, Err(AppError::ShortRead { .. })));
    }

    #[tokio::test]
    async fn test_oversize_frame_rejected() {
        let message = RequestFrame::encode_batches(1, &[batch(0, 20)]).unwrap();
        let wire = flatten(&message);
        let mut input = InputStream::new(ChunkedReader::split(&wire, 64), 64);
        let result = RequestFrame::read_from(&mut input, 32).await;
        assert!(matches!(result, Err(AppError::MessageTooLarge(_))));
    }

    #[tokio::test]
    async fn test_garbage_body_fails_in_reader() {
        let body = FragmentedBuffer::from(Bytes::from_static(b"not a record batch"));
        let wire = flatten(&RequestFrame::encode(9, body).unwrap());
        let mut input = InputStream::new(&wire[..], 64);
        let frame = RequestFrame::read_from(&mut input, 1024)
            .await
            .unwrap()
            .unwrap();
        let mut reader = frame.into_batch_reader();
        assert!(matches!(
            reader.consume(Offsets::default(), NO_TIMEOUT).await,
            Err(AppError::CorruptMessage(_))
        ));
    }

    #[test]
    fn test_produce_ack_codec() {
        let ack = ProduceAck {
            batch_count: 3,
            record_count: 9,
            last_offset: Offset(8),
        };
        let mut encoded = ack.encode();
        assert_eq!(ProduceAck::decode(&mut encoded).unwrap(), ack);
        assert!(ProduceAck::decode(&mut Bytes::from_static(b"short")).is_err());
    }
}
