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

//! A RecordBatch is the unit that flows through readers and over the wire: an
//! immutable header plus the still encoded record section.
//!
//! Key points:
//! - batches are move-only, whoever holds one owns it exclusively
//! - the record section stays encoded (and possibly compressed) until asked for
//! - the crc32c in the header covers the attributes field up to the last record byte

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use super::batch_header::{Compression, RecordBatchAttributes, RecordBatchHeader};
use super::constants::*;
use super::record::{Record, RecordHeader};
use super::Offset;
use crate::{AppError, AppResult};

#[derive(Debug, PartialEq, Eq)]
pub struct RecordBatch {
    header: RecordBatchHeader,
    records: Bytes,
}

impl RecordBatch {
    /// Wraps an already encoded record section. The header is trusted as is,
    /// call [`RecordBatch::validate`] for data that came from outside.
    pub fn new(header: RecordBatchHeader, records: Bytes) -> Self {
        RecordBatch { header, records }
    }

    pub fn header(&self) -> &RecordBatchHeader {
        &self.header
    }

    pub fn base_offset(&self) -> Offset {
        self.header.base_offset
    }

    pub fn last_offset(&self) -> Offset {
        self.header.last_offset()
    }

    pub fn record_count(&self) -> i32 {
        self.header.record_count
    }

    pub fn size_bytes(&self) -> usize {
        self.header.size_bytes as usize
    }

    pub fn records_payload(&self) -> &Bytes {
        &self.records
    }

    pub fn into_parts(self) -> (RecordBatchHeader, Bytes) {
        (self.header, self.records)
    }

    fn compute_crc(header: &RecordBatchHeader, records: &[u8]) -> u32 {
        let mut covered = BytesMut::with_capacity(RECORD_BATCH_OVERHEAD - ATTRIBUTES_OFFSET);
        header.write_crc_covered(&mut covered);
        crc32c::crc32c_append(crc32c::crc32c(&covered), records)
    }

    /// Validate the following:
    /// - size_bytes matches the header overhead plus the record section
    /// - the compression codec is known
    /// - the crc check passes
    pub fn validate(&self) -> AppResult<()> {
        let expected_size = RECORD_BATCH_OVERHEAD + self.records.len();
        if self.size_bytes() != expected_size {
            return Err(AppError::CorruptMessage(format!(
                "batch at offset {} claims {} bytes, but holds {}",
                self.base_offset(),
                self.size_bytes(),
                expected_size
            )));
        }
        if self.header.attributes.compression().is_none() {
            return Err(AppError::CorruptMessage(format!(
                "unknown compression in attributes {:#06x}",
                self.header.attributes.bits()
            )));
        }
        let computed = Self::compute_crc(&self.header, &self.records);
        if computed != self.header.crc {
            return Err(AppError::CorruptMessage(format!(
                "CRC mismatch: expected {}, but found {}",
                computed, self.header.crc
            )));
        }
        Ok(())
    }

    /// Decodes the record section. Compressed batches are passed through the
    /// engine untouched, so only uncompressed ones can be opened here.
    pub fn records(&self) -> AppResult<Vec<Record>> {
        if self.header.attributes.compression() != Some(Compression::None) {
            return Err(AppError::InvalidValue(format!(
                "cannot decode records of a compressed batch at offset {}",
                self.base_offset()
            )));
        }
        let mut cursor = self.records.clone();
        // the count is untrusted, every record takes at least two bytes
        let capacity = (self.record_count().max(0) as usize).min(cursor.remaining() / 2);
        let mut records = Vec::with_capacity(capacity);
        for _ in 0..self.record_count() {
            records.push(Record::read_from(&mut cursor)?);
        }
        if cursor.has_remaining() {
            return Err(AppError::CorruptMessage(format!(
                "{} bytes left after {} records",
                cursor.remaining(),
                self.record_count()
            )));
        }
        Ok(records)
    }

    pub fn write_to(&self, buffer: &mut BytesMut) {
        buffer.reserve(self.size_bytes());
        self.header.write_to(buffer);
        buffer.put_slice(&self.records);
    }

    /// Reads one batch from the front of `buffer`. The record section is taken
    /// with `copy_to_bytes`, which does not copy for `Bytes` backed buffers.
    pub fn read_from<B: Buf>(buffer: &mut B) -> AppResult<RecordBatch> {
        let header = RecordBatchHeader::read_from(buffer)?;
        let records_len = header.size_bytes as usize - RECORD_BATCH_OVERHEAD;
        if buffer.remaining() < records_len {
            return Err(AppError::CorruptMessage(format!(
                "batch at offset {} needs {} record bytes, only {} left",
                header.base_offset,
                records_len,
                buffer.remaining()
            )));
        }
        let records = buffer.copy_to_bytes(records_len);
        trace!("decoded batch {}", header);
        Ok(RecordBatch { header, records })
    }
}

/// A builder for creating new RecordBatch instances.
pub struct RecordBatchBuilder {
    buffer: BytesMut,
    attributes: RecordBatchAttributes,
    base_offset: Offset,
    last_offset: Option<Offset>,
    base_timestamp: Option<i64>,
    max_timestamp: i64,
    record_count: i32,
}

impl RecordBatchBuilder {
    pub fn new(base_offset: Offset) -> Self {
        RecordBatchBuilder {
            buffer: BytesMut::new(),
            attributes: RecordBatchAttributes::default(),
            base_offset,
            last_offset: None,
            base_timestamp: None,
            max_timestamp: NO_TIMESTAMP,
            record_count: 0,
        }
    }

    pub fn with_attributes(mut self, attributes: RecordBatchAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn append_record_with_offset<T: AsRef<[u8]>>(
        &mut self,
        offset: Offset,
        timestamp: i64,
        key: T,
        value: T,
    ) -> AppResult<()> {
        self.append_record(Some(offset), Some(timestamp), key, value, None)
    }

    /// Appends a record. Without an explicit offset the record takes the one after
    /// the previous record. Empty keys and values are written as null.
    pub fn append_record<T: AsRef<[u8]>>(
        &mut self,
        offset: Option<Offset>,
        timestamp: Option<i64>,
        key: T,
        value: T,
        headers: Option<Vec<RecordHeader>>,
    ) -> AppResult<()> {
        let offset = offset.unwrap_or_else(|| self.next_offset());
        if offset < self.base_offset || self.last_offset.is_some_and(|last| offset <= last) {
            return Err(AppError::InvalidValue(format!(
                "offset {} does not follow {:?} in batch based at {}",
                offset, self.last_offset, self.base_offset
            )));
        }
        let offset_delta = i32::try_from(offset - self.base_offset).map_err(|_| {
            AppError::InvalidValue(format!(
                "offset {} is too far from base offset {}",
                offset, self.base_offset
            ))
        })?;
        self.last_offset = Some(offset);

        let timestamp = timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        let base_timestamp = *self.base_timestamp.get_or_insert(timestamp);
        self.max_timestamp = self.max_timestamp.max(timestamp);

        let nullable = |data: &[u8]| (!data.is_empty()).then(|| Bytes::copy_from_slice(data));
        let record = Record {
            attributes: 0,
            timestamp_delta: timestamp.saturating_sub(base_timestamp),
            offset_delta,
            key: nullable(key.as_ref()),
            value: nullable(value.as_ref()),
            headers: headers.unwrap_or_default(),
        };
        record.write_to(&mut self.buffer);
        self.record_count += 1;
        Ok(())
    }

    fn next_offset(&self) -> Offset {
        self.last_offset.map_or(self.base_offset, |last| last + 1)
    }

    pub fn build(self) -> RecordBatch {
        let records = self.buffer.freeze();
        let mut header = RecordBatchHeader {
            size_bytes: (RECORD_BATCH_OVERHEAD + records.len()) as i32,
            base_offset: self.base_offset,
            record_count: self.record_count,
            attributes: self.attributes,
            crc: 0,
            last_offset_delta: self
                .last_offset
                .map_or(0, |last| (last - self.base_offset) as i32),
            first_timestamp: self.base_timestamp.unwrap_or(NO_TIMESTAMP),
            max_timestamp: self.max_timestamp,
        };
        header.crc = RecordBatch::compute_crc(&header, &records);
        RecordBatch::new(header, records)
    }
}
