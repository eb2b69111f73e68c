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

use std::fmt::{Debug, Display, Formatter};

use bytes::{Buf, BufMut};
use chrono::{Local, TimeZone};

use super::constants::*;
use super::Offset;
use crate::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampType {
    CreateTime,
    LogAppendTime,
}

/// Batch level flags packed into 16 bits.
///
/// bits 0-2 compression, bit 3 timestamp type, bit 4 transactional, bit 5 control.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecordBatchAttributes(i16);

impl RecordBatchAttributes {
    const COMPRESSION_MASK: i16 = 0x07;
    const TIMESTAMP_TYPE_MASK: i16 = 0x08;
    const TRANSACTIONAL_MASK: i16 = 0x10;
    const CONTROL_MASK: i16 = 0x20;

    pub const fn from_bits(bits: i16) -> Self {
        RecordBatchAttributes(bits)
    }
    pub const fn bits(self) -> i16 {
        self.0
    }

    /// Unknown codec ids are reported as `None`; they are rejected when the
    /// batch is validated.
    pub fn compression(self) -> Option<Compression> {
        match self.0 & Self::COMPRESSION_MASK {
            0 => Some(Compression::None),
            1 => Some(Compression::Gzip),
            2 => Some(Compression::Snappy),
            3 => Some(Compression::Lz4),
            4 => Some(Compression::Zstd),
            _ => None,
        }
    }

    pub fn with_compression(self, compression: Compression) -> Self {
        let id = match compression {
            Compression::None => 0,
            Compression::Gzip => 1,
            Compression::Snappy => 2,
            Compression::Lz4 => 3,
            Compression::Zstd => 4,
        };
        RecordBatchAttributes((self.0 & !Self::COMPRESSION_MASK) | id)
    }

    pub fn timestamp_type(self) -> TimestampType {
        if self.0 & Self::TIMESTAMP_TYPE_MASK == 0 {
            TimestampType::CreateTime
        } else {
            TimestampType::LogAppendTime
        }
    }

    pub fn with_timestamp_type(self, timestamp_type: TimestampType) -> Self {
        match timestamp_type {
            TimestampType::CreateTime => RecordBatchAttributes(self.0 & !Self::TIMESTAMP_TYPE_MASK),
            TimestampType::LogAppendTime => RecordBatchAttributes(self.0 | Self::TIMESTAMP_TYPE_MASK),
        }
    }

    pub fn is_transactional(self) -> bool {
        self.0 & Self::TRANSACTIONAL_MASK != 0
    }

    pub fn is_control(self) -> bool {
        self.0 & Self::CONTROL_MASK != 0
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RecordBatchHeader {
    /// Encoded size of the whole batch, header included.
    pub size_bytes: i32,
    pub base_offset: Offset,
    pub record_count: i32,
    pub attributes: RecordBatchAttributes,
    pub crc: u32,
    pub last_offset_delta: i32,
    pub first_timestamp: i64,
    pub max_timestamp: i64,
}

impl RecordBatchHeader {
    pub fn last_offset(&self) -> Offset {
        self.base_offset + self.last_offset_delta as i64
    }

    pub(crate) fn write_to(&self, buffer: &mut impl BufMut) {
        buffer.put_i64(self.base_offset.value());
        buffer.put_i32(self.size_bytes - LOG_OVERHEAD as i32);
        buffer.put_i8(MAGIC);
        buffer.put_u32(self.crc);
        self.write_crc_covered(buffer);
    }

    /// The header fields covered by the batch crc.
    pub(crate) fn write_crc_covered(&self, buffer: &mut impl BufMut) {
        buffer.put_i16(self.attributes.bits());
        buffer.put_i32(self.last_offset_delta);
        buffer.put_i64(self.first_timestamp);
        buffer.put_i64(self.max_timestamp);
        buffer.put_i32(self.record_count);
    }

    pub(crate) fn read_from(buffer: &mut impl Buf) -> AppResult<RecordBatchHeader> {
        if buffer.remaining() < RECORD_BATCH_OVERHEAD {
            return Err(AppError::CorruptMessage(format!(
                "batch header needs {} bytes, only {} left",
                RECORD_BATCH_OVERHEAD,
                buffer.remaining()
            )));
        }
        let base_offset = Offset(buffer.get_i64());
        let length = buffer.get_i32();
        let magic = buffer.get_i8();
        if magic != MAGIC {
            return Err(AppError::CorruptMessage(format!(
                "only magic {} is supported, but found {}",
                MAGIC, magic
            )));
        }
        let size_bytes = length.saturating_add(LOG_OVERHEAD as i32);
        if length < 0 || (size_bytes as usize) < RECORD_BATCH_OVERHEAD {
            return Err(AppError::CorruptMessage(format!(
                "batch size {} is less than the record batch overhead {}",
                size_bytes, RECORD_BATCH_OVERHEAD
            )));
        }
        let crc = buffer.get_u32();
        let attributes = RecordBatchAttributes::from_bits(buffer.get_i16());
        let last_offset_delta = buffer.get_i32();
        let first_timestamp = buffer.get_i64();
        let max_timestamp = buffer.get_i64();
        let record_count = buffer.get_i32();
        if record_count < 0 {
            return Err(AppError::CorruptMessage(format!(
                "record count should be non-negative, but found {}",
                record_count
            )));
        }
        Ok(RecordBatchHeader {
            size_bytes,
            base_offset,
            record_count,
            attributes,
            crc,
            last_offset_delta,
            first_timestamp,
            max_timestamp,
        })
    }
}

fn local_time(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).single() {
        Some(time) => time.to_string(),
        None => millis.to_string(),
    }
}

impl Display for RecordBatchHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordBatchHeader")
            .field("base_offset", &self.base_offset.value())
            .field("size_bytes", &self.size_bytes)
            .field("record_count", &self.record_count)
            .field("attributes", &self.attributes.bits())
            .field("crc", &self.crc)
            .field("last_offset_delta", &self.last_offset_delta)
            .field("first_timestamp", &local_time(self.first_timestamp))
            .field("max_timestamp", &local_time(self.max_timestamp))
            .finish()
    }
}
