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

use bytes::{Buf, BufMut, Bytes, BytesMut};
use integer_encoding::VarInt;

use crate::{AppError, AppResult};

/// One log record inside a batch. Offsets and timestamps are deltas against
/// the batch header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub attributes: i8,
    pub timestamp_delta: i64,
    pub offset_delta: i32,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Vec<RecordHeader>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub header_key: String,
    pub header_value: Option<Bytes>,
}

impl RecordHeader {
    pub fn new<T: AsRef<[u8]>>(key: String, value: T) -> RecordHeader {
        RecordHeader {
            header_key: key,
            header_value: {
                if value.as_ref().is_empty() {
                    None
                } else {
                    Some(Bytes::copy_from_slice(value.as_ref()))
                }
            },
        }
    }

    fn size(&self) -> usize {
        (self.header_key.len() as i32).required_space()
            + self.header_key.len()
            + nullable_size(self.header_value.as_deref())
    }
}

fn nullable_size(data: Option<&[u8]>) -> usize {
    match data {
        Some(data) => (data.len() as i32).required_space() + data.len(),
        None => (-1i32).required_space(),
    }
}

fn put_varint<T: VarInt>(buffer: &mut BytesMut, value: T) {
    buffer.put_slice(value.encode_var_vec().as_ref());
}

fn put_nullable(buffer: &mut BytesMut, data: Option<&[u8]>) {
    match data {
        Some(data) => {
            put_varint(buffer, data.len() as i32);
            buffer.put_slice(data);
        }
        None => put_varint(buffer, -1i32),
    }
}

fn get_varint<T: VarInt>(buffer: &mut Bytes, field: &str) -> AppResult<T> {
    let (value, read_size) = T::decode_var(buffer.chunk())
        .ok_or_else(|| AppError::CorruptMessage(format!("truncated varint in record {}", field)))?;
    buffer.advance(read_size);
    Ok(value)
}

fn get_nullable(buffer: &mut Bytes, field: &str) -> AppResult<Option<Bytes>> {
    let len: i32 = get_varint(buffer, field)?;
    if len < 0 {
        return Ok(None);
    }
    let len = len as usize;
    if buffer.remaining() < len {
        return Err(AppError::CorruptMessage(format!(
            "record {} needs {} bytes, only {} left",
            field,
            len,
            buffer.remaining()
        )));
    }
    Ok(Some(buffer.split_to(len)))
}

impl Record {
    /// Size of everything after the length prefix.
    fn body_size(&self) -> usize {
        1 + self.timestamp_delta.required_space()
            + self.offset_delta.required_space()
            + nullable_size(self.key.as_deref())
            + nullable_size(self.value.as_deref())
            + (self.headers.len() as i32).required_space()
            + self.headers.iter().map(RecordHeader::size).sum::<usize>()
    }

    pub(crate) fn write_to(&self, buffer: &mut BytesMut) {
        put_varint(buffer, self.body_size() as i32);
        buffer.put_i8(self.attributes);
        put_varint(buffer, self.timestamp_delta);
        put_varint(buffer, self.offset_delta);
        put_nullable(buffer, self.key.as_deref());
        put_nullable(buffer, self.value.as_deref());
        put_varint(buffer, self.headers.len() as i32);
        for header in &self.headers {
            put_varint(buffer, header.header_key.len() as i32);
            buffer.put_slice(header.header_key.as_bytes());
            put_nullable(buffer, header.header_value.as_deref());
        }
    }

    pub(crate) fn read_from(buffer: &mut Bytes) -> AppResult<Record> {
        let length: i32 = get_varint(buffer, "length")?;
        if length < 1 || buffer.remaining() < length as usize {
            return Err(AppError::CorruptMessage(format!(
                "record length {} exceeds remaining {} bytes",
                length,
                buffer.remaining()
            )));
        }
        // parse inside the record's own window so a bad field cannot bleed into the next record
        let mut body = buffer.split_to(length as usize);

        let attributes = body.get_i8();
        let timestamp_delta = get_varint(&mut body, "timestamp delta")?;
        let offset_delta = get_varint(&mut body, "offset delta")?;
        let key = get_nullable(&mut body, "key")?;
        let value = get_nullable(&mut body, "value")?;

        let headers_count: i32 = get_varint(&mut body, "headers count")?;
        // the count is untrusted, every header takes at least one byte
        let mut headers = Vec::with_capacity((headers_count.max(0) as usize).min(body.remaining()));
        for _ in 0..headers_count {
            let header_key = get_nullable(&mut body, "header key")?.unwrap_or_default();
            let header_key = String::from_utf8(header_key.to_vec()).map_err(|e| {
                AppError::CorruptMessage(format!("record header key is not utf-8: {}", e))
            })?;
            let header_value = get_nullable(&mut body, "header value")?;
            headers.push(RecordHeader {
                header_key,
                header_value,
            });
        }
        if body.has_remaining() {
            return Err(AppError::CorruptMessage(format!(
                "{} trailing bytes after record",
                body.remaining()
            )));
        }

        Ok(Record {
            attributes,
            timestamp_delta,
            offset_delta,
            key,
            value,
            headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_with_headers() {
        let record = Record {
            attributes: 0,
            timestamp_delta: 15,
            offset_delta: 2,
            key: None,
            value: Some(Bytes::from_static(b"value")),
            headers: vec![
                RecordHeader::new("trace".to_string(), "abc"),
                RecordHeader::new("empty".to_string(), ""),
            ],
        };
        let mut buffer = BytesMut::new();
        record.write_to(&mut buffer);

        let mut encoded = buffer.freeze();
        let decoded = Record::read_from(&mut encoded).unwrap();
        assert!(encoded.is_empty());
        assert_eq!(decoded, record);
        assert_eq!(decoded.headers[1].header_value, None);
    }

    #[test]
    fn test_forged_header_count() {
        let mut body = BytesMut::new();
        body.put_i8(0);
        put_varint(&mut body, 0i64);
        put_varint(&mut body, 0i32);
        put_nullable(&mut body, None);
        put_nullable(&mut body, None);
        put_varint(&mut body, i32::MAX);

        let mut buffer = BytesMut::new();
        put_varint(&mut buffer, body.len() as i32);
        buffer.put(body);
        assert!(matches!(
            Record::read_from(&mut buffer.freeze()),
            Err(AppError::CorruptMessage(_))
        ));
    }

    #[test]
    fn test_truncated_record() {
        let record = Record {
            attributes: 0,
            timestamp_delta: 0,
            offset_delta: 0,
            key: Some(Bytes::from_static(b"key")),
            value: Some(Bytes::from_static(b"value")),
            headers: vec![],
        };
        let mut buffer = BytesMut::new();
        record.write_to(&mut buffer);
        let full = buffer.freeze();
        let mut truncated = full.slice(..full.len() - 2);
        assert!(matches!(
            Record::read_from(&mut truncated),
            Err(AppError::CorruptMessage(_))
        ));
    }
}
