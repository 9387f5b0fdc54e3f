//! Binary batch framing shared by the spool writer and reader.
//!
//! # Format
//!
//! A segment file is a plain sequence of batches, each laid out as:
//!
//! ```text
//! [count: u32 LE] ( [size: u32 LE] [payload: size bytes] ) × count
//! ```
//!
//! Every payload is one encoded [`ResourceSpans`] message. A size of zero is
//! padding: it carries no payload and does not count toward `count`. A size
//! with the top bit set is treated as corrupt. End of input exactly at the
//! start of a `count` field is a clean end of stream; end of input anywhere
//! else is a truncated frame.

use std::io::{ErrorKind, Read};

use prost::Message;
use serde::{Deserialize, Serialize};

use crate::error::FrameError;
use crate::proto::ResourceSpans;

/// Size of the count and length prefixes.
const PREFIX_SIZE: usize = 4;

/// Serializer options for encoding span records into a batch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeOptions {
    /// Initial capacity of the per-batch encode buffer, in bytes.
    pub buffer_capacity: usize,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: 4096,
        }
    }
}

/// Frames already-serialized records into one batch.
///
/// Zero-length records are left out of the frame (and of its count): on
/// disk a zero size is padding, so they could not be read back. Returns an
/// empty buffer when nothing remains; such a batch must never be written.
///
/// # Errors
///
/// Returns [`FrameError::RecordTooLarge`] if a record does not fit a
/// 31-bit length prefix.
pub fn encode_batch<T: AsRef<[u8]>>(records: &[T]) -> Result<Vec<u8>, FrameError> {
    let total: usize = records
        .iter()
        .map(|r| PREFIX_SIZE + r.as_ref().len())
        .sum::<usize>()
        + PREFIX_SIZE;
    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(&[0; PREFIX_SIZE]);

    let mut count: u32 = 0;
    for (index, record) in records.iter().enumerate() {
        let record = record.as_ref();
        if record.is_empty() {
            continue;
        }
        let size = record_len(index, record.len())?;
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(record);
        count += 1;
    }

    Ok(finish_batch(buf, count))
}

/// Encodes span records with prost and frames them into one batch.
///
/// Each message is appended directly after a reserved length prefix which is
/// patched once the message size is known. Messages that encode to zero
/// bytes are left out, as in [`encode_batch`].
///
/// # Errors
///
/// Returns [`FrameError::Serialize`] if prost fails to encode a message, or
/// [`FrameError::RecordTooLarge`] if a message exceeds the length prefix.
pub fn encode_spans(
    records: &[ResourceSpans],
    options: &EncodeOptions,
) -> Result<Vec<u8>, FrameError> {
    let mut buf = Vec::with_capacity(options.buffer_capacity.max(PREFIX_SIZE));
    buf.extend_from_slice(&[0; PREFIX_SIZE]);

    let mut count: u32 = 0;
    for (index, record) in records.iter().enumerate() {
        let size_offset = buf.len();
        buf.extend_from_slice(&[0; PREFIX_SIZE]);
        record
            .encode(&mut buf)
            .map_err(|source| FrameError::Serialize { index, source })?;
        let size = record_len(index, buf.len() - size_offset - PREFIX_SIZE)?;
        if size == 0 {
            buf.truncate(size_offset);
            continue;
        }
        buf[size_offset..size_offset + PREFIX_SIZE].copy_from_slice(&size.to_le_bytes());
        count += 1;
    }

    Ok(finish_batch(buf, count))
}

/// Patches the batch count, or returns an empty buffer for an empty batch.
fn finish_batch(mut buf: Vec<u8>, count: u32) -> Vec<u8> {
    if count == 0 {
        return Vec::new();
    }
    buf[..PREFIX_SIZE].copy_from_slice(&count.to_le_bytes());
    buf
}

fn record_len(index: usize, size: usize) -> Result<u32, FrameError> {
    u32::try_from(size)
        .ok()
        .filter(|&s| i32::try_from(s).is_ok())
        .ok_or(FrameError::RecordTooLarge { index, size })
}

/// Sequential batch decoder over any byte source.
///
/// ```
/// use tracespool::frame::{encode_batch, FrameReader};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = encode_batch(&[b"a".as_slice(), b"bc".as_slice()])?;
/// let mut reader = FrameReader::new(bytes.as_slice());
/// assert_eq!(reader.next_raw_batch()?, Some(vec![b"a".to_vec(), b"bc".to_vec()]));
/// assert_eq!(reader.next_raw_batch()?, None);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
}

impl<R: Read> FrameReader<R> {
    /// Wraps a reader positioned at the start of a batch.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Reads the next batch as raw payloads.
    ///
    /// Returns `Ok(None)` at a clean end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Truncated`] when input ends inside a batch,
    /// [`FrameError::Corrupt`] for a negative length, and
    /// [`FrameError::Io`] for reader failures.
    pub fn next_raw_batch(&mut self) -> Result<Option<Vec<Vec<u8>>>, FrameError> {
        let Some(count) = self.read_count()? else {
            return Ok(None);
        };

        let mut payloads = Vec::with_capacity((count as usize).min(1024));
        while payloads.len() < count as usize {
            let size = self.read_u32("span size")?;
            if i32::try_from(size).is_err() {
                return Err(FrameError::Corrupt {
                    reason: format!("negative span size {}", size.cast_signed()),
                });
            }
            if size == 0 {
                continue;
            }
            payloads.push(self.read_payload(size)?);
        }

        Ok(Some(payloads))
    }

    /// Reads the next batch and decodes every payload as [`ResourceSpans`].
    ///
    /// Returns `Ok(None)` at a clean end of stream.
    ///
    /// # Errors
    ///
    /// Same as [`next_raw_batch`](Self::next_raw_batch), plus
    /// [`FrameError::Deserialize`] if a payload is not a valid message.
    pub fn next_batch(&mut self) -> Result<Option<Vec<ResourceSpans>>, FrameError> {
        let Some(payloads) = self.next_raw_batch()? else {
            return Ok(None);
        };

        payloads
            .iter()
            .enumerate()
            .map(|(index, payload)| {
                ResourceSpans::decode(payload.as_slice())
                    .map_err(|source| FrameError::Deserialize { index, source })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    /// Returns the wrapped reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Reads a batch count, distinguishing clean EOF from a partial field.
    fn read_count(&mut self) -> Result<Option<u32>, FrameError> {
        let mut buf = [0u8; PREFIX_SIZE];
        let mut filled = 0;
        while filled < PREFIX_SIZE {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => return Err(FrameError::Truncated { field: "span count" }),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Some(u32::from_le_bytes(buf)))
    }

    fn read_u32(&mut self, field: &'static str) -> Result<u32, FrameError> {
        let mut buf = [0u8; PREFIX_SIZE];
        self.read_exact(&mut buf, field)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Reads a `size`-byte payload, growing the buffer only as data arrives.
    fn read_payload(&mut self, size: u32) -> Result<Vec<u8>, FrameError> {
        let mut payload = Vec::new();
        let read = (&mut self.inner)
            .take(u64::from(size))
            .read_to_end(&mut payload)?;
        if read < size as usize {
            return Err(FrameError::Truncated { field: "span data" });
        }
        Ok(payload)
    }

    fn read_exact(&mut self, buf: &mut [u8], field: &'static str) -> Result<(), FrameError> {
        self.inner.read_exact(buf).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                FrameError::Truncated { field }
            } else {
                FrameError::Io(e)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{KeyValue, Resource, ScopeSpans, Span};

    fn sample_spans(n: usize) -> Vec<ResourceSpans> {
        (0..n)
            .map(|i| ResourceSpans {
                resource: Some(Resource {
                    attributes: vec![KeyValue::string("service.name", format!("svc-{i}"))],
                    dropped_attributes_count: 0,
                }),
                scope_spans: vec![ScopeSpans {
                    scope: None,
                    spans: vec![Span {
                        name: format!("op-{i}"),
                        trace_id: vec![7; 16],
                        span_id: vec![9; 8],
                        ..Default::default()
                    }],
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            })
            .collect()
    }

    #[test]
    fn test_encode_empty_is_empty() {
        let empty: [&[u8]; 0] = [];
        assert!(encode_batch(&empty).unwrap().is_empty());
        assert!(encode_spans(&[], &EncodeOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn test_encode_batch_layout() {
        let buf = encode_batch(&[b"xyz".as_slice(), b"q".as_slice()]).unwrap();
        assert_eq!(
            buf,
            vec![
                2, 0, 0, 0, // count
                3, 0, 0, 0, b'x', b'y', b'z', //
                1, 0, 0, 0, b'q',
            ]
        );
    }

    #[test]
    fn test_encode_skips_empty_records() {
        let buf = encode_batch(&[b"".as_slice(), b"q".as_slice(), b"".as_slice()]).unwrap();
        assert_eq!(buf, vec![1, 0, 0, 0, 1, 0, 0, 0, b'q']);

        let only_empty = encode_batch(&[b"".as_slice()]).unwrap();
        assert!(only_empty.is_empty());

        let spans = encode_spans(&[ResourceSpans::default()], &EncodeOptions::default()).unwrap();
        assert!(spans.is_empty());
    }

    #[test]
    fn test_encode_spans_matches_encode_batch() {
        let spans = sample_spans(3);
        let raw: Vec<Vec<u8>> = spans.iter().map(Message::encode_to_vec).collect();
        let direct = encode_spans(&spans, &EncodeOptions { buffer_capacity: 0 }).unwrap();
        assert_eq!(direct, encode_batch(&raw).unwrap());
    }

    #[test]
    fn test_decode_spans_roundtrip() {
        let spans = sample_spans(4);
        let buf = encode_spans(&spans, &EncodeOptions::default()).unwrap();
        let mut reader = FrameReader::new(buf.as_slice());
        assert_eq!(reader.next_batch().unwrap(), Some(spans));
        assert!(reader.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_zero_size_entries_are_padding() {
        // count = 2, then a zero-size header, then two real payloads.
        let mut buf = vec![2, 0, 0, 0];
        buf.extend_from_slice(&[0, 0, 0, 0]);
        buf.extend_from_slice(&[1, 0, 0, 0, b'a']);
        buf.extend_from_slice(&[0, 0, 0, 0]);
        buf.extend_from_slice(&[1, 0, 0, 0, b'b']);

        let mut reader = FrameReader::new(buf.as_slice());
        assert_eq!(
            reader.next_raw_batch().unwrap(),
            Some(vec![b"a".to_vec(), b"b".to_vec()])
        );
        assert!(reader.next_raw_batch().unwrap().is_none());
    }

    #[test]
    fn test_zero_count_batch_is_empty() {
        let buf = [0u8, 0, 0, 0];
        let mut reader = FrameReader::new(buf.as_slice());
        assert_eq!(reader.next_raw_batch().unwrap(), Some(Vec::new()));
        assert!(reader.next_raw_batch().unwrap().is_none());
    }

    #[test]
    fn test_negative_size_is_corrupt() {
        let buf = [1u8, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF];
        let mut reader = FrameReader::new(buf.as_slice());
        assert!(matches!(
            reader.next_raw_batch(),
            Err(FrameError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_truncation_points() {
        let full = encode_batch(&[b"hello".as_slice()]).unwrap();

        // Inside the count field.
        let mut reader = FrameReader::new(&full[..2]);
        assert!(matches!(
            reader.next_raw_batch(),
            Err(FrameError::Truncated { field: "span count" })
        ));

        // Inside the size field.
        let mut reader = FrameReader::new(&full[..6]);
        assert!(matches!(
            reader.next_raw_batch(),
            Err(FrameError::Truncated { field: "span size" })
        ));

        // Inside the payload.
        let mut reader = FrameReader::new(&full[..full.len() - 1]);
        assert!(matches!(
            reader.next_raw_batch(),
            Err(FrameError::Truncated { field: "span data" })
        ));
    }

    #[test]
    fn test_huge_declared_size_with_short_input_is_truncated() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&0x7FFF_FFFFu32.to_le_bytes());
        buf.extend_from_slice(b"abc");

        let mut reader = FrameReader::new(buf.as_slice());
        assert!(matches!(
            reader.next_raw_batch(),
            Err(FrameError::Truncated { field: "span data" })
        ));
    }

    #[test]
    fn test_invalid_payload_is_deserialize_error() {
        // 0xFF is not a valid protobuf key.
        let buf = encode_batch(&[[0xFFu8, 0xFF, 0xFF].as_slice()]).unwrap();
        let mut reader = FrameReader::new(buf.as_slice());
        assert!(matches!(
            reader.next_batch(),
            Err(FrameError::Deserialize { index: 0, .. })
        ));
    }
}
