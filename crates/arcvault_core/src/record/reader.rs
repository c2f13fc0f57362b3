//! Streaming record scanner.
//!
//! Walks a segment record by record without loading it into memory. Only the
//! header block of each record is read; blocks are skipped by length.
//!
//! # Error Handling
//!
//! - A truncated tail (incomplete header, block or separator) is treated as
//!   the end of the segment and flagged via [`RecordScanner::is_torn`]
//! - Bytes that cannot be the start of a record, a malformed header or a
//!   wrong separator are reported as [`CoreError::SegmentCorruption`]

use super::{RecordHeader, MAX_HEADER_SIZE, RECORD_TERMINATOR, VERSION_LINE};
use crate::digest::{format_digest, DigestAlgorithm};
use crate::error::{CoreError, CoreResult};
use arcvault_storage::StorageBackend;

/// Bytes fetched per read while looking for the end of a header block.
const HEADER_CHUNK: usize = 4 * 1024;

/// Bytes fetched per read while digesting a payload.
const PAYLOAD_CHUNK: usize = 64 * 1024;

/// A record located inside a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedRecord {
    /// Offset of the version line.
    pub offset: u64,
    /// Length of the header block, blank line included.
    pub header_len: u64,
    /// Parsed header.
    pub header: RecordHeader,
}

impl ScannedRecord {
    /// Length of the framed record.
    #[must_use]
    pub fn length(&self) -> u64 {
        self.header_len
            .saturating_add(self.header.block_length)
            .saturating_add(RECORD_TERMINATOR.len() as u64)
    }

    /// Offset just past the separator.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length())
    }

    /// Offset of the first block byte.
    #[must_use]
    pub fn block_offset(&self) -> u64 {
        self.offset + self.header_len
    }

    /// Offset of the first payload byte.
    #[must_use]
    pub fn payload_offset(&self) -> u64 {
        self.block_offset() + self.header.payload_offset()
    }
}

/// Iterates the records of a segment up to a byte limit.
///
/// # Example
///
/// ```ignore
/// let mut scanner = RecordScanner::new(&backend, None)?;
/// while let Some(record) = scanner.next_record()? {
///     println!("{} @ {}", record.header.target_uri, record.offset);
/// }
/// ```
pub struct RecordScanner<'a> {
    backend: &'a dyn StorageBackend,
    position: u64,
    limit: u64,
    finished: bool,
    torn: bool,
}

impl<'a> RecordScanner<'a> {
    /// Creates a scanner starting at offset 0.
    ///
    /// `limit` caps how far the scanner reads; `None` means the current size.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be determined.
    pub fn new(backend: &'a dyn StorageBackend, limit: Option<u64>) -> CoreResult<Self> {
        let size = backend.size()?;
        Ok(Self {
            backend,
            position: 0,
            limit: limit.map_or(size, |l| l.min(size)),
            finished: false,
            torn: false,
        })
    }

    /// End of the last complete record returned so far.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Byte limit of this scan.
    #[must_use]
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Whether the scan stopped at an incomplete trailing record.
    #[must_use]
    pub const fn is_torn(&self) -> bool {
        self.torn
    }

    /// Reads the next record.
    ///
    /// Returns `Ok(None)` at the end of the segment or at a torn tail.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SegmentCorruption`] for malformed bytes, or a
    /// storage error.
    pub fn next_record(&mut self) -> CoreResult<Option<ScannedRecord>> {
        if self.finished || self.position >= self.limit {
            self.finished = true;
            return Ok(None);
        }

        let start = self.position;
        let result = read_header_bounded(self.backend, start, self.limit);
        let (header, header_len) = match result {
            Ok(Some(found)) => found,
            Ok(None) => return Ok(self.stop_torn()),
            Err(e) => {
                self.finished = true;
                return Err(e);
            }
        };

        // A block that cannot fit before the limit is an unfinished record,
        // whatever its declared length.
        let room = (self.limit - start)
            .saturating_sub(header_len)
            .saturating_sub(RECORD_TERMINATOR.len() as u64);
        if header.block_length > room {
            return Ok(self.stop_torn());
        }

        let record = ScannedRecord {
            offset: start,
            header_len,
            header,
        };

        let sep_at = record.end() - RECORD_TERMINATOR.len() as u64;
        let sep = self.backend.read_at(sep_at, RECORD_TERMINATOR.len())?;
        if sep != RECORD_TERMINATOR {
            self.finished = true;
            return Err(CoreError::segment_corruption(format!(
                "missing record separator at offset {sep_at}"
            )));
        }

        self.position = record.end();
        Ok(Some(record))
    }

    fn stop_torn(&mut self) -> Option<ScannedRecord> {
        self.finished = true;
        self.torn = true;
        None
    }
}

impl Iterator for RecordScanner<'_> {
    type Item = CoreResult<ScannedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Reads the header block of the record at `offset`, never past `limit`.
///
/// Returns `Ok(None)` if the bytes before `limit` end mid-header.
fn read_header_bounded(
    backend: &dyn StorageBackend,
    offset: u64,
    limit: u64,
) -> CoreResult<Option<(RecordHeader, u64)>> {
    let magic = format!("{VERSION_LINE}\r\n");
    let mut buf: Vec<u8> = Vec::with_capacity(HEADER_CHUNK);
    let mut searched = 0usize;

    loop {
        let available = limit.saturating_sub(offset.saturating_add(buf.len() as u64));
        let room = MAX_HEADER_SIZE - buf.len();
        let want = HEADER_CHUNK.min(room).min(usize::try_from(available).unwrap_or(usize::MAX));
        if want == 0 {
            if room == 0 {
                return Err(CoreError::segment_corruption(format!(
                    "header at offset {offset} exceeds {MAX_HEADER_SIZE} bytes"
                )));
            }
            return Ok(None);
        }

        let chunk = backend.read_at(offset + buf.len() as u64, want)?;
        buf.extend_from_slice(&chunk);

        let check = buf.len().min(magic.len());
        if buf[..check] != magic.as_bytes()[..check] {
            return Err(CoreError::segment_corruption(format!(
                "no record starts at offset {offset}"
            )));
        }

        let from = searched.saturating_sub(RECORD_TERMINATOR.len() - 1);
        if let Some(pos) = find(&buf[from..], RECORD_TERMINATOR) {
            let end = from + pos + RECORD_TERMINATOR.len();
            let header = RecordHeader::parse(&buf[..end]).map_err(|e| match e {
                CoreError::SegmentCorruption { message } => {
                    CoreError::segment_corruption(format!("offset {offset}: {message}"))
                }
                other => other,
            })?;
            return Ok(Some((header, end as u64)));
        }
        searched = buf.len();
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Reads the header of a record known to span `offset..offset + length`.
///
/// # Errors
///
/// Returns [`CoreError::SegmentCorruption`] if no complete header lies in
/// that range.
pub fn read_header_at(
    backend: &dyn StorageBackend,
    offset: u64,
    length: u64,
) -> CoreResult<(RecordHeader, u64)> {
    read_header_bounded(backend, offset, offset.saturating_add(length))?.ok_or_else(|| {
        CoreError::segment_corruption(format!("record at offset {offset} is truncated"))
    })
}

/// Reads a whole block into memory. Meant for small bookkeeping records.
///
/// # Errors
///
/// Returns a storage error if the block cannot be read.
pub fn read_block(backend: &dyn StorageBackend, record: &ScannedRecord) -> CoreResult<Vec<u8>> {
    let len = usize::try_from(record.header.block_length)
        .map_err(|_| CoreError::segment_corruption("block too large to buffer"))?;
    Ok(backend.read_at(record.block_offset(), len)?)
}

/// Recomputes the payload digest of a record.
///
/// # Errors
///
/// Returns a storage error if the payload cannot be read.
pub fn digest_payload(
    backend: &dyn StorageBackend,
    record: &ScannedRecord,
    algorithm: &dyn DigestAlgorithm,
) -> CoreResult<String> {
    let mut state = algorithm.start();
    let mut at = record.payload_offset();
    let mut remaining = record.header.payload_len();
    while remaining > 0 {
        let n = usize::try_from(remaining).map_or(PAYLOAD_CHUNK, |r| r.min(PAYLOAD_CHUNK));
        let chunk = backend.read_at(at, n)?;
        state.update(&chunk);
        at += n as u64;
        remaining -= n as u64;
    }
    Ok(format_digest(algorithm, &state.finish()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactId;
    use crate::digest::{digest_bytes, Sha256Digest};
    use crate::record::RecordType;
    use arcvault_storage::InMemoryBackend;
    use proptest::prelude::*;

    fn frame(uri: &str, payload: &[u8]) -> Vec<u8> {
        let mut header = RecordHeader::new(
            RecordType::Resource,
            ArtifactId::new(),
            uri,
            "20261016000000",
            "text/plain",
            payload.len() as u64,
        );
        header.payload_length = Some(payload.len() as u64);
        let mut out = header.render().unwrap();
        out.extend_from_slice(payload);
        out.extend_from_slice(RECORD_TERMINATOR);
        out
    }

    /// A record whose header declares `declared` block bytes but carries `body`.
    fn frame_declaring(declared: u64, body: &[u8]) -> Vec<u8> {
        let header = RecordHeader::new(
            RecordType::Resource,
            ArtifactId::new(),
            "http://a/declared",
            "20261016000000",
            "text/plain",
            declared,
        );
        let mut out = header.render().unwrap();
        out.extend_from_slice(body);
        out.extend_from_slice(RECORD_TERMINATOR);
        out
    }

    fn backend_with(records: &[Vec<u8>]) -> InMemoryBackend {
        InMemoryBackend::with_data(records.concat())
    }

    #[test]
    fn scans_all_records() {
        let backend = backend_with(&[frame("http://a/1", b"one"), frame("http://a/2", b"two!")]);
        let records: Vec<_> = RecordScanner::new(&backend, None)
            .unwrap()
            .collect::<CoreResult<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].offset, 0);
        assert_eq!(records[1].offset, records[0].end());
        assert_eq!(records[1].header.target_uri, "http://a/2");
        assert_eq!(records[1].end(), backend.size().unwrap());
    }

    #[test]
    fn torn_tail_is_end_of_segment() {
        let first = frame("http://a/1", b"one");
        let second = frame("http://a/2", b"two");
        for cut in [1, 10, second.len() - 30, second.len() - 1] {
            let mut data = first.clone();
            data.extend_from_slice(&second[..cut]);
            let backend = InMemoryBackend::with_data(data);

            let mut scanner = RecordScanner::new(&backend, None).unwrap();
            assert!(scanner.next_record().unwrap().is_some());
            assert!(scanner.next_record().unwrap().is_none(), "cut at {cut}");
            assert!(scanner.is_torn());
            assert_eq!(scanner.position(), first.len() as u64);
        }
    }

    #[test]
    fn limit_hides_later_records() {
        let first = frame("http://a/1", b"one");
        let backend = backend_with(&[first.clone(), frame("http://a/2", b"two")]);
        let mut scanner = RecordScanner::new(&backend, Some(first.len() as u64)).unwrap();
        assert!(scanner.next_record().unwrap().is_some());
        assert!(scanner.next_record().unwrap().is_none());
        assert!(!scanner.is_torn());
    }

    #[test]
    fn garbage_is_corruption() {
        let mut data = frame("http://a/1", b"one");
        data.extend_from_slice(b"GARBAGE GARBAGE GARBAGE");
        let backend = InMemoryBackend::with_data(data);
        let mut scanner = RecordScanner::new(&backend, None).unwrap();
        assert!(scanner.next_record().unwrap().is_some());
        assert!(matches!(
            scanner.next_record(),
            Err(CoreError::SegmentCorruption { .. })
        ));
        assert!(scanner.next_record().unwrap().is_none());
    }

    #[test]
    fn bad_separator_is_corruption() {
        let mut data = frame("http://a/1", b"one");
        let n = data.len();
        data[n - 1] = b'X';
        let backend = InMemoryBackend::with_data(data);
        let mut scanner = RecordScanner::new(&backend, None).unwrap();
        assert!(matches!(
            scanner.next_record(),
            Err(CoreError::SegmentCorruption { .. })
        ));
    }

    #[test]
    fn huge_declared_length_is_a_torn_tail() {
        let first = frame("http://a/1", b"one");
        for declared in [u64::MAX, u64::MAX - 3, u64::MAX / 2, 1 << 40] {
            let backend = backend_with(&[first.clone(), frame_declaring(declared, b"abc")]);
            let mut scanner = RecordScanner::new(&backend, None).unwrap();
            assert!(scanner.next_record().unwrap().is_some());
            assert!(scanner.next_record().unwrap().is_none(), "declared {declared}");
            assert!(scanner.is_torn());
            assert_eq!(scanner.position(), first.len() as u64);
        }
    }

    #[test]
    fn lengths_saturate() {
        let backend = backend_with(&[frame_declaring(u64::MAX, b"")]);
        let size = backend.size().unwrap();
        let (header, header_len) = read_header_at(&backend, 0, size).unwrap();
        let record = ScannedRecord {
            offset: 10,
            header_len,
            header,
        };
        assert_eq!(record.length(), u64::MAX);
        assert_eq!(record.end(), u64::MAX);
    }

    #[test]
    fn payload_digest_matches() {
        let backend = backend_with(&[frame("http://a/1", b"hello")]);
        let record = RecordScanner::new(&backend, None)
            .unwrap()
            .next_record()
            .unwrap()
            .unwrap();
        assert_eq!(
            digest_payload(&backend, &record, &Sha256Digest).unwrap(),
            digest_bytes(&Sha256Digest, b"hello")
        );
        assert_eq!(read_block(&backend, &record).unwrap(), b"hello");
    }

    proptest! {
        #[test]
        fn arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let backend = InMemoryBackend::with_data(data);
            let scanner = RecordScanner::new(&backend, None).unwrap();
            for item in scanner {
                if item.is_err() {
                    break;
                }
            }
        }

        #[test]
        fn every_prefix_scans_cleanly(cut in 0usize..400) {
            let data = [frame("http://p/1", b"abc"), frame("http://p/2", b"defgh")].concat();
            let cut = cut.min(data.len());
            let backend = InMemoryBackend::with_data(data[..cut].to_vec());
            let mut scanner = RecordScanner::new(&backend, None).unwrap();
            while scanner.next_record().unwrap().is_some() {}
            prop_assert!(scanner.position() <= cut as u64);
        }

        #[test]
        fn declared_lengths_never_panic(declared in any::<u64>(), body_len in 0usize..64) {
            let body = vec![b'x'; body_len];
            let data = [frame("http://p/1", b"abc"), frame_declaring(declared, &body)].concat();
            let size = data.len() as u64;
            let backend = InMemoryBackend::with_data(data);
            let mut scanner = RecordScanner::new(&backend, None).unwrap();
            let mut records = 0;
            loop {
                match scanner.next_record() {
                    Ok(Some(record)) => {
                        prop_assert!(record.end() <= size);
                        records += 1;
                    }
                    Ok(None) | Err(_) => break,
                }
            }
            prop_assert!(records >= 1);
            prop_assert!(scanner.position() <= size);
            if declared == body_len as u64 {
                prop_assert_eq!(records, 2);
            }
        }
    }
}
