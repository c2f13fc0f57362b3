//! Self-framed archive records.
//!
//! A record is a header block, a block of exactly `Content-Length` bytes, and
//! a `\r\n\r\n` separator:
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────┬──────────┐
//! │ header block         │ block                    │ \r\n\r\n │
//! │ (ends in blank line) │ (Content-Length bytes)   │          │
//! └──────────────────────┴──────────────────────────┴──────────┘
//! ```
//!
//! For `response` records the block is the HTTP status line and headers
//! followed by the payload; for `resource` records the block is the payload.

mod encoder;
mod header;
mod reader;

pub use encoder::{EncodedRecord, RecordEncoder};
pub use header::{check_name, check_value, RecordHeader, RecordType, VERSION_LINE};
pub use reader::{digest_payload, read_block, read_header_at, RecordScanner, ScannedRecord};

use chrono::{DateTime, Utc};

/// Separator written after every block.
pub const RECORD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Upper bound on a header block; anything longer is corruption.
pub const MAX_HEADER_SIZE: usize = 64 * 1024;

/// Formats a time as a 14-digit `yyyyMMddHHmmss` timestamp.
#[must_use]
pub fn warc_date(time: DateTime<Utc>) -> String {
    time.format("%Y%m%d%H%M%S").to_string()
}

/// Formats epoch milliseconds as a 14-digit timestamp.
///
/// Out-of-range values clamp to the epoch.
#[must_use]
pub fn warc_date_millis(millis: i64) -> String {
    warc_date(DateTime::from_timestamp_millis(millis).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourteen_digit_dates() {
        assert_eq!(warc_date_millis(0), "19700101000000");
        assert_eq!(warc_date_millis(1_700_000_000_123), "20231114221320");
        assert_eq!(warc_date(Utc::now()).len(), 14);
    }
}
