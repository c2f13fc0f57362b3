//! Record header block.
//!
//! Header blocks are `Label: Value` lines in the WARC/1.0 layout:
//!
//! ```text
//! WARC/1.0\r\n
//! WARC-Type: resource\r\n
//! WARC-Record-ID: <urn:uuid:...>\r\n
//! ...
//! \r\n
//! ```
//!
//! Fields this engine adds on top of WARC carry an `X-Arcvault-` prefix.

use crate::artifact::ArtifactId;
use crate::error::{CoreError, CoreResult};
use std::fmt;

/// First line of every record.
pub const VERSION_LINE: &str = "WARC/1.0";

const WARC_TYPE: &str = "WARC-Type";
const WARC_RECORD_ID: &str = "WARC-Record-ID";
const WARC_TARGET_URI: &str = "WARC-Target-URI";
const WARC_DATE: &str = "WARC-Date";
const CONTENT_TYPE: &str = "Content-Type";
const CONTENT_LENGTH: &str = "Content-Length";
const WARC_PAYLOAD_DIGEST: &str = "WARC-Payload-Digest";
const WARC_IP_ADDRESS: &str = "WARC-IP-Address";
const X_CAPTURE_DATE: &str = "X-Arcvault-Capture-Date";
const X_NAMESPACE: &str = "X-Arcvault-Namespace";
const X_AUID: &str = "X-Arcvault-Auid";
const X_VERSION: &str = "X-Arcvault-Version";
const X_PAYLOAD_LENGTH: &str = "X-Arcvault-Payload-Length";
const X_CAPTURE_MILLIS: &str = "X-Arcvault-Capture-Millis";
const X_METADATA_DIGEST: &str = "X-Arcvault-Metadata-Digest";
const X_HEADER: &str = "X-Arcvault-Header";

/// Kind of record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// Raw captured resource.
    Resource,
    /// Captured HTTP response; the block starts with the status line and headers.
    Response,
    /// Engine bookkeeping (state journal entries).
    Metadata,
}

impl RecordType {
    /// Returns the `WARC-Type` value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Response => "response",
            Self::Metadata => "metadata",
        }
    }

    /// Parses a `WARC-Type` value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "resource" => Some(Self::Resource),
            "response" => Some(Self::Response),
            "metadata" => Some(Self::Metadata),
            _ => None,
        }
    }

    /// Whether records of this type describe an artifact.
    #[must_use]
    pub const fn is_artifact(self) -> bool {
        matches!(self, Self::Resource | Self::Response)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed or to-be-written record header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    /// Record kind.
    pub record_type: RecordType,
    /// Record identifier; equals the artifact ID for artifact records.
    pub record_id: ArtifactId,
    /// Target URI.
    pub target_uri: String,
    /// 14-digit creation date.
    pub date: String,
    /// Content type of the block.
    pub content_type: String,
    /// Length of the block that follows the header.
    pub block_length: u64,
    /// `<alg>:<hex>` digest of the payload.
    pub payload_digest: Option<String>,
    /// Capture IP address.
    pub ip_address: Option<String>,
    /// 14-digit capture timestamp.
    pub capture_date: Option<String>,
    /// Owning namespace.
    pub namespace: Option<String>,
    /// Owning archival unit.
    pub auid: Option<String>,
    /// Artifact version.
    pub version: Option<u32>,
    /// Payload length; the block ends with this many content bytes.
    pub payload_length: Option<u64>,
    /// Capture time in epoch milliseconds.
    pub capture_millis: Option<i64>,
    /// `<alg>:<hex>` digest of the artifact's header set.
    pub metadata_digest: Option<String>,
    /// Artifact headers carried by resource records.
    pub extra_headers: Vec<(String, String)>,
}

impl RecordHeader {
    /// Creates a header with the mandatory fields set.
    pub fn new(
        record_type: RecordType,
        record_id: ArtifactId,
        target_uri: impl Into<String>,
        date: impl Into<String>,
        content_type: impl Into<String>,
        block_length: u64,
    ) -> Self {
        Self {
            record_type,
            record_id,
            target_uri: target_uri.into(),
            date: date.into(),
            content_type: content_type.into(),
            block_length,
            payload_digest: None,
            ip_address: None,
            capture_date: None,
            namespace: None,
            auid: None,
            version: None,
            payload_length: None,
            capture_millis: None,
            metadata_digest: None,
            extra_headers: Vec::new(),
        }
    }

    /// Payload bytes at the end of the block.
    #[must_use]
    pub fn payload_len(&self) -> u64 {
        self.payload_length
            .unwrap_or(self.block_length)
            .min(self.block_length)
    }

    /// Bytes in the block before the payload (the HTTP head of responses).
    #[must_use]
    pub fn payload_offset(&self) -> u64 {
        self.block_length - self.payload_len()
    }

    /// Renders the header block, blank separator line included.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if any value contains CR or LF, or a
    /// header name is empty or contains `:`.
    pub fn render(&self) -> CoreResult<Vec<u8>> {
        let mut out = String::with_capacity(512);
        out.push_str(VERSION_LINE);
        out.push_str("\r\n");

        let mut line = |name: &str, value: &str| -> CoreResult<()> {
            check_value(name, value)?;
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
            Ok(())
        };

        line(WARC_TYPE, self.record_type.as_str())?;
        line(WARC_RECORD_ID, &self.record_id.to_record_id())?;
        line(WARC_TARGET_URI, &self.target_uri)?;
        line(WARC_DATE, &self.date)?;
        line(CONTENT_TYPE, &self.content_type)?;
        line(CONTENT_LENGTH, &self.block_length.to_string())?;
        if let Some(v) = &self.payload_digest {
            line(WARC_PAYLOAD_DIGEST, v)?;
        }
        if let Some(v) = &self.ip_address {
            line(WARC_IP_ADDRESS, v)?;
        }
        if let Some(v) = &self.capture_date {
            line(X_CAPTURE_DATE, v)?;
        }
        if let Some(v) = &self.namespace {
            line(X_NAMESPACE, v)?;
        }
        if let Some(v) = &self.auid {
            line(X_AUID, v)?;
        }
        if let Some(v) = self.version {
            line(X_VERSION, &v.to_string())?;
        }
        if let Some(v) = self.payload_length {
            line(X_PAYLOAD_LENGTH, &v.to_string())?;
        }
        if let Some(v) = self.capture_millis {
            line(X_CAPTURE_MILLIS, &v.to_string())?;
        }
        if let Some(v) = &self.metadata_digest {
            line(X_METADATA_DIGEST, v)?;
        }
        for (name, value) in &self.extra_headers {
            check_name(name)?;
            line(X_HEADER, &format!("{name}: {value}"))?;
        }

        out.push_str("\r\n");
        Ok(out.into_bytes())
    }

    /// Parses a header block.
    ///
    /// `bytes` runs from the version line up to (optionally including) the
    /// blank separator line.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SegmentCorruption`] on anything that is not a
    /// well-formed header.
    pub fn parse(bytes: &[u8]) -> CoreResult<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| CoreError::segment_corruption("record header is not UTF-8"))?;
        let mut lines = text.split("\r\n");
        if lines.next() != Some(VERSION_LINE) {
            return Err(CoreError::segment_corruption("missing WARC/1.0 version line"));
        }

        let mut record_type = None;
        let mut record_id = None;
        let mut block_length = None;
        let mut header = Self::new(
            RecordType::Resource,
            ArtifactId::default(),
            String::new(),
            String::new(),
            "application/octet-stream",
            0,
        );

        for line in lines.take_while(|l| !l.is_empty()) {
            let (name, value) = line.split_once(':').ok_or_else(|| {
                CoreError::segment_corruption(format!("malformed header line {line:?}"))
            })?;
            let value = value.trim_start();
            match name {
                WARC_TYPE => {
                    record_type = Some(RecordType::parse(value).ok_or_else(|| {
                        CoreError::segment_corruption(format!("unknown record type {value:?}"))
                    })?);
                }
                WARC_RECORD_ID => {
                    record_id = Some(ArtifactId::parse_record_id(value).ok_or_else(|| {
                        CoreError::segment_corruption(format!("bad record id {value:?}"))
                    })?);
                }
                CONTENT_LENGTH => block_length = Some(parse_num(name, value)?),
                WARC_TARGET_URI => header.target_uri = value.to_string(),
                WARC_DATE => header.date = value.to_string(),
                CONTENT_TYPE => header.content_type = value.to_string(),
                WARC_PAYLOAD_DIGEST => header.payload_digest = Some(value.to_string()),
                WARC_IP_ADDRESS => header.ip_address = Some(value.to_string()),
                X_CAPTURE_DATE => header.capture_date = Some(value.to_string()),
                X_NAMESPACE => header.namespace = Some(value.to_string()),
                X_AUID => header.auid = Some(value.to_string()),
                X_VERSION => header.version = Some(parse_num(name, value)?),
                X_PAYLOAD_LENGTH => header.payload_length = Some(parse_num(name, value)?),
                X_CAPTURE_MILLIS => header.capture_millis = Some(parse_num(name, value)?),
                X_METADATA_DIGEST => header.metadata_digest = Some(value.to_string()),
                X_HEADER => {
                    let (n, v) = value.split_once(':').ok_or_else(|| {
                        CoreError::segment_corruption(format!("malformed {X_HEADER} {value:?}"))
                    })?;
                    header
                        .extra_headers
                        .push((n.to_string(), v.trim_start().to_string()));
                }
                _ => {}
            }
        }

        header.record_type =
            record_type.ok_or_else(|| CoreError::segment_corruption("missing WARC-Type"))?;
        header.record_id =
            record_id.ok_or_else(|| CoreError::segment_corruption("missing WARC-Record-ID"))?;
        header.block_length =
            block_length.ok_or_else(|| CoreError::segment_corruption("missing Content-Length"))?;
        Ok(header)
    }
}

fn parse_num<T: std::str::FromStr>(name: &str, value: &str) -> CoreResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CoreError::segment_corruption(format!("bad {name} value {value:?}")))
}

/// Rejects header values that would break line framing.
///
/// # Errors
///
/// Returns [`CoreError::Validation`] if `value` contains CR or LF.
pub fn check_value(name: &str, value: &str) -> CoreResult<()> {
    if value.contains(|c: char| c == '\r' || c == '\n') {
        return Err(CoreError::validation(format!(
            "header {name:?} value contains a line break"
        )));
    }
    Ok(())
}

/// Rejects header names that cannot be written as `Name: value`.
///
/// # Errors
///
/// Returns [`CoreError::Validation`] for empty names or names containing
/// `:`, whitespace or control characters.
pub fn check_name(name: &str) -> CoreResult<()> {
    if name.is_empty() || name.chars().any(|c| c == ':' || c.is_whitespace() || c.is_control()) {
        return Err(CoreError::validation(format!("invalid header name {name:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RecordHeader {
        let mut header = RecordHeader::new(
            RecordType::Resource,
            ArtifactId::new(),
            "http://x/y",
            "20261016120000",
            "text/plain",
            5,
        );
        header.payload_digest = Some("sha256:abc".into());
        header.namespace = Some("ns".into());
        header.auid = Some("au1".into());
        header.version = Some(3);
        header.payload_length = Some(5);
        header.capture_millis = Some(1_700_000_000_000);
        header.extra_headers = vec![("X-Foo".into(), "bar: baz".into())];
        header
    }

    #[test]
    fn render_then_parse() {
        let header = sample();
        let bytes = header.render().unwrap();
        assert!(bytes.starts_with(b"WARC/1.0\r\nWARC-Type: resource\r\n"));
        assert!(bytes.ends_with(b"\r\n\r\n"));
        assert_eq!(RecordHeader::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn line_breaks_are_rejected() {
        let mut header = sample();
        header.target_uri = "http://x/\r\nWARC-Type: metadata".into();
        assert!(header.render().unwrap_err().is_validation());

        let mut header = sample();
        header.extra_headers.push(("Bad Name".into(), "v".into()));
        assert!(header.render().unwrap_err().is_validation());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            RecordHeader::parse(b"HTTP/1.1 200 OK\r\n\r\n"),
            Err(CoreError::SegmentCorruption { .. })
        ));
        assert!(matches!(
            RecordHeader::parse(b"WARC/1.0\r\nWARC-Type: resource\r\n\r\n"),
            Err(CoreError::SegmentCorruption { .. })
        ));
        assert!(matches!(
            RecordHeader::parse(b"WARC/1.0\r\nno colon here\r\n\r\n"),
            Err(CoreError::SegmentCorruption { .. })
        ));
    }

    #[test]
    fn payload_offsets() {
        let mut header = sample();
        header.block_length = 40;
        header.payload_length = Some(5);
        assert_eq!(header.payload_len(), 5);
        assert_eq!(header.payload_offset(), 35);

        header.payload_length = None;
        assert_eq!(header.payload_offset(), 0);
    }
}
