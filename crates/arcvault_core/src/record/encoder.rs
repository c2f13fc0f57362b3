//! Record encoder.
//!
//! Turns an [`ArtifactData`] into a record ready to append: the content is
//! drained once into a spool (memory first, a temp file past a threshold)
//! while it is digested and measured. The header block is rendered later,
//! under the AU lock, once the version is known.

use super::{warc_date, warc_date_millis, RecordHeader, RecordType, RECORD_TERMINATOR};
use super::{check_name, check_value};
use crate::artifact::{Artifact, ArtifactData, ArtifactId, HttpStatus};
use crate::config::Config;
use crate::digest::{digest_bytes, format_digest, DigestAlgorithm, DigestingReader};
use crate::error::{CoreError, CoreResult};
use crate::types::{AuKey, Namespace, StorageLocation};
use chrono::Utc;
use std::io::{self, Read, Seek, SeekFrom};
use std::net::IpAddr;
use std::sync::Arc;
use tempfile::SpooledTempFile;

const OCTET_STREAM: &str = "application/octet-stream";
const HTTP_RESPONSE: &str = "application/http; msgtype=response";

/// Serializes artifact submissions into self-describing records.
#[derive(Debug, Clone)]
pub struct RecordEncoder {
    digest: Arc<dyn DigestAlgorithm>,
    spool_threshold: usize,
    default_capture_ip: IpAddr,
}

impl RecordEncoder {
    /// Creates an encoder using `digest` for content and metadata hashes.
    pub fn new(digest: Arc<dyn DigestAlgorithm>, spool_threshold: usize, default_capture_ip: IpAddr) -> Self {
        Self {
            digest,
            spool_threshold,
            default_capture_ip,
        }
    }

    /// Creates an encoder from store configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::clone(&config.digest),
            config.spool_threshold,
            config.default_capture_ip,
        )
    }

    /// The digest algorithm in use.
    #[must_use]
    pub fn digest(&self) -> &Arc<dyn DigestAlgorithm> {
        &self.digest
    }

    /// Checks a submission without touching its content.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for a bad namespace, an empty auid
    /// or uri, header text that would break framing, or missing content.
    pub fn validate(&self, data: &ArtifactData) -> CoreResult<AuKey> {
        let key = AuKey::new(Namespace::new(data.namespace.as_str())?, data.auid.as_str())?;
        if data.uri.is_empty() {
            return Err(CoreError::validation("uri must not be empty"));
        }
        check_value("uri", &data.uri)?;
        check_value("auid", &data.auid)?;
        for (name, value) in &data.headers {
            check_name(name)?;
            check_value(name, value)?;
        }
        if let Some(status) = &data.http_status {
            check_value("status", &status.to_string())?;
        }
        if !data.has_content() {
            return Err(CoreError::validation("artifact content missing or already consumed"));
        }
        Ok(key)
    }

    /// Drains the content of `data`, digesting and measuring it.
    ///
    /// # Errors
    ///
    /// Returns a validation error (see [`validate`](Self::validate)) before
    /// reading anything, or an I/O error from the content stream.
    pub fn encode(&self, mut data: ArtifactData) -> CoreResult<EncodedRecord> {
        let key = self.validate(&data)?;
        let content = data
            .take_content()
            .ok_or_else(|| CoreError::validation("artifact content missing or already consumed"))?;

        let mut spool = SpooledTempFile::new(self.spool_threshold);
        let mut reader = DigestingReader::new(content, self.digest.as_ref());
        io::copy(&mut reader, &mut spool)?;
        spool.seek(SeekFrom::Start(0))?;
        let (payload_length, raw) = reader.finish();

        let (record_type, content_type, http_head) = match &data.http_status {
            Some(status) => (
                RecordType::Response,
                HTTP_RESPONSE.to_string(),
                http_head(status, &data.headers),
            ),
            None => (
                RecordType::Resource,
                data.content_type().unwrap_or(OCTET_STREAM).to_string(),
                Vec::new(),
            ),
        };

        let now = Utc::now();
        Ok(EncodedRecord {
            id: ArtifactId::new(),
            record_type,
            key,
            metadata_digest: self.metadata_digest(data.http_status.as_ref(), &data.headers),
            uri: data.uri,
            headers: data.headers,
            content_type,
            http_head,
            payload: spool,
            payload_length,
            payload_digest: format_digest(self.digest.as_ref(), &raw),
            capture_ip: data.capture_ip.unwrap_or(self.default_capture_ip),
            capture_millis: data.collection_date.unwrap_or_else(|| now.timestamp_millis()),
            created: warc_date(now),
        })
    }

    /// Digest of the header set as `name: value\n` lines, status line first.
    #[must_use]
    pub fn metadata_digest(&self, status: Option<&HttpStatus>, headers: &[(String, String)]) -> String {
        let mut text = String::new();
        if let Some(status) = status {
            text.push_str(&status.to_string());
            text.push('\n');
        }
        for (name, value) in headers {
            text.push_str(name);
            text.push_str(": ");
            text.push_str(value);
            text.push('\n');
        }
        digest_bytes(self.digest.as_ref(), text.as_bytes())
    }
}

fn http_head(status: &HttpStatus, headers: &[(String, String)]) -> Vec<u8> {
    let mut head = format!("{status}\r\n");
    for (name, value) in headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");
    head.into_bytes()
}

/// A measured, digested record waiting to be appended.
#[derive(Debug)]
pub struct EncodedRecord {
    id: ArtifactId,
    record_type: RecordType,
    key: AuKey,
    uri: String,
    headers: Vec<(String, String)>,
    content_type: String,
    http_head: Vec<u8>,
    payload: SpooledTempFile,
    payload_length: u64,
    payload_digest: String,
    metadata_digest: String,
    capture_ip: IpAddr,
    capture_millis: i64,
    created: String,
}

impl EncodedRecord {
    /// Record and artifact identifier.
    #[must_use]
    pub const fn id(&self) -> ArtifactId {
        self.id
    }

    /// Record kind.
    #[must_use]
    pub const fn record_type(&self) -> RecordType {
        self.record_type
    }

    /// Owning archival unit.
    #[must_use]
    pub const fn key(&self) -> &AuKey {
        &self.key
    }

    /// Target URI.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Content length, HTTP head excluded.
    #[must_use]
    pub const fn payload_length(&self) -> u64 {
        self.payload_length
    }

    /// `<alg>:<hex>` digest of the content.
    #[must_use]
    pub fn payload_digest(&self) -> &str {
        &self.payload_digest
    }

    /// `<alg>:<hex>` digest of the header set.
    #[must_use]
    pub fn metadata_digest(&self) -> &str {
        &self.metadata_digest
    }

    /// Length of the block: HTTP head (responses only) plus content.
    #[must_use]
    pub fn block_length(&self) -> u64 {
        self.http_head.len() as u64 + self.payload_length
    }

    /// Full framed length given a rendered header block of `header_len` bytes.
    #[must_use]
    pub fn framed_length(&self, header_len: usize) -> u64 {
        header_len as u64 + self.block_length() + RECORD_TERMINATOR.len() as u64
    }

    /// Renders the header block for this record at `version`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a value would break framing.
    pub fn header_block(&self, version: u32) -> CoreResult<Vec<u8>> {
        let mut header = RecordHeader::new(
            self.record_type,
            self.id,
            self.uri.as_str(),
            self.created.as_str(),
            self.content_type.as_str(),
            self.block_length(),
        );
        header.payload_digest = Some(self.payload_digest.clone());
        header.ip_address = Some(self.capture_ip.to_string());
        header.capture_date = Some(warc_date_millis(self.capture_millis));
        header.namespace = Some(self.key.namespace.to_string());
        header.auid = Some(self.key.auid.clone());
        header.version = Some(version);
        header.payload_length = Some(self.payload_length);
        header.capture_millis = Some(self.capture_millis);
        header.metadata_digest = Some(self.metadata_digest.clone());
        if self.record_type == RecordType::Resource {
            header.extra_headers = self.headers.clone();
        }
        header.render()
    }

    /// The block followed by the record separator, as one stream.
    pub fn body(&mut self) -> impl Read + '_ {
        io::Cursor::new(&self.http_head[..])
            .chain(&mut self.payload)
            .chain(RECORD_TERMINATOR)
    }

    /// Builds the uncommitted artifact this record describes.
    #[must_use]
    pub fn to_artifact(&self, version: u32, location: StorageLocation) -> Artifact {
        Artifact {
            id: self.id,
            namespace: self.key.namespace.clone(),
            auid: self.key.auid.clone(),
            uri: self.uri.clone(),
            version,
            committed: false,
            content_hash: self.payload_digest.clone(),
            metadata_hash: self.metadata_digest.clone(),
            content_length: self.payload_length,
            content_datetime: self.capture_millis,
            location,
        }
    }
}
