//! Artifact submission wrapper.

use crate::artifact::ArtifactId;
use crate::error::{CoreError, CoreResult};
use crate::types::ArtifactState;
use std::fmt;
use std::io::{self, Read};
use std::net::IpAddr;

/// HTTP status line of a captured response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpStatus {
    /// Protocol, e.g. `HTTP/1.1`.
    pub protocol: String,
    /// Status code.
    pub code: u16,
    /// Reason phrase.
    pub reason: String,
}

impl HttpStatus {
    /// Creates an `HTTP/1.1` status line.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            protocol: "HTTP/1.1".to_string(),
            code,
            reason: reason.into(),
        }
    }

    /// Parses a status line such as `HTTP/1.1 404 Not Found`.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.trim_end().splitn(3, ' ');
        let protocol = parts.next()?;
        if !protocol.starts_with("HTTP/") {
            return None;
        }
        let code = parts.next()?.parse().ok()?;
        let reason = parts.next().unwrap_or_default();
        Some(Self {
            protocol: protocol.to_string(),
            code,
            reason: reason.to_string(),
        })
    }
}

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.protocol, self.code, self.reason)
    }
}

/// Content plus headers and identity, submitted to or returned by the store.
///
/// The content stream is single-consumption: `add_artifact_data` takes the
/// value by ownership and drains it exactly once. A value returned by
/// `get_artifact_data` carries a stream positioned at the first content byte
/// and the stored identity (id, version, length, digest, state).
///
/// A submission with an HTTP status becomes a `response` record; one without
/// becomes a `resource` record.
pub struct ArtifactData {
    /// Namespace (validated on add).
    pub namespace: String,
    /// Archival unit identifier.
    pub auid: String,
    /// Target URI.
    pub uri: String,
    /// Status line for captured HTTP responses.
    pub http_status: Option<HttpStatus>,
    /// Header/property set, in order.
    pub headers: Vec<(String, String)>,
    /// Capture time in milliseconds since the epoch; defaults to now on add.
    pub collection_date: Option<i64>,
    /// Address the content was fetched from.
    pub capture_ip: Option<IpAddr>,
    /// Stored identifier (set by get).
    pub artifact_id: Option<ArtifactId>,
    /// Stored version (set by get).
    pub version: Option<u32>,
    /// Content length (set by get).
    pub content_length: Option<u64>,
    /// Content digest (set by get).
    pub content_digest: Option<String>,
    /// Lifecycle state (set by get).
    pub state: Option<ArtifactState>,
    content: Option<Box<dyn Read + Send>>,
}

impl ArtifactData {
    /// Creates a submission for `uri` in `namespace`/`auid`.
    pub fn new(
        namespace: impl Into<String>,
        auid: impl Into<String>,
        uri: impl Into<String>,
        content: impl Read + Send + 'static,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            auid: auid.into(),
            uri: uri.into(),
            http_status: None,
            headers: Vec::new(),
            collection_date: None,
            capture_ip: None,
            artifact_id: None,
            version: None,
            content_length: None,
            content_digest: None,
            state: None,
            content: Some(Box::new(content)),
        }
    }

    /// Creates a submission from an in-memory buffer.
    pub fn from_bytes(
        namespace: impl Into<String>,
        auid: impl Into<String>,
        uri: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self::new(namespace, auid, uri, io::Cursor::new(content.into()))
    }

    /// Sets the HTTP status, making this a `response` capture.
    #[must_use]
    pub fn with_http_status(mut self, status: HttpStatus) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the capture time in milliseconds since the epoch.
    #[must_use]
    pub const fn with_collection_date(mut self, millis: i64) -> Self {
        self.collection_date = Some(millis);
        self
    }

    /// Sets the capture IP address.
    #[must_use]
    pub const fn with_capture_ip(mut self, ip: IpAddr) -> Self {
        self.capture_ip = Some(ip);
        self
    }

    /// Returns the first header named `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the declared content type, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    /// Whether the content stream has not been taken yet.
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    /// Takes the content stream, leaving none behind.
    pub fn take_content(&mut self) -> Option<Box<dyn Read + Send>> {
        self.content.take()
    }

    /// Drains the content stream into a buffer.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if the stream was already consumed,
    /// or an I/O error from the stream.
    pub fn read_content(&mut self) -> CoreResult<Vec<u8>> {
        let mut stream = self
            .take_content()
            .ok_or_else(|| CoreError::invalid_state("artifact content already consumed"))?;
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf)?;
        Ok(buf)
    }

    pub(crate) fn with_content(mut self, content: Box<dyn Read + Send>) -> Self {
        self.content = Some(content);
        self
    }
}

impl fmt::Debug for ArtifactData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactData")
            .field("namespace", &self.namespace)
            .field("auid", &self.auid)
            .field("uri", &self.uri)
            .field("http_status", &self.http_status)
            .field("headers", &self.headers)
            .field("artifact_id", &self.artifact_id)
            .field("version", &self.version)
            .field("has_content", &self.content.is_some())
            .finish_non_exhaustive()
    }
}
