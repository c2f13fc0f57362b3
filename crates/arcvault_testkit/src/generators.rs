//! Property-based test generators using proptest.
//!
//! Provides strategies for namespaces, AU identifiers, URIs, header sets and
//! whole artifact submissions.

use arcvault_core::{ArtifactData, HttpStatus};
use proptest::prelude::*;

/// Strategy for namespace names that pass validation.
pub fn namespace_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9][A-Za-z0-9.-]{0,23}").expect("invalid regex")
}

/// Strategy for namespace names that fail validation.
pub fn invalid_namespace_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        prop::string::string_regex("[.-][A-Za-z0-9.-]{0,10}").expect("invalid regex"),
        prop::string::string_regex("[A-Za-z0-9]{1,5}[/ _:][A-Za-z0-9]{0,5}").expect("invalid regex"),
    ]
}

/// Strategy for AU identifiers, including the `|`, `&` and `~` separators
/// plugin-style identifiers use.
pub fn auid_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,8}(\\|[a-z]{1,8}){0,3}(&[a-z_]{1,8}~[a-z0-9%.]{1,12})?")
        .expect("invalid regex")
}

/// Strategy for absolute HTTP URIs.
pub fn uri_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("https?://[a-z]{1,12}\\.(org|com|net)(/[a-zA-Z0-9._-]{0,12}){0,4}")
        .expect("invalid regex")
}

/// Strategy for content bodies.
pub fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..4096)
}

/// Strategy for header sets with names and values that are safe to frame.
pub fn headers_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(
        (
            prop::string::string_regex("[A-Za-z][A-Za-z0-9-]{0,15}").expect("invalid regex"),
            prop::string::string_regex("[ -~]{0,40}").expect("invalid regex"),
        ),
        0..6,
    )
}

/// A reproducible artifact submission.
///
/// [`ArtifactData`] owns a single-use stream, so strategies produce this
/// plain description instead and tests convert it when needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Namespace.
    pub namespace: String,
    /// Archival unit.
    pub auid: String,
    /// Target URI.
    pub uri: String,
    /// HTTP status, making this a response capture.
    pub status: Option<(u16, String)>,
    /// Header set.
    pub headers: Vec<(String, String)>,
    /// Content bytes.
    pub content: Vec<u8>,
}

impl Submission {
    /// Builds the submission wrapper the store consumes.
    pub fn to_data(&self) -> ArtifactData {
        let mut data = ArtifactData::from_bytes(
            self.namespace.as_str(),
            self.auid.as_str(),
            self.uri.as_str(),
            self.content.clone(),
        );
        if let Some((code, reason)) = &self.status {
            data = data.with_http_status(HttpStatus::new(*code, reason.as_str()));
        }
        for (name, value) in &self.headers {
            data = data.with_header(name.as_str(), value.as_str());
        }
        data
    }
}

/// Strategy for complete submissions.
pub fn submission_strategy() -> impl Strategy<Value = Submission> {
    (
        namespace_strategy(),
        auid_strategy(),
        uri_strategy(),
        prop::option::of((
            100u16..600,
            prop::string::string_regex("[A-Za-z ]{0,12}").expect("invalid regex"),
        )),
        headers_strategy(),
        content_strategy(),
    )
        .prop_map(|(namespace, auid, uri, status, headers, content)| Submission {
            namespace,
            auid,
            uri,
            status,
            headers,
            content,
        })
}
