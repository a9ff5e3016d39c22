//! Canonicalization shared by both signing versions.

use crate::constants::*;
use http::header::{CONTENT_TYPE, HOST};
use http::{HeaderMap, HeaderName, HeaderValue};
use s3sign_core::Result;
use std::str::FromStr;

/// The headers of one signing attempt, split the way S3 signs them.
///
/// - `plain_headers`: every header outside the `x-amz-` namespace, plus the synthesized
///   `content-type` and `host`, sorted by name.
/// - `amz_headers`: every `x-amz-` header with a lower-cased name, duplicated names
///   merged into one comma separated value, sorted by name.
/// - `body_hash`: digest of the literal body, taken before any header is injected.
///
/// A `SignInfo` is built for every attempt and never reused after a resign.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignInfo {
    /// Headers outside the `x-amz-` namespace.
    pub plain_headers: Vec<(String, String)>,
    /// Headers in the `x-amz-` namespace.
    pub amz_headers: Vec<(String, String)>,
    /// Digest of the request body in the signing version's encoding.
    pub body_hash: String,
}

impl SignInfo {
    /// Classify request headers in a single pass.
    ///
    /// The content type is taken from the placeholder header first, then from a
    /// literal `Content-Type`. An empty value counts as absent. Any `Host` header is
    /// replaced by `host`.
    pub fn classify(headers: &HeaderMap, host: &str, body_hash: String) -> Result<Self> {
        let mut plain_headers = Vec::with_capacity(headers.len() + 2);
        let mut amz_headers = Vec::new();
        let mut placeholder_content_type = None;
        let mut literal_content_type = None;

        for (name, value) in headers {
            let name = name.as_str();
            let value = value.to_str()?;

            if name == X_S3SIGN_CONTENT_TYPE {
                placeholder_content_type = Some(value);
            } else if name == CONTENT_TYPE.as_str() {
                literal_content_type = Some(value);
            } else if name == HOST.as_str() {
                continue;
            } else if name.starts_with(X_AMZ_PREFIX) {
                amz_headers.push((name.to_string(), value.to_string()));
            } else {
                plain_headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_type = placeholder_content_type
            .filter(|v| !v.is_empty())
            .or(literal_content_type.filter(|v| !v.is_empty()));
        if let Some(content_type) = content_type {
            plain_headers.push((CONTENT_TYPE.to_string(), content_type.to_string()));
        }
        plain_headers.push((HOST.to_string(), host.to_string()));

        Ok(SignInfo {
            plain_headers,
            amz_headers,
            body_hash,
        })
    }

    /// Set a plain header, replacing any previous value.
    pub fn set_plain(&mut self, name: &str, value: impl Into<String>) {
        self.plain_headers.retain(|(k, _)| k != name);
        self.plain_headers.push((name.to_string(), value.into()));
    }

    /// Set an `x-amz-` header, replacing any previous value.
    pub fn set_amz(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        self.amz_headers.retain(|(k, _)| *k != name);
        self.amz_headers.push((name, value.into()));
    }

    /// Get a plain header by name, empty if not present.
    pub fn plain(&self, name: &str) -> &str {
        self.plain_headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .unwrap_or_default()
    }

    /// The effective content type, empty if the request has none.
    pub fn content_type(&self) -> &str {
        self.plain(CONTENT_TYPE.as_str())
    }

    /// Sort plain headers and merge `x-amz-` headers.
    pub fn normalize(&mut self) {
        self.plain_headers.sort_by(|a, b| a.0.cmp(&b.0));
        self.amz_headers = merge_amz_headers(std::mem::take(&mut self.amz_headers));
    }

    /// Rebuild the outgoing header map from both partitions.
    pub fn to_header_map(&self) -> Result<HeaderMap> {
        let mut headers =
            HeaderMap::with_capacity(self.plain_headers.len() + self.amz_headers.len() + 1);
        for (k, v) in self.plain_headers.iter().chain(self.amz_headers.iter()) {
            headers.append(HeaderName::from_str(k)?, HeaderValue::from_str(v)?);
        }
        Ok(headers)
    }
}

/// Merge `x-amz-` headers sharing a name.
///
/// Entries are sorted by `"name:value"`, adjacent entries with the same name are joined
/// with `,`, and the result is sorted by name again.
///
/// ```text
/// [("x-amz-meta-a", "2"), ("x-amz-meta-a", "1")] => [("x-amz-meta-a", "1,2")]
/// ```
pub fn merge_amz_headers(mut headers: Vec<(String, String)>) -> Vec<(String, String)> {
    headers.sort_by_cached_key(|(k, v)| format!("{k}:{v}"));

    let mut merged: Vec<(String, String)> = Vec::with_capacity(headers.len());
    for (k, v) in headers {
        match merged.last_mut() {
            Some((last_k, last_v)) if *last_k == k => {
                last_v.push(',');
                last_v.push_str(&v);
            }
            _ => merged.push((k, v)),
        }
    }

    merged.sort_by(|a, b| a.0.cmp(&b.0));
    merged
}

/// Strip the endpoint prefix from a request path.
///
/// Everything up to and including the first occurrence of `prefix` is dropped, and the
/// result always starts with `/`.
pub fn strip_endpoint_prefix<'a>(path: &'a str, prefix: &str) -> std::borrow::Cow<'a, str> {
    let path = match (prefix.is_empty(), path.find(prefix)) {
        (false, Some(idx)) => &path[idx + prefix.len()..],
        _ => path,
    };

    if path.starts_with('/') {
        std::borrow::Cow::Borrowed(path)
    } else {
        std::borrow::Cow::Owned(format!("/{path}"))
    }
}
