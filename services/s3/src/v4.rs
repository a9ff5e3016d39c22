use crate::canonical::{strip_endpoint_prefix, SignInfo};
use crate::constants::*;
use crate::sign_request::SignatureVersion;
use crate::Credential;
use log::debug;
use percent_encoding::{percent_decode_str, utf8_percent_encode};
use s3sign_core::hash::{hex_hmac_sha256, hex_sha256, hmac_sha256};
use s3sign_core::time::{format_date, format_iso8601, DateTime};
use s3sign_core::utils::collapse_whitespace;
use s3sign_core::{Result, SigningRequest};
use std::fmt::Write;

/// AWS Signature Version 4 for S3.
///
/// - [Signature Version 4 signing process](https://docs.aws.amazon.com/AmazonS3/latest/API/sig-v4-header-based-auth.html)
///
/// Signs every canonicalized header, including `host` and any caller supplied plain header.
/// Requests of every method can be signed.
#[derive(Debug, Clone)]
pub struct SignatureV4 {
    region: String,
    service: String,
    endpoint_prefix: String,
}

impl SignatureV4 {
    /// Create a V4 signature for `region` and `service`.
    pub fn new(region: &str, service: &str) -> Self {
        Self {
            region: region.to_string(),
            service: service.to_string(),
            endpoint_prefix: String::new(),
        }
    }

    /// Path prefix stripped from every request path before signing.
    pub fn with_endpoint_prefix(mut self, prefix: &str) -> Self {
        self.endpoint_prefix = prefix.to_string();
        self
    }

    /// Scope: `20130524/us-east-1/s3/aws4_request`
    pub fn scope(&self, now: DateTime) -> String {
        format!(
            "{}/{}/{}/aws4_request",
            format_date(now),
            self.region,
            self.service
        )
    }

    /// Build the canonical request, returning it with the signed header names.
    pub fn canonical_request(
        &self,
        req: &SigningRequest,
        info: &SignInfo,
    ) -> Result<(String, String)> {
        let headers = canonical_headers(info);
        let signed_headers = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let mut f = String::new();
        writeln!(f, "{}", req.method)?;
        writeln!(f, "{}", canonical_uri(&req.path, &self.endpoint_prefix))?;
        writeln!(f, "{}", canonical_query(&req.query))?;
        for (k, v) in &headers {
            writeln!(f, "{k}:{v}")?;
        }
        writeln!(f)?;
        writeln!(f, "{signed_headers}")?;
        write!(f, "{}", info.body_hash)?;

        Ok((f, signed_headers))
    }

    /// StringToSign:
    ///
    /// ```text
    /// AWS4-HMAC-SHA256
    /// 20130524T000000Z
    /// 20130524/us-east-1/s3/aws4_request
    /// <hashed_canonical_request>
    /// ```
    pub fn string_to_sign(&self, canonical_request: &str, now: DateTime) -> Result<String> {
        let mut f = String::new();
        writeln!(f, "AWS4-HMAC-SHA256")?;
        writeln!(f, "{}", format_iso8601(now))?;
        writeln!(f, "{}", self.scope(now))?;
        write!(f, "{}", hex_sha256(canonical_request.as_bytes()))?;
        Ok(f)
    }
}

impl SignatureVersion for SignatureV4 {
    fn body_hash(&self, body: &[u8]) -> String {
        hex_sha256(body)
    }

    fn inject_headers(&self, info: &mut SignInfo, now: DateTime) {
        let body_hash = info.body_hash.clone();
        info.set_amz(X_AMZ_CONTENT_SHA_256, body_hash);
        info.set_amz(X_AMZ_DATE, format_iso8601(now));
    }

    fn authorization(
        &self,
        req: &SigningRequest,
        info: &SignInfo,
        cred: &Credential,
        now: DateTime,
    ) -> Result<String> {
        let (creq, signed_headers) = self.canonical_request(req, info)?;
        debug!("calculated canonical request: {creq}");

        let scope = self.scope(now);
        debug!("calculated scope: {scope}");

        let string_to_sign = self.string_to_sign(&creq, now)?;
        debug!("calculated string to sign: {string_to_sign}");

        let signing_key =
            generate_signing_key(&cred.secret_access_key, now, &self.region, &self.service)?;
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes())?;

        Ok(format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            cred.access_key_id, scope, signed_headers, signature
        ))
    }
}

/// Percent encode every path segment the AWS way, `/` if the path is empty.
fn canonical_uri(path: &str, endpoint_prefix: &str) -> String {
    let path = strip_endpoint_prefix(path, endpoint_prefix);
    let decoded = percent_decode_str(&path).decode_utf8_lossy();

    utf8_percent_encode(&decoded, &AWS_URI_ENCODE_SET).to_string()
}

/// Encode keys and values one by one, then sort by key. A bare key becomes `key=`.
fn canonical_query(query: &[(String, String)]) -> String {
    let mut pairs = query
        .iter()
        .map(|(k, v)| {
            (
                utf8_percent_encode(k, AWS_QUERY_ENCODE_SET).to_string(),
                utf8_percent_encode(v, AWS_QUERY_ENCODE_SET).to_string(),
            )
        })
        .collect::<Vec<_>>();
    pairs.sort();

    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Union of both partitions with trimmed values, sorted by name.
fn canonical_headers(info: &SignInfo) -> Vec<(String, String)> {
    let mut headers = info
        .plain_headers
        .iter()
        .chain(info.amz_headers.iter())
        .map(|(k, v)| (k.to_ascii_lowercase(), collapse_whitespace(v)))
        .collect::<Vec<_>>();
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    // Repeated plain headers are signed as one comma separated line.
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
    merged
}

/// kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")
fn generate_signing_key(
    secret: &str,
    time: DateTime,
    region: &str,
    service: &str,
) -> Result<Vec<u8>> {
    // Sign secret
    let secret = format!("AWS4{secret}");
    // Sign date
    let sign_date = hmac_sha256(secret.as_bytes(), format_date(time).as_bytes())?;
    // Sign region
    let sign_region = hmac_sha256(sign_date.as_slice(), region.as_bytes())?;
    // Sign service
    let sign_service = hmac_sha256(sign_region.as_slice(), service.as_bytes())?;
    // Sign request
    hmac_sha256(sign_service.as_slice(), "aws4_request".as_bytes())
}
