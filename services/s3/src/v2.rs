use crate::canonical::{strip_endpoint_prefix, SignInfo};
use crate::constants::CONTENT_MD5;
use crate::sign_request::SignatureVersion;
use crate::Credential;
use http::header::DATE;
use http::Method;
use log::debug;
use s3sign_core::hash::{base64_hmac_sha1, base64_md5};
use s3sign_core::time::{format_http_date, DateTime};
use s3sign_core::{Error, Result, SigningRequest};
use std::fmt::Write;

/// AWS Signature Version 2 for S3.
///
/// - [Signing and authenticating REST requests](https://docs.aws.amazon.com/AmazonS3/latest/userguide/RESTAuthentication.html)
///
/// `POST` is rejected: S3 signs V2 POST uploads with a policy document instead.
#[derive(Debug, Clone, Default)]
pub struct SignatureV2 {
    endpoint_prefix: String,
}

impl SignatureV2 {
    /// Create a V2 signature.
    pub fn new() -> Self {
        Self::default()
    }

    /// Path prefix stripped from every request path before signing.
    pub fn with_endpoint_prefix(mut self, prefix: &str) -> Self {
        self.endpoint_prefix = prefix.to_string();
        self
    }

    /// StringToSign:
    ///
    /// ```text
    /// METHOD
    /// Content-MD5
    /// Content-Type
    /// Date
    /// x-amz-meta-a:value
    /// /bucket/key
    /// ```
    ///
    /// `x-amz-` lines are lower-cased, the resource carries no query.
    pub fn string_to_sign(&self, req: &SigningRequest, info: &SignInfo) -> Result<String> {
        let mut s = String::new();
        writeln!(s, "{}", req.method)?;
        writeln!(s, "{}", info.body_hash)?;
        writeln!(s, "{}", info.content_type())?;
        writeln!(s, "{}", info.plain(DATE.as_str()))?;
        for (k, v) in &info.amz_headers {
            writeln!(s, "{}:{}", k.to_lowercase(), v.to_lowercase())?;
        }
        write!(s, "{}", strip_endpoint_prefix(&req.path, &self.endpoint_prefix))?;

        Ok(s)
    }
}

impl SignatureVersion for SignatureV2 {
    fn check_method(&self, method: &Method) -> Result<()> {
        if *method == Method::POST {
            return Err(Error::unsupported_method(
                "POST requests can't be signed with signature v2",
            ));
        }
        Ok(())
    }

    fn body_hash(&self, body: &[u8]) -> String {
        base64_md5(body)
    }

    fn inject_headers(&self, info: &mut SignInfo, now: DateTime) {
        let body_hash = info.body_hash.clone();
        info.set_plain(CONTENT_MD5, body_hash);
        info.set_plain(DATE.as_str(), format_http_date(now));
    }

    fn authorization(
        &self,
        req: &SigningRequest,
        info: &SignInfo,
        cred: &Credential,
        _: DateTime,
    ) -> Result<String> {
        let string_to_sign = self.string_to_sign(req, info)?;
        debug!("calculated string to sign: {string_to_sign}");

        let signature =
            base64_hmac_sha1(cred.secret_access_key.as_bytes(), string_to_sign.as_bytes())?;

        Ok(format!("AWS {}:{}", cred.access_key_id, signature))
    }
}
