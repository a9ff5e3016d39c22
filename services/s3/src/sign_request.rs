use crate::canonical::SignInfo;
use crate::constants::X_AMZ_SECURITY_TOKEN;
use crate::Credential;
use async_trait::async_trait;
use http::request::Parts;
use http::{header, HeaderValue, Method};
use log::debug;
use s3sign_core::time::{now, DateTime};
use s3sign_core::{Context, Result, SignRequest, SigningRequest};
use std::fmt::Debug;

/// One S3 signature algorithm.
///
/// Both versions share the canonicalizer in [`SignInfo`] and only differ in the
/// body digest, the injected headers and the authorization value.
pub trait SignatureVersion: Debug + Send + Sync + Unpin + 'static {
    /// Fail fast if this version can't sign `method`.
    fn check_method(&self, _method: &Method) -> Result<()> {
        Ok(())
    }

    /// Digest of the literal body.
    fn body_hash(&self, body: &[u8]) -> String;

    /// Add date and digest headers. `now` must be the time used for the signature.
    fn inject_headers(&self, info: &mut SignInfo, now: DateTime);

    /// Compute the `Authorization` header value.
    fn authorization(
        &self,
        req: &SigningRequest,
        info: &SignInfo,
        cred: &Credential,
        now: DateTime,
    ) -> Result<String>;
}

/// RequestSigner signs S3 requests with the given [`SignatureVersion`].
///
/// The outgoing headers are rebuilt from the canonicalized headers plus
/// `Authorization`, so every signed header is exactly what gets sent.
#[derive(Debug)]
pub struct RequestSigner<V: SignatureVersion> {
    version: V,

    time: Option<DateTime>,
}

impl<V: SignatureVersion> RequestSigner<V> {
    /// Create a new request signer.
    pub fn new(version: V) -> Self {
        Self {
            version,

            time: None,
        }
    }

    /// Specify the signing time.
    ///
    /// # Note
    ///
    /// We should always take current time to sign requests.
    /// Only use this function for testing.
    pub fn with_time(mut self, time: DateTime) -> Self {
        self.time = Some(time);
        self
    }

    /// Build the canonicalized headers of one attempt.
    pub fn sign_info(
        &self,
        req: &SigningRequest,
        body: &[u8],
        cred: &Credential,
        now: DateTime,
    ) -> Result<SignInfo> {
        let body_hash = self.version.body_hash(body);
        let mut info = SignInfo::classify(&req.headers, &req.host(), body_hash)?;
        if let Some(token) = &cred.session_token {
            info.set_amz(X_AMZ_SECURITY_TOKEN, token.as_str());
        }
        self.version.inject_headers(&mut info, now);
        info.normalize();
        Ok(info)
    }
}

#[async_trait]
impl<V: SignatureVersion> SignRequest for RequestSigner<V> {
    type Credential = Credential;

    async fn sign_request(
        &self,
        _: &Context,
        req: &mut Parts,
        body: &[u8],
        credential: Option<&Self::Credential>,
    ) -> Result<()> {
        self.version.check_method(&req.method)?;

        let Some(cred) = credential else {
            return Ok(());
        };

        // One timestamp per attempt, shared by header injection and signature.
        let now = self.time.unwrap_or_else(now);
        let mut signed_req = SigningRequest::build(req)?;

        let info = self.sign_info(&signed_req, body, cred, now)?;
        let authorization = self.version.authorization(&signed_req, &info, cred, now)?;
        debug!("calculated authorization for {} {}", signed_req.method, signed_req.path);

        let mut headers = info.to_header_map()?;
        let mut value = HeaderValue::from_str(&authorization)?;
        value.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, value);
        signed_req.headers = headers;

        signed_req.apply(req)
    }
}
