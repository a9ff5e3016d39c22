use crate::{
    Context, CredentialStore, Error, ProvideCredential, Result, SignRequest, SigningCredential,
};
use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, StatusCode};
use log::{debug, warn};
use std::borrow::Cow;
use std::fmt::Debug;
use std::sync::Arc;

/// How much of each exchange the pipeline writes to the `debug` log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum HttpLogLevel {
    /// Log nothing.
    #[default]
    None,
    /// Method, uri, status and attempt.
    Basic,
    /// Basic plus request and response headers.
    Headers,
    /// Headers plus body sizes and previews.
    Body,
}

/// Signer signs requests and drives them through the transport.
///
/// A request answered with 400 or 403 triggers one credential refresh, one resign with a
/// fresh timestamp and one resend. Whatever the second attempt returns is final.
#[derive(Clone, Debug)]
pub struct Signer<K: SigningCredential> {
    ctx: Context,
    store: Arc<CredentialStore<K>>,
    builder: Arc<dyn SignRequest<Credential = K>>,
    http_log_level: HttpLogLevel,
}

impl<K: SigningCredential> Signer<K> {
    /// Create a new signer.
    pub fn new(
        ctx: Context,
        loader: impl ProvideCredential<Credential = K>,
        builder: impl SignRequest<Credential = K>,
    ) -> Self {
        Self {
            ctx,
            store: Arc::new(CredentialStore::new(loader)),
            builder: Arc::new(builder),
            http_log_level: HttpLogLevel::None,
        }
    }

    /// Seed the signer with initial credentials so the first request skips the provider.
    pub fn with_credential(self, cred: K) -> Self {
        self.store.set(cred);
        self
    }

    /// Set the request logging verbosity.
    pub fn with_http_log_level(mut self, level: HttpLogLevel) -> Self {
        self.http_log_level = level;
        self
    }

    /// The context used for sending.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// The credential store shared by every clone of this signer.
    pub fn credential_store(&self) -> &CredentialStore<K> {
        &self.store
    }

    async fn credential(&self) -> Result<(K, u64)> {
        match self.store.current_with_epoch() {
            (Some(cred), epoch) if cred.is_valid() => Ok((cred, epoch)),
            (_, epoch) => {
                debug!("no valid credential in store, loading from provider");
                let cred = self.store.refresh_since(&self.ctx, epoch).await?;
                Ok((cred, self.store.epoch()))
            }
        }
    }

    /// Sign the request in place with the current credential.
    pub async fn sign(&self, req: &mut Parts, body: &[u8]) -> Result<()> {
        let (cred, _) = self.credential().await?;
        self.builder
            .sign_request(&self.ctx, req, body, Some(&cred))
            .await
    }

    /// Sign and send the request, refreshing credentials once on an auth failure.
    ///
    /// Returns [`crate::ErrorKind::AuthRejected`] if the resent request is still
    /// answered with 400 or 403. Any other status is returned to the caller as is.
    pub async fn send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        let (parts, body) = req.into_parts();

        let (cred, epoch) = self.credential().await?;
        let resp = self.attempt(&parts, &body, &cred, 1).await?;
        if !is_auth_failure(resp.status()) {
            return Ok(resp);
        }

        warn!(
            "{} {} got {}, refreshing credential and retrying once",
            parts.method,
            parts.uri,
            resp.status()
        );
        let cred = self.store.refresh_since(&self.ctx, epoch).await?;
        let resp = self.attempt(&parts, &body, &cred, 2).await?;
        if is_auth_failure(resp.status()) {
            let status = resp.status();
            let message = String::from_utf8_lossy(resp.body()).to_string();
            return Err(Error::auth_rejected(format!(
                "request rejected with {status} after credential refresh"
            ))
            .with_context(format!("method: {}", parts.method))
            .with_context(format!("uri: {}", parts.uri))
            .with_context(format!("response: {message}")));
        }

        Ok(resp)
    }

    async fn attempt(
        &self,
        parts: &Parts,
        body: &Bytes,
        cred: &K,
        attempt: usize,
    ) -> Result<http::Response<Bytes>> {
        // Parts is not Clone, every attempt starts again from the caller's request.
        let mut req = http::Request::builder()
            .method(parts.method.clone())
            .uri(parts.uri.clone())
            .version(parts.version)
            .body(body.clone())?;
        *req.headers_mut() = parts.headers.clone();

        let (mut signed, body) = req.into_parts();
        self.builder
            .sign_request(&self.ctx, &mut signed, &body, Some(cred))
            .await?;
        let req = http::Request::from_parts(signed, body);

        self.log_request(&req, attempt);
        let resp = self.ctx.http_send(req).await?;
        self.log_response(&resp, attempt);

        Ok(resp)
    }

    fn log_request(&self, req: &http::Request<Bytes>, attempt: usize) {
        if self.http_log_level == HttpLogLevel::None {
            return;
        }

        debug!("attempt {attempt}: sending {} {}", req.method(), req.uri());
        if self.http_log_level >= HttpLogLevel::Headers {
            debug!("attempt {attempt}: request headers {}", format_headers(req.headers()));
        }
        if self.http_log_level >= HttpLogLevel::Body {
            debug!(
                "attempt {attempt}: request body {} bytes: {}",
                req.body().len(),
                body_preview(req.body())
            );
        }
    }

    fn log_response(&self, resp: &http::Response<Bytes>, attempt: usize) {
        if self.http_log_level == HttpLogLevel::None {
            return;
        }

        debug!("attempt {attempt}: received {}", resp.status());
        if self.http_log_level >= HttpLogLevel::Headers {
            debug!("attempt {attempt}: response headers {}", format_headers(resp.headers()));
        }
        if self.http_log_level >= HttpLogLevel::Body {
            debug!(
                "attempt {attempt}: response body {} bytes: {}",
                resp.body().len(),
                body_preview(resp.body())
            );
        }
    }
}

fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::BAD_REQUEST || status == StatusCode::FORBIDDEN
}

fn format_headers(headers: &HeaderMap) -> String {
    let mut s = String::new();
    for (idx, (k, v)) in headers.iter().enumerate() {
        if idx != 0 {
            s.push_str(", ");
        }
        s.push_str(k.as_str());
        s.push_str(": ");
        if v.is_sensitive() {
            s.push_str("Sensitive");
        } else {
            s.push_str(&String::from_utf8_lossy(v.as_bytes()));
        }
    }
    s
}

const BODY_PREVIEW_LIMIT: usize = 1024;

fn body_preview(body: &[u8]) -> Cow<'_, str> {
    let end = body.len().min(BODY_PREVIEW_LIMIT);
    String::from_utf8_lossy(&body[..end])
}
