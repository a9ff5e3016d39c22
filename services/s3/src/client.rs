use crate::config::{Config, SigningVersion};
use crate::constants::*;
use crate::multipart::{
    root_element, CompleteMultipartUpload, CompleteMultipartUploadResult,
    InitiateMultipartUploadResult, MultipartUpload, Part, S3Error,
};
use crate::{
    Credential, EnvCredentialProvider, ProvideCredentialChain, RequestSigner, SignatureV2,
    SignatureV4, StaticCredentialProvider,
};
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, ETAG, RANGE};
use http::{Method, Request, Response};
use log::debug;
use percent_encoding::utf8_percent_encode;
use s3sign_core::{Context, Error, ProvideCredential, Result, Signer};

/// Client for S3 compatible object stores.
///
/// Every call goes through the refreshing [`Signer`]: a request rejected with 400 or
/// 403 is signed again with refreshed credentials and sent once more.
#[derive(Debug, Clone)]
pub struct Client {
    config: Config,
    endpoint: String,
    signer: Signer<Credential>,
}

impl Client {
    /// Create a client that refreshes credentials from the configured keys, then from
    /// the environment.
    pub fn new(ctx: Context, config: Config) -> Result<Self> {
        let mut provider = ProvideCredentialChain::new();
        if let Some(cred) = config.credential() {
            provider = provider.push(StaticCredentialProvider::from(cred));
        }
        let provider = provider.push(EnvCredentialProvider::new());

        Self::with_provider(ctx, config, provider)
    }

    /// Create a client with a custom credential refresh provider.
    ///
    /// Configured keys are still used for the first request.
    pub fn with_provider(
        ctx: Context,
        config: Config,
        provider: impl ProvideCredential<Credential = Credential>,
    ) -> Result<Self> {
        let endpoint = config.endpoint()?.to_string();
        let prefix = config.endpoint_prefix()?;

        let signer = match config.signing_version() {
            SigningVersion::V2 => Signer::new(
                ctx,
                provider,
                RequestSigner::new(SignatureV2::new().with_endpoint_prefix(&prefix)),
            ),
            SigningVersion::V4 => Signer::new(
                ctx,
                provider,
                RequestSigner::new(
                    SignatureV4::new(config.region(), config.service())
                        .with_endpoint_prefix(&prefix),
                ),
            ),
        };
        let signer = match config.credential() {
            Some(cred) => signer.with_credential(cred),
            None => signer,
        };
        let signer = signer.with_http_log_level(config.http_log_level);

        debug!("s3 client created with config: {config:?}");
        Ok(Self {
            config,
            endpoint,
            signer,
        })
    }

    /// The config of this client.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The signer driving every request.
    pub fn signer(&self) -> &Signer<Credential> {
        &self.signer
    }

    /// Upload an object and return its ETag if the server sent one.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<Option<String>> {
        let req = Request::builder()
            .method(Method::PUT)
            .uri(self.object_url(bucket, key))
            .header(CONTENT_LENGTH, body.len())
            .header(X_S3SIGN_CONTENT_TYPE, content_type)
            .body(body)?;

        let resp = self.send(req).await?;
        etag(&resp)
    }

    /// Read an object, optionally limited to `range` like `bytes=0-9`.
    pub async fn get_object(&self, bucket: &str, key: &str, range: Option<&str>) -> Result<Bytes> {
        let mut req = Request::builder()
            .method(Method::GET)
            .uri(self.object_url(bucket, key));
        if let Some(range) = range {
            req = req.header(RANGE, range);
        }
        let req = req.body(Bytes::new())?;

        let resp = self.send(req).await?;
        Ok(resp.into_body())
    }

    /// Send the body to the object url with `POST` and return the ETag if any.
    ///
    /// Fails with [`s3sign_core::ErrorKind::UnsupportedMethod`] under signature V2
    /// without touching the network.
    pub async fn post_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<Option<String>> {
        self.check_post()?;

        let req = Request::builder()
            .method(Method::POST)
            .uri(self.object_url(bucket, key))
            .header(CONTENT_LENGTH, body.len())
            .header(X_S3SIGN_CONTENT_TYPE, content_type)
            .body(body)?;

        let resp = self.send(req).await?;
        etag(&resp)
    }

    /// Start a multipart upload and return the upload id.
    pub async fn initiate_multipart_upload(&self, bucket: &str, key: &str) -> Result<String> {
        self.check_post()?;

        let req = Request::builder()
            .method(Method::POST)
            .uri(format!("{}?uploads", self.object_url(bucket, key)))
            .body(Bytes::new())?;

        let resp = self.send(req).await?;
        let result: InitiateMultipartUploadResult =
            quick_xml::de::from_reader(resp.body().as_ref()).map_err(|e| {
                Error::protocol("failed to parse initiate multipart upload response")
                    .with_source(e)
                    .with_context(format!("response: {}", String::from_utf8_lossy(resp.body())))
            })?;
        if result.upload_id.is_empty() {
            return Err(
                Error::protocol("initiate multipart upload response has no upload id")
                    .with_context(format!("response: {}", String::from_utf8_lossy(resp.body()))),
            );
        }

        debug!(
            "initiated multipart upload {} for {}/{}",
            result.upload_id, result.bucket, result.key
        );
        Ok(result.upload_id)
    }

    /// Upload one part and return its ETag.
    pub async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: usize,
        body: Bytes,
    ) -> Result<String> {
        let req = Request::builder()
            .method(Method::PUT)
            .uri(format!(
                "{}?partNumber={part_number}&uploadId={}",
                self.object_url(bucket, key),
                utf8_percent_encode(upload_id, AWS_QUERY_ENCODE_SET)
            ))
            .header(CONTENT_LENGTH, body.len())
            .header(X_S3SIGN_CONTENT_TYPE, "application/octet-stream")
            .body(body)?;

        let resp = self.send(req).await?;
        etag(&resp)?.ok_or_else(|| {
            Error::missing_etag("upload part response has no ETag header")
                .with_context(format!("upload_id: {upload_id}"))
                .with_context(format!("part_number: {part_number}"))
        })
    }

    /// Complete a multipart upload with the given parts.
    ///
    /// Parts are sent in ascending part number order whatever order they are given in.
    pub async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[Part],
    ) -> Result<()> {
        self.check_post()?;

        let manifest = CompleteMultipartUpload::new(parts);
        let body = quick_xml::se::to_string(&manifest).map_err(|e| {
            Error::unexpected("failed to serialize complete multipart upload manifest")
                .with_source(e)
        })?;

        let req = Request::builder()
            .method(Method::POST)
            .uri(format!(
                "{}?uploadId={}",
                self.object_url(bucket, key),
                utf8_percent_encode(upload_id, AWS_QUERY_ENCODE_SET)
            ))
            .header(CONTENT_LENGTH, body.len())
            .header(X_S3SIGN_CONTENT_TYPE, "text/xml")
            .body(Bytes::from(body))?;

        let resp = self.send(req).await?;
        let response = || format!("response: {}", String::from_utf8_lossy(resp.body()));

        // S3 may report a failed completion with 200 OK and an error document.
        match root_element(resp.body()).as_deref() {
            Some("CompleteMultipartUploadResult") => {}
            Some("Error") => {
                let err: S3Error =
                    quick_xml::de::from_reader(resp.body().as_ref()).unwrap_or_default();
                return Err(Error::protocol(format!(
                    "complete multipart upload failed: {} {}",
                    err.code, err.message
                ))
                .with_context(format!("upload_id: {upload_id}"))
                .with_context(format!("request_id: {}", err.request_id)));
            }
            root => {
                return Err(Error::protocol(format!(
                    "unexpected complete multipart upload response root: {root:?}"
                ))
                .with_context(format!("upload_id: {upload_id}"))
                .with_context(response()));
            }
        }

        let result: CompleteMultipartUploadResult =
            quick_xml::de::from_reader(resp.body().as_ref()).map_err(|e| {
                Error::protocol("failed to parse complete multipart upload response")
                    .with_source(e)
                    .with_context(format!("upload_id: {upload_id}"))
                    .with_context(response())
            })?;
        if result.etag.is_empty() {
            return Err(
                Error::protocol("complete multipart upload response has no ETag")
                    .with_context(format!("upload_id: {upload_id}"))
                    .with_context(response()),
            );
        }

        debug!(
            "completed multipart upload {upload_id} of {}/{} with etag {}",
            result.bucket, result.key, result.etag
        );
        Ok(())
    }

    /// Start a [`MultipartUpload`] session.
    pub async fn begin_multipart_upload(&self, bucket: &str, key: &str) -> Result<MultipartUpload> {
        let upload_id = self.initiate_multipart_upload(bucket, key).await?;
        Ok(MultipartUpload::new(self.clone(), bucket, key, upload_id))
    }

    /// Upload `data` as a multipart upload with parts of `part_size` bytes.
    ///
    /// Parts are uploaded one after another, the last one may be smaller. Any failure
    /// is returned as is and the upload is left on the server.
    pub async fn upload_multipart(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        part_size: usize,
    ) -> Result<()> {
        if part_size < MIN_PART_SIZE {
            return Err(Error::config_invalid(format!(
                "part size must be at least {MIN_PART_SIZE} bytes, got {part_size}"
            )));
        }

        let mut upload = self.begin_multipart_upload(bucket, key).await?;
        if data.is_empty() {
            upload.upload_part(data, 1).await?;
        } else {
            let mut start = 0;
            while start < data.len() {
                let end = usize::min(start + part_size, data.len());
                let part_number = upload.next_part_number();
                upload.upload_part(data.slice(start..end), part_number).await?;
                start = end;
            }
        }

        upload.complete().await
    }

    fn check_post(&self) -> Result<()> {
        if self.config.signing_version() == SigningVersion::V2 {
            return Err(Error::unsupported_method(
                "POST requests can't be signed with signature v2",
            ));
        }
        Ok(())
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint,
            utf8_percent_encode(bucket, &AWS_URI_ENCODE_SET),
            utf8_percent_encode(key.trim_start_matches('/'), &AWS_URI_ENCODE_SET)
        )
    }

    async fn send(&self, req: Request<Bytes>) -> Result<Response<Bytes>> {
        let method = req.method().clone();
        let uri = req.uri().clone();

        let resp = self.signer.send(req).await?;
        if !resp.status().is_success() {
            return Err(Error::unexpected(format!(
                "unexpected status {} from s3",
                resp.status()
            ))
            .with_context(format!("method: {method}"))
            .with_context(format!("uri: {uri}"))
            .with_context(format!("response: {}", String::from_utf8_lossy(resp.body()))));
        }

        Ok(resp)
    }
}

fn etag(resp: &Response<Bytes>) -> Result<Option<String>> {
    let Some(value) = resp.headers().get(ETAG) else {
        return Ok(None);
    };

    Ok(Some(value.to_str()?.to_string()))
}
