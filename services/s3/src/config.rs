use crate::constants::*;
use crate::Credential;
use http::Uri;
use log::warn;
use s3sign_core::utils::Redact;
use s3sign_core::{Context, Error, HttpLogLevel, Result};
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// The S3 signature algorithm used for requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SigningVersion {
    /// HMAC-SHA1 signing with `AWS ak:signature`.
    ///
    /// Can't sign `POST` requests.
    V2,
    /// `AWS4-HMAC-SHA256` signing.
    #[default]
    V4,
}

impl FromStr for SigningVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v2" | "2" => Ok(SigningVersion::V2),
            "v4" | "4" => Ok(SigningVersion::V4),
            v => Err(Error::config_invalid(format!(
                "signing version must be v2 or v4, got {v}"
            ))),
        }
    }
}

impl Display for SigningVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SigningVersion::V2 => f.write_str("v2"),
            SigningVersion::V4 => f.write_str("v4"),
        }
    }
}

/// Config for S3 clients.
#[derive(Clone, Default)]
pub struct Config {
    /// Base url like `https://s3.amazonaws.com` or `http://127.0.0.1:9000/minio`.
    ///
    /// Any path in the base url is the endpoint prefix, it's stripped from request
    /// paths before signing.
    pub endpoint: Option<String>,
    /// Region, defaults to `us-east-1`.
    pub region: Option<String>,
    /// Service name in the V4 scope, defaults to `s3`.
    pub service: Option<String>,
    /// Signature algorithm, defaults to V4.
    pub signing_version: Option<SigningVersion>,
    /// Access key id used as the initial credential.
    pub access_key_id: Option<String>,
    /// Secret access key used as the initial credential.
    pub secret_access_key: Option<String>,
    /// Session token of temporary credentials.
    pub session_token: Option<String>,
    /// Verbosity of the request log.
    pub http_log_level: HttpLogLevel,
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("service", &self.service)
            .field("signing_version", &self.signing_version)
            .field("access_key_id", &Redact::from(&self.access_key_id))
            .field("secret_access_key", &Redact::from(&self.secret_access_key))
            .field("session_token", &Redact::from(&self.session_token))
            .field("http_log_level", &self.http_log_level)
            .finish()
    }
}

impl Config {
    /// Fill every unset field from environment variables.
    pub fn from_env(mut self, ctx: &Context) -> Self {
        if self.endpoint.is_none() {
            self.endpoint = ctx.env_var_any(&[AWS_ENDPOINT_URL_S3, AWS_ENDPOINT_URL]);
        }
        if self.region.is_none() {
            self.region = ctx.env_var_any(&[AWS_REGION, AWS_DEFAULT_REGION]);
        }
        if self.signing_version.is_none() {
            if let Some(v) = ctx.env_var_any(&[S3SIGN_SIGNING_VERSION]) {
                match v.parse() {
                    Ok(v) => self.signing_version = Some(v),
                    Err(err) => warn!("ignore {S3SIGN_SIGNING_VERSION}: {err}"),
                }
            }
        }
        if self.access_key_id.is_none() && self.secret_access_key.is_none() {
            self.access_key_id = ctx.env_var_any(&[AWS_ACCESS_KEY_ID]);
            self.secret_access_key = ctx.env_var_any(&[AWS_SECRET_ACCESS_KEY]);
            if self.session_token.is_none() {
                self.session_token = ctx.env_var_any(&[AWS_SESSION_TOKEN]);
            }
        }
        self
    }

    /// Set the endpoint.
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }

    /// Set the region.
    pub fn with_region(mut self, region: &str) -> Self {
        self.region = Some(region.to_string());
        self
    }

    /// Set the signing version.
    pub fn with_signing_version(mut self, version: SigningVersion) -> Self {
        self.signing_version = Some(version);
        self
    }

    /// Set the initial access key pair.
    pub fn with_credential(mut self, access_key_id: &str, secret_access_key: &str) -> Self {
        self.access_key_id = Some(access_key_id.to_string());
        self.secret_access_key = Some(secret_access_key.to_string());
        self
    }

    /// Region used for signing.
    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    /// Service name used for signing.
    pub fn service(&self) -> &str {
        self.service.as_deref().unwrap_or(DEFAULT_SERVICE)
    }

    /// Signing version in use.
    pub fn signing_version(&self) -> SigningVersion {
        self.signing_version.unwrap_or_default()
    }

    /// Base url without trailing slash.
    pub fn endpoint(&self) -> Result<&str> {
        let endpoint = self
            .endpoint
            .as_deref()
            .map(|v| v.trim_end_matches('/'))
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::config_invalid("endpoint is required"))?;

        let uri = Uri::from_str(endpoint).map_err(|e| {
            Error::config_invalid("endpoint is not a valid url")
                .with_source(e)
                .with_context(format!("endpoint: {endpoint}"))
        })?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(Error::config_invalid("endpoint must contain scheme and host")
                .with_context(format!("endpoint: {endpoint}")));
        }
        if uri.query().is_some() {
            return Err(Error::config_invalid("endpoint must not contain a query")
                .with_context(format!("endpoint: {endpoint}")));
        }

        Ok(endpoint)
    }

    /// Path of the base url that gets stripped before signing.
    ///
    /// Empty when the endpoint has no path.
    pub fn endpoint_prefix(&self) -> Result<String> {
        let endpoint = self.endpoint()?;
        let uri = Uri::from_str(endpoint)
            .map_err(|e| Error::config_invalid("endpoint is not a valid url").with_source(e))?;

        Ok(uri.path().trim_end_matches('/').to_string())
    }

    /// Initial credential from the configured keys.
    pub fn credential(&self) -> Option<Credential> {
        let (Some(ak), Some(sk)) = (&self.access_key_id, &self.secret_access_key) else {
            return None;
        };

        Some(Credential {
            access_key_id: ak.clone(),
            secret_access_key: sk.clone(),
            session_token: self.session_token.clone(),
        })
    }
}
