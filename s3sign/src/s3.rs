//! S3 signing, object calls and multipart uploads.

pub use s3sign_s3::*;

#[cfg(feature = "default-context")]
use crate::{default_context, Result};

/// Create a client configured entirely from the environment.
///
/// The endpoint comes from `AWS_ENDPOINT_URL_S3` or `AWS_ENDPOINT_URL`, credentials
/// from `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY`, and the signing version
/// from `S3SIGN_SIGNING_VERSION`.
#[cfg(feature = "default-context")]
pub fn default_client() -> Result<Client> {
    default_client_with_config(Config::default())
}

/// Create a client from `config`, filling unset fields from the environment.
#[cfg(feature = "default-context")]
pub fn default_client_with_config(config: Config) -> Result<Client> {
    let ctx = default_context();
    let config = config.from_env(&ctx);
    Client::new(ctx, config)
}
