//! S3 request signing and multipart uploads.
//!
//! This crate signs requests for S3 compatible object stores with either AWS
//! Signature Version 2 or Version 4, and drives the three step multipart upload
//! handshake on top of the refreshing [`s3sign_core::Signer`].
//!
//! ## Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use s3sign_core::{Context, Result};
//! use s3sign_s3::{Client, Config, SigningVersion};
//!
//! # async fn example(ctx: Context) -> Result<()> {
//! let config = Config::default()
//!     .with_endpoint("http://127.0.0.1:9000/minio")
//!     .with_signing_version(SigningVersion::V4)
//!     .with_credential("access_key_id", "secret_access_key")
//!     .from_env(&ctx);
//! let client = Client::new(ctx, config)?;
//!
//! client
//!     .put_object("bucket", "hello.txt", Bytes::from("Hello, World!"), "text/plain")
//!     .await?;
//! let content = client.get_object("bucket", "hello.txt", None).await?;
//! assert_eq!(content, Bytes::from("Hello, World!"));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod constants;
pub use constants::MIN_PART_SIZE;
pub use constants::X_S3SIGN_CONTENT_TYPE;

mod config;
pub use config::{Config, SigningVersion};

mod credential;
pub use credential::Credential;

mod provide_credential;
pub use provide_credential::*;

mod canonical;
pub use canonical::{merge_amz_headers, strip_endpoint_prefix, SignInfo};

mod sign_request;
pub use sign_request::{RequestSigner, SignatureVersion};

mod v2;
pub use v2::SignatureV2;

mod v4;
pub use v4::SignatureV4;

mod client;
pub use client::Client;

mod multipart;
pub use multipart::{MultipartUpload, Part, UploadState};
