//! Signing S3 requests and driving multipart uploads without effort.
//!
//! This crate re-exports [`s3sign_core`] at the top level and the S3 service under
//! [`s3`]. With the `default-context` feature, [`default_context`] builds a
//! [`Context`] backed by reqwest and the process environment.
//!
//! ```no_run
//! # #[cfg(all(feature = "s3", feature = "default-context"))]
//! # async fn example() -> s3sign::Result<()> {
//! use bytes::Bytes;
//!
//! let client = s3sign::s3::default_client()?;
//! client
//!     .put_object("bucket", "hello.txt", Bytes::from("Hello, World!"), "text/plain")
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub use s3sign_core::*;

#[cfg(feature = "default-context")]
mod context;
#[cfg(feature = "default-context")]
pub use context::default_context;

#[cfg(feature = "s3")]
pub mod s3;
