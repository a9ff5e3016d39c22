use crate::mock::{counting_provider, init_logger, MockS3};
use bytes::Bytes;
use http::Method;
use pretty_assertions::assert_eq;
use s3sign_core::{Context, ErrorKind, Result};
use s3sign_s3::{Client, Config, SigningVersion};
use std::sync::atomic::Ordering;
use std::time::Duration;

fn config(version: SigningVersion) -> Config {
    Config::default()
        .with_endpoint("http://127.0.0.1:9000")
        .with_signing_version(version)
        .with_credential("old_ak", "old_sk")
}

#[tokio::test]
async fn test_put_object_v4() -> Result<()> {
    init_logger();
    let mock = MockS3::new();
    mock.respond(200, &[("etag", "\"etag-1\"")], "");
    let client = Client::new(mock.context(), config(SigningVersion::V4))?;

    let etag = client
        .put_object("bucket", "dir/hello world.txt", Bytes::from("Hello"), "text/plain")
        .await?;
    assert_eq!(etag.as_deref(), Some("\"etag-1\""));

    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.method, Method::PUT);
    assert_eq!(req.uri.path(), "/bucket/dir/hello%20world.txt");
    assert_eq!(req.header("content-type"), Some("text/plain"));
    assert_eq!(req.header("content-length"), Some("5"));
    assert_eq!(req.header("host"), Some("127.0.0.1:9000"));
    assert_eq!(req.header("x-s3sign-content-type"), None);
    assert_eq!(
        req.header("x-amz-content-sha256"),
        Some("185f8db32271fe25f561a6fc938b2e264306ec304eda518007d1764826381969")
    );
    assert!(req.header("x-amz-date").is_some());
    assert!(req
        .authorization()
        .starts_with("AWS4-HMAC-SHA256 Credential=old_ak/"));
    assert!(req.authorization().contains(
        "SignedHeaders=content-length;content-type;host;x-amz-content-sha256;x-amz-date,"
    ));
    assert_eq!(req.body, Bytes::from("Hello"));
    Ok(())
}

#[tokio::test]
async fn test_put_object_v2() -> Result<()> {
    init_logger();
    let mock = MockS3::new();
    let client = Client::new(mock.context(), config(SigningVersion::V2))?;

    let etag = client
        .put_object("bucket", "key", Bytes::from("Welcome to Amazon S3."), "text/plain")
        .await?;
    assert_eq!(etag, None);

    let req = &mock.requests()[0];
    assert_eq!(req.header("content-md5"), Some("1EfQ6PKJ8WoS/2AnznfCWA=="));
    assert_eq!(req.header("content-type"), Some("text/plain"));
    assert!(req.header("date").is_some());
    assert!(req.authorization().starts_with("AWS old_ak:"));
    Ok(())
}

#[tokio::test]
async fn test_get_object_with_range() -> Result<()> {
    init_logger();
    let mock = MockS3::new();
    mock.respond(206, &[], "0123456789");
    let client = Client::new(mock.context(), config(SigningVersion::V4))?;

    let content = client.get_object("bucket", "key", Some("bytes=0-9")).await?;
    assert_eq!(content, Bytes::from("0123456789"));

    let req = &mock.requests()[0];
    assert_eq!(req.method, Method::GET);
    assert_eq!(req.header("range"), Some("bytes=0-9"));
    assert!(req
        .authorization()
        .contains("SignedHeaders=host;range;x-amz-content-sha256;x-amz-date,"));
    Ok(())
}

#[tokio::test]
async fn test_endpoint_prefix_is_kept_in_url() -> Result<()> {
    init_logger();
    let mock = MockS3::new();
    let cfg = config(SigningVersion::V4).with_endpoint("http://127.0.0.1:9000/minio/");
    let client = Client::new(mock.context(), cfg)?;

    client.get_object("bucket", "key", None).await?;

    let req = &mock.requests()[0];
    assert_eq!(req.uri.to_string(), "http://127.0.0.1:9000/minio/bucket/key");
    Ok(())
}

#[tokio::test]
async fn test_session_token_is_sent() -> Result<()> {
    init_logger();
    let mock = MockS3::new();
    let mut cfg = config(SigningVersion::V4);
    cfg.session_token = Some("security_token".to_string());
    let client = Client::new(mock.context(), cfg)?;

    client.get_object("bucket", "key", None).await?;

    let req = &mock.requests()[0];
    assert_eq!(req.header("x-amz-security-token"), Some("security_token"));
    assert!(req.authorization().contains("x-amz-security-token"));
    Ok(())
}

#[tokio::test]
async fn test_v2_post_never_reaches_network() -> Result<()> {
    init_logger();
    let mock = MockS3::new();
    let client = Client::new(mock.context(), config(SigningVersion::V2))?;

    let err = client
        .post_object("bucket", "key", Bytes::from("hello"), "text/plain")
        .await
        .expect_err("post must be rejected");
    assert_eq!(err.kind(), ErrorKind::UnsupportedMethod);
    assert!(mock.requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_v4_post_object() -> Result<()> {
    init_logger();
    let mock = MockS3::new();
    mock.respond(200, &[("etag", "posted")], "");
    let client = Client::new(mock.context(), config(SigningVersion::V4))?;

    let etag = client
        .post_object("bucket", "key", Bytes::from("hello"), "text/plain")
        .await?;
    assert_eq!(etag.as_deref(), Some("posted"));
    assert_eq!(mock.requests()[0].method, Method::POST);
    Ok(())
}

#[tokio::test]
async fn test_auth_failure_refreshes_once() -> Result<()> {
    init_logger();
    let mock = MockS3::rejecting("old_ak");
    mock.respond(200, &[("etag", "etag-1")], "");
    let (provider, calls) = counting_provider(Duration::ZERO);
    let client = Client::with_provider(mock.context(), config(SigningVersion::V4), provider)?;

    let etag = client
        .put_object("bucket", "key", Bytes::from("hello"), "text/plain")
        .await?;
    assert_eq!(etag.as_deref(), Some("etag-1"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let requests = mock.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].authorization().contains("Credential=old_ak/"));
    assert!(requests[1].authorization().contains("Credential=new_ak/"));
    assert_eq!(requests[1].body, Bytes::from("hello"));

    // The refreshed credential is kept for later requests.
    client.get_object("bucket", "key", None).await?;
    assert_eq!(mock.requests().len(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_second_auth_failure_is_terminal() -> Result<()> {
    init_logger();
    let mock = MockS3::new();
    mock.respond(403, &[], "<Error><Code>SignatureDoesNotMatch</Code></Error>");
    mock.respond(400, &[], "<Error><Code>InvalidRequest</Code></Error>");
    mock.respond(200, &[], "never sent");
    let (provider, calls) = counting_provider(Duration::ZERO);
    let client = Client::with_provider(mock.context(), config(SigningVersion::V4), provider)?;

    let err = client
        .get_object("bucket", "key", None)
        .await
        .expect_err("second rejection must be terminal");
    assert_eq!(err.kind(), ErrorKind::AuthRejected);
    assert!(err.is_auth_rejected());
    assert_eq!(mock.requests().len(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_other_status_is_not_retried() -> Result<()> {
    init_logger();
    let mock = MockS3::new();
    mock.respond(404, &[], "<Error><Code>NoSuchKey</Code></Error>");
    let (provider, calls) = counting_provider(Duration::ZERO);
    let client = Client::with_provider(mock.context(), config(SigningVersion::V4), provider)?;

    let err = client
        .get_object("bucket", "key", None)
        .await
        .expect_err("404 must fail");
    assert_eq!(err.kind(), ErrorKind::Unexpected);
    assert!(err.context().iter().any(|c| c.contains("NoSuchKey")));
    assert_eq!(mock.requests().len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_auth_failures_refresh_once() -> Result<()> {
    init_logger();
    let mock = MockS3::rejecting("old_ak");
    let (provider, calls) = counting_provider(Duration::from_millis(50));
    let client = Client::with_provider(mock.context(), config(SigningVersion::V4), provider)?;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            client
                .put_object("bucket", &format!("key-{i}"), Bytes::from("hello"), "")
                .await
        }));
    }
    for task in tasks {
        task.await.expect("task must not panic")?;
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let requests = mock.requests();
    assert_eq!(
        requests
            .iter()
            .filter(|r| r.authorization().contains("Credential=new_ak/"))
            .count(),
        8
    );
    Ok(())
}

#[tokio::test]
async fn test_transport_error_is_surfaced() -> Result<()> {
    init_logger();
    let client = Client::new(Context::new(), config(SigningVersion::V4))?;

    let err = client
        .get_object("bucket", "key", None)
        .await
        .expect_err("noop transport must fail");
    assert_eq!(err.kind(), ErrorKind::Transport);
    Ok(())
}
