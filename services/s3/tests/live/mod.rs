use bytes::Bytes;
use log::warn;
use s3sign_core::{Context, ErrorKind, OsEnv, Result};
use s3sign_http_send_reqwest::ReqwestHttpSend;
use s3sign_s3::{Client, Config, SigningVersion, MIN_PART_SIZE};
use std::env;

fn init_client(version: SigningVersion) -> Option<(Client, String)> {
    let _ = env_logger::builder().is_test(true).try_init();
    let _ = dotenv::dotenv();

    if env::var("S3SIGN_S3_TEST").ok().as_deref() != Some("on") {
        return None;
    }

    let ctx = Context::new()
        .with_http_send(ReqwestHttpSend::default())
        .with_env(OsEnv);
    let config = Config::default()
        .with_endpoint(&env::var("S3SIGN_S3_ENDPOINT").expect("env S3SIGN_S3_ENDPOINT must set"))
        .with_credential(
            &env::var("S3SIGN_S3_ACCESS_KEY").expect("env S3SIGN_S3_ACCESS_KEY must set"),
            &env::var("S3SIGN_S3_SECRET_KEY").expect("env S3SIGN_S3_SECRET_KEY must set"),
        )
        .with_signing_version(version)
        .from_env(&ctx);
    let bucket = env::var("S3SIGN_S3_BUCKET").expect("env S3SIGN_S3_BUCKET must set");

    let client = Client::new(ctx, config).expect("client must be created");
    Some((client, bucket))
}

#[tokio::test]
async fn test_live_put_and_get_object() -> Result<()> {
    for version in [SigningVersion::V2, SigningVersion::V4] {
        let Some((client, bucket)) = init_client(version) else {
            warn!("S3SIGN_S3_TEST is not set, skipped");
            return Ok(());
        };

        let key = format!("s3sign/{version}/hello world.txt");
        client
            .put_object(&bucket, &key, Bytes::from("Hello, World!"), "text/plain")
            .await?;

        let content = client.get_object(&bucket, &key, None).await?;
        assert_eq!(content, Bytes::from("Hello, World!"));

        let content = client.get_object(&bucket, &key, Some("bytes=0-4")).await?;
        assert_eq!(content, Bytes::from("Hello"));
    }
    Ok(())
}

#[tokio::test]
async fn test_live_get_not_exist_object() -> Result<()> {
    let Some((client, bucket)) = init_client(SigningVersion::V4) else {
        warn!("S3SIGN_S3_TEST is not set, skipped");
        return Ok(());
    };

    let err = client
        .get_object(&bucket, "s3sign/not_exist_file", None)
        .await
        .expect_err("object must not exist");
    assert_eq!(err.kind(), ErrorKind::Unexpected);
    Ok(())
}

#[tokio::test]
async fn test_live_upload_multipart() -> Result<()> {
    let Some((client, bucket)) = init_client(SigningVersion::V4) else {
        warn!("S3SIGN_S3_TEST is not set, skipped");
        return Ok(());
    };

    let data = Bytes::from(vec![b'x'; MIN_PART_SIZE + 1024]);
    client
        .upload_multipart(&bucket, "s3sign/multipart", data.clone(), MIN_PART_SIZE)
        .await?;

    let content = client
        .get_object(&bucket, "s3sign/multipart", None)
        .await?;
    assert_eq!(content.len(), data.len());
    Ok(())
}
