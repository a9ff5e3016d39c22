use crate::mock::{counting_provider, init_logger, MockS3};
use bytes::Bytes;
use http::Method;
use pretty_assertions::assert_eq;
use s3sign_core::{ErrorKind, Result};
use s3sign_s3::{Client, Config, Part, UploadState, MIN_PART_SIZE};
use std::sync::atomic::Ordering;
use std::time::Duration;

const INITIATE_RESULT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<InitiateMultipartUploadResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Bucket>bucket</Bucket>
  <Key>key</Key>
  <UploadId>upload-1</UploadId>
</InitiateMultipartUploadResult>"#;

const COMPLETE_RESULT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<CompleteMultipartUploadResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Location>http://127.0.0.1:9000/bucket/key</Location>
  <Bucket>bucket</Bucket>
  <Key>key</Key>
  <ETag>"3858f62230ac3c915f300c664312c11f-3"</ETag>
</CompleteMultipartUploadResult>"#;

fn client(mock: &MockS3) -> Client {
    let config = Config::default()
        .with_endpoint("http://127.0.0.1:9000")
        .with_credential("old_ak", "old_sk");
    Client::new(mock.context(), config).expect("client must be created")
}

#[tokio::test]
async fn test_multipart_upload_session() -> Result<()> {
    init_logger();
    let mock = MockS3::new();
    mock.respond(200, &[], INITIATE_RESULT)
        .respond(200, &[("etag", "etag-1")], "")
        .respond(200, &[("etag", "etag-2")], "")
        .respond(200, &[("etag", "etag-3")], "")
        .respond(200, &[], COMPLETE_RESULT);
    let client = client(&mock);

    let mut upload = client.begin_multipart_upload("bucket", "key").await?;
    assert_eq!(upload.upload_id(), "upload-1");
    assert_eq!(upload.state(), UploadState::Initiated);

    for (idx, data) in ["aaa", "bb", "c"].into_iter().enumerate() {
        let etag = upload.upload_part(Bytes::from(data), idx + 1).await?;
        assert_eq!(etag, format!("etag-{}", idx + 1));
        assert_eq!(upload.state(), UploadState::Uploading);
    }
    assert_eq!(
        upload.parts(),
        &[
            Part {
                part_number: 1,
                etag: "etag-1".to_string()
            },
            Part {
                part_number: 2,
                etag: "etag-2".to_string()
            },
            Part {
                part_number: 3,
                etag: "etag-3".to_string()
            },
        ]
    );

    upload.complete().await?;
    assert_eq!(upload.state(), UploadState::Completed);
    assert!(upload.parts().is_empty());

    let requests = mock.requests();
    assert_eq!(requests.len(), 5);

    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].uri.path(), "/bucket/key");
    assert_eq!(requests[0].uri.query(), Some("uploads"));

    for (idx, size) in [3, 2, 1].into_iter().enumerate() {
        let req = &requests[idx + 1];
        assert_eq!(req.method, Method::PUT);
        assert_eq!(
            req.uri.query(),
            Some(format!("partNumber={}&uploadId=upload-1", idx + 1).as_str())
        );
        assert_eq!(req.header("content-length"), Some(size.to_string().as_str()));
        assert_eq!(req.header("content-type"), Some("application/octet-stream"));
    }

    let req = &requests[4];
    assert_eq!(req.method, Method::POST);
    assert_eq!(req.uri.query(), Some("uploadId=upload-1"));
    assert_eq!(req.header("content-type"), Some("text/xml"));
    assert_eq!(
        String::from_utf8_lossy(&req.body),
        "<CompleteMultipartUpload>\
         <Part><PartNumber>1</PartNumber><ETag>etag-1</ETag></Part>\
         <Part><PartNumber>2</PartNumber><ETag>etag-2</ETag></Part>\
         <Part><PartNumber>3</PartNumber><ETag>etag-3</ETag></Part>\
         </CompleteMultipartUpload>"
    );

    let err = upload
        .upload_part(Bytes::from("d"), 4)
        .await
        .expect_err("completed session must reject parts");
    assert_eq!(err.kind(), ErrorKind::RequestInvalid);
    Ok(())
}

#[tokio::test]
async fn test_complete_sorts_manifest() -> Result<()> {
    init_logger();
    let mock = MockS3::new();
    mock.respond(200, &[], COMPLETE_RESULT);
    let client = client(&mock);

    let parts = [("etag-3", 3), ("etag-1", 1), ("etag-2", 2)].map(|(etag, part_number)| Part {
        part_number,
        etag: etag.to_string(),
    });
    client
        .complete_multipart_upload("bucket", "key", "upload 1", &parts)
        .await?;

    let req = &mock.requests()[0];
    assert_eq!(req.uri.query(), Some("uploadId=upload%201"));
    let body = String::from_utf8_lossy(&req.body).to_string();
    let positions: Vec<usize> = ["etag-1", "etag-2", "etag-3"]
        .iter()
        .map(|etag| body.find(etag).expect("etag must be in manifest"))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
    Ok(())
}

#[tokio::test]
async fn test_part_number_must_be_sequential() -> Result<()> {
    init_logger();
    let mock = MockS3::new();
    mock.respond(200, &[], INITIATE_RESULT);
    let client = client(&mock);

    let mut upload = client.begin_multipart_upload("bucket", "key").await?;
    let err = upload
        .upload_part(Bytes::from("a"), 2)
        .await
        .expect_err("part 2 before part 1 must be rejected");
    assert_eq!(err.kind(), ErrorKind::RequestInvalid);
    assert_eq!(upload.state(), UploadState::Initiated);
    assert_eq!(upload.next_part_number(), 1);
    assert_eq!(mock.requests().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_missing_etag_fails_session() -> Result<()> {
    init_logger();
    let mock = MockS3::new();
    mock.respond(200, &[], INITIATE_RESULT).respond(200, &[], "");
    let client = client(&mock);

    let mut upload = client.begin_multipart_upload("bucket", "key").await?;
    let err = upload
        .upload_part(Bytes::from("a"), 1)
        .await
        .expect_err("part without etag must fail");
    assert_eq!(err.kind(), ErrorKind::MissingETag);
    assert!(err.context().iter().any(|c| c == "upload_id: upload-1"));
    assert_eq!(upload.state(), UploadState::Failed);

    let err = upload
        .upload_part(Bytes::from("a"), 1)
        .await
        .expect_err("failed session must reject parts");
    assert_eq!(err.kind(), ErrorKind::RequestInvalid);
    let err = upload
        .complete()
        .await
        .expect_err("failed session must reject completion");
    assert_eq!(err.kind(), ErrorKind::RequestInvalid);

    // No abort call is issued.
    assert_eq!(mock.requests().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_initiate_without_upload_id() -> Result<()> {
    init_logger();
    let mock = MockS3::new();
    mock.respond(
        200,
        &[],
        "<InitiateMultipartUploadResult><Bucket>bucket</Bucket><Key>key</Key></InitiateMultipartUploadResult>",
    );
    let client = client(&mock);

    let err = client
        .begin_multipart_upload("bucket", "key")
        .await
        .expect_err("initiate without upload id must fail");
    assert_eq!(err.kind(), ErrorKind::Protocol);
    Ok(())
}

#[tokio::test]
async fn test_initiate_with_malformed_body() -> Result<()> {
    init_logger();
    let mock = MockS3::new();
    mock.respond(200, &[], "<InitiateMultipartUploadResult><UploadId>");
    let client = client(&mock);

    let err = client
        .initiate_multipart_upload("bucket", "key")
        .await
        .expect_err("malformed body must fail");
    assert_eq!(err.kind(), ErrorKind::Protocol);
    Ok(())
}

#[tokio::test]
async fn test_complete_with_error_document() -> Result<()> {
    init_logger();
    let mock = MockS3::new();
    mock.respond(200, &[], INITIATE_RESULT)
        .respond(200, &[("etag", "etag-1")], "")
        .respond(
            200,
            &[],
            "<Error><Code>InternalError</Code><Message>We encountered an internal error.</Message><RequestId>4442587FB7D0A2F9</RequestId></Error>",
        );
    let client = client(&mock);

    let mut upload = client.begin_multipart_upload("bucket", "key").await?;
    upload.upload_part(Bytes::from("a"), 1).await?;
    let err = upload
        .complete()
        .await
        .expect_err("error document must fail completion");
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(err.to_string().contains("InternalError"));
    assert_eq!(upload.state(), UploadState::Failed);
    Ok(())
}

async fn complete_with_response(body: &str) -> Result<()> {
    let mock = MockS3::new();
    mock.respond(200, &[], INITIATE_RESULT)
        .respond(200, &[("etag", "etag-1")], "")
        .respond(200, &[], body);
    let client = client(&mock);

    let mut upload = client.begin_multipart_upload("bucket", "key").await?;
    upload.upload_part(Bytes::from("a"), 1).await?;
    let err = upload
        .complete()
        .await
        .expect_err("completion must fail");
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(upload.state(), UploadState::Failed);
    assert_eq!(upload.parts().len(), 1);
    assert!(err.context().iter().any(|c| c == "upload_id: upload-1"));
    Ok(())
}

#[tokio::test]
async fn test_complete_with_namespaced_error_document() -> Result<()> {
    init_logger();
    complete_with_response(
        r#"<?xml version="1.0" encoding="UTF-8"?><Error xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Code>InternalError</Code></Error>"#,
    )
    .await
}

#[tokio::test]
async fn test_complete_with_non_xml_response() -> Result<()> {
    init_logger();
    complete_with_response("<html>proxy error page</html>").await
}

#[tokio::test]
async fn test_complete_with_empty_response() -> Result<()> {
    init_logger();
    complete_with_response("").await
}

#[tokio::test]
async fn test_complete_result_without_etag() -> Result<()> {
    init_logger();
    complete_with_response(
        "<CompleteMultipartUploadResult><Bucket>bucket</Bucket><Key>key</Key></CompleteMultipartUploadResult>",
    )
    .await
}

#[tokio::test]
async fn test_part_failure_fails_session() -> Result<()> {
    init_logger();
    let mock = MockS3::new();
    mock.respond(200, &[], INITIATE_RESULT)
        .respond(500, &[], "<Error><Code>InternalError</Code></Error>");
    let client = client(&mock);

    let mut upload = client.begin_multipart_upload("bucket", "key").await?;
    let err = upload
        .upload_part(Bytes::from("a"), 1)
        .await
        .expect_err("500 must fail the part");
    assert_eq!(err.kind(), ErrorKind::Unexpected);
    assert_eq!(upload.state(), UploadState::Failed);
    assert_eq!(mock.requests().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_part_auth_failure_is_resigned() -> Result<()> {
    init_logger();
    let mock = MockS3::rejecting("old_ak");
    mock.respond(200, &[], INITIATE_RESULT)
        .respond(200, &[("etag", "etag-1")], "");
    let (provider, calls) = counting_provider(Duration::ZERO);
    let config = Config::default()
        .with_endpoint("http://127.0.0.1:9000")
        .with_credential("old_ak", "old_sk");
    let client = Client::with_provider(mock.context(), config, provider)?;

    let mut upload = client.begin_multipart_upload("bucket", "key").await?;
    assert_eq!(upload.upload_part(Bytes::from("a"), 1).await?, "etag-1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // initiate rejected, initiate resent, part sent with the refreshed key.
    assert_eq!(mock.requests().len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_upload_multipart_splits_data() -> Result<()> {
    init_logger();
    let mock = MockS3::new();
    mock.respond(200, &[], INITIATE_RESULT)
        .respond(200, &[("etag", "etag-1")], "")
        .respond(200, &[("etag", "etag-2")], "")
        .respond(200, &[("etag", "etag-3")], "")
        .respond(200, &[], COMPLETE_RESULT);
    let client = client(&mock);

    let data = Bytes::from(vec![b'x'; 2 * MIN_PART_SIZE + 10]);
    client
        .upload_multipart("bucket", "key", data, MIN_PART_SIZE)
        .await?;

    let requests = mock.requests();
    assert_eq!(requests.len(), 5);
    let sizes: Vec<usize> = requests[1..4].iter().map(|r| r.body.len()).collect();
    assert_eq!(sizes, vec![MIN_PART_SIZE, MIN_PART_SIZE, 10]);
    assert!(String::from_utf8_lossy(&requests[4].body)
        .contains("<Part><PartNumber>3</PartNumber><ETag>etag-3</ETag></Part>"));
    Ok(())
}

#[tokio::test]
async fn test_upload_multipart_empty_data() -> Result<()> {
    init_logger();
    let mock = MockS3::new();
    mock.respond(200, &[], INITIATE_RESULT)
        .respond(200, &[("etag", "etag-1")], "")
        .respond(200, &[], COMPLETE_RESULT);
    let client = client(&mock);

    client
        .upload_multipart("bucket", "key", Bytes::new(), MIN_PART_SIZE)
        .await?;

    let requests = mock.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1].header("content-length"), Some("0"));
    Ok(())
}
