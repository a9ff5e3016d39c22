use crate::Client;
use bytes::Bytes;
use log::{debug, warn};
use quick_xml::events::Event;
use quick_xml::Reader;
use s3sign_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// One uploaded part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Part number, starting at 1.
    pub part_number: usize,
    /// ETag returned by the server for this part.
    pub etag: String,
}

/// State of a [`MultipartUpload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    /// The server returned an upload id, no part has been uploaded yet.
    Initiated,
    /// At least one part has been uploaded.
    Uploading,
    /// The upload has been completed, the session can't be used anymore.
    Completed,
    /// A part upload or the completion failed.
    Failed,
}

/// A multipart upload session created by [`Client::begin_multipart_upload`].
///
/// Parts are uploaded one at a time with part numbers `1, 2, 3, ...`. A failed call
/// moves the session to [`UploadState::Failed`] and every later call is rejected.
///
/// Failed sessions are not aborted on the server. Use [`MultipartUpload::upload_id`]
/// to abort them out of band.
#[derive(Debug)]
pub struct MultipartUpload {
    client: Client,
    bucket: String,
    key: String,
    upload_id: String,
    parts: Vec<Part>,
    state: UploadState,
}

impl MultipartUpload {
    pub(crate) fn new(client: Client, bucket: &str, key: &str, upload_id: String) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id,
            parts: Vec::new(),
            state: UploadState::Initiated,
        }
    }

    /// Bucket of this upload.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object key of this upload.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Upload id returned by the server.
    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    /// Current state.
    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Parts uploaded so far, in upload order.
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Part number expected by the next [`MultipartUpload::upload_part`] call.
    pub fn next_part_number(&self) -> usize {
        self.parts.last().map_or(1, |p| p.part_number + 1)
    }

    /// Upload one part and return its ETag.
    ///
    /// `part_number` must be exactly one more than the previous part. Every part but the
    /// last one must be at least [`crate::MIN_PART_SIZE`] bytes, which is enforced
    /// by the server.
    pub async fn upload_part(&mut self, data: Bytes, part_number: usize) -> Result<String> {
        self.check_active()?;

        let expected = self.next_part_number();
        if part_number != expected {
            return Err(Error::request_invalid(format!(
                "part number must be {expected}, got {part_number}"
            ))
            .with_context(format!("upload_id: {}", self.upload_id)));
        }

        let size = data.len();
        match self
            .client
            .upload_part(&self.bucket, &self.key, &self.upload_id, part_number, data)
            .await
        {
            Ok(etag) => {
                debug!(
                    "uploaded part {part_number} of {size} bytes for upload {}",
                    self.upload_id
                );
                self.parts.push(Part {
                    part_number,
                    etag: etag.clone(),
                });
                self.state = UploadState::Uploading;
                Ok(etag)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Complete the upload with every uploaded part.
    ///
    /// The parts are sent in ascending part number order. On success the session moves
    /// to [`UploadState::Completed`] and its parts are cleared.
    pub async fn complete(&mut self) -> Result<()> {
        self.check_active()?;
        if self.parts.is_empty() {
            return Err(Error::request_invalid("no part has been uploaded")
                .with_context(format!("upload_id: {}", self.upload_id)));
        }

        match self
            .client
            .complete_multipart_upload(&self.bucket, &self.key, &self.upload_id, &self.parts)
            .await
        {
            Ok(()) => {
                debug!(
                    "completed upload {} with {} parts",
                    self.upload_id,
                    self.parts.len()
                );
                self.parts.clear();
                self.state = UploadState::Completed;
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn check_active(&self) -> Result<()> {
        match self.state {
            UploadState::Initiated | UploadState::Uploading => Ok(()),
            state => Err(Error::request_invalid(format!(
                "multipart upload is {state:?}, no more calls are allowed"
            ))
            .with_context(format!("upload_id: {}", self.upload_id))),
        }
    }

    fn fail(&mut self, err: Error) -> Error {
        warn!(
            "multipart upload {} of {}/{} failed, the upload is left on the server: {err}",
            self.upload_id, self.bucket, self.key
        );
        self.state = UploadState::Failed;
        err.with_context(format!("upload_id: {}", self.upload_id))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct InitiateMultipartUploadResult {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename = "CompleteMultipartUpload")]
pub(crate) struct CompleteMultipartUpload {
    #[serde(rename = "Part")]
    pub parts: Vec<CompletedPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct CompletedPart {
    pub part_number: usize,
    #[serde(rename = "ETag")]
    pub etag: String,
}

impl CompleteMultipartUpload {
    /// Build the manifest in ascending part number order.
    pub fn new(parts: &[Part]) -> Self {
        let mut parts: Vec<CompletedPart> = parts
            .iter()
            .map(|p| CompletedPart {
                part_number: p.part_number,
                etag: p.etag.clone(),
            })
            .collect();
        parts.sort_by_key(|p| p.part_number);

        Self { parts }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct CompleteMultipartUploadResult {
    pub location: String,
    pub bucket: String,
    pub key: String,
    #[serde(rename = "ETag")]
    pub etag: String,
}

/// Error document S3 may return with a `200 OK` status.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub(crate) struct S3Error {
    pub code: String,
    pub message: String,
    pub request_id: String,
}

/// Local name of the root element, `None` if the body is not XML.
pub(crate) fn root_element(body: &[u8]) -> Option<String> {
    let mut reader = Reader::from_reader(body);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned())
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}
