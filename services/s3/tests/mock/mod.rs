use async_trait::async_trait;
use bytes::Bytes;
use http::header::AUTHORIZATION;
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use s3sign_core::{Context, HttpSend, Result};
use s3sign_s3::{CallbackCredentialProvider, Credential};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A request as seen by the transport.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn authorization(&self) -> &str {
        self.header(AUTHORIZATION.as_str()).unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct State {
    responses: VecDeque<Response<Bytes>>,
    requests: Vec<RecordedRequest>,
}

/// In-memory S3 that answers from a script and records every request.
///
/// Requests signed with `rejected_access_key` are answered with 403, the others pop
/// the next scripted response, or get an empty 200 once the script runs out.
#[derive(Debug, Clone, Default)]
pub struct MockS3 {
    state: Arc<Mutex<State>>,
    rejected_access_key: Option<String>,
}

impl MockS3 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(access_key: &str) -> Self {
        Self {
            rejected_access_key: Some(access_key.to_string()),
            ..Self::default()
        }
    }

    pub fn respond(&self, status: u16, headers: &[(&str, &str)], body: &str) -> &Self {
        let mut resp = Response::builder().status(status);
        for (k, v) in headers {
            resp = resp.header(*k, *v);
        }
        let resp = resp
            .body(Bytes::from(body.to_string()))
            .expect("response must be valid");

        self.state.lock().unwrap().responses.push_back(resp);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn context(&self) -> Context {
        Context::new().with_http_send(self.clone())
    }
}

#[async_trait]
impl HttpSend for MockS3 {
    async fn http_send(&self, req: Request<Bytes>) -> Result<Response<Bytes>> {
        let (parts, body) = req.into_parts();
        let recorded = RecordedRequest {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
        };

        let rejected = self
            .rejected_access_key
            .as_deref()
            .is_some_and(|ak| recorded.authorization().contains(ak));

        let mut state = self.state.lock().unwrap();
        state.requests.push(recorded);
        if rejected {
            return Ok(Response::builder()
                .status(StatusCode::FORBIDDEN)
                .body(Bytes::from_static(b"<Error><Code>AccessDenied</Code></Error>"))
                .expect("response must be valid"));
        }

        Ok(state.responses.pop_front().unwrap_or_else(|| {
            Response::builder()
                .status(StatusCode::OK)
                .body(Bytes::new())
                .expect("response must be valid")
        }))
    }
}

/// A refresh callback handing out `new_ak`, counting its calls.
pub fn counting_provider(delay: Duration) -> (CallbackCredentialProvider, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let provider = CallbackCredentialProvider::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(delay).await;
            Ok(Some(Credential::new("new_ak", "new_sk")))
        }
    });

    (provider, calls)
}
