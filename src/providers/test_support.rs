//! Scripted in-memory transport for tests
//!
//! Responses are served in FIFO order; every request is recorded with its
//! final headers and body so tests can assert on the exact wire traffic.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::transport::{AcsRequest, AcsResponse, HttpTransport, RequestBody};
use super::ProviderError;

enum Scripted {
    Respond {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    NetworkFailure(String),
    /// Never completes; used to exercise cancellation
    Hang,
    /// 200 whose body sends `head` and then never finishes
    StalledBody(Bytes),
}

/// A request as it reached the wire
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub action: Option<String>,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn header_count(&self, name: &str) -> usize {
        self.headers.get_all(name).iter().count()
    }

    /// Value of `action=` in the action header
    pub fn action_name(&self) -> Option<String> {
        let action = self.action.as_deref()?;
        url::form_urlencoded::parse(action.as_bytes())
            .find(|(k, _)| k == "action")
            .map(|(_, v)| v.into_owned())
    }

    /// Value of an arbitrary action parameter
    pub fn action_param(&self, key: &str) -> Option<String> {
        let action = self.action.as_deref()?;
        url::form_urlencoded::parse(action.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// `"<action> <path>"`, handy for order assertions
    pub fn summary(&self) -> String {
        format!("{} {}", self.action_name().unwrap_or_default(), self.path)
    }
}

#[derive(Default)]
struct MockState {
    responses: VecDeque<Scripted>,
    requests: Vec<RecordedRequest>,
}

/// Cloneable handle; clones share the same script and log
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, scripted: Scripted) {
        self.state.lock().unwrap().responses.push_back(scripted);
    }

    pub fn push_ok(&self, body: &str) {
        self.push_status(200, body);
    }

    pub fn push_status(&self, status: u16, body: &str) {
        self.push(Scripted::Respond {
            status: StatusCode::from_u16(status).unwrap(),
            headers: HeaderMap::new(),
            body: Bytes::from(body.to_string()),
        });
    }

    /// Respond with a raw body that need not be UTF-8
    pub fn push_bytes(&self, status: u16, body: &[u8]) {
        self.push(Scripted::Respond {
            status: StatusCode::from_u16(status).unwrap(),
            headers: HeaderMap::new(),
            body: Bytes::copy_from_slice(body),
        });
    }

    pub fn push_with_header(&self, status: u16, header: &'static str, value: &str, body: &str) {
        let mut headers = HeaderMap::new();
        headers.insert(header, HeaderValue::from_str(value).unwrap());
        self.push(Scripted::Respond {
            status: StatusCode::from_u16(status).unwrap(),
            headers,
            body: Bytes::from(body.to_string()),
        });
    }

    pub fn push_network_failure(&self, message: &str) {
        self.push(Scripted::NetworkFailure(message.to_string()));
    }

    pub fn push_hang(&self) {
        self.push(Scripted::Hang);
    }

    pub fn push_stalled_body(&self, head: &[u8]) {
        self.push(Scripted::StalledBody(Bytes::copy_from_slice(head)));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn summaries(&self) -> Vec<String> {
        self.requests().iter().map(RecordedRequest::summary).collect()
    }

    pub fn remaining(&self) -> usize {
        self.state.lock().unwrap().responses.len()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: AcsRequest) -> Result<AcsResponse, ProviderError> {
        let body = match request.body {
            RequestBody::Empty => Vec::new(),
            RequestBody::Bytes(bytes) => bytes.to_vec(),
            RequestBody::Stream { stream, .. } => {
                let chunks: Vec<Bytes> = stream.try_collect().await?;
                chunks.concat()
            }
        };

        let scripted = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(RecordedRequest {
                method: request.method.clone(),
                path: request.url.path().to_string(),
                action: request
                    .headers
                    .get(super::action::ACTION_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
                headers: request.headers.clone(),
                body,
            });
            state.responses.pop_front()
        };

        match scripted {
            Some(Scripted::Respond { status, headers, body }) => Ok(AcsResponse::buffered(status, headers, body)),
            Some(Scripted::NetworkFailure(message)) => Err(ProviderError::NetworkError(message)),
            Some(Scripted::Hang) => futures_util::future::pending().await,
            Some(Scripted::StalledBody(head)) => {
                let body = futures_util::stream::once(async move { Ok::<_, ProviderError>(head) })
                    .chain(futures_util::stream::pending())
                    .boxed();
                Ok(AcsResponse {
                    status: StatusCode::OK,
                    headers: HeaderMap::new(),
                    body,
                })
            }
            None => Ok(AcsResponse::buffered(
                StatusCode::INTERNAL_SERVER_ERROR,
                HeaderMap::new(),
                "unscripted request",
            )),
        }
    }
}
