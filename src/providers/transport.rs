//! HTTP transport and the signing interceptor
//!
//! `HttpTransport` is the seam between the ACS logic and the wire. The
//! production implementation wraps a reqwest client; `SignedTransport`
//! decorates any transport and attaches the auth headers right before the
//! request leaves.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use tracing::debug;

use super::action::ACTION_HEADER;
use super::auth::{Signer, AUTH_DATA_HEADER, AUTH_SIGN_HEADER};
use super::{NetStorageConfig, ProviderError};

/// Streamed body chunks
pub type ByteStream = BoxStream<'static, Result<Bytes, ProviderError>>;

/// Outgoing request body
pub enum RequestBody {
    Empty,
    Bytes(Bytes),
    /// Streaming upload; length is sent as Content-Length
    Stream { stream: ByteStream, length: u64 },
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestBody::Empty => write!(f, "Empty"),
            RequestBody::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            RequestBody::Stream { length, .. } => write!(f, "Stream({} bytes)", length),
        }
    }
}

/// A single ACS request
#[derive(Debug)]
pub struct AcsRequest {
    pub method: Method,
    pub url: url::Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl AcsRequest {
    pub fn new(method: Method, url: url::Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    /// Set the finalized action header value
    pub fn action(mut self, action: &str) -> Result<Self, ProviderError> {
        let value = HeaderValue::from_str(action)
            .map_err(|e| ProviderError::InvalidPath(format!("Invalid action header: {}", e)))?;
        self.headers.insert(ACTION_HEADER, value);
        Ok(self)
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Action header value as it will be transmitted
    pub fn action_value(&self) -> Option<&str> {
        self.headers.get(ACTION_HEADER).and_then(|v| v.to_str().ok())
    }
}

/// Response with a lazily consumed body
pub struct AcsResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl std::fmt::Debug for AcsResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcsResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl AcsResponse {
    /// Response with a fully buffered body
    pub fn buffered(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            headers,
            body: stream::once(async move { Ok::<_, ProviderError>(body) }).boxed(),
        }
    }

    /// Collect the whole body
    pub async fn bytes(self) -> Result<Bytes, ProviderError> {
        let chunks: Vec<Bytes> = self.body.try_collect().await?;
        if chunks.len() == 1 {
            return Ok(chunks.into_iter().next().unwrap_or_default());
        }
        let mut out = Vec::with_capacity(chunks.iter().map(|c| c.len()).sum());
        for chunk in chunks {
            out.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(out))
    }

    /// Collect the body as text, honouring the XML declaration's encoding
    pub async fn text(self) -> Result<String, ProviderError> {
        let bytes = self.bytes().await?;
        decode_body(&bytes)
    }

    /// Turn a non-2xx response into the matching error, consuming the body
    pub async fn error_for_status(self, path: &str) -> Result<Self, ProviderError> {
        if self.status.is_success() {
            return Ok(self);
        }
        let status = self.status;
        let body = self.text().await.unwrap_or_default();
        Err(ProviderError::from_status(status, path, &body))
    }
}

/// Decode a response body. ACS answers in UTF-8 when asked to and in
/// ISO-8859-1 otherwise; the XML declaration says which.
pub(crate) fn decode_body(bytes: &[u8]) -> Result<String, ProviderError> {
    let utf8_err = match std::str::from_utf8(bytes) {
        Ok(text) => return Ok(text.to_string()),
        Err(e) => e,
    };

    match declared_encoding(bytes).as_deref() {
        // Latin-1 code points are the byte values
        Some("iso-8859-1") | Some("latin1") | Some("latin-1") => {
            Ok(bytes.iter().map(|&b| char::from(b)).collect())
        }
        Some(other) => Err(ProviderError::ParseError(format!(
            "Unsupported response encoding: {}",
            other
        ))),
        None => Err(ProviderError::ParseError(format!("Response is not UTF-8: {}", utf8_err))),
    }
}

/// Lower-cased `encoding` pseudo-attribute of a leading XML declaration
fn declared_encoding(bytes: &[u8]) -> Option<String> {
    let mut reader = quick_xml::Reader::from_reader(bytes);
    let mut buf = Vec::new();
    match reader.read_event_into(&mut buf) {
        Ok(quick_xml::events::Event::Decl(decl)) => {
            let raw = decl.encoding()?.ok()?;
            Some(String::from_utf8_lossy(&raw).trim().to_ascii_lowercase())
        }
        _ => None,
    }
}

/// Sends ACS requests
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: AcsRequest) -> Result<AcsResponse, ProviderError>;
}

/// reqwest-backed transport
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &NetStorageConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: AcsRequest) -> Result<AcsResponse, ProviderError> {
        let mut builder = self
            .client
            .request(request.method, request.url.as_str())
            .headers(request.headers);

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Bytes(bytes) => builder.body(bytes),
            RequestBody::Stream { stream, length } => builder
                .header(http::header::CONTENT_LENGTH, length)
                .body(reqwest::Body::wrap_stream(stream)),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map_err(|e| ProviderError::NetworkError(e.to_string()))
            .boxed();

        Ok(AcsResponse { status, headers, body })
    }
}

/// Signing interceptor
///
/// Requests without an action header pass through untouched. Signed
/// requests get fresh auth headers on every call, replacing any left over
/// from a previous attempt.
pub struct SignedTransport<T> {
    inner: T,
    signer: Signer,
}

impl<T: HttpTransport> SignedTransport<T> {
    pub fn new(inner: T, signer: Signer) -> Self {
        Self { inner, signer }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn sign_request(&self, request: &mut AcsRequest) -> Result<(), ProviderError> {
        let Some(action) = request.action_value() else {
            return Ok(());
        };

        let ctx = self.signer.context(&request.url, action);
        let auth = self.signer.sign(&ctx)?;

        let data = HeaderValue::from_str(&auth.auth_data)
            .map_err(|e| ProviderError::Configuration(format!("Invalid auth data header: {}", e)))?;
        let sign = HeaderValue::from_str(&auth.auth_sign)
            .map_err(|e| ProviderError::Configuration(format!("Invalid auth sign header: {}", e)))?;

        request.headers.insert(AUTH_DATA_HEADER, data);
        request.headers.insert(AUTH_SIGN_HEADER, sign);
        Ok(())
    }
}

#[async_trait]
impl<T: HttpTransport> HttpTransport for SignedTransport<T> {
    async fn execute(&self, mut request: AcsRequest) -> Result<AcsResponse, ProviderError> {
        self.sign_request(&mut request)?;
        debug!(
            "ACS {} {} [{}]",
            request.method,
            request.url.path(),
            request.action_value().unwrap_or("unsigned")
        );
        self.inner.execute(request).await
    }
}
