//! Low-level ACS request plumbing
//!
//! `AcsClient` turns a full (prefixed) path plus an action directive into a
//! signed request, honours cancellation and maps response statuses. The
//! path-consistency engine (`ensure`, `listing`, `delete`) is built on top
//! of it as separate `impl` blocks.

use futures_util::stream::{self, StreamExt};
use http::Method;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::action::{ActionDirective, ActionName};
use super::metadata;
use super::paths::PathPrefix;
use super::transport::{AcsRequest, AcsResponse, ByteStream, HttpTransport, RequestBody};
use super::{EnsureOutcome, EntryType, MetadataRecord, ProviderError, StoreKind};

/// Shared request context for one provider
pub struct AcsClient<T> {
    pub(super) transport: Arc<T>,
    pub(super) base_url: url::Url,
    pub(super) prefix: PathPrefix,
    pub(super) store_kind: StoreKind,
    pub(super) cancel: CancellationToken,
}

impl<T> Clone for AcsClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            base_url: self.base_url.clone(),
            prefix: self.prefix.clone(),
            store_kind: self.store_kind,
            cancel: self.cancel.clone(),
        }
    }
}

impl<T: HttpTransport> AcsClient<T> {
    pub fn new(transport: T, base_url: url::Url, prefix: PathPrefix, store_kind: StoreKind) -> Self {
        Self {
            transport: Arc::new(transport),
            base_url,
            prefix,
            store_kind,
            cancel: CancellationToken::new(),
        }
    }

    pub fn prefix(&self) -> &PathPrefix {
        &self.prefix
    }

    pub fn store_kind(&self) -> StoreKind {
        self.store_kind
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Same client, aborted when `token` is cancelled
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        let mut client = self.clone();
        client.cancel = token;
        client
    }

    /// Caller-facing form of a full path, used in error messages
    pub(super) fn display_path(&self, full_path: &str) -> String {
        self.prefix.strip(full_path)
    }

    fn url_for(&self, full_path: &str) -> url::Url {
        let mut url = self.base_url.clone();
        url.set_path(full_path);
        url.set_query(None);
        url
    }

    /// Send one signed action; every follow-up request of an operation goes
    /// through here so cancellation stops the whole sequence
    pub(super) async fn send(
        &self,
        method: Method,
        full_path: &str,
        directive: &ActionDirective,
        body: RequestBody,
    ) -> Result<AcsResponse, ProviderError> {
        if self.cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        let request = AcsRequest::new(method, self.url_for(full_path))
            .action(&directive.render())?
            .body(body);

        debug!("{} {}", directive.name(), full_path);

        self.cancellable(self.transport.execute(request)).await
    }

    /// Race a future against the cancellation token
    pub(super) async fn cancellable<F, R>(&self, fut: F) -> Result<R, ProviderError>
    where
        F: std::future::Future<Output = Result<R, ProviderError>>,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ProviderError::Cancelled),
            result = fut => result,
        }
    }

    /// Race every poll of a response body against the token; once it fires
    /// the stream yields `Cancelled` and ends, even if the body has stalled
    pub(super) fn guard_stream(&self, body: ByteStream) -> ByteStream {
        let token = self.cancel.clone();
        stream::unfold(Some(body), move |state| {
            let token = token.clone();
            async move {
                let mut body = state?;
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Some((Err(ProviderError::Cancelled), None)),
                    chunk = body.next() => chunk.map(|chunk| (chunk, Some(body))),
                }
            }
        })
        .boxed()
    }

    /// `stat` directive for the configured backend
    pub(super) fn stat_directive(&self) -> ActionDirective {
        match self.store_kind {
            StoreKind::ObjectStore => ActionDirective::new(ActionName::Stat)
                .param("implicit", "yes")
                .param("encoding", "utf-8"),
            StoreKind::FileStore => ActionDirective::new(ActionName::Stat),
        }
    }

    /// Fetch the body of an XML-bearing action
    pub(super) async fn fetch_text(
        &self,
        full_path: &str,
        directive: &ActionDirective,
    ) -> Result<String, ProviderError> {
        let response = self
            .send(Method::GET, full_path, directive, RequestBody::Empty)
            .await?
            .error_for_status(&self.display_path(full_path))
            .await?;
        self.cancellable(response.text()).await
    }

    /// Metadata of a full path
    pub async fn stat_full(&self, full_path: &str) -> Result<MetadataRecord, ProviderError> {
        let body = self.fetch_text(full_path, &self.stat_directive()).await?;
        let page = metadata::parse_listing(&body)?;
        Ok(metadata::normalize(&page.directory, page.files.first(), &self.prefix))
    }

    /// Existence check; 404 and 403 both read as absent
    pub async fn exists_full(&self, full_path: &str) -> Result<bool, ProviderError> {
        match self.stat_full(full_path).await {
            Ok(_) => Ok(true),
            Err(ProviderError::NotFound(_)) | Err(ProviderError::PermissionDenied(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create one directory, reporting a concurrent creation as success
    pub async fn mkdir_full(&self, full_path: &str) -> Result<EnsureOutcome, ProviderError> {
        let directive = ActionDirective::new(ActionName::Mkdir);
        let response = self
            .send(Method::PUT, full_path, &directive, RequestBody::Empty)
            .await?;

        let shown = self.display_path(full_path);
        match response.error_for_status(&shown).await {
            Ok(_) => Ok(EnsureOutcome::Created(shown)),
            Err(ProviderError::AlreadyExists(_)) => Ok(EnsureOutcome::AlreadyExisted(shown)),
            Err(e) => Err(e),
        }
    }

    /// Remove one entry with the action matching its type
    pub async fn remove_full(&self, full_path: &str, entry_type: EntryType) -> Result<(), ProviderError> {
        let directive = ActionDirective::new(entry_type.delete_action());
        self.send(Method::POST, full_path, &directive, RequestBody::Empty)
            .await?
            .error_for_status(&self.display_path(full_path))
            .await?;
        Ok(())
    }
}
