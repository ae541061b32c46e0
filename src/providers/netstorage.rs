//! NetStorage Storage Provider
//!
//! Filesystem-style facade over the ACS HTTP API. Every caller path is
//! relative to the configured `/<cp-code>/<prefix>/` root, every path in a
//! returned record has that root stripped again.
//!
//! Both backend variants are served by the same provider; the differences
//! (stat parameters, listing model, `mkdir` semantics) are selected by
//! `StoreKind`.

use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use sha1::{Digest, Sha1};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::action::{ActionDirective, ActionName};
use super::auth::{Credentials, Signer};
use super::client::AcsClient;
use super::metadata;
use super::paths::{self, PathPrefix};
use super::transport::{ByteStream, HttpTransport, ReqwestTransport, RequestBody, SignedTransport};
use super::{
    DiskUsage, EnsureOutcome, MetadataRecord, NetStorageConfig, ProviderError, StorageProvider, StoreKind,
};

/// NetStorage provider over any transport
pub struct NetStorageProvider<T: HttpTransport = ReqwestTransport> {
    host: String,
    client: AcsClient<SignedTransport<T>>,
}

impl NetStorageProvider<ReqwestTransport> {
    /// Provider talking to the configured host over HTTPS
    pub fn new(config: &NetStorageConfig) -> Result<Self, ProviderError> {
        let transport = ReqwestTransport::new(config)?;
        Self::with_transport(config, transport)
    }
}

impl<T: HttpTransport> NetStorageProvider<T> {
    pub fn with_transport(config: &NetStorageConfig, transport: T) -> Result<Self, ProviderError> {
        let signer = Signer::new(Credentials::new(config.key.clone(), config.key_name.clone()));
        Self::with_signer(config, transport, signer)
    }

    /// Provider with an explicit signer (custom clock or nonce source)
    pub fn with_signer(config: &NetStorageConfig, transport: T, signer: Signer) -> Result<Self, ProviderError> {
        if config.cp_code.trim_matches('/').is_empty() {
            return Err(ProviderError::InvalidConfig("cp_code is required".to_string()));
        }
        let base_url = config.base_url()?;
        let prefix = PathPrefix::new(&config.cp_code, config.path_prefix.as_deref());

        Ok(Self {
            host: base_url.host_str().unwrap_or(&config.host).to_string(),
            client: AcsClient::new(
                SignedTransport::new(transport, signer),
                base_url,
                prefix,
                config.store_kind,
            ),
        })
    }

    /// Same provider, aborted as soon as `token` is cancelled
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            host: self.host.clone(),
            client: self.client.with_cancellation(token),
        }
    }

    pub fn prefix(&self) -> &PathPrefix {
        self.client.prefix()
    }

    pub fn store_kind(&self) -> StoreKind {
        self.client.store_kind()
    }

    /// Underlying (unsigned) transport
    pub fn transport(&self) -> &T {
        self.client.transport().inner()
    }

    /// Full request path for a caller path
    fn resolve(&self, path: &str) -> Result<String, ProviderError> {
        if path.split(|c| c == '/' || c == '\\').any(|segment| segment == "..") {
            return Err(ProviderError::InvalidPath(format!(
                "Parent segments are not allowed: {}",
                path
            )));
        }
        Ok(self.client.prefix().apply(path.trim_end_matches('/')))
    }

    async fn upload(&self, path: &str, body: RequestBody, sha1: Option<String>) -> Result<MetadataRecord, ProviderError> {
        let full = self.resolve(path)?;
        self.client.ensure_path(&full).await?;

        let mut directive = ActionDirective::new(ActionName::Upload);
        if let Some(digest) = sha1 {
            directive = directive.param("sha1", &digest);
        }

        self.client
            .send(Method::PUT, &full, &directive, body)
            .await?
            .error_for_status(path)
            .await?;

        self.client.stat_full(&full).await
    }

    /// Delete, treating an absent path as deleted
    async fn delete_if_present(&self, path: &str) -> Result<(), ProviderError> {
        match self.delete(path).await {
            Err(ProviderError::NotFound(_)) => Ok(()),
            other => other,
        }
    }

    /// Create the configured prefix directory chain
    ///
    /// Existing segments are fine; an empty prefix needs no work.
    pub async fn prepare_prefix(&self) -> Result<Vec<EnsureOutcome>, ProviderError> {
        let root = self.client.prefix().root().trim_end_matches('/').to_string();
        let mut segments: Vec<&str> = root.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() <= 1 {
            return Ok(Vec::new());
        }

        let cp_code = segments.remove(0);
        let mut current = format!("/{}", cp_code);
        let mut outcomes = Vec::with_capacity(segments.len());
        for segment in segments {
            current = paths::join(&current, segment);
            outcomes.push(self.client.mkdir_full(&current).await?);
        }

        info!("Prefix {} ready", root);
        Ok(outcomes)
    }

    /// Files and bytes below a directory (`du` action)
    pub async fn disk_usage(&self, path: &str) -> Result<DiskUsage, ProviderError> {
        let full = self.resolve(path)?;
        let body = self
            .client
            .fetch_text(&full, &ActionDirective::new(ActionName::Du))
            .await?;
        let mut usage = metadata::parse_disk_usage(&body)?;
        usage.directory = if usage.directory.is_empty() {
            self.client.prefix().strip(&full)
        } else {
            self.client.prefix().strip(&usage.directory)
        };
        Ok(usage)
    }
}

#[async_trait]
impl<T: HttpTransport> StorageProvider for NetStorageProvider<T> {
    fn display_name(&self) -> String {
        format!("NetStorage {} ({})", self.host, self.client.store_kind())
    }

    async fn has(&self, path: &str) -> Result<bool, ProviderError> {
        self.client.exists_full(&self.resolve(path)?).await
    }

    async fn stat(&self, path: &str) -> Result<MetadataRecord, ProviderError> {
        self.client.stat_full(&self.resolve(path)?).await
    }

    async fn read(&self, path: &str) -> Result<Bytes, ProviderError> {
        let full = self.resolve(path)?;
        let response = self
            .client
            .send(Method::GET, &full, &ActionDirective::new(ActionName::Download), RequestBody::Empty)
            .await?
            .error_for_status(path)
            .await?;
        self.client.cancellable(response.bytes()).await
    }

    async fn read_stream(&self, path: &str) -> Result<ByteStream, ProviderError> {
        let full = self.resolve(path)?;
        let response = self
            .client
            .send(Method::GET, &full, &ActionDirective::new(ActionName::Download), RequestBody::Empty)
            .await?
            .error_for_status(path)
            .await?;
        Ok(self.client.guard_stream(response.body))
    }

    async fn write(&self, path: &str, contents: Bytes) -> Result<MetadataRecord, ProviderError> {
        let digest = hex::encode(Sha1::digest(&contents));
        debug!("Uploading {} ({} bytes, sha1 {})", path, contents.len(), digest);
        self.upload(path, RequestBody::Bytes(contents), Some(digest)).await
    }

    async fn write_stream(&self, path: &str, stream: ByteStream, length: u64) -> Result<MetadataRecord, ProviderError> {
        debug!("Streaming upload of {} ({} bytes)", path, length);
        self.upload(path, RequestBody::Stream { stream, length }, None).await
    }

    async fn update(&self, path: &str, contents: Bytes) -> Result<MetadataRecord, ProviderError> {
        self.delete_if_present(path).await?;
        self.write(path, contents).await
    }

    async fn update_stream(&self, path: &str, stream: ByteStream, length: u64) -> Result<MetadataRecord, ProviderError> {
        self.delete_if_present(path).await?;
        self.write_stream(path, stream, length).await
    }

    async fn copy(&self, from: &str, to: &str) -> Result<MetadataRecord, ProviderError> {
        let source = self.stat(from).await?;
        if source.is_dir() {
            return Err(ProviderError::InvalidPath(format!("Cannot copy a directory: {}", from)));
        }

        match source.size_bytes() {
            Some(length) => {
                let stream = self.read_stream(from).await?;
                self.write_stream(to, stream, length).await
            }
            None => {
                let contents = self.read(from).await?;
                self.write(to, contents).await
            }
        }
    }

    async fn delete(&self, path: &str) -> Result<(), ProviderError> {
        let full = self.resolve(path)?;
        let record = self.client.stat_full(&full).await?;
        self.client.remove_full(&full, record.entry_type).await
    }

    async fn create_dir(&self, path: &str) -> Result<MetadataRecord, ProviderError> {
        if paths::is_effectively_empty(path) {
            return Err(ProviderError::AlreadyExists("/".to_string()));
        }
        let full = self.resolve(path)?;

        // object stores answer 200 for an existing directory
        if self.client.store_kind().mkdir_is_idempotent() && self.client.exists_full(&full).await? {
            return Err(ProviderError::AlreadyExists(path.to_string()));
        }

        self.client.ensure_path(&full).await?;
        match self.client.mkdir_full(&full).await? {
            EnsureOutcome::Created(_) => {}
            EnsureOutcome::AlreadyExisted(_) => return Err(ProviderError::AlreadyExists(path.to_string())),
        }

        self.client.stat_full(&full).await
    }

    async fn delete_dir(&self, path: &str) -> Result<(), ProviderError> {
        self.client.delete_tree(&self.resolve(path)?).await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), ProviderError> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;

        if self.client.exists_full(&target).await? {
            return Err(ProviderError::AlreadyExists(to.to_string()));
        }

        let directive = ActionDirective::new(ActionName::Rename).param("destination", &target);
        let response = self
            .client
            .send(Method::POST, &source, &directive, RequestBody::Empty)
            .await?;
        match response.error_for_status(from).await {
            Ok(_) => Ok(()),
            Err(ProviderError::AlreadyExists(_)) => Err(ProviderError::AlreadyExists(to.to_string())),
            Err(e) => Err(e),
        }
    }

    async fn list_contents(&self, path: &str, recursive: bool) -> Result<Vec<MetadataRecord>, ProviderError> {
        self.client.list(&self.resolve(path)?, recursive).await
    }

    async fn mimetype(&self, path: &str) -> Result<String, ProviderError> {
        let full = self.resolve(path)?;
        let response = self
            .client
            .send(Method::HEAD, &full, &ActionDirective::new(ActionName::Download), RequestBody::Empty)
            .await?
            .error_for_status(path)
            .await?;

        Ok(response
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| metadata::guess_mimetype(path)))
    }
}
