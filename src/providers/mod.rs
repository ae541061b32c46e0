//! Storage Providers Module
//!
//! This module exposes NetStorage through the `StorageProvider` trait: a
//! filesystem-style facade (read, write, list, delete, ...) over the ACS
//! HTTP API.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │           StorageProvider Trait             │
//! │  has, stat, read, write, list_contents ...  │
//! └─────────────────────────────────────────────┘
//!                      │
//!             ┌────────▼─────────┐
//!             │ NetStorageProvider│
//!             └────────┬─────────┘
//!       ensure / listing / delete (AcsClient)
//!                      │
//!             ┌────────▼─────────┐
//!             │ SignedTransport  │  action + auth headers
//!             └────────┬─────────┘
//!             ┌────────▼─────────┐
//!             │ ReqwestTransport │
//!             └──────────────────┘
//! ```

pub mod types;
pub mod action;
pub mod auth;
pub mod transport;
pub mod paths;
pub mod metadata;
pub mod client;
pub mod ensure;
pub mod listing;
pub mod delete;
pub mod netstorage;

#[cfg(test)]
pub(crate) mod test_support;

pub use types::*;
pub use action::{ActionDirective, ActionName};
pub use auth::{Credentials, Signer};
pub use client::AcsClient;
pub use listing::ObjectListing;
pub use netstorage::NetStorageProvider;
pub use paths::PathPrefix;
pub use transport::{ByteStream, HttpTransport, ReqwestTransport, SignedTransport};

use async_trait::async_trait;
use bytes::Bytes;

/// Filesystem-style storage trait
///
/// Paths are relative to the provider's configured root. Methods take
/// `&self`; a provider can serve independent operations concurrently.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Get display name for this provider instance
    fn display_name(&self) -> String;

    /// Whether a file or directory exists
    async fn has(&self, path: &str) -> Result<bool, ProviderError>;

    /// Metadata of a file or directory
    async fn stat(&self, path: &str) -> Result<MetadataRecord, ProviderError>;

    /// Download a whole file
    async fn read(&self, path: &str) -> Result<Bytes, ProviderError>;

    /// Download a file as a byte stream
    async fn read_stream(&self, path: &str) -> Result<ByteStream, ProviderError>;

    /// Upload a file, creating missing parent directories
    async fn write(&self, path: &str, contents: Bytes) -> Result<MetadataRecord, ProviderError>;

    /// Upload a file of known length from a stream
    async fn write_stream(&self, path: &str, stream: ByteStream, length: u64) -> Result<MetadataRecord, ProviderError>;

    /// Replace a file
    async fn update(&self, path: &str, contents: Bytes) -> Result<MetadataRecord, ProviderError>;

    /// Replace a file from a stream
    async fn update_stream(&self, path: &str, stream: ByteStream, length: u64) -> Result<MetadataRecord, ProviderError>;

    /// Copy a file (download + upload)
    async fn copy(&self, from: &str, to: &str) -> Result<MetadataRecord, ProviderError>;

    /// Delete a file or an empty directory
    async fn delete(&self, path: &str) -> Result<(), ProviderError>;

    /// Create a directory and its missing parents
    async fn create_dir(&self, path: &str) -> Result<MetadataRecord, ProviderError>;

    /// Delete a directory recursively
    async fn delete_dir(&self, path: &str) -> Result<(), ProviderError>;

    /// Rename/move a file or directory
    async fn rename(&self, from: &str, to: &str) -> Result<(), ProviderError>;

    /// List directory contents
    async fn list_contents(&self, path: &str, recursive: bool) -> Result<Vec<MetadataRecord>, ProviderError>;

    /// Content type as served by the download endpoint
    async fn mimetype(&self, path: &str) -> Result<String, ProviderError>;

    /// File size in bytes
    async fn size(&self, path: &str) -> Result<Option<u64>, ProviderError> {
        Ok(self.stat(path).await?.size_bytes())
    }

    /// Modification time (epoch seconds)
    async fn timestamp(&self, path: &str) -> Result<String, ProviderError> {
        Ok(self.stat(path).await?.timestamp)
    }
}

/// Provider factory for creating provider instances
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create a reqwest-backed provider from configuration
    pub fn create(config: &NetStorageConfig) -> Result<NetStorageProvider, ProviderError> {
        NetStorageProvider::new(config)
    }

    /// Same, boxed behind the trait
    pub fn create_boxed(config: &NetStorageConfig) -> Result<Box<dyn StorageProvider>, ProviderError> {
        Ok(Box::new(Self::create(config)?))
    }
}
