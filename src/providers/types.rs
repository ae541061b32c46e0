//! Shared types for the NetStorage provider
//!
//! This module contains the types shared across the ACS components:
//! backend variant, runtime configuration, the normalized metadata record
//! and the provider error type.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// NetStorage backend variants
///
/// Both variants speak the same ACS protocol but disagree on how directories
/// are listed and how existing directories are reported on `mkdir`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Classic file store: `dir` listings, one page per directory
    FileStore,
    /// Object store: cursor-paginated `list` action
    #[default]
    ObjectStore,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::FileStore => write!(f, "FileStore"),
            StoreKind::ObjectStore => write!(f, "ObjectStore"),
        }
    }
}

impl StoreKind {
    /// Parse the variant name used in settings files and on the command line
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "filestore" | "file-store" | "file" => Some(StoreKind::FileStore),
            "objectstore" | "object-store" | "object" => Some(StoreKind::ObjectStore),
            _ => None,
        }
    }

    /// Whether `mkdir` on an existing directory succeeds silently (and thus
    /// needs an explicit existence check first)
    pub fn mkdir_is_idempotent(&self) -> bool {
        matches!(self, StoreKind::ObjectStore)
    }
}

/// NetStorage runtime configuration
#[derive(Debug, Clone)]
pub struct NetStorageConfig {
    /// Upload/download host, e.g. `example-nsu.akamaihd.net`
    pub host: String,
    /// Account identifier, first segment of every request path
    pub cp_code: String,
    /// Upload account key name
    pub key_name: String,
    /// Shared signing secret (SecretString for memory zeroization)
    pub key: secrecy::SecretString,
    /// Virtual root scoping every operation
    pub path_prefix: Option<String>,
    /// Backend variant
    pub store_kind: StoreKind,
    /// Use https (default) or plain http
    pub use_tls: bool,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl NetStorageConfig {
    /// Base URL of the host (scheme + authority)
    ///
    /// An explicit `http://`/`https://` scheme on `host` wins over `use_tls`.
    /// Anything beyond the authority is rejected.
    pub fn base_url(&self) -> Result<url::Url, ProviderError> {
        let invalid = |reason: &str| ProviderError::InvalidConfig(format!("Invalid host '{}': {}", self.host, reason));

        let host = self.host.trim();
        let (scheme, authority) = if let Some(rest) = host.strip_prefix("https://") {
            ("https", rest)
        } else if let Some(rest) = host.strip_prefix("http://") {
            ("http", rest)
        } else if self.use_tls {
            ("https", host)
        } else {
            ("http", host)
        };

        let authority = authority.trim_end_matches('/');
        if authority.is_empty() {
            return Err(invalid("missing host name"));
        }

        let url = url::Url::parse(&format!("{}://{}", scheme, authority)).map_err(|e| invalid(&e.to_string()))?;
        if url.host_str().map_or(true, str::is_empty) {
            return Err(invalid("missing host name"));
        }
        if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("expected a bare host name"));
        }
        Ok(url)
    }
}

/// Kind of a remote entry as reported by the `type` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Dir,
    Symlink,
}

impl EntryType {
    pub fn from_attr(value: &str) -> Option<Self> {
        match value {
            "file" => Some(EntryType::File),
            "dir" => Some(EntryType::Dir),
            "symlink" => Some(EntryType::Symlink),
            _ => None,
        }
    }

    /// ACS action that removes an entry of this kind
    pub fn delete_action(&self) -> super::ActionName {
        match self {
            EntryType::Dir => super::ActionName::Rmdir,
            EntryType::File | EntryType::Symlink => super::ActionName::Delete,
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryType::File => write!(f, "file"),
            EntryType::Dir => write!(f, "dir"),
            EntryType::Symlink => write!(f, "symlink"),
        }
    }
}

/// Remote file/directory metadata
///
/// Canonical shape of one `<file>` element of a `stat`, `dir` or `list`
/// response. `path` never contains the cp-code / path-prefix root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    /// Path relative to the configured prefix, always starting with `/`
    pub path: String,
    pub name: String,
    /// Modification time, epoch seconds as sent by the server
    pub timestamp: String,
    pub size: Option<String>,
    /// MD5 digest when the backend reports one
    pub checksum: Option<String>,
    pub mimetype: Option<String>,
    /// Always "public": the protocol has no visibility control
    pub visibility: String,
    /// Backend-specific attributes (`bytes`, `files`, `target`, ...)
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl MetadataRecord {
    pub fn is_dir(&self) -> bool {
        self.entry_type == EntryType::Dir
    }

    /// Size in bytes, if the server reported a parseable one
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref().and_then(|s| s.parse().ok())
    }

    /// Number of path segments below the prefix root (`/a/b` is 2)
    pub fn depth(&self) -> usize {
        self.path.split('/').filter(|s| !s.is_empty()).count()
    }
}

/// Result of ensuring a single directory segment exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// `mkdir` succeeded
    Created(String),
    /// Directory appeared concurrently (409) and is treated as ensured
    AlreadyExisted(String),
}

/// Disk usage summary returned by the `du` action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub directory: String,
    pub files: u64,
    pub bytes: u64,
}

/// Provider error type
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Path already exists: {0}")]
    AlreadyExists(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Upstream returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProviderError {
    /// Transport or protocol failure that is not one of the recognized
    /// conditions (not found, exists, not a directory)
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            ProviderError::Upstream { .. }
                | ProviderError::NetworkError(_)
                | ProviderError::ParseError(_)
                | ProviderError::PermissionDenied(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }

    /// Map a non-success ACS status to the error taxonomy
    pub fn from_status(status: http::StatusCode, path: &str, body: &str) -> Self {
        match status.as_u16() {
            404 => ProviderError::NotFound(path.to_string()),
            409 => ProviderError::AlreadyExists(path.to_string()),
            412 => ProviderError::NotADirectory(path.to_string()),
            403 => ProviderError::PermissionDenied(path.to_string()),
            code => ProviderError::Upstream {
                status: code,
                message: sanitize_body(body),
            },
        }
    }
}

/// Trim an error body down to something loggable
fn sanitize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() > 200 {
        let mut end = 200;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &trimmed[..end])
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_kind_parse() {
        assert_eq!(StoreKind::parse("FileStore"), Some(StoreKind::FileStore));
        assert_eq!(StoreKind::parse("object-store"), Some(StoreKind::ObjectStore));
        assert_eq!(StoreKind::parse("ftp"), None);
        assert!(StoreKind::ObjectStore.mkdir_is_idempotent());
        assert!(!StoreKind::FileStore.mkdir_is_idempotent());
    }

    #[test]
    fn test_status_mapping() {
        use http::StatusCode;
        assert!(matches!(ProviderError::from_status(StatusCode::NOT_FOUND, "/a", ""), ProviderError::NotFound(p) if p == "/a"));
        assert!(matches!(ProviderError::from_status(StatusCode::CONFLICT, "/a", ""), ProviderError::AlreadyExists(_)));
        assert!(matches!(ProviderError::from_status(StatusCode::PRECONDITION_FAILED, "/a", ""), ProviderError::NotADirectory(_)));

        let err = ProviderError::from_status(StatusCode::BAD_GATEWAY, "/a", "  upstream down ");
        assert!(err.is_upstream());
        assert_eq!(err.to_string(), "Upstream returned HTTP 502: upstream down");
    }

    #[test]
    fn test_record_depth() {
        let record = MetadataRecord {
            entry_type: EntryType::File,
            path: "/a/b/file.txt".to_string(),
            name: "file.txt".to_string(),
            timestamp: "0".to_string(),
            size: Some("5".to_string()),
            checksum: None,
            mimetype: None,
            visibility: "public".to_string(),
            extra: BTreeMap::new(),
        };
        assert_eq!(record.depth(), 3);
        assert_eq!(record.size_bytes(), Some(5));
        assert_eq!(EntryType::Dir.delete_action(), crate::providers::ActionName::Rmdir);
    }

    #[test]
    fn test_base_url() {
        let config = NetStorageConfig {
            host: "example-nsu.akamaihd.net".to_string(),
            cp_code: "123456".to_string(),
            key_name: "key-name".to_string(),
            key: secrecy::SecretString::from("secret".to_string()),
            path_prefix: None,
            store_kind: StoreKind::ObjectStore,
            use_tls: true,
            timeout_secs: 30,
        };
        assert_eq!(config.base_url().unwrap().as_str(), "https://example-nsu.akamaihd.net/");

        let with = |host: &str, use_tls: bool| NetStorageConfig {
            host: host.to_string(),
            use_tls,
            ..config.clone()
        };
        assert_eq!(
            with("example-nsu.akamaihd.net", false).base_url().unwrap().as_str(),
            "http://example-nsu.akamaihd.net/"
        );
        assert_eq!(
            with("http://example-nsu.akamaihd.net/", true).base_url().unwrap().as_str(),
            "http://example-nsu.akamaihd.net/"
        );
        assert_eq!(with("localhost:8080", false).base_url().unwrap().port(), Some(8080));

        for bad in ["", "/", "http://", "https:///", "example.net/path", "example.net?x=1"] {
            assert!(
                matches!(with(bad, true).base_url(), Err(ProviderError::InvalidConfig(_))),
                "accepted {:?}",
                bad
            );
        }
    }
}
