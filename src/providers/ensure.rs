//! Parent directory creation before writes
//!
//! Walks up from the target until the prefix root, an empty parent or an
//! existing directory, then creates the missing ancestors root-to-leaf.
//! A 409 from `mkdir` means someone else created the segment first; that
//! counts as ensured.

use tracing::{info, warn};

use super::client::AcsClient;
use super::paths;
use super::transport::HttpTransport;
use super::{EnsureOutcome, ProviderError};

impl<T: HttpTransport> AcsClient<T> {
    /// Ancestors of `full_path` that do not exist yet, deepest first
    async fn missing_ancestors(&self, full_path: &str) -> Result<Vec<String>, ProviderError> {
        let root = self.prefix.root();
        let root_bare = root.trim_end_matches('/');
        let mut missing = Vec::new();
        let mut current = full_path.to_string();

        while let Some(parent) = paths::parent(&current) {
            let parent = parent.to_string();
            if format!("{}/", parent) == root
                || paths::is_effectively_empty(&parent)
                || !parent.starts_with(root_bare)
                || paths::is_effectively_empty(&self.prefix.strip(&parent))
            {
                break;
            }
            if self.exists_full(&parent).await? {
                break;
            }
            missing.push(parent.clone());
            current = parent;
        }

        Ok(missing)
    }

    /// Make sure every parent directory of `full_path` exists
    pub async fn ensure_path(&self, full_path: &str) -> Result<Vec<EnsureOutcome>, ProviderError> {
        let missing = self.missing_ancestors(full_path).await?;
        let mut outcomes = Vec::with_capacity(missing.len());

        for segment in missing.iter().rev() {
            let outcome = self.mkdir_full(segment).await?;
            match &outcome {
                EnsureOutcome::Created(path) => info!("Created directory {}", path),
                EnsureOutcome::AlreadyExisted(path) => {
                    warn!("Directory {} appeared concurrently, continuing", path)
                }
            }
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }
}
