//! Directory listing for both backend variants
//!
//! Object stores answer `list` with a flat, deep, cursor-paginated page
//! sequence; directories are mostly implicit and have to be synthesized from
//! the entry paths. File stores answer `dir` with exactly one level per
//! request.

use std::collections::HashSet;
use tracing::debug;

use super::action::{ActionDirective, ActionName};
use super::client::AcsClient;
use super::metadata;
use super::paths;
use super::transport::HttpTransport;
use super::{MetadataRecord, ProviderError, StoreKind};

/// Body sent instead of XML when listing a path that is no longer a directory
const DELETED_SENTINEL: &str = "deleted";

/// Cursor-driven pager over the object store `list` action
///
/// A failed page leaves the cursor untouched, so calling `next_page` again
/// retries the same page.
pub struct ObjectListing<'a, T> {
    client: &'a AcsClient<T>,
    full_dir: String,
    cursor: Option<String>,
    finished: bool,
    pages: usize,
}

impl<'a, T: HttpTransport> ObjectListing<'a, T> {
    pub fn new(client: &'a AcsClient<T>, full_dir: &str) -> Self {
        Self {
            client,
            full_dir: full_dir.to_string(),
            cursor: None,
            finished: false,
            pages: 0,
        }
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    fn directive(&self) -> ActionDirective {
        let directive = ActionDirective::new(ActionName::List).param("encoding", "utf-8");
        match &self.cursor {
            Some(start) => directive.param("start", start),
            None => directive,
        }
    }

    /// Fetch the next page, `None` once the listing is exhausted
    pub async fn next_page(&mut self) -> Result<Option<Vec<MetadataRecord>>, ProviderError> {
        if self.finished {
            return Ok(None);
        }
        if self.client.cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        let shown = self.client.display_path(&self.full_dir);
        let body = self.client.fetch_text(&self.full_dir, &self.directive()).await?;
        if body.trim() == DELETED_SENTINEL {
            return Err(ProviderError::NotADirectory(shown));
        }

        let page = metadata::parse_listing(&body)?;
        let records = page
            .files
            .iter()
            .map(|node| metadata::normalize(&page.directory, Some(node), &self.client.prefix))
            .collect::<Vec<_>>();

        match page.resume {
            Some(next) if self.cursor.as_deref() == Some(next.as_str()) => {
                return Err(ProviderError::ParseError(format!(
                    "Listing cursor for {} did not advance past '{}'",
                    shown, next
                )));
            }
            Some(next) => self.cursor = Some(next),
            None => self.finished = true,
        }
        self.pages += 1;

        debug!(
            "list {} page {}: {} entries{}",
            shown,
            self.pages,
            records.len(),
            if self.finished { "" } else { ", more follow" }
        );

        Ok(Some(records))
    }

    /// Drain every remaining page, preserving server order
    pub async fn collect_all(mut self) -> Result<Vec<MetadataRecord>, ProviderError> {
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await? {
            all.extend(page);
        }
        Ok(all)
    }
}

/// Turn a flat, deep object listing into directory-shaped output
///
/// Intermediate directories that only exist implicitly are inserted right
/// before the first entry below them. Without `recursive` only direct
/// children of `dir` survive.
pub fn shape_object_listing(
    dir: &str,
    records: Vec<MetadataRecord>,
    recursive: bool,
    prefix: &paths::PathPrefix,
) -> Vec<MetadataRecord> {
    let base = dir.trim_end_matches('/');
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(records.len());

    for record in records {
        let Some(relative) = record
            .path
            .strip_prefix(base)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty())
        else {
            continue;
        };

        let segments: Vec<&str> = relative.trim_end_matches('/').split('/').collect();
        let implied = if recursive { segments.len() - 1 } else { segments.len().min(2) - 1 };

        let mut current = base.to_string();
        for segment in &segments[..implied] {
            current = paths::join(&current, segment);
            if seen.insert(current.clone()) {
                out.push(metadata::normalize(&prefix.apply(&current), None, prefix));
            }
        }

        if recursive || segments.len() == 1 {
            if seen.insert(record.path.clone()) {
                out.push(record);
            } else if let Some(existing) = out.iter_mut().find(|r| r.path == record.path) {
                // explicit entry wins over a synthesized one
                *existing = record;
            }
        }
    }

    out
}

impl<T: HttpTransport> AcsClient<T> {
    /// One `dir` level of a file store directory
    pub(super) async fn dir_level(&self, full_dir: &str) -> Result<Vec<MetadataRecord>, ProviderError> {
        let directive = ActionDirective::new(ActionName::Dir);
        let body = self.fetch_text(full_dir, &directive).await?;
        if body.trim() == DELETED_SENTINEL {
            return Err(ProviderError::NotADirectory(self.display_path(full_dir)));
        }

        let page = metadata::parse_listing(&body)?;
        let directory = if page.directory.is_empty() {
            full_dir.trim_end_matches('/').to_string()
        } else {
            page.directory
        };

        Ok(page
            .files
            .iter()
            .map(|node| metadata::normalize(&directory, Some(node), &self.prefix))
            .collect())
    }

    /// Pre-order walk with an explicit stack, so tree depth never grows
    /// the call stack
    async fn list_file_store(&self, full_dir: &str, recursive: bool) -> Result<Vec<MetadataRecord>, ProviderError> {
        let mut out = Vec::new();
        let mut stack = vec![full_dir.to_string()];

        while let Some(dir) = stack.pop() {
            let level = self.dir_level(&dir).await?;
            let mut subdirs = Vec::new();
            for record in level {
                if recursive && record.is_dir() {
                    subdirs.push(self.prefix.apply(&record.path));
                }
                out.push(record);
            }
            stack.extend(subdirs.into_iter().rev());
        }

        Ok(out)
    }

    async fn list_object_store(&self, full_dir: &str, recursive: bool) -> Result<Vec<MetadataRecord>, ProviderError> {
        let records = ObjectListing::new(self, full_dir).collect_all().await?;
        Ok(shape_object_listing(
            &self.display_path(full_dir),
            records,
            recursive,
            &self.prefix,
        ))
    }

    /// List a directory given its full path
    pub async fn list(&self, full_dir: &str, recursive: bool) -> Result<Vec<MetadataRecord>, ProviderError> {
        match self.store_kind {
            StoreKind::ObjectStore => self.list_object_store(full_dir, recursive).await,
            StoreKind::FileStore => self.list_file_store(full_dir, recursive).await,
        }
    }
}
