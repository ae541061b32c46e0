//! Recursive directory removal
//!
//! NetStorage only removes empty directories, so a tree is taken apart
//! leaf-first. Entries that vanish underneath us (implicit object store
//! directories disappear with their last child) count as removed.

use std::cmp::Reverse;
use tracing::{debug, info};

use super::client::AcsClient;
use super::transport::HttpTransport;
use super::{EntryType, ProviderError, StoreKind};

/// Work item of the file store post-order walk
enum Frame {
    Visit(String),
    Remove(String, EntryType),
}

impl<T: HttpTransport> AcsClient<T> {
    /// Remove an entry, treating "already gone" as done
    async fn remove_if_present(&self, full_path: &str, entry_type: EntryType) -> Result<(), ProviderError> {
        match self.remove_full(full_path, entry_type).await {
            Ok(()) => Ok(()),
            Err(ProviderError::NotFound(path)) => {
                debug!("{} vanished before removal", path);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_object_tree(&self, full_path: &str) -> Result<usize, ProviderError> {
        let mut entries = self.list(full_path, true).await?;
        // stable: siblings keep listing order
        entries.sort_by_key(|record| Reverse(record.depth()));

        for record in &entries {
            self.remove_if_present(&self.prefix.apply(&record.path), record.entry_type)
                .await?;
        }
        self.remove_if_present(full_path, EntryType::Dir).await?;
        Ok(entries.len() + 1)
    }

    async fn delete_file_tree(&self, full_path: &str) -> Result<usize, ProviderError> {
        let mut removed = 0;
        let mut stack = vec![Frame::Visit(full_path.to_string())];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Visit(dir) => {
                    let children = self.dir_level(&dir).await?;
                    stack.push(Frame::Remove(dir, EntryType::Dir));
                    for child in children.into_iter().rev() {
                        let child_full = self.prefix.apply(&child.path);
                        if child.is_dir() {
                            stack.push(Frame::Visit(child_full));
                        } else {
                            stack.push(Frame::Remove(child_full, child.entry_type));
                        }
                    }
                }
                Frame::Remove(path, entry_type) => {
                    self.remove_if_present(&path, entry_type).await?;
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }

    /// Remove a directory and everything below it
    ///
    /// A missing directory is already deleted. The first failing removal
    /// aborts the walk and is returned.
    pub async fn delete_tree(&self, full_path: &str) -> Result<(), ProviderError> {
        let shown = self.display_path(full_path);
        let root = match self.stat_full(full_path).await {
            Ok(record) => record,
            Err(ProviderError::NotFound(_)) => {
                debug!("{} does not exist, nothing to delete", shown);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if !root.is_dir() {
            return Err(ProviderError::NotADirectory(shown));
        }

        let removed = match self.store_kind {
            StoreKind::ObjectStore => self.delete_object_tree(full_path).await?,
            StoreKind::FileStore => self.delete_file_tree(full_path).await?,
        };
        info!("Deleted {} ({} entries)", shown, removed);
        Ok(())
    }
}
