// NetStorage - ACS storage client
// Signed action-header protocol over HTTP with a filesystem-style facade

pub mod config;
pub mod providers;

pub use config::NetStorageSettings;
pub use providers::{
    DiskUsage, EntryType, MetadataRecord, NetStorageConfig, NetStorageProvider, ProviderError, ProviderFactory,
    StorageProvider, StoreKind,
};
