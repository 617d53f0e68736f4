#![doc = "bucket-sync-core: reconciliation engine for one-way directory-to-bucket sync."]

//! This crate holds the storage-agnostic logic of bucket-sync: file entities,
//! local and remote enumeration, the content-hash reconciler and the run
//! orchestration. Concrete storage clients and the CLI live in `bucket-sync`.
//!
//! # Usage
//! Implement [`contract::RemoteStorage`] for a backend, then call
//! [`synchronise::synchronise`] with a [`config::SyncConfig`] and a
//! [`local::DirectoryScanner`].

pub mod config;
pub mod contract;
pub mod error;
pub mod file;
pub mod local;
pub mod reconcile;
pub mod remote;
pub mod retry;
pub mod synchronise;
