//! Content-addressed store seam.
//!
//! The pipeline reads the ceremony output through `ls`/`cat` and publishes
//! finalized artifacts through `add_all`/`pin`. `KuboClient` talks to a Kubo
//! RPC endpoint; tests substitute an in-memory store.

mod kubo;

pub use kubo::KuboClient;

use async_trait::async_trait;
use bytes::Bytes;
use ceremony_common::CeremonyError;

/// Modification time attached to published files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Mtime {
    pub secs: i64,
    pub nsecs: u32,
}

impl Mtime {
    /// Unix epoch. Published content always carries this mtime so identifiers
    /// never depend on when the pipeline ran.
    pub const EPOCH: Mtime = Mtime { secs: 0, nsecs: 0 };
}

/// Child entry returned by `ls`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreEntry {
    pub name: String,
    pub cid: String,
    pub size: u64,
}

/// One file handed to `add_all`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreFile {
    pub path: String,
    pub content: Bytes,
    pub mtime: Mtime,
}

/// One entry reported back by `add_all`. The wrapping directory, when
/// requested, is reported last with an empty path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddedEntry {
    pub path: String,
    pub cid: String,
    pub size: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddOptions {
    pub wrap_with_directory: bool,
}

/// Trait for content-addressed stores.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// List the children of `path`.
    async fn ls(&self, path: &str) -> Result<Vec<StoreEntry>, CeremonyError>;

    /// Fetch the full content at `path`.
    async fn cat(&self, path: &str) -> Result<Vec<u8>, CeremonyError>;

    /// Add files, returning one entry per added node in store order.
    async fn add_all(
        &self,
        files: Vec<StoreFile>,
        options: AddOptions,
    ) -> Result<Vec<AddedEntry>, CeremonyError>;

    /// Pin `cid` under a human-readable name.
    async fn pin(&self, cid: &str, name: &str) -> Result<(), CeremonyError>;
}
