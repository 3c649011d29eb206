//! Publishing finalized artifacts into the content-addressed store.

use std::{fmt, sync::Arc};

use bytes::Bytes;
use ceremony_common::{CeremonyError, CircuitKey};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    store::{AddOptions, ContentStore, Mtime, StoreFile},
    transform::FinalizedArtifactSet,
};

/// Identifier the store assigned to a published directory.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublishedId(pub String);

impl PublishedId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublishedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// File inside a circuit bundle, path relative to the circuit directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleFile {
    pub path: String,
    pub content: Bytes,
}

/// The published form of one circuit's artifact directory.
#[derive(Clone, Debug)]
pub struct CircuitBundle {
    pub circuit: CircuitKey,
    pub files: Vec<BundleFile>,
}

impl CircuitBundle {
    /// Read every file of `set` back from build storage, refusing bytes that
    /// differ from what the transformer recorded.
    pub async fn load(set: &FinalizedArtifactSet) -> Result<Self, CeremonyError> {
        let mut files = Vec::with_capacity(set.files.len());
        for record in &set.files {
            let path = record.resolve_path(&set.dir);
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|err| CeremonyError::io(&path, err))?;
            record.verify(&bytes)?;
            files.push(BundleFile {
                path: record.path.clone(),
                content: Bytes::from(bytes),
            });
        }
        Ok(Self {
            circuit: set.circuit,
            files,
        })
    }

    fn store_files(&self, prefixed: bool) -> Vec<StoreFile> {
        self.files
            .iter()
            .map(|file| StoreFile {
                path: if prefixed {
                    format!("{}/{}", self.circuit, file.path)
                } else {
                    file.path.clone()
                },
                content: file.content.clone(),
                mtime: Mtime::EPOCH,
            })
            .collect()
    }
}

pub struct ContentPublisher {
    store: Arc<dyn ContentStore>,
}

impl ContentPublisher {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Publish one circuit's directory and return its identifier.
    pub async fn publish(&self, bundle: &CircuitBundle) -> Result<PublishedId, CeremonyError> {
        info!("Adding {} to IPFS", bundle.circuit);
        let id = self.add_wrapped(bundle.store_files(false)).await?;
        info!("{}: {id}", bundle.circuit);
        Ok(id)
    }

    /// Publish every circuit's files as one directory keyed by circuit name.
    ///
    /// Files are read back from the build tree and checked against their
    /// records.
    pub async fn publish_aggregate(
        &self,
        sets: &[FinalizedArtifactSet],
    ) -> Result<PublishedId, CeremonyError> {
        info!("Adding parent folder to IPFS");
        let mut files = Vec::new();
        for set in sets {
            files.extend(CircuitBundle::load(set).await?.store_files(true));
        }
        let id = self.add_wrapped(files).await?;
        info!("Parent Folder: {id} (pin this)");
        Ok(id)
    }

    pub async fn pin(&self, id: &PublishedId, name: &str) -> Result<(), CeremonyError> {
        info!("Pinning {id} as '{name}'");
        self.store.pin(id.as_str(), name).await
    }

    async fn add_wrapped(&self, files: Vec<StoreFile>) -> Result<PublishedId, CeremonyError> {
        if files.is_empty() {
            return Err(CeremonyError::Publish("refusing to publish an empty bundle".into()));
        }
        let entries = self
            .store
            .add_all(
                files,
                AddOptions {
                    wrap_with_directory: true,
                },
            )
            .await?;
        entries
            .last()
            .map(|entry| PublishedId(entry.cid.clone()))
            .ok_or_else(|| CeremonyError::Publish("store returned no entries".into()))
    }
}
