//! Artifact pipeline for the trusted-setup ceremony.
//!
//! A run derives the public beacon, discovers circuits under the ceremony
//! root, finalizes each proving key with the beacon, publishes the resulting
//! artifact directories to a content-addressed store, writes the verifier
//! deployment descriptor and, when native-compiler output is present,
//! assembles the distributable package.

pub mod catalog;
pub mod config;
pub mod deployment;
pub mod driver;
pub mod finalizer;
pub mod layout;
pub mod package;
pub mod publish;
pub mod store;
pub mod transform;

pub use catalog::discover_circuits;
pub use config::{PipelineConfig, DEFAULT_IPFS_API};
pub use deployment::{
    build_descriptor, swap_fq2, write_deployment_config, ContractVKey, DeploymentEntry, G1Point,
    G2Point,
};
pub use driver::{BuildMode, Pipeline, PipelineError, PipelineOptions, PipelineOutcome, Stage};
pub use finalizer::{SetupFinalizer, SnarkjsFinalizer, DEFAULT_SNARKJS_BIN};
pub use layout::BuildLayout;
pub use package::{AssembledPackage, PackageAssembler};
pub use publish::{BundleFile, CircuitBundle, ContentPublisher, PublishedId};
pub use store::{AddOptions, AddedEntry, ContentStore, KuboClient, Mtime, StoreEntry, StoreFile};
pub use transform::{ArtifactTransformer, FinalizedArtifactSet, WitnessSources};
