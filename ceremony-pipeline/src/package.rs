//! Distributable package layout.
//!
//! ```text
//! module/
//!   artifacts.json          ordered list of {nullifiers, commitments}
//!   integrity.json          blake3 + size of every packaged file
//!   <n>x<c>/zkey.br
//!   <n>x<c>/wasm.br
//!   <n>x<c>/vkey.json
//! ```
//!
//! Consumers read the tree through `ceremony_artifacts::ArtifactPackage`,
//! which checks every file against `integrity.json` before use:
//!
//! ```no_run
//! use ceremony_artifacts::ArtifactPackage;
//!
//! let package = ArtifactPackage::open("module")?;
//! for circuit in package.list_artifacts() {
//!     let artifact = package.get_artifact(circuit.nullifiers, circuit.commitments)?;
//!     println!("{circuit}: {} zkey bytes", artifact.zkey.len());
//! }
//! # Ok::<(), ceremony_common::CeremonyError>(())
//! ```

use std::path::{Path, PathBuf};

use ceremony_common::{
    compressed_name, write_json, ArtifactFile, Beacon, CeremonyError, CircuitKey,
    IntegrityManifest, INTEGRITY_FILE, INTEGRITY_VERSION, PACKAGE_MANIFEST_FILE, VKEY_FILE,
    WASM_FILE, ZKEY_FILE,
};
use tracing::info;

use crate::transform::FinalizedArtifactSet;

/// Files copied from each circuit's build directory into the package.
pub fn packaged_files() -> [String; 3] {
    [
        compressed_name(ZKEY_FILE),
        compressed_name(WASM_FILE),
        VKEY_FILE.to_string(),
    ]
}

/// Result of a successful assembly.
#[derive(Clone, Debug)]
pub struct AssembledPackage {
    pub dir: PathBuf,
    pub circuits: Vec<CircuitKey>,
    pub integrity: IntegrityManifest,
}

pub struct PackageAssembler {
    module_dir: PathBuf,
}

impl PackageAssembler {
    pub fn new(module_dir: impl Into<PathBuf>) -> Self {
        Self {
            module_dir: module_dir.into(),
        }
    }

    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    /// Lay out every set into the package directory, in the given order.
    ///
    /// Each set must carry its witness generators. Source bytes are checked
    /// against the transformer's records before they are copied.
    pub async fn assemble(
        &self,
        sets: &[FinalizedArtifactSet],
        beacon: &Beacon,
    ) -> Result<AssembledPackage, CeremonyError> {
        if let Some(set) = sets.iter().find(|set| !set.has_witness_generators()) {
            return Err(CeremonyError::InvalidInput(format!(
                "{} was finalized without witness generators and cannot be packaged",
                set.circuit
            )));
        }

        tokio::fs::create_dir_all(&self.module_dir)
            .await
            .map_err(|err| CeremonyError::io(&self.module_dir, err))?;

        let mut integrity_files = Vec::new();
        for set in sets {
            info!("Packaging {}", set.circuit);
            let target = self.module_dir.join(set.circuit.to_string());
            tokio::fs::create_dir_all(&target)
                .await
                .map_err(|err| CeremonyError::io(&target, err))?;

            for name in packaged_files() {
                let record = set.file(&name).ok_or_else(|| {
                    CeremonyError::InvalidInput(format!("{} has no {name}", set.circuit))
                })?;
                let bytes = read_recorded(record, &set.dir).await?;
                let dest = target.join(&name);
                tokio::fs::write(&dest, &bytes)
                    .await
                    .map_err(|err| CeremonyError::io(&dest, err))?;
                integrity_files.push(ArtifactFile::from_bytes(
                    format!("{}/{name}", set.circuit),
                    &bytes,
                ));
            }
        }

        let circuits: Vec<CircuitKey> = sets.iter().map(|set| set.circuit).collect();
        write_json(self.module_dir.join(PACKAGE_MANIFEST_FILE), &circuits)?;

        let integrity = IntegrityManifest {
            integrity_version: INTEGRITY_VERSION,
            beacon: *beacon,
            files: integrity_files,
        };
        write_json(self.module_dir.join(INTEGRITY_FILE), &integrity)?;
        info!(
            "Package written to {} with {} circuits",
            self.module_dir.display(),
            circuits.len()
        );

        Ok(AssembledPackage {
            dir: self.module_dir.clone(),
            circuits,
            integrity,
        })
    }
}

async fn read_recorded(record: &ArtifactFile, base: &Path) -> Result<Vec<u8>, CeremonyError> {
    let path = record.resolve_path(base);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|err| CeremonyError::io(&path, err))?;
    record.verify(&bytes)?;
    Ok(bytes)
}
