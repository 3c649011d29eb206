//! Per-circuit finalization: beacon application, verification key export and
//! compressed companions.

use std::{path::PathBuf, sync::Arc};

use ceremony_common::{
    compressed_name, ArtifactFile, Beacon, CeremonyError, CircuitKey, Codec, VerificationKey,
    BEACON_ITERATIONS_EXP, CEREMONY_R1CS_DIR, CEREMONY_ZKEY_DIR, NATIVE_WITNESS_FILE, R1CS_FILE,
    VKEY_FILE, WASM_FILE, ZKEY_FILE,
};
use tracing::info;

use crate::{finalizer::SetupFinalizer, layout::BuildLayout, store::ContentStore};

/// Native-compiler outputs for one circuit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WitnessSources {
    /// Managed-runtime (wasm) witness generator.
    pub wasm: PathBuf,
    /// Natively compiled witness generator.
    pub native: PathBuf,
}

/// Everything the transformer persisted for one circuit.
///
/// `files` lists every file below `dir` in publish order, each with the
/// digest of the bytes that were written.
#[derive(Clone, Debug)]
pub struct FinalizedArtifactSet {
    pub circuit: CircuitKey,
    pub dir: PathBuf,
    pub verification_key: VerificationKey,
    pub files: Vec<ArtifactFile>,
}

impl FinalizedArtifactSet {
    pub fn file(&self, name: &str) -> Option<&ArtifactFile> {
        self.files.iter().find(|file| file.path == name)
    }

    pub fn has_witness_generators(&self) -> bool {
        self.file(WASM_FILE).is_some() && self.file(NATIVE_WITNESS_FILE).is_some()
    }
}

pub struct ArtifactTransformer {
    store: Arc<dyn ContentStore>,
    finalizer: Arc<dyn SetupFinalizer>,
    codec: Arc<dyn Codec>,
    layout: BuildLayout,
    root: String,
    quality: u32,
}

impl ArtifactTransformer {
    pub fn new(
        store: Arc<dyn ContentStore>,
        finalizer: Arc<dyn SetupFinalizer>,
        codec: Arc<dyn Codec>,
        layout: BuildLayout,
        root: impl Into<String>,
        quality: u32,
    ) -> Self {
        Self {
            store,
            finalizer,
            codec,
            layout,
            root: root.into(),
            quality,
        }
    }

    /// Finalize one circuit into its build directory.
    ///
    /// Writes only to local build storage. The beacon step runs to completion
    /// or fails as a whole; nothing here is resumable.
    pub async fn transform(
        &self,
        circuit: CircuitKey,
        beacon: &Beacon,
        witness: Option<&WitnessSources>,
    ) -> Result<FinalizedArtifactSet, CeremonyError> {
        let dir = self.layout.circuit_dir(&circuit);
        info!("Creating directory for {circuit}");
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|err| CeremonyError::io(&dir, err))?;

        let mut files = Vec::new();

        info!("Applying beacon to {circuit}");
        let raw_zkey = self
            .store
            .cat(&format!("{}/{CEREMONY_ZKEY_DIR}/{circuit}.zkey", self.root))
            .await?;
        let zkey = self
            .finalizer
            .apply_beacon(&raw_zkey, beacon, BEACON_ITERATIONS_EXP)
            .await?;
        drop(raw_zkey);

        info!("Copying r1cs for {circuit}");
        let r1cs = self
            .store
            .cat(&format!("{}/{CEREMONY_R1CS_DIR}/{circuit}.r1cs", self.root))
            .await?;

        info!("Compressing artifacts for {circuit}");
        self.persist_with_compressed(&circuit, ZKEY_FILE, zkey, &mut files)
            .await?;
        self.persist_with_compressed(&circuit, R1CS_FILE, r1cs, &mut files)
            .await?;

        info!("Exporting vkey for {circuit}");
        let zkey_path = self.layout.circuit_file(&circuit, ZKEY_FILE);
        let verification_key = self.finalizer.export_verification_key(&zkey_path).await?;
        verification_key.validate()?;
        self.persist(
            &circuit,
            VKEY_FILE,
            &verification_key.to_canonical_json()?,
            &mut files,
        )
        .await?;

        if let Some(sources) = witness {
            info!("Compressing witness generators for {circuit}");
            let wasm = tokio::fs::read(&sources.wasm)
                .await
                .map_err(|err| CeremonyError::io(&sources.wasm, err))?;
            self.persist_with_compressed(&circuit, WASM_FILE, wasm, &mut files)
                .await?;
            let native = tokio::fs::read(&sources.native)
                .await
                .map_err(|err| CeremonyError::io(&sources.native, err))?;
            self.persist_with_compressed(&circuit, NATIVE_WITNESS_FILE, native, &mut files)
                .await?;
        }

        Ok(FinalizedArtifactSet {
            circuit,
            dir,
            verification_key,
            files,
        })
    }

    async fn persist(
        &self,
        circuit: &CircuitKey,
        name: &str,
        bytes: &[u8],
        files: &mut Vec<ArtifactFile>,
    ) -> Result<(), CeremonyError> {
        let path = self.layout.circuit_file(circuit, name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|err| CeremonyError::io(&path, err))?;
        files.push(ArtifactFile::from_bytes(name, bytes));
        Ok(())
    }

    async fn persist_with_compressed(
        &self,
        circuit: &CircuitKey,
        name: &str,
        bytes: Vec<u8>,
        files: &mut Vec<ArtifactFile>,
    ) -> Result<(), CeremonyError> {
        self.persist(circuit, name, &bytes, files).await?;
        let compressed = self.compress(bytes).await?;
        self.persist(circuit, &compressed_name(name), &compressed, files)
            .await
    }

    async fn compress(&self, data: Vec<u8>) -> Result<Vec<u8>, CeremonyError> {
        let codec = Arc::clone(&self.codec);
        let quality = self.quality;
        tokio::task::spawn_blocking(move || codec.compress_verified(&data, quality))
            .await
            .map_err(|err| CeremonyError::Compression(format!("compression task failed: {err}")))?
    }
}
