//! Runtime accessor for an assembled artifact package.
//!
//! Artifacts are decompressed on first request and kept for the lifetime of
//! the [`ArtifactPackage`]. Packages are immutable once published, so the
//! cache is never invalidated.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use ceremony_common::{
    compressed_name, read_json, Brotli, CeremonyError, CircuitKey, Codec, IntegrityManifest,
    VerificationKey, INTEGRITY_FILE, PACKAGE_MANIFEST_FILE, VKEY_FILE, WASM_FILE, ZKEY_FILE,
};
use once_cell::sync::OnceCell;
use tracing::debug;

/// Decompressed artifacts for one circuit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub zkey: Vec<u8>,
    pub wasm: Vec<u8>,
    pub vkey: VerificationKey,
}

type Slot<T> = Arc<OnceCell<Arc<T>>>;

pub struct ArtifactPackage {
    dir: PathBuf,
    circuits: Vec<CircuitKey>,
    integrity: IntegrityManifest,
    codec: Box<dyn Codec>,
    artifacts: Mutex<HashMap<CircuitKey, Slot<Artifact>>>,
    vkeys: Mutex<HashMap<CircuitKey, Slot<VerificationKey>>>,
}

impl ArtifactPackage {
    /// Open the package rooted at `dir` (the directory holding
    /// `artifacts.json` and `integrity.json`).
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CeremonyError> {
        let dir = dir.into();
        let circuits: Vec<CircuitKey> = read_json(dir.join(PACKAGE_MANIFEST_FILE))?;
        let integrity: IntegrityManifest = read_json(dir.join(INTEGRITY_FILE))?;
        integrity.ensure_compatible()?;
        debug!("Opened package at {} with {} circuits", dir.display(), circuits.len());
        Ok(Self {
            dir,
            circuits,
            integrity,
            codec: Box::new(Brotli),
            artifacts: Mutex::new(HashMap::new()),
            vkeys: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn integrity(&self) -> &IntegrityManifest {
        &self.integrity
    }

    /// Every circuit the package carries, in manifest order.
    pub fn list_artifacts(&self) -> &[CircuitKey] {
        &self.circuits
    }

    /// Decompressed proving key, witness generator and verification key.
    ///
    /// Concurrent first calls for the same circuit load it once.
    pub fn get_artifact(
        &self,
        nullifiers: u32,
        commitments: u32,
    ) -> Result<Arc<Artifact>, CeremonyError> {
        let circuit = self.known(nullifiers, commitments)?;
        let slot = slot(&self.artifacts, circuit);
        slot.get_or_try_init(|| self.load_artifact(&circuit).map(Arc::new))
            .map(Arc::clone)
    }

    /// Verification key alone, without decompressing anything.
    pub fn get_vkey(
        &self,
        nullifiers: u32,
        commitments: u32,
    ) -> Result<Arc<VerificationKey>, CeremonyError> {
        let circuit = self.known(nullifiers, commitments)?;
        if let Some(artifact) = slot(&self.artifacts, circuit).get() {
            return Ok(Arc::new(artifact.vkey.clone()));
        }
        let slot = slot(&self.vkeys, circuit);
        slot.get_or_try_init(|| self.load_vkey(&circuit).map(Arc::new))
            .map(Arc::clone)
    }

    pub fn is_loaded(&self, nullifiers: u32, commitments: u32) -> bool {
        let circuit = CircuitKey::new(nullifiers, commitments);
        lock(&self.artifacts)
            .get(&circuit)
            .is_some_and(|slot| slot.get().is_some())
    }

    fn known(&self, nullifiers: u32, commitments: u32) -> Result<CircuitKey, CeremonyError> {
        let circuit = CircuitKey::new(nullifiers, commitments);
        if self.circuits.contains(&circuit) {
            Ok(circuit)
        } else {
            Err(CeremonyError::UnknownCircuit(circuit))
        }
    }

    fn load_artifact(&self, circuit: &CircuitKey) -> Result<Artifact, CeremonyError> {
        debug!("Loading artifacts for {circuit}");
        let zkey = self.codec.decompress(&self.read(circuit, &compressed_name(ZKEY_FILE))?)?;
        let wasm = self.codec.decompress(&self.read(circuit, &compressed_name(WASM_FILE))?)?;
        let vkey = self.load_vkey(circuit)?;
        Ok(Artifact { zkey, wasm, vkey })
    }

    fn load_vkey(&self, circuit: &CircuitKey) -> Result<VerificationKey, CeremonyError> {
        let vkey = VerificationKey::from_json_bytes(&self.read(circuit, VKEY_FILE)?)?;
        vkey.validate()?;
        Ok(vkey)
    }

    /// Read a packaged file, checked against `integrity.json`.
    fn read(&self, circuit: &CircuitKey, name: &str) -> Result<Vec<u8>, CeremonyError> {
        let path = format!("{circuit}/{name}");
        let record = self.integrity.find(&path).ok_or_else(|| {
            CeremonyError::Integrity(format!("{path} is not listed in {INTEGRITY_FILE}"))
        })?;
        record.read_verified(&self.dir)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn slot<T>(slots: &Mutex<HashMap<CircuitKey, Slot<T>>>, circuit: CircuitKey) -> Slot<T> {
    Arc::clone(lock(slots).entry(circuit).or_default())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use ceremony_common::{
        ceremony_beacon, write_json, ArtifactFile, BN128_CURVE, GROTH16_PROTOCOL,
        INTEGRITY_VERSION,
    };

    use super::*;

    fn vkey(n_public: u32) -> VerificationKey {
        let g2 = vec![
            vec!["1".to_string(), "2".to_string()],
            vec!["3".to_string(), "4".to_string()],
            vec!["1".to_string(), "0".to_string()],
        ];
        VerificationKey {
            protocol: GROTH16_PROTOCOL.into(),
            curve: BN128_CURVE.into(),
            n_public,
            vk_alpha_1: vec!["5".into(), "6".into(), "1".into()],
            vk_beta_2: g2.clone(),
            vk_gamma_2: g2.clone(),
            vk_delta_2: g2,
            vk_alphabeta_12: Vec::new(),
            ic: vec![vec!["7".into(), "8".into(), "1".into()]; n_public as usize + 1],
        }
    }

    fn write_package(dir: &Path, circuits: &[CircuitKey]) {
        let mut files = Vec::new();
        for circuit in circuits {
            fs::create_dir_all(dir.join(circuit.to_string())).unwrap();
            let contents = [
                (
                    compressed_name(ZKEY_FILE),
                    Brotli.compress(format!("zkey {circuit}").as_bytes(), 5).unwrap(),
                ),
                (
                    compressed_name(WASM_FILE),
                    Brotli.compress(format!("wasm {circuit}").as_bytes(), 5).unwrap(),
                ),
                (
                    VKEY_FILE.to_string(),
                    vkey(circuit.nullifiers + circuit.commitments)
                        .to_canonical_json()
                        .unwrap(),
                ),
            ];
            for (name, bytes) in contents {
                let path = format!("{circuit}/{name}");
                fs::write(dir.join(&path), &bytes).unwrap();
                files.push(ArtifactFile::from_bytes(path, &bytes));
            }
        }
        write_json(dir.join(PACKAGE_MANIFEST_FILE), &circuits).unwrap();
        write_json(
            dir.join(INTEGRITY_FILE),
            &IntegrityManifest {
                integrity_version: INTEGRITY_VERSION,
                beacon: ceremony_beacon().unwrap(),
                files,
            },
        )
        .unwrap();
    }

    #[test]
    fn loads_and_memoizes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), &[CircuitKey::new(1, 1), CircuitKey::new(2, 3)]);
        let package = ArtifactPackage::open(dir.path()).unwrap();

        assert_eq!(
            package.list_artifacts(),
            &[CircuitKey::new(1, 1), CircuitKey::new(2, 3)]
        );
        assert!(!package.is_loaded(2, 3));

        let first = package.get_artifact(2, 3).unwrap();
        assert_eq!(first.zkey, b"zkey 2x3");
        assert_eq!(first.wasm, b"wasm 2x3");
        assert_eq!(first.vkey.ic.len(), 6);
        assert!(package.is_loaded(2, 3));
        assert!(!package.is_loaded(1, 1));

        // Once cached, files on disk are no longer consulted.
        fs::remove_dir_all(dir.path().join("2x3")).unwrap();
        let second = package.get_artifact(2, 3).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(package.get_vkey(2, 3).unwrap().n_public, 5);
    }

    #[test]
    fn vkey_loads_without_decompressing() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), &[CircuitKey::new(1, 2)]);
        fs::write(dir.path().join("1x2").join("zkey.br"), b"garbage").unwrap();
        let package = ArtifactPackage::open(dir.path()).unwrap();

        let vkey = package.get_vkey(1, 2).unwrap();
        assert_eq!(vkey.n_public, 3);
        assert!(!package.is_loaded(1, 2));
        assert!(matches!(
            package.get_artifact(1, 2),
            Err(CeremonyError::Integrity(_))
        ));
    }

    #[test]
    fn unknown_circuit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), &[CircuitKey::new(1, 1)]);
        let package = ArtifactPackage::open(dir.path()).unwrap();
        assert!(matches!(
            package.get_artifact(4, 4),
            Err(CeremonyError::UnknownCircuit(key)) if key == CircuitKey::new(4, 4)
        ));
        assert!(package.get_vkey(4, 4).is_err());
    }

    #[test]
    fn failed_load_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), &[CircuitKey::new(1, 1)]);
        let wasm = dir.path().join("1x1").join("wasm.br");
        let original = fs::read(&wasm).unwrap();
        fs::remove_file(&wasm).unwrap();
        let package = ArtifactPackage::open(dir.path()).unwrap();

        assert!(package.get_artifact(1, 1).is_err());
        fs::write(&wasm, original).unwrap();
        assert_eq!(package.get_artifact(1, 1).unwrap().wasm, b"wasm 1x1");
    }

    #[test]
    fn rejects_unsupported_integrity_version() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), &[CircuitKey::new(1, 1)]);
        let path = dir.path().join(INTEGRITY_FILE);
        let mut integrity: IntegrityManifest = read_json(&path).unwrap();
        integrity.integrity_version = INTEGRITY_VERSION + 1;
        write_json(&path, &integrity).unwrap();
        assert!(matches!(
            ArtifactPackage::open(dir.path()),
            Err(CeremonyError::Integrity(_))
        ));
    }
}
