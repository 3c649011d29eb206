//! Data model shared by the ceremony artifact pipeline and its consumers.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

mod beacon;
mod circuit;
mod codec;
mod error;
mod vkey;

pub use beacon::{
    ceremony_beacon, derive_beacon, Beacon, BEACON_BLOCK_HASHES, BLOCK_HASH_LEN,
};
pub use circuit::{CircuitKey, CATALOG_ENTRY_EXTENSION};
pub use codec::{
    compressed_name, validate_quality, Brotli, Codec, COMPRESSED_EXTENSION,
    DEFAULT_COMPRESSION_QUALITY, MAX_COMPRESSION_QUALITY,
};
pub use error::CeremonyError;
pub use vkey::{VerificationKey, BN128_CURVE, GROTH16_PROTOCOL};

/// Root identifier of the published ceremony output.
pub const CEREMONY_ROOT: &str = "QmWAySHYhaZqioKi1ufrPJC1n1ZVtHP2w4hLA9XqqJCFne";
/// Pin name used for the ceremony root.
pub const CEREMONY_PIN_NAME: &str = "Ceremony Output";
/// Beacon-mixing iteration exponent handed to the finalizer (2^10 rounds).
pub const BEACON_ITERATIONS_EXP: u32 = 10;
/// Contribution name recorded in the finalized proving key.
pub const BEACON_CONTRIBUTION_NAME: &str = "Beacon";

/// Subpath of the ceremony root listing every circuit's constraint system.
pub const CEREMONY_R1CS_DIR: &str = "r1cs";
/// Subpath of the ceremony root holding the contributed proving keys.
pub const CEREMONY_ZKEY_DIR: &str = "zkeys";

pub const ZKEY_FILE: &str = "zkey";
pub const R1CS_FILE: &str = "r1cs";
pub const VKEY_FILE: &str = "vkey.json";
pub const WASM_FILE: &str = "wasm";
pub const NATIVE_WITNESS_FILE: &str = "witness";
pub const DEPLOYMENT_CONFIG_FILE: &str = "deploymentConfig.json";

pub const PACKAGE_MANIFEST_FILE: &str = "artifacts.json";
pub const INTEGRITY_FILE: &str = "integrity.json";
pub const INTEGRITY_VERSION: u32 = 1;

/// Size and blake3 digest of one artifact file, relative to some base directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub path: String,
    pub blake3: String,
    pub size: u64,
}

impl ArtifactFile {
    pub fn from_bytes(path: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            path: path.into(),
            blake3: hash_bytes_hex(bytes),
            size: bytes.len() as u64,
        }
    }

    pub fn resolve_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.path)
    }

    /// Ensure `bytes` are exactly the bytes this record was taken from.
    pub fn verify(&self, bytes: &[u8]) -> Result<(), CeremonyError> {
        if bytes.len() as u64 != self.size {
            return Err(CeremonyError::Integrity(format!(
                "{} size mismatch, recorded {} bytes but found {}",
                self.path,
                self.size,
                bytes.len()
            )));
        }
        let actual = hash_bytes_hex(bytes);
        if actual != self.blake3 {
            return Err(CeremonyError::Integrity(format!(
                "{} hash mismatch, expected {} but computed {}",
                self.path, self.blake3, actual
            )));
        }
        Ok(())
    }

    /// Read the file below `base_dir` and check it against this record.
    pub fn read_verified(&self, base_dir: &Path) -> Result<Vec<u8>, CeremonyError> {
        let path = self.resolve_path(base_dir);
        let bytes = fs::read(&path).map_err(|err| CeremonyError::io(&path, err))?;
        self.verify(&bytes)?;
        Ok(bytes)
    }
}

/// Digests of every file in an assembled package.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityManifest {
    pub integrity_version: u32,
    pub beacon: Beacon,
    pub files: Vec<ArtifactFile>,
}

impl IntegrityManifest {
    pub fn find(&self, path: &str) -> Option<&ArtifactFile> {
        self.files.iter().find(|file| file.path == path)
    }

    pub fn ensure_compatible(&self) -> Result<(), CeremonyError> {
        if self.integrity_version != INTEGRITY_VERSION {
            return Err(CeremonyError::Integrity(format!(
                "unsupported integrity manifest version {}, expected {}",
                self.integrity_version, INTEGRITY_VERSION
            )));
        }
        Ok(())
    }
}

pub fn hash_bytes_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Write `value` as two-space indented JSON.
pub fn write_json(path: impl AsRef<Path>, value: &impl Serialize) -> Result<(), CeremonyError> {
    let json = serde_json::to_vec_pretty(value)?;
    fs::write(path.as_ref(), json).map_err(|err| CeremonyError::io(path.as_ref(), err))
}

pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, CeremonyError> {
    let bytes = fs::read(path.as_ref()).map_err(|err| CeremonyError::io(path.as_ref(), err))?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_file_verifies_its_source() {
        let record = ArtifactFile::from_bytes("1x1/zkey", b"finalized key");
        assert_eq!(record.size, 13);
        record.verify(b"finalized key").unwrap();
        assert!(matches!(
            record.verify(b"finalized kez"),
            Err(CeremonyError::Integrity(_))
        ));
        assert!(matches!(
            record.verify(b"short"),
            Err(CeremonyError::Integrity(_))
        ));
    }

    #[test]
    fn read_verified_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("vkey.json"), b"{}").unwrap();
        let record = ArtifactFile::from_bytes("vkey.json", b"{}");
        assert_eq!(record.read_verified(dir.path()).unwrap(), b"{}");

        fs::write(dir.path().join("vkey.json"), b"[]").unwrap();
        assert!(record.read_verified(dir.path()).is_err());

        let missing = ArtifactFile::from_bytes("absent", b"");
        assert!(matches!(
            missing.read_verified(dir.path()),
            Err(CeremonyError::Io { .. })
        ));
    }

    #[test]
    fn integrity_manifest_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = IntegrityManifest {
            integrity_version: INTEGRITY_VERSION,
            beacon: ceremony_beacon().unwrap(),
            files: vec![ArtifactFile::from_bytes("1x2/zkey.br", b"abc")],
        };
        let path = dir.path().join(INTEGRITY_FILE);
        write_json(&path, &manifest).unwrap();
        let decoded: IntegrityManifest = read_json(&path).unwrap();
        assert_eq!(decoded, manifest);
        decoded.ensure_compatible().unwrap();
        assert!(decoded.find("1x2/zkey.br").is_some());
        assert!(decoded.find("1x2/wasm.br").is_none());
    }
}
