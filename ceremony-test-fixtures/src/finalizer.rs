//! Deterministic stand-in for the snarkjs finalizer.
//!
//! Raw fixture keys look like `zkey <nPublic> <label>`. Applying the beacon
//! appends a line naming the beacon and iteration exponent; exporting reads a
//! finalized key back and derives a verification key from its digest.

use std::{
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use ceremony_common::{
    Beacon, CeremonyError, VerificationKey, BN128_CURVE, GROTH16_PROTOCOL,
};
use ceremony_pipeline::SetupFinalizer;

pub const RAW_KEY_MAGIC: &str = "zkey";
const BEACON_MARKER: &str = "beacon=";
/// Raw keys containing this marker are rejected by `apply_beacon`.
pub const CORRUPT_MARKER: &str = "corrupt";

#[derive(Debug, Default)]
pub struct StubFinalizer {
    beacon_calls: AtomicUsize,
    export_calls: AtomicUsize,
}

impl StubFinalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beacon_calls(&self) -> usize {
        self.beacon_calls.load(Ordering::SeqCst)
    }

    pub fn export_calls(&self) -> usize {
        self.export_calls.load(Ordering::SeqCst)
    }
}

/// Raw fixture key for a circuit with `n_public` public inputs.
pub fn raw_key(n_public: u32, label: &str) -> String {
    format!("{RAW_KEY_MAGIC} {n_public} {label}")
}

#[async_trait]
impl SetupFinalizer for StubFinalizer {
    async fn apply_beacon(
        &self,
        raw_key: &[u8],
        beacon: &Beacon,
        iterations_exp: u32,
    ) -> Result<Vec<u8>, CeremonyError> {
        self.beacon_calls.fetch_add(1, Ordering::SeqCst);
        let text = std::str::from_utf8(raw_key)
            .map_err(|_| CeremonyError::Finalize("raw key is not a fixture key".into()))?;
        if text.contains(CORRUPT_MARKER) {
            return Err(CeremonyError::Finalize("invalid zkey header".into()));
        }
        parse_header(text)?;
        Ok(format!("{text}\n{BEACON_MARKER}{} iterations={iterations_exp}", beacon.to_hex()).into_bytes())
    }

    async fn export_verification_key(
        &self,
        finalized_key: &Path,
    ) -> Result<VerificationKey, CeremonyError> {
        self.export_calls.fetch_add(1, Ordering::SeqCst);
        let bytes = tokio::fs::read(finalized_key)
            .await
            .map_err(|err| CeremonyError::io(finalized_key, err))?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| CeremonyError::Finalize("finalized key is not a fixture key".into()))?;
        if !text.contains(BEACON_MARKER) {
            return Err(CeremonyError::Finalize("key has no beacon contribution".into()));
        }
        let n_public = parse_header(text)?;
        Ok(derive_vkey(n_public, &bytes))
    }
}

fn parse_header(text: &str) -> Result<u32, CeremonyError> {
    let mut words = text.split_whitespace();
    match (words.next(), words.next().map(str::parse::<u32>)) {
        (Some(RAW_KEY_MAGIC), Some(Ok(n_public))) => Ok(n_public),
        _ => Err(CeremonyError::Finalize("invalid zkey header".into())),
    }
}

/// Verification key whose field elements are decimal digests of `seed`.
pub fn derive_vkey(n_public: u32, seed: &[u8]) -> VerificationKey {
    let element = |label: &str| -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(seed);
        hasher.update(label.as_bytes());
        let digest = hasher.finalize();
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_le_bytes(word).to_string()
    };
    let g1 = |label: &str| vec![element(&format!("{label}.x")), element(&format!("{label}.y")), "1".to_string()];
    let g2 = |label: &str| {
        vec![
            vec![element(&format!("{label}.x.c0")), element(&format!("{label}.x.c1"))],
            vec![element(&format!("{label}.y.c0")), element(&format!("{label}.y.c1"))],
            vec!["1".to_string(), "0".to_string()],
        ]
    };

    VerificationKey {
        protocol: GROTH16_PROTOCOL.to_string(),
        curve: BN128_CURVE.to_string(),
        n_public,
        vk_alpha_1: g1("alpha"),
        vk_beta_2: g2("beta"),
        vk_gamma_2: g2("gamma"),
        vk_delta_2: g2("delta"),
        vk_alphabeta_12: (0..2)
            .map(|i| {
                (0..3)
                    .map(|j| {
                        vec![
                            element(&format!("ab.{i}.{j}.c0")),
                            element(&format!("ab.{i}.{j}.c1")),
                        ]
                    })
                    .collect()
            })
            .collect(),
        ic: (0..=n_public).map(|i| g1(&format!("ic{i}"))).collect(),
    }
}
