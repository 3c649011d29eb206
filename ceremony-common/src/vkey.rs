//! Groth16 verification key document in the snarkjs JSON layout.

use serde::{Deserialize, Serialize};

use crate::CeremonyError;

pub const GROTH16_PROTOCOL: &str = "groth16";
pub const BN128_CURVE: &str = "bn128";

/// Verification key exactly as exported by the setup finalizer.
///
/// Field names and order follow the exporter so that the serialized document
/// is byte-stable across runs. Points are projective decimal strings: G1 as
/// `[x, y, z]`, G2 as `[[x.c0, x.c1], [y.c0, y.c1], [z.c0, z.c1]]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationKey {
    pub protocol: String,
    pub curve: String,
    #[serde(rename = "nPublic")]
    pub n_public: u32,
    pub vk_alpha_1: Vec<String>,
    pub vk_beta_2: Vec<Vec<String>>,
    pub vk_gamma_2: Vec<Vec<String>>,
    pub vk_delta_2: Vec<Vec<String>>,
    pub vk_alphabeta_12: Vec<Vec<Vec<String>>>,
    #[serde(rename = "IC")]
    pub ic: Vec<Vec<String>>,
}

impl VerificationKey {
    /// Check the structural invariants consumers rely on.
    pub fn validate(&self) -> Result<(), CeremonyError> {
        if self.protocol != GROTH16_PROTOCOL {
            return Err(malformed(format!("unsupported protocol '{}'", self.protocol)));
        }
        if self.curve != BN128_CURVE {
            return Err(malformed(format!("unsupported curve '{}'", self.curve)));
        }
        let expected_ic = self.n_public as usize + 1;
        if self.ic.len() != expected_ic {
            return Err(malformed(format!(
                "IC has {} points, expected nPublic + 1 = {}",
                self.ic.len(),
                expected_ic
            )));
        }
        check_g1("vk_alpha_1", &self.vk_alpha_1)?;
        check_g2("vk_beta_2", &self.vk_beta_2)?;
        check_g2("vk_gamma_2", &self.vk_gamma_2)?;
        check_g2("vk_delta_2", &self.vk_delta_2)?;
        for (idx, point) in self.ic.iter().enumerate() {
            check_g1(&format!("IC[{idx}]"), point)?;
        }
        Ok(())
    }

    /// Canonical on-disk encoding (two-space indented JSON).
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, CeremonyError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, CeremonyError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

fn check_g1(label: &str, point: &[String]) -> Result<(), CeremonyError> {
    if point.len() < 2 {
        return Err(malformed(format!(
            "{label} has {} coordinates, expected at least 2",
            point.len()
        )));
    }
    Ok(())
}

fn check_g2(label: &str, point: &[Vec<String>]) -> Result<(), CeremonyError> {
    if point.len() < 2 || point[..2].iter().any(|coord| coord.len() != 2) {
        return Err(malformed(format!(
            "{label} must carry two Fq2 coordinates of two limbs each"
        )));
    }
    Ok(())
}

fn malformed(message: String) -> CeremonyError {
    CeremonyError::MalformedVerificationKey(message)
}
