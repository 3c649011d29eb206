//! On-chain verifier configuration.
//!
//! The verifier contract expects every Fq2 element as `[c1, c0]`, the mirror of
//! the exporter's `[c0, c1]`. G1 points keep their affine `x`, `y`.

use std::path::Path;

use ceremony_common::{write_json, CeremonyError, CircuitKey, VerificationKey};
use serde::{Deserialize, Serialize};

use crate::publish::PublishedId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct G1Point {
    pub x: String,
    pub y: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct G2Point {
    pub x: [String; 2],
    pub y: [String; 2],
}

impl G1Point {
    fn from_exported(label: &str, point: &[String]) -> Result<Self, CeremonyError> {
        match point {
            [x, y, ..] => Ok(Self {
                x: x.clone(),
                y: y.clone(),
            }),
            _ => Err(CeremonyError::MalformedVerificationKey(format!(
                "{label} is not a G1 point"
            ))),
        }
    }
}

impl G2Point {
    fn from_exported(label: &str, point: &[Vec<String>]) -> Result<Self, CeremonyError> {
        let coordinate = |idx: usize| -> Result<[String; 2], CeremonyError> {
            match point.get(idx).map(Vec::as_slice) {
                Some([c0, c1]) => Ok(swap_fq2([c0.clone(), c1.clone()])),
                _ => Err(CeremonyError::MalformedVerificationKey(format!(
                    "{label} coordinate {idx} is not an Fq2 pair"
                ))),
            }
        };
        Ok(Self {
            x: coordinate(0)?,
            y: coordinate(1)?,
        })
    }

    /// Swap both coordinates back. Applying this twice is the identity.
    pub fn swapped(&self) -> Self {
        Self {
            x: swap_fq2(self.x.clone()),
            y: swap_fq2(self.y.clone()),
        }
    }
}

/// `[c0, c1]` -> `[c1, c0]`.
pub fn swap_fq2(pair: [String; 2]) -> [String; 2] {
    let [c0, c1] = pair;
    [c1, c0]
}

/// Verification key in the verifier contract's layout, bound to the
/// identifier of the artifact directory it was exported from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractVKey {
    #[serde(rename = "artifactsIPFSHash")]
    pub artifacts_ipfs_hash: PublishedId,
    pub alpha1: G1Point,
    pub beta2: G2Point,
    pub gamma2: G2Point,
    pub delta2: G2Point,
    pub ic: Vec<G1Point>,
}

impl ContractVKey {
    pub fn from_verification_key(
        vkey: &VerificationKey,
        artifacts: &PublishedId,
    ) -> Result<Self, CeremonyError> {
        vkey.validate()?;
        let ic = vkey
            .ic
            .iter()
            .enumerate()
            .map(|(idx, point)| G1Point::from_exported(&format!("IC[{idx}]"), point))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            artifacts_ipfs_hash: artifacts.clone(),
            alpha1: G1Point::from_exported("vk_alpha_1", &vkey.vk_alpha_1)?,
            beta2: G2Point::from_exported("vk_beta_2", &vkey.vk_beta_2)?,
            gamma2: G2Point::from_exported("vk_gamma_2", &vkey.vk_gamma_2)?,
            delta2: G2Point::from_exported("vk_delta_2", &vkey.vk_delta_2)?,
            ic,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentEntry {
    pub nullifiers: u32,
    pub commitments: u32,
    #[serde(rename = "contractVKey")]
    pub contract_vkey: ContractVKey,
}

impl DeploymentEntry {
    pub fn circuit(&self) -> CircuitKey {
        CircuitKey::new(self.nullifiers, self.commitments)
    }
}

/// Build one descriptor entry per circuit, in the given order.
pub fn build_descriptor(
    circuits: &[CircuitKey],
    verification_keys: &[VerificationKey],
    published: &[PublishedId],
) -> Result<Vec<DeploymentEntry>, CeremonyError> {
    if circuits.len() != verification_keys.len() || circuits.len() != published.len() {
        return Err(CeremonyError::InvalidInput(format!(
            "descriptor inputs disagree: {} circuits, {} verification keys, {} identifiers",
            circuits.len(),
            verification_keys.len(),
            published.len()
        )));
    }

    circuits
        .iter()
        .zip(verification_keys)
        .zip(published)
        .map(|((circuit, vkey), id)| {
            Ok(DeploymentEntry {
                nullifiers: circuit.nullifiers,
                commitments: circuit.commitments,
                contract_vkey: ContractVKey::from_verification_key(vkey, id)?,
            })
        })
        .collect()
}

pub fn write_deployment_config(
    path: &Path,
    entries: &[DeploymentEntry],
) -> Result<(), CeremonyError> {
    write_json(path, &entries)
}

#[cfg(test)]
mod tests {
    use ceremony_common::{BN128_CURVE, GROTH16_PROTOCOL};
    use proptest::prelude::*;

    use super::*;

    fn vkey(n_public: u32) -> VerificationKey {
        let g2 = |tag: &str| {
            vec![
                vec![format!("{tag}.x.c0"), format!("{tag}.x.c1")],
                vec![format!("{tag}.y.c0"), format!("{tag}.y.c1")],
                vec!["1".to_string(), "0".to_string()],
            ]
        };
        VerificationKey {
            protocol: GROTH16_PROTOCOL.into(),
            curve: BN128_CURVE.into(),
            n_public,
            vk_alpha_1: vec!["ax".into(), "ay".into(), "1".into()],
            vk_beta_2: g2("beta"),
            vk_gamma_2: g2("gamma"),
            vk_delta_2: g2("delta"),
            vk_alphabeta_12: vec![vec![vec!["0".into(), "0".into()]; 3]; 2],
            ic: (0..=n_public)
                .map(|i| vec![format!("ic{i}x"), format!("ic{i}y"), "1".into()])
                .collect(),
        }
    }

    #[test]
    fn g2_coordinates_are_mirrored() {
        let contract =
            ContractVKey::from_verification_key(&vkey(2), &PublishedId("QmDir".into())).unwrap();
        assert_eq!(contract.beta2.x, ["beta.x.c1".to_string(), "beta.x.c0".to_string()]);
        assert_eq!(contract.beta2.y, ["beta.y.c1".to_string(), "beta.y.c0".to_string()]);
        assert_eq!(contract.delta2.x[0], "delta.x.c1");
        assert_eq!(contract.gamma2.y[1], "gamma.y.c0");
        assert_eq!(contract.alpha1, G1Point { x: "ax".into(), y: "ay".into() });
        assert_eq!(contract.ic.len(), 3);
        assert_eq!(contract.ic[2].y, "ic2y");
    }

    proptest! {
        #[test]
        fn prop_swap_is_an_involution(c0 in ".*", c1 in ".*") {
            let pair = [c0.clone(), c1.clone()];
            prop_assert_eq!(swap_fq2(pair.clone()), [c1, c0]);
            prop_assert_eq!(swap_fq2(swap_fq2(pair.clone())), pair);
        }
    }

    #[test]
    fn swapped_point_restores_exported_order() {
        let contract =
            ContractVKey::from_verification_key(&vkey(1), &PublishedId("QmDir".into())).unwrap();
        let restored = contract.gamma2.swapped();
        assert_eq!(restored.x, ["gamma.x.c0".to_string(), "gamma.x.c1".to_string()]);
        assert_eq!(restored.swapped(), contract.gamma2);
    }

    #[test]
    fn descriptor_json_shape() {
        let entries = build_descriptor(
            &[CircuitKey::new(1, 2)],
            &[vkey(1)],
            &[PublishedId("QmCircuit".into())],
        )
        .unwrap();
        let value = serde_json::to_value(&entries).unwrap();
        let entry = &value[0];
        assert_eq!(entry["nullifiers"], 1);
        assert_eq!(entry["commitments"], 2);
        assert_eq!(entry["contractVKey"]["artifactsIPFSHash"], "QmCircuit");
        assert_eq!(entry["contractVKey"]["alpha1"]["x"], "ax");
        assert_eq!(entry["contractVKey"]["beta2"]["x"][0], "beta.x.c1");
        assert_eq!(entry["contractVKey"]["ic"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn descriptor_preserves_input_order() {
        let circuits = [CircuitKey::new(3, 1), CircuitKey::new(1, 1)];
        let entries = build_descriptor(
            &circuits,
            &[vkey(4), vkey(2)],
            &[PublishedId("QmA".into()), PublishedId("QmB".into())],
        )
        .unwrap();
        assert_eq!(entries[0].circuit(), circuits[0]);
        assert_eq!(entries[1].circuit(), circuits[1]);
        assert_eq!(entries[1].contract_vkey.artifacts_ipfs_hash.as_str(), "QmB");
    }

    #[test]
    fn rejects_mismatched_inputs() {
        let err = build_descriptor(&[CircuitKey::new(1, 1)], &[], &[]).unwrap_err();
        assert!(matches!(err, CeremonyError::InvalidInput(_)));
    }

    #[test]
    fn rejects_malformed_vkey() {
        let mut bad = vkey(2);
        bad.ic.truncate(1);
        let err = build_descriptor(
            &[CircuitKey::new(1, 1)],
            &[bad],
            &[PublishedId("QmA".into())],
        )
        .unwrap_err();
        assert!(matches!(err, CeremonyError::MalformedVerificationKey(_)));
    }
}
