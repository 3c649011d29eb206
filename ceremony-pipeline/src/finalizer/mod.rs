//! Cryptographic setup collaborator.

mod snarkjs;

pub use snarkjs::{SnarkjsFinalizer, DEFAULT_SNARKJS_BIN};

use std::path::Path;

use async_trait::async_trait;
use ceremony_common::{Beacon, CeremonyError, VerificationKey};

/// Applies the public beacon to a contributed proving key and exports the
/// resulting verification key.
///
/// Both operations must be pure functions of their inputs: the same raw key,
/// beacon and iteration exponent always yield byte-identical output.
#[async_trait]
pub trait SetupFinalizer: Send + Sync {
    async fn apply_beacon(
        &self,
        raw_key: &[u8],
        beacon: &Beacon,
        iterations_exp: u32,
    ) -> Result<Vec<u8>, CeremonyError>;

    async fn export_verification_key(
        &self,
        finalized_key: &Path,
    ) -> Result<VerificationKey, CeremonyError>;
}
