//! Circuit discovery under the ceremony root.

use ceremony_common::{CeremonyError, CircuitKey, CEREMONY_R1CS_DIR};
use tracing::info;

use crate::store::ContentStore;

/// List every circuit variant published under `root`.
///
/// The order is whatever the store returns and is reused for all indexed
/// bookkeeping in the run. A single unparsable entry aborts discovery.
pub async fn discover_circuits(
    store: &dyn ContentStore,
    root: &str,
) -> Result<Vec<CircuitKey>, CeremonyError> {
    let listing = format!("{root}/{CEREMONY_R1CS_DIR}");
    let entries = store.ls(&listing).await?;

    let mut circuits = Vec::with_capacity(entries.len());
    for entry in entries {
        let key = CircuitKey::from_catalog_entry(&entry.name)?;
        if circuits.contains(&key) {
            return Err(CeremonyError::MalformedCatalogEntry { name: entry.name });
        }
        info!(
            "Found circuit with {} nullifiers and {} commitments",
            key.nullifiers, key.commitments
        );
        circuits.push(key);
    }
    Ok(circuits)
}
