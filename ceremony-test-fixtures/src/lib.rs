//! Seeded ceremonies and in-memory collaborators for pipeline tests.

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use ceremony_common::{ceremony_beacon, Beacon, Brotli, CircuitKey, Codec};
use ceremony_pipeline::{
    BuildLayout, ContentStore, Pipeline, PipelineOptions, SetupFinalizer,
};
use once_cell::sync::OnceCell;

mod finalizer;
mod store;

pub use finalizer::{derive_vkey, raw_key, StubFinalizer, CORRUPT_MARKER, RAW_KEY_MAGIC};
pub use store::MemoryStore;

static BEACON: OnceCell<Beacon> = OnceCell::new();

/// The fixed ceremony beacon, derived once per test process.
pub fn beacon() -> Beacon {
    *BEACON.get_or_init(|| match ceremony_beacon() {
        Ok(beacon) => beacon,
        Err(err) => panic!("ceremony beacon must derive: {err}"),
    })
}

/// Number of public inputs the fixture assigns to `circuit`.
pub fn public_inputs(circuit: &CircuitKey) -> u32 {
    circuit.nullifiers + circuit.commitments + 4
}

pub fn r1cs_bytes(circuit: &CircuitKey) -> Vec<u8> {
    format!("r1cs {circuit} constraints").into_bytes()
}

pub fn wasm_bytes(circuit: &CircuitKey) -> Vec<u8> {
    format!("\0asm witness generator for {circuit}").into_bytes()
}

pub fn native_bytes(circuit: &CircuitKey) -> Vec<u8> {
    format!("\x7fELF witness generator for {circuit}").into_bytes()
}

/// Builder for a ceremony output tree: `r1cs/<n>x<c>.r1cs` plus
/// `zkeys/<n>x<c>.zkey` for every circuit.
#[derive(Clone, Debug, Default)]
pub struct FixtureCeremony {
    circuits: Vec<CircuitKey>,
    extra_entries: Vec<String>,
    corrupt: Vec<CircuitKey>,
    missing_zkeys: Vec<CircuitKey>,
}

impl FixtureCeremony {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_circuits(circuits: &[(u32, u32)]) -> Self {
        circuits
            .iter()
            .fold(Self::new(), |ceremony, (n, c)| ceremony.circuit(*n, *c))
    }

    pub fn circuit(mut self, nullifiers: u32, commitments: u32) -> Self {
        self.circuits.push(CircuitKey::new(nullifiers, commitments));
        self
    }

    /// Add a raw catalog entry with no matching key, e.g. a malformed name.
    pub fn catalog_entry(mut self, name: impl Into<String>) -> Self {
        self.extra_entries.push(name.into());
        self
    }

    /// Seed a proving key the finalizer will reject.
    pub fn corrupt_key(mut self, nullifiers: u32, commitments: u32) -> Self {
        self.corrupt.push(CircuitKey::new(nullifiers, commitments));
        self
    }

    /// List the circuit but leave its proving key out of the tree.
    pub fn without_zkey(mut self, nullifiers: u32, commitments: u32) -> Self {
        self.missing_zkeys.push(CircuitKey::new(nullifiers, commitments));
        self
    }

    pub fn circuits(&self) -> &[CircuitKey] {
        &self.circuits
    }

    /// Store the tree in `store` and return the ceremony root id.
    pub fn seed(&self, store: &MemoryStore) -> String {
        let mut files: Vec<(String, Vec<u8>)> = Vec::new();
        for circuit in &self.circuits {
            files.push((format!("r1cs/{circuit}.r1cs"), r1cs_bytes(circuit)));
            if self.missing_zkeys.contains(circuit) {
                continue;
            }
            let label = if self.corrupt.contains(circuit) {
                format!("{circuit} {CORRUPT_MARKER}")
            } else {
                circuit.to_string()
            };
            files.push((
                format!("zkeys/{circuit}.zkey"),
                raw_key(public_inputs(circuit), &label).into_bytes(),
            ));
        }
        for name in &self.extra_entries {
            files.push((format!("r1cs/{name}"), b"unparsed".to_vec()));
        }
        store.insert_tree(files)
    }

    /// Write both witness generator forms for every circuit into the
    /// layout's native-compiler output directory.
    pub fn write_circom_output(&self, layout: &BuildLayout) -> Result<()> {
        for circuit in &self.circuits {
            write_file(&layout.wasm_source(circuit), &wasm_bytes(circuit))?;
            write_file(&layout.native_source(circuit), &native_bytes(circuit))?;
        }
        Ok(())
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

/// Pipeline over the in-memory store, the stub finalizer and brotli.
pub fn fixture_pipeline(
    store: Arc<MemoryStore>,
    finalizer: Arc<StubFinalizer>,
    layout: BuildLayout,
    root: &str,
) -> Pipeline {
    let mut options = PipelineOptions::new(layout);
    options.root = root.to_string();
    fixture_pipeline_with(store, finalizer, options)
}

/// Same as [`fixture_pipeline`] with caller-chosen options.
pub fn fixture_pipeline_with(
    store: Arc<MemoryStore>,
    finalizer: Arc<StubFinalizer>,
    options: PipelineOptions,
) -> Pipeline {
    let store: Arc<dyn ContentStore> = store;
    let finalizer: Arc<dyn SetupFinalizer> = finalizer;
    let codec: Arc<dyn Codec> = Arc::new(Brotli);
    Pipeline::new(store, finalizer, codec, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_tree_lists_every_circuit() {
        let store = MemoryStore::new();
        let ceremony = FixtureCeremony::with_circuits(&[(1, 1), (2, 3)]);
        let root = ceremony.seed(&store);

        let names: Vec<String> = store
            .ls(&format!("{root}/r1cs"))
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names, vec!["1x1.r1cs", "2x3.r1cs"]);

        let zkey = store.cat(&format!("{root}/zkeys/2x3.zkey")).await.unwrap();
        assert_eq!(zkey, raw_key(9, "2x3").into_bytes());
    }

    #[test]
    fn same_ceremony_seeds_same_root() {
        let ceremony = FixtureCeremony::with_circuits(&[(1, 2)]);
        assert_eq!(
            ceremony.seed(&MemoryStore::new()),
            ceremony.seed(&MemoryStore::new())
        );
    }

    #[test]
    fn writes_witness_generators() {
        let base = tempfile::tempdir().unwrap();
        let layout = BuildLayout::under(base.path());
        let ceremony = FixtureCeremony::with_circuits(&[(1, 1)]);
        ceremony.write_circom_output(&layout).unwrap();
        let key = CircuitKey::new(1, 1);
        assert_eq!(std::fs::read(layout.wasm_source(&key)).unwrap(), wasm_bytes(&key));
        assert!(layout.native_source(&key).is_file());
    }
}
