//! End-to-end pipeline run.

use std::{fmt, io, path::Path, path::PathBuf, sync::Arc};

use ceremony_common::{
    ceremony_beacon, Beacon, CeremonyError, CircuitKey, Codec, CEREMONY_PIN_NAME, CEREMONY_ROOT,
    DEFAULT_COMPRESSION_QUALITY,
};
use futures::{stream, StreamExt, TryStreamExt};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    catalog::discover_circuits,
    deployment::{build_descriptor, write_deployment_config, DeploymentEntry},
    finalizer::SetupFinalizer,
    layout::BuildLayout,
    package::PackageAssembler,
    publish::{CircuitBundle, ContentPublisher, PublishedId},
    store::ContentStore,
    transform::{ArtifactTransformer, FinalizedArtifactSet, WitnessSources},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Beacon,
    Prepare,
    Pin,
    Catalog,
    Prerequisites,
    Transform,
    Publish,
    Aggregate,
    Deployment,
    Package,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Beacon => "beacon",
            Stage::Prepare => "prepare",
            Stage::Pin => "pin",
            Stage::Catalog => "catalog",
            Stage::Prerequisites => "prerequisites",
            Stage::Transform => "transform",
            Stage::Publish => "publish",
            Stage::Aggregate => "aggregate",
            Stage::Deployment => "deployment",
            Stage::Package => "package",
        };
        f.write_str(name)
    }
}

/// A run failure, tagged with the stage and the circuit in flight.
#[derive(Debug, Error)]
#[error("{stage} stage failed{}: {source}", describe_circuit(.circuit))]
pub struct PipelineError {
    pub stage: Stage,
    pub circuit: Option<CircuitKey>,
    #[source]
    pub source: CeremonyError,
}

impl PipelineError {
    fn at(stage: Stage) -> impl FnOnce(CeremonyError) -> Self {
        move |source| Self {
            stage,
            circuit: None,
            source,
        }
    }

    fn for_circuit(stage: Stage, circuit: CircuitKey) -> impl FnOnce(CeremonyError) -> Self {
        move |source| Self {
            stage,
            circuit: Some(circuit),
            source,
        }
    }
}

fn describe_circuit(circuit: &Option<CircuitKey>) -> String {
    circuit
        .map(|key| format!(" for circuit {key}"))
        .unwrap_or_default()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildMode {
    /// Finalize, publish and describe; no distributable package.
    IpfsOnly,
    /// Additionally assemble the package from native-compiler output.
    FullPackage,
}

impl BuildMode {
    /// Full package mode iff the native-compiler output directory exists.
    pub fn detect(layout: &BuildLayout) -> Self {
        if layout.circom_output.exists() {
            BuildMode::FullPackage
        } else {
            BuildMode::IpfsOnly
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineOptions {
    pub layout: BuildLayout,
    /// Ceremony output root in the content store.
    pub root: String,
    pub quality: u32,
    /// Circuits processed concurrently. 1 reproduces strictly sequential runs.
    pub jobs: usize,
    /// Pin the ceremony root before discovery.
    pub pin_ceremony: bool,
    /// Pin the aggregate directory under this name.
    pub pin_output: Option<String>,
}

impl PipelineOptions {
    pub fn new(layout: BuildLayout) -> Self {
        Self {
            layout,
            root: CEREMONY_ROOT.to_string(),
            quality: DEFAULT_COMPRESSION_QUALITY,
            jobs: 1,
            pin_ceremony: true,
            pin_output: None,
        }
    }
}

/// Everything a successful run produced.
#[derive(Clone, Debug)]
pub struct PipelineOutcome {
    pub mode: BuildMode,
    pub beacon: Beacon,
    pub circuits: Vec<CircuitKey>,
    /// Per-circuit identifiers, index-aligned with `circuits`.
    pub published: Vec<PublishedId>,
    pub aggregate: PublishedId,
    pub deployment: Vec<DeploymentEntry>,
    pub package_dir: Option<PathBuf>,
}

pub struct Pipeline {
    store: Arc<dyn ContentStore>,
    transformer: ArtifactTransformer,
    publisher: ContentPublisher,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ContentStore>,
        finalizer: Arc<dyn SetupFinalizer>,
        codec: Arc<dyn Codec>,
        options: PipelineOptions,
    ) -> Self {
        let transformer = ArtifactTransformer::new(
            Arc::clone(&store),
            finalizer,
            codec,
            options.layout.clone(),
            options.root.clone(),
            options.quality,
        );
        let publisher = ContentPublisher::new(Arc::clone(&store));
        Self {
            store,
            transformer,
            publisher,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub async fn run(&self) -> Result<PipelineOutcome, PipelineError> {
        let beacon = ceremony_beacon().map_err(PipelineError::at(Stage::Beacon))?;
        info!("Beacon: {beacon}");

        let layout = &self.options.layout;
        reset_dir(&layout.build_dir)
            .await
            .map_err(PipelineError::at(Stage::Prepare))?;
        reset_dir(&layout.module_dir)
            .await
            .map_err(PipelineError::at(Stage::Prepare))?;

        let mode = BuildMode::detect(layout);
        if mode == BuildMode::IpfsOnly {
            warn!(
                "{} not found, building IPFS artifacts only",
                layout.circom_output.display()
            );
        }

        if self.options.pin_ceremony {
            self.publisher
                .pin(&PublishedId(self.options.root.clone()), CEREMONY_PIN_NAME)
                .await
                .map_err(PipelineError::at(Stage::Pin))?;
        }

        let circuits = discover_circuits(self.store.as_ref(), &self.options.root)
            .await
            .map_err(PipelineError::at(Stage::Catalog))?;
        if circuits.is_empty() {
            return Err(PipelineError::at(Stage::Catalog)(CeremonyError::InvalidInput(
                format!("no circuits listed under {}", self.options.root),
            )));
        }

        let witness = match mode {
            BuildMode::FullPackage => Some(self.witness_sources(&circuits)?),
            BuildMode::IpfsOnly => None,
        };

        let jobs = self.options.jobs.max(1);
        let processed: Vec<(FinalizedArtifactSet, PublishedId)> =
            stream::iter(circuits.iter().enumerate())
                .map(|(idx, circuit)| {
                    let sources = witness.as_ref().map(|all| &all[idx]);
                    self.process_circuit(*circuit, &beacon, sources)
                })
                .buffered(jobs)
                .try_collect()
                .await?;

        let (sets, published): (Vec<_>, Vec<_>) = processed.into_iter().unzip();

        let aggregate = self
            .publisher
            .publish_aggregate(&sets)
            .await
            .map_err(PipelineError::at(Stage::Aggregate))?;
        if let Some(name) = &self.options.pin_output {
            self.publisher
                .pin(&aggregate, name)
                .await
                .map_err(PipelineError::at(Stage::Pin))?;
        }

        info!("Generating deployment config");
        let verification_keys: Vec<_> = sets
            .iter()
            .map(|set| set.verification_key.clone())
            .collect();
        let deployment = build_descriptor(&circuits, &verification_keys, &published)
            .map_err(PipelineError::at(Stage::Deployment))?;
        write_deployment_config(&layout.deployment_config(), &deployment)
            .map_err(PipelineError::at(Stage::Deployment))?;

        let package_dir = match mode {
            BuildMode::FullPackage => {
                info!("Building module");
                let package = PackageAssembler::new(&layout.module_dir)
                    .assemble(&sets, &beacon)
                    .await
                    .map_err(PipelineError::at(Stage::Package))?;
                Some(package.dir)
            }
            BuildMode::IpfsOnly => None,
        };

        info!("Pipeline finished for {} circuits", circuits.len());
        Ok(PipelineOutcome {
            mode,
            beacon,
            circuits,
            published,
            aggregate,
            deployment,
            package_dir,
        })
    }

    /// Resolve witness generator inputs for every circuit, failing on the
    /// first one that is missing.
    fn witness_sources(
        &self,
        circuits: &[CircuitKey],
    ) -> Result<Vec<WitnessSources>, PipelineError> {
        let layout = &self.options.layout;
        circuits
            .iter()
            .map(|circuit| {
                let sources = WitnessSources {
                    wasm: layout.wasm_source(circuit),
                    native: layout.native_source(circuit),
                };
                for path in [&sources.wasm, &sources.native] {
                    if !path.is_file() {
                        return Err(PipelineError::for_circuit(Stage::Prerequisites, *circuit)(
                            CeremonyError::MissingPrerequisite {
                                circuit: *circuit,
                                path: path.clone(),
                            },
                        ));
                    }
                }
                Ok(sources)
            })
            .collect()
    }

    async fn process_circuit(
        &self,
        circuit: CircuitKey,
        beacon: &Beacon,
        witness: Option<&WitnessSources>,
    ) -> Result<(FinalizedArtifactSet, PublishedId), PipelineError> {
        let set = self
            .transformer
            .transform(circuit, beacon, witness)
            .await
            .map_err(PipelineError::for_circuit(Stage::Transform, circuit))?;
        let bundle = CircuitBundle::load(&set)
            .await
            .map_err(PipelineError::for_circuit(Stage::Publish, circuit))?;
        let id = self
            .publisher
            .publish(&bundle)
            .await
            .map_err(PipelineError::for_circuit(Stage::Publish, circuit))?;
        Ok((set, id))
    }
}

/// Delete `dir` with everything below it and recreate it empty.
async fn reset_dir(dir: &Path) -> Result<(), CeremonyError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(CeremonyError::io(dir, err)),
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|err| CeremonyError::io(dir, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_names_stage_and_circuit() {
        let err = PipelineError::for_circuit(Stage::Transform, CircuitKey::new(2, 3))(
            CeremonyError::Finalize("snarkjs exited with status 1".into()),
        );
        let message = err.to_string();
        assert!(message.starts_with("transform stage failed for circuit 2x3: "));
        assert!(message.contains("snarkjs exited with status 1"));

        let err = PipelineError::at(Stage::Catalog)(CeremonyError::MalformedCatalogEntry {
            name: "bogus".into(),
        });
        assert!(err.to_string().starts_with("catalog stage failed: "));
        assert!(err.circuit.is_none());
    }

    #[test]
    fn mode_follows_native_compiler_output() {
        let base = tempfile::tempdir().unwrap();
        let layout = BuildLayout::under(base.path());
        assert_eq!(BuildMode::detect(&layout), BuildMode::IpfsOnly);
        std::fs::create_dir_all(&layout.circom_output).unwrap();
        assert_eq!(BuildMode::detect(&layout), BuildMode::FullPackage);
    }

    #[tokio::test]
    async fn reset_dir_discards_previous_output() {
        let base = tempfile::tempdir().unwrap();
        let dir = base.path().join("build");
        std::fs::create_dir_all(dir.join("1x1")).unwrap();
        std::fs::write(dir.join("1x1").join("zkey"), b"stale").unwrap();

        reset_dir(&dir).await.unwrap();
        assert!(dir.is_dir());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

        let fresh = base.path().join("module");
        reset_dir(&fresh).await.unwrap();
        assert!(fresh.is_dir());
    }
}
