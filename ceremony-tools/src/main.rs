use std::{fmt, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use ceremony_artifacts::ArtifactPackage;
use ceremony_common::{
    ceremony_beacon, Brotli, CircuitKey, Codec, BEACON_BLOCK_HASHES, CEREMONY_ROOT,
};
use ceremony_pipeline::{
    layout::{DEFAULT_BUILD_DIR, DEFAULT_CIRCOM_OUTPUT_DIR, DEFAULT_MODULE_DIR},
    BuildLayout, ContentStore, KuboClient, Pipeline, PipelineConfig, PipelineOptions,
    SetupFinalizer, SnarkjsFinalizer, DEFAULT_SNARKJS_BIN,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "ceremony-tools",
    about = "Finalize, publish and inspect trusted-setup ceremony artifacts"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full artifact pipeline against the configured IPFS node.
    Build(BuildArgs),
    /// Print the beacon sources and the derived beacon.
    Beacon(BeaconArgs),
    /// Print the circuits listed by an assembled package.
    ListArtifacts(ListArgs),
}

#[derive(Args)]
struct BuildArgs {
    /// Build output directory. Deleted and recreated on every run.
    #[arg(long, default_value = DEFAULT_BUILD_DIR)]
    build_dir: PathBuf,
    /// Package output directory. Deleted and recreated on every run.
    #[arg(long, default_value = DEFAULT_MODULE_DIR)]
    module_dir: PathBuf,
    /// Circuit compiler output. Its presence enables package assembly.
    #[arg(long, default_value = DEFAULT_CIRCOM_OUTPUT_DIR)]
    circom_output: PathBuf,
    /// snarkjs executable.
    #[arg(long, default_value = DEFAULT_SNARKJS_BIN)]
    snarkjs: PathBuf,
    /// Circuits processed concurrently.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    jobs: u16,
    /// Skip pinning the ceremony root.
    #[arg(long)]
    no_pin: bool,
    /// Pin the aggregate directory under this name.
    #[arg(long)]
    pin_output: Option<String>,
    /// Per-request timeout for IPFS calls, in seconds.
    #[arg(long)]
    ipfs_timeout_secs: Option<u64>,
}

#[derive(Args)]
struct BeaconArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ListArgs {
    #[arg(long, default_value = DEFAULT_MODULE_DIR)]
    module_dir: PathBuf,
    #[arg(long)]
    json: bool,
    /// Load every artifact and check it against the integrity manifest.
    #[arg(long)]
    verify: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ceremony_pipeline=info,ceremony_tools=info".into()),
        )
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    match cli.command {
        Commands::Build(args) => build(args).await,
        Commands::Beacon(args) => beacon(args),
        Commands::ListArtifacts(args) => list_artifacts(args),
    }
}

async fn build(args: BuildArgs) -> Result<()> {
    let config = PipelineConfig::from_env().context("invalid pipeline configuration")?;
    info!("IPFS API: {}", config.ipfs_api);

    let store: Arc<dyn ContentStore> = match args.ipfs_timeout_secs {
        Some(secs) => Arc::new(KuboClient::with_timeout(
            config.ipfs_api.clone(),
            Duration::from_secs(secs),
        )?),
        None => Arc::new(KuboClient::new(config.ipfs_api.clone())),
    };
    let finalizer: Arc<dyn SetupFinalizer> = Arc::new(SnarkjsFinalizer::new(args.snarkjs));
    let codec: Arc<dyn Codec> = Arc::new(Brotli);

    let mut options = PipelineOptions::new(BuildLayout::new(
        args.build_dir,
        args.module_dir,
        args.circom_output,
    ));
    options.quality = config.compression_quality;
    options.jobs = usize::from(args.jobs);
    options.pin_ceremony = !args.no_pin;
    options.pin_output = args.pin_output;

    let outcome = Pipeline::new(store, finalizer, codec, options)
        .run()
        .await
        .context("ceremony pipeline failed")?;

    println!("\nPublished circuits:");
    for (circuit, id) in outcome.circuits.iter().zip(&outcome.published) {
        println!("  {circuit}: {id}");
    }
    println!("Aggregate directory (pin this): {}", outcome.aggregate);
    if let Some(dir) = &outcome.package_dir {
        println!("Package written to {}", dir.display());
    }
    Ok(())
}

fn beacon(args: BeaconArgs) -> Result<()> {
    let beacon = ceremony_beacon().context("failed to derive beacon")?;
    let summary = BeaconSummary {
        ceremony_root: CEREMONY_ROOT.to_string(),
        block_hashes: BEACON_BLOCK_HASHES.iter().map(|hash| hash.to_string()).collect(),
        beacon: beacon.to_hex(),
    };
    output_summary(&summary, args.json)
}

fn list_artifacts(args: ListArgs) -> Result<()> {
    let package = ArtifactPackage::open(&args.module_dir)
        .with_context(|| format!("failed to open package {}", args.module_dir.display()))?;

    if args.verify {
        for circuit in package.list_artifacts() {
            package
                .get_artifact(circuit.nullifiers, circuit.commitments)
                .with_context(|| format!("failed to load artifacts for {circuit}"))?;
        }
    }

    let summary = PackageSummary {
        module_dir: args.module_dir.display().to_string(),
        beacon: package.integrity().beacon.to_hex(),
        verified: args.verify,
        circuits: package.list_artifacts().to_vec(),
    };
    output_summary(&summary, args.json)
}

fn output_summary<T>(summary: &T, json: bool) -> Result<()>
where
    T: Serialize + fmt::Display,
{
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!("{}", summary);
    }
    Ok(())
}

#[derive(Serialize)]
struct BeaconSummary {
    ceremony_root: String,
    block_hashes: Vec<String>,
    beacon: String,
}

impl fmt::Display for BeaconSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Ceremony root: {}", self.ceremony_root)?;
        writeln!(f, "Block hashes:")?;
        for hash in &self.block_hashes {
            writeln!(f, "  {hash}")?;
        }
        write!(f, "Beacon: {}", self.beacon)
    }
}

#[derive(Serialize)]
struct PackageSummary {
    module_dir: String,
    beacon: String,
    verified: bool,
    circuits: Vec<CircuitKey>,
}

impl fmt::Display for PackageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Package: {}", self.module_dir)?;
        writeln!(f, "Beacon: {}", self.beacon)?;
        write!(f, "Circuits ({}):", self.circuits.len())?;
        for circuit in &self.circuits {
            write!(
                f,
                "\n  {circuit} ({} nullifiers, {} commitments)",
                circuit.nullifiers, circuit.commitments
            )?;
        }
        if self.verified {
            write!(f, "\nAll artifacts verified")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn build_defaults() {
        let cli = Cli::try_parse_from(["ceremony-tools", "build"]).unwrap();
        let Commands::Build(args) = cli.command else {
            panic!("expected build command");
        };
        assert_eq!(args.build_dir, PathBuf::from("build"));
        assert_eq!(args.module_dir, PathBuf::from("module"));
        assert_eq!(args.circom_output, PathBuf::from("circom_output"));
        assert_eq!(args.jobs, 1);
        assert!(!args.no_pin);
        assert!(args.pin_output.is_none());
    }

    #[test]
    fn rejects_zero_jobs() {
        assert!(Cli::try_parse_from(["ceremony-tools", "build", "--jobs", "0"]).is_err());
    }

    #[test]
    fn beacon_summary_lists_sources() {
        let summary = BeaconSummary {
            ceremony_root: CEREMONY_ROOT.into(),
            block_hashes: vec!["aa".into(), "bb".into()],
            beacon: "cc".into(),
        };
        let text = summary.to_string();
        assert!(text.contains("  aa\n  bb\n"));
        assert!(text.ends_with("Beacon: cc"));
    }
}
