//! Finalizer backed by the snarkjs command line.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ceremony_common::{
    Beacon, CeremonyError, VerificationKey, BEACON_CONTRIBUTION_NAME,
};
use tokio::process::Command;
use tracing::debug;

use super::SetupFinalizer;

pub const DEFAULT_SNARKJS_BIN: &str = "snarkjs";

const RAW_KEY_FILE: &str = "contributed.zkey";
const FINAL_KEY_FILE: &str = "final.zkey";
const VKEY_EXPORT_FILE: &str = "verification_key.json";

#[derive(Clone, Debug)]
pub struct SnarkjsFinalizer {
    program: PathBuf,
}

impl Default for SnarkjsFinalizer {
    fn default() -> Self {
        Self::new(DEFAULT_SNARKJS_BIN)
    }
}

impl SnarkjsFinalizer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl SetupFinalizer for SnarkjsFinalizer {
    async fn apply_beacon(
        &self,
        raw_key: &[u8],
        beacon: &Beacon,
        iterations_exp: u32,
    ) -> Result<Vec<u8>, CeremonyError> {
        let scratch = scratch_dir()?;
        let input = scratch.path().join(RAW_KEY_FILE);
        let output = scratch.path().join(FINAL_KEY_FILE);
        tokio::fs::write(&input, raw_key)
            .await
            .map_err(|err| CeremonyError::io(&input, err))?;

        let mut cmd = self.command();
        cmd.arg("zkey")
            .arg("beacon")
            .arg(&input)
            .arg(&output)
            .arg(beacon.to_hex())
            .arg(iterations_exp.to_string())
            .arg(format!("-n={BEACON_CONTRIBUTION_NAME}"));
        run_command(cmd, "snarkjs zkey beacon").await?;

        tokio::fs::read(&output)
            .await
            .map_err(|err| CeremonyError::io(&output, err))
    }

    async fn export_verification_key(
        &self,
        finalized_key: &Path,
    ) -> Result<VerificationKey, CeremonyError> {
        let scratch = scratch_dir()?;
        let output = scratch.path().join(VKEY_EXPORT_FILE);

        let mut cmd = self.command();
        cmd.arg("zkey")
            .arg("export")
            .arg("verificationkey")
            .arg(finalized_key)
            .arg(&output);
        run_command(cmd, "snarkjs zkey export verificationkey").await?;

        let bytes = tokio::fs::read(&output)
            .await
            .map_err(|err| CeremonyError::io(&output, err))?;
        VerificationKey::from_json_bytes(&bytes)
    }
}

fn scratch_dir() -> Result<tempfile::TempDir, CeremonyError> {
    tempfile::tempdir().map_err(|err| CeremonyError::io(std::env::temp_dir(), err))
}

async fn run_command(mut cmd: Command, label: &str) -> Result<(), CeremonyError> {
    debug!(?cmd, "running {label}");
    let output = cmd
        .output()
        .await
        .map_err(|err| CeremonyError::Finalize(format!("failed to execute {label}: {err}")))?;
    if !output.status.success() {
        return Err(CeremonyError::Finalize(format!(
            "{label} exited with {}:\n{}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}
