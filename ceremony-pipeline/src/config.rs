//! Pipeline configuration.

use std::env;

use ceremony_common::{validate_quality, CeremonyError, DEFAULT_COMPRESSION_QUALITY};

pub const DEFAULT_IPFS_API: &str = "http://127.0.0.1:5001/api/v0";

/// Externally tunable parameters. Everything else that shapes the produced
/// artifacts is fixed in `ceremony_common`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Content store RPC endpoint.
    pub ipfs_api: String,
    /// Brotli quality applied to every compressed companion.
    pub compression_quality: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ipfs_api: DEFAULT_IPFS_API.to_string(),
            compression_quality: DEFAULT_COMPRESSION_QUALITY,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, CeremonyError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CeremonyError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ipfs_api = lookup("IPFS_API")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_IPFS_API.to_string());

        let compression_quality = match lookup("COMPRESSION_QUALITY") {
            Some(raw) => {
                let quality = raw.trim().parse::<u32>().map_err(|_| {
                    CeremonyError::InvalidInput(format!(
                        "COMPRESSION_QUALITY must be an integer, got '{raw}'"
                    ))
                })?;
                validate_quality(quality)?
            }
            None => DEFAULT_COMPRESSION_QUALITY,
        };

        Ok(Self {
            ipfs_api,
            compression_quality,
        })
    }
}
