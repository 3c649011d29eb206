//! Local filesystem layout of the build tree, the package tree and the
//! native-compiler inputs.

use std::path::{Path, PathBuf};

use ceremony_common::{compressed_name, CircuitKey, DEPLOYMENT_CONFIG_FILE};

pub const DEFAULT_BUILD_DIR: &str = "build";
pub const DEFAULT_MODULE_DIR: &str = "module";
pub const DEFAULT_CIRCOM_OUTPUT_DIR: &str = "circom_output";

/// Circuit name prefix used by the circuit compiler output.
const CIRCUIT_PREFIX: &str = "joinsplit";

#[derive(Clone, Debug)]
pub struct BuildLayout {
    pub build_dir: PathBuf,
    pub module_dir: PathBuf,
    pub circom_output: PathBuf,
}

impl BuildLayout {
    pub fn new(
        build_dir: impl Into<PathBuf>,
        module_dir: impl Into<PathBuf>,
        circom_output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            build_dir: build_dir.into(),
            module_dir: module_dir.into(),
            circom_output: circom_output.into(),
        }
    }

    /// Default layout rooted at `base`.
    pub fn under(base: &Path) -> Self {
        Self::new(
            base.join(DEFAULT_BUILD_DIR),
            base.join(DEFAULT_MODULE_DIR),
            base.join(DEFAULT_CIRCOM_OUTPUT_DIR),
        )
    }

    pub fn circuit_dir(&self, key: &CircuitKey) -> PathBuf {
        self.build_dir.join(key.to_string())
    }

    pub fn circuit_file(&self, key: &CircuitKey, name: &str) -> PathBuf {
        self.circuit_dir(key).join(name)
    }

    pub fn compressed_file(&self, key: &CircuitKey, name: &str) -> PathBuf {
        self.circuit_dir(key).join(compressed_name(name))
    }

    pub fn deployment_config(&self) -> PathBuf {
        self.build_dir.join(DEPLOYMENT_CONFIG_FILE)
    }

    pub fn package_dir(&self, key: &CircuitKey) -> PathBuf {
        self.module_dir.join(key.to_string())
    }

    /// Managed-runtime witness generator: `joinsplit_<k>_js/joinsplit_<k>.wasm`.
    pub fn wasm_source(&self, key: &CircuitKey) -> PathBuf {
        let name = circuit_name(key);
        self.circom_output
            .join(format!("{name}_js"))
            .join(format!("{name}.wasm"))
    }

    /// Native witness generator: `joinsplit_<k>_cpp/joinsplit_<k>`.
    pub fn native_source(&self, key: &CircuitKey) -> PathBuf {
        let name = circuit_name(key);
        self.circom_output.join(format!("{name}_cpp")).join(name)
    }
}

fn circuit_name(key: &CircuitKey) -> String {
    format!("{CIRCUIT_PREFIX}_{key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_circuit_names() {
        let layout = BuildLayout::under(Path::new("/work"));
        let key = CircuitKey::new(2, 3);
        assert_eq!(layout.circuit_dir(&key), PathBuf::from("/work/build/2x3"));
        assert_eq!(
            layout.compressed_file(&key, "zkey"),
            PathBuf::from("/work/build/2x3/zkey.br")
        );
        assert_eq!(
            layout.deployment_config(),
            PathBuf::from("/work/build/deploymentConfig.json")
        );
        assert_eq!(
            layout.wasm_source(&key),
            PathBuf::from("/work/circom_output/joinsplit_2x3_js/joinsplit_2x3.wasm")
        );
        assert_eq!(
            layout.native_source(&key),
            PathBuf::from("/work/circom_output/joinsplit_2x3_cpp/joinsplit_2x3")
        );
        assert_eq!(layout.package_dir(&key), PathBuf::from("/work/module/2x3"));
    }
}
