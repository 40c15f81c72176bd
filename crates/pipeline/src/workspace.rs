//! Per-build staging directory tree.
//!
//! Everything an external tool needs is written to disk before the tool
//! runs; no configuration lives only in the environment.

use std::path::{Component, Path, PathBuf};

use forge_common::{BuildRequest, Error, Protocol, Result, ValidatedBuild};
use tracing::info;

/// Fixed name of the compiled main component.
pub const BUILD_NAME: &str = "verify_circuit";

/// An isolated directory tree owned by exactly one build.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub circuits_dir: PathBuf,
    pub build_dir: PathBuf,
}

impl Workspace {
    /// `build/verify_circuit/verify_circuit.r1cs`
    pub fn r1cs_path(&self) -> PathBuf {
        self.build_dir
            .join(BUILD_NAME)
            .join(format!("{BUILD_NAME}.r1cs"))
    }

    /// Canonical final proving key location.
    pub fn pkey_path(&self, protocol: Protocol) -> PathBuf {
        self.build_dir
            .join(BUILD_NAME)
            .join(format!("{protocol}_pkey.zkey"))
    }

    pub fn vkey_path(&self, protocol: Protocol) -> PathBuf {
        self.build_dir
            .join(BUILD_NAME)
            .join(format!("{protocol}_vkey.json"))
    }

    pub fn contract_path(&self, protocol: Protocol) -> PathBuf {
        self.build_dir
            .join(BUILD_NAME)
            .join(format!("{protocol}_verifier.sol"))
    }

    /// Package-relative wasm witness generator path, for templates.
    pub fn wasm_rel_path(&self) -> String {
        format!("build/{BUILD_NAME}/{BUILD_NAME}_js/{BUILD_NAME}.wasm")
    }

    pub fn pkey_rel_path(&self, protocol: Protocol) -> String {
        format!("build/{BUILD_NAME}/{protocol}_pkey.zkey")
    }
}

/// Stages request sources and configuration into fresh workspaces.
pub struct WorkspaceManager {
    base_dir: PathBuf,
}

impl WorkspaceManager {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Materialize `<base>/<pkg_name>/{circuits,build}`, write every
    /// request file under `circuits/`, and drop the build-configuration
    /// and circuit descriptors in the workspace root.
    pub fn stage(
        &self,
        pkg_name: &str,
        request: &BuildRequest,
        validated: &ValidatedBuild,
    ) -> Result<Workspace> {
        // File keys come straight from the request; anything but plain
        // relative components could land a write outside the workspace.
        for rel_path in request.files.keys() {
            let clean = Path::new(rel_path)
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
            if rel_path.is_empty() || !clean {
                return Err(Error::InvalidFiles);
            }
        }

        let root = self.base_dir.join(pkg_name);
        let workspace = Workspace {
            circuits_dir: root.join("circuits"),
            build_dir: root.join("build"),
            root,
        };

        std::fs::create_dir_all(&workspace.circuits_dir)?;
        std::fs::create_dir_all(&workspace.build_dir)?;

        for (rel_path, file) in &request.files {
            let dest = workspace.circuits_dir.join(rel_path);
            if let Some(parent) = dest.parent() {
                // Pre-existing directories are fine; anything else is fatal.
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&dest, &file.code)?;
        }

        write_json(
            &workspace.root.join("circomkit.json"),
            &serde_json::json!({
                "circuits": "./circuits.json",
                "dirBuild": "./build",
                "circomPath": validated.circom_path,
                "protocol": validated.protocol.as_str(),
                "prime": validated.prime,
                "optimization": validated.optimization,
                "verbose": true,
            }),
        )?;

        let mut circuits = serde_json::Map::new();
        circuits.insert(
            validated.circuit_name.clone(),
            serde_json::to_value(&request.circuit)?,
        );
        write_json(
            &workspace.root.join("circuits.json"),
            &serde_json::Value::Object(circuits),
        )?;

        info!(
            "Staged workspace for {} at {}",
            pkg_name,
            workspace.root.display()
        );
        Ok(workspace)
    }
}

fn write_json(path: &Path, value: &serde_json::Value) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}
