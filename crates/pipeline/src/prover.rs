//! Proving-backend contract and the versioned snarkjs CLI implementation.
//!
//! Several pinned snarkjs releases are supported side by side. A registry
//! maps allow-listed version strings to backends; the orchestrator
//! resolves one handle per build and passes it explicitly down the
//! pipeline.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use forge_common::{versions, Error, Protocol, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Narrow contract over the proving toolchain: key generation, ceremony
/// contribution, key verification, and verifier export.
#[async_trait]
pub trait ProvingBackend: Send + Sync {
    /// Generate the genesis proving key for a groth16 ceremony.
    async fn new_zkey(&self, r1cs: &Path, ptau: &Path, out: &Path) -> Result<()>;

    /// Apply one randomized contribution to `current`, writing `next`.
    async fn contribute(
        &self,
        current: &Path,
        next: &Path,
        name: &str,
        entropy: &[u8; 32],
    ) -> Result<()>;

    /// Check a final key against the constraint system and parameter
    /// file. `Ok(false)` means the key is cryptographically wrong, which
    /// is a different failure from being unable to run the check.
    async fn verify_from_r1cs(&self, r1cs: &Path, ptau: &Path, zkey: &Path) -> Result<bool>;

    /// One-step setup for protocols without a per-circuit ceremony.
    async fn setup(&self, protocol: Protocol, r1cs: &Path, ptau: &Path, out: &Path) -> Result<()>;

    async fn export_verification_key(&self, zkey: &Path) -> Result<serde_json::Value>;

    async fn export_solidity_verifier(&self, zkey: &Path, protocol: Protocol) -> Result<String>;

    /// Release any shared curve computation workers. Idempotent; called
    /// exactly once per build after the pipeline reaches a terminal state.
    async fn release(&self);
}

/// Backend that shells out to a pinned `snarkjs-v<version>` binary.
pub struct SnarkjsCli {
    binary: PathBuf,
}

impl SnarkjsCli {
    pub fn new(version: &str, tool_dir: Option<&Path>) -> Self {
        let name = format!("snarkjs-v{version}");
        let binary = match tool_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        };
        Self { binary }
    }

    async fn run(&self, args: &[&OsStr]) -> Result<std::process::Output> {
        debug!("snarkjs {:?}", args);
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .with_context(|| format!("run {}", self.binary.display()))?;
        Ok(output)
    }

    /// Run and require success, mapping a failing exit to a backend error
    /// carrying the tool's stderr.
    async fn run_checked(&self, args: &[&OsStr]) -> Result<()> {
        let output = self.run(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Backend(format!(
                "{} {:?} failed: {}",
                self.binary.display(),
                args.first().map(|a| a.to_string_lossy()).unwrap_or_default(),
                stderr.trim()
            )));
        }
        Ok(())
    }
}

fn os(s: &str) -> &OsStr {
    OsStr::new(s)
}

#[async_trait]
impl ProvingBackend for SnarkjsCli {
    async fn new_zkey(&self, r1cs: &Path, ptau: &Path, out: &Path) -> Result<()> {
        self.run_checked(&[
            os("zkey"),
            os("new"),
            r1cs.as_os_str(),
            ptau.as_os_str(),
            out.as_os_str(),
        ])
        .await
    }

    async fn contribute(
        &self,
        current: &Path,
        next: &Path,
        name: &str,
        entropy: &[u8; 32],
    ) -> Result<()> {
        let name_arg = format!("--name={name}");
        // Entropy goes over stdin, answering the interactive prompt; as an
        // argument it would be visible in the process table.
        let mut child = Command::new(&self.binary)
            .args([
                os("zkey"),
                os("contribute"),
                current.as_os_str(),
                next.as_os_str(),
                os(&name_arg),
            ])
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn {}", self.binary.display()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("contribute stdin not captured"))?;
        stdin
            .write_all(format!("{}\n", hex::encode(entropy)).as_bytes())
            .await?;
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Backend(format!(
                "{} contribute failed: {}",
                self.binary.display(),
                stderr.trim()
            )));
        }
        Ok(())
    }

    async fn verify_from_r1cs(&self, r1cs: &Path, ptau: &Path, zkey: &Path) -> Result<bool> {
        let output = self
            .run(&[
                os("zkey"),
                os("verify"),
                r1cs.as_os_str(),
                ptau.as_os_str(),
                zkey.as_os_str(),
            ])
            .await?;
        // snarkjs exits non-zero when the key does not match.
        Ok(output.status.success())
    }

    async fn setup(&self, protocol: Protocol, r1cs: &Path, ptau: &Path, out: &Path) -> Result<()> {
        if protocol == Protocol::Groth16 {
            return Err(Error::Backend(
                "groth16 uses the contribution chain, not one-step setup".to_string(),
            ));
        }
        self.run_checked(&[
            os(protocol.as_str()),
            os("setup"),
            r1cs.as_os_str(),
            ptau.as_os_str(),
            out.as_os_str(),
        ])
        .await
    }

    async fn export_verification_key(&self, zkey: &Path) -> Result<serde_json::Value> {
        let out = zkey.with_extension("vkey.json");
        self.run_checked(&[
            os("zkey"),
            os("export"),
            os("verificationkey"),
            zkey.as_os_str(),
            out.as_os_str(),
        ])
        .await?;
        let raw = tokio::fs::read(&out).await?;
        tokio::fs::remove_file(&out).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn export_solidity_verifier(&self, zkey: &Path, _protocol: Protocol) -> Result<String> {
        let out = zkey.with_extension("verifier.sol");
        self.run_checked(&[
            os("zkey"),
            os("export"),
            os("solidityverifier"),
            zkey.as_os_str(),
            out.as_os_str(),
        ])
        .await?;
        let source = tokio::fs::read_to_string(&out).await?;
        tokio::fs::remove_file(&out).await?;
        Ok(source)
    }

    async fn release(&self) {
        // Curve workers live in the snarkjs process, which has already
        // exited; nothing is held here.
    }
}

/// Version string -> backend handle, resolved once per build.
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn ProvingBackend>>,
}

impl BackendRegistry {
    /// Registry with one CLI backend per allow-listed snarkjs version.
    pub fn with_cli_backends(tool_dir: Option<&Path>) -> Self {
        let mut backends: HashMap<String, Arc<dyn ProvingBackend>> = HashMap::new();
        for version in versions::SNARKJS_VERSIONS {
            backends.insert(
                version.to_string(),
                Arc::new(SnarkjsCli::new(version, tool_dir)),
            );
        }
        info!("Registered {} snarkjs backends", backends.len());
        Self { backends }
    }

    /// Replace or add a backend, used to inject doubles in tests.
    pub fn insert(&mut self, version: impl Into<String>, backend: Arc<dyn ProvingBackend>) {
        self.backends.insert(version.into(), backend);
    }

    pub fn resolve(&self, version: &str) -> Result<Arc<dyn ProvingBackend>> {
        self.backends
            .get(version)
            .cloned()
            .ok_or(Error::InvalidSnarkjsVersion)
    }
}
