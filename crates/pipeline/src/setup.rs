//! Trusted-setup coordination: produce the finalized proving key.
//!
//! Three paths: verify a caller-supplied key, one-step setup for
//! plonk/fflonk, or the groth16 contribution chain. Every path writes to a
//! staging name and renames into the canonical key path only on success,
//! so a half-written file can never be mistaken for a finished key.

use std::path::Path;

use anyhow::anyhow;
use base64::Engine;
use forge_common::{Error, Protocol, Result};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::download::download_file;
use crate::prover::ProvingBackend;
use crate::status::StatusReporter;
use crate::workspace::{Workspace, BUILD_NAME};

/// Number of randomized contributions applied to a groth16 ceremony.
/// A deliberate single-operator simplification, not a multi-party
/// ceremony; changing it requires a new request contract.
const CONTRIBUTIONS: u32 = 1;

pub struct SetupCoordinator<'a> {
    backend: &'a dyn ProvingBackend,
    client: &'a reqwest::Client,
}

impl<'a> SetupCoordinator<'a> {
    pub fn new(backend: &'a dyn ProvingBackend, client: &'a reqwest::Client) -> Self {
        Self { backend, client }
    }

    /// Drive the setup state machine to a finalized key at the canonical
    /// path for `protocol`.
    pub async fn finalize(
        &self,
        workspace: &Workspace,
        protocol: Protocol,
        ptau: &Path,
        final_zkey: Option<&str>,
        status: &StatusReporter,
    ) -> Result<()> {
        let r1cs = workspace.r1cs_path();
        let pkey = workspace.pkey_path(protocol);
        let key_dir = pkey
            .parent()
            .ok_or_else(|| anyhow!("key path has no parent"))?
            .to_path_buf();

        match (protocol, final_zkey) {
            (Protocol::Groth16, Some(supplied)) => {
                let staging = key_dir.join("supplied.zkey");
                if supplied.starts_with("https://") {
                    status.log(format!("Downloading finalZkey {supplied}..."), None);
                    download_file(self.client, supplied, &staging).await?;
                } else {
                    let bytes = base64::engine::general_purpose::STANDARD
                        .decode(supplied)
                        .map_err(|e| anyhow!("malformed finalZkey base64: {e}"))?;
                    tokio::fs::write(&staging, bytes).await?;
                }

                status.log("Verifying finalZkey...", None);
                let valid = self
                    .backend
                    .verify_from_r1cs(&r1cs, ptau, &staging)
                    .await?;
                if !valid {
                    status.log("Invalid finalZkey!", None);
                    return Err(Error::InvalidFinalZkey);
                }
                tokio::fs::rename(&staging, &pkey).await?;
            }
            (Protocol::Groth16, None) => {
                status.log("Groth16 setup with random entropy...", None);

                let mut current = key_dir.join("step0.zkey");
                self.backend.new_zkey(&r1cs, ptau, &current).await?;

                for contrib in 1..=CONTRIBUTIONS {
                    let next = key_dir.join(format!("step{contrib}.zkey"));
                    let mut entropy = [0u8; 32];
                    OsRng.fill_bytes(&mut entropy);

                    self.backend
                        .contribute(&current, &next, &format!("{BUILD_NAME}_{contrib}"), &entropy)
                        .await?;

                    // The predecessor is spent; remove it before moving on
                    // so only one current key ever exists.
                    tokio::fs::remove_file(&current).await?;
                    current = next;
                }

                tokio::fs::rename(&current, &pkey).await?;
            }
            (_, _) => {
                // PLONK and FFLONK take the universal setup directly; a
                // supplied zkey is meaningless and ignored for them.
                status.log("Circuit setup...", None);
                let staging = key_dir.join(format!("{protocol}_setup.zkey"));
                self.backend.setup(protocol, &r1cs, ptau, &staging).await?;
                tokio::fs::rename(&staging, &pkey).await?;
            }
        }
        Ok(())
    }
}
