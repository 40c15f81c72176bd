//! End-to-end build orchestration.
//!
//! One build is one strictly sequential pass: validate, stage, compile,
//! select parameters, run setup, export keys and verifier, package and
//! upload. The status flush loop and the compiler memory monitor run
//! beside the stages as observers and are always stopped before the build
//! reaches a terminal state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use forge_common::{BuildOk, BuildRequest, Error, Result, ValidatedBuild};
use serde_json::json;
use tracing::{error, info};

use crate::blob::BlobStore;
use crate::compiler::{CircomCompiler, CompileLogger};
use crate::monitor::monitor_process_memory;
use crate::package::ArtifactPackager;
use crate::prover::{BackendRegistry, ProvingBackend};
use crate::ptau::ParameterSelector;
use crate::r1cs::read_r1cs_header;
use crate::setup::SetupCoordinator;
use crate::status::StatusReporter;
use crate::templates::{write_package_files, TemplateVars};
use crate::workspace::WorkspaceManager;

/// Errant debug include in snarkjs's plonk verifier template.
const HARDHAT_IMPORT: &str = "import \"hardhat/console.sol\";";

/// Main-component path used by frontends that submit an auto-generated
/// wrapper instead of pointing at the real source.
const GENERATED_MAIN: &str = "test/verify_circuit";

const STATUS_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const MEMORY_SAMPLE_INTERVAL: Duration = Duration::from_secs(10);
/// Settle time for in-flight backend work before worker release.
const RELEASE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Base directory for per-build workspaces.
    pub build_dir: PathBuf,
    /// Shared PTAU download cache.
    pub ptau_cache_dir: PathBuf,
    /// Directory holding the versioned `circom-v*` binaries; `None`
    /// resolves them on `PATH`.
    pub tool_dir: Option<PathBuf>,
}

pub struct Orchestrator {
    store: Arc<dyn BlobStore>,
    registry: BackendRegistry,
    config: OrchestratorConfig,
    client: reqwest::Client,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn BlobStore>,
        registry: BackendRegistry,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Run one build to completion. Validation failures return before any
    /// side effect; later failures are appended to the status log, which
    /// is drained before the error propagates. The proving backend's
    /// shared workers are released exactly once on every exit path.
    pub async fn build(&self, mut request: BuildRequest) -> Result<BuildOk> {
        let validated = request.validate()?;
        let backend = self.registry.resolve(&validated.snarkjs_version)?;

        let status = Arc::new(StatusReporter::new(
            Arc::clone(&self.store),
            format!("status/{}.json", request.request_id),
        ));
        status.start_flushing(STATUS_FLUSH_INTERVAL).await;

        let result = self
            .run_pipeline(&mut request, &validated, backend.as_ref(), &status)
            .await;

        if let Err(err) = &result {
            error!("Build failed: {}", err);
            status.log(err.to_string(), None);
        }
        status.stop_flushing().await;

        tokio::time::sleep(RELEASE_GRACE).await;
        backend.release().await;

        result
    }

    async fn run_pipeline(
        &self,
        request: &mut BuildRequest,
        validated: &ValidatedBuild,
        backend: &dyn ProvingBackend,
        status: &Arc<StatusReporter>,
    ) -> Result<BuildOk> {
        normalize_generated_wrapper(request)?;
        let pkg_name = format!("{}-{}", validated.circuit_name, random_suffix());
        info!("Starting build {} for {}", pkg_name, request.request_id);

        let compiler = CircomCompiler::new(&validated.circom_path, self.config.tool_dir.as_deref());
        let circom_version = compiler.version().await?;
        status.log(format!("Using {circom_version}"), None);
        status.log(format!("Using snarkjs@{}", validated.snarkjs_version), None);
        status.log(format!("Compiling {pkg_name}..."), None);

        let workspace = WorkspaceManager::new(self.config.build_dir.clone()).stage(
            &pkg_name,
            request,
            validated,
        )?;

        // Sample compiler memory while it runs; the monitor is cancelled
        // before the process name can be reused.
        let monitor = {
            let status = Arc::clone(status);
            monitor_process_memory(
                compiler.process_name(),
                MEMORY_SAMPLE_INTERVAL,
                move |memory| {
                    status.log("Circom memory usage", Some(json!({ "memoryUsage": memory })));
                },
            )
        };
        let logger = Arc::new(StatusCompileLogger {
            status: Arc::clone(status),
        });
        let compile_result = compiler
            .compile(&workspace, &request.circuit, validated, logger)
            .await;
        monitor.cancel().await;
        compile_result?;

        let header = read_r1cs_header(&workspace.r1cs_path())?;
        status.log(
            "Circuit compiled",
            Some(json!({ "constraints": header.n_constraints })),
        );

        let selector =
            ParameterSelector::new(self.config.ptau_cache_dir.clone(), self.client.clone());
        let (ptau_path, ptau_choice) = selector
            .select(
                request.ptau_url.as_deref(),
                request.ptau_size,
                header.n_constraints as u64,
                status,
            )
            .await?;

        SetupCoordinator::new(backend, &self.client)
            .finalize(
                &workspace,
                validated.protocol,
                &ptau_path,
                request.final_zkey.as_deref(),
                status,
            )
            .await?;

        status.log("Exporting verification key and solidity verifier...", None);
        let pkey = workspace.pkey_path(validated.protocol);
        let vkey = backend.export_verification_key(&pkey).await?;
        let vkey_json = serde_json::to_string_pretty(&vkey)?;
        std::fs::write(workspace.vkey_path(validated.protocol), &vkey_json)?;

        let mut contract = backend
            .export_solidity_verifier(&pkey, validated.protocol)
            .await?;
        if contract.contains(HARDHAT_IMPORT) {
            contract = contract.replace(HARDHAT_IMPORT, "");
        }
        let contract_path = workspace.contract_path(validated.protocol);
        std::fs::write(&contract_path, &contract)?;

        write_package_files(
            &workspace,
            &TemplateVars {
                package_name: &pkg_name,
                circuit_name: &validated.circuit_name,
                snarkjs_version: &validated.snarkjs_version,
                protocol: validated.protocol.as_str(),
                wasm_path: &workspace.wasm_rel_path(),
                pkey_path: &workspace.pkey_rel_path(validated.protocol),
                vkey: &vkey_json,
            },
        )?;

        let has_https_zkey = request
            .final_zkey
            .as_deref()
            .is_some_and(|z| z.starts_with("https://"));
        let info = json!({
            "requestId": request.request_id,
            "circomPath": validated.circom_path,
            "snarkjsVersion": validated.snarkjs_version,
            "protocol": validated.protocol.as_str(),
            "circuit": request.circuit,
            "ptau": ptau_choice.to_json(),
            "finalZkey": has_https_zkey.then(|| request.final_zkey.clone()),
            "completedAt": chrono::Utc::now().to_rfc3339(),
        });

        ArtifactPackager::new(Arc::clone(&self.store))
            .publish(&pkg_name, &workspace, &contract_path, info, status)
            .await?;

        status.log("Complete.", None);
        info!("Build {} complete", pkg_name);
        Ok(BuildOk {
            package_name: pkg_name,
        })
    }
}

/// Mirror compiler output into the status log, one record per line.
struct StatusCompileLogger {
    status: Arc<StatusReporter>,
}

impl CompileLogger for StatusCompileLogger {
    fn info(&self, msg: &str) {
        self.status.log("Circom Log", Some(json!({ "msg": msg })));
    }

    fn warn(&self, msg: &str) {
        self.status.log("Circom Warn Log", Some(json!({ "msg": msg })));
    }

    fn error(&self, msg: &str) {
        self.status.log("Circom Error Log", Some(json!({ "msg": msg })));
    }
}

/// When the request points at the auto-generated wrapper, re-point the
/// circuit at the wrapper's include target and drop the wrapper file, or
/// it would shadow the generated main component.
fn normalize_generated_wrapper(request: &mut BuildRequest) -> Result<()> {
    if request.circuit.file != GENERATED_MAIN {
        return Ok(());
    }
    let wrapper_key = format!("{GENERATED_MAIN}.circom");
    let wrapper = request
        .files
        .get(&wrapper_key)
        .ok_or(Error::InvalidDirectoryStructure)?;

    let target = wrapper
        .code
        .lines()
        .find_map(|line| {
            line.trim()
                .strip_prefix("include \"")
                .and_then(|rest| rest.strip_suffix("\";"))
        })
        .ok_or(Error::InvalidDirectoryStructure)?;

    let target = target.strip_prefix("../").unwrap_or(target);
    let target = target.strip_suffix(".circom").unwrap_or(target);
    request.circuit.file = target.to_string();
    request.files.remove(&wrapper_key);
    Ok(())
}

fn random_suffix() -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect()
}
