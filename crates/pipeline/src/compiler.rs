//! Circom compiler invocation.
//!
//! The compiler is an external, allow-listed binary. Its output is
//! redirected line by line into a [`CompileLogger`] so the caller can
//! mirror it to the status log without the compiler knowing about either.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use forge_common::{CircuitDef, Error, Result, ValidatedBuild};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::info;

use crate::workspace::{Workspace, BUILD_NAME};

/// Structured sink for compiler output, one method per severity.
pub trait CompileLogger: Send + Sync {
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);
}

pub struct CircomCompiler {
    binary: PathBuf,
    /// Process name for memory monitoring.
    process_name: String,
}

impl CircomCompiler {
    /// `circom_path` is the versioned binary name, e.g. `circom-v2.1.8`,
    /// resolved either on `PATH` or under `tool_dir`.
    pub fn new(circom_path: &str, tool_dir: Option<&std::path::Path>) -> Self {
        let binary = match tool_dir {
            Some(dir) => dir.join(circom_path),
            None => PathBuf::from(circom_path),
        };
        Self {
            binary,
            process_name: circom_path.to_string(),
        }
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    /// `circom --version` output, single trimmed line.
    pub async fn version(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .with_context(|| format!("run {} --version", self.binary.display()))?;
        if !output.status.success() {
            return Err(Error::Compiler(format!(
                "{} --version exited with {}",
                self.binary.display(),
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Compile the staged circuit into `build/verify_circuit/`. Writes the
    /// main-component wrapper source first, so the invocation is fully
    /// determined by on-disk state.
    pub async fn compile(
        &self,
        workspace: &Workspace,
        circuit: &CircuitDef,
        validated: &ValidatedBuild,
        logger: Arc<dyn CompileLogger>,
    ) -> Result<()> {
        let main_dir = workspace.circuits_dir.join("main");
        std::fs::create_dir_all(&main_dir)?;
        let main_path = main_dir.join(format!("{BUILD_NAME}.circom"));
        std::fs::write(&main_path, main_component_source(circuit))?;

        let out_dir = workspace.build_dir.join(BUILD_NAME);
        std::fs::create_dir_all(&out_dir)?;

        let optimization = match validated.optimization {
            0 => "--O0",
            1 => "--O1",
            _ => "--O2",
        };

        info!("Compiling {} with {}", BUILD_NAME, self.binary.display());
        let mut child = Command::new(&self.binary)
            .arg("--r1cs")
            .arg("--wasm")
            .arg("--sym")
            .arg(optimization)
            .arg("-p")
            .arg(&validated.prime)
            .arg("-l")
            .arg(&workspace.circuits_dir)
            .arg("--output")
            .arg(&out_dir)
            .arg(&main_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn {}", self.binary.display()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("compiler stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("compiler stderr not captured"))?;

        let out_logger = Arc::clone(&logger);
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                out_logger.info(&line);
            }
        });

        let err_logger = Arc::clone(&logger);
        let stderr_task = tokio::spawn(async move {
            let mut collected = Vec::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                err_logger.warn(&line);
                collected.push(line);
            }
            collected
        });

        let status = child.wait().await?;
        let _ = stdout_task.await;
        let stderr_lines = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let detail = if stderr_lines.is_empty() {
                format!("circom exited with {status}")
            } else {
                stderr_lines.join("\n")
            };
            logger.error(&detail);
            return Err(Error::Compiler(detail));
        }
        Ok(())
    }
}

/// Render the main-component wrapper that instantiates the requested
/// template.
fn main_component_source(circuit: &CircuitDef) -> String {
    let params = circuit
        .params
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let public = if circuit.pubs.is_empty() {
        String::new()
    } else {
        format!("{{public [{}]}} ", circuit.pubs.join(", "))
    };
    format!(
        "pragma circom 2.0.0;\n\ninclude \"../{}.circom\";\n\ncomponent main {}= {}({});\n",
        circuit.file, public, circuit.template, params
    )
}
