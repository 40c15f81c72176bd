//! Circuit build pipeline
//!
//! Turns a declarative circuit-definition request into a deployable
//! verification package: compiled artifacts, proving/verification keys, a
//! generated Solidity verifier, and a packaged source bundle, streamed to
//! blob storage with near-real-time status reporting.

pub mod blob;
pub mod build;
pub mod compiler;
pub mod download;
pub mod monitor;
pub mod package;
pub mod prover;
pub mod ptau;
pub mod r1cs;
pub mod setup;
pub mod status;
pub mod templates;
pub mod workspace;

pub use blob::{BlobStore, MemoryBlobStore, S3BlobStore};
pub use build::{Orchestrator, OrchestratorConfig};
pub use monitor::{monitor_process_memory, MonitorHandle};
pub use prover::{BackendRegistry, ProvingBackend, SnarkjsCli};
pub use ptau::{ptau_file_name, ptau_size_for, ParameterSelector};
pub use status::{StatusRecord, StatusReporter};
pub use workspace::{Workspace, WorkspaceManager, BUILD_NAME};
