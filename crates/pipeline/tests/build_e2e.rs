//! End-to-end pipeline tests against a stub compiler and proving backend.

#![cfg(unix)]

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use forge_common::{BuildRequest, CircuitDef, Error, Protocol, Result, SourceFile};
use forge_pipeline::{
    BackendRegistry, MemoryBlobStore, Orchestrator, OrchestratorConfig, ProvingBackend,
};

/// Minimal r1cs binary with the given constraint count in its header.
fn encode_r1cs(n_constraints: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"r1cs");
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());

    let field_size = 32u32;
    let header_size = 4 + field_size as u64 + 4 * 4 + 8 + 4;
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&header_size.to_le_bytes());
    out.extend_from_slice(&field_size.to_le_bytes());
    out.extend_from_slice(&[0u8; 32]);
    out.extend_from_slice(&4u32.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&4u64.to_le_bytes());
    out.extend_from_slice(&n_constraints.to_le_bytes());
    out
}

/// Write a `circom-v2.1.8` stand-in script that copies a pre-made r1cs
/// fixture into the requested output directory.
fn write_fake_circom(tool_dir: &Path, fixture: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let script = format!(
        r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "circom compiler 2.1.8"
  exit 0
fi
OUT=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "--output" ]; then OUT="$arg"; fi
  prev="$arg"
done
mkdir -p "$OUT/verify_circuit_js"
cp "{fixture}" "$OUT/verify_circuit.r1cs"
echo "template instances: 1"
"#,
        fixture = fixture.display()
    );

    let path = tool_dir.join("circom-v2.1.8");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

struct StubBackend {
    verify_result: bool,
    released: AtomicUsize,
}

impl StubBackend {
    fn new(verify_result: bool) -> Arc<Self> {
        Arc::new(Self {
            verify_result,
            released: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ProvingBackend for StubBackend {
    async fn new_zkey(&self, _r1cs: &Path, _ptau: &Path, out: &Path) -> Result<()> {
        tokio::fs::write(out, b"genesis").await?;
        Ok(())
    }

    async fn contribute(
        &self,
        current: &Path,
        next: &Path,
        _name: &str,
        _entropy: &[u8; 32],
    ) -> Result<()> {
        assert!(current.exists());
        tokio::fs::write(next, b"contributed").await?;
        Ok(())
    }

    async fn verify_from_r1cs(&self, _r1cs: &Path, _ptau: &Path, _zkey: &Path) -> Result<bool> {
        Ok(self.verify_result)
    }

    async fn setup(
        &self,
        _protocol: Protocol,
        _r1cs: &Path,
        _ptau: &Path,
        out: &Path,
    ) -> Result<()> {
        tokio::fs::write(out, b"single-shot").await?;
        Ok(())
    }

    async fn export_verification_key(&self, _zkey: &Path) -> Result<serde_json::Value> {
        Ok(serde_json::json!({"protocol": "plonk", "nPublic": 1}))
    }

    async fn export_solidity_verifier(&self, _zkey: &Path, _protocol: Protocol) -> Result<String> {
        Ok(
            "pragma solidity ^0.8.0;\nimport \"hardhat/console.sol\";\ncontract Verifier {}\n"
                .to_string(),
        )
    }

    async fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    _dirs: tempfile::TempDir,
    store: Arc<MemoryBlobStore>,
    orchestrator: Orchestrator,
    backend: Arc<StubBackend>,
    build_dir: PathBuf,
}

fn harness(verify_result: bool) -> Harness {
    let dirs = tempfile::tempdir().unwrap();
    let tool_dir = dirs.path().join("tools");
    let build_dir = dirs.path().join("builds");
    let ptau_dir = dirs.path().join("ptau");
    std::fs::create_dir_all(&tool_dir).unwrap();
    std::fs::create_dir_all(&build_dir).unwrap();
    std::fs::create_dir_all(&ptau_dir).unwrap();

    // 200 constraints sizes to p=8; seed the cache so nothing downloads.
    let fixture = dirs.path().join("fixture.r1cs");
    std::fs::write(&fixture, encode_r1cs(200)).unwrap();
    std::fs::write(
        ptau_dir.join("powersOfTau28_hez_final_08.ptau"),
        b"ptau bytes",
    )
    .unwrap();
    write_fake_circom(&tool_dir, &fixture);

    let backend = StubBackend::new(verify_result);
    let mut registry = BackendRegistry::with_cli_backends(Some(&tool_dir));
    registry.insert("0.7.4", backend.clone());

    let store = Arc::new(MemoryBlobStore::new());
    let orchestrator = Orchestrator::new(
        store.clone(),
        registry,
        OrchestratorConfig {
            build_dir: build_dir.clone(),
            ptau_cache_dir: ptau_dir,
            tool_dir: Some(tool_dir),
        },
    );

    Harness {
        _dirs: dirs,
        store,
        orchestrator,
        backend,
        build_dir,
    }
}

fn request(protocol: &str) -> BuildRequest {
    BuildRequest {
        request_id: "req123abc".to_string(),
        files: BTreeMap::from([(
            "multiplier.circom".to_string(),
            SourceFile {
                code: "pragma circom 2.0.0;\ntemplate Multiplier() { signal input a; signal input b; signal output c; c <== a * b; }\n".to_string(),
            },
        )]),
        circuit: CircuitDef {
            file: "multiplier".to_string(),
            template: "Multiplier".to_string(),
            params: vec![],
            pubs: vec![],
        },
        circom_path: "circom-v2.1.8".to_string(),
        snarkjs_version: None,
        protocol: protocol.to_string(),
        prime: None,
        final_zkey: None,
        ptau_size: None,
        ptau_url: None,
        optimization: None,
    }
}

#[tokio::test]
async fn test_plonk_build_produces_all_artifacts() {
    let h = harness(true);

    let result = h.orchestrator.build(request("plonk")).await.unwrap();
    assert!(result.package_name.starts_with("multiplier-"));

    let prefix = format!("build/{}", result.package_name);
    let uploads = h.store.upload_log();
    let build_uploads: Vec<&String> = uploads.iter().filter(|k| k.starts_with(&prefix)).collect();
    assert_eq!(
        build_uploads,
        vec![
            &format!("{prefix}/source.zip"),
            &format!("{prefix}/verifier.sol"),
            &format!("{prefix}/pkg.zip"),
            &format!("{prefix}/info.json"),
        ]
    );

    // The hardhat debug include is stripped from the generated verifier.
    let verifier = String::from_utf8(h.store.get(&format!("{prefix}/verifier.sol")).unwrap()).unwrap();
    assert!(verifier.contains("contract Verifier"));
    assert!(!verifier.contains("hardhat/console.sol"));

    // Manifest records the build's bindings.
    let info: serde_json::Value =
        serde_json::from_slice(&h.store.get(&format!("{prefix}/info.json")).unwrap()).unwrap();
    assert_eq!(info["protocol"], "plonk");
    assert_eq!(info["snarkjsVersion"], "0.7.4");
    assert_eq!(info["ptau"], 8);

    // Package archive carries sources and the rendered helpers.
    let pkg = h.store.get(&format!("{prefix}/pkg.zip")).unwrap();
    let mut archive = zip::ZipArchive::new(Cursor::new(pkg)).unwrap();
    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    assert!(names.contains(&"index.js".to_string()));
    assert!(names.contains(&"circuits/multiplier.circom".to_string()));
    assert!(names.contains(&"circomkit.json".to_string()));

    // Final status log is drained and ends with the completion record.
    let status: Vec<serde_json::Value> =
        serde_json::from_slice(&h.store.get("status/req123abc.json").unwrap()).unwrap();
    assert_eq!(status.last().unwrap()["msg"], "Complete.");

    // Shared workers released exactly once.
    assert_eq!(h.backend.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_groth16_contribution_chain_cleans_steps() {
    let h = harness(true);

    let result = h.orchestrator.build(request("groth16")).await.unwrap();

    let key_dir = h
        .build_dir
        .join(&result.package_name)
        .join("build/verify_circuit");
    assert!(key_dir.join("groth16_pkey.zkey").exists());
    assert!(!key_dir.join("step0.zkey").exists());
    assert!(!key_dir.join("step1.zkey").exists());
}

#[tokio::test]
async fn test_invalid_final_zkey_reported_and_nothing_published() {
    use base64::Engine;

    let h = harness(false);
    let mut req = request("groth16");
    req.final_zkey = Some(base64::engine::general_purpose::STANDARD.encode(b"bad key"));

    let err = h.orchestrator.build(req).await.unwrap_err();
    assert!(matches!(err, Error::InvalidFinalZkey));

    // No build artifacts, but the status log carries the failure reason.
    assert!(h.store.keys().iter().all(|k| !k.starts_with("build/")));
    let status: Vec<serde_json::Value> =
        serde_json::from_slice(&h.store.get("status/req123abc.json").unwrap()).unwrap();
    assert!(status.iter().any(|r| r["msg"] == "Invalid finalZkey!"));
    assert_eq!(status.last().unwrap()["msg"], "invalid_finalZkey");

    assert_eq!(h.backend.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unsupported_protocol_has_no_side_effects() {
    let h = harness(true);

    let err = h.orchestrator.build(request("stark")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidProtocol));

    assert!(h.store.is_empty());
    assert_eq!(std::fs::read_dir(&h.build_dir).unwrap().count(), 0);
    // Failed validation never resolves a backend, so nothing to release.
    assert_eq!(h.backend.released.load(Ordering::SeqCst), 0);
}
