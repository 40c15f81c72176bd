//! Artifact packaging and upload sequencing.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use forge_common::Result;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::blob::BlobStore;
use crate::status::StatusReporter;
use crate::workspace::Workspace;

/// Compress `src_dir` recursively into a zip at `dest`. Entry names are
/// relative to `src_dir` with forward slashes.
pub fn zip_directory(src_dir: &Path, dest: &Path) -> Result<()> {
    let file = File::create(dest).with_context(|| format!("create {}", dest.display()))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9));

    for entry in WalkDir::new(src_dir) {
        let entry = entry.map_err(|e| anyhow!("walk {}: {e}", src_dir.display()))?;
        let path = entry.path();
        let rel = path
            .strip_prefix(src_dir)
            .map_err(|e| anyhow!("strip prefix: {e}"))?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if path.is_dir() {
            writer.add_directory(name, options).map_err(anyhow::Error::from)?;
        } else {
            writer.start_file(name, options).map_err(anyhow::Error::from)?;
            let mut input = File::open(path)?;
            std::io::copy(&mut input, &mut writer)?;
        }
    }
    writer.finish().map_err(anyhow::Error::from)?;
    Ok(())
}

/// Builds the compressed bundles and uploads every deliverable for one
/// build under `build/<pkg_name>/`.
pub struct ArtifactPackager {
    store: Arc<dyn BlobStore>,
}

impl ArtifactPackager {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Zip, upload artifacts, then upload the manifest last: its presence
    /// in storage is the "build complete" marker consumers poll for.
    /// `info` gains the artifact byte sizes before upload.
    pub async fn publish(
        &self,
        pkg_name: &str,
        workspace: &Workspace,
        contract_path: &Path,
        mut info: serde_json::Value,
        status: &StatusReporter,
    ) -> Result<()> {
        status.log("Storing build artifacts...", None);
        let prefix = format!("build/{pkg_name}");

        let source_zip = sibling(&workspace.root, &format!("{pkg_name}-source.zip"));
        let pkg_zip = sibling(&workspace.root, &format!("{pkg_name}.zip"));

        // Zipping is CPU/disk bound; keep it off the async workers.
        let circuits_dir = workspace.circuits_dir.clone();
        let zip_dest = source_zip.clone();
        tokio::task::spawn_blocking(move || zip_directory(&circuits_dir, &zip_dest))
            .await
            .map_err(|e| anyhow!("zip task: {e}"))??;

        self.store
            .put_file(&format!("{prefix}/source.zip"), &source_zip)
            .await?;
        self.store
            .put_file(&format!("{prefix}/verifier.sol"), contract_path)
            .await?;

        let root_dir = workspace.root.clone();
        let zip_dest = pkg_zip.clone();
        tokio::task::spawn_blocking(move || zip_directory(&root_dir, &zip_dest))
            .await
            .map_err(|e| anyhow!("zip task: {e}"))??;

        self.store
            .put_file(&format!("{prefix}/pkg.zip"), &pkg_zip)
            .await?;

        if let Some(obj) = info.as_object_mut() {
            obj.insert(
                "soliditySize".to_string(),
                file_size(contract_path)?.into(),
            );
            obj.insert("sourceSize".to_string(), file_size(&source_zip)?.into());
            obj.insert("pkgSize".to_string(), file_size(&pkg_zip)?.into());
        }

        // Manifest last; uploaded and kept in the workspace copy too.
        std::fs::write(
            workspace.root.join("info.json"),
            serde_json::to_string_pretty(&info)?,
        )?;
        self.store
            .put_json(&format!("{prefix}/info.json"), &info)
            .await?;
        Ok(())
    }
}

fn sibling(workspace_root: &Path, name: &str) -> PathBuf {
    workspace_root
        .parent()
        .unwrap_or(workspace_root)
        .join(name)
}

fn file_size(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path)?.len())
}
