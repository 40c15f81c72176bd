//! Universal-setup parameter file (PTAU) selection and download.
//!
//! Sizing and naming follow the hermez/zkevm phase-1 ceremony published by
//! Polygon: one file per exponent `p`, usable by any circuit with at most
//! `2^p` constraints.

use std::path::PathBuf;

use anyhow::anyhow;
use forge_common::{Error, Result};
use tracing::info;

use crate::download::download_file;
use crate::status::StatusReporter;

/// Fixed ceremony mirror.
pub const PTAU_URL_BASE: &str = "https://storage.googleapis.com/zkevm/ptau";

/// Canonical ceremony filename for exponent `p`. Total over `p <= 28`:
/// values below 8 map to the size-8 file; values above 28 have no
/// published file.
pub fn ptau_file_name(p: u32) -> Result<String> {
    let id = match p {
        0..=7 => "_08".to_string(),
        8..=9 => format!("_0{p}"),
        10..=27 => format!("_{p}"),
        28 => String::new(),
        _ => return Err(Error::TooManyConstraints),
    };
    Ok(format!("powersOfTau28_hez_final{id}.ptau"))
}

/// Smallest exponent `p` with `2^p >= constraints`, clamped low to 8.
/// Circuits needing `p > 28` are rejected, never silently truncated.
pub fn ptau_size_for(constraints: u64) -> Result<u32> {
    let p = if constraints <= 1 {
        0
    } else {
        64 - (constraints - 1).leading_zeros()
    };
    let p = p.max(8);
    if p > 28 {
        return Err(Error::TooManyConstraints);
    }
    Ok(p)
}

/// What the selector settled on, recorded into the build manifest.
#[derive(Debug, Clone)]
pub enum PtauChoice {
    Size(u32),
    Url(String),
}

impl PtauChoice {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PtauChoice::Size(p) => serde_json::json!(p),
            PtauChoice::Url(url) => serde_json::json!(url),
        }
    }
}

/// Resolves and fetches the parameter file for one build.
pub struct ParameterSelector {
    cache_dir: PathBuf,
    client: reqwest::Client,
}

impl ParameterSelector {
    pub fn new(cache_dir: PathBuf, client: reqwest::Client) -> Self {
        Self { cache_dir, client }
    }

    /// Precedence: caller-forced URL, caller-forced size, size computed
    /// from the constraint count. Returns the local path and the choice
    /// made. Downloads are idempotent by filename: a cached copy is
    /// reused.
    pub async fn select(
        &self,
        forced_url: Option<&str>,
        forced_size: Option<u32>,
        constraints: u64,
        status: &StatusReporter,
    ) -> Result<(PathBuf, PtauChoice)> {
        std::fs::create_dir_all(&self.cache_dir)?;

        if let Some(url) = forced_url {
            // Cache key is the path's file name; query strings (signed
            // URLs) and fragments must not leak into it.
            let path_part = url.split(['?', '#']).next().unwrap_or(url);
            let name = path_part
                .rsplit('/')
                .next()
                .filter(|n| !n.is_empty())
                .ok_or_else(|| Error::Transfer {
                    url: url.to_string(),
                    source: anyhow!("URL has no file name"),
                })?;
            let dest = self.cache_dir.join(name);
            if !dest.exists() {
                status.log(format!("Downloading {url}..."), None);
                download_file(&self.client, url, &dest).await?;
            }
            return Ok((dest, PtauChoice::Url(url.to_string())));
        }

        let size = match forced_size {
            Some(size) => {
                if !(8..=28).contains(&size) {
                    return Err(Error::InvalidPtauSize);
                }
                size
            }
            None => ptau_size_for(constraints)?,
        };

        let name = ptau_file_name(size)?;
        let dest = self.cache_dir.join(&name);
        if dest.exists() {
            info!("Reusing cached PTAU {}", name);
        } else {
            status.log(format!("Downloading {name}..."), None);
            let url = format!("{PTAU_URL_BASE}/{name}");
            download_file(&self.client, &url, &dest).await?;
        }
        Ok((dest, PtauChoice::Size(size)))
    }
}
