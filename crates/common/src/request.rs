//! Build request and response models.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::versions;

/// Proving protocol selected for a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Groth16,
    Plonk,
    Fflonk,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Groth16 => "groth16",
            Protocol::Plonk => "plonk",
            Protocol::Fflonk => "fflonk",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single staged source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub code: String,
}

/// Circuit definition: which template to instantiate as the main component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitDef {
    /// Source file reference, relative to `circuits/`, without extension.
    pub file: String,

    /// Template name to instantiate.
    pub template: String,

    /// Positional template parameters.
    #[serde(default)]
    pub params: Vec<u64>,

    /// Public signal names.
    #[serde(default)]
    pub pubs: Vec<String>,
}

/// The `payload` of a build action.
///
/// Loosely typed on the wire so that validation can report the named error
/// codes instead of a serde parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub request_id: String,

    /// Relative path -> source text.
    pub files: BTreeMap<String, SourceFile>,

    pub circuit: CircuitDef,

    /// Compiler identifier, e.g. `circom-v2.1.8`.
    pub circom_path: String,

    /// Prover library version; defaults to the newest allow-listed release.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snarkjs_version: Option<String>,

    pub protocol: String,

    /// Curve family; only the default `bn128` is supported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prime: Option<String>,

    /// Caller-supplied final proving key: base64 blob or `https://` URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_zkey: Option<String>,

    /// Force a specific PTAU exponent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ptau_size: Option<u32>,

    /// Force a specific PTAU download URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ptau_url: Option<String>,

    /// Circom `--O` level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimization: Option<u8>,
}

/// Toolchain bindings and derived names fixed at validation time.
#[derive(Debug, Clone)]
pub struct ValidatedBuild {
    pub protocol: Protocol,
    pub snarkjs_version: String,
    pub circom_path: String,
    /// Lowercased template name; the deterministic package-name prefix.
    pub circuit_name: String,
    pub prime: String,
    pub optimization: u8,
}

impl BuildRequest {
    /// Checks every request field against the validation taxonomy and binds
    /// the toolchain versions for the rest of the build. Runs before any
    /// workspace or blob-store side effects.
    pub fn validate(&self) -> Result<ValidatedBuild> {
        if self.request_id.len() < 6
            || self.request_id.len() > 40
            || !self.request_id.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(Error::InvalidRequestId);
        }

        let snarkjs_version = match &self.snarkjs_version {
            Some(version) if versions::is_supported_snarkjs(version) => version.clone(),
            Some(_) => return Err(Error::InvalidSnarkjsVersion),
            None => versions::default_snarkjs_version().to_string(),
        };

        let protocol = match self.protocol.as_str() {
            "groth16" => Protocol::Groth16,
            "plonk" => Protocol::Plonk,
            "fflonk" => Protocol::Fflonk,
            _ => return Err(Error::InvalidProtocol),
        };

        if self.files.is_empty() {
            return Err(Error::InvalidFiles);
        }

        if !versions::is_supported_circom_path(&self.circom_path) {
            return Err(Error::InvalidCircomPath);
        }

        if self.circuit.file.is_empty() || self.circuit.template.is_empty() {
            return Err(Error::InvalidCircuit);
        }

        if let Some(size) = self.ptau_size {
            if !(8..=28).contains(&size) {
                return Err(Error::InvalidPtauSize);
            }
        }

        let prime = self.prime.clone().unwrap_or_else(|| "bn128".to_string());
        if prime != "bn128" {
            // Other primes would need a locally generated PTAU.
            return Err(Error::UnsupportedPrime);
        }

        Ok(ValidatedBuild {
            protocol,
            snarkjs_version,
            circom_path: self.circom_path.clone(),
            circuit_name: self.circuit.template.to_lowercase(),
            prime,
            optimization: self.optimization.unwrap_or(2),
        })
    }
}

/// Success body: the globally unique package name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOk {
    pub package_name: String,
}

/// Failure body mirrored to the caller; the full reason lives in the
/// status log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildFailure {
    pub error_type: String,
    pub error_message: String,
}

impl BuildFailure {
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            error_type: "error".to_string(),
            error_message: message.into(),
        }
    }
}
