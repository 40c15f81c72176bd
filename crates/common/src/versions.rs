//! Allow-listed toolchain versions.
//!
//! A build binds exactly one snarkjs version and one circom version for its
//! whole lifetime; both are resolved here, once, during validation.

/// Supported snarkjs releases, newest first. Keep synced with the
/// `snarkjs-v*` binaries installed in the runtime image.
pub const SNARKJS_VERSIONS: &[&str] = &["0.7.4", "0.7.3", "0.7.2", "0.7.1", "0.7.0", "0.6.11"];

/// Supported circom releases. Keep synced with the Dockerfile.
pub const CIRCOM_VERSIONS: &[&str] = &[
    "2.1.8", "2.1.7", "2.1.6", "2.1.5", "2.1.4", "2.1.3", "2.1.2", "2.1.1", "2.1.0", "2.0.9",
    "2.0.8",
];

/// Prefix required on the `circomPath` request field.
pub const CIRCOM_PATH_PREFIX: &str = "circom-v";

/// Newest allow-listed snarkjs version, used when the request omits one.
pub fn default_snarkjs_version() -> &'static str {
    SNARKJS_VERSIONS[0]
}

pub fn is_supported_snarkjs(version: &str) -> bool {
    SNARKJS_VERSIONS.contains(&version)
}

/// Checks the full `circomPath` value, e.g. `circom-v2.1.8`.
pub fn is_supported_circom_path(circom_path: &str) -> bool {
    circom_path
        .strip_prefix(CIRCOM_PATH_PREFIX)
        .is_some_and(|version| CIRCOM_VERSIONS.contains(&version))
}
