use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid_requestId")]
    InvalidRequestId,

    #[error("invalid_snarkjs_version")]
    InvalidSnarkjsVersion,

    #[error("invalid_protocol")]
    InvalidProtocol,

    #[error("invalid_files")]
    InvalidFiles,

    #[error("invalid_circomPath")]
    InvalidCircomPath,

    #[error("invalid_circuit")]
    InvalidCircuit,

    #[error("invalid_ptau_size")]
    InvalidPtauSize,

    #[error("unsupported_prime")]
    UnsupportedPrime,

    #[error("invalid_directory_structure")]
    InvalidDirectoryStructure,

    #[error("invalid_command")]
    InvalidCommand,

    #[error("too_many_constraints")]
    TooManyConstraints,

    #[error("invalid_finalZkey")]
    InvalidFinalZkey,

    #[error("Download failed for {url}: status {status}")]
    Download { url: String, status: u16 },

    #[error("Transfer error for {url}: {source}")]
    Transfer {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Compiler error: {0}")]
    Compiler(String),

    #[error("Proving backend error: {0}")]
    Backend(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Is this a request-shape problem the caller can fix by correcting
    /// the payload, detected before any external tool runs?
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidRequestId
                | Error::InvalidSnarkjsVersion
                | Error::InvalidProtocol
                | Error::InvalidFiles
                | Error::InvalidCircomPath
                | Error::InvalidCircuit
                | Error::InvalidPtauSize
                | Error::UnsupportedPrime
                | Error::InvalidDirectoryStructure
                | Error::InvalidCommand
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
