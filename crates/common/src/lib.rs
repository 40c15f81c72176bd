pub mod error;
pub mod request;
pub mod versions;

pub use error::{Error, Result};
pub use request::{
    BuildFailure, BuildOk, BuildRequest, CircuitDef, Protocol, SourceFile, ValidatedBuild,
};
