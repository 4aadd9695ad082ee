use thiserror_no_std::Error;

use super::PestError;

/// Diagnostics collected while deobfuscating one input.
///
/// None of these stop a run: the affected reference degrades to an empty (or
/// verbatim) value and the diagnostic is reported next to the output.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum DeobfError {
    #[error("PestError: {0}")]
    PestError(String),

    #[error("UnresolvedReference: Variable \"{0}\" is not defined")]
    UnresolvedReference(String),

    #[error("CyclicReference: Variable \"{0}\" refers back to itself")]
    CyclicReference(String),

    #[error("AmbiguousExpansion: \"{0}\" would expand again, review manually")]
    AmbiguousExpansion(String),
}

impl From<PestError> for DeobfError {
    fn from(value: PestError) -> Self {
        Self::PestError(value.to_string())
    }
}

impl std::error::Error for DeobfError {}
