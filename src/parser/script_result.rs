use super::{Assignment, DeobfError};

/// Outcome of deobfuscating one command line or INF file.
#[derive(Debug, Clone, PartialEq)]
pub struct DeobfuscationResult {
    output: String,
    assignments: Vec<Assignment>,
    errors: Vec<DeobfError>,
    cyclic: bool,
}

impl DeobfuscationResult {
    pub(crate) fn new(
        output: String,
        assignments: Vec<Assignment>,
        errors: Vec<DeobfError>,
        cyclic: bool,
    ) -> Self {
        Self {
            output,
            assignments,
            errors,
            cyclic,
        }
    }

    /// The reconstructed command (or INF body).
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Every definition that was recorded, in source order.
    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn errors(&self) -> &[DeobfError] {
        &self.errors
    }

    /// Some reference hit a definition cycle and was replaced by an empty
    /// string.
    pub fn is_cyclic(&self) -> bool {
        self.cyclic
    }

    /// The output still contains references to defined variables, so the
    /// result depends on how many expansion passes one assumes.
    pub fn needs_review(&self) -> bool {
        self.errors
            .iter()
            .any(|err| matches!(err, DeobfError::AmbiguousExpansion(_)))
    }
}

impl std::fmt::Display for DeobfuscationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.output)
    }
}
