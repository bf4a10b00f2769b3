use pyo3::exceptions::{PyImportError, PyRuntimeError};
use pyo3::PyErr;
use thiserror::Error;

/// Why a dependency could not be admitted into the namespace.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MissingCause {
    #[error("Missing optional dependency '{install_name}' ({reason}). Use pip or conda to install {install_name}.")]
    NotInstalled {
        install_name: String,
        reason: String,
    },
    #[error("Can't determine version for {module}.")]
    Unversioned { module: String },
    #[error("Can't verify version '{version}' of {module}.")]
    Unverifiable { module: String, version: String },
    #[error("Version '{required}' or newer of '{module}' is required (version '{found}' currently installed).")]
    TooOld {
        module: String,
        found: String,
        required: String,
    },
}

/// A dependency is absent, unverifiable or too old.
///
/// All causes are the same error kind on purpose: from the caller's side each one means
/// the capability cannot be used. The message tells them apart and ends with the
/// caller-supplied hint, if any.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{cause}{}", render_hint(.hint))]
pub struct DependencyMissing {
    pub module: String,
    pub cause: MissingCause,
    pub hint: Option<String>,
}

fn render_hint(hint: &Option<String>) -> String {
    match hint {
        Some(hint) if !hint.is_empty() => format!(" {hint}"),
        _ => String::new(),
    }
}

impl DependencyMissing {
    pub fn new(module: impl Into<String>, cause: MissingCause) -> Self {
        DependencyMissing {
            module: module.into(),
            cause,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: Option<&str>) -> Self {
        self.hint = hint.map(str::to_string);
        self
    }
}

/// Python sees every admission failure as an ordinary `ImportError`.
impl From<DependencyMissing> for PyErr {
    fn from(err: DependencyMissing) -> PyErr {
        PyImportError::new_err(err.to_string())
    }
}

/// Failure to assemble an execution namespace. Either way nothing is returned.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error(transparent)]
    DependencyMissing(#[from] DependencyMissing),
    /// The interpreter itself failed while the namespace was being filled.
    #[error("Python interpreter error while assembling the namespace: {0}")]
    Interpreter(#[from] PyErr),
}

impl EnvironmentError {
    pub fn is_dependency_missing(&self) -> bool {
        matches!(self, EnvironmentError::DependencyMissing(_))
    }
}

impl From<EnvironmentError> for PyErr {
    fn from(err: EnvironmentError) -> PyErr {
        match err {
            EnvironmentError::DependencyMissing(missing) => missing.into(),
            EnvironmentError::Interpreter(e) => {
                PyRuntimeError::new_err(format!("Namespace assembly failed: {e}"))
            }
        }
    }
}
