// Admission of Python libraries into the execution namespace.
// Every dynamic import the crate performs goes through `DependencyGuard::resolve`.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use pyo3::exceptions::PyImportError;
use pyo3::prelude::*;
use pyo3::types::PyModule;
use tracing::{debug, trace, warn};

use crate::environment::errors::{DependencyMissing, MissingCause};
use crate::environment::version::PythonVersion;

/// Import names whose distribution is published under a different name.
static INSTALL_NAMES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("PIL", "pillow"),
        ("sklearn", "scikit-learn"),
        ("shapefile", "pyshp"),
        ("yaml", "pyyaml"),
        ("cv2", "opencv-python"),
    ])
});

/// Oldest releases the namespace is known to work with, keyed by top-level package.
pub static DEFAULT_MIN_VERSIONS: Lazy<HashMap<String, String>> = Lazy::new(|| {
    HashMap::from([
        ("numpy".to_string(), "1.17.0".to_string()),
        ("pandas".to_string(), "1.0.0".to_string()),
        ("matplotlib".to_string(), "3.0.0".to_string()),
    ])
});

/// The single place where a library is looked up by its name.
pub trait Importer {
    fn import<'py>(&self, py: Python<'py>, module_name: &str) -> PyResult<Bound<'py, PyModule>>;
}

/// Imports through the interpreter's own import system (and its `sys.modules` cache).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemImporter;

impl Importer for SystemImporter {
    fn import<'py>(&self, py: Python<'py>, module_name: &str) -> PyResult<Bound<'py, PyModule>> {
        PyModule::import(py, module_name)
    }
}

#[derive(Debug, Clone)]
pub struct DependencyGuard<I = SystemImporter> {
    importer: I,
    min_versions: HashMap<String, String>,
}

impl DependencyGuard<SystemImporter> {
    pub fn system() -> Self {
        DependencyGuard::new(SystemImporter)
    }
}

impl<I: Importer> DependencyGuard<I> {
    pub fn new(importer: I) -> Self {
        DependencyGuard {
            importer,
            min_versions: DEFAULT_MIN_VERSIONS.clone(),
        }
    }

    /// Replaces or adds minimum versions, keyed by top-level package.
    pub fn with_min_versions(mut self, overrides: &HashMap<String, String>) -> Self {
        self.min_versions
            .extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Imports `module_name` and checks that it declares a version of at least
    /// `min_version` (or the default minimum for its top-level package).
    /// The module is returned as imported.
    ///
    /// `extra` is appended verbatim to the error message, usually install instructions.
    pub fn resolve<'py>(
        &self,
        py: Python<'py>,
        module_name: &str,
        min_version: Option<&str>,
        extra: Option<&str>,
    ) -> Result<Bound<'py, PyModule>, DependencyMissing> {
        self.resolve_versioned(py, module_name, min_version, extra)
            .map(|(module, _)| module)
    }

    /// Same as `resolve`, also returning the version that was checked.
    /// For a submodule that is the version of its top-level package.
    pub fn resolve_versioned<'py>(
        &self,
        py: Python<'py>,
        module_name: &str,
        min_version: Option<&str>,
        extra: Option<&str>,
    ) -> Result<(Bound<'py, PyModule>, String), DependencyMissing> {
        trace!("Resolving dependency {module_name}.");
        let module = self.importer.import(py, module_name).map_err(|e| {
            if !e.is_instance_of::<PyImportError>(py) {
                // Still not usable; the module blew up while being imported.
                warn!("Importing {module_name} raised a non-import error: {e}");
            }
            DependencyMissing::new(
                module_name,
                MissingCause::NotInstalled {
                    install_name: install_name(module_name).to_string(),
                    reason: e.to_string(),
                },
            )
            .with_hint(extra)
        })?;

        // Submodules like matplotlib.pyplot carry no version of their own.
        let parent = top_level_package(module_name);
        let versioned = if parent == module_name {
            module.clone()
        } else {
            self.importer.import(py, parent).map_err(|e| {
                DependencyMissing::new(
                    module_name,
                    MissingCause::NotInstalled {
                        install_name: install_name(parent).to_string(),
                        reason: e.to_string(),
                    },
                )
                .with_hint(extra)
            })?
        };

        let found = version(&versioned).map_err(|e| e.with_hint(extra))?;
        debug!("Found {parent} version {found}.");

        let required = min_version.or_else(|| self.min_versions.get(parent).map(String::as_str));
        if let Some(required) = required {
            check_minimum(parent, &found, required).map_err(|e| e.with_hint(extra))?;
        }

        Ok((module, found))
    }

    /// Like `resolve`, but a missing dependency is only logged.
    /// Meant for probing what is installed; never used to fill a namespace.
    pub fn resolve_optional<'py>(
        &self,
        py: Python<'py>,
        module_name: &str,
        min_version: Option<&str>,
    ) -> Option<Bound<'py, PyModule>> {
        match self.resolve(py, module_name, min_version, None) {
            Ok(module) => Some(module),
            Err(e) => {
                warn!("Optional dependency {module_name} is not usable: {e}");
                None
            }
        }
    }
}

/// Reads `__version__` off a module.
/// A module without one is an error, never "unknown", so version checks cannot pass silently.
pub fn version(module: &Bound<'_, PyModule>) -> Result<String, DependencyMissing> {
    let name = module
        .name()
        .map(|n| n.to_string())
        .unwrap_or_else(|_| "<unnamed module>".to_string());
    let unversioned = || {
        DependencyMissing::new(
            name.clone(),
            MissingCause::Unversioned {
                module: name.clone(),
            },
        )
    };

    let declared = match module.getattr("__version__") {
        Ok(declared) if !declared.is_none() => declared,
        _ => return Err(unversioned()),
    };
    match declared.extract::<String>() {
        Ok(version) => Ok(version),
        // Some packages expose a version object instead of a plain string.
        Err(_) => declared
            .str()
            .map(|s| s.to_string())
            .map_err(|_| unversioned()),
    }
}

fn check_minimum(module: &str, found: &str, required: &str) -> Result<(), DependencyMissing> {
    let unverifiable = |version: &str| {
        DependencyMissing::new(
            module,
            MissingCause::Unverifiable {
                module: module.to_string(),
                version: version.to_string(),
            },
        )
    };
    let found_version = PythonVersion::parse(found).map_err(|_| unverifiable(found))?;
    let required_version = PythonVersion::parse(required).map_err(|_| unverifiable(required))?;

    if found_version < required_version {
        return Err(DependencyMissing::new(
            module,
            MissingCause::TooOld {
                module: module.to_string(),
                found: found.to_string(),
                required: required.to_string(),
            },
        ));
    }
    Ok(())
}

fn top_level_package(module_name: &str) -> &str {
    module_name.split('.').next().unwrap_or(module_name)
}

fn install_name(module_name: &str) -> &str {
    INSTALL_NAMES
        .get(module_name)
        .copied()
        .unwrap_or(module_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::test_support::StubImporter;

    #[test]
    fn test_resolve_success() {
        Python::with_gil(|py| {
            let guard = DependencyGuard::new(StubImporter::new().with("numpy", Some("1.26.4")));
            let module = guard.resolve(py, "numpy", None, None);
            assert!(module.is_ok(), "{:?}", module.err());
        });
    }

    #[test]
    fn test_resolve_returns_module_unchanged() {
        Python::with_gil(|py| {
            let importer = StubImporter::new().with("numpy", Some("1.26.4"));
            let guard = DependencyGuard::new(importer.clone());
            let expected = importer.import(py, "numpy").expect("stub numpy");
            let module = guard
                .resolve(py, "numpy", Some("1.26.4"), None)
                .expect("same version is enough");
            assert_eq!(module.as_ptr(), expected.as_ptr());
        });
    }

    #[test]
    fn test_resolve_missing() {
        Python::with_gil(|py| {
            let guard = DependencyGuard::new(StubImporter::new());
            let err = guard
                .resolve(py, "non_existent_module", None, None)
                .expect_err("module does not exist");
            assert!(matches!(err.cause, MissingCause::NotInstalled { .. }));
            assert_eq!(err.module, "non_existent_module");
        });
    }

    #[test]
    fn test_resolve_missing_uses_install_name() {
        Python::with_gil(|py| {
            let guard = DependencyGuard::new(StubImporter::new());
            let err = guard
                .resolve(py, "sklearn", None, None)
                .expect_err("module does not exist");
            assert!(err.to_string().contains("install scikit-learn"), "{err}");
        });
    }

    #[test]
    fn test_resolve_with_extra_message() {
        Python::with_gil(|py| {
            let guard = DependencyGuard::new(StubImporter::new());
            let err = guard
                .resolve(py, "non_existent_module", None, Some("Please install it."))
                .expect_err("module does not exist");
            assert!(err.to_string().contains("Please install it."));
        });
    }

    #[test]
    fn test_resolve_version_too_old() {
        Python::with_gil(|py| {
            let guard = DependencyGuard::new(StubImporter::new().with("numpy", Some("0.9.0")));
            let err = guard
                .resolve(py, "numpy", Some("1.0.0"), Some("Upgrade numpy."))
                .expect_err("0.9.0 is below 1.0.0");
            assert_eq!(
                err.cause,
                MissingCause::TooOld {
                    module: "numpy".to_string(),
                    found: "0.9.0".to_string(),
                    required: "1.0.0".to_string(),
                }
            );
            assert!(err.to_string().ends_with("Upgrade numpy."));
        });
    }

    #[test]
    fn test_resolve_uses_default_minimum() {
        Python::with_gil(|py| {
            let guard = DependencyGuard::new(StubImporter::new().with("pandas", Some("0.25.3")));
            assert!(guard.resolve(py, "pandas", None, None).is_err());

            let relaxed = HashMap::from([("pandas".to_string(), "0.20".to_string())]);
            let guard = guard.with_min_versions(&relaxed);
            assert!(guard.resolve(py, "pandas", None, None).is_ok());
        });
    }

    #[test]
    fn test_resolve_unversioned_module() {
        Python::with_gil(|py| {
            let guard = DependencyGuard::new(StubImporter::new().with("mystery", None));
            let err = guard
                .resolve(py, "mystery", None, None)
                .expect_err("no version declared");
            assert!(matches!(err.cause, MissingCause::Unversioned { .. }));
        });
    }

    #[test]
    fn test_resolve_unparseable_version() {
        Python::with_gil(|py| {
            let guard = DependencyGuard::new(StubImporter::new().with("odd", Some("nightly")));
            let err = guard
                .resolve(py, "odd", Some("1.0"), None)
                .expect_err("cannot compare 'nightly'");
            assert!(matches!(err.cause, MissingCause::Unverifiable { .. }));
        });
    }

    #[test]
    fn test_resolve_submodule_reads_parent_version() {
        Python::with_gil(|py| {
            let importer = StubImporter::new()
                .with("matplotlib", Some("2.2.0"))
                .with("matplotlib.pyplot", None);
            let guard = DependencyGuard::new(importer);
            // pyplot itself has no __version__, matplotlib's is checked against 3.0.0.
            let err = guard
                .resolve(py, "matplotlib.pyplot", None, None)
                .expect_err("matplotlib 2.2.0 is too old");
            assert!(matches!(err.cause, MissingCause::TooOld { .. }));

            let guard = DependencyGuard::new(
                StubImporter::new()
                    .with("matplotlib", Some("3.9.2"))
                    .with("matplotlib.pyplot", None),
            );
            assert!(guard.resolve(py, "matplotlib.pyplot", None, None).is_ok());
        });
    }

    #[test]
    fn test_resolve_versioned_submodule_reports_parent_version() {
        Python::with_gil(|py| {
            let importer = StubImporter::new()
                .with("matplotlib", Some("3.9.2"))
                .with("matplotlib.pyplot", None);
            let guard = DependencyGuard::new(importer.clone());
            let (module, found) = guard
                .resolve_versioned(py, "matplotlib.pyplot", Some("3.5"), None)
                .expect("matplotlib 3.9.2 is recent enough");
            assert_eq!(found, "3.9.2");
            let pyplot = importer.import(py, "matplotlib.pyplot").expect("stub pyplot");
            assert_eq!(module.as_ptr(), pyplot.as_ptr());
            // The submodule on its own has nothing to read.
            assert!(version(&module).is_err());
        });
    }

    #[test]
    fn test_resolve_optional_swallows_errors() {
        Python::with_gil(|py| {
            let guard = DependencyGuard::new(StubImporter::new().with("xarray", Some("2024.1.0")));
            assert!(guard.resolve_optional(py, "xarray", None).is_some());
            assert!(guard.resolve_optional(py, "cartopy", None).is_none());
        });
    }

    #[test]
    fn test_get_version_success() {
        Python::with_gil(|py| {
            let module = StubImporter::new()
                .with("numpy", Some("1.0.0"))
                .import(py, "numpy")
                .expect("stub numpy");
            assert_eq!(version(&module).expect("declared"), "1.0.0");
        });
    }

    #[test]
    fn test_get_version_failure() {
        Python::with_gil(|py| {
            let module = StubImporter::new()
                .with("numpy", None)
                .import(py, "numpy")
                .expect("stub numpy");
            let err = version(&module).expect_err("no __version__");
            assert!(err.to_string().contains("numpy"));
        });
    }

    #[test]
    fn test_get_version_none_is_missing() {
        Python::with_gil(|py| {
            let module = PyModule::new(py, "halfbaked").expect("new module");
            module
                .setattr("__version__", py.None())
                .expect("set version");
            assert!(version(&module).is_err());
        });
    }
}
