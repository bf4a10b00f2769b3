use pyo3::prelude::*;
use pyo3::types::PyDict;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::environment::builtins::{native_builtins, secure_builtins};
use crate::environment::dependency_guard::{DependencyGuard, Importer, SystemImporter};
use crate::environment::errors::EnvironmentError;
use crate::environment::restricted_pandas::RestrictedPandas;

pub const BUILTINS_KEY: &str = "__builtins__";

/// A library the caller wants bound in the namespace: `module` is imported, optionally
/// narrowed to its attribute `name`, and bound under `alias`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyDescriptor {
    pub alias: String,
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl DependencyDescriptor {
    pub fn new(alias: &str, module: &str, name: Option<&str>) -> Self {
        DependencyDescriptor {
            alias: alias.to_string(),
            module: module.to_string(),
            name: name.map(str::to_string),
        }
    }

    /// Parses a JSON list of descriptors, e.g. `[{"alias": "pd", "module": "pandas"}]`.
    pub fn parse_list(json: &str) -> Result<Vec<DependencyDescriptor>, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// A library that is always part of the namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreLibrary {
    pub alias: &'static str,
    pub module: &'static str,
}

pub const PLOTTING: CoreLibrary = CoreLibrary {
    alias: "plt",
    module: "matplotlib.pyplot",
};
pub const NUMERIC: CoreLibrary = CoreLibrary {
    alias: "np",
    module: "numpy",
};
pub const TABULAR: CoreLibrary = CoreLibrary {
    alias: "pd",
    module: "pandas",
};

/// The globals generated code runs in.
///
/// Every build returns a new dict. Not `Clone`: code run in it may change or break it,
/// so it must never be handed to a second execution.
#[derive(Debug)]
pub struct ExecutionNamespace<'py> {
    globals: Bound<'py, PyDict>,
    tabular_alias: String,
}

impl<'py> ExecutionNamespace<'py> {
    pub fn get(&self, key: &str) -> PyResult<Option<Bound<'py, PyAny>>> {
        self.globals.get_item(key)
    }

    pub fn contains(&self, key: &str) -> PyResult<bool> {
        self.globals.contains(key)
    }

    pub fn keys(&self) -> PyResult<Vec<String>> {
        self.globals.keys().extract()
    }

    /// The alias the tabular-data handle ended up under.
    pub fn tabular_alias(&self) -> &str {
        &self.tabular_alias
    }

    pub fn tabular(&self) -> PyResult<Option<Bound<'py, PyAny>>> {
        self.get(&self.tabular_alias)
    }

    pub fn is_restricted(&self) -> PyResult<bool> {
        Ok(self
            .tabular()?
            .is_some_and(|handle| handle.is_instance_of::<RestrictedPandas>()))
    }

    /// Hands the dict to the caller, ready for `py.run(code, Some(&globals), None)`.
    pub fn into_globals(self) -> Bound<'py, PyDict> {
        self.globals
    }
}

/// Assembles execution namespaces. Every library goes through the dependency guard.
#[derive(Debug, Clone)]
pub struct EnvironmentBuilder<I = SystemImporter> {
    guard: DependencyGuard<I>,
}

impl EnvironmentBuilder<SystemImporter> {
    pub fn system() -> Self {
        EnvironmentBuilder::new(DependencyGuard::system())
    }
}

impl<I: Importer> EnvironmentBuilder<I> {
    pub fn new(guard: DependencyGuard<I>) -> Self {
        EnvironmentBuilder { guard }
    }

    pub fn guard(&self) -> &DependencyGuard<I> {
        &self.guard
    }

    /// Builds the namespace: `plt`, `np`, the tabular handle, one entry per descriptor and
    /// `__builtins__`.
    ///
    /// Descriptors are bound in order and a later alias silently replaces an earlier one
    /// (including `plt` and `np`). The tabular handle and `__builtins__` are bound last, so
    /// no descriptor can replace them. In secure mode the tabular handle is a
    /// `RestrictedPandas` and `__builtins__` is the allow-listed dict; otherwise both are the
    /// native objects.
    ///
    /// Any dependency that fails the guard aborts the whole build.
    pub fn build<'py>(
        &self,
        py: Python<'py>,
        additional_dependencies: &[DependencyDescriptor],
        secure: bool,
    ) -> Result<ExecutionNamespace<'py>, EnvironmentError> {
        debug!(
            "Building execution namespace (secure: {secure}) with {} additional dependencies.",
            additional_dependencies.len()
        );
        let globals = PyDict::new(py);

        for core in [&PLOTTING, &NUMERIC] {
            let module = self.guard.resolve(py, core.module, None, None)?;
            globals.set_item(core.alias, module)?;
        }

        let pandas = self.guard.resolve(py, TABULAR.module, None, None)?;
        let tabular: Bound<'py, PyAny> = if secure {
            Bound::new(py, RestrictedPandas::new(pandas))?.into_any()
        } else {
            pandas.into_any()
        };

        // The tabular library may be declared with its own alias; the last declaration wins.
        let tabular_alias = additional_dependencies
            .iter()
            .rev()
            .find(|dep| dep.module == TABULAR.module)
            .map_or(TABULAR.alias, |dep| dep.alias.as_str())
            .to_string();

        for dependency in additional_dependencies {
            let value = self.bind_descriptor(py, dependency, secure, &tabular)?;
            trace!("Binding {} to {}.", dependency.alias, value);
            globals.set_item(dependency.alias.as_str(), value)?;
        }

        globals.set_item(tabular_alias.as_str(), tabular)?;

        if secure {
            globals.set_item(BUILTINS_KEY, secure_builtins(py)?)?;
        } else {
            globals.set_item(BUILTINS_KEY, native_builtins(py)?)?;
        }

        info!(
            "Execution namespace ready with {} names (secure: {secure}).",
            globals.len()
        );
        Ok(ExecutionNamespace {
            globals,
            tabular_alias,
        })
    }

    fn bind_descriptor<'py>(
        &self,
        py: Python<'py>,
        dependency: &DependencyDescriptor,
        secure: bool,
        tabular: &Bound<'py, PyAny>,
    ) -> Result<Bound<'py, PyAny>, EnvironmentError> {
        let module = self.guard.resolve(py, &dependency.module, None, None)?;

        // In secure mode pandas, submodules included, is only ever reached through the wrapper.
        let source: Bound<'py, PyAny> = if secure && is_tabular_module(&dependency.module) {
            tabular.clone()
        } else {
            module.into_any()
        };

        let Some(name) = &dependency.name else {
            return Ok(source);
        };
        match source.getattr(name.as_str()) {
            Ok(attribute) => Ok(attribute),
            Err(e) => {
                // A name that is not there falls back to the module itself.
                debug!(
                    "{} has no usable attribute {name} ({e}), binding the module itself.",
                    dependency.module
                );
                Ok(source)
            }
        }
    }
}

/// `pandas` itself or any of its submodules (`pandas.io.api`, `pandas.core.frame`, ...).
fn is_tabular_module(module: &str) -> bool {
    module
        .strip_prefix(TABULAR.module)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

/// Convenience for `EnvironmentBuilder::system().build(...)`.
pub fn get_environment<'py>(
    py: Python<'py>,
    additional_dependencies: &[DependencyDescriptor],
    secure: bool,
) -> Result<ExecutionNamespace<'py>, EnvironmentError> {
    EnvironmentBuilder::system().build(py, additional_dependencies, secure)
}
