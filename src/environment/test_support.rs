// Fake libraries for the unit tests, so they don't depend on what is installed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use pyo3::exceptions::PyModuleNotFoundError;
use pyo3::prelude::*;
use pyo3::types::PyModule;

use crate::environment::dependency_guard::Importer;

/// Hands out empty Python modules with the configured `__version__`.
/// The same name always yields the same module object, like `sys.modules` would.
#[derive(Clone, Default)]
pub struct StubImporter {
    versions: HashMap<String, Option<String>>,
    attributes: HashMap<String, Vec<String>>,
    created: Rc<RefCell<HashMap<String, Py<PyModule>>>>,
}

impl StubImporter {
    pub fn new() -> Self {
        StubImporter::default()
    }

    /// The usual trio the builder always asks for, at current versions.
    pub fn with_core_libraries() -> Self {
        StubImporter::new()
            .with("numpy", Some("1.26.4"))
            .with("matplotlib", Some("3.9.2"))
            .with("matplotlib.pyplot", None)
            .with("pandas", Some("2.2.3"))
            .with_attributes("pandas", &["DataFrame", "Series", "concat", "read_csv"])
    }

    pub fn with(mut self, name: &str, version: Option<&str>) -> Self {
        self.versions
            .insert(name.to_string(), version.map(str::to_string));
        self
    }

    /// Each attribute is set to a string holding its own qualified name.
    pub fn with_attributes(mut self, name: &str, attributes: &[&str]) -> Self {
        self.attributes.insert(
            name.to_string(),
            attributes.iter().map(|a| a.to_string()).collect(),
        );
        self
    }
}

impl Importer for StubImporter {
    fn import<'py>(&self, py: Python<'py>, module_name: &str) -> PyResult<Bound<'py, PyModule>> {
        if let Some(module) = self.created.borrow().get(module_name) {
            return Ok(module.bind(py).clone());
        }
        let Some(version) = self.versions.get(module_name) else {
            return Err(PyModuleNotFoundError::new_err(format!(
                "No module named '{module_name}'"
            )));
        };

        let module = PyModule::new(py, module_name)?;
        if let Some(version) = version {
            module.setattr("__version__", version.as_str())?;
        }
        for attribute in self.attributes.get(module_name).into_iter().flatten() {
            module.setattr(attribute.as_str(), format!("{module_name}.{attribute}"))?;
        }
        self.created
            .borrow_mut()
            .insert(module_name.to_string(), module.clone().unbind());
        Ok(module)
    }
}
