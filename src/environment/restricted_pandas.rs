// Capability-restricted stand-in for the pandas module.
//
// This is a facade at the attribute level, not isolation: whatever an allowed function
// returns (a DataFrame, a Series, ...) is the native object with all of its methods.

use once_cell::sync::Lazy;
use pyo3::exceptions::PyAttributeError;
use pyo3::prelude::*;
use pyo3::types::PyModule;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// pandas entry points generated code may reach through the wrapper.
/// Nothing that reads or writes files, touches the network, or changes global options.
pub static ALLOWED_PANDAS_ATTRIBUTES: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    BTreeSet::from([
        "DataFrame",
        "Series",
        "Index",
        "MultiIndex",
        "RangeIndex",
        "DatetimeIndex",
        "Categorical",
        "CategoricalDtype",
        "Interval",
        "Timestamp",
        "Timedelta",
        "Period",
        "NA",
        "NaT",
        "concat",
        "merge",
        "merge_asof",
        "merge_ordered",
        "pivot",
        "pivot_table",
        "crosstab",
        "melt",
        "wide_to_long",
        "get_dummies",
        "from_dummies",
        "cut",
        "qcut",
        "factorize",
        "unique",
        "isna",
        "isnull",
        "notna",
        "notnull",
        "to_datetime",
        "to_numeric",
        "to_timedelta",
        "date_range",
        "bdate_range",
        "period_range",
        "timedelta_range",
        "interval_range",
        "Grouper",
        "NamedAgg",
    ])
});

/// Wraps the native pandas module and only forwards allow-listed attributes.
/// The wrapped module is not reachable from Python.
#[pyclass(module = "sandbox_namespace", name = "RestrictedPandas", frozen)]
pub struct RestrictedPandas {
    inner: Py<PyModule>,
}

impl RestrictedPandas {
    pub fn new(native: Bound<'_, PyModule>) -> Self {
        debug!("Wrapping {:?} in RestrictedPandas.", native.name().ok());
        RestrictedPandas {
            inner: native.unbind(),
        }
    }

    pub fn is_allowed(name: &str) -> bool {
        !name.starts_with('_') && ALLOWED_PANDAS_ATTRIBUTES.contains(name)
    }
}

#[pymethods]
impl RestrictedPandas {
    // Only called when normal lookup on the wrapper fails, i.e. for every pandas name.
    fn __getattr__(&self, py: Python<'_>, name: &str) -> PyResult<Py<PyAny>> {
        if !RestrictedPandas::is_allowed(name) {
            warn!("Generated code tried to use pandas.{name}, which is not allowed.");
            return Err(PyAttributeError::new_err(format!(
                "'{name}' is not allowed in RestrictedPandas"
            )));
        }
        self.inner.bind(py).getattr(name).map(Bound::unbind)
    }

    fn __dir__(&self) -> Vec<&'static str> {
        ALLOWED_PANDAS_ATTRIBUTES.iter().copied().collect()
    }

    fn __repr__(&self) -> String {
        "<RestrictedPandas>".to_string()
    }
}
