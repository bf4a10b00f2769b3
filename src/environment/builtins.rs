use once_cell::sync::Lazy;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyModule};
use tracing::trace;

/// Builtins left to generated code in secure mode.
/// Missing on purpose: open, eval, exec, compile, __import__, input, breakpoint,
/// getattr, setattr, delattr, globals, locals, vars, help, memoryview, exit and quit.
pub static SECURE_BUILTINS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "abs", "all", "any", "ascii", "bin", "bool", "bytearray", "bytes", "callable", "chr",
        "classmethod", "complex", "dict", "divmod", "enumerate", "filter", "float", "format",
        "frozenset", "hasattr", "hash", "hex", "id", "int", "isinstance", "issubclass", "iter",
        "len", "list", "map", "max", "min", "next", "object", "oct", "ord", "pow", "print",
        "property", "range", "repr", "reversed", "round", "set", "slice", "sorted",
        "staticmethod", "str", "sum", "super", "tuple", "type", "zip",
        // Exceptions, so generated code can still raise and catch the common ones.
        "Exception", "ArithmeticError", "AssertionError", "AttributeError", "IndexError",
        "KeyError", "LookupError", "NotImplementedError", "OverflowError", "RuntimeError",
        "StopIteration", "TypeError", "ValueError", "ZeroDivisionError",
    ]
});

/// The interpreter's builtins, untouched. Used in insecure mode.
pub fn native_builtins(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    py.import("builtins")
}

/// A fresh dict holding only the allow-listed builtins.
/// `__build_class__` keeps `class` statements working; `__name__` makes the code look like
/// a script run as `__main__`.
pub fn secure_builtins(py: Python<'_>) -> PyResult<Bound<'_, PyDict>> {
    let native = native_builtins(py)?;
    let restricted = PyDict::new(py);
    for name in SECURE_BUILTINS.iter() {
        restricted.set_item(*name, native.getattr(*name)?)?;
    }
    restricted.set_item("__build_class__", native.getattr("__build_class__")?)?;
    restricted.set_item("__name__", "__main__")?;
    trace!("Prepared {} restricted builtins.", restricted.len());
    Ok(restricted)
}
