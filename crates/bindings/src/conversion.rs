//! Python↔Rust configuration conversion.
//!
//! Converts Python dicts into the core `InstanceConfig` via JSON serialization,
//! so the same schema is used from Python and from Rust.

use asmbox_core::InstanceConfig;
use pyo3::prelude::*;

use crate::errors::to_py_err;

/// Converts a Python dict to an `InstanceConfig`.
///
/// The dict is serialized to JSON and then deserialized and validated. Keys
/// match the Rust structure (`sandbox`, `munmap`, `stack_limit`, `niceness`);
/// missing keys take their defaults.
///
/// # Arguments
///
/// * `py` - Python interpreter handle.
/// * `dict` - A Python dict such as `{"stack_limit": 65536}`.
///
/// # Returns
///
/// The configuration, or an `OSError(EINVAL)` if the dict is invalid.
pub fn py_dict_to_config(py: Python<'_>, dict: &Bound<'_, PyAny>) -> PyResult<InstanceConfig> {
    let json = py.import("json")?;
    let dumps = json.getattr("dumps")?;
    let json_str: String = dumps.call1((dict,))?.extract()?;

    InstanceConfig::from_json(&json_str).map_err(to_py_err)
}
