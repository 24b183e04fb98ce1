//! Core error to Python exception mapping.
//!
//! Every core error becomes an `OSError(errno, message)`, so Python picks the
//! matching subclass (`ProcessLookupError` for a vanished tracee, for
//! instance). Using an instance after `destroy()` is a caller bug and raises
//! `RuntimeError` instead.

use asmbox_core::Error;
use pyo3::PyErr;
use pyo3::exceptions::{PyOSError, PyRuntimeError};

/// Converts a core error into an `OSError` with its errno.
pub fn to_py_err(err: Error) -> PyErr {
    PyOSError::new_err((err.errno() as i32, err.to_string()))
}

/// Error raised for any call on a destroyed instance.
pub fn destroyed() -> PyErr {
    PyRuntimeError::new_err("instance has been destroyed")
}
