//! Python bindings for the asmbox execution sandbox.
//!
//! This crate exposes the core library to Python via PyO3. It provides:
//! 1. **Instance:** `Instance` for creating a sandboxed tracee, injecting code and querying state.
//! 2. **Results:** `Outcome` and `RegisterValue` snapshots returned by those calls.
//! 3. **Errors:** Core errors raised as `OSError` carrying the matching errno.
//! 4. **Utilities:** Version string, logging setup and flag constants.

use pyo3::prelude::*;

/// Python dict to Rust `InstanceConfig` conversion.
pub mod conversion;
/// Core error to Python exception mapping.
pub mod errors;
/// Instance binding (`PyInstance`).
pub mod instance;
/// Execution outcome binding (`PyOutcome`).
pub mod outcome;
/// Register value binding (`PyRegisterValue`).
pub mod registers;
/// Utility functions and module constants.
pub mod utils;

/// Registers all sandbox classes, functions and constants onto the given Python module.
///
/// # Arguments
///
/// * `m` - The Python module to register types and functions on.
///
/// # Returns
///
/// `Ok(())` on success, or a `PyErr` if registration fails.
pub fn register_sandbox_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<instance::PyInstance>()?;
    m.add_class::<outcome::PyOutcome>()?;
    m.add_class::<registers::PyRegisterValue>()?;

    m.add_function(wrap_pyfunction!(utils::version, m)?)?;
    m.add_function(wrap_pyfunction!(utils::init_logging, m)?)?;
    m.add_function(wrap_pyfunction!(utils::register_sets, m)?)?;

    utils::add_constants(m)?;
    Ok(())
}

#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    register_sandbox_module(m)?;
    Ok(())
}
