//! Utility functions exposed to Python.
//!
//! Provides the version string, logging setup, register set listing and the
//! flag constants of the `asmbox` module.

use asmbox_core::{MunmapFlags, RegisterSet, SandboxFlags};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use tracing_subscriber::EnvFilter;

/// Environment variable read for the log filter when none is given.
const LOG_ENV: &str = "ASMBOX_LOG";

/// Returns the package version string.
#[pyfunction]
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Installs a stderr log subscriber for the core library.
///
/// # Arguments
///
/// * `filter` - An `EnvFilter` directive such as `"asmbox_core=debug"`.
///   Defaults to `$ASMBOX_LOG`, then to `"warn"`.
///
/// # Returns
///
/// `True` if the subscriber was installed, `False` if one already was.
#[pyfunction]
#[pyo3(signature = (filter=None))]
pub fn init_logging(filter: Option<&str>) -> PyResult<bool> {
    let filter = match filter {
        Some(directives) => EnvFilter::try_new(directives)
            .map_err(|e| PyValueError::new_err(format!("Invalid log filter: {e}")))?,
        None => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    Ok(tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok())
}

/// Returns `(name, bit)` for every register set, in presentation order.
#[pyfunction]
pub fn register_sets() -> Vec<(&'static str, u32)> {
    RegisterSet::NAMED
        .iter()
        .map(|(name, set)| (*name, set.bits()))
        .collect()
}

/// Adds the `SANDBOX_*`, `MUNMAP_*` and `REG_*` constants.
pub fn add_constants(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let sandbox = [
        ("FDS", SandboxFlags::FDS),
        ("SYSCALLS", SandboxFlags::SYSCALLS),
        ("ENVIRON", SandboxFlags::ENVIRON),
        ("STACK", SandboxFlags::STACK),
        ("CPU", SandboxFlags::CPU),
        ("ALL", SandboxFlags::ALL),
    ];
    for (name, flag) in sandbox {
        m.add(format!("SANDBOX_{name}"), flag.bits())?;
    }

    let munmap = [
        ("FILE", MunmapFlags::FILE),
        ("ANON", MunmapFlags::ANON),
        ("HEAP", MunmapFlags::HEAP),
        ("ALL", MunmapFlags::ALL),
    ];
    for (name, flag) in munmap {
        m.add(format!("MUNMAP_{name}"), flag.bits())?;
    }

    for (name, set) in RegisterSet::NAMED {
        m.add(format!("REG_{}", name.to_uppercase()), set.bits())?;
    }
    m.add("REG_ALL", RegisterSet::ALL.bits())?;
    Ok(())
}
