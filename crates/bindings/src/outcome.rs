//! Execution outcome Python binding.

use asmbox_core::ExecutionOutcome;
use pyo3::prelude::*;

/// Why the tracee stopped running after `Instance.execute_code`.
///
/// `kind` is one of `"exited"`, `"signaled"`, `"stopped"`, `"continued"` or
/// `"unknown"`. `code` is set for exits, `signal` for signaled and stopped
/// outcomes, and `status` carries the raw wait status of unknown ones.
#[pyclass(name = "Outcome", frozen, eq)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PyOutcome {
    pub inner: ExecutionOutcome,
}

#[pymethods]
impl PyOutcome {
    #[getter]
    fn kind(&self) -> &'static str {
        match self.inner {
            ExecutionOutcome::Exited(_) => "exited",
            ExecutionOutcome::Signaled(_) => "signaled",
            ExecutionOutcome::Stopped(_) => "stopped",
            ExecutionOutcome::Continued => "continued",
            ExecutionOutcome::Unknown(_) => "unknown",
        }
    }

    #[getter]
    fn code(&self) -> Option<i32> {
        match self.inner {
            ExecutionOutcome::Exited(code) => Some(code),
            _ => None,
        }
    }

    #[getter]
    fn signal(&self) -> Option<i32> {
        self.inner.signal_number()
    }

    /// Signal name such as `"SIGTRAP"`, if the outcome carries a known signal.
    #[getter]
    fn signal_name(&self) -> Option<&'static str> {
        self.inner.signal().map(|sig| sig.as_str())
    }

    #[getter]
    fn status(&self) -> Option<i32> {
        match self.inner {
            ExecutionOutcome::Unknown(status) => Some(status),
            _ => None,
        }
    }

    /// True for a stop on `SIGTRAP`, the normal end of injected code.
    #[getter]
    fn is_trap(&self) -> bool {
        self.inner.is_trap()
    }

    /// True if the tracee no longer exists.
    #[getter]
    fn is_terminal(&self) -> bool {
        self.inner.is_terminal()
    }

    fn __str__(&self) -> String {
        self.inner.to_string()
    }

    fn __repr__(&self) -> String {
        format!("<Outcome {}>", self.inner)
    }
}

impl From<ExecutionOutcome> for PyOutcome {
    fn from(inner: ExecutionOutcome) -> Self {
        PyOutcome { inner }
    }
}
