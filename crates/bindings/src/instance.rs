//! Instance Python binding.
//!
//! Exposes one sandboxed tracee to Python: create with sandbox and munmap
//! flags, inject code, then inspect registers and memory. The GIL is
//! released while code runs, since that can block indefinitely.

use asmbox_core::{Instance, MunmapFlags, RegisterSet, SandboxFlags};
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyDict, PyType};

use crate::conversion::py_dict_to_config;
use crate::errors::{destroyed, to_py_err};
use crate::outcome::PyOutcome;
use crate::registers::PyRegisterValue;

/// Python-exposed instance: wraps the core `Instance`, which `destroy` consumes.
#[pyclass(name = "Instance", module = "asmbox._core")]
#[derive(Debug)]
pub struct PyInstance {
    pub inner: Option<Instance>,
}

impl PyInstance {
    fn live(&self) -> PyResult<&Instance> {
        self.inner.as_ref().ok_or_else(destroyed)
    }
}

#[pymethods]
impl PyInstance {
    /// Creates a sandboxed tracee, stopped and ready for code.
    ///
    /// # Arguments
    /// * `sandbox` - Sandbox option bits (`SANDBOX_*`).
    /// * `munmap` - Mapping classes to remove (`MUNMAP_*`).
    /// * `config` - Optional dict with `stack_limit` and `niceness`.
    ///
    /// # Errors
    /// Raises `OSError(EINVAL)` for undefined flag bits or bad limits, and
    /// `OSError` with the failing errno if the tracee could not be created.
    #[new]
    #[pyo3(signature = (sandbox=0, munmap=0, config=None))]
    fn new(
        py: Python<'_>,
        sandbox: i64,
        munmap: i64,
        config: Option<&Bound<'_, PyAny>>,
    ) -> PyResult<Self> {
        let mut cfg = match config {
            Some(dict) => py_dict_to_config(py, dict)?,
            None => Default::default(),
        };
        cfg.sandbox = SandboxFlags::from_bits(sandbox).map_err(to_py_err)?;
        cfg.munmap = MunmapFlags::from_bits(munmap).map_err(to_py_err)?;

        let instance = py
            .allow_threads(|| Instance::with_config(&cfg))
            .map_err(to_py_err)?;
        Ok(PyInstance {
            inner: Some(instance),
        })
    }

    /// Runs machine code in the tracee until it stops or terminates.
    ///
    /// Returns an `Outcome`. Empty code reports the current stop again.
    fn execute_code(&mut self, py: Python<'_>, code: &[u8]) -> PyResult<PyOutcome> {
        let instance = self.inner.as_mut().ok_or_else(destroyed)?;
        let outcome = py
            .allow_threads(|| instance.execute(code))
            .map_err(to_py_err)?;
        Ok(outcome.into())
    }

    /// Returns a dict of register name to `RegisterValue` for every set in `mask`.
    ///
    /// Keys follow the architecture's presentation order. Undefined mask
    /// bits are ignored; an empty mask returns an empty dict.
    #[pyo3(signature = (mask=RegisterSet::ALL.bits() as u64))]
    fn get_registers<'py>(&self, py: Python<'py>, mask: u64) -> PyResult<Bound<'py, PyDict>> {
        let instance = self.live()?;
        let registers = instance
            .get_registers(RegisterSet::from_bits_truncate(mask))
            .map_err(to_py_err)?;

        let d = PyDict::new(py);
        for (name, value) in registers {
            d.set_item(name, PyRegisterValue::from(value))?;
        }
        Ok(d)
    }

    /// Reads up to `length` bytes at `address`.
    ///
    /// The result is shorter than requested when the range runs into
    /// unmapped memory.
    ///
    /// # Errors
    /// Raises `OSError(EFAULT)` if `address` itself is unmapped.
    fn read_memory<'py>(
        &self,
        py: Python<'py>,
        address: u64,
        length: usize,
    ) -> PyResult<Bound<'py, PyBytes>> {
        let bytes = self
            .live()?
            .read_memory(address, length)
            .map_err(to_py_err)?;
        Ok(PyBytes::new(py, &bytes))
    }

    /// Returns `(start, end, kind, path)` for every mapping of the tracee.
    fn mappings(&self) -> PyResult<Vec<(u64, u64, String, Option<String>)>> {
        let maps = self.live()?.mappings().map_err(to_py_err)?;
        Ok(maps
            .into_iter()
            .map(|m| {
                let kind = format!("{:?}", m.kind).to_lowercase();
                let path = m.path.map(|p| p.to_string_lossy().into_owned());
                (m.start, m.end, kind, path)
            })
            .collect())
    }

    /// Kills and reaps the tracee. Calling it again does nothing.
    fn destroy(&mut self, py: Python<'_>) {
        if let Some(instance) = self.inner.take() {
            py.allow_threads(|| instance.destroy());
        }
    }

    /// Process id of the tracee.
    fn getpid(&self) -> PyResult<i32> {
        Ok(self.live()?.pid().as_raw())
    }

    /// Address injected code is placed at.
    #[getter]
    fn code_address(&self) -> PyResult<u64> {
        Ok(self.live()?.code_address())
    }

    /// Largest code buffer `execute_code` accepts.
    #[getter]
    fn code_capacity(&self) -> PyResult<usize> {
        Ok(self.live()?.code_capacity())
    }

    /// True until `destroy` is called.
    #[getter]
    fn alive(&self) -> bool {
        self.inner.is_some()
    }

    fn __enter__(slf: PyRef<'_, Self>) -> PyResult<PyRef<'_, Self>> {
        let _ = slf.live()?;
        Ok(slf)
    }

    #[pyo3(signature = (_exc_type=None, _exc_value=None, _traceback=None))]
    fn __exit__(
        &mut self,
        py: Python<'_>,
        _exc_type: Option<&Bound<'_, PyType>>,
        _exc_value: Option<&Bound<'_, PyAny>>,
        _traceback: Option<&Bound<'_, PyAny>>,
    ) -> bool {
        self.destroy(py);
        false
    }

    fn __repr__(&self) -> String {
        match &self.inner {
            Some(instance) => format!("<Instance pid={}>", instance.pid()),
            None => "<Instance destroyed>".to_string(),
        }
    }
}
