//! Register value Python binding.

use asmbox_core::{RegisterData, RegisterType, RegisterValue};
use pyo3::prelude::*;

/// A register snapshot as returned by `Instance.get_registers`.
#[pyclass(name = "RegisterValue", frozen)]
#[derive(Clone, Debug)]
pub struct PyRegisterValue {
    pub inner: RegisterValue,
}

#[pymethods]
impl PyRegisterValue {
    /// The value: an `int` for integer registers, a `float` for x87 registers.
    #[getter]
    fn value(&self, py: Python<'_>) -> PyResult<PyObject> {
        let value = match self.inner.data {
            RegisterData::Float80(v) => v.to_f64().into_pyobject(py)?.into_any(),
            other => other.raw_bits().into_pyobject(py)?.into_any(),
        };
        Ok(value.unbind())
    }

    /// The raw bit pattern as an `int`; for x87 registers the 80-bit encoding.
    #[getter]
    fn raw(&self) -> u128 {
        self.inner.data.raw_bits()
    }

    /// Type tag: `"u8"` .. `"u128"` or `"f80"`.
    #[getter]
    fn r#type(&self) -> &'static str {
        match self.inner.ty() {
            RegisterType::U8 => "u8",
            RegisterType::U16 => "u16",
            RegisterType::U32 => "u32",
            RegisterType::U64 => "u64",
            RegisterType::U128 => "u128",
            RegisterType::Float80 => "f80",
        }
    }

    #[getter]
    fn bits(&self) -> u32 {
        self.inner.ty().bits()
    }

    /// Register set bit this register belongs to.
    #[getter]
    fn set(&self) -> u32 {
        self.inner.set.bits()
    }

    /// Decoded flag mnemonics, or `None` for registers without flags.
    #[getter]
    fn flags(&self) -> Option<Vec<String>> {
        self.inner.flags.clone()
    }

    fn __repr__(&self) -> String {
        match &self.inner.flags {
            Some(flags) => format!("<RegisterValue {} [{}]>", self.inner.data, flags.join(" ")),
            None => format!("<RegisterValue {}>", self.inner.data),
        }
    }
}

impl From<RegisterValue> for PyRegisterValue {
    fn from(inner: RegisterValue) -> Self {
        PyRegisterValue { inner }
    }
}
