use pyo3::prelude::*;
use pyo3::wrap_pymodule;
use varadapt_core::python::adapt;

#[pymodule]
#[pyo3(name = "_lib")]
fn varadapt(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add_wrapped(wrap_pymodule!(adapt))?;
    Ok(())
}
