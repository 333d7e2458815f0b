//! Python bindings for the windowed variance adaptation.
//!
//! Python drives a single process, so every collective runs over
//! [`SelfCommunicator`].

use crate::adaptation::{WindowedVarianceAdaptation, SHRINKAGE_PSEUDO_COUNT, SHRINKAGE_TARGET};
use crate::comm::SelfCommunicator;
use crate::config::AdaptationConfig;
use crate::errors::AdaptError;
use ndarray::Array1;
use numpy::{IntoPyArray, PyArray1, PyReadonlyArray1};
use pyo3::exceptions::{PyIndexError, PyValueError};
use pyo3::prelude::*;

impl From<AdaptError> for PyErr {
    fn from(e: AdaptError) -> Self {
        PyValueError::new_err(e.to_string())
    }
}

/// Python wrapper for WindowedVarianceAdaptation
///
/// Example:
///     adaptation = WindowedVarianceAdaptation(n_params=2, max_num_windows=3)
///     adaptation.add_sample(0, np.array([0.1, 0.2]))
///     variance = adaptation.learn_variance(0)
#[pyclass(name = "WindowedVarianceAdaptation", module = "varadapt.adapt")]
#[derive(Debug, Clone)]
pub struct PyWindowedVarianceAdaptation(pub WindowedVarianceAdaptation);

impl PyWindowedVarianceAdaptation {
    fn check_window(&self, win: usize) -> PyResult<()> {
        if win < self.0.num_windows() {
            Ok(())
        } else {
            Err(PyIndexError::new_err(format!(
                "window index {} is out of range for {} window(s)",
                win,
                self.0.num_windows()
            )))
        }
    }
}

#[pymethods]
impl PyWindowedVarianceAdaptation {
    #[new]
    fn new(n_params: usize, max_num_windows: usize) -> PyResult<Self> {
        Ok(Self(WindowedVarianceAdaptation::new(
            n_params,
            max_num_windows,
        )?))
    }

    /// Create one window per complete block of `window_size` iterations
    #[staticmethod]
    fn from_schedule(n_params: usize, num_iterations: usize, window_size: usize) -> PyResult<Self> {
        Ok(Self(WindowedVarianceAdaptation::from_schedule(
            n_params,
            num_iterations,
            window_size,
        )?))
    }

    /// Create from a TOML configuration string
    #[staticmethod]
    fn from_toml(contents: &str) -> PyResult<Self> {
        let config = AdaptationConfig::from_toml_str(contents)?;
        Ok(Self(WindowedVarianceAdaptation::from_config(&config)?))
    }

    #[getter]
    fn n_params(&self) -> usize {
        self.0.n_params()
    }

    #[getter]
    fn num_windows(&self) -> usize {
        self.0.num_windows()
    }

    /// Number of observations currently held by a window
    fn count(&self, win: usize) -> PyResult<usize> {
        self.check_window(win)?;
        Ok(self.0.estimator(win).stats().count())
    }

    fn add_sample(&mut self, win: usize, sample: PyReadonlyArray1<'_, f64>) -> PyResult<()> {
        self.check_window(win)?;
        Ok(self.0.add_sample(win, sample.as_array())?)
    }

    fn add_sample_to_all(&mut self, sample: PyReadonlyArray1<'_, f64>) -> PyResult<()> {
        Ok(self.0.add_sample_to_all(sample.as_array())?)
    }

    /// Finalise a window, returning the regularised variance and restarting all windows
    fn learn_variance<'py>(
        &mut self,
        py: Python<'py>,
        win: usize,
    ) -> PyResult<Bound<'py, PyArray1<f64>>> {
        self.check_window(win)?;
        let mut out_var = Array1::zeros(self.0.n_params());
        self.0.learn_variance(&mut out_var, win, &SelfCommunicator)?;
        Ok(out_var.into_pyarray_bound(py))
    }

    fn restart(&mut self) {
        self.0.restart();
    }

    fn __repr__(&self) -> String {
        format!(
            "WindowedVarianceAdaptation(n_params={}, num_windows={})",
            self.0.n_params(),
            self.0.num_windows()
        )
    }
}

#[pymodule]
pub fn adapt(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyWindowedVarianceAdaptation>()?;
    m.add("SHRINKAGE_TARGET", SHRINKAGE_TARGET)?;
    m.add("SHRINKAGE_PSEUDO_COUNT", SHRINKAGE_PSEUDO_COUNT)?;
    Ok(())
}
