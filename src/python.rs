//! Interface between Rust and Python.
//!
//! The real work happens in the other modules, and they do not use `pyo3`,
//! it's only used here.

use std::sync::Arc;

use log::info;
use numpy::{PyArray3, PyArray4, PyArrayDyn, ToPyArray};
use pyo3::exceptions::{PyKeyError, PyValueError};
use pyo3::prelude::*;

use crate::{
    config::PrecomputeConfig,
    error::PrecomputeError,
    precompute::{precompute_parallel, PrecomputedTables, TableId, TableRef},
};

impl From<PrecomputeError> for PyErr {
    fn from(e: PrecomputeError) -> Self {
        PyValueError::new_err(e.to_string())
    }
}

/// Precomputed scattering tables.
///
/// Scattering tables are dimensioned as (`height`, `view_zenith`,
/// `light_zenith`, `channel`), the optical depth and sunlight tables as
/// (`height`, `light_zenith`, `channel`).
#[pyclass(frozen)]
struct SkyTables {
    tables: Arc<PrecomputedTables>,
}

/// Implement all the "getters" for the Python properties
#[pymethods]
impl SkyTables {
    #[getter]
    fn optical_depth<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray3<f32>> {
        self.tables.optical_depth().to_channels(2).to_pyarray(py)
    }

    #[getter]
    fn sunlight<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray3<f32>> {
        self.tables.sunlight().to_channels(3).to_pyarray(py)
    }

    #[getter]
    fn transmittance<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray4<f32>> {
        self.tables.transmittance().to_channels(3).to_pyarray(py)
    }

    #[getter]
    fn rayleigh<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray4<f32>> {
        self.tables.total().rayleigh.to_channels(3).to_pyarray(py)
    }

    #[getter]
    fn mie<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray4<f32>> {
        self.tables.total().mie.to_channels(3).to_pyarray(py)
    }

    #[getter]
    fn packed<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray4<f32>> {
        self.tables.packed().to_channels(4).to_pyarray(py)
    }

    #[getter]
    fn max_scattering_order(&self) -> u32 {
        self.tables.config().max_scattering_order
    }

    /// Names of every table of this run.
    fn table_names(&self) -> Vec<String> {
        self.tables.ids().iter().map(TableId::to_string).collect()
    }

    /// Any table by name, for example `"scattering/2/mie"`.
    fn table<'py>(&self, py: Python<'py>, name: &str) -> PyResult<Bound<'py, PyArrayDyn<f32>>> {
        let not_found = || PyKeyError::new_err(format!("no table named {name:?}"));

        let id = self
            .tables
            .ids()
            .into_iter()
            .find(|id| id.to_string() == name)
            .ok_or_else(not_found)?;

        let array = match self.tables.get(id).ok_or_else(not_found)? {
            TableRef::Planar(table) => table.to_channels(id.channels()).into_dyn(),
            TableRef::Volume(table) => table.to_channels(id.channels()).into_dyn(),
        };
        Ok(array.to_pyarray(py))
    }
}

/// Precompute the atmospheric scattering tables.
///
/// `config` is a RON document; fields it leaves out take their default value,
/// and with `None` the default Earth atmosphere is used.
///
/// The number of worker threads is controlled by `num_threads`. It must be a
/// positive integer, or `None` to use the configured value (by default, the
/// number of threads is chosen automatically).
#[pyfunction]
#[pyo3(signature = (config=None, num_threads=None))]
fn generate_tables(
    py: Python<'_>,
    config: Option<&str>,
    num_threads: Option<usize>,
) -> PyResult<SkyTables> {
    let mut config = match config {
        Some(text) => PrecomputeConfig::from_ron(text)?,
        None => PrecomputeConfig::default(),
    };
    if num_threads.is_some() {
        config.num_threads = num_threads;
    }

    let tables = py.allow_threads(|| precompute_parallel(&config))?;
    info!("Generated {} tables", tables.ids().len());

    Ok(SkyTables {
        tables: Arc::new(tables),
    })
}

/// A Python module implemented in Rust.
#[pymodule]
fn precomputed_sky(m: &Bound<'_, PyModule>) -> PyResult<()> {
    pyo3_log::init();

    m.add_function(wrap_pyfunction!(generate_tables, m)?)?;
    m.add_class::<SkyTables>()?;
    Ok(())
}
