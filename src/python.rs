use crate::amplify::amplified_count;
use crate::compress::{compress_with, expand, CompressedGateString};
use crate::dataset::DataSet;
use crate::derivs::DerivativeProvider;
use crate::error::{Error, Result};
use crate::fpr::{find_sufficient_fiducial_pairs, FiducialPair, PairSearchConfig, SearchMode};
use crate::gatestring::GateString;
use ndarray::Array2;
use numpy::{IntoPyArray, PyArray1, PyReadonlyArray2};
use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyTuple;
use std::collections::HashMap;

impl From<Error> for PyErr {
    fn from(e: Error) -> PyErr {
        match e {
            Error::Io(e) => PyIOError::new_err(e.to_string()),
            e => PyValueError::new_err(e.to_string()),
        }
    }
}

fn gate_strings(labels: Vec<Vec<String>>) -> Vec<GateString> {
    labels.into_iter().map(GateString::from).collect()
}

#[pyclass(name = "DataSet")]
#[derive(Clone)]
pub struct PyDataSet {
    inner: DataSet,
}

impl From<DataSet> for PyDataSet {
    fn from(inner: DataSet) -> Self {
        Self { inner }
    }
}

#[pymethods]
impl PyDataSet {
    #[new]
    fn new(spam_labels: Vec<String>) -> Self {
        DataSet::new(spam_labels).into()
    }

    /// Builds a static dataset from a `(gate strings, spam labels)` count matrix.
    #[staticmethod]
    fn from_counts(
        counts: PyReadonlyArray2<f64>,
        gate_strings: Vec<Vec<String>>,
        spam_labels: Vec<String>,
    ) -> PyResult<Self> {
        let counts = counts.as_array().to_owned();
        let ds = DataSet::new_static(counts, self::gate_strings(gate_strings), spam_labels)?;
        Ok(ds.into())
    }

    fn add_count_list(&mut self, gate_string: Vec<String>, counts: Vec<f64>) -> PyResult<()> {
        Ok(self.inner.add_count_list(gate_string.into(), &counts)?)
    }

    fn add_count_dict(
        &mut self,
        gate_string: Vec<String>,
        counts: HashMap<String, f64>,
    ) -> PyResult<()> {
        Ok(self.inner.add_count_dict(gate_string.into(), counts)?)
    }

    fn add_counts_1q(&mut self, gate_string: Vec<String>, n_plus: f64, n_minus: f64) -> PyResult<()> {
        Ok(self.inner.add_counts_1q(gate_string.into(), n_plus, n_minus)?)
    }

    fn add_counts_from(&mut self, other: &PyDataSet) -> PyResult<()> {
        Ok(self.inner.add_counts_from(&other.inner)?)
    }

    #[pyo3(signature = (gate_strings, error_if_missing=true))]
    fn truncate(&self, gate_strings: Vec<Vec<String>>, error_if_missing: bool) -> PyResult<Self> {
        let keep = self::gate_strings(gate_strings);
        Ok(self.inner.truncate(&keep, error_if_missing)?.into())
    }

    fn done_adding_data(&mut self) {
        self.inner.done_adding_data()
    }

    fn copy(&self) -> Self {
        self.inner.copy().into()
    }

    fn is_static(&self) -> bool {
        self.inner.is_static()
    }

    fn keys(&self) -> Vec<Vec<String>> {
        self.inner.keys().map(|gs| gs.to_vec()).collect()
    }

    fn get_spam_labels(&self) -> Vec<String> {
        self.inner.spam_labels().map(|s| s.to_string()).collect()
    }

    fn get_gate_labels(&self) -> Vec<String> {
        self.inner.gate_labels()
    }

    /// Counts for `gate_string` by spam label.
    fn get_row(&self, gate_string: Vec<String>) -> PyResult<HashMap<String, f64>> {
        let row = self.inner.row(&gate_string.into())?;
        Ok(row.iter().map(|(l, c)| (l.to_string(), c)).collect())
    }

    /// Counts for `gate_string` in spam-label column order.
    fn get_counts(&self, py: Python, gate_string: Vec<String>) -> PyResult<Py<PyArray1<f64>>> {
        let row = self.inner.row(&gate_string.into())?;
        Ok(row.values().to_owned().into_pyarray(py).to_owned())
    }

    fn save_to(&self, filename: &str) -> PyResult<()> {
        Ok(self.inner.save_to(filename)?)
    }

    #[staticmethod]
    fn load_from(filename: &str) -> PyResult<Self> {
        Ok(DataSet::load_from(filename)?.into())
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __contains__(&self, gate_string: Vec<String>) -> bool {
        self.inner.contains(&gate_string.into())
    }

    fn __str__(&self) -> String {
        self.inner.to_string()
    }
}

/// Gate set object exposing `num_params()`, `get_spam_labels()`,
/// `bulk_evaltree(strings)` and `bulk_dprobs(tree)`.
struct PyGateSet {
    gateset: PyObject,
    n_params: usize,
}

impl PyGateSet {
    fn new(py: Python, gateset: PyObject) -> PyResult<Self> {
        let n_params = gateset.call_method0(py, "num_params")?.extract(py)?;
        Ok(Self { gateset, n_params })
    }
}

fn provider_error(e: PyErr) -> Error {
    Error::Provider(e.to_string())
}

impl DerivativeProvider for PyGateSet {
    fn num_params(&self) -> usize {
        self.n_params
    }

    fn spam_labels(&self) -> Result<Vec<String>> {
        Python::with_gil(|py| {
            self.gateset
                .call_method0(py, "get_spam_labels")?
                .extract(py)
        })
        .map_err(provider_error)
    }

    fn bulk_dprobs(
        &self,
        gate_strings: &[GateString],
        spam_labels: &[String],
    ) -> Result<Vec<Array2<f64>>> {
        Python::with_gil(|py| -> PyResult<_> {
            let strings = gate_strings
                .iter()
                .map(|gs| PyTuple::new(py, gs.iter()))
                .collect::<Vec<_>>();
            let tree = self.gateset.call_method1(py, "bulk_evaltree", (strings,))?;
            let dprobs = self.gateset.call_method1(py, "bulk_dprobs", (tree,))?;
            spam_labels
                .iter()
                .map(|label| {
                    let d = dprobs.as_ref(py).get_item(label)?;
                    let d: PyReadonlyArray2<f64> = d.extract()?;
                    Ok(d.as_array().to_owned())
                })
                .collect()
        })
        .map_err(provider_error)
    }
}

/// Returns `(pairs, num_amplified)`: the (prep, effect) index pairs sufficient
/// to amplify every parameter the full set of fiducial pairs amplifies, and
/// their amplified count. With `test_pair_list` no search runs and the count
/// is that of the given list.
#[pyfunction]
#[pyo3(
    name = "find_sufficient_fiducial_pairs",
    signature = (
        gateset,
        prep_strs,
        effect_strs,
        germs,
        test_lengths = (256, 2048),
        spam_labels = None,
        tol = 0.75,
        search_mode = "sequential",
        n_random = 100,
        seed = None,
        test_pair_list = None,
        parallel = true
    )
)]
#[allow(clippy::too_many_arguments)]
pub fn py_find_sufficient_fiducial_pairs(
    py: Python,
    gateset: PyObject,
    prep_strs: Vec<Vec<String>>,
    effect_strs: Vec<Vec<String>>,
    germs: Vec<Vec<String>>,
    test_lengths: (usize, usize),
    spam_labels: Option<Vec<String>>,
    tol: f64,
    search_mode: &str,
    n_random: usize,
    seed: Option<u64>,
    test_pair_list: Option<Vec<FiducialPair>>,
    parallel: bool,
) -> PyResult<(Vec<FiducialPair>, usize)> {
    let config = PairSearchConfig {
        test_lengths,
        tolerance: tol,
        mode: search_mode.parse::<SearchMode>()?,
        n_random,
        seed,
        spam_labels,
        test_pair_list,
        parallel,
        ..Default::default()
    };
    let provider = PyGateSet::new(py, gateset)?;
    let preps = gate_strings(prep_strs);
    let effects = gate_strings(effect_strs);
    let germs = gate_strings(germs);
    let outcome = py.allow_threads(|| {
        find_sufficient_fiducial_pairs(&provider, &preps, &effects, &germs, &config)
    })?;
    let num_amplified = outcome.num_amplified();
    Ok((outcome.into_pairs(), num_amplified))
}

/// Number of parameters amplified between Jacobians at max lengths `l0 < l1`.
#[pyfunction]
#[pyo3(name = "amplified_count", signature = (m0, m1, l0, l1, tol = 0.75))]
pub fn py_amplified_count(
    m0: PyReadonlyArray2<f64>,
    m1: PyReadonlyArray2<f64>,
    l0: usize,
    l1: usize,
    tol: f64,
) -> usize {
    amplified_count(&m0.as_array(), &m1.as_array(), l0, l1, tol)
}

/// Compresses a gate string into `(period, repetitions)` runs.
/// Strings left uncompressed come back as one run.
#[pyfunction]
#[pyo3(
    name = "compress_gate_string",
    signature = (gate_string, min_len_to_compress = 20, max_period = 20)
)]
pub fn py_compress_gate_string(
    gate_string: Vec<String>,
    min_len_to_compress: usize,
    max_period: usize,
) -> Vec<(Vec<String>, usize)> {
    match compress_with(&gate_string.into(), min_len_to_compress, max_period) {
        CompressedGateString::Raw(gs) => vec![(gs.into_labels(), 1)],
        CompressedGateString::Runs(runs) => runs
            .into_iter()
            .map(|(period, n)| (period.into_labels(), n))
            .collect(),
    }
}

#[pyfunction]
#[pyo3(name = "expand_gate_string")]
pub fn py_expand_gate_string(runs: Vec<(Vec<String>, usize)>) -> Vec<String> {
    let runs = runs
        .into_iter()
        .map(|(period, n)| (GateString::from(period), n))
        .collect();
    expand(&CompressedGateString::Runs(runs)).into_labels()
}
