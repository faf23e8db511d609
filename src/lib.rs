pub mod amplify;
pub mod basis;
pub mod compress;
pub mod dataset;
pub mod derivs;
pub mod error;
pub mod fpr;
pub mod gatestring;
#[cfg(feature = "python")]
mod python;
pub mod utils;

pub use crate::amplify::amplified_count;
pub use crate::basis::{Basis, BasisRegistry};
pub use crate::compress::{compress, compress_with, expand, CompressedGateString};
pub use crate::dataset::{DataSet, DataSetRow};
pub use crate::derivs::{DerivativeProvider, ExperimentDesign};
pub use crate::error::{Error, Result};
pub use crate::fpr::{
    find_sufficient_fiducial_pairs, FiducialPair, FiducialPairReducer, PairSearchConfig,
    PairSearchOutcome, SearchMode,
};
pub use crate::gatestring::GateString;

#[cfg(feature = "python")]
use crate::python::*;
#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[pymodule]
fn gst_reduction(_py: Python<'_>, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyDataSet>()?;
    m.add_wrapped(wrap_pyfunction!(py_find_sufficient_fiducial_pairs))?;
    m.add_wrapped(wrap_pyfunction!(py_amplified_count))?;
    m.add_wrapped(wrap_pyfunction!(py_compress_gate_string))?;
    m.add_wrapped(wrap_pyfunction!(py_expand_gate_string))?;
    Ok(())
}
