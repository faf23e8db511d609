//! Jacobians of predicted outcome probabilities over a fiducial/germ design.

use crate::error::{Error, Result};
use crate::gatestring::{fiducial_germ_strings, GateString};
use crate::utils::pair_index;
use indexmap::IndexMap;
use ndarray::{s, Array2, Array4, ArrayView2, Axis};
use std::sync::Arc;
use tracing::debug;

/// Source of probability derivatives for a target gate set.
///
/// Implementations wrap a gate-set simulator; this crate only consumes the
/// derivatives it produces.
pub trait DerivativeProvider {
    /// Number of gate-set parameters (columns of every derivative matrix).
    fn num_params(&self) -> usize;

    /// All outcome (spam) labels of the gate set.
    fn spam_labels(&self) -> Result<Vec<String>>;

    /// For each label in `spam_labels`, a `(gate_strings.len(), num_params())`
    /// matrix of d(probability)/d(parameter), in the order of `spam_labels`.
    fn bulk_dprobs(
        &self,
        gate_strings: &[GateString],
        spam_labels: &[String],
    ) -> Result<Vec<Array2<f64>>>;
}

impl<P: DerivativeProvider + ?Sized> DerivativeProvider for &P {
    fn num_params(&self) -> usize {
        (**self).num_params()
    }

    fn spam_labels(&self) -> Result<Vec<String>> {
        (**self).spam_labels()
    }

    fn bulk_dprobs(
        &self,
        gate_strings: &[GateString],
        spam_labels: &[String],
    ) -> Result<Vec<Array2<f64>>> {
        (**self).bulk_dprobs(gate_strings, spam_labels)
    }
}

/// Prep, effect and germ strings plus the outcome labels considered.
#[derive(Clone, Debug)]
pub struct ExperimentDesign {
    pub preps: Vec<GateString>,
    pub effects: Vec<GateString>,
    pub germs: Vec<GateString>,
    pub spam_labels: Vec<String>,
}

impl ExperimentDesign {
    pub fn new(
        preps: Vec<GateString>,
        effects: Vec<GateString>,
        germs: Vec<GateString>,
        spam_labels: Vec<String>,
    ) -> Self {
        Self {
            preps,
            effects,
            germs,
            spam_labels,
        }
    }

    pub fn num_pairs(&self) -> usize {
        self.preps.len() * self.effects.len()
    }

    /// Rows of a flattened Jacobian contributed by fiducial pair `pair`,
    /// one per (germ, spam label).
    pub fn rows_for_pair(&self, pair: usize) -> impl Iterator<Item = usize> {
        let n_pairs = self.num_pairs();
        let n_labels = self.spam_labels.len();
        let germ_stride = n_labels * n_pairs;
        (0..self.germs.len()).flat_map(move |i_germ| {
            (0..n_labels).map(move |i_label| i_germ * germ_stride + i_label * n_pairs + pair)
        })
    }

    /// Rows for every pair in `pairs`, grouped by pair.
    pub fn rows_for_pairs(&self, pairs: &[usize]) -> Vec<usize> {
        pairs
            .iter()
            .flat_map(|&pair| self.rows_for_pair(pair))
            .collect()
    }

    /// Composite index of `(prep, effect)`, checked against the design.
    pub fn checked_pair_index(&self, prep: usize, effect: usize) -> Result<usize> {
        if prep >= self.preps.len() || effect >= self.effects.len() {
            return Err(Error::PairOutOfRange {
                prep,
                effect,
                n_prep: self.preps.len(),
                n_effect: self.effects.len(),
            });
        }
        Ok(pair_index(prep, effect, self.effects.len()))
    }
}

/// Derivative tensor indexed by `[germ, spam label, fiducial pair, parameter]`
/// at max length `max_length`.
pub fn derivative_tensor<P>(
    provider: &P,
    design: &ExperimentDesign,
    max_length: usize,
) -> Result<Array4<f64>>
where
    P: DerivativeProvider + ?Sized,
{
    let n_params = provider.num_params();
    let n_pairs = design.num_pairs();
    let mut dp = Array4::zeros((
        design.germs.len(),
        design.spam_labels.len(),
        n_pairs,
        n_params,
    ));

    for (i_germ, germ) in design.germs.iter().enumerate() {
        let lst = fiducial_germ_strings(&design.preps, germ, &design.effects, max_length);
        let dprobs = provider.bulk_dprobs(&lst, &design.spam_labels)?;
        if dprobs.len() != design.spam_labels.len() {
            return Err(Error::Provider(format!(
                "expected derivatives for {} spam labels but received {}",
                design.spam_labels.len(),
                dprobs.len()
            )));
        }
        for (i_label, (label, d)) in design.spam_labels.iter().zip(dprobs).enumerate() {
            if d.dim() != (n_pairs, n_params) {
                return Err(Error::DerivativeShape {
                    label: label.clone(),
                    expected: (n_pairs, n_params),
                    found: d.dim(),
                });
            }
            dp.slice_mut(s![i_germ, i_label, .., ..]).assign(&d);
        }
    }
    Ok(dp)
}

/// [`derivative_tensor`] flattened to `(germs * labels * pairs, params)`.
pub fn jacobian<P>(provider: &P, design: &ExperimentDesign, max_length: usize) -> Result<Array2<f64>>
where
    P: DerivativeProvider + ?Sized,
{
    let dp = derivative_tensor(provider, design, max_length)?;
    let (n_germs, n_labels, n_pairs, n_params) = dp.dim();
    dp.into_shape((n_germs * n_labels * n_pairs, n_params))
        .map_err(|e| Error::Provider(format!("{:?}", e)))
}

/// Selects the rows of `full` belonging to `pairs`.
pub fn select_pair_rows(
    full: ArrayView2<f64>,
    design: &ExperimentDesign,
    pairs: &[usize],
) -> Array2<f64> {
    full.select(Axis(0), &design.rows_for_pairs(pairs))
}

/// Jacobians memoized by max length, evicting the oldest entry past `capacity`.
///
/// Entries are only valid for the provider and design they were built from;
/// the owner clears the cache whenever either changes.
#[derive(Debug)]
pub struct DerivativeCache {
    capacity: usize,
    entries: IndexMap<usize, Arc<Array2<f64>>>,
}

impl Default for DerivativeCache {
    fn default() -> Self {
        Self::new(4)
    }
}

impl DerivativeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, max_length: usize) -> bool {
        self.entries.contains_key(&max_length)
    }

    pub fn clear(&mut self) {
        self.entries.clear()
    }

    pub fn get_or_try_insert_with<F>(&mut self, max_length: usize, f: F) -> Result<Arc<Array2<f64>>>
    where
        F: FnOnce() -> Result<Array2<f64>>,
    {
        if let Some(m) = self.entries.get(&max_length) {
            return Ok(Arc::clone(m));
        }
        let m = Arc::new(f()?);
        while self.entries.len() >= self.capacity {
            if let Some((evicted, _)) = self.entries.shift_remove_index(0) {
                debug!(max_length = evicted, "evicting cached jacobian");
            }
        }
        self.entries.insert(max_length, Arc::clone(&m));
        Ok(m)
    }
}
