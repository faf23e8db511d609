//! Matrix bases for operators and superoperators, and conversion between them.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use ndarray::{arr2, Array1, Array2};
use ndarray_linalg::Inverse;
use num_complex::Complex;
use num_traits::{One, Zero};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub type Shape = (usize, usize);

/// Shape used when a lookup does not name one.
pub const DEFAULT_SHAPE: Shape = (2, 2);

const NORMALIZATION_TOL: f64 = 1e-10;

/// A named, ordered set of same-shape matrices.
#[derive(Clone, Debug)]
pub struct Basis {
    name: String,
    longname: String,
    labels: Vec<String>,
    matrices: Vec<Array2<Complex<f64>>>,
}

impl Basis {
    /// Labeled matrices; `longname` defaults to `name`.
    pub fn new(
        name: &str,
        matrices: Vec<(String, Array2<Complex<f64>>)>,
        longname: Option<&str>,
    ) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidBasis {
            name: name.to_string(),
            reason,
        };
        let shape = matrices
            .first()
            .map(|(_, m)| m.dim())
            .ok_or_else(|| invalid("need at least one matrix".into()))?;
        if let Some((label, m)) = matrices.iter().find(|(_, m)| m.dim() != shape) {
            return Err(invalid(format!(
                "matrix {} has shape {:?}, expected {:?}",
                label,
                m.dim(),
                shape
            )));
        }
        let (labels, matrices) = matrices.into_iter().unzip();
        Ok(Self {
            name: name.to_string(),
            longname: longname.unwrap_or(name).to_string(),
            labels,
            matrices,
        })
    }

    /// Matrices labeled `M0`, `M1`, ...
    pub fn from_matrices(name: &str, matrices: Vec<Array2<Complex<f64>>>) -> Result<Self> {
        let labeled = matrices
            .into_iter()
            .enumerate()
            .map(|(i, m)| (format!("M{}", i), m))
            .collect();
        Self::new(name, labeled, None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn longname(&self) -> &str {
        &self.longname
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn matrices(&self) -> &[Array2<Complex<f64>>] {
        &self.matrices
    }

    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    pub fn shape(&self) -> Shape {
        self.matrices.first().map(|m| m.dim()).unwrap_or((0, 0))
    }

    /// Whether every matrix has unit Hilbert-Schmidt norm.
    pub fn is_normalized(&self) -> bool {
        self.matrices.iter().all(|m| {
            let norm_sq = m.iter().map(|x| x.norm_sqr()).sum::<f64>();
            (norm_sq - 1.0).abs() < NORMALIZATION_TOL
        })
    }

    /// Columns are the row-major flattened basis matrices.
    pub fn to_std(&self) -> Array2<Complex<f64>> {
        let flat = self
            .matrices
            .iter()
            .map(|m| m.iter().cloned().collect::<Array1<_>>())
            .collect::<Vec<_>>();
        let (r, c) = self.shape();
        Array2::from_shape_fn((r * c, flat.len()), |(i, j)| flat[j][i])
    }

    /// Inverse of [`Basis::to_std`]; the basis must be complete.
    pub fn from_std(&self) -> Result<Array2<Complex<f64>>> {
        let to_std = self.to_std();
        if !to_std.is_square() {
            return Err(Error::InvalidBasis {
                name: self.name.clone(),
                reason: format!(
                    "{} matrices cannot span {} dimensions",
                    to_std.ncols(),
                    to_std.nrows()
                ),
            });
        }
        Ok(to_std.inv()?)
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Basis : {}", self.longname, self.labels.join(", "))
    }
}

/// Matrix units `E_ij` of a `dim x dim` space.
pub fn std_basis(dim: usize) -> Result<Basis> {
    let matrices = (0..dim)
        .flat_map(|i| (0..dim).map(move |j| (i, j)))
        .map(|(i, j)| {
            let mut m = Array2::zeros((dim, dim));
            m[(i, j)] = Complex::one();
            (format!("({},{})", i, j), m)
        })
        .collect();
    Basis::new("std", matrices, Some("Matrix-unit"))
}

/// Normalized Paulis `I, X, Y, Z` divided by sqrt(2).
pub fn pauli_product_basis() -> Result<Basis> {
    let o = Complex::<f64>::zero();
    let l = Complex::<f64>::one();
    let i = Complex::<f64>::i();
    let norm = Complex::new(std::f64::consts::FRAC_1_SQRT_2, 0.0);
    let matrices = vec![
        ("I".to_string(), arr2(&[[l, o], [o, l]])),
        ("X".to_string(), arr2(&[[o, l], [l, o]])),
        ("Y".to_string(), arr2(&[[o, -i], [i, o]])),
        ("Z".to_string(), arr2(&[[l, o], [o, -l]])),
    ]
    .into_iter()
    .map(|(label, m)| (label, m * norm))
    .collect();
    Basis::new("pp", matrices, Some("Pauli-Product"))
}

type BasisKey = (String, Shape);

/// Bases by `(name, shape)` with memoized conversion matrices.
///
/// The conversion cache holds at most `cache_capacity` entries, dropping the
/// oldest first, and is cleared whenever a basis is registered.
#[derive(Debug)]
pub struct BasisRegistry {
    bases: IndexMap<BasisKey, Arc<Basis>>,
    conversions: IndexMap<(BasisKey, BasisKey), Arc<Array2<Complex<f64>>>>,
    cache_capacity: usize,
}

impl Default for BasisRegistry {
    fn default() -> Self {
        Self::new(64)
    }
}

impl BasisRegistry {
    /// An empty registry.
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            bases: IndexMap::new(),
            conversions: IndexMap::new(),
            cache_capacity: cache_capacity.max(1),
        }
    }

    /// A registry holding the 2x2 `std` and `pp` bases.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::default();
        registry.register(std_basis(2)?);
        registry.register(pauli_product_basis()?);
        Ok(registry)
    }

    /// Adds `basis`, replacing any basis of the same name and shape.
    pub fn register(&mut self, basis: Basis) -> Arc<Basis> {
        let basis = Arc::new(basis);
        let key = (basis.name.clone(), basis.shape());
        if self.bases.insert(key, Arc::clone(&basis)).is_some() {
            debug!(name = %basis.name, "replacing registered basis");
        }
        self.conversions.clear();
        basis
    }

    pub fn contains(&self, name: &str, shape: Shape) -> bool {
        self.bases.contains_key(&(name.to_string(), shape))
    }

    /// Looks up `name` at `shape`, or at [`DEFAULT_SHAPE`] when `None`.
    pub fn get(&self, name: &str, shape: Option<Shape>) -> Result<Arc<Basis>> {
        let shape = shape.unwrap_or(DEFAULT_SHAPE);
        self.bases
            .get(&(name.to_string(), shape))
            .cloned()
            .ok_or_else(|| Error::UnknownBasis {
                name: name.to_string(),
                shape,
            })
    }

    /// `from_std(to) . to_std(from)`: maps coefficients in `from` to coefficients in `to`.
    pub fn conversion_matrix(
        &mut self,
        from: &str,
        to: &str,
        shape: Option<Shape>,
    ) -> Result<Arc<Array2<Complex<f64>>>> {
        let shape = shape.unwrap_or(DEFAULT_SHAPE);
        let key = ((from.to_string(), shape), (to.to_string(), shape));
        if let Some(m) = self.conversions.get(&key) {
            return Ok(Arc::clone(m));
        }

        let from_basis = self.get(from, Some(shape))?;
        let to_basis = self.get(to, Some(shape))?;
        let m = Arc::new(to_basis.from_std()?.dot(&from_basis.to_std()));

        while self.conversions.len() >= self.cache_capacity {
            self.conversions.shift_remove_index(0);
        }
        self.conversions.insert(key, Arc::clone(&m));
        Ok(m)
    }

    /// Re-expresses a coefficient vector from `from` to `to`.
    pub fn change_basis_vector(
        &mut self,
        v: &Array1<Complex<f64>>,
        from: &str,
        to: &str,
        shape: Option<Shape>,
    ) -> Result<Array1<Complex<f64>>> {
        Ok(self.conversion_matrix(from, to, shape)?.dot(v))
    }

    /// Re-expresses a superoperator `mx` from `from` to `to`.
    pub fn change_basis(
        &mut self,
        mx: &Array2<Complex<f64>>,
        from: &str,
        to: &str,
        shape: Option<Shape>,
    ) -> Result<Array2<Complex<f64>>> {
        let forward = self.conversion_matrix(from, to, shape)?;
        let backward = self.conversion_matrix(to, from, shape)?;
        Ok(forward.dot(mx).dot(&*backward))
    }

    pub fn cached_conversions(&self) -> usize {
        self.conversions.len()
    }

    pub fn clear_cache(&mut self) {
        self.conversions.clear()
    }
}
