//! Fiducial pair reduction.
//!
//! Finds a small set of (prep, effect) fiducial pairs whose rows of the
//! design Jacobian amplify as many gate-set parameters as the full set of
//! pairs does. Candidate subsets are tried in increasing size and the first
//! subset reaching the full-design count is returned. This is a satisficing
//! search: ties at the winning size are resolved by enumeration order only.

use crate::amplify::amplified_count;
use crate::derivs::{DerivativeCache, DerivativeProvider, ExperimentDesign};
use crate::error::{Error, Result};
use crate::gatestring::GateString;
use crate::utils::{choose, pair_from_index, unrank_combination, LexCombinations};
use ndarray::{Array2, ArrayView2, Axis};
use num_bigint::{BigUint, RandBigInt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// A fiducial pair as `(prep index, effect index)`.
pub type FiducialPair = (usize, usize);

/// How candidate subsets of one size are enumerated.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Every combination, in lexicographic order.
    #[default]
    Sequential,
    /// A seeded sample of combination positions, visited in lexicographic order.
    Random,
}

impl FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sequential" => Ok(SearchMode::Sequential),
            "random" => Ok(SearchMode::Random),
            _ => Err(Error::Config(format!("unknown search mode {:?}", s))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairSearchConfig {
    /// Max lengths `(L0, L1)` with `L0 < L1`.
    pub test_lengths: (usize, usize),
    /// Fraction of the expected amplification that must be observed.
    pub tolerance: f64,
    pub mode: SearchMode,
    /// Samples drawn per subset size in random mode.
    pub n_random: usize,
    /// Seed for random mode; `None` draws from entropy.
    pub seed: Option<u64>,
    /// Outcome labels to use; `None` means every label of the gate set.
    pub spam_labels: Option<Vec<String>>,
    /// When set, only this pair list is evaluated and no search is run.
    pub test_pair_list: Option<Vec<FiducialPair>>,
    /// Candidates evaluated together when `parallel` is on.
    pub batch_size: usize,
    pub parallel: bool,
}

impl Default for PairSearchConfig {
    fn default() -> Self {
        Self {
            test_lengths: (256, 2048),
            tolerance: 0.75,
            mode: SearchMode::default(),
            n_random: 100,
            seed: None,
            spam_labels: None,
            test_pair_list: None,
            batch_size: 64,
            parallel: true,
        }
    }
}

impl PairSearchConfig {
    pub fn with_test_lengths(mut self, l0: usize, l1: usize) -> Self {
        self.test_lengths = (l0, l1);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_random_search(mut self, n_random: usize, seed: Option<u64>) -> Self {
        self.mode = SearchMode::Random;
        self.n_random = n_random;
        self.seed = seed;
        self
    }

    pub fn with_spam_labels(mut self, labels: Vec<String>) -> Self {
        self.spam_labels = Some(labels);
        self
    }

    pub fn with_test_pair_list(mut self, pairs: Vec<FiducialPair>) -> Self {
        self.test_pair_list = Some(pairs);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let (l0, l1) = self.test_lengths;
        if l0 == 0 {
            return Err(Error::Config("L0 must be > 0".into()));
        }
        if l1 <= l0 {
            return Err(Error::Config(format!(
                "test lengths must increase, got ({}, {})",
                l0, l1
            )));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(Error::Config(format!(
                "tolerance must be finite and >= 0, got {}",
                self.tolerance
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be > 0".into()));
        }
        if self.mode == SearchMode::Random && self.n_random == 0 {
            return Err(Error::Config("n_random must be > 0 in random mode".into()));
        }
        Ok(())
    }
}

/// Result of a fiducial pair search.
#[derive(Clone, Debug, PartialEq)]
pub enum PairSearchOutcome {
    /// A proper subset reaching the full-design amplified count.
    Reduced {
        pairs: Vec<FiducialPair>,
        num_amplified: usize,
        candidates_tested: usize,
    },
    /// No proper subset matched; every pair is returned.
    Exhausted {
        pairs: Vec<FiducialPair>,
        max_amplified: usize,
        best_amplified: usize,
        candidates_tested: usize,
    },
    /// Diagnostic evaluation of a caller-supplied pair list.
    Tested {
        pairs: Vec<FiducialPair>,
        num_amplified: usize,
    },
}

impl PairSearchOutcome {
    pub fn pairs(&self) -> &[FiducialPair] {
        match self {
            PairSearchOutcome::Reduced { pairs, .. }
            | PairSearchOutcome::Exhausted { pairs, .. }
            | PairSearchOutcome::Tested { pairs, .. } => pairs,
        }
    }

    /// Amplified count of [`PairSearchOutcome::pairs`].
    pub fn num_amplified(&self) -> usize {
        match self {
            PairSearchOutcome::Reduced { num_amplified, .. }
            | PairSearchOutcome::Tested { num_amplified, .. } => *num_amplified,
            PairSearchOutcome::Exhausted { max_amplified, .. } => *max_amplified,
        }
    }

    pub fn into_pairs(self) -> Vec<FiducialPair> {
        match self {
            PairSearchOutcome::Reduced { pairs, .. }
            | PairSearchOutcome::Exhausted { pairs, .. }
            | PairSearchOutcome::Tested { pairs, .. } => pairs,
        }
    }
}

/// Amplified count of the rows of `m0`/`m1` belonging to `pairs`.
fn count_for_pairs(
    m0: ArrayView2<f64>,
    m1: ArrayView2<f64>,
    design: &ExperimentDesign,
    pairs: &[usize],
    config: &PairSearchConfig,
) -> usize {
    let rows = design.rows_for_pairs(pairs);
    let t0 = m0.select(Axis(0), &rows);
    let t1 = m1.select(Axis(0), &rows);
    let (l0, l1) = config.test_lengths;
    amplified_count(&t0, &t1, l0, l1, config.tolerance)
}

fn random_candidates(
    n_pairs: usize,
    length: usize,
    n_random: usize,
    seed: Option<u64>,
) -> Box<dyn Iterator<Item = Vec<usize>>> {
    let total = choose(n_pairs, length);
    if BigUint::from(n_random) >= total {
        return Box::new(LexCombinations::new(n_pairs, length));
    }
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut ranks = (0..n_random)
        .map(|_| rng.gen_biguint_below(&total))
        .collect::<Vec<_>>();
    ranks.sort_unstable();
    ranks.dedup();
    Box::new(
        ranks
            .into_iter()
            .filter_map(move |rank| unrank_combination(n_pairs, length, &rank)),
    )
}

/// Counts accumulated over one subset size.
#[derive(Default)]
struct RoundStats {
    tested: usize,
    best: usize,
}

/// Evaluates `candidates` in order and returns the first reaching `target`.
fn first_reaching<I>(
    candidates: I,
    m0: ArrayView2<f64>,
    m1: ArrayView2<f64>,
    design: &ExperimentDesign,
    config: &PairSearchConfig,
    target: usize,
    stats: &mut RoundStats,
) -> Option<(Vec<usize>, usize)>
where
    I: Iterator<Item = Vec<usize>>,
{
    let batch_size = if config.parallel { config.batch_size } else { 1 };
    let mut candidates = candidates.peekable();
    while candidates.peek().is_some() {
        let batch = candidates.by_ref().take(batch_size).collect::<Vec<_>>();
        let counts = if config.parallel {
            batch
                .par_iter()
                .map(|c| count_for_pairs(m0, m1, design, c, config))
                .collect::<Vec<_>>()
        } else {
            batch
                .iter()
                .map(|c| count_for_pairs(m0, m1, design, c, config))
                .collect::<Vec<_>>()
        };

        // Scan in enumeration order so the winner matches a one-by-one search.
        for (combo, n_amplified) in batch.into_iter().zip(counts) {
            stats.tested += 1;
            stats.best = stats.best.max(n_amplified);
            debug!(pairs = ?combo, n_amplified, "tested pair list");
            if n_amplified == target {
                return Some((combo, n_amplified));
            }
        }
    }
    None
}

/// Owns the design and memoized Jacobians for repeated reductions against one gate set.
pub struct FiducialPairReducer<P> {
    provider: P,
    design: ExperimentDesign,
    cache: DerivativeCache,
}

impl<P: DerivativeProvider> FiducialPairReducer<P> {
    /// `spam_labels == None` uses every label reported by the provider.
    /// A config passed to a later call may still select other labels.
    pub fn new(
        provider: P,
        preps: Vec<GateString>,
        effects: Vec<GateString>,
        germs: Vec<GateString>,
        spam_labels: Option<Vec<String>>,
    ) -> Result<Self> {
        let spam_labels = match spam_labels {
            Some(labels) => labels,
            None => provider.spam_labels()?,
        };
        Ok(Self {
            provider,
            design: ExperimentDesign::new(preps, effects, germs, spam_labels),
            cache: DerivativeCache::default(),
        })
    }

    pub fn design(&self) -> &ExperimentDesign {
        &self.design
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Flattened Jacobian at `max_length`, computed once per length.
    pub fn jacobian(&mut self, max_length: usize) -> Result<Arc<Array2<f64>>> {
        let provider = &self.provider;
        let design = &self.design;
        self.cache.get_or_try_insert_with(max_length, || {
            crate::derivs::jacobian(provider, design, max_length)
        })
    }

    /// Switches the design to `config.spam_labels` when it names a different set.
    fn use_spam_labels(&mut self, config: &PairSearchConfig) {
        if let Some(labels) = &config.spam_labels {
            if *labels != self.design.spam_labels {
                debug!(?labels, "spam labels changed, dropping cached jacobians");
                self.design.spam_labels = labels.clone();
                self.cache.clear();
            }
        }
    }

    fn jacobians(&mut self, config: &PairSearchConfig) -> Result<(Arc<Array2<f64>>, Arc<Array2<f64>>)> {
        self.use_spam_labels(config);
        let (l0, l1) = config.test_lengths;
        Ok((self.jacobian(l0)?, self.jacobian(l1)?))
    }

    fn pair_indices(&self, pairs: &[FiducialPair]) -> Result<Vec<usize>> {
        pairs
            .iter()
            .map(|&(prep, effect)| self.design.checked_pair_index(prep, effect))
            .collect()
    }

    fn to_pairs(&self, indices: &[usize]) -> Vec<FiducialPair> {
        let n_effect = self.design.effects.len();
        indices
            .iter()
            .map(|&i| pair_from_index(i, n_effect))
            .collect()
    }

    /// Amplified count using every fiducial pair.
    pub fn max_amplified(&mut self, config: &PairSearchConfig) -> Result<usize> {
        config.validate()?;
        let (m0, m1) = self.jacobians(config)?;
        let (l0, l1) = config.test_lengths;
        Ok(amplified_count(&*m0, &*m1, l0, l1, config.tolerance))
    }

    /// Amplified count of one caller-supplied pair list.
    pub fn count_amplified(
        &mut self,
        pairs: &[FiducialPair],
        config: &PairSearchConfig,
    ) -> Result<usize> {
        config.validate()?;
        let indices = self.pair_indices(pairs)?;
        let (m0, m1) = self.jacobians(config)?;
        Ok(count_for_pairs(
            m0.view(),
            m1.view(),
            &self.design,
            &indices,
            config,
        ))
    }

    /// Runs the reduction, or only evaluates `config.test_pair_list` when set.
    pub fn search(&mut self, config: &PairSearchConfig) -> Result<PairSearchOutcome> {
        config.validate()?;

        if let Some(pairs) = &config.test_pair_list {
            let num_amplified = self.count_amplified(pairs, config)?;
            info!(num_amplified, "number of amplified parameters for test pair list");
            return Ok(PairSearchOutcome::Tested {
                pairs: pairs.clone(),
                num_amplified,
            });
        }

        let (m0, m1) = self.jacobians(config)?;
        let (l0, l1) = config.test_lengths;
        let max_amplified = amplified_count(&*m0, &*m1, l0, l1, config.tolerance);
        info!(max_amplified, "maximum number of amplified parameters");

        let n_pairs = self.design.num_pairs();
        let mut candidates_tested = 0;
        let mut best_amplified = 0;
        for n_needed in 1..n_pairs {
            info!(
                n_needed,
                n_candidates = %choose(n_pairs, n_needed),
                "beginning search for a good set of pairs"
            );
            let candidates: Box<dyn Iterator<Item = Vec<usize>>> = match config.mode {
                SearchMode::Sequential => Box::new(LexCombinations::new(n_pairs, n_needed)),
                SearchMode::Random => {
                    random_candidates(n_pairs, n_needed, config.n_random, config.seed)
                }
            };

            let mut stats = RoundStats::default();
            let found = first_reaching(
                candidates,
                m0.view(),
                m1.view(),
                &self.design,
                config,
                max_amplified,
                &mut stats,
            );
            candidates_tested += stats.tested;
            best_amplified = best_amplified.max(stats.best);

            if let Some((combo, num_amplified)) = found {
                let pairs = self.to_pairs(&combo);
                info!(?pairs, num_amplified, candidates_tested, "found sufficient pairs");
                return Ok(PairSearchOutcome::Reduced {
                    pairs,
                    num_amplified,
                    candidates_tested,
                });
            }
        }

        info!(best_amplified, "highest number of amplified parameters");
        let all = (0..n_pairs).collect::<Vec<_>>();
        Ok(PairSearchOutcome::Exhausted {
            pairs: self.to_pairs(&all),
            max_amplified,
            best_amplified,
            candidates_tested,
        })
    }
}

/// One-shot reduction over `preps x effects` for the given germs.
pub fn find_sufficient_fiducial_pairs<P: DerivativeProvider>(
    provider: P,
    preps: &[GateString],
    effects: &[GateString],
    germs: &[GateString],
    config: &PairSearchConfig,
) -> Result<PairSearchOutcome> {
    config.validate()?;
    let mut reducer = FiducialPairReducer::new(
        provider,
        preps.to_vec(),
        effects.to_vec(),
        germs.to_vec(),
        config.spam_labels.clone(),
    )?;
    reducer.search(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivs::tests::LinearProvider;
    use std::cell::Cell;

    fn unit(n: usize, i: usize) -> Vec<f64> {
        let mut v = vec![0.0; n];
        v[i] = 1.0;
        v
    }

    fn config() -> PairSearchConfig {
        PairSearchConfig::default().with_test_lengths(4, 32)
    }

    /// 2 preps x 2 effects; pairs 0..3 each amplify one of three parameters, pair 3 none.
    fn three_of_four() -> LinearProvider {
        LinearProvider::new(2, vec![unit(3, 0), unit(3, 1), unit(3, 2), vec![0.0; 3]])
    }

    fn run(provider: &LinearProvider, n_prep: usize, config: &PairSearchConfig) -> Result<PairSearchOutcome> {
        let design = provider.design(n_prep);
        find_sufficient_fiducial_pairs(
            provider,
            &design.preps,
            &design.effects,
            &design.germs,
            config,
        )
    }

    #[test]
    fn test_sequential_finds_first_subset() -> Result<()> {
        let provider = three_of_four();
        let outcome = run(&provider, 2, &config())?;
        // 4 singletons + 6 pairs fail, then (0, 1, 2) is the first triple.
        assert_eq!(
            outcome,
            PairSearchOutcome::Reduced {
                pairs: vec![(0, 0), (0, 1), (1, 0)],
                num_amplified: 3,
                candidates_tested: 11,
            }
        );
        Ok(())
    }

    #[test]
    fn test_parallel_matches_serial() -> Result<()> {
        let provider = three_of_four();
        let mut serial = config().with_parallel(false);
        serial.batch_size = 1;
        let mut parallel = config();
        parallel.batch_size = 3;
        assert_eq!(run(&provider, 2, &serial)?, run(&provider, 2, &parallel)?);
        Ok(())
    }

    #[test]
    fn test_exhausted_returns_all_pairs() -> Result<()> {
        // One prep, three effects, each pair needed for its own parameter.
        let provider = LinearProvider::new(3, vec![unit(3, 0), unit(3, 1), unit(3, 2)]);
        let outcome = run(&provider, 1, &config())?;
        assert_eq!(
            outcome,
            PairSearchOutcome::Exhausted {
                pairs: vec![(0, 0), (0, 1), (0, 2)],
                max_amplified: 3,
                best_amplified: 2,
                candidates_tested: 6,
            }
        );
        assert_eq!(outcome.num_amplified(), 3);
        Ok(())
    }

    #[test]
    fn test_single_pair_design() -> Result<()> {
        let provider = LinearProvider::new(1, vec![unit(2, 0)]);
        let outcome = run(&provider, 1, &config())?;
        assert_eq!(outcome.pairs(), &[(0, 0)]);
        assert!(matches!(outcome, PairSearchOutcome::Exhausted { candidates_tested: 0, .. }));
        Ok(())
    }

    #[test]
    fn test_unamplified_parameters_ignored() -> Result<()> {
        // Pair 1 only has L-independent sensitivity.
        let mut provider = LinearProvider::new(2, vec![unit(2, 0), vec![0.0; 2]]);
        provider.fixed[1] = unit(2, 1);
        let design = provider.design(1);
        let mut reducer = FiducialPairReducer::new(
            &provider,
            design.preps.clone(),
            design.effects.clone(),
            design.germs.clone(),
            None,
        )?;
        assert_eq!(reducer.max_amplified(&config())?, 1);
        let outcome = reducer.search(&config())?;
        assert_eq!(outcome.pairs(), &[(0, 0)]);
        Ok(())
    }

    #[test]
    fn test_random_mode_reproducible() -> Result<()> {
        let provider = LinearProvider::new(
            3,
            vec![
                unit(3, 0),
                vec![0.0; 3],
                unit(3, 1),
                vec![0.0; 3],
                vec![0.0; 3],
                unit(3, 2),
            ],
        );
        let cfg = config().with_random_search(4, Some(1234));
        let a = run(&provider, 2, &cfg)?;
        let b = run(&provider, 2, &cfg)?;
        assert_eq!(a, b);
        match &a {
            PairSearchOutcome::Reduced {
                pairs,
                num_amplified,
                ..
            } => {
                assert_eq!(*num_amplified, 3);
                assert!(pairs.len() >= 3 && pairs.len() < 6);
            }
            PairSearchOutcome::Exhausted { pairs, .. } => assert_eq!(pairs.len(), 6),
            PairSearchOutcome::Tested { .. } => panic!("no test pair list was given"),
        }
        Ok(())
    }

    #[test]
    fn test_random_candidates_sorted_and_deduplicated() {
        let a = random_candidates(10, 4, 30, Some(7)).collect::<Vec<_>>();
        let b = random_candidates(10, 4, 30, Some(7)).collect::<Vec<_>>();
        assert_eq!(a, b);
        assert!(!a.is_empty() && a.len() <= 30);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
        assert!(a.iter().all(|c| c.len() == 4 && c.windows(2).all(|w| w[0] < w[1])));

        // Enough samples to cover everything falls back to full enumeration.
        let all = random_candidates(5, 2, 10, Some(7)).collect::<Vec<_>>();
        assert_eq!(all, LexCombinations::new(5, 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_pair_list_skips_search() -> Result<()> {
        struct Counting<'a> {
            inner: LinearProvider,
            calls: &'a Cell<usize>,
        }
        impl DerivativeProvider for Counting<'_> {
            fn num_params(&self) -> usize {
                self.inner.num_params()
            }
            fn spam_labels(&self) -> Result<Vec<String>> {
                self.inner.spam_labels()
            }
            fn bulk_dprobs(
                &self,
                gate_strings: &[GateString],
                spam_labels: &[String],
            ) -> Result<Vec<Array2<f64>>> {
                self.calls.set(self.calls.get() + 1);
                self.inner.bulk_dprobs(gate_strings, spam_labels)
            }
        }

        let calls = Cell::new(0);
        let provider = Counting {
            inner: three_of_four(),
            calls: &calls,
        };
        let design = provider.inner.design(2);
        let cfg = config().with_test_pair_list(vec![(0, 0), (1, 0)]);
        let outcome = find_sufficient_fiducial_pairs(
            &provider,
            &design.preps,
            &design.effects,
            &design.germs,
            &cfg,
        )?;
        assert_eq!(
            outcome,
            PairSearchOutcome::Tested {
                pairs: vec![(0, 0), (1, 0)],
                num_amplified: 2,
            }
        );
        assert_eq!(outcome.num_amplified(), 2);
        // One germ at two lengths.
        assert_eq!(calls.get(), 2);
        Ok(())
    }

    #[test]
    fn test_pair_list_out_of_range() {
        let provider = three_of_four();
        let cfg = config().with_test_pair_list(vec![(2, 0)]);
        assert!(matches!(
            run(&provider, 2, &cfg),
            Err(Error::PairOutOfRange { prep: 2, .. })
        ));
    }

    #[test]
    fn test_explicit_spam_labels() -> Result<()> {
        let provider = three_of_four();
        let cfg = config().with_spam_labels(vec!["plus".to_string()]);
        let design = provider.design(2);
        let mut reducer = FiducialPairReducer::new(
            &provider,
            design.preps.clone(),
            design.effects.clone(),
            design.germs.clone(),
            cfg.spam_labels.clone(),
        )?;
        assert_eq!(reducer.design().spam_labels, vec!["plus".to_string()]);
        assert_eq!(reducer.jacobian(4)?.dim(), (4, 3));
        Ok(())
    }

    #[test]
    fn test_search_uses_config_spam_labels() -> Result<()> {
        let provider = three_of_four();
        let design = provider.design(2);
        let mut reducer = FiducialPairReducer::new(
            &provider,
            design.preps.clone(),
            design.effects.clone(),
            design.germs.clone(),
            None,
        )?;
        assert_eq!(reducer.jacobian(4)?.dim(), (8, 3));

        let cfg = config().with_spam_labels(vec!["minus".to_string()]);
        let outcome = reducer.search(&cfg)?;
        assert_eq!(outcome.pairs(), &[(0, 0), (0, 1), (1, 0)]);
        assert_eq!(reducer.design().spam_labels, vec!["minus".to_string()]);
        let m = reducer.jacobian(4)?;
        assert_eq!(m.dim(), (4, 3));
        assert_eq!(m[(0, 0)], -4.0);

        // Without labels in the config the current design is kept.
        reducer.search(&config())?;
        assert_eq!(reducer.design().spam_labels, vec!["minus".to_string()]);
        Ok(())
    }

    #[test]
    fn test_config_validation() {
        assert!(PairSearchConfig::default().validate().is_ok());
        assert!(config().with_test_lengths(8, 8).validate().is_err());
        assert!(config().with_test_lengths(0, 8).validate().is_err());
        assert!(config().with_tolerance(f64::NAN).validate().is_err());
        assert!(config().with_random_search(0, None).validate().is_err());
        assert_eq!("random".parse::<SearchMode>().ok(), Some(SearchMode::Random));
        assert!("greedy".parse::<SearchMode>().is_err());
    }
}
