//! Periodic-run compression of gate strings for storage.
//!
//! Long gate strings built from repeated germs are stored as a list of
//! `(period, repetitions)` runs. Short strings are kept as-is.

use crate::gatestring::GateString;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_LEN_TO_COMPRESS: usize = 20;
pub const DEFAULT_MAX_PERIOD: usize = 20;

/// A gate string in storage form.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum CompressedGateString {
    /// Stored without compression.
    Raw(GateString),
    /// Consecutive runs, each a period repeated a number of times.
    Runs(Vec<(GateString, usize)>),
}

impl CompressedGateString {
    pub fn is_compressed(&self) -> bool {
        matches!(self, CompressedGateString::Runs(_))
    }
}

/// Number of exact, contiguous repetitions of `s[..period]` at the start of `s`.
fn num_periods(s: &[String], period: usize) -> usize {
    if s.len() < period {
        return 0;
    }
    let head = &s[..period];
    s.chunks_exact(period)
        .take_while(|chunk| *chunk == head)
        .count()
}

fn period_score(period: usize, n: usize) -> f64 {
    match n {
        0 => 0.0,
        1 => 4.1 / period as f64,
        n => (period as f64).sqrt() * n as f64,
    }
}

/// Compresses `gate_string` using the default thresholds.
pub fn compress(gate_string: &GateString) -> CompressedGateString {
    compress_with(gate_string, DEFAULT_MIN_LEN_TO_COMPRESS, DEFAULT_MAX_PERIOD)
}

/// Greedy periodic-run compression.
///
/// At each cursor position every period length in `1..=max_period` is scored
/// by how many times its window repeats; the best period (smallest on ties)
/// becomes the next run. Consecutive single-repetition runs are merged into
/// one literal run.
pub fn compress_with(
    gate_string: &GateString,
    min_len_to_compress: usize,
    max_period: usize,
) -> CompressedGateString {
    let labels = gate_string.labels();
    let l = labels.len();
    if l < min_len_to_compress {
        return CompressedGateString::Raw(gate_string.clone());
    }
    let max_period = max_period.max(1);

    let mut runs: Vec<(Vec<String>, usize)> = vec![];
    let mut start = 0;
    while start < l {
        let rest = &labels[start..];
        let (best_len, n, _) = (1..=max_period)
            .map(|p| {
                let n = num_periods(rest, p);
                (p, n, period_score(p, n))
            })
            .fold((0, 0, 0.0), |best, cand| if cand.2 > best.2 { cand } else { best });
        debug_assert!(best_len > 0 && n > 0);

        let period = &rest[..best_len];
        match runs.last_mut() {
            Some((prev, prev_n)) if start > 0 && n == 1 && *prev_n == 1 => {
                prev.extend_from_slice(period)
            }
            _ => runs.push((period.to_vec(), n)),
        }
        start += best_len * n;
    }

    CompressedGateString::Runs(
        runs.into_iter()
            .map(|(period, n)| (GateString::from(period), n))
            .collect(),
    )
}

/// Inverse of [`compress_with`]; raw strings are returned unchanged.
pub fn expand(compressed: &CompressedGateString) -> GateString {
    match compressed {
        CompressedGateString::Raw(gs) => gs.clone(),
        CompressedGateString::Runs(runs) => runs
            .iter()
            .flat_map(|(period, n)| {
                (0..*n).flat_map(move |_| period.labels().iter().cloned())
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn gs(labels: &[&str]) -> GateString {
        GateString::from(labels)
    }

    #[test]
    fn test_short_strings_untouched() {
        let s = gs(&["Gx", "Gy", "Gx"]);
        assert_eq!(compress(&s), CompressedGateString::Raw(s.clone()));
        assert_eq!(expand(&compress(&s)), s);
    }

    #[test]
    fn test_alternating() {
        let s = gs(&["a", "b", "a", "b", "a", "b"]);
        let c = compress_with(&s, 1, 20);
        assert_eq!(
            c,
            CompressedGateString::Runs(vec![(gs(&["a", "b"]), 3)])
        );
        assert_eq!(expand(&c), s);
    }

    #[test]
    fn test_singletons_merge() {
        let s = gs(&["a", "b", "c"]);
        let c = compress_with(&s, 1, 20);
        assert_eq!(
            c,
            CompressedGateString::Runs(vec![(gs(&["a", "b", "c"]), 1)])
        );
    }

    #[test]
    fn test_fiducial_germ_fiducial() {
        let mut labels = vec!["Gy"];
        for _ in 0..32 {
            labels.extend_from_slice(&["Gx", "Gi"]);
        }
        labels.push("Gy");
        let s = gs(&labels);
        let c = compress(&s);
        assert_eq!(
            c,
            CompressedGateString::Runs(vec![
                (gs(&["Gy"]), 1),
                (gs(&["Gx", "Gi"]), 32),
                (gs(&["Gy"]), 1),
            ])
        );
        assert_eq!(expand(&c), s);
    }

    #[test]
    fn test_zero_max_period() {
        let s = gs(&["a", "a", "b"]);
        let c = compress_with(&s, 0, 0);
        assert_eq!(expand(&c), s);
    }

    #[test]
    fn test_empty() {
        let s = GateString::empty();
        assert_eq!(expand(&compress_with(&s, 0, 5)), s);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_round_trip(
            labels in prop::collection::vec(prop::sample::select(vec!["Gx", "Gy", "Gi", "Gz"]), 0..80),
            min_len in 0usize..30,
            max_period in 0usize..25,
        ) {
            let s = gs(&labels);
            let c = compress_with(&s, min_len, max_period);
            prop_assert_eq!(expand(&c), s);
        }
    }
}
