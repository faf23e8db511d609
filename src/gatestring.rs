use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Deref};

/// An ordered sequence of gate labels.
///
/// Labels are opaque tokens; two gate strings are equal when their label
/// sequences are equal, so a `GateString` is directly usable as a map key.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GateString {
    labels: Vec<String>,
}

impl GateString {
    pub fn new<It, S>(labels: It) -> Self
    where
        It: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(|s| s.into()).collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn into_labels(self) -> Vec<String> {
        self.labels
    }

    /// `self` repeated `n` times.
    pub fn repeat(&self, n: usize) -> Self {
        Self {
            labels: (0..n).flat_map(|_| self.labels.iter().cloned()).collect(),
        }
    }

    /// Number of whole repetitions of `self` that fit within `max_length` labels.
    pub fn repeat_count_with_max_length(&self, max_length: usize) -> usize {
        if self.labels.is_empty() {
            0
        } else {
            max_length / self.labels.len()
        }
    }

    /// `self` repeated as many whole times as fit within `max_length` labels.
    pub fn repeat_with_max_length(&self, max_length: usize) -> Self {
        self.repeat(self.repeat_count_with_max_length(max_length))
    }
}

impl Deref for GateString {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.labels
    }
}

impl Add<&GateString> for &GateString {
    type Output = GateString;

    fn add(self, rhs: &GateString) -> GateString {
        let mut labels = Vec::with_capacity(self.len() + rhs.len());
        labels.extend_from_slice(&self.labels);
        labels.extend_from_slice(&rhs.labels);
        GateString { labels }
    }
}

impl From<Vec<String>> for GateString {
    fn from(labels: Vec<String>) -> Self {
        Self { labels }
    }
}

impl From<&[&str]> for GateString {
    fn from(labels: &[&str]) -> Self {
        Self::new(labels.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for GateString {
    fn from(labels: [&str; N]) -> Self {
        Self::new(labels)
    }
}

impl FromIterator<String> for GateString {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self {
            labels: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for GateString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.labels.is_empty() {
            return write!(f, "{{}}");
        }
        for label in &self.labels {
            write!(f, "{}", label)?;
        }
        Ok(())
    }
}

/// Builds the `prep + germ^n + effect` list for one germ at max length `max_length`.
///
/// Prep strings vary slowest, so the string at position `i * effects.len() + j`
/// uses `preps[i]` and `effects[j]`.
pub fn fiducial_germ_strings(
    preps: &[GateString],
    germ: &GateString,
    effects: &[GateString],
    max_length: usize,
) -> Vec<GateString> {
    let exp_germ = germ.repeat_with_max_length(max_length);
    preps
        .iter()
        .flat_map(|prep| {
            let head = prep + &exp_germ;
            effects.iter().map(move |effect| &head + effect)
        })
        .collect()
}
