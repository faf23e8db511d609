use crate::gatestring::GateString;
use thiserror::Error;

/// Errors raised by the dataset, search and basis routines.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot add data to a static DataSet")]
    StaticDataSet,

    #[error("invalid spam label {label:?} in counts for gate string {gate_string}")]
    UnknownSpamLabel {
        label: String,
        gate_string: GateString,
    },

    #[error("spam label {label:?} was not specified in counts for gate string {gate_string}")]
    MissingSpamLabel {
        label: String,
        gate_string: GateString,
    },

    #[error("gate string {gate_string} has {found} counts but the DataSet has {expected} spam labels")]
    CountLengthMismatch {
        gate_string: GateString,
        expected: usize,
        found: usize,
    },

    #[error("gate string {0} was not found in the DataSet")]
    MissingGateString(GateString),

    #[error("spam labels differ between datasets: {ours:?} vs {theirs:?}")]
    SpamLabelMismatch {
        ours: Vec<String>,
        theirs: Vec<String>,
    },

    #[error("malformed DataSet: {0}")]
    Malformed(String),

    #[error("derivative provider failed: {0}")]
    Provider(String),

    #[error(
        "derivatives for spam label {label:?} have shape {found:?}, expected {expected:?}"
    )]
    DerivativeShape {
        label: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("fiducial pair ({prep}, {effect}) is out of range for {n_prep} prep and {n_effect} effect strings")]
    PairOutOfRange {
        prep: usize,
        effect: usize,
        n_prep: usize,
        n_effect: usize,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no basis named {name:?} with shape {shape:?} is registered")]
    UnknownBasis { name: String, shape: (usize, usize) },

    #[error("invalid basis {name:?}: {reason}")]
    InvalidBasis { name: String, reason: String },

    #[error("matrix of shape {0:?} has non-finite entries")]
    NonFinite((usize, usize)),

    #[error("linear algebra failure: {0}")]
    Linalg(#[from] ndarray_linalg::error::LinalgError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization failure: {0}")]
    Serialization(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_context() {
        let e = Error::UnknownSpamLabel {
            label: "up".to_string(),
            gate_string: GateString::from(["Gx", "Gy"]),
        };
        assert_eq!(
            e.to_string(),
            "invalid spam label \"up\" in counts for gate string GxGy"
        );

        let e = Error::CountLengthMismatch {
            gate_string: GateString::from(["Gx"]),
            expected: 2,
            found: 3,
        };
        assert_eq!(
            e.to_string(),
            "gate string Gx has 3 counts but the DataSet has 2 spam labels"
        );

        let e = Error::MissingGateString(GateString::empty());
        assert_eq!(e.to_string(), "gate string {} was not found in the DataSet");
    }

    #[test]
    fn test_from_io() {
        let e: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(e, Error::Io(_)));
        assert_eq!(e.to_string(), "gone");
    }
}
