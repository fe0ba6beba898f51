//! Error types
//!
//! Load-time structural problems are fatal and reported as [`ModelError`]
//! before any prediction runs. Per-position sparsity is never an error: it is
//! reported through [`crate::engine::PredictionType`] instead.

use std::fmt;
use std::io;

/// Errors raised while turning a model artifact into a [`crate::Model`].
#[derive(Debug)]
pub enum ModelError {
    /// The artifact could not be parsed.
    Json(serde_json::Error),
    /// The artifact could not be read.
    Io(io::Error),
    /// No dataplane matches the default designator.
    UnknownDefaultDataplane { dimension: String, dataplane: String },
    /// Two dataplanes share the same (dimension, dataplane) key.
    DuplicateDataplane { dimension: String, dataplane: String },
    /// A dependent source names a dataplane that does not exist.
    UnknownDependentSource { dimension: String, dataplane: String },
    /// Window of zero width, or a focus offset outside the window.
    InvalidWindow {
        dataplane: String,
        window: usize,
        before: usize,
    },
    /// A number set references a slot outside the window.
    SlotOutOfRange {
        dataplane: String,
        number_set: usize,
        slot: usize,
        window: usize,
    },
    /// A number set references a dependent tier the dataplane does not have.
    TierOutOfRange {
        dataplane: String,
        number_set: usize,
        tiers: usize,
    },
    /// A distinguished number-set index (full, identity, allow-empty) is out of range.
    NumberSetOutOfRange {
        dataplane: String,
        field: &'static str,
        index: usize,
        count: usize,
    },
    /// A number set declares a weight class that does not match its layout.
    WeightClassMismatch {
        dataplane: String,
        number_set: usize,
        declared: usize,
        computed: usize,
    },
    /// Number sets index vectors but the group table or its arrays are absent.
    MissingArrays {
        dataplane: String,
        missing: &'static str,
    },
    /// A group pairs probability and value arrays of different length.
    ArrayLengthMismatch {
        dataplane: String,
        group: usize,
        probabilities: usize,
        values: usize,
    },
    /// A char-edge framer whose layout does not fill the window exactly.
    FramerWindowMismatch {
        dataplane: String,
        expected: usize,
        window: usize,
    },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Json(e) => write!(f, "model artifact is not valid JSON: {e}"),
            ModelError::Io(e) => write!(f, "model artifact could not be read: {e}"),
            ModelError::UnknownDefaultDataplane {
                dimension,
                dataplane,
            } => write!(f, "default dataplane {dimension}/{dataplane} not found"),
            ModelError::DuplicateDataplane {
                dimension,
                dataplane,
            } => write!(f, "duplicate dataplane {dimension}/{dataplane}"),
            ModelError::UnknownDependentSource {
                dimension,
                dataplane,
            } => write!(f, "dependent source {dimension}/{dataplane} not found"),
            ModelError::InvalidWindow {
                dataplane,
                window,
                before,
            } => write!(
                f,
                "dataplane {dataplane}: invalid window {window} with focus offset {before}"
            ),
            ModelError::SlotOutOfRange {
                dataplane,
                number_set,
                slot,
                window,
            } => write!(
                f,
                "dataplane {dataplane}: number set {number_set} uses slot {slot} outside window {window}"
            ),
            ModelError::TierOutOfRange {
                dataplane,
                number_set,
                tiers,
            } => write!(
                f,
                "dataplane {dataplane}: number set {number_set} needs more than {tiers} tier(s)"
            ),
            ModelError::NumberSetOutOfRange {
                dataplane,
                field,
                index,
                count,
            } => write!(
                f,
                "dataplane {dataplane}: {field} index {index} out of range ({count} number sets)"
            ),
            ModelError::WeightClassMismatch {
                dataplane,
                number_set,
                declared,
                computed,
            } => write!(
                f,
                "dataplane {dataplane}: number set {number_set} declares weight class {declared}, layout folds {computed}"
            ),
            ModelError::MissingArrays { dataplane, missing } => write!(
                f,
                "dataplane {dataplane}: number sets index vectors but {missing} are missing"
            ),
            ModelError::ArrayLengthMismatch {
                dataplane,
                group,
                probabilities,
                values,
            } => write!(
                f,
                "dataplane {dataplane}: group {group} pairs {probabilities} probabilities with {values} values"
            ),
            ModelError::FramerWindowMismatch {
                dataplane,
                expected,
                window,
            } => write!(
                f,
                "dataplane {dataplane}: char-edge framer fills {expected} slots, window is {window}"
            ),
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModelError::Json(e) => Some(e),
            ModelError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(e: serde_json::Error) -> Self {
        ModelError::Json(e)
    }
}

impl From<io::Error> for ModelError {
    fn from(e: io::Error) -> Self {
        ModelError::Io(e)
    }
}

/// Caller errors on the prediction entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictError {
    /// The requested dataplane is not part of the model.
    UnknownDataplane { dimension: String, dataplane: String },
    /// Scored input: expected values do not line up with the sequence.
    ExpectedLengthMismatch {
        sequence: usize,
        tokens: usize,
        expected: usize,
    },
}

impl fmt::Display for PredictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictError::UnknownDataplane {
                dimension,
                dataplane,
            } => write!(f, "unknown dataplane {dimension}/{dataplane}"),
            PredictError::ExpectedLengthMismatch {
                sequence,
                tokens,
                expected,
            } => write!(
                f,
                "sequence {sequence}: {tokens} tokens but {expected} expected values"
            ),
        }
    }
}

impl std::error::Error for PredictError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_dataplane() {
        let err = ModelError::InvalidWindow {
            dataplane: "pos/text".to_string(),
            window: 3,
            before: 4,
        };
        assert!(err.to_string().contains("pos/text"));
        assert!(err.to_string().contains("focus offset 4"));
    }

    #[test]
    fn json_errors_keep_their_source() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err = ModelError::from(json_err);
        assert!(std::error::Error::source(&err).is_some());
    }
}
