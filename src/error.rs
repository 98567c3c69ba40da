use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unrecognized metric: {metric}")]
    InvalidMetric { metric: String },

    #[error("label set not present in fetched queries: {label_set}")]
    MissingLabelSet { label_set: String },

    #[error("insufficient feedback candidates: requested {requested}, accepted {accepted}")]
    InsufficientCandidates { requested: usize, accepted: usize },

    #[error("index not found: {index}")]
    IndexNotFound { index: String },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("search backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, EvalError>;

impl EvalError {
    /// Caller-correctable failures, as opposed to storage or backend faults.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            EvalError::InvalidArgument(_)
                | EvalError::InvalidMetric { .. }
                | EvalError::MissingLabelSet { .. }
                | EvalError::InsufficientCandidates { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_errors_are_separated_from_faults() {
        assert!(EvalError::InvalidArgument("rank cutoff".into()).is_usage_error());
        assert!(
            EvalError::InsufficientCandidates {
                requested: 3,
                accepted: 1
            }
            .is_usage_error()
        );
        assert!(!EvalError::Backend("timeout".into()).is_usage_error());
        assert!(
            !EvalError::IndexNotFound {
                index: "vector_256".into()
            }
            .is_usage_error()
        );
    }

    #[test]
    fn messages_name_the_offending_value() {
        let error = EvalError::InvalidMetric {
            metric: "ndcg@zero".into(),
        };
        assert_eq!(error.to_string(), "unrecognized metric: ndcg@zero");
    }
}
