use std::collections::BTreeMap;

use crate::model::ScoredDocs;

mod aggregate;
mod confusion;
mod feedback;
pub mod metric;
mod rank_curve;


pub use aggregate::{
    EvaluationGroup, GroupReport, LabelSetPair, MetricsReport, MetricsRequest,
    NonComprehensiveWarning, compute_metrics, evaluate_queries,
};
pub use confusion::{Bucket, ConfusionMatrix, build_confusion_matrix};
pub use feedback::{FeedbackSample, sample_feedback, select_feedback};
pub use rank_curve::{RankCurve, RankCurveOptions, accumulate_rank_curves, compute_rank_curve};

pub type Grouping = BTreeMap<String, ScoredDocs>;
