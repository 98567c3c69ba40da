pub mod error;
pub mod eval;
pub mod model;
pub mod reconcile;
pub mod retrieval;
pub mod store;
pub mod util;

pub use error::{EvalError, Result};
pub use eval::{
    FeedbackSample, LabelSetPair, MetricsReport, MetricsRequest, RankCurve, RankCurveOptions,
    compute_metrics, compute_rank_curve, sample_feedback,
};
pub use model::{Index, IndexConfiguration, Label, LabelSet, Query, RecordId, ScoredDocs};
pub use store::{QueryFilter, RecordStore, SqliteRecordStore};
