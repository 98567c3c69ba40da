use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::confusion::{ConfusionMatrix, build_confusion_matrix};
use super::metric::{MetricRequest, MetricSpec, parse_metric_tokens};
use super::Grouping;
use crate::error::{EvalError, Result};
use crate::model::{Query, ScoredDocs};
use crate::store::{QueryFilter, RecordStore};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelSetPair {
    pub reference: String,
    pub candidate: String,
}

impl LabelSetPair {
    pub fn new(reference: impl Into<String>, candidate: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            candidate: candidate.into(),
        }
    }
}

impl FromStr for LabelSetPair {
    type Err = EvalError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.split_once(':') {
            Some((reference, candidate))
                if !reference.trim().is_empty() && !candidate.trim().is_empty() =>
            {
                Ok(Self::new(reference.trim(), candidate.trim()))
            }
            _ => Err(EvalError::InvalidArgument(format!(
                "label set pair must look like reference:candidate, got {raw:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsRequest {
    pub metrics: Vec<String>,
    /// Paired mode when present.
    pub pairs: Option<Vec<LabelSetPair>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EvaluationGroup {
    LabelSet { label_set: String },
    Pair { reference: String, candidate: String },
}

impl fmt::Display for EvaluationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LabelSet { label_set } => write!(f, "{label_set}"),
            Self::Pair {
                reference,
                candidate,
            } => write!(f, "{reference} vs {candidate}"),
        }
    }
}

/// NDCG requested against judgments that leave unlisted documents unjudged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NonComprehensiveWarning {
    pub label_set: String,
    pub metric: String,
}

impl fmt::Display for NonComprehensiveWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} requested on non-comprehensive label set {}",
            self.metric, self.label_set
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupReport {
    pub group: EvaluationGroup,
    pub judged_queries: usize,
    /// `None` when no query was judged in this group.
    pub metrics: BTreeMap<String, Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confusion_matrix: Option<ConfusionMatrix>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    pub query_count: usize,
    pub groups: Vec<GroupReport>,
    pub warnings: Vec<NonComprehensiveWarning>,
}

impl MetricsReport {
    pub fn group(&self, group: &str) -> Option<&GroupReport> {
        self.groups
            .iter()
            .find(|report| report.group.to_string() == group)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOrder {
    Mapping,
    /// Descending score, ties in mapping order. Used for label sets acting as runs.
    ScoreDesc,
}

#[derive(Debug, Default)]
struct LabelSetJudgments {
    relevance: Grouping,
    comprehensive: bool,
}

#[derive(Debug, Default)]
struct EvaluationIndex {
    predictions: Grouping,
    label_sets: BTreeMap<String, LabelSetJudgments>,
}

impl EvaluationIndex {
    fn build(queries: &[Query]) -> Self {
        let mut index = EvaluationIndex::default();
        for query in queries {
            if index
                .predictions
                .insert(query.key.clone(), query.predictions.clone())
                .is_some()
            {
                debug!(key = %query.key, "later query record replaces earlier predictions");
            }

            for label in &query.labels {
                let judgments = index
                    .label_sets
                    .entry(label.label_set.name.clone())
                    .or_insert_with(|| LabelSetJudgments {
                        relevance: Grouping::new(),
                        comprehensive: true,
                    });
                judgments.comprehensive &= label.comprehensive;
                judgments
                    .relevance
                    .insert(query.key.clone(), label.relevant_docs.clone());
            }
        }
        index
    }

    fn label_set(&self, name: &str) -> Result<&LabelSetJudgments> {
        self.label_sets
            .get(name)
            .ok_or_else(|| EvalError::MissingLabelSet {
                label_set: name.to_string(),
            })
    }
}

pub fn compute_metrics<S: RecordStore + ?Sized>(
    store: &S,
    filter: &QueryFilter,
    request: &MetricsRequest,
) -> Result<MetricsReport> {
    filter.validate()?;
    parse_metric_tokens(&request.metrics)?;

    let queries = store.find_queries(filter)?;
    let report = evaluate_queries(&queries, request)?;
    info!(
        queries = report.query_count,
        groups = report.groups.len(),
        warnings = report.warnings.len(),
        "metrics computed"
    );
    Ok(report)
}

pub fn evaluate_queries(queries: &[Query], request: &MetricsRequest) -> Result<MetricsReport> {
    let requested = parse_metric_tokens(&request.metrics)?;
    let index = EvaluationIndex::build(queries);

    let mut groups = Vec::<GroupReport>::new();
    let mut warnings = Vec::<NonComprehensiveWarning>::new();

    match &request.pairs {
        None => {
            for (name, judgments) in &index.label_sets {
                warnings.extend(completeness_warnings(name, judgments, &requested));
                groups.push(evaluate_group(
                    EvaluationGroup::LabelSet {
                        label_set: name.clone(),
                    },
                    &judgments.relevance,
                    &index.predictions,
                    RunOrder::Mapping,
                    &requested,
                ));
            }
        }
        Some(pairs) => {
            for pair in pairs {
                let reference = index.label_set(&pair.reference)?;
                let candidate = index.label_set(&pair.candidate)?;
                warnings.extend(completeness_warnings(&pair.candidate, candidate, &requested));

                groups.push(evaluate_group(
                    EvaluationGroup::Pair {
                        reference: pair.reference.clone(),
                        candidate: pair.candidate.clone(),
                    },
                    &reference.relevance,
                    &candidate.relevance,
                    RunOrder::ScoreDesc,
                    &requested,
                ));
            }
        }
    }

    Ok(MetricsReport {
        query_count: queries.len(),
        groups,
        warnings,
    })
}

fn completeness_warnings(
    label_set: &str,
    judgments: &LabelSetJudgments,
    requested: &[MetricRequest],
) -> Vec<NonComprehensiveWarning> {
    if judgments.comprehensive {
        return Vec::new();
    }

    requested
        .iter()
        .filter_map(|request| match request {
            MetricRequest::Standard(spec) if spec.kind.is_ndcg_family() => {
                let warning = NonComprehensiveWarning {
                    label_set: label_set.to_string(),
                    metric: spec.to_string(),
                };
                warn!(label_set, metric = %warning.metric, "ndcg requested on non-comprehensive label set");
                Some(warning)
            }
            _ => None,
        })
        .collect()
}

/// Scores `run` against `truth`. Only query keys judged in `truth` count.
fn evaluate_group(
    group: EvaluationGroup,
    truth: &Grouping,
    run: &Grouping,
    order: RunOrder,
    requested: &[MetricRequest],
) -> GroupReport {
    let mut metrics = BTreeMap::<String, Option<f64>>::new();
    let mut confusion_matrix = None;

    for request in requested {
        match request {
            MetricRequest::Standard(spec) => {
                metrics.insert(spec.to_string(), mean_score(spec, truth, run, order));
            }
            MetricRequest::ConfusionMatrix => {
                confusion_matrix = Some(build_confusion_matrix(truth, run));
            }
        }
    }

    GroupReport {
        group,
        judged_queries: truth.len(),
        metrics,
        confusion_matrix,
    }
}

fn mean_score(
    spec: &MetricSpec,
    truth: &Grouping,
    run: &Grouping,
    order: RunOrder,
) -> Option<f64> {
    if truth.is_empty() {
        return None;
    }

    let total = truth
        .iter()
        .map(|(key, judgments)| {
            let ranking = run
                .get(key)
                .map(|docs| ranked_documents(docs, order))
                .unwrap_or_default();
            spec.score(&ranking, judgments)
        })
        .sum::<f64>();
    Some(total / truth.len() as f64)
}

fn ranked_documents(docs: &ScoredDocs, order: RunOrder) -> Vec<&str> {
    match order {
        RunOrder::Mapping => docs.iter().map(|(doc_id, _)| doc_id).collect(),
        RunOrder::ScoreDesc => docs
            .sorted_by_score_desc()
            .into_iter()
            .map(|(doc_id, _)| doc_id)
            .collect(),
    }
}
