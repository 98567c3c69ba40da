//! Cutoff-based IR metrics over a single ranked run and its judgments.
//!
//! Relevance above zero counts as relevant. `ndcg` uses linear gain
//! (`rel / log2(i + 2)`), `ndcg_burges` the exponential `2^rel - 1` gain.

use std::fmt;

use regex::Regex;
use serde::Serialize;

use crate::error::{EvalError, Result};
use crate::model::ScoredDocs;

pub const CONFUSION_MATRIX: &str = "confusion_matrix";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Mrr,
    Ndcg,
    NdcgBurges,
    Map,
    Precision,
    Recall,
    F1,
    HitRate,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mrr => "mrr",
            Self::Ndcg => "ndcg",
            Self::NdcgBurges => "ndcg_burges",
            Self::Map => "map",
            Self::Precision => "precision",
            Self::Recall => "recall",
            Self::F1 => "f1",
            Self::HitRate => "hit_rate",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "mrr" => Self::Mrr,
            "ndcg" => Self::Ndcg,
            "ndcg_burges" => Self::NdcgBurges,
            "map" => Self::Map,
            "precision" => Self::Precision,
            "recall" => Self::Recall,
            "f1" => Self::F1,
            "hit_rate" | "hits" => Self::HitRate,
            _ => return None,
        };
        Some(kind)
    }

    /// NDCG treats unjudged documents as non-relevant.
    pub fn is_ndcg_family(self) -> bool {
        matches!(self, Self::Ndcg | Self::NdcgBurges)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricSpec {
    pub kind: MetricKind,
    pub cutoff: Option<usize>,
}

impl fmt::Display for MetricSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cutoff {
            Some(k) => write!(f, "{}@{k}", self.kind.as_str()),
            None => write!(f, "{}", self.kind.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricRequest {
    Standard(MetricSpec),
    ConfusionMatrix,
}

/// Parses tokens such as `mrr@10`, `ndcg`, `confusion_matrix`. Duplicates are dropped.
pub fn parse_metric_tokens<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<MetricRequest>> {
    let token_regex = Regex::new(r"^([a-z][a-z0-9_]*?)(?:@([0-9]+))?$")
        .map_err(|err| EvalError::InvalidArgument(format!("metric token pattern: {err}")))?;

    let mut parsed = Vec::<MetricRequest>::new();
    for token in tokens {
        let normalized = token.as_ref().trim().to_ascii_lowercase();
        let request = if normalized == CONFUSION_MATRIX {
            MetricRequest::ConfusionMatrix
        } else {
            MetricRequest::Standard(parse_standard(&token_regex, &normalized).ok_or_else(
                || EvalError::InvalidMetric {
                    metric: token.as_ref().to_string(),
                },
            )?)
        };
        if !parsed.contains(&request) {
            parsed.push(request);
        }
    }
    Ok(parsed)
}

fn parse_standard(token_regex: &Regex, token: &str) -> Option<MetricSpec> {
    let captures = token_regex.captures(token)?;
    let kind = MetricKind::from_name(captures.get(1)?.as_str())?;
    let cutoff = match captures.get(2) {
        Some(value) => {
            let k = value.as_str().parse::<usize>().ok()?;
            if k == 0 {
                return None;
            }
            Some(k)
        }
        None => None,
    };
    Some(MetricSpec { kind, cutoff })
}

impl MetricSpec {
    /// Scores one query. `ranking` is in rank order; `judgments` maps documents to relevance.
    pub fn score(&self, ranking: &[&str], judgments: &ScoredDocs) -> f64 {
        let relevant_total = judgments.iter().filter(|(_, rel)| *rel > 0.0).count();
        if relevant_total == 0 {
            return 0.0;
        }

        let depth = self.cutoff.unwrap_or(ranking.len());
        let retrieved = &ranking[..ranking.len().min(depth)];

        match self.kind {
            MetricKind::Mrr => reciprocal_rank(retrieved, judgments),
            MetricKind::Ndcg => ndcg(retrieved, judgments, self.cutoff, |rel| rel),
            MetricKind::NdcgBurges => {
                ndcg(retrieved, judgments, self.cutoff, |rel| 2_f64.powf(rel) - 1.0)
            }
            MetricKind::Map => average_precision(retrieved, judgments, relevant_total),
            MetricKind::Precision => precision(retrieved, judgments, depth),
            MetricKind::Recall => relevant_hits(retrieved, judgments) as f64 / relevant_total as f64,
            MetricKind::F1 => {
                let p = precision(retrieved, judgments, depth);
                let r = relevant_hits(retrieved, judgments) as f64 / relevant_total as f64;
                if p + r == 0.0 {
                    0.0
                } else {
                    2.0 * p * r / (p + r)
                }
            }
            MetricKind::HitRate => {
                if relevant_hits(retrieved, judgments) > 0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

fn relevance(judgments: &ScoredDocs, doc_id: &str) -> f64 {
    judgments.get(doc_id).unwrap_or(0.0).max(0.0)
}

fn relevant_hits(retrieved: &[&str], judgments: &ScoredDocs) -> usize {
    retrieved
        .iter()
        .filter(|doc_id| relevance(judgments, doc_id) > 0.0)
        .count()
}

fn reciprocal_rank(retrieved: &[&str], judgments: &ScoredDocs) -> f64 {
    retrieved
        .iter()
        .position(|doc_id| relevance(judgments, doc_id) > 0.0)
        .map(|index| 1.0 / (index as f64 + 1.0))
        .unwrap_or(0.0)
}

fn precision(retrieved: &[&str], judgments: &ScoredDocs, depth: usize) -> f64 {
    if depth == 0 {
        return 0.0;
    }
    relevant_hits(retrieved, judgments) as f64 / depth as f64
}

fn average_precision(retrieved: &[&str], judgments: &ScoredDocs, relevant_total: usize) -> f64 {
    let mut hits = 0usize;
    let mut precision_sum = 0.0;
    for (index, doc_id) in retrieved.iter().enumerate() {
        if relevance(judgments, doc_id) > 0.0 {
            hits += 1;
            precision_sum += hits as f64 / (index as f64 + 1.0);
        }
    }
    precision_sum / relevant_total as f64
}

fn ndcg(
    retrieved: &[&str],
    judgments: &ScoredDocs,
    cutoff: Option<usize>,
    gain: impl Fn(f64) -> f64,
) -> f64 {
    let dcg = retrieved
        .iter()
        .enumerate()
        .map(|(index, doc_id)| gain(relevance(judgments, doc_id)) / (index as f64 + 2.0).log2())
        .sum::<f64>();

    let mut ideal = judgments
        .iter()
        .map(|(_, rel)| rel)
        .filter(|rel| *rel > 0.0)
        .collect::<Vec<f64>>();
    ideal.sort_by(|left, right| right.total_cmp(left));
    let idcg = ideal
        .iter()
        .take(cutoff.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(index, rel)| gain(*rel) / (index as f64 + 2.0).log2())
        .sum::<f64>();

    if idcg <= 0.0 { 0.0 } else { dcg / idcg }
}
