use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{EvalError, Result};
use crate::model::Query;
use crate::store::{QueryFilter, RecordStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankCurveOptions {
    /// Number of top-relevance labeled documents that should be retrieved.
    pub rank_cutoff: usize,
    /// Fixed curve length. Hits at or beyond it are counted as misses.
    /// When absent, each label set uses its longest observed prediction list.
    pub max_rank: Option<usize>,
}

impl RankCurveOptions {
    pub fn new(rank_cutoff: usize) -> Self {
        Self {
            rank_cutoff,
            max_rank: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.rank_cutoff == 0 {
            return Err(EvalError::InvalidArgument(
                "rank cutoff must be a positive integer".to_string(),
            ));
        }
        if self.max_rank == Some(0) {
            return Err(EvalError::InvalidArgument(
                "max rank must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankCurve {
    pub label_set: String,
    pub contributions: usize,
    pub rank_cutoff: usize,
    pub misses: usize,
    pub hits: Vec<usize>,
    /// Cumulative recall of the top-`rank_cutoff` labeled documents by rank.
    pub curve: Vec<f64>,
}

struct LabelSetAccumulator {
    hits: Vec<usize>,
    misses: usize,
    contributions: usize,
    fixed_length: bool,
}

impl LabelSetAccumulator {
    fn new(max_rank: Option<usize>) -> Self {
        Self {
            hits: vec![0; max_rank.unwrap_or(0)],
            misses: 0,
            contributions: 0,
            fixed_length: max_rank.is_some(),
        }
    }

    fn observe_prediction_length(&mut self, prediction_length: usize) {
        if !self.fixed_length && self.hits.len() < prediction_length {
            self.hits.resize(prediction_length, 0);
        }
    }

    fn record(&mut self, rank: Option<usize>) {
        match rank {
            Some(rank) if rank < self.hits.len() => self.hits[rank] += 1,
            _ => self.misses += 1,
        }
    }

    fn finish(self, label_set: String, rank_cutoff: usize) -> RankCurve {
        let denominator = self.contributions as f64 * rank_cutoff as f64;
        let mut running = 0usize;
        let curve = self
            .hits
            .iter()
            .map(|hits| {
                running += hits;
                if denominator > 0.0 {
                    running as f64 / denominator
                } else {
                    0.0
                }
            })
            .collect();

        RankCurve {
            label_set,
            contributions: self.contributions,
            rank_cutoff,
            misses: self.misses,
            hits: self.hits,
            curve,
        }
    }
}

pub fn compute_rank_curve<S: RecordStore + ?Sized>(
    store: &S,
    filter: &QueryFilter,
    options: RankCurveOptions,
) -> Result<BTreeMap<String, RankCurve>> {
    options.validate()?;
    filter.validate()?;

    let queries = store.find_queries(filter)?;
    let curves = accumulate_rank_curves(&queries, options)?;
    info!(
        queries = queries.len(),
        label_sets = curves.len(),
        rank_cutoff = options.rank_cutoff,
        "rank curves computed"
    );
    Ok(curves)
}

pub fn accumulate_rank_curves(
    queries: &[Query],
    options: RankCurveOptions,
) -> Result<BTreeMap<String, RankCurve>> {
    options.validate()?;

    let mut accumulators = BTreeMap::<String, LabelSetAccumulator>::new();
    for query in queries {
        let prediction_length = query.prediction_length();

        for label in &query.labels {
            let accumulator = accumulators
                .entry(label.label_set.name.clone())
                .or_insert_with(|| LabelSetAccumulator::new(options.max_rank));
            accumulator.contributions += 1;
            accumulator.observe_prediction_length(prediction_length);

            for (doc_id, _) in label
                .relevant_docs
                .sorted_by_score_desc()
                .into_iter()
                .take(options.rank_cutoff)
            {
                accumulator.record(query.predictions.position(doc_id));
            }
        }

        if query.labels.is_empty() {
            debug!(key = %query.key, "query has no attached labels");
        }
    }

    Ok(accumulators
        .into_iter()
        .map(|(label_set, accumulator)| {
            let curve = accumulator.finish(label_set.clone(), options.rank_cutoff);
            (label_set, curve)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Label, LabelSet, ScoredDocs};

    fn label(label_set: &str, docs: &[(&str, f64)]) -> Label {
        Label {
            id: None,
            key: "q".to_string(),
            label_set: LabelSet {
                id: 1,
                name: label_set.to_string(),
            },
            index_id: "idx".to_string(),
            relevant_docs: docs.iter().copied().collect::<ScoredDocs>(),
            comprehensive: true,
        }
    }

    fn query(key: &str, predictions: &[(&str, f64)], labels: Vec<Label>) -> Query {
        Query {
            id: None,
            key: key.to_string(),
            index_id: "idx".to_string(),
            text: String::new(),
            vector: Vec::new(),
            search_call: String::new(),
            predictions: predictions.iter().copied().collect(),
            labels,
        }
    }

    #[test]
    fn worked_example_produces_expected_curve() {
        let queries = vec![query(
            "q1",
            &[("d1", 0.9), ("d2", 0.8), ("d3", 0.5)],
            vec![label("gold", &[("d1", 1.0), ("d3", 1.0), ("d4", 1.0)])],
        )];

        let curves = accumulate_rank_curves(&queries, RankCurveOptions::new(2)).expect("curves");
        let gold = &curves["gold"];

        assert_eq!(gold.hits, vec![1, 0, 1]);
        assert_eq!(gold.curve, vec![0.5, 0.5, 1.0]);
        assert_eq!(gold.misses, 0);
        assert_eq!(gold.contributions, 1);
    }

    #[test]
    fn labels_beyond_cutoff_count_as_misses_when_not_retrieved() {
        let queries = vec![query(
            "q1",
            &[("d1", 0.9)],
            vec![label("gold", &[("d4", 3.0), ("d1", 2.0)])],
        )];

        let curves = accumulate_rank_curves(&queries, RankCurveOptions::new(2)).expect("curves");
        assert_eq!(curves["gold"].hits, vec![1]);
        assert_eq!(curves["gold"].misses, 1);
        assert_eq!(curves["gold"].curve, vec![0.5]);
    }

    #[test]
    fn curve_length_follows_longest_prediction_list() {
        let queries = vec![
            query("q1", &[("a", 0.9)], vec![label("gold", &[("a", 1.0)])]),
            query(
                "q2",
                &[("x", 0.9), ("y", 0.8), ("b", 0.7)],
                vec![label("gold", &[("b", 1.0)])],
            ),
        ];

        let curves = accumulate_rank_curves(&queries, RankCurveOptions::new(1)).expect("curves");
        assert_eq!(curves["gold"].hits, vec![1, 0, 1]);
        assert_eq!(curves["gold"].curve, vec![0.5, 0.5, 1.0]);
    }

    #[test]
    fn fixed_max_rank_turns_deep_hits_into_misses() {
        let queries = vec![query(
            "q1",
            &[("x", 0.9), ("y", 0.8), ("b", 0.7)],
            vec![label("gold", &[("b", 1.0), ("x", 0.5)])],
        )];

        let options = RankCurveOptions {
            rank_cutoff: 2,
            max_rank: Some(2),
        };
        let curves = accumulate_rank_curves(&queries, options).expect("curves");
        assert_eq!(curves["gold"].hits, vec![1, 0]);
        assert_eq!(curves["gold"].misses, 1);
    }

    #[test]
    fn equal_relevance_keeps_label_order_for_cutoff() {
        let queries = vec![query(
            "q1",
            &[("d2", 0.9), ("d1", 0.8)],
            vec![label("gold", &[("d1", 1.0), ("d2", 1.0)])],
        )];

        let curves = accumulate_rank_curves(&queries, RankCurveOptions::new(1)).expect("curves");
        assert_eq!(curves["gold"].hits, vec![0, 1]);
    }

    #[test]
    fn huge_rank_cutoff_keeps_the_curve_finite() {
        let queries = vec![query(
            "q1",
            &[("d1", 0.9), ("d2", 0.8)],
            vec![
                label("gold", &[("d1", 1.0)]),
                label("gold", &[("d2", 1.0)]),
            ],
        )];

        let curves =
            accumulate_rank_curves(&queries, RankCurveOptions::new(usize::MAX)).expect("curves");
        let gold = &curves["gold"];
        assert_eq!(gold.contributions, 2);
        assert_eq!(gold.hits, vec![1, 1]);
        assert!(gold.curve.iter().all(|value| value.is_finite() && *value > 0.0 && *value < 1e-12));
    }

    #[test]
    fn zero_rank_cutoff_is_rejected() {
        let error = accumulate_rank_curves(&[], RankCurveOptions::new(0)).expect_err("invalid");
        assert!(matches!(error, EvalError::InvalidArgument(_)));

        let options = RankCurveOptions {
            rank_cutoff: 3,
            max_rank: Some(0),
        };
        assert!(accumulate_rank_curves(&[], options).is_err());
    }
}
