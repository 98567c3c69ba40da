use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{EvalError, Result};
use crate::model::{Query, RecordId};
use crate::store::{QueryFilter, RecordStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackSample {
    pub score: f64,
    pub query_id: Option<RecordId>,
    pub query_key: String,
    pub query_text: String,
    pub document: String,
}

struct Candidate<'a> {
    score: f64,
    query_position: usize,
    document: &'a str,
}

pub fn sample_feedback<S: RecordStore + ?Sized>(
    store: &S,
    filter: &QueryFilter,
    count: usize,
    allow_duplicates: bool,
) -> Result<Vec<FeedbackSample>> {
    filter.validate()?;
    let queries = store.find_queries(filter)?;
    let samples = select_feedback(&queries, count, allow_duplicates)?;
    info!(
        queries = queries.len(),
        samples = samples.len(),
        allow_duplicates,
        "feedback sampled"
    );
    Ok(samples)
}

/// Picks the `count` highest-scoring predictions across `queries`.
///
/// Ties keep generation order (query order, then prediction order). Without
/// duplicates, a candidate is skipped when its query record or its document was
/// already accepted, and skipped candidates are never revisited.
pub fn select_feedback(
    queries: &[Query],
    count: usize,
    allow_duplicates: bool,
) -> Result<Vec<FeedbackSample>> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let mut candidates = queries
        .iter()
        .enumerate()
        .flat_map(|(query_position, query)| {
            query.predictions.iter().map(move |(document, score)| Candidate {
                score,
                query_position,
                document,
            })
        })
        .collect::<Vec<Candidate<'_>>>();
    candidates.sort_by(|left, right| right.score.total_cmp(&left.score));

    if let Some(top) = candidates.first() {
        debug!(highest_score = top.score, candidates = candidates.len(), "feedback pool built");
    }

    let mut used_queries = HashSet::<usize>::new();
    let mut used_documents = HashSet::<&str>::new();
    let mut accepted = Vec::<FeedbackSample>::with_capacity(count);

    for candidate in candidates {
        if accepted.len() == count {
            break;
        }
        if !allow_duplicates {
            if used_queries.contains(&candidate.query_position)
                || used_documents.contains(candidate.document)
            {
                continue;
            }
            used_queries.insert(candidate.query_position);
            used_documents.insert(candidate.document);
        }

        let query = &queries[candidate.query_position];
        accepted.push(FeedbackSample {
            score: candidate.score,
            query_id: query.id,
            query_key: query.key.clone(),
            query_text: query.text.clone(),
            document: candidate.document.to_string(),
        });
    }

    if accepted.len() < count {
        return Err(EvalError::InsufficientCandidates {
            requested: count,
            accepted: accepted.len(),
        });
    }
    Ok(accepted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(id: RecordId, key: &str, predictions: &[(&str, f64)]) -> Query {
        Query {
            id: Some(id),
            key: key.to_string(),
            index_id: "idx".to_string(),
            text: format!("{key} text"),
            vector: Vec::new(),
            search_call: String::new(),
            predictions: predictions.iter().copied().collect(),
            labels: Vec::new(),
        }
    }

    fn picks(samples: &[FeedbackSample]) -> Vec<(String, String)> {
        samples
            .iter()
            .map(|sample| (sample.query_key.clone(), sample.document.clone()))
            .collect()
    }

    #[test]
    fn dedup_skips_used_queries_and_documents() {
        let queries = vec![
            query(1, "q1", &[("d1", 0.99), ("d2", 0.95)]),
            query(2, "q2", &[("d1", 0.97), ("d3", 0.90)]),
            query(3, "q3", &[("d4", 0.80)]),
        ];

        let samples = select_feedback(&queries, 3, false).expect("samples");
        assert_eq!(
            picks(&samples),
            vec![
                ("q1".to_string(), "d1".to_string()),
                ("q2".to_string(), "d3".to_string()),
                ("q3".to_string(), "d4".to_string()),
            ]
        );
        assert_eq!(samples[1].query_id, Some(2));
    }

    #[test]
    fn duplicates_allowed_takes_the_global_top_n() {
        let queries = vec![
            query(1, "q1", &[("d1", 0.99), ("d2", 0.95)]),
            query(2, "q2", &[("d1", 0.97)]),
        ];

        let samples = select_feedback(&queries, 3, true).expect("samples");
        let scores = samples.iter().map(|sample| sample.score).collect::<Vec<_>>();
        assert_eq!(scores, vec![0.99, 0.97, 0.95]);
    }

    #[test]
    fn ties_follow_generation_order() {
        let queries = vec![
            query(1, "q1", &[("a", 0.5), ("b", 0.5)]),
            query(2, "q2", &[("c", 0.5)]),
        ];

        let samples = select_feedback(&queries, 3, true).expect("samples");
        assert_eq!(
            picks(&samples),
            vec![
                ("q1".to_string(), "a".to_string()),
                ("q1".to_string(), "b".to_string()),
                ("q2".to_string(), "c".to_string()),
            ]
        );
    }

    #[test]
    fn exhausted_pool_reports_insufficient_candidates() {
        let queries = vec![query(1, "q1", &[("d1", 0.9), ("d2", 0.8)])];

        let error = select_feedback(&queries, 2, false).expect_err("only one query");
        assert!(matches!(
            error,
            EvalError::InsufficientCandidates {
                requested: 2,
                accepted: 1
            }
        ));

        let error = select_feedback(&queries, 3, true).expect_err("only two candidates");
        assert!(matches!(error, EvalError::InsufficientCandidates { .. }));
    }

    #[test]
    fn zero_count_returns_nothing() {
        assert!(select_feedback(&[], 0, false).expect("empty").is_empty());
    }
}
