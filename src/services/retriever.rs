use serde::Serialize;
use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    error::AppResult,
    models::{BackendHit, Candidate, CandidateSource, Intention},
    services::{
        backends::{KeywordBackend, Reranker, SearchFilters, VectorBackend},
        deadline::Deadline,
    },
};

/// How far back a start time may lie and still be retrieved (already-started events)
const STARTED_GRACE_MINUTES: i64 = 60;

#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub vector_timeout: Duration,
    pub keyword_timeout: Duration,
    pub rerank_timeout: Duration,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            vector_timeout: Duration::from_millis(800),
            keyword_timeout: Duration::from_millis(800),
            rerank_timeout: Duration::from_millis(600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    pub top_k: usize,
    pub rerank_top: usize,
    pub use_reranker: bool,
    /// Upper bound applied to every branch on top of its configured timeout
    pub timeout_ms: Option<u64>,
    /// Correlates log lines with the search-cache entry this run will populate
    pub cache_key: Option<String>,
    pub category: Option<String>,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            top_k: 50,
            rerank_top: 20,
            use_reranker: false,
            timeout_ms: None,
            cache_key: None,
            category: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Retrieval {
    pub candidates: Vec<Candidate>,
    pub vector_count: usize,
    pub keyword_count: usize,
    pub latency_ms: u64,
    pub rerank_applied: bool,
    pub degraded: bool,
}

/// Fans a query out to the vector and keyword backends and merges what comes back
pub struct HybridRetriever {
    vector: Arc<dyn VectorBackend>,
    keyword: Arc<dyn KeywordBackend>,
    reranker: Option<Arc<dyn Reranker>>,
    config: RetrieverConfig,
}

impl HybridRetriever {
    pub fn new(
        vector: Arc<dyn VectorBackend>,
        keyword: Arc<dyn KeywordBackend>,
        reranker: Option<Arc<dyn Reranker>>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            vector,
            keyword,
            reranker,
            config,
        }
    }

    /// Runs both backends concurrently, each under its own timeout.
    ///
    /// A failed or slow branch contributes nothing and marks the result degraded; this never
    /// returns an error.
    pub async fn retrieve(
        &self,
        query: &str,
        intention: &Intention,
        options: &RetrieveOptions,
        deadline: &Deadline,
    ) -> Retrieval {
        let start = Instant::now();
        let filters = SearchFilters {
            city: intention.city.trim().to_lowercase(),
            category: options.category.clone(),
            starts_after: intention.now - chrono::Duration::minutes(STARTED_GRACE_MINUTES),
            starts_before: intention.horizon(),
            limit: options.top_k,
        };

        let cap = options.timeout_ms.map(Duration::from_millis);
        let vector_budget = bounded(self.config.vector_timeout, cap);
        let keyword_budget = bounded(self.config.keyword_timeout, cap);

        let (vector_res, keyword_res) = tokio::join!(
            deadline.run(
                self.vector.name(),
                vector_budget,
                self.vector.search(query, &filters)
            ),
            deadline.run(
                self.keyword.name(),
                keyword_budget,
                self.keyword.search(query, &filters)
            ),
        );

        let mut degraded = false;
        let mut vector_hits = settle(self.vector.name(), vector_res, &mut degraded);
        let mut keyword_hits = settle(self.keyword.name(), keyword_res, &mut degraded);
        let vector_count = vector_hits.len();
        let keyword_count = keyword_hits.len();

        normalize_scores(&mut vector_hits);
        normalize_scores(&mut keyword_hits);
        let mut candidates = merge_hits(vector_hits, keyword_hits);

        let mut rerank_applied = false;
        if options.use_reranker && !candidates.is_empty() {
            match &self.reranker {
                Some(reranker) => {
                    let budget = bounded(self.config.rerank_timeout, cap);
                    let reranked = rerank_head(
                        reranker.as_ref(),
                        query,
                        &mut candidates,
                        options.rerank_top,
                        budget,
                        deadline,
                    )
                    .await;
                    match reranked {
                        Ok(()) => rerank_applied = true,
                        Err(e) => {
                            tracing::warn!(error = %e, "Reranker skipped, keeping merged order");
                            degraded = true;
                        }
                    }
                }
                None => {
                    tracing::warn!("Reranking requested but no reranker is configured");
                    degraded = true;
                }
            }
        }

        candidates.truncate(options.top_k);

        let latency_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            city = %filters.city,
            cache_key = options.cache_key.as_deref().unwrap_or("-"),
            vector_count,
            keyword_count,
            merged = candidates.len(),
            rerank_applied,
            degraded,
            latency_ms,
            "Hybrid retrieval completed"
        );

        Retrieval {
            candidates,
            vector_count,
            keyword_count,
            latency_ms,
            rerank_applied,
            degraded,
        }
    }
}

fn bounded(budget: Duration, cap: Option<Duration>) -> Duration {
    match cap {
        Some(cap) => budget.min(cap),
        None => budget,
    }
}

/// Turns a branch result into hits, recording failure in `degraded`
fn settle(
    backend: &str,
    result: AppResult<Vec<BackendHit>>,
    degraded: &mut bool,
) -> Vec<BackendHit> {
    match result {
        Ok(hits) => hits,
        Err(e) => {
            if e.is_degradable() {
                tracing::warn!(backend, error = %e, "Retrieval branch failed, continuing without it");
            } else {
                tracing::error!(backend, error = %e, "Retrieval branch hit an unexpected error");
            }
            *degraded = true;
            Vec::new()
        }
    }
}

/// Brings one branch's scores into [0, 1]: negatives clamp to 0, and the whole branch is
/// divided by its maximum only when that maximum exceeds 1.
pub fn normalize_scores(hits: &mut [BackendHit]) {
    for hit in hits.iter_mut() {
        if !hit.score.is_finite() || hit.score < 0.0 {
            hit.score = 0.0;
        }
    }
    let max = hits.iter().map(|h| h.score).fold(0.0_f64, f64::max);
    if max > 1.0 {
        for hit in hits.iter_mut() {
            hit.score /= max;
        }
    }
}

/// Unions both branches by id. An id seen in both becomes `hybrid` with the higher score.
///
/// Order: score descending, then hybrid/vector/keyword, then id ascending.
pub fn merge_hits(vector_hits: Vec<BackendHit>, keyword_hits: Vec<BackendHit>) -> Vec<Candidate> {
    let mut by_id: HashMap<String, Candidate> = HashMap::new();

    let mut seen = HashSet::new();
    for hit in vector_hits {
        if !seen.insert(hit.id.clone()) {
            continue;
        }
        by_id.insert(
            hit.id.clone(),
            Candidate {
                id: hit.id,
                source: CandidateSource::Vector,
                raw_score: hit.score,
                lexical_score: None,
                semantic_score: Some(hit.score),
                rerank_score: None,
                event: hit.payload,
            },
        );
    }

    let mut seen = HashSet::new();
    for hit in keyword_hits {
        if !seen.insert(hit.id.clone()) {
            continue;
        }
        match by_id.get_mut(&hit.id) {
            Some(existing) => {
                existing.source = CandidateSource::Hybrid;
                existing.raw_score = existing.raw_score.max(hit.score);
                existing.lexical_score = Some(hit.score);
            }
            None => {
                by_id.insert(
                    hit.id.clone(),
                    Candidate {
                        id: hit.id,
                        source: CandidateSource::Keyword,
                        raw_score: hit.score,
                        lexical_score: Some(hit.score),
                        semantic_score: None,
                        rerank_score: None,
                        event: hit.payload,
                    },
                );
            }
        }
    }

    let mut merged: Vec<Candidate> = by_id.into_values().collect();
    merged.sort_by(compare_merged);
    merged
}

fn compare_merged(a: &Candidate, b: &Candidate) -> Ordering {
    b.raw_score
        .total_cmp(&a.raw_score)
        .then_with(|| a.source.priority().cmp(&b.source.priority()))
        .then_with(|| a.id.cmp(&b.id))
}

/// Reorders the first `rerank_top` candidates by cross-encoder score; the tail is untouched
async fn rerank_head(
    reranker: &dyn Reranker,
    query: &str,
    candidates: &mut [Candidate],
    rerank_top: usize,
    budget: Duration,
    deadline: &Deadline,
) -> AppResult<()> {
    let head_len = rerank_top.min(candidates.len());
    if head_len == 0 {
        return Ok(());
    }

    let documents: Vec<String> = candidates[..head_len]
        .iter()
        .map(|c| c.event.rerank_document())
        .collect();
    let scores = deadline
        .run("rerank", budget, reranker.rerank(query, &documents))
        .await?;

    if scores.len() != head_len {
        return Err(crate::error::AppError::unavailable(
            "rerank",
            format!("expected {} scores, got {}", head_len, scores.len()),
        ));
    }

    for (candidate, score) in candidates[..head_len].iter_mut().zip(scores) {
        candidate.rerank_score = Some(score);
    }
    // Stable sort keeps merged order among equal rerank scores
    candidates[..head_len].sort_by(|a, b| {
        b.rerank_score
            .unwrap_or(0.0)
            .total_cmp(&a.rerank_score.unwrap_or(0.0))
    });

    Ok(())
}
