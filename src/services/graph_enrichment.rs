use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use crate::{
    error::AppResult,
    models::SocialProof,
    services::{backends::GraphStore, deadline::Deadline},
};

/// Novelty assumed when the graph has nothing to say
pub const NEUTRAL_NOVELTY: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub timeout: Duration,
    pub diversity_threshold: f64,
    pub social_window_hours: u32,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(500),
            diversity_threshold: 0.85,
            social_window_hours: 72,
        }
    }
}

/// Per-id values from one graph query, plus whether the query fell back
#[derive(Debug, Clone, Default)]
pub struct GraphSignal<T> {
    pub values: HashMap<String, T>,
    pub degraded: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Diversified {
    pub ordered_ids: Vec<String>,
    pub degraded: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Enrichment {
    pub ordered_ids: Vec<String>,
    pub novelty: HashMap<String, f64>,
    pub friends: HashMap<String, Vec<String>>,
    pub social: HashMap<String, SocialProof>,
    pub degraded: bool,
}

impl Enrichment {
    pub fn novelty_of(&self, id: &str) -> f64 {
        self.novelty.get(id).copied().unwrap_or(NEUTRAL_NOVELTY)
    }
}

/// Novelty, social and diversity signals from the relationship store.
///
/// Every call is time-boxed. When the store is slow or down the answer is the identity order
/// with neutral signals and `degraded` set, never an error.
pub struct GraphEnrichment {
    store: Arc<dyn GraphStore>,
    config: EnrichmentConfig,
}

impl GraphEnrichment {
    pub fn new(store: Arc<dyn GraphStore>, config: EnrichmentConfig) -> Self {
        Self { store, config }
    }

    /// Greedy near-duplicate suppression over `candidate_ids`.
    ///
    /// Candidates with fewer same-set near-duplicates (similarity >= `diversity_threshold`) go
    /// first; a candidate is accepted only if none of its near-duplicates was accepted already.
    /// Leftover slots are backfilled in the original order.
    pub async fn diversify(
        &self,
        candidate_ids: &[String],
        user_id: Option<&str>,
        diversity_threshold: f64,
        max_results: usize,
        deadline: &Deadline,
    ) -> Diversified {
        if candidate_ids.is_empty() || max_results == 0 {
            return Diversified::default();
        }

        let similar = self
            .bounded(deadline, self.store.similar_items(candidate_ids))
            .await;

        match similar {
            Ok(items) => {
                let mut neighbors: HashMap<String, Vec<(String, f64)>> = HashMap::new();
                for item in items {
                    let entry = neighbors.entry(item.id).or_default();
                    entry.extend(item.neighbors.into_iter().map(|n| (n.id, n.similarity)));
                }
                let ordered_ids =
                    greedy_diversify(candidate_ids, &neighbors, diversity_threshold, max_results);
                tracing::debug!(
                    user_id = user_id.unwrap_or("-"),
                    input = candidate_ids.len(),
                    output = ordered_ids.len(),
                    "Diversified candidates"
                );
                Diversified {
                    ordered_ids,
                    degraded: false,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Diversification fell back to input order");
                Diversified {
                    ordered_ids: candidate_ids.iter().take(max_results).cloned().collect(),
                    degraded: true,
                }
            }
        }
    }

    /// 1 minus the share of each candidate's similar items the user already interacted with
    pub async fn novelty(
        &self,
        user_id: Option<&str>,
        candidate_ids: &[String],
        deadline: &Deadline,
    ) -> GraphSignal<f64> {
        let neutral = || {
            candidate_ids
                .iter()
                .map(|id| (id.clone(), NEUTRAL_NOVELTY))
                .collect::<HashMap<_, _>>()
        };

        let Some(user_id) = user_id else {
            return GraphSignal {
                values: neutral(),
                degraded: false,
            };
        };
        if candidate_ids.is_empty() {
            return GraphSignal::default();
        }

        match self
            .bounded(deadline, self.store.novelty_for_user(user_id, candidate_ids))
            .await
        {
            Ok(records) => {
                let mut values = neutral();
                for record in records {
                    if let Some(slot) = values.get_mut(&record.id) {
                        *slot = record.novelty();
                    }
                }
                GraphSignal {
                    values,
                    degraded: false,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Novelty lookup fell back to neutral");
                GraphSignal {
                    values: neutral(),
                    degraded: true,
                }
            }
        }
    }

    /// Friends of the user who engaged with each candidate
    pub async fn friend_overlap(
        &self,
        user_id: Option<&str>,
        candidate_ids: &[String],
        deadline: &Deadline,
    ) -> GraphSignal<Vec<String>> {
        let Some(user_id) = user_id else {
            return GraphSignal::default();
        };
        if candidate_ids.is_empty() {
            return GraphSignal::default();
        }

        match self
            .bounded(deadline, self.store.friend_overlap(user_id, candidate_ids))
            .await
        {
            Ok(records) => GraphSignal {
                values: records
                    .into_iter()
                    .filter(|r| !r.friend_ids.is_empty())
                    .map(|r| (r.id, r.friend_ids))
                    .collect(),
                degraded: false,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Friend overlap fell back to empty");
                GraphSignal {
                    values: HashMap::new(),
                    degraded: true,
                }
            }
        }
    }

    pub async fn social_heat(
        &self,
        candidate_ids: &[String],
        deadline: &Deadline,
    ) -> GraphSignal<SocialProof> {
        if candidate_ids.is_empty() {
            return GraphSignal::default();
        }

        let window = self.config.social_window_hours;
        match self
            .bounded(deadline, self.store.social_heat(candidate_ids, window))
            .await
        {
            Ok(records) => GraphSignal {
                values: records.into_iter().map(|r| (r.id.clone(), r.proof())).collect(),
                degraded: false,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Social heat lookup fell back to empty");
                GraphSignal {
                    values: HashMap::new(),
                    degraded: true,
                }
            }
        }
    }

    /// Runs every graph query concurrently. The order is diversified only when asked.
    pub async fn enrich(
        &self,
        candidate_ids: &[String],
        user_id: Option<&str>,
        diversify: bool,
        max_results: usize,
        deadline: &Deadline,
    ) -> Enrichment {
        let order = async {
            if diversify {
                self.diversify(
                    candidate_ids,
                    user_id,
                    self.config.diversity_threshold,
                    max_results,
                    deadline,
                )
                .await
            } else {
                Diversified {
                    ordered_ids: candidate_ids.iter().take(max_results).cloned().collect(),
                    degraded: false,
                }
            }
        };

        let (order, novelty, friends, social) = tokio::join!(
            order,
            self.novelty(user_id, candidate_ids, deadline),
            self.friend_overlap(user_id, candidate_ids, deadline),
            self.social_heat(candidate_ids, deadline),
        );

        let degraded = order.degraded || novelty.degraded || friends.degraded || social.degraded;
        if degraded {
            tracing::warn!(
                candidates = candidate_ids.len(),
                "Graph enrichment degraded, using neutral signals where missing"
            );
        }

        Enrichment {
            ordered_ids: order.ordered_ids,
            novelty: novelty.values,
            friends: friends.values,
            social: social.values,
            degraded,
        }
    }

    /// Only the per-user signals (novelty, friends), for results whose shared part is cached
    pub async fn personal(
        &self,
        candidate_ids: &[String],
        user_id: Option<&str>,
        deadline: &Deadline,
    ) -> Enrichment {
        let (novelty, friends) = tokio::join!(
            self.novelty(user_id, candidate_ids, deadline),
            self.friend_overlap(user_id, candidate_ids, deadline),
        );

        Enrichment {
            ordered_ids: candidate_ids.to_vec(),
            novelty: novelty.values,
            friends: friends.values,
            social: HashMap::new(),
            degraded: novelty.degraded || friends.degraded,
        }
    }

    async fn bounded<T>(
        &self,
        deadline: &Deadline,
        fut: impl std::future::Future<Output = AppResult<T>>,
    ) -> AppResult<T> {
        deadline
            .run("graph", self.config.timeout, fut)
            .await
            .inspect_err(|e| {
                if !e.is_degradable() {
                    tracing::error!(error = %e, "Graph store returned an unexpected error");
                }
            })
    }
}

/// Core of [`GraphEnrichment::diversify`], separated so it can be tested without a store
pub fn greedy_diversify(
    candidate_ids: &[String],
    neighbors: &HashMap<String, Vec<(String, f64)>>,
    threshold: f64,
    max_results: usize,
) -> Vec<String> {
    let in_set: HashSet<&str> = candidate_ids.iter().map(String::as_str).collect();

    // Near-duplicate relation restricted to the candidate set, made symmetric
    let mut near: HashMap<&str, HashSet<&str>> = HashMap::new();
    for (id, list) in neighbors {
        if !in_set.contains(id.as_str()) {
            continue;
        }
        for (other, similarity) in list {
            if *similarity >= threshold && other != id && in_set.contains(other.as_str()) {
                near.entry(id.as_str()).or_default().insert(other.as_str());
                near.entry(other.as_str()).or_default().insert(id.as_str());
            }
        }
    }

    let mut order: Vec<(usize, &str)> = candidate_ids
        .iter()
        .map(String::as_str)
        .enumerate()
        .collect();
    order.sort_by_key(|(idx, id)| (near.get(id).map_or(0, HashSet::len), *idx));

    let mut accepted: Vec<String> = Vec::new();
    let mut accepted_set: HashSet<&str> = HashSet::new();

    for (_, id) in &order {
        if accepted.len() >= max_results {
            break;
        }
        if accepted_set.contains(id) {
            continue;
        }
        let clashes = near
            .get(id)
            .is_some_and(|dups| dups.iter().any(|d| accepted_set.contains(d)));
        if clashes {
            continue;
        }
        accepted.push(id.to_string());
        accepted_set.insert(*id);
    }

    for id in candidate_ids {
        if accepted.len() >= max_results {
            break;
        }
        if accepted_set.insert(id.as_str()) {
            accepted.push(id.clone());
        }
    }

    accepted
}
