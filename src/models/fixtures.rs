//! Shared builders for unit tests.

use std::collections::BTreeSet;

use super::*;

pub(crate) fn sample_intention() -> Intention {
    Intention {
        city: "Lisbon".to_string(),
        now: "2026-10-19T18:00:00Z".parse().unwrap(),
        tokens: IntentionTokens {
            mood: Mood::Electric,
            until_minutes: 180,
            distance_km: 5.0,
            budget: Budget::Casual,
            companions: BTreeSet::from([Companion::Friends]),
        },
        source: IntentionSource::Inline,
        origin: None,
    }
}

pub(crate) fn event(title: &str, category: Option<&str>) -> EventFeatures {
    EventFeatures {
        title: title.to_string(),
        category: category.map(str::to_string),
        ..Default::default()
    }
}

pub(crate) fn hit(id: &str, score: f64) -> BackendHit {
    BackendHit {
        id: id.to_string(),
        score,
        payload: event(&format!("Event {}", id), Some("MUSIC")),
    }
}

pub(crate) fn candidate(id: &str, source: CandidateSource, score: f64) -> Candidate {
    Candidate {
        id: id.to_string(),
        source,
        raw_score: score,
        lexical_score: (source != CandidateSource::Vector).then_some(score),
        semantic_score: (source != CandidateSource::Keyword).then_some(score),
        rerank_score: None,
        event: event(&format!("Event {}", id), Some("MUSIC")),
    }
}

const WEIGHTS: [(&str, f64); 7] = [
    ("text", 0.25),
    ("semantic", 0.20),
    ("mood", 0.20),
    ("social", 0.15),
    ("budget", 0.10),
    ("distance", 0.05),
    ("time", 0.05),
];

/// Scored item whose every component equals `fit`, so the breakdown sums to `fit`
pub(crate) fn scored_item(
    id: &str,
    category: Option<&str>,
    fit: f64,
    novelty: f64,
) -> ScoredItem {
    let component_breakdown = WEIGHTS
        .iter()
        .map(|(key, weight)| ComponentScore {
            key: key.to_string(),
            label: key.to_string(),
            value: fit,
            weight: *weight,
            contribution: fit * weight,
        })
        .collect();

    let mut candidate = candidate(id, CandidateSource::Hybrid, fit);
    candidate.event.category = category.map(str::to_string);

    ScoredItem {
        candidate,
        fit_score: fit,
        mood_score: fit,
        component_breakdown,
        reasons: Vec::new(),
        novelty_score: novelty,
        social_heat: 0.2,
        distance_km: Some(1.0),
        friends_interested: Vec::new(),
    }
}

/// Overrides one component value, keeping its contribution consistent
pub(crate) fn with_component(mut item: ScoredItem, key: &str, value: f64) -> ScoredItem {
    if let Some(component) = item.component_breakdown.iter_mut().find(|c| c.key == key) {
        component.value = value;
        component.contribution = value * component.weight;
    }
    item.fit_score = item.component_breakdown.iter().map(|c| c.contribution).sum();
    item
}
