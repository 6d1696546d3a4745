use serde::Serialize;

use crate::models::{
    normalize_category, Budget, Candidate, ComponentScore, Intention, Mood, SocialProof,
};

pub const TEXT: &str = "text";
pub const SEMANTIC: &str = "semantic";
pub const MOOD: &str = "mood";
pub const SOCIAL: &str = "social";
pub const BUDGET: &str = "budget";
pub const DISTANCE: &str = "distance";
pub const TIME: &str = "time";

/// Components in display order with their weights; the weights sum to 1.0
pub const COMPONENTS: [(&str, &str, f64); 7] = [
    (TEXT, "Matches what you searched", 0.25),
    (SEMANTIC, "Close to what you described", 0.20),
    (MOOD, "Fits your mood", 0.20),
    (SOCIAL, "Popular right now", 0.15),
    (BUDGET, "Within budget", 0.10),
    (DISTANCE, "Close by", 0.05),
    (TIME, "Starts in your window", 0.05),
];

/// Value at or above which a component is worth surfacing as a reason
pub const REASON_THRESHOLD: f64 = 0.6;
pub const MAX_REASONS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FitScore {
    pub score: f64,
    pub mood_score: f64,
    pub social_heat: f64,
    pub reasons: Vec<String>,
    pub components: Vec<ComponentScore>,
}

impl FitScore {
    pub fn component(&self, key: &str) -> Option<&ComponentScore> {
        self.components.iter().find(|c| c.key == key)
    }
}

/// Scores one candidate against the intention. Pure and deterministic.
pub fn score(
    event: &Candidate,
    intention: &Intention,
    social_proof: Option<&SocialProof>,
    distance_km: Option<f64>,
) -> FitScore {
    let tokens = &intention.tokens;
    let mood_score = mood_affinity(tokens.mood, event.event.category.as_deref());
    let social_heat = social_heat(social_proof);

    let minutes_until_start = event
        .event
        .starts_at
        .map(|starts_at| (starts_at - intention.now).num_minutes());

    let values = [
        clamp_unit(event.lexical_score.unwrap_or(0.0)),
        clamp_unit(event.semantic_score.unwrap_or(0.0)),
        mood_score,
        social_heat,
        budget_fit(tokens.budget, event.event.reference_price()),
        distance_fit(distance_km, tokens.distance_km),
        time_window_fit(minutes_until_start, tokens.until_minutes),
    ];

    let components: Vec<ComponentScore> = COMPONENTS
        .iter()
        .zip(values)
        .map(|((key, label, weight), value)| ComponentScore {
            key: key.to_string(),
            label: label.to_string(),
            value,
            weight: *weight,
            contribution: value * weight,
        })
        .collect();

    let score = components.iter().map(|c| c.contribution).sum::<f64>().clamp(0.0, 1.0);

    FitScore {
        score,
        mood_score,
        social_heat,
        reasons: reasons(&components),
        components,
    }
}

/// Labels of components worth at least [`REASON_THRESHOLD`], highest contribution first
pub fn reasons(components: &[ComponentScore]) -> Vec<String> {
    let mut strong: Vec<&ComponentScore> = components
        .iter()
        .filter(|c| c.value >= REASON_THRESHOLD)
        .collect();
    strong.sort_by(|a, b| b.contribution.total_cmp(&a.contribution));
    strong
        .into_iter()
        .take(MAX_REASONS)
        .map(|c| c.label.clone())
        .collect()
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn mood_affinity(mood: Mood, category: Option<&str>) -> f64 {
    let Some(category) = normalize_category(category) else {
        return 0.4;
    };

    let primary = mood.primary_categories();
    if primary.iter().any(|p| *p == category) {
        1.0
    } else if primary
        .iter()
        .any(|p| category.contains(p) || p.contains(category.as_str()))
    {
        0.7
    } else {
        0.3
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Blends views, saves and friend activity; 0.2 when there is nothing to go on
pub fn social_heat(proof: Option<&SocialProof>) -> f64 {
    match proof {
        Some(p) if !p.is_empty() => {
            let blended = sigmoid(p.views as f64 / 50.0)
                + 1.2 * sigmoid(p.saves as f64 / 15.0)
                + 1.5 * sigmoid(p.friends as f64);
            (blended / 3.7).clamp(0.0, 1.0)
        }
        _ => 0.2,
    }
}

pub fn budget_fit(budget: Budget, price: Option<f64>) -> f64 {
    let Some(price) = price.filter(|p| p.is_finite()) else {
        return 0.6;
    };

    if budget == Budget::Free {
        return if price <= 0.0 { 1.0 } else { 0.0 };
    }

    let threshold = budget.price_threshold();
    if price <= threshold {
        1.0
    } else if price <= threshold * 1.3 {
        0.6
    } else {
        0.2
    }
}

pub fn distance_fit(distance_km: Option<f64>, requested_km: f64) -> f64 {
    let Some(distance) = distance_km.filter(|d| d.is_finite() && *d >= 0.0) else {
        return 0.6;
    };
    if !requested_km.is_finite() || requested_km <= 0.0 {
        return 0.6;
    }

    let ratio = distance / requested_km;
    if ratio <= 0.5 {
        1.0
    } else if ratio <= 1.0 {
        0.7
    } else if ratio <= 1.5 {
        0.4
    } else {
        0.1
    }
}

pub fn time_window_fit(minutes_until_start: Option<i64>, until_minutes: u32) -> f64 {
    let Some(minutes) = minutes_until_start else {
        return 0.6;
    };

    let budget = until_minutes as f64;
    let minutes = minutes as f64;
    if minutes < 0.0 {
        0.2
    } else if minutes <= budget {
        1.0
    } else if minutes <= budget * 1.5 {
        0.6
    } else {
        0.3
    }
}
