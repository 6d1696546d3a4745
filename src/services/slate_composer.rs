use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
};

use crate::{
    models::{normalize_category, ScoredItem, Slate, SlateLabel, Slates},
    services::fit_scorer::{BUDGET, DISTANCE, MOOD, SEMANTIC, SOCIAL, TEXT, TIME},
};

#[derive(Debug, Clone)]
pub struct SlateConfig {
    pub slate_size: usize,
    pub wildcard_fit_floor: f64,
    pub wildcard_category_cap: usize,
    pub close_max_arrival_minutes: f64,
    pub travel_speed_kmh: f64,
}

impl Default for SlateConfig {
    fn default() -> Self {
        Self {
            slate_size: 5,
            wildcard_fit_floor: 0.4,
            wildcard_category_cap: 2,
            close_max_arrival_minutes: 30.0,
            travel_speed_kmh: 20.0,
        }
    }
}

/// Reweighting used for closeAndEasy: convenience first
const CONVENIENCE_WEIGHTS: [(&str, f64); 7] = [
    (DISTANCE, 0.35),
    (BUDGET, 0.30),
    (TIME, 0.15),
    (TEXT, 0.05),
    (SEMANTIC, 0.05),
    (MOOD, 0.05),
    (SOCIAL, 0.05),
];

/// Fills best, then wildcard, then closeAndEasy from what is left.
///
/// An item lands in at most one slate. A slate comes up short rather than borrowing from
/// an earlier one.
pub fn compose(items: &[ScoredItem], config: &SlateConfig) -> Slates {
    let mut taken: HashSet<&str> = HashSet::new();

    let best = fill(
        SlateLabel::Best,
        rank_best(items),
        config.slate_size,
        &mut taken,
        |_| true,
    );

    let mut per_category: HashMap<Option<String>, usize> = HashMap::new();
    let wildcard = fill(
        SlateLabel::Wildcard,
        rank_wildcard(items, config.wildcard_fit_floor),
        config.slate_size,
        &mut taken,
        |item| {
            let used = per_category
                .entry(normalize_category(item.category()))
                .or_insert(0);
            if *used >= config.wildcard_category_cap {
                return false;
            }
            *used += 1;
            true
        },
    );

    let close_and_easy = fill(
        SlateLabel::CloseAndEasy,
        rank_close_and_easy(items, config),
        config.slate_size,
        &mut taken,
        |_| true,
    );

    Slates {
        best,
        wildcard,
        close_and_easy,
    }
}

fn fill<'a>(
    label: SlateLabel,
    ranked: Vec<&'a ScoredItem>,
    size: usize,
    taken: &mut HashSet<&'a str>,
    mut admit: impl FnMut(&'a ScoredItem) -> bool,
) -> Slate {
    let mut slate = Slate::new(label);
    for item in ranked {
        if slate.items.len() >= size {
            break;
        }
        if taken.contains(item.id()) || !admit(item) {
            continue;
        }
        taken.insert(item.id());
        slate.items.push(item.clone());
    }
    slate
}

fn by_id(a: &ScoredItem, b: &ScoredItem) -> Ordering {
    a.id().cmp(b.id())
}

fn rank_best(items: &[ScoredItem]) -> Vec<&ScoredItem> {
    let mut ranked: Vec<&ScoredItem> = items.iter().collect();
    ranked.sort_by(|a, b| b.fit_score.total_cmp(&a.fit_score).then_with(|| by_id(a, b)));
    ranked
}

fn rank_wildcard(items: &[ScoredItem], floor: f64) -> Vec<&ScoredItem> {
    let mut ranked: Vec<&ScoredItem> = items.iter().filter(|i| i.fit_score >= floor).collect();
    ranked.sort_by(|a, b| {
        b.novelty_score
            .total_cmp(&a.novelty_score)
            .then_with(|| b.fit_score.total_cmp(&a.fit_score))
            .then_with(|| by_id(a, b))
    });
    ranked
}

fn rank_close_and_easy<'a>(items: &'a [ScoredItem], config: &SlateConfig) -> Vec<&'a ScoredItem> {
    let mut ranked: Vec<(f64, &ScoredItem)> = items
        .iter()
        .filter(|item| {
            arrival_minutes(item, config.travel_speed_kmh)
                .is_some_and(|minutes| minutes <= config.close_max_arrival_minutes)
        })
        .map(|item| (convenience_score(item), item))
        .collect();
    ranked.sort_by(|(sa, a), (sb, b)| sb.total_cmp(sa).then_with(|| by_id(a, b)));
    ranked.into_iter().map(|(_, item)| item).collect()
}

/// Travel time at `speed_kmh`; `None` when the distance is unknown
pub fn arrival_minutes(item: &ScoredItem, speed_kmh: f64) -> Option<f64> {
    if speed_kmh <= 0.0 {
        return None;
    }
    item.distance_km
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map(|d| d / speed_kmh * 60.0)
}

/// Component values reweighted toward distance, budget and start time
pub fn convenience_score(item: &ScoredItem) -> f64 {
    CONVENIENCE_WEIGHTS
        .iter()
        .map(|(key, weight)| item.component(key).map_or(0.0, |c| c.value) * weight)
        .sum()
}
