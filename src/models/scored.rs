use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::Candidate;

/// One weighted term of the fit score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentScore {
    pub key: String,
    pub label: String,
    pub value: f64,
    pub weight: f64,
    pub contribution: f64,
}

/// A candidate with its fit score, explanation and graph signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredItem {
    #[serde(flatten)]
    pub candidate: Candidate,
    pub fit_score: f64,
    pub mood_score: f64,
    pub component_breakdown: Vec<ComponentScore>,
    pub reasons: Vec<String>,
    pub novelty_score: f64,
    pub social_heat: f64,
    /// Distance from the user's origin, when it could be determined
    pub distance_km: Option<f64>,
    #[serde(default)]
    pub friends_interested: Vec<String>,
}

impl ScoredItem {
    pub fn id(&self) -> &str {
        &self.candidate.id
    }

    pub fn component(&self, key: &str) -> Option<&ComponentScore> {
        self.component_breakdown.iter().find(|c| c.key == key)
    }

    pub fn category(&self) -> Option<&str> {
        self.candidate.event.category.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlateLabel {
    Best,
    Wildcard,
    CloseAndEasy,
}

impl Display for SlateLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SlateLabel::Best => "best",
            SlateLabel::Wildcard => "wildcard",
            SlateLabel::CloseAndEasy => "closeAndEasy",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slate {
    pub label: SlateLabel,
    pub items: Vec<ScoredItem>,
}

impl Slate {
    pub fn new(label: SlateLabel) -> Self {
        Self {
            label,
            items: Vec::new(),
        }
    }

    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.id()).collect()
    }
}

/// The three purpose-differentiated slates. Pairwise disjoint by item id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slates {
    pub best: Slate,
    pub wildcard: Slate,
    pub close_and_easy: Slate,
}

impl Default for Slates {
    fn default() -> Self {
        Self {
            best: Slate::new(SlateLabel::Best),
            wildcard: Slate::new(SlateLabel::Wildcard),
            close_and_easy: Slate::new(SlateLabel::CloseAndEasy),
        }
    }
}

impl Slates {
    pub fn iter(&self) -> impl Iterator<Item = &Slate> {
        [&self.best, &self.wildcard, &self.close_and_easy].into_iter()
    }
}
