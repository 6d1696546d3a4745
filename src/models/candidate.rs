use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::GeoPoint;

/// Canonical form of a category label: trimmed and upper-cased, blank meaning none
pub fn normalize_category(category: Option<&str>) -> Option<String> {
    category
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
}

/// Which retrieval branch produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
    Vector,
    Keyword,
    Hybrid,
}

impl CandidateSource {
    /// Tie-break priority in the merged list: hybrid first, then vector, then keyword
    pub fn priority(&self) -> u8 {
        match self {
            CandidateSource::Hybrid => 0,
            CandidateSource::Vector => 1,
            CandidateSource::Keyword => 2,
        }
    }
}

impl Display for CandidateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CandidateSource::Vector => "vector",
            CandidateSource::Keyword => "keyword",
            CandidateSource::Hybrid => "hybrid",
        };
        write!(f, "{}", name)
    }
}

/// Snapshot of the event as the search backends store it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFeatures {
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub price_min: Option<f64>,
    #[serde(default)]
    pub price_max: Option<f64>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    /// Distance the backend already computed against the city centre, if any
    #[serde(default)]
    pub distance_km: Option<f64>,
}

impl EventFeatures {
    /// Price used for budget fitting: the cheapest ticket when known
    pub fn reference_price(&self) -> Option<f64> {
        self.price_min.or(self.price_max)
    }

    /// Text handed to the cross-encoder
    pub fn rerank_document(&self) -> String {
        let mut doc = self.title.clone();
        if let Some(category) = &self.category {
            doc.push_str(" | ");
            doc.push_str(category);
        }
        if !self.tags.is_empty() {
            doc.push_str(" | ");
            doc.push_str(&self.tags.join(", "));
        }
        if let Some(venue) = &self.venue {
            doc.push_str(" @ ");
            doc.push_str(venue);
        }
        doc
    }
}

/// One hit returned by a search backend, already validated on ingress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendHit {
    pub id: String,
    pub score: f64,
    pub payload: EventFeatures,
}

/// A retrieved item before scoring and enrichment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    pub source: CandidateSource,
    /// Merged, normalized retrieval score used for ordering
    pub raw_score: f64,
    /// Normalized keyword-branch score, when the keyword backend returned the item
    pub lexical_score: Option<f64>,
    /// Normalized vector-branch score, when the vector backend returned the item
    pub semantic_score: Option<f64>,
    #[serde(default)]
    pub rerank_score: Option<f64>,
    pub event: EventFeatures,
}

/// Recent engagement counters for one item
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialProof {
    pub views: u32,
    pub saves: u32,
    pub friends: u32,
}

impl SocialProof {
    pub fn is_empty(&self) -> bool {
        self.views == 0 && self.saves == 0 && self.friends == 0
    }
}
