use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt::Display};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Calm,
    Social,
    Electric,
    Artistic,
    Grounded,
}

impl Mood {
    /// Categories that express this mood most directly
    pub fn primary_categories(&self) -> &'static [&'static str] {
        match self {
            Mood::Calm => &["WELLNESS", "MUSEUM", "LITERATURE", "NATURE", "CLASSICAL"],
            Mood::Social => &["FOOD", "DRINKS", "NIGHTLIFE", "COMMUNITY", "GAMES"],
            Mood::Electric => &["MUSIC", "NIGHTLIFE", "SPORTS", "FESTIVAL", "DANCE"],
            Mood::Artistic => &["ART", "THEATER", "FILM", "MUSEUM", "LITERATURE"],
            Mood::Grounded => &["OUTDOORS", "WELLNESS", "WORKSHOP", "MARKET", "VOLUNTEER"],
        }
    }

    /// Free-text used against the search backends when the caller gave no query
    pub fn search_hint(&self) -> &'static str {
        match self {
            Mood::Calm => "quiet relaxing wellness museum reading",
            Mood::Social => "food drinks meetup games community",
            Mood::Electric => "live music concert dance party nightlife",
            Mood::Artistic => "art gallery theater film exhibition",
            Mood::Grounded => "outdoors hike workshop market volunteer",
        }
    }
}

impl Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Mood::Calm => "calm",
            Mood::Social => "social",
            Mood::Electric => "electric",
            Mood::Artistic => "artistic",
            Mood::Grounded => "grounded",
        };
        write!(f, "{}", name)
    }
}

/// Spend tier. Declaration order gives the total order free < casual < splurge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Budget {
    Free,
    Casual,
    Splurge,
}

impl Budget {
    /// Highest ticket price that still counts as fitting the tier
    pub fn price_threshold(&self) -> f64 {
        match self {
            Budget::Free => 0.0,
            Budget::Casual => 75.0,
            Budget::Splurge => 250.0,
        }
    }
}

impl Display for Budget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Budget::Free => "free",
            Budget::Casual => "casual",
            Budget::Splurge => "splurge",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Companion {
    Solo,
    Partner,
    Friends,
    Family,
    Kids,
}

impl Display for Companion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Companion::Solo => "solo",
            Companion::Partner => "partner",
            Companion::Friends => "friends",
            Companion::Family => "family",
            Companion::Kids => "kids",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentionSource {
    Inferred,
    Inline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentionTokens {
    pub mood: Mood,
    pub until_minutes: u32,
    pub distance_km: f64,
    pub budget: Budget,
    pub companions: BTreeSet<Companion>,
}

impl IntentionTokens {
    /// Stable textual form of the tokens, used as the cache query when no free text is given
    pub fn signature(&self) -> String {
        let companions: Vec<String> = self.companions.iter().map(|c| c.to_string()).collect();
        format!(
            "{} {} {}km {}m {}",
            self.mood,
            self.budget,
            self.distance_km,
            self.until_minutes,
            companions.join("+")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    /// Great-circle distance in kilometres
    pub fn haversine_km(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.lon - self.lon).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * Self::EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// Normalized description of what the user wants right now. Immutable per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intention {
    pub city: String,
    #[serde(rename = "nowISO")]
    pub now: DateTime<Utc>,
    pub tokens: IntentionTokens,
    pub source: IntentionSource,
    #[serde(default)]
    pub origin: Option<GeoPoint>,
}

impl Intention {
    /// Rejects malformed intentions before any backend is touched
    pub fn validate(&self) -> AppResult<()> {
        if self.city.trim().is_empty() {
            return Err(AppError::Validation("city must not be empty".to_string()));
        }
        if self.tokens.until_minutes == 0 {
            return Err(AppError::Validation(
                "untilMinutes must be greater than zero".to_string(),
            ));
        }
        if !self.tokens.distance_km.is_finite() || self.tokens.distance_km <= 0.0 {
            return Err(AppError::Validation(
                "distanceKm must be a positive number".to_string(),
            ));
        }
        if self.tokens.companions.is_empty() {
            return Err(AppError::Validation(
                "companions must name at least one companion".to_string(),
            ));
        }
        if let Some(origin) = &self.origin {
            if !(-90.0..=90.0).contains(&origin.lat) || !(-180.0..=180.0).contains(&origin.lon) {
                return Err(AppError::Validation("origin is out of range".to_string()));
            }
        }
        Ok(())
    }

    /// Latest start time still worth retrieving
    pub fn horizon(&self) -> DateTime<Utc> {
        // Retrieve a little past the budget so the time-window component can grade near misses
        let minutes = i64::from(self.tokens.until_minutes) * 2;
        self.now + chrono::Duration::minutes(minutes)
    }
}
