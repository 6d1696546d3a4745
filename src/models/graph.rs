use serde::{Deserialize, Serialize};

use super::SocialProof;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: String,
    pub similarity: f64,
}

/// Items the relationship store considers similar to `id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarItems {
    pub id: String,
    #[serde(default)]
    pub neighbors: Vec<Neighbor>,
}

/// How many of an item's similar items the user already interacted with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoveltyRecord {
    pub id: String,
    pub similar_total: u32,
    pub similar_seen: u32,
}

impl NoveltyRecord {
    /// 1 minus the seen fraction; 0.5 without any history to compare against
    pub fn novelty(&self) -> f64 {
        if self.similar_total == 0 {
            return 0.5;
        }
        let seen = self.similar_seen.min(self.similar_total) as f64;
        1.0 - seen / self.similar_total as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendOverlap {
    pub id: String,
    #[serde(default)]
    pub friend_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialHeatRecord {
    pub id: String,
    #[serde(default)]
    pub views: u32,
    #[serde(default)]
    pub saves: u32,
    #[serde(default)]
    pub friends: u32,
}

impl SocialHeatRecord {
    pub fn proof(&self) -> SocialProof {
        SocialProof {
            views: self.views,
            saves: self.saves,
            friends: self.friends,
        }
    }
}

/// One record as the relationship store sends it. The `kind` tag is checked on ingress so a
/// response for one query can never be read as another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GraphRecord {
    Similar(SimilarItems),
    Novelty(NoveltyRecord),
    FriendOverlap(FriendOverlap),
    SocialHeat(SocialHeatRecord),
}

impl GraphRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            GraphRecord::Similar(_) => "similar",
            GraphRecord::Novelty(_) => "novelty",
            GraphRecord::FriendOverlap(_) => "friendOverlap",
            GraphRecord::SocialHeat(_) => "socialHeat",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_novelty_fraction() {
        let record = NoveltyRecord {
            id: "a".to_string(),
            similar_total: 4,
            similar_seen: 1,
        };
        assert!((record.novelty() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_novelty_without_history_is_neutral() {
        let record = NoveltyRecord {
            id: "a".to_string(),
            similar_total: 0,
            similar_seen: 0,
        };
        assert_eq!(record.novelty(), 0.5);
    }

    #[test]
    fn test_novelty_clamps_inconsistent_counts() {
        let record = NoveltyRecord {
            id: "a".to_string(),
            similar_total: 2,
            similar_seen: 5,
        };
        assert_eq!(record.novelty(), 0.0);
    }

    #[test]
    fn test_tagged_records_deserialize() {
        let json = r#"[
            {"kind": "similar", "id": "a", "neighbors": [{"id": "b", "similarity": 0.9}]},
            {"kind": "novelty", "id": "a", "similarTotal": 3, "similarSeen": 0},
            {"kind": "friendOverlap", "id": "a", "friendIds": ["u2"]},
            {"kind": "socialHeat", "id": "a", "views": 10, "saves": 2, "friends": 1}
        ]"#;

        let records: Vec<GraphRecord> = serde_json::from_str(json).unwrap();
        let kinds: Vec<&str> = records.iter().map(GraphRecord::kind).collect();
        assert_eq!(kinds, vec!["similar", "novelty", "friendOverlap", "socialHeat"]);

        match &records[3] {
            GraphRecord::SocialHeat(heat) => assert_eq!(heat.proof().saves, 2),
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let json = r#"{"kind": "purchase", "id": "a"}"#;
        assert!(serde_json::from_str::<GraphRecord>(json).is_err());
    }
}
