use reqwest::Client as HttpClient;
use serde_json::Value;

use crate::{
    error::{AppError, AppResult},
    services::backends::Reranker,
};

/// Cross-encoder reranker reached over HTTP (`{model, query, documents}` in, indexed scores out)
#[derive(Clone)]
pub struct HttpReranker {
    http_client: HttpClient,
    url: String,
    model: String,
}

impl HttpReranker {
    pub fn new(url: String, model: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            url,
            model,
        }
    }
}

#[async_trait::async_trait]
impl Reranker for HttpReranker {
    async fn rerank(&self, query: &str, documents: &[String]) -> AppResult<Vec<f64>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "query": query,
            "documents": documents,
        });

        let response = self.http_client.post(&self.url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::unavailable(
                "rerank",
                format!("status {}", status),
            ));
        }

        let json: Value = response.json().await?;
        parse_rerank_response(json, documents.len())
    }
}

/// Aligns `results[].{index, relevance_score|score}` back onto document order.
/// Documents the service did not score keep 0.
fn parse_rerank_response(json: Value, doc_count: usize) -> AppResult<Vec<f64>> {
    let mut scores = vec![0.0f64; doc_count];
    let results = json
        .get("results")
        .or_else(|| json.get("data"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| AppError::unavailable("rerank", "response is missing results array"))?;

    for item in results {
        let index = item
            .get("index")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| AppError::unavailable("rerank", "result missing index"))?
            as usize;
        let score = item
            .get("relevance_score")
            .or_else(|| item.get("score"))
            .and_then(|v| v.as_f64())
            .ok_or_else(|| AppError::unavailable("rerank", "result missing score"))?;
        if index < scores.len() {
            scores[index] = score;
        }
    }

    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligns_scores_by_index() {
        let json = serde_json::json!({
            "results": [
                { "index": 1, "relevance_score": 0.2 },
                { "index": 0, "relevance_score": 0.9 }
            ]
        });
        let scores = parse_rerank_response(json, 2).unwrap();
        assert_eq!(scores, vec![0.9, 0.2]);
    }

    #[test]
    fn test_accepts_data_and_score_aliases() {
        let json = serde_json::json!({
            "data": [{ "index": 0, "score": 0.7 }]
        });
        let scores = parse_rerank_response(json, 2).unwrap();
        assert_eq!(scores, vec![0.7, 0.0]);
    }

    #[test]
    fn test_ignores_out_of_range_index() {
        let json = serde_json::json!({
            "results": [{ "index": 5, "score": 0.7 }]
        });
        assert_eq!(parse_rerank_response(json, 1).unwrap(), vec![0.0]);
    }

    #[test]
    fn test_missing_results_is_unavailable() {
        let json = serde_json::json!({ "error": "model loading" });
        assert!(matches!(
            parse_rerank_response(json, 1),
            Err(AppError::BackendUnavailable { backend: "rerank", .. })
        ));
    }
}
