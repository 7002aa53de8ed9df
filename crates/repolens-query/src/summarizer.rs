use crate::analyze::Summary;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// External summarizer collaborator. Strictly optional: the engine always
/// produces the structured summary itself and only lets this client rewrite
/// the freeform one-liner. Any failure falls back silently.
pub struct SummarizerClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct SummarizeRequest<'a> {
    query: &'a str,
    one_liner: &'a str,
    steps: &'a [String],
}

#[derive(Deserialize)]
struct SummarizeResponse {
    summary: String,
}

impl SummarizerClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub async fn summarize(&self, query: &str, summary: &Summary) -> Option<String> {
        let request = SummarizeRequest {
            query,
            one_liner: &summary.one_liner,
            steps: &summary.steps,
        };
        let response = self
            .client
            .post(format!("{}/summarize", self.base_url))
            .json(&request)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                match response.json::<SummarizeResponse>().await {
                    Ok(body) if !body.summary.is_empty() => Some(body.summary),
                    Ok(_) => None,
                    Err(e) => {
                        warn!("summarizer returned malformed body: {}", e);
                        None
                    }
                }
            }
            Ok(response) => {
                warn!("summarizer responded with {}", response.status());
                None
            }
            Err(e) => {
                warn!("summarizer unreachable: {}", e);
                None
            }
        }
    }
}
