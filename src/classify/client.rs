//! HTTP client for the text-generation backend used to classify entities.
//!
//! Entities are sent in small chunks; each chunk's reply is a JSON object
//! mapping entity ids to labels. Rate-limited chunks are retried with
//! exponential backoff and failed chunks are skipped, so the final mapping
//! may be partial.

use super::{DimensionClassifier, PendingClassification};
use crate::graph::types::Entity;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

const DEFAULT_URL: &str = "http://127.0.0.1:8000";

/// Classifier endpoint and pacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub url: String,
    pub chunk_size: usize,
    /// Pause after each successful chunk
    pub chunk_pause_ms: u64,
    /// Retries after a rate-limit response
    pub max_retries: u32,
    /// First backoff delay, doubled per retry
    pub retry_base_ms: u64,
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            chunk_size: 10,
            chunk_pause_ms: 1000,
            max_retries: 3,
            retry_base_ms: 2000,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
}

/// Fields sent to the model for each entity
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SlimEntity<'a> {
    id: &'a str,
    name: &'a str,
    company: &'a str,
    role: &'a str,
    industry: &'a str,
    location: &'a str,
    current_tags: Vec<&'a str>,
}

impl<'a> From<&'a Entity> for SlimEntity<'a> {
    fn from(e: &'a Entity) -> Self {
        Self {
            id: &e.id,
            name: &e.name,
            company: &e.company,
            role: &e.role,
            industry: &e.industry,
            location: &e.location,
            current_tags: e.tags.iter().map(String::as_str).collect(),
        }
    }
}

enum ChunkError {
    RateLimited,
    Failed(String),
}

pub struct HttpClassifier {
    client: Client,
    config: ClassifierConfig,
    runtime: Arc<Runtime>,
}

impl HttpClassifier {
    pub fn new(config: ClassifierConfig) -> Result<Self, String> {
        let runtime = Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            client,
            config,
            runtime: Arc::new(runtime),
        })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Check if the backend is reachable
    pub fn health(&self) -> Result<bool, String> {
        let url = format!("{}/health", self.config.url);
        self.runtime.block_on(async {
            let resp = self
                .client
                .get(&url)
                .timeout(Duration::from_secs(2))
                .send()
                .await
                .map_err(|e| format!("Failed to connect to classifier: {}", e))?;
            if resp.status().is_success() {
                Ok(true)
            } else {
                Err(format!("Classifier returned status: {}", resp.status()))
            }
        })
    }
}

impl DimensionClassifier for HttpClassifier {
    fn classify(&self, entities: &[Entity], dimension: &str) -> PendingClassification {
        let (tx, pending) = PendingClassification::channel(dimension);
        let client = self.client.clone();
        let config = self.config.clone();
        let dimension = dimension.to_string();
        let entities = entities.to_vec();

        self.runtime.spawn(async move {
            let mapping = classify_all(&client, &config, &entities, &dimension).await;
            // Receiver gone means the dimension was abandoned
            let _ = tx.send(mapping);
        });
        pending
    }
}

async fn classify_all(
    client: &Client,
    config: &ClassifierConfig,
    entities: &[Entity],
    dimension: &str,
) -> HashMap<String, String> {
    let mut mapping = HashMap::new();
    let chunks: Vec<&[Entity]> = entities.chunks(config.chunk_size.max(1)).collect();

    for (i, chunk) in chunks.iter().enumerate() {
        let prompt = match build_prompt(dimension, chunk) {
            Ok(prompt) => prompt,
            Err(e) => {
                tracing::warn!("Skipping chunk {}: {}", i + 1, e);
                continue;
            }
        };

        match classify_with_retry(client, config, &prompt).await {
            Ok(part) => {
                tracing::debug!("Chunk {}/{}: {} labels", i + 1, chunks.len(), part.len());
                mapping.extend(part);
                tokio::time::sleep(Duration::from_millis(config.chunk_pause_ms)).await;
            }
            Err(e) => tracing::warn!("Classification chunk {}/{} failed: {}", i + 1, chunks.len(), e),
        }
    }
    mapping
}

async fn classify_with_retry(
    client: &Client,
    config: &ClassifierConfig,
    prompt: &str,
) -> Result<HashMap<String, String>, String> {
    let mut backoff = Duration::from_millis(config.retry_base_ms);
    let mut retries_left = config.max_retries;
    loop {
        match classify_chunk(client, &config.url, prompt).await {
            Ok(mapping) => return Ok(mapping),
            Err(ChunkError::RateLimited) if retries_left > 0 => {
                tracing::warn!(
                    "Rate limit hit. Retrying in {:?} ({} attempts left)",
                    backoff,
                    retries_left
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                retries_left -= 1;
            }
            Err(ChunkError::RateLimited) => return Err("Rate limited".to_string()),
            Err(ChunkError::Failed(e)) => return Err(e),
        }
    }
}

async fn classify_chunk(
    client: &Client,
    base_url: &str,
    prompt: &str,
) -> Result<HashMap<String, String>, ChunkError> {
    let url = format!("{}/api/generate", base_url);
    let resp = client
        .post(&url)
        .json(&GenerateRequest { prompt })
        .send()
        .await
        .map_err(|e| ChunkError::Failed(format!("Request failed: {}", e)))?;

    if resp.status() == StatusCode::TOO_MANY_REQUESTS {
        return Err(ChunkError::RateLimited);
    }
    if !resp.status().is_success() {
        return Err(ChunkError::Failed(format!("API error: {}", resp.status())));
    }

    let body: GenerateResponse = resp
        .json()
        .await
        .map_err(|e| ChunkError::Failed(format!("Failed to parse response: {}", e)))?;

    parse_mapping(&body.text).map_err(ChunkError::Failed)
}

fn build_prompt(dimension: &str, chunk: &[Entity]) -> Result<String, String> {
    let slim: Vec<SlimEntity> = chunk.iter().map(SlimEntity::from).collect();
    let contacts = serde_json::to_string(&slim)
        .map_err(|e| format!("Failed to serialize contacts: {}", e))?;
    Ok(format!(
        r#"I want to group these contacts by a specific dimension/attribute: "{dimension}".

For each contact, infer if they belong to this group or what their specific value is.
Use Name, Company, Job Title, Industry, Location and Tags.

LOGIC:
1. If the dimension looks like a specific attribute (e.g. "Female", "Founder", "Investor"), perform a BINARY grouping.
   - If yes: Value = "{dimension}" (Title Case)
   - If no: Value = "Other"
2. If the dimension is a category (e.g. "Industry", "Seniority"), return the specific value.

Return only a JSON object where keys are Contact IDs and values are the Category String.
Use "Unknown" if absolutely unsure.

{contacts}"#
    ))
}

/// Parse the model's reply into an id -> label mapping.
///
/// Markdown code fences are stripped; non-string values are skipped.
fn parse_mapping(text: &str) -> Result<HashMap<String, String>, String> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed)
        .trim();

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| format!("Reply is not JSON: {}", e))?;
    let object = value
        .as_object()
        .ok_or_else(|| "Reply is not a JSON object".to_string())?;

    Ok(object
        .iter()
        .filter_map(|(id, label)| label.as_str().map(|l| (id.clone(), l.to_string())))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_fenced_replies() {
        let plain = parse_mapping(r#"{"a": "Female", "b": "Other"}"#).unwrap();
        assert_eq!(plain.len(), 2);
        assert_eq!(plain["a"], "Female");

        let fenced = parse_mapping("```json\n{\"a\": \"Founder\", \"b\": 3}\n```").unwrap();
        assert_eq!(fenced.len(), 1);
        assert_eq!(fenced["a"], "Founder");
    }

    #[test]
    fn rejects_non_objects() {
        assert!(parse_mapping("[1, 2]").is_err());
        assert!(parse_mapping("Error: No response candidates").is_err());
    }

    #[test]
    fn prompt_carries_dimension_and_ids() {
        let mut e = Entity::new("c-42", "Grace");
        e.tags = ["Navy".to_string()].into();
        let prompt = build_prompt("Seniority", &[e]).unwrap();
        assert!(prompt.contains("\"Seniority\""));
        assert!(prompt.contains("\"id\":\"c-42\""));
        assert!(prompt.contains("\"currentTags\":[\"Navy\"]"));
    }

    #[test]
    fn unreachable_backend_yields_empty_mapping() {
        let config = ClassifierConfig {
            url: "http://127.0.0.1:9".to_string(),
            max_retries: 0,
            chunk_pause_ms: 0,
            timeout_secs: 2,
            ..Default::default()
        };
        let classifier = HttpClassifier::new(config).unwrap();
        let entities = vec![Entity::new("a", "A"), Entity::new("b", "B")];
        let pending = classifier.classify(&entities, "Gender");

        let started = std::time::Instant::now();
        let mapping = loop {
            if let Some(mapping) = pending.poll() {
                break mapping;
            }
            assert!(started.elapsed() < Duration::from_secs(20));
            std::thread::sleep(Duration::from_millis(20));
        };
        assert!(mapping.is_empty());
    }
}
