//! HTTP client for the language-model service.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sentiric_agent_core::AgentError;

const GENERATE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    text: String,
}

/// Text generation seam for the dialog manager.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str, trace_id: &str) -> Result<String, AgentError>;
}

/// Client for the platform LLM gateway's `POST /generate` endpoint.
#[derive(Clone)]
pub struct HttpLlmClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpLlmClient {
    pub fn new(base_url: &str) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(GENERATE_TIMEOUT)
            .build()
            .map_err(|e| AgentError::Llm(format!("build http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn generate(&self, prompt: &str, trace_id: &str) -> Result<String, AgentError> {
        let url = format!("{}/generate", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("X-Trace-ID", trace_id)
            .json(&GenerateRequest { prompt })
            .send()
            .await
            .map_err(|e| AgentError::Llm(format!("request to {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Llm(format!(
                "llm service returned {status}: {body}"
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Llm(format!("decode llm response: {e}")))?;
        Ok(parsed.text)
    }
}
