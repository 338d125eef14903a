//! Knowledge-base retrieval for grounding LLM answers.

use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::Channel;
use tonic::{Code, Request};

use sentiric_agent_contracts::knowledge::v1::knowledge_service_client::KnowledgeServiceClient;
use sentiric_agent_contracts::knowledge::v1::QueryRequest;
use sentiric_agent_core::AgentError;

const QUERY_DEADLINE: Duration = Duration::from_secs(10);

/// Retrieval seam for the dialog manager. Absent entirely when no knowledge
/// service is configured.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Look up context for a user query. An empty string means "nothing
    /// relevant"; the prompt builder then falls back to plain history.
    async fn query(
        &self,
        tenant_id: &str,
        query: &str,
        trace_id: &str,
    ) -> Result<String, AgentError>;
}

/// Render retrieval hits into the prompt-context block.
pub fn format_context(results: &[(String, f32)]) -> String {
    if results.is_empty() {
        return String::new();
    }
    let mut out = String::from("İlgili Bilgiler:\n");
    for (i, (content, _score)) in results.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, content));
    }
    out
}

/// gRPC-backed store.
#[derive(Clone)]
pub struct GrpcKnowledgeStore {
    client: KnowledgeServiceClient<Channel>,
    top_k: u32,
}

impl GrpcKnowledgeStore {
    pub fn new(channel: Channel, top_k: u32) -> Self {
        Self {
            client: KnowledgeServiceClient::new(channel),
            top_k,
        }
    }
}

#[async_trait]
impl KnowledgeStore for GrpcKnowledgeStore {
    async fn query(
        &self,
        tenant_id: &str,
        query: &str,
        trace_id: &str,
    ) -> Result<String, AgentError> {
        let mut request = Request::new(QueryRequest {
            tenant_id: tenant_id.to_string(),
            query: query.to_string(),
            top_k: self.top_k as i32,
        });
        request.set_timeout(QUERY_DEADLINE);
        if let Ok(value) = trace_id.parse() {
            request.metadata_mut().insert("x-trace-id", value);
        }

        let mut client = self.client.clone();
        match client.query(request).await {
            Ok(response) => {
                let results: Vec<(String, f32)> = response
                    .into_inner()
                    .results
                    .into_iter()
                    .map(|r| (r.content, r.score))
                    .collect();
                Ok(format_context(&results))
            }
            // Tenant without a knowledge base, or the service being down,
            // just means an ungrounded answer.
            Err(status) if matches!(status.code(), Code::NotFound | Code::Unavailable) => {
                tracing::debug!(trace_id, code = ?status.code(), "Knowledge base unavailable");
                Ok(String::new())
            }
            Err(status) => Err(AgentError::Knowledge(format!("Query: {status}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_numbered_context_block() {
        let hits = vec![
            ("Açılış saatleri 09:00-18:00".to_string(), 0.92),
            ("Pazar günleri kapalıyız".to_string(), 0.81),
        ];
        assert_eq!(
            format_context(&hits),
            "İlgili Bilgiler:\n1. Açılış saatleri 09:00-18:00\n2. Pazar günleri kapalıyız\n"
        );
    }

    #[test]
    fn empty_hits_give_empty_context() {
        assert_eq!(format_context(&[]), "");
    }
}
