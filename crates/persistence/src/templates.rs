//! Localized prompt templates and announcement paths from the relational
//! store, with tenant fallback: the tenant-specific row wins, else the
//! `system` row (tenant ids sort after "system", so `ORDER BY tenant_id
//! DESC` puts the tenant row first).

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use sentiric_agent_core::{CallState, TemplateId};

use crate::error::PersistenceError;
use crate::prompts::{
    assemble_history_prompt, assemble_rag_prompt, render_welcome, FALLBACK_RAG_PROMPT,
    FALLBACK_SYSTEM_PROMPT, FALLBACK_WELCOME_PROMPT,
};

/// Template seam for the media bridge and dialog manager. The prompt
/// builders are default methods so mocks only need the two row lookups.
#[async_trait]
pub trait TemplateProvider: Send + Sync {
    async fn get_announcement_path(
        &self,
        id: &str,
        tenant_id: &str,
        language_code: &str,
    ) -> Result<String, PersistenceError>;

    async fn get_template(
        &self,
        id: &str,
        language_code: &str,
        tenant_id: &str,
    ) -> Result<String, PersistenceError>;

    /// Welcome prompt for the opening LLM call: known-user template when the
    /// matched user has a name, guest template otherwise. Store failures
    /// degrade to a hardcoded greeting.
    async fn welcome_prompt(&self, state: &CallState) -> String {
        let user_name = state
            .event
            .dialplan
            .as_ref()
            .and_then(|d| d.matched_user.as_ref())
            .and_then(|u| u.name.as_deref());
        let template_id = if user_name.is_some() {
            TemplateId::WelcomeKnownUser
        } else {
            TemplateId::WelcomeGuest
        };
        match self
            .get_template(template_id.as_str(), state.event.language_code(), &state.tenant_id)
            .await
        {
            Ok(template) => render_welcome(&template, user_name),
            Err(err) => {
                tracing::warn!(
                    call_id = %state.call_id,
                    trace_id = %state.trace_id,
                    template_id = template_id.as_str(),
                    error = %err,
                    "Welcome template unavailable, using fallback"
                );
                FALLBACK_WELCOME_PROMPT.to_string()
            }
        }
    }

    /// Full LLM prompt for the thinking step. With RAG context, the RAG
    /// template with `{context}`/`{query}` substituted; otherwise the
    /// default system prompt plus the conversation history.
    async fn llm_prompt(&self, state: &CallState, rag_context: &str) -> String {
        let language = state.event.language_code();
        if !rag_context.is_empty() {
            let query = state.last_user_turn().unwrap_or_default();
            let template = match self
                .get_template(TemplateId::SystemRag.as_str(), language, &state.tenant_id)
                .await
            {
                Ok(template) => template,
                Err(err) => {
                    tracing::warn!(
                        call_id = %state.call_id,
                        trace_id = %state.trace_id,
                        error = %err,
                        "RAG template unavailable, using fallback"
                    );
                    FALLBACK_RAG_PROMPT.to_string()
                }
            };
            return assemble_rag_prompt(&template, rag_context, query);
        }

        let system_prompt = match self
            .get_template(TemplateId::SystemDefault.as_str(), language, &state.tenant_id)
            .await
        {
            Ok(template) => template,
            Err(err) => {
                tracing::warn!(
                    call_id = %state.call_id,
                    trace_id = %state.trace_id,
                    error = %err,
                    "System template unavailable, using fallback"
                );
                FALLBACK_SYSTEM_PROMPT.to_string()
            }
        };
        assemble_history_prompt(&system_prompt, &state.conversation)
    }
}

/// Postgres implementation.
#[derive(Clone)]
pub struct PgTemplateStore {
    pool: PgPool,
}

impl PgTemplateStore {
    pub async fn connect(url: &str) -> Result<Self, PersistenceError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        tracing::info!("Connected to Postgres template store");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateProvider for PgTemplateStore {
    async fn get_announcement_path(
        &self,
        id: &str,
        tenant_id: &str,
        language_code: &str,
    ) -> Result<String, PersistenceError> {
        let path: Option<String> = sqlx::query_scalar(
            "SELECT audio_path FROM announcements \
             WHERE id = $1 AND tenant_id IN ($2, 'system') AND language_code = $3 \
             ORDER BY tenant_id DESC LIMIT 1",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(language_code)
        .fetch_optional(&self.pool)
        .await?;
        path.ok_or_else(|| {
            PersistenceError::NotFound(format!(
                "announcement {id} (tenant={tenant_id}, lang={language_code})"
            ))
        })
    }

    async fn get_template(
        &self,
        id: &str,
        language_code: &str,
        tenant_id: &str,
    ) -> Result<String, PersistenceError> {
        let content: Option<String> = sqlx::query_scalar(
            "SELECT content FROM templates \
             WHERE id = $1 AND language_code = $2 AND tenant_id IN ($3, 'system') \
             ORDER BY tenant_id DESC LIMIT 1",
        )
        .bind(id)
        .bind(language_code)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        content.ok_or_else(|| {
            PersistenceError::NotFound(format!(
                "template {id} (tenant={tenant_id}, lang={language_code})"
            ))
        })
    }
}
