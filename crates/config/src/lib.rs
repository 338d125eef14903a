//! Settings loaded from the process environment.
//!
//! The service is configured exclusively through environment variables
//! (container-first deployment); `load_settings` maps them onto [`Settings`]
//! and validates that the critical endpoints are present before the process
//! wires anything up.

use config::{Config, Environment};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("missing critical setting: {0}")]
    Missing(&'static str),
}

/// Main application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// `production` or `development`; controls log formatting.
    #[serde(default = "default_env")]
    pub env: String,

    // Critical infrastructure endpoints. Startup fails if absent.
    #[serde(default)]
    pub postgres_url: String,
    #[serde(default)]
    pub rabbitmq_url: String,
    #[serde(default)]
    pub redis_url: String,

    // Critical service endpoints.
    #[serde(default)]
    pub media_service_grpc_url: String,
    #[serde(default)]
    pub user_service_grpc_url: String,
    #[serde(default)]
    pub tts_gateway_url: String,
    #[serde(default)]
    pub llm_service_url: String,
    #[serde(default)]
    pub stt_service_url: String,

    // Optional knowledge base; RAG is disabled when unset.
    #[serde(default)]
    pub knowledge_service_grpc_url: Option<String>,
    #[serde(default = "default_knowledge_top_k")]
    pub knowledge_service_top_k: u32,

    // Recognizer tuning.
    #[serde(default = "default_sample_rate")]
    pub stt_service_target_sample_rate: u32,
    #[serde(default = "default_logprob_threshold")]
    pub stt_service_logprob_threshold: f64,
    #[serde(default = "default_no_speech_threshold")]
    pub stt_service_no_speech_threshold: f64,
    #[serde(default = "default_stream_timeout")]
    pub stt_service_stream_timeout_seconds: u64,

    // Dialog policy.
    #[serde(default = "default_max_failures")]
    pub agent_max_consecutive_failures: u32,
    /// CSV allow-list of hostnames for `speaker_wav_url` (SSRF protection).
    #[serde(default = "default_speaker_domains")]
    pub agent_allowed_speaker_domains: String,

    #[serde(default = "default_metrics_port")]
    pub metrics_port_agent: u16,

    // mTLS material; all three present enables mutual TLS on gRPC.
    #[serde(default)]
    pub agent_service_cert_path: Option<String>,
    #[serde(default)]
    pub agent_service_key_path: Option<String>,
    #[serde(default)]
    pub grpc_tls_ca_path: Option<String>,
}

fn default_env() -> String {
    "production".to_string()
}
fn default_knowledge_top_k() -> u32 {
    3
}
fn default_sample_rate() -> u32 {
    16000
}
fn default_logprob_threshold() -> f64 {
    -1.0
}
fn default_no_speech_threshold() -> f64 {
    0.6
}
fn default_stream_timeout() -> u64 {
    30
}
fn default_max_failures() -> u32 {
    2
}
fn default_speaker_domains() -> String {
    "sentiric.github.io".to_string()
}
fn default_metrics_port() -> u16 {
    9091
}

impl Settings {
    /// Parsed speaker-domain allow-list; blank entries dropped.
    pub fn allowed_speaker_domains(&self) -> Vec<String> {
        self.agent_allowed_speaker_domains
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// mTLS paths when all three are configured; otherwise plaintext gRPC.
    pub fn mtls_paths(&self) -> Option<(&str, &str, &str)> {
        match (
            self.agent_service_cert_path.as_deref(),
            self.agent_service_key_path.as_deref(),
            self.grpc_tls_ca_path.as_deref(),
        ) {
            (Some(cert), Some(key), Some(ca)) => Some((cert, key, ca)),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let critical = [
            ("POSTGRES_URL", &self.postgres_url),
            ("RABBITMQ_URL", &self.rabbitmq_url),
            ("REDIS_URL", &self.redis_url),
            ("MEDIA_SERVICE_GRPC_URL", &self.media_service_grpc_url),
            ("USER_SERVICE_GRPC_URL", &self.user_service_grpc_url),
            ("TTS_GATEWAY_URL", &self.tts_gateway_url),
            ("LLM_SERVICE_URL", &self.llm_service_url),
            ("STT_SERVICE_URL", &self.stt_service_url),
        ];
        for (name, value) in critical {
            if value.is_empty() {
                return Err(ConfigError::Missing(name));
            }
        }
        Ok(())
    }
}

/// Load settings from the environment and validate them.
pub fn load_settings() -> Result<Settings, ConfigError> {
    let source = Config::builder()
        .add_source(Environment::default().try_parsing(true))
        .build()?;
    let settings: Settings = source.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_settings() -> Settings {
        Settings {
            env: default_env(),
            postgres_url: "postgres://localhost/sentiric".into(),
            rabbitmq_url: "amqp://localhost".into(),
            redis_url: "redis://localhost".into(),
            media_service_grpc_url: "http://media:13031".into(),
            user_service_grpc_url: "http://user:13021".into(),
            tts_gateway_url: "http://tts:14011".into(),
            llm_service_url: "http://llm:15011".into(),
            stt_service_url: "http://stt:15021".into(),
            knowledge_service_grpc_url: None,
            knowledge_service_top_k: default_knowledge_top_k(),
            stt_service_target_sample_rate: default_sample_rate(),
            stt_service_logprob_threshold: default_logprob_threshold(),
            stt_service_no_speech_threshold: default_no_speech_threshold(),
            stt_service_stream_timeout_seconds: default_stream_timeout(),
            agent_max_consecutive_failures: default_max_failures(),
            agent_allowed_speaker_domains: "sentiric.github.io, cdn.example.com,".into(),
            metrics_port_agent: default_metrics_port(),
            agent_service_cert_path: None,
            agent_service_key_path: None,
            grpc_tls_ca_path: None,
        }
    }

    #[test]
    fn validate_accepts_complete_settings() {
        assert!(minimal_settings().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_critical_endpoint() {
        let mut settings = minimal_settings();
        settings.rabbitmq_url.clear();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Missing("RABBITMQ_URL"))
        ));
    }

    #[test]
    fn speaker_domains_are_trimmed_and_filtered() {
        let settings = minimal_settings();
        assert_eq!(
            settings.allowed_speaker_domains(),
            vec!["sentiric.github.io".to_string(), "cdn.example.com".to_string()]
        );
    }

    #[test]
    fn mtls_requires_all_three_paths() {
        let mut settings = minimal_settings();
        assert!(settings.mtls_paths().is_none());
        settings.agent_service_cert_path = Some("/tls/cert.pem".into());
        settings.agent_service_key_path = Some("/tls/key.pem".into());
        assert!(settings.mtls_paths().is_none());
        settings.grpc_tls_ca_path = Some("/tls/ca.pem".into());
        assert!(settings.mtls_paths().is_some());
    }
}
