//! Speech synthesis via the TTS gateway.
//!
//! The synthesized audio comes back as bytes and is handed to the media
//! engine as a `data:` URI, so no shared storage is needed between the two.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tonic::transport::Channel;
use tonic::Request;
use url::Url;

use sentiric_agent_contracts::tts::v1::text_to_speech_service_client::TextToSpeechServiceClient;
use sentiric_agent_contracts::tts::v1::SynthesizeRequest;
use sentiric_agent_core::{AgentError, CallState};

const SYNTHESIZE_DEADLINE: Duration = Duration::from_secs(20);

/// Validate a caller-supplied voice-cloning sample URL against the
/// hostname allow-list. Rejections are hard errors: a bad URL here is
/// either misconfiguration or an SSRF attempt, never something to degrade
/// around.
pub fn check_speaker_url(raw: &str, allowed_hosts: &[String]) -> Result<(), AgentError> {
    let rejected = |why: String| {
        metrics::counter!("agent_events_failed_total", "reason" => "ssrf_attempt_blocked")
            .increment(1);
        AgentError::SpeakerUrlRejected(why)
    };

    let url = Url::parse(raw).map_err(|e| rejected(format!("unparseable '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(rejected(format!("scheme '{}' not allowed", url.scheme())));
    }
    let host = url
        .host_str()
        .ok_or_else(|| rejected(format!("no host in '{raw}'")))?;
    if !allowed_hosts.iter().any(|h| h == host) {
        return Err(rejected(format!("host '{host}' not in allow-list")));
    }
    Ok(())
}

/// Synthesis seam for the dialog manager.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` in the call's language; returns a playable
    /// `data:audio/wav;base64,…` URI.
    async fn synthesize(&self, state: &CallState, text: &str) -> Result<String, AgentError>;
}

/// gRPC-backed synthesizer.
#[derive(Clone)]
pub struct GrpcSpeechSynthesizer {
    client: TextToSpeechServiceClient<Channel>,
    allowed_speaker_hosts: Vec<String>,
}

impl GrpcSpeechSynthesizer {
    pub fn new(channel: Channel, allowed_speaker_hosts: Vec<String>) -> Self {
        Self {
            client: TextToSpeechServiceClient::new(channel),
            allowed_speaker_hosts,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for GrpcSpeechSynthesizer {
    async fn synthesize(&self, state: &CallState, text: &str) -> Result<String, AgentError> {
        let speaker_wav_url = match state.event.action_datum("speaker_wav_url") {
            Some(raw) => {
                check_speaker_url(raw, &self.allowed_speaker_hosts)?;
                Some(raw.to_string())
            }
            None => None,
        };
        // Voice selector only applies when no cloning sample is given.
        let voice_selector = if speaker_wav_url.is_none() {
            state
                .event
                .action_datum("voice_selector")
                .map(str::to_string)
        } else {
            None
        };

        let mut request = Request::new(SynthesizeRequest {
            text: text.to_string(),
            language_code: state.event.language_code().to_string(),
            speaker_wav_url,
            voice_selector,
        });
        request.set_timeout(SYNTHESIZE_DEADLINE);
        if let Ok(value) = state.trace_id.parse() {
            request.metadata_mut().insert("x-trace-id", value);
        }

        let mut client = self.client.clone();
        let response = client
            .synthesize(request)
            .await
            .map_err(|status| AgentError::Synthesis(format!("Synthesize: {status}")))?
            .into_inner();
        tracing::debug!(
            call_id = %state.call_id,
            trace_id = %state.trace_id,
            engine = %response.engine_used,
            bytes = response.audio_content.len(),
            "Speech synthesized"
        );
        Ok(format!(
            "data:audio/wav;base64,{}",
            BASE64.encode(response.audio_content)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow_list() -> Vec<String> {
        vec!["sentiric.github.io".to_string()]
    }

    #[test]
    fn accepts_allowed_https_host() {
        assert!(check_speaker_url(
            "https://sentiric.github.io/assets/voice.wav",
            &allow_list()
        )
        .is_ok());
    }

    #[test]
    fn rejects_non_http_scheme() {
        let err = check_speaker_url("file:///etc/passwd", &allow_list()).unwrap_err();
        assert!(matches!(err, AgentError::SpeakerUrlRejected(_)));
        assert!(check_speaker_url("gopher://sentiric.github.io/x", &allow_list()).is_err());
    }

    #[test]
    fn rejects_unlisted_and_lookalike_hosts() {
        assert!(check_speaker_url("https://evil.example.com/v.wav", &allow_list()).is_err());
        // Subdomains and suffix lookalikes are not exact matches.
        assert!(
            check_speaker_url("https://sentiric.github.io.evil.com/v.wav", &allow_list()).is_err()
        );
    }

    #[test]
    fn rejects_garbage_url() {
        assert!(check_speaker_url("not a url", &allow_list()).is_err());
    }
}
