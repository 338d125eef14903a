//! Live transcription: bridges the media engine's PCM stream into the STT
//! service's streaming WebSocket endpoint.
//!
//! A producer task pumps `RecordAudio` chunks into binary frames; the
//! consumer waits for a recognizer verdict, bounded by a wall-clock timeout
//! so a silent line can never hold the dialog loop forever.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tonic::{Request, Streaming};
use url::Url;

use sentiric_agent_contracts::media::v1::media_service_client::MediaServiceClient;
use sentiric_agent_contracts::media::v1::{AudioChunk, RecordAudioRequest};
use sentiric_agent_core::{AgentError, CallState};

const STREAM_PATH: &str = "/api/v1/transcribe-stream";
const DEFAULT_VAD_LEVEL: &str = "1";
const DIAL_ATTEMPTS: u32 = 3;
const DIAL_BACKOFF: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outcome of one listening window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcript {
    /// The recognizer produced a final utterance.
    Final(String),
    /// The caller said nothing the recognizer could use.
    NoSpeech,
}

/// Transcription seam for the dialog manager.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn listen(
        &self,
        state: &CallState,
        cancel: &CancellationToken,
    ) -> Result<Transcript, AgentError>;
}

/// Recognizer tuning carried from settings.
#[derive(Debug, Clone)]
pub struct SttStreamConfig {
    pub base_url: String,
    pub target_sample_rate: u32,
    pub logprob_threshold: f64,
    pub no_speech_threshold: f64,
    pub stream_timeout: Duration,
}

/// Derive the streaming endpoint from the STT base URL: `http`/`https`
/// map onto `ws`/`wss`, tuning knobs travel as query parameters.
pub fn build_stream_url(
    base_url: &str,
    language: &str,
    config: &SttStreamConfig,
    vad_level: &str,
) -> Result<Url, AgentError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| AgentError::Transcription(format!("invalid stt url '{base_url}': {e}")))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        "ws" => "ws",
        "wss" => "wss",
        other => {
            return Err(AgentError::Transcription(format!(
                "unsupported stt scheme '{other}'"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| AgentError::Transcription(format!("cannot derive ws url from '{base_url}'")))?;
    url.set_path(STREAM_PATH);
    url.query_pairs_mut()
        .clear()
        .append_pair("language", language)
        .append_pair("logprob_threshold", &config.logprob_threshold.to_string())
        .append_pair("no_speech_threshold", &config.no_speech_threshold.to_string())
        .append_pair("vad_aggressiveness", vad_level);
    Ok(url)
}

/// Recognizer frames. Unknown types (partials, keepalives) are skipped.
#[derive(Deserialize)]
struct SttFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Media-to-STT bridge over a live WebSocket.
#[derive(Clone)]
pub struct SttStreamTranscriber {
    media: MediaServiceClient<Channel>,
    config: SttStreamConfig,
}

impl SttStreamTranscriber {
    pub fn new(media_channel: Channel, config: SttStreamConfig) -> Self {
        Self {
            media: MediaServiceClient::new(media_channel),
            config,
        }
    }
}

async fn dial_with_retry(url: &Url) -> Result<WsStream, AgentError> {
    let mut last_err = None;
    for attempt in 1..=DIAL_ATTEMPTS {
        match connect_async(url.as_str()).await {
            Ok((ws, _)) => return Ok(ws),
            Err(err) => {
                tracing::warn!(attempt, error = %err, "STT WebSocket dial failed");
                last_err = Some(err);
                if attempt < DIAL_ATTEMPTS {
                    tokio::time::sleep(DIAL_BACKOFF).await;
                }
            }
        }
    }
    Err(AgentError::Transcription(format!(
        "dial {url}: {}",
        last_err.expect("at least one attempt")
    )))
}

/// Forward PCM chunks until EOF or cancellation, then close the socket
/// cleanly so the recognizer flushes its final hypothesis.
async fn pump_audio(
    mut audio: Streaming<AudioChunk>,
    mut sink: SplitSink<WsStream, Message>,
    cancel: CancellationToken,
) -> Result<(), AgentError> {
    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            chunk = audio.message() => match chunk {
                Ok(Some(chunk)) => {
                    if let Err(err) = sink.send(Message::Binary(chunk.audio_data)).await {
                        break Err(AgentError::Transcription(format!("ws send: {err}")));
                    }
                }
                Ok(None) => break Ok(()),
                Err(status) => break Err(AgentError::Media(format!("RecordAudio: {status}"))),
            }
        }
    };
    sink.send(Message::Close(None)).await.ok();
    result
}

#[async_trait]
impl Transcriber for SttStreamTranscriber {
    async fn listen(
        &self,
        state: &CallState,
        cancel: &CancellationToken,
    ) -> Result<Transcript, AgentError> {
        let media_info = state
            .event
            .media
            .as_ref()
            .ok_or_else(|| AgentError::InvalidEvent("call event carries no media info".into()))?;
        let server_rtp_port = media_info.rtp_port()?;

        let vad_level = state
            .event
            .action_datum("stt_vad_level")
            .unwrap_or(DEFAULT_VAD_LEVEL);
        let url = build_stream_url(
            &self.config.base_url,
            state.event.language_code(),
            &self.config,
            vad_level,
        )?;

        let mut request = Request::new(RecordAudioRequest {
            server_rtp_port,
            target_sample_rate: Some(self.config.target_sample_rate),
        });
        if let Ok(value) = state.trace_id.parse() {
            request.metadata_mut().insert("x-trace-id", value);
        }
        let mut media = self.media.clone();
        let audio = media
            .record_audio(request)
            .await
            .map_err(|status| AgentError::Media(format!("RecordAudio: {status}")))?
            .into_inner();

        let ws = dial_with_retry(&url).await?;
        let (sink, mut frames) = ws.split();

        let producer_cancel = cancel.child_token();
        let mut producer = tokio::spawn(pump_audio(audio, sink, producer_cancel.clone()));
        let mut producer_running = true;

        let deadline = tokio::time::sleep(self.config.stream_timeout);
        tokio::pin!(deadline);

        let outcome = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Err(AgentError::Cancelled),
                _ = &mut deadline => {
                    tracing::warn!(
                        call_id = %state.call_id,
                        trace_id = %state.trace_id,
                        "Transcription wall-clock timeout, treating as silence"
                    );
                    break Ok(Transcript::NoSpeech);
                }
                joined = &mut producer, if producer_running => {
                    producer_running = false;
                    match joined {
                        Ok(Ok(())) => {} // audio EOF; keep waiting for the verdict
                        Ok(Err(err)) => break Err(err),
                        Err(join_err) => {
                            break Err(AgentError::Transcription(format!(
                                "audio producer failed: {join_err}"
                            )));
                        }
                    }
                }
                frame = frames.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<SttFrame>(&text) {
                            Ok(frame) if frame.kind == "final" => {
                                break Ok(Transcript::Final(frame.text));
                            }
                            Ok(frame) if frame.kind == "no_speech_timeout" => {
                                break Ok(Transcript::NoSpeech);
                            }
                            Ok(_) => {}
                            Err(err) => {
                                tracing::debug!(error = %err, "Skipping unparseable stt frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break Err(AgentError::Transcription(
                            "stt stream closed before a verdict".into(),
                        ));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        break Err(AgentError::Transcription(format!("ws receive: {err}")));
                    }
                }
            }
        };

        producer_cancel.cancel();
        if producer_running {
            producer.abort();
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SttStreamConfig {
        SttStreamConfig {
            base_url: "http://stt:15021".to_string(),
            target_sample_rate: 16000,
            logprob_threshold: -1.0,
            no_speech_threshold: 0.6,
            stream_timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn http_base_maps_to_ws_with_query_knobs() {
        let url = build_stream_url("http://stt:15021", "tr", &config(), "1").unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.path(), "/api/v1/transcribe-stream");
        let query = url.query().unwrap();
        assert!(query.contains("language=tr"));
        assert!(query.contains("logprob_threshold=-1"));
        assert!(query.contains("no_speech_threshold=0.6"));
        assert!(query.contains("vad_aggressiveness=1"));
    }

    #[test]
    fn https_base_maps_to_wss() {
        let url = build_stream_url("https://stt.example.com", "en", &config(), "3").unwrap();
        assert_eq!(url.scheme(), "wss");
        assert!(url.query().unwrap().contains("vad_aggressiveness=3"));
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        assert!(build_stream_url("ftp://stt:21", "tr", &config(), "1").is_err());
        assert!(build_stream_url("not a url", "tr", &config(), "1").is_err());
    }
}
