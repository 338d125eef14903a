//! Media engine bridge: playback and call recording.

use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::Channel;
use tonic::{Code, Request};

use sentiric_agent_contracts::media::v1::media_service_client::MediaServiceClient;
use sentiric_agent_contracts::media::v1::{
    PlayAudioRequest, StartRecordingRequest, StopRecordingRequest,
};
use sentiric_agent_core::{AgentError, MediaInfo, RECORDING_BUCKET};

/// Playback of a long announcement or TTS reply can legitimately take
/// minutes; the deadline only guards against a wedged engine.
const PLAY_DEADLINE: Duration = Duration::from_secs(5 * 60);
const RECORDING_DEADLINE: Duration = Duration::from_secs(10);

/// Recording target for a call.
pub fn recording_uri(tenant_id: &str, call_id: &str) -> String {
    format!("s3://{RECORDING_BUCKET}/{tenant_id}/{call_id}.wav")
}

/// Media seam for the dialog manager.
#[async_trait]
pub trait MediaBridge: Send + Sync {
    /// Play an audio URI towards the caller; returns when playback finishes.
    async fn play(
        &self,
        trace_id: &str,
        media: &MediaInfo,
        audio_uri: &str,
    ) -> Result<(), AgentError>;

    async fn start_recording(
        &self,
        trace_id: &str,
        call_id: &str,
        media: &MediaInfo,
        output_uri: &str,
    ) -> Result<(), AgentError>;

    async fn stop_recording(&self, trace_id: &str, media: &MediaInfo) -> Result<(), AgentError>;
}

/// gRPC-backed bridge.
#[derive(Clone)]
pub struct GrpcMediaBridge {
    client: MediaServiceClient<Channel>,
}

impl GrpcMediaBridge {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: MediaServiceClient::new(channel),
        }
    }

    fn request_with_trace<T>(message: T, trace_id: &str, deadline: Duration) -> Request<T> {
        let mut request = Request::new(message);
        request.set_timeout(deadline);
        if let Ok(value) = trace_id.parse() {
            request.metadata_mut().insert("x-trace-id", value);
        }
        request
    }
}

#[async_trait]
impl MediaBridge for GrpcMediaBridge {
    async fn play(
        &self,
        trace_id: &str,
        media: &MediaInfo,
        audio_uri: &str,
    ) -> Result<(), AgentError> {
        let server_rtp_port = media.rtp_port()?;
        let request = Self::request_with_trace(
            PlayAudioRequest {
                rtp_target_addr: media.caller_rtp_addr.clone(),
                server_rtp_port,
                audio_uri: audio_uri.to_string(),
            },
            trace_id,
            PLAY_DEADLINE,
        );
        let mut client = self.client.clone();
        match client.play_audio(request).await {
            Ok(_) => Ok(()),
            // The caller hanging up mid-playback is ordinary call flow; the
            // loop observes the ended state on its next iteration.
            Err(status) if matches!(status.code(), Code::Cancelled | Code::DeadlineExceeded) => {
                tracing::warn!(trace_id, code = ?status.code(), "Playback interrupted");
                Ok(())
            }
            Err(status) => {
                metrics::counter!("agent_events_failed_total", "reason" => "play_audio_failed")
                    .increment(1);
                Err(AgentError::Media(format!("PlayAudio: {status}")))
            }
        }
    }

    async fn start_recording(
        &self,
        trace_id: &str,
        call_id: &str,
        media: &MediaInfo,
        output_uri: &str,
    ) -> Result<(), AgentError> {
        let server_rtp_port = media.rtp_port()?;
        let request = Self::request_with_trace(
            StartRecordingRequest {
                server_rtp_port,
                output_uri: output_uri.to_string(),
                call_id: call_id.to_string(),
                trace_id: trace_id.to_string(),
            },
            trace_id,
            RECORDING_DEADLINE,
        );
        let mut client = self.client.clone();
        client
            .start_recording(request)
            .await
            .map_err(|status| AgentError::Media(format!("StartRecording: {status}")))?;
        tracing::info!(trace_id, output_uri, "Call recording started");
        Ok(())
    }

    async fn stop_recording(&self, trace_id: &str, media: &MediaInfo) -> Result<(), AgentError> {
        let server_rtp_port = media.rtp_port()?;
        let request = Self::request_with_trace(
            StopRecordingRequest { server_rtp_port },
            trace_id,
            RECORDING_DEADLINE,
        );
        let mut client = self.client.clone();
        client.stop_recording(request).await.map_err(|status| {
            metrics::counter!("agent_events_failed_total", "reason" => "stop_recording_failed")
                .increment(1);
            AgentError::Media(format!("StopRecording: {status}"))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_uri_is_bucket_tenant_call() {
        assert_eq!(
            recording_uri("acme", "call-1"),
            "s3://sentiric-media-record/acme/call-1.wav"
        );
    }
}
