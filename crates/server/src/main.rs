//! Service entry point: configuration, infrastructure wiring, event intake
//! and graceful drain.

mod handler;
mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use sentiric_agent_clients::{
    build_channel, GrpcUserDirectory, HttpLlmClient, MtlsMaterial,
};
use sentiric_agent_dialog::{
    DialogManager, GrpcKnowledgeStore, GrpcMediaBridge, GrpcSpeechSynthesizer, KnowledgeStore,
    SttStreamConfig, SttStreamTranscriber,
};
use sentiric_agent_persistence::{PgTemplateStore, RedisCallStateStore};
use sentiric_agent_queue::{run_consumer, setup_bus, AmqpEventPublisher};

use handler::CallHandler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing(env_is_production());
    let settings = match sentiric_agent_config::load_settings() {
        Ok(settings) => settings,
        Err(err) => {
            tracing::error!(error = %err, "Configuration rejected");
            return Err(err.into());
        }
    };
    tracing::info!(env = %settings.env, "Starting agent service");
    telemetry::init_metrics(settings.metrics_port_agent)?;

    let state_store = Arc::new(RedisCallStateStore::connect(&settings.redis_url).await?);
    let templates = Arc::new(PgTemplateStore::connect(&settings.postgres_url).await?);
    let bus = setup_bus(&settings.rabbitmq_url).await?;
    let publisher = Arc::new(AmqpEventPublisher::new(bus.publish_channel.clone()));

    let mtls = match settings.mtls_paths() {
        Some((cert, key, ca)) => Some(MtlsMaterial::load(cert, key, ca).await?),
        None => None,
    };
    let media_channel = build_channel(&settings.media_service_grpc_url, mtls.as_ref())?;
    let user_channel = build_channel(&settings.user_service_grpc_url, mtls.as_ref())?;
    let tts_channel = build_channel(&settings.tts_gateway_url, mtls.as_ref())?;
    let knowledge: Option<Arc<dyn KnowledgeStore>> = match &settings.knowledge_service_grpc_url {
        Some(url) if !url.is_empty() => {
            let channel = build_channel(url, mtls.as_ref())?;
            Some(Arc::new(GrpcKnowledgeStore::new(
                channel,
                settings.knowledge_service_top_k,
            )))
        }
        _ => {
            tracing::info!("No knowledge service configured, answers stay ungrounded");
            None
        }
    };

    let media = Arc::new(GrpcMediaBridge::new(media_channel.clone()));
    let synthesizer = Arc::new(GrpcSpeechSynthesizer::new(
        tts_channel,
        settings.allowed_speaker_domains(),
    ));
    let transcriber = Arc::new(SttStreamTranscriber::new(
        media_channel,
        SttStreamConfig {
            base_url: settings.stt_service_url.clone(),
            target_sample_rate: settings.stt_service_target_sample_rate,
            logprob_threshold: settings.stt_service_logprob_threshold,
            no_speech_threshold: settings.stt_service_no_speech_threshold,
            stream_timeout: Duration::from_secs(settings.stt_service_stream_timeout_seconds),
        },
    ));
    let llm = Arc::new(HttpLlmClient::new(&settings.llm_service_url)?);
    let users = Arc::new(GrpcUserDirectory::new(user_channel));

    let manager = Arc::new(DialogManager::new(
        state_store.clone(),
        templates,
        media,
        synthesizer,
        knowledge,
        transcriber,
        llm,
        publisher,
        settings.agent_max_consecutive_failures,
    ));

    let root_cancel = CancellationToken::new();
    let handler = Arc::new(CallHandler::new(
        state_store,
        users,
        manager,
        root_cancel.clone(),
    ));

    let tracker = TaskTracker::new();
    let mut consumer = tokio::spawn(run_consumer(
        bus.consume_channel.clone(),
        handler,
        tracker.clone(),
        root_cancel.clone(),
    ));

    tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
        }
        result = &mut consumer => {
            match result {
                Ok(Ok(())) => tracing::warn!("Event intake stopped"),
                Ok(Err(err)) => tracing::error!(error = %err, "Event intake failed"),
                Err(err) => tracing::error!(error = %err, "Event intake task crashed"),
            }
        }
    }

    root_cancel.cancel();
    tracker.close();
    tracing::info!("Draining in-flight calls");
    tracker.wait().await;
    consumer.abort();
    tracing::info!("Agent service stopped");
    Ok(())
}

/// Log format is decided before the full configuration loads so that
/// configuration errors themselves come out structured.
fn env_is_production() -> bool {
    std::env::var("ENV").is_ok_and(|env| env == "production")
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::env_is_production;

    #[test]
    fn log_format_follows_env_variable() {
        std::env::remove_var("ENV");
        assert!(!env_is_production());
        std::env::set_var("ENV", "development");
        assert!(!env_is_production());
        std::env::set_var("ENV", "production");
        assert!(env_is_production());
        std::env::remove_var("ENV");
    }
}
