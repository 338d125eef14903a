//! Dialog orchestration: the per-call state machine, the media engine
//! bridge, speech synthesis, knowledge retrieval, and the live
//! transcription bridge.

pub mod heuristics;
pub mod knowledge;
pub mod manager;
pub mod media;
pub mod synthesis;
pub mod transcribe;

pub use knowledge::{GrpcKnowledgeStore, KnowledgeStore};
pub use manager::{resolve_tenant_id, CallRunner, DialogManager};
pub use media::{recording_uri, GrpcMediaBridge, MediaBridge};
pub use synthesis::{check_speaker_url, GrpcSpeechSynthesizer, SpeechSynthesizer};
pub use transcribe::{
    build_stream_url, SttStreamConfig, SttStreamTranscriber, Transcriber, Transcript,
};
