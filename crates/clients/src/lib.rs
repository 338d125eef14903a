//! Clients for the platform services the agent orchestrates: gRPC channels
//! (media, user directory, TTS, knowledge) and the HTTP LLM gateway.

pub mod channel;
pub mod llm;
pub mod user_directory;

pub use channel::{build_channel, MtlsMaterial};
pub use llm::{HttpLlmClient, LlmClient};
pub use user_directory::{parse_caller_number, GrpcUserDirectory, UserDirectory};
