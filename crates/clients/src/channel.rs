//! gRPC channel construction, with optional mutual TLS.

use std::time::Duration;

use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};

use sentiric_agent_core::AgentError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// PEM material for mutual TLS; when absent, channels are plaintext.
#[derive(Debug, Clone)]
pub struct MtlsMaterial {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
    pub ca_pem: Vec<u8>,
}

impl MtlsMaterial {
    /// Read the three PEM files once at startup; every channel reuses them.
    pub async fn load(
        cert_path: &str,
        key_path: &str,
        ca_path: &str,
    ) -> Result<Self, AgentError> {
        let cert_pem = tokio::fs::read(cert_path)
            .await
            .map_err(|e| AgentError::other(format!("read client cert {cert_path}: {e}")))?;
        let key_pem = tokio::fs::read(key_path)
            .await
            .map_err(|e| AgentError::other(format!("read client key {key_path}: {e}")))?;
        let ca_pem = tokio::fs::read(ca_path)
            .await
            .map_err(|e| AgentError::other(format!("read ca cert {ca_path}: {e}")))?;
        Ok(Self {
            cert_pem,
            key_pem,
            ca_pem,
        })
    }
}

/// Lazily-connecting channel to a platform service. Connection failures
/// surface on the first RPC, which the callers already deadline and retry.
pub fn build_channel(url: &str, mtls: Option<&MtlsMaterial>) -> Result<Channel, AgentError> {
    let mut endpoint = Endpoint::from_shared(url.to_string())
        .map_err(|e| AgentError::other(format!("invalid grpc url {url}: {e}")))?
        .connect_timeout(CONNECT_TIMEOUT);

    if let Some(material) = mtls {
        let identity = Identity::from_pem(&material.cert_pem, &material.key_pem);
        let ca = Certificate::from_pem(&material.ca_pem);
        let tls = ClientTlsConfig::new().identity(identity).ca_certificate(ca);
        endpoint = endpoint
            .tls_config(tls)
            .map_err(|e| AgentError::other(format!("tls config for {url}: {e}")))?;
    }

    Ok(endpoint.connect_lazy())
}
