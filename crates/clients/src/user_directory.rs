//! User directory lookups and guest provisioning.
//!
//! Every caller ends up with a directory identity: known numbers resolve via
//! `FindUserByContact`, unknown ones get a `caller`-type user created on the
//! fly so the rest of the platform can attribute the call.

use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::Channel;
use tonic::{Code, Request};

use sentiric_agent_contracts::user::v1::create_user_request::InitialContact;
use sentiric_agent_contracts::user::v1::user_service_client::UserServiceClient;
use sentiric_agent_contracts::user::v1::{CreateUserRequest, FindUserByContactRequest, User};

use sentiric_agent_core::{AgentError, DEFAULT_TENANT_ID};

const RPC_DEADLINE: Duration = Duration::from_secs(10);
const CONTACT_TYPE_PHONE: &str = "phone";
const USER_TYPE_CALLER: &str = "caller";

/// Extract the dialable number from a `From` URI. Accepts bare numbers,
/// `sip:number@host`, and `Display Name <sip:number@host>` forms.
pub fn parse_caller_number(from_uri: &str) -> String {
    let mut s = from_uri.trim();
    if let Some(start) = s.find('<') {
        if let Some(end) = s[start..].find('>') {
            s = &s[start + 1..start + end];
        }
    }
    let s = s
        .strip_prefix("sips:")
        .or_else(|| s.strip_prefix("sip:"))
        .unwrap_or(s);
    let s = s.split('@').next().unwrap_or(s);
    s.trim().to_string()
}

/// Directory seam for the call handler.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve the caller to a directory user, creating a guest entry when
    /// the number is unknown.
    async fn find_or_create_guest(
        &self,
        trace_id: &str,
        from_uri: &str,
        tenant_hint: Option<&str>,
    ) -> Result<User, AgentError>;
}

/// gRPC-backed directory client.
#[derive(Clone)]
pub struct GrpcUserDirectory {
    client: UserServiceClient<Channel>,
}

impl GrpcUserDirectory {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: UserServiceClient::new(channel),
        }
    }

    fn request_with_trace<T>(message: T, trace_id: &str) -> Request<T> {
        let mut request = Request::new(message);
        request.set_timeout(RPC_DEADLINE);
        if let Ok(value) = trace_id.parse() {
            request.metadata_mut().insert("x-trace-id", value);
        }
        request
    }
}

#[async_trait]
impl UserDirectory for GrpcUserDirectory {
    async fn find_or_create_guest(
        &self,
        trace_id: &str,
        from_uri: &str,
        tenant_hint: Option<&str>,
    ) -> Result<User, AgentError> {
        let number = parse_caller_number(from_uri);
        if number.is_empty() {
            return Err(AgentError::UserDirectory(format!(
                "cannot extract caller number from '{from_uri}'"
            )));
        }

        let mut client = self.client.clone();
        let find = Self::request_with_trace(
            FindUserByContactRequest {
                contact_type: CONTACT_TYPE_PHONE.to_string(),
                contact_value: number.clone(),
            },
            trace_id,
        );
        match client.find_user_by_contact(find).await {
            Ok(response) => {
                if let Some(user) = response.into_inner().user {
                    tracing::info!(trace_id, user_id = %user.id, "Caller resolved in user directory");
                    return Ok(user);
                }
                // Empty response body behaves like NotFound.
            }
            Err(status) if status.code() == Code::NotFound => {}
            Err(status) => {
                return Err(AgentError::UserDirectory(format!(
                    "FindUserByContact: {status}"
                )));
            }
        }

        let tenant_id = tenant_hint
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TENANT_ID)
            .to_string();
        tracing::info!(trace_id, %number, %tenant_id, "Caller unknown, creating guest user");
        let create = Self::request_with_trace(
            CreateUserRequest {
                tenant_id,
                user_type: USER_TYPE_CALLER.to_string(),
                name: None,
                initial_contact: Some(InitialContact {
                    contact_type: CONTACT_TYPE_PHONE.to_string(),
                    contact_value: number,
                }),
            },
            trace_id,
        );
        let created = client
            .create_user(create)
            .await
            .map_err(|status| AgentError::UserDirectory(format!("CreateUser: {status}")))?;
        created
            .into_inner()
            .user
            .ok_or_else(|| AgentError::UserDirectory("CreateUser returned no user".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_angle_bracket_uri() {
        assert_eq!(
            parse_caller_number("Bob <sip:905551234567@sip.example.com>"),
            "905551234567"
        );
    }

    #[test]
    fn parses_bare_sip_uri() {
        assert_eq!(
            parse_caller_number("sip:905551234567@10.0.0.1:5060"),
            "905551234567"
        );
        assert_eq!(parse_caller_number("sips:4420712345@host"), "4420712345");
    }

    #[test]
    fn parses_plain_number() {
        assert_eq!(parse_caller_number("  905551234567 "), "905551234567");
    }

    #[test]
    fn empty_uri_yields_empty_number() {
        assert_eq!(parse_caller_number(""), "");
    }
}
