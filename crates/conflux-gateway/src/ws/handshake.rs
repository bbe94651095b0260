use conflux_core::types::UserId;
use conflux_protocol::handshake::{ClientPolicy, HelloOk, ServerInfo};

use crate::app::AppState;

/// Verify the bearer token carried in the `connect` request and resolve it
/// to a `UserId`. The verifier itself (static bring-up token vs. JWT) is
/// selected once at startup from `AuthConfig::mode`.
pub async fn verify_auth(token: &str, app: &AppState) -> Result<UserId, String> {
    app.auth
        .verify(token)
        .await
        .ok_or_else(|| "invalid or expired token".to_string())
}

pub fn hello_ok_payload() -> HelloOk {
    HelloOk {
        protocol: conflux_core::config::PROTOCOL_VERSION,
        server: ServerInfo {
            name: "conflux-gateway".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            node_id: uuid::Uuid::new_v4().to_string(),
        },
        policy: ClientPolicy {
            max_message_size: conflux_core::config::MAX_PAYLOAD_BYTES,
            heartbeat_interval_secs: conflux_core::config::HEARTBEAT_INTERVAL_SECS,
        },
    }
}
