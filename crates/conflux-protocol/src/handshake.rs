use serde::{Deserialize, Serialize};

/// Client → Server: authentication request, first frame on every connection.
/// Sent as: `REQ connect { token: "..." }`
///
/// The token is the short-TTL channel token minted by the HTTP API
/// (`POST /auth/login` etc.) — verification itself is delegated to
/// `conflux_gateway::auth::TokenVerifier`, never implemented here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectParams {
    pub token: String,
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientInfo {
    pub name: Option<String>,
    pub version: Option<String>,
    pub platform: Option<String>,
}

/// Server → Client: successful auth response payload.
/// Sent as: `RES hello-ok { protocol: 1, server: {...}, ... }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloOk {
    pub protocol: u32,
    pub server: ServerInfo,
    pub policy: ClientPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub node_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientPolicy {
    pub max_message_size: usize,
    pub heartbeat_interval_secs: u64,
}
