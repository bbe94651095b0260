use conflux_core::types::UserRole;
use serde::{Deserialize, Serialize};

/// Directory record for a user. The upstream identity system owns
/// registration/password/JWT issuance; this is only what the cores need to
/// answer "does this id exist, and what's its global role" without a
/// network round-trip to that system on every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub role: UserRole,
    pub created_at: String,
    pub updated_at: String,
}
