use serde::{Deserialize, Serialize};

/// Verified identity attached to a session after a successful login.
/// Carries the resolved internal user id plus cached profile fields; the
/// profile cache exists only for display and is never consulted for
/// authorization decisions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub picture: Option<String>,
}
