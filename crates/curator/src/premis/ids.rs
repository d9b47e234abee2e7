//! Deterministic identifiers for provenance entities.

use uuid::Uuid;

/// Software agent id for a plugin: `"<plugin id>@<version>"`.
pub fn plugin_agent_id(plugin_id: &str, version: &str) -> String {
    format!("{}@{}", plugin_id, version)
}

/// Person agent id for a repository user.
pub fn user_agent_id(username: &str) -> String {
    format!("user-{}", username)
}

/// Events have no natural key; every event gets a fresh id.
pub fn new_event_id() -> String {
    Uuid::new_v4().to_string()
}
