//! Supporting types shared by the custom resources

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Observable reconciliation state, shared by every kind
///
/// `value` is empty after a successful reconciliation and carries the last
/// error message verbatim otherwise.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Whether the last connection attempt to Keycloak succeeded
    #[serde(default)]
    pub connected: bool,

    /// Empty on success, last error message on failure
    #[serde(default)]
    pub value: String,

    /// Consecutive failed reconciliations
    #[serde(default)]
    pub failure_count: i64,

    /// When `connected` or `value` last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl SyncStatus {
    /// Returns true if the last reconciliation succeeded
    pub fn is_healthy(&self) -> bool {
        self.value.is_empty()
    }

    /// Returns true if `connected` or `value` differ from `other`
    pub fn transitioned_from(&self, other: &SyncStatus) -> bool {
        self.connected != other.connected || self.value != other.value
    }
}

/// Where to read the Keycloak CA certificate (`ca.crt`) from
///
/// The Secret wins when both are set.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSource {
    /// Secret holding `ca.crt`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,

    /// ConfigMap holding `ca.crt`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_name: Option<String>,
}

/// Realm role a client expects to exist
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RealmRoleRef {
    /// Role name
    pub name: String,

    /// Whether the role is composite
    #[serde(default)]
    pub composite: bool,
}
