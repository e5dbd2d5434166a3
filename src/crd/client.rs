//! KeycloakClient Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{RealmRoleRef, SyncStatus};

/// Specification for an OIDC client
///
/// The client itself is overwritten on every reconciliation. Realm roles
/// and client roles listed here are only created when missing and are
/// never removed.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "keycloak.operator.dev",
    version = "v1alpha1",
    kind = "KeycloakClient",
    plural = "keycloakclients",
    shortname = "kcclient",
    status = "SyncStatus",
    namespaced,
    printcolumn = r#"{"name":"Client","type":"string","jsonPath":".spec.clientId"}"#,
    printcolumn = r#"{"name":"Connected","type":"boolean","jsonPath":".status.connected"}"#,
    printcolumn = r#"{"name":"Error","type":"string","jsonPath":".status.value"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakClientSpec {
    /// Client id in Keycloak
    pub client_id: String,

    /// Name of the KeycloakRealm resource in the same namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,

    /// Realm name to create the client in, instead of the parent realm's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_realm: Option<String>,

    /// Public client (no secret)
    #[serde(default)]
    pub public: bool,

    /// Enable the resource owner password grant
    #[serde(default)]
    pub direct_access: bool,

    /// Application URL; also used as redirect URI prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,

    /// Realm roles that must exist for this client
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub realm_roles: Vec<RealmRoleRef>,

    /// Client roles that must exist on this client
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub client_roles: Vec<String>,
}
