//! KeycloakRealm Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::SyncStatus;

/// Specification for a realm
///
/// The owning Keycloak is taken from an owner reference when present and
/// from `keycloak_owner` otherwise.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "keycloak.operator.dev",
    version = "v1alpha1",
    kind = "KeycloakRealm",
    plural = "keycloakrealms",
    shortname = "kcrealm",
    status = "SyncStatus",
    namespaced,
    printcolumn = r#"{"name":"Realm","type":"string","jsonPath":".spec.realmName"}"#,
    printcolumn = r#"{"name":"Connected","type":"boolean","jsonPath":".status.connected"}"#,
    printcolumn = r#"{"name":"Error","type":"string","jsonPath":".status.value"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakRealmSpec {
    /// Realm name in Keycloak
    pub realm_name: String,

    /// Name of the Keycloak resource in the same namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keycloak_owner: Option<String>,

    /// Human readable realm name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}
