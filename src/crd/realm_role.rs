//! KeycloakRealmRole Custom Resource Definition

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::SyncStatus;

/// Specification for a realm role
///
/// The role is fully owned by this resource: every reconciliation
/// overwrites the remote role with this spec.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "keycloak.operator.dev",
    version = "v1alpha1",
    kind = "KeycloakRealmRole",
    plural = "keycloakrealmroles",
    shortname = "kcrole",
    status = "SyncStatus",
    namespaced,
    printcolumn = r#"{"name":"Role","type":"string","jsonPath":".spec.name"}"#,
    printcolumn = r#"{"name":"Connected","type":"boolean","jsonPath":".status.connected"}"#,
    printcolumn = r#"{"name":"Error","type":"string","jsonPath":".status.value"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakRealmRoleSpec {
    /// Role name in Keycloak
    pub name: String,

    /// Name of the KeycloakRealm resource in the same namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,

    /// Free text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Marks the role as composite
    #[serde(default)]
    pub composite: bool,

    /// Realm roles included in this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub composites: Vec<String>,

    /// Custom attributes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Vec<String>>,
}
