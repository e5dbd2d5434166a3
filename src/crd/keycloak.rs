//! Keycloak Custom Resource Definition
//!
//! A Keycloak resource describes how to reach one Keycloak server: its URL,
//! the Secret holding admin credentials and an optional CA certificate.
//! Realms point at it, directly or through an owner reference.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{CertificateSource, SyncStatus};

/// Authentication realm used when none is set
pub const DEFAULT_AUTH_REALM: &str = "master";

/// Specification for a Keycloak connection
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "keycloak.operator.dev",
    version = "v1alpha1",
    kind = "Keycloak",
    plural = "keycloaks",
    shortname = "kc",
    status = "SyncStatus",
    namespaced,
    printcolumn = r#"{"name":"Connected","type":"boolean","jsonPath":".status.connected"}"#,
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".spec.url"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakSpec {
    /// Base URL of the Keycloak server
    pub url: String,

    /// Secret with `username`/`password` or `token`
    pub secret: String,

    /// Realm the admin credentials belong to
    #[serde(default = "default_auth_realm")]
    pub auth_realm: String,

    /// CA certificate used to verify the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateSource>,
}

fn default_auth_realm() -> String {
    DEFAULT_AUTH_REALM.to_string()
}

impl Keycloak {
    /// Returns true if the last connection attempt succeeded
    pub fn is_connected(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.connected)
    }
}
