//! Keycloak admin API representations
//!
//! Field names follow the Keycloak JSON wire format (camelCase). Only the
//! attributes the operator manages are modelled; everything else on the
//! server side is left untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Realm as sent to `POST /admin/realms`
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RealmRepresentation {
    /// Realm name (natural key)
    pub realm: String,
    /// Human readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Whether the realm accepts logins
    #[serde(default)]
    pub enabled: bool,
}

impl RealmRepresentation {
    /// An enabled realm with the given name
    pub fn enabled(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            display_name: None,
            enabled: true,
        }
    }
}

/// Realm role referenced from another resource (create-if-absent)
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IncludedRealmRole {
    /// Role name
    pub name: String,
    /// Whether the role is composite
    #[serde(default)]
    pub composite: bool,
}

/// Realm role owned by a `KeycloakRealmRole` resource (always synchronized)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrimaryRealmRole {
    /// Role name
    pub name: String,
    /// Free text description
    pub description: Option<String>,
    /// Whether the role is composite
    pub composite: bool,
    /// Names of realm roles this role is composed of
    pub composites: Vec<String>,
    /// Custom role attributes
    pub attributes: BTreeMap<String, Vec<String>>,
}

/// Role as exchanged with `/roles` endpoints
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoleRepresentation {
    /// Server-assigned id, present on reads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Role name
    pub name: String,
    /// Free text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the role is composite
    #[serde(default)]
    pub composite: bool,
    /// Custom role attributes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl From<&IncludedRealmRole> for RoleRepresentation {
    fn from(role: &IncludedRealmRole) -> Self {
        Self {
            name: role.name.clone(),
            composite: role.composite,
            ..Default::default()
        }
    }
}

impl From<&PrimaryRealmRole> for RoleRepresentation {
    fn from(role: &PrimaryRealmRole) -> Self {
        Self {
            id: None,
            name: role.name.clone(),
            description: role.description.clone(),
            composite: role.composite || !role.composites.is_empty(),
            attributes: role.attributes.clone(),
        }
    }
}

/// Client as exchanged with `/clients` endpoints
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientRepresentation {
    /// Server-assigned UUID, present on reads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Client id (natural key)
    pub client_id: String,
    /// Whether the client is enabled
    #[serde(default)]
    pub enabled: bool,
    /// Public clients have no secret
    #[serde(default)]
    pub public_client: bool,
    /// Resource owner password grant
    #[serde(default)]
    pub direct_access_grants_enabled: bool,
    /// Base URL of the application
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_url: Option<String>,
    /// Allowed redirect URIs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirect_uris: Vec<String>,
}

/// Token endpoint response
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
}
