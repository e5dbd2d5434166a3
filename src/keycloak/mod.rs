//! Identity provider capability
//!
//! The reconciler talks to Keycloak only through [`IdentityProviderClient`],
//! obtained from a [`ClientFactory`]. Every operation is keyed on natural
//! identifiers (realm name, role name, client id); no synthetic IDs are
//! persisted on our side.
//!
//! [`http`] provides the production implementation against the Keycloak
//! admin REST API.

pub mod dto;
pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::credentials::ConnectionCredential;

pub use dto::{ClientRepresentation, IncludedRealmRole, PrimaryRealmRole, RealmRepresentation};
pub use http::HttpClientFactory;

/// Errors raised by the identity provider adapter
#[derive(Debug, Error)]
pub enum KeycloakError {
    /// Keycloak answered with a non-success status
    #[error("keycloak api error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Token request was rejected
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// CA certificate could not be loaded
    #[error("invalid CA certificate: {0}")]
    Certificate(String),

    /// Request never produced a response
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Endpoint could not be built from the configured URL
    #[error("invalid url: {0}")]
    Url(String),
}

impl KeycloakError {
    /// Create an API error from a status code and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Returns true if Keycloak reported the entity as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}

/// Remote operations on realms, realm roles, clients and client roles
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdentityProviderClient: Send + Sync {
    /// Check whether a realm exists
    async fn exists_realm(&self, realm: &str) -> Result<bool, KeycloakError>;

    /// Create a realm
    async fn create_realm(&self, realm: &RealmRepresentation) -> Result<(), KeycloakError>;

    /// Delete a realm; deleting a missing realm succeeds
    async fn delete_realm(&self, realm: &str) -> Result<(), KeycloakError>;

    /// Check whether a realm role exists
    async fn exists_realm_role(&self, realm: &str, role: &str) -> Result<bool, KeycloakError>;

    /// Create a realm role referenced by another resource
    async fn create_included_realm_role(
        &self,
        realm: &str,
        role: &IncludedRealmRole,
    ) -> Result<(), KeycloakError>;

    /// Create or overwrite a realm role and its composites
    async fn sync_realm_role(
        &self,
        realm: &str,
        role: &PrimaryRealmRole,
    ) -> Result<(), KeycloakError>;

    /// Delete a realm role; deleting a missing role succeeds
    async fn delete_realm_role(&self, realm: &str, role: &str) -> Result<(), KeycloakError>;

    /// Check whether a client exists
    async fn exists_client(&self, realm: &str, client_id: &str) -> Result<bool, KeycloakError>;

    /// Create a client
    async fn create_client(
        &self,
        realm: &str,
        client: &ClientRepresentation,
    ) -> Result<(), KeycloakError>;

    /// Overwrite an existing client
    async fn update_client(
        &self,
        realm: &str,
        client: &ClientRepresentation,
    ) -> Result<(), KeycloakError>;

    /// Delete a client; deleting a missing client succeeds
    async fn delete_client(&self, realm: &str, client_id: &str) -> Result<(), KeycloakError>;

    /// Check whether a client role exists
    async fn exists_client_role(
        &self,
        realm: &str,
        client_id: &str,
        role: &str,
    ) -> Result<bool, KeycloakError>;

    /// Create a client role
    async fn create_client_role(
        &self,
        realm: &str,
        client_id: &str,
        role: &str,
    ) -> Result<(), KeycloakError>;
}

/// Builds authenticated clients
///
/// Authentication doubles as the liveness probe: a factory must only
/// return a client after Keycloak accepted the credential.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Authenticate against Keycloak and return a ready client
    async fn authenticate(
        &self,
        credential: &ConnectionCredential,
    ) -> Result<Arc<dyn IdentityProviderClient>, KeycloakError>;
}

/// Natural key of a remote entity
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteEntityHandle {
    /// A realm
    Realm {
        /// Realm name
        realm: String,
    },
    /// A realm role
    RealmRole {
        /// Realm name
        realm: String,
        /// Role name
        name: String,
    },
    /// A client
    Client {
        /// Realm name
        realm: String,
        /// Client id (not the internal UUID)
        client_id: String,
    },
}

impl RemoteEntityHandle {
    /// Name of the delete operation for this entity
    pub fn delete_operation(&self) -> &'static str {
        match self {
            Self::Realm { .. } => "deleteRealm",
            Self::RealmRole { .. } => "deleteRealmRole",
            Self::Client { .. } => "deleteClient",
        }
    }

    /// Delete the entity this handle points at
    pub async fn delete(&self, client: &dyn IdentityProviderClient) -> Result<(), KeycloakError> {
        match self {
            Self::Realm { realm } => client.delete_realm(realm).await,
            Self::RealmRole { realm, name } => client.delete_realm_role(realm, name).await,
            Self::Client { realm, client_id } => client.delete_client(realm, client_id).await,
        }
    }
}

impl std::fmt::Display for RemoteEntityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Realm { realm } => write!(f, "realm {realm}"),
            Self::RealmRole { realm, name } => write!(f, "realm role {realm}/{name}"),
            Self::Client { realm, client_id } => write!(f, "client {realm}/{client_id}"),
        }
    }
}
