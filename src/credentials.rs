//! Connection credential resolution
//!
//! Credentials are rebuilt from the store on every reconciliation so a
//! rotated Secret takes effect on the next pass. Nothing here is cached.

use std::collections::BTreeMap;
use std::sync::Arc;

use kube::ResourceExt;
use tracing::debug;

use crate::crd::Keycloak;
use crate::invocation::Invocation;
use crate::store::ObjectStore;
use crate::Error;

/// Secret field holding the admin username
pub const USERNAME_KEY: &str = "username";
/// Secret field holding the admin password
pub const PASSWORD_KEY: &str = "password";
/// Secret field holding a pre-issued bearer token
pub const TOKEN_KEY: &str = "token";
/// Secret or ConfigMap field holding the CA certificate
pub const CA_CERT_KEY: &str = "ca.crt";

/// How to authenticate against Keycloak
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Password grant through `admin-cli`
    Password {
        /// Admin username
        username: String,
        /// Admin password
        password: String,
    },
    /// Pre-issued access token
    Token(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::Token(_) => f.debug_tuple("Token").field(&"[REDACTED]").finish(),
        }
    }
}

/// Everything needed to open a session with one Keycloak server
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionCredential {
    /// Base URL of the server
    pub url: String,
    /// Realm the credentials belong to
    pub auth_realm: String,
    /// Credentials
    pub credentials: Credentials,
    /// PEM encoded CA certificate
    pub ca_certificate: Option<String>,
}

/// Resolves [`ConnectionCredential`]s for Keycloak resources
#[derive(Clone)]
pub struct CredentialResolver {
    objects: Arc<dyn ObjectStore>,
}

impl CredentialResolver {
    /// Create a resolver reading from `objects`
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }

    /// Resolve the credential of `keycloak`
    ///
    /// A missing Secret or ConfigMap is [`Error::ReferenceNotFound`];
    /// present but incomplete material is [`Error::InvalidCredentials`].
    pub async fn resolve(
        &self,
        inv: &Invocation,
        keycloak: &Keycloak,
    ) -> Result<ConnectionCredential, Error> {
        let namespace = keycloak
            .namespace()
            .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
        let secret_name = &keycloak.spec.secret;

        let data = inv
            .store("get secret", self.objects.secret_data(&namespace, secret_name))
            .await?
            .ok_or_else(|| Error::ReferenceNotFound {
                kind: "secret",
                namespace: namespace.clone(),
                name: secret_name.clone(),
            })?;
        let credentials = parse_credentials(&namespace, secret_name, &data)?;
        let ca_certificate = self.ca_certificate(inv, &namespace, keycloak).await?;

        debug!(
            url = %keycloak.spec.url,
            secret = %secret_name,
            custom_ca = ca_certificate.is_some(),
            "resolved keycloak credentials"
        );

        Ok(ConnectionCredential {
            url: keycloak.spec.url.clone(),
            auth_realm: keycloak.spec.auth_realm.clone(),
            credentials,
            ca_certificate,
        })
    }

    async fn ca_certificate(
        &self,
        inv: &Invocation,
        namespace: &str,
        keycloak: &Keycloak,
    ) -> Result<Option<String>, Error> {
        let Some(source) = &keycloak.spec.certificate else {
            return Ok(None);
        };

        if let Some(name) = &source.secret_name {
            let data = inv
                .store("get CA secret", self.objects.secret_data(namespace, name))
                .await?
                .ok_or_else(|| Error::ReferenceNotFound {
                    kind: "secret",
                    namespace: namespace.to_string(),
                    name: name.clone(),
                })?;
            let pem = field(namespace, name, &data, CA_CERT_KEY)?;
            return Ok(Some(pem));
        }

        if let Some(name) = &source.config_map_name {
            let data = inv
                .store("get CA config map", self.objects.config_map_data(namespace, name))
                .await?
                .ok_or_else(|| Error::ReferenceNotFound {
                    kind: "configmap",
                    namespace: namespace.to_string(),
                    name: name.clone(),
                })?;
            let pem = data.get(CA_CERT_KEY).cloned().ok_or_else(|| {
                Error::invalid_credentials(namespace, name, format!("missing field {CA_CERT_KEY}"))
            })?;
            return Ok(Some(pem));
        }

        Ok(None)
    }
}

fn field(
    namespace: &str,
    name: &str,
    data: &BTreeMap<String, Vec<u8>>,
    key: &str,
) -> Result<String, Error> {
    let raw = data
        .get(key)
        .ok_or_else(|| Error::invalid_credentials(namespace, name, format!("missing field {key}")))?;
    String::from_utf8(raw.clone()).map_err(|_| {
        Error::invalid_credentials(namespace, name, format!("field {key} is not valid UTF-8"))
    })
}

fn parse_credentials(
    namespace: &str,
    name: &str,
    data: &BTreeMap<String, Vec<u8>>,
) -> Result<Credentials, Error> {
    if data.contains_key(TOKEN_KEY) {
        return Ok(Credentials::Token(field(namespace, name, data, TOKEN_KEY)?));
    }
    Ok(Credentials::Password {
        username: field(namespace, name, data, USERNAME_KEY)?,
        password: field(namespace, name, data, PASSWORD_KEY)?,
    })
}
