//! Keycloak admin REST API client
//!
//! Implements [`IdentityProviderClient`] with `reqwest`. Entities are
//! addressed by natural keys: clients are looked up by `clientId` before
//! every id-based call, so no server UUIDs need to be stored anywhere.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Serialize;
use tracing::{debug, instrument};

use super::dto::{
    ClientRepresentation, IncludedRealmRole, PrimaryRealmRole, RealmRepresentation,
    RoleRepresentation, TokenResponse,
};
use super::{ClientFactory, IdentityProviderClient, KeycloakError};
use crate::credentials::{ConnectionCredential, Credentials};

/// Client id used for the admin password grant
const ADMIN_CLIENT_ID: &str = "admin-cli";

/// Default timeout for admin API requests
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds [`KeycloakHttpClient`]s
#[derive(Clone, Debug)]
pub struct HttpClientFactory {
    timeout: Duration,
}

impl Default for HttpClientFactory {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl HttpClientFactory {
    /// Create a factory whose clients use `timeout` per request
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn build_http(&self, ca_certificate: Option<&str>) -> Result<Client, KeycloakError> {
        let mut builder = Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout);

        if let Some(pem) = ca_certificate {
            let cert = reqwest::Certificate::from_pem(pem.as_bytes())
                .map_err(|e| KeycloakError::Certificate(e.to_string()))?;
            builder = builder.add_root_certificate(cert);
        }

        builder
            .build()
            .map_err(|e| KeycloakError::Certificate(format!("failed to build HTTP client: {e}")))
    }
}

#[async_trait]
impl ClientFactory for HttpClientFactory {
    #[instrument(skip(self, credential), fields(url = %credential.url))]
    async fn authenticate(
        &self,
        credential: &ConnectionCredential,
    ) -> Result<Arc<dyn IdentityProviderClient>, KeycloakError> {
        let http = self.build_http(credential.ca_certificate.as_deref())?;
        let base = Url::parse(&credential.url).map_err(|e| KeycloakError::Url(e.to_string()))?;

        let client = match &credential.credentials {
            Credentials::Password { username, password } => {
                let token =
                    fetch_token(&http, &base, &credential.auth_realm, username, password).await?;
                KeycloakHttpClient { http, base, token }
            }
            Credentials::Token(token) => {
                let client = KeycloakHttpClient {
                    http,
                    base,
                    token: token.clone(),
                };
                // A static token proves nothing until it is used once.
                client.probe(&credential.auth_realm).await?;
                client
            }
        };

        Ok(Arc::new(client))
    }
}

async fn fetch_token(
    http: &Client,
    base: &Url,
    auth_realm: &str,
    username: &str,
    password: &str,
) -> Result<String, KeycloakError> {
    let url = endpoint(
        base,
        &["realms", auth_realm, "protocol", "openid-connect", "token"],
    )?;
    let response = http
        .post(url)
        .form(&[
            ("grant_type", "password"),
            ("client_id", ADMIN_CLIENT_ID),
            ("username", username),
            ("password", password),
        ])
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(KeycloakError::Authentication(format!("{status}: {body}")));
    }

    let token: TokenResponse = response.json().await?;
    debug!("obtained admin token");
    Ok(token.access_token)
}

/// Append path segments to `base`, percent-encoding each one
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, KeycloakError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| KeycloakError::Url(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Authenticated admin API client
pub struct KeycloakHttpClient {
    http: Client,
    base: Url,
    token: String,
}

impl KeycloakHttpClient {
    fn admin(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, KeycloakError> {
        let mut path = vec!["admin", "realms"];
        path.extend_from_slice(segments);
        let url = endpoint(&self.base, &path)?;
        Ok(self.http.request(method, url).bearer_auth(&self.token))
    }

    /// Send a request, turning non-success statuses into errors
    async fn send(&self, request: RequestBuilder) -> Result<Response, KeycloakError> {
        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(KeycloakError::api(status, body))
    }

    /// GET that reports 404 as `false`
    async fn exists(&self, segments: &[&str]) -> Result<bool, KeycloakError> {
        let response = self.admin(Method::GET, segments)?.send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(KeycloakError::api(s.as_u16(), body))
            }
        }
    }

    /// DELETE that treats 404 as already done
    async fn remove(&self, segments: &[&str]) -> Result<(), KeycloakError> {
        match self.send(self.admin(Method::DELETE, segments)?).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other.map(|_| ()),
        }
    }

    async fn write<T: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: &T,
    ) -> Result<(), KeycloakError> {
        self.send(self.admin(method, segments)?.json(body)).await?;
        Ok(())
    }

    async fn probe(&self, realm: &str) -> Result<(), KeycloakError> {
        match self.send(self.admin(Method::GET, &[realm])?).await {
            Err(KeycloakError::Api { status, message }) if status == 401 || status == 403 => {
                Err(KeycloakError::Authentication(format!("{status}: {message}")))
            }
            other => other.map(|_| ()),
        }
    }

    async fn find_client(
        &self,
        realm: &str,
        client_id: &str,
    ) -> Result<Option<ClientRepresentation>, KeycloakError> {
        let request = self
            .admin(Method::GET, &[realm, "clients"])?
            .query(&[("clientId", client_id)]);
        let clients: Vec<ClientRepresentation> = self.send(request).await?.json().await?;
        Ok(clients.into_iter().find(|c| c.client_id == client_id))
    }

    /// Server UUID of a client, failing with 404 if it does not exist
    async fn client_uuid(&self, realm: &str, client_id: &str) -> Result<String, KeycloakError> {
        self.find_client(realm, client_id)
            .await?
            .and_then(|c| c.id)
            .ok_or_else(|| KeycloakError::api(404, format!("client {client_id} not found")))
    }

    async fn role(&self, realm: &str, name: &str) -> Result<RoleRepresentation, KeycloakError> {
        Ok(self
            .send(self.admin(Method::GET, &[realm, "roles", name])?)
            .await?
            .json()
            .await?)
    }

    /// Add any composites of `role` that are missing on the server
    async fn sync_composites(&self, realm: &str, role: &PrimaryRealmRole) -> Result<(), KeycloakError> {
        if role.composites.is_empty() {
            return Ok(());
        }
        let current: Vec<RoleRepresentation> = self
            .send(self.admin(Method::GET, &[realm, "roles", role.name.as_str(), "composites"])?)
            .await?
            .json()
            .await?;

        let mut missing = Vec::new();
        for name in &role.composites {
            if !current.iter().any(|c| &c.name == name) {
                missing.push(self.role(realm, name).await?);
            }
        }
        if missing.is_empty() {
            return Ok(());
        }
        self.write(
            Method::POST,
            &[realm, "roles", role.name.as_str(), "composites"],
            &missing,
        )
        .await
    }
}

#[async_trait]
impl IdentityProviderClient for KeycloakHttpClient {
    async fn exists_realm(&self, realm: &str) -> Result<bool, KeycloakError> {
        self.exists(&[realm]).await
    }

    async fn create_realm(&self, realm: &RealmRepresentation) -> Result<(), KeycloakError> {
        let url = endpoint(&self.base, &["admin", "realms"])?;
        self.send(self.http.post(url).bearer_auth(&self.token).json(realm))
            .await?;
        Ok(())
    }

    async fn delete_realm(&self, realm: &str) -> Result<(), KeycloakError> {
        self.remove(&[realm]).await
    }

    async fn exists_realm_role(&self, realm: &str, role: &str) -> Result<bool, KeycloakError> {
        self.exists(&[realm, "roles", role]).await
    }

    async fn create_included_realm_role(
        &self,
        realm: &str,
        role: &IncludedRealmRole,
    ) -> Result<(), KeycloakError> {
        self.write(Method::POST, &[realm, "roles"], &RoleRepresentation::from(role))
            .await
    }

    async fn sync_realm_role(
        &self,
        realm: &str,
        role: &PrimaryRealmRole,
    ) -> Result<(), KeycloakError> {
        let representation = RoleRepresentation::from(role);
        if self.exists_realm_role(realm, &role.name).await? {
            self.write(Method::PUT, &[realm, "roles", role.name.as_str()], &representation)
                .await?;
        } else {
            self.write(Method::POST, &[realm, "roles"], &representation)
                .await?;
        }
        self.sync_composites(realm, role).await
    }

    async fn delete_realm_role(&self, realm: &str, role: &str) -> Result<(), KeycloakError> {
        self.remove(&[realm, "roles", role]).await
    }

    async fn exists_client(&self, realm: &str, client_id: &str) -> Result<bool, KeycloakError> {
        Ok(self.find_client(realm, client_id).await?.is_some())
    }

    async fn create_client(
        &self,
        realm: &str,
        client: &ClientRepresentation,
    ) -> Result<(), KeycloakError> {
        self.write(Method::POST, &[realm, "clients"], client).await
    }

    async fn update_client(
        &self,
        realm: &str,
        client: &ClientRepresentation,
    ) -> Result<(), KeycloakError> {
        let id = self.client_uuid(realm, &client.client_id).await?;
        let body = ClientRepresentation {
            id: Some(id.clone()),
            ..client.clone()
        };
        self.write(Method::PUT, &[realm, "clients", id.as_str()], &body).await
    }

    async fn delete_client(&self, realm: &str, client_id: &str) -> Result<(), KeycloakError> {
        match self.find_client(realm, client_id).await? {
            Some(ClientRepresentation { id: Some(id), .. }) => {
                self.remove(&[realm, "clients", id.as_str()]).await
            }
            _ => Ok(()),
        }
    }

    async fn exists_client_role(
        &self,
        realm: &str,
        client_id: &str,
        role: &str,
    ) -> Result<bool, KeycloakError> {
        let id = self.client_uuid(realm, client_id).await?;
        self.exists(&[realm, "clients", id.as_str(), "roles", role]).await
    }

    async fn create_client_role(
        &self,
        realm: &str,
        client_id: &str,
        role: &str,
    ) -> Result<(), KeycloakError> {
        let id = self.client_uuid(realm, client_id).await?;
        let body = RoleRepresentation {
            name: role.to_string(),
            ..Default::default()
        };
        self.write(Method::POST, &[realm, "clients", id.as_str(), "roles"], &body)
            .await
    }
}
