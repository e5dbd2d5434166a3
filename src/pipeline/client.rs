//! Client pipeline
//!
//! The client itself is always synchronized. The realm roles and client
//! roles it lists are only created when missing, since other resources may
//! own and customize them.

use async_trait::async_trait;
use tracing::{debug, info};

use super::{PipelineStep, SyncPolicy};
use crate::invocation::Invocation;
use crate::keycloak::{ClientRepresentation, IdentityProviderClient, IncludedRealmRole};
use crate::Error;

/// Desired state of a client
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientDesired {
    /// Realm the client lives in
    pub realm: String,
    /// The client
    pub client: ClientRepresentation,
    /// Realm roles that must exist
    pub realm_roles: Vec<IncludedRealmRole>,
    /// Client roles that must exist on the client
    pub client_roles: Vec<String>,
}

/// Steps of the client pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientStep {
    /// Create or overwrite the client
    PutClient,
    /// Create missing realm roles; a role that already exists is skipped
    /// and the remaining roles are still checked
    PutRealmRoles,
    /// Create missing client roles
    PutClientRoles,
}

impl ClientStep {
    /// Steps in execution order
    pub const PIPELINE: &'static [ClientStep] = &[
        ClientStep::PutClient,
        ClientStep::PutRealmRoles,
        ClientStep::PutClientRoles,
    ];

    async fn put_client(
        desired: &ClientDesired,
        client: &dyn IdentityProviderClient,
        inv: &Invocation,
    ) -> Result<(), Error> {
        let realm = &desired.realm;
        let client_id = &desired.client.client_id;
        let entity = format!("client {realm}/{client_id}");

        if inv
            .remote("existsClient", &entity, client.exists_client(realm, client_id))
            .await?
        {
            inv.remote("updateClient", &entity, client.update_client(realm, &desired.client))
                .await?;
            debug!(%realm, %client_id, "client updated");
        } else {
            inv.remote("createClient", &entity, client.create_client(realm, &desired.client))
                .await?;
            info!(%realm, %client_id, "client created");
        }
        Ok(())
    }

    async fn put_realm_roles(
        desired: &ClientDesired,
        client: &dyn IdentityProviderClient,
        inv: &Invocation,
    ) -> Result<(), Error> {
        let realm = &desired.realm;
        for role in &desired.realm_roles {
            let entity = format!("realm role {realm}/{}", role.name);
            if inv
                .remote("existsRealmRole", &entity, client.exists_realm_role(realm, &role.name))
                .await?
            {
                debug!(%realm, role = %role.name, "realm role already exists");
                continue;
            }
            inv.remote(
                "createRealmRole",
                &entity,
                client.create_included_realm_role(realm, role),
            )
            .await?;
            info!(%realm, role = %role.name, "realm role created");
        }
        Ok(())
    }

    async fn put_client_roles(
        desired: &ClientDesired,
        client: &dyn IdentityProviderClient,
        inv: &Invocation,
    ) -> Result<(), Error> {
        let realm = &desired.realm;
        let client_id = &desired.client.client_id;
        for role in &desired.client_roles {
            let entity = format!("client role {realm}/{client_id}/{role}");
            if inv
                .remote(
                    "existsClientRole",
                    &entity,
                    client.exists_client_role(realm, client_id, role),
                )
                .await?
            {
                continue;
            }
            inv.remote(
                "createClientRole",
                &entity,
                client.create_client_role(realm, client_id, role),
            )
            .await?;
            info!(%realm, %client_id, %role, "client role created");
        }
        Ok(())
    }
}

#[async_trait]
impl PipelineStep for ClientStep {
    type Desired = ClientDesired;

    fn name(&self) -> &'static str {
        match self {
            Self::PutClient => "put client",
            Self::PutRealmRoles => "put realm roles",
            Self::PutClientRoles => "put client roles",
        }
    }

    fn policy(&self) -> SyncPolicy {
        match self {
            Self::PutClient => SyncPolicy::AlwaysSynchronize,
            Self::PutRealmRoles | Self::PutClientRoles => SyncPolicy::CreateIfAbsent,
        }
    }

    async fn apply(
        &self,
        desired: &ClientDesired,
        client: &dyn IdentityProviderClient,
        inv: &Invocation,
    ) -> Result<(), Error> {
        match self {
            Self::PutClient => Self::put_client(desired, client, inv).await,
            Self::PutRealmRoles => Self::put_realm_roles(desired, client, inv).await,
            Self::PutClientRoles => Self::put_client_roles(desired, client, inv).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keycloak::{KeycloakError, MockIdentityProviderClient};

    fn desired(roles: &[&str]) -> ClientDesired {
        ClientDesired {
            realm: "ns.test".into(),
            client: ClientRepresentation {
                client_id: "portal".into(),
                enabled: true,
                ..Default::default()
            },
            realm_roles: roles
                .iter()
                .map(|name| IncludedRealmRole {
                    name: name.to_string(),
                    composite: false,
                })
                .collect(),
            client_roles: vec![],
        }
    }

    #[tokio::test]
    async fn existing_client_is_updated_not_recreated() {
        let mut client = MockIdentityProviderClient::new();
        client.expect_exists_client().returning(|_, _| Ok(true));
        client
            .expect_update_client()
            .withf(|realm, c| realm == "ns.test" && c.client_id == "portal")
            .times(1)
            .returning(|_, _| Ok(()));
        client.expect_create_client().never();

        ClientStep::PutClient
            .apply(&desired(&[]), &client, &Invocation::for_testing())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_client_is_created() {
        let mut client = MockIdentityProviderClient::new();
        client.expect_exists_client().returning(|_, _| Ok(false));
        client.expect_create_client().times(1).returning(|_, _| Ok(()));
        client.expect_update_client().never();

        ClientStep::PutClient
            .apply(&desired(&[]), &client, &Invocation::for_testing())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn existing_realm_role_does_not_stop_the_loop() {
        let mut client = MockIdentityProviderClient::new();
        client
            .expect_exists_realm_role()
            .returning(|_, role| Ok(role == "first"));
        client
            .expect_create_included_realm_role()
            .withf(|realm, role| realm == "ns.test" && role.name == "second")
            .times(1)
            .returning(|_, _| Ok(()));

        ClientStep::PutRealmRoles
            .apply(&desired(&["first", "second"]), &client, &Invocation::for_testing())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_failure_is_reported_with_the_role() {
        let mut client = MockIdentityProviderClient::new();
        client.expect_exists_realm_role().returning(|_, _| Ok(false));
        client
            .expect_create_included_realm_role()
            .returning(|_, _| Err(KeycloakError::api(500, "test mock fatal")));

        let err = ClientStep::PutRealmRoles
            .apply(&desired(&["role-test"]), &client, &Invocation::for_testing())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "createRealmRole failed for realm role ns.test/role-test: \
             keycloak api error (500): test mock fatal"
        );
    }

    #[tokio::test]
    async fn missing_client_roles_are_created() {
        let mut client = MockIdentityProviderClient::new();
        client
            .expect_exists_client_role()
            .returning(|_, _, role| Ok(role == "reader"));
        client
            .expect_create_client_role()
            .withf(|realm, client_id, role| {
                realm == "ns.test" && client_id == "portal" && role == "writer"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut desired = desired(&[]);
        desired.client_roles = vec!["reader".into(), "writer".into()];
        ClientStep::PutClientRoles
            .apply(&desired, &client, &Invocation::for_testing())
            .await
            .unwrap();
    }

    #[test]
    fn policies_follow_ownership() {
        assert_eq!(ClientStep::PutClient.policy(), SyncPolicy::AlwaysSynchronize);
        assert_eq!(ClientStep::PutRealmRoles.policy(), SyncPolicy::CreateIfAbsent);
        assert_eq!(ClientStep::PutClientRoles.policy(), SyncPolicy::CreateIfAbsent);
    }
}
