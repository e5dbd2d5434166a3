//! Realm role pipeline

use async_trait::async_trait;
use tracing::info;

use super::{PipelineStep, SyncPolicy};
use crate::invocation::Invocation;
use crate::keycloak::{IdentityProviderClient, PrimaryRealmRole};
use crate::Error;

/// Desired state of a realm role
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RealmRoleDesired {
    /// Realm the role lives in
    pub realm: String,
    /// The role
    pub role: PrimaryRealmRole,
}

/// Steps of the realm role pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RealmRoleStep {
    /// Create or overwrite the role
    PutRealmRole,
}

impl RealmRoleStep {
    /// Steps in execution order
    pub const PIPELINE: &'static [RealmRoleStep] = &[RealmRoleStep::PutRealmRole];
}

#[async_trait]
impl PipelineStep for RealmRoleStep {
    type Desired = RealmRoleDesired;

    fn name(&self) -> &'static str {
        match self {
            Self::PutRealmRole => "put realm role",
        }
    }

    fn policy(&self) -> SyncPolicy {
        SyncPolicy::AlwaysSynchronize
    }

    async fn apply(
        &self,
        desired: &RealmRoleDesired,
        client: &dyn IdentityProviderClient,
        inv: &Invocation,
    ) -> Result<(), Error> {
        let entity = format!("realm role {}/{}", desired.realm, desired.role.name);
        inv.remote(
            "syncRealmRole",
            &entity,
            client.sync_realm_role(&desired.realm, &desired.role),
        )
        .await?;
        info!(realm = %desired.realm, role = %desired.role.name, "realm role synchronized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keycloak::{KeycloakError, MockIdentityProviderClient};

    fn desired() -> RealmRoleDesired {
        RealmRoleDesired {
            realm: "ns.test".into(),
            role: PrimaryRealmRole {
                name: "role-test".into(),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn role_is_synchronized_every_time() {
        let mut client = MockIdentityProviderClient::new();
        client
            .expect_sync_realm_role()
            .withf(|realm, role| {
                realm == "ns.test" && role.name == "role-test" && role.composites.is_empty()
            })
            .times(2)
            .returning(|_, _| Ok(()));

        let inv = Invocation::for_testing();
        for _ in 0..2 {
            RealmRoleStep::PutRealmRole
                .apply(&desired(), &client, &inv)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn sync_failure_names_the_role() {
        let mut client = MockIdentityProviderClient::new();
        client
            .expect_sync_realm_role()
            .returning(|_, _| Err(KeycloakError::api(500, "test mock fatal")));

        let err = RealmRoleStep::PutRealmRole
            .apply(&desired(), &client, &Invocation::for_testing())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("realm role ns.test/role-test"));
    }
}
