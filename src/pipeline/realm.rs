//! Realm pipeline

use async_trait::async_trait;
use tracing::{debug, info};

use super::{PipelineStep, SyncPolicy};
use crate::invocation::Invocation;
use crate::keycloak::{IdentityProviderClient, RealmRepresentation};
use crate::Error;

/// Desired state of a realm
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RealmDesired {
    /// Realm to create
    pub realm: RealmRepresentation,
}

/// Steps of the realm pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RealmStep {
    /// Create the realm when missing
    PutRealm,
}

impl RealmStep {
    /// Steps in execution order
    pub const PIPELINE: &'static [RealmStep] = &[RealmStep::PutRealm];
}

#[async_trait]
impl PipelineStep for RealmStep {
    type Desired = RealmDesired;

    fn name(&self) -> &'static str {
        match self {
            Self::PutRealm => "put realm",
        }
    }

    fn policy(&self) -> SyncPolicy {
        SyncPolicy::CreateIfAbsent
    }

    async fn apply(
        &self,
        desired: &RealmDesired,
        client: &dyn IdentityProviderClient,
        inv: &Invocation,
    ) -> Result<(), Error> {
        let realm = &desired.realm.realm;
        let entity = format!("realm {realm}");

        if inv
            .remote("existsRealm", &entity, client.exists_realm(realm))
            .await?
        {
            debug!(%realm, "realm already exists");
            return Ok(());
        }

        inv.remote("createRealm", &entity, client.create_realm(&desired.realm))
            .await?;
        info!(%realm, "realm created");
        Ok(())
    }
}
