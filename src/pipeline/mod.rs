//! Ordered synchronization pipelines
//!
//! Each managed kind has a static, ordered list of steps. Steps run one
//! after another; the first failure stops the pipeline and is returned
//! wrapped with the step name. Nothing is retried here: the controller
//! requeues with backoff instead.
//!
//! Steps come in two flavours, see [`SyncPolicy`]. No step ever removes
//! remote entities that disappeared from the spec; only deleting the whole
//! resource cleans up remotely.

mod client;
mod realm;
mod realm_role;

use async_trait::async_trait;
use tracing::debug;

use crate::invocation::Invocation;
use crate::keycloak::IdentityProviderClient;
use crate::Error;

pub use client::{ClientDesired, ClientStep};
pub use realm::{RealmDesired, RealmStep};
pub use realm_role::{RealmRoleDesired, RealmRoleStep};

/// How a step treats an entity that already exists
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Create when missing, leave existing entities untouched
    CreateIfAbsent,
    /// Overwrite the remote entity with the desired state every time
    AlwaysSynchronize,
}

/// One unit of a pipeline
#[async_trait]
pub trait PipelineStep: Send + Sync {
    /// Desired state the step reads
    type Desired: Send + Sync;

    /// Name used in logs and error messages
    fn name(&self) -> &'static str;

    /// How the step treats existing entities
    fn policy(&self) -> SyncPolicy;

    /// Converge the remote state for this step
    async fn apply(
        &self,
        desired: &Self::Desired,
        client: &dyn IdentityProviderClient,
        inv: &Invocation,
    ) -> Result<(), Error>;
}

/// Run `steps` in order, stopping at the first failure
pub async fn run<S: PipelineStep>(
    steps: &[S],
    desired: &S::Desired,
    client: &dyn IdentityProviderClient,
    inv: &Invocation,
) -> Result<(), Error> {
    for step in steps {
        debug!(step = step.name(), policy = ?step.policy(), "running step");
        step.apply(desired, client, inv).await.map_err(|e| {
            if e.is_cancelled() {
                e
            } else {
                Error::step(step.name(), e)
            }
        })?;
    }
    Ok(())
}
