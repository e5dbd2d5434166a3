//! Reconcilers for the Keycloak custom resources
//!
//! [`reconcile`] drives realms, realm roles and clients through the same
//! sequence: resolve the owner, connect, run the finalizer protocol, run
//! the kind's pipeline, write status. [`reconcile_keycloak`] only tracks
//! connectivity of a Keycloak resource.

mod keycloak;
mod managed;
mod owner;
mod resource;
mod status;

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ControllerConfig;
use crate::connection::ConnectionManager;
use crate::credentials::CredentialResolver;
use crate::crd::TrackedResource;
use crate::invocation::Invocation;
use crate::keycloak::{ClientFactory, HttpClientFactory};
use crate::store::{KubeObjectStore, KubeRecordStore, ObjectStore, RecordStore, RecordWriter};
use crate::Error;

pub use keycloak::reconcile_keycloak;
pub use managed::reconcile;
pub use owner::{resolve_owner, ResolvedOwner};
pub use resource::{
    ManagedResource, Parent, CLIENT_FINALIZER, REALM_FINALIZER, REALM_ROLE_FINALIZER,
};
pub use status::StatusSession;

/// Shared state of the controller for kind `K`
pub struct Context<K: TrackedResource> {
    /// Records of the reconciled kind
    pub records: Arc<dyn RecordStore<K>>,
    /// Secrets, ConfigMaps and parent resources
    pub objects: Arc<dyn ObjectStore>,
    /// Reads connection credentials of a Keycloak resource
    pub credentials: CredentialResolver,
    /// Opens Keycloak connections
    pub connections: ConnectionManager,
    /// Requeue and retry tuning
    pub config: ControllerConfig,
    /// Cancelled on process shutdown
    pub shutdown: CancellationToken,
}

impl<K: TrackedResource> Context<K> {
    /// Start building a context backed by `client`
    pub fn builder(client: Client) -> ContextBuilder<K> {
        ContextBuilder::new(client)
    }

    /// Create a context from explicit parts
    ///
    /// Primarily for unit tests where no API server is available.
    pub fn from_parts(
        records: Arc<dyn RecordStore<K>>,
        objects: Arc<dyn ObjectStore>,
        factory: Arc<dyn ClientFactory>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            records,
            credentials: CredentialResolver::new(objects.clone()),
            objects,
            connections: ConnectionManager::new(factory),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Invocation context for `record`, tied to the shutdown token
    pub(crate) fn invocation(&self, record: &K) -> Result<Invocation, Error> {
        let namespace = record
            .namespace()
            .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
        Ok(Invocation::new(
            &K::kind(&()),
            &namespace,
            &record.name_any(),
            self.shutdown.child_token(),
        ))
    }

    pub(crate) fn writer<'a>(&'a self, inv: &'a Invocation) -> RecordWriter<'a, K> {
        RecordWriter::new(self.records.as_ref(), inv, self.config.conflict_retries)
    }
}

/// Builder for [`Context`]
///
/// ```ignore
/// let ctx = Context::<KeycloakRealm>::builder(client)
///     .config(config)
///     .shutdown(token.clone())
///     .build();
/// ```
pub struct ContextBuilder<K: TrackedResource> {
    client: Client,
    records: Option<Arc<dyn RecordStore<K>>>,
    objects: Option<Arc<dyn ObjectStore>>,
    factory: Option<Arc<dyn ClientFactory>>,
    config: ControllerConfig,
    shutdown: CancellationToken,
}

impl<K: TrackedResource> ContextBuilder<K> {
    fn new(client: Client) -> Self {
        Self {
            client,
            records: None,
            objects: None,
            factory: None,
            config: ControllerConfig::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Set controller tuning
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Cancel in-flight reconciliations when `token` is cancelled
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Override the Keycloak client factory
    pub fn client_factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Override the record store (primarily for testing)
    pub fn record_store(mut self, records: Arc<dyn RecordStore<K>>) -> Self {
        self.records = Some(records);
        self
    }

    /// Override the object store (primarily for testing)
    pub fn object_store(mut self, objects: Arc<dyn ObjectStore>) -> Self {
        self.objects = Some(objects);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context<K> {
        let records = self
            .records
            .unwrap_or_else(|| Arc::new(KubeRecordStore::new(self.client.clone())));
        let objects = self
            .objects
            .unwrap_or_else(|| Arc::new(KubeObjectStore::new(self.client.clone())));
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(HttpClientFactory::default()));

        let mut ctx = Context::from_parts(records, objects, factory, self.config);
        ctx.shutdown = self.shutdown;
        ctx
    }
}

/// Requeue policy after a failed reconciliation
///
/// Backs off exponentially on the failure count already recorded on the
/// object. Cancelled invocations are not requeued; the process is exiting.
pub fn error_policy<K: TrackedResource>(record: Arc<K>, error: &Error, ctx: Arc<Context<K>>) -> Action {
    if error.is_cancelled() {
        debug!(error = %error, name = %record.name_any(), "reconciliation cancelled");
        return Action::await_change();
    }

    let failures = record.failure_count();
    let delay = ctx.config.failure_backoff(failures);
    warn!(
        error = %error,
        kind = %K::kind(&()),
        name = %record.name_any(),
        failures,
        retry_in = ?delay,
        "reconciliation failed"
    );
    Action::requeue(delay)
}
